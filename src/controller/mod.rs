//! Session controller
//!
//! [`SessionController`] owns the telephony endpoint lifecycle and the active
//! call. It composes the permission gate, credential lease manager, audio
//! device selector, metadata resolver, and reconnection policy, and exposes
//! the operation surface the presentation layer drives
//! (`connect`/`disconnect`/`send_digits`/`mute`, offer accept/reject, and
//! lifecycle signals).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              SessionController               │
//! │  endpoint state ── active call ── registry   │
//! │  timer slots: refresh / reconnect / watchdog │
//! └──┬─────────┬──────────┬──────────┬───────────┘
//!    │         │          │          │
//!    ▼         ▼          ▼          ▼
//!  PermissionGate  TokenLeaseManager  MetadataResolver  AudioDeviceSelector
//!                      │
//!                      ▼
//!            TelephonyProvider (opaque SDK)
//! ```
//!
//! # Concurrency model
//!
//! Controller logic is event-driven with suspension only at async I/O
//! boundaries (permission probe, credential fetch, directory lookup, provider
//! calls). Re-entrant initialization is rejected by an in-flight guard, and
//! every background task lives in an owned, named slot with a single
//! cancellation path, so teardown can synchronously stop all of them. Results
//! of long-running operations are re-validated against current state before
//! they are applied (late metadata is discarded, stale endpoint events are
//! dropped by generation check).

pub mod builder;
pub mod config;
pub mod lease;
pub mod recovery;
pub mod types;

mod calls;
mod events;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::AudioDeviceSelector;
use crate::call::{CallId, CallInfo};
use crate::error::ClientResult;
use crate::events::{ClientEvent, ClientEventHandler, EventPriority, Notice, NoticeKind};
use crate::metadata::MetadataResolver;
use crate::permission::{MicrophoneAccess, PermissionGate};
use crate::provider::{ProviderCall, ProviderEndpoint, TelephonyProvider};

use self::builder::SessionControllerBuilder;
use self::config::ControllerConfig;
use self::lease::TokenLeaseManager;
use self::recovery::{with_timeout, ReconnectionPolicy};
use self::types::{ControllerSnapshot, ControllerStats, EndpointState, LifecycleSignal};

/// Owned slot for one background task
///
/// Arming replaces the occupant, aborting whatever was there; `cancel` is the
/// single cancellation path invoked on every state exit, so a slot can never
/// hold two live tasks and no callback outlives the state that armed it.
pub(crate) struct TimerSlot {
    name: &'static str,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: StdMutex::new(None),
        }
    }

    /// Install a task, aborting any previous occupant
    pub(crate) fn arm(&self, handle: JoinHandle<()>) {
        let mut guard = self.handle.lock().unwrap();
        if let Some(previous) = guard.take() {
            previous.abort();
            debug!(slot = self.name, "Replaced armed task");
        }
        *guard = Some(handle);
    }

    /// Abort and clear the slot
    pub(crate) fn cancel(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
            debug!(slot = self.name, "Cancelled task");
        }
    }

    /// Whether a live task occupies the slot
    pub(crate) fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

/// The call currently in progress, paired with its provider handle
pub(crate) struct ActiveCall {
    pub(crate) call_id: CallId,
    pub(crate) handle: Arc<dyn ProviderCall>,
}

/// Client-side controller for a single user's telephony session
///
/// Owns at most one live endpoint and at most one active call. Constructed
/// once at application start via [`SessionController::builder`] and shared by
/// reference; all mutable state is private to the instance.
pub struct SessionController {
    pub(crate) config: ControllerConfig,
    pub(crate) identity: String,
    pub(crate) provider: Arc<dyn TelephonyProvider>,
    pub(crate) permission_gate: PermissionGate,
    pub(crate) lease_manager: TokenLeaseManager,
    pub(crate) resolver: MetadataResolver,
    pub(crate) audio_selector: AudioDeviceSelector,

    pub(crate) endpoint_state: RwLock<EndpointState>,
    pub(crate) endpoint: RwLock<Option<Arc<dyn ProviderEndpoint>>>,
    pub(crate) endpoint_generation: AtomicU64,
    pub(crate) active_call: RwLock<Option<ActiveCall>>,
    pub(crate) call_registry: DashMap<CallId, CallInfo>,

    pub(crate) reconnect: StdMutex<ReconnectionPolicy>,
    pub(crate) init_in_flight: AtomicBool,
    pub(crate) call_context_active: AtomicBool,
    pub(crate) microphone_granted: AtomicBool,

    pub(crate) refresh_timer: TimerSlot,
    pub(crate) reconnect_timer: TimerSlot,
    pub(crate) watchdog_timer: TimerSlot,
    pub(crate) event_pump: TimerSlot,

    pub(crate) event_tx: broadcast::Sender<ClientEvent>,
    pub(crate) event_handler: RwLock<Option<Arc<dyn ClientEventHandler>>>,

    pub(crate) total_calls: AtomicU64,
    pub(crate) total_registrations: AtomicU64,
}

impl SessionController {
    /// Start building a controller
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::new()
    }

    /// Probe microphone permission and initialize the endpoint
    ///
    /// The usual entry point at application start. Returns once the endpoint
    /// is constructed and registering; the `Registered` transition arrives as
    /// an event.
    pub async fn start(self: &Arc<Self>) -> ClientResult<()> {
        self.ensure_microphone().await?;
        self.initialize().await
    }

    /// Probe microphone access, remembering a granted outcome
    ///
    /// Denial and unavailability surface once per attempt as user-actionable
    /// errors and are never silently retried.
    pub(crate) async fn ensure_microphone(&self) -> ClientResult<()> {
        if self.microphone_granted.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.permission_gate.request_microphone().await {
            MicrophoneAccess::Granted => {
                self.microphone_granted.store(true, Ordering::SeqCst);
                Ok(())
            }
            MicrophoneAccess::Denied => {
                self.emit(ClientEvent::NoticeRaised {
                    notice: Notice::transient(
                        NoticeKind::MicrophonePermission,
                        "Microphone access is blocked. Allow microphone use for this site to make calls.",
                    ),
                    priority: EventPriority::High,
                })
                .await;
                Err(crate::error::ClientError::MicrophoneDenied)
            }
            MicrophoneAccess::Unavailable { reason } => {
                self.emit(ClientEvent::NoticeRaised {
                    notice: Notice::transient(
                        NoticeKind::MicrophonePermission,
                        "Could not access a microphone. Check your audio hardware and try again.",
                    ),
                    priority: EventPriority::High,
                })
                .await;
                Err(crate::error::ClientError::MicrophoneUnavailable { reason })
            }
        }
    }

    /// Create (or re-create) the endpoint and start registration
    ///
    /// A duplicate attempt while one is already in flight is rejected as a
    /// no-op. A new endpoint supersedes and destroys the previous one,
    /// force-ending any call it carried.
    pub async fn initialize(self: &Arc<Self>) -> ClientResult<()> {
        if self.init_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Initialization already in flight, rejecting duplicate attempt");
            return Ok(());
        }
        let result = self.initialize_inner().await;
        self.init_in_flight.store(false, Ordering::SeqCst);

        if let Err(ref e) = result {
            if e.is_recoverable() {
                warn!(error = %e, category = e.category(), "Initialization failed, entering fault path");
                self.transition_endpoint(EndpointState::Faulted, Some(&e.to_string()))
                    .await;
                self.schedule_reconnect().await;
            } else {
                error!(error = %e, category = e.category(), "Initialization failed with non-recoverable error");
            }
        }
        result
    }

    async fn initialize_inner(self: &Arc<Self>) -> ClientResult<()> {
        info!(identity = %self.identity, "Initializing telephony endpoint");
        self.transition_endpoint(EndpointState::Initializing, Some("initialization started"))
            .await;

        // Supersede the previous endpoint: its call, timers, pump, and
        // provider resources all go before the replacement exists.
        self.force_end_active_call("superseded by endpoint reinitialization")
            .await;
        self.refresh_timer.cancel();
        self.watchdog_timer.cancel();
        self.event_pump.cancel();
        let generation = self.endpoint_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = self.endpoint.write().await.take() {
            old.destroy().await;
        }

        let lease = self.lease_manager.obtain(&self.identity).await?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let endpoint = with_timeout(
            "create_endpoint",
            self.config.signaling_timeout,
            self.provider
                .create_endpoint(&lease.token, &self.config.endpoint_config(), event_tx),
        )
        .await?;

        *self.endpoint.write().await = Some(endpoint.clone());
        self.event_pump.arm(tokio::spawn(events::run_event_pump(
            Arc::clone(self),
            generation,
            event_rx,
        )));

        self.audio_selector
            .apply_defaults(endpoint.audio().as_ref())
            .await;
        self.arm_refresh_timer(self.lease_manager.refresh_delay());
        Ok(())
    }

    /// Tear the endpoint down
    ///
    /// Synchronously cancels every task slot before anything else so no
    /// callback can fire against the destroyed endpoint, force-ends the
    /// active call, destroys the provider endpoint, and drops the lease.
    pub async fn teardown(&self) {
        info!("Tearing down telephony endpoint");
        self.refresh_timer.cancel();
        self.reconnect_timer.cancel();
        self.watchdog_timer.cancel();
        self.event_pump.cancel();

        self.force_end_active_call("endpoint destroyed").await;

        // Invalidate any in-flight work that snapshotted the old generation
        self.endpoint_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(endpoint) = self.endpoint.write().await.take() {
            endpoint.destroy().await;
        }
        self.lease_manager.clear().await;
        self.transition_endpoint(EndpointState::Destroyed, Some("explicit teardown"))
            .await;
    }

    /// Handle an external lifecycle signal
    ///
    /// Signals are environment-driven (network state, tab visibility, audio
    /// hardware changes) and each maps to one deterministic path.
    pub async fn handle_signal(self: &Arc<Self>, signal: LifecycleSignal) {
        match signal {
            LifecycleSignal::NetworkOffline => {
                warn!("Network connectivity lost");
                // The provider's transport is already dead; the call is lost
                self.force_end_active_call("network connection lost").await;
                let state = *self.endpoint_state.read().await;
                if matches!(state, EndpointState::Registered | EndpointState::Initializing) {
                    self.transition_endpoint(EndpointState::Faulted, Some("network offline"))
                        .await;
                }
                self.emit(ClientEvent::NoticeRaised {
                    notice: Notice::transient(
                        NoticeKind::NetworkLost,
                        "Network connection lost. Calling will resume when you are back online.",
                    ),
                    priority: EventPriority::High,
                })
                .await;
            }
            LifecycleSignal::NetworkOnline => {
                info!("Network connectivity restored");
                self.external_recovery("network restored").await;
            }
            LifecycleSignal::TabVisible => {
                let state = *self.endpoint_state.read().await;
                if state.is_registered() {
                    return;
                }
                info!(state = %state, "Tab visible with unregistered endpoint, recovering");
                self.external_recovery("tab became visible").await;
            }
            LifecycleSignal::AudioDevicesChanged => {
                debug!("Audio hardware changed, re-applying device policy");
                let endpoint = self.endpoint.read().await.clone();
                if let Some(endpoint) = endpoint {
                    self.audio_selector
                        .apply_defaults(endpoint.audio().as_ref())
                        .await;
                }
                if self.active_call.read().await.is_some() {
                    self.emit(ClientEvent::NoticeRaised {
                        notice: Notice::transient(
                            NoticeKind::AudioDevicesChanged,
                            "Your audio devices changed during the call.",
                        ),
                        priority: EventPriority::High,
                    })
                    .await;
                }
            }
        }
    }

    /// External recovery triggers represent a fresh opportunity distinct from
    /// whatever fault caused prior backoff, so the attempt counter resets and
    /// any pending reconnect timer is cancelled before re-initializing.
    async fn external_recovery(self: &Arc<Self>, reason: &str) {
        {
            self.reconnect.lock().unwrap().reset();
        }
        self.reconnect_timer.cancel();
        self.force_end_active_call(reason).await;
        if let Err(e) = self.initialize().await {
            warn!(error = %e, reason = reason, "Recovery initialization failed");
        }
    }

    /// Register a fault against the backoff policy and either schedule one
    /// re-initialization or surface the terminal failure.
    pub(crate) async fn schedule_reconnect(self: &Arc<Self>) {
        let delay = {
            let mut policy = self.reconnect.lock().unwrap();
            policy.next_delay()
        };
        match delay {
            None => {
                let attempts = self.config.backoff.max_attempts;
                error!(attempts, "Reconnection ceiling reached, not retrying");
                self.reconnect_timer.cancel();
                self.emit(ClientEvent::NoticeRaised {
                    notice: Notice::sticky(
                        NoticeKind::TerminalFailure,
                        format!(
                            "The phone connection could not be re-established after {} attempts. Reload the page to resume calling.",
                            attempts
                        ),
                    ),
                    priority: EventPriority::Critical,
                })
                .await;
            }
            Some(delay) => {
                let attempt = self.reconnect.lock().unwrap().attempt();
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling endpoint re-initialization"
                );
                let controller = Arc::clone(self);
                self.reconnect_timer.arm(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // Hand off to a task outside the slot so re-arming from
                    // the continuation can never abort itself
                    tokio::spawn(async move {
                        if *controller.endpoint_state.read().await == EndpointState::Destroyed {
                            return;
                        }
                        if let Err(e) = controller.initialize().await {
                            warn!(error = %e, "Scheduled re-initialization failed");
                        }
                    });
                }));
            }
        }
    }

    /// Arm the proactive credential renewal, superseding any previous timer
    pub(crate) fn arm_refresh_timer(self: &Arc<Self>, delay: Duration) {
        let controller = Arc::clone(self);
        self.refresh_timer.arm(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(async move {
                if *controller.endpoint_state.read().await == EndpointState::Destroyed {
                    return;
                }
                if let Err(e) = controller.refresh_credential().await {
                    warn!(error = %e, "Scheduled credential renewal failed");
                }
            });
        }));
    }

    /// Renew the credential, in place wherever possible
    ///
    /// While a call is live the endpoint is never reconstructed: a failed
    /// fetch or in-place renewal keeps the call and retries after a short
    /// delay. With no call active, a failed in-place renewal falls back to
    /// full endpoint reconstruction.
    pub async fn refresh_credential(self: &Arc<Self>) -> ClientResult<()> {
        debug!("Renewing credential lease");
        let lease = match self.lease_manager.obtain(&self.identity).await {
            Ok(lease) => lease,
            Err(e) => {
                if self.active_call.read().await.is_some() {
                    warn!(
                        error = %e,
                        retry_in_secs = self.config.refresh_retry_delay.as_secs(),
                        "Credential fetch failed with a call active, retrying without touching the endpoint"
                    );
                    self.arm_refresh_timer(self.config.refresh_retry_delay);
                } else {
                    warn!(error = %e, "Credential fetch failed, entering fault path");
                    self.transition_endpoint(EndpointState::Faulted, Some("credential fetch failed"))
                        .await;
                    self.schedule_reconnect().await;
                }
                return Err(e);
            }
        };

        let endpoint = self.endpoint.read().await.clone();
        let Some(endpoint) = endpoint else {
            return self.initialize().await;
        };

        match endpoint.update_credential(&lease.token).await {
            Ok(()) => {
                debug!("Credential renewed in place");
                self.arm_refresh_timer(self.lease_manager.refresh_delay());
                Ok(())
            }
            Err(e) => {
                if self.active_call.read().await.is_some() {
                    warn!(error = %e, "In-place renewal failed mid-call, keeping endpoint and retrying");
                    self.arm_refresh_timer(self.config.refresh_retry_delay);
                    Err(crate::error::ClientError::CredentialRenewalFailed {
                        reason: e.to_string(),
                    })
                } else {
                    warn!(error = %e, "In-place renewal failed, reconstructing endpoint");
                    self.initialize().await
                }
            }
        }
    }

    /// Mark whether the application is in a context where calls are relevant
    ///
    /// Inbound offers arriving while this is `false` are rejected before they
    /// ever reach the user.
    pub fn set_call_context(&self, active: bool) {
        self.call_context_active.store(active, Ordering::SeqCst);
    }

    /// Subscribe to the controller's event stream
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Register an event handler alongside (or instead of) a subscription
    pub async fn set_event_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        *self.event_handler.write().await = Some(handler);
    }

    /// Whether the endpoint is registered and ready for calls
    pub async fn is_ready(&self) -> bool {
        self.endpoint_state.read().await.is_registered()
    }

    /// Current endpoint lifecycle state
    pub async fn endpoint_state(&self) -> EndpointState {
        *self.endpoint_state.read().await
    }

    /// The in-progress call, if any
    pub async fn current_call(&self) -> Option<CallInfo> {
        let call_id = self.active_call.read().await.as_ref().map(|c| c.call_id);
        call_id.and_then(|id| self.call_registry.get(&id).map(|entry| entry.value().clone()))
    }

    /// Point-in-time view for the presentation layer
    pub async fn snapshot(&self) -> ControllerSnapshot {
        let endpoint_state = *self.endpoint_state.read().await;
        ControllerSnapshot {
            is_ready: endpoint_state.is_registered(),
            endpoint_state,
            current_call: self.current_call().await,
        }
    }

    /// Look up any call, live or ended
    pub fn get_call(&self, call_id: &CallId) -> ClientResult<CallInfo> {
        self.call_registry
            .get(call_id)
            .map(|entry| entry.value().clone())
            .ok_or(crate::error::ClientError::CallNotFound { call_id: *call_id })
    }

    /// Ended calls, oldest first
    pub fn call_history(&self) -> Vec<CallInfo> {
        let mut history: Vec<CallInfo> = self
            .call_registry
            .iter()
            .filter(|entry| entry.value().state.is_final())
            .map(|entry| entry.value().clone())
            .collect();
        history.sort_by_key(|call| call.created_at);
        history
    }

    /// Consecutive recoverable faults since the last successful registration
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect.lock().unwrap().attempt()
    }

    /// Aggregate activity statistics
    pub async fn stats(&self) -> ControllerStats {
        let endpoint_state = *self.endpoint_state.read().await;
        ControllerStats {
            is_ready: endpoint_state.is_registered(),
            endpoint_state,
            total_calls: self.total_calls.load(Ordering::SeqCst),
            total_registrations: self.total_registrations.load(Ordering::SeqCst),
            reconnect_attempt: self.reconnect_attempt(),
            refresh_timer_armed: self.refresh_timer.is_armed(),
            reconnect_timer_armed: self.reconnect_timer.is_armed(),
        }
    }

    /// Move the endpoint state machine and emit the transition
    pub(crate) async fn transition_endpoint(&self, new_state: EndpointState, reason: Option<&str>) {
        let previous = {
            let mut guard = self.endpoint_state.write().await;
            let previous = *guard;
            *guard = new_state;
            previous
        };
        if previous == new_state {
            return;
        }
        info!(previous = %previous, new = %new_state, "Endpoint state changed");
        self.emit(ClientEvent::EndpointStateChanged {
            info: crate::events::EndpointStatusInfo {
                previous_state: previous,
                new_state,
                reason: reason.map(String::from),
                timestamp: chrono::Utc::now(),
            },
            priority: EventPriority::Normal,
        })
        .await;
    }

    /// Fan an event out to the broadcast stream and the registered handler
    pub(crate) async fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event.clone());
        let handler = self.event_handler.read().await.clone();
        if let Some(handler) = handler {
            match event {
                ClientEvent::EndpointStateChanged { info, .. } => {
                    handler.on_endpoint_state_changed(info).await
                }
                ClientEvent::CallStateChanged { info, .. } => {
                    handler.on_call_state_changed(info).await
                }
                ClientEvent::IncomingCall { info, .. } => handler.on_incoming_call(info).await,
                ClientEvent::MetadataResolved { call_id, metadata } => {
                    handler.on_metadata_resolved(call_id, metadata).await
                }
                ClientEvent::NoticeRaised { notice, .. } => handler.on_notice(notice).await,
            }
        }
    }
}
