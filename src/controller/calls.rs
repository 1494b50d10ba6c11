//! Call operations for the session controller
//!
//! Placing, accepting, rejecting, and ending calls, the in-call controls
//! (mute, DTMF), opportunistic metadata attachment, and the media health
//! watchdog.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::call::{CallDirection, CallId, CallInfo, CallState};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventPriority, Notice, NoticeKind};
use crate::metadata::CallMetadata;
use crate::phone::normalize_number;
use crate::provider::OutboundParams;

use super::recovery::with_timeout;
use super::{ActiveCall, SessionController};

/// DTMF characters the provider accepts: digits, `*`, `#`, `A`–`D`, and the
/// pause characters `w` and `,`
fn valid_digits(digits: &str) -> bool {
    !digits.is_empty()
        && digits.chars().all(|c| {
            c.is_ascii_digit() || matches!(c, '*' | '#' | 'w' | ',') || ('a'..='d').contains(&c.to_ascii_lowercase())
        })
}

impl SessionController {
    /// Place an outbound call
    ///
    /// Requires a registered endpoint. When the endpoint is not ready, this
    /// probes microphone permission and, on success, kicks off initialization
    /// and returns `Ok(None)` without placing the call — the caller retries
    /// once the controller reports ready. An unnormalizable destination fails
    /// fast before anything else happens.
    ///
    /// Caller-supplied `metadata` takes precedence over a directory lookup;
    /// without it, resolution runs concurrently with call setup and attaches
    /// whenever it completes.
    pub async fn connect(
        self: &Arc<Self>,
        to: &str,
        from: Option<&str>,
        metadata: Option<CallMetadata>,
    ) -> ClientResult<Option<CallId>> {
        let destination = normalize_number(to)?;
        let caller_id = match from.or(self.config.default_caller_id.as_deref()) {
            Some(raw) => Some(normalize_number(raw)?),
            None => None,
        };

        if !self.is_ready().await {
            // Past the reconnect ceiling nothing self-heals; fail fast
            // instead of kicking yet another initialization
            if self.reconnect.lock().unwrap().exhausted() {
                return Err(ClientError::ReconnectCeilingReached {
                    attempts: self.config.backoff.max_attempts,
                });
            }
            self.ensure_microphone().await?;
            info!(destination = %destination, "Endpoint not ready, initializing before calls can be placed");
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = controller.initialize().await {
                    warn!(error = %e, "Initialization triggered by connect failed");
                }
            });
            return Ok(None);
        }

        if self.active_call.read().await.is_some() {
            return Err(ClientError::CallSetupFailed {
                reason: "another call is already in progress".to_string(),
            });
        }

        let endpoint = self.endpoint.read().await.clone().ok_or_else(|| {
            ClientError::InternalError {
                message: "endpoint registered but no handle present".to_string(),
            }
        })?;

        // Hardware can change between calls; re-apply the device policy now
        self.audio_selector
            .apply_defaults(endpoint.audio().as_ref())
            .await;

        let handle = with_timeout(
            "outbound_connect",
            self.config.signaling_timeout,
            endpoint.connect(OutboundParams {
                to: destination.clone(),
                from: caller_id,
            }),
        )
        .await
        .map_err(|e| ClientError::CallSetupFailed {
            reason: e.to_string(),
        })?;

        let mut info = CallInfo::new(CallDirection::Outbound, destination.clone());
        let call_id = info.call_id;
        if let Some(metadata) = metadata {
            info.metadata = Some(metadata);
        }
        let needs_lookup = info.metadata.is_none();

        self.call_registry.insert(call_id, info);
        *self.active_call.write().await = Some(ActiveCall { call_id, handle });
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        info!(call_id = %call_id, destination = %destination, "Outbound call dialing");
        self.emit_call_state(call_id, CallState::Dialing, None, Some("call created"))
            .await;

        if needs_lookup {
            self.spawn_metadata_lookup(call_id, destination);
        }
        Ok(Some(call_id))
    }

    /// Accept the currently offered inbound call
    pub async fn accept_call(self: &Arc<Self>) -> ClientResult<()> {
        let (call_id, handle) = {
            let guard = self.active_call.read().await;
            match guard.as_ref() {
                Some(active) => (active.call_id, active.handle.clone()),
                None => {
                    return Err(ClientError::CallSetupFailed {
                        reason: "no inbound call is being offered".to_string(),
                    })
                }
            }
        };
        let state = self.get_call(&call_id)?.state;
        if state != CallState::OfferedToUser {
            return Err(ClientError::CallSetupFailed {
                reason: format!("call is {}, not awaiting acceptance", state),
            });
        }

        // Device policy again: hardware may have changed while ringing
        if let Some(endpoint) = self.endpoint.read().await.clone() {
            self.audio_selector
                .apply_defaults(endpoint.audio().as_ref())
                .await;
        }

        with_timeout(
            "inbound_accept",
            self.config.signaling_timeout,
            handle.accept(),
        )
        .await
        .map_err(|e| ClientError::CallSetupFailed {
            reason: e.to_string(),
        })?;

        info!(call_id = %call_id, "Inbound call accepted");
        self.transition_call(call_id, CallState::Ringing, Some("accepted locally"))
            .await;
        Ok(())
    }

    /// Reject the currently offered inbound call
    pub async fn reject_call(&self) -> ClientResult<()> {
        let (call_id, handle) = {
            let guard = self.active_call.read().await;
            match guard.as_ref() {
                Some(active) => (active.call_id, active.handle.clone()),
                None => return Ok(()),
            }
        };
        if self.get_call(&call_id)?.state != CallState::OfferedToUser {
            return Ok(());
        }
        if let Err(e) = handle.reject().await {
            warn!(call_id = %call_id, error = %e, "Provider reject failed");
        }
        self.finish_call(call_id, CallState::Ended, Some("rejected by user"))
            .await;
        Ok(())
    }

    /// Hang up the active call; no-op when there is none
    pub async fn disconnect(&self) {
        let handle = {
            let guard = self.active_call.read().await;
            match guard.as_ref() {
                Some(active) => (active.call_id, active.handle.clone()),
                None => {
                    debug!("disconnect() with no active call, ignoring");
                    return;
                }
            }
        };
        let (call_id, call_handle) = handle;
        call_handle.disconnect().await;
        self.finish_call(call_id, CallState::Ended, Some("local disconnect"))
            .await;
    }

    /// Send DTMF digits on the active call; no-op when there is none
    pub async fn send_digits(&self, digits: &str) -> ClientResult<()> {
        let handle = {
            let guard = self.active_call.read().await;
            match guard.as_ref() {
                Some(active) => active.handle.clone(),
                None => {
                    debug!("send_digits() with no active call, ignoring");
                    return Ok(());
                }
            }
        };
        if !valid_digits(digits) {
            return Err(ClientError::InvalidDigits {
                digits: digits.to_string(),
            });
        }
        handle.send_digits(digits).await
    }

    /// Mute or unmute the active call; no-op when there is none
    ///
    /// While the call is still being established the request is queued
    /// silently and applied once the call connects.
    pub async fn mute(&self, muted: bool) -> ClientResult<()> {
        let (call_id, handle) = {
            let guard = self.active_call.read().await;
            match guard.as_ref() {
                Some(active) => (active.call_id, active.handle.clone()),
                None => {
                    debug!("mute() with no active call, ignoring");
                    return Ok(());
                }
            }
        };

        let state = self.get_call(&call_id)?.state;
        if state != CallState::Connected {
            debug!(call_id = %call_id, state = %state, muted, "Queueing mute until call connects");
            if let Some(mut entry) = self.call_registry.get_mut(&call_id) {
                entry.pending_mute = Some(muted);
            }
            return Ok(());
        }

        handle.set_muted(muted).await?;
        // Mirror locally so the UI state matches without a round trip
        if let Some(mut entry) = self.call_registry.get_mut(&call_id) {
            entry.muted = muted;
        }
        Ok(())
    }

    /// Resolve metadata concurrently with call setup and attach on completion
    pub(crate) fn spawn_metadata_lookup(self: &Arc<Self>, call_id: CallId, number: String) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let metadata = controller.resolver.resolve(&number).await;
            controller.attach_metadata(call_id, metadata).await;
        });
    }

    /// Attach resolved metadata to a call that is still live
    ///
    /// Cancellation-by-state-check: a result landing after the call ended (or
    /// was superseded) is discarded, and metadata already attached (for
    /// instance caller-supplied) is never replaced.
    pub(crate) async fn attach_metadata(&self, call_id: CallId, metadata: CallMetadata) {
        let still_active = self
            .active_call
            .read()
            .await
            .as_ref()
            .map(|active| active.call_id == call_id)
            .unwrap_or(false);
        if !still_active {
            debug!(call_id = %call_id, "Discarding metadata for a call that no longer exists");
            return;
        }
        let attached = match self.call_registry.get_mut(&call_id) {
            Some(mut entry) => {
                if entry.state.is_final() || entry.metadata.is_some() {
                    false
                } else {
                    entry.metadata = Some(metadata.clone());
                    true
                }
            }
            None => false,
        };
        if attached {
            self.emit(ClientEvent::MetadataResolved { call_id, metadata })
                .await;
        }
    }

    /// Transition the active call and emit the change
    pub(crate) async fn transition_call(
        &self,
        call_id: CallId,
        new_state: CallState,
        reason: Option<&str>,
    ) {
        let previous = match self.call_registry.get_mut(&call_id) {
            Some(mut entry) => {
                let previous = entry.state;
                entry.state = new_state;
                if new_state == CallState::Connected {
                    entry.connected_at = Some(Utc::now());
                }
                if let Some(reason) = reason {
                    entry.reason = Some(reason.to_string());
                }
                Some(previous)
            }
            None => None,
        };
        let Some(previous) = previous else { return };
        if previous == new_state {
            return;
        }
        self.emit_call_state(call_id, new_state, Some(previous), reason)
            .await;
    }

    /// Move a call to a final state, release the active slot, and stop the
    /// watchdog
    pub(crate) async fn finish_call(
        &self,
        call_id: CallId,
        final_state: CallState,
        reason: Option<&str>,
    ) {
        {
            let mut guard = self.active_call.write().await;
            match guard.as_ref() {
                Some(active) if active.call_id == call_id => {
                    *guard = None;
                }
                _ => {
                    debug!(call_id = %call_id, "finish_call for a call that is not active, ignoring");
                    return;
                }
            }
        }
        self.watchdog_timer.cancel();

        let previous = self.call_registry.get_mut(&call_id).map(|mut entry| {
            let previous = entry.state;
            entry.state = final_state;
            entry.ended_at = Some(Utc::now());
            if let Some(reason) = reason {
                entry.reason = Some(reason.to_string());
            }
            previous
        });

        info!(call_id = %call_id, state = %final_state, reason = reason.unwrap_or(""), "Call finished");
        self.emit_call_state(call_id, final_state, previous, reason)
            .await;
    }

    /// Forcibly end whatever call is active (endpoint destruction, network
    /// loss, supersession)
    pub(crate) async fn force_end_active_call(&self, reason: &str) {
        let call_id = self.active_call.read().await.as_ref().map(|c| c.call_id);
        if let Some(call_id) = call_id {
            warn!(call_id = %call_id, reason = reason, "Force-ending active call");
            self.finish_call(call_id, CallState::Ended, Some(reason))
                .await;
        }
    }

    pub(crate) async fn emit_call_state(
        &self,
        call_id: CallId,
        new_state: CallState,
        previous_state: Option<CallState>,
        reason: Option<&str>,
    ) {
        self.emit(ClientEvent::CallStateChanged {
            info: crate::events::CallStatusInfo {
                call_id,
                new_state,
                previous_state,
                reason: reason.map(String::from),
                timestamp: Utc::now(),
            },
            priority: EventPriority::Normal,
        })
        .await;
    }

    /// Start the media health watchdog for a connected call
    ///
    /// A few-second cadence while the call stays open. Sustained zero input
    /// level while unmuted points at failed hardware; the watchdog logs the
    /// diagnostic and keeps the call running — it is advisory only.
    pub(crate) fn arm_watchdog(self: &Arc<Self>, call_id: CallId) {
        let controller = Arc::clone(self);
        let interval = self.config.watchdog_interval;
        let silence_ticks = self.config.watchdog_silence_ticks;
        self.watchdog_timer.arm(tokio::spawn(async move {
            let mut zero_ticks: u32 = 0;
            let mut warned = false;
            loop {
                tokio::time::sleep(interval).await;

                let handle = {
                    let guard = controller.active_call.read().await;
                    match guard.as_ref() {
                        Some(active) if active.call_id == call_id => active.handle.clone(),
                        _ => break,
                    }
                };
                let call = match controller.call_registry.get(&call_id) {
                    Some(entry) => entry.value().clone(),
                    None => break,
                };
                if call.state != CallState::Connected {
                    break;
                }
                if call.muted {
                    zero_ticks = 0;
                    continue;
                }

                match handle.input_audio_level().await {
                    Some(level) if level <= f32::EPSILON => {
                        zero_ticks += 1;
                        if zero_ticks >= silence_ticks && !warned {
                            warn!(
                                call_id = %call_id,
                                ticks = zero_ticks,
                                "Sustained zero input audio level while unmuted; microphone hardware may have failed"
                            );
                            warned = true;
                        }
                    }
                    Some(_) => {
                        zero_ticks = 0;
                        warned = false;
                    }
                    None => {}
                }
            }
        }));
    }

    /// Apply a mute queued while the call was being established
    pub(crate) async fn apply_pending_mute(&self, call_id: CallId) {
        let pending = self
            .call_registry
            .get_mut(&call_id)
            .and_then(|mut entry| entry.pending_mute.take());
        let Some(muted) = pending else { return };

        let handle = {
            let guard = self.active_call.read().await;
            match guard.as_ref() {
                Some(active) if active.call_id == call_id => active.handle.clone(),
                _ => return,
            }
        };
        match handle.set_muted(muted).await {
            Ok(()) => {
                if let Some(mut entry) = self.call_registry.get_mut(&call_id) {
                    entry.muted = muted;
                }
            }
            Err(e) => warn!(call_id = %call_id, error = %e, "Applying queued mute failed"),
        }
    }

    /// Surface a call-level error as a transient notice
    pub(crate) async fn notify_call_error(&self, message: String) {
        self.emit(ClientEvent::NoticeRaised {
            notice: Notice::transient(NoticeKind::CallError, message),
            priority: EventPriority::High,
        })
        .await;
    }
}
