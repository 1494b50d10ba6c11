//! Provider event dispatch
//!
//! One pump task per endpoint drains the provider's event channel and maps
//! every event kind to exactly one handler, so coverage is checked by the
//! compiler. Each pump is tagged with the endpoint generation it was created
//! for; events from a superseded endpoint are dropped.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::call::{CallDirection, CallInfo, CallState};
use crate::events::{ClientEvent, EventPriority, IncomingCallInfo, Notice, NoticeKind};
use crate::phone::normalize_number;
use crate::provider::{CallEvent, IncomingOffer, ProviderEvent};

use super::types::EndpointState;
use super::{ActiveCall, SessionController};

/// Drain provider events for one endpoint generation
pub(crate) async fn run_event_pump(
    controller: Arc<SessionController>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<ProviderEvent>,
) {
    debug!(generation, "Provider event pump started");
    while let Some(event) = events.recv().await {
        if controller.endpoint_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Endpoint superseded, dropping event and stopping pump");
            break;
        }
        match event {
            ProviderEvent::Registered => controller.on_registered().await,
            ProviderEvent::TokenWillExpire => {
                info!("Provider signaled credential expiry, renewing now");
                // Renewal may reconstruct the endpoint, which cancels this
                // pump; run it detached so that cannot cut the renewal short
                let renewer = Arc::clone(&controller);
                tokio::spawn(async move {
                    if let Err(e) = renewer.refresh_credential().await {
                        warn!(error = %e, "Renewal triggered by provider failed");
                    }
                });
            }
            ProviderEvent::Fault { code, message } => {
                controller.on_endpoint_fault(code, message).await
            }
            ProviderEvent::Incoming(offer) => controller.on_incoming_offer(offer).await,
            ProviderEvent::Call(call_event) => controller.on_call_event(call_event).await,
        }
    }
    debug!(generation, "Provider event pump stopped");
}

impl SessionController {
    /// The provider confirmed registration
    pub(crate) async fn on_registered(self: &Arc<Self>) {
        self.total_registrations.fetch_add(1, Ordering::SeqCst);
        {
            self.reconnect.lock().unwrap().reset();
        }
        self.reconnect_timer.cancel();
        self.transition_endpoint(EndpointState::Registered, Some("provider registered"))
            .await;
    }

    /// The provider reported an endpoint-level fault
    ///
    /// Codes in the configured recoverable set feed the backoff policy; all
    /// others are logged and surfaced without an automatic retry.
    pub(crate) async fn on_endpoint_fault(self: &Arc<Self>, code: u32, message: String) {
        if self.config.is_recoverable_fault(code) {
            warn!(code, message = %message, "Recoverable provider fault");
            self.transition_endpoint(
                EndpointState::Faulted,
                Some(&format!("provider fault {}", code)),
            )
            .await;
            self.schedule_reconnect().await;
        } else {
            error!(code, message = %message, "Non-recoverable provider fault");
            self.emit(ClientEvent::NoticeRaised {
                notice: Notice::transient(
                    NoticeKind::ProviderFault,
                    format!("Phone service error {}: {}", code, message),
                ),
                priority: EventPriority::High,
            })
            .await;
        }
    }

    /// The provider offered an inbound call
    ///
    /// Offers are rejected before reaching the user when the application is
    /// not in a call-relevant context or another call is already active.
    pub(crate) async fn on_incoming_offer(self: &Arc<Self>, offer: IncomingOffer) {
        if !self.call_context_active.load(Ordering::SeqCst) {
            info!(from = %offer.from, "Inbound offer outside call context, rejecting");
            if let Err(e) = offer.call.reject().await {
                debug!(error = %e, "Reject of out-of-context offer failed");
            }
            return;
        }
        if self.active_call.read().await.is_some() {
            info!(from = %offer.from, "Inbound offer while busy, rejecting");
            if let Err(e) = offer.call.reject().await {
                debug!(error = %e, "Reject of offer while busy failed");
            }
            return;
        }

        let remote_address = normalize_number(&offer.from).unwrap_or_else(|_| offer.from.clone());
        let info = CallInfo::new(CallDirection::Inbound, remote_address.clone());
        let call_id = info.call_id;

        self.call_registry.insert(call_id, info);
        *self.active_call.write().await = Some(ActiveCall {
            call_id,
            handle: offer.call,
        });
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        info!(call_id = %call_id, from = %remote_address, "Inbound call offered to user");
        self.spawn_metadata_lookup(call_id, remote_address.clone());
        self.emit(ClientEvent::IncomingCall {
            info: IncomingCallInfo {
                call_id,
                remote_address,
                metadata: None,
                offered_at: Utc::now(),
            },
            priority: EventPriority::High,
        })
        .await;
    }

    /// The provider reported a call-level event
    pub(crate) async fn on_call_event(self: &Arc<Self>, event: CallEvent) {
        let call_id = match self.active_call.read().await.as_ref() {
            Some(active) => active.call_id,
            None => {
                debug!(event = ?event, "Call event with no active call, dropping");
                return;
            }
        };
        match event {
            CallEvent::Ringing => {
                self.transition_call(call_id, CallState::Ringing, Some("remote ringing"))
                    .await;
            }
            CallEvent::Accepted => {
                self.transition_call(call_id, CallState::Connected, Some("call answered"))
                    .await;
                self.apply_pending_mute(call_id).await;
                self.arm_watchdog(call_id);
            }
            CallEvent::Disconnected => {
                self.finish_call(call_id, CallState::Ended, Some("remote disconnect"))
                    .await;
            }
            CallEvent::Canceled => {
                self.finish_call(call_id, CallState::Ended, Some("caller canceled"))
                    .await;
            }
            CallEvent::Failed { code, message } => {
                warn!(call_id = %call_id, code, message = %message, "Call failed");
                self.finish_call(
                    call_id,
                    CallState::Errored,
                    Some(&format!("call error {}: {}", code, message)),
                )
                .await;
                self.notify_call_error(format!("Call failed ({}): {}", code, message))
                    .await;
            }
        }
    }
}
