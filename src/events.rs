//! Event surface for the session controller
//!
//! Consumers observe the controller in two ways, fed by a single emit path:
//!
//! - **Broadcast subscription** — `SessionController::subscribe()` returns a
//!   `tokio::sync::broadcast` receiver of [`ClientEvent`], suitable for a
//!   reactive UI layer.
//! - **Registered handler** — an optional [`ClientEventHandler`] receives the
//!   same events as async callbacks.
//!
//! Events carry an [`EventPriority`]; terminal failures arrive as a sticky
//! [`Notice`] that the presentation layer must not auto-dismiss.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::{CallId, CallState};
use crate::controller::types::EndpointState;
use crate::metadata::CallMetadata;

/// Priority hint for event presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    /// Routine state bookkeeping
    Low,
    /// Normal call/endpoint progress
    Normal,
    /// Needs user attention soon (incoming call, device change mid-call)
    High,
    /// Needs user attention now (terminal failure)
    Critical,
}

/// Information about a call state transition
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    /// Call that changed state
    pub call_id: CallId,
    /// New state after the transition
    pub new_state: CallState,
    /// State before the transition, if the call existed before
    pub previous_state: Option<CallState>,
    /// Why the transition happened, when known
    pub reason: Option<String>,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about an inbound call offer surfaced to the user
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    /// Call identifier for use with `accept_call` / `reject_call`
    pub call_id: CallId,
    /// Normalized caller number
    pub remote_address: String,
    /// Enrichment metadata, if it has already resolved
    pub metadata: Option<CallMetadata>,
    /// When the offer was received
    pub offered_at: DateTime<Utc>,
}

/// Information about an endpoint lifecycle transition
#[derive(Debug, Clone)]
pub struct EndpointStatusInfo {
    /// State before the transition
    pub previous_state: EndpointState,
    /// State after the transition
    pub new_state: EndpointState,
    /// Why the transition happened, when known
    pub reason: Option<String>,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Classification of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Microphone permission problem; user must change browser settings
    MicrophonePermission,
    /// Reconnection gave up; user must reload to resume service
    TerminalFailure,
    /// An individual call failed
    CallError,
    /// The provider reported a fault that will not be auto-retried
    ProviderFault,
    /// Audio hardware changed while a call was active
    AudioDevicesChanged,
    /// Network connectivity was lost
    NetworkLost,
}

/// A user-facing notification
#[derive(Debug, Clone)]
pub struct Notice {
    /// What kind of notice this is
    pub kind: NoticeKind,
    /// Human-readable message for display
    pub message: String,
    /// Sticky notices must not auto-dismiss (terminal failures)
    pub sticky: bool,
    /// When the notice was raised
    pub timestamp: DateTime<Utc>,
}

impl Notice {
    /// Build a transient (auto-dismissable) notice
    pub fn transient(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sticky: false,
            timestamp: Utc::now(),
        }
    }

    /// Build a sticky notice that the UI must keep until user action
    pub fn sticky(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sticky: true,
            timestamp: Utc::now(),
        }
    }
}

/// Events emitted by the session controller
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The endpoint moved between lifecycle states
    EndpointStateChanged {
        /// Transition details
        info: EndpointStatusInfo,
        /// Presentation priority
        priority: EventPriority,
    },
    /// A call moved between states
    CallStateChanged {
        /// Transition details
        info: CallStatusInfo,
        /// Presentation priority
        priority: EventPriority,
    },
    /// An inbound call is waiting for the user's decision
    IncomingCall {
        /// Offer details
        info: IncomingCallInfo,
        /// Presentation priority
        priority: EventPriority,
    },
    /// A metadata lookup completed and was attached to a live call
    MetadataResolved {
        /// Call the metadata was attached to
        call_id: CallId,
        /// The resolved metadata
        metadata: CallMetadata,
    },
    /// A user-facing notice
    NoticeRaised {
        /// The notice
        notice: Notice,
        /// Presentation priority
        priority: EventPriority,
    },
}

/// Async callbacks for applications that prefer a handler over a subscription
///
/// All methods have empty default bodies so implementations only override what
/// they care about. Incoming offers are notification-only: the decision is made
/// later through `accept_call` / `reject_call`, matching the offer window in
/// the call state machine.
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// An inbound call reached `OfferedToUser`
    async fn on_incoming_call(&self, _info: IncomingCallInfo) {}

    /// A call changed state
    async fn on_call_state_changed(&self, _info: CallStatusInfo) {}

    /// The endpoint changed state
    async fn on_endpoint_state_changed(&self, _info: EndpointStatusInfo) {}

    /// Metadata resolved for a live call
    async fn on_metadata_resolved(&self, _call_id: CallId, _metadata: CallMetadata) {}

    /// A user-facing notice was raised
    async fn on_notice(&self, _notice: Notice) {}
}
