//! Call types for the session controller
//!
//! This module defines the identifiers, state machine states, and record types
//! for the single in-progress call and the in-memory call registry.
//!
//! # Call State Machine
//!
//! Outbound:
//! `Dialing → Ringing → Connected → Ended`, with `Errored` reachable from any
//! non-final state on a provider call error.
//!
//! Inbound:
//! `OfferedToUser → Ringing → Connected → Ended`, where `OfferedToUser` covers
//! the window in which the user may accept or reject, and the transition to
//! `Ringing` happens once the local side accepts and the provider is
//! establishing media. An offer that is cancelled, times out, or arrives while
//! the application is not in a call-relevant context goes straight to `Ended`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::CallMetadata;

/// Unique identifier for a call
pub type CallId = uuid::Uuid;

/// Direction of a call relative to this endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Call placed by this endpoint
    Outbound,
    /// Call offered to this endpoint by the provider
    Inbound,
}

/// State of a single call
///
/// # Examples
///
/// ```rust
/// use softphone_core::call::CallState;
///
/// let state = CallState::Connected;
/// assert!(state.is_active());
/// assert!(!state.is_final());
/// assert_eq!(state.to_string(), "Connected");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Outbound call is being set up with the provider
    Dialing,
    /// Inbound call is waiting for the user to accept or reject
    OfferedToUser,
    /// Call is being established (remote ringing, or local accept in flight)
    Ringing,
    /// Media is flowing in both directions
    Connected,
    /// Call finished normally (hangup, cancel, or forced teardown)
    Ended,
    /// Call finished due to a provider call error
    Errored,
}

impl CallState {
    /// Whether the call still exists from the controller's point of view
    pub fn is_active(&self) -> bool {
        !self.is_final()
    }

    /// Whether this is a final state
    pub fn is_final(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Errored)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Dialing => write!(f, "Dialing"),
            CallState::OfferedToUser => write!(f, "OfferedToUser"),
            CallState::Ringing => write!(f, "Ringing"),
            CallState::Connected => write!(f, "Connected"),
            CallState::Ended => write!(f, "Ended"),
            CallState::Errored => write!(f, "Errored"),
        }
    }
}

/// Record of a call, live or historical
///
/// One `CallInfo` exists per call in the controller's registry. The record for
/// the active call is updated in place as the call progresses; ended calls are
/// retained in memory for history queries.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Unique call identifier assigned by the controller
    pub call_id: CallId,
    /// Whether the call was placed or received
    pub direction: CallDirection,
    /// Current (or final) state
    pub state: CallState,
    /// Normalized remote phone number
    pub remote_address: String,
    /// Best-effort identity enrichment; may attach at any point in the
    /// call's life, including after the state has already changed
    pub metadata: Option<CallMetadata>,
    /// Whether the microphone is muted for this call
    pub muted: bool,
    /// Mute request received before the call connected, applied on accept
    pub pending_mute: Option<bool>,
    /// When the call record was created
    pub created_at: DateTime<Utc>,
    /// When the call reached `Connected`, if it did
    pub connected_at: Option<DateTime<Utc>>,
    /// When the call reached a final state, if it has
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the call reached its current state, when known
    pub reason: Option<String>,
}

impl CallInfo {
    /// Create a record for a new call in its initial state
    pub fn new(direction: CallDirection, remote_address: String) -> Self {
        let state = match direction {
            CallDirection::Outbound => CallState::Dialing,
            CallDirection::Inbound => CallState::OfferedToUser,
        };
        Self {
            call_id: uuid::Uuid::new_v4(),
            direction,
            state,
            remote_address,
            metadata: None,
            muted: false,
            pending_mute: None,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            reason: None,
        }
    }
}
