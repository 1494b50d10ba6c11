//! Type definitions for the session controller
//!
//! Endpoint lifecycle states, the UI-facing snapshot, aggregate statistics,
//! and the external lifecycle signals the controller reacts to.

use serde::{Deserialize, Serialize};

use crate::call::CallInfo;

/// State of the controller's telephony endpoint
///
/// # State Transitions
///
/// `Uninitialized → Initializing → Registered`, with
/// `Registered → Faulted → Initializing` driven by the reconnection policy.
/// `Destroyed` is terminal for the endpoint it describes; external recovery
/// triggers may later construct a fresh endpoint, which starts the machine
/// over at `Initializing`.
///
/// # Examples
///
/// ```rust
/// use softphone_core::controller::types::EndpointState;
///
/// let state = EndpointState::Registered;
/// assert!(state.is_registered());
/// assert_eq!(state.to_string(), "Registered");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointState {
    /// No endpoint has been created yet
    Uninitialized,
    /// Credential obtained, endpoint constructed, registration in flight
    Initializing,
    /// The provider confirmed registration; calls can be placed and received
    Registered,
    /// The provider reported a recoverable fault; reconnection is in progress
    /// or pending
    Faulted,
    /// The endpoint was torn down
    Destroyed,
}

impl EndpointState {
    /// Whether the endpoint is registered and ready for calls
    pub fn is_registered(&self) -> bool {
        matches!(self, EndpointState::Registered)
    }
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointState::Uninitialized => write!(f, "Uninitialized"),
            EndpointState::Initializing => write!(f, "Initializing"),
            EndpointState::Registered => write!(f, "Registered"),
            EndpointState::Faulted => write!(f, "Faulted"),
            EndpointState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// External lifecycle signals fed into the controller
///
/// These originate from the hosting environment (network status, tab
/// visibility, hardware change notifications) and are handled
/// deterministically: each signal maps to exactly one recovery or
/// notification path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Network connectivity was lost
    NetworkOffline,
    /// Network connectivity returned
    NetworkOnline,
    /// The tab or window became visible again
    TabVisible,
    /// Audio hardware was added or removed
    AudioDevicesChanged,
}

/// Point-in-time view of the controller for the presentation layer
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    /// Whether the endpoint is registered and ready for calls
    pub is_ready: bool,
    /// Current endpoint lifecycle state
    pub endpoint_state: EndpointState,
    /// The in-progress call, if any (includes attached metadata)
    pub current_call: Option<CallInfo>,
}

/// Aggregate statistics about the controller's activity
#[derive(Debug, Clone)]
pub struct ControllerStats {
    /// Whether the endpoint is registered and ready for calls
    pub is_ready: bool,
    /// Current endpoint lifecycle state
    pub endpoint_state: EndpointState,
    /// Calls handled since the controller was created (both directions)
    pub total_calls: u64,
    /// Successful registrations since the controller was created
    pub total_registrations: u64,
    /// Consecutive recoverable faults since the last successful registration
    pub reconnect_attempt: u32,
    /// Whether a credential refresh timer is armed
    pub refresh_timer_armed: bool,
    /// Whether a reconnection timer is pending
    pub reconnect_timer_armed: bool,
}
