//! Error types for the telephony session controller
//!
//! This module defines the error taxonomy used across the crate. Errors fall
//! into five families with distinct handling policies:
//!
//! - **Permission errors** — microphone denied or unavailable; user-actionable,
//!   surfaced once per attempt, never silently retried.
//! - **Auth/transport faults** — credential fetch failures and provider faults
//!   whose code is in the configured recoverable set; retried via backoff up to
//!   the attempt ceiling, then terminal.
//! - **Call-level errors** — failures of an individual call; end that call only
//!   and are surfaced as transient notifications.
//! - **Metadata errors** — never constructed as user-facing errors; the resolver
//!   swallows them and reports `NoMatch`.
//! - **Fatal/terminal** — the reconnect ceiling was reached; requires a
//!   user-initiated reload.
//!
//! `ClientError::is_recoverable()` drives the reconnect path, and
//! `ClientError::category()` tags structured log records.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors produced by the session controller and its collaborators
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The user explicitly denied microphone access
    #[error("Microphone access was denied by the user")]
    MicrophoneDenied,

    /// Microphone access failed for a reason other than explicit denial
    #[error("Microphone is unavailable: {reason}")]
    MicrophoneUnavailable {
        /// What the media layer reported (missing API, no device, hardware error)
        reason: String,
    },

    /// The credential endpoint failed or returned a response without a token
    #[error("Credential fetch failed: {reason}")]
    AuthFetchFailed {
        /// Why the fetch failed
        reason: String,
    },

    /// An in-place credential renewal was rejected by the provider endpoint
    #[error("Credential renewal failed: {reason}")]
    CredentialRenewalFailed {
        /// Why the renewal failed
        reason: String,
    },

    /// A destination or caller-id could not be normalized to a canonical number
    #[error("Invalid phone number '{input}': {reason}")]
    InvalidPhoneNumber {
        /// The input as supplied by the caller
        input: String,
        /// Why normalization rejected it
        reason: String,
    },

    /// DTMF digits contained characters outside the sendable set
    #[error("Invalid DTMF digits '{digits}'")]
    InvalidDigits {
        /// The rejected digit string
        digits: String,
    },

    /// An outbound call could not be set up
    #[error("Call setup failed: {reason}")]
    CallSetupFailed {
        /// Why setup failed
        reason: String,
    },

    /// No call with the given id exists in the registry
    #[error("Call {call_id} not found")]
    CallNotFound {
        /// The unknown call id
        call_id: uuid::Uuid,
    },

    /// The provider signaled a fault, either endpoint- or call-level
    #[error("Provider fault {code}: {message}")]
    ProviderFault {
        /// Provider-specific numeric fault code
        code: u32,
        /// Provider-supplied description
        message: String,
    },

    /// The reconnection ceiling was reached without a successful registration
    #[error("Connection could not be re-established after {attempts} attempts")]
    ReconnectCeilingReached {
        /// How many attempts were made before giving up
        attempts: u32,
    },

    /// A network-level failure outside any specific provider fault code
    #[error("Network error: {reason}")]
    NetworkError {
        /// What failed
        reason: String,
    },

    /// An operation exceeded its deadline
    #[error("Operation timed out after {duration_ms}ms")]
    OperationTimeout {
        /// The deadline that was exceeded, in milliseconds
        duration_ms: u64,
    },

    /// Configuration was rejected during validation
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// The offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Internal invariant violation or unclassified failure
    #[error("Internal error: {message}")]
    InternalError {
        /// Description of what went wrong
        message: String,
    },
}

impl ClientError {
    /// Whether this error is safe to retry via the reconnection path
    ///
    /// Recoverable errors feed the backoff state machine; everything else is
    /// surfaced and left alone. Note that provider faults are classified by
    /// code against the configured recoverable set *before* they become
    /// `ProviderFault` values, so the variant itself is not retried here.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::NetworkError { .. }
                | ClientError::OperationTimeout { .. }
                | ClientError::AuthFetchFailed { .. }
        )
    }

    /// Whether this error requires a user action to resolve
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ClientError::MicrophoneDenied
                | ClientError::MicrophoneUnavailable { .. }
                | ClientError::InvalidPhoneNumber { .. }
                | ClientError::ReconnectCeilingReached { .. }
        )
    }

    /// Stable category tag for structured logging
    ///
    /// # Examples
    ///
    /// ```rust
    /// use softphone_core::error::ClientError;
    ///
    /// let err = ClientError::MicrophoneDenied;
    /// assert_eq!(err.category(), "permission");
    ///
    /// let err = ClientError::AuthFetchFailed { reason: "503".to_string() };
    /// assert_eq!(err.category(), "auth");
    /// ```
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::MicrophoneDenied | ClientError::MicrophoneUnavailable { .. } => {
                "permission"
            }
            ClientError::AuthFetchFailed { .. } | ClientError::CredentialRenewalFailed { .. } => {
                "auth"
            }
            ClientError::InvalidPhoneNumber { .. }
            | ClientError::InvalidDigits { .. }
            | ClientError::CallSetupFailed { .. }
            | ClientError::CallNotFound { .. } => "call",
            ClientError::ProviderFault { .. } => "provider",
            ClientError::ReconnectCeilingReached { .. } => "terminal",
            ClientError::NetworkError { .. } | ClientError::OperationTimeout { .. } => "network",
            ClientError::InvalidConfiguration { .. } => "configuration",
            ClientError::InternalError { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_matches_taxonomy() {
        assert!(ClientError::NetworkError { reason: "down".into() }.is_recoverable());
        assert!(ClientError::AuthFetchFailed { reason: "503".into() }.is_recoverable());
        assert!(!ClientError::MicrophoneDenied.is_recoverable());
        assert!(!ClientError::ReconnectCeilingReached { attempts: 5 }.is_recoverable());
    }

    #[test]
    fn terminal_failure_is_user_actionable() {
        assert!(ClientError::ReconnectCeilingReached { attempts: 5 }.is_user_actionable());
        assert!(!ClientError::NetworkError { reason: "down".into() }.is_user_actionable());
    }
}
