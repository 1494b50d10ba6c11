//! Configuration for the session controller
//!
//! All tunable behavior lives here: provider endpoint parameters, credential
//! lease timing, reconnection backoff, the media watchdog cadence, and the
//! provider fault codes treated as recoverable.
//!
//! # Usage Examples
//!
//! ```rust
//! use softphone_core::controller::config::ControllerConfig;
//! use std::time::Duration;
//!
//! let config = ControllerConfig::default()
//!     .with_signaling_region("eu1")
//!     .with_refresh_lead(Duration::from_secs(15 * 60))
//!     .with_default_caller_id("+12025550100");
//!
//! assert_eq!(config.signaling_region, "eu1");
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashSet;
use std::time::Duration;

use crate::controller::recovery::BackoffConfig;
use crate::error::{ClientError, ClientResult};
use crate::provider::EndpointConfig;

/// Provider fault codes treated as recoverable by default
///
/// These cover the expired/invalid-credential and lost-transport classes.
/// They are provider-specific and not assumed stable across SDK versions,
/// which is why the live set is configuration rather than a hard-coded match.
pub const DEFAULT_RECOVERABLE_FAULT_CODES: &[u32] = &[
    20104, // access token expired
    31003, // connection error
    31005, // signaling websocket closed
    31009, // transport unavailable
    31205, // token rejected as expired
];

/// Configuration for [`SessionController`](crate::controller::SessionController)
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Codec preference order handed to the provider
    pub codec_preferences: Vec<String>,
    /// Provider signaling region
    pub signaling_region: String,
    /// Deadline for provider signaling operations (endpoint creation,
    /// outbound connect, inbound accept); also bounds the inbound ring window
    pub signaling_timeout: Duration,
    /// Assumed natural lifetime of a fetched credential
    pub credential_ttl: Duration,
    /// How far before expiry the proactive renewal runs
    pub refresh_lead: Duration,
    /// Delay before retrying a failed in-place renewal while a call is live
    pub refresh_retry_delay: Duration,
    /// Reconnection backoff parameters
    pub backoff: BackoffConfig,
    /// Cadence of the media health watchdog while a call is connected
    pub watchdog_interval: Duration,
    /// Consecutive zero-level observations before the watchdog logs its
    /// diagnostic
    pub watchdog_silence_ticks: u32,
    /// Provider fault codes that trigger reconnection instead of surfacing
    pub recoverable_fault_codes: HashSet<u32>,
    /// Caller id applied to outbound calls when the caller supplies none
    pub default_caller_id: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            codec_preferences: vec!["opus".to_string(), "pcmu".to_string()],
            signaling_region: "us1".to_string(),
            signaling_timeout: Duration::from_secs(30),
            credential_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_lead: Duration::from_secs(20 * 60),
            refresh_retry_delay: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
            watchdog_interval: Duration::from_secs(3),
            watchdog_silence_ticks: 3,
            recoverable_fault_codes: DEFAULT_RECOVERABLE_FAULT_CODES.iter().copied().collect(),
            default_caller_id: None,
        }
    }
}

impl ControllerConfig {
    /// Set the codec preference order
    pub fn with_codec_preferences(mut self, codecs: Vec<String>) -> Self {
        self.codec_preferences = codecs;
        self
    }

    /// Set the provider signaling region
    pub fn with_signaling_region(mut self, region: impl Into<String>) -> Self {
        self.signaling_region = region.into();
        self
    }

    /// Set the assumed credential lifetime
    pub fn with_credential_ttl(mut self, ttl: Duration) -> Self {
        self.credential_ttl = ttl;
        self
    }

    /// Set how far before expiry the proactive renewal runs
    pub fn with_refresh_lead(mut self, lead: Duration) -> Self {
        self.refresh_lead = lead;
        self
    }

    /// Set the reconnection backoff parameters
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the recoverable fault code set
    pub fn with_recoverable_fault_codes(mut self, codes: impl IntoIterator<Item = u32>) -> Self {
        self.recoverable_fault_codes = codes.into_iter().collect();
        self
    }

    /// Set the default outbound caller id
    pub fn with_default_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.default_caller_id = Some(caller_id.into());
        self
    }

    /// Whether a provider fault code is classified as recoverable
    pub fn is_recoverable_fault(&self, code: u32) -> bool {
        self.recoverable_fault_codes.contains(&code)
    }

    /// Endpoint parameters derived from this configuration
    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            codec_preferences: self.codec_preferences.clone(),
            signaling_region: self.signaling_region.clone(),
            signaling_timeout: self.signaling_timeout,
            refresh_lead: self.refresh_lead,
        }
    }

    /// Validate internal consistency
    pub fn validate(&self) -> ClientResult<()> {
        if self.codec_preferences.is_empty() {
            return Err(ClientError::InvalidConfiguration {
                field: "codec_preferences".to_string(),
                reason: "at least one codec is required".to_string(),
            });
        }
        if self.refresh_lead >= self.credential_ttl {
            return Err(ClientError::InvalidConfiguration {
                field: "refresh_lead".to_string(),
                reason: "must be shorter than credential_ttl".to_string(),
            });
        }
        if self.backoff.max_attempts == 0 {
            return Err(ClientError::InvalidConfiguration {
                field: "backoff.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.watchdog_interval.is_zero() {
            return Err(ClientError::InvalidConfiguration {
                field: "watchdog_interval".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
