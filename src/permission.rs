//! Microphone permission gate
//!
//! Before any endpoint is created, the controller probes microphone access to
//! trigger the browser-style permission prompt. The probe acquires a capture
//! handle purely to force the prompt and releases it immediately; nothing is
//! retained for later use, and the probe can run any number of times without
//! leaking media resources.
//!
//! The outcome distinguishes an explicit user denial (remediation: ask the
//! user to change a setting) from API unavailability or hardware failure
//! (remediation: generic message).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Outcome of a microphone permission probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneAccess {
    /// The user granted access (prompt accepted or previously persisted)
    Granted,
    /// The user explicitly denied access
    Denied,
    /// The media API is missing, or acquisition failed for another reason
    Unavailable {
        /// What the media layer reported
        reason: String,
    },
}

impl MicrophoneAccess {
    /// Whether access was granted
    pub fn granted(&self) -> bool {
        matches!(self, MicrophoneAccess::Granted)
    }

    /// Whether the user explicitly denied access
    pub fn denied(&self) -> bool {
        matches!(self, MicrophoneAccess::Denied)
    }
}

/// Why a capture acquisition failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user rejected the permission prompt
    PermissionDenied,
    /// The media API is unavailable or acquisition failed
    Unavailable(String),
}

/// A held microphone capture
///
/// Exists only so the probe has something to release; implementations stop
/// all underlying tracks in `release`.
#[async_trait]
pub trait MicrophoneCapture: Send + Sync {
    /// Stop every track backing this capture
    async fn release(self: Box<Self>);
}

/// Platform media-permission surface
///
/// The one suspension point the gate depends on: acquiring a capture triggers
/// the permission prompt when the browser has not persisted a decision yet.
#[async_trait]
pub trait MediaPermissions: Send + Sync {
    /// Acquire a microphone capture, prompting the user if necessary
    async fn acquire_microphone(&self) -> Result<Box<dyn MicrophoneCapture>, CaptureError>;
}

/// Capability probe for microphone access
#[derive(Clone)]
pub struct PermissionGate {
    media: Arc<dyn MediaPermissions>,
}

impl PermissionGate {
    /// Create a gate over a platform media-permission surface
    pub fn new(media: Arc<dyn MediaPermissions>) -> Self {
        Self { media }
    }

    /// Probe microphone access
    ///
    /// Acquires and immediately releases a capture. Idempotent; safe to call
    /// repeatedly.
    pub async fn request_microphone(&self) -> MicrophoneAccess {
        match self.media.acquire_microphone().await {
            Ok(capture) => {
                capture.release().await;
                debug!("Microphone permission probe succeeded");
                MicrophoneAccess::Granted
            }
            Err(CaptureError::PermissionDenied) => {
                warn!("Microphone permission denied by user");
                MicrophoneAccess::Denied
            }
            Err(CaptureError::Unavailable(reason)) => {
                warn!(reason = %reason, "Microphone unavailable");
                MicrophoneAccess::Unavailable { reason }
            }
        }
    }
}
