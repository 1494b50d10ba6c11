//! Audio device selection
//!
//! Platform-agnostic interface for audio hardware plus the default-device
//! policy applied to the active endpoint. Device selection is best effort by
//! contract: audio problems are logged and swallowed so they can never block
//! call setup.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ClientResult;

/// Device id the policy prefers when enumerated
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Audio device direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDeviceKind {
    /// Audio input (microphone)
    Input,
    /// Audio output (speaker)
    Output,
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Device identifier
    pub id: String,
    /// Human-readable device label
    pub label: String,
    /// Device direction
    pub kind: AudioDeviceKind,
}

/// Input processing constraints applied on selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProcessing {
    /// Echo cancellation
    pub echo_cancellation: bool,
    /// Noise suppression
    pub noise_suppression: bool,
    /// Automatic gain control
    pub auto_gain_control: bool,
}

impl Default for AudioProcessing {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Audio hardware surface exposed by the provider endpoint
#[async_trait]
pub trait AudioDeviceOps: Send + Sync {
    /// Enumerate devices of the given kind, in platform order
    async fn list_devices(&self, kind: AudioDeviceKind) -> ClientResult<Vec<AudioDeviceInfo>>;

    /// Route input from the given device with the given processing constraints
    async fn select_input(&self, device_id: &str, processing: &AudioProcessing)
        -> ClientResult<()>;

    /// Whether the runtime supports routing output to a chosen device
    fn supports_output_selection(&self) -> bool;

    /// Route output to the given device
    async fn select_output(&self, device_id: &str) -> ClientResult<()>;
}

/// Applies the default-device policy to an endpoint's audio surface
///
/// Policy: processing constraints on, the device identified as `"default"`
/// preferred, first enumerated device otherwise. Output selection follows the
/// same rule but only where the runtime supports it.
#[derive(Debug, Clone, Default)]
pub struct AudioDeviceSelector {
    processing: AudioProcessing,
}

impl AudioDeviceSelector {
    /// Create a selector with the given processing constraints
    pub fn new(processing: AudioProcessing) -> Self {
        Self { processing }
    }

    /// Apply the default-device policy
    ///
    /// Best effort: never returns an error. Hardware can change at any time,
    /// so this is re-applied at endpoint creation and immediately before
    /// accepting or placing a call.
    pub async fn apply_defaults(&self, audio: &dyn AudioDeviceOps) {
        match self.pick_device(audio, AudioDeviceKind::Input).await {
            Some(device_id) => {
                if let Err(e) = audio.select_input(&device_id, &self.processing).await {
                    warn!(device = %device_id, error = %e, "Input device selection failed");
                } else {
                    debug!(device = %device_id, "Selected input device");
                }
            }
            None => warn!("No input devices enumerated"),
        }

        if !audio.supports_output_selection() {
            debug!("Output device selection not supported by runtime");
            return;
        }
        match self.pick_device(audio, AudioDeviceKind::Output).await {
            Some(device_id) => {
                if let Err(e) = audio.select_output(&device_id).await {
                    warn!(device = %device_id, error = %e, "Output device selection failed");
                } else {
                    debug!(device = %device_id, "Selected output device");
                }
            }
            None => warn!("No output devices enumerated"),
        }
    }

    /// Pick `"default"` if enumerated, else the first device
    async fn pick_device(&self, audio: &dyn AudioDeviceOps, kind: AudioDeviceKind) -> Option<String> {
        let devices = match audio.list_devices(kind).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(kind = ?kind, error = %e, "Device enumeration failed");
                return None;
            }
        };
        devices
            .iter()
            .find(|d| d.id == DEFAULT_DEVICE_ID)
            .or_else(|| devices.first())
            .map(|d| d.id.clone())
    }
}
