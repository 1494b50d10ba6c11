//! Telephony provider SDK seam
//!
//! The provider SDK is an external collaborator: an already-implemented stack
//! that registers a signaling endpoint from a bearer credential, places and
//! receives calls, and reports lifecycle through events. This module defines
//! the capability interface the controller drives it through.
//!
//! The provider's string-keyed event callbacks are re-architected here as a
//! closed tagged union ([`ProviderEvent`] / [`CallEvent`]) delivered over an
//! `mpsc` channel handed to the provider at endpoint construction, so event
//! handling in the controller is exhaustive and compiler-checked.
//!
//! # Layering
//!
//! ```text
//! ┌─────────────────────────┐
//! │    SessionController    │
//! └───────────┬─────────────┘
//!             │ TelephonyProvider / ProviderEndpoint / ProviderCall
//! ┌───────────▼─────────────┐
//! │   provider SDK (opaque) │
//! └─────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::AudioDeviceOps;
use crate::error::ClientResult;

/// Configuration handed to the provider at endpoint construction
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Codec preference order (e.g. `["opus", "pcmu"]`)
    pub codec_preferences: Vec<String>,
    /// Signaling region identifier (e.g. `"us1"`)
    pub signaling_region: String,
    /// How long the provider waits on signaling operations (also bounds the
    /// inbound offer ring window)
    pub signaling_timeout: Duration,
    /// How far before credential expiry the provider should emit
    /// [`ProviderEvent::TokenWillExpire`]
    pub refresh_lead: Duration,
}

/// Parameters for placing an outbound call
#[derive(Debug, Clone)]
pub struct OutboundParams {
    /// Normalized destination number
    pub to: String,
    /// Normalized caller id, when one is configured
    pub from: Option<String>,
}

/// An inbound call offer delivered by the provider
pub struct IncomingOffer {
    /// Caller address as reported by the provider
    pub from: String,
    /// Handle for accepting, rejecting, or controlling the offered call
    pub call: Arc<dyn ProviderCall>,
}

impl std::fmt::Debug for IncomingOffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingOffer")
            .field("from", &self.from)
            .field("call", &"<provider call>")
            .finish()
    }
}

/// Endpoint-level lifecycle events from the provider
#[derive(Debug)]
pub enum ProviderEvent {
    /// The endpoint registered with the provider's signaling plane
    Registered,
    /// The credential is about to expire; renew now
    TokenWillExpire,
    /// The endpoint faulted; `code` decides whether this is recoverable
    Fault {
        /// Provider-specific numeric fault code
        code: u32,
        /// Provider-supplied description
        message: String,
    },
    /// An inbound call is being offered
    Incoming(IncomingOffer),
    /// An event concerning the currently active call
    Call(CallEvent),
}

/// Call-level events from the provider
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The remote side is ringing
    Ringing,
    /// The call was answered and media is established
    Accepted,
    /// The call ended normally (either side hung up)
    Disconnected,
    /// The caller cancelled, or the offer timed out unanswered
    Canceled,
    /// The call failed
    Failed {
        /// Provider-specific numeric fault code
        code: u32,
        /// Provider-supplied description
        message: String,
    },
}

/// Constructs registered endpoints from credentials
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Build an endpoint from a credential and start registering it
    ///
    /// Lifecycle events for the new endpoint are delivered on `events`. The
    /// returned handle is live immediately; registration completion arrives as
    /// [`ProviderEvent::Registered`].
    async fn create_endpoint(
        &self,
        credential: &str,
        config: &EndpointConfig,
        events: mpsc::UnboundedSender<ProviderEvent>,
    ) -> ClientResult<Arc<dyn ProviderEndpoint>>;
}

/// A live provider endpoint
#[async_trait]
pub trait ProviderEndpoint: Send + Sync {
    /// Place an outbound call
    async fn connect(&self, params: OutboundParams) -> ClientResult<Arc<dyn ProviderCall>>;

    /// Swap the credential without tearing the endpoint down
    ///
    /// This is the in-place renewal primitive; it must not interrupt an
    /// established call.
    async fn update_credential(&self, credential: &str) -> ClientResult<()>;

    /// Audio device surface for this endpoint
    fn audio(&self) -> Arc<dyn AudioDeviceOps>;

    /// Tear the endpoint down and release provider resources
    async fn destroy(&self);
}

/// A provider-level call handle
#[async_trait]
pub trait ProviderCall: Send + Sync {
    /// Accept an offered inbound call
    async fn accept(&self) -> ClientResult<()>;

    /// Reject an offered inbound call
    async fn reject(&self) -> ClientResult<()>;

    /// Hang up the call
    async fn disconnect(&self);

    /// Send DTMF digits, forwarded verbatim
    async fn send_digits(&self, digits: &str) -> ClientResult<()>;

    /// Mute or unmute the outbound audio track
    async fn set_muted(&self, muted: bool) -> ClientResult<()>;

    /// Current outbound audio input level in `[0.0, 1.0]`, when the provider
    /// exposes level statistics
    async fn input_audio_level(&self) -> Option<f32>;
}
