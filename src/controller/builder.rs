//! Builder for [`SessionController`]
//!
//! Wires the controller to its collaborators: the telephony provider SDK,
//! the authentication backend, the directory service, and the platform media
//! permission surface. Exactly one controller instance is built per
//! application and shared by reference.
//!
//! # Usage
//!
//! ```text
//! let controller = SessionController::builder()
//!     .identity("agent:42")
//!     .provider(provider)
//!     .token_fetcher(fetcher)
//!     .directory(directory)
//!     .media_permissions(media)
//!     .config(ControllerConfig::default())
//!     .build()?;
//! controller.start().await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use dashmap::DashMap;
use tokio::sync::{broadcast, RwLock};

use crate::audio::AudioDeviceSelector;
use crate::error::{ClientError, ClientResult};
use crate::metadata::{DirectoryClient, MetadataResolver};
use crate::permission::{MediaPermissions, PermissionGate};
use crate::provider::TelephonyProvider;

use super::config::ControllerConfig;
use super::lease::{TokenFetcher, TokenLeaseManager};
use super::recovery::ReconnectionPolicy;
use super::types::EndpointState;
use super::{SessionController, TimerSlot};

/// Capacity of the broadcast event stream
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Assembles a [`SessionController`] from its collaborators
#[derive(Default)]
pub struct SessionControllerBuilder {
    identity: Option<String>,
    provider: Option<Arc<dyn TelephonyProvider>>,
    token_fetcher: Option<Arc<dyn TokenFetcher>>,
    directory: Option<Arc<dyn DirectoryClient>>,
    media_permissions: Option<Arc<dyn MediaPermissions>>,
    config: ControllerConfig,
}

impl SessionControllerBuilder {
    /// Create an empty builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
            ..Default::default()
        }
    }

    /// Stable identity of the authenticated user
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// The telephony provider SDK
    pub fn provider(mut self, provider: Arc<dyn TelephonyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// The authentication backend used to fetch credentials
    pub fn token_fetcher(mut self, fetcher: Arc<dyn TokenFetcher>) -> Self {
        self.token_fetcher = Some(fetcher);
        self
    }

    /// The directory service used for metadata enrichment
    pub fn directory(mut self, directory: Arc<dyn DirectoryClient>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// The platform media permission surface
    pub fn media_permissions(mut self, media: Arc<dyn MediaPermissions>) -> Self {
        self.media_permissions = Some(media);
        self
    }

    /// Controller configuration
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build the controller
    pub fn build(self) -> ClientResult<Arc<SessionController>> {
        let identity = self.identity.ok_or_else(|| missing("identity"))?;
        if identity.is_empty() {
            return Err(ClientError::InvalidConfiguration {
                field: "identity".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let provider = self.provider.ok_or_else(|| missing("provider"))?;
        let token_fetcher = self.token_fetcher.ok_or_else(|| missing("token_fetcher"))?;
        let directory = self.directory.ok_or_else(|| missing("directory"))?;
        let media_permissions = self
            .media_permissions
            .ok_or_else(|| missing("media_permissions"))?;
        self.config.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let lease_manager = TokenLeaseManager::new(
            token_fetcher,
            self.config.credential_ttl,
            self.config.refresh_lead,
        );

        Ok(Arc::new(SessionController {
            identity,
            provider,
            permission_gate: PermissionGate::new(media_permissions),
            lease_manager,
            resolver: MetadataResolver::new(directory),
            audio_selector: AudioDeviceSelector::default(),

            endpoint_state: RwLock::new(EndpointState::Uninitialized),
            endpoint: RwLock::new(None),
            endpoint_generation: AtomicU64::new(0),
            active_call: RwLock::new(None),
            call_registry: DashMap::new(),

            reconnect: StdMutex::new(ReconnectionPolicy::new(self.config.backoff.clone())),
            init_in_flight: AtomicBool::new(false),
            call_context_active: AtomicBool::new(false),
            microphone_granted: AtomicBool::new(false),

            refresh_timer: TimerSlot::new("refresh"),
            reconnect_timer: TimerSlot::new("reconnect"),
            watchdog_timer: TimerSlot::new("watchdog"),
            event_pump: TimerSlot::new("event_pump"),

            event_tx,
            event_handler: RwLock::new(None),

            total_calls: AtomicU64::new(0),
            total_registrations: AtomicU64::new(0),

            config: self.config,
        }))
    }
}

fn missing(field: &str) -> ClientError {
    ClientError::InvalidConfiguration {
        field: field.to_string(),
        reason: "required collaborator not supplied".to_string(),
    }
}
