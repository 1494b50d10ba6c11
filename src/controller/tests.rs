//! Unit suite for controller internals
//!
//! Integration flows against a scripted provider live in `tests/`; this
//! module covers the pieces only visible inside the crate: the task slots,
//! builder validation, and initial controller state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ClientError, ClientResult};
use crate::metadata::{DirectoryClient, DirectorySearchResponse};
use crate::permission::{CaptureError, MediaPermissions, MicrophoneCapture};
use crate::provider::{EndpointConfig, ProviderEndpoint, ProviderEvent, TelephonyProvider};

use super::config::ControllerConfig;
use super::lease::{TokenFetcher, TokenResponse};
use super::types::EndpointState;
use super::{SessionController, TimerSlot};

struct NullProvider;

#[async_trait]
impl TelephonyProvider for NullProvider {
    async fn create_endpoint(
        &self,
        _credential: &str,
        _config: &EndpointConfig,
        _events: mpsc::UnboundedSender<ProviderEvent>,
    ) -> ClientResult<Arc<dyn ProviderEndpoint>> {
        Err(ClientError::NetworkError {
            reason: "null provider".to_string(),
        })
    }
}

struct NullFetcher;

#[async_trait]
impl TokenFetcher for NullFetcher {
    async fn fetch_token(&self, _identity: &str) -> ClientResult<TokenResponse> {
        Ok(TokenResponse {
            token: Some("token".to_string()),
        })
    }
}

struct NullDirectory;

#[async_trait]
impl DirectoryClient for NullDirectory {
    async fn search_by_phone(&self, _phone: &str) -> ClientResult<DirectorySearchResponse> {
        Ok(DirectorySearchResponse {
            success: false,
            contact: None,
            account: None,
        })
    }
}

struct NullMedia;

#[async_trait]
impl MediaPermissions for NullMedia {
    async fn acquire_microphone(&self) -> Result<Box<dyn MicrophoneCapture>, CaptureError> {
        Err(CaptureError::Unavailable("null media".to_string()))
    }
}

fn null_controller() -> Arc<SessionController> {
    SessionController::builder()
        .identity("agent:test")
        .provider(Arc::new(NullProvider))
        .token_fetcher(Arc::new(NullFetcher))
        .directory(Arc::new(NullDirectory))
        .media_permissions(Arc::new(NullMedia))
        .build()
        .expect("null controller builds")
}

#[tokio::test]
async fn builder_requires_every_collaborator() {
    let result = SessionController::builder().identity("agent:test").build();
    assert!(matches!(
        result,
        Err(ClientError::InvalidConfiguration { field, .. }) if field == "provider"
    ));

    let result = SessionController::builder()
        .provider(Arc::new(NullProvider))
        .token_fetcher(Arc::new(NullFetcher))
        .directory(Arc::new(NullDirectory))
        .media_permissions(Arc::new(NullMedia))
        .build();
    assert!(matches!(
        result,
        Err(ClientError::InvalidConfiguration { field, .. }) if field == "identity"
    ));
}

#[tokio::test]
async fn builder_rejects_invalid_config() {
    let config = ControllerConfig::default()
        .with_credential_ttl(Duration::from_secs(60))
        .with_refresh_lead(Duration::from_secs(3600));
    let result = SessionController::builder()
        .identity("agent:test")
        .provider(Arc::new(NullProvider))
        .token_fetcher(Arc::new(NullFetcher))
        .directory(Arc::new(NullDirectory))
        .media_permissions(Arc::new(NullMedia))
        .config(config)
        .build();
    assert!(matches!(
        result,
        Err(ClientError::InvalidConfiguration { field, .. }) if field == "refresh_lead"
    ));
}

#[tokio::test]
async fn fresh_controller_starts_cold() {
    let controller = null_controller();
    assert_eq!(controller.endpoint_state().await, EndpointState::Uninitialized);
    assert!(!controller.is_ready().await);
    assert!(controller.current_call().await.is_none());
    assert!(controller.call_history().is_empty());

    let stats = controller.stats().await;
    assert_eq!(stats.total_calls, 0);
    assert_eq!(stats.total_registrations, 0);
    assert_eq!(stats.reconnect_attempt, 0);
    assert!(!stats.refresh_timer_armed);
    assert!(!stats.reconnect_timer_armed);
}

#[tokio::test]
async fn operations_without_a_call_are_no_ops() {
    let controller = null_controller();
    controller.disconnect().await;
    assert!(controller.send_digits("123").await.is_ok());
    assert!(controller.mute(true).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn timer_slot_replaces_and_cancels() {
    let slot = TimerSlot::new("test");
    assert!(!slot.is_armed());

    let first = tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });
    slot.arm(first);
    assert!(slot.is_armed());

    // Arming again aborts the previous occupant
    slot.arm(tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }));
    assert!(slot.is_armed());

    slot.cancel();
    assert!(!slot.is_armed());
    // Cancelling an empty slot is a no-op
    slot.cancel();
}

#[tokio::test]
async fn unavailable_microphone_blocks_start() {
    let controller = null_controller();
    let result = controller.start().await;
    assert!(matches!(
        result,
        Err(ClientError::MicrophoneUnavailable { .. })
    ));
    assert_eq!(controller.endpoint_state().await, EndpointState::Uninitialized);
}
