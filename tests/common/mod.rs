//! Shared fixtures for integration tests
//!
//! A scripted provider stack: every collaborator trait gets a fake that
//! records what the controller did to it and lets tests drive provider events
//! by hand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use softphone_core::audio::{AudioDeviceInfo, AudioDeviceKind, AudioDeviceOps, AudioProcessing};
use softphone_core::controller::config::ControllerConfig;
use softphone_core::controller::lease::{TokenFetcher, TokenResponse};
use softphone_core::error::{ClientError, ClientResult};
use softphone_core::metadata::{DirectoryContact, DirectorySearchResponse};
use softphone_core::permission::{CaptureError, MediaPermissions, MicrophoneCapture};
use softphone_core::provider::{
    CallEvent, EndpointConfig, IncomingOffer, OutboundParams, ProviderCall, ProviderEndpoint,
    ProviderEvent, TelephonyProvider,
};
use softphone_core::{ClientEvent, DirectoryClient, SessionController};

// ===== media permissions =====

pub struct FakeCapture;

#[async_trait]
impl MicrophoneCapture for FakeCapture {
    async fn release(self: Box<Self>) {}
}

pub struct FakeMedia {
    pub deny: AtomicBool,
    pub probes: AtomicU32,
}

impl FakeMedia {
    pub fn granted() -> Self {
        Self {
            deny: AtomicBool::new(false),
            probes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MediaPermissions for FakeMedia {
    async fn acquire_microphone(&self) -> Result<Box<dyn MicrophoneCapture>, CaptureError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            Err(CaptureError::PermissionDenied)
        } else {
            Ok(Box::new(FakeCapture))
        }
    }
}

// ===== token backend =====

pub struct FakeTokenFetcher {
    pub fail: AtomicBool,
    pub fetches: AtomicU32,
}

impl FakeTokenFetcher {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            fetches: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TokenFetcher for FakeTokenFetcher {
    async fn fetch_token(&self, identity: &str) -> ClientResult<TokenResponse> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::NetworkError {
                reason: "token endpoint unreachable".to_string(),
            });
        }
        Ok(TokenResponse {
            token: Some(format!("token-{}-{}", identity, n)),
        })
    }
}

// ===== directory =====

pub struct FakeDirectory {
    pub hold: AtomicBool,
    pub release: Notify,
    pub response: Mutex<DirectorySearchResponse>,
}

impl FakeDirectory {
    pub fn with_contact(name: &str) -> Self {
        Self {
            hold: AtomicBool::new(false),
            release: Notify::new(),
            response: Mutex::new(DirectorySearchResponse {
                success: true,
                contact: Some(DirectoryContact {
                    name: Some(name.to_string()),
                    organization: Some("Acme Corp".to_string()),
                    city: Some("Denver".to_string()),
                    state: Some("CO".to_string()),
                }),
                account: None,
            }),
        }
    }

    pub fn empty() -> Self {
        Self {
            hold: AtomicBool::new(false),
            release: Notify::new(),
            response: Mutex::new(DirectorySearchResponse {
                success: true,
                contact: None,
                account: None,
            }),
        }
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn search_by_phone(&self, _phone: &str) -> ClientResult<DirectorySearchResponse> {
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(self.response.lock().unwrap().clone())
    }
}

// ===== audio =====

pub struct FakeAudio {
    pub input_selections: Mutex<Vec<(String, AudioProcessing)>>,
    pub output_selections: Mutex<Vec<String>>,
    pub output_supported: bool,
}

impl Default for FakeAudio {
    fn default() -> Self {
        Self {
            input_selections: Mutex::new(Vec::new()),
            output_selections: Mutex::new(Vec::new()),
            output_supported: true,
        }
    }
}

#[async_trait]
impl AudioDeviceOps for FakeAudio {
    async fn list_devices(&self, kind: AudioDeviceKind) -> ClientResult<Vec<AudioDeviceInfo>> {
        Ok(vec![AudioDeviceInfo {
            id: "default".to_string(),
            label: "Default".to_string(),
            kind,
        }])
    }

    async fn select_input(
        &self,
        device_id: &str,
        processing: &AudioProcessing,
    ) -> ClientResult<()> {
        self.input_selections
            .lock()
            .unwrap()
            .push((device_id.to_string(), *processing));
        Ok(())
    }

    fn supports_output_selection(&self) -> bool {
        self.output_supported
    }

    async fn select_output(&self, device_id: &str) -> ClientResult<()> {
        self.output_selections
            .lock()
            .unwrap()
            .push(device_id.to_string());
        Ok(())
    }
}

// ===== provider =====

pub struct FakeCall {
    pub params: Option<OutboundParams>,
    pub accepted: AtomicBool,
    pub rejected: AtomicBool,
    pub disconnected: AtomicBool,
    pub digits: Mutex<Vec<String>>,
    pub mute_calls: Mutex<Vec<bool>>,
    pub level: Mutex<f32>,
}

impl FakeCall {
    pub fn new(params: Option<OutboundParams>) -> Self {
        Self {
            params,
            accepted: AtomicBool::new(false),
            rejected: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            digits: Mutex::new(Vec::new()),
            mute_calls: Mutex::new(Vec::new()),
            level: Mutex::new(0.4),
        }
    }
}

#[async_trait]
impl ProviderCall for FakeCall {
    async fn accept(&self) -> ClientResult<()> {
        self.accepted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&self) -> ClientResult<()> {
        self.rejected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    async fn send_digits(&self, digits: &str) -> ClientResult<()> {
        self.digits.lock().unwrap().push(digits.to_string());
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> ClientResult<()> {
        self.mute_calls.lock().unwrap().push(muted);
        Ok(())
    }

    async fn input_audio_level(&self) -> Option<f32> {
        Some(*self.level.lock().unwrap())
    }
}

pub struct FakeEndpoint {
    pub credential: Mutex<String>,
    pub events: mpsc::UnboundedSender<ProviderEvent>,
    pub audio: Arc<FakeAudio>,
    pub destroyed: AtomicBool,
    pub renewal_fails: AtomicBool,
    pub renewed_credentials: Mutex<Vec<String>>,
    pub outbound_calls: Mutex<Vec<Arc<FakeCall>>>,
}

impl FakeEndpoint {
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub fn emit_registered(&self) {
        self.emit(ProviderEvent::Registered);
    }

    pub fn emit_fault(&self, code: u32) {
        self.emit(ProviderEvent::Fault {
            code,
            message: format!("fault {}", code),
        });
    }

    pub fn emit_call(&self, event: CallEvent) {
        self.emit(ProviderEvent::Call(event));
    }

    /// Offer an inbound call, returning the handle the controller sees
    pub fn offer_call(&self, from: &str) -> Arc<FakeCall> {
        let call = Arc::new(FakeCall::new(None));
        self.emit(ProviderEvent::Incoming(IncomingOffer {
            from: from.to_string(),
            call: call.clone(),
        }));
        call
    }

    pub fn last_outbound_call(&self) -> Arc<FakeCall> {
        self.outbound_calls
            .lock()
            .unwrap()
            .last()
            .expect("an outbound call was placed")
            .clone()
    }
}

#[async_trait]
impl ProviderEndpoint for FakeEndpoint {
    async fn connect(&self, params: OutboundParams) -> ClientResult<Arc<dyn ProviderCall>> {
        let call = Arc::new(FakeCall::new(Some(params)));
        self.outbound_calls.lock().unwrap().push(call.clone());
        Ok(call)
    }

    async fn update_credential(&self, credential: &str) -> ClientResult<()> {
        if self.renewal_fails.load(Ordering::SeqCst) {
            return Err(ClientError::ProviderFault {
                code: 20104,
                message: "token rejected".to_string(),
            });
        }
        self.renewed_credentials
            .lock()
            .unwrap()
            .push(credential.to_string());
        *self.credential.lock().unwrap() = credential.to_string();
        Ok(())
    }

    fn audio(&self) -> Arc<dyn AudioDeviceOps> {
        self.audio.clone()
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeProvider {
    pub hold_create: AtomicBool,
    pub release_create: Notify,
    pub fail_create: AtomicBool,
    pub endpoints: Mutex<Vec<Arc<FakeEndpoint>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            hold_create: AtomicBool::new(false),
            release_create: Notify::new(),
            fail_create: AtomicBool::new(false),
            endpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }

    pub fn endpoint(&self, index: usize) -> Arc<FakeEndpoint> {
        self.endpoints.lock().unwrap()[index].clone()
    }

    pub fn latest_endpoint(&self) -> Arc<FakeEndpoint> {
        self.endpoints
            .lock()
            .unwrap()
            .last()
            .expect("an endpoint was created")
            .clone()
    }
}

#[async_trait]
impl TelephonyProvider for FakeProvider {
    async fn create_endpoint(
        &self,
        credential: &str,
        _config: &EndpointConfig,
        events: mpsc::UnboundedSender<ProviderEvent>,
    ) -> ClientResult<Arc<dyn ProviderEndpoint>> {
        if self.hold_create.load(Ordering::SeqCst) {
            self.release_create.notified().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ClientError::NetworkError {
                reason: "signaling host unreachable".to_string(),
            });
        }
        let endpoint = Arc::new(FakeEndpoint {
            credential: Mutex::new(credential.to_string()),
            events,
            audio: Arc::new(FakeAudio::default()),
            destroyed: AtomicBool::new(false),
            renewal_fails: AtomicBool::new(false),
            renewed_credentials: Mutex::new(Vec::new()),
            outbound_calls: Mutex::new(Vec::new()),
        });
        self.endpoints.lock().unwrap().push(endpoint.clone());
        Ok(endpoint)
    }
}

// ===== harness =====

pub struct Harness {
    pub controller: Arc<SessionController>,
    pub provider: Arc<FakeProvider>,
    pub fetcher: Arc<FakeTokenFetcher>,
    pub directory: Arc<FakeDirectory>,
    pub media: Arc<FakeMedia>,
    pub events: Mutex<tokio::sync::broadcast::Receiver<ClientEvent>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        init_tracing();
        let provider = Arc::new(FakeProvider::new());
        let fetcher = Arc::new(FakeTokenFetcher::new());
        let directory = Arc::new(FakeDirectory::with_contact("Dana Reeve"));
        let media = Arc::new(FakeMedia::granted());

        let controller = SessionController::builder()
            .identity("agent:42")
            .provider(provider.clone())
            .token_fetcher(fetcher.clone())
            .directory(directory.clone())
            .media_permissions(media.clone())
            .config(config)
            .build()
            .expect("harness controller builds");
        let events = Mutex::new(controller.subscribe());

        Self {
            controller,
            provider,
            fetcher,
            directory,
            media,
            events,
        }
    }

    /// Start the controller and drive it to `Registered`
    pub async fn start_registered(&self) {
        self.controller.start().await.expect("start succeeds");
        self.provider.latest_endpoint().emit_registered();
        settle().await;
        assert!(self.controller.is_ready().await, "endpoint should register");
    }

    /// Drain every event emitted so far
    pub fn drain_events(&self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        let mut rx = self.events.lock().unwrap();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Let spawned tasks and the event pump run
///
/// Under a paused clock the sleep advances virtual time without waiting.
pub async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
