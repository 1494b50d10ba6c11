//! # softphone-core
//!
//! Client-side telephony session controller: establishes and maintains a
//! single user's live voice-call endpoint against an opaque provider SDK,
//! manages the credential lifecycle, negotiates audio devices, drives call
//! state transitions, and recovers from network and hardware disruption
//! without dropping an active call.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │      Presentation layer      │
//! └──────────────┬───────────────┘
//!                │ connect / disconnect / mute / send_digits
//!                │ snapshot + event stream
//! ┌──────────────▼───────────────┐
//! │       SessionController      │ ◄── endpoint + call state machines,
//! │                              │     named timer slots
//! │  PermissionGate              │ ◄── microphone capability probe
//! │  TokenLeaseManager           │ ◄── credential fetch + proactive renewal
//! │  AudioDeviceSelector         │ ◄── default-device policy
//! │  ReconnectionPolicy          │ ◄── exponential backoff with ceiling
//! │  MetadataResolver            │ ◄── best-effort identity enrichment
//! └──────────────┬───────────────┘
//!                │ capability traits
//! ┌──────────────▼───────────────┐
//! │ provider SDK · token backend │
//! │ directory · media APIs       │
//! └──────────────────────────────┘
//! ```
//!
//! # Key Behaviors
//!
//! - **One endpoint, one call.** The controller owns at most one live
//!   endpoint; a new one supersedes and destroys the previous. At most one
//!   call is active, and it never outlives its endpoint.
//! - **Credential leasing.** Tokens are renewed proactively ahead of expiry
//!   and immediately on the provider's expiry warning. While a call is live,
//!   renewal is strictly in place so the call is never dropped.
//! - **Fault recovery.** Provider faults whose code is in the configured
//!   recoverable set trigger exponential backoff up to a hard ceiling, after
//!   which a sticky terminal notice asks the user to reload. Network
//!   restoration and tab visibility reset the backoff and re-initialize.
//! - **Cosmetic enrichment.** Directory lookups run concurrently with call
//!   setup; failures degrade to "no match" and late results for dead calls
//!   are discarded.
//!
//! All external collaborators sit behind async traits
//! ([`provider::TelephonyProvider`], [`controller::lease::TokenFetcher`],
//! [`metadata::DirectoryClient`], [`permission::MediaPermissions`],
//! [`audio::AudioDeviceOps`]), so the controller is fully testable against
//! fakes and agnostic to the concrete SDK.

pub mod audio;
pub mod call;
pub mod controller;
pub mod error;
pub mod events;
pub mod metadata;
pub mod permission;
pub mod phone;
pub mod provider;

// Primary surface re-exports
pub use call::{CallDirection, CallId, CallInfo, CallState};
pub use controller::builder::SessionControllerBuilder;
pub use controller::config::{ControllerConfig, DEFAULT_RECOVERABLE_FAULT_CODES};
pub use controller::lease::{CredentialLease, TokenFetcher, TokenLeaseManager, TokenResponse};
pub use controller::recovery::{BackoffConfig, ReconnectionPolicy};
pub use controller::types::{
    ControllerSnapshot, ControllerStats, EndpointState, LifecycleSignal,
};
pub use controller::SessionController;
pub use error::{ClientError, ClientResult};
pub use events::{
    ClientEvent, ClientEventHandler, EventPriority, IncomingCallInfo, Notice, NoticeKind,
};
pub use metadata::{CallMetadata, DirectoryClient, MetadataOutcome, MetadataResolver};
pub use permission::{MediaPermissions, MicrophoneAccess, PermissionGate};
pub use phone::normalize_number;
pub use provider::{
    CallEvent, EndpointConfig, IncomingOffer, OutboundParams, ProviderCall, ProviderEndpoint,
    ProviderEvent, TelephonyProvider,
};
