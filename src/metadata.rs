//! Call metadata enrichment
//!
//! Given a normalized phone number, the resolver asks an external directory
//! service for a matching identity and produces a [`CallMetadata`] value for
//! call presentation. Enrichment is cosmetic: the lookup runs concurrently
//! with call establishment, never blocks call setup or acceptance, and every
//! failure collapses to [`MetadataOutcome::NoMatch`] rather than surfacing an
//! error.
//!
//! Lookup precedence: an exact contact match wins; otherwise an account-level
//! (organization-only) match; otherwise `NoMatch`.
//!
//! A `CallMetadata` value is immutable once attached to a call — a fresh
//! lookup produces a new value rather than mutating one in place.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientResult;

/// How a phone number resolved against the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataOutcome {
    /// The number matched a specific contact record
    ContactMatch,
    /// No contact matched, but the number belongs to a known organization
    AccountOnlyMatch,
    /// Nothing matched, or the lookup failed
    NoMatch,
}

/// Best-effort identity enrichment for a phone number
#[derive(Debug, Clone, PartialEq)]
pub struct CallMetadata {
    /// Display name for the remote party, when resolved
    pub display_name: Option<String>,
    /// Organization the remote party belongs to, when resolved
    pub organization: Option<String>,
    /// Location hint (city/region), when resolved
    pub location: Option<String>,
    /// Which kind of match produced this value
    pub outcome: MetadataOutcome,
}

impl CallMetadata {
    /// Metadata representing a failed or empty lookup
    pub fn no_match() -> Self {
        Self {
            display_name: None,
            organization: None,
            location: None,
            outcome: MetadataOutcome::NoMatch,
        }
    }
}

/// Contact record as returned by the directory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryContact {
    /// Contact's display name
    pub name: Option<String>,
    /// Organization the contact belongs to
    pub organization: Option<String>,
    /// City the contact is associated with
    pub city: Option<String>,
    /// State or region the contact is associated with
    pub state: Option<String>,
}

/// Account (organization) record as returned by the directory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAccount {
    /// Organization name
    pub name: Option<String>,
    /// City the organization is associated with
    pub city: Option<String>,
    /// State or region the organization is associated with
    pub state: Option<String>,
}

/// Wire format of `GET /search?phone=<e164>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySearchResponse {
    /// Whether the lookup succeeded server-side
    pub success: bool,
    /// Matching contact, if any
    #[serde(default)]
    pub contact: Option<DirectoryContact>,
    /// Matching account, if any
    #[serde(default)]
    pub account: Option<DirectoryAccount>,
}

/// External directory service collaborator
///
/// Implementations perform the actual `GET /search?phone=<e164>` request.
/// Transport errors should be returned as-is; the resolver maps every failure
/// to `NoMatch`.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Look up a normalized phone number in the directory
    async fn search_by_phone(&self, phone: &str) -> ClientResult<DirectorySearchResponse>;
}

/// Resolves phone numbers to presentation metadata
#[derive(Clone)]
pub struct MetadataResolver {
    directory: Arc<dyn DirectoryClient>,
}

impl MetadataResolver {
    /// Create a resolver over a directory service
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self { directory }
    }

    /// Resolve a phone number to call metadata
    ///
    /// Never returns an error: directory failures, non-success responses, and
    /// empty results all map to [`CallMetadata::no_match`]. Callers run this
    /// concurrently with call setup and attach the result whenever it lands.
    pub async fn resolve(&self, phone: &str) -> CallMetadata {
        let response = match self.directory.search_by_phone(phone).await {
            Ok(response) => response,
            Err(e) => {
                // Cosmetic path: log and degrade, never surface
                warn!(phone = %phone, error = %e, "Directory lookup failed, treating as no match");
                return CallMetadata::no_match();
            }
        };

        if !response.success {
            debug!(phone = %phone, "Directory reported non-success, treating as no match");
            return CallMetadata::no_match();
        }

        if let Some(contact) = response.contact {
            return CallMetadata {
                display_name: contact.name,
                organization: contact.organization,
                location: format_location(contact.city, contact.state),
                outcome: MetadataOutcome::ContactMatch,
            };
        }

        if let Some(account) = response.account {
            return CallMetadata {
                display_name: None,
                organization: account.name,
                location: format_location(account.city, account.state),
                outcome: MetadataOutcome::AccountOnlyMatch,
            };
        }

        CallMetadata::no_match()
    }
}

fn format_location(city: Option<String>, state: Option<String>) -> Option<String> {
    match (city, state) {
        (Some(city), Some(state)) => Some(format!("{}, {}", city, state)),
        (Some(city), None) => Some(city),
        (None, Some(state)) => Some(state),
        (None, None) => None,
    }
}
