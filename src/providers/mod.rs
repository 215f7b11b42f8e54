//! Storage Providers Module
//!
//! One listing/download abstraction over Google Drive and OneDrive.
//! Both clients implement `DriveProvider`, so navigation and the archive
//! builder never care which backend they talk to.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            DriveProvider Trait              │
//! │   list_page, download, list_shared_drives   │
//! └─────────────────────────────────────────────┘
//!                      │
//!           ┌──────────┴──────────┐
//!           ▼                     ▼
//!     ┌──────────┐          ┌──────────┐
//!     │  GDrive  │          │ OneDrive │
//!     └──────────┘          └──────────┘
//! ```

pub mod types;
pub mod http_retry;
pub mod google_drive;
pub mod onedrive;

pub use types::*;
pub use google_drive::GoogleDriveProvider;
pub use onedrive::OneDriveProvider;
pub use http_retry::HttpRetryConfig;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::Response;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use tracing::debug;

use crate::file_model::FileEntry;

/// Largest page size either backend accepts for our listings
pub const MAX_PAGE_SIZE: u32 = 100;

/// Unified listing/download trait
///
/// Implementations are read-only and stateless with respect to credentials:
/// they are constructed with a bearer token and never refresh it.
#[async_trait]
pub trait DriveProvider: Send + Sync {
    /// Get the provider type identifier
    fn provider_type(&self) -> ProviderType;

    /// Get display name for this provider instance
    fn display_name(&self) -> String {
        self.provider_type().to_string()
    }

    /// List one page of `context`.
    ///
    /// Entries come back folders first, then by case-insensitive name.
    /// Failures are reported as `ProviderError::ListingFailed`.
    async fn list_page(
        &self,
        context: &ListContext,
        page_token: Option<&str>,
    ) -> Result<ListPage, ProviderError>;

    /// Download the binary content of a file entry
    async fn download(&self, entry: &FileEntry) -> Result<Vec<u8>, ProviderError>;

    /// Check if provider has a shared drives section
    fn supports_shared_drives(&self) -> bool {
        false
    }

    /// List the shared drives visible to the user
    async fn list_shared_drives(&self) -> Result<Vec<SharedDrive>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Follow `next_page_token` until exhausted and return the whole, sorted listing
pub async fn list_all(
    provider: &dyn DriveProvider,
    context: &ListContext,
) -> Result<Vec<FileEntry>, ProviderError> {
    let mut all_entries = Vec::new();
    let mut page_token: Option<String> = None;
    let mut seen_tokens = HashSet::new();
    let mut pages = 0usize;

    loop {
        let page = provider
            .list_page(context, page_token.as_deref())
            .await
            .map_err(|e| ProviderError::listing_failed(context, page_token.as_deref(), e))?;
        pages += 1;
        all_entries.extend(page.entries);

        match page.next_page_token {
            Some(token) => {
                if !seen_tokens.insert(token.clone()) {
                    return Err(ProviderError::listing_failed(
                        context,
                        Some(&token),
                        ProviderError::Other("backend repeated a page token".to_string()),
                    ));
                }
                page_token = Some(token);
            }
            None => break,
        }
    }

    sort_entries(&mut all_entries);
    debug!("Listed {} ({} entries, {} pages)", context, all_entries.len(), pages);
    Ok(all_entries)
}

/// Folders first, then case-insensitive name; raw name and id break ties
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        b.is_folder()
            .cmp(&a.is_folder())
            .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
            .then_with(|| a.name().cmp(b.name()))
            .then_with(|| a.id().cmp(b.id()))
    });
}

/// `Authorization: Bearer <token>` header value
pub(crate) fn bearer_header(token: &SecretString) -> Result<HeaderValue, ProviderError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| ProviderError::AuthenticationFailed(format!("Invalid token: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Turn non-success responses into `ProviderError`
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    Err(ProviderError::from_status(status.as_u16(), body.trim()))
}

/// Clamp a configured page size to what the backends accept
pub(crate) fn clamp_page_size(page_size: u32) -> u32 {
    page_size.clamp(1, MAX_PAGE_SIZE)
}
