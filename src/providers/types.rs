//! Shared types for storage providers
//!
//! This module contains the provider-native record shapes returned by the
//! Google Drive and Microsoft Graph APIs, the listing context/page types, and
//! the provider error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::file_model::FileEntry;

/// Supported storage provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Google Drive (Drive API v3)
    GoogleDrive,
    /// Microsoft OneDrive (Graph API v1.0)
    OneDrive,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::GoogleDrive => write!(f, "Google Drive"),
            ProviderType::OneDrive => write!(f, "OneDrive"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "googledrive" | "gdrive" => Ok(ProviderType::GoogleDrive),
            "microsoft" | "onedrive" | "graph" => Ok(ProviderType::OneDrive),
            other => Err(ProviderError::InvalidConfig(format!("Unknown provider: {}", other))),
        }
    }
}

/// Google Drive file metadata as returned by `files.list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<String>,
    /// Decimal byte count; absent for folders and native Docs
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    /// Only present for files with binary content
    #[serde(default)]
    pub web_content_link: Option<String>,
    #[serde(default)]
    pub icon_link: Option<String>,
    /// Set for items living in a shared drive
    #[serde(default)]
    pub drive_id: Option<String>,
}

/// OneDrive item metadata as returned by Graph `children`, `recent` and `sharedWithMe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub folder: Option<FolderFacet>,
    #[serde(default)]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
    #[serde(default)]
    pub parent_reference: Option<ParentReference>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default, rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
    /// Items shared with the user point at the owner's drive through this facet
    #[serde(default)]
    pub remote_item: Option<RemoteItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub drive_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub id: String,
    #[serde(default)]
    pub folder: Option<FolderFacet>,
    #[serde(default)]
    pub parent_reference: Option<ParentReference>,
}

/// Provider-native record, one variant per backend.
///
/// Only `file_model` looks inside; everything else works on `FileEntry`.
#[derive(Debug, Clone, PartialEq)]
pub enum DriveRecord {
    Google(GoogleRecord),
    Microsoft(MicrosoftRecord),
}

/// Google shared drive (`drives.list`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDrive {
    pub id: String,
    pub name: String,
}

/// What a listing call enumerates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListContext {
    /// Children of a folder; `drive_id` scopes the call to a shared drive
    Folder {
        folder_id: String,
        drive_id: Option<String>,
    },
    SharedWithMe,
    Recent,
}

impl ListContext {
    pub fn folder(folder_id: impl Into<String>) -> Self {
        ListContext::Folder {
            folder_id: folder_id.into(),
            drive_id: None,
        }
    }

    pub fn drive_folder(folder_id: impl Into<String>, drive_id: impl Into<String>) -> Self {
        ListContext::Folder {
            folder_id: folder_id.into(),
            drive_id: Some(drive_id.into()),
        }
    }
}

impl fmt::Display for ListContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListContext::Folder { folder_id, drive_id: None } => write!(f, "folder {}", folder_id),
            ListContext::Folder { folder_id, drive_id: Some(drive) } => {
                write!(f, "folder {} in drive {}", folder_id, drive)
            }
            ListContext::SharedWithMe => write!(f, "shared with me"),
            ListContext::Recent => write!(f, "recent"),
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<FileEntry>,
    pub next_page_token: Option<String>,
}

/// Provider error type
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Listing failed for {context} ({}): {reason}", page_label(.page))]
    ListingFailed {
        context: String,
        page: Option<String>,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

fn page_label(page: &Option<String>) -> String {
    match page {
        Some(token) => format!("page {}", token),
        None => "first page".to_string(),
    }
}

impl ProviderError {
    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::NetworkError(_) | ProviderError::ServerError(_)
        )
    }

    /// Map a non-success HTTP status to an error kind
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };
        match status {
            401 => ProviderError::AuthenticationFailed(detail),
            403 => ProviderError::PermissionDenied(detail),
            404 => ProviderError::NotFound(detail),
            408 => ProviderError::Timeout,
            500..=599 => ProviderError::ServerError(detail),
            _ => ProviderError::Other(detail),
        }
    }

    /// Wrap a failure of one listing page. Already wrapped errors pass through.
    pub fn listing_failed(context: &ListContext, page: Option<&str>, cause: ProviderError) -> Self {
        match cause {
            already @ ProviderError::ListingFailed { .. } => already,
            other => ProviderError::ListingFailed {
                context: context.to_string(),
                page: page.map(str::to_string),
                reason: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::ParseError(e.to_string())
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::ParseError(e.to_string())
    }
}
