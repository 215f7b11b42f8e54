//! Google Drive Provider
//!
//! Read-only listing and download client for the Drive API v3.
//! Works with My Drive, shared drives, "Shared with me" and "Recent".

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::http_retry::{send_with_retry, HttpRetryConfig};
use super::{
    bearer_header, check_status, clamp_page_size, sort_entries, DriveProvider, GoogleRecord,
    ListContext, ListPage, ProviderError, ProviderType, SharedDrive, MAX_PAGE_SIZE,
};
use crate::file_model::FileEntry;

/// Google Drive API base URL
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

const FILE_FIELDS: &str = "nextPageToken, files(id, name, mimeType, modifiedTime, size, parents, webViewLink, webContentLink, iconLink, driveId)";
const DRIVE_FIELDS: &str = "nextPageToken, drives(id, name)";

/// Google Drive file list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<GoogleRecord>,
    next_page_token: Option<String>,
}

/// Shared drive list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveListResponse {
    #[serde(default)]
    drives: Vec<SharedDrive>,
    next_page_token: Option<String>,
}

/// Google Drive client bound to one access token
pub struct GoogleDriveProvider {
    client: Client,
    token: SecretString,
    api_base: String,
    page_size: u32,
    /// Total deadline for listing calls; media downloads only use the client's timeouts
    request_timeout: Option<Duration>,
    retry: HttpRetryConfig,
}

impl GoogleDriveProvider {
    pub fn new(client: Client, token: SecretString) -> Self {
        Self {
            client,
            token,
            api_base: DRIVE_API_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            request_timeout: None,
            retry: HttpRetryConfig::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: HttpRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid API base {}: {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidConfig(format!("API base cannot be a base: {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `files.list` URL for one page of `context`
    pub(crate) fn files_url(
        &self,
        context: &ListContext,
        page_token: Option<&str>,
    ) -> Result<Url, ProviderError> {
        let mut url = self.endpoint(&["files"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("fields", FILE_FIELDS)
                .append_pair("pageSize", &self.page_size.to_string());

            match context {
                ListContext::Folder { folder_id, drive_id: None } => {
                    query
                        .append_pair("q", &format!("'{}' in parents and trashed = false", folder_id))
                        .append_pair("orderBy", "folder,name");
                }
                ListContext::Folder { folder_id, drive_id: Some(drive_id) } => {
                    // The drive's own id stands in for its root folder
                    let parent = if folder_id == "root" { drive_id } else { folder_id };
                    query
                        .append_pair("q", &format!("'{}' in parents and trashed = false", parent))
                        .append_pair("orderBy", "folder,name")
                        .append_pair("driveId", drive_id)
                        .append_pair("corpora", "drive")
                        .append_pair("includeItemsFromAllDrives", "true")
                        .append_pair("supportsAllDrives", "true");
                }
                ListContext::SharedWithMe => {
                    query
                        .append_pair("q", "sharedWithMe = true and trashed = false")
                        .append_pair("orderBy", "folder,name");
                }
                ListContext::Recent => {
                    query
                        .append_pair("q", "trashed = false")
                        .append_pair("orderBy", "modifiedTime desc");
                }
            }

            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    pub(crate) fn media_url(&self, file_id: &str) -> Result<Url, ProviderError> {
        let mut url = self.endpoint(&["files", file_id])?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("supportsAllDrives", "true");
        Ok(url)
    }

    pub(crate) fn drives_url(&self, page_token: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = self.endpoint(&["drives"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("fields", DRIVE_FIELDS)
                .append_pair("pageSize", &MAX_PAGE_SIZE.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url, deadline: Option<Duration>) -> Result<Response, ProviderError> {
        let mut builder = self
            .client
            .get(url)
            .header(AUTHORIZATION, bearer_header(&self.token)?);
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }
        let request = builder.build()?;
        let response = send_with_retry(&self.client, request, &self.retry).await?;
        check_status(response).await
    }

    async fn fetch_page(
        &self,
        context: &ListContext,
        page_token: Option<&str>,
    ) -> Result<ListPage, ProviderError> {
        let url = self.files_url(context, page_token)?;
        let body = self.get(url, self.request_timeout).await?.text().await?;
        let page = parse_file_list(&body)?;
        debug!("Google Drive {}: {} entries", context, page.entries.len());
        Ok(page)
    }
}

/// Decode a `files.list` body into a sorted page
pub(crate) fn parse_file_list(body: &str) -> Result<ListPage, ProviderError> {
    let list: FileListResponse = serde_json::from_str(body)?;
    let mut entries: Vec<FileEntry> = list.files.into_iter().map(FileEntry::from).collect();
    sort_entries(&mut entries);
    Ok(ListPage {
        entries,
        next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
    })
}

#[async_trait]
impl DriveProvider for GoogleDriveProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::GoogleDrive
    }

    async fn list_page(
        &self,
        context: &ListContext,
        page_token: Option<&str>,
    ) -> Result<ListPage, ProviderError> {
        self.fetch_page(context, page_token)
            .await
            .map_err(|e| ProviderError::listing_failed(context, page_token, e))
    }

    async fn download(&self, entry: &FileEntry) -> Result<Vec<u8>, ProviderError> {
        if entry.provider_type() != ProviderType::GoogleDrive {
            return Err(ProviderError::InvalidConfig(format!(
                "{} is not a Google Drive item",
                entry.name()
            )));
        }
        if !entry.can_download() {
            return Err(ProviderError::TransferFailed(format!(
                "{} has no downloadable content",
                entry.name()
            )));
        }

        let url = self.media_url(entry.id())?;
        let bytes = self.get(url, None).await?.bytes().await?;
        debug!("Downloaded {} ({} bytes)", entry.name(), bytes.len());
        Ok(bytes.to_vec())
    }

    fn supports_shared_drives(&self) -> bool {
        true
    }

    async fn list_shared_drives(&self) -> Result<Vec<SharedDrive>, ProviderError> {
        let mut drives = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = self.drives_url(page_token.as_deref())?;
            let body = self.get(url, self.request_timeout).await?.text().await?;
            let list: DriveListResponse = serde_json::from_str(&body)?;
            drives.extend(list.drives);

            match list.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) if page_token.as_deref() != Some(token.as_str()) => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Found {} shared drives", drives.len());
        Ok(drives)
    }
}
