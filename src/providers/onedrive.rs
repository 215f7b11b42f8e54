//! OneDrive Provider
//!
//! Read-only listing and download client for Microsoft Graph v1.0.
//! Paging follows the absolute `@odata.nextLink` returned by Graph.

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
    bearer_header, check_status, clamp_page_size, sort_entries, DriveProvider, ListContext,
    ListPage, MicrosoftRecord, ProviderError, ProviderType, MAX_PAGE_SIZE,
};
use crate::file_model::FileEntry;

/// Microsoft Graph API base URL
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const ITEM_SELECT: &str =
    "id,name,folder,file,size,lastModifiedDateTime,parentReference,webUrl,remoteItem";

/// Children / recent / sharedWithMe response
#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    #[serde(default)]
    value: Vec<MicrosoftRecord>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadMetadata {
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

/// OneDrive client bound to one access token
pub struct OneDriveProvider {
    client: Client,
    token: SecretString,
    api_base: String,
    page_size: u32,
    /// Total deadline for listing and metadata calls; content downloads only use the client's timeouts
    request_timeout: Option<Duration>,
    retry: HttpRetryConfig,
}

impl OneDriveProvider {
    pub fn new(client: Client, token: SecretString) -> Self {
        Self {
            client,
            token,
            api_base: GRAPH_API_BASE.to_string(),
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

    /// Item path prefix: `me/drive` or `drives/{id}`
    fn drive_segments<'a>(drive_id: Option<&'a str>) -> Vec<&'a str> {
        match drive_id {
            Some(drive) => vec!["drives", drive],
            None => vec!["me", "drive"],
        }
    }

    /// First-page URL for `context`
    pub(crate) fn children_url(&self, context: &ListContext) -> Result<Url, ProviderError> {
        match context {
            ListContext::Folder { folder_id, drive_id } => {
                let mut segments = Self::drive_segments(drive_id.as_deref());
                if folder_id == "root" {
                    segments.extend(["root", "children"]);
                } else {
                    segments.extend(["items", folder_id.as_str(), "children"]);
                }
                let mut url = self.endpoint(&segments)?;
                url.query_pairs_mut()
                    .append_pair("$select", ITEM_SELECT)
                    .append_pair("$top", &self.page_size.to_string());
                Ok(url)
            }
            ListContext::SharedWithMe => self.endpoint(&["me", "drive", "sharedWithMe"]),
            ListContext::Recent => self.endpoint(&["me", "drive", "recent"]),
        }
    }

    /// Graph returns the next page as an absolute URL; only follow it back to our own API
    pub(crate) fn next_link_url(&self, next_link: &str) -> Result<Url, ProviderError> {
        let base = Url::parse(&self.api_base)
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid API base {}: {}", self.api_base, e)))?;
        let link = Url::parse(next_link)
            .map_err(|e| ProviderError::ParseError(format!("Bad next link: {}", e)))?;

        let same_origin = link.scheme() == base.scheme()
            && link.host_str() == base.host_str()
            && link.port_or_known_default() == base.port_or_known_default();
        let base_segments: Vec<&str> = base
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let link_segments: Vec<&str> = link
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();

        if !same_origin || !link_segments.starts_with(&base_segments) {
            return Err(ProviderError::InvalidConfig(format!(
                "Refusing to follow next link outside {}",
                self.api_base
            )));
        }
        Ok(link)
    }

    pub(crate) fn metadata_url(&self, entry: &FileEntry) -> Result<Url, ProviderError> {
        let mut segments = Self::drive_segments(entry.drive_id());
        segments.extend(["items", entry.listing_id()]);
        let mut url = self.endpoint(&segments)?;
        url.query_pairs_mut()
            .append_pair("$select", "id,@microsoft.graph.downloadUrl");
        Ok(url)
    }

    /// GET `url`; the bearer header goes only to Graph, never to download links
    async fn send(
        &self,
        url: Url,
        authorized: bool,
        deadline: Option<Duration>,
    ) -> Result<Response, ProviderError> {
        let mut builder = self.client.get(url);
        if authorized {
            builder = builder.header(AUTHORIZATION, bearer_header(&self.token)?);
        }
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }
        let response = send_with_retry(&self.client, builder.build()?, &self.retry).await?;
        check_status(response).await
    }

    async fn fetch_page(
        &self,
        context: &ListContext,
        page_token: Option<&str>,
    ) -> Result<ListPage, ProviderError> {
        let url = match page_token {
            Some(link) => self.next_link_url(link)?,
            None => self.children_url(context)?,
        };
        let body = self.send(url, true, self.request_timeout).await?.text().await?;
        let page = parse_children(&body)?;
        debug!("OneDrive {}: {} entries", context, page.entries.len());
        Ok(page)
    }
}

/// Decode a Graph collection body into a sorted page
pub(crate) fn parse_children(body: &str) -> Result<ListPage, ProviderError> {
    let response: ChildrenResponse = serde_json::from_str(body)?;
    let mut entries: Vec<FileEntry> = response.value.into_iter().map(FileEntry::from).collect();
    sort_entries(&mut entries);
    Ok(ListPage {
        entries,
        next_page_token: response.next_link.filter(|l| !l.is_empty()),
    })
}

#[async_trait]
impl DriveProvider for OneDriveProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OneDrive
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
        if entry.provider_type() != ProviderType::OneDrive {
            return Err(ProviderError::InvalidConfig(format!(
                "{} is not a OneDrive item",
                entry.name()
            )));
        }
        if !entry.can_download() {
            return Err(ProviderError::TransferFailed(format!(
                "{} has no downloadable content",
                entry.name()
            )));
        }

        // The download URL in listings goes stale; fetch a fresh one
        let metadata_url = self.metadata_url(entry)?;
        let body = self.send(metadata_url, true, self.request_timeout).await?.text().await?;
        let metadata: DownloadMetadata = serde_json::from_str(&body)?;
        let link = metadata.download_url.ok_or_else(|| {
            ProviderError::TransferFailed(format!("Download URL not available for {}", entry.name()))
        })?;
        let link = Url::parse(&link)
            .map_err(|e| ProviderError::ParseError(format!("Bad download URL: {}", e)))?;

        // Pre-authenticated URL; no bearer header
        let bytes = self.send(link, false, None).await?.bytes().await?;
        debug!("Downloaded {} ({} bytes)", entry.name(), bytes.len());
        Ok(bytes.to_vec())
    }
}
