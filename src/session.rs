//! Session - one signed-in provider connection
//!
//! A session owns the HTTP client, the bearer token and the export settings.
//! Providers handed out by a session are bound to its token. Signing out is
//! dropping the session; nothing here is global.

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::archive::{ArchiveBuilder, ArchiveError, ArchiveOptions, DownloadProgress, ExportedArchive};
use crate::config::ExportConfig;
use crate::file_model::FileEntry;
use crate::providers::{
    DriveProvider, GoogleDriveProvider, OneDriveProvider, ProviderError, ProviderType,
};

pub struct Session {
    /// Unique session identifier
    id: String,
    provider_type: ProviderType,
    created_at: DateTime<Utc>,
    client: Client,
    token: SecretString,
    config: ExportConfig,
}

impl Session {
    pub fn new(
        provider_type: ProviderType,
        token: impl Into<String>,
        mut config: ExportConfig,
    ) -> Result<Self, ProviderError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ProviderError::AuthenticationFailed("Empty access token".to_string()));
        }
        config
            .validate()
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

        // Listing calls get a total deadline per request; downloads only fail on a stall
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("drive-export/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider_type,
            created_at: Utc::now(),
            client,
            token: SecretString::from(token),
            config,
        };
        info!("Session {} started for {}", session.id, provider_type);
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Deadline for listing and metadata calls
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    /// Listing/download client bound to this session's token
    pub fn provider(&self) -> Box<dyn DriveProvider> {
        let token = SecretString::from(self.token.expose_secret().to_string());
        match self.provider_type {
            ProviderType::GoogleDrive => Box::new(
                GoogleDriveProvider::new(self.client.clone(), token)
                    .with_api_base(self.config.google_api_base.as_str())
                    .with_page_size(self.config.page_size)
                    .with_request_timeout(self.request_timeout())
                    .with_retry(self.config.retry.clone()),
            ),
            ProviderType::OneDrive => Box::new(
                OneDriveProvider::new(self.client.clone(), token)
                    .with_api_base(self.config.graph_api_base.as_str())
                    .with_page_size(self.config.page_size)
                    .with_request_timeout(self.request_timeout())
                    .with_retry(self.config.retry.clone()),
            ),
        }
    }

    /// Archive builder over `provider` with this session's download settings
    pub fn archive_builder<'a>(&self, provider: &'a dyn DriveProvider) -> ArchiveBuilder<'a> {
        ArchiveBuilder::new(provider).with_options(ArchiveOptions::from(&self.config))
    }

    /// Export `selection` through a fresh provider
    pub async fn export<F>(
        &self,
        selection: &[FileEntry],
        label: &str,
        drive_scope: Option<&str>,
        cancel: CancellationToken,
        on_progress: F,
    ) -> Result<ExportedArchive, ArchiveError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let provider = self.provider();
        let builder = self
            .archive_builder(provider.as_ref())
            .with_drive_scope(drive_scope)
            .with_cancellation(cancel);
        let exported = builder.build(selection, label, on_progress).await?;
        Ok(exported)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        info!("Session {} closed", self.id);
    }
}
