//! Unified file model
//!
//! Normalizes Google Drive and OneDrive records into one `FileEntry` view.
//! The predicates below are the only place that looks at provider-specific
//! fields; every other module works on `FileEntry`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::providers::{DriveRecord, GoogleRecord, MicrosoftRecord, ProviderType};

/// MIME type Google Drive uses for folders
pub const GOOGLE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Whether the record is a folder
pub fn is_folder(record: &DriveRecord) -> bool {
    match record {
        DriveRecord::Google(file) => file.mime_type == GOOGLE_FOLDER_MIME,
        DriveRecord::Microsoft(item) => {
            item.folder.is_some()
                || item.remote_item.as_ref().is_some_and(|remote| remote.folder.is_some())
        }
    }
}

/// Last modification time; `None` when missing or not RFC 3339
pub fn modified_time(record: &DriveRecord) -> Option<DateTime<Utc>> {
    let raw = match record {
        DriveRecord::Google(file) => file.modified_time.as_deref(),
        DriveRecord::Microsoft(item) => item.last_modified_date_time.as_deref(),
    }?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Size in bytes, if the provider reports one
pub fn size(record: &DriveRecord) -> Option<u64> {
    match record {
        DriveRecord::Google(file) => file.size.as_deref().and_then(|s| s.trim().parse().ok()),
        DriveRecord::Microsoft(item) => item.size,
    }
}

/// Whether the record has binary content that can be fetched.
///
/// Google-native documents carry no `webContentLink` and cannot be fetched
/// with `alt=media`.
pub fn can_download(record: &DriveRecord) -> bool {
    if is_folder(record) {
        return false;
    }
    match record {
        DriveRecord::Google(file) => file.web_content_link.is_some(),
        DriveRecord::Microsoft(_) => true,
    }
}

/// Id to use when listing children or downloading content
fn listing_id(record: &DriveRecord) -> &str {
    match record {
        DriveRecord::Google(file) => &file.id,
        DriveRecord::Microsoft(item) => item
            .remote_item
            .as_ref()
            .map(|remote| remote.id.as_str())
            .unwrap_or(&item.id),
    }
}

/// Drive the record lives in, when the provider says so
fn drive_id(record: &DriveRecord) -> Option<&str> {
    match record {
        DriveRecord::Google(file) => file.drive_id.as_deref(),
        DriveRecord::Microsoft(item) => item
            .remote_item
            .as_ref()
            .and_then(|remote| remote.parent_reference.as_ref())
            .or(item.parent_reference.as_ref())
            .and_then(|parent| parent.drive_id.as_deref()),
    }
}

/// Normalized file or folder, built only from a provider record
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    id: String,
    name: String,
    is_folder: bool,
    modified_time: Option<DateTime<Utc>>,
    size: Option<u64>,
    can_download: bool,
    record: DriveRecord,
}

impl FileEntry {
    pub fn from_record(record: DriveRecord) -> Self {
        let (id, name) = match &record {
            DriveRecord::Google(file) => (file.id.clone(), file.name.clone()),
            DriveRecord::Microsoft(item) => (item.id.clone(), item.name.clone()),
        };
        Self {
            id,
            name,
            is_folder: is_folder(&record),
            modified_time: modified_time(&record),
            size: size(&record),
            can_download: can_download(&record),
            record,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    pub fn modified_time(&self) -> Option<DateTime<Utc>> {
        self.modified_time
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn can_download(&self) -> bool {
        self.can_download
    }

    /// The provider-native record this entry was built from
    pub fn record(&self) -> &DriveRecord {
        &self.record
    }

    pub fn provider_type(&self) -> ProviderType {
        match self.record {
            DriveRecord::Google(_) => ProviderType::GoogleDrive,
            DriveRecord::Microsoft(_) => ProviderType::OneDrive,
        }
    }

    /// Id used for children listing and downloads (differs for shared OneDrive items)
    pub fn listing_id(&self) -> &str {
        listing_id(&self.record)
    }

    pub fn drive_id(&self) -> Option<&str> {
        drive_id(&self.record)
    }

    /// Serializable summary for display layers
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            is_folder: self.is_folder,
            modified_time: self.modified_time,
            size: self.size,
            can_download: self.can_download,
            provider: self.provider_type(),
        }
    }
}

impl From<GoogleRecord> for FileEntry {
    fn from(record: GoogleRecord) -> Self {
        FileEntry::from_record(DriveRecord::Google(record))
    }
}

impl From<MicrosoftRecord> for FileEntry {
    fn from(record: MicrosoftRecord) -> Self {
        FileEntry::from_record(DriveRecord::Microsoft(record))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub modified_time: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub can_download: bool,
    pub provider: ProviderType,
}

/// Human-readable size ("-" when unknown)
pub fn format_size(size: Option<u64>) -> String {
    let Some(bytes) = size else {
        return "-".to_string();
    };
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
