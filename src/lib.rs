//! drive-export - browse Google Drive and OneDrive through one file model
//! and export selections (folders included) as zip archives.

pub mod archive;
pub mod config;
pub mod file_model;
pub mod navigation;
pub mod providers;
pub mod selection;
pub mod session;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveBuilder, ArchiveError, DownloadProgress, ExportReport, ExportedArchive};
pub use file_model::FileEntry;
pub use navigation::{Navigator, Section};
pub use providers::{DriveProvider, ListContext, ProviderError, ProviderType};
pub use session::Session;
