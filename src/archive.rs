//! Recursive archive builder
//!
//! Exports a selection of entries as one in-memory zip. Runs in two phases:
//!
//! 1. **Plan**: walk the selection depth-first, listing every selected folder
//!    in full, and produce the ordered list of leaves with their archive paths.
//!    Any listing failure aborts here, before a single byte is downloaded.
//! 2. **Materialize**: download leaves in plan order (optionally several in
//!    flight), stage them at their paths, report progress after each one, and
//!    write the zip once everything is staged.
//!
//! Leaves that cannot be fetched are skipped and reported; they stay counted
//! in the total.

use chrono::{DateTime, Datelike, Timelike, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Write};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::{ExportConfig, MAX_PARALLEL_DOWNLOADS};
use crate::file_model::FileEntry;
use crate::providers::http_retry::calculate_delay;
use crate::providers::{list_all, DriveProvider, HttpRetryConfig, ListContext, ProviderError};

/// Formats that gain nothing from deflate (stored as-is)
const PRECOMPRESSED_EXTENSIONS: &[&str] = &[
    "zip", "gz", "bz2", "xz", "7z", "rar", "zst", "lz4", "br", "jpg", "jpeg", "png", "gif",
    "webp", "avif", "heic", "heif", "mp3", "mp4", "mkv", "avi", "mov", "flac", "aac", "ogg",
    "opus", "m4a", "m4v", "webm", "pdf", "docx", "xlsx", "pptx", "wasm", "woff", "woff2",
];

/// Progress after each staged leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// No binary content (Google-native documents)
    NotDownloadable,
    DownloadFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotDownloadable => write!(f, "no downloadable content"),
            SkipReason::DownloadFailed(reason) => write!(f, "{}", reason),
        }
    }
}

/// A leaf left out of the archive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLeaf {
    pub path: String,
    pub id: String,
    pub reason: SkipReason,
}

/// What an export did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    pub total: usize,
    pub completed: usize,
    pub skipped: Vec<SkippedLeaf>,
    /// Selected folders (or sub-folders) that had nothing in them
    pub empty_folders: Vec<String>,
}

/// Finished export: the zip bytes plus the report
#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub report: ExportReport,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to list {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: ProviderError,
    },

    #[error("Nothing to export: the selection contains no files")]
    NothingToExport,

    #[error("None of the {} files could be downloaded", .skipped.len())]
    NoLeafDownloaded { skipped: Vec<SkippedLeaf> },

    #[error("Export cancelled")]
    Cancelled,

    #[error("Failed to assemble archive: {0}")]
    Assembly(String),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        ArchiveError::Assembly(e.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(e: std::io::Error) -> Self {
        ArchiveError::Assembly(e.to_string())
    }
}

/// Download behaviour of an export
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveOptions {
    pub max_parallel_downloads: usize,
    pub leaf_retries: u32,
    /// Backoff between leaf retries
    pub retry: HttpRetryConfig,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        ArchiveOptions::from(&ExportConfig::default())
    }
}

impl From<&ExportConfig> for ArchiveOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            max_parallel_downloads: config.max_parallel_downloads,
            leaf_retries: config.leaf_retries,
            retry: config.retry.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct PlannedLeaf {
    path: String,
    entry: FileEntry,
}

/// Phase-1 result, merged up the recursion
#[derive(Debug, Default)]
struct TraversalPlan {
    leaves: Vec<PlannedLeaf>,
    empty_folders: Vec<String>,
}

impl TraversalPlan {
    fn leaf(path: String, entry: FileEntry) -> Self {
        Self {
            leaves: vec![PlannedLeaf { path, entry }],
            empty_folders: Vec::new(),
        }
    }

    fn merge(&mut self, other: TraversalPlan) {
        self.leaves.extend(other.leaves);
        self.empty_folders.extend(other.empty_folders);
    }
}

struct StagedFile {
    path: String,
    modified: Option<DateTime<Utc>>,
    bytes: Vec<u8>,
}

/// Downloaded leaves keyed by path; a repeated path keeps its first slot and takes the new content
#[derive(Default)]
struct Staging {
    files: Vec<StagedFile>,
    index: HashMap<String, usize>,
}

impl Staging {
    fn insert(&mut self, path: &str, modified: Option<DateTime<Utc>>, bytes: Vec<u8>) {
        match self.index.get(path) {
            Some(&slot) => {
                debug!("Duplicate path {}, keeping the later file", path);
                self.files[slot].modified = modified;
                self.files[slot].bytes = bytes;
            }
            None => {
                self.index.insert(path.to_string(), self.files.len());
                self.files.push(StagedFile {
                    path: path.to_string(),
                    modified,
                    bytes,
                });
            }
        }
    }
}

enum LeafError {
    Skip(SkipReason),
    Cancelled,
}

/// One export job over a provider
pub struct ArchiveBuilder<'a> {
    provider: &'a dyn DriveProvider,
    options: ArchiveOptions,
    drive_scope: Option<String>,
    cancel: CancellationToken,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(provider: &'a dyn DriveProvider) -> Self {
        Self {
            provider,
            options: ArchiveOptions::default(),
            drive_scope: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ArchiveOptions) -> Self {
        self.options = options;
        self
    }

    /// Shared drive the selection was made in
    pub fn with_drive_scope(mut self, drive_id: Option<&str>) -> Self {
        self.drive_scope = drive_id.map(str::to_string);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Number of leaves the selection expands to (lists every selected folder)
    pub async fn count_leaves(&self, selection: &[FileEntry]) -> Result<usize, ArchiveError> {
        Ok(self.plan(selection).await?.leaves.len())
    }

    /// Export `selection` as `<label>.zip`, calling `on_progress` after every staged leaf
    pub async fn build<F>(
        &self,
        selection: &[FileEntry],
        label: &str,
        mut on_progress: F,
    ) -> Result<ExportedArchive, ArchiveError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let file_name = archive_file_name(label);
        let plan = self.plan(selection).await?;
        let total = plan.leaves.len();
        if total == 0 {
            info!("Nothing to export for {} ({} empty folders)", file_name, plan.empty_folders.len());
            return Err(ArchiveError::NothingToExport);
        }
        if self.cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }

        info!("Exporting {} files into {}", total, file_name);
        on_progress(DownloadProgress { current: 0, total });

        let parallel = self.options.max_parallel_downloads.clamp(1, MAX_PARALLEL_DOWNLOADS);
        let mut results = stream::iter(plan.leaves.iter())
            .map(|leaf| async move { (leaf, self.fetch_leaf(leaf).await) })
            .buffered(parallel);

        let mut staging = Staging::default();
        let mut skipped = Vec::new();
        let mut completed = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ArchiveError::Cancelled),
                next = results.next() => next,
            };
            let Some((leaf, outcome)) = next else { break };

            match outcome {
                Ok(bytes) => {
                    staging.insert(&leaf.path, leaf.entry.modified_time(), bytes);
                    completed += 1;
                    on_progress(DownloadProgress { current: completed, total });
                }
                Err(LeafError::Skip(reason)) => {
                    warn!("Skipping {}: {}", leaf.path, reason);
                    skipped.push(SkippedLeaf {
                        path: leaf.path.clone(),
                        id: leaf.entry.id().to_string(),
                        reason,
                    });
                }
                Err(LeafError::Cancelled) => return Err(ArchiveError::Cancelled),
            }
        }
        drop(results);

        if completed == 0 {
            return Err(ArchiveError::NoLeafDownloaded { skipped });
        }

        let files = staging.files;
        let bytes = tokio::task::spawn_blocking(move || write_zip(files))
            .await
            .map_err(|e| ArchiveError::Assembly(e.to_string()))??;

        info!(
            "Export {} finished: {}/{} files, {} skipped, {} bytes",
            file_name,
            completed,
            total,
            skipped.len(),
            bytes.len()
        );

        Ok(ExportedArchive {
            file_name,
            bytes,
            report: ExportReport {
                total,
                completed,
                skipped,
                empty_folders: plan.empty_folders,
            },
        })
    }

    async fn plan(&self, selection: &[FileEntry]) -> Result<TraversalPlan, ArchiveError> {
        let mut plan = TraversalPlan::default();
        for entry in selection {
            let part = self
                .plan_entry(entry.clone(), String::new(), self.drive_scope.clone())
                .await?;
            plan.merge(part);
        }
        debug!("Planned {} leaves, {} empty folders", plan.leaves.len(), plan.empty_folders.len());
        Ok(plan)
    }

    fn plan_entry(
        &self,
        entry: FileEntry,
        prefix: String,
        drive_id: Option<String>,
    ) -> BoxFuture<'_, Result<TraversalPlan, ArchiveError>> {
        async move {
            let path = join_path(&prefix, entry.name());
            if !entry.is_folder() {
                return Ok(TraversalPlan::leaf(path, entry));
            }
            if self.cancel.is_cancelled() {
                return Err(ArchiveError::Cancelled);
            }

            let drive_id = entry.drive_id().map(str::to_string).or(drive_id);
            let context = ListContext::Folder {
                folder_id: entry.listing_id().to_string(),
                drive_id: drive_id.clone(),
            };
            let children = list_all(self.provider, &context)
                .await
                .map_err(|source| ArchiveError::Listing {
                    path: path.clone(),
                    source,
                })?;

            let mut plan = TraversalPlan::default();
            if children.is_empty() {
                debug!("Folder {} is empty", path);
                plan.empty_folders.push(path);
                return Ok(plan);
            }
            for child in children {
                plan.merge(self.plan_entry(child, path.clone(), drive_id.clone()).await?);
            }
            Ok(plan)
        }
        .boxed()
    }

    async fn fetch_leaf(&self, leaf: &PlannedLeaf) -> Result<Vec<u8>, LeafError> {
        if !leaf.entry.can_download() {
            return Err(LeafError::Skip(SkipReason::NotDownloadable));
        }

        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(LeafError::Cancelled);
            }
            match self.provider.download(&leaf.entry).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_recoverable() && attempt < self.options.leaf_retries => {
                    let delay = calculate_delay(attempt, &self.options.retry);
                    debug!(
                        "Download of {} failed ({}). Retry {}/{} after {:?}",
                        leaf.path, e, attempt + 1, self.options.leaf_retries, delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(LeafError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(LeafError::Skip(SkipReason::DownloadFailed(e.to_string()))),
            }
        }
    }
}

/// Make a provider name usable as one archive path segment
fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" => "untitled".to_string(),
        "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    let segment = sanitize_segment(name);
    if prefix.is_empty() {
        segment
    } else {
        format!("{}/{}", prefix, segment)
    }
}

/// `<label>.zip`, "export" when the label is blank
pub fn archive_file_name(label: &str) -> String {
    let label = label.trim();
    let stem = match label.len().checked_sub(4) {
        Some(cut) if label.is_char_boundary(cut) && label[cut..].eq_ignore_ascii_case(".zip") => &label[..cut],
        _ => label,
    };
    if stem.trim().is_empty() {
        "export.zip".to_string()
    } else {
        format!("{}.zip", sanitize_segment(stem))
    }
}

/// Check if a file should be compressed based on its extension
fn should_compress(path: &str) -> bool {
    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension {
        Some(ext) => !PRECOMPRESSED_EXTENSIONS.contains(&ext.as_str()),
        None => true,
    }
}

/// Zip timestamps only cover 1980-2107
fn zip_timestamp(time: DateTime<Utc>) -> Option<zip::DateTime> {
    let year = u16::try_from(time.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .ok()
}

fn write_zip(files: Vec<StagedFile>) -> Result<Vec<u8>, ArchiveError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for file in files {
        let method = if should_compress(&file.path) {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        let mut options = SimpleFileOptions::default().compression_method(method);
        if let Some(timestamp) = file.modified.and_then(zip_timestamp) {
            options = options.last_modified_time(timestamp);
        }

        zip.start_file(file.path, options)?;
        zip.write_all(&file.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{gdoc, gfile, gfolder, mfile, mfolder, mshared_folder, FakeDrive};
    use std::io::Read;

    fn fast_options() -> ArchiveOptions {
        ArchiveOptions {
            max_parallel_downloads: 1,
            leaf_retries: 2,
            retry: HttpRetryConfig {
                max_retries: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
                backoff_multiplier: 2.0,
            },
        }
    }

    fn zip_contents(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = String::new();
                file.read_to_string(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    fn names(bytes: &[u8]) -> Vec<String> {
        zip_contents(bytes).into_iter().map(|(name, _)| name).collect()
    }

    #[tokio::test]
    async fn test_file_only_selection() {
        let drive = FakeDrive::new();
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());
        let selection = vec![gfile("a", "a.txt"), gfile("b", "b.txt")];

        let mut seen = Vec::new();
        let archive = builder.build(&selection, "picked", |p| seen.push(p)).await.unwrap();

        assert_eq!(archive.file_name, "picked.zip");
        assert_eq!(archive.report.total, 2);
        assert_eq!(archive.report.completed, 2);
        assert_eq!(
            seen.iter().map(|p| (p.current, p.total)).collect::<Vec<_>>(),
            vec![(0, 2), (1, 2), (2, 2)]
        );
        assert_eq!(
            zip_contents(&archive.bytes),
            vec![
                ("a.txt".to_string(), "data:a".to_string()),
                ("b.txt".to_string(), "data:b".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_nested_folders_keep_structure() {
        let drive = FakeDrive::new();
        drive.add_children("B", vec![gfile("C", "fileC"), gfolder("D", "folderD")]);
        drive.add_children("D", vec![gfile("E", "fileE")]);
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());
        let selection = vec![gfile("A", "fileA"), gfolder("B", "folderB")];

        assert_eq!(builder.count_leaves(&selection).await.unwrap(), 3);

        let archive = builder.build(&selection, "nested", |_| {}).await.unwrap();
        assert_eq!(archive.report.total, 3);
        assert_eq!(archive.report.completed, 3);

        let mut paths = names(&archive.bytes);
        paths.sort();
        assert_eq!(paths, vec!["fileA", "folderB/fileC", "folderB/folderD/fileE"]);
    }

    #[tokio::test]
    async fn test_empty_folder_contributes_nothing() {
        let drive = FakeDrive::new();
        drive.add_children("Docs", vec![gfolder("Old", "old"), gfile("r", "readme.md")]);
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());

        let archive = builder
            .build(&[gfolder("Docs", "Docs")], "docs", |_| {})
            .await
            .unwrap();
        assert_eq!(names(&archive.bytes), vec!["Docs/readme.md"]);
        assert_eq!(archive.report.empty_folders, vec!["Docs/old"]);
        assert_eq!(archive.report.total, 1);
    }

    #[tokio::test]
    async fn test_nothing_to_export() {
        let drive = FakeDrive::new();
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());

        assert!(matches!(
            builder.build(&[], "none", |_| {}).await,
            Err(ArchiveError::NothingToExport)
        ));
        assert!(matches!(
            builder.build(&[gfolder("E", "Empty")], "empty", |_| {}).await,
            Err(ArchiveError::NothingToExport)
        ));
        assert!(drive.download_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_leaf_is_skipped_and_reported() {
        let drive = FakeDrive::new();
        drive.fail_download("f2");
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());
        let selection = vec![gfile("f1", "one.txt"), gfile("f2", "two.txt"), gfile("f3", "three.txt")];

        let mut seen = Vec::new();
        let archive = builder.build(&selection, "partial", |p| seen.push(p.current)).await.unwrap();

        assert_eq!(names(&archive.bytes), vec!["one.txt", "three.txt"]);
        assert_eq!(archive.report.total, 3);
        assert_eq!(archive.report.completed, 2);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(archive.report.skipped.len(), 1);
        assert_eq!(archive.report.skipped[0].path, "two.txt");
        assert!(matches!(archive.report.skipped[0].reason, SkipReason::DownloadFailed(_)));
    }

    #[tokio::test]
    async fn test_every_leaf_failing_is_an_error() {
        let drive = FakeDrive::new();
        drive.fail_download("f1");
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());

        match builder.build(&[gfile("f1", "one.txt"), gdoc("d1", "Notes")], "x", |_| {}).await {
            Err(ArchiveError::NoLeafDownloaded { skipped }) => {
                assert_eq!(skipped.len(), 2);
                assert_eq!(skipped[1].reason, SkipReason::NotDownloadable);
            }
            other => panic!("unexpected result: {:?}", other.map(|a| a.report)),
        }
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_before_downloads() {
        let drive = FakeDrive::new();
        drive.add_children("B", vec![gfile("C", "c.txt"), gfolder("X", "locked")]);
        drive.fail_listing("X");
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());

        let err = builder
            .build(&[gfile("A", "a.txt"), gfolder("B", "B")], "x", |_| {})
            .await
            .unwrap_err();
        match err {
            ArchiveError::Listing { path, source } => {
                assert_eq!(path, "B/locked");
                assert!(matches!(source, ProviderError::ListingFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(drive.download_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_leaves() {
        let drive = FakeDrive::new();
        let token = CancellationToken::new();
        let trigger = token.clone();
        let builder = ArchiveBuilder::new(&drive)
            .with_options(fast_options())
            .with_cancellation(token);
        let selection = vec![gfile("1", "1.txt"), gfile("2", "2.txt"), gfile("3", "3.txt")];

        let result = builder
            .build(&selection, "x", |p| {
                if p.current == 1 {
                    trigger.cancel();
                }
            })
            .await;
        assert!(matches!(result, Err(ArchiveError::Cancelled)));
        assert!(drive.download_calls().len() < 3);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let drive = FakeDrive::new();
        let token = CancellationToken::new();
        token.cancel();
        let builder = ArchiveBuilder::new(&drive).with_cancellation(token);

        assert!(matches!(
            builder.build(&[gfile("1", "1.txt")], "x", |_| {}).await,
            Err(ArchiveError::Cancelled)
        ));
        assert!(drive.download_calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_paths_last_write_wins() {
        let drive = FakeDrive::new();
        drive.set_content("old", b"first");
        drive.set_content("new", b"second");
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());
        let selection = vec![gfile("old", "same.txt"), gfile("x", "other.txt"), gfile("new", "same.txt")];

        let archive = builder.build(&selection, "dups", |_| {}).await.unwrap();
        assert_eq!(
            zip_contents(&archive.bytes),
            vec![
                ("same.txt".to_string(), "second".to_string()),
                ("other.txt".to_string(), "data:x".to_string())
            ]
        );
        assert_eq!(archive.report.completed, 3);
    }

    #[tokio::test]
    async fn test_parallel_downloads_keep_plan_order() {
        let drive = FakeDrive::new();
        let selection: Vec<FileEntry> = (0..6).map(|i| gfile(&format!("f{i}"), &format!("{i}.txt"))).collect();
        let builder = ArchiveBuilder::new(&drive).with_options(ArchiveOptions {
            max_parallel_downloads: 4,
            ..fast_options()
        });

        let mut seen = Vec::new();
        let archive = builder.build(&selection, "par", |p| seen.push(p.current)).await.unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(names(&archive.bytes), vec!["0.txt", "1.txt", "2.txt", "3.txt", "4.txt", "5.txt"]);
    }

    #[tokio::test]
    async fn test_native_docs_are_skipped_without_download() {
        let drive = FakeDrive::new();
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());

        let archive = builder
            .build(&[gdoc("d1", "Plan"), gfile("f1", "plan.pdf")], "docs", |_| {})
            .await
            .unwrap();
        assert_eq!(names(&archive.bytes), vec!["plan.pdf"]);
        assert_eq!(archive.report.skipped[0].reason, SkipReason::NotDownloadable);
        assert_eq!(drive.download_calls(), vec!["f1".to_string()]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let drive = FakeDrive::new();
        drive.flaky_download("f1", 2);
        drive.flaky_download("f2", 3);
        let builder = ArchiveBuilder::new(&drive).with_options(fast_options());

        let archive = builder
            .build(&[gfile("f1", "a.txt"), gfile("f2", "b.txt")], "retry", |_| {})
            .await
            .unwrap();
        assert_eq!(names(&archive.bytes), vec!["a.txt"]);
        assert_eq!(archive.report.skipped[0].path, "b.txt");
        assert_eq!(drive.download_calls().len(), 6);
    }

    #[tokio::test]
    async fn test_drive_scope_reaches_nested_listings() {
        let drive = FakeDrive::new();
        drive.add_children("B", vec![gfolder("C", "C")]);
        drive.add_children("C", vec![gfile("f", "f.txt")]);
        let builder = ArchiveBuilder::new(&drive).with_drive_scope(Some("0AX"));

        assert_eq!(builder.count_leaves(&[gfolder("B", "B")]).await.unwrap(), 1);
        assert_eq!(
            drive.list_calls(),
            vec![ListContext::drive_folder("B", "0AX"), ListContext::drive_folder("C", "0AX")]
        );
    }

    #[tokio::test]
    async fn test_shared_onedrive_folder_lists_owner_drive() {
        let drive = FakeDrive::new();
        drive.add_children("remote", vec![mfolder("m2", "Drafts"), mfile("m1", "report.txt")]);
        drive.add_children("m2", vec![mfile("m3", "v1.txt")]);
        let builder = ArchiveBuilder::new(&drive)
            .with_options(fast_options())
            .with_drive_scope(Some("scope"));
        let selection = vec![mshared_folder("local", "Budget", "remote", "owner")];

        let archive = builder.build(&selection, "shared", |_| {}).await.unwrap();

        assert_eq!(
            drive.list_calls(),
            vec![
                ListContext::drive_folder("remote", "owner"),
                ListContext::drive_folder("m2", "owner"),
            ]
        );
        assert_eq!(
            zip_contents(&archive.bytes),
            vec![
                ("Budget/Drafts/v1.txt".to_string(), "data:m3".to_string()),
                ("Budget/report.txt".to_string(), "data:m1".to_string()),
            ]
        );
        assert_eq!(drive.download_calls(), vec!["m3", "m1"]);
        assert_eq!(archive.report.total, 2);
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_segment(".."), "_");
        assert_eq!(sanitize_segment("   "), "untitled");
        assert_eq!(join_path("x/y", "z.txt"), "x/y/z.txt");
        assert_eq!(join_path("", "../etc"), ".._etc");
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name("Project Files"), "Project Files.zip");
        assert_eq!(archive_file_name("backup.ZIP"), "backup.zip");
        assert_eq!(archive_file_name("  "), "export.zip");
        assert_eq!(archive_file_name("a/b"), "a_b.zip");
    }

    #[test]
    fn test_should_compress() {
        assert!(should_compress("notes/readme.txt"));
        assert!(should_compress("Makefile"));
        assert!(!should_compress("photos/IMG_0001.JPG"));
        assert!(!should_compress("backup.tar.gz"));
    }

    #[test]
    fn test_zip_timestamp_range() {
        let inside = DateTime::parse_from_rfc3339("2024-01-15T12:30:45Z").unwrap().with_timezone(&Utc);
        assert!(zip_timestamp(inside).is_some());
        let before = DateTime::parse_from_rfc3339("1970-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        assert!(zip_timestamp(before).is_none());
    }
}
