//! Navigation state machine
//!
//! Tracks the section, current folder and breadcrumb trail, and owns the
//! selection for the listing being shown. Every successful transition
//! clears the selection.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::file_model::FileEntry;
use crate::providers::{list_all, DriveProvider, ListContext, ProviderError, SharedDrive};
use crate::selection::SelectionSet;

/// Top-level place the user is browsing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    MyDrive,
    SharedWithMe,
    Recent,
    SharedDrive(String),
}

impl Section {
    /// Folder id used at the root of the section
    pub fn root_id(&self) -> &'static str {
        match self {
            Section::MyDrive | Section::SharedDrive(_) => "root",
            Section::SharedWithMe => "shared-with-me",
            Section::Recent => "recent",
        }
    }

    fn root_name(&self) -> String {
        match self {
            Section::MyDrive => "My Drive".to_string(),
            Section::SharedWithMe => "Shared with me".to_string(),
            Section::Recent => "Recent".to_string(),
            Section::SharedDrive(drive_id) => drive_id.clone(),
        }
    }

    /// Flat sections are a single query result with no folder hierarchy
    pub fn is_flat(&self) -> bool {
        matches!(self, Section::SharedWithMe | Section::Recent)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::SharedDrive(drive_id) => write!(f, "shared drive {}", drive_id),
            other => write!(f, "{}", other.root_name()),
        }
    }
}

/// One breadcrumb element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub id: String,
    pub name: String,
}

impl Crumb {
    fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Where the user currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationState {
    pub section: Section,
    pub folder_id: String,
    pub folder_name: String,
    pub breadcrumb: Vec<Crumb>,
}

impl NavigationState {
    fn at_root(section: Section, root_name: String) -> Self {
        let root = Crumb::new(section.root_id(), root_name);
        Self {
            folder_id: root.id.clone(),
            folder_name: root.name.clone(),
            breadcrumb: vec![root],
            section,
        }
    }
}

impl Default for NavigationState {
    fn default() -> Self {
        NavigationState::at_root(Section::MyDrive, Section::MyDrive.root_name())
    }
}

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("{0} is not a folder")]
    NotAFolder(String),

    #[error("{0} has no folders to open")]
    FlatSection(Section),

    #[error("Breadcrumb index {index} out of range (length {len})")]
    BreadcrumbOutOfRange { index: usize, len: usize },

    #[error("No folder named {0} in the current listing")]
    FolderNotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Navigation state plus the selection for the current listing
#[derive(Debug, Default)]
pub struct Navigator {
    state: NavigationState,
    selection: SelectionSet,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn breadcrumb(&self) -> &[Crumb] {
        &self.state.breadcrumb
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionSet {
        &mut self.selection
    }

    pub fn navigate_to_section(&mut self, section: Section) {
        debug!("Navigate to {}", section);
        let name = section.root_name();
        self.state = NavigationState::at_root(section, name);
        self.selection.reset();
    }

    pub fn navigate_to_shared_drive(&mut self, drive: &SharedDrive) {
        debug!("Navigate to shared drive {} ({})", drive.name, drive.id);
        self.state = NavigationState::at_root(Section::SharedDrive(drive.id.clone()), drive.name.clone());
        self.selection.reset();
    }

    pub fn navigate_into_folder(&mut self, entry: &FileEntry) -> Result<(), NavigationError> {
        if self.state.section.is_flat() {
            return Err(NavigationError::FlatSection(self.state.section.clone()));
        }
        if !entry.is_folder() {
            return Err(NavigationError::NotAFolder(entry.name().to_string()));
        }

        debug!("Open folder {} ({})", entry.name(), entry.listing_id());
        self.state.folder_id = entry.listing_id().to_string();
        self.state.folder_name = entry.name().to_string();
        self.state
            .breadcrumb
            .push(Crumb::new(entry.listing_id(), entry.name()));
        self.selection.reset();
        Ok(())
    }

    /// Open the folder called `name` in the current listing
    pub fn navigate_into_named(&mut self, name: &str) -> Result<(), NavigationError> {
        let entry = self
            .selection
            .listing()
            .iter()
            .find(|e| e.is_folder() && e.name() == name)
            .cloned()
            .ok_or_else(|| NavigationError::FolderNotFound(name.to_string()))?;
        self.navigate_into_folder(&entry)
    }

    /// Keep `breadcrumb[0..=index]` and go back to that folder
    pub fn navigate_to_breadcrumb(&mut self, index: usize) -> Result<(), NavigationError> {
        let len = self.state.breadcrumb.len();
        if index >= len {
            return Err(NavigationError::BreadcrumbOutOfRange { index, len });
        }

        self.state.breadcrumb.truncate(index + 1);
        if let Some(tail) = self.state.breadcrumb.last() {
            self.state.folder_id = tail.id.clone();
            self.state.folder_name = tail.name.clone();
        }
        self.selection.reset();
        Ok(())
    }

    /// Shared drive the current listing is scoped to
    pub fn drive_scope(&self) -> Option<&str> {
        match &self.state.section {
            Section::SharedDrive(drive_id) => Some(drive_id.as_str()),
            _ => None,
        }
    }

    pub fn list_context(&self) -> ListContext {
        match &self.state.section {
            Section::SharedWithMe => ListContext::SharedWithMe,
            Section::Recent => ListContext::Recent,
            Section::MyDrive | Section::SharedDrive(_) => ListContext::Folder {
                folder_id: self.state.folder_id.clone(),
                drive_id: self.drive_scope().map(str::to_string),
            },
        }
    }

    /// List the current location and make it the selectable listing
    pub async fn refresh(&mut self, provider: &dyn DriveProvider) -> Result<&[FileEntry], NavigationError> {
        let entries = list_all(provider, &self.list_context()).await?;
        self.selection.set_listing(entries);
        Ok(self.selection.listing())
    }
}
