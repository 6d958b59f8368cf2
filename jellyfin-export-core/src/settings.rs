//! Export settings: the single document operators edit on the settings
//! screen, plus the repository port that stores it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::PathBuf};
use tokio::sync::RwLock;

use crate::{
    error::{ExportError, Result},
    fsops::LinkMode,
    naming::parse_allowed_exts,
    types::{EntityId, QueueName},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub enabled: bool,
    /// Directory Jellyfin scans. Each library exports into a sub-directory.
    pub export_root: PathBuf,
    pub link_mode: LinkMode,
    pub include_images: bool,
    pub queue: QueueName,
    pub libraries: Vec<LibrarySettings>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            export_root: PathBuf::new(),
            link_mode: LinkMode::Hardlink,
            include_images: false,
            queue: QueueName::default(),
            libraries: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LibrarySettings {
    pub library_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub root_entity: Option<EntityId>,
    #[serde(default)]
    pub export_subdir: Option<String>,
    /// Comma separated video extensions, e.g. `mkv,mp4`. Empty means the
    /// built-in video set.
    #[serde(default)]
    pub allowed_extensions: Option<String>,
}

fn default_true() -> bool {
    true
}

impl LibrarySettings {
    pub fn new(library_name: impl Into<String>, root: EntityId) -> Self {
        Self {
            library_name: library_name.into(),
            enabled: true,
            root_entity: Some(root),
            export_subdir: None,
            allowed_extensions: None,
        }
    }

    /// Sub-directory under the export root; defaults to the library name.
    pub fn effective_subdir(&self) -> String {
        self.export_subdir
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.library_name.clone())
    }

    pub fn allowed_exts(&self) -> Option<BTreeSet<String>> {
        parse_allowed_exts(self.allowed_extensions.as_deref())
    }

    /// Enabled and pointing at a root folder.
    pub fn is_exportable(&self) -> bool {
        self.enabled && self.root_entity.is_some()
    }
}

impl ExportSettings {
    /// First enabled library carrying `name`.
    pub fn enabled_library(&self, name: &str) -> Option<&LibrarySettings> {
        self.libraries
            .iter()
            .find(|lib| lib.library_name == name && lib.enabled)
    }

    /// First library carrying `name`, enabled or not.
    pub fn library(&self, name: &str) -> Option<&LibrarySettings> {
        self.libraries.iter().find(|lib| lib.library_name == name)
    }

    pub fn exportable_libraries(
        &self,
    ) -> impl Iterator<Item = &LibrarySettings> {
        self.libraries.iter().filter(|lib| lib.is_exportable())
    }

    /// Reject documents the export jobs cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.export_root.as_os_str().is_empty() {
            return Err(ExportError::InvalidSettings(
                "export_root is required when the export is enabled".into(),
            ));
        }

        if let Some(lib) = self
            .libraries
            .iter()
            .find(|lib| lib.library_name.trim().is_empty())
        {
            return Err(ExportError::InvalidSettings(format!(
                "library rooted at {:?} has no name",
                lib.root_entity
            )));
        }

        if let Some(lib) = self.libraries.iter().find(|lib| {
            lib.export_subdir
                .as_deref()
                .is_some_and(|s| s.contains("..") || s.starts_with('/'))
        }) {
            return Err(ExportError::InvalidSettings(format!(
                "library {} export_subdir must stay inside export_root",
                lib.library_name
            )));
        }

        Ok(())
    }
}

/// Storage for the settings document.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self) -> Result<ExportSettings>;

    async fn save(&self, settings: &ExportSettings) -> Result<()>;

    /// Whether anything has been saved yet; used to decide on seeding.
    async fn is_initialized(&self) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemorySettingsRepository {
    inner: RwLock<Option<ExportSettings>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ExportSettings) -> Self {
        Self {
            inner: RwLock::new(Some(settings)),
        }
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn load(&self) -> Result<ExportSettings> {
        Ok(self.inner.read().await.clone().unwrap_or_default())
    }

    async fn save(&self, settings: &ExportSettings) -> Result<()> {
        *self.inner.write().await = Some(settings.clone());
        Ok(())
    }

    async fn is_initialized(&self) -> Result<bool> {
        Ok(self.inner.read().await.is_some())
    }
}
