//! Bookkeeping of what each drive entity was exported to.
//!
//! One record per entity. The exporter uses it to detect moves and renames
//! (old path differs from the new one) and to find files to remove when an
//! entity is trashed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use tokio::sync::RwLock;

use crate::{error::Result, types::EntityId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Exported,
    Skipped,
    Error,
    Deleted,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Exported => "exported",
            ExportStatus::Skipped => "skipped",
            ExportStatus::Error => "error",
            ExportStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "exported" => Ok(ExportStatus::Exported),
            "skipped" => Ok(ExportStatus::Skipped),
            "error" => Ok(ExportStatus::Error),
            "deleted" => Ok(ExportStatus::Deleted),
            other => Err(format!("unknown export status: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    File,
    Folder,
}

impl ExportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportType::File => "file",
            ExportType::Folder => "folder",
        }
    }
}

impl FromStr for ExportType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file" => Ok(ExportType::File),
            "folder" => Ok(ExportType::Folder),
            other => Err(format!("unknown export type: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub drive_entity: EntityId,
    pub library_name: String,
    /// Source file on the drive host; empty for folders.
    pub src_path: String,
    /// Path inside the export view; empty when nothing was exported.
    pub export_path: String,
    pub export_type: ExportType,
    pub status: ExportStatus,
    pub last_exported_on: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl ExportRecord {
    /// Fresh `exported` record stamped now, with empty paths.
    pub fn new(
        drive_entity: EntityId,
        library_name: impl Into<String>,
        export_type: ExportType,
    ) -> Self {
        Self {
            drive_entity,
            library_name: library_name.into(),
            src_path: String::new(),
            export_path: String::new(),
            export_type,
            status: ExportStatus::Exported,
            last_exported_on: Utc::now(),
            last_error: None,
        }
    }

    pub fn with_paths(
        mut self,
        src: impl Into<String>,
        dst: impl Into<String>,
    ) -> Self {
        self.src_path = src.into();
        self.export_path = dst.into();
        self
    }

    pub fn with_status(mut self, status: ExportStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// Trimmed export path, `None` when nothing was exported.
    pub fn exported_path(&self) -> Option<&str> {
        Some(self.export_path.trim()).filter(|path| !path.is_empty())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExportStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[async_trait]
pub trait ExportMapRepository: Send + Sync {
    async fn get(&self, entity: &EntityId) -> Result<Option<ExportRecord>>;

    /// Insert or replace the record of `record.drive_entity`.
    async fn upsert(&self, record: &ExportRecord) -> Result<()>;

    /// Flag records as deleted; unknown entities are ignored. Returns the
    /// number of records touched.
    async fn mark_deleted(
        &self,
        entities: &[EntityId],
        at: DateTime<Utc>,
    ) -> Result<u64>;

    async fn list_by_library(&self, library: &str) -> Result<Vec<ExportRecord>>;

    async fn list(&self, filter: &ExportFilter) -> Result<Vec<ExportRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryExportMap {
    records: RwLock<BTreeMap<EntityId, ExportRecord>>,
}

impl InMemoryExportMap {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExportMapRepository for InMemoryExportMap {
    async fn get(&self, entity: &EntityId) -> Result<Option<ExportRecord>> {
        Ok(self.records.read().await.get(entity).cloned())
    }

    async fn upsert(&self, record: &ExportRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.drive_entity.clone(), record.clone());
        Ok(())
    }

    async fn mark_deleted(
        &self,
        entities: &[EntityId],
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut records = self.records.write().await;
        let mut touched = 0;
        for entity in entities {
            if let Some(record) = records.get_mut(entity) {
                record.status = ExportStatus::Deleted;
                record.last_exported_on = at;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn list_by_library(&self, library: &str) -> Result<Vec<ExportRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.library_name == library)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &ExportFilter) -> Result<Vec<ExportRecord>> {
        let records = self.records.read().await;
        let mut out: Vec<ExportRecord> = records
            .values()
            .filter(|record| {
                filter
                    .library
                    .as_deref()
                    .is_none_or(|lib| record.library_name == lib)
                    && filter.status.is_none_or(|status| record.status == status)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_exported_on.cmp(&a.last_exported_on));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}
