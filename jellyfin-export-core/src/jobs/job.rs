use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

use crate::types::{EntityId, JobId, QueueName};

/// Full and per-library syncs.
pub const LIBRARY_SYNC_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Export of a single changed entity (or its subtree).
pub const ENTITY_EXPORT_TIMEOUT: Duration = Duration::from_secs(60 * 30);
/// Removal of a trashed entity's export.
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(60 * 10);

/// Structured payload per job kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum JobPayload {
    /// Fan out one `SyncLibrary` per exportable library.
    SyncAll,
    /// Resolve the library settings and queue its subtree export.
    SyncLibrary { library_name: String },
    /// Export a whole library subtree.
    ExportLibrary {
        library_name: String,
        root_entity: EntityId,
        export_subdir: String,
    },
    /// Export one changed entity (subtree when it is a folder).
    ExportEntity {
        entity: EntityId,
        library_name: String,
        root_entity: EntityId,
        export_subdir: String,
    },
    /// Remove the export of a trashed or purged entity.
    DeleteExport { entity: EntityId },
    /// Drop exports whose entities became invalid.
    CleanupLibrary { library_name: String },
}

impl JobPayload {
    pub fn name(&self) -> &'static str {
        match self {
            JobPayload::SyncAll => "sync_all",
            JobPayload::SyncLibrary { .. } => "sync_library",
            JobPayload::ExportLibrary { .. } => "export_library",
            JobPayload::ExportEntity { .. } => "export_entity",
            JobPayload::DeleteExport { .. } => "delete_export",
            JobPayload::CleanupLibrary { .. } => "cleanup_library",
        }
    }

    pub fn library_name(&self) -> Option<&str> {
        match self {
            JobPayload::SyncLibrary { library_name }
            | JobPayload::ExportLibrary { library_name, .. }
            | JobPayload::ExportEntity { library_name, .. }
            | JobPayload::CleanupLibrary { library_name } => Some(library_name),
            JobPayload::SyncAll | JobPayload::DeleteExport { .. } => None,
        }
    }
}

impl fmt::Display for JobPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPayload::SyncAll => write!(f, "sync all libraries"),
            JobPayload::SyncLibrary { library_name } => {
                write!(f, "sync library {library_name}")
            }
            JobPayload::ExportLibrary { library_name, .. } => {
                write!(f, "export library {library_name}")
            }
            JobPayload::ExportEntity { entity, .. } => {
                write!(f, "export entity {entity}")
            }
            JobPayload::DeleteExport { entity } => {
                write!(f, "delete export of {entity}")
            }
            JobPayload::CleanupLibrary { library_name } => {
                write!(f, "clean up library {library_name}")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub queue: QueueName,
    pub payload: JobPayload,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl EnqueueRequest {
    pub fn new(queue: QueueName, payload: JobPayload, timeout: Duration) -> Self {
        Self {
            queue,
            payload,
            timeout,
        }
    }
}

/// Returned by the queue once a job is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub queue: QueueName,
    pub payload: JobPayload,
    pub state: JobState,
    pub attempts: u32,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
}

impl JobRecord {
    pub fn from_request(request: EnqueueRequest) -> Self {
        Self {
            id: JobId::new(),
            queue: request.queue,
            payload: request.payload,
            state: JobState::Queued,
            attempts: 0,
            timeout: request.timeout,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            worker_id: None,
            last_error: None,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_serializes_with_kind_tag() {
        let payload = JobPayload::SyncLibrary {
            library_name: "Movies".into(),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "kind": "sync_library", "payload": { "library_name": "Movies" } })
        );
        assert_eq!(
            serde_json::to_value(JobPayload::SyncAll).unwrap(),
            json!({ "kind": "sync_all" })
        );
    }

    #[test]
    fn library_name_is_exposed_where_present() {
        let delete = JobPayload::DeleteExport {
            entity: EntityId::new("x"),
        };
        assert_eq!(delete.library_name(), None);
        let cleanup = JobPayload::CleanupLibrary {
            library_name: "Shows".into(),
        };
        assert_eq!(cleanup.library_name(), Some("Shows"));
    }
}
