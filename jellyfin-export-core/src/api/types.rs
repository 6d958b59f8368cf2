use serde::{Deserialize, Serialize};

pub use crate::export_map::ExportFilter as ExportsQuery;

use crate::{
    jobs::{JobRecord, QueueSnapshot},
    tree::DriveEntity,
    types::EntityId,
};

/// Envelope of every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(error),
            message: None,
        }
    }

    pub fn with_message(mut self, message: String) -> Self {
        self.message = Some(message);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityEvent {
    Changed,
    Trashed,
}

/// Body of the drive entity hook. The drive host may push the row it just
/// wrote so database-less deployments see it too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHookRequest {
    pub entity: EntityId,
    pub event: EntityEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<DriveEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHookResponse {
    /// Job queued for the event, if any.
    pub job_id: Option<crate::types::JobId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsOverview {
    pub snapshot: QueueSnapshot,
    pub recent: Vec<JobRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}
