//! Background job model and the queue port the workers consume.

pub mod job;
pub mod memory;
pub mod queue;

pub use job::{
    DELETE_TIMEOUT, ENTITY_EXPORT_TIMEOUT, EnqueueRequest, JobHandle,
    JobPayload, JobRecord, JobState, LIBRARY_SYNC_TIMEOUT,
};
pub use memory::InMemoryQueue;
pub use queue::{
    ABANDONED_ERROR, DequeueRequest, QueueService, QueueSnapshot,
    QueueSnapshotEntry,
};
