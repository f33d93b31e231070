//! Store: per-type priority queues + TTL'd status records.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{StatusRecord, StatusUpdate, Task, TaskId, TaskType};
use crate::error::Error;

/// Persistence port for pending queues and status records.
///
/// This trait is the seam for swapping backends: anything offering an atomic
/// "pop highest rank" priority structure and a TTL-capable key/value store
/// satisfies it. Correctness of "exactly one worker per task" lives entirely
/// behind `dequeue`; callers add no locking of their own.
///
/// Ranking contract: entries dequeue by `(-priority, sequence)`: highest
/// priority first, FIFO within one priority. Priority alone is not
/// deterministic; the insertion-sequence tie-break is part of the contract.
///
/// Known limitation: `dequeue` removes the entry before the caller records
/// an outcome. A crash between the two orphans the task (gone from its
/// queue, never reaching a terminal status). A lease/visibility-timeout
/// claim would close this gap; see DESIGN.md.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert into the task's type queue. Never blocks indefinitely.
    async fn enqueue(&self, task: &Task) -> Result<(), Error>;

    /// Atomically remove and return the highest-ranked entry, if any.
    ///
    /// Safe under arbitrary concurrent callers: no two callers ever receive
    /// the same entry.
    async fn dequeue(&self, task_type: TaskType) -> Result<Option<Task>, Error>;

    /// `dequeue`, but waits up to `wait` for an entry to arrive instead of
    /// returning empty immediately. Must not busy-spin.
    async fn dequeue_timeout(
        &self,
        task_type: TaskType,
        wait: Duration,
    ) -> Result<Option<Task>, Error>;

    /// Number of pending entries for one task type.
    async fn queue_size(&self, task_type: TaskType) -> Result<usize, Error>;

    /// Upsert the status record and reset its TTL to the configured window.
    ///
    /// The first write creates the record (stamping `created_at`); terminal
    /// transitions stamp `completed_at`. Writes against a record already in
    /// a terminal state are dropped: Completed and Failed never revert.
    async fn set_status(&self, task_id: TaskId, update: StatusUpdate) -> Result<(), Error>;

    /// Fetch a status record. `None` for ids never written, or written
    /// longer than the TTL window ago, even if the task once completed.
    async fn get_status(&self, task_id: TaskId) -> Result<Option<StatusRecord>, Error>;
}
