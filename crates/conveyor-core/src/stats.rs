//! Queue statistics views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::TaskType;

/// Pending depth and worker allocation for one task type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TypeStats {
    pub pending_tasks: usize,
    pub workers: usize,
}

/// Aggregated statistics across all registered task types.
///
/// `total_workers`/`active_workers` are zero while the service is stopped;
/// pending counts reflect the queues either way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub per_type: BTreeMap<TaskType, TypeStats>,
    pub total_workers: usize,
    pub active_workers: usize,
}

impl QueueStats {
    /// Total pending entries across every queue.
    pub fn total_pending(&self) -> usize {
        self.per_type.values().map(|stats| stats.pending_tasks).sum()
    }
}
