//! Task: one unit of asynchronous work, and its identifier.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::{Priority, TaskType};

/// Unique task identifier.
///
/// ULID-backed: sortable by creation time and generatable without
/// coordination, which matters when many submitters share a store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

/// One unit of asynchronous work. Immutable once created.
///
/// The payload is opaque to the core; only the processor registered for
/// `task_type` interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    task_type: TaskType,
    payload: serde_json::Value,
    priority: Priority,
    submitted_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: TaskType, payload: serde_json::Value, priority: Priority) -> Self {
        Self {
            id: TaskId::generate(),
            task_type,
            payload,
            priority,
            submitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}
