//! Dispatch table: task type -> processor capability.
//!
//! Design:
//! - Built during initialization (mutable).
//! - Used during runtime behind an `Arc` (immutable).
//! This avoids locks on the hot path and keeps registration errors at
//! startup, where they belong.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::TaskType;
use crate::error::Error;

/// Failure reported by a processor.
///
/// Carries only a message: the worker records it verbatim on the status
/// record and the task is terminal (no auto-retry). Processors signal
/// failure with this value; a panic inside a processor is a bug, not a
/// failure mode.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("payload decode: {err}"))
    }
}

/// A processing capability for one task type.
///
/// The core routes payloads in and results out; what `process` actually does
/// (OCR, synthesis, analysis, ...) is the implementor's concern.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// Registry mapping each task type to its processor.
#[derive(Default)]
pub struct DispatchTable {
    processors: HashMap<TaskType, Arc<dyn Processor>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Register a processor for a task type. Registering a type twice is an
    /// error.
    pub fn register(
        &mut self,
        task_type: TaskType,
        processor: Arc<dyn Processor>,
    ) -> Result<(), Error> {
        if self.processors.contains_key(&task_type) {
            return Err(Error::Validation(format!(
                "processor already registered for task type {task_type}"
            )));
        }
        self.processors.insert(task_type, processor);
        Ok(())
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn Processor>> {
        self.processors.get(&task_type).cloned()
    }

    pub fn contains(&self, task_type: TaskType) -> bool {
        self.processors.contains_key(&task_type)
    }

    /// Registered types in stable order. Drives worker-pool spawning and
    /// stats aggregation.
    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.processors.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
