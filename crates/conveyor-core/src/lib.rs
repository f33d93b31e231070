//! conveyor-core
//!
//! Priority task queue with pluggable processors and bounded worker pools.
//!
//! # Components
//! - **domain**: task model: ids, the closed task-type set, validated
//!   priorities, status records with monotonic transitions
//! - **store**: persistence port + in-memory implementation (atomic priority
//!   dequeue, blocking pop with a wait bound, TTL'd status records)
//! - **dispatch**: task type -> processor registry
//! - **worker**: per-type worker pools with deadline enforcement and
//!   transient-failure backoff
//! - **service**: lifecycle orchestration and the submit/query/stats surface
//!
//! # Flow
//! submit -> Pending record + queue entry -> a worker claims it ->
//! Processing -> processor runs under a deadline -> Completed(result) or
//! Failed(error) -> the record expires a TTL after its last write.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod service;
pub mod stats;
pub mod store;
pub mod worker;

pub use config::QueueConfig;
pub use dispatch::{DispatchTable, HandlerError, Processor};
pub use domain::{Priority, StatusRecord, StatusUpdate, Task, TaskId, TaskStatus, TaskType};
pub use error::Error;
pub use service::{QueueService, ServiceState, SubmitRequest};
pub use stats::{QueueStats, TypeStats};
pub use store::{MemoryStore, TaskStore};
pub use worker::WorkerPool;
