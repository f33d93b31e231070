//! In-memory store implementation.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use super::TaskStore;
use crate::domain::{StatusRecord, StatusUpdate, Task, TaskId, TaskType};
use crate::error::Error;

/// Default window after the last status write before a record expires.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(3600);

/// Rank key for one queue entry.
///
/// `Reverse(priority)` puts the highest priority at the front of the ordered
/// map; the store-wide insertion sequence breaks equal-priority ties in FIFO
/// order.
type Rank = (Reverse<u8>, u64);

/// A status record plus its expiry deadline.
struct StatusEntry {
    record: StatusRecord,
    expires_at: Instant,
}

/// Mutex-guarded store state.
///
/// One lock covers every structure, which is what makes `dequeue` atomic:
/// claim and removal happen in a single critical section. No await happens
/// while the lock is held.
struct MemoryStoreState {
    /// Pending entries per task type, ordered by rank.
    queues: HashMap<TaskType, BTreeMap<Rank, Task>>,

    /// Status records, purged lazily once expired.
    statuses: HashMap<TaskId, StatusEntry>,

    /// Insertion sequence for the FIFO tie-break.
    next_seq: u64,
}

impl MemoryStoreState {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
            statuses: HashMap::new(),
            next_seq: 0,
        }
    }

    fn insert(&mut self, task: &Task) {
        let rank = (Reverse(task.priority().get()), self.next_seq);
        self.next_seq += 1;
        self.queues
            .entry(task.task_type())
            .or_default()
            .insert(rank, task.clone());
    }

    fn pop_highest(&mut self, task_type: TaskType) -> Option<Task> {
        let queue = self.queues.get_mut(&task_type)?;
        let rank = *queue.keys().next()?;
        queue.remove(&rank)
    }

    /// Drop the record if its TTL has lapsed, then hand back what remains.
    /// An expired record is gone, not stale.
    fn live_entry_mut(&mut self, task_id: TaskId, now: Instant) -> Option<&mut StatusEntry> {
        let expired = self
            .statuses
            .get(&task_id)
            .is_some_and(|entry| entry.expires_at <= now);
        if expired {
            self.statuses.remove(&task_id);
            return None;
        }
        self.statuses.get_mut(&task_id)
    }
}

/// In-memory `TaskStore`.
///
/// The production seam is the trait; this implementation backs tests, the
/// CLI, and single-process deployments.
pub struct MemoryStore {
    state: Mutex<MemoryStoreState>,
    /// One waker per task type. `notify_one` stores a permit when nobody is
    /// waiting, so a notification sent between a failed pop and the wait is
    /// not lost.
    wakers: HashMap<TaskType, Notify>,
    status_ttl: Duration,
}

impl MemoryStore {
    pub fn new(status_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryStoreState::new()),
            wakers: TaskType::ALL
                .into_iter()
                .map(|task_type| (task_type, Notify::new()))
                .collect(),
            status_ttl,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_TTL)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn enqueue(&self, task: &Task) -> Result<(), Error> {
        {
            let mut state = self.state.lock().await;
            state.insert(task);
        }
        // Wake one waiting worker, outside the lock.
        self.wakers[&task.task_type()].notify_one();
        debug!(
            task_id = %task.id(),
            queue = %task.task_type().queue_name(),
            priority = %task.priority(),
            "task enqueued"
        );
        Ok(())
    }

    async fn dequeue(&self, task_type: TaskType) -> Result<Option<Task>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.pop_highest(task_type))
    }

    async fn dequeue_timeout(
        &self,
        task_type: TaskType,
        wait: Duration,
    ) -> Result<Option<Task>, Error> {
        let deadline = Instant::now() + wait;
        loop {
            let popped = {
                let mut state = self.state.lock().await;
                state.pop_highest(task_type)
            };
            if let Some(task) = popped {
                return Ok(Some(task));
            }

            // A woken worker can lose the next pop to a concurrent caller,
            // so loop rather than assume the wakeup carried a task.
            tokio::select! {
                _ = self.wakers[&task_type].notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn queue_size(&self, task_type: TaskType) -> Result<usize, Error> {
        let state = self.state.lock().await;
        Ok(state.queues.get(&task_type).map_or(0, BTreeMap::len))
    }

    async fn set_status(&self, task_id: TaskId, update: StatusUpdate) -> Result<(), Error> {
        let now = Instant::now();
        let expires_at = now + self.status_ttl;
        let mut state = self.state.lock().await;

        if let Some(entry) = state.live_entry_mut(task_id, now) {
            // Terminal records never revert; late writes are dropped.
            if !entry.record.status.is_terminal() {
                entry.record.apply(update);
                entry.expires_at = expires_at;
            }
            return Ok(());
        }

        let mut record = StatusRecord::new(task_id);
        record.apply(update);
        state.statuses.insert(task_id, StatusEntry { record, expires_at });
        Ok(())
    }

    async fn get_status(&self, task_id: TaskId) -> Result<Option<StatusRecord>, Error> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Ok(state
            .live_entry_mut(task_id, now)
            .map(|entry| entry.record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::domain::{Priority, TaskStatus};

    fn task(task_type: TaskType, priority: u8, payload: serde_json::Value) -> Task {
        Task::new(task_type, payload, Priority::new(priority).unwrap())
    }

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let store = MemoryStore::default();
        for priority in [5, 9, 1] {
            let t = task(TaskType::OcrExtraction, priority, serde_json::json!({ "p": priority }));
            store.enqueue(&t).await.unwrap();
        }

        let mut order = Vec::new();
        while let Some(t) = store.dequeue(TaskType::OcrExtraction).await.unwrap() {
            order.push(t.priority().get());
        }
        assert_eq!(order, vec![9, 5, 1]);
    }

    #[rstest]
    #[case(3)]
    #[case(10)]
    #[tokio::test]
    async fn equal_priority_preserves_submission_order(#[case] priority: u8) {
        let store = MemoryStore::default();
        let first = task(TaskType::ImageAnalysis, priority, serde_json::json!({"n": 1}));
        let second = task(TaskType::ImageAnalysis, priority, serde_json::json!({"n": 2}));
        store.enqueue(&first).await.unwrap();
        store.enqueue(&second).await.unwrap();

        let a = store.dequeue(TaskType::ImageAnalysis).await.unwrap().unwrap();
        let b = store.dequeue(TaskType::ImageAnalysis).await.unwrap().unwrap();
        assert_eq!(a.id(), first.id());
        assert_eq!(b.id(), second.id());
    }

    #[tokio::test]
    async fn enqueue_dequeue_roundtrips_payload() {
        let store = MemoryStore::default();
        let payload = serde_json::json!({
            "image_url": "https://example.com/shot.png",
            "languages": ["en", "de"],
            "extract_regions": null,
        });
        let t = task(TaskType::OcrExtraction, 5, payload.clone());
        store.enqueue(&t).await.unwrap();

        let back = store.dequeue(TaskType::OcrExtraction).await.unwrap().unwrap();
        assert_eq!(back.payload(), &payload);
        assert_eq!(back.id(), t.id());
    }

    #[tokio::test]
    async fn queues_are_isolated_per_type() {
        let store = MemoryStore::default();
        let t = task(TaskType::VoiceSynthesis, 5, serde_json::json!({}));
        store.enqueue(&t).await.unwrap();

        assert!(store.dequeue(TaskType::OcrExtraction).await.unwrap().is_none());
        assert_eq!(store.queue_size(TaskType::VoiceSynthesis).await.unwrap(), 1);
        assert_eq!(store.queue_size(TaskType::OcrExtraction).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dequeuers_never_share_an_entry() {
        const ENTRIES: usize = 64;
        const CALLERS: usize = 8;

        let store = Arc::new(MemoryStore::default());
        let mut expected = HashSet::new();
        for i in 0..ENTRIES {
            let t = task(TaskType::StepDetection, (i % 10 + 1) as u8, serde_json::json!({"i": i}));
            expected.insert(t.id());
            store.enqueue(&t).await.unwrap();
        }

        let mut joins = Vec::new();
        for _ in 0..CALLERS {
            let store = Arc::clone(&store);
            joins.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(t) = store.dequeue(TaskType::StepDetection).await.unwrap() {
                    claimed.push(t.id());
                    tokio::task::yield_now().await;
                }
                claimed
            }));
        }

        let mut seen = Vec::new();
        for join in joins {
            seen.extend(join.await.unwrap());
        }

        // Union equals exactly the submitted entries, no duplicates.
        assert_eq!(seen.len(), ENTRIES);
        assert_eq!(seen.iter().copied().collect::<HashSet<_>>(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_dequeue_returns_empty_after_the_wait_bound() {
        let store = MemoryStore::default();
        let started = Instant::now();
        let popped = store
            .dequeue_timeout(TaskType::OcrExtraction, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_dequeue_wakes_on_enqueue() {
        let store = Arc::new(MemoryStore::default());

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .dequeue_timeout(TaskType::OcrExtraction, Duration::from_secs(30))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let t = task(TaskType::OcrExtraction, 5, serde_json::json!({}));
        store.enqueue(&t).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.id(), t.id());
    }

    #[tokio::test]
    async fn unknown_status_id_is_not_found() {
        let store = MemoryStore::default();
        assert!(store.get_status(TaskId::generate()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn status_expires_after_ttl_even_when_completed() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let id = TaskId::generate();
        store.set_status(id, StatusUpdate::pending()).await.unwrap();
        store.set_status(id, StatusUpdate::processing()).await.unwrap();
        store
            .set_status(id, StatusUpdate::completed(serde_json::json!({"ok": true}), 0.5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get_status(id).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get_status(id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn each_write_resets_the_ttl() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let id = TaskId::generate();
        store.set_status(id, StatusUpdate::pending()).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        store.set_status(id, StatusUpdate::processing()).await.unwrap();

        // 45s + 30s is past the original deadline but not the refreshed one.
        tokio::time::advance(Duration::from_secs(30)).await;
        let record = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn terminal_records_never_revert() {
        let store = MemoryStore::default();
        let id = TaskId::generate();
        store.set_status(id, StatusUpdate::failed("boom")).await.unwrap();
        store.set_status(id, StatusUpdate::processing()).await.unwrap();

        let record = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }
}
