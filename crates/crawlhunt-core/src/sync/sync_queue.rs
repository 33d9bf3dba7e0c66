//! Ordered pending-mutation queue with optional on-disk persistence.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::Utc;
use uuid::Uuid;

use crate::sync::types::{PayloadRef, SyncError, SyncableMutation};

/// FIFO of mutations not yet acknowledged by the remote.
#[derive(Debug, Default)]
pub struct SyncQueue {
    pending: VecDeque<SyncableMutation>,
    /// Persistent queue file path.
    queue_file: Option<PathBuf>,
}

impl SyncQueue {
    /// Create an in-memory queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue backed by `path` for `persist`/`load`.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            pending: VecDeque::new(),
            queue_file: Some(path),
        }
    }

    /// Append a mutation for `payload` and return its id.
    pub fn enqueue(&mut self, payload: PayloadRef) -> Uuid {
        let mutation = SyncableMutation {
            id: Uuid::new_v4(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
        };
        let id = mutation.id;
        self.pending.push_back(mutation);
        id
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Copy of the queue in enqueue order.
    pub fn snapshot(&self) -> Vec<SyncableMutation> {
        self.pending.iter().cloned().collect()
    }

    pub fn get(&self, id: &Uuid) -> Option<&SyncableMutation> {
        self.pending.iter().find(|m| &m.id == id)
    }

    /// Remove acknowledged mutations. Returns how many were removed.
    pub fn acknowledge(&mut self, ids: &[Uuid]) -> usize {
        let before = self.pending.len();
        self.pending.retain(|m| !ids.contains(&m.id));
        before - self.pending.len()
    }

    /// Bump `retry_count` on every mutation that was part of a failed flush.
    pub fn mark_failed(&mut self, ids: &[Uuid]) {
        for mutation in self.pending.iter_mut().filter(|m| ids.contains(&m.id)) {
            mutation.retry_count = mutation.retry_count.saturating_add(1);
        }
    }

    /// Persist queue to disk. No-op for in-memory queues.
    pub fn persist(&self) -> Result<(), SyncError> {
        let Some(path) = &self.queue_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.pending)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load queue from disk, replacing the in-memory contents.
    pub fn load(&mut self) -> Result<(), SyncError> {
        let Some(path) = &self.queue_file else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        self.pending = serde_json::from_str(&content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::MutationKind;

    fn visit(id: &str) -> PayloadRef {
        PayloadRef::new(MutationKind::Visit, id)
    }

    #[test]
    fn enqueue_preserves_order() {
        let mut queue = SyncQueue::new();
        assert!(queue.is_empty());
        queue.enqueue(visit("a"));
        queue.enqueue(visit("b"));
        queue.enqueue(PayloadRef::new(MutationKind::TaskCompletion, "c"));

        let ids: Vec<_> = queue
            .snapshot()
            .into_iter()
            .map(|m| m.payload.entity_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn same_payload_twice_is_two_mutations() {
        let mut queue = SyncQueue::new();
        let first = queue.enqueue(visit("a"));
        let second = queue.enqueue(visit("a"));
        assert_ne!(first, second);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn acknowledge_removes_only_given_ids() {
        let mut queue = SyncQueue::new();
        let a = queue.enqueue(visit("a"));
        let b = queue.enqueue(visit("b"));
        assert_eq!(queue.acknowledge(&[a]), 1);
        assert_eq!(queue.len(), 1);
        assert!(queue.get(&b).is_some());
        assert_eq!(queue.acknowledge(&[a]), 0);
    }

    #[test]
    fn mark_failed_increments_retry_count() {
        let mut queue = SyncQueue::new();
        let a = queue.enqueue(visit("a"));
        let b = queue.enqueue(visit("b"));
        queue.mark_failed(&[a]);
        queue.mark_failed(&[a]);
        assert_eq!(queue.get(&a).unwrap().retry_count, 2);
        assert_eq!(queue.get(&b).unwrap().retry_count, 0);
    }

    #[test]
    fn persist_and_load() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let mut queue = SyncQueue::with_path(path.clone());
        let id = queue.enqueue(PayloadRef::new(MutationKind::ChallengeCreated, "chal-9"));
        queue.mark_failed(&[id]);
        queue.persist().unwrap();

        let mut restored = SyncQueue::with_path(path);
        restored.load().unwrap();
        assert_eq!(restored.len(), 1);
        let mutation = restored.get(&id).unwrap();
        assert_eq!(mutation.payload.entity_id, "chal-9");
        assert_eq!(mutation.retry_count, 1);
    }

    #[test]
    fn load_without_file_is_empty() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut queue = SyncQueue::with_path(temp_dir.path().join("missing.json"));
        queue.load().unwrap();
        assert!(queue.is_empty());
        assert!(SyncQueue::new().persist().is_ok());
    }
}
