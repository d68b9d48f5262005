//! # Sync Queue
//!
//! The durable queue plus a wake-up signal for the retry scheduler.
//!
//! Ingestion and the scheduler share nothing but this type: ingestion
//! enqueues, the scheduler drains. Every enqueue stores a wake-up permit, so
//! an enqueue that lands while the scheduler is busy is picked up as soon as
//! the scheduler next waits.

use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::info;

use pacer_core::{QueueEntry, SyncOperation};
use pacer_db::SyncQueueRepository;

use crate::error::SyncResult;

/// Ordered, durable list of writes the remote has not acknowledged.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    repo: SyncQueueRepository,
    wake: Arc<Notify>,
}

impl SyncQueue {
    pub fn new(repo: SyncQueueRepository) -> Self {
        SyncQueue {
            repo,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Appends and persists an operation, then wakes the scheduler.
    pub async fn enqueue(&self, user_id: &str, operation: &SyncOperation) -> SyncResult<QueueEntry> {
        let entry = self.repo.enqueue(user_id, operation).await?;
        self.wake.notify_one();
        Ok(entry)
    }

    /// Oldest entry for the user, left in place.
    pub async fn peek_oldest(&self, user_id: &str) -> SyncResult<Option<QueueEntry>> {
        Ok(self.repo.peek_oldest(user_id).await?)
    }

    /// Removes and returns the oldest entry for the user.
    pub async fn remove_oldest(&self, user_id: &str) -> SyncResult<Option<QueueEntry>> {
        Ok(self.repo.remove_oldest(user_id).await?)
    }

    /// Removes an entry by id. Returns false if it was already gone.
    pub async fn remove(&self, id: i64) -> SyncResult<bool> {
        Ok(self.repo.remove(id).await?)
    }

    /// Every pending entry across users, in processing order.
    pub async fn list_all(&self) -> SyncResult<Vec<QueueEntry>> {
        Ok(self.repo.list_all().await?)
    }

    /// Pending entries for one user, in processing order.
    pub async fn list_for(&self, user_id: &str) -> SyncResult<Vec<QueueEntry>> {
        Ok(self.repo.list_for(user_id).await?)
    }

    /// Number of pending entries for one user.
    pub async fn len(&self, user_id: &str) -> SyncResult<u64> {
        Ok(self.repo.count(user_id).await?)
    }

    /// Drops every pending entry for the user without sending it.
    pub async fn purge(&self, user_id: &str) -> SyncResult<u64> {
        let removed = self.repo.purge(user_id).await?;
        info!(user_id = %user_id, removed, "Operator purged sync queue");
        Ok(removed)
    }

    /// Resolves after the next enqueue.
    pub fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::HttpMethod;
    use pacer_db::{Database, DbConfig};
    use std::time::Duration;

    fn op(n: u64) -> SyncOperation {
        SyncOperation {
            method: HttpMethod::Post,
            endpoint: "/step-activity".into(),
            payload: format!("{{\"stepCount\":{}}}", n),
        }
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = SyncQueue::new(db.sync_queue());

        // Permit is stored even with nobody waiting yet.
        queue.enqueue("user-1", &op(1)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), queue.notified())
            .await
            .unwrap();

        assert_eq!(queue.len("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_empties_user_queue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = SyncQueue::new(db.sync_queue());
        queue.enqueue("user-1", &op(1)).await.unwrap();
        queue.enqueue("user-1", &op(2)).await.unwrap();

        assert_eq!(queue.purge("user-1").await.unwrap(), 2);
        assert_eq!(queue.len("user-1").await.unwrap(), 0);
        assert!(queue.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_oldest_takes_head_for_user() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = SyncQueue::new(db.sync_queue());
        queue.enqueue("user-1", &op(1)).await.unwrap();
        queue.enqueue("user-2", &op(2)).await.unwrap();
        queue.enqueue("user-1", &op(3)).await.unwrap();

        let removed = queue.remove_oldest("user-1").await.unwrap().unwrap();
        assert_eq!(removed.payload, op(1).payload);

        let left = queue.list_for("user-1").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload, op(3).payload);
        assert_eq!(queue.len("user-2").await.unwrap(), 1);
    }
}
