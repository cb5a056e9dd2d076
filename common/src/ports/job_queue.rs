//! Job Queue Port (A6): the core only defines the contract; this provides
//! a bounded in-process default so the binary boots without an external
//! broker. The contract is trait-based so a real queue can be substituted.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct ProcessingJob {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue_document_processing(
        &self,
        document_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<(), AppError>;

    /// Pulls the next job for a worker loop. `None` means the queue was
    /// closed (shutdown), not "empty" — callers should exit their loop.
    async fn next(&self) -> Option<ProcessingJob>;
}

/// Bounded `tokio::sync::mpsc`-backed queue. `enqueue` returns
/// `SERVICE_UNAVAILABLE` when the channel is full (§5 Backpressure).
pub struct InMemoryJobQueue {
    sender: mpsc::Sender<ProcessingJob>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<ProcessingJob>>,
}

impl InMemoryJobQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue_document_processing(
        &self,
        document_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<(), AppError> {
        self.sender
            .try_send(ProcessingJob {
                document_id,
                workspace_id,
            })
            .map_err(|_| AppError::ServiceUnavailable("ingestion queue is full".into()))
    }

    async fn next(&self) -> Option<ProcessingJob> {
        self.receiver.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_surfaces_service_unavailable() {
        let queue = InMemoryJobQueue::new(1);
        let doc = Uuid::new_v4();
        let ws = Uuid::new_v4();
        queue.enqueue_document_processing(doc, ws).await.unwrap();
        let err = queue
            .enqueue_document_processing(doc, ws)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn jobs_are_delivered_in_order() {
        let queue = InMemoryJobQueue::new(4);
        let doc1 = Uuid::new_v4();
        let doc2 = Uuid::new_v4();
        let ws = Uuid::new_v4();
        queue.enqueue_document_processing(doc1, ws).await.unwrap();
        queue.enqueue_document_processing(doc2, ws).await.unwrap();
        assert_eq!(queue.next().await.unwrap().document_id, doc1);
        assert_eq!(queue.next().await.unwrap().document_id, doc2);
    }
}
