//! Crash-recovery snapshots of job and event state.
//!
//! Snapshots are never read during normal operation. They are loaded once at
//! startup and rewritten after state changes by a single writer task, which
//! always copies the latest state, so an older state never overwrites a newer
//! one.

pub mod file_store;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::agent::job::Job;
use crate::error::PersistenceError;
use crate::events::Event;

pub use file_store::FileStore;

/// Point-in-time copy of all job and event state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Jobs in the active set.
    #[serde(default)]
    pub jobs: Vec<Job>,
    /// Most recently completed jobs, newest first.
    #[serde(default)]
    pub completed: Vec<Job>,
    /// Event tail per job ID.
    #[serde(default)]
    pub event_tails: BTreeMap<String, Vec<Event>>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.completed.is_empty() && self.event_tails.is_empty()
    }
}

/// Durable home for snapshots.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last snapshot. Missing or unreadable state yields an empty snapshot.
    async fn load(&self) -> Snapshot;

    /// Replace the stored snapshot atomically.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
}

/// Anything that can produce the current snapshot on demand.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self) -> Snapshot;
}

enum WriterCommand {
    Dirty,
    Flush(oneshot::Sender<()>),
}

/// Background writer that persists the latest state after changes.
///
/// Callers only mark the state dirty. The writer takes one snapshot per batch
/// of queued marks, so a burst of changes costs one copy and one write.
#[derive(Clone)]
pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl SnapshotWriter {
    /// Start the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn StateStore>, source: Arc<dyn SnapshotSource>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let mut dirty = false;
                let mut acks = Vec::new();
                let mut next = Some(command);
                while let Some(command) = next {
                    match command {
                        WriterCommand::Dirty => dirty = true,
                        WriterCommand::Flush(ack) => acks.push(ack),
                    }
                    next = rx.try_recv().ok();
                }

                if dirty {
                    let snapshot = source.snapshot().await;
                    if let Err(e) = store.save(&snapshot).await {
                        tracing::warn!(error = %e, "Failed to write state snapshot");
                    }
                }
                for ack in acks {
                    let _ = ack.send(());
                }
            }
            tracing::debug!("Snapshot writer stopped");
        });

        Self { tx }
    }

    /// Note that the state changed. Never blocks.
    pub fn mark_dirty(&self) {
        if self.tx.send(WriterCommand::Dirty).is_err() {
            tracing::warn!("Snapshot writer is gone; state change not persisted");
        }
    }

    /// Wait until every change marked so far has been written (or failed).
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SpawnMode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl StateStore for RecordingStore {
        async fn load(&self) -> Snapshot {
            Snapshot::default()
        }
        async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
            self.saved.lock().unwrap().push(snapshot.jobs.len());
            Ok(())
        }
    }

    /// Reports `jobs` jobs and counts how often it was asked.
    #[derive(Default)]
    struct Counter {
        jobs: AtomicUsize,
        taken: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotSource for Counter {
        async fn snapshot(&self) -> Snapshot {
            self.taken.fetch_add(1, Ordering::SeqCst);
            let jobs = self.jobs.load(Ordering::SeqCst);
            Snapshot {
                jobs: (0..jobs)
                    .map(|_| Job::new("codex", SpawnMode::Headless, "t", "."))
                    .collect(),
                ..Snapshot::default()
            }
        }
    }

    fn writer() -> (SnapshotWriter, Arc<RecordingStore>, Arc<Counter>) {
        let store = Arc::new(RecordingStore::default());
        let source = Arc::new(Counter::default());
        (
            SnapshotWriter::spawn(store.clone(), source.clone()),
            store,
            source,
        )
    }

    #[tokio::test]
    async fn writes_in_order_and_ends_with_newest() {
        let (writer, store, source) = writer();

        for n in 1..=20 {
            source.jobs.store(n, Ordering::SeqCst);
            writer.mark_dirty();
            if n % 5 == 0 {
                tokio::task::yield_now().await;
            }
        }
        writer.flush().await;

        let saved = store.saved.lock().unwrap().clone();
        assert!(!saved.is_empty());
        assert!(saved.windows(2).all(|w| w[0] <= w[1]), "out of order: {saved:?}");
        assert_eq!(*saved.last().unwrap(), 20);
    }

    #[tokio::test]
    async fn queued_changes_share_one_snapshot() {
        let (writer, store, source) = writer();
        source.jobs.store(3, Ordering::SeqCst);
        for _ in 0..50 {
            writer.mark_dirty();
        }
        writer.flush().await;

        assert_eq!(source.taken.load(Ordering::SeqCst), 1);
        assert_eq!(*store.saved.lock().unwrap(), [3]);
    }

    #[tokio::test]
    async fn flush_without_pending_writes_returns() {
        let (writer, store, source) = writer();
        writer.flush().await;
        assert!(store.saved.lock().unwrap().is_empty());
        assert_eq!(source.taken.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn snapshot_ignores_unknown_fields() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{"jobs": [], "completed": [], "event_tails": {}, "schema": 9}"#,
        )
        .unwrap();
        assert!(snapshot.is_empty());

        let partial: Snapshot = serde_json::from_str(r#"{"completed": []}"#).unwrap();
        assert!(partial.is_empty());
    }
}
