//! Graph Document Persistence
//!
//! [`GraphStore`] abstracts the backing document store behind an async seam:
//! fetch the current wire document, save a new revision, and observe changes.
//! Saves return a monotonically increasing version number, and every save is
//! broadcast to all change subscribers *including the writer*; it is the
//! caller's job to drop its own echoes by comparing versions.
//!
//! [`MemoryGraphStore`] is the in-process implementation used by tests and
//! single-user deployments.

use crate::db::events::{DocumentChannel, DocumentUpdate, UpdateSource};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

/// Async persistence seam for the goal graph document
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fetch the current wire document, or `None` if nothing was ever saved
    async fn fetch_document(&self) -> anyhow::Result<Option<Value>>;

    /// Save a full document revision, returning its store version.
    ///
    /// Versions increase monotonically per store. The saved revision is
    /// broadcast to every change subscriber, the writer included.
    async fn save_document(&self, document: Value) -> anyhow::Result<u64>;

    /// Subscribe to document change notifications
    fn changes(&self) -> broadcast::Receiver<DocumentUpdate>;
}

#[derive(Debug, Default)]
struct StoreState {
    document: Option<Value>,
    version: u64,
}

/// In-memory [`GraphStore`] with broadcast change notifications
#[derive(Debug)]
pub struct MemoryGraphStore {
    state: Mutex<StoreState>,
    channel: DocumentChannel,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            channel: DocumentChannel::new(),
        }
    }

    /// Create a store pre-seeded with a document at version 1
    pub fn with_document(document: Value) -> Self {
        Self {
            state: Mutex::new(StoreState {
                document: Some(document),
                version: 1,
            }),
            channel: DocumentChannel::new(),
        }
    }

    /// Current store version (0 before the first save)
    pub async fn version(&self) -> u64 {
        self.state.lock().await.version
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn fetch_document(&self) -> anyhow::Result<Option<Value>> {
        Ok(self.state.lock().await.document.clone())
    }

    async fn save_document(&self, document: Value) -> anyhow::Result<u64> {
        let version = {
            let mut state = self.state.lock().await;
            state.version += 1;
            state.document = Some(document.clone());
            state.version
        };
        self.channel.publish(DocumentUpdate {
            version,
            source: UpdateSource::Remote,
            document,
        });
        Ok(version)
    }

    fn changes(&self) -> broadcast::Receiver<DocumentUpdate> {
        self.channel.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_empty_store() {
        let store = MemoryGraphStore::new();
        assert!(store.fetch_document().await.unwrap().is_none());
        assert_eq!(store.version().await, 0);
    }

    #[tokio::test]
    async fn test_save_bumps_version_and_broadcasts() {
        let store = MemoryGraphStore::new();
        let mut changes = store.changes();

        let v1 = store.save_document(json!({ "nodes": {} })).await.unwrap();
        let v2 = store
            .save_document(json!({ "nodes": { "a": {} } }))
            .await
            .unwrap();
        assert_eq!((v1, v2), (1, 2));

        let first = changes.recv().await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.source, UpdateSource::Remote);
        assert_eq!(changes.recv().await.unwrap().version, 2);

        let fetched = store.fetch_document().await.unwrap().unwrap();
        assert_eq!(fetched["nodes"]["a"], json!({}));
    }

    #[tokio::test]
    async fn test_seeded_store_starts_at_version_one() {
        let store = MemoryGraphStore::with_document(json!({ "nodes": {} }));
        assert_eq!(store.version().await, 1);
        assert!(store.fetch_document().await.unwrap().is_some());
        assert_eq!(store.save_document(json!({})).await.unwrap(), 2);
    }
}
