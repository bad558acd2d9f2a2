//! Sync Reconciler - Feeding External Updates into the Service
//!
//! Bridges the store's change feed and the collaborator patch channel into
//! [`GraphService::apply_update`]. The reconciler runs as a background task;
//! the service's version watermark decides which remote updates are echoes
//! of this process's own writes.

use crate::db::{DocumentChannel, DocumentUpdate, GraphStore};
use crate::services::graph_service::GraphService;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Drives a [`GraphService`] from external update feeds
pub struct SyncReconciler;

impl SyncReconciler {
    /// Spawn a background task applying store changes and collaborator
    /// patches to the service until both feeds close.
    pub fn spawn(
        service: Arc<GraphService>,
        store: Arc<dyn GraphStore>,
        patches: &DocumentChannel,
    ) -> JoinHandle<()> {
        let mut changes = store.changes();
        let mut patch_stream = BroadcastStream::new(patches.subscribe());

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = changes.recv() => match change {
                        Ok(update) => Self::apply(&service, &update).await,
                        Err(RecvError::Lagged(skipped)) => {
                            // Missed intermediate revisions; resync from the
                            // store instead of replaying them.
                            warn!(skipped, "change feed lagged, refetching document");
                            if let Err(err) = service.fetch_document().await {
                                warn!(%err, "refetch after lag failed");
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                    patch = patch_stream.next() => match patch {
                        Some(Ok(update)) => Self::apply(&service, &update).await,
                        Some(Err(err)) => {
                            warn!(%err, "patch feed lagged, refetching document");
                            if let Err(refetch_err) = service.fetch_document().await {
                                warn!(%refetch_err, "refetch after lag failed");
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("sync reconciler stopped");
        })
    }

    async fn apply(service: &GraphService, update: &DocumentUpdate) {
        match service.apply_update(update).await {
            Ok(true) => debug!(version = update.version, "external update applied"),
            Ok(false) => {}
            Err(err) => warn!(%err, version = update.version, "failed to apply external update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryGraphStore, UpdateSource};
    use crate::models::GoalStatus;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::sleep;

    fn seeded_store() -> Arc<MemoryGraphStore> {
        Arc::new(MemoryGraphStore::with_document(json!({
            "nodes": {
                "goal": { "label": "Goal" },
                "sub": { "label": "Sub", "parents": ["goal"] }
            }
        })))
    }

    #[tokio::test]
    async fn test_remote_write_from_peer_is_applied() {
        let store = seeded_store();
        let service = Arc::new(GraphService::new(store.clone()));
        service.fetch_document().await.unwrap();

        let patches = DocumentChannel::new();
        let handle = SyncReconciler::spawn(service.clone(), store.clone(), &patches);

        // A peer (not this service) writes a new revision.
        store
            .save_document(json!({
                "nodes": { "replacement": { "label": "Replacement" } }
            }))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        let doc = service.document().await;
        assert!(doc.contains("replacement"));
        assert!(!doc.contains("goal"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_own_write_echo_is_suppressed() {
        let store = seeded_store();
        let service = Arc::new(GraphService::new(store.clone()));
        service.fetch_document().await.unwrap();

        let patches = DocumentChannel::new();
        let handle = SyncReconciler::spawn(service.clone(), store.clone(), &patches);

        // The service's own write comes back through the change feed but
        // must not clobber state that is already ahead of it.
        let outcome = service
            .set_node_status("sub", GoalStatus::InProgress)
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        let doc = service.document().await;
        assert_eq!(doc.get("sub").unwrap().status, GoalStatus::InProgress);
        assert!(outcome.version > 1);
        handle.abort();
    }

    /// Broadcasts each save's echo before the save call returns, mimicking a
    /// change feed that outruns the writer's response.
    struct RacingEchoStore {
        version: Mutex<u64>,
        channel: DocumentChannel,
    }

    impl RacingEchoStore {
        fn new() -> Self {
            Self {
                version: Mutex::new(0),
                channel: DocumentChannel::new(),
            }
        }
    }

    #[async_trait]
    impl GraphStore for RacingEchoStore {
        async fn fetch_document(&self) -> anyhow::Result<Option<Value>> {
            Ok(Some(json!({
                "nodes": {
                    "goal": { "label": "Goal" },
                    "sub": { "label": "Sub", "parents": ["goal"] }
                }
            })))
        }

        async fn save_document(&self, _document: Value) -> anyhow::Result<u64> {
            let version = {
                let mut guard = self.version.lock().unwrap();
                *guard += 1;
                *guard
            };
            // The echo is in flight before the writer learns its version.
            // A marker payload makes any wrongly applied echo visible.
            self.channel.publish(DocumentUpdate {
                version,
                source: UpdateSource::Remote,
                document: json!({ "nodes": { "stale-echo": { "label": "Echo" } } }),
            });
            sleep(Duration::from_millis(30)).await;
            Ok(version)
        }

        fn changes(&self) -> broadcast::Receiver<DocumentUpdate> {
            self.channel.subscribe()
        }
    }

    #[tokio::test]
    async fn test_echo_arriving_before_save_returns_is_dropped() {
        let store = Arc::new(RacingEchoStore::new());
        let service = Arc::new(GraphService::new(store.clone()));
        service.fetch_document().await.unwrap();

        let patches = DocumentChannel::new();
        let handle = SyncReconciler::spawn(service.clone(), store.clone(), &patches);

        service
            .set_node_status("sub", GoalStatus::InProgress)
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        // The mutation survives and the echo payload never lands.
        let doc = service.document().await;
        assert_eq!(doc.get("sub").unwrap().status, GoalStatus::InProgress);
        assert!(!doc.contains("stale-echo"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_collaborator_patch_always_applies() {
        let store = seeded_store();
        let service = Arc::new(GraphService::new(store.clone()));
        service.fetch_document().await.unwrap();

        let patches = DocumentChannel::new();
        let handle = SyncReconciler::spawn(service.clone(), store.clone(), &patches);

        // Patches carry no meaningful version; even 0 must apply.
        patches.publish(DocumentUpdate {
            version: 0,
            source: UpdateSource::Patch {
                origin: "planner".to_string(),
            },
            document: json!({ "nodes": { "from-patch": { "label": "Patched" } } }),
        });
        sleep(Duration::from_millis(50)).await;

        assert!(service.document().await.contains("from-patch"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_malformed_update_is_ignored() {
        let store = seeded_store();
        let service = Arc::new(GraphService::new(store.clone()));
        service.fetch_document().await.unwrap();

        let patches = DocumentChannel::new();
        let handle = SyncReconciler::spawn(service.clone(), store.clone(), &patches);

        // Cyclic parents fail normalization and leave state untouched.
        patches.publish(DocumentUpdate {
            version: 0,
            source: UpdateSource::Patch {
                origin: "planner".to_string(),
            },
            document: json!({
                "nodes": {
                    "x": { "parents": ["y"] },
                    "y": { "parents": ["x"] }
                }
            }),
        });
        sleep(Duration::from_millis(50)).await;

        let doc = service.document().await;
        assert!(doc.contains("goal"));
        assert!(!doc.contains("x"));
        handle.abort();
    }
}
