//! Document Change Broadcasting
//!
//! A [`DocumentChannel`] fans wire-document updates out to every interested
//! party (sync reconcilers, collaborating services, tests). Each update
//! carries the store version it was written at plus its [`UpdateSource`], so
//! receivers can tell a remote write from a locally-originated patch and drop
//! their own echoes by version comparison instead of timing heuristics.

use serde_json::Value;
use tokio::sync::broadcast;

/// Buffered updates per subscriber before the oldest are dropped.
pub const CHANNEL_CAPACITY: usize = 64;

/// Where a document update came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSource {
    /// Written through the backing store (possibly by this process)
    Remote,

    /// Injected by a named collaborator, bypassing the store
    Patch { origin: String },
}

/// One full-document update event
#[derive(Debug, Clone)]
pub struct DocumentUpdate {
    /// Store version this document was written at
    pub version: u64,

    pub source: UpdateSource,

    /// The complete wire document
    pub document: Value,
}

/// Broadcast channel for document updates
#[derive(Debug)]
pub struct DocumentChannel {
    sender: broadcast::Sender<DocumentUpdate>,
}

impl DocumentChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an update to all current subscribers. An update with no
    /// listeners is silently dropped.
    pub fn publish(&self, update: DocumentUpdate) {
        let _ = self.sender.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentUpdate> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DocumentChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let channel = DocumentChannel::new();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        channel.publish(DocumentUpdate {
            version: 3,
            source: UpdateSource::Patch {
                origin: "planner".to_string(),
            },
            document: json!({ "nodes": {} }),
        });

        let received = first.recv().await.unwrap();
        assert_eq!(received.version, 3);
        assert_eq!(
            received.source,
            UpdateSource::Patch {
                origin: "planner".to_string()
            }
        );
        assert_eq!(second.recv().await.unwrap().version, 3);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let channel = DocumentChannel::new();
        channel.publish(DocumentUpdate {
            version: 1,
            source: UpdateSource::Remote,
            document: json!({}),
        });
        assert_eq!(channel.receiver_count(), 0);
    }
}
