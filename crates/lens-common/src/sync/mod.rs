//! In-process change feed backed by a `tokio::sync::broadcast` channel.
//!
//! Every registry mutation publishes a [`ChangeEvent`] carrying the full new
//! state of the entity, so consumers reconcile by last-write-wins per id and
//! never need partial-diff merging.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::schema::{Document, Rating};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Document,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Insert,
    Update,
}

/// One observed mutation. `snapshot` is the complete entity state after the
/// write, serialized to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity: Entity,
    pub op: Op,
    pub id: String,
    pub owner: String,
    pub project_id: String,
    pub snapshot: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn document(op: Op, document: &Document) -> Self {
        Self {
            entity: Entity::Document,
            op,
            id: document.id.clone(),
            owner: document.owner.clone(),
            project_id: document.project_id.clone(),
            snapshot: serde_json::to_value(document).unwrap_or(serde_json::Value::Null),
            occurred_at: Utc::now(),
        }
    }

    pub fn rating(op: Op, rating: &Rating, owner: &str) -> Self {
        Self {
            entity: Entity::Rating,
            op,
            id: rating.id.clone(),
            owner: owner.to_string(),
            project_id: rating.project_id.clone(),
            snapshot: serde_json::to_value(rating).unwrap_or(serde_json::Value::Null),
            occurred_at: Utc::now(),
        }
    }
}

/// What a subscriber wants to see.
#[derive(Debug, Clone)]
pub enum Scope {
    DocumentsForOwner(String),
    /// Ratings for any of the listed document ids.
    RatingsForDocuments(Vec<String>),
    AllForOwner(String),
}

impl Scope {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Scope::DocumentsForOwner(owner) => {
                event.entity == Entity::Document && event.owner == *owner
            }
            Scope::RatingsForDocuments(ids) => {
                event.entity == Entity::Rating
                    && event
                        .snapshot
                        .get("document_id")
                        .and_then(|v| v.as_str())
                        .map(|id| ids.iter().any(|candidate| candidate == id))
                        .unwrap_or(false)
            }
            Scope::AllForOwner(owner) => event.owner == *owner,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// The subscriber fell behind and the channel dropped events. The
    /// consumer must refetch current state before resuming.
    #[error("subscriber lagged, {0} events dropped")]
    Lagged(u64),
    #[error("event bus closed")]
    Closed,
}

const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out hub shared as `Arc<EventBus>` across the pipeline, the matching
/// engine, and the API's SSE feed.
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe [`SyncError::Lagged`].
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Zero receivers is not an error;
    /// the registry remains the source of truth.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, scope: Scope) -> ScopedSubscription {
        ScopedSubscription {
            receiver: self.sender.subscribe(),
            scope,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A broadcast receiver that skips events outside its scope.
pub struct ScopedSubscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    scope: Scope,
}

impl ScopedSubscription {
    pub async fn next(&mut self) -> Result<ChangeEvent, SyncError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.scope.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => return Err(SyncError::Lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(SyncError::Closed),
            }
        }
    }

    /// Non-blocking variant for drain-style consumers.
    pub fn try_next(&mut self) -> Result<Option<ChangeEvent>, SyncError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.scope.matches(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Err(SyncError::Lagged(n))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Err(SyncError::Closed),
            }
        }
    }
}

/// Client-side reconciliation helper: a last-write-wins map of entity
/// snapshots keyed by id.
#[derive(Default)]
pub struct Replica {
    entries: HashMap<String, ChangeEvent>,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: ChangeEvent) {
        self.entries.insert(event.id.clone(), event);
    }

    pub fn get(&self, id: &str) -> Option<&ChangeEvent> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Bucket, Document};

    fn sample_document(owner: &str) -> Document {
        Document::new("resume.txt", 10, "text/plain", "p1", owner)
    }

    fn sample_rating(document_id: &str) -> Rating {
        Rating {
            id: "rat1".into(),
            document_id: document_id.into(),
            project_id: "p1".into(),
            category: Bucket::A,
            rationale: "all requirements met".into(),
            rated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn scoped_subscription_skips_other_owners() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe(Scope::DocumentsForOwner("alice".into()));

        bus.publish(ChangeEvent::document(Op::Insert, &sample_document("bob")));
        let alice_doc = sample_document("alice");
        bus.publish(ChangeEvent::document(Op::Insert, &alice_doc));

        let event = sub.next().await.unwrap();
        assert_eq!(event.owner, "alice");
        assert_eq!(event.id, alice_doc.id);
    }

    #[tokio::test]
    async fn rating_scope_filters_by_document_id() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe(Scope::RatingsForDocuments(vec!["d1".into()]));

        bus.publish(ChangeEvent::rating(Op::Insert, &sample_rating("d2"), "alice"));
        bus.publish(ChangeEvent::rating(Op::Insert, &sample_rating("d1"), "alice"));

        let event = sub.next().await.unwrap();
        assert_eq!(
            event.snapshot.get("document_id").and_then(|v| v.as_str()),
            Some("d1")
        );
    }

    #[tokio::test]
    async fn lag_is_surfaced_as_refetch_signal() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe(Scope::AllForOwner("alice".into()));

        for _ in 0..8 {
            bus.publish(ChangeEvent::document(Op::Update, &sample_document("alice")));
        }

        let err = sub.next().await.unwrap_err();
        assert!(matches!(err, SyncError::Lagged(_)));

        // After the lag error the subscription keeps delivering newer events.
        assert!(sub.next().await.is_ok());
    }

    #[test]
    fn replica_merges_last_write_wins() {
        let mut replica = Replica::new();
        let mut doc = sample_document("alice");

        replica.apply(ChangeEvent::document(Op::Insert, &doc));
        doc.progress = 50;
        replica.apply(ChangeEvent::document(Op::Update, &doc));

        assert_eq!(replica.len(), 1);
        let merged = replica.get(&doc.id).unwrap();
        assert_eq!(
            merged.snapshot.get("progress").and_then(|v| v.as_u64()),
            Some(50)
        );
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(ChangeEvent::document(Op::Insert, &sample_document("alice")));
    }
}
