//! Event fan-out abstraction and the per-process subscriber registry.
//!
//! The serving system runs as multiple independent processes, so an
//! in-memory subscriber list in one process cannot see publishes from
//! another. The fan-out therefore splits into two halves:
//!
//! - a [`Broadcaster`] publishes every event to a shared, process-external
//!   channel keyed by project (Redis pub/sub in production, a loopback in
//!   tests), and
//! - each process runs exactly one long-lived listener that receives from
//!   *all* project channels and redistributes each message into that
//!   process's local [`SubscriberRegistry`] for the matching project.
//!
//! Client subscriptions never open their own connection to the shared bus;
//! they only ever register with the local registry.
//!
//! # Delivery semantics
//!
//! Best-effort. Each subscriber has a small bounded buffer; a send to a full
//! buffer is dropped rather than blocking, so one slow client can never
//! stall delivery to others or block the publisher. Within one subscriber,
//! messages arrive in publish order as seen by the forwarding loop; no
//! ordering is guaranteed across subscribers or across drawings.

use crate::drawing::{Action, Drawing, ProjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default per-subscriber buffer capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 10;

/// Errors raised by fan-out implementations.
#[derive(Error, Debug, Clone)]
pub enum FanOutError {
    /// Failed to reach the shared pub/sub backbone.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish to a channel.
    #[error("publish failed for channel '{channel}': {reason}")]
    PublishFailed {
        /// The channel that failed.
        channel: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to encode an event envelope.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// The wire shape of a fan-out notification: `{type, payload}`.
///
/// `type` is `DRAWING_<ACTION>` in upper case; `payload` is the updated
/// drawing as JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type string, e.g. `DRAWING_SUBMIT`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build the envelope for a successful workflow action on a drawing.
    ///
    /// # Errors
    ///
    /// Returns [`FanOutError::Serialization`] if the drawing cannot be
    /// encoded as JSON.
    pub fn for_drawing_action(action: Action, drawing: &Drawing) -> Result<Self, FanOutError> {
        let payload =
            serde_json::to_value(drawing).map_err(|e| FanOutError::Serialization(e.to_string()))?;
        Ok(Self {
            event_type: action.event_type(),
            payload,
        })
    }

    /// Encode the envelope as the JSON string sent over the wire.
    ///
    /// # Errors
    ///
    /// Returns [`FanOutError::Serialization`] on encoding failure.
    pub fn to_json(&self) -> Result<String, FanOutError> {
        serde_json::to_string(self).map_err(|e| FanOutError::Serialization(e.to_string()))
    }
}

/// Distributes drawing-change notifications to interested observers across
/// process boundaries.
///
/// # Dyn Compatibility
///
/// Returns explicit `Pin<Box<dyn Future>>` so the engine can hold an
/// `Arc<dyn Broadcaster>`.
pub trait Broadcaster: Send + Sync {
    /// Publish an event for a project to the shared backbone.
    ///
    /// # Errors
    ///
    /// Returns [`FanOutError::PublishFailed`] if the backbone rejects the
    /// publish. Callers on the workflow path treat this as best-effort and
    /// only log it.
    fn publish(
        &self,
        project_id: ProjectId,
        envelope: &EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), FanOutError>> + Send + '_>>;

    /// Register a local subscriber for a project's events.
    ///
    /// The returned [`Subscription`] unsubscribes itself when dropped.
    fn subscribe(&self, project_id: ProjectId) -> Subscription;
}

type SubscriberId = u64;
type SubscriberMap = HashMap<ProjectId, HashMap<SubscriberId, mpsc::Sender<String>>>;

/// Per-process mapping from project id to the local subscriber set.
///
/// Reads (fan-out sends) are far more frequent than subscribe/unsubscribe,
/// so the map sits behind a read/write lock and [`dispatch`] only takes the
/// read side. Sends use `try_send`: a full or closed buffer drops the
/// message for that subscriber only.
///
/// [`dispatch`]: SubscriberRegistry::dispatch
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<SubscriberMap>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SubscriberMap> {
        // A poisoned lock only means another thread panicked mid-access;
        // the map itself is still structurally sound.
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SubscriberMap> {
        self.subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a subscriber for a project with the given buffer capacity.
    pub fn subscribe(self: &Arc<Self>, project_id: ProjectId, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write().entry(project_id).or_default().insert(id, tx);
        Subscription {
            project_id,
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Remove a subscriber, closing its stream.
    fn unsubscribe(&self, project_id: ProjectId, id: SubscriberId) {
        let mut map = self.write();
        if let Some(set) = map.get_mut(&project_id) {
            set.remove(&id);
            if set.is_empty() {
                map.remove(&project_id);
            }
        }
    }

    /// Deliver a payload to every subscriber of a project.
    ///
    /// Returns the number of subscribers the payload was actually handed to;
    /// subscribers with full or closed buffers are skipped silently.
    pub fn dispatch(&self, project_id: ProjectId, payload: &str) -> usize {
        let map = self.read();
        let Some(set) = map.get(&project_id) else {
            return 0;
        };
        let mut delivered = 0;
        for tx in set.values() {
            match tx.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_) | mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(project_id = %project_id, "Skipping slow or gone subscriber");
                }
            }
        }
        delivered
    }

    /// Number of currently registered subscribers for a project.
    #[must_use]
    pub fn subscriber_count(&self, project_id: ProjectId) -> usize {
        self.read().get(&project_id).map_or(0, HashMap::len)
    }
}

/// A live subscription to one project's event stream.
///
/// Messages are the JSON-encoded [`EventEnvelope`] strings as published.
/// Dropping the subscription removes it from the registry and closes the
/// stream.
#[derive(Debug)]
pub struct Subscription {
    project_id: ProjectId,
    id: SubscriberId,
    rx: mpsc::Receiver<String>,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    /// The project this subscription listens to.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Receive the next message, waiting until one arrives.
    ///
    /// Returns `None` once the subscription has been closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Receive a message if one is already buffered.
    ///
    /// # Errors
    ///
    /// Returns [`mpsc::error::TryRecvError::Empty`] when the buffer is empty
    /// and [`mpsc::error::TryRecvError::Disconnected`] once closed.
    pub fn try_recv(&mut self) -> Result<String, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.project_id, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::{ActorId, DrawingId, Revision, Stage, Version};
    use chrono::Utc;

    fn drawing() -> Drawing {
        Drawing {
            id: DrawingId::new(1),
            project_id: ProjectId::new(10),
            title: "P-100 overview".to_string(),
            description: String::new(),
            author_id: ActorId::new(5),
            stage: Stage::Drafting,
            assignee: Some(ActorId::new(5)),
            revision: Revision::FIRST,
            version: Version::new(1),
            drawing_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn envelope_type_matches_action() {
        let env = EventEnvelope::for_drawing_action(Action::Claim, &drawing())
            .unwrap_or_else(|_| EventEnvelope {
                event_type: String::new(),
                payload: serde_json::Value::Null,
            });
        assert_eq!(env.event_type, "DRAWING_CLAIM");
        assert_eq!(env.payload["project_id"], 10);
    }

    #[test]
    fn envelope_json_uses_type_key() {
        let env = EventEnvelope {
            event_type: "DRAWING_RELEASE".to_string(),
            payload: serde_json::json!({"id": 1}),
        };
        let json = env.to_json().unwrap_or_default();
        assert!(json.contains("\"type\":\"DRAWING_RELEASE\""));
    }

    #[tokio::test]
    async fn dispatch_reaches_only_matching_project() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut sub_p = registry.subscribe(ProjectId::new(1), 4);
        let mut sub_q = registry.subscribe(ProjectId::new(2), 4);

        assert_eq!(registry.dispatch(ProjectId::new(1), "hello"), 1);

        assert_eq!(sub_p.recv().await.as_deref(), Some("hello"));
        assert!(matches!(
            sub_q.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut slow = registry.subscribe(ProjectId::new(1), 2);

        assert_eq!(registry.dispatch(ProjectId::new(1), "a"), 1);
        assert_eq!(registry.dispatch(ProjectId::new(1), "b"), 1);
        // Buffer full: the publish completes but delivers to nobody.
        assert_eq!(registry.dispatch(ProjectId::new(1), "c"), 0);

        assert_eq!(slow.recv().await.as_deref(), Some("a"));
        assert_eq!(slow.recv().await.as_deref(), Some("b"));
        assert!(matches!(
            slow.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let registry = Arc::new(SubscriberRegistry::new());
        let sub = registry.subscribe(ProjectId::new(7), 4);
        assert_eq!(registry.subscriber_count(ProjectId::new(7)), 1);
        drop(sub);
        assert_eq!(registry.subscriber_count(ProjectId::new(7)), 0);
        assert_eq!(registry.dispatch(ProjectId::new(7), "x"), 0);
    }
}
