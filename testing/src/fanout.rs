//! Loopback broadcaster that records every publish.

use drawflow_core::drawing::ProjectId;
use drawflow_core::fanout::{
    Broadcaster, DEFAULT_SUBSCRIBER_BUFFER, EventEnvelope, FanOutError, SubscriberRegistry,
    Subscription,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// A [`Broadcaster`] that loops publishes straight back into its local
/// [`SubscriberRegistry`] and keeps every published envelope for assertions.
///
/// Behaves like the Redis broadcaster restricted to a single process: the
/// same JSON encoding, the same per-subscriber buffers, the same drop-on-full
/// semantics.
pub struct InMemoryBroadcaster {
    registry: Arc<SubscriberRegistry>,
    buffer_size: usize,
    published: Mutex<Vec<(ProjectId, EventEnvelope)>>,
    notify: Notify,
}

impl Default for InMemoryBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroadcaster {
    /// Create a broadcaster with the default subscriber buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Create a broadcaster with an explicit per-subscriber buffer capacity.
    #[must_use]
    pub fn with_buffer(buffer_size: usize) -> Self {
        Self {
            registry: Arc::new(SubscriberRegistry::new()),
            buffer_size,
            published: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Every envelope published so far, with its project, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<(ProjectId, EventEnvelope)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` envelopes have been published.
    ///
    /// The workflow engine publishes from a detached task; tests use this to
    /// rendezvous with it instead of sleeping.
    pub async fn wait_for_published(&self, count: usize) -> Vec<(ProjectId, EventEnvelope)> {
        loop {
            let notified = self.notify.notified();
            let published = self.published();
            if published.len() >= count {
                return published;
            }
            notified.await;
        }
    }

    /// The local subscriber registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }
}

impl Broadcaster for InMemoryBroadcaster {
    fn publish(
        &self,
        project_id: ProjectId,
        envelope: &EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), FanOutError>> + Send + '_>> {
        let envelope = envelope.clone();
        Box::pin(async move {
            let payload = envelope.to_json()?;
            self.registry.dispatch(project_id, &payload);
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((project_id, envelope));
            self.notify.notify_waiters();
            Ok(())
        })
    }

    fn subscribe(&self, project_id: ProjectId) -> Subscription {
        self.registry.subscribe(project_id, self.buffer_size)
    }
}
