//! Redis pub/sub event fan-out for Drawflow.
//!
//! This crate provides the production implementation of the
//! [`Broadcaster`] trait from `drawflow-core`, distributing drawing-change
//! notifications across server processes over Redis pub/sub.
//!
//! # Architecture
//!
//! ```text
//!  process A                          process B
//! ┌───────────────┐    PUBLISH      ┌───────────────┐
//! │ Broadcaster   │───────────────► │   Redis       │
//! │  .publish()   │ project:7:events│  (pub/sub)    │
//! └───────────────┘                 └───────┬───────┘
//!                                           │ PSUBSCRIBE project:*:events
//!                                           ▼
//!                                   ┌───────────────┐
//!                                   │ one listener  │
//!                                   │ task per      │
//!                                   │ process       │
//!                                   └───────┬───────┘
//!                                           │ dispatch by project id
//!                                     ┌─────┴─────┐
//!                                     ▼           ▼
//!                                 subscriber  subscriber
//! ```
//!
//! Each process runs exactly one listener holding the pub/sub connection and
//! pattern-subscribed to every project channel. Incoming messages are
//! demultiplexed into the process-local [`SubscriberRegistry`]; client
//! subscriptions never open their own Redis connection.
//!
//! Delivery is best-effort end to end: publish failures are reported to the
//! caller (which, on the workflow path, only logs them), and subscribers
//! with full buffers are skipped.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use drawflow_core::drawing::ProjectId;
use drawflow_core::fanout::{
    Broadcaster, DEFAULT_SUBSCRIBER_BUFFER, EventEnvelope, FanOutError, SubscriberRegistry,
    Subscription,
};
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The pattern the per-process listener subscribes to.
const CHANNEL_PATTERN: &str = "project:*:events";

/// Redis channel carrying one project's events.
fn channel_name(project_id: ProjectId) -> String {
    format!("project:{project_id}:events")
}

/// Extract the project id from a `project:{id}:events` channel name.
fn parse_channel(channel: &str) -> Option<ProjectId> {
    let id = channel
        .strip_prefix("project:")?
        .strip_suffix(":events")?
        .parse::<i64>()
        .ok()?;
    Some(ProjectId::new(id))
}

/// Redis-backed cross-process broadcaster.
///
/// Cloning shares the publish connection, the listener task and the local
/// subscriber registry.
///
/// # Example
///
/// ```no_run
/// use drawflow_redis::RedisBroadcaster;
///
/// # async fn example() -> Result<(), drawflow_core::fanout::FanOutError> {
/// let broadcaster = RedisBroadcaster::connect("redis://127.0.0.1:6379").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBroadcaster {
    conn: ConnectionManager,
    registry: Arc<SubscriberRegistry>,
    buffer_size: usize,
    listener: Arc<JoinHandle<()>>,
}

impl RedisBroadcaster {
    /// Connect to Redis and start the per-process listener.
    ///
    /// # Errors
    ///
    /// Returns [`FanOutError::ConnectionFailed`] if either the publish
    /// connection or the pub/sub connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, FanOutError> {
        Self::connect_with_buffer(redis_url, DEFAULT_SUBSCRIBER_BUFFER).await
    }

    /// Connect with an explicit per-subscriber buffer capacity.
    ///
    /// # Errors
    ///
    /// Returns [`FanOutError::ConnectionFailed`] on connection failure.
    pub async fn connect_with_buffer(
        redis_url: &str,
        buffer_size: usize,
    ) -> Result<Self, FanOutError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| FanOutError::ConnectionFailed(format!("invalid redis url: {e}")))?;

        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| FanOutError::ConnectionFailed(format!("publish connection: {e}")))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| FanOutError::ConnectionFailed(format!("pub/sub connection: {e}")))?;
        pubsub
            .psubscribe(CHANNEL_PATTERN)
            .await
            .map_err(|e| FanOutError::ConnectionFailed(format!("psubscribe: {e}")))?;

        let registry = Arc::new(SubscriberRegistry::new());
        let listener_registry = Arc::clone(&registry);

        // The one listener task for this process: demultiplexes the shared
        // stream into the local per-project subscriber sets.
        let listener = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let channel = msg.get_channel_name().to_string();
                let Some(project_id) = parse_channel(&channel) else {
                    tracing::warn!(channel = %channel, "Ignoring message on unexpected channel");
                    continue;
                };
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        let delivered = listener_registry.dispatch(project_id, &payload);
                        tracing::trace!(
                            project_id = %project_id,
                            delivered = delivered,
                            "Forwarded fan-out message"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            channel = %channel,
                            error = %e,
                            "Dropping undecodable fan-out message"
                        );
                    }
                }
            }
            tracing::debug!("Fan-out listener exiting (pub/sub stream closed)");
        });

        tracing::info!(
            pattern = CHANNEL_PATTERN,
            buffer_size = buffer_size,
            "RedisBroadcaster connected"
        );

        Ok(Self {
            conn,
            registry,
            buffer_size,
            listener: Arc::new(listener),
        })
    }

    /// The local subscriber registry (exposed for transports that need
    /// subscriber counts).
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Stop the listener task. Subscribers stop receiving; publishes still
    /// reach other processes.
    pub fn shutdown(&self) {
        self.listener.abort();
    }
}

impl Broadcaster for RedisBroadcaster {
    fn publish(
        &self,
        project_id: ProjectId,
        envelope: &EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), FanOutError>> + Send + '_>> {
        let channel = channel_name(project_id);
        let payload = envelope.to_json();
        let mut conn = self.conn.clone();

        Box::pin(async move {
            let payload = payload?;
            let receivers: i64 = conn.publish(&channel, payload).await.map_err(|e| {
                FanOutError::PublishFailed {
                    channel: channel.clone(),
                    reason: e.to_string(),
                }
            })?;
            tracing::debug!(
                channel = %channel,
                receivers = receivers,
                "Published fan-out event"
            );
            Ok(())
        })
    }

    fn subscribe(&self, project_id: ProjectId) -> Subscription {
        self.registry.subscribe(project_id, self.buffer_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_round_trip() {
        let channel = channel_name(ProjectId::new(42));
        assert_eq!(channel, "project:42:events");
        assert_eq!(parse_channel(&channel), Some(ProjectId::new(42)));
    }

    #[test]
    fn foreign_channels_are_ignored() {
        assert_eq!(parse_channel("project:x:events"), None);
        assert_eq!(parse_channel("user:42:events"), None);
        assert_eq!(parse_channel("project:42"), None);
        assert_eq!(parse_channel(""), None);
    }

    #[test]
    fn broadcaster_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedisBroadcaster>();
        assert_sync::<RedisBroadcaster>();
    }
}
