//! Best-effort audit delivery seam.
//!
//! After a transition commits, its [`TransitionRecord`] is handed to an
//! [`AuditSink`] from a detached task. Delivery is fire-and-forget: a failure
//! is logged operationally and neither retried nor surfaced to the caller of
//! the workflow. The persisted transition log in the store remains the only
//! durable source of truth; the external audit topic is best-effort by
//! design.
//!
//! Production implementation: `RedpandaAuditSink` in `drawflow-redpanda`,
//! writing JSON records to a Kafka-compatible topic.

use crate::drawing::TransitionRecord;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by audit sink implementations.
#[derive(Error, Debug, Clone)]
pub enum AuditError {
    /// The record could not be encoded.
    #[error("failed to serialize audit record: {0}")]
    Serialization(String),

    /// The durable log rejected the write.
    #[error("failed to write audit record to '{topic}': {reason}")]
    PublishFailed {
        /// The destination topic.
        topic: String,
        /// The reason for failure.
        reason: String,
    },
}

/// Sink for transition records headed to a durable external log.
///
/// # Dyn Compatibility
///
/// Returns explicit `Pin<Box<dyn Future>>` so the engine can hold an
/// `Arc<dyn AuditSink>`.
pub trait AuditSink: Send + Sync {
    /// Deliver one transition record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] on serialization or delivery failure. The
    /// workflow path logs the error and moves on; implementations must not
    /// retry internally.
    fn emit(
        &self,
        record: &TransitionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>>;
}
