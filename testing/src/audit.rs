//! Audit sinks for observing and breaking the asynchronous tail.

use drawflow_core::audit::{AuditError, AuditSink};
use drawflow_core::drawing::TransitionRecord;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

/// An [`AuditSink`] that keeps every emitted record in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<TransitionRecord>>,
    notify: Notify,
}

impl RecordingAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record emitted so far, in emission order.
    #[must_use]
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` records have been emitted.
    ///
    /// The workflow engine emits from a detached task; tests use this to
    /// rendezvous with it instead of sleeping.
    pub async fn wait_for_records(&self, count: usize) -> Vec<TransitionRecord> {
        loop {
            let notified = self.notify.notified();
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            notified.await;
        }
    }
}

impl AuditSink for RecordingAuditSink {
    fn emit(
        &self,
        record: &TransitionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record);
            self.notify.notify_waiters();
            Ok(())
        })
    }
}

/// An [`AuditSink`] that rejects every record.
///
/// Used to verify the audit trail is best-effort: a workflow action must
/// still succeed when this sink is wired in.
pub struct FailingAuditSink {
    reason: String,
    attempts: Mutex<usize>,
    notify: Notify,
}

impl FailingAuditSink {
    /// Create a sink failing with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            attempts: Mutex::new(0),
            notify: Notify::new(),
        }
    }

    /// How many emissions were attempted (and rejected).
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until at least `count` emissions have been attempted.
    pub async fn wait_for_attempts(&self, count: usize) -> usize {
        loop {
            let notified = self.notify.notified();
            let attempts = self.attempts();
            if attempts >= count {
                return attempts;
            }
            notified.await;
        }
    }
}

impl AuditSink for FailingAuditSink {
    fn emit(
        &self,
        _record: &TransitionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>> {
        Box::pin(async move {
            *self.attempts.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            self.notify.notify_waiters();
            Err(AuditError::PublishFailed {
                topic: "qc-audit-logs".to_string(),
                reason: self.reason.clone(),
            })
        })
    }
}
