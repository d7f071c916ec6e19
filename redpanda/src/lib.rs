//! Kafka-compatible audit log sink for Drawflow.
//!
//! This crate provides a production implementation of the [`AuditSink`] trait
//! from `drawflow-core`, appending workflow transition records to a
//! Kafka-compatible log (Redpanda, Apache Kafka, AWS MSK, ...). It uses
//! rdkafka for the wire protocol.
//!
//! # Delivery Semantics
//!
//! The audit trail is **best-effort** from the workflow's point of view: the
//! engine emits records after the database transaction commits and only logs
//! failures. Within that contract, this sink still asks the broker for an
//! acknowledgment (configurable via [`RedpandaAuditSinkBuilder::producer_acks`])
//! so a returned `Ok` means the record reached the log.
//!
//! Records are keyed by drawing id, so all transitions of one drawing land on
//! the same partition and replay in order.
//!
//! # Example
//!
//! ```no_run
//! use drawflow_redpanda::RedpandaAuditSink;
//!
//! # fn example() -> Result<(), drawflow_core::audit::AuditError> {
//! let sink = RedpandaAuditSink::new("localhost:9092")?;
//!
//! // Custom configuration
//! let sink = RedpandaAuditSink::builder()
//!     .brokers("localhost:9092,localhost:9093")
//!     .topic("qc-audit-logs")
//!     .producer_acks("all")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use drawflow_core::audit::{AuditError, AuditSink};
use drawflow_core::drawing::TransitionRecord;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default topic the audit trail is appended to.
pub const DEFAULT_AUDIT_TOPIC: &str = "qc-audit-logs";

/// Kafka-compatible audit sink.
///
/// Serializes each [`TransitionRecord`] as JSON and produces it to the
/// configured topic, keyed by drawing id.
pub struct RedpandaAuditSink {
    /// Kafka producer for appending records
    producer: FutureProducer,
    /// Broker addresses
    brokers: String,
    /// Destination topic
    topic: String,
    /// Producer send timeout
    timeout: Duration,
}

impl RedpandaAuditSink {
    /// Create a new audit sink with default configuration.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::PublishFailed`] if the producer cannot be
    /// created from the given configuration.
    pub fn new(brokers: &str) -> Result<Self, AuditError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the sink.
    #[must_use]
    pub fn builder() -> RedpandaAuditSinkBuilder {
        RedpandaAuditSinkBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Get the destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Builder for configuring a [`RedpandaAuditSink`].
///
/// # Example
///
/// ```no_run
/// use drawflow_redpanda::RedpandaAuditSink;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), drawflow_core::audit::AuditError> {
/// let sink = RedpandaAuditSink::builder()
///     .brokers("localhost:9092")
///     .topic("qc-audit-logs")
///     .producer_acks("all")
///     .compression("lz4")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaAuditSinkBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl RedpandaAuditSinkBuilder {
    /// Set the broker addresses.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the destination topic.
    ///
    /// Default: [`DEFAULT_AUDIT_TOPIC`]
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// # Parameters
    ///
    /// - `acks`: "0" (no acks), "1" (leader ack), "all" (all replicas ack)
    ///
    /// Default: "1"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec.
    ///
    /// # Parameters
    ///
    /// - `compression`: "none", "gzip", "snappy", "lz4", "zstd"
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaAuditSink`].
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::PublishFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaAuditSink, AuditError> {
        let topic = self
            .topic
            .unwrap_or_else(|| DEFAULT_AUDIT_TOPIC.to_string());
        let brokers = self.brokers.ok_or_else(|| AuditError::PublishFailed {
            topic: topic.clone(),
            reason: "Brokers not configured".to_string(),
        })?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set(
                "compression.type",
                self.compression.as_deref().unwrap_or("none"),
            );

        let producer: FutureProducer =
            producer_config
                .create()
                .map_err(|e| AuditError::PublishFailed {
                    topic: topic.clone(),
                    reason: format!("Failed to create producer: {e}"),
                })?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            compression = self.compression.as_deref().unwrap_or("none"),
            "RedpandaAuditSink created successfully"
        );

        Ok(RedpandaAuditSink {
            producer,
            brokers,
            topic,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}

impl AuditSink for RedpandaAuditSink {
    fn emit(
        &self,
        record: &TransitionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>> {
        // Clone data before moving into async block
        let record = record.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let payload = serde_json::to_vec(&record)
                .map_err(|e| AuditError::Serialization(e.to_string()))?;

            // Key by drawing id: all transitions of one drawing share a
            // partition, preserving replay order per drawing.
            let key = record.drawing_id.value().to_string();

            let kafka_record = FutureRecord::to(&self.topic).payload(&payload).key(&key);

            let send_result = self
                .producer
                .send(kafka_record, Timeout::After(timeout))
                .await;

            match send_result {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %self.topic,
                        partition = partition,
                        offset = offset,
                        drawing_id = %record.drawing_id,
                        action = %record.action,
                        "Audit record written"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %self.topic,
                        drawing_id = %record.drawing_id,
                        error = %kafka_error,
                        "Failed to write audit record"
                    );
                    Err(AuditError::PublishFailed {
                        topic: self.topic.clone(),
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }
}
