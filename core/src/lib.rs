//! Core domain types and trait seams for the Drawflow workflow engine.
//!
//! Drawflow manages engineering drawings moving through a fixed multi-stage
//! review workflow (unassigned → drafting → first QC → final QC → approved),
//! gated by role-based rules, with an append-only transition log and
//! best-effort live notifications to connected observers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ WorkflowCommand  │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐     ┌─────────────────────┐
//! │  WorkflowEngine  │────►│  Transition Table   │ (static rules)
//! └────────┬─────────┘     └─────────────────────┘
//!          │ one locked, version-checked unit of work
//!          ▼
//! ┌──────────────────┐
//! │   DrawingStore   │◄─── source of truth (drawing + transition log)
//! └────────┬─────────┘
//!          │ after commit, detached
//!     ┌────┴─────┐
//!     ▼          ▼
//! ┌────────┐ ┌─────────────┐
//! │ Audit  │ │  Fan-Out    │ ◄─── both best-effort
//! │ Sink   │ │ (pub/sub)   │
//! └────────┘ └─────────────┘
//! ```
//!
//! This crate holds the pure pieces: the domain types, the transition table,
//! the engine, and dyn-compatible traits for every external collaborator.
//! Infrastructure implementations live in sibling crates:
//!
//! - `drawflow-postgres`: [`store::DrawingStore`] over `PostgreSQL`
//! - `drawflow-redis`: [`fanout::Broadcaster`] over Redis pub/sub
//! - `drawflow-redpanda`: [`audit::AuditSink`] over a Kafka-compatible topic
//! - `drawflow-testing`: deterministic in-memory implementations
//!
//! # Example
//!
//! ```no_run
//! use drawflow_core::drawing::{Action, ActorId, DrawingId, Role};
//! use drawflow_core::engine::{WorkflowCommand, WorkflowEngine};
//!
//! # async fn example(engine: WorkflowEngine) -> Result<(), drawflow_core::engine::WorkflowError> {
//! let drawing = engine
//!     .apply(WorkflowCommand {
//!         drawing_id: DrawingId::new(42),
//!         actor_id: ActorId::new(7),
//!         actor_role: Role::Drafter,
//!         action: Action::Claim,
//!         comment: None,
//!     })
//!     .await?;
//! assert_eq!(drawing.assignee, Some(ActorId::new(7)));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod authz;
pub mod drawing;
pub mod engine;
pub mod fanout;
pub mod store;
pub mod transitions;

pub use chrono::{DateTime, Utc};

/// Environment abstractions injected into implementations.
///
/// External dependencies with ambient defaults (the system clock) are
/// abstracted behind traits so infrastructure crates stay deterministic
/// under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability.
    ///
    /// Production code uses [`SystemClock`]; tests use the `FixedClock` from
    /// `drawflow-testing` for reproducible timestamps.
    pub trait Clock: Send + Sync {
        /// Get the current time.
        fn now(&self) -> DateTime<Utc>;
    }

    /// Clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
