//! # Drawflow Testing
//!
//! Testing utilities and in-memory fakes for the Drawflow workflow engine.
//!
//! This crate provides:
//! - [`InMemoryDrawingStore`]: a store honoring the full locking and
//!   version-check contract, with switches for provoking races
//! - [`InMemoryBroadcaster`]: a loopback fan-out that records publishes
//! - [`RecordingAuditSink`] / [`FailingAuditSink`]: audit sinks for
//!   observing and breaking the asynchronous tail
//! - [`FixedClock`]: deterministic time
//! - [`TestHarness`]: a fully wired engine over the fakes
//!
//! ## Example
//!
//! ```
//! use drawflow_testing::{TestHarness, new_drawing};
//! use drawflow_core::drawing::{Action, ActorId, Role, Stage};
//! use drawflow_core::engine::WorkflowCommand;
//!
//! # async fn example() -> Result<(), drawflow_core::engine::WorkflowError> {
//! let harness = TestHarness::new();
//! let drawing = harness.create(new_drawing(1, "pump skid")).await?;
//!
//! let claimed = harness
//!     .engine
//!     .apply(WorkflowCommand {
//!         drawing_id: drawing.id,
//!         actor_id: ActorId::new(7),
//!         actor_role: Role::Drafter,
//!         action: Action::Claim,
//!         comment: None,
//!     })
//!     .await?;
//! assert_eq!(claimed.stage, Stage::Drafting);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod fanout;
pub mod fixtures;
pub mod mocks;
pub mod store;

pub use audit::{FailingAuditSink, RecordingAuditSink};
pub use fanout::InMemoryBroadcaster;
pub use fixtures::{TestHarness, command, new_drawing};
pub use mocks::{FixedClock, test_clock};
pub use store::InMemoryDrawingStore;

/// Initialize a tracing subscriber for tests, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs the
/// subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
