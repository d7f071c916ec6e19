//! Concurrency-safe drawing store abstraction.
//!
//! This module defines the persistence seam the workflow engine mutates
//! drawings through. The contract combines two mechanisms that are kept
//! *together* on purpose:
//!
//! - **Exclusive read lock**: [`DrawingStore::apply_transition`] loads the
//!   drawing under a lock that blocks other concurrent transitions on the
//!   same id for the duration of the unit of work. This is the primary
//!   correctness mechanism: two applies on one drawing never interleave
//!   their read-modify-write.
//! - **Version-conditioned write**: the commit only writes if the stored
//!   version still equals the version that was loaded, otherwise it reports
//!   [`StoreError::ConcurrencyConflict`]. This is the secondary,
//!   defense-in-depth mechanism guarding against any write path that
//!   bypasses the lock.
//!
//! Either mechanism alone would suffice for the common case. Implementations
//! must not "simplify" by dropping one of them.
//!
//! # Implementations
//!
//! - `PostgresDrawingStore` (in `drawflow-postgres`): row lock via
//!   `SELECT ... FOR UPDATE`, conditioned `UPDATE ... WHERE version = $n`
//! - `InMemoryDrawingStore` (in `drawflow-testing`): per-id async mutex plus
//!   the same version check, for fast deterministic tests
//!
//! # Dyn Compatibility
//!
//! The trait returns explicit `Pin<Box<dyn Future>>` so the engine can hold
//! an `Arc<dyn DrawingStore>`.

use crate::drawing::{
    Action, ActorId, Drawing, DrawingId, NewDrawing, ProjectId, Revision, Stage, TransitionRecord,
    Version,
};
use crate::engine::WorkflowError;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced drawing does not exist.
    #[error("drawing not found: {0}")]
    NotFound(DrawingId),

    /// The version-conditioned write matched zero rows: another write
    /// committed between load and write.
    #[error("concurrency conflict on drawing {drawing_id}: expected version {expected}")]
    ConcurrencyConflict {
        /// The drawing on which the conflict occurred.
        drawing_id: DrawingId,
        /// The version the unit of work loaded and expected to still hold.
        expected: Version,
    },

    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be decoded into its domain type.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The field deltas and audit data a validated transition commits.
///
/// Produced by the engine's pure decision step; consumed by the store, which
/// additionally bumps the concurrency version by exactly one and stamps
/// `updated_at` and the record timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionPlan {
    /// Stage after the transition (may equal the current stage).
    pub to_stage: Stage,
    /// Assignee after the transition.
    pub assignee: Option<ActorId>,
    /// Business revision after the transition.
    pub revision: Revision,
    /// The actor performing the action, recorded in the audit entry.
    pub actor_id: ActorId,
    /// The action applied.
    pub action: Action,
    /// Optional free-text comment for the audit entry.
    pub comment: Option<String>,
}

/// Result of a committed transition: the updated drawing and the audit
/// record written in the same atomic unit.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    /// The drawing as persisted after the transition.
    pub drawing: Drawing,
    /// The transition record committed alongside it.
    pub record: TransitionRecord,
}

/// Decision callback run against the drawing loaded under the lock.
///
/// Pure: it must not perform I/O. Returning an error aborts the unit of work
/// with no effect.
pub type DecideFn = Box<dyn FnOnce(&Drawing) -> Result<TransitionPlan, WorkflowError> + Send>;

/// Persistence seam for drawings and their transition log.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares them across
/// request tasks.
pub trait DrawingStore: Send + Sync {
    /// Run one serialized unit of work against a drawing.
    ///
    /// Loads the drawing under an exclusive per-id lock, runs `decide`
    /// against it, and commits the resulting [`TransitionPlan`] together
    /// with exactly one new [`TransitionRecord`] atomically. The commit is
    /// conditioned on the loaded version still being current.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] if the drawing does not exist
    /// - any error returned by `decide`, unchanged
    /// - [`WorkflowError::ConcurrentModification`] if the version check
    ///   fails at write time
    /// - [`WorkflowError::Storage`] for database failures
    ///
    /// On any error the unit of work rolls back entirely; no partial field
    /// updates and no transition record are observable.
    fn apply_transition(
        &self,
        id: DrawingId,
        decide: DecideFn,
    ) -> Pin<Box<dyn Future<Output = Result<TransitionOutcome, WorkflowError>> + Send + '_>>;

    /// Create a drawing in its initial workflow state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on persistence failure.
    fn create(
        &self,
        new: NewDrawing,
    ) -> Pin<Box<dyn Future<Output = Result<Drawing, StoreError>> + Send + '_>>;

    /// Load a drawing by id, without locking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    fn get(
        &self,
        id: DrawingId,
    ) -> Pin<Box<dyn Future<Output = Result<Drawing, StoreError>> + Send + '_>>;

    /// List the drawings belonging to a project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn list_by_project(
        &self,
        project_id: ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Drawing>, StoreError>> + Send + '_>>;

    /// Load a drawing's transition records, ordered by creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn transition_log(
        &self,
        drawing_id: DrawingId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TransitionRecord>, StoreError>> + Send + '_>>;
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::ConcurrencyConflict { .. } => Self::ConcurrentModification,
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Storage(msg),
        }
    }
}
