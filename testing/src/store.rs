//! In-memory drawing store honoring the full concurrency contract.

use drawflow_core::drawing::{
    Drawing, DrawingId, NewDrawing, ProjectId, Revision, Stage, TransitionRecord, Version,
};
use drawflow_core::engine::WorkflowError;
use drawflow_core::environment::{Clock, SystemClock};
use drawflow_core::store::{DecideFn, DrawingStore, StoreError, TransitionOutcome};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

struct State {
    drawings: HashMap<DrawingId, Drawing>,
    log: Vec<TransitionRecord>,
    next_drawing_id: i64,
    next_record_id: i64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            drawings: HashMap::new(),
            log: Vec::new(),
            next_drawing_id: 1,
            next_record_id: 1,
        }
    }
}

/// A [`DrawingStore`] backed by process memory.
///
/// Implements the same two-mechanism contract as the Postgres store: an
/// exclusive per-id async lock around each unit of work, plus a version
/// check at commit time. Two switches exist purely for tests that need to
/// provoke the failure paths:
///
/// - [`without_locking`](Self::without_locking) disables the per-id lock so
///   two units of work on the same drawing can interleave and race the
///   version check
/// - [`bump_version`](Self::bump_version) mutates the stored version
///   directly, simulating a writer that bypasses the lock
pub struct InMemoryDrawingStore {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<DrawingId, Arc<AsyncMutex<()>>>>,
    locking: bool,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryDrawingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDrawingStore {
    /// Create an empty store with per-id locking enabled and the system
    /// clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store using the given clock for timestamps.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            row_locks: Mutex::new(HashMap::new()),
            locking: true,
            clock,
        }
    }

    /// Disable the per-id lock, leaving only the version check.
    ///
    /// Units of work on the same drawing then interleave at the yield point
    /// between load and commit, so a concurrent commit trips
    /// `ConcurrentModification` deterministically.
    #[must_use]
    pub fn without_locking(mut self) -> Self {
        self.locking = false;
        self
    }

    /// Insert a drawing as-is, for tests starting from a mid-workflow state.
    pub fn seed(&self, drawing: Drawing) {
        let mut state = self.state();
        state.next_drawing_id = state.next_drawing_id.max(drawing.id.value() + 1);
        state.drawings.insert(drawing.id, drawing);
    }

    /// Increment a drawing's stored version directly, bypassing the per-id
    /// lock. Simulates a rogue write path for version-check tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the drawing does not exist.
    pub fn bump_version(&self, id: DrawingId) -> Result<Version, StoreError> {
        let mut state = self.state();
        let drawing = state
            .drawings
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        drawing.version = drawing.version.next();
        Ok(drawing.version)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another task panicked mid-access; the
        // map itself is still structurally sound.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, id: DrawingId) -> Arc<AsyncMutex<()>> {
        self.row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }
}

impl DrawingStore for InMemoryDrawingStore {
    fn apply_transition(
        &self,
        id: DrawingId,
        decide: DecideFn,
    ) -> Pin<Box<dyn Future<Output = Result<TransitionOutcome, WorkflowError>> + Send + '_>> {
        Box::pin(async move {
            let row_lock = self.locking.then(|| self.row_lock(id));
            let _guard = match &row_lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };

            let current = self
                .state()
                .drawings
                .get(&id)
                .cloned()
                .ok_or(WorkflowError::NotFound)?;

            let plan = decide(&current)?;

            // Interleaving point: with locking disabled, a concurrent unit
            // of work can commit here and invalidate the loaded version.
            tokio::task::yield_now().await;

            let now = self.clock.now();
            let mut state = self.state();
            let stored = state
                .drawings
                .get_mut(&id)
                .ok_or(WorkflowError::NotFound)?;
            if stored.version != current.version {
                return Err(StoreError::ConcurrencyConflict {
                    drawing_id: id,
                    expected: current.version,
                }
                .into());
            }

            let from_stage = stored.stage;
            stored.stage = plan.to_stage;
            stored.assignee = plan.assignee;
            stored.revision = plan.revision;
            stored.version = stored.version.next();
            stored.updated_at = now;
            let drawing = stored.clone();

            let record = TransitionRecord {
                id: state.next_record_id,
                drawing_id: id,
                actor_id: plan.actor_id,
                action: plan.action,
                from_stage,
                to_stage: plan.to_stage,
                comment: plan.comment,
                timestamp: now,
            };
            state.next_record_id += 1;
            state.log.push(record.clone());

            Ok(TransitionOutcome { drawing, record })
        })
    }

    fn create(
        &self,
        new: NewDrawing,
    ) -> Pin<Box<dyn Future<Output = Result<Drawing, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut state = self.state();
            if state
                .drawings
                .values()
                .any(|d| d.project_id == new.project_id && d.title == new.title)
            {
                return Err(StoreError::Database(format!(
                    "duplicate title '{}' in project {}",
                    new.title, new.project_id
                )));
            }

            let id = DrawingId::new(state.next_drawing_id);
            state.next_drawing_id += 1;
            let drawing = Drawing {
                id,
                project_id: new.project_id,
                title: new.title,
                description: new.description,
                author_id: new.author_id,
                stage: Stage::Unassigned,
                assignee: None,
                revision: Revision::FIRST,
                version: Version::INITIAL,
                drawing_url: new.drawing_url,
                created_at: now,
                updated_at: now,
            };
            state.drawings.insert(id, drawing.clone());
            Ok(drawing)
        })
    }

    fn get(
        &self,
        id: DrawingId,
    ) -> Pin<Box<dyn Future<Output = Result<Drawing, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.state()
                .drawings
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id))
        })
    }

    fn list_by_project(
        &self,
        project_id: ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Drawing>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut drawings: Vec<Drawing> = self
                .state()
                .drawings
                .values()
                .filter(|d| d.project_id == project_id)
                .cloned()
                .collect();
            drawings.sort_by_key(|d| d.id.value());
            Ok(drawings)
        })
    }

    fn transition_log(
        &self,
        drawing_id: DrawingId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TransitionRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            Ok(self
                .state()
                .log
                .iter()
                .filter(|r| r.drawing_id == drawing_id)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use drawflow_core::drawing::{Action, ActorId};
    use drawflow_core::store::TransitionPlan;

    fn new_drawing(title: &str) -> NewDrawing {
        NewDrawing {
            project_id: ProjectId::new(1),
            title: title.to_string(),
            description: String::new(),
            author_id: ActorId::new(1),
            drawing_url: String::new(),
        }
    }

    fn claim_plan(actor: i64) -> TransitionPlan {
        TransitionPlan {
            to_stage: Stage::Drafting,
            assignee: Some(ActorId::new(actor)),
            revision: Revision::FIRST,
            actor_id: ActorId::new(actor),
            action: Action::Claim,
            comment: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_initial_state() {
        let store = InMemoryDrawingStore::new();
        let a = store.create(new_drawing("a")).await.expect("create a");
        let b = store.create(new_drawing("b")).await.expect("create b");
        assert_eq!(a.id, DrawingId::new(1));
        assert_eq!(b.id, DrawingId::new(2));
        assert_eq!(a.stage, Stage::Unassigned);
        assert_eq!(a.version, Version::INITIAL);
    }

    #[tokio::test]
    async fn duplicate_title_in_project_is_rejected() {
        let store = InMemoryDrawingStore::new();
        store.create(new_drawing("a")).await.expect("create");
        let err = store.create(new_drawing("a")).await;
        assert!(matches!(err, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn commit_bumps_version_and_appends_one_record() {
        let store = InMemoryDrawingStore::new();
        let d = store.create(new_drawing("a")).await.expect("create");

        let outcome = store
            .apply_transition(d.id, Box::new(|_| Ok(claim_plan(7))))
            .await
            .expect("claim should commit");
        assert_eq!(outcome.drawing.version, Version::new(1));
        assert_eq!(outcome.record.from_stage, Stage::Unassigned);
        assert_eq!(outcome.record.to_stage, Stage::Drafting);
        assert_eq!(outcome.drawing.updated_at, outcome.record.timestamp);

        let log = store.transition_log(d.id).await.expect("log");
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn bumped_version_trips_the_check() {
        let store = Arc::new(InMemoryDrawingStore::new());
        let d = store.create(new_drawing("a")).await.expect("create");

        // The decision step runs between load and commit; a bump from inside
        // it simulates a writer that bypassed the per-id lock.
        let id = d.id;
        let bumper = Arc::clone(&store);
        let err = store
            .apply_transition(
                d.id,
                Box::new(move |loaded| {
                    assert_eq!(loaded.version, Version::INITIAL);
                    bumper.bump_version(id).expect("bump");
                    Ok(claim_plan(7))
                }),
            )
            .await;
        assert!(matches!(err, Err(WorkflowError::ConcurrentModification)));

        // Nothing was committed by the failed unit of work.
        let log = store.transition_log(d.id).await.expect("log");
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn decide_error_aborts_with_no_effect() {
        let store = InMemoryDrawingStore::new();
        let d = store.create(new_drawing("a")).await.expect("create");

        let err = store
            .apply_transition(d.id, Box::new(|_| Err(WorkflowError::AlreadyClaimed)))
            .await;
        assert!(matches!(err, Err(WorkflowError::AlreadyClaimed)));

        let unchanged = store.get(d.id).await.expect("get");
        assert_eq!(unchanged.version, Version::INITIAL);
    }
}
