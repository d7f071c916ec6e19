//! Prewired engine harness and test data builders.

use crate::audit::RecordingAuditSink;
use crate::fanout::InMemoryBroadcaster;
use crate::store::InMemoryDrawingStore;
use drawflow_core::audit::AuditSink;
use drawflow_core::drawing::{Action, ActorId, Drawing, DrawingId, NewDrawing, ProjectId, Role};
use drawflow_core::engine::{WorkflowCommand, WorkflowEngine, WorkflowError};
use drawflow_core::store::DrawingStore;
use std::sync::Arc;

/// A minimal new-drawing request for tests.
#[must_use]
pub fn new_drawing(project: i64, title: &str) -> NewDrawing {
    NewDrawing {
        project_id: ProjectId::new(project),
        title: title.to_string(),
        description: String::new(),
        author_id: ActorId::new(1),
        drawing_url: String::new(),
    }
}

/// A workflow command without a comment.
#[must_use]
pub fn command(drawing_id: DrawingId, actor: i64, role: Role, action: Action) -> WorkflowCommand {
    WorkflowCommand {
        drawing_id,
        actor_id: ActorId::new(actor),
        actor_role: role,
        action,
        comment: None,
    }
}

/// A [`WorkflowEngine`] wired over the in-memory fakes, with the concrete
/// fakes kept accessible for assertions.
pub struct TestHarness {
    /// The engine under test.
    pub engine: WorkflowEngine,
    /// The store behind the engine.
    pub store: Arc<InMemoryDrawingStore>,
    /// The audit sink behind the engine.
    pub audit: Arc<RecordingAuditSink>,
    /// The broadcaster behind the engine.
    pub broadcaster: Arc<InMemoryBroadcaster>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Create a harness with locking enabled and a recording audit sink.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryDrawingStore::new()))
    }

    /// Create a harness over a preconfigured store.
    #[must_use]
    pub fn with_store(store: Arc<InMemoryDrawingStore>) -> Self {
        let audit = Arc::new(RecordingAuditSink::new());
        let broadcaster = Arc::new(InMemoryBroadcaster::new());
        let engine = WorkflowEngine::new(
            Arc::clone(&store) as Arc<dyn DrawingStore>,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::clone(&broadcaster) as _,
        );
        Self {
            engine,
            store,
            audit,
            broadcaster,
        }
    }

    /// Create a drawing through the store.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Storage`] on store failure.
    pub async fn create(&self, new: NewDrawing) -> Result<Drawing, WorkflowError> {
        Ok(self.store.create(new).await?)
    }

    /// Apply one action without a comment.
    ///
    /// # Errors
    ///
    /// Any [`WorkflowError`] from the engine, unchanged.
    pub async fn apply(
        &self,
        drawing_id: DrawingId,
        actor: i64,
        role: Role,
        action: Action,
    ) -> Result<Drawing, WorkflowError> {
        self.engine
            .apply(command(drawing_id, actor, role, action))
            .await
    }
}
