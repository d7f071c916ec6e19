//! The workflow transition engine.
//!
//! [`WorkflowEngine::apply`] is the sole mutation entry point for drawings.
//! It validates an action against the transition table and ownership rules,
//! persists the resulting field deltas together with exactly one
//! [`TransitionRecord`] in one atomic unit of work, and then triggers the
//! audit sink and event fan-out from a detached task that the request path
//! never awaits.
//!
//! # Decision vs. persistence
//!
//! The validation and delta computation live in the pure [`decide`]
//! function. The engine passes it into [`DrawingStore::apply_transition`],
//! which runs it against the drawing loaded under the store's exclusive
//! lock. This keeps every business rule unit-testable without a store while
//! still evaluating the rules against the locked, current row.
//!
//! # Failure isolation
//!
//! All failures up to and including the commit abort the unit of work with
//! no partial effect and are returned as a typed [`WorkflowError`]. Failures
//! in the asynchronous tail (audit, fan-out) are logged via `tracing` and
//! can never unwind or affect the already-committed transition.
//!
//! [`TransitionRecord`]: crate::drawing::TransitionRecord

use crate::audit::AuditSink;
use crate::drawing::{Action, ActorId, Drawing, DrawingId, Role, Stage};
use crate::fanout::{Broadcaster, EventEnvelope};
use crate::store::{DrawingStore, TransitionOutcome, TransitionPlan};
use crate::transitions::{self, TransitionError};
use std::sync::Arc;
use thiserror::Error;

/// Failure modes of a workflow action.
///
/// Everything here is surfaced to the caller; only
/// [`ConcurrentModification`](Self::ConcurrentModification) is worth
/// retrying, and the engine itself never auto-retries.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The referenced drawing does not exist.
    #[error("drawing not found")]
    NotFound,

    /// The action is not defined from the current stage under any role.
    #[error("invalid state transition: {action} from {stage}")]
    InvalidTransition {
        /// The drawing's current stage.
        stage: Stage,
        /// The requested action.
        action: Action,
    },

    /// The action exists from this stage, but the actor's role cannot
    /// perform it.
    #[error("role {role} not authorized for {action} from {stage}")]
    UnauthorizedRole {
        /// The drawing's current stage.
        stage: Stage,
        /// The requested action.
        action: Action,
        /// The actor's role.
        role: Role,
    },

    /// A non-admin actor who is not the current assignee attempted a
    /// non-Claim action.
    #[error("drawing not assigned to actor")]
    NotAssigned,

    /// Claim attempted on a drawing that already has an assignee.
    #[error("drawing already claimed")]
    AlreadyClaimed,

    /// Another transition committed between load and write. Retryable.
    #[error("concurrent update detected")]
    ConcurrentModification,

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// One requested workflow action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowCommand {
    /// The drawing to act on.
    pub drawing_id: DrawingId,
    /// The acting user.
    pub actor_id: ActorId,
    /// The acting user's role.
    pub actor_role: Role,
    /// The action to apply.
    pub action: Action,
    /// Optional free-text comment recorded in the transition log.
    pub comment: Option<String>,
}

/// Validate a command against a drawing and compute the transition deltas.
///
/// Pure; runs under the store's exclusive lock via
/// [`DrawingStore::apply_transition`]. Checks run in this order:
///
/// 1. Ownership: for every action except Claim, a non-admin actor must be
///    the current assignee.
/// 2. Transition table lookup, preserving its two-tier error distinction.
/// 3. Claim on an already-claimed drawing fails for every role, admin
///    included.
///
/// Deltas follow the action: Claim sets the assignee; Submit and Reject
/// clear it and advance the business revision; Release only clears it. The
/// concurrency version bump is applied by the store on commit.
///
/// # Errors
///
/// [`WorkflowError::NotAssigned`], [`WorkflowError::InvalidTransition`],
/// [`WorkflowError::UnauthorizedRole`] or [`WorkflowError::AlreadyClaimed`]
/// per the rules above.
pub fn decide(drawing: &Drawing, cmd: &WorkflowCommand) -> Result<TransitionPlan, WorkflowError> {
    if cmd.action != Action::Claim
        && cmd.actor_role != Role::Admin
        && drawing.assignee != Some(cmd.actor_id)
    {
        return Err(WorkflowError::NotAssigned);
    }

    let to_stage = transitions::next_stage(drawing.stage, cmd.action, cmd.actor_role).map_err(
        |err| match err {
            TransitionError::InvalidTransition => WorkflowError::InvalidTransition {
                stage: drawing.stage,
                action: cmd.action,
            },
            TransitionError::UnauthorizedRole => WorkflowError::UnauthorizedRole {
                stage: drawing.stage,
                action: cmd.action,
                role: cmd.actor_role,
            },
        },
    )?;

    let (assignee, revision) = match cmd.action {
        Action::Claim => {
            if drawing.assignee.is_some() {
                return Err(WorkflowError::AlreadyClaimed);
            }
            (Some(cmd.actor_id), drawing.revision)
        }
        Action::Submit | Action::Reject => (None, drawing.revision.next()),
        Action::Release => (None, drawing.revision),
    };

    Ok(TransitionPlan {
        to_stage,
        assignee,
        revision,
        actor_id: cmd.actor_id,
        action: cmd.action,
        comment: cmd.comment.clone(),
    })
}

/// Applies workflow actions to drawings.
///
/// Holds its collaborators behind trait objects so the same engine runs
/// against Postgres/Redis/Redpanda in production and the in-memory
/// implementations in tests.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn DrawingStore>,
    audit: Arc<dyn AuditSink>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl WorkflowEngine {
    /// Create an engine over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn DrawingStore>,
        audit: Arc<dyn AuditSink>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            store,
            audit,
            broadcaster,
        }
    }

    /// Apply one workflow action and return the updated drawing.
    ///
    /// Suspends only while awaiting the store's lock acquisition and the
    /// atomic commit. The audit emission and fan-out publish run on a
    /// detached task after commit; their completion is never awaited and
    /// their failures never surface here.
    ///
    /// # Errors
    ///
    /// Any [`WorkflowError`] from validation, plus
    /// [`WorkflowError::ConcurrentModification`] or
    /// [`WorkflowError::Storage`] from the commit. On error nothing was
    /// persisted.
    pub async fn apply(&self, cmd: WorkflowCommand) -> Result<Drawing, WorkflowError> {
        let drawing_id = cmd.drawing_id;
        let action = cmd.action;
        let decide_fn = Box::new(move |drawing: &Drawing| decide(drawing, &cmd));

        let TransitionOutcome { drawing, record } =
            self.store.apply_transition(drawing_id, decide_fn).await?;

        tracing::debug!(
            drawing_id = %drawing.id,
            action = %action,
            from_stage = %record.from_stage,
            to_stage = %record.to_stage,
            version = %drawing.version,
            "Workflow transition committed"
        );

        let audit = Arc::clone(&self.audit);
        let broadcaster = Arc::clone(&self.broadcaster);
        let published = drawing.clone();
        tokio::spawn(async move {
            if let Err(error) = audit.emit(&record).await {
                tracing::error!(
                    drawing_id = %record.drawing_id,
                    error = %error,
                    "Failed to emit audit record"
                );
            }

            match EventEnvelope::for_drawing_action(action, &published) {
                Ok(envelope) => {
                    if let Err(error) = broadcaster.publish(published.project_id, &envelope).await {
                        tracing::error!(
                            project_id = %published.project_id,
                            error = %error,
                            "Failed to publish drawing event"
                        );
                    }
                }
                Err(error) => {
                    tracing::error!(
                        drawing_id = %published.id,
                        error = %error,
                        "Failed to encode drawing event"
                    );
                }
            }
        });

        Ok(drawing)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)] // Test code panics for clear failure messages
mod tests {
    use super::*;
    use crate::drawing::{ProjectId, Revision, Version};
    use chrono::Utc;

    fn drawing(stage: Stage, assignee: Option<ActorId>) -> Drawing {
        Drawing {
            id: DrawingId::new(1),
            project_id: ProjectId::new(1),
            title: "valve assembly".to_string(),
            description: String::new(),
            author_id: ActorId::new(99),
            stage,
            assignee,
            revision: Revision::FIRST,
            version: Version::INITIAL,
            drawing_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn cmd(actor: i64, role: Role, action: Action) -> WorkflowCommand {
        WorkflowCommand {
            drawing_id: DrawingId::new(1),
            actor_id: ActorId::new(actor),
            actor_role: role,
            action,
            comment: None,
        }
    }

    #[test]
    fn claim_sets_assignee_without_touching_revision() {
        let d = drawing(Stage::Unassigned, None);
        let plan = decide(&d, &cmd(7, Role::Drafter, Action::Claim));
        let plan = plan.expect("claim from unassigned is legal");
        assert_eq!(plan.to_stage, Stage::Drafting);
        assert_eq!(plan.assignee, Some(ActorId::new(7)));
        assert_eq!(plan.revision, Revision::FIRST);
    }

    #[test]
    fn submit_clears_assignee_and_bumps_revision() {
        let d = drawing(Stage::Drafting, Some(ActorId::new(7)));
        let plan = decide(&d, &cmd(7, Role::Drafter, Action::Submit));
        let plan = plan.expect("assignee submit is legal");
        assert_eq!(plan.to_stage, Stage::FirstQc);
        assert_eq!(plan.assignee, None);
        assert_eq!(plan.revision, Revision::new(2));
    }

    #[test]
    fn release_only_clears_assignee() {
        let d = drawing(Stage::Drafting, Some(ActorId::new(7)));
        let plan = decide(&d, &cmd(7, Role::Drafter, Action::Release));
        let plan = plan.expect("assignee release is legal");
        assert_eq!(plan.to_stage, Stage::Drafting);
        assert_eq!(plan.assignee, None);
        assert_eq!(plan.revision, Revision::FIRST);
    }

    #[test]
    fn reject_returns_to_drafting_and_bumps_revision() {
        let d = drawing(Stage::FirstQc, Some(ActorId::new(3)));
        let plan = decide(&d, &cmd(3, Role::ShiftLead, Action::Reject));
        let plan = plan.expect("assignee reject is legal");
        assert_eq!(plan.to_stage, Stage::Drafting);
        assert_eq!(plan.revision, Revision::new(2));
    }

    #[test]
    fn non_assignee_cannot_submit() {
        let d = drawing(Stage::Drafting, Some(ActorId::new(7)));
        let err = decide(&d, &cmd(8, Role::Drafter, Action::Submit));
        assert!(matches!(err, Err(WorkflowError::NotAssigned)));
    }

    #[test]
    fn unassigned_drawing_rejects_non_claim_actions_from_non_admins() {
        let d = drawing(Stage::Drafting, None);
        let err = decide(&d, &cmd(8, Role::Drafter, Action::Release));
        assert!(matches!(err, Err(WorkflowError::NotAssigned)));
    }

    #[test]
    fn admin_bypasses_ownership_but_not_the_table() {
        let d = drawing(Stage::FinalQc, None);
        // Admin force-release without being assignee: legal self-loop.
        let plan = decide(&d, &cmd(1, Role::Admin, Action::Release));
        let plan = plan.expect("admin release is legal");
        assert_eq!(plan.to_stage, Stage::FinalQc);

        // But an undefined pair still fails even for admin.
        let approved = drawing(Stage::Approved, None);
        let err = decide(&approved, &cmd(1, Role::Admin, Action::Release));
        assert!(matches!(
            err,
            Err(WorkflowError::InvalidTransition {
                stage: Stage::Approved,
                action: Action::Release,
            })
        ));
    }

    #[test]
    fn claim_on_claimed_drawing_fails_for_every_role() {
        let d = drawing(Stage::Unassigned, Some(ActorId::new(7)));
        for role in [Role::Admin, Role::Drafter] {
            let err = decide(&d, &cmd(1, role, Action::Claim));
            assert!(
                matches!(err, Err(WorkflowError::AlreadyClaimed)),
                "claim must fail for {role}"
            );
        }
    }

    #[test]
    fn table_errors_carry_context() {
        let d = drawing(Stage::FirstQc, Some(ActorId::new(7)));
        let err = decide(&d, &cmd(7, Role::Drafter, Action::Submit));
        match err {
            Err(WorkflowError::UnauthorizedRole {
                stage,
                action,
                role,
            }) => {
                assert_eq!(stage, Stage::FirstQc);
                assert_eq!(action, Action::Submit);
                assert_eq!(role, Role::Drafter);
            }
            other => panic!("expected UnauthorizedRole, got {other:?}"),
        }
    }

    #[test]
    fn comment_flows_into_the_plan() {
        let d = drawing(Stage::FirstQc, Some(ActorId::new(3)));
        let mut command = cmd(3, Role::ShiftLead, Action::Reject);
        command.comment = Some("dimension chain missing".to_string());
        let plan = decide(&d, &command);
        let plan = plan.expect("assignee reject is legal");
        assert_eq!(plan.comment.as_deref(), Some("dimension chain missing"));
    }
}
