//! The static workflow transition table.
//!
//! Transitions are an ordered list of `(from, action, to, role)` rules. The
//! lookup deliberately runs in two tiers so callers can distinguish a
//! nonsensical request from a forbidden one:
//!
//! 1. Scan *all* rules matching `(from, action)` regardless of role. If none
//!    exist, the action is undefined from this stage for everyone:
//!    [`TransitionError::InvalidTransition`].
//! 2. If at least one rule matched `(from, action)` but none also matched the
//!    caller's role, the action exists but this role cannot perform it:
//!    [`TransitionError::UnauthorizedRole`].
//!
//! A single-pass scan that reports "unauthorized" on the first row with a
//! mismatched role gets tier 2 wrong; the full `(from, action)` scan must
//! complete before deciding which error applies.
//!
//! Several rules map a stage to itself. These self-loops are real
//! transitions: claiming a drawing mid-stage, releasing it, and the admin
//! force-release all bump the concurrency version and produce a transition
//! record with `from == to`. They are never collapsed into no-ops.

use crate::drawing::{Action, Role, Stage};
use thiserror::Error;

/// Failure modes of a transition-table lookup.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The action is not defined from this stage under any role.
    #[error("invalid state transition")]
    InvalidTransition,
    /// The action exists from this stage, but not for this role.
    #[error("role not authorized for this action")]
    UnauthorizedRole,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rule {
    from: Stage,
    action: Action,
    to: Stage,
    role: Role,
}

const fn rule(from: Stage, action: Action, to: Stage, role: Role) -> Rule {
    Rule {
        from,
        action,
        to,
        role,
    }
}

/// The workflow rules, organized in four bands: the admin override band
/// first, then one forward-progress band per working role.
const RULES: [Rule; 20] = [
    // Admin flow
    rule(Stage::Unassigned, Action::Claim, Stage::Unassigned, Role::Admin),
    rule(Stage::Unassigned, Action::Submit, Stage::Drafting, Role::Admin),
    rule(Stage::Unassigned, Action::Release, Stage::Unassigned, Role::Admin),
    rule(Stage::Drafting, Action::Release, Stage::Drafting, Role::Admin),
    rule(Stage::FirstQc, Action::Release, Stage::FirstQc, Role::Admin),
    rule(Stage::FinalQc, Action::Release, Stage::FinalQc, Role::Admin),
    rule(Stage::FirstQc, Action::Reject, Stage::Drafting, Role::Admin),
    rule(Stage::FinalQc, Action::Reject, Stage::Drafting, Role::Admin),
    // Drafting flow
    rule(Stage::Unassigned, Action::Claim, Stage::Drafting, Role::Drafter),
    rule(Stage::Drafting, Action::Claim, Stage::Drafting, Role::Drafter),
    rule(Stage::Drafting, Action::Submit, Stage::FirstQc, Role::Drafter),
    rule(Stage::Drafting, Action::Release, Stage::Drafting, Role::Drafter),
    // First QC flow
    rule(Stage::FirstQc, Action::Claim, Stage::FirstQc, Role::ShiftLead),
    rule(Stage::FirstQc, Action::Submit, Stage::FinalQc, Role::ShiftLead),
    rule(Stage::FirstQc, Action::Release, Stage::FirstQc, Role::ShiftLead),
    rule(Stage::FirstQc, Action::Reject, Stage::Drafting, Role::ShiftLead),
    // Final QC flow
    rule(Stage::FinalQc, Action::Claim, Stage::FinalQc, Role::FinalQc),
    rule(Stage::FinalQc, Action::Submit, Stage::Approved, Role::FinalQc),
    rule(Stage::FinalQc, Action::Release, Stage::FinalQc, Role::FinalQc),
    rule(Stage::FinalQc, Action::Reject, Stage::Drafting, Role::FinalQc),
];

/// Look up the stage an action leads to from the current stage under a role.
///
/// # Errors
///
/// - [`TransitionError::InvalidTransition`] if no rule matches
///   `(from, action)` at all.
/// - [`TransitionError::UnauthorizedRole`] if rules match `(from, action)`
///   but none of them permits `role`.
///
/// # Examples
///
/// ```
/// use drawflow_core::drawing::{Action, Role, Stage};
/// use drawflow_core::transitions::{next_stage, TransitionError};
///
/// assert_eq!(
///     next_stage(Stage::Drafting, Action::Submit, Role::Drafter),
///     Ok(Stage::FirstQc)
/// );
/// assert_eq!(
///     next_stage(Stage::Drafting, Action::Submit, Role::ShiftLead),
///     Err(TransitionError::UnauthorizedRole)
/// );
/// assert_eq!(
///     next_stage(Stage::Approved, Action::Submit, Role::Admin),
///     Err(TransitionError::InvalidTransition)
/// );
/// ```
pub fn next_stage(from: Stage, action: Action, role: Role) -> Result<Stage, TransitionError> {
    let mut action_defined = false;
    for rule in &RULES {
        if rule.from == from && rule.action == action {
            action_defined = true;
            if rule.role == role {
                return Ok(rule.to);
            }
        }
    }
    if action_defined {
        Err(TransitionError::UnauthorizedRole)
    } else {
        Err(TransitionError::InvalidTransition)
    }
}

/// Whether any rule defines `action` from `from`, for any role.
///
/// Useful for exhaustive checks over the `(stage, action)` grid.
#[must_use]
pub fn action_defined(from: Stage, action: Action) -> bool {
    RULES
        .iter()
        .any(|rule| rule.from == from && rule.action == action)
}
