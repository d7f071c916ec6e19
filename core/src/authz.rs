//! Permission oracle seam.
//!
//! Coarse resource/action permissions (who may *view* drawings, who may
//! *create* them) are decided by an external policy engine behind the HTTP
//! layer. The workflow core never duplicates that logic; it only defines the
//! [`Authorizer`] capability so callers can inject whatever oracle they run,
//! instead of reaching for a process-wide policy singleton.
//!
//! Note that stage-transition legality is *not* an [`Authorizer`] question:
//! the transition table binds roles to transitions directly and the engine
//! consults it, not this trait.
//!
//! [`PolicyTable`] is a small static implementation carrying the default
//! policy rows the original system bootstraps, useful as a development
//! default and in tests.

use crate::drawing::Role;

/// Opaque permission oracle: may `role` perform `action` on `resource`?
pub trait Authorizer: Send + Sync {
    /// Returns `true` if the role may perform the action on the resource.
    fn authorize(&self, role: Role, resource: &str, action: &str) -> bool;
}

/// One policy row; `"*"` as the action matches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Policy {
    role: Role,
    resource: &'static str,
    action: &'static str,
}

const fn policy(role: Role, resource: &'static str, action: &'static str) -> Policy {
    Policy {
        role,
        resource,
        action,
    }
}

/// Static policy table with the default bootstrap rows.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable;

const POLICIES: [Policy; 15] = [
    // Admin can do everything on drawings.
    policy(Role::Admin, "drawings", "*"),
    // Drafter
    policy(Role::Drafter, "drawings", "view"),
    policy(Role::Drafter, "drawings", "claim"),
    policy(Role::Drafter, "drawings", "submit"),
    policy(Role::Drafter, "drawings", "release"),
    // Shift lead
    policy(Role::ShiftLead, "drawings", "view"),
    policy(Role::ShiftLead, "drawings", "claim"),
    policy(Role::ShiftLead, "drawings", "submit"),
    policy(Role::ShiftLead, "drawings", "release"),
    policy(Role::ShiftLead, "drawings", "reject"),
    // Final QC
    policy(Role::FinalQc, "drawings", "view"),
    policy(Role::FinalQc, "drawings", "claim"),
    policy(Role::FinalQc, "drawings", "submit"),
    policy(Role::FinalQc, "drawings", "release"),
    policy(Role::FinalQc, "drawings", "reject"),
];

impl Authorizer for PolicyTable {
    fn authorize(&self, role: Role, resource: &str, action: &str) -> bool {
        POLICIES.iter().any(|p| {
            p.role == role && p.resource == resource && (p.action == "*" || p.action == action)
        })
    }
}
