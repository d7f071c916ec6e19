//! Domain types for drawings moving through the QC workflow.
//!
//! This module defines strong types for identifying drawings, projects and
//! actors, the workflow enums ([`Stage`], [`Role`], [`Action`]) and the two
//! persistent records of the system: the [`Drawing`] itself and the immutable
//! [`TransitionRecord`] audit entry.
//!
//! # Design
//!
//! All identifiers are newtype wrappers so a drawing id can never be passed
//! where an actor id is expected. The two counters are deliberately distinct
//! types:
//!
//! - [`Version`] is the technical optimistic-concurrency token. It increments
//!   on *every* successful transition and is never business data.
//! - [`Revision`] is the business-visible content revision. It increments only
//!   when content materially advances or is sent back (Submit or Reject).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing a workflow enum from its wire string fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enum failed to parse ("stage", "role" or "action").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(i64);

        impl $name {
            /// Create a new id from a raw value.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the raw id value.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type! {
    /// Unique identifier of a drawing.
    DrawingId
}

id_type! {
    /// Unique identifier of the project owning a drawing.
    ///
    /// A drawing belongs to exactly one project for its whole lifetime and
    /// never migrates. Fan-out channels are keyed by this id.
    ProjectId
}

id_type! {
    /// Unique identifier of an actor (user) driving the workflow.
    ActorId
}

/// Optimistic-concurrency token for a drawing.
///
/// Versions start at 0 on creation and increment by exactly 1 on every
/// successful transition, including self-loop transitions that leave the
/// stage unchanged. The version is used purely to detect concurrent
/// modifications at write time; it is never exposed as business data.
///
/// # Examples
///
/// ```
/// use drawflow_core::drawing::Version;
///
/// let v0 = Version::INITIAL;
/// assert_eq!(v0.next(), Version::new(1));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of a freshly created drawing.
    pub const INITIAL: Self = Self(0);

    /// Create a version with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next version (current + 1).
    ///
    /// Reaching `u64::MAX` transitions on one drawing is not a realistic
    /// concern, so plain addition is used.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Business-visible content revision of a drawing.
///
/// Starts at 1 and increments only on Submit or Reject. Claim and Release
/// never change it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(u32);

impl Revision {
    /// The revision of a freshly created drawing.
    pub const FIRST: Self = Self(1);

    /// Create a revision with the given value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the revision number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// The next revision (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The five ordered workflow stages a drawing passes through.
///
/// Wire form is the lowercase snake_case string (`"first_qc"` etc.), both in
/// JSON payloads and in the database.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Created, not yet picked up by anyone.
    Unassigned,
    /// Being drafted.
    Drafting,
    /// First quality-control review.
    FirstQc,
    /// Final quality-control review.
    FinalQc,
    /// Approved; terminal stage.
    Approved,
}

impl Stage {
    /// All stages, in workflow order.
    pub const ALL: [Self; 5] = [
        Self::Unassigned,
        Self::Drafting,
        Self::FirstQc,
        Self::FinalQc,
        Self::Approved,
    ];

    /// The stable wire string for this stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Drafting => "drafting",
            Self::FirstQc => "first_qc",
            Self::FinalQc => "final_qc",
            Self::Approved => "approved",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unassigned" => Ok(Self::Unassigned),
            "drafting" => Ok(Self::Drafting),
            "first_qc" => Ok(Self::FirstQc),
            "final_qc" => Ok(Self::FinalQc),
            "approved" => Ok(Self::Approved),
            other => Err(ParseEnumError {
                kind: "stage",
                value: other.to_string(),
            }),
        }
    }
}

/// Actor roles recognized by the workflow.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Elevated role; may force administrative transitions from any stage.
    Admin,
    /// Produces drawing content.
    Drafter,
    /// Performs the first QC review.
    ShiftLead,
    /// Performs the final QC review.
    FinalQc,
}

impl Role {
    /// All roles.
    pub const ALL: [Self; 4] = [Self::Admin, Self::Drafter, Self::ShiftLead, Self::FinalQc];

    /// The stable wire string for this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Drafter => "drafter",
            Self::ShiftLead => "shift_lead",
            Self::FinalQc => "final_qc",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "drafter" => Ok(Self::Drafter),
            "shift_lead" => Ok(Self::ShiftLead),
            "final_qc" => Ok(Self::FinalQc),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Actor-initiated workflow operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Take exclusive working rights over a drawing.
    Claim,
    /// Hand the drawing forward to the next stage.
    Submit,
    /// Abandon the claim without advancing the stage.
    Release,
    /// Send the drawing back to Drafting.
    Reject,
}

impl Action {
    /// All actions.
    pub const ALL: [Self; 4] = [Self::Claim, Self::Submit, Self::Release, Self::Reject];

    /// The stable wire string for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Submit => "submit",
            Self::Release => "release",
            Self::Reject => "reject",
        }
    }

    /// The event type string used for fan-out payloads, e.g. `DRAWING_SUBMIT`.
    #[must_use]
    pub fn event_type(self) -> String {
        format!("DRAWING_{}", self.as_str().to_uppercase())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claim" => Ok(Self::Claim),
            "submit" => Ok(Self::Submit),
            "release" => Ok(Self::Release),
            "reject" => Ok(Self::Reject),
            other => Err(ParseEnumError {
                kind: "action",
                value: other.to_string(),
            }),
        }
    }
}

/// An engineering drawing moving through the review workflow.
///
/// The workflow engine is the sole mutation path for `stage`, `assignee`,
/// `revision` and `version`; the remaining fields are set at creation and
/// edited (if at all) by administrative surfaces outside this core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    /// Unique drawing id.
    pub id: DrawingId,
    /// Owning project; fixed for the drawing's lifetime.
    pub project_id: ProjectId,
    /// Title, unique within the project.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Creator of the drawing.
    pub author_id: ActorId,
    /// Current workflow stage.
    pub stage: Stage,
    /// Actor currently holding exclusive working rights, if any.
    pub assignee: Option<ActorId>,
    /// Business content revision.
    pub revision: Revision,
    /// Optimistic-concurrency token.
    pub version: Version,
    /// Link to the drawing file (S3/CDN).
    pub drawing_url: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a drawing.
///
/// New drawings always start in [`Stage::Unassigned`] at
/// [`Revision::FIRST`] / [`Version::INITIAL`] with no assignee.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDrawing {
    /// Owning project.
    pub project_id: ProjectId,
    /// Title, unique within the project.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Creator of the drawing.
    pub author_id: ActorId,
    /// Link to the drawing file (S3/CDN).
    pub drawing_url: String,
}

/// Immutable audit entry for one successful transition.
///
/// Exactly one record is committed in the same atomic unit as the stage
/// change it describes; records are ordered by creation time per drawing and
/// never modified afterwards. Self-loop transitions produce records with
/// `from_stage == to_stage`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Record id, assigned by the store.
    pub id: i64,
    /// The drawing the transition was applied to.
    pub drawing_id: DrawingId,
    /// The actor who performed the action.
    pub actor_id: ActorId,
    /// The action applied.
    pub action: Action,
    /// Stage before the transition.
    pub from_stage: Stage,
    /// Stage after the transition.
    pub to_stage: Stage,
    /// Optional free-text comment supplied with the action.
    pub comment: Option<String>,
    /// Creation time; set once by the store.
    pub timestamp: DateTime<Utc>,
}
