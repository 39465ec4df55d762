//! # Core Type Definitions
//!
//! This module contains all core types for the BTEC grading engine:
//! - Record identifiers (`DefinitionId`, `CriterionId`, `CommentId`, ...)
//! - Achievement levels and grade outcomes (`Level`, `Grade`)
//! - Persistent records (`Definition`, `Criterion`, `Comment`, `Instance`,
//!   `Filling`)
//! - Error types (`BtecError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// RECORD IDENTIFIERS
// =============================================================================

/// Unique identifier for a grading definition (one per grading area).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DefinitionId(pub u64);

/// Unique identifier for a persisted criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CriterionId(pub u64);

/// Unique identifier for a persisted canned comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommentId(pub u64);

/// Unique identifier for a grading instance (one attempt by one rater).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

/// Unique identifier for a filling (one scored criterion in one instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FillingId(pub u64);

/// Identifier of a user in the host platform (rater or author).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Identifier of the gradable item in the host platform (e.g. a submission).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

// =============================================================================
// LEVELS & GRADES
// =============================================================================

/// One of the three ordered achievement tiers of the BTEC rubric.
///
/// A criterion's level is derived from the first character of its
/// shortname, case-insensitive: `P1` is Pass, `m3` is Merit, `D2` is
/// Distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Pass,
    Merit,
    Distinction,
}

impl Level {
    /// All levels in ascending order.
    pub const ALL: [Level; 3] = [Level::Pass, Level::Merit, Level::Distinction];

    /// Parse a level from its tag letter, case-insensitive.
    #[must_use]
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'p' => Some(Level::Pass),
            'm' => Some(Level::Merit),
            'd' => Some(Level::Distinction),
            _ => None,
        }
    }

    /// The upper-case tag letter for this level.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Level::Pass => 'P',
            Level::Merit => 'M',
            Level::Distinction => 'D',
        }
    }

    /// Zero-based index into per-level arrays (`[LevelFlag; 3]`).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Level::Pass => 0,
            Level::Merit => 1,
            Level::Distinction => 2,
        }
    }
}

/// The overall qualification grade derived from a set of criterion scores.
///
/// Ordered: `Refer < Pass < Merit < Distinction`. The numeric scale values
/// (1..=4) match the scale the host platform installs for this rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    Refer,
    Pass,
    Merit,
    Distinction,
}

impl Grade {
    /// Position on the host platform's 1-based grading scale.
    #[must_use]
    pub const fn scale_value(self) -> u8 {
        match self {
            Grade::Refer => 1,
            Grade::Pass => 2,
            Grade::Merit => 3,
            Grade::Distinction => 4,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Grade::Refer => "Refer",
            Grade::Pass => "Pass",
            Grade::Merit => "Merit",
            Grade::Distinction => "Distinction",
        }
    }
}

// =============================================================================
// SHORTNAME
// =============================================================================

/// A normalized criterion tag such as `P1`, `M2` or `D3`.
///
/// Construction strips leading, trailing and all internal whitespace, so
/// `" P  1 "` and `"P1"` compare equal. Validation of the level letter and
/// trailing digit is the job of the `validation` module; a `Shortname` may
/// hold any stripped string, including an invalid or empty one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Shortname(String);

impl Shortname {
    /// Build a shortname from raw form input, stripping all whitespace.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.chars().filter(|c| !c.is_whitespace()).collect())
    }

    /// The stripped tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when nothing remains after stripping.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The achievement level implied by the leading letter, if valid.
    #[must_use]
    pub fn level(&self) -> Option<Level> {
        self.0.chars().next().and_then(Level::from_letter)
    }

    /// Whether the tag ends in a decimal digit, as the rubric requires.
    #[must_use]
    pub fn ends_with_digit(&self) -> bool {
        self.0.chars().next_back().is_some_and(|c| c.is_ascii_digit())
    }
}

impl std::fmt::Display for Shortname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// LIFECYCLE STATUSES
// =============================================================================

/// Lifecycle status of a grading definition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum DefinitionStatus {
    /// Being authored; not yet usable for grading.
    #[default]
    Draft,
    /// Validated and available to markers.
    Ready,
}

/// Status of a grading instance relative to its definition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum InstanceStatus {
    /// Grading started but not submitted (a resumable draft).
    #[default]
    Incomplete,
    /// Submitted and current.
    Active,
    /// The definition changed since this instance was graded.
    NeedsUpdate,
}

// =============================================================================
// DISPLAY OPTIONS & MARKER PREFERENCES
// =============================================================================

/// Boolean flags controlling how the host displays the marking scheme.
///
/// These are presentation-only and never influence the computed grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Show the scheme definition to students before grading.
    pub always_show_definition: bool,
    /// Show per-criterion marks to students.
    pub show_marks_per_criterion: bool,
    /// Show criterion descriptions to students.
    pub show_description_to_students: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            always_show_definition: true,
            show_marks_per_criterion: true,
            show_description_to_students: true,
        }
    }
}

/// Per-marker presentation preferences, keyed by user id in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPrefs {
    /// Show marker-only criterion descriptions while grading.
    pub show_marker_desc: bool,
    /// Show the student-facing descriptions while grading.
    pub show_student_desc: bool,
}

impl Default for MarkerPrefs {
    fn default() -> Self {
        Self {
            show_marker_desc: true,
            show_student_desc: true,
        }
    }
}

// =============================================================================
// PERSISTENT RECORDS
// =============================================================================

/// One gradable statement tagged with an achievement level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub definition: DefinitionId,
    /// Level tag, e.g. `P1`. Unique within a definition.
    pub shortname: Shortname,
    /// Student-facing description of what must be achieved.
    pub description: String,
    /// Additional guidance shown only to markers.
    pub marker_description: String,
    /// 1-based position within the definition.
    pub sort_order: u32,
    /// Maximum score awardable; scoring is binary so this is normally 1.
    pub max_score: i64,
}

/// A reusable canned remark, independent of any criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub definition: DefinitionId,
    pub description: String,
    /// 1-based position within the definition.
    pub sort_order: u32,
}

/// A grading definition: the root record owning criteria and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub id: DefinitionId,
    pub name: String,
    pub description: String,
    pub status: DefinitionStatus,
    pub options: DisplayOptions,
    /// The user who last edited the definition.
    pub modified_by: UserId,
}

/// One grading attempt by one rater for one gradable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub definition: DefinitionId,
    pub rater: UserId,
    pub item: ItemId,
    pub status: InstanceStatus,
    /// Monotonic modification stamp assigned by the store; newer is larger.
    pub modified: u64,
}

/// A marker's recorded result for one criterion within one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filling {
    pub id: FillingId,
    pub instance: InstanceId,
    pub criterion: CriterionId,
    /// 0 = not met, nonzero = met.
    pub score: i64,
    pub remark: String,
}

impl Filling {
    /// Whether this criterion was met.
    #[must_use]
    pub fn met(&self) -> bool {
        self.score != 0
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Failures raised by the storage collaborator or its callers.
///
/// Rule violations (invalid shortnames, missing scores) are NOT errors:
/// they accumulate in report types and surface as user-facing text. This
/// enum covers the cases that genuinely stop an operation.
#[derive(Debug, Error)]
pub enum BtecError {
    /// No definition with the given id exists.
    #[error("Definition not found: {0:?}")]
    DefinitionNotFound(DefinitionId),

    /// No criterion with the given id exists.
    #[error("Criterion not found: {0:?}")]
    CriterionNotFound(CriterionId),

    /// No comment with the given id exists.
    #[error("Comment not found: {0:?}")]
    CommentNotFound(CommentId),

    /// No instance with the given id exists.
    #[error("Instance not found: {0:?}")]
    InstanceNotFound(InstanceId),

    /// No filling with the given id exists.
    #[error("Filling not found: {0:?}")]
    FillingNotFound(FillingId),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred in a persistent store.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
