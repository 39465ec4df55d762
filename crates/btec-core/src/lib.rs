//! # btec-core
//!
//! The deterministic BTEC grading engine - THE LOGIC.
//!
//! This crate implements the core of a criterion-referenced marking
//! scheme in the BTEC style: criteria are tagged Pass, Merit or
//! Distinction, scored met/not-met, and reduced to a single overall
//! grade. Definition edits are diffed against the stored scheme and
//! ranked by how badly they disturb existing grades.
//!
//! ## Architectural Constraints
//!
//! The core:
//! - Is pure and synchronous: no async, no network dependencies
//! - Uses integer arithmetic and `BTreeMap` collections only, so every
//!   operation is deterministic and order-independent
//! - Owns no I/O; the host drives it through the `GradingStore` trait
//! - Treats rule violations as collected reports, never as errors

// =============================================================================
// MODULES
// =============================================================================

pub mod editor;
pub mod grade;
pub mod instance;
pub mod reconcile;
pub mod storage;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    BtecError, Comment, CommentId, Criterion, CriterionId, Definition, DefinitionId,
    DefinitionStatus, DisplayOptions, Filling, FillingId, Grade, Instance, InstanceId,
    InstanceStatus, ItemId, Level, MarkerPrefs, Shortname, UserId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use editor::{
    DefinitionSubmission, EntryKey, FormData, FormEntry, FormList, Prepared, PreparedEntry,
    RowSignal, prepare,
};
pub use grade::{CriterionResult, LevelFlag, aggregate, level_flags};
pub use instance::{
    ResolvedInstance, cancel, duplicate, get_or_create, grade, make_active, update_fillings,
};
pub use reconcile::{
    ChangeSeverity, ReconcileMode, ReconcileOutcome, definition_copy_submission, mark_for_regrade,
    needs_regrade_confirmation, reconcile,
};
pub use storage::{
    CommentDraft, CommentPatch, CriterionDraft, CriterionPatch, DefinitionPatch, FillingDraft,
    FillingPatch, GradingStore, MemoryStore, redb_store::RedbStore,
};
pub use validation::{
    ParsedScore, ScoreReport, SubmittedScore, ValidationReport, validate_definition,
    validate_scores,
};
