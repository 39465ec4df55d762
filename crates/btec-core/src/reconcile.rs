//! # Definition Reconciler
//!
//! Diffs a prepared submission against the persisted definition and either
//! reports how disruptive the change would be (`Check`) or persists it
//! (`Commit`). The severity scale is an explicit precedence table; the
//! overall result is the maximum across all detected changes:
//!
//! | value | meaning                                  |
//! |-------|------------------------------------------|
//! | 0     | no change                                |
//! | 1     | text or ordering change                  |
//! | 2     | level added (reserved, see below)        |
//! | 3     | criterion deleted                        |
//! | 4     | level removed (reserved)                 |
//! | 5     | criterion inserted                       |
//!
//! Levels are implied by criterion shortnames rather than stored as rows,
//! so a flat criterion list can never add or remove a level on its own;
//! severities 2 and 4 are kept to hold their places in the precedence
//! table and are never produced.
//!
//! Comments are persisted through the same pass but contribute no
//! severity: they never affect grading.

use std::collections::{BTreeMap, BTreeSet};

use crate::editor::{DefinitionSubmission, EntryKey, PreparedEntry, FIELD_SORT_ORDER};
use crate::storage::{
    CommentDraft, CommentPatch, CriterionDraft, CriterionPatch, DefinitionPatch, GradingStore,
};
use crate::types::{
    BtecError, Comment, CommentId, Criterion, CriterionId, DefinitionId, InstanceStatus,
    Shortname, UserId,
};

// =============================================================================
// SEVERITY
// =============================================================================

/// How disruptive a definition change is to existing grades. Ordered by
/// declaration; `max` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ChangeSeverity {
    #[default]
    None,
    /// A textual field or the ordering changed.
    TextOrOrder,
    /// Reserved: a whole achievement level appeared.
    LevelAdded,
    /// A criterion was removed.
    Deletion,
    /// Reserved: a whole achievement level disappeared.
    LevelRemoved,
    /// A criterion was added.
    Insertion,
}

impl ChangeSeverity {
    /// Numeric value on the 0..=5 precedence scale.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            ChangeSeverity::None => 0,
            ChangeSeverity::TextOrOrder => 1,
            ChangeSeverity::LevelAdded => 2,
            ChangeSeverity::Deletion => 3,
            ChangeSeverity::LevelRemoved => 4,
            ChangeSeverity::Insertion => 5,
        }
    }
}

/// Whether a reconcile pass persists anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Report severity only; the store is never written.
    Check,
    /// Persist the submission.
    Commit,
}

/// Result of a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub severity: ChangeSeverity,
    /// The persisted definition, when one exists after the pass. `None`
    /// only for a Check against a definition never persisted.
    pub definition: Option<DefinitionId>,
}

// =============================================================================
// RECONCILE
// =============================================================================

/// Diff a prepared submission against the stored definition.
///
/// With no previously persisted definition, Check reports [`Insertion`]
/// without touching the store; Commit creates a blank definition shell
/// first so criteria and comments have a stable parent id.
///
/// A submitted stable id with no stored counterpart is treated as an
/// insertion.
///
/// [`Insertion`]: ChangeSeverity::Insertion
pub fn reconcile<S: GradingStore>(
    store: &mut S,
    definition: Option<DefinitionId>,
    submission: &DefinitionSubmission,
    mode: ReconcileMode,
    modified_by: UserId,
) -> Result<ReconcileOutcome, BtecError> {
    let mut severity = ChangeSeverity::None;

    let stored = match definition {
        Some(id) => store.get_definition(id)?,
        None => None,
    };
    let stored = match stored {
        Some(record) => record,
        None => {
            severity = ChangeSeverity::Insertion;
            if mode == ReconcileMode::Check {
                return Ok(ReconcileOutcome {
                    severity,
                    definition: None,
                });
            }
            let id = store.create_definition(modified_by)?;
            store
                .get_definition(id)?
                .ok_or(BtecError::DefinitionNotFound(id))?
        }
    };
    let definition = stored.id;

    // Definition-level fields.
    let patch = DefinitionPatch {
        name: (submission.name != stored.name).then(|| submission.name.clone()),
        description: (submission.description != stored.description)
            .then(|| submission.description.clone()),
        status: (submission.status != stored.status).then_some(submission.status),
        options: (submission.options != stored.options).then_some(submission.options),
        modified_by: (modified_by != stored.modified_by).then_some(modified_by),
    };
    if !patch.is_empty() {
        severity = severity.max(ChangeSeverity::TextOrOrder);
        if mode == ReconcileMode::Commit {
            store.update_definition(definition, patch)?;
        }
    }

    severity = severity.max(reconcile_criteria(store, definition, submission, mode)?);
    reconcile_comments(store, definition, submission, mode)?;

    Ok(ReconcileOutcome {
        severity,
        definition: Some(definition),
    })
}

fn reconcile_criteria<S: GradingStore>(
    store: &mut S,
    definition: DefinitionId,
    submission: &DefinitionSubmission,
    mode: ReconcileMode,
) -> Result<ChangeSeverity, BtecError> {
    let mut severity = ChangeSeverity::None;
    let stored: BTreeMap<u64, Criterion> = store
        .criteria(definition)?
        .into_iter()
        .map(|c| (c.id.0, c))
        .collect();
    let mut remaining: BTreeSet<u64> = stored.keys().copied().collect();

    for entry in &submission.criteria {
        match entry.key {
            EntryKey::Stable(id) if stored.contains_key(&id) => {
                remaining.remove(&id);
                let patch = criterion_patch(&stored[&id], &entry.fields);
                if !patch.is_empty() {
                    severity = severity.max(ChangeSeverity::TextOrOrder);
                    if mode == ReconcileMode::Commit {
                        store.update_criterion(CriterionId(id), patch)?;
                    }
                }
            }
            EntryKey::Stable(_) | EntryKey::Placeholder(_) => {
                severity = severity.max(ChangeSeverity::Insertion);
                if mode == ReconcileMode::Commit {
                    store.insert_criterion(definition, criterion_draft(entry))?;
                }
            }
        }
    }

    if !remaining.is_empty() {
        severity = severity.max(ChangeSeverity::Deletion);
        if mode == ReconcileMode::Commit {
            let doomed: Vec<CriterionId> = remaining.into_iter().map(CriterionId).collect();
            store.delete_criteria(&doomed)?;
        }
    }
    Ok(severity)
}

fn reconcile_comments<S: GradingStore>(
    store: &mut S,
    definition: DefinitionId,
    submission: &DefinitionSubmission,
    mode: ReconcileMode,
) -> Result<(), BtecError> {
    if mode == ReconcileMode::Check {
        return Ok(());
    }
    let stored: BTreeMap<u64, Comment> = store
        .comments(definition)?
        .into_iter()
        .map(|c| (c.id.0, c))
        .collect();
    let mut remaining: BTreeSet<u64> = stored.keys().copied().collect();

    for entry in &submission.comments {
        match entry.key {
            EntryKey::Stable(id) if stored.contains_key(&id) => {
                remaining.remove(&id);
                let patch = comment_patch(&stored[&id], &entry.fields);
                if !patch.is_empty() {
                    store.update_comment(CommentId(id), patch)?;
                }
            }
            EntryKey::Stable(_) | EntryKey::Placeholder(_) => {
                store.insert_comment(definition, comment_draft(entry))?;
            }
        }
    }

    if !remaining.is_empty() {
        let doomed: Vec<CommentId> = remaining.into_iter().map(CommentId).collect();
        store.delete_comments(&doomed)?;
    }
    Ok(())
}

// =============================================================================
// FIELD DIFFS
// =============================================================================

/// Changed fields only; fields absent from the submission (or unparsable
/// numerics) are left untouched.
fn criterion_patch(stored: &Criterion, fields: &BTreeMap<String, String>) -> CriterionPatch {
    let shortname = fields.get("shortname").map(|raw| Shortname::new(raw));
    CriterionPatch {
        shortname: shortname.filter(|s| *s != stored.shortname),
        description: fields
            .get("description")
            .filter(|v| **v != stored.description)
            .cloned(),
        marker_description: fields
            .get("markerdescription")
            .filter(|v| **v != stored.marker_description)
            .cloned(),
        sort_order: fields
            .get(FIELD_SORT_ORDER)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v != stored.sort_order),
        max_score: fields
            .get("maxscore")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v != stored.max_score),
    }
}

fn comment_patch(stored: &Comment, fields: &BTreeMap<String, String>) -> CommentPatch {
    CommentPatch {
        description: fields
            .get("description")
            .filter(|v| **v != stored.description)
            .cloned(),
        sort_order: fields
            .get(FIELD_SORT_ORDER)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v != stored.sort_order),
    }
}

fn criterion_draft(entry: &PreparedEntry) -> CriterionDraft {
    let field = |name: &str| entry.fields.get(name).map_or("", String::as_str);
    CriterionDraft {
        shortname: Shortname::new(field("shortname")),
        description: field("description").to_string(),
        marker_description: field("markerdescription").to_string(),
        sort_order: field(FIELD_SORT_ORDER).parse().unwrap_or(0),
        max_score: field("maxscore").parse().unwrap_or(1),
    }
}

fn comment_draft(entry: &PreparedEntry) -> CommentDraft {
    let field = |name: &str| entry.fields.get(name).map_or("", String::as_str);
    CommentDraft {
        description: field("description").to_string(),
        sort_order: field(FIELD_SORT_ORDER).parse().unwrap_or(0),
    }
}

// =============================================================================
// REGRADE FLOW
// =============================================================================

/// Flip every Active instance of a definition to NeedsUpdate.
pub fn mark_for_regrade<S: GradingStore>(
    store: &mut S,
    definition: DefinitionId,
) -> Result<usize, BtecError> {
    let active = store.active_instances(definition)?;
    for instance in &active {
        store.set_instance_status(instance.id, InstanceStatus::NeedsUpdate)?;
    }
    Ok(active.len())
}

/// Decide whether the host must ask the author to confirm a regrade.
///
/// Returns `None` (nothing to confirm) when the author already confirmed,
/// when no persisted definition exists, when the definition has no Active
/// instances, or when a dry-run reconcile reports no change. Otherwise the
/// severity is handed back for display. State anomalies short-circuit to
/// `None` rather than erroring.
pub fn needs_regrade_confirmation<S: GradingStore>(
    store: &mut S,
    definition: Option<DefinitionId>,
    submission: &DefinitionSubmission,
    modified_by: UserId,
    already_confirmed: bool,
) -> Result<Option<ChangeSeverity>, BtecError> {
    if already_confirmed {
        return Ok(None);
    }
    let Some(definition) = definition else {
        return Ok(None);
    };
    if store.active_instances(definition)?.is_empty() {
        return Ok(None);
    }
    let outcome = reconcile(
        store,
        Some(definition),
        submission,
        ReconcileMode::Check,
        modified_by,
    )?;
    if outcome.severity == ChangeSeverity::None {
        return Ok(None);
    }
    Ok(Some(outcome.severity))
}

// =============================================================================
// CLONING
// =============================================================================

/// Re-key a stored definition as an all-placeholder submission, so it can
/// be committed into a fresh grading area through the normal path.
pub fn definition_copy_submission<S: GradingStore>(
    store: &S,
    definition: DefinitionId,
) -> Result<DefinitionSubmission, BtecError> {
    let stored = store
        .get_definition(definition)?
        .ok_or(BtecError::DefinitionNotFound(definition))?;

    let criteria = store
        .criteria(definition)?
        .into_iter()
        .enumerate()
        .map(|(index, criterion)| {
            let mut fields = BTreeMap::new();
            fields.insert("shortname".to_string(), criterion.shortname.to_string());
            fields.insert("description".to_string(), criterion.description);
            fields.insert(
                "markerdescription".to_string(),
                criterion.marker_description,
            );
            fields.insert(FIELD_SORT_ORDER.to_string(), criterion.sort_order.to_string());
            fields.insert("maxscore".to_string(), criterion.max_score.to_string());
            PreparedEntry {
                key: EntryKey::Placeholder(index as u64 + 1),
                fields,
            }
        })
        .collect();

    let comments = store
        .comments(definition)?
        .into_iter()
        .enumerate()
        .map(|(index, comment)| {
            let mut fields = BTreeMap::new();
            fields.insert("description".to_string(), comment.description);
            fields.insert(FIELD_SORT_ORDER.to_string(), comment.sort_order.to_string());
            PreparedEntry {
                key: EntryKey::Placeholder(index as u64 + 1),
                fields,
            }
        })
        .collect();

    Ok(DefinitionSubmission {
        name: stored.name,
        description: stored.description,
        status: stored.status,
        options: stored.options,
        criteria,
        comments,
        regrade: false,
    })
}

// =============================================================================
// TESTS
// =============================================================================
