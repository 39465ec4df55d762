//! # Grading Instances
//!
//! Operations over one rater's grading attempts: resolving the instance to
//! edit, diffing submitted scores into fillings, activation, duplication
//! and the final grade.
//!
//! At most one instance per (rater, item) is current (Active or
//! NeedsUpdate); activating a new attempt cancels the previous one.

use std::collections::BTreeMap;

use crate::grade::{aggregate, CriterionResult};
use crate::storage::{FillingDraft, FillingPatch, GradingStore};
use crate::types::{
    BtecError, CriterionId, DefinitionId, Filling, Grade, Instance, InstanceId, InstanceStatus,
    ItemId, UserId,
};
use crate::validation::ParsedScore;

// =============================================================================
// RESOLUTION
// =============================================================================

/// The instance a marker should edit, plus whether an abandoned draft was
/// picked up (so the host can tell them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    pub instance: Instance,
    pub resumed: bool,
}

/// Resolve the instance for one grading session.
///
/// A `hint` id that still belongs to the same rater and item is returned
/// as-is. Otherwise, an Incomplete draft newer than the current instance
/// is resumed; failing that, a fresh Incomplete instance is created.
pub fn get_or_create<S: GradingStore>(
    store: &mut S,
    definition: DefinitionId,
    hint: Option<InstanceId>,
    rater: UserId,
    item: ItemId,
) -> Result<ResolvedInstance, BtecError> {
    if let Some(id) = hint {
        if let Some(instance) = store.get_instance(id)? {
            if instance.rater == rater && instance.item == item {
                return Ok(ResolvedInstance {
                    instance,
                    resumed: false,
                });
            }
        }
    }

    let existing = store.instances_for(rater, item)?;
    let current = existing.iter().find(|i| {
        i.definition == definition
            && matches!(
                i.status,
                InstanceStatus::Active | InstanceStatus::NeedsUpdate
            )
    });
    let draft = existing
        .iter()
        .find(|i| i.definition == definition && i.status == InstanceStatus::Incomplete);
    if let Some(draft) = draft {
        if current.is_none_or(|c| draft.modified > c.modified) {
            return Ok(ResolvedInstance {
                instance: draft.clone(),
                resumed: true,
            });
        }
    }

    let id = store.create_instance(definition, rater, item, InstanceStatus::Incomplete)?;
    let instance = store
        .get_instance(id)?
        .ok_or(BtecError::InstanceNotFound(id))?;
    Ok(ResolvedInstance {
        instance,
        resumed: false,
    })
}

// =============================================================================
// FILLINGS
// =============================================================================

/// Diff parsed scores into the instance's fillings: create missing ones,
/// patch only the fields that changed, delete fillings whose criterion is
/// absent from the submission.
pub fn update_fillings<S: GradingStore>(
    store: &mut S,
    instance: InstanceId,
    parsed: &BTreeMap<CriterionId, ParsedScore>,
) -> Result<(), BtecError> {
    let stored: BTreeMap<CriterionId, Filling> = store
        .fillings(instance)?
        .into_iter()
        .map(|f| (f.criterion, f))
        .collect();

    for (criterion, score) in parsed {
        match stored.get(criterion) {
            Some(filling) => {
                let patch = FillingPatch {
                    score: (score.score != filling.score).then_some(score.score),
                    remark: (score.remark != filling.remark).then(|| score.remark.clone()),
                };
                if !patch.is_empty() {
                    store.update_filling(filling.id, patch)?;
                }
            }
            None => {
                store.insert_filling(FillingDraft {
                    instance,
                    criterion: *criterion,
                    score: score.score,
                    remark: score.remark.clone(),
                })?;
            }
        }
    }

    for (criterion, filling) in &stored {
        if !parsed.contains_key(criterion) {
            store.delete_filling(filling.id)?;
        }
    }
    Ok(())
}

// =============================================================================
// GRADE & LIFECYCLE
// =============================================================================

/// Join an instance's fillings to their criteria's levels and aggregate.
///
/// Fillings whose criterion no longer exists, or whose shortname implies
/// no level, are skipped.
pub fn grade<S: GradingStore>(store: &S, instance: InstanceId) -> Result<Grade, BtecError> {
    let mut results = Vec::new();
    for filling in store.fillings(instance)? {
        let Some(criterion) = store.get_criterion(filling.criterion)? else {
            continue;
        };
        if let Some(level) = criterion.shortname.level() {
            results.push(CriterionResult {
                level,
                score: filling.score,
            });
        }
    }
    Ok(aggregate(&results))
}

/// Abandon an instance: delete it with its fillings.
pub fn cancel<S: GradingStore>(store: &mut S, instance: InstanceId) -> Result<(), BtecError> {
    store.delete_instance(instance)
}

/// Copy an instance and all its fillings into a fresh Incomplete attempt
/// for the given rater and item.
pub fn duplicate<S: GradingStore>(
    store: &mut S,
    instance: InstanceId,
    rater: UserId,
    item: ItemId,
) -> Result<InstanceId, BtecError> {
    let source = store
        .get_instance(instance)?
        .ok_or(BtecError::InstanceNotFound(instance))?;
    let copy = store.create_instance(source.definition, rater, item, InstanceStatus::Incomplete)?;
    for filling in store.fillings(instance)? {
        store.insert_filling(FillingDraft {
            instance: copy,
            criterion: filling.criterion,
            score: filling.score,
            remark: filling.remark,
        })?;
    }
    Ok(copy)
}

/// Mark an instance Active, cancelling any previously current instance for
/// the same rater and item.
pub fn make_active<S: GradingStore>(
    store: &mut S,
    instance: InstanceId,
) -> Result<(), BtecError> {
    let target = store
        .get_instance(instance)?
        .ok_or(BtecError::InstanceNotFound(instance))?;
    let previous: Vec<InstanceId> = store
        .instances_for(target.rater, target.item)?
        .into_iter()
        .filter(|i| {
            i.id != instance
                && i.definition == target.definition
                && matches!(
                    i.status,
                    InstanceStatus::Active | InstanceStatus::NeedsUpdate
                )
        })
        .map(|i| i.id)
        .collect();
    for id in previous {
        store.delete_instance(id)?;
    }
    store.set_instance_status(instance, InstanceStatus::Active)
}

// =============================================================================
// TESTS
// =============================================================================
