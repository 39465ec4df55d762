//! # Grading Storage
//!
//! The storage collaborator for the grading engine.
//!
//! This module defines the `GradingStore` trait and its in-memory backend.
//! All data structures use `BTreeMap` for deterministic ordering. A
//! persistent redb backend lives in [`redb_store`].

use std::collections::BTreeMap;

use crate::types::{
    BtecError, Comment, CommentId, Criterion, CriterionId, Definition, DefinitionId,
    DefinitionStatus, DisplayOptions, Filling, FillingId, Instance, InstanceId, InstanceStatus,
    ItemId, MarkerPrefs, Shortname, UserId,
};

pub mod redb_store;

// =============================================================================
// DRAFTS & PATCHES
// =============================================================================

/// Field values for a criterion about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionDraft {
    pub shortname: Shortname,
    pub description: String,
    pub marker_description: String,
    pub sort_order: u32,
    pub max_score: i64,
}

/// A partial criterion update; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriterionPatch {
    pub shortname: Option<Shortname>,
    pub description: Option<String>,
    pub marker_description: Option<String>,
    pub sort_order: Option<u32>,
    pub max_score: Option<i64>,
}

impl CriterionPatch {
    /// True when the patch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shortname.is_none()
            && self.description.is_none()
            && self.marker_description.is_none()
            && self.sort_order.is_none()
            && self.max_score.is_none()
    }
}

/// Field values for a comment about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentDraft {
    pub description: String,
    pub sort_order: u32,
}

/// A partial comment update; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPatch {
    pub description: Option<String>,
    pub sort_order: Option<u32>,
}

impl CommentPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.sort_order.is_none()
    }
}

/// A partial definition update; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<DefinitionStatus>,
    pub options: Option<DisplayOptions>,
    pub modified_by: Option<UserId>,
}

impl DefinitionPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.options.is_none()
            && self.modified_by.is_none()
    }
}

/// Field values for a filling about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillingDraft {
    pub instance: InstanceId,
    pub criterion: CriterionId,
    pub score: i64,
    pub remark: String,
}

/// A partial filling update; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillingPatch {
    pub score: Option<i64>,
    pub remark: Option<String>,
}

impl FillingPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.remark.is_none()
    }
}

// =============================================================================
// GRADINGSTORE TRAIT
// =============================================================================

/// The GradingStore trait defines the persistence operations the grading
/// engine requires from its host.
///
/// All fallible operations return `Result<T, BtecError>` to support both
/// in-memory and persistent storage backends uniformly.
///
/// Backends assign record ids and maintain each instance's monotonic
/// `modified` stamp: creating an instance, changing its status, or touching
/// any of its fillings advances the stamp.
pub trait GradingStore {
    /// Create a blank Draft definition and return its id.
    fn create_definition(&mut self, modified_by: UserId) -> Result<DefinitionId, BtecError>;

    /// Lookup a definition by id.
    fn get_definition(&self, id: DefinitionId) -> Result<Option<Definition>, BtecError>;

    /// Apply a partial update to a definition.
    fn update_definition(
        &mut self,
        id: DefinitionId,
        patch: DefinitionPatch,
    ) -> Result<(), BtecError>;

    /// Delete a definition and everything it owns: criteria, comments,
    /// instances and their fillings.
    fn delete_definition(&mut self, id: DefinitionId) -> Result<(), BtecError>;

    /// All definitions, ordered by id.
    fn definitions(&self) -> Result<Vec<Definition>, BtecError>;

    /// Insert a criterion, assigning its id.
    fn insert_criterion(
        &mut self,
        definition: DefinitionId,
        draft: CriterionDraft,
    ) -> Result<CriterionId, BtecError>;

    /// Lookup a criterion by id.
    fn get_criterion(&self, id: CriterionId) -> Result<Option<Criterion>, BtecError>;

    /// Apply a partial update to a criterion.
    fn update_criterion(&mut self, id: CriterionId, patch: CriterionPatch)
        -> Result<(), BtecError>;

    /// Delete the listed criteria and any fillings that score them.
    /// Ids with no stored criterion are ignored.
    fn delete_criteria(&mut self, ids: &[CriterionId]) -> Result<(), BtecError>;

    /// A definition's criteria, ordered by sort order then id.
    fn criteria(&self, definition: DefinitionId) -> Result<Vec<Criterion>, BtecError>;

    /// Insert a comment, assigning its id.
    fn insert_comment(
        &mut self,
        definition: DefinitionId,
        draft: CommentDraft,
    ) -> Result<CommentId, BtecError>;

    /// Apply a partial update to a comment.
    fn update_comment(&mut self, id: CommentId, patch: CommentPatch) -> Result<(), BtecError>;

    /// Delete the listed comments. Ids with no stored comment are ignored.
    fn delete_comments(&mut self, ids: &[CommentId]) -> Result<(), BtecError>;

    /// A definition's comments, ordered by sort order then id.
    fn comments(&self, definition: DefinitionId) -> Result<Vec<Comment>, BtecError>;

    /// Create an instance with a fresh `modified` stamp.
    fn create_instance(
        &mut self,
        definition: DefinitionId,
        rater: UserId,
        item: ItemId,
        status: InstanceStatus,
    ) -> Result<InstanceId, BtecError>;

    /// Lookup an instance by id.
    fn get_instance(&self, id: InstanceId) -> Result<Option<Instance>, BtecError>;

    /// All instances for one rater and item, newest first.
    fn instances_for(&self, rater: UserId, item: ItemId) -> Result<Vec<Instance>, BtecError>;

    /// All Active instances of a definition, ordered by id.
    fn active_instances(&self, definition: DefinitionId) -> Result<Vec<Instance>, BtecError>;

    /// Change an instance's status, advancing its `modified` stamp.
    fn set_instance_status(
        &mut self,
        id: InstanceId,
        status: InstanceStatus,
    ) -> Result<(), BtecError>;

    /// Delete an instance and its fillings.
    fn delete_instance(&mut self, id: InstanceId) -> Result<(), BtecError>;

    /// Insert a filling, assigning its id and touching the owning instance.
    fn insert_filling(&mut self, draft: FillingDraft) -> Result<FillingId, BtecError>;

    /// Apply a partial update to a filling, touching the owning instance.
    fn update_filling(&mut self, id: FillingId, patch: FillingPatch) -> Result<(), BtecError>;

    /// Delete a filling, touching the owning instance.
    fn delete_filling(&mut self, id: FillingId) -> Result<(), BtecError>;

    /// An instance's fillings, ordered by criterion id.
    fn fillings(&self, instance: InstanceId) -> Result<Vec<Filling>, BtecError>;

    /// A marker's presentation preferences; defaults when never set.
    fn get_prefs(&self, user: UserId) -> Result<MarkerPrefs, BtecError>;

    /// Store a marker's presentation preferences.
    fn set_prefs(&mut self, user: UserId, prefs: MarkerPrefs) -> Result<(), BtecError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// The in-memory reference backend.
///
/// Uses `BTreeMap` exclusively for deterministic ordering. Ids and the
/// modification clock are simple monotonic counters, which keeps test
/// output stable across runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    definitions: BTreeMap<DefinitionId, Definition>,
    criteria: BTreeMap<CriterionId, Criterion>,
    comments: BTreeMap<CommentId, Comment>,
    instances: BTreeMap<InstanceId, Instance>,
    fillings: BTreeMap<FillingId, Filling>,
    prefs: BTreeMap<UserId, MarkerPrefs>,
    next_id: u64,
    clock: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id = self.next_id.saturating_add(1);
        self.next_id
    }

    fn tick(&mut self) -> u64 {
        self.clock = self.clock.saturating_add(1);
        self.clock
    }

    fn touch(&mut self, instance: InstanceId) {
        let stamp = self.tick();
        if let Some(record) = self.instances.get_mut(&instance) {
            record.modified = stamp;
        }
    }
}

impl GradingStore for MemoryStore {
    fn create_definition(&mut self, modified_by: UserId) -> Result<DefinitionId, BtecError> {
        let id = DefinitionId(self.next_id());
        self.definitions.insert(
            id,
            Definition {
                id,
                name: String::new(),
                description: String::new(),
                status: DefinitionStatus::Draft,
                options: DisplayOptions::default(),
                modified_by,
            },
        );
        Ok(id)
    }

    fn get_definition(&self, id: DefinitionId) -> Result<Option<Definition>, BtecError> {
        Ok(self.definitions.get(&id).cloned())
    }

    fn update_definition(
        &mut self,
        id: DefinitionId,
        patch: DefinitionPatch,
    ) -> Result<(), BtecError> {
        let record = self
            .definitions
            .get_mut(&id)
            .ok_or(BtecError::DefinitionNotFound(id))?;
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(options) = patch.options {
            record.options = options;
        }
        if let Some(modified_by) = patch.modified_by {
            record.modified_by = modified_by;
        }
        Ok(())
    }

    fn delete_definition(&mut self, id: DefinitionId) -> Result<(), BtecError> {
        if self.definitions.remove(&id).is_none() {
            return Err(BtecError::DefinitionNotFound(id));
        }
        self.criteria.retain(|_, c| c.definition != id);
        self.comments.retain(|_, c| c.definition != id);
        let doomed: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.definition == id)
            .map(|i| i.id)
            .collect();
        for instance in doomed {
            self.instances.remove(&instance);
            self.fillings.retain(|_, f| f.instance != instance);
        }
        Ok(())
    }

    fn definitions(&self) -> Result<Vec<Definition>, BtecError> {
        Ok(self.definitions.values().cloned().collect())
    }

    fn insert_criterion(
        &mut self,
        definition: DefinitionId,
        draft: CriterionDraft,
    ) -> Result<CriterionId, BtecError> {
        if !self.definitions.contains_key(&definition) {
            return Err(BtecError::DefinitionNotFound(definition));
        }
        let id = CriterionId(self.next_id());
        self.criteria.insert(
            id,
            Criterion {
                id,
                definition,
                shortname: draft.shortname,
                description: draft.description,
                marker_description: draft.marker_description,
                sort_order: draft.sort_order,
                max_score: draft.max_score,
            },
        );
        Ok(id)
    }

    fn get_criterion(&self, id: CriterionId) -> Result<Option<Criterion>, BtecError> {
        Ok(self.criteria.get(&id).cloned())
    }

    fn update_criterion(
        &mut self,
        id: CriterionId,
        patch: CriterionPatch,
    ) -> Result<(), BtecError> {
        let record = self
            .criteria
            .get_mut(&id)
            .ok_or(BtecError::CriterionNotFound(id))?;
        if let Some(shortname) = patch.shortname {
            record.shortname = shortname;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(marker_description) = patch.marker_description {
            record.marker_description = marker_description;
        }
        if let Some(sort_order) = patch.sort_order {
            record.sort_order = sort_order;
        }
        if let Some(max_score) = patch.max_score {
            record.max_score = max_score;
        }
        Ok(())
    }

    fn delete_criteria(&mut self, ids: &[CriterionId]) -> Result<(), BtecError> {
        for id in ids {
            if self.criteria.remove(id).is_some() {
                self.fillings.retain(|_, f| f.criterion != *id);
            }
        }
        Ok(())
    }

    fn criteria(&self, definition: DefinitionId) -> Result<Vec<Criterion>, BtecError> {
        let mut out: Vec<Criterion> = self
            .criteria
            .values()
            .filter(|c| c.definition == definition)
            .cloned()
            .collect();
        out.sort_by_key(|c| (c.sort_order, c.id));
        Ok(out)
    }

    fn insert_comment(
        &mut self,
        definition: DefinitionId,
        draft: CommentDraft,
    ) -> Result<CommentId, BtecError> {
        if !self.definitions.contains_key(&definition) {
            return Err(BtecError::DefinitionNotFound(definition));
        }
        let id = CommentId(self.next_id());
        self.comments.insert(
            id,
            Comment {
                id,
                definition,
                description: draft.description,
                sort_order: draft.sort_order,
            },
        );
        Ok(id)
    }

    fn update_comment(&mut self, id: CommentId, patch: CommentPatch) -> Result<(), BtecError> {
        let record = self
            .comments
            .get_mut(&id)
            .ok_or(BtecError::CommentNotFound(id))?;
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(sort_order) = patch.sort_order {
            record.sort_order = sort_order;
        }
        Ok(())
    }

    fn delete_comments(&mut self, ids: &[CommentId]) -> Result<(), BtecError> {
        for id in ids {
            self.comments.remove(id);
        }
        Ok(())
    }

    fn comments(&self, definition: DefinitionId) -> Result<Vec<Comment>, BtecError> {
        let mut out: Vec<Comment> = self
            .comments
            .values()
            .filter(|c| c.definition == definition)
            .cloned()
            .collect();
        out.sort_by_key(|c| (c.sort_order, c.id));
        Ok(out)
    }

    fn create_instance(
        &mut self,
        definition: DefinitionId,
        rater: UserId,
        item: ItemId,
        status: InstanceStatus,
    ) -> Result<InstanceId, BtecError> {
        if !self.definitions.contains_key(&definition) {
            return Err(BtecError::DefinitionNotFound(definition));
        }
        let id = InstanceId(self.next_id());
        let modified = self.tick();
        self.instances.insert(
            id,
            Instance {
                id,
                definition,
                rater,
                item,
                status,
                modified,
            },
        );
        Ok(id)
    }

    fn get_instance(&self, id: InstanceId) -> Result<Option<Instance>, BtecError> {
        Ok(self.instances.get(&id).cloned())
    }

    fn instances_for(&self, rater: UserId, item: ItemId) -> Result<Vec<Instance>, BtecError> {
        let mut out: Vec<Instance> = self
            .instances
            .values()
            .filter(|i| i.rater == rater && i.item == item)
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.modified, b.id).cmp(&(a.modified, a.id)));
        Ok(out)
    }

    fn active_instances(&self, definition: DefinitionId) -> Result<Vec<Instance>, BtecError> {
        Ok(self
            .instances
            .values()
            .filter(|i| i.definition == definition && i.status == InstanceStatus::Active)
            .cloned()
            .collect())
    }

    fn set_instance_status(
        &mut self,
        id: InstanceId,
        status: InstanceStatus,
    ) -> Result<(), BtecError> {
        if !self.instances.contains_key(&id) {
            return Err(BtecError::InstanceNotFound(id));
        }
        if let Some(record) = self.instances.get_mut(&id) {
            record.status = status;
        }
        self.touch(id);
        Ok(())
    }

    fn delete_instance(&mut self, id: InstanceId) -> Result<(), BtecError> {
        if self.instances.remove(&id).is_none() {
            return Err(BtecError::InstanceNotFound(id));
        }
        self.fillings.retain(|_, f| f.instance != id);
        Ok(())
    }

    fn insert_filling(&mut self, draft: FillingDraft) -> Result<FillingId, BtecError> {
        if !self.instances.contains_key(&draft.instance) {
            return Err(BtecError::InstanceNotFound(draft.instance));
        }
        let id = FillingId(self.next_id());
        self.fillings.insert(
            id,
            Filling {
                id,
                instance: draft.instance,
                criterion: draft.criterion,
                score: draft.score,
                remark: draft.remark,
            },
        );
        self.touch(draft.instance);
        Ok(id)
    }

    fn update_filling(&mut self, id: FillingId, patch: FillingPatch) -> Result<(), BtecError> {
        let instance = {
            let record = self
                .fillings
                .get_mut(&id)
                .ok_or(BtecError::FillingNotFound(id))?;
            if let Some(score) = patch.score {
                record.score = score;
            }
            if let Some(remark) = patch.remark {
                record.remark = remark;
            }
            record.instance
        };
        self.touch(instance);
        Ok(())
    }

    fn delete_filling(&mut self, id: FillingId) -> Result<(), BtecError> {
        if let Some(record) = self.fillings.remove(&id) {
            self.touch(record.instance);
        }
        Ok(())
    }

    fn fillings(&self, instance: InstanceId) -> Result<Vec<Filling>, BtecError> {
        let mut out: Vec<Filling> = self
            .fillings
            .values()
            .filter(|f| f.instance == instance)
            .cloned()
            .collect();
        out.sort_by_key(|f| (f.criterion, f.id));
        Ok(out)
    }

    fn get_prefs(&self, user: UserId) -> Result<MarkerPrefs, BtecError> {
        Ok(self.prefs.get(&user).copied().unwrap_or_default())
    }

    fn set_prefs(&mut self, user: UserId, prefs: MarkerPrefs) -> Result<(), BtecError> {
        self.prefs.insert(user, prefs);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(shortname: &str, order: u32) -> CriterionDraft {
        CriterionDraft {
            shortname: Shortname::new(shortname),
            description: String::new(),
            marker_description: String::new(),
            sort_order: order,
            max_score: 1,
        }
    }

    #[test]
    fn definitions_start_blank() {
        let mut store = MemoryStore::new();
        let id = store.create_definition(UserId(7)).expect("create");
        let definition = store.get_definition(id).expect("get").expect("present");
        assert_eq!(definition.status, DefinitionStatus::Draft);
        assert_eq!(definition.modified_by, UserId(7));
        assert!(definition.name.is_empty());
    }

    #[test]
    fn criteria_are_listed_in_sort_order() {
        let mut store = MemoryStore::new();
        let def = store.create_definition(UserId(1)).expect("create");
        store.insert_criterion(def, draft("M1", 2)).expect("insert");
        store.insert_criterion(def, draft("P1", 1)).expect("insert");
        let listed = store.criteria(def).expect("list");
        let names: Vec<&str> = listed.iter().map(|c| c.shortname.as_str()).collect();
        assert_eq!(names, ["P1", "M1"]);
    }

    #[test]
    fn deleting_a_definition_cascades() {
        let mut store = MemoryStore::new();
        let def = store.create_definition(UserId(1)).expect("create");
        let crit = store.insert_criterion(def, draft("P1", 1)).expect("insert");
        let instance = store
            .create_instance(def, UserId(2), ItemId(3), InstanceStatus::Active)
            .expect("instance");
        store
            .insert_filling(FillingDraft {
                instance,
                criterion: crit,
                score: 1,
                remark: String::new(),
            })
            .expect("filling");

        store.delete_definition(def).expect("delete");
        assert!(store.get_criterion(crit).expect("get").is_none());
        assert!(store.get_instance(instance).expect("get").is_none());
        assert!(store.fillings(instance).expect("list").is_empty());
    }

    #[test]
    fn deleting_criteria_drops_their_fillings() {
        let mut store = MemoryStore::new();
        let def = store.create_definition(UserId(1)).expect("create");
        let keep = store.insert_criterion(def, draft("P1", 1)).expect("insert");
        let drop = store.insert_criterion(def, draft("P2", 2)).expect("insert");
        let instance = store
            .create_instance(def, UserId(2), ItemId(3), InstanceStatus::Incomplete)
            .expect("instance");
        for criterion in [keep, drop] {
            store
                .insert_filling(FillingDraft {
                    instance,
                    criterion,
                    score: 1,
                    remark: String::new(),
                })
                .expect("filling");
        }

        store.delete_criteria(&[drop]).expect("delete");
        let remaining = store.fillings(instance).expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].criterion, keep);
    }

    #[test]
    fn instances_list_newest_first() {
        let mut store = MemoryStore::new();
        let def = store.create_definition(UserId(1)).expect("create");
        let older = store
            .create_instance(def, UserId(2), ItemId(3), InstanceStatus::Active)
            .expect("instance");
        let newer = store
            .create_instance(def, UserId(2), ItemId(3), InstanceStatus::Incomplete)
            .expect("instance");
        let listed = store.instances_for(UserId(2), ItemId(3)).expect("list");
        assert_eq!(listed[0].id, newer);
        assert_eq!(listed[1].id, older);
    }

    #[test]
    fn filling_changes_touch_the_instance() {
        let mut store = MemoryStore::new();
        let def = store.create_definition(UserId(1)).expect("create");
        let crit = store.insert_criterion(def, draft("P1", 1)).expect("insert");
        let instance = store
            .create_instance(def, UserId(2), ItemId(3), InstanceStatus::Incomplete)
            .expect("instance");
        let before = store
            .get_instance(instance)
            .expect("get")
            .expect("present")
            .modified;
        store
            .insert_filling(FillingDraft {
                instance,
                criterion: crit,
                score: 0,
                remark: String::new(),
            })
            .expect("filling");
        let after = store
            .get_instance(instance)
            .expect("get")
            .expect("present")
            .modified;
        assert!(after > before);
    }

    #[test]
    fn prefs_default_until_set() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get_prefs(UserId(9)).expect("get"), MarkerPrefs::default());
        let prefs = MarkerPrefs {
            show_marker_desc: false,
            show_student_desc: true,
        };
        store.set_prefs(UserId(9), prefs).expect("set");
        assert_eq!(store.get_prefs(UserId(9)).expect("get"), prefs);
    }
}
