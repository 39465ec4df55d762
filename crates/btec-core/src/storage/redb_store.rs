//! # redb-backed Grading Storage
//!
//! A disk-backed `GradingStore` using the redb embedded database,
//! providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - Zero configuration
//!
//! Records are postcard-serialized under their u64 id. The id counter and
//! the instance modification clock live in the metadata table and are
//! rewritten with every write transaction, so a reopened database resumes
//! exactly where it left off.

use crate::storage::{
    CommentDraft, CommentPatch, CriterionDraft, CriterionPatch, DefinitionPatch, FillingDraft,
    FillingPatch, GradingStore,
};
use crate::types::{
    BtecError, Comment, CommentId, Criterion, CriterionId, Definition, DefinitionId,
    DefinitionStatus, DisplayOptions, Filling, FillingId, Instance, InstanceId, InstanceStatus,
    ItemId, MarkerPrefs, UserId,
};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Table for definitions: DefinitionId(u64) -> serialized Definition bytes
const DEFINITIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("definitions");

/// Table for criteria: CriterionId(u64) -> serialized Criterion bytes
const CRITERIA: TableDefinition<u64, &[u8]> = TableDefinition::new("criteria");

/// Table for comments: CommentId(u64) -> serialized Comment bytes
const COMMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("comments");

/// Table for instances: InstanceId(u64) -> serialized Instance bytes
const INSTANCES: TableDefinition<u64, &[u8]> = TableDefinition::new("instances");

/// Table for fillings: FillingId(u64) -> serialized Filling bytes
const FILLINGS: TableDefinition<u64, &[u8]> = TableDefinition::new("fillings");

/// Table for marker preferences: UserId(u64) -> serialized MarkerPrefs bytes
const PREFS: TableDefinition<u64, &[u8]> = TableDefinition::new("prefs");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Shape shared by every record table.
type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

const ALL_RECORD_TABLES: [RecordTable; 6] =
    [DEFINITIONS, CRITERIA, COMMENTS, INSTANCES, FILLINGS, PREFS];

fn io<E: std::fmt::Display>(e: E) -> BtecError {
    BtecError::IoError(e.to_string())
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, BtecError> {
    postcard::to_allocvec(record).map_err(|e| BtecError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BtecError> {
    postcard::from_bytes(bytes).map_err(|e| BtecError::SerializationError(e.to_string()))
}

/// A disk-backed grading store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Next available record id, shared across all record tables.
    next_id: u64,
    /// Instance modification clock; newer stamps are strictly larger.
    clock: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_id", &self.next_id)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a grading database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BtecError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io)?;
            for table in ALL_RECORD_TABLES {
                let _ = write_txn.open_table(table).map_err(io)?;
            }
            let _ = write_txn.open_table(METADATA).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }

        let read_txn = db.begin_read().map_err(io)?;
        let (next_id, clock) = {
            let table = read_txn.open_table(METADATA).map_err(io)?;
            let next_id = table
                .get("next_id")
                .map_err(io)?
                .map(|v| v.value())
                .unwrap_or(0);
            let clock = table
                .get("clock")
                .map_err(io)?
                .map(|v| v.value())
                .unwrap_or(0);
            (next_id, clock)
        };

        Ok(Self { db, next_id, clock })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), BtecError> {
        self.db.compact().map_err(io)?;
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        self.next_id = self.next_id.saturating_add(1);
        self.next_id
    }

    fn tick(&mut self) -> u64 {
        self.clock = self.clock.saturating_add(1);
        self.clock
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        key: u64,
    ) -> Result<Option<T>, BtecError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;
        match table.get(key).map_err(io)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn scan_records<T: DeserializeOwned>(
        &self,
        table: RecordTable,
    ) -> Result<Vec<T>, BtecError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (_, bytes) = entry.map_err(io)?;
            records.push(decode(bytes.value())?);
        }
        Ok(records)
    }

    /// Write records and removals across any tables in one transaction,
    /// persisting the id counter and clock alongside.
    fn apply(
        &mut self,
        writes: &[(RecordTable, u64, Vec<u8>)],
        removals: &[(RecordTable, u64)],
    ) -> Result<(), BtecError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            for (table, key, bytes) in writes {
                let mut table = write_txn.open_table(*table).map_err(io)?;
                table.insert(*key, bytes.as_slice()).map_err(io)?;
            }
            for (table, key) in removals {
                let mut table = write_txn.open_table(*table).map_err(io)?;
                table.remove(*key).map_err(io)?;
            }
            let mut metadata = write_txn.open_table(METADATA).map_err(io)?;
            metadata.insert("next_id", self.next_id).map_err(io)?;
            metadata.insert("clock", self.clock).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn put_record<T: Serialize>(
        &mut self,
        table: RecordTable,
        key: u64,
        record: &T,
    ) -> Result<(), BtecError> {
        self.apply(&[(table, key, encode(record)?)], &[])
    }

    /// Re-stamp an instance after one of its fillings changed.
    fn touch(&mut self, instance: InstanceId) -> Result<(), BtecError> {
        let stamp = self.tick();
        if let Some(mut record) = self.get_record::<Instance>(INSTANCES, instance.0)? {
            record.modified = stamp;
            self.put_record(INSTANCES, instance.0, &record)?;
        }
        Ok(())
    }
}

impl GradingStore for RedbStore {
    fn create_definition(&mut self, modified_by: UserId) -> Result<DefinitionId, BtecError> {
        let id = DefinitionId(self.next_id());
        let record = Definition {
            id,
            name: String::new(),
            description: String::new(),
            status: DefinitionStatus::Draft,
            options: DisplayOptions::default(),
            modified_by,
        };
        self.put_record(DEFINITIONS, id.0, &record)?;
        Ok(id)
    }

    fn get_definition(&self, id: DefinitionId) -> Result<Option<Definition>, BtecError> {
        self.get_record(DEFINITIONS, id.0)
    }

    fn update_definition(
        &mut self,
        id: DefinitionId,
        patch: DefinitionPatch,
    ) -> Result<(), BtecError> {
        let mut record = self
            .get_record::<Definition>(DEFINITIONS, id.0)?
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
        self.put_record(DEFINITIONS, id.0, &record)
    }

    fn delete_definition(&mut self, id: DefinitionId) -> Result<(), BtecError> {
        if self.get_record::<Definition>(DEFINITIONS, id.0)?.is_none() {
            return Err(BtecError::DefinitionNotFound(id));
        }
        let mut removals = vec![(DEFINITIONS, id.0)];
        for criterion in self.scan_records::<Criterion>(CRITERIA)? {
            if criterion.definition == id {
                removals.push((CRITERIA, criterion.id.0));
            }
        }
        for comment in self.scan_records::<Comment>(COMMENTS)? {
            if comment.definition == id {
                removals.push((COMMENTS, comment.id.0));
            }
        }
        let doomed: Vec<InstanceId> = self
            .scan_records::<Instance>(INSTANCES)?
            .into_iter()
            .filter(|i| i.definition == id)
            .map(|i| i.id)
            .collect();
        for instance in &doomed {
            removals.push((INSTANCES, instance.0));
        }
        for filling in self.scan_records::<Filling>(FILLINGS)? {
            if doomed.contains(&filling.instance) {
                removals.push((FILLINGS, filling.id.0));
            }
        }
        self.apply(&[], &removals)
    }

    fn definitions(&self) -> Result<Vec<Definition>, BtecError> {
        self.scan_records(DEFINITIONS)
    }

    fn insert_criterion(
        &mut self,
        definition: DefinitionId,
        draft: CriterionDraft,
    ) -> Result<CriterionId, BtecError> {
        if self
            .get_record::<Definition>(DEFINITIONS, definition.0)?
            .is_none()
        {
            return Err(BtecError::DefinitionNotFound(definition));
        }
        let id = CriterionId(self.next_id());
        let record = Criterion {
            id,
            definition,
            shortname: draft.shortname,
            description: draft.description,
            marker_description: draft.marker_description,
            sort_order: draft.sort_order,
            max_score: draft.max_score,
        };
        self.put_record(CRITERIA, id.0, &record)?;
        Ok(id)
    }

    fn get_criterion(&self, id: CriterionId) -> Result<Option<Criterion>, BtecError> {
        self.get_record(CRITERIA, id.0)
    }

    fn update_criterion(
        &mut self,
        id: CriterionId,
        patch: CriterionPatch,
    ) -> Result<(), BtecError> {
        let mut record = self
            .get_record::<Criterion>(CRITERIA, id.0)?
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
        self.put_record(CRITERIA, id.0, &record)
    }

    fn delete_criteria(&mut self, ids: &[CriterionId]) -> Result<(), BtecError> {
        let mut removals = Vec::new();
        for id in ids {
            if self.get_record::<Criterion>(CRITERIA, id.0)?.is_some() {
                removals.push((CRITERIA, id.0));
            }
        }
        for filling in self.scan_records::<Filling>(FILLINGS)? {
            if ids.contains(&filling.criterion) {
                removals.push((FILLINGS, filling.id.0));
            }
        }
        self.apply(&[], &removals)
    }

    fn criteria(&self, definition: DefinitionId) -> Result<Vec<Criterion>, BtecError> {
        let mut out: Vec<Criterion> = self
            .scan_records::<Criterion>(CRITERIA)?
            .into_iter()
            .filter(|c| c.definition == definition)
            .collect();
        out.sort_by_key(|c| (c.sort_order, c.id));
        Ok(out)
    }

    fn insert_comment(
        &mut self,
        definition: DefinitionId,
        draft: CommentDraft,
    ) -> Result<CommentId, BtecError> {
        if self
            .get_record::<Definition>(DEFINITIONS, definition.0)?
            .is_none()
        {
            return Err(BtecError::DefinitionNotFound(definition));
        }
        let id = CommentId(self.next_id());
        let record = Comment {
            id,
            definition,
            description: draft.description,
            sort_order: draft.sort_order,
        };
        self.put_record(COMMENTS, id.0, &record)?;
        Ok(id)
    }

    fn update_comment(&mut self, id: CommentId, patch: CommentPatch) -> Result<(), BtecError> {
        let mut record = self
            .get_record::<Comment>(COMMENTS, id.0)?
            .ok_or(BtecError::CommentNotFound(id))?;
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(sort_order) = patch.sort_order {
            record.sort_order = sort_order;
        }
        self.put_record(COMMENTS, id.0, &record)
    }

    fn delete_comments(&mut self, ids: &[CommentId]) -> Result<(), BtecError> {
        let removals: Vec<(RecordTable, u64)> =
            ids.iter().map(|id| (COMMENTS, id.0)).collect();
        self.apply(&[], &removals)
    }

    fn comments(&self, definition: DefinitionId) -> Result<Vec<Comment>, BtecError> {
        let mut out: Vec<Comment> = self
            .scan_records::<Comment>(COMMENTS)?
            .into_iter()
            .filter(|c| c.definition == definition)
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
        if self
            .get_record::<Definition>(DEFINITIONS, definition.0)?
            .is_none()
        {
            return Err(BtecError::DefinitionNotFound(definition));
        }
        let id = InstanceId(self.next_id());
        let modified = self.tick();
        let record = Instance {
            id,
            definition,
            rater,
            item,
            status,
            modified,
        };
        self.put_record(INSTANCES, id.0, &record)?;
        Ok(id)
    }

    fn get_instance(&self, id: InstanceId) -> Result<Option<Instance>, BtecError> {
        self.get_record(INSTANCES, id.0)
    }

    fn instances_for(&self, rater: UserId, item: ItemId) -> Result<Vec<Instance>, BtecError> {
        let mut out: Vec<Instance> = self
            .scan_records::<Instance>(INSTANCES)?
            .into_iter()
            .filter(|i| i.rater == rater && i.item == item)
            .collect();
        out.sort_by(|a, b| (b.modified, b.id).cmp(&(a.modified, a.id)));
        Ok(out)
    }

    fn active_instances(&self, definition: DefinitionId) -> Result<Vec<Instance>, BtecError> {
        Ok(self
            .scan_records::<Instance>(INSTANCES)?
            .into_iter()
            .filter(|i| i.definition == definition && i.status == InstanceStatus::Active)
            .collect())
    }

    fn set_instance_status(
        &mut self,
        id: InstanceId,
        status: InstanceStatus,
    ) -> Result<(), BtecError> {
        let mut record = self
            .get_record::<Instance>(INSTANCES, id.0)?
            .ok_or(BtecError::InstanceNotFound(id))?;
        record.status = status;
        record.modified = self.tick();
        self.put_record(INSTANCES, id.0, &record)
    }

    fn delete_instance(&mut self, id: InstanceId) -> Result<(), BtecError> {
        if self.get_record::<Instance>(INSTANCES, id.0)?.is_none() {
            return Err(BtecError::InstanceNotFound(id));
        }
        let mut removals = vec![(INSTANCES, id.0)];
        for filling in self.scan_records::<Filling>(FILLINGS)? {
            if filling.instance == id {
                removals.push((FILLINGS, filling.id.0));
            }
        }
        self.apply(&[], &removals)
    }

    fn insert_filling(&mut self, draft: FillingDraft) -> Result<FillingId, BtecError> {
        if self
            .get_record::<Instance>(INSTANCES, draft.instance.0)?
            .is_none()
        {
            return Err(BtecError::InstanceNotFound(draft.instance));
        }
        let id = FillingId(self.next_id());
        let record = Filling {
            id,
            instance: draft.instance,
            criterion: draft.criterion,
            score: draft.score,
            remark: draft.remark,
        };
        self.put_record(FILLINGS, id.0, &record)?;
        self.touch(draft.instance)
            .map(|()| id)
    }

    fn update_filling(&mut self, id: FillingId, patch: FillingPatch) -> Result<(), BtecError> {
        let mut record = self
            .get_record::<Filling>(FILLINGS, id.0)?
            .ok_or(BtecError::FillingNotFound(id))?;
        if let Some(score) = patch.score {
            record.score = score;
        }
        if let Some(remark) = patch.remark {
            record.remark = remark;
        }
        let instance = record.instance;
        self.put_record(FILLINGS, id.0, &record)?;
        self.touch(instance)
    }

    fn delete_filling(&mut self, id: FillingId) -> Result<(), BtecError> {
        if let Some(record) = self.get_record::<Filling>(FILLINGS, id.0)? {
            self.apply(&[], &[(FILLINGS, id.0)])?;
            self.touch(record.instance)?;
        }
        Ok(())
    }

    fn fillings(&self, instance: InstanceId) -> Result<Vec<Filling>, BtecError> {
        let mut out: Vec<Filling> = self
            .scan_records::<Filling>(FILLINGS)?
            .into_iter()
            .filter(|f| f.instance == instance)
            .collect();
        out.sort_by_key(|f| (f.criterion, f.id));
        Ok(out)
    }

    fn get_prefs(&self, user: UserId) -> Result<MarkerPrefs, BtecError> {
        Ok(self
            .get_record::<MarkerPrefs>(PREFS, user.0)?
            .unwrap_or_default())
    }

    fn set_prefs(&mut self, user: UserId, prefs: MarkerPrefs) -> Result<(), BtecError> {
        self.put_record(PREFS, user.0, &prefs)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shortname;

    fn draft(shortname: &str, order: u32) -> CriterionDraft {
        CriterionDraft {
            shortname: Shortname::new(shortname),
            description: format!("{shortname} description"),
            marker_description: String::new(),
            sort_order: order,
            max_score: 1,
        }
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grading.redb");

        let definition = {
            let mut store = RedbStore::open(&path).expect("open");
            let definition = store.create_definition(UserId(1)).expect("definition");
            store
                .insert_criterion(definition, draft("P1", 1))
                .expect("criterion");
            store
                .update_definition(
                    definition,
                    DefinitionPatch {
                        name: Some("Unit 1".to_string()),
                        ..DefinitionPatch::default()
                    },
                )
                .expect("update");
            definition
        };

        let store = RedbStore::open(&path).expect("reopen");
        let record = store
            .get_definition(definition)
            .expect("get")
            .expect("present");
        assert_eq!(record.name, "Unit 1");
        let criteria = store.criteria(definition).expect("criteria");
        assert_eq!(criteria.len(), 1);
        assert_eq!(criteria[0].shortname.as_str(), "P1");
    }

    #[test]
    fn id_counter_resumes_after_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grading.redb");

        let first = {
            let mut store = RedbStore::open(&path).expect("open");
            store.create_definition(UserId(1)).expect("definition")
        };
        let second = {
            let mut store = RedbStore::open(&path).expect("reopen");
            store.create_definition(UserId(1)).expect("definition")
        };
        assert!(second.0 > first.0);
    }

    #[test]
    fn delete_definition_cascades() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grading.redb");
        let mut store = RedbStore::open(&path).expect("open");

        let definition = store.create_definition(UserId(1)).expect("definition");
        let criterion = store
            .insert_criterion(definition, draft("P1", 1))
            .expect("criterion");
        let instance = store
            .create_instance(definition, UserId(2), ItemId(3), InstanceStatus::Active)
            .expect("instance");
        store
            .insert_filling(FillingDraft {
                instance,
                criterion,
                score: 1,
                remark: String::new(),
            })
            .expect("filling");

        store.delete_definition(definition).expect("delete");
        assert!(store.get_criterion(criterion).expect("get").is_none());
        assert!(store.get_instance(instance).expect("get").is_none());
        assert!(store.fillings(instance).expect("list").is_empty());
    }

    #[test]
    fn filling_writes_advance_the_instance_stamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grading.redb");
        let mut store = RedbStore::open(&path).expect("open");

        let definition = store.create_definition(UserId(1)).expect("definition");
        let criterion = store
            .insert_criterion(definition, draft("P1", 1))
            .expect("criterion");
        let instance = store
            .create_instance(definition, UserId(2), ItemId(3), InstanceStatus::Incomplete)
            .expect("instance");
        let before = store
            .get_instance(instance)
            .expect("get")
            .expect("present")
            .modified;
        store
            .insert_filling(FillingDraft {
                instance,
                criterion,
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
    fn prefs_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grading.redb");
        let mut store = RedbStore::open(&path).expect("open");

        assert_eq!(
            store.get_prefs(UserId(9)).expect("get"),
            MarkerPrefs::default()
        );
        let prefs = MarkerPrefs {
            show_marker_desc: false,
            show_student_desc: false,
        };
        store.set_prefs(UserId(9), prefs).expect("set");
        assert_eq!(store.get_prefs(UserId(9)).expect("get"), prefs);
    }
}
