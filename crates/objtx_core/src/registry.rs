//! Per-transaction state registry.
//!
//! The registry maps each enlisted object to the record that holds its state
//! and property snapshots. It owns the object state machine: every transition
//! goes through one of the methods below, which reject transitions the
//! machine does not allow.

use crate::error::{CoreError, CoreResult};
use crate::object::{ObjectId, ObjectState, PropertyMap, PropertyValue};
use std::collections::HashMap;

/// State and data of one object within one transaction.
#[derive(Debug, Clone)]
pub(crate) struct ObjectRecord {
    id: ObjectId,
    state: ObjectState,
    original: PropertyMap,
    current: PropertyMap,
    registered_for_commit: bool,
    enlisted_seq: u64,
}

impl ObjectRecord {
    pub(crate) fn id(&self) -> &ObjectId {
        &self.id
    }

    pub(crate) fn state(&self) -> ObjectState {
        self.state
    }

    pub(crate) fn original(&self) -> &PropertyMap {
        &self.original
    }

    pub(crate) fn current(&self) -> &PropertyMap {
        &self.current
    }

    pub(crate) fn is_registered_for_commit(&self) -> bool {
        self.registered_for_commit
    }

    /// Recomputes `Unchanged`/`Changed` from the snapshots.
    fn refresh_changed(&mut self) {
        if matches!(self.state, ObjectState::Unchanged | ObjectState::Changed) {
            self.state = if self.registered_for_commit || self.current != self.original {
                ObjectState::Changed
            } else {
                ObjectState::Unchanged
            };
        }
    }
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteOutcome {
    /// The object was marked `Deleted`.
    Deleted,
    /// The object was `New` and has been discarded (`Invalid`).
    Discarded,
    /// The object was already deleted.
    AlreadyDeleted,
}

/// How a commit or rollback settled an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settled {
    /// Objects that receive an end-of-operation notification, in visit order.
    pub(crate) notified: Vec<ObjectId>,
    /// New objects discarded by a rollback.
    pub(crate) discarded: Vec<ObjectId>,
}

/// Identifier → record map for one transaction.
#[derive(Debug, Default)]
pub(crate) struct StateRegistry {
    records: HashMap<ObjectId, ObjectRecord>,
    next_seq: u64,
}

impl StateRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: &ObjectId) -> Option<&ObjectRecord> {
        self.records.get(id)
    }

    pub(crate) fn state_of(&self, id: &ObjectId) -> Option<ObjectState> {
        self.records.get(id).map(ObjectRecord::state)
    }

    pub(crate) fn contains(&self, id: &ObjectId) -> bool {
        self.records.contains_key(id)
    }

    fn insert(&mut self, id: ObjectId, state: ObjectState, data: PropertyMap) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let original = if state == ObjectState::New {
            PropertyMap::new()
        } else {
            data.clone()
        };
        self.records.insert(
            id.clone(),
            ObjectRecord {
                id,
                state,
                original,
                current: data,
                registered_for_commit: false,
                enlisted_seq: seq,
            },
        );
    }

    fn record_mut(&mut self, id: &ObjectId) -> CoreResult<&mut ObjectRecord> {
        self.records
            .get_mut(id)
            .ok_or_else(|| CoreError::invalid_operation(format!("object '{id}' is not enlisted")))
    }

    /// Enlists an identifier as `NotLoadedYet` unless it is already known.
    pub(crate) fn enlist(&mut self, id: &ObjectId) {
        if !self.records.contains_key(id) {
            self.insert(id.clone(), ObjectState::NotLoadedYet, PropertyMap::new());
        }
    }

    /// Installs loaded data; only `NotLoadedYet` (or unknown) records change.
    pub(crate) fn install_loaded(&mut self, id: &ObjectId, data: PropertyMap) {
        match self.records.get_mut(id) {
            Some(record) if record.state == ObjectState::NotLoadedYet => {
                record.original = data.clone();
                record.current = data;
                record.state = ObjectState::Unchanged;
            }
            Some(_) => {}
            None => self.insert(id.clone(), ObjectState::Unchanged, data),
        }
    }

    /// Registers a newly created object.
    pub(crate) fn insert_new(&mut self, id: ObjectId, data: PropertyMap) -> CoreResult<()> {
        if self.records.contains_key(&id) {
            return Err(CoreError::invalid_operation(format!(
                "object '{id}' is already enlisted"
            )));
        }
        self.insert(id, ObjectState::New, data);
        Ok(())
    }

    /// Moves an object to the terminal `Invalid` state.
    ///
    /// The commit registration is cleared so the object cannot appear in a
    /// later working set.
    pub(crate) fn mark_invalid(&mut self, id: &ObjectId) {
        match self.records.get_mut(id) {
            Some(record) => {
                record.state = ObjectState::Invalid;
                record.registered_for_commit = false;
            }
            None => self.insert(id.clone(), ObjectState::Invalid, PropertyMap::new()),
        }
    }

    fn require_writable(record: &ObjectRecord) -> CoreResult<()> {
        match record.state {
            ObjectState::Invalid => Err(CoreError::invalid_object(record.id.clone())),
            ObjectState::Deleted => Err(CoreError::ObjectDeleted {
                id: record.id.clone(),
            }),
            ObjectState::NotLoadedYet => Err(CoreError::invalid_operation(format!(
                "object '{}' is not loaded",
                record.id
            ))),
            ObjectState::New | ObjectState::Unchanged | ObjectState::Changed => Ok(()),
        }
    }

    /// Sets a property value, returning the previous value.
    pub(crate) fn set_value(
        &mut self,
        id: &ObjectId,
        name: &str,
        value: PropertyValue,
    ) -> CoreResult<Option<PropertyValue>> {
        let record = self.record_mut(id)?;
        Self::require_writable(record)?;
        let old = record.current.insert(name.to_owned(), value);
        record.refresh_changed();
        Ok(old)
    }

    /// Marks an object for deletion.
    pub(crate) fn mark_deleted(&mut self, id: &ObjectId) -> CoreResult<DeleteOutcome> {
        let record = self.record_mut(id)?;
        match record.state {
            ObjectState::New => {
                record.state = ObjectState::Invalid;
                record.registered_for_commit = false;
                Ok(DeleteOutcome::Discarded)
            }
            ObjectState::Unchanged | ObjectState::Changed => {
                record.state = ObjectState::Deleted;
                Ok(DeleteOutcome::Deleted)
            }
            ObjectState::Deleted => Ok(DeleteOutcome::AlreadyDeleted),
            ObjectState::Invalid => Err(CoreError::invalid_object(id.clone())),
            ObjectState::NotLoadedYet => Err(CoreError::invalid_operation(format!(
                "object '{id}' is not loaded"
            ))),
        }
    }

    /// Marks an unchanged object as taking part in the next commit.
    pub(crate) fn register_for_commit(&mut self, id: &ObjectId) -> CoreResult<()> {
        let record = self.record_mut(id)?;
        Self::require_writable(record)?;
        if record.state != ObjectState::New {
            record.registered_for_commit = true;
            record.refresh_changed();
        }
        Ok(())
    }

    /// All objects in `New`, `Changed` or `Deleted` state, in enlistment order.
    pub(crate) fn affected_ids(&self) -> Vec<ObjectId> {
        let mut affected: Vec<&ObjectRecord> = self
            .records
            .values()
            .filter(|r| r.state.is_affected())
            .collect();
        affected.sort_by_key(|r| r.enlisted_seq);
        affected.into_iter().map(|r| r.id.clone()).collect()
    }

    /// All enlisted identifiers, in enlistment order.
    pub(crate) fn enlisted_ids(&self) -> Vec<ObjectId> {
        let mut all: Vec<&ObjectRecord> = self.records.values().collect();
        all.sort_by_key(|r| r.enlisted_seq);
        all.into_iter().map(|r| r.id.clone()).collect()
    }

    /// Applies commit transitions to the visited objects.
    pub(crate) fn finalize_commit(&mut self, visited: &[ObjectId]) -> Settled {
        let mut notified = Vec::new();
        for id in visited {
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            match record.state {
                ObjectState::New | ObjectState::Changed => {
                    record.original = record.current.clone();
                    record.registered_for_commit = false;
                    record.state = ObjectState::Unchanged;
                    notified.push(id.clone());
                }
                ObjectState::Deleted => {
                    record.registered_for_commit = false;
                    record.state = ObjectState::Invalid;
                    notified.push(id.clone());
                }
                _ => {}
            }
        }
        Settled {
            notified,
            discarded: Vec::new(),
        }
    }

    /// Applies rollback transitions to the visited objects.
    pub(crate) fn finalize_rollback(&mut self, visited: &[ObjectId]) -> Settled {
        let mut notified = Vec::new();
        let mut discarded = Vec::new();
        for id in visited {
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            match record.state {
                ObjectState::New => {
                    record.state = ObjectState::Invalid;
                    record.registered_for_commit = false;
                    discarded.push(id.clone());
                }
                ObjectState::Changed => {
                    record.current = record.original.clone();
                    record.registered_for_commit = false;
                    record.state = ObjectState::Unchanged;
                    notified.push(id.clone());
                }
                ObjectState::Deleted => {
                    record.registered_for_commit = false;
                    record.state = ObjectState::Invalid;
                    notified.push(id.clone());
                }
                _ => {}
            }
        }
        Settled {
            notified,
            discarded,
        }
    }

    /// Pulls a committed sub-transaction change into this registry.
    pub(crate) fn merge_child(&mut self, child: &ObjectRecord) {
        let id = child.id();
        match child.state() {
            ObjectState::New => {
                if !self.records.contains_key(id) {
                    self.insert(id.clone(), ObjectState::New, child.current().clone());
                }
            }
            ObjectState::Changed => {
                if let Some(record) = self.records.get_mut(id) {
                    record.current = child.current().clone();
                    if child.is_registered_for_commit() {
                        record.registered_for_commit = true;
                    }
                    record.refresh_changed();
                }
            }
            ObjectState::Deleted => {
                if let Some(record) = self.records.get_mut(id) {
                    record.state = if record.state == ObjectState::New {
                        ObjectState::Invalid
                    } else {
                        ObjectState::Deleted
                    };
                    record.registered_for_commit = false;
                }
            }
            _ => {}
        }
    }
}
