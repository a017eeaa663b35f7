//! Lazy loading of object data.
//!
//! Loading happens in batches. For each batch the transaction:
//! 1. notifies `ObjectsLoading` with the whole batch,
//! 2. fetches the batch in one round-trip (from the loader for a root
//!    transaction, from the parent for a sub-transaction),
//! 3. installs `Unchanged` for found objects and `Invalid` for the rest,
//! 4. notifies `ObjectsLoaded` with the objects that resolved.
//!
//! The batch step never fails for missing objects; it reports them, and the
//! entry point decides whether that is an error or a `false` result.

use crate::error::{CoreError, CoreResult};
use crate::event::TransactionEvent;
use crate::object::{DataRecord, ObjectId, ObjectState, PropertyMap};
use crate::transaction::Transaction;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Split of a request into what must be loaded and what is already invalid.
#[derive(Debug, Default)]
struct Partition {
    not_loaded: Vec<ObjectId>,
    invalid: Vec<ObjectId>,
}

/// Result of one load batch.
#[derive(Debug, Default)]
pub(crate) struct LoadOutcome {
    pub(crate) loaded: Vec<ObjectId>,
    pub(crate) not_found: Vec<ObjectId>,
}

impl Transaction {
    /// Makes the data of an object available, loading it if necessary.
    ///
    /// Calling this for an object whose data is already available does nothing
    /// and raises no notifications.
    ///
    /// # Errors
    ///
    /// - `InvalidObject` if the object is invalid in this transaction
    ///   (the loader is not consulted)
    /// - `ObjectsNotFound` if the loader has no record; the object is
    ///   `Invalid` afterwards
    pub fn ensure_data_available(&self, id: &ObjectId) -> CoreResult<()> {
        self.ensure_data_available_all(std::slice::from_ref(id))
    }

    /// Like [`ensure_data_available`](Self::ensure_data_available), but reports
    /// a missing or invalid object as `false`.
    ///
    /// # Errors
    ///
    /// Fails only if the transaction was discarded or the loader failed.
    pub fn try_ensure_data_available(&self, id: &ObjectId) -> CoreResult<bool> {
        self.try_ensure_data_available_all(std::slice::from_ref(id))
    }

    /// Makes the data of several objects available in one batch.
    ///
    /// Only the objects not loaded yet are loaded and notified. Every
    /// resolvable object is loaded even if others are missing.
    ///
    /// # Errors
    ///
    /// - `InvalidObject` for the first object already invalid (nothing is loaded)
    /// - `ObjectsNotFound` listing every missing object, raised after all
    ///   state transitions are applied
    pub fn ensure_data_available_all(&self, ids: &[ObjectId]) -> CoreResult<()> {
        self.check_usable()?;
        let partition = self.partition(ids);
        if let Some(id) = partition.invalid.into_iter().next() {
            return Err(CoreError::invalid_object(id));
        }
        if partition.not_loaded.is_empty() {
            return Ok(());
        }
        let outcome = self.load_batch(&partition.not_loaded)?;
        if outcome.not_found.is_empty() {
            Ok(())
        } else {
            Err(CoreError::objects_not_found(outcome.not_found))
        }
    }

    /// Batch form of [`try_ensure_data_available`](Self::try_ensure_data_available).
    ///
    /// Returns `true` only if every object is available afterwards.
    ///
    /// # Errors
    ///
    /// Fails only if the transaction was discarded or the loader failed.
    pub fn try_ensure_data_available_all(&self, ids: &[ObjectId]) -> CoreResult<bool> {
        self.check_usable()?;
        let partition = self.partition(ids);
        let mut all_resolved = partition.invalid.is_empty();
        if !partition.not_loaded.is_empty() {
            let outcome = self.load_batch(&partition.not_loaded)?;
            all_resolved &= outcome.not_found.is_empty();
        }
        Ok(all_resolved)
    }

    /// Sorts the request by state without enlisting anything.
    fn partition(&self, ids: &[ObjectId]) -> Partition {
        let mut seen = HashSet::new();
        let mut partition = Partition::default();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.state_internal(id) {
                ObjectState::NotLoadedYet => partition.not_loaded.push(id.clone()),
                ObjectState::Invalid => {
                    // Materialize a reflected parent state in this registry.
                    let mut state = self.lock();
                    if !state.registry.contains(id) {
                        state.registry.mark_invalid(id);
                    }
                    partition.invalid.push(id.clone());
                }
                _ => {}
            }
        }
        partition
    }

    /// Loads a batch of `NotLoadedYet` objects.
    pub(crate) fn load_batch(&self, ids: &[ObjectId]) -> CoreResult<LoadOutcome> {
        debug!(txn = %self.id(), count = ids.len(), "loading objects");
        {
            let mut state = self.lock();
            for id in ids {
                state.registry.enlist(id);
            }
        }
        self.notify(&TransactionEvent::ObjectsLoading { ids })?;

        let mut found = self.fetch(ids)?;
        let mut outcome = LoadOutcome::default();
        {
            let mut state = self.lock();
            for id in ids {
                match found.remove(id) {
                    Some(properties) => {
                        state.registry.install_loaded(id, properties);
                        outcome.loaded.push(id.clone());
                    }
                    None => {
                        state.registry.mark_invalid(id);
                        outcome.not_found.push(id.clone());
                    }
                }
            }
        }
        if !outcome.not_found.is_empty() {
            debug!(txn = %self.id(), missing = outcome.not_found.len(), "objects not found");
        }

        if !outcome.loaded.is_empty() {
            self.notify(&TransactionEvent::ObjectsLoaded {
                ids: &outcome.loaded,
            })?;
        }
        Ok(outcome)
    }

    /// One round-trip for a batch: the loader for roots, the parent otherwise.
    fn fetch(&self, ids: &[ObjectId]) -> CoreResult<HashMap<ObjectId, PropertyMap>> {
        if let Some(parent) = self.parent() {
            return parent.data_for_child(ids);
        }
        let loader = &self.inner.loader;
        let records: HashMap<ObjectId, DataRecord> = match ids {
            [single] => loader
                .load_object(single)?
                .into_iter()
                .map(|record| (single.clone(), record))
                .collect(),
            _ => loader.load_objects(ids)?,
        };
        let requested: HashSet<&ObjectId> = ids.iter().collect();
        Ok(records
            .into_iter()
            .filter(|(id, _)| requested.contains(id))
            .map(|(id, record)| (id, record.properties))
            .collect())
    }

    /// Materializes objects for a sub-transaction and returns their current data.
    ///
    /// Objects that are deleted or invalid here are not returned.
    fn data_for_child(&self, ids: &[ObjectId]) -> CoreResult<HashMap<ObjectId, PropertyMap>> {
        self.check_usable()?;
        let partition = self.partition(ids);
        if !partition.not_loaded.is_empty() {
            self.load_batch(&partition.not_loaded)?;
        }
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.registry.get(id))
            .filter(|record| {
                matches!(
                    record.state(),
                    ObjectState::New | ObjectState::Unchanged | ObjectState::Changed
                )
            })
            .map(|record| (record.id().clone(), record.current().clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::listener_fn;
    use crate::loader::MemoryLoader;
    use crate::object::{ClassId, PropertyValue};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use uuid::Uuid;

    fn id(n: u128) -> ObjectId {
        ObjectId::new(ClassId::new("Order"), Uuid::from_u128(n))
    }

    fn setup() -> (Arc<MemoryLoader>, Transaction, Arc<Mutex<Vec<String>>>) {
        let loader = Arc::new(MemoryLoader::with_records([
            DataRecord::new(id(1)).with("number", 1_i64),
            DataRecord::new(id(2)).with("number", 2_i64),
            DataRecord::new(id(3)).with("number", 3_i64),
        ]));
        let tx = Transaction::create_root(loader.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        tx.add_listener(listener_fn(move |_, event| {
            match event {
                TransactionEvent::ObjectsLoading { ids } => sink.lock().push(format!("loading {}", ids.len())),
                TransactionEvent::ObjectsLoaded { ids } => sink.lock().push(format!("loaded {}", ids.len())),
                _ => {}
            }
            Ok(())
        }))
        .unwrap();
        (loader, tx, log)
    }

    #[test]
    fn single_load_uses_single_round_trip() {
        let (loader, tx, log) = setup();
        tx.ensure_data_available(&id(1)).unwrap();
        assert_eq!(loader.single_calls(), 1);
        assert_eq!(loader.batch_calls(), 0);
        assert_eq!(*log.lock(), vec!["loading 1", "loaded 1"]);
    }

    #[test]
    fn batch_load_uses_one_round_trip() {
        let (loader, tx, log) = setup();
        tx.ensure_data_available_all(&[id(1), id(2), id(3)]).unwrap();
        assert_eq!(loader.total_calls(), 1);
        assert_eq!(loader.batch_calls(), 1);
        assert_eq!(*log.lock(), vec!["loading 3", "loaded 3"]);
    }

    #[test]
    fn duplicate_ids_are_loaded_once() {
        let (loader, tx, log) = setup();
        tx.ensure_data_available_all(&[id(1), id(1)]).unwrap();
        assert_eq!(loader.single_calls(), 1);
        assert_eq!(*log.lock(), vec!["loading 1", "loaded 1"]);
    }

    #[test]
    fn second_ensure_is_silent() {
        let (loader, tx, log) = setup();
        tx.ensure_data_available(&id(1)).unwrap();
        tx.ensure_data_available(&id(1)).unwrap();
        tx.ensure_data_available_all(&[id(1)]).unwrap();
        assert_eq!(loader.total_calls(), 1);
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn missing_object_becomes_invalid_and_raises() {
        let (_, tx, log) = setup();
        let err = tx.ensure_data_available(&id(9)).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Object(s) could not be found: '{}'.", id(9))
        );
        assert_eq!(tx.state(&id(9)).unwrap(), ObjectState::Invalid);
        // nothing resolved, so no loaded event
        assert_eq!(*log.lock(), vec!["loading 1"]);
    }

    #[test]
    fn invalid_object_fails_without_loader() {
        let (loader, tx, _) = setup();
        assert!(!tx.try_ensure_data_available(&id(9)).unwrap());
        let calls = loader.total_calls();
        let err = tx.ensure_data_available(&id(9)).unwrap_err();
        assert_eq!(err, CoreError::invalid_object(id(9)));
        assert!(!tx.try_ensure_data_available(&id(9)).unwrap());
        assert_eq!(loader.total_calls(), calls);
    }

    #[test]
    fn strict_batch_reports_every_missing_id_sorted() {
        let (_, tx, _) = setup();
        let err = tx
            .ensure_data_available_all(&[id(8), id(1), id(7)])
            .unwrap_err();
        assert_eq!(err, CoreError::ObjectsNotFound { ids: vec![id(7), id(8)] });
        assert_eq!(tx.state(&id(1)).unwrap(), ObjectState::Unchanged);
        assert_eq!(tx.state(&id(7)).unwrap(), ObjectState::Invalid);
    }

    #[test]
    fn strict_batch_with_invalid_id_enlists_nothing() {
        let (loader, tx, log) = setup();
        assert!(!tx.try_ensure_data_available(&id(9)).unwrap());
        log.lock().clear();
        let calls = loader.total_calls();

        let err = tx
            .ensure_data_available_all(&[id(1), id(9), id(2)])
            .unwrap_err();
        assert_eq!(err, CoreError::invalid_object(id(9)));
        assert!(!tx.is_enlisted(&id(1)).unwrap());
        assert!(!tx.is_enlisted(&id(2)).unwrap());
        assert_eq!(tx.enlisted_ids().unwrap(), vec![id(9)]);
        assert_eq!(loader.total_calls(), calls);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn loader_extras_outside_the_batch_are_ignored() {
        struct Generous;
        impl crate::loader::ObjectLoader for Generous {
            fn load_object(&self, id: &ObjectId) -> CoreResult<Option<DataRecord>> {
                Ok(Some(DataRecord::new(id.clone())))
            }
            fn load_objects(&self, ids: &[ObjectId]) -> CoreResult<HashMap<ObjectId, DataRecord>> {
                Ok(ids
                    .iter()
                    .chain([id(50)].iter())
                    .map(|id| (id.clone(), DataRecord::new(id.clone())))
                    .collect())
            }
        }
        let tx = Transaction::create_root(Arc::new(Generous));
        tx.ensure_data_available_all(&[id(1), id(2)]).unwrap();
        assert_eq!(tx.enlisted_ids().unwrap(), vec![id(1), id(2)]);
        assert!(!tx.is_enlisted(&id(50)).unwrap());
    }

    #[test]
    fn try_batch_loads_resolvable_ids() {
        let (_, tx, log) = setup();
        assert!(!tx.try_ensure_data_available_all(&[id(9), id(2)]).unwrap());
        assert_eq!(tx.state(&id(2)).unwrap(), ObjectState::Unchanged);
        assert_eq!(tx.state(&id(9)).unwrap(), ObjectState::Invalid);
        assert_eq!(*log.lock(), vec!["loading 2", "loaded 1"]);
    }

    #[test]
    fn try_batch_all_resolved() {
        let (_, tx, _) = setup();
        assert!(tx.try_ensure_data_available_all(&[id(1), id(2)]).unwrap());
    }

    #[test]
    fn mixed_batch_loads_only_missing_subset() {
        let (loader, tx, log) = setup();
        tx.ensure_data_available(&id(1)).unwrap();
        log.lock().clear();
        tx.ensure_data_available_all(&[id(1), id(2), id(3)]).unwrap();
        assert_eq!(*log.lock(), vec!["loading 2", "loaded 2"]);
        assert_eq!(loader.total_calls(), 2);
    }

    #[test]
    fn child_loads_through_parent_in_one_batch() {
        let (loader, root, _) = setup();
        let child = root.create_sub_transaction().unwrap();
        child.ensure_data_available_all(&[id(1), id(2)]).unwrap();
        assert_eq!(loader.total_calls(), 1);
        assert_eq!(root.state(&id(1)).unwrap(), ObjectState::Unchanged);
        assert_eq!(child.state(&id(2)).unwrap(), ObjectState::Unchanged);
    }

    #[test]
    fn child_sees_parent_changes_as_unchanged_data() {
        let (_, root, _) = setup();
        root.set_value(&id(1), "number", 10_i64).unwrap();
        let child = root.create_sub_transaction().unwrap();
        assert_eq!(child.value(&id(1), "number").unwrap(), Some(PropertyValue::Integer(10)));
        assert_eq!(child.state(&id(1)).unwrap(), ObjectState::Unchanged);
    }

    #[test]
    fn loader_errors_propagate() {
        struct Failing;
        impl crate::loader::ObjectLoader for Failing {
            fn load_object(&self, _id: &ObjectId) -> CoreResult<Option<DataRecord>> {
                Err(CoreError::loader("backend offline"))
            }
            fn load_objects(&self, _ids: &[ObjectId]) -> CoreResult<HashMap<ObjectId, DataRecord>> {
                Err(CoreError::loader("backend offline"))
            }
        }
        let tx = Transaction::create_root(Arc::new(Failing));
        let err = tx.ensure_data_available(&id(1)).unwrap_err();
        assert!(matches!(err, CoreError::Loader { .. }));
        assert!(tx.try_ensure_data_available(&id(1)).is_err());
    }
}
