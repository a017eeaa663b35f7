//! Commit and rollback notification chain.
//!
//! Both operations run in rounds over a working set. The first round covers
//! every `New`, `Changed` or `Deleted` object. Observers may enlarge the
//! affected set while a round runs (by changing another object or
//! registering it for commit); each object that was not notified before gets
//! one further round. An object is notified at most once per operation, so
//! re-adding an object already notified never causes another round.
//!
//! Rounds are not capped: observers that keep adding new objects keep the
//! chain running.
//!
//! After the last round the state transitions are applied and the
//! end-of-operation events are dispatched for the settled objects.

use crate::error::CoreResult;
use crate::event::{CommittingEventRegistrar, ObjectEvent, TransactionEvent};
use crate::object::{ObjectId, ObjectState};
use crate::registry::{ObjectRecord, Settled};
use crate::transaction::Transaction;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Commit,
    Rollback,
}

impl Transaction {
    /// Commits the transaction.
    ///
    /// A root transaction settles its objects in place: `New` and `Changed`
    /// objects become `Unchanged` with their current data as the new
    /// original, `Deleted` objects become `Invalid`. A sub-transaction
    /// additionally pushes its changes into the parent first.
    ///
    /// The transaction stays usable after commit.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is read-only or was discarded, or if an
    /// observer fails. An observer failure leaves the objects in whatever
    /// state the chain reached.
    pub fn commit(&self) -> CoreResult<()> {
        self.check_writeable()?;
        let registrar = CommittingEventRegistrar::new(self.clone());
        let visited = self.run_rounds(Phase::Commit, &registrar)?;

        if let Some(parent) = self.parent() {
            let changes: Vec<ObjectRecord> = {
                let state = self.lock();
                visited
                    .iter()
                    .filter_map(|id| state.registry.get(id))
                    .filter(|record| record.state().is_affected())
                    .cloned()
                    .collect()
            };
            let mut parent_state = parent.lock();
            for record in &changes {
                parent_state.registry.merge_child(record);
            }
            debug!(txn = %self.id(), parent = %parent.id(), count = changes.len(), "pushed changes to parent");
        }

        let settled = self.lock().registry.finalize_commit(&visited);
        self.dispatch_settled(Phase::Commit, &settled)
    }

    /// Rolls the transaction back.
    ///
    /// `Changed` objects revert to their original data and become
    /// `Unchanged`; `New` and `Deleted` objects become `Invalid`. New
    /// objects receive no rolled-back event.
    ///
    /// The transaction stays usable after rollback.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is read-only or was discarded, or if an
    /// observer fails. An observer failure leaves the objects in whatever
    /// state the chain reached.
    pub fn rollback(&self) -> CoreResult<()> {
        self.check_writeable()?;
        let registrar = CommittingEventRegistrar::new(self.clone());
        let visited = self.run_rounds(Phase::Rollback, &registrar)?;
        let settled = self.lock().registry.finalize_rollback(&visited);
        if !settled.discarded.is_empty() {
            debug!(txn = %self.id(), count = settled.discarded.len(), "discarded new objects");
        }
        self.dispatch_settled(Phase::Rollback, &settled)
    }

    /// Runs notification rounds until no unnotified object is affected.
    ///
    /// Returns every object of every round, in first-appearance order.
    fn run_rounds(
        &self,
        phase: Phase,
        registrar: &CommittingEventRegistrar,
    ) -> CoreResult<Vec<ObjectId>> {
        let mut notified: HashSet<ObjectId> = HashSet::new();
        let mut visited: Vec<ObjectId> = Vec::new();
        let mut pending = self.lock().registry.affected_ids();
        let mut round = 0_usize;

        loop {
            round += 1;
            debug!(txn = %self.id(), ?phase, round, count = pending.len(), "notification round");
            for id in &pending {
                notified.insert(id.clone());
            }
            visited.extend(pending.iter().cloned());

            for id in &pending {
                // Objects invalidated earlier in the chain are skipped.
                if self.state_internal(id) == ObjectState::Invalid {
                    continue;
                }
                let event = match phase {
                    Phase::Commit => ObjectEvent::Committing { registrar },
                    Phase::Rollback => ObjectEvent::RollingBack,
                };
                for handler in self.handlers_for(id) {
                    handler.on_object_event(self, id, &event)?;
                }
            }

            let live: Vec<ObjectId> = pending
                .iter()
                .filter(|id| self.state_internal(id) != ObjectState::Invalid)
                .cloned()
                .collect();
            match phase {
                Phase::Commit => self.notify(&TransactionEvent::Committing {
                    ids: &live,
                    registrar,
                })?,
                Phase::Rollback => self.notify(&TransactionEvent::RollingBack { ids: &live })?,
            }

            pending = self
                .lock()
                .registry
                .affected_ids()
                .into_iter()
                .filter(|id| !notified.contains(id))
                .collect();
            if pending.is_empty() {
                break;
            }
        }
        Ok(visited)
    }

    fn dispatch_settled(&self, phase: Phase, settled: &Settled) -> CoreResult<()> {
        let event = match phase {
            Phase::Commit => ObjectEvent::Committed,
            Phase::Rollback => ObjectEvent::RolledBack,
        };
        for id in &settled.notified {
            for handler in self.handlers_for(id) {
                handler.on_object_event(self, id, &event)?;
            }
        }
        match phase {
            Phase::Commit => self.notify(&TransactionEvent::Committed),
            Phase::Rollback => self.notify(&TransactionEvent::RolledBack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::event::{handler_fn, listener_fn};
    use crate::loader::MemoryLoader;
    use crate::object::{ClassId, DataRecord, PropertyValue};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use uuid::Uuid;

    fn id(n: u128) -> ObjectId {
        ObjectId::new(ClassId::new("Order"), Uuid::from_u128(n))
    }

    fn setup() -> Transaction {
        let loader = Arc::new(MemoryLoader::with_records([
            DataRecord::new(id(1)).with("number", 1_i64),
            DataRecord::new(id(2)).with("number", 2_i64),
            DataRecord::new(id(3)).with("number", 3_i64),
        ]));
        Transaction::create_root(loader)
    }

    fn record_events(tx: &Transaction) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        tx.add_listener(listener_fn(move |_, event| {
            let line = match event {
                TransactionEvent::RollingBack { ids } => format!("rolling back {}", ids.len()),
                TransactionEvent::RolledBack => "rolled back".to_owned(),
                TransactionEvent::Committing { ids, .. } => format!("committing {}", ids.len()),
                TransactionEvent::Committed => "committed".to_owned(),
                _ => return Ok(()),
            };
            sink.lock().push(line);
            Ok(())
        }))
        .unwrap();
        log
    }

    #[test]
    fn rollback_reverts_changed_object() {
        let tx = setup();
        tx.set_value(&id(1), "number", 10_i64).unwrap();
        tx.rollback().unwrap();
        assert!(!tx.has_changed(&id(1)).unwrap());
        assert_eq!(tx.value(&id(1), "number").unwrap(), Some(PropertyValue::Integer(1)));
    }

    #[test]
    fn commit_settles_new_and_deleted() {
        let tx = setup();
        let new_id = tx.new_object(ClassId::new("Order")).unwrap();
        tx.set_value(&new_id, "number", 4_i64).unwrap();
        tx.delete_object(&id(2)).unwrap();
        tx.commit().unwrap();
        assert_eq!(tx.state(&new_id).unwrap(), ObjectState::Unchanged);
        assert_eq!(tx.state(&id(2)).unwrap(), ObjectState::Invalid);
        assert!(!tx.has_changes().unwrap());
    }

    #[test]
    fn commit_makes_current_data_original() {
        let tx = setup();
        tx.set_value(&id(1), "number", 10_i64).unwrap();
        tx.commit().unwrap();
        assert_eq!(
            tx.original_value(&id(1), "number").unwrap(),
            Some(PropertyValue::Integer(10))
        );
        tx.rollback().unwrap();
        assert_eq!(tx.value(&id(1), "number").unwrap(), Some(PropertyValue::Integer(10)));
    }

    #[test]
    fn empty_commit_still_notifies_once() {
        let tx = setup();
        let log = record_events(&tx);
        tx.commit().unwrap();
        assert_eq!(*log.lock(), vec!["committing 0", "committed"]);
    }

    #[test]
    fn handler_enlarging_rollback_gets_one_extra_round() {
        let tx = setup();
        tx.ensure_data_available_all(&[id(1), id(2)]).unwrap();
        tx.set_value(&id(1), "number", 10_i64).unwrap();
        let log = record_events(&tx);

        let second = id(2);
        tx.subscribe_object(
            &id(1),
            handler_fn(move |tx, _, event| {
                if matches!(event, ObjectEvent::RollingBack) {
                    tx.register_for_commit(&second)?;
                }
                Ok(())
            }),
        )
        .unwrap();
        let again = id(2);
        tx.subscribe_object(
            &id(2),
            handler_fn(move |tx, _, event| {
                if matches!(event, ObjectEvent::RollingBack) {
                    tx.register_for_commit(&again)?;
                }
                Ok(())
            }),
        )
        .unwrap();

        tx.rollback().unwrap();
        assert_eq!(
            *log.lock(),
            vec!["rolling back 1", "rolling back 1", "rolled back"]
        );
        assert_eq!(tx.state(&id(2)).unwrap(), ObjectState::Unchanged);
    }

    #[test]
    fn new_object_discarded_mid_chain_is_skipped() {
        let tx = setup();
        let first = tx.new_object(ClassId::new("Order")).unwrap();
        let second = tx.new_object(ClassId::new("Order")).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let victim = second.clone();
        tx.subscribe_object(
            &first,
            handler_fn(move |tx, _, event| {
                if matches!(event, ObjectEvent::RollingBack) {
                    tx.delete_object(&victim)?;
                }
                Ok(())
            }),
        )
        .unwrap();
        let sink = Arc::clone(&seen);
        tx.subscribe_object(
            &second,
            handler_fn(move |_, _, _| {
                sink.lock().push("second notified");
                Ok(())
            }),
        )
        .unwrap();

        tx.rollback().unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(tx.state(&first).unwrap(), ObjectState::Invalid);
        assert_eq!(tx.state(&second).unwrap(), ObjectState::Invalid);
    }

    #[test]
    fn handler_error_aborts_commit() {
        let tx = setup();
        tx.set_value(&id(1), "number", 10_i64).unwrap();
        tx.subscribe_object(
            &id(1),
            handler_fn(|_, _, event| match event {
                ObjectEvent::Committing { .. } => Err(CoreError::vetoed("not today")),
                _ => Ok(()),
            }),
        )
        .unwrap();
        assert!(matches!(tx.commit().unwrap_err(), CoreError::Vetoed { .. }));
        assert_eq!(tx.state(&id(1)).unwrap(), ObjectState::Changed);
    }

    #[test]
    fn sub_transaction_commit_pushes_into_parent() {
        let root = setup();
        root.ensure_data_available_all(&[id(1), id(2)]).unwrap();
        let child = root.create_sub_transaction().unwrap();
        child.set_value(&id(1), "number", 11_i64).unwrap();
        child.delete_object(&id(2)).unwrap();
        let new_id = child.new_object(ClassId::new("Order")).unwrap();
        child.commit().unwrap();

        assert_eq!(child.state(&id(1)).unwrap(), ObjectState::Unchanged);
        child.discard();

        assert_eq!(root.state(&id(1)).unwrap(), ObjectState::Changed);
        assert_eq!(root.value(&id(1), "number").unwrap(), Some(PropertyValue::Integer(11)));
        assert_eq!(root.state(&id(2)).unwrap(), ObjectState::Deleted);
        assert_eq!(root.state(&new_id).unwrap(), ObjectState::New);

        root.rollback().unwrap();
        assert_eq!(root.value(&id(1), "number").unwrap(), Some(PropertyValue::Integer(1)));
    }

    #[test]
    fn read_only_parent_cannot_commit() {
        let root = setup();
        let _child = root.create_sub_transaction().unwrap();
        assert!(matches!(
            root.commit().unwrap_err(),
            CoreError::InvalidOperation { .. }
        ));
        assert!(root.rollback().is_err());
    }
}
