//! Commit and rollback notification rounds.

use objtx_core::{
    handler_fn, listener_fn, ClassId, CoreError, EventKind, ObjectEvent, ObjectId, ObjectState,
    PropertyValue, TransactionEvent,
};
use objtx_testkit::{init_tracing, order_id, HandlerCall, RecordingHandler, RecordingListener, TestStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn order_class() -> ClassId {
    ClassId::new("Order")
}

#[test]
fn rollback_reverts_changed_object() {
    init_tracing();
    let store = TestStore::with_orders(2);
    store.set_value(&order_id(1), "number", 42_i64).unwrap();
    assert!(store.has_changed(&order_id(1)).unwrap());

    store.rollback().unwrap();
    assert!(!store.has_changed(&order_id(1)).unwrap());
    assert_eq!(
        store.value(&order_id(1), "number").unwrap(),
        Some(PropertyValue::Integer(1))
    );
}

#[test]
fn reiteration_happens_exactly_once() {
    init_tracing();
    let store = TestStore::with_orders(3);
    store
        .ensure_data_available_all(&[order_id(1), order_id(2)])
        .unwrap();
    store.set_value(&order_id(1), "number", 11_i64).unwrap();

    let recorder = RecordingListener::new();
    store.add_listener(recorder.clone()).unwrap();
    let handler = RecordingHandler::new();
    handler.watch(&store, &[order_id(1), order_id(2)]).unwrap();

    // Every round re-registers the second order; only the first time counts.
    let second = order_id(2);
    store
        .add_listener(listener_fn(move |tx, event| {
            if let TransactionEvent::RollingBack { .. } = event {
                tx.register_for_commit(&second)?;
            }
            Ok(())
        }))
        .unwrap();

    store.rollback().unwrap();

    assert_eq!(
        recorder.rounds(EventKind::RollingBack),
        vec![vec![order_id(1)], vec![order_id(2)]]
    );
    assert_eq!(recorder.count(EventKind::RolledBack), 1);
    assert_eq!(
        handler.calls(),
        vec![
            (order_id(1), HandlerCall::RollingBack),
            (order_id(2), HandlerCall::RollingBack),
            (order_id(1), HandlerCall::RolledBack),
            (order_id(2), HandlerCall::RolledBack),
        ]
    );
    assert_eq!(store.state(&order_id(2)).unwrap(), ObjectState::Unchanged);
}

#[test]
fn discarded_new_object_is_skipped() {
    init_tracing();
    let store = TestStore::with_orders(0);
    let owner = store.new_object(order_class()).unwrap();
    let dependent = store.new_object(order_class()).unwrap();

    let victim = dependent.clone();
    store
        .subscribe_object(
            &owner,
            handler_fn(move |tx, _, event| {
                if let ObjectEvent::RollingBack = event {
                    tx.delete_object(&victim)?;
                }
                Ok(())
            }),
        )
        .unwrap();
    let handler = RecordingHandler::new();
    handler.watch(&store, &[dependent.clone()]).unwrap();

    store.rollback().unwrap();

    assert!(handler.calls().is_empty());
    assert_eq!(store.state(&owner).unwrap(), ObjectState::Invalid);
    assert_eq!(store.state(&dependent).unwrap(), ObjectState::Invalid);
}

#[test]
fn new_objects_get_no_rolled_back_event() {
    let store = TestStore::with_orders(1);
    let created = store.new_object(order_class()).unwrap();
    store.set_value(&order_id(1), "number", 5_i64).unwrap();
    let handler = RecordingHandler::new();
    handler.watch(&store, &[created.clone(), order_id(1)]).unwrap();

    store.rollback().unwrap();
    assert_eq!(handler.calls_for(&created), vec![HandlerCall::RollingBack]);
    assert_eq!(
        handler.calls_for(&order_id(1)),
        vec![HandlerCall::RollingBack, HandlerCall::RolledBack]
    );
}

#[test]
fn commit_settles_deleted_and_new_objects() {
    let store = TestStore::with_orders(2);
    let created = store
        .new_object_with(
            order_class(),
            [("number".to_owned(), PropertyValue::Integer(3))]
                .into_iter()
                .collect(),
        )
        .unwrap();
    store.delete_object(&order_id(2)).unwrap();
    let handler = RecordingHandler::new();
    handler.watch(&store, &[created.clone(), order_id(2)]).unwrap();

    store.commit().unwrap();

    assert_eq!(store.state(&created).unwrap(), ObjectState::Unchanged);
    assert_eq!(store.state(&order_id(2)).unwrap(), ObjectState::Invalid);
    assert_eq!(
        handler.calls_for(&created),
        vec![HandlerCall::Committing, HandlerCall::Committed]
    );
    assert_eq!(
        handler.calls_for(&order_id(2)),
        vec![HandlerCall::Committing, HandlerCall::Committed]
    );
    assert!(matches!(
        store.value(&order_id(2), "number").unwrap_err(),
        CoreError::InvalidObject { .. }
    ));
}

#[test]
fn rollback_settles_deleted_and_new_objects() {
    let store = TestStore::with_orders(2);
    let created = store.new_object(order_class()).unwrap();
    store.delete_object(&order_id(2)).unwrap();
    store.rollback().unwrap();
    assert_eq!(store.state(&created).unwrap(), ObjectState::Invalid);
    assert_eq!(store.state(&order_id(2)).unwrap(), ObjectState::Invalid);
    assert!(!store.has_changes().unwrap());
}

#[test]
fn registrar_adds_objects_to_commit() {
    let store = TestStore::with_orders(3);
    store.set_value(&order_id(1), "number", 10_i64).unwrap();
    let recorder = RecordingListener::new();
    store.add_listener(recorder.clone()).unwrap();

    let extra: Vec<ObjectId> = vec![order_id(2), order_id(3)];
    store
        .subscribe_object(
            &order_id(1),
            handler_fn(move |_, _, event| match event {
                ObjectEvent::Committing { registrar } => {
                    registrar.register_for_additional_committing_events(&extra)
                }
                _ => Ok(()),
            }),
        )
        .unwrap();

    store.commit().unwrap();
    assert_eq!(
        recorder.rounds(EventKind::Committing),
        vec![vec![order_id(1)], vec![order_id(2), order_id(3)]]
    );
    assert!(!store.has_changes().unwrap());
}

#[test]
fn chained_rounds_are_not_capped() {
    let store = TestStore::with_orders(20);
    store.set_value(&order_id(1), "number", 100_i64).unwrap();
    let rounds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&rounds);
    store
        .add_listener(listener_fn(move |tx, event| {
            if let TransactionEvent::Committing { ids, .. } = event {
                counter.fetch_add(1, Ordering::SeqCst);
                // Each round pulls in the next order until the last one.
                let next = ids.last().map(|id| id.key().as_u128() + 1);
                if let Some(n) = next.filter(|n| *n <= 20) {
                    tx.register_for_commit(&order_id(n))?;
                }
            }
            Ok(())
        }))
        .unwrap();

    store.commit().unwrap();
    assert_eq!(rounds.load(Ordering::SeqCst), 20);
}

#[test]
fn listener_error_leaves_partial_state() {
    let store = TestStore::with_orders(2);
    store.set_value(&order_id(1), "number", 10_i64).unwrap();
    store
        .add_listener(listener_fn(|_, event| match event {
            TransactionEvent::RollingBack { .. } => Err(CoreError::vetoed("busy")),
            _ => Ok(()),
        }))
        .unwrap();

    assert!(matches!(
        store.rollback().unwrap_err(),
        CoreError::Vetoed { .. }
    ));
    assert_eq!(store.state(&order_id(1)).unwrap(), ObjectState::Changed);
}
