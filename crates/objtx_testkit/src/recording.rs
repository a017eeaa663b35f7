//! Observers that record what they see.

use objtx_core::{
    CoreResult, EventKind, ObjectEvent, ObjectEventHandler, ObjectId, Transaction,
    TransactionEvent, TransactionExtension, TransactionListener,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// One recorded transaction-level event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Kind of the event.
    pub kind: EventKind,
    /// Objects the event names, in event order.
    pub ids: Vec<ObjectId>,
}

impl RecordedEvent {
    fn from_event(event: &TransactionEvent<'_>) -> Self {
        let ids = match event {
            TransactionEvent::ObjectsLoading { ids }
            | TransactionEvent::ObjectsLoaded { ids }
            | TransactionEvent::RollingBack { ids }
            | TransactionEvent::Committing { ids, .. } => ids.to_vec(),
            TransactionEvent::NewObjectCreated { id }
            | TransactionEvent::PropertyValueChanging { id, .. }
            | TransactionEvent::PropertyValueChanged { id, .. }
            | TransactionEvent::ObjectDeleting { id }
            | TransactionEvent::ObjectDeleted { id } => vec![(*id).clone()],
            TransactionEvent::RolledBack
            | TransactionEvent::Committed
            | TransactionEvent::SubTransactionCreated { .. }
            | TransactionEvent::Discarding => Vec::new(),
        };
        Self {
            kind: event.kind(),
            ids,
        }
    }
}

/// Listener (and extension) that records every event.
#[derive(Debug)]
pub struct RecordingListener {
    key: String,
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingListener {
    /// Creates a recorder registered under the key `recording` when used as an extension.
    pub fn new() -> Arc<Self> {
        Self::with_key("recording")
    }

    /// Creates a recorder with an explicit extension key.
    pub fn with_key(key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            events: Mutex::new(Vec::new()),
        })
    }

    /// All recorded events.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Kinds of all recorded events, in order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    /// Number of events of one kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Object lists of every event of one kind.
    ///
    /// For `Committing` and `RollingBack` this yields one entry per round.
    pub fn rounds(&self, kind: EventKind) -> Vec<Vec<ObjectId>> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.ids.clone())
            .collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TransactionListener for RecordingListener {
    fn on_event(&self, _transaction: &Transaction, event: &TransactionEvent<'_>) -> CoreResult<()> {
        self.events.lock().push(RecordedEvent::from_event(event));
        Ok(())
    }
}

impl TransactionExtension for RecordingListener {
    fn key(&self) -> &str {
        &self.key
    }
}

/// Per-object event as seen by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerCall {
    /// `ObjectEvent::RollingBack`.
    RollingBack,
    /// `ObjectEvent::RolledBack`.
    RolledBack,
    /// `ObjectEvent::Committing`.
    Committing,
    /// `ObjectEvent::Committed`.
    Committed,
}

impl From<&ObjectEvent<'_>> for HandlerCall {
    fn from(event: &ObjectEvent<'_>) -> Self {
        match event {
            ObjectEvent::RollingBack => Self::RollingBack,
            ObjectEvent::RolledBack => Self::RolledBack,
            ObjectEvent::Committing { .. } => Self::Committing,
            ObjectEvent::Committed => Self::Committed,
        }
    }
}

/// Object handler that records every call; one instance may watch many objects.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<(ObjectId, HandlerCall)>>,
}

impl RecordingHandler {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes this recorder to each of `ids` in `transaction`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn watch(self: &Arc<Self>, transaction: &Transaction, ids: &[ObjectId]) -> CoreResult<()> {
        for id in ids {
            transaction.subscribe_object(id, self.clone())?;
        }
        Ok(())
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<(ObjectId, HandlerCall)> {
        self.calls.lock().clone()
    }

    /// Calls received by one object, in order.
    pub fn calls_for(&self, id: &ObjectId) -> Vec<HandlerCall> {
        self.calls
            .lock()
            .iter()
            .filter(|(seen, _)| seen == id)
            .map(|(_, call)| *call)
            .collect()
    }
}

impl ObjectEventHandler for RecordingHandler {
    fn on_object_event(
        &self,
        _transaction: &Transaction,
        id: &ObjectId,
        event: &ObjectEvent<'_>,
    ) -> CoreResult<()> {
        self.calls.lock().push((id.clone(), HandlerCall::from(event)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{order_id, TestStore};

    #[test]
    fn records_load_events() {
        let store = TestStore::with_orders(2);
        let recorder = RecordingListener::new();
        store.add_listener(recorder.clone()).unwrap();
        store
            .ensure_data_available_all(&[order_id(1), order_id(2)])
            .unwrap();
        assert_eq!(
            recorder.kinds(),
            vec![EventKind::ObjectsLoading, EventKind::ObjectsLoaded]
        );
        assert_eq!(
            recorder.rounds(EventKind::ObjectsLoaded),
            vec![vec![order_id(1), order_id(2)]]
        );
    }

    #[test]
    fn records_handler_calls() {
        let store = TestStore::with_orders(1);
        let handler = RecordingHandler::new();
        handler.watch(&store, &[order_id(1)]).unwrap();
        store.set_value(&order_id(1), "number", 5_i64).unwrap();
        store.commit().unwrap();
        assert_eq!(
            handler.calls_for(&order_id(1)),
            vec![HandlerCall::Committing, HandlerCall::Committed]
        );
    }
}
