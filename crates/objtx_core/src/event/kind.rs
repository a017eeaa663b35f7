//! Event variants dispatched by a transaction.

use crate::event::CommittingEventRegistrar;
use crate::object::{ObjectId, PropertyValue};
use crate::transaction::Transaction;

/// A transaction-level notification.
///
/// This is the complete, closed set of notifications a
/// [`TransactionListener`](crate::TransactionListener) can receive. Together
/// with query filtering it forms the listener surface enumerated by
/// [`EventKind::ALL`].
#[derive(Debug)]
pub enum TransactionEvent<'a> {
    /// Objects are about to be loaded; carries the whole batch.
    ObjectsLoading {
        /// Identifiers about to be loaded.
        ids: &'a [ObjectId],
    },
    /// Objects were loaded; carries only the identifiers that resolved.
    ObjectsLoaded {
        /// Identifiers now `Unchanged`.
        ids: &'a [ObjectId],
    },
    /// A new object was created.
    NewObjectCreated {
        /// The new object.
        id: &'a ObjectId,
    },
    /// A property is about to change. Returning an error vetoes the change.
    PropertyValueChanging {
        /// The object.
        id: &'a ObjectId,
        /// Property name.
        property: &'a str,
        /// Value before the change.
        old: Option<&'a PropertyValue>,
        /// Value after the change.
        new: &'a PropertyValue,
    },
    /// A property changed.
    PropertyValueChanged {
        /// The object.
        id: &'a ObjectId,
        /// Property name.
        property: &'a str,
        /// Value before the change.
        old: Option<&'a PropertyValue>,
        /// Value after the change.
        new: &'a PropertyValue,
    },
    /// An object is about to be deleted. Returning an error vetoes the deletion.
    ObjectDeleting {
        /// The object.
        id: &'a ObjectId,
    },
    /// An object was deleted (or discarded, if it was new).
    ObjectDeleted {
        /// The object.
        id: &'a ObjectId,
    },
    /// One rollback round is in progress.
    RollingBack {
        /// Live objects of this round, in first-appearance order.
        ids: &'a [ObjectId],
    },
    /// The rollback finished.
    RolledBack,
    /// One commit round is in progress.
    Committing {
        /// Live objects of this round, in first-appearance order.
        ids: &'a [ObjectId],
        /// Registers further objects for this commit.
        registrar: &'a CommittingEventRegistrar,
    },
    /// The commit finished.
    Committed,
    /// A sub-transaction was created.
    SubTransactionCreated {
        /// The new sub-transaction.
        child: &'a Transaction,
    },
    /// The transaction is about to be discarded.
    Discarding,
}

impl TransactionEvent<'_> {
    /// Returns the kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ObjectsLoading { .. } => EventKind::ObjectsLoading,
            Self::ObjectsLoaded { .. } => EventKind::ObjectsLoaded,
            Self::NewObjectCreated { .. } => EventKind::NewObjectCreated,
            Self::PropertyValueChanging { .. } => EventKind::PropertyValueChanging,
            Self::PropertyValueChanged { .. } => EventKind::PropertyValueChanged,
            Self::ObjectDeleting { .. } => EventKind::ObjectDeleting,
            Self::ObjectDeleted { .. } => EventKind::ObjectDeleted,
            Self::RollingBack { .. } => EventKind::RollingBack,
            Self::RolledBack => EventKind::RolledBack,
            Self::Committing { .. } => EventKind::Committing,
            Self::Committed => EventKind::Committed,
            Self::SubTransactionCreated { .. } => EventKind::SubTransactionCreated,
            Self::Discarding => EventKind::Discarding,
        }
    }
}

/// A notification addressed to the handlers of a single object.
#[derive(Debug)]
pub enum ObjectEvent<'a> {
    /// The object is part of a rollback round.
    RollingBack,
    /// The object was settled by a rollback.
    RolledBack,
    /// The object is part of a commit round.
    Committing {
        /// Registers further objects for this commit.
        registrar: &'a CommittingEventRegistrar,
    },
    /// The object was settled by a commit.
    Committed,
}

/// Every capability of the listener surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`TransactionEvent::ObjectsLoading`].
    ObjectsLoading,
    /// [`TransactionEvent::ObjectsLoaded`].
    ObjectsLoaded,
    /// [`TransactionEvent::NewObjectCreated`].
    NewObjectCreated,
    /// [`TransactionEvent::PropertyValueChanging`].
    PropertyValueChanging,
    /// [`TransactionEvent::PropertyValueChanged`].
    PropertyValueChanged,
    /// [`TransactionEvent::ObjectDeleting`].
    ObjectDeleting,
    /// [`TransactionEvent::ObjectDeleted`].
    ObjectDeleted,
    /// [`TransactionEvent::RollingBack`].
    RollingBack,
    /// [`TransactionEvent::RolledBack`].
    RolledBack,
    /// [`TransactionEvent::Committing`].
    Committing,
    /// [`TransactionEvent::Committed`].
    Committed,
    /// [`TransactionEvent::SubTransactionCreated`].
    SubTransactionCreated,
    /// [`TransactionEvent::Discarding`].
    Discarding,
    /// [`TransactionListener::filter_query_result`](crate::TransactionListener::filter_query_result).
    FilterQueryResult,
}

impl EventKind {
    /// Number of capabilities.
    pub const COUNT: usize = 14;

    /// All capabilities, in declaration order.
    pub const ALL: [EventKind; Self::COUNT] = [
        Self::ObjectsLoading,
        Self::ObjectsLoaded,
        Self::NewObjectCreated,
        Self::PropertyValueChanging,
        Self::PropertyValueChanged,
        Self::ObjectDeleting,
        Self::ObjectDeleted,
        Self::RollingBack,
        Self::RolledBack,
        Self::Committing,
        Self::Committed,
        Self::SubTransactionCreated,
        Self::Discarding,
        Self::FilterQueryResult,
    ];
}
