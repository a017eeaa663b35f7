//! Notification surface of a transaction.
//!
//! A transaction notifies three kinds of observers:
//! - per-object [`ObjectEventHandler`]s, for commit and rollback of that object
//! - [`TransactionListener`]s, for every transaction-level event
//! - [`TransactionExtension`]s, keyed listeners notified after the plain ones
//!
//! Once a transaction is discarded its observers are replaced by the
//! [`DiscardedTransactionGuard`].

mod guard;
mod kind;
mod listener;

pub use guard::DiscardedTransactionGuard;
pub use kind::{EventKind, ObjectEvent, TransactionEvent};
pub use listener::{
    handler_fn, listener_fn, CommittingEventRegistrar, ExtensionCollection, ObjectEventHandler,
    QueryResult, TransactionExtension, TransactionListener,
};
