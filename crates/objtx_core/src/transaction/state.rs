//! Shared state behind a transaction handle.

use crate::config::Config;
use crate::event::{
    DiscardedTransactionGuard, ExtensionCollection, ObjectEventHandler, TransactionExtension,
    TransactionListener,
};
use crate::loader::ObjectLoader;
use crate::object::ObjectId;
use crate::registry::StateRegistry;
use crate::transaction::Transaction;
use crate::types::{TransactionId, TransactionStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Immutable identity plus the mutable state of one transaction.
pub(crate) struct TransactionInner {
    pub(crate) id: TransactionId,
    pub(crate) parent: Option<Transaction>,
    pub(crate) loader: Arc<dyn ObjectLoader>,
    pub(crate) config: Config,
    pub(crate) state: Mutex<TxState>,
}

/// Mutable state of a transaction.
///
/// The lock around it is never held while observers run or while another
/// transaction of the hierarchy is locked.
pub(crate) struct TxState {
    pub(crate) status: TransactionStatus,
    pub(crate) registry: StateRegistry,
    pub(crate) listeners: Vec<Arc<dyn TransactionListener>>,
    pub(crate) extensions: ExtensionCollection,
    pub(crate) handlers: HashMap<ObjectId, Vec<Arc<dyn ObjectEventHandler>>>,
    pub(crate) sub_transaction: Option<Weak<TransactionInner>>,
}

impl TxState {
    pub(crate) fn new(extensions: ExtensionCollection) -> Self {
        Self {
            status: TransactionStatus::Active,
            registry: StateRegistry::new(),
            listeners: Vec::new(),
            extensions,
            handlers: HashMap::new(),
            sub_transaction: None,
        }
    }

    /// Snapshot of the observer chain: listeners first, then extensions.
    pub(crate) fn observers(
        &self,
    ) -> (
        Vec<Arc<dyn TransactionListener>>,
        Vec<Arc<dyn TransactionExtension>>,
    ) {
        (
            self.listeners.clone(),
            self.extensions.iter().cloned().collect(),
        )
    }

    /// Replaces every observer with the discarded-transaction guard.
    ///
    /// The previous observers are handed back so the caller can drop them
    /// after releasing the lock: one of them may own the last handle to a
    /// sub-transaction, whose drop locks this state again.
    #[must_use = "drop the returned observers after the lock is released"]
    pub(crate) fn install_guard(&mut self) -> RetiredObservers {
        self.status = TransactionStatus::Discarded;
        self.sub_transaction = None;
        RetiredObservers {
            _listeners: std::mem::replace(
                &mut self.listeners,
                vec![Arc::new(DiscardedTransactionGuard)],
            ),
            _extensions: std::mem::take(&mut self.extensions),
            _handlers: std::mem::take(&mut self.handlers),
        }
    }
}

/// Observers removed from a discarded transaction, awaiting drop.
pub(crate) struct RetiredObservers {
    _listeners: Vec<Arc<dyn TransactionListener>>,
    _extensions: ExtensionCollection,
    _handlers: HashMap<ObjectId, Vec<Arc<dyn ObjectEventHandler>>>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        // A dropped sub-transaction no longer blocks its parent.
        if let Some(parent) = &self.parent {
            let me: *const TransactionInner = self;
            let mut state = parent.inner.state.lock();
            let is_current_sub = state
                .sub_transaction
                .as_ref()
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), me));
            if is_current_sub {
                state.sub_transaction = None;
                if state.status == TransactionStatus::ReadOnly {
                    state.status = TransactionStatus::Active;
                }
            }
        }
    }
}
