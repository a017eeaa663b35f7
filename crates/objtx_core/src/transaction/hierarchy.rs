//! Parent/child links and discarding.

use crate::error::CoreResult;
use crate::event::{ExtensionCollection, TransactionEvent};
use crate::transaction::{Transaction, TransactionInner};
use crate::types::TransactionStatus;
use std::sync::Arc;
use tracing::{debug, warn};

impl Transaction {
    /// Returns the parent transaction, if this is a sub-transaction.
    #[must_use]
    pub fn parent(&self) -> Option<Transaction> {
        self.inner.parent.clone()
    }

    /// Returns the root of the hierarchy (this transaction if it is a root).
    #[must_use]
    pub fn root(&self) -> Transaction {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Returns true if this transaction has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Returns the active sub-transaction, if any.
    #[must_use]
    pub fn sub_transaction(&self) -> Option<Transaction> {
        let weak = self.lock().sub_transaction.clone();
        weak.and_then(|w| w.upgrade())
            .map(|inner| Transaction { inner })
    }

    /// Creates a sub-transaction.
    ///
    /// The sub-transaction starts empty and reflects this transaction's objects
    /// lazily. Until it is discarded (or dropped), this transaction is read-only.
    ///
    /// # Errors
    ///
    /// Fails if this transaction is read-only (it already has an active
    /// sub-transaction) or was discarded.
    pub fn create_sub_transaction(&self) -> CoreResult<Transaction> {
        self.check_writeable()?;
        let extensions = if self.config().inherit_extensions {
            self.lock().extensions.clone()
        } else {
            ExtensionCollection::new()
        };
        let child = Transaction::with_parts(
            Some(self.clone()),
            Arc::clone(&self.inner.loader),
            self.config().clone(),
            extensions,
        );
        {
            let mut state = self.lock();
            state.status = TransactionStatus::ReadOnly;
            state.sub_transaction = Some(Arc::downgrade(&child.inner));
        }
        debug!(parent = %self.id(), child = %child.id(), "created sub-transaction");
        self.notify(&TransactionEvent::SubTransactionCreated { child: &child })?;
        Ok(child)
    }

    /// Discards the transaction.
    ///
    /// Active sub-transactions are discarded first. Afterwards every
    /// operation on this transaction fails with `TransactionDiscarded`, and
    /// the parent (if any) becomes writeable again. Discarding twice is a no-op.
    pub fn discard(&self) {
        if self.is_discarded() {
            return;
        }
        if let Some(sub) = self.sub_transaction() {
            sub.discard();
        }
        if let Err(e) = self.notify(&TransactionEvent::Discarding) {
            warn!(txn = %self.id(), error = %e, "listener failed while discarding");
        }
        let retired = self.lock().install_guard();
        drop(retired);
        if let Some(parent) = &self.inner.parent {
            parent.release_sub_transaction(&self.inner);
        }
        debug!(txn = %self.id(), "discarded transaction");
    }

    fn release_sub_transaction(&self, child: &Arc<TransactionInner>) {
        let mut state = self.lock();
        let is_current_sub = state
            .sub_transaction
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(child)));
        if is_current_sub {
            state.sub_transaction = None;
            if state.status == TransactionStatus::ReadOnly {
                state.status = TransactionStatus::Active;
            }
        }
    }
}
