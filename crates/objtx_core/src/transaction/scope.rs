//! Ambient "current transaction" stack.
//!
//! Entering a scope pushes a transaction onto a thread-local stack; leaving
//! it restores the previous top. Scopes nest strictly: leaving a scope also
//! leaves any scope entered after it that is still open.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use std::cell::RefCell;
use std::marker::PhantomData;
use tracing::{debug, warn};

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Transaction>> = const { RefCell::new(Vec::new()) };
}

/// What happens to the scoped transaction when its scope is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeExit {
    /// The transaction stays usable.
    #[default]
    Keep,
    /// The transaction is discarded.
    Discard,
}

/// Guard for an entered transaction scope.
///
/// Dropping the guard leaves the scope. Call [`TransactionScope::leave`] to
/// observe errors from the automatic rollback instead of having them logged.
#[must_use = "the scope is left as soon as the guard is dropped"]
pub struct TransactionScope {
    transaction: Transaction,
    depth: usize,
    exit: ScopeExit,
    left: bool,
    // The stack is per thread; the guard must stay on it.
    _not_send: PhantomData<*const ()>,
}

impl TransactionScope {
    /// The transaction this scope made current.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Leaves the scope.
    ///
    /// If the transaction is configured with `auto_rollback_on_scope_exit`
    /// and is still writeable, it is rolled back first. The scope is left
    /// even if the rollback fails.
    ///
    /// # Errors
    ///
    /// Returns the rollback error, if any.
    pub fn leave(mut self) -> CoreResult<()> {
        self.leave_inner()
    }

    fn leave_inner(&mut self) -> CoreResult<()> {
        if self.left {
            return Ok(());
        }
        self.left = true;

        let rollback = if self.transaction.config().auto_rollback_on_scope_exit
            && self.transaction.is_writeable()
        {
            self.transaction.rollback()
        } else {
            Ok(())
        };

        let closed = SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let still_open = stack
                .get(self.depth - 1)
                .is_some_and(|top| top.ptr_eq(&self.transaction));
            if still_open {
                stack.split_off(self.depth - 1)
            } else {
                Vec::new()
            }
        });
        // Closed frames may hold the last handle to a transaction.
        drop(closed);
        if self.exit == ScopeExit::Discard {
            self.transaction.discard();
        }
        debug!(txn = %self.transaction.id(), depth = self.depth, "left transaction scope");
        rollback
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if let Err(e) = self.leave_inner() {
            warn!(txn = %self.transaction.id(), error = %e, "rollback on scope exit failed");
        }
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("transaction", &self.transaction.id())
            .field("depth", &self.depth)
            .field("exit", &self.exit)
            .finish()
    }
}

impl Transaction {
    /// Makes this transaction the current one until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn enter_scope(&self) -> CoreResult<TransactionScope> {
        self.enter_scope_with(ScopeExit::Keep)
    }

    /// Like [`Transaction::enter_scope`], but discards the transaction when
    /// the scope is left.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn enter_discarding_scope(&self) -> CoreResult<TransactionScope> {
        self.enter_scope_with(ScopeExit::Discard)
    }

    /// Enters a scope with an explicit exit mode.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn enter_scope_with(&self, exit: ScopeExit) -> CoreResult<TransactionScope> {
        self.check_usable()?;
        let depth = SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(self.clone());
            stack.len()
        });
        debug!(txn = %self.id(), depth, "entered transaction scope");
        Ok(TransactionScope {
            transaction: self.clone(),
            depth,
            exit,
            left: false,
            _not_send: PhantomData,
        })
    }

    /// The transaction of the innermost open scope on this thread.
    #[must_use]
    pub fn current() -> Option<Transaction> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Like [`Transaction::current`], but fails if no scope is open.
    ///
    /// # Errors
    ///
    /// Returns `NoCurrentTransaction` outside any scope.
    pub fn require_current() -> CoreResult<Transaction> {
        Self::current().ok_or(CoreError::NoCurrentTransaction)
    }

    /// Runs `f` with this transaction as the current one.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded, or with the error of `f`.
    pub fn execute<T>(&self, f: impl FnOnce(&Transaction) -> CoreResult<T>) -> CoreResult<T> {
        let scope = self.enter_scope()?;
        let result = f(self);
        let left = scope.leave();
        match (result, left) {
            (Err(e), Err(leave_err)) => {
                warn!(txn = %self.id(), error = %leave_err, "rollback on scope exit failed");
                Err(e)
            }
            (result, left) => {
                left?;
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::loader::MemoryLoader;
    use crate::object::{ClassId, DataRecord, ObjectId, ObjectState, PropertyValue};
    use std::sync::Arc;
    use uuid::Uuid;

    fn id(n: u128) -> ObjectId {
        ObjectId::new(ClassId::new("Order"), Uuid::from_u128(n))
    }

    fn loader() -> Arc<MemoryLoader> {
        Arc::new(MemoryLoader::with_records([
            DataRecord::new(id(1)).with("number", 1_i64)
        ]))
    }

    #[test]
    fn no_current_outside_scope() {
        assert!(Transaction::current().is_none());
        assert!(matches!(
            Transaction::require_current().unwrap_err(),
            CoreError::NoCurrentTransaction
        ));
    }

    #[test]
    fn nested_scopes_restore_previous() {
        let outer = Transaction::create_root(loader());
        let inner = Transaction::create_root(loader());

        let outer_scope = outer.enter_scope().unwrap();
        assert!(Transaction::current().unwrap().ptr_eq(&outer));
        {
            let _inner_scope = inner.enter_scope().unwrap();
            assert!(Transaction::current().unwrap().ptr_eq(&inner));
        }
        assert!(Transaction::current().unwrap().ptr_eq(&outer));
        outer_scope.leave().unwrap();
        assert!(Transaction::current().is_none());
    }

    #[test]
    fn leaving_outer_scope_closes_inner() {
        let outer = Transaction::create_root(loader());
        let inner = Transaction::create_root(loader());
        let outer_scope = outer.enter_scope().unwrap();
        let inner_scope = inner.enter_scope().unwrap();
        outer_scope.leave().unwrap();
        assert!(Transaction::current().is_none());
        drop(inner_scope);
        assert!(Transaction::current().is_none());
    }

    #[test]
    fn discarding_scope_discards() {
        let tx = Transaction::create_root(loader());
        {
            let _scope = tx.enter_discarding_scope().unwrap();
        }
        assert!(tx.is_discarded());
        assert!(tx.enter_scope().is_err());
    }

    #[test]
    fn auto_rollback_on_exit() {
        let config = Config::default().auto_rollback_on_scope_exit(true);
        let tx = Transaction::create_root_with_config(loader(), config);
        tx.execute(|tx| tx.set_value(&id(1), "number", 9_i64)).unwrap();
        assert_eq!(tx.state(&id(1)).unwrap(), ObjectState::Unchanged);
        assert_eq!(tx.value(&id(1), "number").unwrap(), Some(PropertyValue::Integer(1)));
    }

    #[test]
    fn execute_reports_closure_error_over_failed_rollback() {
        use crate::event::{listener_fn, TransactionEvent};
        let config = Config::default().auto_rollback_on_scope_exit(true);
        let tx = Transaction::create_root_with_config(loader(), config);
        tx.add_listener(listener_fn(|_, event| match event {
            TransactionEvent::RollingBack { .. } => Err(CoreError::vetoed("rollback refused")),
            _ => Ok(()),
        }))
        .unwrap();

        let err = tx
            .execute(|tx| -> CoreResult<()> {
                tx.set_value(&id(1), "number", 9_i64)?;
                Err(CoreError::vetoed("work failed"))
            })
            .unwrap_err();
        assert_eq!(err, CoreError::vetoed("work failed"));
        assert!(Transaction::current().is_none());

        // With a successful closure the rollback failure surfaces.
        let err = tx.execute(|_| Ok(())).unwrap_err();
        assert_eq!(err, CoreError::vetoed("rollback refused"));
    }

    #[test]
    fn execute_sets_current() {
        let tx = Transaction::create_root(loader());
        let seen = tx
            .execute(|_| Ok(Transaction::require_current()?.ptr_eq(&tx)))
            .unwrap();
        assert!(seen);
        assert!(Transaction::current().is_none());
    }
}
