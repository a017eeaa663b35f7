//! Listener installed on discarded transactions.

use crate::error::{CoreError, CoreResult};
use crate::event::{QueryResult, TransactionEvent, TransactionListener};
use crate::transaction::Transaction;

/// Terminal listener of a discarded transaction.
///
/// Every capability fails with [`CoreError::TransactionDiscarded`],
/// whatever the arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardedTransactionGuard;

impl DiscardedTransactionGuard {
    /// The failure returned by every capability.
    pub fn reject<T>() -> CoreResult<T> {
        Err(CoreError::TransactionDiscarded)
    }
}

impl TransactionListener for DiscardedTransactionGuard {
    fn on_event(&self, _transaction: &Transaction, _event: &TransactionEvent<'_>) -> CoreResult<()> {
        Self::reject()
    }

    fn filter_query_result(
        &self,
        _transaction: &Transaction,
        _result: QueryResult,
    ) -> CoreResult<QueryResult> {
        Self::reject()
    }
}
