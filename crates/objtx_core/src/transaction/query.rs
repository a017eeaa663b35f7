//! Query result filtering.

use crate::error::CoreResult;
use crate::event::QueryResult;
use crate::object::{ObjectId, ObjectState};
use crate::transaction::Transaction;
use tracing::trace;

impl Transaction {
    /// Passes a query result through every listener, then every extension.
    ///
    /// Each observer receives the output of the previous one.
    ///
    /// # Errors
    ///
    /// Fails if an observer fails or the transaction was discarded.
    pub fn filter_query_result(&self, result: QueryResult) -> CoreResult<QueryResult> {
        let (listeners, extensions) = self.lock().observers();
        let before = result.len();
        let mut result = result;
        for listener in &listeners {
            result = listener.filter_query_result(self, result)?;
        }
        for extension in &extensions {
            result = extension.filter_query_result(self, result)?;
        }
        trace!(txn = %self.id(), before, after = result.len(), "filtered query result");
        Ok(result)
    }

    /// Resolves identifiers returned by a backing query.
    ///
    /// Objects are loaded in one batch. Identifiers that cannot be found,
    /// are invalid, or are deleted in this transaction are dropped; the
    /// rest keep their order and go through [`Transaction::filter_query_result`].
    ///
    /// # Errors
    ///
    /// Fails if loading or an observer fails, or the transaction was discarded.
    pub fn query_objects(&self, ids: &[ObjectId]) -> CoreResult<QueryResult> {
        self.try_ensure_data_available_all(ids)?;
        let visible = QueryResult::new(ids.to_vec()).retain(|id| {
            matches!(
                self.state_internal(id),
                ObjectState::New | ObjectState::Unchanged | ObjectState::Changed
            )
        });
        self.filter_query_result(visible)
    }
}
