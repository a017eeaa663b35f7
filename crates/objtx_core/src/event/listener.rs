//! Observer traits and helpers.

use crate::error::{CoreError, CoreResult};
use crate::event::{ObjectEvent, TransactionEvent};
use crate::object::ObjectId;
use crate::transaction::Transaction;
use std::fmt;
use std::sync::Arc;

/// Observes every notification of a transaction.
///
/// Listeners are called synchronously, in registration order, and may call
/// back into the transaction. Returning an error aborts the operation that
/// raised the event; operations already applied are not undone.
pub trait TransactionListener: Send + Sync {
    /// Handles one notification.
    ///
    /// # Errors
    ///
    /// Any error propagates to the caller of the operation that raised the event.
    fn on_event(&self, transaction: &Transaction, event: &TransactionEvent<'_>) -> CoreResult<()> {
        let _ = (transaction, event);
        Ok(())
    }

    /// Transforms the result of a query before it reaches the caller.
    ///
    /// # Errors
    ///
    /// Any error propagates to the caller of the query.
    fn filter_query_result(
        &self,
        transaction: &Transaction,
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        let _ = transaction;
        Ok(result)
    }
}

/// A named listener, notified after all plain listeners.
pub trait TransactionExtension: TransactionListener {
    /// Unique key of the extension within a transaction.
    fn key(&self) -> &str;
}

/// Observes commit and rollback of one object.
pub trait ObjectEventHandler: Send + Sync {
    /// Handles one per-object notification.
    ///
    /// # Errors
    ///
    /// Any error aborts the commit or rollback in progress.
    fn on_object_event(
        &self,
        transaction: &Transaction,
        id: &ObjectId,
        event: &ObjectEvent<'_>,
    ) -> CoreResult<()>;
}

struct FnHandler<F>(F);

impl<F> ObjectEventHandler for FnHandler<F>
where
    F: Fn(&Transaction, &ObjectId, &ObjectEvent<'_>) -> CoreResult<()> + Send + Sync,
{
    fn on_object_event(
        &self,
        transaction: &Transaction,
        id: &ObjectId,
        event: &ObjectEvent<'_>,
    ) -> CoreResult<()> {
        (self.0)(transaction, id, event)
    }
}

/// Wraps a closure as an [`ObjectEventHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn ObjectEventHandler>
where
    F: Fn(&Transaction, &ObjectId, &ObjectEvent<'_>) -> CoreResult<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

struct FnListener<F>(F);

impl<F> TransactionListener for FnListener<F>
where
    F: Fn(&Transaction, &TransactionEvent<'_>) -> CoreResult<()> + Send + Sync,
{
    fn on_event(&self, transaction: &Transaction, event: &TransactionEvent<'_>) -> CoreResult<()> {
        (self.0)(transaction, event)
    }
}

/// Wraps a closure as a [`TransactionListener`] that leaves query results untouched.
pub fn listener_fn<F>(f: F) -> Arc<dyn TransactionListener>
where
    F: Fn(&Transaction, &TransactionEvent<'_>) -> CoreResult<()> + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

/// Passed with committing events so handlers can enlarge the commit.
#[derive(Debug, Clone)]
pub struct CommittingEventRegistrar {
    transaction: Transaction,
}

impl CommittingEventRegistrar {
    pub(crate) fn new(transaction: Transaction) -> Self {
        Self { transaction }
    }

    /// Marks objects as taking part in the commit in progress.
    ///
    /// Objects not yet notified get a committing round of their own; objects
    /// already notified do not cause another round.
    ///
    /// # Errors
    ///
    /// Fails if an object is invalid, deleted or cannot be loaded.
    pub fn register_for_additional_committing_events(&self, ids: &[ObjectId]) -> CoreResult<()> {
        for id in ids {
            self.transaction.register_for_commit(id)?;
        }
        Ok(())
    }
}

/// Ordered identifiers returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    ids: Vec<ObjectId>,
}

impl QueryResult {
    /// Creates a result from identifiers.
    #[must_use]
    pub fn new(ids: Vec<ObjectId>) -> Self {
        Self { ids }
    }

    /// Returns the identifiers.
    #[must_use]
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    /// Consumes the result, returning the identifiers.
    #[must_use]
    pub fn into_ids(self) -> Vec<ObjectId> {
        self.ids
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the result is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Keeps only the entries matching the predicate.
    #[must_use]
    pub fn retain(mut self, f: impl FnMut(&ObjectId) -> bool) -> Self {
        self.ids.retain(f);
        self
    }
}

/// Extensions of a transaction, in registration order, unique by key.
#[derive(Clone, Default)]
pub struct ExtensionCollection {
    entries: Vec<Arc<dyn TransactionExtension>>,
}

impl ExtensionCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an extension.
    ///
    /// # Errors
    ///
    /// Fails if an extension with the same key is already registered.
    pub fn add(&mut self, extension: Arc<dyn TransactionExtension>) -> CoreResult<()> {
        if self.get(extension.key()).is_some() {
            return Err(CoreError::invalid_operation(format!(
                "an extension with key '{}' is already registered",
                extension.key()
            )));
        }
        self.entries.push(extension);
        Ok(())
    }

    /// Removes the extension with the given key.
    pub fn remove(&mut self, key: &str) -> Option<Arc<dyn TransactionExtension>> {
        let pos = self.entries.iter().position(|e| e.key() == key)?;
        Some(self.entries.remove(pos))
    }

    /// Returns the extension with the given key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn TransactionExtension>> {
        self.entries.iter().find(|e| e.key() == key).cloned()
    }

    /// Keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().to_owned()).collect()
    }

    /// Iterates over the extensions.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TransactionExtension>> {
        self.entries.iter()
    }

    /// Number of extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no extensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ExtensionCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionCollection")
            .field("keys", &self.keys())
            .finish()
    }
}
