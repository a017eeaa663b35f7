//! Transactions over in-memory objects.
//!
//! A [`Transaction`] tracks the lifecycle state of every object it has
//! enlisted, loads object data lazily through an [`ObjectLoader`], and
//! notifies observers about loading, modification, commit and rollback.
//!
//! Transactions form a hierarchy: a root transaction reads from the loader,
//! a sub-transaction reads through its parent and pushes its changes into
//! the parent on commit. While a sub-transaction is active the parent is
//! read-only.

mod hierarchy;
mod loading;
mod pipeline;
mod query;
mod scope;
mod state;

pub use scope::{ScopeExit, TransactionScope};

pub(crate) use state::{TransactionInner, TxState};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::event::{
    DiscardedTransactionGuard, ExtensionCollection, ObjectEventHandler, TransactionEvent,
    TransactionExtension, TransactionListener,
};
use crate::loader::ObjectLoader;
use crate::object::{ClassId, ObjectId, ObjectState, PropertyMap, PropertyValue};
use crate::registry::DeleteOutcome;
use crate::types::{TransactionId, TransactionStatus};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Handle to a transaction.
///
/// Handles are cheap to clone; all clones refer to the same transaction.
/// Methods never hold internal locks while observers run, so observers may
/// call back into the same transaction.
#[derive(Clone)]
pub struct Transaction {
    pub(crate) inner: Arc<TransactionInner>,
}

impl Transaction {
    /// Creates a root transaction reading from `loader`.
    #[must_use]
    pub fn create_root(loader: Arc<dyn ObjectLoader>) -> Self {
        Self::create_root_with_config(loader, Config::default())
    }

    /// Creates a root transaction with explicit configuration.
    #[must_use]
    pub fn create_root_with_config(loader: Arc<dyn ObjectLoader>, config: Config) -> Self {
        Self::with_parts(None, loader, config, ExtensionCollection::new())
    }

    pub(crate) fn with_parts(
        parent: Option<Transaction>,
        loader: Arc<dyn ObjectLoader>,
        config: Config,
        extensions: ExtensionCollection,
    ) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id: TransactionId::next(),
                parent,
                loader,
                config,
                state: Mutex::new(TxState::new(extensions)),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TxState> {
        self.inner.state.lock()
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.lock().status
    }

    /// Returns true once the transaction has been discarded.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.status() == TransactionStatus::Discarded
    }

    /// Returns true if the transaction accepts modifications.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    /// Returns true if both handles refer to the same transaction.
    #[must_use]
    pub fn ptr_eq(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fails if the transaction was discarded.
    pub(crate) fn check_usable(&self) -> CoreResult<()> {
        if self.lock().status.is_usable() {
            Ok(())
        } else {
            DiscardedTransactionGuard::reject()
        }
    }

    /// Fails if the transaction was discarded or is read-only.
    pub(crate) fn check_writeable(&self) -> CoreResult<()> {
        match self.lock().status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::ReadOnly => Err(CoreError::invalid_operation(format!(
                "transaction {} is read-only because it has an active sub-transaction",
                self.id()
            ))),
            TransactionStatus::Discarded => DiscardedTransactionGuard::reject(),
        }
    }

    /// Dispatches a transaction-level event to listeners, then extensions.
    pub(crate) fn notify(&self, event: &TransactionEvent<'_>) -> CoreResult<()> {
        let (listeners, extensions) = self.lock().observers();
        trace!(txn = %self.id(), kind = ?event.kind(), "dispatching event");
        for listener in &listeners {
            listener.on_event(self, event)?;
        }
        for extension in &extensions {
            extension.on_event(self, event)?;
        }
        Ok(())
    }

    // === Observers ===

    /// Registers a listener; listeners are notified in registration order.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn add_listener(&self, listener: Arc<dyn TransactionListener>) -> CoreResult<()> {
        let mut state = self.lock();
        if !state.status.is_usable() {
            return DiscardedTransactionGuard::reject();
        }
        state.listeners.push(listener);
        Ok(())
    }

    /// Registers an extension.
    ///
    /// # Errors
    ///
    /// Fails if the key is taken or the transaction was discarded.
    pub fn add_extension(&self, extension: Arc<dyn TransactionExtension>) -> CoreResult<()> {
        let mut state = self.lock();
        if !state.status.is_usable() {
            return DiscardedTransactionGuard::reject();
        }
        // A rejected extension must not be released while the state is locked.
        state.extensions.add(Arc::clone(&extension))
    }

    /// Removes an extension by key.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn remove_extension(&self, key: &str) -> CoreResult<Option<Arc<dyn TransactionExtension>>> {
        let mut state = self.lock();
        if !state.status.is_usable() {
            return DiscardedTransactionGuard::reject();
        }
        Ok(state.extensions.remove(key))
    }

    /// Returns the extension registered under `key`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn extension(&self, key: &str) -> CoreResult<Option<Arc<dyn TransactionExtension>>> {
        self.check_usable()?;
        Ok(self.lock().extensions.get(key))
    }

    /// Keys of the registered extensions.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn extension_keys(&self) -> CoreResult<Vec<String>> {
        self.check_usable()?;
        Ok(self.lock().extensions.keys())
    }

    /// Subscribes a handler to the commit and rollback events of one object.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn subscribe_object(
        &self,
        id: &ObjectId,
        handler: Arc<dyn ObjectEventHandler>,
    ) -> CoreResult<()> {
        let mut state = self.lock();
        if !state.status.is_usable() {
            return DiscardedTransactionGuard::reject();
        }
        state.handlers.entry(id.clone()).or_default().push(handler);
        Ok(())
    }

    pub(crate) fn handlers_for(&self, id: &ObjectId) -> Vec<Arc<dyn ObjectEventHandler>> {
        self.lock().handlers.get(id).cloned().unwrap_or_default()
    }

    // === State ===

    /// Returns the state of an object without side effects.
    ///
    /// Unknown identifiers report `NotLoadedYet`. In a sub-transaction,
    /// objects the parent holds as invalid or deleted report `Invalid`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn state(&self, id: &ObjectId) -> CoreResult<ObjectState> {
        self.check_usable()?;
        Ok(self.state_internal(id))
    }

    pub(crate) fn state_internal(&self, id: &ObjectId) -> ObjectState {
        if let Some(state) = self.lock().registry.state_of(id) {
            return state;
        }
        match self.parent().and_then(|p| p.reflected_state(id)) {
            Some(ObjectState::Invalid | ObjectState::Deleted) => ObjectState::Invalid,
            _ => ObjectState::NotLoadedYet,
        }
    }

    /// Nearest state recorded for `id` in this transaction or its ancestors.
    fn reflected_state(&self, id: &ObjectId) -> Option<ObjectState> {
        if let Some(state) = self.lock().registry.state_of(id) {
            return Some(state);
        }
        self.parent().and_then(|p| p.reflected_state(id))
    }

    /// Returns true if this transaction or an ancestor has enlisted `id`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn is_enlisted(&self, id: &ObjectId) -> CoreResult<bool> {
        self.check_usable()?;
        Ok(self.reflected_state(id).is_some())
    }

    /// Enlisted identifiers, ancestors' first, each in enlistment order.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn enlisted_ids(&self) -> CoreResult<Vec<ObjectId>> {
        self.check_usable()?;
        let mut ids = match self.parent() {
            Some(parent) => parent.enlisted_ids()?,
            None => Vec::new(),
        };
        let mut seen: HashSet<ObjectId> = ids.iter().cloned().collect();
        let own = self.lock().registry.enlisted_ids();
        ids.extend(own.into_iter().filter(|id| seen.insert(id.clone())));
        Ok(ids)
    }

    /// Returns true if the object is `New`, `Changed` or `Deleted`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn has_changed(&self, id: &ObjectId) -> CoreResult<bool> {
        Ok(self.state(id)?.is_affected())
    }

    /// Returns true if any object would take part in a commit.
    ///
    /// # Errors
    ///
    /// Fails if the transaction was discarded.
    pub fn has_changes(&self) -> CoreResult<bool> {
        self.check_usable()?;
        Ok(!self.lock().registry.affected_ids().is_empty())
    }

    // === Object data ===

    /// Creates a new object with a generated identifier.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is read-only or was discarded.
    pub fn new_object(&self, class_id: ClassId) -> CoreResult<ObjectId> {
        self.new_object_with(class_id, PropertyMap::new())
    }

    /// Creates a new object with initial property values.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is read-only or was discarded.
    pub fn new_object_with(&self, class_id: ClassId, properties: PropertyMap) -> CoreResult<ObjectId> {
        let id = ObjectId::generate(class_id);
        self.new_object_with_id(id.clone(), properties)?;
        Ok(id)
    }

    /// Creates a new object under a caller-chosen identifier.
    ///
    /// # Errors
    ///
    /// Fails if the identifier is already enlisted here or in an ancestor,
    /// or if the transaction is read-only or was discarded.
    pub fn new_object_with_id(&self, id: ObjectId, properties: PropertyMap) -> CoreResult<()> {
        self.check_writeable()?;
        if self.reflected_state(&id).is_some() {
            return Err(CoreError::invalid_operation(format!(
                "object '{id}' is already enlisted"
            )));
        }
        self.lock().registry.insert_new(id.clone(), properties)?;
        self.notify(&TransactionEvent::NewObjectCreated { id: &id })
    }

    /// Returns the current value of a property, loading the object if needed.
    ///
    /// # Errors
    ///
    /// Fails if the object is invalid, deleted or cannot be found.
    pub fn value(&self, id: &ObjectId, property: &str) -> CoreResult<Option<PropertyValue>> {
        Ok(self.properties(id)?.remove(property))
    }

    /// Returns the current property snapshot, loading the object if needed.
    ///
    /// # Errors
    ///
    /// Fails if the object is invalid, deleted or cannot be found.
    pub fn properties(&self, id: &ObjectId) -> CoreResult<PropertyMap> {
        self.ensure_data_available(id)?;
        let state = self.lock();
        let record = state
            .registry
            .get(id)
            .ok_or_else(|| CoreError::invalid_object(id.clone()))?;
        match record.state() {
            ObjectState::Deleted => Err(CoreError::ObjectDeleted { id: id.clone() }),
            ObjectState::Invalid => Err(CoreError::invalid_object(id.clone())),
            _ => Ok(record.current().clone()),
        }
    }

    /// Returns the value a property had when the object was loaded or last committed.
    ///
    /// # Errors
    ///
    /// Fails if the object is invalid or cannot be found.
    pub fn original_value(&self, id: &ObjectId, property: &str) -> CoreResult<Option<PropertyValue>> {
        self.ensure_data_available(id)?;
        let state = self.lock();
        let record = state
            .registry
            .get(id)
            .ok_or_else(|| CoreError::invalid_object(id.clone()))?;
        if record.state().is_invalid() {
            return Err(CoreError::invalid_object(id.clone()));
        }
        Ok(record.original().get(property).cloned())
    }

    /// Sets a property value.
    ///
    /// Listeners see `PropertyValueChanging` first and may veto the change by
    /// returning an error. Setting the current value again is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the object is invalid, deleted or cannot be found, if a
    /// listener vetoes the change, or if the transaction is read-only.
    pub fn set_value(
        &self,
        id: &ObjectId,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> CoreResult<()> {
        self.check_writeable()?;
        let value = value.into();
        let old = self.value(id, property)?;
        if old.as_ref() == Some(&value) {
            return Ok(());
        }
        self.notify(&TransactionEvent::PropertyValueChanging {
            id,
            property,
            old: old.as_ref(),
            new: &value,
        })?;
        self.lock().registry.set_value(id, property, value.clone())?;
        self.notify(&TransactionEvent::PropertyValueChanged {
            id,
            property,
            old: old.as_ref(),
            new: &value,
        })
    }

    /// Deletes an object.
    ///
    /// A `New` object is discarded immediately (it becomes `Invalid`);
    /// any other object becomes `Deleted` until commit or rollback.
    ///
    /// # Errors
    ///
    /// Fails if the object is invalid or cannot be found, if a listener vetoes
    /// the deletion, or if the transaction is read-only.
    pub fn delete_object(&self, id: &ObjectId) -> CoreResult<()> {
        self.check_writeable()?;
        self.ensure_data_available(id)?;
        if self.state_internal(id) == ObjectState::Deleted {
            return Ok(());
        }
        self.notify(&TransactionEvent::ObjectDeleting { id })?;
        let outcome = self.lock().registry.mark_deleted(id)?;
        if outcome == DeleteOutcome::AlreadyDeleted {
            return Ok(());
        }
        self.notify(&TransactionEvent::ObjectDeleted { id })
    }

    /// Marks an object as taking part in the next commit even without changes.
    ///
    /// # Errors
    ///
    /// Fails if the object is invalid, deleted or cannot be found, or if the
    /// transaction is read-only.
    pub fn register_for_commit(&self, id: &ObjectId) -> CoreResult<()> {
        self.check_writeable()?;
        self.ensure_data_available(id)?;
        self.lock().registry.register_for_commit(id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("is_root", &self.inner.parent.is_none())
            .finish_non_exhaustive()
    }
}
