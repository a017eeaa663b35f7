//! External object loader.

use crate::error::CoreResult;
use crate::object::{DataRecord, ObjectId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of raw object records for root transactions.
///
/// Loaders are **opaque record stores**. They know nothing about
/// transactions, object states or notifications; the transaction decides
/// when to call them and what to do with the results.
///
/// # Invariants
///
/// - `load_object` returns `Ok(None)` for an unknown identifier rather than an error
/// - `load_objects` may return a partial map; identifiers missing from the
///   result are treated as not found
/// - Errors are reserved for failures of the backing store itself
pub trait ObjectLoader: Send + Sync {
    /// Loads a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn load_object(&self, id: &ObjectId) -> CoreResult<Option<DataRecord>>;

    /// Loads a batch of records in one round-trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn load_objects(&self, ids: &[ObjectId]) -> CoreResult<HashMap<ObjectId, DataRecord>>;
}

/// An in-memory loader.
///
/// This loader serves records from a map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Embedding objtx over data that is already in memory
///
/// It counts calls so tests can assert how often the backing store was consulted.
///
/// # Example
///
/// ```rust
/// use objtx_core::{ClassId, DataRecord, MemoryLoader, ObjectId, ObjectLoader};
///
/// let id = ObjectId::generate(ClassId::new("Order"));
/// let loader = MemoryLoader::new();
/// loader.insert(DataRecord::new(id.clone()).with("number", 1_i64));
///
/// assert!(loader.load_object(&id).unwrap().is_some());
/// assert_eq!(loader.single_calls(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryLoader {
    records: RwLock<HashMap<ObjectId, DataRecord>>,
    single_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MemoryLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader pre-populated with records.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = DataRecord>) -> Self {
        let loader = Self::new();
        for record in records {
            loader.insert(record);
        }
        loader
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: DataRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    /// Removes a record, returning it if present.
    pub fn remove(&self, id: &ObjectId) -> Option<DataRecord> {
        self.records.write().remove(id)
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of `load_object` calls so far.
    #[must_use]
    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    /// Number of `load_objects` calls so far.
    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Total number of round-trips so far.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.single_calls() + self.batch_calls()
    }
}

impl ObjectLoader for MemoryLoader {
    fn load_object(&self, id: &ObjectId) -> CoreResult<Option<DataRecord>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.read().get(id).cloned())
    }

    fn load_objects(&self, ids: &[ObjectId]) -> CoreResult<HashMap<ObjectId, DataRecord>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read();
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}
