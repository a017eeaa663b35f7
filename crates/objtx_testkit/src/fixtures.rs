//! Test fixtures and loader helpers.
//!
//! Provides convenience functions for building seeded loaders and
//! transactions over them.

use objtx_core::{
    ClassId, Config, DataRecord, MemoryLoader, ObjectId, PropertyMap, Transaction,
};
use serde::Deserialize;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Class used by the default fixtures.
pub const ORDER_CLASS: &str = "Order";

/// Returns a deterministic ID of class `class`.
pub fn object_id(class: &str, n: u128) -> ObjectId {
    ObjectId::new(ClassId::new(class), Uuid::from_u128(n))
}

/// Returns a deterministic `Order` ID.
pub fn order_id(n: u128) -> ObjectId {
    object_id(ORDER_CLASS, n)
}

/// Returns `Order` records `1..=count`, each with `number` set to its index.
pub fn order_records(count: u64) -> Vec<DataRecord> {
    (1..=count)
        .map(|n| DataRecord::new(order_id(u128::from(n))).with("number", n as i64))
        .collect()
}

/// A seeded loader plus a root transaction over it.
pub struct TestStore {
    /// The loader (shared with the transaction).
    pub loader: Arc<MemoryLoader>,
    /// The root transaction.
    pub root: Transaction,
}

impl TestStore {
    /// Creates a store over the given records.
    pub fn new(records: impl IntoIterator<Item = DataRecord>) -> Self {
        Self::with_config(records, Config::default())
    }

    /// Creates a store with explicit configuration.
    pub fn with_config(records: impl IntoIterator<Item = DataRecord>, config: Config) -> Self {
        let loader = Arc::new(MemoryLoader::with_records(records));
        let root = Transaction::create_root_with_config(loader.clone(), config);
        Self { loader, root }
    }

    /// Creates a store holding `count` orders (see [`order_records`]).
    pub fn with_orders(count: u64) -> Self {
        Self::new(order_records(count))
    }

    /// Number of loader round-trips so far.
    pub fn loader_calls(&self) -> usize {
        self.loader.total_calls()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

/// Runs `f` with a root transaction over `count` orders.
///
/// # Example
///
/// ```rust
/// use objtx_testkit::{order_id, with_orders};
///
/// with_orders(3, |tx| {
///     tx.ensure_data_available(&order_id(2)).unwrap();
/// });
/// ```
pub fn with_orders<F, R>(count: u64, f: F) -> R
where
    F: FnOnce(&Transaction) -> R,
{
    let store = TestStore::with_orders(count);
    f(&store.root)
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    class: String,
    objects: Vec<FixtureObject>,
}

#[derive(Debug, Deserialize)]
struct FixtureObject {
    key: u64,
    #[serde(default)]
    properties: PropertyMap,
}

/// Builds a loader from a JSON fixture.
///
/// The fixture names one class and lists its objects by numeric key:
///
/// ```json
/// { "class": "Order", "objects": [ { "key": 1, "properties": { "number": 1 } } ] }
/// ```
///
/// # Errors
///
/// Returns the parse error for malformed input.
pub fn loader_from_json(json: &str) -> Result<MemoryLoader, serde_json::Error> {
    let fixture: FixtureFile = serde_json::from_str(json)?;
    let class = fixture.class;
    Ok(MemoryLoader::with_records(fixture.objects.into_iter().map(
        |object| DataRecord {
            id: object_id(&class, u128::from(object.key)),
            properties: object.properties,
        },
    )))
}

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber for tests, once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
