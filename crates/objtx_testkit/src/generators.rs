//! Property-based test generators using proptest.
//!
//! Provides strategies for generating identifiers, property values and
//! operation sequences against a seeded store.

use crate::fixtures::order_id;
use objtx_core::{ClassId, ObjectId, PropertyMap, PropertyValue};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for generating valid class names.
pub fn class_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for generating object IDs of arbitrary classes.
pub fn object_id_strategy() -> impl Strategy<Value = ObjectId> {
    (class_name_strategy(), any::<u128>())
        .prop_map(|(class, key)| ObjectId::new(ClassId::new(class), Uuid::from_u128(key)))
}

/// Strategy for `Order` IDs with keys in `1..=max`.
pub fn order_id_strategy(max: u64) -> impl Strategy<Value = ObjectId> {
    (1..=max).prop_map(|n| order_id(u128::from(n)))
}

/// Strategy for scalar property values.
pub fn property_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        Just(PropertyValue::Null),
        any::<bool>().prop_map(PropertyValue::Bool),
        any::<i64>().prop_map(PropertyValue::Integer),
        "[a-z ]{0,12}".prop_map(PropertyValue::Text),
    ]
}

/// Strategy for property maps with short lowercase names.
pub fn property_map_strategy() -> impl Strategy<Value = PropertyMap> {
    prop::collection::btree_map("[a-z]{1,8}", property_value_strategy(), 0..6)
}

/// One operation against a transaction over seeded orders.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Load a single object.
    Ensure {
        /// Object to load.
        id: ObjectId,
    },
    /// Load a batch of objects.
    EnsureAll {
        /// Objects to load, possibly with duplicates.
        ids: Vec<ObjectId>,
    },
    /// Set the `number` property.
    SetNumber {
        /// Object to modify.
        id: ObjectId,
        /// New value.
        value: i64,
    },
    /// Delete an object.
    Delete {
        /// Object to delete.
        id: ObjectId,
    },
    /// Create a new order.
    Create,
}

/// Strategy for operations over orders `1..=max`; keys above `seeded`
/// name orders the loader does not know.
pub fn store_operation_strategy(seeded: u64, max: u64) -> impl Strategy<Value = StoreOperation> {
    debug_assert!(seeded <= max);
    prop_oneof![
        3 => order_id_strategy(max).prop_map(|id| StoreOperation::Ensure { id }),
        2 => prop::collection::vec(order_id_strategy(max), 0..8)
            .prop_map(|ids| StoreOperation::EnsureAll { ids }),
        3 => (order_id_strategy(seeded), -100_i64..100)
            .prop_map(|(id, value)| StoreOperation::SetNumber { id, value }),
        1 => order_id_strategy(seeded).prop_map(|id| StoreOperation::Delete { id }),
        1 => Just(StoreOperation::Create),
    ]
}

/// Strategy for a sequence of store operations.
pub fn store_operations_strategy(
    seeded: u64,
    max: u64,
    len: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(seeded, max), 0..=len)
}

/// Case budget for property tests over transactions.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Small budget for suites that run on every build.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to a proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
