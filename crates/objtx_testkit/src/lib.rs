//! # objtx Testkit
//!
//! Test utilities for objtx.
//!
//! This crate provides:
//! - Seeded loaders and transactions ([`TestStore`], [`loader_from_json`])
//! - Recording listeners and object handlers
//! - Property-based test generators using proptest
//! - A `tracing` subscriber for tests
//!
//! ## Usage
//!
//! ```rust
//! use objtx_testkit::prelude::*;
//!
//! let store = TestStore::with_orders(2);
//! let recorder = RecordingListener::new();
//! store.add_listener(recorder.clone()).unwrap();
//! store.ensure_data_available(&order_id(1)).unwrap();
//! assert_eq!(recorder.count(EventKind::ObjectsLoaded), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recording::*;
    pub use objtx_core::{
        ClassId, CoreError, EventKind, ObjectId, ObjectState, PropertyValue, Transaction,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use recording::*;
