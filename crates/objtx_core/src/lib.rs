//! # objtx Core
//!
//! In-process transactional object store.
//!
//! This crate provides:
//! - A per-transaction state registry driving each object through
//!   `NotLoadedYet`, `New`, `Unchanged`, `Changed`, `Deleted` and `Invalid`
//! - Batched, lazy loading through a pluggable [`ObjectLoader`]
//! - Commit and rollback notification chains that re-run for objects
//!   enlisted while they are in progress
//! - Sub-transactions that read through their parent and push changes into
//!   it on commit
//! - A thread-local stack of current transactions
//! - A guard that makes every operation on a discarded transaction fail
//!
//! ## Example
//!
//! ```
//! use objtx_core::{ClassId, DataRecord, MemoryLoader, ObjectId, ObjectState, Transaction};
//! use std::sync::Arc;
//!
//! let order = ObjectId::generate(ClassId::new("Order"));
//! let loader = Arc::new(MemoryLoader::with_records([
//!     DataRecord::new(order.clone()).with("number", 1_i64),
//! ]));
//!
//! let tx = Transaction::create_root(loader);
//! tx.set_value(&order, "number", 2_i64)?;
//! assert_eq!(tx.state(&order)?, ObjectState::Changed);
//!
//! tx.rollback()?;
//! assert_eq!(tx.state(&order)?, ObjectState::Unchanged);
//! # Ok::<(), objtx_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod event;
mod loader;
pub mod object;
mod registry;
mod transaction;
mod types;

pub use config::Config;
pub use error::{CoreError, CoreResult, DISCARDED_MESSAGE};
pub use event::{
    handler_fn, listener_fn, CommittingEventRegistrar, DiscardedTransactionGuard, EventKind,
    ExtensionCollection, ObjectEvent, ObjectEventHandler, QueryResult, TransactionEvent,
    TransactionExtension, TransactionListener,
};
pub use loader::{MemoryLoader, ObjectLoader};
pub use object::{ClassId, DataRecord, ObjectId, ObjectState, PropertyMap, PropertyValue};
pub use transaction::{ScopeExit, Transaction, TransactionScope};
pub use types::{TransactionId, TransactionStatus};
