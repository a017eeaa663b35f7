//! Error types for objtx core.

use crate::object::ObjectId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Message used by every operation on a discarded transaction.
pub const DISCARDED_MESSAGE: &str =
    "The transaction can no longer be used because it has been discarded.";

/// Errors that can occur in objtx core operations.
///
/// None of these describe transient faults; retrying the same call on the
/// same transaction yields the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The object has been finalized to `Invalid` in this transaction.
    #[error("Object '{id}' is invalid in this transaction.")]
    InvalidObject {
        /// The invalid object.
        id: ObjectId,
    },

    /// The loader returned no record for one or more identifiers.
    #[error("Object(s) could not be found: {}.", quote_ids(.ids))]
    ObjectsNotFound {
        /// Unresolved identifiers, sorted.
        ids: Vec<ObjectId>,
    },

    /// The transaction has been discarded.
    #[error("{}", DISCARDED_MESSAGE)]
    TransactionDiscarded,

    /// The object is deleted and its data can no longer be modified.
    #[error("Object '{id}' is already deleted.")]
    ObjectDeleted {
        /// The deleted object.
        id: ObjectId,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// No transaction scope is active on this thread.
    #[error("no current transaction: enter a transaction scope first")]
    NoCurrentTransaction,

    /// The external loader failed.
    #[error("loader error: {message}")]
    Loader {
        /// Description supplied by the loader.
        message: String,
    },

    /// A listener refused an operation.
    #[error("operation vetoed: {reason}")]
    Vetoed {
        /// Reason given by the listener.
        reason: String,
    },

    /// An object identifier could not be parsed.
    #[error("invalid object id '{input}': {reason}")]
    InvalidObjectId {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl CoreError {
    /// Creates an invalid object error.
    pub fn invalid_object(id: ObjectId) -> Self {
        Self::InvalidObject { id }
    }

    /// Creates a not-found error; identifiers are sorted for a stable message.
    pub fn objects_not_found(mut ids: Vec<ObjectId>) -> Self {
        ids.sort();
        ids.dedup();
        Self::ObjectsNotFound { ids }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a loader error.
    pub fn loader(message: impl Into<String>) -> Self {
        Self::Loader {
            message: message.into(),
        }
    }

    /// Creates a veto error.
    pub fn vetoed(reason: impl Into<String>) -> Self {
        Self::Vetoed {
            reason: reason.into(),
        }
    }

    /// Creates an invalid object id error.
    pub fn invalid_object_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObjectId {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

fn quote_ids(ids: &[ObjectId]) -> String {
    ids.iter()
        .map(|id| format!("'{id}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
