//! Object state machine.

use std::fmt;

/// Lifecycle state of an object within one transaction.
///
/// ```text
/// NotLoadedYet ──load──> Unchanged | Invalid
/// Unchanged ──set_value──> Changed ──commit/rollback──> Unchanged
/// Unchanged | Changed ──delete──> Deleted ──commit/rollback──> Invalid
/// New ──commit──> Unchanged
/// New ──delete/rollback──> Invalid
/// ```
///
/// `Invalid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// Enlisted, data not yet materialized.
    NotLoadedYet,
    /// Created in this transaction.
    New,
    /// Loaded and not modified.
    Unchanged,
    /// Loaded and modified, or registered for commit.
    Changed,
    /// Marked for deletion.
    Deleted,
    /// No longer usable in this transaction.
    Invalid,
}

impl ObjectState {
    /// Returns true if the object takes part in commit and rollback.
    #[must_use]
    pub const fn is_affected(self) -> bool {
        matches!(self, Self::New | Self::Changed | Self::Deleted)
    }

    /// Returns true if the object's data is materialized and usable.
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::NotLoadedYet | Self::Invalid)
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid)
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotLoadedYet => "NotLoadedYet",
            Self::New => "New",
            Self::Unchanged => "Unchanged",
            Self::Changed => "Changed",
            Self::Deleted => "Deleted",
            Self::Invalid => "Invalid",
        };
        f.write_str(name)
    }
}
