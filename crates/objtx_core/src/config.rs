//! Transaction configuration.

/// Configuration for a root transaction and the sub-transactions created from it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether leaving a scope rolls back uncommitted changes first.
    pub auto_rollback_on_scope_exit: bool,

    /// Whether sub-transactions start with the parent's extensions.
    pub inherit_extensions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_rollback_on_scope_exit: false,
            inherit_extensions: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether leaving a scope rolls back uncommitted changes.
    #[must_use]
    pub const fn auto_rollback_on_scope_exit(mut self, value: bool) -> Self {
        self.auto_rollback_on_scope_exit = value;
        self
    }

    /// Sets whether sub-transactions inherit the parent's extensions.
    #[must_use]
    pub const fn inherit_extensions(mut self, value: bool) -> Self {
        self.inherit_extensions = value;
        self
    }
}
