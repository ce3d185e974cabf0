//! Configuration for the sync engine.

use satchel_model::StateNamespace;

/// Configuration for a [`crate::Satchel`] engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Namespace isolating this engine's state per app and user.
    pub namespace: StateNamespace,
    /// Field whose trimmed text value is a payload's natural key, used
    /// to match a pending-create record to its server-assigned identity.
    pub natural_key_field: String,
    /// How many rejections an intent survives before it is
    /// dead-lettered.
    pub max_rejected_attempts: u32,
    /// Whether reads trigger a background refresh of the collection.
    pub refresh_on_read: bool,
}

impl EngineConfig {
    /// Creates a configuration with defaults for the given namespace.
    pub fn new(namespace: StateNamespace) -> Self {
        Self {
            namespace,
            natural_key_field: "name".to_string(),
            max_rejected_attempts: 3,
            refresh_on_read: true,
        }
    }

    /// Sets the natural-key field.
    pub fn with_natural_key_field(mut self, field: impl Into<String>) -> Self {
        self.natural_key_field = field.into();
        self
    }

    /// Sets the rejected-retry budget.
    pub fn with_max_rejected_attempts(mut self, attempts: u32) -> Self {
        self.max_rejected_attempts = attempts.max(1);
        self
    }

    /// Enables or disables background refresh on reads.
    pub fn with_refresh_on_read(mut self, refresh: bool) -> Self {
        self.refresh_on_read = refresh;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(StateNamespace::new("satchel", "default"))
    }
}
