//! Feature-variant lookup.
//!
//! Some job settings (the persistence chunk size, for one) can be tuned at
//! runtime through a flag whose variant overrides the static configuration.

use std::collections::HashMap;

/// Source of feature-flag variants.
pub trait FeatureFlags: Send + Sync {
    /// Returns the variant currently assigned to `flag`, if any.
    fn variant(&self, flag: &str) -> Option<String>;
}

/// Flag variants fixed at startup, usually from the `features` config table.
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    variants: HashMap<String, String>,
}

impl StaticFlags {
    /// Creates a flag set from a flag → variant map.
    #[must_use]
    pub fn new(variants: HashMap<String, String>) -> Self {
        Self { variants }
    }

    /// Assigns a variant, replacing any previous one.
    #[must_use]
    pub fn with(mut self, flag: impl Into<String>, variant: impl Into<String>) -> Self {
        self.variants.insert(flag.into(), variant.into());
        self
    }
}

impl FeatureFlags for StaticFlags {
    fn variant(&self, flag: &str) -> Option<String> {
        self.variants.get(flag).cloned()
    }
}
