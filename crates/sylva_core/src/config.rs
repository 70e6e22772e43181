//! Hierarchy index configuration.

/// Current storage part format version.
pub const STORAGE_FORMAT_VERSION: u8 = 1;

/// Configuration for hierarchy indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Whether the "all attached nodes" bitmap is memoized between mutations.
    pub memoize_all_nodes: bool,

    /// Whether rehydrated indexes are checked against the tree invariants.
    pub verify_on_load: bool,

    /// Format version written into persisted storage parts.
    pub storage_format_version: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memoize_all_nodes: true,
            verify_on_load: false,
            storage_format_version: STORAGE_FORMAT_VERSION,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the all-nodes bitmap is memoized.
    #[must_use]
    pub const fn memoize_all_nodes(mut self, value: bool) -> Self {
        self.memoize_all_nodes = value;
        self
    }

    /// Sets whether loaded indexes are verified.
    #[must_use]
    pub const fn verify_on_load(mut self, value: bool) -> Self {
        self.verify_on_load = value;
        self
    }

    /// Sets the storage format version.
    #[must_use]
    pub const fn storage_format_version(mut self, version: u8) -> Self {
        self.storage_format_version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.memoize_all_nodes);
        assert!(!config.verify_on_load);
        assert_eq!(config.storage_format_version, STORAGE_FORMAT_VERSION);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .memoize_all_nodes(false)
            .verify_on_load(true);

        assert!(!config.memoize_all_nodes);
        assert!(config.verify_on_load);
    }
}
