use std::time::Duration;

/// Controls schema compilation and validation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Coerce scalar values toward the schema-declared type before checking.
    pub coerce_types: bool,
    /// Insert `default` values for object properties missing from the data.
    pub use_defaults: bool,
    /// Collect every violation instead of stopping at the first one.
    pub all_errors: bool,
    /// When true, object schemas reject properties they do not declare.
    pub strict_mode: bool,
    /// Maximum number of schemas loaded from a directory.
    pub max_schemas_from_directory: usize,
    /// Maximum bytes allowed per schema file or fetched schema document.
    pub max_schema_file_size: usize,
    /// Request timeout applied to remote schema fetches. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            coerce_types: true,
            use_defaults: true,
            all_errors: true,
            strict_mode: false,
            max_schemas_from_directory: 256,
            max_schema_file_size: 256 * 1024,
            fetch_timeout: None,
        }
    }
}
