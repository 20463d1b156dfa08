//! Register JSON Schemas by name and validate data against them.
//!
//! # Crate Structure
//!
//! - [`registry`]: Schema registry, compiler seam, coercion/defaults, URL fetch
//! - [`server`]: HTTP host publishing a schema directory (behind `server` feature)
//!
//! ```no_run
//! use schemahost::registry::SchemaRegistry;
//! use serde_json::json;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.add("user", &json!({
//!     "type": "object",
//!     "properties": { "age": { "type": "integer" } }
//! }))?;
//! let user = registry.validate("user", json!({ "age": "20" }))?;
//! assert_eq!(user["age"], 20);
//! # Ok::<(), schemahost::registry::SchemaError>(())
//! ```

/// Re-export registry types.
pub mod registry {
    pub use schemahost_registry::*;
}

/// Re-export schema host types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use schemahost_server::*;
}
