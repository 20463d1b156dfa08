//! Named registry of compiled JSON Schema validators.
//!
//! Register schemas from memory, a directory, or a URL, then validate JSON
//! data against them by name. Validation coerces scalars toward declared
//! types, fills in declared defaults, and reports every violation at once.
//!
//! Schema evaluation is delegated to the `jsonschema` crate behind the
//! [`SchemaCompiler`] seam; swap in another engine with
//! [`SchemaRegistry::with_compiler`].

pub mod coerce;
pub mod compiler;
pub mod config;
pub mod error;
#[cfg(feature = "fetch")]
pub mod fetch;
pub mod registry;

pub use compiler::{CompiledSchema, JsonSchemaCompiler, ResourceSet, SchemaCompiler, Violation};
pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
