//! HTTP host for JSON Schema documents.
//!
//! Files under the configured directory are served at `/schemas/<path>`, ready
//! for `SchemaRegistry::add_from_url`. Every other path answers with a JSON
//! index of the hosted documents.

pub mod config;
pub mod error;
pub mod index;
pub mod server;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use index::{IndexEntry, SchemaIndex};
pub use server::SchemaServer;
