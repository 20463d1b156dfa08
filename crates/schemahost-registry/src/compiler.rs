use std::collections::BTreeMap;
use std::fmt;

use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::coerce::{prepare, PrepareOptions};
use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON pointer into the validated data. Empty for the document root.
    pub instance_path: String,
    /// JSON pointer into the schema, ending at the failing keyword.
    pub schema_path: String,
    /// The failing keyword (`type`, `required`, `minimum`, ...).
    pub keyword: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.instance_path.is_empty() {
            "/"
        } else {
            self.instance_path.as_str()
        };
        write!(f, "{path}: {}", self.message)
    }
}

/// Schema documents addressable by their `$id`.
///
/// Keys are absolute URIs without a fragment, so `https://x/user.json#` and
/// `https://x/user.json` name the same document.
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    documents: BTreeMap<String, Value>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document under its `$id`. Documents without a usable `$id` are ignored.
    pub fn insert_document(&mut self, document: &Value) -> bool {
        match document_id(document) {
            Some(id) => {
                self.documents.insert(id, document.clone());
                true
            }
            None => false,
        }
    }

    /// Look up a document by absolute URI. A trailing fragment is ignored.
    pub fn get(&self, uri: &str) -> Option<&Value> {
        let key = uri.split_once('#').map_or(uri, |(base, _)| base);
        self.documents.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.documents.iter().map(|(id, doc)| (id.as_str(), doc))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Normalized `$id` of a schema document, if it declares an absolute one.
pub fn document_id(document: &Value) -> Option<String> {
    let raw = document.get("$id")?.as_str()?;
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Turns a schema document into an executable check.
pub trait SchemaCompiler: Send + Sync {
    /// Compile `schema`. `resources` holds every other registered document so
    /// cross-schema `$ref`s can resolve.
    fn compile(&self, schema: &Value, resources: &ResourceSet) -> Result<Box<dyn CompiledSchema>>;
}

/// A compiled validator bound to one schema document.
pub trait CompiledSchema: Send + Sync {
    /// Check `data`, preparing it in place first if the compiler supports
    /// coercion or defaults. Returns every violation found.
    fn check(&self, data: &mut Value) -> std::result::Result<(), Vec<Violation>>;
}

/// Default compiler backed by the `jsonschema` crate.
///
/// Schemas without `$schema` are treated as draft-07 and `format` is always
/// asserted. References to documents
/// outside the resource set are compile errors; nothing is retrieved from the
/// network or disk during compilation.
#[derive(Debug, Clone, Copy)]
pub struct JsonSchemaCompiler {
    prepare: PrepareOptions,
    all_errors: bool,
}

impl JsonSchemaCompiler {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            prepare: PrepareOptions {
                coerce_types: config.coerce_types,
                use_defaults: config.use_defaults,
            },
            all_errors: config.all_errors,
        }
    }
}

impl Default for JsonSchemaCompiler {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl SchemaCompiler for JsonSchemaCompiler {
    fn compile(&self, schema: &Value, resources: &ResourceSet) -> Result<Box<dyn CompiledSchema>> {
        let mut options = jsonschema::options().should_validate_formats(true);
        if schema.get("$schema").is_none() {
            options = options.with_draft(Draft::Draft7);
        }
        for (uri, document) in resources.iter() {
            options = options.with_resource(uri, Draft::Draft7.create_resource(document.clone()));
        }

        let validator = options
            .build(schema)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;

        tracing::debug!(resources = resources.len(), "compiled schema");

        Ok(Box::new(JsonSchemaValidator {
            validator,
            schema: schema.clone(),
            resources: resources.clone(),
            prepare: self.prepare,
            all_errors: self.all_errors,
        }))
    }
}

struct JsonSchemaValidator {
    validator: Validator,
    schema: Value,
    resources: ResourceSet,
    prepare: PrepareOptions,
    all_errors: bool,
}

impl CompiledSchema for JsonSchemaValidator {
    fn check(&self, data: &mut Value) -> std::result::Result<(), Vec<Violation>> {
        prepare(&self.schema, data, &self.resources, self.prepare);

        let errors = self.validator.iter_errors(data).map(|err| {
            let schema_path = err.schema_path().to_string();
            let keyword = schema_path
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            Violation {
                instance_path: err.instance_path().to_string(),
                schema_path,
                keyword,
                message: err.to_string(),
            }
        });

        let violations: Vec<Violation> = if self.all_errors {
            errors.collect()
        } else {
            errors.take(1).collect()
        };

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
