use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::compiler::{document_id, CompiledSchema, JsonSchemaCompiler, ResourceSet, SchemaCompiler};
use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};

struct Entry {
    source: Value,
    validator: Box<dyn CompiledSchema>,
}

/// Name-keyed registry of compiled JSON Schema validators.
///
/// Registration takes `&mut self`; callers sharing a registry across tasks
/// serialise access themselves.
pub struct SchemaRegistry {
    entries: HashMap<String, Entry>,
    compiler: Box<dyn SchemaCompiler>,
    config: RegistryConfig,
    #[cfg(feature = "fetch")]
    client: Option<reqwest::Client>,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("names", &self.names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config and the bundled compiler.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_compiler(config, Box::new(JsonSchemaCompiler::new(&config)))
    }

    /// Create an empty registry that compiles schemas with `compiler`.
    ///
    /// `coerce_types`, `use_defaults` and `all_errors` in `config` only reach
    /// the bundled compiler; a custom compiler owns those semantics.
    pub fn with_compiler(config: RegistryConfig, compiler: Box<dyn SchemaCompiler>) -> Self {
        Self {
            entries: HashMap::new(),
            compiler,
            config,
            #[cfg(feature = "fetch")]
            client: None,
        }
    }

    /// Compile `schema` and store it under `name`, replacing any previous entry.
    pub fn add(&mut self, name: impl Into<String>, schema: &Value) -> Result<()> {
        let name = name.into();
        let mut schema_to_compile = schema.clone();
        if self.config.strict_mode {
            apply_strict_mode(&mut schema_to_compile);
        }

        let resources = self.resources_for(&name, &schema_to_compile);
        let validator = self.compiler.compile(&schema_to_compile, &resources)?;

        let replaced = self
            .entries
            .insert(
                name.clone(),
                Entry {
                    source: schema_to_compile,
                    validator,
                },
            )
            .is_some();
        debug!(schema = %name, replaced, "registered schema");
        Ok(())
    }

    /// Parse `schema_json` and register it under `name`.
    pub fn add_json(&mut self, name: impl Into<String>, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.add(name, &schema)
    }

    /// Fetch a schema document from `uri` and register it under `name`.
    ///
    /// The fetch is the only suspension point. On any failure the existing
    /// entry under `name`, if any, is left in place.
    #[cfg(feature = "fetch")]
    pub async fn add_from_url(&mut self, name: impl Into<String>, uri: &str) -> Result<()> {
        let client = self.http_client(uri)?;
        let schema =
            crate::fetch::fetch_schema(&client, uri, self.config.max_schema_file_size).await?;
        self.add(name, &schema)
    }

    /// Use `client` for subsequent remote fetches.
    #[cfg(feature = "fetch")]
    pub fn set_http_client(&mut self, client: reqwest::Client) {
        self.client = Some(client);
    }

    #[cfg(feature = "fetch")]
    fn http_client(&mut self, uri: &str) -> Result<reqwest::Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client =
            crate::fetch::build_client(&self.config).map_err(|err| SchemaError::FetchFailed {
                uri: uri.to_string(),
                message: err.to_string(),
            })?;
        self.client = Some(client.clone());
        Ok(client)
    }

    /// Load every `*.json` file beneath a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load every `*.json` file beneath a directory with explicit config.
    ///
    /// Entries are named by their path relative to `path`, without the
    /// extension and with `/` separators (`v1/user.json` becomes `v1/user`).
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        registry.load_directory(path)?;
        Ok(registry)
    }

    /// Load every `*.json` file beneath a directory into this registry.
    pub fn load_directory(&mut self, path: &Path) -> Result<()> {
        let files = collect_schema_files(path, &self.config)?;

        let mut pending = Vec::with_capacity(files.len());
        for (name, file_path) in files {
            let content = read_schema_file(&file_path, self.config.max_schema_file_size)?;
            let schema: Value = serde_json::from_str(&content).map_err(|err| {
                SchemaError::LoadFailed(format!("{}: {err}", file_path.display()))
            })?;
            pending.push((name, schema));
        }

        // A schema may `$ref` a sibling that sorts after it, so compile
        // failures are retried until a full pass makes no progress.
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            let mut last_error = None;
            for (name, schema) in pending {
                match self.add(name.clone(), &schema) {
                    Ok(()) => {}
                    Err(err @ SchemaError::CompileFailed(_)) => {
                        last_error = Some(err);
                        deferred.push((name, schema));
                    }
                    Err(err) => return Err(err),
                }
            }
            if deferred.len() == before {
                if let Some(err) = last_error {
                    return Err(err);
                }
            }
            pending = deferred;
        }

        Ok(())
    }

    /// Build a registry from embedded `(name, schema_json)` pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (name, schema) in schemas {
            registry.add_json(*name, schema)?;
        }
        Ok(registry)
    }

    /// Validate `data` against the schema registered under `name`.
    ///
    /// On success the returned value carries any coercions and defaults. On
    /// failure the data is dropped and every violation is reported.
    pub fn validate(&self, name: &str, mut data: Value) -> Result<Value> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))?;

        entry
            .validator
            .check(&mut data)
            .map_err(|violations| SchemaError::ValidationFailed {
                name: name.to_string(),
                violations,
            })?;

        Ok(data)
    }

    /// Validate `data` in place. The prepared value is written back only when
    /// validation succeeds; rejected data is left exactly as it was.
    pub fn validate_in_place(&self, name: &str, data: &mut Value) -> Result<()> {
        let prepared = self.validate(name, data.clone())?;
        *data = prepared;
        Ok(())
    }

    /// Check if a schema is registered under `name`.
    pub fn has_schema(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered schema names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The document compiled for `name`, after strict-mode rewriting.
    pub fn schema(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|entry| &entry.source)
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn resources_for(&self, name: &str, schema: &Value) -> ResourceSet {
        let own_id = document_id(schema);
        let mut resources = ResourceSet::new();
        for (entry_name, entry) in &self.entries {
            if entry_name == name {
                continue;
            }
            if own_id.is_some() && document_id(&entry.source) == own_id {
                continue;
            }
            resources.insert_document(&entry.source);
        }
        resources
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_schema_files(root: &Path, config: &RegistryConfig) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = std::fs::read_dir(&dir)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", dir.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let entry_path = entry.path();
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let is_schema_file = file_name.ends_with(".json");
            let file_type = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?
                .file_type();

            if file_type.is_symlink() {
                if is_schema_file {
                    return Err(SchemaError::LoadFailed(format!(
                        "refusing to load schema symlink: {}",
                        entry_path.display()
                    )));
                }
                continue;
            }
            if file_type.is_dir() {
                dirs.push(entry_path);
                continue;
            }
            if !file_type.is_file() || !is_schema_file {
                continue;
            }

            let name = schema_name(root, &entry_path).ok_or_else(|| {
                SchemaError::LoadFailed(format!(
                    "unrecognized schema path: {}",
                    entry_path.display()
                ))
            })?;

            files.push((name, entry_path));
            if files.len() > config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({}): {}",
                    config.max_schemas_from_directory,
                    files.len()
                )));
            }
        }
    }

    files.sort();
    Ok(files)
}

fn schema_name(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        parts.push(component.as_os_str().to_str()?.to_string());
    }
    let last = parts.pop()?;
    parts.push(last.strip_suffix(".json")?.to_string());
    Some(parts.join("/"))
}

fn read_schema_file(path: &Path, max_bytes: usize) -> Result<String> {
    let path_metadata = std::fs::symlink_metadata(path)
        .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
    let file = std::fs::File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;
    let opened_metadata = file
        .metadata()
        .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

    #[cfg(unix)]
    {
        if !same_file_identity(&path_metadata, &opened_metadata) {
            return Err(SchemaError::LoadFailed(format!(
                "schema file changed during load: {}",
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = path_metadata;

    if opened_metadata.len() > max_bytes as u64 {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large ({} bytes): {}",
            opened_metadata.len(),
            path.display()
        )));
    }

    let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;
    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large while reading: {}",
            path.display()
        )));
    }

    Ok(content)
}

/// Close every object schema that leaves `additionalProperties` open.
///
/// Draft-07 rules: siblings of `$ref` are ignored, so a `$ref` schema is left
/// alone. Schemas combined through `allOf`/`anyOf`/`oneOf`/`if` and the
/// branches themselves stay open, because each branch only declares part of
/// the properties the combined instance carries. Array-form `dependencies`
/// name properties, not schemas.
fn apply_strict_mode(schema: &mut Value) {
    tighten(schema, false);
}

const COMBINATORS: [&str; 4] = ["allOf", "anyOf", "oneOf", "if"];

fn tighten(schema: &mut Value, branch: bool) {
    let Value::Object(map) = schema else {
        return;
    };
    if map.contains_key("$ref") {
        return;
    }

    let combined = COMBINATORS.iter().any(|keyword| map.contains_key(*keyword));
    if !branch && !combined && declares_object(map) && !map.contains_key("additionalProperties")
    {
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    for (keyword, value) in map.iter_mut() {
        match keyword.as_str() {
            "properties" | "patternProperties" | "definitions" => {
                if let Value::Object(children) = value {
                    children.values_mut().for_each(|child| tighten(child, false));
                }
            }
            "dependencies" => {
                if let Value::Object(children) = value {
                    children
                        .values_mut()
                        .filter(|child| child.is_object())
                        .for_each(|child| tighten(child, true));
                }
            }
            "additionalProperties" | "contains" | "additionalItems" => tighten(value, false),
            "items" => match value {
                Value::Array(tuple) => tuple.iter_mut().for_each(|item| tighten(item, false)),
                single => tighten(single, false),
            },
            "allOf" | "anyOf" | "oneOf" => {
                if let Value::Array(branches) = value {
                    branches.iter_mut().for_each(|sub| tighten(sub, true));
                }
            }
            "if" | "then" | "else" => tighten(value, true),
            _ => {}
        }
    }
}

fn declares_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => ["properties", "patternProperties", "required", "dependencies"]
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
