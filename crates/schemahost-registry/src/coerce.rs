//! Schema-guided preparation of data before it is checked: scalar type
//! coercion and default insertion.
//!
//! Coercion only moves values away from strings, booleans and null toward
//! the declared type. Nothing is coerced into a string: a number where a
//! string is declared stays a type error.
//!
//! The walk follows `properties`, `patternProperties`, `additionalProperties`,
//! `items`, `additionalItems`, `allOf` and `$ref`. A nested `$id` rebases
//! relative references the same way the evaluator does. Branching keywords
//! (`anyOf`, `oneOf`, `if`/`then`/`else`) are not entered because a branch is
//! only known after evaluation.

use regex::Regex;
use serde_json::{Map, Number, Value};
use url::Url;

use crate::compiler::{document_id, ResourceSet};

/// Which preparation steps run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    pub coerce_types: bool,
    pub use_defaults: bool,
}

// Bounds `$ref` cycles such as recursive tree schemas.
const MAX_DEPTH: usize = 64;

// Base for documents without an absolute `$id`, so relative `$id`s still join.
const DEFAULT_BASE: &str = "json-schema:///";

/// Coerce and default `data` in place according to `schema`.
pub fn prepare(schema: &Value, data: &mut Value, resources: &ResourceSet, options: PrepareOptions) {
    if !options.coerce_types && !options.use_defaults {
        return;
    }

    let base = document_id(schema)
        .and_then(|id| Url::parse(&id).ok())
        .or_else(|| Url::parse(DEFAULT_BASE).ok());
    let scope = Scope {
        root: schema,
        document: schema,
        base,
    };
    let walker = Walker { resources, options };
    walker.walk(schema, data, &scope, 0);
}

#[derive(Clone)]
struct Scope<'s> {
    /// Top-level document, searched for embedded `$id`s.
    root: &'s Value,
    /// Innermost schema resource; local fragments resolve against it.
    document: &'s Value,
    base: Option<Url>,
}

struct Walker<'s> {
    resources: &'s ResourceSet,
    options: PrepareOptions,
}

impl<'s> Walker<'s> {
    fn walk(&self, schema: &'s Value, data: &mut Value, scope: &Scope<'s>, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let Value::Object(keywords) = schema else {
            return;
        };

        // Draft-07: siblings of `$ref`, `$id` included, are ignored.
        if let Some(Value::String(reference)) = keywords.get("$ref") {
            if let Some((target, target_scope)) = self.resolve(reference, scope) {
                self.walk(target, data, &target_scope, depth + 1);
            }
            return;
        }

        let rebased;
        let scope = match rebase(schema, scope) {
            Some(inner) => {
                rebased = inner;
                &rebased
            }
            None => scope,
        };

        if self.options.coerce_types {
            if let Some(types) = keywords.get("type") {
                coerce_value(data, types);
            }
        }

        if let Value::Object(object) = data {
            self.walk_object(keywords, object, scope, depth);
        }

        if let Value::Array(items) = data {
            self.walk_array(keywords, items, scope, depth);
        }

        if let Some(Value::Array(all_of)) = keywords.get("allOf") {
            for sub in all_of {
                self.walk(sub, data, scope, depth + 1);
            }
        }
    }

    fn walk_object(
        &self,
        keywords: &'s Map<String, Value>,
        object: &mut Map<String, Value>,
        scope: &Scope<'s>,
        depth: usize,
    ) {
        let properties = match keywords.get("properties") {
            Some(Value::Object(properties)) => Some(properties),
            _ => None,
        };

        if let Some(properties) = properties {
            for (key, sub) in properties {
                if self.options.use_defaults && !object.contains_key(key) {
                    if let Some(default) = sub.get("default") {
                        object.insert(key.clone(), default.clone());
                    }
                }
                if let Some(value) = object.get_mut(key) {
                    self.walk(sub, value, scope, depth + 1);
                }
            }
        }

        let mut patterns = Vec::new();
        let mut unreadable_pattern = false;
        if let Some(Value::Object(pattern_properties)) = keywords.get("patternProperties") {
            for (pattern, sub) in pattern_properties {
                match Regex::new(pattern) {
                    Ok(regex) => patterns.push((regex, sub)),
                    Err(err) => {
                        tracing::debug!(pattern, error = %err, "pattern not walked for coercion");
                        unreadable_pattern = true;
                    }
                }
            }
        }

        for (key, value) in object.iter_mut() {
            for (regex, sub) in &patterns {
                if regex.is_match(key) {
                    self.walk(*sub, value, scope, depth + 1);
                }
            }
        }

        // An unreadable pattern might claim any key, so no key is known to be
        // additional.
        if unreadable_pattern {
            return;
        }
        if let Some(additional @ Value::Object(_)) = keywords.get("additionalProperties") {
            for (key, value) in object.iter_mut() {
                let declared = properties.is_some_and(|p| p.contains_key(key))
                    || patterns.iter().any(|(regex, _)| regex.is_match(key));
                if !declared {
                    self.walk(additional, value, scope, depth + 1);
                }
            }
        }
    }

    fn walk_array(
        &self,
        keywords: &'s Map<String, Value>,
        items: &mut Vec<Value>,
        scope: &Scope<'s>,
        depth: usize,
    ) {
        match keywords.get("items") {
            Some(Value::Array(tuple)) => {
                if self.options.use_defaults {
                    // Positions are filled in order; a gap without a default
                    // ends the fill.
                    for item_schema in tuple.iter().skip(items.len()) {
                        match item_schema.get("default") {
                            Some(default) => items.push(default.clone()),
                            None => break,
                        }
                    }
                }
                for (item_schema, item) in tuple.iter().zip(items.iter_mut()) {
                    self.walk(item_schema, item, scope, depth + 1);
                }
                if let Some(additional @ Value::Object(_)) = keywords.get("additionalItems") {
                    for item in items.iter_mut().skip(tuple.len()) {
                        self.walk(additional, item, scope, depth + 1);
                    }
                }
            }
            Some(item_schema) => {
                for item in items.iter_mut() {
                    self.walk(item_schema, item, scope, depth + 1);
                }
            }
            None => {}
        }
    }

    fn resolve(&self, reference: &str, scope: &Scope<'s>) -> Option<(&'s Value, Scope<'s>)> {
        let (location, fragment) = match reference.split_once('#') {
            Some((location, fragment)) => (location, fragment),
            None => (reference, ""),
        };

        let (root, document, base) = if location.is_empty() {
            (scope.root, scope.document, scope.base.clone())
        } else {
            let mut url = match &scope.base {
                Some(base) => base.join(location).ok()?,
                None => Url::parse(location).ok()?,
            };
            url.set_fragment(None);
            if scope.base.as_ref() == Some(&url) {
                (scope.root, scope.document, scope.base.clone())
            } else if let Some(registered) = self.resources.get(url.as_str()) {
                (registered, registered, Some(url))
            } else {
                let root_base = document_id(scope.root)
                    .and_then(|id| Url::parse(&id).ok())
                    .or_else(|| Url::parse(DEFAULT_BASE).ok());
                let embedded = find_embedded(scope.root, root_base.as_ref(), &url, 0)?;
                (scope.root, embedded, Some(url))
            }
        };

        let target = if fragment.is_empty() {
            document
        } else {
            document.pointer(fragment)?
        };

        Some((
            target,
            Scope {
                root,
                document,
                base,
            },
        ))
    }
}

/// Scope for `schema` when it declares its own `$id`.
fn rebase<'s>(schema: &'s Value, scope: &Scope<'s>) -> Option<Scope<'s>> {
    let mut url = embedded_id(schema, scope.base.as_ref())?;
    url.set_fragment(None);
    if scope.base.as_ref() == Some(&url) {
        return None;
    }
    Some(Scope {
        root: scope.root,
        document: schema,
        base: Some(url),
    })
}

/// Resolved `$id` of a subschema. Plain-name fragments (`#foo`) are anchors,
/// not new resources.
fn embedded_id(schema: &Value, base: Option<&Url>) -> Option<Url> {
    let id = schema.get("$id")?.as_str()?;
    if id.starts_with('#') {
        return None;
    }
    let mut url = match base {
        Some(base) => base.join(id).ok()?,
        None => Url::parse(id).ok()?,
    };
    url.set_fragment(None);
    Some(url)
}

/// Find the subschema of `schema` whose resolved `$id` is `target`.
fn find_embedded<'s>(
    schema: &'s Value,
    base: Option<&Url>,
    target: &Url,
    depth: usize,
) -> Option<&'s Value> {
    if depth > MAX_DEPTH {
        return None;
    }
    let own = embedded_id(schema, base);
    if own.as_ref() == Some(target) {
        return Some(schema);
    }
    let base = own.as_ref().or(base);
    match schema {
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "enum" | "const" | "default" | "examples"))
            .find_map(|(_, value)| find_embedded(value, base, target, depth + 1)),
        Value::Array(values) => values
            .iter()
            .find_map(|value| find_embedded(value, base, target, depth + 1)),
        _ => None,
    }
}

fn coerce_value(data: &mut Value, types: &Value) {
    let declared: Vec<&str> = match types {
        Value::String(kind) => vec![kind.as_str()],
        Value::Array(kinds) => kinds.iter().filter_map(Value::as_str).collect(),
        _ => return,
    };

    if declared.iter().any(|kind| matches_type(data, kind)) {
        return;
    }

    for kind in declared {
        if let Some(coerced) = coerce_to(data, kind) {
            *data = coerced;
            return;
        }
    }
}

fn matches_type(value: &Value, kind: &str) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => is_integral(value),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => false,
    }
}

fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => false,
    }
}

fn coerce_to(value: &Value, kind: &str) -> Option<Value> {
    match (kind, value) {
        ("number", Value::String(s)) => parse_number(s),
        ("integer", Value::String(s)) => parse_number(s).filter(is_integral),
        ("number" | "integer", Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        ("number" | "integer", Value::Null) => Some(Value::from(0)),

        ("boolean", Value::String(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("boolean", Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(Value::Bool(true)),
            Some(f) if f == 0.0 => Some(Value::Bool(false)),
            _ => None,
        },
        ("boolean", Value::Null) => Some(Value::Bool(false)),

        ("null", Value::String(s)) if s.is_empty() => Some(Value::Null),
        ("null", Value::Number(n)) if n.as_f64() == Some(0.0) => Some(Value::Null),
        ("null", Value::Bool(false)) => Some(Value::Null),

        _ => None,
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    let float = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        return Some(Value::from(float as i64));
    }
    Number::from_f64(float).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ALL: PrepareOptions = PrepareOptions {
        coerce_types: true,
        use_defaults: true,
    };

    fn run(schema: Value, mut data: Value) -> Value {
        prepare(&schema, &mut data, &ResourceSet::new(), ALL);
        data
    }

    #[test]
    fn numeric_strings_become_numbers() {
        let schema = json!({
            "type": "object",
            "properties": {
                "age": { "type": "integer" },
                "ratio": { "type": "number" },
                "count": { "type": "integer" }
            }
        });

        let out = run(schema, json!({ "age": "20", "ratio": "0.5", "count": "2.5" }));
        assert_eq!(out, json!({ "age": 20, "ratio": 0.5, "count": "2.5" }));
    }

    #[test]
    fn booleans_and_null_coerce() {
        let schema = json!({
            "type": "object",
            "properties": {
                "flag": { "type": "boolean" },
                "on": { "type": "boolean" },
                "n": { "type": "number" },
                "empty": { "type": "null" }
            }
        });

        let out = run(
            schema,
            json!({ "flag": "false", "on": 1, "n": false, "empty": "" }),
        );
        assert_eq!(
            out,
            json!({ "flag": false, "on": true, "n": 0, "empty": null })
        );
    }

    #[test]
    fn ambiguous_values_are_left_alone() {
        let schema = json!({
            "type": "object",
            "properties": {
                "age": { "type": "integer" },
                "flag": { "type": "boolean" },
                "tags": { "type": "string" },
                "name": { "type": "string" }
            }
        });

        let data = json!({ "age": "abc", "flag": "yes", "tags": ["a"], "name": 123 });
        assert_eq!(run(schema, data.clone()), data);
    }

    #[test]
    fn type_list_keeps_matching_value_and_tries_in_order() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": { "type": ["string", "integer"] },
                "b": { "type": ["boolean", "integer"] },
                "c": { "type": ["null", "string"] }
            }
        });

        let out = run(schema, json!({ "a": "7", "b": "1", "c": 0 }));
        assert_eq!(out, json!({ "a": "7", "b": 1, "c": null }));
    }

    #[test]
    fn defaults_fill_missing_properties_only() {
        let schema = json!({
            "type": "object",
            "properties": {
                "flag": { "type": "boolean", "default": false },
                "role": { "type": "string", "default": "member" },
                "tags": { "type": "array", "default": [] }
            }
        });

        let out = run(schema, json!({ "role": "admin" }));
        assert_eq!(out, json!({ "flag": false, "role": "admin", "tags": [] }));
    }

    #[test]
    fn nested_items_and_all_of_are_walked() {
        let schema = json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "age": { "type": "integer" } }
                    }
                },
                "pair": {
                    "type": "array",
                    "items": [{ "type": "integer" }, { "type": "boolean" }]
                }
            },
            "allOf": [
                { "properties": { "count": { "type": "integer", "default": 0 } } }
            ]
        });

        let out = run(
            schema,
            json!({ "data": [{ "age": "1" }, { "age": 2 }], "pair": ["3", "true"] }),
        );
        assert_eq!(
            out,
            json!({ "data": [{ "age": 1 }, { "age": 2 }], "pair": [3, true], "count": 0 })
        );
    }

    #[test]
    fn additional_properties_schema_applies_to_undeclared_keys() {
        let schema = json!({
            "type": "object",
            "properties": { "id": { "type": "integer" } },
            "additionalProperties": { "type": "number" }
        });

        let out = run(schema, json!({ "id": "5", "x": "1.5" }));
        assert_eq!(out, json!({ "id": 5, "x": 1.5 }));
    }

    #[test]
    fn pattern_properties_take_keys_away_from_additional_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "id": { "type": "integer" } },
            "patternProperties": {
                "^s_": { "type": "string" },
                "^n_": { "type": "integer" }
            },
            "additionalProperties": { "type": "number" }
        });

        let out = run(
            schema,
            json!({ "id": "1", "s_x": "1", "n_y": "2", "other": "3.5" }),
        );
        assert_eq!(
            out,
            json!({ "id": 1, "s_x": "1", "n_y": 2, "other": 3.5 })
        );
    }

    #[test]
    fn unreadable_pattern_disables_additional_properties_walk() {
        let schema = json!({
            "type": "object",
            "patternProperties": { "(?<=a)b": { "type": "string" } },
            "additionalProperties": { "type": "number" }
        });

        let data = json!({ "ab": "1" });
        assert_eq!(run(schema, data.clone()), data);
    }

    #[test]
    fn tuple_items_get_trailing_defaults_and_additional_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "p": {
                    "type": "array",
                    "items": [{ "type": "integer" }, { "type": "integer", "default": 7 }],
                    "additionalItems": { "type": "boolean" }
                },
                "q": {
                    "type": "array",
                    "items": [{ "type": "integer" }, { "type": "integer" }, { "default": 3 }]
                }
            }
        });

        let out = run(
            schema.clone(),
            json!({ "p": ["1"], "q": [1] }),
        );
        assert_eq!(out, json!({ "p": [1, 7], "q": [1] }));

        let out = run(schema, json!({ "p": ["1", "2", "true", 0] }));
        assert_eq!(out, json!({ "p": [1, 2, true, false] }));
    }

    #[test]
    fn nested_id_rebases_relative_refs() {
        let schema = json!({
            "$id": "https://example.com/root.json",
            "type": "object",
            "properties": {
                "x": { "$ref": "sub/inner.json" },
                "y": { "$ref": "#/definitions/inner" }
            },
            "definitions": {
                "inner": {
                    "$id": "sub/inner.json",
                    "type": "object",
                    "properties": { "v": { "$ref": "#/definitions/n" } },
                    "definitions": { "n": { "type": "integer" } }
                }
            }
        });

        let out = run(schema, json!({ "x": { "v": "5" }, "y": { "v": "6" } }));
        assert_eq!(out, json!({ "x": { "v": 5 }, "y": { "v": 6 } }));
    }

    #[test]
    fn relative_nested_id_without_root_id() {
        let schema = json!({
            "properties": { "a": { "$ref": "#/definitions/inner" } },
            "definitions": {
                "inner": {
                    "$id": "inner.json",
                    "properties": { "b": { "$ref": "#/definitions/flag" } },
                    "definitions": { "flag": { "type": "boolean" } }
                }
            }
        });

        let out = run(schema, json!({ "a": { "b": "true" } }));
        assert_eq!(out, json!({ "a": { "b": true } }));
    }

    #[test]
    fn local_and_registered_refs_are_followed() {
        let mut resources = ResourceSet::new();
        resources.insert_document(&json!({
            "$id": "https://example.com/schemas/user.json",
            "type": "object",
            "properties": {
                "age": { "type": "integer" },
                "active": { "type": "boolean", "default": true }
            }
        }));

        let schema = json!({
            "$id": "https://example.com/schemas/users.json",
            "definitions": { "count": { "type": "integer" } },
            "type": "object",
            "properties": {
                "data": { "type": "array", "items": { "$ref": "user.json" } },
                "count": { "$ref": "#/definitions/count" }
            }
        });

        let mut data = json!({ "data": [{ "age": "10" }], "count": "1" });
        prepare(&schema, &mut data, &resources, ALL);
        assert_eq!(
            data,
            json!({ "data": [{ "age": 10, "active": true }], "count": 1 })
        );
    }

    #[test]
    fn recursive_refs_terminate() {
        let schema = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {
                        "value": { "type": "integer" },
                        "next": { "$ref": "#/definitions/node" }
                    }
                }
            },
            "$ref": "#/definitions/node"
        });

        let out = run(
            schema,
            json!({ "value": "1", "next": { "value": "2", "next": { "value": 3 } } }),
        );
        assert_eq!(
            out,
            json!({ "value": 1, "next": { "value": 2, "next": { "value": 3 } } })
        );

        let self_ref = json!({ "$ref": "#" });
        assert_eq!(run(self_ref, json!("x")), json!("x"));
    }

    #[test]
    fn disabled_options_leave_data_untouched() {
        let schema = json!({
            "type": "object",
            "properties": { "age": { "type": "integer", "default": 1 } }
        });
        let mut data = json!({});
        prepare(
            &schema,
            &mut data,
            &ResourceSet::new(),
            PrepareOptions {
                coerce_types: true,
                use_defaults: false,
            },
        );
        assert_eq!(data, json!({}));

        let mut data = json!({ "age": "3" });
        prepare(
            &schema,
            &mut data,
            &ResourceSet::new(),
            PrepareOptions {
                coerce_types: false,
                use_defaults: true,
            },
        );
        assert_eq!(data, json!({ "age": "3" }));
    }
}
