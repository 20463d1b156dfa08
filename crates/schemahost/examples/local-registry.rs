//! Register the bundled schemas from memory and validate sample objects.
//!
//! Run with:
//!   cargo run --example local-registry

use std::path::Path;

use schemahost::registry::SchemaRegistry;
use serde_json::{json, Value};

fn load(relative: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../schemas")
        .join(relative);
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = SchemaRegistry::new();

    // `users` refers to `user.json`; registering `user` first makes its `$id`
    // resolvable from every schema added afterwards.
    registry.add("user", &load("v1/user.json")?)?;
    registry.add("users", &load("v1/users.json")?)?;
    registry.add("location", &load("v1/location.json")?)?;
    registry.add("userWithLocation", &load("v1/user-with-location.json")?)?;

    let user = json!({ "name": "John Doe", "age": 10 });
    let validated_user = registry.validate("user", user.clone())?;
    println!("validatedUser: {validated_user}");

    let users = json!({
        "data": [user, { "name": "Jane Doe", "age": "1" }],
        "count": 1
    });
    let validated_users = registry.validate("users", users)?;
    println!("validatedUsers: {validated_users}");

    // 1, 0, true, false, "true" and "false" are all accepted for `flag`.
    let user_with_location = json!({
        "name": "John Doe",
        "age": 1,
        "latitude": 85,
        "longitude": 180,
        "flag": "false"
    });
    let validated = registry.validate("userWithLocation", user_with_location)?;
    println!("validatedUserWithLocation: {validated}");

    match registry.validate("user", json!({ "name": 123, "age": "abc" })) {
        Ok(value) => println!("unexpectedly valid: {value}"),
        Err(err) => println!("rejected: {err}"),
    }

    Ok(())
}
