//! Host the bundled schemas in-process and register them over HTTP.
//!
//! Run with:
//!   cargo run --example remote-client
//!
//! Against a separately running host (`schemahost serve --dir schemas`), set
//! `SCHEMAHOST_URL=http://127.0.0.1:8000`.

use std::path::Path;

use schemahost::registry::SchemaRegistry;
use schemahost::server::{SchemaServer, ServerConfig};
use serde_json::json;
use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = match std::env::var("SCHEMAHOST_URL") {
        Ok(url) => url,
        Err(_) => start_local_host().await?,
    };

    let mut registry = SchemaRegistry::new();

    registry
        .add_from_url("user/v1", &format!("{base_url}/schemas/v1/user.json"))
        .await?;
    let validated_v1 = registry.validate("user/v1", json!({ "name": "John Doe", "age": 20 }))?;
    println!("validatedUserV1: {validated_v1}");

    registry
        .add_from_url("user/v2", &format!("{base_url}/schemas/v2/user.json"))
        .await?;
    let params_v2 = json!({
        "name": "John Doe",
        "age": 20,
        "date_of_birth": chrono::Utc::now().to_rfc3339()
    });
    let validated_v2 = registry.validate("user/v2", params_v2)?;
    println!("validatedUserV2: {validated_v2}");

    Ok(())
}

async fn start_local_host() -> Result<String, Box<dyn std::error::Error>> {
    let schema_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../schemas");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);

    let server = SchemaServer::new(ServerConfig {
        schema_dir,
        ..ServerConfig::default()
    });
    tokio::spawn(async move {
        if let Err(err) = server
            .serve_on(listener, std::future::pending::<()>())
            .await
        {
            eprintln!("schema host stopped: {err}");
        }
    });

    Ok(base_url)
}
