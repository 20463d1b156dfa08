use reqwest::Client;
use serde_json::Value;

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};

/// Build the HTTP client used for remote schema fetches.
pub fn build_client(config: &RegistryConfig) -> reqwest::Result<Client> {
    let mut builder =
        Client::builder().user_agent(concat!("schemahost/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = config.fetch_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Retrieve a schema document with a single GET. No retries.
pub async fn fetch_schema(client: &Client, uri: &str, max_bytes: usize) -> Result<Value> {
    let fail = |message: String| SchemaError::FetchFailed {
        uri: uri.to_string(),
        message,
    };

    tracing::debug!(uri, "fetching schema");

    let mut response = client
        .get(uri)
        .send()
        .await
        .map_err(|err| fail(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("unexpected status {status}")));
    }

    if let Some(length) = response.content_length() {
        if length > max_bytes as u64 {
            return Err(fail(format!("schema too large ({length} bytes)")));
        }
    }

    // Chunked bodies carry no length up front; stop once the bound is passed.
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|err| fail(err.to_string()))? {
        if body.len() + chunk.len() > max_bytes {
            return Err(fail(format!("schema exceeds {max_bytes} bytes")));
        }
        body.extend_from_slice(&chunk);
    }

    serde_json::from_slice(&body).map_err(|err| fail(format!("response is not JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::registry::SchemaRegistry;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    /// Answer one request with a chunked body and no `Content-Length`.
    async fn serve_chunked(chunks: Vec<String>) -> SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;

            let mut response = String::from(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 transfer-encoding: chunked\r\nconnection: close\r\n\r\n",
            );
            for chunk in chunks {
                response.push_str(&format!("{:x}\r\n{chunk}\r\n", chunk.len()));
            }
            response.push_str("0\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        addr
    }

    fn schema_router() -> Router {
        Router::new()
            .route(
                "/schemas/v1/user.json",
                get(|| async {
                    Json(json!({
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "age": { "type": "integer" }
                        },
                        "required": ["name", "age"]
                    }))
                }),
            )
            .route("/schemas/v1/broken.json", get(|| async { "<html></html>" }))
            .route(
                "/schemas/v1/invalid.json",
                get(|| async { Json(json!({ "type": 12 })) }),
            )
            .route(
                "/schemas/v1/slow.json",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({}))
                }),
            )
    }

    #[tokio::test]
    async fn add_from_url_registers_fetched_schema() {
        let addr = serve(schema_router()).await;
        let mut registry = SchemaRegistry::new();

        registry
            .add_from_url("user/v1", &format!("http://{addr}/schemas/v1/user.json"))
            .await
            .unwrap();

        let validated = registry
            .validate("user/v1", json!({ "name": "John Doe", "age": "20" }))
            .unwrap();
        assert_eq!(validated, json!({ "name": "John Doe", "age": 20 }));
    }

    #[tokio::test]
    async fn unreachable_uri_is_fetch_error_and_keeps_prior_entry() {
        let mut registry = SchemaRegistry::new();
        registry
            .add("user", &json!({ "type": "object", "required": ["name"] }))
            .unwrap();

        let result = registry
            .add_from_url("user", "http://127.0.0.1:1/schemas/v1/user.json")
            .await;

        assert!(matches!(result, Err(SchemaError::FetchFailed { .. })));
        assert!(registry.validate("user", json!({ "name": "x" })).is_ok());
        assert!(registry.validate("user", json!({})).is_err());
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let addr = serve(schema_router()).await;
        let client = build_client(&RegistryConfig::default()).unwrap();

        let result = fetch_schema(
            &client,
            &format!("http://{addr}/schemas/v1/missing.json"),
            1024,
        )
        .await;
        match result {
            Err(SchemaError::FetchFailed { message, .. }) => assert!(message.contains("404")),
            other => panic!("expected fetch failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_fetch_error() {
        let addr = serve(schema_router()).await;
        let mut registry = SchemaRegistry::new();

        let result = registry
            .add_from_url("broken", &format!("http://{addr}/schemas/v1/broken.json"))
            .await;
        assert!(matches!(result, Err(SchemaError::FetchFailed { .. })));
        assert!(!registry.has_schema("broken"));
    }

    #[tokio::test]
    async fn fetched_document_that_is_not_a_schema_is_compile_error() {
        let addr = serve(schema_router()).await;
        let mut registry = SchemaRegistry::new();

        let result = registry
            .add_from_url("invalid", &format!("http://{addr}/schemas/v1/invalid.json"))
            .await;
        assert!(matches!(result, Err(SchemaError::CompileFailed(_))));
    }

    #[tokio::test]
    async fn oversized_document_is_rejected() {
        let addr = serve(schema_router()).await;
        let client = build_client(&RegistryConfig::default()).unwrap();

        let result = fetch_schema(&client, &format!("http://{addr}/schemas/v1/user.json"), 8).await;
        assert!(matches!(result, Err(SchemaError::FetchFailed { .. })));
    }

    #[tokio::test]
    async fn chunked_body_within_bound_is_accepted() {
        let chunks = vec![
            r#"{"type": "object", "#.to_string(),
            r#""required": ["name"]}"#.to_string(),
        ];
        let addr = serve_chunked(chunks).await;
        let client = build_client(&RegistryConfig::default()).unwrap();

        let schema = fetch_schema(&client, &format!("http://{addr}/schema.json"), 1024)
            .await
            .unwrap();
        assert_eq!(schema, json!({ "type": "object", "required": ["name"] }));
    }

    #[tokio::test]
    async fn chunked_body_past_bound_is_rejected() {
        let mut chunks = vec![r#"{"description": ""#.to_string()];
        chunks.extend(std::iter::repeat_n("x".repeat(32), 8));
        chunks.push(r#""}"#.to_string());
        let addr = serve_chunked(chunks).await;
        let client = build_client(&RegistryConfig::default()).unwrap();

        let result = fetch_schema(&client, &format!("http://{addr}/schema.json"), 64).await;
        match result {
            Err(SchemaError::FetchFailed { message, .. }) => {
                assert!(message.contains("exceeds 64 bytes"), "{message}")
            }
            other => panic!("expected fetch failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn configured_timeout_bounds_the_fetch() {
        let addr = serve(schema_router()).await;
        let mut registry = SchemaRegistry::with_config(RegistryConfig {
            fetch_timeout: Some(Duration::from_millis(100)),
            ..RegistryConfig::default()
        });

        let result = registry
            .add_from_url("slow", &format!("http://{addr}/schemas/v1/slow.json"))
            .await;
        assert!(matches!(result, Err(SchemaError::FetchFailed { .. })));
    }
}
