use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::index::{self, IndexState};

/// Publishes a schema directory under `/schemas` and answers every other
/// path with a JSON index of the hosted documents.
pub struct SchemaServer {
    config: ServerConfig,
}

impl SchemaServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router. Index links are rooted at `public_url` when set,
    /// otherwise at `fallback_base`.
    pub fn router(&self, fallback_base: &str) -> Router {
        let base_url = self
            .config
            .public_url
            .clone()
            .unwrap_or_else(|| fallback_base.to_string());
        let state = Arc::new(IndexState {
            schema_dir: self.config.schema_dir.clone(),
            base_url,
        });

        Router::new()
            .nest_service("/schemas", ServeDir::new(&self.config.schema_dir))
            .fallback(index::handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr: SocketAddr = listener.local_addr()?;
        let router = self.router(&format!("http://{local_addr}"));

        tracing::info!(
            addr = %local_addr,
            dir = %self.config.schema_dir.display(),
            "schema host listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("schema host stopped");
        Ok(())
    }
}
