use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// One hosted schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// File stem, e.g. `user` for `v1/user.json`.
    pub name: String,
    /// Top-level directory the file lives in, e.g. `v1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Absolute URL the document is served at.
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaIndex {
    pub schemas: Vec<IndexEntry>,
}

pub(crate) struct IndexState {
    pub(crate) schema_dir: PathBuf,
    pub(crate) base_url: String,
}

/// Scan `schema_dir` for `*.json` files and describe them as served under
/// `<base_url>/schemas/`.
pub fn scan(schema_dir: &Path, base_url: &str) -> std::io::Result<SchemaIndex> {
    let base_url = base_url.trim_end_matches('/');
    let mut schemas = Vec::new();
    let mut dirs = vec![schema_dir.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                dirs.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            if let Some(item) = index_entry(schema_dir, &path, base_url) {
                schemas.push(item);
            }
        }
    }

    schemas.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(SchemaIndex { schemas })
}

fn index_entry(root: &Path, file: &Path, base_url: &str) -> Option<IndexEntry> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<_>>()?;
    let (file_name, dirs) = parts.split_last()?;
    let name = file_name.strip_suffix(".json")?.to_string();

    Some(IndexEntry {
        name,
        version: dirs.first().map(|dir| dir.to_string()),
        path: format!("{base_url}/schemas/{}", parts.join("/")),
    })
}

pub(crate) async fn handler(State(state): State<Arc<IndexState>>) -> Response {
    let scan_state = Arc::clone(&state);
    let scanned =
        tokio::task::spawn_blocking(move || scan(&scan_state.schema_dir, &scan_state.base_url))
            .await;

    match scanned {
        Ok(Ok(index)) => Json(index).into_response(),
        Ok(Err(err)) => {
            tracing::warn!(dir = %state.schema_dir.display(), error = %err, "schema index scan failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("failed to read schema directory: {err}") })),
            )
                .into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}
