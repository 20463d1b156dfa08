use crate::compiler::Violation;

/// Errors that can occur while registering schemas or validating data.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Schema files could not be loaded from disk.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// The schema could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// The schema document could not be retrieved from a URL.
    #[error("failed to fetch schema from {uri}: {message}")]
    FetchFailed { uri: String, message: String },

    /// Schema text is not valid JSON.
    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// No schema registered under the given name.
    #[error("schema {0} does not exist")]
    NotFound(String),

    /// The data failed one or more schema constraints.
    #[error("validation against {name} failed: {}", summarize(.violations))]
    ValidationFailed {
        name: String,
        violations: Vec<Violation>,
    },
}

impl SchemaError {
    /// Violations carried by a validation failure, empty for every other kind.
    pub fn violations(&self) -> &[Violation] {
        match self {
            SchemaError::ValidationFailed { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    let mut message = String::new();
    for (idx, violation) in violations.iter().take(4).enumerate() {
        if idx > 0 {
            message.push_str("; ");
        }
        message.push_str(&violation.to_string());
    }
    if violations.len() > 4 {
        message.push_str(&format!("; and {} more", violations.len() - 4));
    }
    message
}

pub type Result<T> = std::result::Result<T, SchemaError>;
