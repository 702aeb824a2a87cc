//! The abstract error taxonomy shared by every component (§7 of the design spec).
//!
//! Parser/validation errors bubble immediately; backend errors get attached to the
//! relevant `EngineResult` instead of failing the whole request — see
//! [`crate::engine`] and [`crate::rca`] for where each variant actually gets
//! produced.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("validation error on field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("query parse error at {position}: {message}")]
    QueryParseError { message: String, position: usize },

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("unsupported boolean composition: {0}")]
    UnsupportedBoolean(String),

    #[error("backend `{engine}` unavailable: {message}")]
    BackendUnavailable { engine: String, message: String },

    #[error("backend `{engine}` timed out after {timeout_ms}ms")]
    BackendTimeout { engine: String, timeout_ms: u64 },

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("not found: {class}/{id}")]
    NotFound { class: String, id: String },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        CoreError::QueryParseError {
            message: message.into(),
            position,
        }
    }

    /// The HTTP status code §7's user-visible behaviour table assigns to this error.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::ValidationError { .. } | CoreError::QueryParseError { .. } => 400,
            CoreError::UnsupportedOperator(_) | CoreError::UnsupportedBoolean(_) => 400,
            CoreError::NotFound { .. } => 404,
            CoreError::Cancelled => 504,
            CoreError::BackendUnavailable { .. } | CoreError::RegistryUnavailable(_) => 503,
            CoreError::BackendTimeout { .. } => 504,
            CoreError::Internal(_) => 500,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_and_parse_errors_map_to_400() {
        assert_eq!(CoreError::validation("engine", "unknown").http_status(), 400);
        assert_eq!(CoreError::parse("incomplete clause", 12).http_status(), 400);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = CoreError::NotFound {
            class: "KPIDefinition".into(),
            id: "abc".into(),
        };
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn backend_timeout_maps_to_504() {
        let err = CoreError::BackendTimeout {
            engine: "metrics".into(),
            timeout_ms: 30_000,
        };
        assert_eq!(err.http_status(), 504);
    }
}
