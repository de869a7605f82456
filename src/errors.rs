//! Error-kind taxonomy shared across every module boundary.
//!
//! Every I/O-returning operation in this crate returns `Result<T, CoreError>`
//! rather than panicking. Recovery policy per kind is documented on the
//! variant; callers (the indexing orchestrator, the retrieval engine, the
//! CLI) branch on `CoreError::kind()` rather than matching strings.

use std::fmt;

/// Stable classification independent of the underlying variant's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    StorageTransient,
    StoragePermanent,
    EmbeddingUnavailable,
    EmbeddingProtocolError,
    LibraryBusy,
    ConfigInvalid,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::StorageTransient => "storage_transient",
            ErrorKind::StoragePermanent => "storage_permanent",
            ErrorKind::EmbeddingUnavailable => "embedding_unavailable",
            ErrorKind::EmbeddingProtocolError => "embedding_protocol_error",
            ErrorKind::LibraryBusy => "library_busy",
            ErrorKind::ConfigInvalid => "config_invalid",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("transient storage error: {0}")]
    StorageTransient(String),

    #[error("permanent storage error: {0}")]
    StoragePermanent(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding protocol error: {0}")]
    EmbeddingProtocolError(String),

    #[error("library '{0}' is busy with another indexing job")]
    LibraryBusy(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            CoreError::StorageTransient(_) => ErrorKind::StorageTransient,
            CoreError::StoragePermanent(_) => ErrorKind::StoragePermanent,
            CoreError::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            CoreError::EmbeddingProtocolError(_) => ErrorKind::EmbeddingProtocolError,
            CoreError::LibraryBusy(_) => ErrorKind::LibraryBusy,
            CoreError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Renders the structured JSON error payload the retrieval engine puts
    /// inside an MCP response (core spec §7: the MCP layer never crashes on
    /// engine errors, it receives `{error: "..."}`).
    pub fn to_json_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind().to_string(),
        })
    }

    /// Maps to the documented CLI / job-runner exit codes (core spec §6).
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::ConfigInvalid => 1,
            ErrorKind::ValidationFailed => 2,
            ErrorKind::EmbeddingUnavailable | ErrorKind::EmbeddingProtocolError => 3,
            ErrorKind::StoragePermanent => 4,
            _ => 1,
        }
    }

    /// `true` for kinds the caller may retry without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StorageTransient | ErrorKind::EmbeddingUnavailable
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                CoreError::StorageTransient(e.to_string())
            }
            sqlx::Error::RowNotFound => CoreError::NotFound {
                entity: "row",
                id: String::new(),
            },
            _ => CoreError::StoragePermanent(e.to_string()),
        }
    }
}
