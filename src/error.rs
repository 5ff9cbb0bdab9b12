//! Typed errors: startup-fatal schema errors, per-request errors, adapter errors.

use serde::Serialize;
use thiserror::Error;

/// Schema registration and compilation errors. Always fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("cyclic object reference: {0}")]
    CyclicReference(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Errors raised by a storage adapter, before the engine tags them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("decode: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Decode(e.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("connection: {0}")]
    Connection(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("hook '{hook}' aborted the mutation: {message}")]
    HookAbort { hook: String, message: String },
    #[error("hook '{hook}' failed after the mutation was persisted: {message}")]
    HookFailed { hook: String, message: String },
    #[error("{operation} on {class}: {source}")]
    Storage {
        operation: &'static str,
        class: String,
        #[source]
        source: StoreError,
    },
}

impl AppError {
    /// Tag an adapter error with the engine operation and class. Unavailable backends become `Connection`.
    pub fn storage(operation: &'static str, class: &str, source: StoreError) -> Self {
        match source {
            StoreError::Unavailable(msg) => AppError::Connection(msg),
            source => AppError::Storage {
                operation,
                class: class.to_string(),
                source,
            },
        }
    }

    /// Stable machine-readable code used in failure envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Connection(_) => "connection_error",
            AppError::Permission(_) => "permission_denied",
            AppError::HookAbort { .. } => "hook_aborted",
            AppError::HookFailed { .. } => "hook_failed",
            AppError::Storage { .. } => "storage_error",
        }
    }
}

/// A per-request failure caught at the operation boundary.
#[derive(Error, Debug)]
#[error("{operation} ({class}): {source}")]
pub struct OperationError {
    pub operation: String,
    pub class: String,
    #[source]
    pub source: AppError,
}

impl OperationError {
    pub fn new(operation: &str, class: Option<&str>, source: AppError) -> Self {
        OperationError {
            operation: operation.to_string(),
            class: class.unwrap_or_default().to_string(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.source.to_string(),
                operation: self.operation.clone(),
                class: self.class.clone(),
            },
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Debug, Clone)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub operation: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub class: String,
}
