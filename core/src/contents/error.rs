//! Error types for contents operations

use thiserror::Error;

/// Failures reported by the remote catalog service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The array or namespace is unknown to the catalog
    #[error("{0}")]
    NotFound(String),

    /// Any other catalog failure (network, permissions, service side)
    #[error("{0}")]
    Service(String),
}

impl CatalogError {
    pub fn message(&self) -> &str {
        match self {
            CatalogError::NotFound(message) | CatalogError::Service(message) => message,
        }
    }
}

/// Failures reported by the backend array store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// An array is already registered under the requested name
    #[error("array already exists: {0}")]
    AlreadyExists(String),

    #[error("array not found: {0}")]
    NotFound(String),

    /// Open, read, write or metadata failure
    #[error("{0}")]
    Backend(String),
}

/// User facing error for every contents operation.
///
/// Carries enough context to be actionable and maps onto an HTTP-style
/// status code through [`ContentsError::status`].
#[derive(Error, Debug)]
pub enum ContentsError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Caller input errors (missing fields, bad type, unsupported operation)
    #[error("{0}")]
    BadRequest(String),

    #[error("{context}: {source}")]
    Catalog {
        context: String,
        #[source]
        source: CatalogError,
    },

    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },

    #[error("Could not find a free name for {name} after {attempts} attempts")]
    CreateExhausted { name: String, attempts: u32 },

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ContentsError {
    pub fn catalog(context: impl Into<String>, source: CatalogError) -> Self {
        ContentsError::Catalog {
            context: context.into(),
            source,
        }
    }

    pub fn storage(context: impl Into<String>, source: StorageError) -> Self {
        ContentsError::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ContentsError::BadRequest(message.into())
    }

    /// HTTP-style status code for the frontend
    pub fn status(&self) -> u16 {
        match self {
            ContentsError::InvalidPath(_) | ContentsError::BadRequest(_) => 400,
            ContentsError::Catalog {
                source: CatalogError::NotFound(_),
                ..
            } => 404,
            ContentsError::Storage {
                source: StorageError::NotFound(_),
                ..
            } => 404,
            ContentsError::NotFound(_) => 404,
            ContentsError::Io(err) if err.kind() == std::io::ErrorKind::NotFound => 404,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for ContentsError {
    fn from(err: serde_json::Error) -> Self {
        ContentsError::Serialization(err.to_string())
    }
}

/// Result type for contents operations
pub type ContentsResult<T> = Result<T, ContentsError>;
