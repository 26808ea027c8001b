//! Error taxonomy shared by the relational store, the object vault and the
//! lifecycle services.
//!
//! The boundary layer (HTTP, CLI, whatever sits above this crate) maps the
//! sentinel variants to its own status codes; it never needs to parse error
//! strings.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors produced by the case/evidence core.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The requested entity is absent from at least one of the two stores.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity with the same identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Caller-input error: malformed name, empty required field,
    /// disallowed character. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Passed through unchanged from the auth collaborator.
    #[error("unauthorized")]
    Unauthorized,

    /// Passed through unchanged from the auth collaborator.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Unclassified relational driver error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Unclassified I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Opaque error surfaced by the object-store backend.
    #[error("object store error: {0}")]
    Backend(String),

    /// A metadata write failed and the compensating object removal failed
    /// too. Both outcomes are reported; the caller must not assume the
    /// object was removed.
    #[error("{source} (compensation also failed: {cleanup})")]
    Compensation {
        #[source]
        source: Box<VaultError>,
        cleanup: Box<VaultError>,
    },

    /// Wraps any of the above with the operation and entity it came from.
    #[error("{op}: {source}")]
    Context {
        op: String,
        #[source]
        source: Box<VaultError>,
    },
}

impl VaultError {
    /// Wrap this error with the operation (and entity name/id) it occurred
    /// in, so it logs usefully at the boundary.
    pub fn context(self, op: impl Into<String>) -> Self {
        VaultError::Context {
            op: op.into(),
            source: Box::new(self),
        }
    }

    /// The underlying sentinel, with any `Context` layers peeled off.
    pub fn root(&self) -> &VaultError {
        match self {
            VaultError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), VaultError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), VaultError::AlreadyExists(_))
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self.root(), VaultError::InvalidRequest(_))
    }
}
