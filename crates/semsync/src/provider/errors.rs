use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a [`ProviderError`], carried on status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    VersionConflict,
    ConflictExhausted,
    AuthExpired,
    NotFound,
    Api,
    Parse,
    Internal,
}

/// Errors that can occur when talking to a storage backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transient transport failure (includes remote-side rate limiting).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The supplied version token no longer matches the remote object.
    #[error("Version conflict on {path}")]
    VersionConflict { path: String },

    /// Every attempt of the conflict retry ladder was rejected.
    #[error("Version conflict on {path} persisted after {attempts} attempts")]
    ConflictExhausted { path: String, attempts: u32 },

    /// The credential was rejected; re-authentication is required.
    #[error("Authentication expired; re-authentication required")]
    AuthExpired,

    /// Resource not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Unexpected response from the remote API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A remote payload could not be decoded.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn conflict(path: impl Into<String>) -> Self {
        Self::VersionConflict { path: path.into() }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::ConflictExhausted { .. } => ErrorKind::ConflictExhausted,
            Self::AuthExpired => ErrorKind::AuthExpired,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Api { .. } => ErrorKind::Api,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether a transient-failure retry may help.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps status lines compact
/// when remote APIs return multi-line bodies.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
