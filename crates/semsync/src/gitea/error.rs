//! Error types for Gitea API operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpResponse;
use crate::provider::ProviderError;

/// Errors that can occur when interacting with the Gitea API.
#[derive(Debug, Error)]
pub enum GiteaError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Authentication failed or token invalid.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The file changed (or appeared) since its sha was read.
    #[error("File changed remotely: {0}")]
    Conflict(String),

    /// File or directory not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response did not carry usable file content.
    #[error("Invalid content for {path}: {message}")]
    Content { path: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GiteaError {
    /// Classify a non-success response for `path`.
    ///
    /// Gitea rejects a stale `sha` with 409 or with 422 ("sha does not match"),
    /// and a create over an existing file with 422 ("already exists").
    pub fn from_response(response: &HttpResponse, path: &str) -> Self {
        let message = response.body_text();
        match response.status {
            401 => GiteaError::Auth(message),
            404 => GiteaError::NotFound(path.to_string()),
            409 => GiteaError::Conflict(path.to_string()),
            422 if message.contains("sha") || message.contains("already exists") => {
                GiteaError::Conflict(path.to_string())
            }
            429 => GiteaError::RateLimited {
                reset_at: Utc::now() + chrono::Duration::minutes(1),
            },
            status => GiteaError::Api { status, message },
        }
    }
}

impl From<GiteaError> for ProviderError {
    fn from(err: GiteaError) -> Self {
        match err {
            GiteaError::Http(message) => ProviderError::Network { message },
            GiteaError::Json(e) => ProviderError::Parse {
                message: format!("JSON parse error: {}", e),
            },
            GiteaError::Api { status, message } => ProviderError::Api { status, message },
            GiteaError::RateLimited { reset_at } => ProviderError::Network {
                message: format!("Gitea rate limit exceeded, resets at {}", reset_at),
            },
            GiteaError::Auth(_) => ProviderError::AuthExpired,
            GiteaError::Conflict(path) => ProviderError::VersionConflict { path },
            GiteaError::NotFound(resource) => ProviderError::NotFound { resource },
            GiteaError::Content { path, message } => ProviderError::Parse {
                message: format!("{}: {}", path, message),
            },
            GiteaError::Config(msg) => ProviderError::Internal { message: msg },
        }
    }
}
