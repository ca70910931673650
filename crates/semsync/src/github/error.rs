//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpResponse;
use crate::provider::ProviderError;

/// Errors that can occur when interacting with the GitHub contents API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an unexpected error response.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Authentication required")]
    AuthRequired,

    /// The `sha` sent with a write no longer matches the file.
    #[error("Stale sha for {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The response did not carry usable file content.
    #[error("Invalid content for {path}: {message}")]
    Content { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GitHubError {
    /// Classify a non-success response for `path`.
    ///
    /// GitHub answers an exhausted primary budget with 403 and
    /// `x-ratelimit-remaining: 0`, secondary limits with 403/429 and a body
    /// mentioning the rate limit. A stale `sha` on PUT is 409, or 422 whose body
    /// names the `sha`.
    pub fn from_response(response: &HttpResponse, path: &str) -> Self {
        let message = response.body_text();
        match response.status {
            401 => GitHubError::AuthRequired,
            403 | 429 if is_rate_limited(response) => GitHubError::RateLimited {
                reset_at: reset_time(response),
            },
            404 => GitHubError::NotFound(path.to_string()),
            409 => GitHubError::Conflict(path.to_string()),
            422 if message.contains("sha") => GitHubError::Conflict(path.to_string()),
            status => GitHubError::Api { status, message },
        }
    }
}

fn is_rate_limited(response: &HttpResponse) -> bool {
    response.status == 429
        || response.header("x-ratelimit-remaining") == Some("0")
        || response.body_text().to_lowercase().contains("rate limit")
}

fn reset_time(response: &HttpResponse) -> DateTime<Utc> {
    response
        .header("x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .or_else(|| {
            response
                .header("retry-after")
                .and_then(|v| v.parse::<i64>().ok())
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
        })
        .unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1))
}

impl From<GitHubError> for ProviderError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Http(message) => ProviderError::Network { message },
            GitHubError::Json(e) => ProviderError::parse(format!("JSON parse error: {e}")),
            GitHubError::Api { status, message } => ProviderError::Api { status, message },
            GitHubError::RateLimited { reset_at } => {
                ProviderError::network(format!("GitHub rate limit exceeded, resets at {reset_at}"))
            }
            GitHubError::AuthRequired => ProviderError::AuthExpired,
            GitHubError::Conflict(path) => ProviderError::VersionConflict { path },
            GitHubError::NotFound(resource) => ProviderError::NotFound { resource },
            GitHubError::Content { path, message } => {
                ProviderError::parse(format!("{path}: {message}"))
            }
            GitHubError::Config(message) => ProviderError::Internal { message },
        }
    }
}
