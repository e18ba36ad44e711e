use std::path::PathBuf;
use thiserror::Error;

/// Maximum length of an API response body kept in an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Errors surfaced by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("{0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected response payload: {0}")]
    Decode(String),

    /// No async runtime was available to schedule background work.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Network(err.without_url().to_string())
        }
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl SyncError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Truncates an API error body so it stays readable in logs and messages.
pub fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() > MAX_ERROR_BODY_LENGTH {
        let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated)", cut)
    } else {
        body.to_string()
    }
}

/// Maps a non-success HTTP status into an error variant.
///
/// `context` names the resource being accessed and ends up in the
/// message for 404 responses.
pub fn classify_status(status: u16, body: &str, context: &str) -> SyncError {
    match status {
        401 => SyncError::Auth("please check your access token".to_string()),
        403 => SyncError::Permission(format!(
            "the token lacks the \"repo\" scope or has expired ({})",
            truncate_body(body)
        )),
        404 => SyncError::NotFound(context.to_string()),
        _ => SyncError::Api {
            status,
            body: truncate_body(body),
        },
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_auth() {
        assert!(matches!(classify_status(401, "", "x"), SyncError::Auth(_)));
    }

    #[test]
    fn test_classify_status_forbidden() {
        let err = classify_status(403, "Resource not accessible by integration", "x");
        assert!(matches!(err, SyncError::Permission(_)));
        assert!(err.to_string().contains("repo"));
    }

    #[test]
    fn test_classify_status_not_found_keeps_context() {
        let err = classify_status(404, "{}", "branch 'main'");
        assert_eq!(err.to_string(), "Not found: branch 'main'");
    }

    #[test]
    fn test_classify_status_generic_carries_status_and_body() {
        let err = classify_status(422, "Validation Failed", "x");
        match err {
            SyncError::Api { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "Validation Failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncated.len(), 200 + "... (truncated)".len());
        assert_eq!(truncate_body("  short  "), "short");
    }

    #[test]
    fn test_is_retryable() {
        assert!(SyncError::Network("reset".into()).is_retryable());
        assert!(SyncError::Api {
            status: 502,
            body: String::new()
        }
        .is_retryable());
        assert!(!SyncError::Auth("bad".into()).is_retryable());
        assert!(!SyncError::Validation("nothing".into()).is_retryable());
    }
}
