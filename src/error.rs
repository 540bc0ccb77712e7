//! Error types for the storefront session client

use std::time::Duration;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The API answered with a `success: false` envelope.
    /// Displays as the bare server message so it can be shown to the user.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The API answered with a non-2xx status. Displays as the server
    /// message when the body carried one, `HTTP Error: <status>` otherwise.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to get profile")]
    ProfileUnavailable,

    #[error("No active session")]
    NoSession,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether the server cleanly refused the request through its envelope.
    /// Non-2xx statuses and transport failures are not rejections.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_displays_server_message() {
        let err = ClientError::Rejected {
            status: 401,
            message: "invalid credentials".to_string(),
        };
        assert_eq!(err.to_string(), "invalid credentials");
        assert!(err.is_rejection());
    }

    #[test]
    fn test_transport_errors_are_not_rejections() {
        assert!(!ClientError::Timeout(Duration::from_secs(5)).is_rejection());
        assert!(!ClientError::InvalidResponse("empty body".into()).is_rejection());
        assert_eq!(ClientError::ProfileUnavailable.to_string(), "failed to get profile");
    }

    #[test]
    fn test_status_errors_are_not_rejections() {
        let err = ClientError::Status {
            status: 500,
            message: "HTTP Error: 500".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP Error: 500");
        assert!(!err.is_rejection());
    }
}
