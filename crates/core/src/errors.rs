use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed CRM call, stable across the tool boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Authentication,
    NotFound,
    RateLimit,
    Validation,
    ServerError,
    NetworkError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimit => "RATE_LIMIT",
            Self::Validation => "VALIDATION",
            Self::ServerError => "SERVER_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the transport layer is allowed to retry a failure of this kind.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ServerError | Self::NetworkError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct CrmError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl CrmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), status: None }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Shape handed back to tool callers.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "category": self.kind,
                "message": self.message,
                "status_code": self.status,
            }
        })
    }
}

pub type CrmResult<T> = Result<T, CrmError>;

#[cfg(test)]
mod tests {
    use super::{CrmError, ErrorKind};

    #[test]
    fn display_includes_category_and_message() {
        let error = CrmError::new(ErrorKind::NotFound, "Resource not found").with_status(404);

        assert_eq!(error.to_string(), "NOT_FOUND: Resource not found");
        assert_eq!(error.status, Some(404));
    }

    #[test]
    fn payload_serializes_category_in_screaming_case() {
        let payload = CrmError::validation("bad date").to_payload();

        assert_eq!(payload["error"]["category"], "VALIDATION");
        assert_eq!(payload["error"]["message"], "bad date");
        assert!(payload["error"]["status_code"].is_null());
    }

    #[test]
    fn only_rate_limit_server_and_network_are_transient() {
        let transient: Vec<ErrorKind> = [
            ErrorKind::Authentication,
            ErrorKind::NotFound,
            ErrorKind::RateLimit,
            ErrorKind::Validation,
            ErrorKind::ServerError,
            ErrorKind::NetworkError,
            ErrorKind::Unknown,
        ]
        .into_iter()
        .filter(ErrorKind::is_transient)
        .collect();

        assert_eq!(
            transient,
            vec![ErrorKind::RateLimit, ErrorKind::ServerError, ErrorKind::NetworkError]
        );
    }
}
