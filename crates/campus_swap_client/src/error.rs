//! Client error taxonomy shared by the REST client, the realtime channel and the
//! session store.

use thiserror::Error;

/// Every failure the client library reports.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx HTTP response.
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    /// No response: connection refused, DNS, timeout, broken body.
    #[error("Network error: {0}")]
    Network(String),

    /// Realtime connection or framing failure.
    #[error("Socket error: {0}")]
    Socket(String),

    /// Client-side form or invariant check.
    #[error("{0}")]
    Validation(String),

    /// A 2xx payload that does not match the expected shape.
    #[error("Unexpected response payload: {0}")]
    Decode(String),

    /// Durable session storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Socket(e.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_status_and_message() {
        let err = ClientError::Api {
            status: 404,
            message: "Item not found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Item not found (HTTP 404)");
        assert!(!err.is_network());
    }

    #[test]
    fn validation_displays_bare_message() {
        let err = ClientError::validation("Passwords do not match");
        assert_eq!(err.to_string(), "Passwords do not match");
        assert_eq!(err.status(), None);
    }
}
