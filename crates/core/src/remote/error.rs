use std::time::Duration;

/// Everything a call to the optimizer or forecast service can fail with.
///
/// Callers get this as a value; nothing in the client panics on a bad upstream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {status}{}", body.as_deref().map(|b| format!(": {b}")).unwrap_or_default())]
    HttpStatus { status: u16, body: Option<String> },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ClientError {
    /// Transient failures worth another attempt. 4xx responses never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout(_) => true,
            ClientError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
