//! BIG-IP client errors

use thiserror::Error;

/// Errors that can occur when talking to the iControl REST API.
#[derive(Debug, Error)]
pub enum BigIpError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// iControl returned an error payload
    #[error("iControl API error ({status}): {message}")]
    Api {
        /// HTTP status code of the response
        status: u16,
        /// Error message from the iControl payload
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BigIpError {
    /// Whether this error means the resource already exists. Create calls
    /// treat this as success per the idempotent-create contract.
    pub fn is_conflict(&self) -> bool {
        match self {
            BigIpError::Api { status, message } => {
                *status == 409 || message.contains("already exists")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_on_status() {
        let err = BigIpError::Api {
            status: 409,
            message: "duplicate".to_string(),
        };
        assert!(err.is_conflict());
    }

    #[test]
    fn conflict_on_message() {
        let err = BigIpError::Api {
            status: 400,
            message: "01020066:3: The requested Pool (/Common/foo_80) already exists in partition Common.".to_string(),
        };
        assert!(err.is_conflict());
    }

    #[test]
    fn plain_api_error_is_not_conflict() {
        let err = BigIpError::Api {
            status: 404,
            message: "not found".to_string(),
        };
        assert!(!err.is_conflict());
    }
}
