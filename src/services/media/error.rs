//! Error types for media uploads.

use thiserror::Error;

/// Errors that can occur while uploading to the image CDN.
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    /// Connection failed or the request could not be sent.
    #[error("Network error: {message}")]
    Network { message: String },

    /// No response within the configured timeout.
    #[error("Upload timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The CDN rejected the credentials (401/403).
    #[error("Media service rejected the credentials ({status})")]
    Auth { status: u16 },

    /// Keys or endpoints are missing.
    #[error("Media service is not configured: {message}")]
    Config { message: String },

    /// Over the local size limit, or rejected by the CDN with 413.
    #[error("File too large: {message}")]
    FileTooLarge { message: String },

    /// Content type outside the allowed list.
    #[error("Unsupported file type: {content_type}")]
    UnsupportedType { content_type: String },

    /// The CDN failed (5xx).
    #[error("Media server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other 4xx.
    #[error("Upload rejected ({status}): {message}")]
    BadRequest { status: u16, message: String },

    /// A success response we could not parse.
    #[error("Invalid response from media service: {message}")]
    InvalidResponse { message: String },

    /// Every attempt failed with a retryable error.
    #[error("Upload failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<MediaError> },
}

impl MediaError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => MediaError::Auth { status },
            413 => MediaError::FileTooLarge { message },
            500..=599 => MediaError::Server { status, message },
            _ => MediaError::BadRequest { status, message },
        }
    }

    /// Classify a transport error from the HTTP client.
    pub fn from_reqwest(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            MediaError::Timeout { timeout_secs }
        } else {
            MediaError::Network {
                message: err.to_string(),
            }
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::Network { .. } | MediaError::Timeout { .. } | MediaError::Server { .. }
        )
    }

    /// Message safe to show to the uploader.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::Network { .. } | MediaError::Timeout { .. } => {
                "Could not reach the image service. Please try again.".to_string()
            }
            MediaError::Auth { .. } | MediaError::Config { .. } => {
                "Image uploads are not available right now.".to_string()
            }
            MediaError::FileTooLarge { message } => format!("The file is too large: {}", message),
            MediaError::UnsupportedType { content_type } => {
                format!("Files of type {} cannot be uploaded.", content_type)
            }
            MediaError::Server { .. } | MediaError::InvalidResponse { .. } => {
                "The image service had a problem. Please try again later.".to_string()
            }
            MediaError::BadRequest { message, .. } => format!("The upload was rejected: {}", message),
            MediaError::RetriesExhausted { last, .. } => last.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(MediaError::from_status(401, ""), MediaError::Auth { status: 401 }));
        assert!(matches!(MediaError::from_status(403, ""), MediaError::Auth { status: 403 }));
        assert!(matches!(MediaError::from_status(413, "big"), MediaError::FileTooLarge { .. }));
        assert!(matches!(MediaError::from_status(502, ""), MediaError::Server { status: 502, .. }));
        assert!(matches!(MediaError::from_status(422, ""), MediaError::BadRequest { status: 422, .. }));
    }

    #[test]
    fn test_retryable_classes() {
        let retryable = [
            MediaError::Network { message: "reset".into() },
            MediaError::Timeout { timeout_secs: 30 },
            MediaError::from_status(503, "unavailable"),
        ];
        assert!(retryable.iter().all(MediaError::is_retryable));

        let permanent = [
            MediaError::from_status(401, ""),
            MediaError::Config { message: "no key".into() },
            MediaError::from_status(413, ""),
            MediaError::from_status(400, "bad"),
            MediaError::UnsupportedType { content_type: "text/html".into() },
        ];
        assert!(!permanent.iter().any(MediaError::is_retryable));
    }

    #[test]
    fn test_exhausted_reports_last_error() {
        let err = MediaError::RetriesExhausted {
            attempts: 4,
            last: Box::new(MediaError::Timeout { timeout_secs: 30 }),
        };
        assert_eq!(err.to_string(), "Upload failed after 4 attempts: Upload timed out after 30s");
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("try again"));
    }
}
