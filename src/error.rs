//! Error taxonomy for the import pipeline.

use thiserror::Error;

/// Format-level failures: the input cannot be classified or opened.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid {container} signature: the file is damaged or not a {container} document")]
    InvalidSignature { container: &'static str },

    #[error("Container entry '{0}' not found")]
    MissingEntry(String),

    #[error("Corrupted container: {0}")]
    Container(String),

    #[error("Could not decode document text: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the remote model, translated into readable causes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("AI parser is not configured: {0}")]
    NotConfigured(String),

    #[error("AI request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Connection to the AI service was refused ({0})")]
    ConnectionRefused(String),

    #[error("Could not resolve the AI service host ({0})")]
    Dns(String),

    #[error("AI service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error while calling the AI service: {0}")]
    Network(String),

    #[error("Unexpected AI response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout(_))
    }

    /// Classify a transport error from reqwest.
    pub fn from_transport(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            return RemoteError::Timeout(timeout_secs);
        }
        let detail = error_chain(err);
        let lower = detail.to_lowercase();
        if err.is_connect() {
            if lower.contains("dns")
                || lower.contains("resolve")
                || lower.contains("lookup")
                || lower.contains("name or service not known")
            {
                return RemoteError::Dns(detail);
            }
            return RemoteError::ConnectionRefused(detail);
        }
        RemoteError::Network(detail)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_messages_are_readable() {
        assert_eq!(
            RemoteError::Timeout(900).to_string(),
            "AI request timed out after 900 seconds"
        );
        let http = RemoteError::Http {
            status: 401,
            body: "invalid x-api-key".into(),
        };
        assert!(http.to_string().contains("HTTP 401"));
        assert!(RemoteError::Timeout(1).is_timeout());
        assert!(!http.is_timeout());
    }

    #[test]
    fn test_signature_error_names_container() {
        let err = ImportError::InvalidSignature { container: "ZIP" };
        assert!(err.to_string().contains("ZIP"));
    }
}
