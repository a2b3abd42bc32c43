//! Error taxonomy shared by every operation in the crate

use std::path::PathBuf;
use thiserror::Error;

/// Client errors
///
/// Every operation resolves to either its payload or one of these variants;
/// `code()` exposes the machine-checkable code that pairs with the
/// human-readable display message.
#[derive(Error, Debug)]
pub enum Error {
    /// Required client or signing configuration is absent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source file missing or unreadable. Raised before any network call.
    #[error("file access error: {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network failure or non-2xx status. Eligible for automatic retry.
    #[error("transport error: {message}")]
    Transport { status: Option<u16>, message: String },

    /// Service-reported error code other than "ok" inside a 2xx envelope.
    #[error("service error {code}: {message} (request {request_id})")]
    Business {
        code: String,
        message: String,
        request_id: String,
    },

    /// Content no longer matches what was planned for transfer.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl Error {
    /// Machine-checkable error code.
    ///
    /// Business errors carry the service's own code; transport errors carry
    /// the HTTP status when one was received.
    pub fn code(&self) -> String {
        match self {
            Error::Config(_) => "config failed".to_string(),
            Error::FileAccess { .. } => "file access failed".to_string(),
            Error::Transport { status, .. } => match status {
                Some(s) => s.to_string(),
                None => "http failed".to_string(),
            },
            Error::Business { code, .. } => code.clone(),
            Error::Integrity(_) => "integrity failed".to_string(),
        }
    }

    /// Whether the transport layer may retry this error automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn status(status: u16, message: impl Into<String>) -> Self {
        Error::Transport {
            status: Some(status),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
