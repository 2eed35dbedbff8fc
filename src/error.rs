// Error kinds raised inside the API client. The public client operations
// never hand these to the caller; they are logged and folded into
// `Option`/`bool` results.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    /// Connection refused, DNS failure, timeout, ...
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// HTML or otherwise unparseable body where JSON was expected.
    #[error("unexpected response from {path}: {reason}")]
    ProtocolMismatch { path: String, reason: String },

    #[error("Knowledge collection '{0}' not found")]
    NotFound(String),

    /// Every create endpoint candidate failed.
    #[error("Failed to create knowledge collection '{0}'")]
    CreateFailed(String),

    /// Local file missing or rejected by the allow-list.
    #[error("invalid file {}: {reason}", path.display())]
    Validation { path: PathBuf, reason: String },

    #[error("error reading file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Whether trying the next candidate endpoint may help.
    pub fn is_wrong_path(&self) -> bool {
        match self {
            UploadError::ProtocolMismatch { .. } => true,
            UploadError::Status { status, .. } => {
                *status == reqwest::StatusCode::NOT_FOUND
                    || *status == reqwest::StatusCode::METHOD_NOT_ALLOWED
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
