//! Error taxonomy for the client. Facade operations surface these verbatim;
//! only existence checks translate `NotFound` into a boolean.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Remote path or registry record does not exist.
    #[error("{path}: not found")]
    NotFound { path: String },

    /// Uniqueness violation, e.g. the target version directory is taken.
    #[error("{path}: already exists")]
    AlreadyExists { path: String },

    /// Non-success HTTP status from the backend.
    #[error("request for {path} failed with status {status}")]
    RequestFailed { path: String, status: u16 },

    /// A blocking archive or registration poll exceeded its budget.
    #[error("timed out after {elapsed_secs}s while waiting for {action} of {path}")]
    Timeout {
        action: &'static str,
        path: String,
        elapsed_secs: u64,
    },

    /// Chunk or stream I/O failure mid-transfer, distinct from HTTP-level failure.
    #[error("transfer of {path} failed")]
    Transfer {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Model record is missing a field the operation requires (e.g. version).
    #[error("invalid model record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True only for `NotFound`; everything else (auth failures, 5xx, I/O)
    /// must never be read as "the path does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
