//! Error types for storage-abstraction
//!
//! The `Display` text of every variant is the user-facing error string that
//! ends up in [`crate::ResultObject::error`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Construction-time configuration problem; sticky for the adapter's lifetime.
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    InvalidName(String),

    #[error("{0}")]
    InvalidOption(String),

    #[error("Please provide or select a bucket")]
    NoBucket,

    #[error("No bucket '{0}' found")]
    BucketNotFound(String),

    #[error("No file '{file}' found in bucket '{bucket}'")]
    FileNotFound { bucket: String, file: String },

    #[error("Bucket '{0}' is not public")]
    NotPublic(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Could not read source file '{path}': {source}")]
    Source {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failure reported by the backend itself, forwarded mostly verbatim.
    #[error("{0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown provider '{key}', valid providers are: {}", .known.join(", "))]
    UnknownProvider { key: String, known: Vec<String> },

    #[error("Registry error: {0}")]
    Registry(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Error::Provider(msg.into())
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Error::InvalidName(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    pub fn file_not_found(bucket: &str, file: &str) -> Self {
        Error::FileNotFound {
            bucket: bucket.to_string(),
            file: file.to_string(),
        }
    }

    /// Whether this error means the bucket or file is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::BucketNotFound(_) | Error::FileNotFound { .. })
    }
}
