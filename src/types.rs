//! Core types shared by the pipeline, the facade and the backends

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use serde_json::Value;
use tokio::io::AsyncRead;

use crate::{Error, Result};

/// Free-form, provider-specific options passed through to the hooks.
pub type Options = serde_json::Map<String, Value>;

/// `(file name, size in bytes)` pairs as returned by `list_files`.
pub type FileListing = Vec<(String, u64)>;

/// Readable byte stream returned by `get_file_as_stream`.
pub type FileStream = Pin<Box<dyn AsyncRead + Send>>;

/// Key-value descriptor returned by `get_presigned_upload_url`.
pub type PresignedUpload = serde_json::Map<String, Value>;

/// Default lifetime of signed and presigned URLs (7 days).
pub const DEFAULT_EXPIRES_IN: u64 = 604_800;

/// Default cap on the number of entries returned by `list_files`.
pub const DEFAULT_MAX_FILES: usize = 10_000;

/// Read a boolean option. Accepts JSON booleans and the strings `"true"`/`"false"`.
pub fn option_bool(options: &Options, key: &str) -> Option<bool> {
    match options.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_u64().map(|n| n != 0),
        _ => None,
    }
}

/// Read an unsigned integer option. Accepts JSON numbers and numeric strings.
pub fn option_u64(options: &Options, key: &str) -> Result<Option<u64>> {
    let value = match options.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| {
        Error::InvalidOption(format!(
            "Option '{}' must be a non-negative integer, got {}",
            key, value
        ))
    })
}

/// Read a string option.
pub fn option_str<'a>(options: &'a Options, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

/// Inclusive byte range for partial reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Last byte to read (inclusive); `None` reads to the end of the file.
    pub end: Option<u64>,
}

impl ByteRange {
    /// Translate the `start`/`end` options into a range; `None` when neither is set.
    pub fn from_options(options: &Options) -> Result<Option<Self>> {
        let start = option_u64(options, "start")?;
        let end = option_u64(options, "end")?;
        if start.is_none() && end.is_none() {
            return Ok(None);
        }
        let start = start.unwrap_or(0);
        if let Some(end) = end {
            if end < start {
                return Err(Error::InvalidOption(format!(
                    "Invalid byte range: end ({}) is before start ({})",
                    end, start
                )));
            }
        }
        Ok(Some(Self { start, end }))
    }

    /// Number of bytes covered, if bounded. A range ending at `u64::MAX`
    /// counts as unbounded.
    pub fn len(&self) -> Option<u64> {
        self.end
            .and_then(|end| end.checked_sub(self.start))
            .and_then(|span| span.checked_add(1))
    }

    /// Value for an HTTP `Range` header.
    pub fn to_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// The three shapes a file can be added from.
pub enum FileSource {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// An in-memory payload; loaded whole.
    Buffer(Bytes),
    /// A readable stream; never buffered whole by the pipeline.
    Stream(FileStream),
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            FileSource::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            FileSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Normalised payload handed to the `add_file` hook.
pub enum FileBody {
    /// Already-opened source file. The handle is dropped by the hook on every exit path.
    File { file: tokio::fs::File, path: PathBuf },
    Buffer(Bytes),
    Stream(FileStream),
}

impl fmt::Debug for FileBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileBody::File { path, .. } => f.debug_struct("File").field("path", path).finish(),
            FileBody::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            FileBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Parameters for the `add_file*` family.
#[derive(Debug)]
pub struct AddFileParams {
    /// Bucket to write to; the selected bucket is used when `None`.
    pub bucket_name: Option<String>,
    /// Name of the file inside the bucket; may contain `/`.
    pub target_path: String,
    pub source: FileSource,
    pub options: Options,
}

impl AddFileParams {
    pub fn new(target_path: impl Into<String>, source: FileSource) -> Self {
        Self {
            bucket_name: None,
            target_path: target_path.into(),
            source,
            options: Options::new(),
        }
    }

    pub fn from_path(orig_path: impl Into<PathBuf>, target_path: impl Into<String>) -> Self {
        Self::new(target_path, FileSource::Path(orig_path.into()))
    }

    pub fn from_buffer(buffer: impl Into<Bytes>, target_path: impl Into<String>) -> Self {
        Self::new(target_path, FileSource::Buffer(buffer.into()))
    }

    pub fn from_stream(
        stream: impl AsyncRead + Send + 'static,
        target_path: impl Into<String>,
    ) -> Self {
        Self::new(target_path, FileSource::Stream(Box::pin(stream)))
    }

    pub fn bucket(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket_name.into());
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}
