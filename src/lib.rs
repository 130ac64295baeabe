//! storage-abstraction - one API over many object-storage providers
//!
//! A [`Storage`] wraps a single adapter built from a connection URL such as
//! `s3://key:secret@eu-west-1/photos` or from a typed [`AdapterConfig`].
//! Every adapter runs the same pipeline:
//! - a configuration error is reported by every call
//! - bucket names fall back to the selected bucket and are validated
//! - bucket/file preconditions are checked before any backend call
//! - public URLs are only handed out for public buckets
//!
//! Backends are found through the [`AdapterRegistry`]; the local filesystem
//! and S3-compatible services (AWS, MinIO, Cloudflare R2) are built in.

pub mod adapter;
pub mod config;
pub mod connection;
pub mod error;
pub mod facade;
pub mod registry;
pub mod result;
pub mod storage;
pub mod types;

pub use adapter::{Adapter, AdapterHooks, PublicAccess};
pub use connection::{parse_url, AdapterConfig, ParsedUrl, Provider, StorageConfig};
pub use error::{Error, Result};
pub use facade::{BucketSession, Storage};
pub use registry::{AdapterLocator, AdapterRegistry, ConstructAdapter, RegistryEntry};
pub use result::ResultObject;
pub use types::{AddFileParams, ByteRange, FileBody, FileListing, FileSource, FileStream, Options};
