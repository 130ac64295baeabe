//! Built-in backends
//!
//! Each backend implements [`crate::adapter::AdapterHooks`] for one family
//! of providers and [`crate::registry::ConstructAdapter`] so the registry can
//! build it from an [`crate::AdapterConfig`].

pub mod local;
pub mod s3;

pub use local::LocalAdapter;
pub use s3::S3Adapter;
