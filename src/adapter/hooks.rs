//! Hook contract implemented by every backend
//!
//! The pipeline in [`super::Adapter`] has already resolved and validated the
//! bucket (and file) name, checked the preconditions and translated the
//! options it understands before any of these methods is called. Hooks do
//! the I/O and nothing else.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{ByteRange, FileBody, FileListing, FileStream, Options, PresignedUpload};
use crate::{Error, Result};

#[async_trait]
pub trait AdapterHooks: Send + Sync {
    /// The vendor client (or equivalent handle) wrapped by this backend.
    fn service_client(&self) -> Option<Arc<dyn Any + Send + Sync>>;

    /// A configuration problem detected while building the backend. When set,
    /// the pipeline never calls any other hook.
    fn config_error(&self) -> Option<String> {
        None
    }

    /// Create a bucket. A bucket that already exists is a success.
    async fn create_bucket(&self, name: &str, options: &Options) -> Result<()>;

    /// Remove every file from a bucket, keeping the bucket.
    async fn clear_bucket(&self, name: &str) -> Result<()>;

    async fn delete_bucket(&self, name: &str) -> Result<()>;

    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn bucket_exists(&self, name: &str) -> Result<bool>;

    async fn bucket_is_public(&self, name: &str) -> Result<bool>;

    /// Toggle whole-bucket public read access.
    async fn make_bucket_public(&self, name: &str) -> Result<()> {
        Err(Error::unsupported(format!(
            "This backend cannot make bucket '{}' public",
            name
        )))
    }

    async fn add_file(
        &self,
        bucket: &str,
        target_path: &str,
        body: FileBody,
        options: &Options,
    ) -> Result<()>;

    async fn get_file_as_stream(
        &self,
        bucket: &str,
        file: &str,
        range: Option<ByteRange>,
        options: &Options,
    ) -> Result<FileStream>;

    async fn get_public_url(&self, bucket: &str, file: &str, options: &Options) -> Result<String>;

    async fn get_signed_url(
        &self,
        bucket: &str,
        file: &str,
        expires_in: u64,
        options: &Options,
    ) -> Result<String>;

    async fn get_presigned_upload_url(
        &self,
        bucket: &str,
        file: &str,
        expires_in: u64,
        options: &Options,
    ) -> Result<PresignedUpload>;

    async fn remove_file(&self, bucket: &str, file: &str) -> Result<()>;

    async fn list_files(&self, bucket: &str, max_files: usize) -> Result<FileListing>;

    async fn size_of(&self, bucket: &str, file: &str) -> Result<u64>;

    async fn file_exists(&self, bucket: &str, file: &str) -> Result<bool>;
}
