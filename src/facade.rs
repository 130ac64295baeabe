//! The `Storage` facade
//!
//! Holds exactly one active [`Adapter`] and forwards every call to it.
//! Each call clones the `Arc` of the current adapter up front, so
//! [`Storage::switch_adapter`] never affects a call that already started.

use std::any::Any;
use std::sync::{Arc, RwLock};

use crate::adapter::Adapter;
use crate::connection::{AdapterConfig, Provider, StorageConfig};
use crate::registry::AdapterRegistry;
use crate::types::{AddFileParams, FileListing, FileStream, Options, PresignedUpload};
use crate::Result;

pub struct Storage {
    registry: Arc<AdapterRegistry>,
    adapter: RwLock<Arc<Adapter>>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("adapter", &self.adapter())
            .finish()
    }
}

impl Storage {
    /// Build a facade from a connection URL or a typed configuration.
    ///
    /// Fails only for an unknown provider or one without an implementation.
    /// Any other configuration problem is reported by [`Storage::config_error`]
    /// and by every operation.
    pub async fn new(config: impl Into<StorageConfig>) -> Result<Self> {
        Self::with_registry(config, AdapterRegistry::global()).await
    }

    pub async fn with_registry(
        config: impl Into<StorageConfig>,
        registry: Arc<AdapterRegistry>,
    ) -> Result<Self> {
        let adapter = registry.build(config.into()).await?;
        Ok(Self {
            registry,
            adapter: RwLock::new(Arc::new(adapter)),
        })
    }

    /// Replace the active adapter. Nothing carries over from the old one.
    pub async fn switch_adapter(&self, config: impl Into<StorageConfig>) -> Result<()> {
        let adapter = Arc::new(self.registry.build(config.into()).await?);
        tracing::debug!("Switching to {} adapter", adapter.provider());
        let mut current = self.adapter.write().unwrap_or_else(|e| e.into_inner());
        *current = adapter;
        Ok(())
    }

    /// The adapter currently receiving calls.
    pub fn adapter(&self) -> Arc<Adapter> {
        self.adapter
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn provider(&self) -> Provider {
        self.adapter().provider()
    }

    pub fn config(&self) -> AdapterConfig {
        self.adapter().config().clone()
    }

    pub fn config_error(&self) -> Option<String> {
        self.adapter().config_error().map(str::to_string)
    }

    pub fn service_client(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.adapter().service_client()
    }

    pub fn selected_bucket(&self) -> Option<String> {
        self.adapter().selected_bucket()
    }

    pub fn set_selected_bucket(&self, bucket: Option<&str>) {
        self.adapter().set_selected_bucket(bucket)
    }

    /// A view that passes `bucket` explicitly on every call.
    pub fn bucket(&self, bucket: impl Into<String>) -> BucketSession {
        BucketSession {
            adapter: self.adapter(),
            bucket: bucket.into(),
        }
    }

    pub async fn create_bucket(&self, name: Option<&str>, options: &Options) -> Result<()> {
        self.adapter().create_bucket(name, options).await
    }

    pub async fn clear_bucket(&self, name: Option<&str>) -> Result<()> {
        self.adapter().clear_bucket(name).await
    }

    pub async fn delete_bucket(&self, name: Option<&str>) -> Result<()> {
        self.adapter().delete_bucket(name).await
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        self.adapter().list_buckets().await
    }

    pub async fn bucket_exists(&self, name: Option<&str>) -> Result<bool> {
        self.adapter().bucket_exists(name).await
    }

    pub async fn bucket_is_public(&self, name: Option<&str>) -> Result<bool> {
        self.adapter().bucket_is_public(name).await
    }

    pub async fn add_file(&self, params: AddFileParams) -> Result<()> {
        self.adapter().add_file(params).await
    }

    pub async fn add_file_from_path(&self, params: AddFileParams) -> Result<()> {
        self.adapter().add_file_from_path(params).await
    }

    pub async fn add_file_from_buffer(&self, params: AddFileParams) -> Result<()> {
        self.adapter().add_file_from_buffer(params).await
    }

    pub async fn add_file_from_stream(&self, params: AddFileParams) -> Result<()> {
        self.adapter().add_file_from_stream(params).await
    }

    pub async fn get_file_as_stream(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<FileStream> {
        self.adapter().get_file_as_stream(bucket, file, options).await
    }

    pub async fn get_public_url(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<String> {
        self.adapter().get_public_url(bucket, file, options).await
    }

    pub async fn get_signed_url(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<String> {
        self.adapter().get_signed_url(bucket, file, options).await
    }

    pub async fn get_presigned_upload_url(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<PresignedUpload> {
        self.adapter()
            .get_presigned_upload_url(bucket, file, options)
            .await
    }

    pub async fn remove_file(&self, bucket: Option<&str>, file: &str) -> Result<()> {
        self.adapter().remove_file(bucket, file).await
    }

    pub async fn list_files(
        &self,
        bucket: Option<&str>,
        max_files: Option<usize>,
    ) -> Result<FileListing> {
        self.adapter().list_files(bucket, max_files).await
    }

    pub async fn size_of(&self, bucket: Option<&str>, file: &str) -> Result<u64> {
        self.adapter().size_of(bucket, file).await
    }

    pub async fn file_exists(&self, bucket: Option<&str>, file: &str) -> Result<bool> {
        self.adapter().file_exists(bucket, file).await
    }
}

/// An adapter paired with one bucket.
///
/// Calls never consult the adapter's selected bucket, so sessions for
/// different buckets can share an adapter without racing on the selection.
/// A session keeps the adapter it was created from across `switch_adapter`.
#[derive(Debug, Clone)]
pub struct BucketSession {
    adapter: Arc<Adapter>,
    bucket: String,
}

impl BucketSession {
    pub fn name(&self) -> &str {
        &self.bucket
    }

    fn target(&self) -> Option<&str> {
        Some(self.bucket.as_str())
    }

    pub async fn create(&self, options: &Options) -> Result<()> {
        self.adapter.create_bucket(self.target(), options).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.adapter.clear_bucket(self.target()).await
    }

    pub async fn delete(&self) -> Result<()> {
        self.adapter.delete_bucket(self.target()).await
    }

    pub async fn exists(&self) -> Result<bool> {
        self.adapter.bucket_exists(self.target()).await
    }

    pub async fn is_public(&self) -> Result<bool> {
        self.adapter.bucket_is_public(self.target()).await
    }

    /// Add a file; the session's bucket overrides `params.bucket_name`.
    pub async fn add_file(&self, params: AddFileParams) -> Result<()> {
        self.adapter.add_file(params.bucket(self.bucket.clone())).await
    }

    pub async fn get_file_as_stream(&self, file: &str, options: &Options) -> Result<FileStream> {
        self.adapter
            .get_file_as_stream(self.target(), file, options)
            .await
    }

    pub async fn get_public_url(&self, file: &str, options: &Options) -> Result<String> {
        self.adapter.get_public_url(self.target(), file, options).await
    }

    pub async fn get_signed_url(&self, file: &str, options: &Options) -> Result<String> {
        self.adapter.get_signed_url(self.target(), file, options).await
    }

    pub async fn get_presigned_upload_url(
        &self,
        file: &str,
        options: &Options,
    ) -> Result<PresignedUpload> {
        self.adapter
            .get_presigned_upload_url(self.target(), file, options)
            .await
    }

    pub async fn remove_file(&self, file: &str) -> Result<()> {
        self.adapter.remove_file(self.target(), file).await
    }

    pub async fn list_files(&self, max_files: Option<usize>) -> Result<FileListing> {
        self.adapter.list_files(self.target(), max_files).await
    }

    pub async fn size_of(&self, file: &str) -> Result<u64> {
        self.adapter.size_of(self.target(), file).await
    }

    pub async fn file_exists(&self, file: &str) -> Result<bool> {
        self.adapter.file_exists(self.target(), file).await
    }
}
