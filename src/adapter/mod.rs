//! Adapter pipeline
//!
//! [`Adapter`] owns everything that is the same for every backend: the sticky
//! configuration error, bucket resolution against the selected bucket, name
//! validation, bucket/file precondition checks, the file-add pipeline and the
//! public-URL gate. The backend-specific I/O is delegated to an
//! [`AdapterHooks`] object.

pub mod hooks;
pub mod validation;

use std::any::Any;
use std::sync::{Arc, RwLock};

use crate::connection::{AdapterConfig, Provider};
use crate::types::{
    option_bool, option_u64, AddFileParams, ByteRange, FileBody, FileListing, FileSource,
    FileStream, Options, PresignedUpload, DEFAULT_EXPIRES_IN, DEFAULT_MAX_FILES,
};
use crate::{Error, Result};

pub use hooks::AdapterHooks;
pub use validation::{validate_file_name, validate_name};

/// How a provider answers "is this bucket public".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicAccess {
    /// The `bucket_is_public` hook gives a reliable answer.
    Queryable,
    /// The provider's API cannot tell.
    Unknowable,
    /// Only whole-bucket toggling exists; a successful toggle is authoritative.
    AclToggle,
}

impl PublicAccess {
    pub fn of(provider: Provider) -> Self {
        match provider {
            Provider::R2 => PublicAccess::Unknowable,
            Provider::B2 => PublicAccess::AclToggle,
            _ => PublicAccess::Queryable,
        }
    }
}

/// One configured backend plus the shared pipeline.
pub struct Adapter {
    provider: Provider,
    config: AdapterConfig,
    config_error: Option<String>,
    selected_bucket: RwLock<Option<String>>,
    hooks: Option<Box<dyn AdapterHooks>>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("provider", &self.provider)
            .field("config_error", &self.config_error)
            .field("selected_bucket", &self.selected_bucket())
            .finish_non_exhaustive()
    }
}

impl Adapter {
    /// Assemble an adapter. `hooks` is `None` exactly when construction failed,
    /// in which case `config_error` carries the reason.
    pub(crate) fn from_parts(
        config: AdapterConfig,
        config_error: Option<String>,
        hooks: Option<Box<dyn AdapterHooks>>,
    ) -> Self {
        let config_error = config_error
            .or_else(|| hooks.as_ref().and_then(|h| h.config_error()))
            .or_else(|| {
                hooks
                    .is_none()
                    .then(|| "Adapter has no backend implementation".to_string())
            });
        let selected_bucket = config.bucket_name().map(str::to_string);

        Self {
            provider: config.provider(),
            config,
            config_error,
            selected_bucket: RwLock::new(selected_bucket),
            hooks,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn config_error(&self) -> Option<&str> {
        self.config_error.as_deref()
    }

    pub fn service_client(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.hooks().ok().and_then(|h| h.service_client())
    }

    pub fn selected_bucket(&self) -> Option<String> {
        self.selected_bucket
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Set or clear the bucket used when a call omits the bucket name.
    pub fn set_selected_bucket(&self, bucket: Option<&str>) {
        let mut selected = self
            .selected_bucket
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *selected = bucket.map(str::to_string);
    }

    // -- pipeline steps --

    fn hooks(&self) -> Result<&dyn AdapterHooks> {
        if let Some(err) = &self.config_error {
            return Err(Error::Config(err.clone()));
        }
        self.hooks
            .as_deref()
            .ok_or_else(|| Error::config("Adapter has no backend implementation"))
    }

    fn resolve_bucket(&self, name: Option<&str>) -> Result<String> {
        let bucket = match name {
            Some(name) => name.to_string(),
            None => self.selected_bucket().ok_or(Error::NoBucket)?,
        };
        validate_name(Some(&bucket), self.provider)?;
        Ok(bucket)
    }

    async fn ensure_bucket(&self, hooks: &dyn AdapterHooks, bucket: &str) -> Result<()> {
        if hooks.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(Error::BucketNotFound(bucket.to_string()))
        }
    }

    async fn ensure_file(&self, hooks: &dyn AdapterHooks, bucket: &str, file: &str) -> Result<()> {
        if hooks.file_exists(bucket, file).await? {
            Ok(())
        } else {
            Err(Error::file_not_found(bucket, file))
        }
    }

    async fn check_public(
        &self,
        hooks: &dyn AdapterHooks,
        bucket: &str,
        options: &Options,
    ) -> Result<()> {
        if option_bool(options, "noCheck") == Some(true) {
            return Ok(());
        }
        match PublicAccess::of(self.provider) {
            PublicAccess::Queryable => {
                if hooks.bucket_is_public(bucket).await? {
                    Ok(())
                } else {
                    Err(Error::NotPublic(bucket.to_string()))
                }
            }
            PublicAccess::Unknowable => Err(self.unknowable_public(bucket)),
            PublicAccess::AclToggle => {
                if option_bool(options, "makePublic") == Some(true) {
                    tracing::debug!("Making bucket '{}' public on {}", bucket, self.provider);
                    hooks.make_bucket_public(bucket).await
                } else {
                    Err(Error::unsupported(format!(
                        "{} only toggles public access for a whole bucket; pass makePublic to make bucket '{}' public or noCheck to skip this check",
                        self.provider.display_name(),
                        bucket
                    )))
                }
            }
        }
    }

    fn unknowable_public(&self, bucket: &str) -> Error {
        Error::unsupported(format!(
            "{} does not report whether bucket '{}' is public; pass noCheck to skip this check",
            self.provider.display_name(),
            bucket
        ))
    }

    // -- bucket operations --

    pub async fn create_bucket(&self, name: Option<&str>, options: &Options) -> Result<()> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(name)?;
        tracing::debug!("Creating bucket '{}' on {}", bucket, self.provider);
        hooks.create_bucket(&bucket, options).await
    }

    pub async fn clear_bucket(&self, name: Option<&str>) -> Result<()> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(name)?;
        self.ensure_bucket(hooks, &bucket).await?;
        hooks.clear_bucket(&bucket).await
    }

    /// Delete a bucket and its content. Deleting the selected bucket clears the selection.
    pub async fn delete_bucket(&self, name: Option<&str>) -> Result<()> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(name)?;
        self.ensure_bucket(hooks, &bucket).await?;
        hooks.delete_bucket(&bucket).await?;

        let mut selected = self
            .selected_bucket
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if selected.as_deref() == Some(bucket.as_str()) {
            *selected = None;
        }
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        self.hooks()?.list_buckets().await
    }

    pub async fn bucket_exists(&self, name: Option<&str>) -> Result<bool> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(name)?;
        hooks.bucket_exists(&bucket).await
    }

    pub async fn bucket_is_public(&self, name: Option<&str>) -> Result<bool> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(name)?;
        if PublicAccess::of(self.provider) == PublicAccess::Unknowable {
            return Err(self.unknowable_public(&bucket));
        }
        self.ensure_bucket(hooks, &bucket).await?;
        hooks.bucket_is_public(&bucket).await
    }

    pub async fn list_files(&self, name: Option<&str>, max_files: Option<usize>) -> Result<FileListing> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(name)?;
        self.ensure_bucket(hooks, &bucket).await?;
        hooks
            .list_files(&bucket, max_files.unwrap_or(DEFAULT_MAX_FILES))
            .await
    }

    // -- file operations --

    /// Add a file from any of the three source shapes.
    ///
    /// A path source is opened before anything else so a missing file fails
    /// without touching the backend; the open handle is moved into the hook
    /// and released whether the upload succeeds or not.
    pub async fn add_file(&self, params: AddFileParams) -> Result<()> {
        let hooks = self.hooks()?;
        let AddFileParams {
            bucket_name,
            target_path,
            source,
            options,
        } = params;
        let bucket = self.resolve_bucket(bucket_name.as_deref())?;
        validate_file_name(&target_path)?;

        let body = match source {
            FileSource::Path(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|source| Error::Source {
                        path: path.display().to_string(),
                        source,
                    })?;
                FileBody::File { file, path }
            }
            FileSource::Buffer(bytes) => FileBody::Buffer(bytes),
            FileSource::Stream(stream) => FileBody::Stream(stream),
        };

        self.ensure_bucket(hooks, &bucket).await?;
        tracing::debug!(
            "Adding {:?} as '{}' to bucket '{}' on {}",
            body,
            target_path,
            bucket,
            self.provider
        );
        hooks.add_file(&bucket, &target_path, body, &options).await
    }

    pub async fn add_file_from_path(&self, params: AddFileParams) -> Result<()> {
        expect_source(&params, "add_file_from_path", |s| matches!(s, FileSource::Path(_)))?;
        self.add_file(params).await
    }

    pub async fn add_file_from_buffer(&self, params: AddFileParams) -> Result<()> {
        expect_source(&params, "add_file_from_buffer", |s| {
            matches!(s, FileSource::Buffer(_))
        })?;
        self.add_file(params).await
    }

    pub async fn add_file_from_stream(&self, params: AddFileParams) -> Result<()> {
        expect_source(&params, "add_file_from_stream", |s| {
            matches!(s, FileSource::Stream(_))
        })?;
        self.add_file(params).await
    }

    /// Open a file for reading; `start`/`end` options select an inclusive byte range.
    pub async fn get_file_as_stream(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<FileStream> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(bucket)?;
        validate_file_name(file)?;
        let range = ByteRange::from_options(options)?;
        self.ensure_file(hooks, &bucket, file).await?;
        hooks.get_file_as_stream(&bucket, file, range, options).await
    }

    /// Public URL of a file. Unless `noCheck` is passed, the bucket must be public.
    pub async fn get_public_url(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<String> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(bucket)?;
        validate_file_name(file)?;
        self.ensure_file(hooks, &bucket, file).await?;
        self.check_public(hooks, &bucket, options).await?;
        hooks.get_public_url(&bucket, file, options).await
    }

    pub async fn get_signed_url(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<String> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(bucket)?;
        validate_file_name(file)?;
        let expires_in = option_u64(options, "expiresIn")?.unwrap_or(DEFAULT_EXPIRES_IN);
        self.ensure_file(hooks, &bucket, file).await?;
        hooks.get_signed_url(&bucket, file, expires_in, options).await
    }

    /// Presigned URL for uploading `file`; the file does not need to exist yet.
    pub async fn get_presigned_upload_url(
        &self,
        bucket: Option<&str>,
        file: &str,
        options: &Options,
    ) -> Result<PresignedUpload> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(bucket)?;
        validate_file_name(file)?;
        let expires_in = option_u64(options, "expiresIn")?.unwrap_or(DEFAULT_EXPIRES_IN);
        self.ensure_bucket(hooks, &bucket).await?;
        hooks
            .get_presigned_upload_url(&bucket, file, expires_in, options)
            .await
    }

    /// Remove a file. Removing a file that does not exist succeeds.
    pub async fn remove_file(&self, bucket: Option<&str>, file: &str) -> Result<()> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(bucket)?;
        validate_file_name(file)?;
        if !hooks.file_exists(&bucket, file).await? {
            tracing::debug!("File '{}' not in bucket '{}', nothing to remove", file, bucket);
            return Ok(());
        }
        hooks.remove_file(&bucket, file).await
    }

    pub async fn size_of(&self, bucket: Option<&str>, file: &str) -> Result<u64> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(bucket)?;
        validate_file_name(file)?;
        self.ensure_file(hooks, &bucket, file).await?;
        hooks.size_of(&bucket, file).await
    }

    pub async fn file_exists(&self, bucket: Option<&str>, file: &str) -> Result<bool> {
        let hooks = self.hooks()?;
        let bucket = self.resolve_bucket(bucket)?;
        validate_file_name(file)?;
        hooks.file_exists(&bucket, file).await
    }
}

fn expect_source(
    params: &AddFileParams,
    operation: &str,
    matches: impl Fn(&FileSource) -> bool,
) -> Result<()> {
    if matches(&params.source) {
        Ok(())
    } else {
        Err(Error::InvalidOption(format!(
            "{} does not accept a {:?} source",
            operation, params.source
        )))
    }
}
