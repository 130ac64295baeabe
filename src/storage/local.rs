//! Local filesystem backend
//!
//! Every bucket is a directory under the configured root; file names may
//! contain `/` and map onto nested directories.

use std::any::Any;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::adapter::AdapterHooks;
use crate::connection::AdapterConfig;
use crate::registry::ConstructAdapter;
use crate::types::{ByteRange, FileBody, FileListing, FileStream, Options, PresignedUpload};
use crate::{Error, Result};

const DEFAULT_MODE: u32 = 0o777;

/// Local filesystem storage
#[derive(Debug)]
pub struct LocalAdapter {
    root_path: PathBuf,
    mode: u32,
}

impl LocalAdapter {
    /// Create the adapter, creating the root directory if needed.
    pub async fn new(root_path: impl Into<PathBuf>, mode: Option<u32>) -> Result<Self> {
        let adapter = Self {
            root_path: root_path.into(),
            mode: mode.unwrap_or(DEFAULT_MODE),
        };
        adapter.create_dir(&adapter.root_path).await?;
        Ok(adapter)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Join `relative` onto `base`, refusing anything that would leave it.
    fn contained(base: &Path, relative: &str) -> Result<PathBuf> {
        let mut path = base.to_path_buf();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::invalid_name(format!(
                        "Path '{}' escapes the storage directory",
                        relative
                    )))
                }
            }
        }
        if path == base {
            return Err(Error::invalid_name(format!(
                "Path '{}' does not name an entry in the storage directory",
                relative
            )));
        }
        Ok(path)
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.contains(['/', '\\']) {
            return Err(Error::invalid_name(format!(
                "Bucket '{}' escapes the storage directory",
                bucket
            )));
        }
        Self::contained(&self.root_path, bucket)
    }

    fn resolve_path(&self, bucket: &str, file: &str) -> Result<PathBuf> {
        Self::contained(&self.bucket_path(bucket)?, file)
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(self.mode);
        builder.create(path).await?;
        Ok(())
    }

    async fn is_dir(path: &Path) -> Result<bool> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ConstructAdapter for LocalAdapter {
    async fn connect(config: AdapterConfig) -> Result<Self> {
        match config {
            AdapterConfig::Local(c) => Self::new(c.directory, c.mode).await,
            other => Err(Error::config(format!(
                "LocalAdapter can not be built from a '{}' configuration",
                other.provider()
            ))),
        }
    }
}

#[async_trait]
impl AdapterHooks for LocalAdapter {
    fn service_client(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        Some(Arc::new(self.root_path.clone()))
    }

    async fn create_bucket(&self, name: &str, _options: &Options) -> Result<()> {
        let path = self.bucket_path(name)?;
        if Self::is_dir(&path).await? {
            return Ok(());
        }
        self.create_dir(&path).await
    }

    async fn clear_bucket(&self, name: &str) -> Result<()> {
        let mut entries = fs::read_dir(self.bucket_path(name)?).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        fs::remove_dir_all(self.bucket_path(name)?).await?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut buckets = Vec::new();
        let mut entries = fs::read_dir(&self.root_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    buckets.push(name.to_string());
                }
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        Self::is_dir(&self.bucket_path(name)?).await
    }

    async fn bucket_is_public(&self, _name: &str) -> Result<bool> {
        // Anything on the local disk is reachable by its path.
        Ok(true)
    }

    async fn add_file(
        &self,
        bucket: &str,
        target_path: &str,
        body: FileBody,
        _options: &Options,
    ) -> Result<()> {
        let dest = self.resolve_path(bucket, target_path)?;
        if let Some(parent) = dest.parent() {
            self.create_dir(parent).await?;
        }

        match body {
            FileBody::Buffer(bytes) => fs::write(&dest, &bytes).await?,
            FileBody::File { mut file, .. } => {
                let mut out = fs::File::create(&dest).await?;
                tokio::io::copy(&mut file, &mut out).await?;
                out.flush().await?;
            }
            FileBody::Stream(mut stream) => {
                let mut out = fs::File::create(&dest).await?;
                tokio::io::copy(&mut stream, &mut out).await?;
                out.flush().await?;
            }
        }
        Ok(())
    }

    async fn get_file_as_stream(
        &self,
        bucket: &str,
        file: &str,
        range: Option<ByteRange>,
        _options: &Options,
    ) -> Result<FileStream> {
        let mut handle = fs::File::open(self.resolve_path(bucket, file)?).await?;
        let Some(range) = range else {
            return Ok(Box::pin(handle));
        };

        handle.seek(std::io::SeekFrom::Start(range.start)).await?;
        match range.len() {
            Some(len) => Ok(Box::pin(handle.take(len))),
            None => Ok(Box::pin(handle)),
        }
    }

    async fn get_public_url(&self, bucket: &str, file: &str, _options: &Options) -> Result<String> {
        let path = fs::canonicalize(self.resolve_path(bucket, file)?).await?;
        Ok(path.display().to_string())
    }

    async fn get_signed_url(
        &self,
        bucket: &str,
        file: &str,
        _expires_in: u64,
        options: &Options,
    ) -> Result<String> {
        // Local paths need no signature.
        self.get_public_url(bucket, file, options).await
    }

    async fn get_presigned_upload_url(
        &self,
        _bucket: &str,
        _file: &str,
        _expires_in: u64,
        _options: &Options,
    ) -> Result<PresignedUpload> {
        Err(Error::unsupported(
            "Local storage does not support presigned upload URLs",
        ))
    }

    async fn remove_file(&self, bucket: &str, file: &str) -> Result<()> {
        fs::remove_file(self.resolve_path(bucket, file)?).await?;
        Ok(())
    }

    async fn list_files(&self, bucket: &str, max_files: usize) -> Result<FileListing> {
        let root = self.bucket_path(bucket)?;
        let mut files = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&root) {
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push((name, meta.len()));
                }
            }
        }

        files.sort();
        files.truncate(max_files);
        Ok(files)
    }

    async fn size_of(&self, bucket: &str, file: &str) -> Result<u64> {
        let meta = fs::metadata(self.resolve_path(bucket, file)?).await?;
        Ok(meta.len())
    }

    async fn file_exists(&self, bucket: &str, file: &str) -> Result<bool> {
        match fs::metadata(self.resolve_path(bucket, file)?).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_hooks() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp_dir.path(), None).await.unwrap();
        let options = Options::new();

        adapter.create_bucket("b1", &options).await.unwrap();
        // Creating it again is not an error.
        adapter.create_bucket("b1", &options).await.unwrap();
        assert!(adapter.bucket_exists("b1").await.unwrap());

        let data = Bytes::from("hello world");
        adapter
            .add_file("b1", "nested/file.txt", FileBody::Buffer(data.clone()), &options)
            .await
            .unwrap();
        assert!(adapter.file_exists("b1", "nested/file.txt").await.unwrap());
        assert_eq!(adapter.size_of("b1", "nested/file.txt").await.unwrap(), 11);

        let mut stream = adapter
            .get_file_as_stream(
                "b1",
                "nested/file.txt",
                Some(ByteRange { start: 6, end: Some(10) }),
                &options,
            )
            .await
            .unwrap();
        let mut partial = String::new();
        stream.read_to_string(&mut partial).await.unwrap();
        assert_eq!(partial, "world");

        assert_eq!(
            adapter.list_files("b1", 10).await.unwrap(),
            vec![("nested/file.txt".to_string(), 11)]
        );

        adapter.remove_file("b1", "nested/file.txt").await.unwrap();
        assert!(!adapter.file_exists("b1", "nested/file.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_files_is_sorted_and_capped() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp_dir.path(), None).await.unwrap();
        let options = Options::new();
        adapter.create_bucket("b1", &options).await.unwrap();

        for name in ["c.txt", "a.txt", "sub/b.txt"] {
            adapter
                .add_file("b1", name, FileBody::Buffer(Bytes::from_static(b"x")), &options)
                .await
                .unwrap();
        }

        let names: Vec<String> = adapter
            .list_files("b1", 2)
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_paths_stay_under_the_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("storage");
        let adapter = LocalAdapter::new(&root, None).await.unwrap();
        let options = Options::new();
        adapter.create_bucket("b1", &options).await.unwrap();

        for bucket in ["..", ".", "a/b", "/abs"] {
            assert!(
                matches!(adapter.delete_bucket(bucket).await, Err(Error::InvalidName(_))),
                "{bucket:?} should be refused"
            );
        }

        let outside = temp_dir.path().join("outside.txt");
        let err = adapter
            .add_file(
                "b1",
                outside.to_str().unwrap(),
                FileBody::Buffer(Bytes::from_static(b"x")),
                &options,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
        assert!(!outside.exists());
        assert!(adapter.remove_file("b1", "../b1/x").await.is_err());
        assert!(root.join("b1").is_dir());
    }
}
