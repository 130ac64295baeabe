//! S3-compatible backend
//!
//! Serves Amazon S3, MinIO and Cloudflare R2. The latter two are plain S3
//! with a custom endpoint and path-style addressing.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use serde_json::{json, Value};

use crate::adapter::AdapterHooks;
use crate::connection::{AdapterConfig, Provider};
use crate::registry::ConstructAdapter;
use crate::types::{
    option_bool, option_str, ByteRange, FileBody, FileListing, FileStream, Options,
    PresignedUpload,
};
use crate::{Error, Result};

const DEFAULT_REGION: &str = "us-east-1";
const LIST_PAGE_SIZE: usize = 1000;

fn provider_error(operation: &str, err: impl std::error::Error) -> Error {
    Error::provider(format!("S3 {} failed: {}", operation, DisplayErrorContext(err)))
}

/// Connection settings shared by every S3-compatible provider.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Connection {
    provider: Provider,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
}

impl Connection {
    fn from_config(config: AdapterConfig) -> Result<Self> {
        match config {
            AdapterConfig::S3(c) => Ok(Self {
                provider: Provider::S3,
                access_key_id: c.access_key_id,
                secret_access_key: c.secret_access_key,
                region: c.region,
                endpoint: c.endpoint,
            }),
            AdapterConfig::Minio(c) => {
                let scheme = if c.use_ssl { "https" } else { "http" };
                let port = c.port.map(|p| format!(":{}", p)).unwrap_or_default();
                Ok(Self {
                    provider: Provider::Minio,
                    access_key_id: Some(c.access_key),
                    secret_access_key: Some(c.secret_key),
                    region: Some(c.region.unwrap_or_else(|| DEFAULT_REGION.to_string())),
                    endpoint: Some(format!("{}://{}{}", scheme, c.end_point, port)),
                })
            }
            AdapterConfig::R2(c) => Ok(Self {
                provider: Provider::R2,
                access_key_id: Some(c.access_key_id),
                secret_access_key: Some(c.secret_access_key),
                region: Some("auto".to_string()),
                endpoint: Some(format!("https://{}.r2.cloudflarestorage.com", c.account_id)),
            }),
            other => Err(Error::config(format!(
                "S3Adapter can not be built from a '{}' configuration",
                other.provider()
            ))),
        }
    }
}

/// S3 storage backend
pub struct S3Adapter {
    client: Client,
    provider: Provider,
    region: String,
    endpoint: Option<String>,
}

impl S3Adapter {
    async fn new(connection: Connection) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &connection.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(id), Some(secret)) = (
            connection.access_key_id.clone(),
            connection.secret_access_key.clone(),
        ) {
            loader = loader.credentials_provider(Credentials::new(
                id,
                secret,
                None,
                None,
                "storage-abstraction",
            ));
        }
        let shared = loader.load().await;

        let region = shared
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).region(Region::new(region.clone()));
        if let Some(endpoint_url) = &connection.endpoint {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        Ok(Self {
            client,
            provider: connection.provider,
            region,
            endpoint: connection.endpoint,
        })
    }

    async fn list_objects(&self, bucket: &str, max_files: usize) -> Result<FileListing> {
        let mut files = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page_size = (max_files - files.len()).min(LIST_PAGE_SIZE);
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .max_keys(page_size as i32);
            if let Some(token) = continuation_token.take() {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| provider_error("list objects", e))?;

            for object in resp.contents() {
                if let Some(key) = object.key() {
                    let size = object.size().unwrap_or(0).max(0) as u64;
                    files.push((key.to_string(), size));
                }
            }

            match resp.next_continuation_token() {
                Some(token) if files.len() < max_files => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        files.truncate(max_files);
        Ok(files)
    }

    async fn head(&self, bucket: &str, file: &str) -> Result<Option<u64>> {
        match self.client.head_object().bucket(bucket).key(file).send().await {
            Ok(resp) => Ok(Some(resp.content_length().unwrap_or(0).max(0) as u64)),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if missing {
                    Ok(None)
                } else {
                    Err(provider_error("head object", err))
                }
            }
        }
    }

    /// Copy a stream of unknown length to a temp file; PutObject needs a length.
    async fn spool(stream: &mut FileStream, path: &Path) -> Result<()> {
        let mut out = tokio::fs::File::create(path).await?;
        tokio::io::copy(stream, &mut out).await?;
        tokio::io::AsyncWriteExt::flush(&mut out).await?;
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, body: ByteStream, options: &Options) -> Result<()> {
        let mut req = self.client.put_object().bucket(bucket).key(key).body(body);
        if let Some(content_type) = option_str(options, "contentType") {
            req = req.content_type(content_type);
        }
        req.send()
            .await
            .map_err(|e| provider_error("put object", e))?;
        Ok(())
    }
}

#[async_trait]
impl ConstructAdapter for S3Adapter {
    async fn connect(config: AdapterConfig) -> Result<Self> {
        let connection = Connection::from_config(config)?;
        Self::new(connection).await
    }
}

/// Whether a bucket policy grants anonymous `s3:GetObject`.
fn policy_allows_public_read(policy: &str) -> bool {
    let Ok(doc) = serde_json::from_str::<Value>(policy) else {
        return false;
    };
    let statements = match &doc["Statement"] {
        Value::Array(list) => list.clone(),
        single @ Value::Object(_) => vec![single.clone()],
        _ => return false,
    };

    let is_wildcard = |v: &Value| match v {
        Value::String(s) => s == "*",
        Value::Array(list) => list.iter().any(|s| s == "*"),
        _ => false,
    };
    let grants_read = |v: &Value| match v {
        Value::String(s) => s == "s3:GetObject" || s == "s3:*",
        Value::Array(list) => list.iter().any(|s| s == "s3:GetObject" || s == "s3:*"),
        _ => false,
    };

    statements.iter().any(|stmt| {
        let principal = &stmt["Principal"];
        stmt["Effect"] == "Allow"
            && (is_wildcard(principal) || is_wildcard(&principal["AWS"]))
            && grants_read(&stmt["Action"])
    })
}

#[async_trait]
impl AdapterHooks for S3Adapter {
    fn service_client(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        Some(Arc::new(self.client.clone()))
    }

    async fn create_bucket(&self, name: &str, options: &Options) -> Result<()> {
        let mut req = self.client.create_bucket().bucket(name);
        if self.provider == Provider::S3 && self.region != DEFAULT_REGION {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        if let Err(err) = req.send().await {
            let exists = err
                .as_service_error()
                .map(|e| e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists())
                .unwrap_or(false);
            if !exists {
                return Err(provider_error("create bucket", err));
            }
            tracing::debug!("Bucket '{}' already exists", name);
        }

        if option_bool(options, "public") == Some(true) {
            self.make_bucket_public(name).await?;
        }
        Ok(())
    }

    async fn clear_bucket(&self, name: &str) -> Result<()> {
        loop {
            let batch = self.list_objects(name, LIST_PAGE_SIZE).await?;
            if batch.is_empty() {
                return Ok(());
            }
            for (key, _) in batch {
                self.client
                    .delete_object()
                    .bucket(name)
                    .key(&key)
                    .send()
                    .await
                    .map_err(|e| provider_error("delete object", e))?;
            }
        }
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.clear_bucket(name).await?;
        self.client
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| provider_error("delete bucket", e))?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| provider_error("list buckets", e))?;
        Ok(resp
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(|n| n.to_string()))
            .collect())
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if missing {
                    Ok(false)
                } else {
                    Err(provider_error("head bucket", err))
                }
            }
        }
    }

    async fn bucket_is_public(&self, name: &str) -> Result<bool> {
        match self.client.get_bucket_policy().bucket(name).send().await {
            Ok(resp) => Ok(resp.policy().map(policy_allows_public_read).unwrap_or(false)),
            Err(err) => {
                let no_policy = err.as_service_error().and_then(|e| e.code())
                    == Some("NoSuchBucketPolicy");
                if no_policy {
                    Ok(false)
                } else {
                    Err(provider_error("get bucket policy", err))
                }
            }
        }
    }

    async fn make_bucket_public(&self, name: &str) -> Result<()> {
        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": "*",
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{}/*", name)],
            }],
        });
        self.client
            .put_bucket_policy()
            .bucket(name)
            .policy(policy.to_string())
            .send()
            .await
            .map_err(|e| provider_error("put bucket policy", e))?;
        Ok(())
    }

    async fn add_file(
        &self,
        bucket: &str,
        target_path: &str,
        body: FileBody,
        options: &Options,
    ) -> Result<()> {
        match body {
            FileBody::Buffer(bytes) => {
                self.put(bucket, target_path, ByteStream::from(bytes), options)
                    .await
            }
            FileBody::File { file, path } => {
                // The SDK opens its own handle.
                drop(file);
                let stream = ByteStream::from_path(&path)
                    .await
                    .map_err(|e| {
                        Error::provider(format!("S3 read of '{}' failed: {}", path.display(), e))
                    })?;
                self.put(bucket, target_path, stream, options).await
            }
            FileBody::Stream(mut stream) => {
                let spool_path = std::env::temp_dir()
                    .join(format!("storage-abstraction-{}", uuid::Uuid::new_v4()));
                let result = async {
                    Self::spool(&mut stream, &spool_path).await?;
                    let body = ByteStream::from_path(&spool_path)
                        .await
                        .map_err(|e| Error::provider(format!("S3 spool read failed: {}", e)))?;
                    self.put(bucket, target_path, body, options).await
                }
                .await;
                if let Err(e) = tokio::fs::remove_file(&spool_path).await {
                    tracing::warn!("Failed to remove spool file {:?}: {}", spool_path, e);
                }
                result
            }
        }
    }

    async fn get_file_as_stream(
        &self,
        bucket: &str,
        file: &str,
        range: Option<ByteRange>,
        _options: &Options,
    ) -> Result<FileStream> {
        let mut req = self.client.get_object().bucket(bucket).key(file);
        if let Some(range) = range {
            req = req.range(range.to_header());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| provider_error("get object", e))?;
        Ok(Box::pin(resp.body.into_async_read()))
    }

    async fn get_public_url(&self, bucket: &str, file: &str, _options: &Options) -> Result<String> {
        Ok(match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, file),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, file),
        })
    }

    async fn get_signed_url(
        &self,
        bucket: &str,
        file: &str,
        expires_in: u64,
        _options: &Options,
    ) -> Result<String> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(expires_in))
            .map_err(|e| Error::InvalidOption(format!("Invalid expiresIn: {}", e)))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(file)
            .presigned(presigning)
            .await
            .map_err(|e| provider_error("presign get object", e))?;
        Ok(request.uri().to_string())
    }

    async fn get_presigned_upload_url(
        &self,
        bucket: &str,
        file: &str,
        expires_in: u64,
        options: &Options,
    ) -> Result<PresignedUpload> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(expires_in))
            .map_err(|e| Error::InvalidOption(format!("Invalid expiresIn: {}", e)))?;
        let mut req = self.client.put_object().bucket(bucket).key(file);
        if let Some(content_type) = option_str(options, "contentType") {
            req = req.content_type(content_type);
        }
        let request = req
            .presigned(presigning)
            .await
            .map_err(|e| provider_error("presign put object", e))?;

        let mut upload = PresignedUpload::new();
        upload.insert("url".into(), json!(request.uri().to_string()));
        upload.insert("method".into(), json!("PUT"));
        upload.insert("bucket".into(), json!(bucket));
        upload.insert("key".into(), json!(file));
        upload.insert("expiresIn".into(), json!(expires_in));
        Ok(upload)
    }

    async fn remove_file(&self, bucket: &str, file: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(file)
            .send()
            .await
            .map_err(|e| provider_error("delete object", e))?;
        Ok(())
    }

    async fn list_files(&self, bucket: &str, max_files: usize) -> Result<FileListing> {
        self.list_objects(bucket, max_files).await
    }

    async fn size_of(&self, bucket: &str, file: &str) -> Result<u64> {
        self.head(bucket, file)
            .await?
            .ok_or_else(|| Error::file_not_found(bucket, file))
    }

    async fn file_exists(&self, bucket: &str, file: &str) -> Result<bool> {
        Ok(self.head(bucket, file).await?.is_some())
    }
}
