//! Adapter configuration
//!
//! A connection is described either by a URL (see [`url`]) or by a
//! structured, provider-tagged [`AdapterConfig`]. Both end up as the same
//! typed record; URLs are mapped field by field per provider.

pub mod url;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ::url::form_urlencoded;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use self::url::{encode_credential, parse_url, provider_key, ParsedUrl};

/// Every backend this crate knows a key for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    S3,
    Minio,
    R2,
    Gcs,
    Azure,
    B2,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::Local,
        Provider::S3,
        Provider::Minio,
        Provider::R2,
        Provider::Gcs,
        Provider::Azure,
        Provider::B2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::S3 => "s3",
            Provider::Minio => "minio",
            Provider::R2 => "r2",
            Provider::Gcs => "gcs",
            Provider::Azure => "azure",
            Provider::B2 => "b2",
        }
    }

    /// Every provider key, sorted.
    pub fn known_keys() -> Vec<String> {
        let mut keys: Vec<String> = Provider::ALL.iter().map(|p| p.as_str().to_string()).collect();
        keys.sort();
        keys
    }

    /// Human-readable backend name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Local => "Local storage",
            Provider::S3 => "Amazon S3",
            Provider::Minio => "MinIO",
            Provider::R2 => "Cloudflare R2",
            Provider::Gcs => "Google Cloud Storage",
            Provider::Azure => "Azure Blob Storage",
            Provider::B2 => "Backblaze B2",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == key)
            .ok_or_else(|| Error::UnknownProvider {
                key: s.to_string(),
                known: Provider::known_keys(),
            })
    }
}

/// Filesystem backend: one directory per bucket under `directory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub directory: String,
    pub bucket_name: Option<String>,
    /// Permission bits for directories created by the adapter.
    pub mode: Option<u32>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub bucket_name: Option<String>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinioConfig {
    pub access_key: String,
    pub secret_key: String,
    pub end_point: String,
    pub port: Option<u16>,
    pub use_ssl: bool,
    pub region: Option<String>,
    pub bucket_name: Option<String>,
    pub options: BTreeMap<String, String>,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            end_point: String::new(),
            port: None,
            use_ssl: true,
            region: None,
            bucket_name: None,
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: Option<String>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    pub key_file: Option<String>,
    pub project_id: Option<String>,
    pub bucket_name: Option<String>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub account_name: String,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub bucket_name: Option<String>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct B2Config {
    pub application_key_id: String,
    pub application_key: String,
    pub bucket_name: Option<String>,
    pub options: BTreeMap<String, String>,
}

/// Provider-tagged configuration of one adapter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum AdapterConfig {
    Local(LocalConfig),
    S3(S3Config),
    Minio(MinioConfig),
    R2(R2Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    B2(B2Config),
}

impl AdapterConfig {
    /// An empty configuration for `provider`, used when parsing failed.
    pub fn empty(provider: Provider) -> Self {
        match provider {
            Provider::Local => AdapterConfig::Local(LocalConfig::default()),
            Provider::S3 => AdapterConfig::S3(S3Config::default()),
            Provider::Minio => AdapterConfig::Minio(MinioConfig::default()),
            Provider::R2 => AdapterConfig::R2(R2Config::default()),
            Provider::Gcs => AdapterConfig::Gcs(GcsConfig::default()),
            Provider::Azure => AdapterConfig::Azure(AzureConfig::default()),
            Provider::B2 => AdapterConfig::B2(B2Config::default()),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            AdapterConfig::Local(_) => Provider::Local,
            AdapterConfig::S3(_) => Provider::S3,
            AdapterConfig::Minio(_) => Provider::Minio,
            AdapterConfig::R2(_) => Provider::R2,
            AdapterConfig::Gcs(_) => Provider::Gcs,
            AdapterConfig::Azure(_) => Provider::Azure,
            AdapterConfig::B2(_) => Provider::B2,
        }
    }

    /// The default bucket; becomes the adapter's initially selected bucket.
    pub fn bucket_name(&self) -> Option<&str> {
        match self {
            AdapterConfig::Local(c) => c.bucket_name.as_deref(),
            AdapterConfig::S3(c) => c.bucket_name.as_deref(),
            AdapterConfig::Minio(c) => c.bucket_name.as_deref(),
            AdapterConfig::R2(c) => c.bucket_name.as_deref(),
            AdapterConfig::Gcs(c) => c.bucket_name.as_deref(),
            AdapterConfig::Azure(c) => c.bucket_name.as_deref(),
            AdapterConfig::B2(c) => c.bucket_name.as_deref(),
        }
    }

    /// Extra options captured from the query string.
    pub fn options(&self) -> &BTreeMap<String, String> {
        match self {
            AdapterConfig::Local(c) => &c.options,
            AdapterConfig::S3(c) => &c.options,
            AdapterConfig::Minio(c) => &c.options,
            AdapterConfig::R2(c) => &c.options,
            AdapterConfig::Gcs(c) => &c.options,
            AdapterConfig::Azure(c) => &c.options,
            AdapterConfig::B2(c) => &c.options,
        }
    }

    /// Parse a connection string into a typed configuration.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = parse_url(url)?;
        let provider: Provider = parsed.protocol.as_deref().unwrap_or_default().parse()?;
        Self::from_parsed(provider, parsed)
    }

    /// Map the generic URL pieces onto the fields of `provider`.
    pub fn from_parsed(provider: Provider, parsed: ParsedUrl) -> Result<Self> {
        let ParsedUrl {
            username,
            password,
            host,
            port,
            path,
            search_params: mut params,
            ..
        } = parsed;

        let config = match provider {
            Provider::Local => {
                let mode = params
                    .remove("mode")
                    .map(|m| {
                        u32::from_str_radix(m.trim(), 8).map_err(|_| {
                            Error::config(format!("Invalid directory mode '{}', expected octal", m))
                        })
                    })
                    .transpose()?;
                let (directory, bucket_name) = match username {
                    Some(user) => {
                        let directory = match password {
                            Some(pass) => format!("{}:{}", user, pass),
                            None => user,
                        };
                        if let Some(path) = path {
                            params.insert("path".to_string(), path);
                        }
                        (directory, host)
                    }
                    None => {
                        let host = host.unwrap_or_default();
                        let directory = match path {
                            Some(path) => format!("{}/{}", host, path),
                            None => host,
                        };
                        (directory, None)
                    }
                };
                AdapterConfig::Local(LocalConfig {
                    directory,
                    bucket_name,
                    mode,
                    options: params,
                })
            }
            Provider::S3 => {
                keep_sub_path(&mut params, path);
                AdapterConfig::S3(S3Config {
                    access_key_id: username,
                    secret_access_key: password,
                    region: params.remove("region"),
                    endpoint: params.remove("endpoint"),
                    bucket_name: host,
                    options: params,
                })
            }
            Provider::Minio => {
                let port = port
                    .map(|p| {
                        p.parse::<u16>()
                            .map_err(|_| Error::config(format!("Invalid port '{}'", p)))
                    })
                    .transpose()?;
                let use_ssl = match params.remove("useSSL") {
                    Some(v) => parse_flag("useSSL", &v)?,
                    None => true,
                };
                AdapterConfig::Minio(MinioConfig {
                    access_key: username.unwrap_or_default(),
                    secret_key: password.unwrap_or_default(),
                    end_point: host.unwrap_or_default(),
                    port,
                    use_ssl,
                    region: params.remove("region"),
                    bucket_name: path,
                    options: params,
                })
            }
            Provider::R2 => {
                keep_sub_path(&mut params, path);
                AdapterConfig::R2(R2Config {
                    account_id: params.remove("accountId").unwrap_or_default(),
                    access_key_id: username.unwrap_or_default(),
                    secret_access_key: password.unwrap_or_default(),
                    bucket_name: host,
                    options: params,
                })
            }
            Provider::Gcs => {
                keep_sub_path(&mut params, path);
                let (project_id, key_file) = match (username, password) {
                    (Some(project), Some(key_file)) => (Some(project), Some(key_file)),
                    (key_file, _) => (params.remove("projectId"), key_file),
                };
                AdapterConfig::Gcs(GcsConfig {
                    key_file,
                    project_id,
                    bucket_name: host,
                    options: params,
                })
            }
            Provider::Azure => {
                keep_sub_path(&mut params, path);
                AdapterConfig::Azure(AzureConfig {
                    account_name: username.unwrap_or_default(),
                    account_key: password,
                    sas_token: params.remove("sasToken"),
                    bucket_name: host,
                    options: params,
                })
            }
            Provider::B2 => {
                keep_sub_path(&mut params, path);
                AdapterConfig::B2(B2Config {
                    application_key_id: username.unwrap_or_default(),
                    application_key: password.unwrap_or_default(),
                    bucket_name: host,
                    options: params,
                })
            }
        };
        Ok(config)
    }

    /// Format the configuration back into a connection string.
    pub fn to_url(&self) -> String {
        let mut query: Vec<(&str, String)> = Vec::new();
        let body = match self {
            AdapterConfig::Local(c) => {
                if let Some(mode) = c.mode {
                    query.push(("mode", format!("{:o}", mode)));
                }
                let directory = encode_credential(&c.directory);
                match &c.bucket_name {
                    Some(bucket) => format!("{}@{}", directory, bucket),
                    // A bare locator is not decoded, so escaped directories keep the '@'.
                    None if directory != c.directory => format!("{}@", directory),
                    None => directory,
                }
            }
            AdapterConfig::S3(c) => {
                push_opt(&mut query, "region", &c.region);
                push_opt(&mut query, "endpoint", &c.endpoint);
                format!(
                    "{}{}",
                    credentials(c.access_key_id.as_deref(), c.secret_access_key.as_deref()),
                    c.bucket_name.as_deref().unwrap_or_default()
                )
            }
            AdapterConfig::Minio(c) => {
                push_opt(&mut query, "region", &c.region);
                if !c.use_ssl {
                    query.push(("useSSL", "false".to_string()));
                }
                let mut body = format!(
                    "{}{}",
                    credentials(non_blank(&c.access_key), non_blank(&c.secret_key)),
                    c.end_point
                );
                if let Some(port) = c.port {
                    body.push_str(&format!(":{}", port));
                }
                if let Some(bucket) = &c.bucket_name {
                    body.push_str(&format!("/{}", bucket));
                }
                body
            }
            AdapterConfig::R2(c) => {
                if !c.account_id.is_empty() {
                    query.push(("accountId", c.account_id.clone()));
                }
                format!(
                    "{}{}",
                    credentials(non_blank(&c.access_key_id), non_blank(&c.secret_access_key)),
                    c.bucket_name.as_deref().unwrap_or_default()
                )
            }
            AdapterConfig::Gcs(c) => {
                let creds = match (&c.project_id, &c.key_file) {
                    (Some(project), Some(key_file)) => {
                        credentials(Some(project.as_str()), Some(key_file.as_str()))
                    }
                    (project, key_file) => {
                        push_opt(&mut query, "projectId", project);
                        credentials(key_file.as_deref(), None)
                    }
                };
                format!("{}{}", creds, c.bucket_name.as_deref().unwrap_or_default())
            }
            AdapterConfig::Azure(c) => {
                push_opt(&mut query, "sasToken", &c.sas_token);
                format!(
                    "{}{}",
                    credentials(non_blank(&c.account_name), c.account_key.as_deref()),
                    c.bucket_name.as_deref().unwrap_or_default()
                )
            }
            AdapterConfig::B2(c) => format!(
                "{}{}",
                credentials(non_blank(&c.application_key_id), non_blank(&c.application_key)),
                c.bucket_name.as_deref().unwrap_or_default()
            ),
        };

        for (key, value) in self.options() {
            query.push((key.as_str(), value.clone()));
        }

        let mut url = format!("{}://{}", self.provider(), body);
        if !query.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &query {
                serializer.append_pair(key, value);
            }
            url.push('?');
            url.push_str(&serializer.finish());
        }
        url
    }

    /// Check that the fields the backend needs are present.
    pub fn validate(&self) -> Result<()> {
        match self {
            AdapterConfig::Local(c) => {
                if c.directory.trim().is_empty() {
                    return Err(Error::config(
                        "Local storage requires a directory, e.g. local://path/to/dir@bucket",
                    ));
                }
            }
            AdapterConfig::S3(c) => {
                if c.access_key_id.is_some() != c.secret_access_key.is_some() {
                    return Err(Error::config(
                        "Amazon S3 requires both an access key id and a secret access key, or neither",
                    ));
                }
            }
            AdapterConfig::Minio(c) => {
                require(&c.access_key, "MinIO", "an access key")?;
                require(&c.secret_key, "MinIO", "a secret key")?;
                require(&c.end_point, "MinIO", "an end point")?;
            }
            AdapterConfig::R2(c) => {
                require(&c.account_id, "Cloudflare R2", "an account id (accountId)")?;
                require(&c.access_key_id, "Cloudflare R2", "an access key id")?;
                require(&c.secret_access_key, "Cloudflare R2", "a secret access key")?;
            }
            AdapterConfig::Gcs(_) => {}
            AdapterConfig::Azure(c) => {
                require(&c.account_name, "Azure Blob Storage", "an account name")?;
                if c.account_key.is_none() && c.sas_token.is_none() {
                    return Err(Error::config(
                        "Azure Blob Storage requires an account key or a SAS token",
                    ));
                }
            }
            AdapterConfig::B2(c) => {
                require(&c.application_key_id, "Backblaze B2", "an application key id")?;
                require(&c.application_key, "Backblaze B2", "an application key")?;
            }
        }
        Ok(())
    }
}

/// What the facade is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Url(String),
    Adapter(AdapterConfig),
}

impl StorageConfig {
    /// Registry key of the requested provider.
    pub fn provider_key(&self) -> String {
        match self {
            StorageConfig::Url(url) => provider_key(url).to_string(),
            StorageConfig::Adapter(config) => config.provider().to_string(),
        }
    }

    /// Turn the input into a typed configuration for `provider`.
    pub fn into_adapter_config(self, provider: Provider) -> Result<AdapterConfig> {
        match self {
            StorageConfig::Url(url) => {
                let parsed = parse_url(&url)?;
                AdapterConfig::from_parsed(provider, parsed)
            }
            StorageConfig::Adapter(config) => Ok(config),
        }
    }
}

impl From<&str> for StorageConfig {
    fn from(url: &str) -> Self {
        StorageConfig::Url(url.to_string())
    }
}

impl From<String> for StorageConfig {
    fn from(url: String) -> Self {
        StorageConfig::Url(url)
    }
}

impl From<AdapterConfig> for StorageConfig {
    fn from(config: AdapterConfig) -> Self {
        StorageConfig::Adapter(config)
    }
}

fn keep_sub_path(params: &mut BTreeMap<String, String>, path: Option<String>) {
    if let Some(path) = path {
        params.insert("path".to_string(), path);
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::config(format!(
            "Invalid value '{}' for '{}', expected true or false",
            value, key
        ))),
    }
}

fn require(value: &str, provider: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config(format!("{} requires {}", provider, field)));
    }
    Ok(())
}

fn credentials(principal: Option<&str>, secret: Option<&str>) -> String {
    match (principal, secret) {
        (Some(p), Some(s)) => format!("{}:{}@", encode_credential(p), encode_credential(s)),
        (Some(p), None) => format!("{}@", encode_credential(p)),
        (None, Some(s)) => format!(":{}@", encode_credential(s)),
        (None, None) => String::new(),
    }
}

fn non_blank(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn push_opt<'a>(query: &mut Vec<(&'a str, String)>, key: &'a str, value: &Option<String>) {
    if let Some(v) = value {
        query.push((key, v.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_mapping() {
        let config = AdapterConfig::from_url("local://tests/tmp@the-bucket?mode=750").unwrap();
        assert_eq!(
            config,
            AdapterConfig::Local(LocalConfig {
                directory: "tests/tmp".into(),
                bucket_name: Some("the-bucket".into()),
                mode: Some(0o750),
                options: BTreeMap::new(),
            })
        );

        let no_bucket = AdapterConfig::from_url("local:///var/data").unwrap();
        assert_eq!(no_bucket.bucket_name(), None);
        match no_bucket {
            AdapterConfig::Local(c) => assert_eq!(c.directory, "/var/data"),
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_s3_mapping_keeps_extra_options() {
        let config =
            AdapterConfig::from_url("s3://KEY:SECRET@photos?region=eu-west-1&acl=private").unwrap();
        match config {
            AdapterConfig::S3(c) => {
                assert_eq!(c.access_key_id.as_deref(), Some("KEY"));
                assert_eq!(c.secret_access_key.as_deref(), Some("SECRET"));
                assert_eq!(c.region.as_deref(), Some("eu-west-1"));
                assert_eq!(c.bucket_name.as_deref(), Some("photos"));
                assert_eq!(c.options.get("acl").map(String::as_str), Some("private"));
                assert!(!c.options.contains_key("region"));
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_minio_mapping() {
        let config =
            AdapterConfig::from_url("minio://ak:sk@localhost:9000/media?useSSL=false").unwrap();
        match config {
            AdapterConfig::Minio(c) => {
                assert_eq!(c.end_point, "localhost");
                assert_eq!(c.port, Some(9000));
                assert!(!c.use_ssl);
                assert_eq!(c.bucket_name.as_deref(), Some("media"));
            }
            other => panic!("unexpected config: {other:?}"),
        }
        assert!(AdapterConfig::from_url("minio://ak:sk@localhost/media?useSSL=perhaps").is_err());
    }

    #[test]
    fn test_unknown_provider_lists_known_keys() {
        let err = AdapterConfig::from_url("ftp://host").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'ftp'"), "{msg}");
        assert!(msg.contains("azure, b2, gcs, local, minio, r2, s3"), "{msg}");
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(AdapterConfig::from_url("local://").unwrap().validate().is_err());
        assert!(AdapterConfig::from_url("b2://keyid@bucket").unwrap().validate().is_err());
        assert!(AdapterConfig::from_url("s3://only-key@bucket").unwrap().validate().is_err());
        assert!(AdapterConfig::from_url("s3://bucket").unwrap().validate().is_ok());
        assert!(AdapterConfig::from_url("gcs").unwrap().validate().is_ok());
    }
}
