//! Adapter registry
//!
//! Maps a provider key to the code that builds its backend. Built-in backends
//! live in a compile-time table; other implementations (or replacements for
//! built-in ones) are registered at runtime and always take precedence.
//!
//! Two kinds of locator exist. A [`AdapterLocator::Constructor`] builds a
//! type implementing [`ConstructAdapter`]; a [`AdapterLocator::Factory`] is a
//! plain closure returning any hook object, which is handy for lightweight
//! stand-ins that do not warrant their own type.

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::adapter::{Adapter, AdapterHooks};
use crate::connection::{AdapterConfig, Provider, StorageConfig};
use crate::storage::{local::LocalAdapter, s3::S3Adapter};
use crate::{Error, Result};

pub type HookObject = Box<dyn AdapterHooks>;

/// Async constructor of a backend type.
pub type ConstructorFn = fn(AdapterConfig) -> BoxFuture<'static, Result<HookObject>>;

/// Synchronous factory closure.
pub type FactoryFn = Arc<dyn Fn(AdapterConfig) -> Result<HookObject> + Send + Sync>;

/// A backend type that can be built from its configuration.
#[async_trait]
pub trait ConstructAdapter: AdapterHooks + Sized + 'static {
    async fn connect(config: AdapterConfig) -> Result<Self>;
}

#[derive(Clone)]
pub enum AdapterLocator {
    Constructor(ConstructorFn),
    Factory(FactoryFn),
}

impl AdapterLocator {
    /// Locator for a type implementing [`ConstructAdapter`].
    pub fn constructor<A: ConstructAdapter>() -> Self {
        AdapterLocator::Constructor(construct::<A>)
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(AdapterConfig) -> Result<HookObject> + Send + Sync + 'static,
    {
        AdapterLocator::Factory(Arc::new(factory))
    }

    async fn instantiate(&self, config: AdapterConfig) -> Result<HookObject> {
        match self {
            AdapterLocator::Constructor(construct) => construct(config).await,
            AdapterLocator::Factory(factory) => factory(config),
        }
    }
}

impl fmt::Debug for AdapterLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterLocator::Constructor(_) => f.write_str("Constructor"),
            AdapterLocator::Factory(_) => f.write_str("Factory"),
        }
    }
}

fn construct<A: ConstructAdapter>(config: AdapterConfig) -> BoxFuture<'static, Result<HookObject>> {
    Box::pin(async move {
        let adapter = A::connect(config).await?;
        Ok(Box::new(adapter) as HookObject)
    })
}

/// Implementation name plus how to build it.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub locator: AdapterLocator,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>, locator: AdapterLocator) -> Self {
        Self {
            name: name.into(),
            locator,
        }
    }
}

/// Backends compiled into this crate.
fn builtin(provider: Provider) -> Option<RegistryEntry> {
    match provider {
        Provider::Local => Some(RegistryEntry::new(
            "LocalAdapter",
            AdapterLocator::constructor::<LocalAdapter>(),
        )),
        Provider::S3 | Provider::Minio | Provider::R2 => Some(RegistryEntry::new(
            "S3Adapter",
            AdapterLocator::constructor::<S3Adapter>(),
        )),
        Provider::Gcs | Provider::Azure | Provider::B2 => None,
    }
}

/// Provider key → backend implementation.
#[derive(Default)]
pub struct AdapterRegistry {
    plugins: DashMap<Provider, RegistryEntry>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`crate::Storage::new`].
    pub fn global() -> Arc<AdapterRegistry> {
        static GLOBAL: OnceLock<Arc<AdapterRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(AdapterRegistry::new())).clone()
    }

    /// Register (or replace) the implementation used for `provider`.
    pub fn register(&self, provider: Provider, entry: RegistryEntry) {
        tracing::debug!("Registering {} for provider '{}'", entry.name, provider);
        self.plugins.insert(provider, entry);
    }

    pub fn unregister(&self, provider: Provider) -> Option<RegistryEntry> {
        self.plugins.remove(&provider).map(|(_, entry)| entry)
    }

    /// Every provider key, sorted. Plugins can only replace a known key.
    pub fn known_keys(&self) -> Vec<String> {
        Provider::known_keys()
    }

    /// Find the implementation for `key`: runtime registrations first, then built-ins.
    pub fn resolve(&self, key: &str) -> Result<(Provider, RegistryEntry)> {
        let provider: Provider = key.parse()?;

        if let Some(entry) = self.plugins.get(&provider) {
            return Ok((provider, entry.value().clone()));
        }

        builtin(provider)
            .map(|entry| (provider, entry))
            .ok_or_else(|| {
                Error::Registry(format!(
                    "No implementation available for provider '{}'; register one with AdapterRegistry::register",
                    provider
                ))
            })
    }

    /// Resolve, parse and build an adapter.
    ///
    /// Only an unknown or unimplemented provider is an `Err`. A bad
    /// configuration or a backend that fails to build produces an adapter
    /// carrying a sticky configuration error instead.
    pub async fn build(&self, config: StorageConfig) -> Result<Adapter> {
        let key = config.provider_key();
        let (provider, entry) = self.resolve(&key)?;

        let (config, config_error) = match config.into_adapter_config(provider) {
            Ok(config) => {
                let error = config.validate().err().map(|e| e.to_string());
                (config, error)
            }
            Err(e) => (AdapterConfig::empty(provider), Some(e.to_string())),
        };

        if let Some(err) = &config_error {
            tracing::warn!("Invalid {} configuration: {}", provider, err);
            return Ok(Adapter::from_parts(config, config_error, None));
        }

        tracing::debug!("Building {} for provider '{}'", entry.name, provider);
        match entry.locator.instantiate(config.clone()).await {
            Ok(hooks) => Ok(Adapter::from_parts(config, None, Some(hooks))),
            Err(e) => {
                tracing::warn!("Failed to build {} for '{}': {}", entry.name, provider, e);
                Ok(Adapter::from_parts(config, Some(e.to_string()), None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_lists_sorted_keys() {
        let registry = AdapterRegistry::new();
        let err = registry.resolve("ftp").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown provider 'ftp', valid providers are: azure, b2, gcs, local, minio, r2, s3"
        );
        let from_url = AdapterConfig::from_url("ftp://host").unwrap_err();
        assert_eq!(from_url.to_string(), err.to_string());
    }

    #[test]
    fn test_builtin_and_missing_implementations() {
        let registry = AdapterRegistry::new();
        let (provider, entry) = registry.resolve("local").unwrap();
        assert_eq!(provider, Provider::Local);
        assert_eq!(entry.name, "LocalAdapter");

        let (_, entry) = registry.resolve("minio").unwrap();
        assert_eq!(entry.name, "S3Adapter");

        assert!(matches!(registry.resolve("gcs"), Err(Error::Registry(_))));
    }

    #[test]
    fn test_runtime_registration_takes_precedence() {
        let registry = AdapterRegistry::new();
        registry.register(
            Provider::Local,
            RegistryEntry::new(
                "RefusingLocal",
                AdapterLocator::factory(|_| Err(Error::config("refused"))),
            ),
        );
        let (_, entry) = registry.resolve("local").unwrap();
        assert_eq!(entry.name, "RefusingLocal");

        registry.unregister(Provider::Local);
        let (_, entry) = registry.resolve("local").unwrap();
        assert_eq!(entry.name, "LocalAdapter");
    }

    #[tokio::test]
    async fn test_build_failure_becomes_sticky_config_error() {
        let registry = AdapterRegistry::new();
        registry.register(
            Provider::Gcs,
            RegistryEntry::new(
                "BrokenGcs",
                AdapterLocator::factory(|_| Err(Error::config("key file not readable"))),
            ),
        );
        let adapter = registry.build("gcs://key.json@bucket".into()).await.unwrap();
        assert_eq!(adapter.config_error(), Some("key file not readable"));
        assert_eq!(adapter.selected_bucket().as_deref(), Some("bucket"));
    }
}
