//! The host environment a plugin instance runs in
//!
//! The environment owns everything the plugin does not: where configuration
//! comes from, how credentials are looked up, whether the run is a dry run,
//! and where notifications go.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use typed_builder::TypedBuilder;

use crate::config::{ConfigFile, PluginConfig};
use crate::error::{PluginError, Result};
use crate::notify::{Notification, Notifier, TracingNotifier};

#[async_trait]
pub trait Environment: Send + Sync {
    /// Configuration section for the plugin instance `name`
    fn plugin_config(&self, name: &str) -> Result<PluginConfig>;

    /// Fill in `config.auth` for the service `name`
    async fn resolve_service_auth(&self, name: &str, config: &mut PluginConfig) -> Result<()>;

    fn is_dry_run(&self) -> bool;

    /// Deliver a notification. Delivery problems are the environment's to handle.
    async fn notify(&self, notification: Notification);
}

/// Looks up credentials for a service, e.g. from a directory server
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, service: &str, config: &mut PluginConfig) -> Result<()>;
}

/// Uses the credentials written in the configuration file as they are,
/// apart from expanding `~` and environment variables in key paths.
pub struct ConfigCredentials;

#[async_trait]
impl CredentialResolver for ConfigCredentials {
    async fn resolve(&self, service: &str, config: &mut PluginConfig) -> Result<()> {
        let Some(keys) = config.auth.keys.as_mut() else {
            return Ok(());
        };

        for key in keys.iter_mut() {
            let raw = key.to_string_lossy().to_string();
            let expanded =
                shellexpand::full(&raw).map_err(|e| PluginError::Credentials {
                    service: service.to_string(),
                    reason: format!("cannot expand key path '{raw}': {e}"),
                })?;
            *key = PathBuf::from(expanded.as_ref());
        }

        tracing::debug!("Resolved {} key path(s) for {service}", keys.len());
        Ok(())
    }
}

/// An environment backed by a configuration file
#[derive(TypedBuilder)]
pub struct LocalEnvironment {
    #[builder(default)]
    config: ConfigFile,

    #[builder(default = false)]
    dry_run: bool,

    #[builder(default = Arc::new(ConfigCredentials) as Arc<dyn CredentialResolver>)]
    credentials: Arc<dyn CredentialResolver>,

    #[builder(default = Arc::new(TracingNotifier) as Arc<dyn Notifier>)]
    notifier: Arc<dyn Notifier>,
}

impl LocalEnvironment {
    /// Load the configuration file from its default location, if it exists
    pub fn from_default_config(dry_run: bool) -> Result<Self> {
        let config = match ConfigFile::default_path() {
            Some(path) if path.exists() => ConfigFile::load(path)?,
            _ => ConfigFile::default(),
        };

        Ok(Self::builder().config(config).dry_run(dry_run).build())
    }
}

#[async_trait]
impl Environment for LocalEnvironment {
    fn plugin_config(&self, name: &str) -> Result<PluginConfig> {
        Ok(self.config.plugin(name))
    }

    async fn resolve_service_auth(&self, name: &str, config: &mut PluginConfig) -> Result<()> {
        self.credentials.resolve(name, config).await
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!("Failed to deliver notification: {e}");
        }
    }
}
