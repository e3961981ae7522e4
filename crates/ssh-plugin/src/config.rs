//! Plugin configuration
//!
//! Configuration is keyed by plugin instance name, so several differently
//! authenticated instances can live side by side:
//!
//! ```yaml
//! plugins:
//!   ssh:
//!     auth:
//!       username: deploy
//!       keys: ["~/.ssh/deploy_ed25519"]
//!   ssh_legacy:
//!     auth:
//!       username: admin
//!       password: hunter2
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, Result};

/// Credential section of a plugin's configuration.
///
/// Every field is optional. Presence matters more than content: a `keys`
/// entry selects key-based authentication even when the list is empty.
#[derive(Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub keys: Option<Vec<PathBuf>>,
    pub key_data: Option<Vec<String>>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keys", &self.keys)
            .field(
                "key_data",
                &self.key_data.as_ref().map(|d| format!("<{} redacted>", d.len())),
            )
            .finish()
    }
}

/// Configuration of a single plugin instance
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub auth: AuthConfig,
}

/// A parsed configuration file holding the sections of every plugin instance
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub plugins: HashMap<String, PluginConfig>,
}

impl ConfigFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not an empty map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PluginError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        tracing::debug!("Loaded plugin configuration from {}", path.display());
        Self::from_yaml(&content)
    }

    /// The default location: `<config dir>/ssh-plugin/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ssh-plugin").join("config.yaml"))
    }

    /// Section for `name`, or an empty one if the instance is not configured.
    ///
    /// An unconfigured instance is valid: it authenticates with whatever the
    /// local SSH agent and ssh config provide.
    pub fn plugin(&self, name: &str) -> PluginConfig {
        match self.plugins.get(name) {
            Some(config) => config.clone(),
            None => {
                tracing::debug!("No configuration section for plugin '{name}', using defaults");
                PluginConfig::default()
            }
        }
    }
}
