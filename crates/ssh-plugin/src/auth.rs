use std::fmt;
use std::path::PathBuf;

use crate::config::AuthConfig;

/// Key material offered to the server
#[derive(Clone, PartialEq, Eq)]
pub struct KeyAuth {
    /// Private key files
    pub keys: Vec<PathBuf>,
    /// Private keys held in memory (OpenSSH/PEM text)
    pub key_data: Vec<String>,
    /// Never fall back to the agent or default keys
    pub keys_only: bool,
}

impl fmt::Debug for KeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAuth")
            .field("keys", &self.keys)
            .field("key_data", &format!("<{} redacted>", self.key_data.len()))
            .field("keys_only", &self.keys_only)
            .finish()
    }
}

/// Credentials used to authenticate every session opened by a plugin instance
#[derive(Clone, PartialEq, Eq)]
pub enum AuthOptions {
    Keys(KeyAuth),
    Password(String),
    /// Nothing configured: rely on the SSH agent, ssh config and default keys
    Ambient,
}

impl AuthOptions {
    /// Resolve auth options from a credential section.
    ///
    /// Key material wins over a password, a password wins over nothing.
    pub fn from_config(auth: &AuthConfig) -> Self {
        if auth.keys.is_some() || auth.key_data.is_some() {
            return AuthOptions::Keys(KeyAuth {
                keys: auth.keys.clone().unwrap_or_default(),
                key_data: auth.key_data.clone().unwrap_or_default(),
                keys_only: true,
            });
        }

        match &auth.password {
            Some(password) => AuthOptions::Password(password.clone()),
            None => AuthOptions::Ambient,
        }
    }

    pub fn is_ambient(&self) -> bool {
        matches!(self, AuthOptions::Ambient)
    }

    pub fn method(&self) -> &'static str {
        match self {
            AuthOptions::Keys(_) => "publickey",
            AuthOptions::Password(_) => "password",
            AuthOptions::Ambient => "ambient",
        }
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOptions::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            AuthOptions::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
            AuthOptions::Ambient => f.write_str("Ambient"),
        }
    }
}
