/// Errors surfaced by the ssh plugin to its callers
#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    /// A required request field was not supplied. Raised before any I/O.
    #[error("No :{0} argument given")]
    MissingArgument(&'static str),

    #[error("Invalid plugin configuration: {0}")]
    Config(String),

    #[error("Failed to resolve credentials for {service}: {reason}")]
    Credentials { service: String, reason: String },

    /// Anything the SSH client reported, passed through as-is
    #[error(transparent)]
    Transport(#[from] eyre::Report),
}

impl From<serde_yaml::Error> for PluginError {
    fn from(e: serde_yaml::Error) -> Self {
        PluginError::Config(e.to_string())
    }
}

pub type Result<T, E = PluginError> = std::result::Result<T, E>;
