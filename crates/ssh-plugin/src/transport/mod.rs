//! Transport seam between the plugin and an SSH client
//!
//! The plugin never speaks SSH itself. It asks a [`Transport`] for a session,
//! performs exactly one action on it, and closes it again. The live
//! implementation is [`SshTransport`], built on russh and russh-sftp; tests
//! substitute their own.

use std::path::Path;

use async_trait::async_trait;
use eyre::Result;

use crate::auth::AuthOptions;

mod host;
mod session;

#[cfg(test)]
mod integration_tests;

pub use self::host::HostConfig;
pub use self::session::SshTransport;

/// Progress of a running file transfer, handed to the caller once per chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress<'a> {
    /// The chunk just sent or received
    pub chunk: &'a [u8],
    /// Name of the file being transferred
    pub file_name: &'a str,
    /// Bytes transferred so far, including this chunk
    pub transferred: u64,
    /// Size of the whole file
    pub total: u64,
}

/// Callback invoked synchronously for every transferred chunk
pub type ProgressFn<'p> = dyn FnMut(TransferProgress<'_>) + Send + 'p;

#[async_trait]
pub trait Transport: Send + Sync {
    /// The account a session to `host` logs in as.
    ///
    /// `requested` comes from the call, `configured` from the plugin's
    /// configuration. A user written into the host string (`admin@db`) sits
    /// between the two. Without any of them the local user is used.
    fn login_user(&self, host: &str, requested: Option<&str>, configured: Option<&str>) -> String {
        let (host_user, _, _) = HostConfig::parse_host_string(host);
        requested
            .map(str::to_string)
            .or(host_user)
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(whoami::username)
    }

    /// Connect to `host` and authenticate as `user`
    async fn open_session(
        &self,
        host: &str,
        user: &str,
        auth: &AuthOptions,
    ) -> Result<Box<dyn TransportSession>>;
}

/// A connected, authenticated session. Used for one action, then closed.
#[async_trait]
pub trait TransportSession: Send {
    /// Run `cmd` and return everything it printed, stdout and stderr combined
    async fn execute(&mut self, cmd: &str) -> Result<String>;

    async fn upload_file(
        &mut self,
        local: &Path,
        remote: &str,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()>;

    async fn download_file(
        &mut self,
        remote: &str,
        local: &Path,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}
