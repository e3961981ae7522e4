//! SSH plugin for automation scripts
//!
//! This crate lets scripts run commands on remote hosts and copy files to
//! and from them. It includes:
//!
//! - [`SshAdapter`], one instance per named configuration, with `exec`,
//!   `upload` and `download`
//! - Credential resolution: configured keys, in-memory key data or a password,
//!   falling back to the SSH agent and default keys when nothing is configured
//! - Dry-run mode, in which nothing is executed and every operation only
//!   reports what it would have done
//! - Progress callbacks for file transfers
//!
//! The SSH work itself is done by russh (commands) and russh-sftp (files).
//!
//! # Example
//!
//! ```ignore
//! let env = Arc::new(LocalEnvironment::from_default_config(false)?);
//! let ssh = SshAdapter::create(env, None).await?;
//!
//! let uname = ssh
//!     .exec(ExecRequest::builder().host("web1").cmd("uname -a").build())
//!     .await?;
//!
//! let mut progress = |p: TransferProgress<'_>| {
//!     print!("\r{}: {}/{}", p.file_name, p.transferred, p.total);
//! };
//! ssh.upload(
//!     UploadRequest::builder().host("web1").local("app.tar.gz").remote("/srv/app.tar.gz").build(),
//!     Some(&mut progress),
//! )
//! .await?;
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for standalone logging to the terminal.
///
/// Output goes to stderr, filtered by the `RUST_LOG` environment variable
/// (default `info`). Applications with their own `log` or `tracing` setup
/// should not call this: the `log` feature of `tracing` already forwards
/// this crate's events to a `log` logger when no subscriber is installed.
///
/// ```ignore
/// // RUST_LOG=ssh_plugin=debug shows connection and authentication steps
/// ssh_plugin::init_tracing();
/// ```
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

pub mod adapter;
pub mod auth;
pub mod config;
pub mod environment;
pub mod error;
pub mod notify;
pub mod request;
pub mod transport;

pub use adapter::{SshAdapter, DEFAULT_NAME};
pub use auth::{AuthOptions, KeyAuth};
pub use config::{AuthConfig, ConfigFile, PluginConfig};
pub use environment::{ConfigCredentials, CredentialResolver, Environment, LocalEnvironment};
pub use error::PluginError;
pub use notify::{MemoryNotifier, Notification, Notifier, Tag, TracingNotifier};
pub use request::{DownloadRequest, ExecRequest, UploadRequest};
pub use transport::{ProgressFn, SshTransport, TransferProgress, Transport, TransportSession};
