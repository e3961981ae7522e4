//! The ssh plugin as scripts see it
//!
//! An [`SshAdapter`] is created once per named configuration and offers three
//! operations: [`exec`](SshAdapter::exec), [`upload`](SshAdapter::upload) and
//! [`download`](SshAdapter::download). Each call is independent: it opens a
//! session, performs one action, closes the session and reports what it did.
//! In dry-run mode it only reports what it would have done.

use std::path::Path;
use std::sync::Arc;

use crate::auth::AuthOptions;
use crate::environment::Environment;
use crate::error::Result;
use crate::notify::{Notification, Tag};
use crate::request::{DownloadRequest, ExecRequest, UploadRequest};
use crate::transport::{ProgressFn, SshTransport, Transport, TransportSession};

/// Instance name used when none is given
pub const DEFAULT_NAME: &str = "ssh";

pub struct SshAdapter {
    name: String,
    auth_options: AuthOptions,
    username: Option<String>,
    environment: Arc<dyn Environment>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for SshAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshAdapter")
            .field("name", &self.name)
            .field("auth_options", &self.auth_options)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl SshAdapter {
    /// Create a plugin instance that connects with russh
    pub async fn create(environment: Arc<dyn Environment>, name: Option<&str>) -> Result<Self> {
        Self::with_transport(environment, Arc::new(SshTransport::default()), name).await
    }

    /// Create a plugin instance on top of a custom transport.
    ///
    /// Credentials are resolved here, once; no connection is made.
    pub async fn with_transport(
        environment: Arc<dyn Environment>,
        transport: Arc<dyn Transport>,
        name: Option<&str>,
    ) -> Result<Self> {
        let name = name.unwrap_or(DEFAULT_NAME).to_string();

        let mut config = environment.plugin_config(&name)?;
        environment
            .resolve_service_auth(&name, &mut config)
            .await?;

        let auth_options = AuthOptions::from_config(&config.auth);
        tracing::debug!(
            "Created ssh plugin '{name}' using {} auth",
            auth_options.method()
        );

        Ok(Self {
            name,
            auth_options,
            username: config.auth.username,
            environment,
            transport,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn auth_options(&self) -> &AuthOptions {
        &self.auth_options
    }

    /// Username configured for this instance, if any
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Run a command on a remote host.
    ///
    /// Returns the command's output, stdout and stderr combined, or `None`
    /// in dry-run mode.
    pub async fn exec(&self, request: ExecRequest) -> Result<Option<String>> {
        let params = request.validate()?;
        let user = self.login_user(params.host, params.user);

        if self.environment.is_dry_run() {
            self.dry_run(format!(
                "[{}] Would execute command '{}' as user {user} on host {}",
                self.name, params.cmd, params.host
            ))
            .await;
            return Ok(None);
        }

        let mut session = self.open(params.host, &user).await?;
        let result = session.execute(params.cmd).await;
        let output = release(session, result).await?;

        self.trace(format!(
            "[{}] Executed command '{}' as user {user} on host {}",
            self.name, params.cmd, params.host
        ))
        .await;
        Ok(Some(output))
    }

    /// Copy a local file to a remote host.
    ///
    /// `progress` is called for every chunk sent.
    pub async fn upload(
        &self,
        request: UploadRequest,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        let params = request.validate()?;
        let user = self.login_user(params.host, params.user);

        if self.environment.is_dry_run() {
            self.dry_run(format!(
                "[{}] Would upload local file {} as user {user} to host {} at {}",
                self.name, params.local, params.host, params.remote
            ))
            .await;
            return Ok(());
        }

        let mut session = self.open(params.host, &user).await?;
        let result = session
            .upload_file(Path::new(params.local), params.remote, progress)
            .await;
        release(session, result).await?;

        self.trace(format!(
            "[{}] Uploaded local file {} as user {user} to host {} at {}",
            self.name, params.local, params.host, params.remote
        ))
        .await;
        Ok(())
    }

    /// Copy a file from a remote host to this machine.
    ///
    /// `progress` is called for every chunk received.
    pub async fn download(
        &self,
        request: DownloadRequest,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        let params = request.validate()?;
        let user = self.login_user(params.host, params.user);

        if self.environment.is_dry_run() {
            self.dry_run(format!(
                "[{}] Would download remote file {} as user {user} from host {} to local file {}",
                self.name, params.remote, params.host, params.local
            ))
            .await;
            return Ok(());
        }

        let mut session = self.open(params.host, &user).await?;
        let result = session
            .download_file(params.remote, Path::new(params.local), progress)
            .await;
        release(session, result).await?;

        self.trace(format!(
            "[{}] Downloaded remote file {} as user {user} from host {} to local file {}",
            self.name, params.remote, params.host, params.local
        ))
        .await;
        Ok(())
    }

    fn login_user(&self, host: &str, requested: Option<&str>) -> String {
        self.transport.login_user(host, requested, self.username.as_deref())
    }

    async fn open(&self, host: &str, user: &str) -> Result<Box<dyn TransportSession>> {
        tracing::debug!("[{}] Opening session to {host}", self.name);
        Ok(self
            .transport
            .open_session(host, user, &self.auth_options)
            .await?)
    }

    async fn dry_run(&self, message: String) {
        self.environment
            .notify(Notification::new(message, &[Tag::Ssh, Tag::DryRun]))
            .await;
    }

    async fn trace(&self, message: String) {
        self.environment
            .notify(Notification::new(message, &[Tag::Ssh, Tag::Trace]))
            .await;
    }
}

/// Close `session` whatever `result` is, then hand `result` back.
///
/// A failed close after a successful action does not fail the action.
async fn release<T>(session: Box<dyn TransportSession>, result: eyre::Result<T>) -> Result<T> {
    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close SSH session: {e}");
    }
    Ok(result?)
}
