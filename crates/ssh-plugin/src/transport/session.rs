// Live transport on top of russh. Every session is a fresh connection that
// lives for exactly one command or file transfer, nothing is pooled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use russh_config::parse_home;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::host::HostConfig;
use super::{ProgressFn, TransferProgress, Transport, TransportSession};
use crate::auth::{AuthOptions, KeyAuth};

/// Size of the chunks files are transferred in, and reported to progress callbacks
const CHUNK_SIZE: usize = 32 * 1024;

/// SSH client handler for russh
pub struct Client;

impl russh::client::Handler for Client {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not verified
        Ok(true)
    }
}

/// Opens real SSH connections
#[derive(Clone)]
pub struct SshTransport {
    config: Arc<russh::client::Config>,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(russh::client::Config::default())
    }
}

impl SshTransport {
    pub fn new(config: russh::client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn connect(&self, host: &HostConfig) -> Result<Handle<Client>> {
        if host.uses_proxy() {
            tracing::debug!(
                "Using proxy for connection to {} (proxy_command: {:?}, proxy_jump: {:?})",
                host.alias,
                host.proxy_command,
                host.proxy_jump
            );

            match parse_home(&host.alias) {
                Ok(parsed) => {
                    let stream = proxy_config(host, parsed).stream().await?;
                    return Ok(
                        russh::client::connect_stream(self.config.clone(), stream, Client).await?,
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to create proxy stream: {e}, connecting directly");
                }
            }
        }

        let address = host.address();
        tracing::debug!("Connecting directly to: {address}");
        Ok(russh::client::connect(self.config.clone(), address.as_str(), Client).await?)
    }
}

/// The ssh config entry a proxy stream is opened from. A port given in the
/// host string replaces the configured one, so `%p` and direct dials use it.
fn proxy_config(host: &HostConfig, mut parsed: russh_config::Config) -> russh_config::Config {
    parsed.port = host.port;
    parsed
}

#[async_trait]
impl Transport for SshTransport {
    /// Like the default, with the `User` from ~/.ssh/config before the local user
    fn login_user(&self, host: &str, requested: Option<&str>, configured: Option<&str>) -> String {
        let (host_user, _, _) = HostConfig::parse_host_string(host);
        requested
            .map(str::to_string)
            .or(host_user)
            .or_else(|| configured.map(str::to_string))
            .or_else(|| HostConfig::resolve(host).username)
            .unwrap_or_else(whoami::username)
    }

    async fn open_session(
        &self,
        host: &str,
        user: &str,
        auth: &AuthOptions,
    ) -> Result<Box<dyn TransportSession>> {
        let host_config = HostConfig::resolve(host);
        let handle = self.connect(&host_config).await?;
        let mut session = SshSession {
            handle,
            host: host_config,
        };

        if let Err(e) = session.authenticate(user, auth).await {
            let _ = session.disconnect().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }
}

/// One authenticated connection
pub struct SshSession {
    handle: Handle<Client>,
    host: HostConfig,
}

impl SshSession {
    async fn authenticate(&mut self, username: &str, auth: &AuthOptions) -> Result<()> {
        tracing::debug!(
            "Authenticating {username}@{} using {} auth",
            self.host.hostname,
            auth.method()
        );

        match auth {
            AuthOptions::Password(password) => self.password_auth(username, password).await,
            AuthOptions::Keys(keys) => {
                if self.configured_keys_auth(username, keys).await {
                    return Ok(());
                }
                if keys.keys_only {
                    return Err(eyre::eyre!(
                        "Public key authentication failed for {username}@{}: no configured key was accepted",
                        self.host.hostname
                    ));
                }
                self.ambient_auth(username).await
            }
            AuthOptions::Ambient => self.ambient_auth(username).await,
        }
    }

    async fn password_auth(&mut self, username: &str, password: &str) -> Result<()> {
        let auth_res = self.handle.authenticate_password(username, password).await?;

        if !matches!(auth_res, russh::client::AuthResult::Success) {
            return Err(eyre::eyre!(
                "Password authentication failed for {username}@{}",
                self.host.hostname
            ));
        }

        tracing::info!("Authenticated {username}@{} with password", self.host.hostname);
        Ok(())
    }

    async fn try_publickey_auth(
        &mut self,
        username: &str,
        key_pair: russh::keys::PrivateKey,
    ) -> Result<bool> {
        // Ask for the best RSA hash so both SHA-2 and legacy SHA-1 servers work
        let best_hash = self.handle.best_supported_rsa_hash().await?.flatten();
        let key_with_alg = russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), best_hash);

        let auth_res = self
            .handle
            .authenticate_publickey(username, key_with_alg)
            .await?;
        Ok(matches!(auth_res, russh::client::AuthResult::Success))
    }

    async fn key_file_auth(&mut self, username: &str, key_path: &Path) -> bool {
        let key_pair = match russh::keys::load_secret_key(key_path, None) {
            Ok(kp) => kp,
            Err(e) => {
                tracing::warn!("Failed to load key {}: {e}", key_path.display());
                return false;
            }
        };

        match self.try_publickey_auth(username, key_pair).await {
            Ok(true) => {
                tracing::info!("Authenticated with {}", key_path.display());
                true
            }
            Ok(false) => {
                tracing::debug!("Server rejected key {}", key_path.display());
                false
            }
            Err(e) => {
                tracing::debug!("Error authenticating with {}: {e}", key_path.display());
                false
            }
        }
    }

    /// Try the configured key files, then the in-memory keys
    async fn configured_keys_auth(&mut self, username: &str, keys: &KeyAuth) -> bool {
        for key_path in &keys.keys {
            if self.key_file_auth(username, key_path).await {
                return true;
            }
        }

        for (i, data) in keys.key_data.iter().enumerate() {
            let key_pair = match russh::keys::decode_secret_key(data, None) {
                Ok(kp) => kp,
                Err(e) => {
                    tracing::warn!("Failed to decode configured key #{}: {e}", i + 1);
                    continue;
                }
            };

            match self.try_publickey_auth(username, key_pair).await {
                Ok(true) => {
                    tracing::info!("Authenticated with configured key #{}", i + 1);
                    return true;
                }
                Ok(false) => tracing::debug!("Server rejected configured key #{}", i + 1),
                Err(e) => tracing::debug!("Error trying configured key #{}: {e}", i + 1),
            }
        }

        false
    }

    async fn agent_auth(&mut self, username: &str) -> bool {
        let mut agent = match russh::keys::agent::client::AgentClient::connect_env().await {
            Ok(agent) => agent,
            Err(e) => {
                tracing::debug!("Cannot connect to SSH agent: {e}");
                return false;
            }
        };

        let keys = match agent.request_identities().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::debug!("Failed to request identities from SSH agent: {e}");
                return false;
            }
        };

        tracing::debug!("SSH agent has {} keys available", keys.len());
        for (i, key) in keys.iter().enumerate() {
            match self
                .handle
                .authenticate_publickey_with(username, key.clone(), None, &mut agent)
                .await
            {
                Ok(russh::client::AuthResult::Success) => {
                    tracing::info!("Authenticated with SSH agent key #{}", i + 1);
                    return true;
                }
                Ok(_) => tracing::debug!("SSH agent key #{} rejected by server", i + 1),
                Err(e) => tracing::debug!("Error trying SSH agent key #{}: {e:?}", i + 1),
            }
        }

        false
    }

    /// OpenSSH default identities, in the order the ssh command tries them
    fn default_ssh_keys() -> Vec<PathBuf> {
        let Some(home) = dirs::home_dir() else {
            return vec![];
        };

        let ssh_dir = home.join(".ssh");
        [
            "id_rsa",
            "id_ecdsa",
            "id_ecdsa_sk",
            "id_ed25519",
            "id_ed25519_sk",
            "id_xmss",
            "id_dsa",
        ]
        .into_iter()
        .map(|name| ssh_dir.join(name))
        .filter(|path| path.exists())
        .collect()
    }

    /// Nothing configured: agent, then ssh config identities, then default keys
    async fn ambient_auth(&mut self, username: &str) -> Result<()> {
        if self.agent_auth(username).await {
            return Ok(());
        }

        let identity_files = self.host.identity_files.clone();
        for identity_file in &identity_files {
            if self.key_file_auth(username, identity_file).await {
                return Ok(());
            }
        }

        for key_path in Self::default_ssh_keys() {
            if identity_files.contains(&key_path) {
                continue;
            }
            if self.key_file_auth(username, &key_path).await {
                return Ok(());
            }
        }

        Err(eyre::eyre!(
            "All SSH authentication methods exhausted for {username}@{}",
            self.host.hostname
        ))
    }

    async fn open_sftp(&self) -> Result<SftpSession> {
        let channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        Ok(SftpSession::new(channel.into_stream()).await?)
    }

    async fn disconnect(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TransportSession for SshSession {
    async fn execute(&mut self, cmd: &str) -> Result<String> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, cmd).await?;

        // stdout and stderr end up in one buffer, in the order they arrive
        let mut output = Vec::new();
        let mut exit_code = None;
        let mut got_eof = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => output.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                    if got_eof {
                        break;
                    }
                }
                ChannelMsg::Eof => {
                    got_eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let _ = channel.close().await;

        if let Some(code) = exit_code.filter(|code| *code != 0) {
            tracing::debug!("Command on {} exited with status {code}", self.host.hostname);
        }

        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn upload_file(
        &mut self,
        local: &Path,
        remote: &str,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        let mut local_file = tokio::fs::File::open(local)
            .await
            .map_err(|e| eyre::eyre!("Failed to open {}: {e}", local.display()))?;
        let total = local_file.metadata().await?.len();
        let file_name = local.display().to_string();

        let sftp = self.open_sftp().await?;
        let mut remote_file = sftp
            .open_with_flags(
                remote,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = local_file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            remote_file.write_all(&buffer[..n]).await?;
            sent += n as u64;

            if let Some(callback) = progress.as_deref_mut() {
                callback(TransferProgress {
                    chunk: &buffer[..n],
                    file_name: &file_name,
                    transferred: sent,
                    total,
                });
            }
        }

        remote_file.flush().await?;
        remote_file.shutdown().await?;
        let _ = sftp.close().await;

        tracing::debug!("Uploaded {sent} bytes to {}:{remote}", self.host.hostname);
        Ok(())
    }

    async fn download_file(
        &mut self,
        remote: &str,
        local: &Path,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        let sftp = self.open_sftp().await?;
        let total = sftp.metadata(remote).await?.size.unwrap_or(0);
        let mut remote_file = sftp.open_with_flags(remote, OpenFlags::READ).await?;

        let mut local_file = tokio::fs::File::create(local)
            .await
            .map_err(|e| eyre::eyre!("Failed to create {}: {e}", local.display()))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;
        loop {
            let n = remote_file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            local_file.write_all(&buffer[..n]).await?;
            received += n as u64;

            if let Some(callback) = progress.as_deref_mut() {
                callback(TransferProgress {
                    chunk: &buffer[..n],
                    file_name: remote,
                    transferred: received,
                    total,
                });
            }
        }

        local_file.flush().await?;
        let _ = sftp.close().await;

        tracing::debug!(
            "Downloaded {received} bytes from {}:{remote}",
            self.host.hostname
        );
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys_exist() {
        for key in SshSession::default_ssh_keys() {
            assert!(key.exists(), "{} should exist", key.display());
            assert!(key.starts_with(dirs::home_dir().unwrap().join(".ssh")));
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_an_error() {
        // Port 1 on loopback is never an sshd
        let transport = SshTransport::default();
        let result = transport
            .open_session("127.0.0.1:1", "nobody", &AuthOptions::Ambient)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_login_user_precedence() {
        let transport = SshTransport::default();
        assert_eq!(
            transport.login_user("ops@db", Some("root"), Some("deploy")),
            "root"
        );
        assert_eq!(transport.login_user("ops@db", None, Some("deploy")), "ops");
        assert_eq!(transport.login_user("db", None, Some("deploy")), "deploy");
    }

    #[test]
    fn test_proxy_config_uses_requested_port() {
        let parsed = russh_config::parse(
            "Host db\n  HostName db1.internal\n  Port 2022\n  ProxyCommand nc %h %p\n",
            "db",
        )
        .unwrap();

        let host = HostConfig::from_ssh_config("db:2200", Some(parsed.clone()));
        let proxied = proxy_config(&host, parsed);
        assert_eq!(proxied.port, 2200);
        assert_eq!(proxied.host_name, "db1.internal");
        assert_eq!(proxied.proxy_command.as_deref(), Some("nc %h %p"));
    }

    #[test]
    fn test_proxy_config_keeps_configured_port() {
        let parsed = russh_config::parse(
            "Host db\n  Port 2022\n  ProxyJump bastion\n",
            "db",
        )
        .unwrap();

        let host = HostConfig::from_ssh_config("db", Some(parsed.clone()));
        assert_eq!(proxy_config(&host, parsed).port, 2022);
    }
}
