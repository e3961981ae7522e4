// Turn the host string a script passes in into something we can connect to.
// ~/.ssh/config is honoured through russh-config, so aliases, ports and
// proxies set up for the ssh command work here too.

use std::path::PathBuf;

use russh_config::parse_home;

/// Connection settings for one host, after applying ~/.ssh/config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// What the script asked for, used to look up proxy settings again
    pub alias: String,
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub identity_files: Vec<PathBuf>,
    pub proxy_command: Option<String>,
    pub proxy_jump: Option<String>,
}

impl HostConfig {
    /// Split `user@host:port`, `user@host`, `host:port` or `host`.
    ///
    /// IPv6 addresses take a port only in brackets (`[::1]:22`). A bare
    /// address such as `fe80::22` is all host.
    pub(crate) fn parse_host_string(input: &str) -> (Option<String>, String, Option<u16>) {
        let (user, host_part) = match input.split_once('@') {
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, input),
        };

        if let Some((addr, rest)) = host_part
            .strip_prefix('[')
            .and_then(|bracketed| bracketed.split_once(']'))
        {
            if rest.is_empty() {
                return (user, addr.to_string(), None);
            }
            if let Some(Ok(port)) = rest.strip_prefix(':').map(str::parse::<u16>) {
                return (user, addr.to_string(), Some(port));
            }
            return (user, host_part.to_string(), None);
        }

        // A port is only split off if it parses
        if let Some((host, port)) = host_part.split_once(':') {
            if !port.contains(':') {
                if let Ok(port) = port.parse::<u16>() {
                    return (user, host.to_string(), Some(port));
                }
            }
        }

        (user, host_part.to_string(), None)
    }

    /// Resolve connection settings for `host` using ~/.ssh/config
    pub fn resolve(host: &str) -> Self {
        let (_, hostname, _) = Self::parse_host_string(host);

        let parsed = match parse_home(&hostname) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::debug!("No usable SSH config for {hostname}: {e}");
                None
            }
        };

        Self::from_ssh_config(host, parsed)
    }

    /// Merge the parsed host string with an ssh config entry.
    /// Values written in the host string win over the config file.
    pub(crate) fn from_ssh_config(input: &str, parsed: Option<russh_config::Config>) -> Self {
        let (input_user, hostname, input_port) = Self::parse_host_string(input);

        let Some(config) = parsed else {
            return HostConfig {
                alias: hostname.clone(),
                hostname,
                port: input_port.unwrap_or(22),
                username: input_user,
                identity_files: vec![],
                proxy_command: None,
                proxy_jump: None,
            };
        };

        let resolved_hostname = if config.host_name.is_empty() {
            hostname.clone()
        } else {
            config.host_name.clone()
        };

        let username = input_user.or_else(|| {
            if config.user.is_empty() {
                None
            } else {
                Some(config.user.clone())
            }
        });

        let identity_files = config
            .identity_file
            .as_deref()
            .and_then(Self::expand_identity_file)
            .filter(|path| path.exists())
            .into_iter()
            .collect();

        let resolved = HostConfig {
            alias: hostname,
            hostname: resolved_hostname,
            port: input_port.unwrap_or(config.port),
            username,
            identity_files,
            proxy_command: config.proxy_command.clone(),
            proxy_jump: config.proxy_jump.clone(),
        };

        tracing::debug!("Resolved SSH config for {input}: {resolved:?}");
        resolved
    }

    fn expand_identity_file(identity_file: &str) -> Option<PathBuf> {
        if identity_file.starts_with('/') {
            return Some(PathBuf::from(identity_file));
        }

        let home = dirs::home_dir()?;
        Some(match identity_file.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => home.join(".ssh").join(identity_file),
        })
    }

    pub fn uses_proxy(&self) -> bool {
        self.proxy_command.is_some() || self.proxy_jump.is_some()
    }

    pub fn address(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}
