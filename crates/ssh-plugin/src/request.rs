//! Parameters of the plugin operations
//!
//! Requests mirror the loosely-typed parameter maps a script hands over:
//! every field is optional at the type level and checked by `validate()`
//! before anything touches the network. They deserialize from JSON/YAML
//! maps and can be put together with the generated builders:
//!
//! ```ignore
//! let request = ExecRequest::builder().host("web1").cmd("uname -a").build();
//! ```

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{PluginError, Result};

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str> {
    value.as_deref().ok_or(PluginError::MissingArgument(name))
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct ExecRequest {
    #[builder(default, setter(strip_option, into))]
    pub host: Option<String>,

    /// Defaults to the configured username, then the local user
    #[builder(default, setter(strip_option, into))]
    pub user: Option<String>,

    #[builder(default, setter(strip_option, into))]
    pub cmd: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidExec<'a> {
    pub host: &'a str,
    pub user: Option<&'a str>,
    pub cmd: &'a str,
}

impl ExecRequest {
    pub fn validate(&self) -> Result<ValidExec<'_>> {
        Ok(ValidExec {
            host: required(&self.host, "host")?,
            user: self.user.as_deref(),
            cmd: required(&self.cmd, "cmd")?,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct UploadRequest {
    #[builder(default, setter(strip_option, into))]
    pub host: Option<String>,

    #[builder(default, setter(strip_option, into))]
    pub user: Option<String>,

    /// File to send
    #[builder(default, setter(strip_option, into))]
    pub local: Option<String>,

    /// Destination on the remote host, defaults to the local path
    #[builder(default, setter(strip_option, into))]
    pub remote: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidUpload<'a> {
    pub host: &'a str,
    pub user: Option<&'a str>,
    pub local: &'a str,
    pub remote: &'a str,
}

impl UploadRequest {
    pub fn validate(&self) -> Result<ValidUpload<'_>> {
        let host = required(&self.host, "host")?;
        let local = required(&self.local, "local")?;

        Ok(ValidUpload {
            host,
            user: self.user.as_deref(),
            local,
            remote: self.remote.as_deref().unwrap_or(local),
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct DownloadRequest {
    #[builder(default, setter(strip_option, into))]
    pub host: Option<String>,

    #[builder(default, setter(strip_option, into))]
    pub user: Option<String>,

    /// Destination on this machine, defaults to the remote path
    #[builder(default, setter(strip_option, into))]
    pub local: Option<String>,

    /// File to fetch
    #[builder(default, setter(strip_option, into))]
    pub remote: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidDownload<'a> {
    pub host: &'a str,
    pub user: Option<&'a str>,
    pub local: &'a str,
    pub remote: &'a str,
}

impl DownloadRequest {
    pub fn validate(&self) -> Result<ValidDownload<'_>> {
        let host = required(&self.host, "host")?;
        let remote = required(&self.remote, "remote")?;

        Ok(ValidDownload {
            host,
            user: self.user.as_deref(),
            local: self.local.as_deref().unwrap_or(remote),
            remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn missing(err: PluginError) -> &'static str {
        match err {
            PluginError::MissingArgument(name) => name,
            other => panic!("expected MissingArgument, got {other:?}"),
        }
    }

    #[test]
    fn test_exec_requires_host_and_cmd() {
        let no_host = ExecRequest::builder().cmd("ls").build();
        assert_eq!(missing(no_host.validate().unwrap_err()), "host");

        let no_cmd = ExecRequest::builder().host("web1").build();
        assert_eq!(missing(no_cmd.validate().unwrap_err()), "cmd");

        assert_eq!(missing(ExecRequest::default().validate().unwrap_err()), "host");
    }

    #[test]
    fn test_exec_valid() {
        let request = ExecRequest::builder()
            .host("web1")
            .user("deploy")
            .cmd("uname -a")
            .build();

        assert_eq!(
            request.validate().unwrap(),
            ValidExec {
                host: "web1",
                user: Some("deploy"),
                cmd: "uname -a",
            }
        );
    }

    #[test]
    fn test_empty_strings_count_as_given() {
        let request = ExecRequest::builder().host("").cmd("").build();
        let valid = request.validate().unwrap();
        assert_eq!(valid.host, "");
        assert_eq!(valid.cmd, "");
    }

    #[test]
    fn test_upload_remote_defaults_to_local() {
        let request = UploadRequest::builder()
            .host("web1")
            .local("/tmp/app.tar.gz")
            .build();

        let valid = request.validate().unwrap();
        assert_eq!(valid.local, "/tmp/app.tar.gz");
        assert_eq!(valid.remote, "/tmp/app.tar.gz");
        assert_eq!(valid.user, None);
    }

    #[test]
    fn test_upload_explicit_remote() {
        let request = UploadRequest::builder()
            .host("web1")
            .local("build/app.tar.gz")
            .remote("/srv/app.tar.gz")
            .build();

        assert_eq!(request.validate().unwrap().remote, "/srv/app.tar.gz");
    }

    #[test]
    fn test_upload_requires_host_and_local() {
        let no_local = UploadRequest::builder()
            .host("web1")
            .remote("/srv/x")
            .build();
        assert_eq!(missing(no_local.validate().unwrap_err()), "local");

        let no_host = UploadRequest::builder().local("x").build();
        assert_eq!(missing(no_host.validate().unwrap_err()), "host");
    }

    #[test]
    fn test_download_local_defaults_to_remote() {
        let request = DownloadRequest::builder()
            .host("web1")
            .remote("/var/log/syslog")
            .build();

        let valid = request.validate().unwrap();
        assert_eq!(valid.remote, "/var/log/syslog");
        assert_eq!(valid.local, "/var/log/syslog");
    }

    #[test]
    fn test_download_requires_host_and_remote() {
        let no_remote = DownloadRequest::builder().host("web1").local("x").build();
        assert_eq!(missing(no_remote.validate().unwrap_err()), "remote");

        let no_host = DownloadRequest::builder().remote("x").build();
        assert_eq!(missing(no_host.validate().unwrap_err()), "host");
    }

    #[test]
    fn test_requests_from_script_maps() {
        let exec: ExecRequest =
            serde_json::from_value(json!({ "host": "web1", "cmd": "uptime" })).unwrap();
        assert_eq!(exec.validate().unwrap().cmd, "uptime");

        let upload: UploadRequest = serde_json::from_value(json!({
            "host": "web1",
            "user": "deploy",
            "local": "a.txt",
        }))
        .unwrap();
        let valid = upload.validate().unwrap();
        assert_eq!(valid.user, Some("deploy"));
        assert_eq!(valid.remote, "a.txt");
    }

    #[test]
    fn test_missing_argument_message() {
        let err = DownloadRequest::builder()
            .host("web1")
            .build()
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "No :remote argument given");
    }
}
