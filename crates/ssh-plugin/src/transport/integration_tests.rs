//! SSH transport integration tests
//!
//! These tests need a reachable sshd with the sftp subsystem enabled.
//! They are marked #[ignore] and must be run explicitly:
//!
//! ```bash
//! cargo test -p ssh-plugin -- --ignored --test-threads=1
//! ```
//!
//! Environment variables:
//! - SSH_TEST_HOST: Target host (default: localhost)
//! - SSH_TEST_PORT: Target port (default: 2222)
//! - SSH_TEST_USER: SSH username (default: testuser)
//! - SSH_TEST_PASSWORD: Password of that user (default: testpassword)
//! - SSH_TEST_KEYS_DIR: Directory holding an `id_ed25519` accepted by the server

use std::path::PathBuf;

use tempfile::TempDir;

use super::{SshTransport, TransferProgress, Transport, TransportSession};
use crate::auth::{AuthOptions, KeyAuth};

fn test_host() -> String {
    std::env::var("SSH_TEST_HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn test_port() -> u16 {
    std::env::var("SSH_TEST_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2222)
}

fn test_user() -> String {
    std::env::var("SSH_TEST_USER").unwrap_or_else(|_| "testuser".to_string())
}

fn test_password() -> String {
    std::env::var("SSH_TEST_PASSWORD").unwrap_or_else(|_| "testpassword".to_string())
}

fn test_keys_dir() -> PathBuf {
    std::env::var("SSH_TEST_KEYS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test-keys"))
}

fn host_string() -> String {
    format!("{}:{}", test_host(), test_port())
}

fn password_auth() -> AuthOptions {
    AuthOptions::Password(test_password())
}

async fn open(auth: &AuthOptions) -> eyre::Result<Box<dyn TransportSession>> {
    SshTransport::default()
        .open_session(&host_string(), &test_user(), auth)
        .await
}

#[tokio::test]
#[ignore]
async fn test_password_auth() {
    let session = open(&password_auth()).await;
    assert!(session.is_ok(), "password auth failed: {:?}", session.err());
    session.unwrap().close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_wrong_password_fails() {
    let result = open(&AuthOptions::Password("definitely-wrong".to_string())).await;
    assert!(result.is_err());
}

#[tokio::test]
#[ignore]
async fn test_key_file_auth() {
    let auth = AuthOptions::Keys(KeyAuth {
        keys: vec![test_keys_dir().join("id_ed25519")],
        key_data: vec![],
        keys_only: true,
    });

    let session = open(&auth).await;
    assert!(session.is_ok(), "key auth failed: {:?}", session.err());
    session.unwrap().close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_key_data_auth() {
    let key = std::fs::read_to_string(test_keys_dir().join("id_ed25519")).unwrap();
    let auth = AuthOptions::Keys(KeyAuth {
        keys: vec![],
        key_data: vec![key],
        keys_only: true,
    });

    let session = open(&auth).await;
    assert!(session.is_ok(), "key data auth failed: {:?}", session.err());
    session.unwrap().close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_keys_only_does_not_fall_back() {
    let auth = AuthOptions::Keys(KeyAuth {
        keys: vec![PathBuf::from("/nonexistent/id_ed25519")],
        key_data: vec![],
        keys_only: true,
    });

    let result = open(&auth).await;
    assert!(result.is_err());
}

#[tokio::test]
#[ignore]
async fn test_execute_combines_output() {
    let mut session = open(&password_auth()).await.unwrap();
    let output = session
        .execute("echo out; echo err 1>&2")
        .await
        .unwrap();
    session.close().await.unwrap();

    assert!(output.contains("out"));
    assert!(output.contains("err"));
}

#[tokio::test]
#[ignore]
async fn test_execute_failing_command_returns_output() {
    let mut session = open(&password_auth()).await.unwrap();
    let output = session
        .execute("ls /definitely/not/here")
        .await
        .unwrap();
    session.close().await.unwrap();

    assert!(!output.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_upload_then_download() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("payload.bin");
    let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&local, &content).unwrap();

    let remote = format!("/tmp/ssh-plugin-test-{}.bin", std::process::id());

    let mut uploads = Vec::new();
    let mut on_upload = |p: TransferProgress<'_>| uploads.push((p.chunk.len(), p.transferred, p.total));
    let mut session = open(&password_auth()).await.unwrap();
    session
        .upload_file(&local, &remote, Some(&mut on_upload))
        .await
        .unwrap();
    session.close().await.unwrap();

    assert!(!uploads.is_empty());
    assert_eq!(uploads.last().unwrap().1, content.len() as u64);
    assert!(uploads.iter().all(|(_, _, total)| *total == content.len() as u64));

    let target = dir.path().join("back.bin");
    let mut downloads = Vec::new();
    let mut on_download = |p: TransferProgress<'_>| downloads.push(p.transferred);
    let mut session = open(&password_auth()).await.unwrap();
    session
        .download_file(&remote, &target, Some(&mut on_download))
        .await
        .unwrap();
    let _ = session.execute(&format!("rm -f {remote}")).await;
    session.close().await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), content);
    assert_eq!(*downloads.last().unwrap(), content.len() as u64);
    assert!(downloads.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
#[ignore]
async fn test_upload_missing_local_file() {
    let mut session = open(&password_auth()).await.unwrap();
    let result = session
        .upload_file(
            std::path::Path::new("/nonexistent/file"),
            "/tmp/never-written",
            None,
        )
        .await;
    session.close().await.unwrap();

    assert!(result.is_err());
}
