//! Remote command execution over ssh.
//!
//! [`SshExecutor`] shells out to the system ssh client in batch mode: key-file
//! authentication only, never an interactive prompt. Cancellation kills the
//! local client, which hangs up the remote session.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::errors::RemoteError;

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Runs one command on a remote host and returns its stdout.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn output(
        &self,
        cancel: &CancellationToken,
        host: &str,
        command: &str,
    ) -> Result<Vec<u8>, RemoteError>;
}

/// [`RemoteExecutor`] backed by the `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    program: String,
    user: String,
    key_path: PathBuf,
    default_port: u16,
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn new(user: impl Into<String>, key_path: impl AsRef<Path>) -> Self {
        Self {
            program: "ssh".to_string(),
            user: user.into(),
            key_path: key_path.as_ref().to_path_buf(),
            default_port: 22,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn build_command(&self, host: &str, port: u16, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(&self.key_path)
            .arg("-p")
            .arg(port.to_string())
            .arg("-l")
            .arg(&self.user)
            .args(["-o", "BatchMode=yes"])
            .args(["-o", "PasswordAuthentication=no"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg(host)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn output(
        &self,
        cancel: &CancellationToken,
        host: &str,
        command: &str,
    ) -> Result<Vec<u8>, RemoteError> {
        let (hostname, port) = split_host_port(host, self.default_port);
        let target = format!("{}:{}", hostname, port);
        tracing::debug!(command, user = %self.user, host = %target, "running remote command");

        let child = self
            .build_command(hostname, port, command)
            .spawn()
            .map_err(RemoteError::Spawn)?;

        // Dropping the child on cancellation kills the client (kill_on_drop).
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(host = %target, "remote command cancelled");
                return Err(RemoteError::Cancelled { host: target });
            }
            result = child.wait_with_output() => result.map_err(RemoteError::Spawn)?,
        };

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(
            &target,
            &self.user,
            command,
            output.status.code().unwrap_or(-1),
            stderr,
        ))
    }
}

/// Split `host[:port]` (or `[v6addr]:port`) into hostname and port.
///
/// A bare IPv6 address without brackets is taken as a hostname.
pub fn split_host_port(host: &str, default_port: u16) -> (&str, u16) {
    if let Some(rest) = host.strip_prefix('[')
        && let Some((addr, tail)) = rest.split_once(']')
    {
        let port = tail
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_port);
        return (addr, port);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => match port.parse() {
            Ok(port) => (name, port),
            Err(_) => (host, default_port),
        },
        _ => (host, default_port),
    }
}

/// Map a failed ssh invocation to the error taxonomy.
///
/// Exit 255 is the client's own failure: either the key was rejected or the
/// host could not be reached. Anything else is the remote command's status.
pub fn classify_failure(
    host: &str,
    user: &str,
    command: &str,
    exit_code: i32,
    stderr: String,
) -> RemoteError {
    if exit_code != SSH_CLIENT_FAILURE {
        return RemoteError::Command {
            host: host.to_string(),
            command: command.to_string(),
            exit_code,
            stderr,
        };
    }
    let lowered = stderr.to_lowercase();
    if lowered.contains("permission denied")
        || lowered.contains("too many authentication failures")
        || lowered.contains("no supported authentication methods")
    {
        RemoteError::Auth {
            user: user.to_string(),
            host: host.to_string(),
            message: stderr,
        }
    } else {
        RemoteError::Dial {
            host: host.to_string(),
            message: stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_host_uses_default_port() {
        assert_eq!(split_host_port("web1.example.com", 22), ("web1.example.com", 22));
    }

    #[test]
    fn test_split_host_with_port() {
        assert_eq!(split_host_port("web1:2222", 22), ("web1", 2222));
    }

    #[test]
    fn test_split_bad_port_keeps_whole_host() {
        assert_eq!(split_host_port("web1:ssh", 22), ("web1:ssh", 22));
    }

    #[test]
    fn test_split_bracketed_ipv6() {
        assert_eq!(split_host_port("[::1]:2200", 22), ("::1", 2200));
        assert_eq!(split_host_port("[fe80::1]", 22), ("fe80::1", 22));
    }

    #[test]
    fn test_split_bare_ipv6_is_hostname() {
        assert_eq!(split_host_port("fe80::1", 22), ("fe80::1", 22));
    }

    #[test]
    fn test_classify_command_failure() {
        let err = classify_failure("h:22", "deploy", "false", 1, "boom".to_string());
        match err {
            RemoteError::Command {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "boom");
            }
            other => panic!("Expected Command, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_auth_failure() {
        let err = classify_failure(
            "h:22",
            "deploy",
            "true",
            255,
            "deploy@h: Permission denied (publickey).".to_string(),
        );
        assert!(matches!(err, RemoteError::Auth { .. }));
    }

    #[test]
    fn test_classify_dial_failure() {
        let err = classify_failure(
            "h:22",
            "deploy",
            "true",
            255,
            "ssh: connect to host h port 22: Connection refused".to_string(),
        );
        assert!(matches!(err, RemoteError::Dial { .. }));
    }

    #[cfg(unix)]
    mod fake_client {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable script standing in for the ssh client.
        fn fake_ssh(dir: &tempfile::TempDir, body: &str) -> String {
            let path = dir.path().join("fake-ssh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        }

        #[tokio::test]
        async fn test_output_returns_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let exec = SshExecutor::new("deploy", "/dev/null")
                .with_program(fake_ssh(&dir, "echo abc123"));
            let out = exec
                .output(&CancellationToken::new(), "web1", "git rev-parse HEAD")
                .await
                .unwrap();
            assert_eq!(String::from_utf8_lossy(&out).trim(), "abc123");
        }

        #[tokio::test]
        async fn test_output_passes_port_and_command() {
            let dir = tempfile::tempdir().unwrap();
            let exec = SshExecutor::new("deploy", "/dev/null")
                .with_program(fake_ssh(&dir, "echo \"$@\""));
            let out = exec
                .output(&CancellationToken::new(), "web1:2222", "uptime")
                .await
                .unwrap();
            let args = String::from_utf8_lossy(&out);
            assert!(args.contains("-p 2222"));
            assert!(args.contains("-l deploy"));
            assert!(args.contains("BatchMode=yes"));
            assert!(args.trim_end().ends_with("web1 -- uptime"));
        }

        #[tokio::test]
        async fn test_output_maps_auth_failure() {
            let dir = tempfile::tempdir().unwrap();
            let exec = SshExecutor::new("deploy", "/dev/null").with_program(fake_ssh(
                &dir,
                "echo 'Permission denied (publickey).' >&2; exit 255",
            ));
            let err = exec
                .output(&CancellationToken::new(), "web1", "true")
                .await
                .unwrap_err();
            assert!(matches!(err, RemoteError::Auth { .. }));
        }

        #[tokio::test]
        async fn test_output_maps_command_failure_with_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let exec = SshExecutor::new("deploy", "/dev/null")
                .with_program(fake_ssh(&dir, "echo 'fatal: bad repo' >&2; exit 128"));
            let err = exec
                .output(&CancellationToken::new(), "web1", "git rev-parse HEAD")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("fatal: bad repo"));
        }

        #[tokio::test]
        async fn test_cancel_returns_promptly() {
            let dir = tempfile::tempdir().unwrap();
            let exec = SshExecutor::new("deploy", "/dev/null")
                .with_program(fake_ssh(&dir, "sleep 30"));
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                trigger.cancel();
            });

            let started = std::time::Instant::now();
            let err = exec.output(&cancel, "web1", "true").await.unwrap_err();
            assert!(matches!(err, RemoteError::Cancelled { .. }));
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }
}
