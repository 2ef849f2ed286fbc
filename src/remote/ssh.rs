//! [`RemoteExec`] over the system `ssh` client.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{shell_quote, CommandOutput, RemoteExec, RemoteSession, RemoteSettings};
use crate::{Error, Result};

const SERVICE: &str = "remote host";

/// Spawns `ssh` (through `sshpass` when a password is configured).
#[derive(Debug, Clone, Default)]
pub struct SshRemote {
    settings: RemoteSettings,
}

impl SshRemote {
    /// Client using the given credentials.
    #[must_use]
    pub const fn new(settings: RemoteSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl RemoteExec for SshRemote {
    async fn open(&self, host: &str) -> Result<Box<dyn RemoteSession>> {
        let session = SshSession {
            host: host.to_string(),
            settings: self.settings.clone(),
        };
        // Login probe, bounded by the connect timeout.
        let probe = timeout(self.settings.connect_timeout, session.run("true", None))
            .await
            .map_err(|_| Error::Timeout(format!("ssh login to {host}")))??;
        if !probe.success() {
            return Err(Error::upstream(
                SERVICE,
                format!("ssh login to {host} failed: {}", probe.stderr.trim()),
            ));
        }
        tracing::debug!(host, "remote session open");
        Ok(Box::new(session))
    }
}

/// Session to one host. Each operation is one `ssh` invocation.
#[derive(Debug, Clone)]
pub struct SshSession {
    host: String,
    settings: RemoteSettings,
}

impl SshSession {
    /// Program and arguments that run `remote_command` on the host.
    #[must_use]
    pub fn command_line(&self, remote_command: &str) -> Vec<String> {
        let s = &self.settings;
        let mut args = Vec::new();
        if !s.password.is_empty() {
            // Password travels in the environment, not on the command line.
            args.extend([s.sshpass_program.clone(), "-e".to_string()]);
        }
        args.push(s.ssh_program.clone());
        let options = [
            "StrictHostKeyChecking=no".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "LogLevel=ERROR".to_string(),
            format!("ConnectTimeout={}", s.connect_timeout.as_secs().max(1)),
        ];
        for option in options {
            args.push("-o".to_string());
            args.push(option);
        }
        if !s.password.is_empty() {
            args.extend([
                "-o".to_string(),
                "PubkeyAuthentication=no".to_string(),
                "-o".to_string(),
                "PreferredAuthentications=password".to_string(),
            ]);
        }
        args.extend(["-p".to_string(), s.port.to_string()]);
        args.push(format!("{}@{}", s.user, self.host));
        args.push(remote_command.to_string());
        args
    }

    async fn run(&self, remote_command: &str, stdin: Option<&str>) -> Result<CommandOutput> {
        let argv = self.command_line(remote_command);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Other("empty ssh command line".to_string()))?;

        let mut command = Command::new(program);
        if !self.settings.password.is_empty() {
            command.env("SSHPASS", &self.settings.password);
        }
        let mut child = command
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(text.as_bytes()).await?;
            pipe.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn run_checked(&self, remote_command: &str, stdin: Option<&str>, what: &str) -> Result<()> {
        let output = self.run(remote_command, stdin).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::upstream(
                SERVICE,
                format!("{what} on {} failed: {}", self.host, output.stderr.trim()),
            ))
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn ensure_dir(&self, dir: &str) -> Result<()> {
        let dir = shell_quote(dir);
        self.run_checked(&format!("test -d {dir} || mkdir -p {dir}"), None, "mkdir")
            .await
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        self.run_checked(&format!("cat > {}", shell_quote(path)), Some(contents), "write file")
            .await
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.run(command, None).await
    }
}
