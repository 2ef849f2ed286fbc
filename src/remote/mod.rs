//! Remote execution client
//!
//! Authenticated sessions to provisioned guests supporting directory
//! creation, whole-file text writes and command execution with captured
//! output. Host-key verification is disabled: guests are freshly cloned on
//! every run and have no stable identity to pin.

mod ssh;

pub use ssh::{SshRemote, SshSession};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Captured result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Standard output, verbatim
    pub stdout: String,
    /// Standard error, verbatim
    pub stderr: String,
    /// Exit status, if the process exited normally
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Credentials and limits for remote sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Login user
    pub user: String,
    /// Login password; empty means key-based auth
    pub password: String,
    /// TCP port
    pub port: u16,
    /// Limit on establishing a session
    pub connect_timeout: Duration,
    /// ssh client binary
    pub ssh_program: String,
    /// Password helper binary
    pub sshpass_program: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            password: "0000".to_string(),
            port: 22,
            connect_timeout: Duration::from_secs(8),
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        }
    }
}

/// Opens sessions to hosts.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Authenticate against `host`.
    async fn open(&self, host: &str) -> Result<Box<dyn RemoteSession>>;
}

/// An authenticated session to one host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Host this session talks to.
    fn host(&self) -> &str;

    /// Create `dir` unless it already exists.
    async fn ensure_dir(&self, dir: &str) -> Result<()>;

    /// Replace the file at `path` with `contents`.
    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Run `command` through the remote shell. No timeout.
    async fn exec(&self, command: &str) -> Result<CommandOutput>;
}

/// Single-quote `s` for a POSIX shell.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
