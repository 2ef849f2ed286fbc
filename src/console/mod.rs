//! Guest console configuration
//!
//! Brings up a freshly booted guest's network interface over its serial
//! console: log in with static credentials, set the interface up, assign an
//! address, enable the remote-access daemon, log out.
//!
//! This path is fail-soft. A [`ConsoleConfigurator`] error is reported for
//! the one node it concerns and never aborts a provisioning run; compare the
//! fail-fast contract of [`crate::control_plane::ControlPlane`].

mod telnet;

pub use telnet::{TelnetConsole, TelnetSession};

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Where a node's console listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsoleEndpoint {
    /// Console host
    pub host: String,
    /// Console TCP port
    pub port: u16,
}

impl ConsoleEndpoint {
    /// Endpoint at `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ConsoleEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An address to assign to a named guest interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddress {
    /// Guest interface, e.g. `ens3`
    pub interface: String,
    /// IPv4 address
    pub address: Ipv4Addr,
    /// Subnet prefix length
    pub prefix_len: u8,
}

impl InterfaceAddress {
    /// CIDR form, e.g. `10.0.0.1/24`.
    #[must_use]
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_len)
    }
}

/// Static login and pacing for console sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Limit on TCP connect and on each wait for login prompts
    pub io_timeout: Duration,
    /// Pause after waking the console before expecting a prompt
    pub wake_delay: Duration,
    /// Pause after each login step
    pub login_step_delay: Duration,
    /// Pause after each shell command
    pub command_delay: Duration,
    /// Daemon enabled for remote access
    pub remote_access_service: String,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: "0000".to_string(),
            io_timeout: Duration::from_secs(8),
            wake_delay: Duration::from_secs(3),
            login_step_delay: Duration::from_millis(300),
            command_delay: Duration::from_millis(200),
            remote_access_service: "sshd".to_string(),
        }
    }
}

/// Capability to configure one guest's network over its console.
#[async_trait]
pub trait ConsoleConfigurator: Send + Sync {
    /// Connect, authenticate, assign `address`, close.
    async fn configure(&self, endpoint: &ConsoleEndpoint, address: &InterfaceAddress) -> Result<()>;
}
