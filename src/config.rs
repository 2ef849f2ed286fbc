//! Daemon configuration
//!
//! Defaults, overridden by an optional TOML file (path in `TESTBED_CONFIG`),
//! overridden in turn by a handful of `TESTBED_*` environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `TESTBED_BIND` | `server.bind` |
//! | `TESTBED_CONTROL_PLANE_URL` | `control_plane.url` |
//! | `TESTBED_CONTROL_PLANE_USER` | `control_plane.username` |
//! | `TESTBED_CONTROL_PLANE_PASSWORD` | `control_plane.password` |
//! | `TESTBED_CONTROL_PLANE_TOKEN` | `control_plane.token` |
//! | `TESTBED_TOPOLOGY_DIR` | `topologies.dir` |
//! | `TESTBED_PLACEMENT_URL` | `placement.url` |
//! | `TESTBED_METRICS_URL` | `metrics.url` |

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::console::ConsoleSettings;
use crate::distribute::DistributionSettings;
use crate::provision::ProvisionSettings;
use crate::remote::RemoteSettings;
use crate::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "TESTBED_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST listener
    pub server: ServerConfig,
    /// Network-emulation control plane
    pub control_plane: ControlPlaneConfig,
    /// Topology definitions
    pub topologies: TopologyConfig,
    /// Provisioning and console bring-up
    pub provision: ProvisionConfig,
    /// Remote execution
    pub remote: RemoteConfig,
    /// Placement service; in-process engine when unset
    pub placement: ServiceConfig,
    /// Metrics service; in-process timers when unset
    pub metrics: ServiceConfig,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// `[control_plane]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Base URL
    pub url: String,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Pre-issued bearer token; skips login
    pub token: Option<String>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3080".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            token: None,
        }
    }
}

/// `[topologies]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Directory of `<name>.json` definitions
    pub dir: PathBuf,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("topologies"),
        }
    }
}

/// `[provision]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Guest subnet
    pub network: Ipv4Addr,
    /// Host number of the first guest address
    pub first_host: u32,
    /// Subnet prefix length
    pub prefix_len: u8,
    /// Guest interface
    pub interface: String,
    /// Host the consoles listen on
    pub console_host: String,
    /// Assumed guest boot time, seconds
    pub settle_delay_secs: u64,
    /// Console login user
    pub console_username: String,
    /// Console login password
    pub console_password: String,
    /// Console connect/prompt timeout, seconds
    pub console_timeout_secs: u64,
    /// Guest memory when a node requests none
    pub default_ram_mb: u32,
    /// Guest platform when a node requests none
    pub default_platform: String,
    /// Prefer control-plane images starting with this
    pub preferred_image_prefix: Option<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        let settings = ProvisionSettings::default();
        let console = ConsoleSettings::default();
        Self {
            network: settings.network,
            first_host: settings.first_host,
            prefix_len: settings.prefix_len,
            interface: settings.interface,
            console_host: settings.console_host,
            settle_delay_secs: settings.settle_delay.as_secs(),
            console_username: console.username,
            console_password: console.password,
            console_timeout_secs: console.io_timeout.as_secs(),
            default_ram_mb: settings.default_ram_mb,
            default_platform: settings.default_platform,
            preferred_image_prefix: settings.preferred_image_prefix,
        }
    }
}

impl ProvisionConfig {
    /// Provisioning engine settings.
    #[must_use]
    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            network: self.network,
            prefix_len: self.prefix_len,
            first_host: self.first_host,
            interface: self.interface.clone(),
            console_host: self.console_host.clone(),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            default_ram_mb: self.default_ram_mb,
            default_platform: self.default_platform.clone(),
            preferred_image_prefix: self.preferred_image_prefix.clone(),
        }
    }

    /// Console session settings.
    #[must_use]
    pub fn console_settings(&self) -> ConsoleSettings {
        ConsoleSettings {
            username: self.console_username.clone(),
            password: self.console_password.clone(),
            io_timeout: Duration::from_secs(self.console_timeout_secs),
            ..ConsoleSettings::default()
        }
    }
}

/// `[remote]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// ssh user
    pub user: String,
    /// ssh password; empty for key auth
    pub password: String,
    /// ssh port
    pub port: u16,
    /// Session setup timeout, seconds
    pub connect_timeout_secs: u64,
    /// Artifact directory on every host
    pub scratch_dir: String,
    /// Parallel launcher
    pub launcher: String,
    /// Workload binary
    pub workload: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let remote = RemoteSettings::default();
        let dist = DistributionSettings::default();
        Self {
            user: remote.user,
            password: remote.password,
            port: remote.port,
            connect_timeout_secs: remote.connect_timeout.as_secs(),
            scratch_dir: dist.scratch_dir,
            launcher: dist.launcher,
            workload: dist.workload,
        }
    }
}

impl RemoteConfig {
    /// ssh client settings.
    #[must_use]
    pub fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings {
            user: self.user.clone(),
            password: self.password.clone(),
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..RemoteSettings::default()
        }
    }

    /// Distribution layer settings.
    #[must_use]
    pub fn distribution_settings(&self) -> DistributionSettings {
        DistributionSettings {
            scratch_dir: self.scratch_dir.clone(),
            launcher: self.launcher.clone(),
            workload: self.workload.clone(),
        }
    }
}

/// `[placement]` / `[metrics]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service base URL
    pub url: Option<String>,
}

impl Config {
    /// Parse TOML; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] on malformed TOML or mistyped values.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::InvalidInput(format!("config: {e}")))
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// IO errors, or as [`from_toml`](Self::from_toml).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Defaults, then the file named by `TESTBED_CONFIG`, then environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// As [`from_file`](Self::from_file).
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => {
                tracing::info!(path = %Path::new(&path).display(), "loading config file");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `TESTBED_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TESTBED_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("TESTBED_CONTROL_PLANE_URL") {
            self.control_plane.url = v;
        }
        if let Some(v) = lookup("TESTBED_CONTROL_PLANE_USER") {
            self.control_plane.username = v;
        }
        if let Some(v) = lookup("TESTBED_CONTROL_PLANE_PASSWORD") {
            self.control_plane.password = v;
        }
        if let Some(v) = lookup("TESTBED_CONTROL_PLANE_TOKEN") {
            self.control_plane.token = Some(v);
        }
        if let Some(v) = lookup("TESTBED_TOPOLOGY_DIR") {
            self.topologies.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TESTBED_PLACEMENT_URL") {
            self.placement.url = Some(v);
        }
        if let Some(v) = lookup("TESTBED_METRICS_URL") {
            self.metrics.url = Some(v);
        }
    }
}
