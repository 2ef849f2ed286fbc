//! Topology definition lookup by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Topology;
use crate::{Error, Result};

/// Where topology definitions come from.
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Fetch and normalize the named topology.
    ///
    /// Returns [`Error::NotFound`] when no such definition exists.
    async fn fetch(&self, name: &str) -> Result<Topology>;
}

/// Reads `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileTopologySource {
    dir: PathBuf,
}

impl FileTopologySource {
    /// Serve definitions from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Definition directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(Error::InvalidInput(format!("invalid topology name {name:?}")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

#[async_trait]
impl TopologySource for FileTopologySource {
    async fn fetch(&self, name: &str) -> Result<Topology> {
        let path = self.path_for(name)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("topology {name}")));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(topology = name, path = %path.display(), "loaded topology definition");
        Topology::from_json(name, &json)
    }
}

/// In-process definitions, keyed by topology name.
#[derive(Debug, Default)]
pub struct MemoryTopologySource {
    topologies: RwLock<HashMap<String, Topology>>,
}

impl MemoryTopologySource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a topology under its own name.
    pub fn insert(&self, topology: Topology) {
        self.topologies
            .write()
            .insert(topology.name().to_string(), topology);
    }
}

#[async_trait]
impl TopologySource for MemoryTopologySource {
    async fn fetch(&self, name: &str) -> Result<Topology> {
        self.topologies
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("topology {name}")))
    }
}
