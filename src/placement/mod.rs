//! Placement contract
//!
//! Maps parallel-process ranks onto hosts and renders the rankfile and
//! hostfile the launcher consumes. The pipeline only depends on the
//! request/response contract ([`Placement`]); [`LocalPlacement`] answers it
//! in-process and [`HttpPlacement`] forwards it to a placement service.
//!
//! ## Usage
//!
//! ```rust
//! use cluster_testbed::placement::{LocalPlacement, Placement, PlacementRequest};
//!
//! # async fn example() -> cluster_testbed::Result<()> {
//! let hosts = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
//! let request = PlacementRequest::new(hosts, "simple");
//! let response = LocalPlacement::new().place(&request).await?;
//! assert_eq!(response.rankfile, "rank 0=10.0.0.1 slot=0\nrank 1=10.0.0.2 slot=0");
//! # Ok(())
//! # }
//! ```

mod http;
mod strategy;

pub use http::HttpPlacement;
pub use strategy::{LocalPlacement, Strategy};

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Shape of the parallel job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    /// Number of processes (ranks)
    pub processes: usize,
    /// Communication edges between ranks; unused by the built-in strategies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<[usize; 2]>>,
}

/// Placement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    /// Job shape
    pub task_graph: TaskGraph,
    /// Candidate hosts
    pub nodes: Vec<String>,
    /// Strategy name
    pub strategy: String,
    /// Cluster topology the hosts came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_topology: Option<String>,
    /// Logical task topology
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_topology: Option<String>,
}

impl PlacementRequest {
    /// One process per host.
    #[must_use]
    pub fn new(hosts: Vec<String>, strategy: impl Into<String>) -> Self {
        Self {
            task_graph: TaskGraph {
                processes: hosts.len(),
                edges: None,
            },
            nodes: hosts,
            strategy: strategy.into(),
            cluster_topology: None,
            task_topology: None,
        }
    }

    /// Attach the cluster and task topology names.
    #[must_use]
    pub fn with_topologies(mut self, cluster: impl Into<String>, task: impl Into<String>) -> Self {
        self.cluster_topology = Some(cluster.into());
        self.task_topology = Some(task.into());
        self
    }
}

/// Placement response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementResponse {
    /// Rank → host
    pub mapping: BTreeMap<usize, String>,
    /// Rankfile text
    pub rankfile: String,
    /// Hostfile text
    pub hostfile: String,
}

impl PlacementResponse {
    /// Build a response from hosts in rank order, rendering both files.
    #[must_use]
    pub fn from_ranked_hosts(ranked: &[String]) -> Self {
        let mapping: BTreeMap<usize, String> = ranked.iter().cloned().enumerate().collect();
        let rankfile = mapping
            .iter()
            .map(|(rank, host)| format!("rank {rank}={host} slot=0"))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            mapping,
            rankfile,
            hostfile: ranked.join("\n"),
        }
    }

    /// Check the mapping covers ranks `0..processes` exactly, draws only from
    /// `hosts`, and never places two ranks on one host.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamUnavailable`] describing the first violation.
    pub fn validate(&self, processes: usize, hosts: &[String]) -> Result<()> {
        let invalid = |detail: String| Error::upstream("placement", detail);

        if self.mapping.len() != processes || self.mapping.keys().copied().ne(0..processes) {
            return Err(invalid(format!(
                "mapping covers ranks {:?}, expected 0..{processes}",
                self.mapping.keys().collect::<Vec<_>>()
            )));
        }
        let allowed: HashSet<&str> = hosts.iter().map(String::as_str).collect();
        let mut used = HashSet::new();
        for (rank, host) in &self.mapping {
            if !allowed.contains(host.as_str()) {
                return Err(invalid(format!("rank {rank} placed on unknown host {host}")));
            }
            if !used.insert(host.as_str()) {
                return Err(invalid(format!("host {host} assigned to more than one rank")));
            }
        }
        Ok(())
    }
}

/// Rank → host placement.
#[async_trait]
pub trait Placement: Send + Sync {
    /// Compute a placement.
    ///
    /// Unknown strategies and too few hosts are [`Error::InvalidInput`].
    async fn place(&self, request: &PlacementRequest) -> Result<PlacementResponse>;
}
