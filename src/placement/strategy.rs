//! Built-in placement strategies.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use super::{Placement, PlacementRequest, PlacementResponse};
use crate::{Error, Result};

/// Placement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Rank i on host i (`simple`, alias `ordered`)
    Simple,
    /// Ranks on a random permutation of hosts
    Random,
}

impl Strategy {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" | "ordered" => Ok(Self::Simple),
            "random" => Ok(Self::Random),
            _ => Err(Error::InvalidInput(format!("unknown strategy {s:?}"))),
        }
    }
}

/// In-process placement engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPlacement;

impl LocalPlacement {
    /// Create the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Synchronous core of [`Placement::place`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for an unknown strategy, duplicate hosts, or
    /// more processes than hosts.
    pub fn compute(request: &PlacementRequest) -> Result<PlacementResponse> {
        let strategy: Strategy = request.strategy.parse()?;
        let processes = request.task_graph.processes;
        let hosts = &request.nodes;

        if processes > hosts.len() {
            return Err(Error::InvalidInput(format!(
                "need at least {processes} hosts, given {}",
                hosts.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = hosts.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(Error::InvalidInput(format!("host {dup} listed more than once")));
        }

        let mut ordered = hosts.clone();
        if strategy == Strategy::Random {
            ordered.shuffle(&mut rand::thread_rng());
        }
        ordered.truncate(processes);
        Ok(PlacementResponse::from_ranked_hosts(&ordered))
    }
}

#[async_trait]
impl Placement for LocalPlacement {
    async fn place(&self, request: &PlacementRequest) -> Result<PlacementResponse> {
        Self::compute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("10.0.0.{i}")).collect()
    }

    #[test]
    fn test_strategy_parsing_is_case_insensitive() {
        assert_eq!("Simple".parse::<Strategy>().unwrap(), Strategy::Simple);
        assert_eq!("ORDERED".parse::<Strategy>().unwrap(), Strategy::Simple);
        assert_eq!("random".parse::<Strategy>().unwrap(), Strategy::Random);
        assert!(matches!("greedy".parse::<Strategy>(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_simple_keeps_host_order() {
        let resp = LocalPlacement::compute(&PlacementRequest::new(hosts(3), "simple")).unwrap();
        assert_eq!(resp.mapping.values().cloned().collect::<Vec<_>>(), hosts(3));
    }

    #[test]
    fn test_random_is_a_permutation() {
        let resp = LocalPlacement::compute(&PlacementRequest::new(hosts(5), "random")).unwrap();
        resp.validate(5, &hosts(5)).unwrap();
    }

    #[test]
    fn test_too_few_hosts() {
        let mut request = PlacementRequest::new(hosts(2), "simple");
        request.task_graph.processes = 3;
        assert!(matches!(LocalPlacement::compute(&request), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_fewer_processes_than_hosts_truncates() {
        let mut request = PlacementRequest::new(hosts(4), "simple");
        request.task_graph.processes = 2;
        let resp = LocalPlacement::compute(&request).unwrap();
        assert_eq!(resp.hostfile, "10.0.0.1\n10.0.0.2");
    }

    #[test]
    fn test_duplicate_hosts_rejected() {
        let request = PlacementRequest::new(vec!["h".to_string(), "h".to_string()], "simple");
        assert!(matches!(LocalPlacement::compute(&request), Err(Error::InvalidInput(_))));
    }
}
