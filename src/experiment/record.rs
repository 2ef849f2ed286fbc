//! Experiment record and its status state machine

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provision::ProvisionedTopology;
use crate::{Error, Result};

/// Default logical task topology.
pub const DEFAULT_TASK_TOPOLOGY: &str = "STAR";

/// Default placement strategy.
pub const DEFAULT_STRATEGY: &str = "Simple";

/// Pipeline status of an experiment.
///
/// Statuses before [`Completed`](Self::Completed) are ordered; an experiment
/// only ever moves forward, or to [`Failed`](Self::Failed) from any
/// non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    /// Recorded, pipeline not yet running
    Starting,
    /// Realizing the topology
    Provisioning,
    /// Mapping ranks to hosts
    Placing,
    /// Pushing rankfile and hostfile
    Distributing,
    /// Workload running
    Executing,
    /// Assembling the result
    Collecting,
    /// Result available
    Completed,
    /// A stage failed; no result
    Failed,
}

impl ExperimentStatus {
    /// The success path, in order.
    pub const SUCCESS_PATH: [Self; 7] = [
        Self::Starting,
        Self::Provisioning,
        Self::Placing,
        Self::Distributing,
        Self::Executing,
        Self::Collecting,
        Self::Completed,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Provisioning => "provisioning",
            Self::Placing => "placing",
            Self::Distributing => "distributing",
            Self::Executing => "executing",
            Self::Collecting => "collecting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `Completed` or `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Provisioning => 1,
            Self::Placing => 2,
            Self::Distributing => 3,
            Self::Executing => 4,
            Self::Collecting => 5,
            Self::Completed => 6,
            Self::Failed => u8::MAX,
        }
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Failed) || next.rank() > self.rank()
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an experiment was asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRequest {
    /// Cluster topology name
    pub topology: String,
    /// Logical task topology
    #[serde(default = "default_task_topology")]
    pub task_topology: String,
    /// Placement strategy
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_task_topology() -> String {
    DEFAULT_TASK_TOPOLOGY.to_string()
}

fn default_strategy() -> String {
    DEFAULT_STRATEGY.to_string()
}

impl ExperimentRequest {
    /// Request with the default task topology and strategy.
    #[must_use]
    pub fn new(topology: impl Into<String>) -> Self {
        Self {
            topology: topology.into(),
            task_topology: default_task_topology(),
            strategy: default_strategy(),
        }
    }

    /// Override the task topology.
    #[must_use]
    pub fn task_topology(mut self, task_topology: impl Into<String>) -> Self {
        self.task_topology = task_topology.into();
        self
    }

    /// Override the strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }
}

/// Output of a completed experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Provisioned topology
    pub provisioning: ProvisionedTopology,
    /// Rank → host
    pub mapping: BTreeMap<usize, String>,
    /// Workload wall-clock time
    pub elapsed_seconds: f64,
    /// Workload stdout
    pub stdout: String,
    /// Workload stderr
    pub stderr: String,
}

/// One experiment. Retained for the life of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    id: u64,
    topology: String,
    task_topology: String,
    strategy: String,
    status: ExperimentStatus,
    result: Option<ExperimentResult>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// New record in `Starting`.
    #[must_use]
    pub fn new(id: u64, request: ExperimentRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            topology: request.topology,
            task_topology: request.task_topology,
            strategy: request.strategy,
            status: ExperimentStatus::Starting,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Experiment id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Cluster topology name.
    #[must_use]
    pub fn topology(&self) -> &str {
        &self.topology
    }

    /// Task topology name.
    #[must_use]
    pub fn task_topology(&self) -> &str {
        &self.task_topology
    }

    /// Strategy name.
    #[must_use]
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Result, once completed.
    #[must_use]
    pub const fn result(&self) -> Option<&ExperimentResult> {
        self.result.as_ref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last status change.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if the transition would go backward, leave a
    /// terminal status, or enter `Completed` without a result.
    pub fn advance(&mut self, next: ExperimentStatus) -> Result<()> {
        if next == ExperimentStatus::Completed && self.result.is_none() {
            return Err(Error::InvalidInput(format!(
                "experiment {} cannot complete without a result",
                self.id
            )));
        }
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidInput(format!(
                "experiment {}: illegal transition {} -> {next}",
                self.id, self.status
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach the result and move to `Completed`.
    ///
    /// # Errors
    ///
    /// As [`advance`](Self::advance); the record is unchanged on error.
    pub fn complete(&mut self, result: ExperimentResult) -> Result<()> {
        if !self.status.can_transition_to(ExperimentStatus::Completed) {
            return Err(Error::InvalidInput(format!(
                "experiment {}: illegal transition {} -> completed",
                self.id, self.status
            )));
        }
        self.result = Some(result);
        self.advance(ExperimentStatus::Completed)
    }
}
