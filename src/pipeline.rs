//! Pipeline coordinator
//!
//! Drives one experiment through
//! `provisioning → placing → distributing → executing → collecting`.
//! Each stage yields a typed value or an error; the first error stops the
//! run, marks the experiment `failed` and leaves its result empty. Nothing
//! is rolled back and nothing is retried.
//!
//! [`Coordinator::start`] returns as soon as the experiment is recorded; the
//! stages run on their own tokio task. Progress is visible through
//! [`Coordinator::get`] and the [`StatusBroadcaster`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::broadcast::StatusBroadcaster;
use crate::distribute::{Artifact, Distributor};
use crate::experiment::{
    ExperimentRecord, ExperimentRequest, ExperimentResult, ExperimentStatus, ExperimentStore,
    MemoryExperimentStore,
};
use crate::metrics::Metrics;
use crate::placement::{Placement, PlacementRequest};
use crate::provision::{ProvisionedTopology, Provisioner};
use crate::remote::CommandOutput;
use crate::topology::TopologySource;
use crate::{Error, Result};

/// Rankfile artifact name.
pub const RANKFILE: &str = "rankfile";

/// Hostfile artifact name.
pub const HOSTFILE: &str = "hostfile";

/// Collaborators the pipeline calls into.
pub struct Services {
    /// Topology definitions
    pub topologies: Arc<dyn TopologySource>,
    /// Provisioning engine
    pub provisioner: Arc<Provisioner>,
    /// Placement contract
    pub placement: Arc<dyn Placement>,
    /// Artifact distribution and launch
    pub distributor: Arc<Distributor>,
    /// Timer store
    pub metrics: Arc<dyn Metrics>,
}

/// Runs experiments.
pub struct Coordinator<S = MemoryExperimentStore> {
    services: Services,
    store: Arc<S>,
    broadcaster: Arc<StatusBroadcaster>,
}

struct Placed {
    hosts: Vec<String>,
    mapping: BTreeMap<usize, String>,
    artifacts: [Artifact; 2],
}

impl<S: ExperimentStore + 'static> Coordinator<S> {
    /// Coordinator over `services`, recording into `store`.
    #[must_use]
    pub fn new(services: Services, store: Arc<S>, broadcaster: Arc<StatusBroadcaster>) -> Self {
        Self {
            services,
            store,
            broadcaster,
        }
    }

    /// Status broadcaster.
    #[must_use]
    pub fn broadcaster(&self) -> &Arc<StatusBroadcaster> {
        &self.broadcaster
    }

    /// Topology definitions.
    #[must_use]
    pub fn topologies(&self) -> &Arc<dyn TopologySource> {
        &self.services.topologies
    }

    /// Record a new experiment and run it in the background.
    ///
    /// Returns the experiment id before any stage has run.
    ///
    /// # Errors
    ///
    /// Only if the store cannot record the experiment.
    pub async fn start(self: &Arc<Self>, request: ExperimentRequest) -> Result<u64> {
        let record = self.store.create(request.clone()).await?;
        let id = record.id();
        tracing::info!(
            experiment_id = id,
            topology = %request.topology,
            task_topology = %request.task_topology,
            strategy = %request.strategy,
            "experiment started"
        );
        self.broadcaster.broadcast(format!(
            "Experiment {id} started: topology {}, strategy {}",
            request.topology, request.strategy
        ));

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(id, &request).await });
        Ok(id)
    }

    /// Current record.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn get(&self, id: u64) -> Result<ExperimentRecord> {
        self.store.get(id).await
    }

    /// Every experiment, ascending by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list(&self) -> Result<Vec<ExperimentRecord>> {
        self.store.list().await
    }

    /// Run every stage of experiment `id`, recording the outcome.
    ///
    /// Never fails: a stage error is logged, recorded as `failed` and
    /// broadcast as a one-line summary.
    pub async fn run(&self, id: u64, request: &ExperimentRequest) {
        match self.run_stages(id, request).await {
            Ok(elapsed) => {
                tracing::info!(experiment_id = id, elapsed, "experiment completed");
                self.broadcaster
                    .broadcast(format!("Experiment {id}: completed in {elapsed:.2}s"));
            }
            Err(e) => {
                let stage = match &e {
                    Error::Pipeline { stage, .. } => stage.clone(),
                    _ => "pipeline".to_string(),
                };
                tracing::error!(experiment_id = id, stage = %stage, error = %e, "experiment failed");
                if let Err(store_err) = self.store.set_status(id, ExperimentStatus::Failed).await {
                    tracing::error!(experiment_id = id, error = %store_err, "could not record failure");
                }
                self.broadcaster.broadcast(format!(
                    "Experiment {id}: failed during {stage} ({})",
                    e.kind()
                ));
            }
        }
    }

    /// Returns elapsed seconds.
    async fn run_stages(&self, id: u64, request: &ExperimentRequest) -> Result<f64> {
        self.enter(id, ExperimentStatus::Provisioning).await?;
        let provisioning = self
            .provision(request)
            .await
            .map_err(|e| e.in_stage(ExperimentStatus::Provisioning.as_str()))?;

        self.enter(id, ExperimentStatus::Placing).await?;
        let placed = self
            .place(request, &provisioning)
            .await
            .map_err(|e| e.in_stage(ExperimentStatus::Placing.as_str()))?;

        self.enter(id, ExperimentStatus::Distributing).await?;
        self.services
            .distributor
            .distribute(&placed.hosts, &placed.artifacts)
            .await
            .map_err(|e| e.in_stage(ExperimentStatus::Distributing.as_str()))?;

        self.enter(id, ExperimentStatus::Executing).await?;
        let (output, elapsed) = self
            .execute(id, &placed.hosts)
            .await
            .map_err(|e| e.in_stage(ExperimentStatus::Executing.as_str()))?;

        self.enter(id, ExperimentStatus::Collecting).await?;
        let result = ExperimentResult {
            provisioning,
            mapping: placed.mapping,
            elapsed_seconds: elapsed,
            stdout: output.stdout,
            stderr: output.stderr,
        };
        self.store
            .complete(id, result)
            .await
            .map_err(|e| e.in_stage(ExperimentStatus::Collecting.as_str()))?;
        Ok(elapsed)
    }

    async fn enter(&self, id: u64, status: ExperimentStatus) -> Result<()> {
        self.store
            .set_status(id, status)
            .await
            .map_err(|e| e.in_stage(status.as_str()))?;
        tracing::info!(experiment_id = id, status = %status, "stage entered");
        self.broadcaster.broadcast(format!("Experiment {id}: {status}"));
        Ok(())
    }

    async fn provision(&self, request: &ExperimentRequest) -> Result<ProvisionedTopology> {
        let provisioning = self
            .services
            .provisioner
            .provision_named(self.services.topologies.as_ref(), &request.topology)
            .await?;
        if provisioning.hosts().is_empty() {
            return Err(Error::Other("no addresses assigned".to_string()));
        }
        Ok(provisioning)
    }

    async fn place(&self, request: &ExperimentRequest, provisioning: &ProvisionedTopology) -> Result<Placed> {
        let hosts = provisioning.hosts();
        let placement_request = PlacementRequest::new(hosts.clone(), request.strategy.clone())
            .with_topologies(request.topology.clone(), request.task_topology.clone());
        let response = self.services.placement.place(&placement_request).await?;
        response.validate(hosts.len(), &hosts)?;

        Ok(Placed {
            hosts,
            mapping: response.mapping,
            artifacts: [
                Artifact::new(RANKFILE, response.rankfile),
                Artifact::new(HOSTFILE, response.hostfile),
            ],
        })
    }

    /// Master is `hosts[0]`.
    async fn execute(&self, id: u64, hosts: &[String]) -> Result<(CommandOutput, f64)> {
        let master = hosts
            .first()
            .ok_or_else(|| Error::Other("no addresses assigned".to_string()))?;
        let rankfile_path = self.services.distributor.settings().remote_path(RANKFILE);

        let token = self.services.metrics.start(id).await?;
        let output = self
            .services
            .distributor
            .execute(master, hosts.len(), &rankfile_path)
            .await?;
        let elapsed = self.services.metrics.finish(&token).await?;
        Ok((output, elapsed))
    }
}
