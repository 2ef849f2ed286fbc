//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use cluster_testbed::broadcast::StatusBroadcaster;
use cluster_testbed::console::{ConsoleConfigurator, ConsoleEndpoint, InterfaceAddress};
use cluster_testbed::control_plane::{
    ControlPlane, DeviceRequest, ImageRecord, InstantiateRequest, LinkRecord, LinkRequest,
    NodeRecord, ProjectRecord, QemuTemplate, TemplateRecord,
};
use cluster_testbed::distribute::{DistributionSettings, Distributor};
use cluster_testbed::experiment::{ExperimentRecord, ExperimentStore, MemoryExperimentStore};
use cluster_testbed::metrics::LocalMetrics;
use cluster_testbed::pipeline::{Coordinator, Services};
use cluster_testbed::placement::LocalPlacement;
use cluster_testbed::provision::{ProvisionSettings, Provisioner};
use cluster_testbed::remote::{CommandOutput, RemoteExec, RemoteSession};
use cluster_testbed::topology::{MemoryTopologySource, Topology};
use cluster_testbed::{Error, Result};

pub const FIRST_CONSOLE_PORT: u16 = 5000;

// ============================================================================
// Control plane
// ============================================================================

#[derive(Debug, Default)]
pub struct ControlPlaneState {
    pub projects: Vec<ProjectRecord>,
    pub templates: Vec<TemplateRecord>,
    pub template_payloads: Vec<QemuTemplate>,
    pub nodes: HashMap<String, Vec<NodeRecord>>,
    pub links: Vec<LinkRequest>,
    pub images: Vec<ImageRecord>,
    pub projects_created: usize,
    pub projects_opened: usize,
    pub start_calls: usize,
    pub next_console: u16,
    pub next_id: usize,
    pub calls: usize,
}

/// Control plane held in memory. `fail_on` names an operation that answers
/// with an upstream error.
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    pub state: Mutex<ControlPlaneState>,
    pub fail_on: Mutex<Option<&'static str>>,
    /// Per-call latency, to keep concurrent pipelines overlapping
    pub latency: Mutex<Duration>,
    /// Holds one project's bulk start until released
    pub gate: Mutex<Option<StartGate>>,
    /// Console host reported on instantiated guests
    pub console_host: Mutex<Option<String>>,
}

/// Parks `start_all_nodes` for the named project. `entered` fires when the
/// call arrives; `release` lets it continue.
#[derive(Debug, Clone)]
pub struct StartGate {
    pub project: String,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(op: &'static str) -> Self {
        let fake = Self::default();
        *fake.fail_on.lock() = Some(op);
        fake
    }

    pub fn with_latency(latency: Duration) -> Self {
        let fake = Self::default();
        *fake.latency.lock() = latency;
        fake
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.state.lock().calls += 1;
        if *self.fail_on.lock() == Some(op) {
            return Err(Error::upstream("control plane", format!("{op}: 500 boom")));
        }
        Ok(())
    }

    pub fn gated(project: &str) -> (Self, StartGate) {
        let gate = StartGate {
            project: project.to_string(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let fake = Self::default();
        *fake.gate.lock() = Some(gate.clone());
        (fake, gate)
    }

    fn next_id(state: &mut ControlPlaneState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    pub fn template_count(&self) -> usize {
        self.state.lock().templates.len()
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        self.enter("list_projects").await?;
        Ok(self.state.lock().projects.clone())
    }

    async fn create_project(&self, name: &str) -> Result<ProjectRecord> {
        self.enter("create_project").await?;
        let mut state = self.state.lock();
        let project = ProjectRecord {
            project_id: Self::next_id(&mut state, "project"),
            name: name.to_string(),
        };
        state.projects.push(project.clone());
        state.projects_created += 1;
        Ok(project)
    }

    async fn open_project(&self, _project_id: &str) -> Result<()> {
        self.enter("open_project").await?;
        self.state.lock().projects_opened += 1;
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        self.enter("list_templates").await?;
        Ok(self.state.lock().templates.clone())
    }

    async fn list_images(&self, _image_type: &str) -> Result<Vec<ImageRecord>> {
        self.enter("list_images").await?;
        Ok(self.state.lock().images.clone())
    }

    async fn create_template(&self, template: &QemuTemplate) -> Result<TemplateRecord> {
        self.enter("create_template").await?;
        let mut state = self.state.lock();
        let record = TemplateRecord {
            template_id: Self::next_id(&mut state, "template"),
            name: template.name().to_string(),
        };
        state.templates.push(record.clone());
        state.template_payloads.push(template.clone());
        Ok(record)
    }

    async fn instantiate_template(
        &self,
        project_id: &str,
        _template_id: &str,
        request: &InstantiateRequest,
    ) -> Result<NodeRecord> {
        self.enter("instantiate_template").await?;
        let mut state = self.state.lock();
        let node_id = Self::next_id(&mut state, "node");
        let console = FIRST_CONSOLE_PORT + state.next_console;
        state.next_console += 1;
        let record = NodeRecord {
            name: request.name.clone().unwrap_or_else(|| node_id.clone()),
            node_id,
            node_type: "qemu".to_string(),
            console: Some(console),
            console_host: self.console_host.lock().clone(),
            status: Some("stopped".to_string()),
        };
        state.nodes.entry(project_id.to_string()).or_default().push(record.clone());
        Ok(record)
    }

    async fn create_node(&self, project_id: &str, request: &DeviceRequest) -> Result<NodeRecord> {
        self.enter("create_node").await?;
        let mut state = self.state.lock();
        let record = NodeRecord {
            node_id: Self::next_id(&mut state, "device"),
            name: request.name.clone(),
            node_type: request.node_type.clone(),
            console: None,
            console_host: None,
            status: None,
        };
        state.nodes.entry(project_id.to_string()).or_default().push(record.clone());
        Ok(record)
    }

    async fn list_nodes(&self, project_id: &str) -> Result<Vec<NodeRecord>> {
        self.enter("list_nodes").await?;
        Ok(self.state.lock().nodes.get(project_id).cloned().unwrap_or_default())
    }

    async fn start_all_nodes(&self, project_id: &str) -> Result<()> {
        self.enter("start_all_nodes").await?;
        let held = {
            let state = self.state.lock();
            let name = state
                .projects
                .iter()
                .find(|p| p.project_id == project_id)
                .map(|p| p.name.clone());
            self.gate.lock().clone().filter(|g| name.as_deref() == Some(g.project.as_str()))
        };
        if let Some(gate) = held {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.state.lock().start_calls += 1;
        Ok(())
    }

    async fn create_link(&self, _project_id: &str, request: &LinkRequest) -> Result<LinkRecord> {
        self.enter("create_link").await?;
        let mut state = self.state.lock();
        let link_id = Self::next_id(&mut state, "link");
        state.links.push(request.clone());
        Ok(LinkRecord { link_id })
    }
}

// ============================================================================
// Console
// ============================================================================

/// Records every configured address; fails for the listed console ports.
#[derive(Debug, Default)]
pub struct FakeConsole {
    pub configured: Mutex<Vec<(ConsoleEndpoint, InterfaceAddress)>>,
    pub failing_ports: HashSet<u16>,
}

impl FakeConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            configured: Mutex::new(Vec::new()),
            failing_ports: ports.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ConsoleConfigurator for FakeConsole {
    async fn configure(&self, endpoint: &ConsoleEndpoint, address: &InterfaceAddress) -> Result<()> {
        if self.failing_ports.contains(&endpoint.port) {
            return Err(Error::Timeout(format!("console {endpoint}")));
        }
        self.configured.lock().push((endpoint.clone(), address.clone()));
        Ok(())
    }
}

// ============================================================================
// Remote execution
// ============================================================================

#[derive(Debug, Default)]
pub struct RemoteState {
    pub dirs: Vec<(String, String)>,
    pub files: Vec<(String, String, String)>,
    pub commands: Vec<(String, String)>,
}

/// Remote hosts held in memory.
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub state: Arc<Mutex<RemoteState>>,
    pub unreachable: HashSet<String>,
    pub stdout: String,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            stdout: "Hello from rank 0\n".to_string(),
            ..Self::default()
        }
    }

    pub fn with_unreachable(hosts: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            unreachable: hosts.into_iter().map(str::to_string).collect(),
            ..Self::new()
        }
    }

    pub fn file(&self, host: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .files
            .iter()
            .rev()
            .find(|(h, p, _)| h == host && p == path)
            .map(|(_, _, c)| c.clone())
    }
}

struct FakeSession {
    host: String,
    state: Arc<Mutex<RemoteState>>,
    stdout: String,
}

#[async_trait]
impl RemoteExec for FakeRemote {
    async fn open(&self, host: &str) -> Result<Box<dyn RemoteSession>> {
        if self.unreachable.contains(host) {
            return Err(Error::upstream("remote host", format!("ssh login to {host} failed")));
        }
        Ok(Box::new(FakeSession {
            host: host.to_string(),
            state: Arc::clone(&self.state),
            stdout: self.stdout.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn ensure_dir(&self, dir: &str) -> Result<()> {
        self.state.lock().dirs.push((self.host.clone(), dir.to_string()));
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        self.state
            .lock()
            .files
            .push((self.host.clone(), path.to_string(), contents.to_string()));
        Ok(())
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.state.lock().commands.push((self.host.clone(), command.to_string()));
        Ok(CommandOutput {
            stdout: self.stdout.clone(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn settings() -> ProvisionSettings {
    ProvisionSettings {
        settle_delay: Duration::ZERO,
        ..ProvisionSettings::default()
    }
}

pub fn provisioner(control_plane: Arc<FakeControlPlane>, console: Arc<FakeConsole>) -> Provisioner {
    Provisioner::new(control_plane, console, settings())
}

/// Three compute guests on one image, in a line.
pub fn line_topology(name: &str) -> Topology {
    Topology::from_json(
        name,
        r#"{
            "nodes": [
                {"id": "n1", "name": "alpha", "image": "/images/arch.qcow2"},
                {"id": "n2", "name": "beta", "image": "/images/arch.qcow2"},
                {"id": "n3", "name": "gamma", "image": "/images/arch.qcow2"}
            ],
            "links": [
                {"endpoints": ["n1", "n2"]},
                {"endpoints": ["beta", "gamma"]}
            ]
        }"#,
    )
    .expect("valid topology")
}

pub struct Harness {
    pub coordinator: Arc<Coordinator<MemoryExperimentStore>>,
    pub control_plane: Arc<FakeControlPlane>,
    pub console: Arc<FakeConsole>,
    pub remote: Arc<FakeRemote>,
    pub topologies: Arc<MemoryTopologySource>,
}

pub fn harness(control_plane: FakeControlPlane, console: FakeConsole, remote: FakeRemote) -> Harness {
    let control_plane = Arc::new(control_plane);
    let console = Arc::new(console);
    let remote = Arc::new(remote);
    let topologies = Arc::new(MemoryTopologySource::new());

    let services = Services {
        topologies: topologies.clone(),
        provisioner: Arc::new(provisioner(control_plane.clone(), console.clone())),
        placement: Arc::new(LocalPlacement::new()),
        distributor: Arc::new(Distributor::new(remote.clone(), DistributionSettings::default())),
        metrics: Arc::new(LocalMetrics::new()),
    };
    let coordinator = Arc::new(Coordinator::new(
        services,
        Arc::new(MemoryExperimentStore::new()),
        Arc::new(StatusBroadcaster::new()),
    ));

    Harness {
        coordinator,
        control_plane,
        console,
        remote,
        topologies,
    }
}

/// Poll until the experiment reaches `completed` or `failed`.
pub async fn wait_terminal<S: ExperimentStore + 'static>(coordinator: &Coordinator<S>, id: u64) -> ExperimentRecord {
    for _ in 0..500 {
        let record = coordinator.get(id).await.expect("experiment exists");
        if record.status().is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("experiment {id} did not finish");
}
