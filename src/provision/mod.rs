//! Topology provisioning engine
//!
//! Turns an abstract [`Topology`] into running, addressed control-plane
//! resources. Re-running against the same topology name reuses the project
//! and templates rather than duplicating them.
//!
//! ```text
//! project ─> templates ─> nodes ─> links ─> start all ─> settle ─> consoles
//!   (create-or-reuse)       (key/name table)   (bulk)    (delay)  (fail-soft)
//! ```
//!
//! Everything before the console step is fail-fast: the first control-plane
//! error aborts the run. Console bring-up is fail-soft per node: a guest
//! whose console cannot be configured is logged and left without an
//! address, and its siblings carry on.
//!
//! ## Readiness
//!
//! Nodes are started with one bulk call and guests are *assumed* booted
//! after [`ProvisionSettings::settle_delay`]. Nothing polls for readiness;
//! a guest still booting when its console is driven simply fails its
//! bring-up and is excluded.

mod address;
mod naming;
mod resolve;

pub use address::AddressPool;
pub use naming::{clean_alnum, generated_node_name, project_name, sanitize, template_name};
pub use resolve::ResolutionTable;

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::console::{ConsoleConfigurator, ConsoleEndpoint};
use crate::control_plane::{
    ControlPlane, DeviceRequest, InstantiateRequest, LinkNode, LinkRequest, NodeRecord, QemuTemplate,
};
use crate::topology::{ComputeSpec, Link, NodeKind, Topology, TopologySource, COMPUTE_NODE_TYPE};
use crate::{Error, Result};

/// Tunables for a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Subnet guests are addressed from
    pub network: Ipv4Addr,
    /// Subnet prefix length
    pub prefix_len: u8,
    /// Host number of the first assigned address
    pub first_host: u32,
    /// Guest interface to configure
    pub interface: String,
    /// Console host for nodes whose record names none
    pub console_host: String,
    /// Assumed guest boot time between bulk start and console bring-up
    pub settle_delay: Duration,
    /// Memory for guests that request none
    pub default_ram_mb: u32,
    /// Platform for guests that request none
    pub default_platform: String,
    /// Prefer a control-plane image whose file name starts with this
    pub preferred_image_prefix: Option<String>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            network: Ipv4Addr::new(10, 0, 0, 0),
            prefix_len: 24,
            first_host: 1,
            interface: "ens3".to_string(),
            console_host: "127.0.0.1".to_string(),
            settle_delay: Duration::from_secs(30),
            default_ram_mb: 512,
            default_platform: "x86_64".to_string(),
            preferred_image_prefix: None,
        }
    }
}

/// A node as it exists after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedNode {
    /// Topology key, when the node was created by this run
    pub key: Option<String>,
    /// Control-plane display name
    pub name: String,
    /// Control-plane node id
    pub node_id: String,
    /// Control-plane node type
    pub node_type: String,
    /// Console endpoint, if the node has one
    pub console: Option<ConsoleEndpoint>,
    /// Assigned address, only for successfully configured compute nodes
    pub address: Option<Ipv4Addr>,
}

impl ProvisionedNode {
    /// Whether this is a compute guest.
    #[must_use]
    pub fn is_compute(&self) -> bool {
        self.node_type == COMPUTE_NODE_TYPE
    }
}

/// Outcome of [`Provisioner::provision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedTopology {
    /// Topology name
    pub topology: String,
    /// Control-plane project id
    pub project_id: String,
    /// All project nodes in enumeration order
    pub nodes: Vec<ProvisionedNode>,
    /// Link resources created by this run
    pub links_created: usize,
    /// Links skipped for an unresolved endpoint
    pub links_skipped: usize,
}

impl ProvisionedTopology {
    /// Addresses of configured compute nodes, in enumeration order.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.is_compute())
            .filter_map(|n| n.address.map(|a| a.to_string()))
            .collect()
    }
}

/// Provisioning engine.
///
/// Shared by every experiment of a process. The template cache lives as
/// long as the engine; everything else is scoped to one
/// [`provision`](Self::provision) call.
pub struct Provisioner {
    control_plane: Arc<dyn ControlPlane>,
    console: Arc<dyn ConsoleConfigurator>,
    settings: ProvisionSettings,
    templates: DashMap<String, String>,
}

impl Provisioner {
    /// Engine over the given control plane and console configurator.
    #[must_use]
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        console: Arc<dyn ConsoleConfigurator>,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            control_plane,
            console,
            settings,
            templates: DashMap::new(),
        }
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Number of image → template entries cached so far.
    #[must_use]
    pub fn cached_template_count(&self) -> usize {
        self.templates.len()
    }

    /// Look up `name` in `source` and provision it.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] before any control-plane call when the definition
    /// is missing; otherwise as [`provision`](Self::provision).
    pub async fn provision_named(&self, source: &dyn TopologySource, name: &str) -> Result<ProvisionedTopology> {
        let topology = source.fetch(name).await?;
        self.provision(&topology).await
    }

    /// Realize `topology` on the control plane.
    ///
    /// # Errors
    ///
    /// [`Error::AmbiguousIdentifier`] for duplicate node keys (checked before
    /// any control-plane call), [`Error::UpstreamUnavailable`] for any failed
    /// structural call. Console failures are not errors.
    pub async fn provision(&self, topology: &Topology) -> Result<ProvisionedTopology> {
        check_unique_keys(topology)?;

        let project_id = self.ensure_project(&project_name(topology.name())).await?;
        let templates = self.ensure_templates(topology).await?;
        let (table, keys_by_id) = self.create_nodes(&project_id, topology, &templates).await?;
        let (links_created, links_skipped) = self.create_links(&project_id, topology.links(), &table).await?;

        self.control_plane.start_all_nodes(&project_id).await?;
        tracing::info!(project_id = %project_id, "started all nodes");

        if !self.settings.settle_delay.is_zero() {
            tracing::info!(
                delay_secs = self.settings.settle_delay.as_secs_f64(),
                "waiting for guests to boot before console configuration"
            );
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let records = self.control_plane.list_nodes(&project_id).await?;
        let nodes = self.configure_consoles(records, &keys_by_id).await;

        Ok(ProvisionedTopology {
            topology: topology.name().to_string(),
            project_id,
            nodes,
            links_created,
            links_skipped,
        })
    }

    async fn ensure_project(&self, name: &str) -> Result<String> {
        let existing = self
            .control_plane
            .list_projects()
            .await?
            .into_iter()
            .find(|p| p.name == name);

        let project = match existing {
            Some(project) => {
                tracing::info!(project = name, project_id = %project.project_id, "reusing project");
                project
            }
            None => {
                let project = self.control_plane.create_project(name).await?;
                tracing::info!(project = name, project_id = %project.project_id, "created project");
                project
            }
        };

        self.control_plane.open_project(&project.project_id).await?;
        Ok(project.project_id)
    }

    /// One template per distinct image path.
    async fn ensure_templates(&self, topology: &Topology) -> Result<HashMap<String, String>> {
        let mut by_image = HashMap::new();
        for spec in topology.compute_nodes().filter_map(|n| n.compute_spec()) {
            if by_image.contains_key(&spec.image) {
                continue;
            }
            let template_id = self.ensure_template(spec).await?;
            by_image.insert(spec.image.clone(), template_id);
        }
        Ok(by_image)
    }

    async fn ensure_template(&self, spec: &ComputeSpec) -> Result<String> {
        if let Some(id) = self.templates.get(&spec.image) {
            return Ok(id.value().clone());
        }

        let name = template_name(spec.image_file_name());
        let existing = self
            .control_plane
            .list_templates()
            .await?
            .into_iter()
            .find(|t| t.name == name);

        let template_id = if let Some(template) = existing {
            tracing::info!(template = %name, template_id = %template.template_id, "reusing template");
            template.template_id
        } else {
            let image = self.select_image(&spec.image).await?;
            let payload = QemuTemplate::new(
                &name,
                image,
                spec.ram_mb.unwrap_or(self.settings.default_ram_mb),
                spec.platform
                    .clone()
                    .unwrap_or_else(|| self.settings.default_platform.clone()),
            );
            let template = self.control_plane.create_template(&payload).await?;
            tracing::info!(template = %name, template_id = %template.template_id, "created template");
            template.template_id
        };

        self.templates.insert(spec.image.clone(), template_id.clone());
        Ok(template_id)
    }

    async fn select_image(&self, declared: &str) -> Result<String> {
        let Some(prefix) = &self.settings.preferred_image_prefix else {
            return Ok(declared.to_string());
        };
        let preferred = self
            .control_plane
            .list_images(COMPUTE_NODE_TYPE)
            .await?
            .into_iter()
            .find(|img| img.filename.starts_with(prefix.as_str()))
            .map(|img| img.file_path.unwrap_or(img.filename));
        Ok(preferred.unwrap_or_else(|| declared.to_string()))
    }

    async fn create_nodes(
        &self,
        project_id: &str,
        topology: &Topology,
        templates: &HashMap<String, String>,
    ) -> Result<(ResolutionTable, HashMap<String, String>)> {
        let mut table = ResolutionTable::new();
        let mut keys_by_id = HashMap::new();

        for node in topology.nodes() {
            let position = node.position();
            let (display_name, created) = match node.kind() {
                NodeKind::Compute(spec) => {
                    let template_id = templates.get(&spec.image).ok_or_else(|| {
                        Error::NotFound(format!("template for image {}", spec.image))
                    })?;
                    let display_name = node
                        .name()
                        .map_or_else(|| generated_node_name(spec.image_stem()), str::to_string);
                    let request = InstantiateRequest {
                        x: position.x,
                        y: position.y,
                        name: Some(sanitize(&display_name)),
                    };
                    let created = self
                        .control_plane
                        .instantiate_template(project_id, template_id, &request)
                        .await?;
                    (display_name, created)
                }
                NodeKind::Device { device_type } => {
                    let display_name = node.name().unwrap_or(node.key()).to_string();
                    let request = DeviceRequest {
                        name: display_name.clone(),
                        node_type: device_type.clone(),
                        compute_id: "local".to_string(),
                        x: position.x,
                        y: position.y,
                    };
                    let created = self.control_plane.create_node(project_id, &request).await?;
                    (display_name, created)
                }
            };

            tracing::info!(key = node.key(), node = %display_name, node_id = %created.node_id, "node ready");
            table.insert(node.key(), &display_name, &created.node_id)?;
            keys_by_id.insert(created.node_id, node.key().to_string());
        }

        Ok((table, keys_by_id))
    }

    /// Returns `(created, skipped)`.
    async fn create_links(&self, project_id: &str, links: &[Link], table: &ResolutionTable) -> Result<(usize, usize)> {
        let mut created = 0;
        let mut skipped = 0;

        for link in links {
            let resolved: Result<Vec<LinkNode>> = link
                .endpoints()
                .iter()
                .map(|ep| {
                    table.resolve(&ep.node).map(|node_id| LinkNode {
                        node_id: node_id.to_string(),
                        adapter_number: ep.adapter,
                        port_number: ep.port,
                    })
                })
                .collect();

            let [a, b] = link.endpoints();
            let nodes = match resolved {
                Ok(nodes) => nodes,
                Err(e) => {
                    tracing::warn!(from = %a.node, to = %b.node, error = %e, "skipping link");
                    skipped += 1;
                    continue;
                }
            };

            let request = LinkRequest {
                link_type: link.link_type().to_string(),
                suspend: false,
                nodes,
            };
            self.control_plane.create_link(project_id, &request).await?;
            tracing::info!(from = %a.node, to = %b.node, "created link");
            created += 1;
        }

        Ok((created, skipped))
    }

    /// Address compute nodes in enumeration order. Never fails.
    async fn configure_consoles(
        &self,
        records: Vec<NodeRecord>,
        keys_by_id: &HashMap<String, String>,
    ) -> Vec<ProvisionedNode> {
        let mut pool = AddressPool::new(
            self.settings.network,
            self.settings.prefix_len,
            self.settings.first_host,
            self.settings.interface.clone(),
        );
        let mut nodes = Vec::with_capacity(records.len());

        for record in records {
            let console_host = record
                .console_host
                .filter(|h| !matches!(h.as_str(), "" | "0.0.0.0" | "::"))
                .unwrap_or_else(|| self.settings.console_host.clone());
            let console = record.console.map(|port| ConsoleEndpoint::new(console_host, port));
            let mut node = ProvisionedNode {
                key: keys_by_id.get(&record.node_id).cloned(),
                name: record.name,
                node_id: record.node_id,
                node_type: record.node_type,
                console,
                address: None,
            };

            if node.is_compute() {
                match self.configure_one(&node, &pool).await {
                    Ok(address) => {
                        tracing::info!(node = %node.name, %address, "configured guest address");
                        node.address = Some(address);
                        pool.commit();
                    }
                    Err(e) => {
                        tracing::warn!(node = %node.name, error = %e, "guest left unaddressed");
                    }
                }
            }
            nodes.push(node);
        }

        nodes
    }

    async fn configure_one(&self, node: &ProvisionedNode, pool: &AddressPool) -> Result<Ipv4Addr> {
        let partial = |detail: String| Error::PartialConfiguration {
            node: node.name.clone(),
            detail,
        };
        let address = pool
            .peek()
            .ok_or_else(|| partial(format!("address pool /{} exhausted", pool.prefix_len())))?;
        let console = node
            .console
            .as_ref()
            .ok_or_else(|| partial("no console endpoint".to_string()))?;
        self.console
            .configure(console, &address)
            .await
            .map_err(|e| partial(e.to_string()))?;
        Ok(address.address)
    }
}

fn check_unique_keys(topology: &Topology) -> Result<()> {
    let mut seen = HashSet::new();
    for node in topology.nodes() {
        if !seen.insert(node.key()) {
            return Err(Error::AmbiguousIdentifier(format!(
                "topology {} declares node key {} more than once",
                topology.name(),
                node.key()
            )));
        }
    }
    Ok(())
}
