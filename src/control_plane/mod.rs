//! Control-plane client
//!
//! Typed request/response wrapper over the network emulator's versioned
//! REST API (`/v3/...`). [`ControlPlane`] is the seam the provisioning
//! engine talks to; [`HttpControlPlane`] is the production implementation.
//!
//! Every call here is *structural*: a transport failure or non-2xx answer
//! is returned as [`crate::Error::UpstreamUnavailable`] and the caller is
//! expected to abort. The one exception is opening an already-open project,
//! which the API reports as `409 Conflict` and which counts as success.

mod http;
mod template;

pub use http::HttpControlPlane;
pub use template::QemuTemplate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A project as listed or created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Control-plane project id
    pub project_id: String,
    /// Project name
    pub name: String,
}

/// A template as listed or created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Control-plane template id
    pub template_id: String,
    /// Template name
    pub name: String,
}

/// A disk image known to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Base file name
    #[serde(default)]
    pub filename: String,
    /// Full path, when reported
    #[serde(default)]
    pub file_path: Option<String>,
}

/// A node as created or enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Control-plane node id
    pub node_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Node type (`qemu`, `ethernet_switch`, ...)
    #[serde(default)]
    pub node_type: String,
    /// Console TCP port
    #[serde(default)]
    pub console: Option<u16>,
    /// Console host, when the control plane reports one
    #[serde(default)]
    pub console_host: Option<String>,
    /// Run status (`started`, `stopped`, ...)
    #[serde(default)]
    pub status: Option<String>,
}

/// Body for instantiating a node from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstantiateRequest {
    /// Canvas x
    pub x: i32,
    /// Canvas y
    pub y: i32,
    /// Node name; the control plane picks one when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body for creating a device node directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRequest {
    /// Node name
    pub name: String,
    /// Device type
    pub node_type: String,
    /// Compute host the node runs on
    pub compute_id: String,
    /// Canvas x
    pub x: i32,
    /// Canvas y
    pub y: i32,
}

/// One side of a link request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkNode {
    /// Control-plane node id
    pub node_id: String,
    /// Adapter number
    pub adapter_number: u32,
    /// Port number
    pub port_number: u32,
}

/// Body for creating a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRequest {
    /// Link type, `ethernet` unless the definition says otherwise
    pub link_type: String,
    /// Created links are never suspended
    pub suspend: bool,
    /// Exactly two endpoints
    pub nodes: Vec<LinkNode>,
}

/// A created link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Control-plane link id
    pub link_id: String,
}

/// Operations the provisioning engine needs from the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List all projects.
    async fn list_projects(&self) -> Result<Vec<ProjectRecord>>;

    /// Create a project.
    async fn create_project(&self, name: &str) -> Result<ProjectRecord>;

    /// Open a project. Already-open is success.
    async fn open_project(&self, project_id: &str) -> Result<()>;

    /// List all templates.
    async fn list_templates(&self) -> Result<Vec<TemplateRecord>>;

    /// List disk images of the given type (e.g. `qemu`).
    async fn list_images(&self, image_type: &str) -> Result<Vec<ImageRecord>>;

    /// Create a guest template.
    async fn create_template(&self, template: &QemuTemplate) -> Result<TemplateRecord>;

    /// Instantiate a node from a template inside a project.
    async fn instantiate_template(
        &self,
        project_id: &str,
        template_id: &str,
        request: &InstantiateRequest,
    ) -> Result<NodeRecord>;

    /// Create a non-template device node inside a project.
    async fn create_node(&self, project_id: &str, request: &DeviceRequest) -> Result<NodeRecord>;

    /// Enumerate a project's nodes in control-plane order.
    async fn list_nodes(&self, project_id: &str) -> Result<Vec<NodeRecord>>;

    /// Start every node in a project with one bulk call.
    async fn start_all_nodes(&self, project_id: &str) -> Result<()>;

    /// Create a link inside a project.
    async fn create_link(&self, project_id: &str, request: &LinkRequest) -> Result<LinkRecord>;
}
