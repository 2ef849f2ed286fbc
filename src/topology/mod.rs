//! Topology definitions
//!
//! A [`Topology`] is a named, immutable graph of compute and device nodes
//! plus the links between them. Definitions are read from JSON in one of two
//! shapes, both normalized to the same model:
//!
//! ```text
//! simplified:  { nodes: [{id, name, type, image, ram, platform, x, y}],
//!                links: [{endpoints: ["N1", {node: "N2", adapter: 0, port: 1}]}] }
//!
//! export:      { topology: { nodes: [{node_id, name, node_type, properties: {...}}],
//!                            links: [{nodes: [{node_id, adapter_number, port_number}]}] } }
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cluster_testbed::topology::Topology;
//!
//! let topo = Topology::from_json("line", r#"{
//!     "nodes": [
//!         {"id": "N1", "type": "qemu", "image": "/images/arch3.qcow2"},
//!         {"id": "N2", "type": "qemu", "image": "/images/arch3.qcow2"}
//!     ],
//!     "links": [{"endpoints": ["N1", "N2"]}]
//! }"#)?;
//!
//! assert_eq!(topo.nodes().len(), 2);
//! assert_eq!(topo.links().len(), 1);
//! # Ok::<(), cluster_testbed::Error>(())
//! ```

mod raw;
mod store;

pub use store::{FileTopologySource, MemoryTopologySource, TopologySource};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Node type string the control plane uses for virtualized guests.
pub const COMPUTE_NODE_TYPE: &str = "qemu";

/// Default link resource type.
pub const DEFAULT_LINK_TYPE: &str = "ethernet";

/// Canvas position. Cosmetic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: i32,
    /// Vertical coordinate
    pub y: i32,
}

/// Resource request for a compute node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeSpec {
    /// Disk image path as declared in the definition
    pub image: String,
    /// Requested memory in MiB
    pub ram_mb: Option<u32>,
    /// Requested emulation platform (e.g. `x86_64`)
    pub platform: Option<String>,
}

impl ComputeSpec {
    /// Image file name (`/images/arch3.qcow2` → `arch3.qcow2`).
    #[must_use]
    pub fn image_file_name(&self) -> &str {
        Path::new(&self.image)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.image)
    }

    /// Image file stem (`/images/arch3.qcow2` → `arch3`).
    #[must_use]
    pub fn image_stem(&self) -> &str {
        Path::new(&self.image)
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.image)
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Virtualized guest instantiated from a template
    Compute(ComputeSpec),
    /// Network device created directly (switch, hub, ...)
    Device {
        /// Control-plane node type, e.g. `ethernet_switch`
        device_type: String,
    },
}

/// A node definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    key: String,
    name: Option<String>,
    kind: NodeKind,
    position: Position,
}

impl Node {
    /// Build a compute node.
    #[must_use]
    pub fn compute(key: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            kind: NodeKind::Compute(ComputeSpec {
                image: image.into(),
                ram_mb: None,
                platform: None,
            }),
            position: Position::default(),
        }
    }

    /// Build a device node. Devices always carry a display name.
    #[must_use]
    pub fn device(key: impl Into<String>, name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: Some(name.into()),
            kind: NodeKind::Device {
                device_type: device_type.into(),
            },
            position: Position::default(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the canvas position.
    #[must_use]
    pub const fn with_position(mut self, x: i32, y: i32) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Set memory and platform on a compute node. No-op for devices.
    #[must_use]
    pub fn with_resources(mut self, ram_mb: Option<u32>, platform: Option<String>) -> Self {
        if let NodeKind::Compute(spec) = &mut self.kind {
            spec.ram_mb = ram_mb;
            spec.platform = platform;
        }
        self
    }

    /// Topology-local key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Requested display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Node kind.
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Compute spec, for compute nodes.
    #[must_use]
    pub const fn compute_spec(&self) -> Option<&ComputeSpec> {
        match &self.kind {
            NodeKind::Compute(spec) => Some(spec),
            NodeKind::Device { .. } => None,
        }
    }

    /// Canvas position.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }
}

/// One side of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Node key or display name
    pub node: String,
    /// Adapter number on the node
    pub adapter: u32,
    /// Port number on the adapter
    pub port: u32,
}

impl Endpoint {
    /// Endpoint on adapter 0, port 0.
    #[must_use]
    pub fn new(node: impl Into<String>) -> Self {
        Self::at(node, 0, 0)
    }

    /// Endpoint on an explicit adapter/port.
    #[must_use]
    pub fn at(node: impl Into<String>, adapter: u32, port: u32) -> Self {
        Self {
            node: node.into(),
            adapter,
            port,
        }
    }
}

/// A link definition: exactly two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    endpoints: [Endpoint; 2],
    link_type: String,
}

impl Link {
    /// Ethernet link between two endpoints.
    #[must_use]
    pub fn new(a: Endpoint, b: Endpoint) -> Self {
        Self {
            endpoints: [a, b],
            link_type: DEFAULT_LINK_TYPE.to_string(),
        }
    }

    /// Override the link type.
    #[must_use]
    pub fn with_link_type(mut self, link_type: impl Into<String>) -> Self {
        self.link_type = link_type.into();
        self
    }

    /// Both endpoints.
    #[must_use]
    pub const fn endpoints(&self) -> &[Endpoint; 2] {
        &self.endpoints
    }

    /// Link resource type.
    #[must_use]
    pub fn link_type(&self) -> &str {
        &self.link_type
    }
}

/// A named topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    name: String,
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl Topology {
    /// Assemble a topology from already-built parts.
    #[must_use]
    pub fn new(name: impl Into<String>, nodes: Vec<Node>, links: Vec<Link>) -> Self {
        Self {
            name: name.into(),
            nodes,
            links,
        }
    }

    /// Parse and normalize a JSON definition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed JSON and
    /// [`crate::Error::InvalidInput`] when a node cannot be keyed.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(name, value)
    }

    /// Normalize an already-parsed JSON definition.
    ///
    /// # Errors
    ///
    /// See [`Topology::from_json`].
    pub fn from_value(name: impl Into<String>, value: serde_json::Value) -> Result<Self> {
        let (nodes, links) = raw::normalize(value)?;
        Ok(Self::new(name, nodes, links))
    }

    /// Topology name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Links in declaration order.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Compute nodes only.
    pub fn compute_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.compute_spec().is_some())
    }
}
