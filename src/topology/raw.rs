//! On-disk definition shapes and their normalization into [`super::Topology`].

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use super::{Endpoint, Link, Node, NodeKind, Position, COMPUTE_NODE_TYPE};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct SimplifiedDefinition {
    #[serde(default)]
    nodes: Vec<SimplifiedNode>,
    #[serde(default)]
    links: Vec<SimplifiedLink>,
}

#[derive(Debug, Deserialize)]
struct SimplifiedNode {
    id: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    node_type: Option<String>,
    image: Option<String>,
    ram: Option<u32>,
    platform: Option<String>,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

#[derive(Debug, Deserialize)]
struct SimplifiedLink {
    #[serde(default)]
    endpoints: Vec<EndpointSpec>,
    link_type: Option<String>,
}

/// Bare node reference or explicit adapter/port object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EndpointSpec {
    Key(String),
    Detailed(DetailedEndpoint),
}

#[derive(Debug, Deserialize)]
struct DetailedEndpoint {
    node: Option<String>,
    name: Option<String>,
    id: Option<String>,
    node_id: Option<String>,
    adapter: Option<u32>,
    adapter_number: Option<u32>,
    port: Option<u32>,
    port_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ExportDefinition {
    topology: ExportTopology,
}

#[derive(Debug, Default, Deserialize)]
struct ExportTopology {
    #[serde(default)]
    nodes: Vec<ExportNode>,
    #[serde(default)]
    links: Vec<ExportLink>,
}

#[derive(Debug, Deserialize)]
struct ExportNode {
    node_id: Option<String>,
    name: Option<String>,
    node_type: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    properties: ExportProperties,
    image: Option<String>,
    ram: Option<u32>,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

#[derive(Debug, Default, Deserialize)]
struct ExportProperties {
    hda_disk_image: Option<String>,
    ram: Option<u32>,
    platform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportLink {
    #[serde(default)]
    nodes: Vec<DetailedEndpoint>,
    link_type: Option<String>,
}

/// RAM assumed for export-format guests that declare none.
const EXPORT_DEFAULT_RAM_MB: u32 = 512;

pub(super) fn normalize(value: serde_json::Value) -> Result<(Vec<Node>, Vec<Link>)> {
    let (mut nodes, links) = if value.get("topology").is_some() {
        let def: ExportDefinition = serde_json::from_value(value)?;
        normalize_export(def.topology)?
    } else {
        let def: SimplifiedDefinition = serde_json::from_value(value)?;
        normalize_simplified(def)?
    };
    assign_image_keys(&mut nodes);
    Ok((nodes, links))
}

/// Key unkeyed guests by image stem. A stem shared by several guests, or
/// already taken by a declared key, becomes `<stem>#<n>`.
fn assign_image_keys(nodes: &mut [Node]) {
    let mut taken: HashSet<String> = nodes
        .iter()
        .filter(|n| !n.key.is_empty())
        .map(|n| n.key.clone())
        .collect();
    let mut per_stem: HashMap<String, usize> = HashMap::new();
    for node in nodes.iter().filter(|n| n.key.is_empty()) {
        if let Some(spec) = node.compute_spec() {
            *per_stem.entry(spec.image_stem().to_string()).or_default() += 1;
        }
    }

    let mut next: HashMap<String, usize> = HashMap::new();
    for node in nodes.iter_mut().filter(|n| n.key.is_empty()) {
        let Some(stem) = node.compute_spec().map(|s| s.image_stem().to_string()) else {
            continue;
        };
        let key = if per_stem.get(&stem) == Some(&1) && !taken.contains(&stem) {
            stem
        } else {
            let counter = next.entry(stem.clone()).or_default();
            loop {
                *counter += 1;
                let candidate = format!("{stem}#{counter}");
                if !taken.contains(&candidate) {
                    break candidate;
                }
            }
        };
        taken.insert(key.clone());
        node.key = key;
    }
}

fn normalize_simplified(def: SimplifiedDefinition) -> Result<(Vec<Node>, Vec<Link>)> {
    let nodes = def
        .nodes
        .into_iter()
        .map(|n| {
            let node_type = n.kind.or(n.node_type);
            build_node(NodeParts {
                key: n.id,
                name: n.name,
                node_type,
                image: n.image,
                ram_mb: n.ram,
                platform: n.platform,
                position: Position { x: n.x, y: n.y },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let links = def
        .links
        .into_iter()
        .filter_map(|l| {
            let endpoints = l.endpoints.into_iter().map(EndpointSpec::into_endpoint).collect();
            build_link(endpoints, l.link_type)
        })
        .collect();

    Ok((nodes, links))
}

fn normalize_export(topo: ExportTopology) -> Result<(Vec<Node>, Vec<Link>)> {
    let nodes = topo
        .nodes
        .into_iter()
        .map(|n| {
            let node_type = n.node_type.or(n.kind);
            let is_compute = node_type.as_deref().map_or(true, |t| t == COMPUTE_NODE_TYPE);
            let ram_mb = is_compute.then(|| n.properties.ram.or(n.ram).unwrap_or(EXPORT_DEFAULT_RAM_MB));
            build_node(NodeParts {
                key: n.node_id.or_else(|| n.name.clone()),
                name: n.name,
                node_type,
                image: n.properties.hda_disk_image.or(n.image),
                ram_mb,
                platform: n.properties.platform,
                position: Position { x: n.x, y: n.y },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let links = topo
        .links
        .into_iter()
        .filter_map(|l| {
            let endpoints = l.nodes.into_iter().map(DetailedEndpoint::into_endpoint).collect();
            build_link(endpoints, l.link_type)
        })
        .collect();

    Ok((nodes, links))
}

struct NodeParts {
    key: Option<String>,
    name: Option<String>,
    node_type: Option<String>,
    image: Option<String>,
    ram_mb: Option<u32>,
    platform: Option<String>,
    position: Position,
}

fn build_node(parts: NodeParts) -> Result<Node> {
    let node_type = parts.node_type.unwrap_or_else(|| COMPUTE_NODE_TYPE.to_string());

    let node = if node_type == COMPUTE_NODE_TYPE {
        let image = parts.image.unwrap_or_default();
        if image.is_empty() {
            return Err(Error::InvalidInput(format!(
                "compute node {:?} declares no image",
                parts.key.or(parts.name).unwrap_or_default()
            )));
        }
        // Left empty for unnamed, unkeyed guests until `assign_image_keys`.
        let key = parts.key.or_else(|| parts.name.clone()).unwrap_or_default();
        let mut node = Node::compute(key, image).with_resources(parts.ram_mb, parts.platform);
        node.name = parts.name;
        node
    } else {
        let name = parts.name.ok_or_else(|| {
            Error::InvalidInput(format!(
                "device node {:?} of type {node_type} has no name",
                parts.key.clone().unwrap_or_default()
            ))
        })?;
        let key = parts.key.unwrap_or_else(|| name.clone());
        Node {
            key,
            name: Some(name),
            kind: NodeKind::Device { device_type: node_type },
            position: Position::default(),
        }
    };

    Ok(node.with_position(parts.position.x, parts.position.y))
}

/// Links need two resolvable-looking endpoints; extras beyond two are ignored.
/// An unreadable first or second endpoint drops the link.
fn build_link(endpoints: Vec<Option<Endpoint>>, link_type: Option<String>) -> Option<Link> {
    let mut endpoints = endpoints.into_iter();
    let a = endpoints.next().flatten()?;
    let b = endpoints.next().flatten()?;
    let link = Link::new(a, b);
    Some(match link_type {
        Some(t) => link.with_link_type(t),
        None => link,
    })
}

impl EndpointSpec {
    fn into_endpoint(self) -> Option<Endpoint> {
        match self {
            Self::Key(key) => Some(Endpoint::new(key)),
            Self::Detailed(d) => d.into_endpoint(),
        }
    }
}

impl DetailedEndpoint {
    fn into_endpoint(self) -> Option<Endpoint> {
        let node = self.node.or(self.name).or(self.id).or(self.node_id)?;
        Some(Endpoint::at(
            node,
            self.adapter.or(self.adapter_number).unwrap_or(0),
            self.port.or(self.port_number).unwrap_or(0),
        ))
    }
}
