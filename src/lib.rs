//! # cluster-testbed: virtual cluster experiments on a network emulator
//!
//! Provisions a named cluster topology inside a network-emulation control
//! plane, maps a parallel workload onto the provisioned guests, pushes the
//! run artifacts, launches the workload and times it, while streaming
//! status lines to any attached observer.
//!
//! ```text
//! provision ─> place ─> distribute ─> execute ─> collect
//!  (control     (rank→    (rankfile,    (master =   (elapsed,
//!   plane +      host)     hostfile)     hosts[0])   stdout)
//!   consoles)
//! ```
//!
//! ## Design Principles
//!
//! - **Create-or-reuse**: provisioning the same topology twice reuses its
//!   project and templates
//! - **Fail fast on structure, fail soft on guests**: any control-plane
//!   error aborts a run; a guest whose console cannot be configured is only
//!   left unaddressed
//! - **Seams are traits**: every collaborator (control plane, console, ssh,
//!   placement, metrics, experiment store) is injected
//!
//! ## Example Usage
//!
//! ```rust
//! use cluster_testbed::placement::{LocalPlacement, PlacementRequest};
//! use cluster_testbed::topology::Topology;
//!
//! let topology = Topology::from_json(
//!     "pair",
//!     r#"{"nodes": [{"id": "a", "image": "/images/arch.qcow2"},
//!                   {"id": "b", "image": "/images/arch.qcow2"}],
//!         "links": [{"endpoints": ["a", "b"]}]}"#,
//! )?;
//! assert_eq!(topology.compute_nodes().count(), 2);
//!
//! let hosts = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
//! let placed = LocalPlacement::compute(&PlacementRequest::new(hosts, "ordered"))?;
//! assert_eq!(placed.hostfile, "10.0.0.1\n10.0.0.2");
//! # Ok::<(), cluster_testbed::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod broadcast;
pub mod config;
pub mod console;
pub mod control_plane;
pub mod distribute;
pub mod error;
pub mod experiment;
pub mod metrics;
pub mod pipeline;
pub mod placement;
pub mod provision;
pub mod remote;
pub mod server;
pub mod topology;

pub use error::{Error, Result};
