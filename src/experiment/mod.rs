//! Experiment records
//!
//! An experiment is one pass of the pipeline over a named topology:
//!
//! ```text
//! starting ─> provisioning ─> placing ─> distributing ─> executing ─> collecting ─> completed
//!     └────────────┴─────────────┴────────────┴──────────────┴─────────────┴──────> failed
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cluster_testbed::experiment::{ExperimentRecord, ExperimentRequest, ExperimentStatus};
//!
//! let mut record = ExperimentRecord::new(0, ExperimentRequest::new("ring").strategy("random"));
//! record.advance(ExperimentStatus::Provisioning).unwrap();
//! record.advance(ExperimentStatus::Failed).unwrap();
//! assert!(record.status().is_terminal());
//! assert!(record.result().is_none());
//! ```

mod record;
mod store;

pub use record::{
    ExperimentRecord, ExperimentRequest, ExperimentResult, ExperimentStatus, DEFAULT_STRATEGY,
    DEFAULT_TASK_TOPOLOGY,
};
pub use store::{ExperimentStore, MemoryExperimentStore};
