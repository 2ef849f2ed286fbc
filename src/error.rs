//! Error types for the cluster testbed
//!
//! Structural calls (project/template/node/link/start, placement, metrics)
//! fail fast with one of these variants. Console bring-up failures are the
//! only ones swallowed, see [`crate::provision`].

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Cluster testbed error types
#[derive(Error, Debug)]
pub enum Error {
    /// Topology, project, template, experiment or metric token absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown strategy, insufficient hosts, malformed definition
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Collaborator unreachable or answered with a non-2xx status
    #[error("{service} unavailable: {detail}")]
    UpstreamUnavailable {
        /// Which collaborator failed (control plane, placement, metrics, ...)
        service: String,
        /// Transport error or response status/body
        detail: String,
    },

    /// Console bring-up failed for a single node
    #[error("Console configuration failed on {node}: {detail}")]
    PartialConfiguration {
        /// Node display name
        node: String,
        /// What went wrong on the console session
        detail: String,
    },

    /// Node key declared twice, or a display name shared by several nodes
    #[error("Ambiguous node identifier: {0}")]
    AmbiguousIdentifier(String),

    /// A pipeline stage failed; remaining stages were skipped
    #[error("Stage {stage} failed: {source}")]
    Pipeline {
        /// Stage name (`provisioning`, `placing`, ...)
        stage: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Connect or login on a console/remote session took too long
    #[error("Timed out: {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::UpstreamUnavailable`].
    pub fn upstream(service: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            detail: detail.into(),
        }
    }

    /// Wrap `self` as the failure of a named pipeline stage.
    #[must_use]
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through pipeline wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stable snake-case label used in structured error payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::PartialConfiguration { .. } => "partial_configuration",
            Self::AmbiguousIdentifier(_) => "ambiguous_identifier",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Pipeline { .. } | Self::Other(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .map_or_else(|| "upstream".to_string(), |url| url.origin().ascii_serialization());
        Self::upstream(service, err.to_string())
    }
}
