//! Metrics contract
//!
//! Wall-clock timing of a workload run: `start` hands out a token, `finish`
//! turns it into elapsed seconds. [`LocalMetrics`] keeps the timers in
//! process; [`HttpMetrics`] talks to a metrics collector service.

mod http;
mod local;

pub use http::HttpMetrics;
pub use local::LocalMetrics;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Body of `POST /start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Experiment being timed
    pub exp_id: u64,
}

/// Response of `POST /start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    /// Opaque timer token
    pub token: String,
}

/// Body of `POST /finish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRequest {
    /// Token from `start`
    pub token: String,
}

/// Response of `POST /finish` and `GET /metrics/{token}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElapsedResponse {
    /// Elapsed seconds
    pub exec_time: f64,
}

/// Timer store.
#[async_trait]
pub trait Metrics: Send + Sync {
    /// Start a timer for `experiment_id`.
    async fn start(&self, experiment_id: u64) -> Result<String>;

    /// Stop the timer and return elapsed seconds.
    ///
    /// An unknown (or already finished) token is
    /// [`Error::NotFound`](crate::Error::NotFound).
    async fn finish(&self, token: &str) -> Result<f64>;

    /// Elapsed seconds recorded for a finished token.
    async fn elapsed(&self, token: &str) -> Result<f64>;
}
