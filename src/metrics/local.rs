//! In-process timer store.

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::Metrics;
use crate::{Error, Result};

/// Timers keyed by UUID v4 tokens.
#[derive(Debug, Default)]
pub struct LocalMetrics {
    active: DashMap<String, (u64, Instant)>,
    done: DashMap<String, f64>,
}

impl LocalMetrics {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers started but not finished.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[async_trait]
impl Metrics for LocalMetrics {
    async fn start(&self, experiment_id: u64) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        self.active.insert(token.clone(), (experiment_id, Instant::now()));
        tracing::debug!(experiment_id, token = %token, "timer started");
        Ok(token)
    }

    async fn finish(&self, token: &str) -> Result<f64> {
        let (_, (experiment_id, started)) = self
            .active
            .remove(token)
            .ok_or_else(|| Error::NotFound(format!("metrics token {token}")))?;
        let elapsed = started.elapsed().as_secs_f64();
        self.done.insert(token.to_string(), elapsed);
        tracing::debug!(experiment_id, elapsed, "timer finished");
        Ok(elapsed)
    }

    async fn elapsed(&self, token: &str) -> Result<f64> {
        self.done
            .get(token)
            .map(|v| *v.value())
            .ok_or_else(|| Error::NotFound(format!("metrics for token {token}")))
    }
}
