//! Metrics collector client.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{ElapsedResponse, FinishRequest, Metrics, StartRequest, StartResponse};
use crate::{Error, Result};

const SERVICE: &str = "metrics";

/// Client for a metrics collector (`/start`, `/finish`, `/metrics/{token}`).
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    client: Client,
    base_url: String,
}

impl HttpMetrics {
    /// Client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn decode<T: DeserializeOwned>(resp: Response, token: Option<&str>) -> Result<T> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(token) = token {
                return Err(Error::NotFound(format!("metrics token {token}")));
            }
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(SERVICE, format!("{status} {body}")));
        }
        resp.json()
            .await
            .map_err(|e| Error::upstream(SERVICE, format!("undecodable response: {e}")))
    }
}

#[async_trait]
impl Metrics for HttpMetrics {
    async fn start(&self, experiment_id: u64) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/start", self.base_url))
            .json(&StartRequest { exp_id: experiment_id })
            .send()
            .await?;
        let body: StartResponse = Self::decode(resp, None).await?;
        Ok(body.token)
    }

    async fn finish(&self, token: &str) -> Result<f64> {
        let resp = self
            .client
            .post(format!("{}/finish", self.base_url))
            .json(&FinishRequest {
                token: token.to_string(),
            })
            .send()
            .await?;
        let body: ElapsedResponse = Self::decode(resp, Some(token)).await?;
        Ok(body.exec_time)
    }

    async fn elapsed(&self, token: &str) -> Result<f64> {
        let resp = self
            .client
            .get(format!("{}/metrics/{token}", self.base_url))
            .send()
            .await?;
        let body: ElapsedResponse = Self::decode(resp, Some(token)).await?;
        Ok(body.exec_time)
    }
}
