//! Placement service client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{Placement, PlacementRequest, PlacementResponse};
use crate::{Error, Result};

/// Forwards placement requests to `POST <base>/map`.
#[derive(Debug, Clone)]
pub struct HttpPlacement {
    client: Client,
    base_url: String,
}

impl HttpPlacement {
    /// Client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Placement for HttpPlacement {
    async fn place(&self, request: &PlacementRequest) -> Result<PlacementResponse> {
        let resp = self
            .client
            .post(format!("{}/map", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::InvalidInput(format!("placement rejected request: {body}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream("placement", format!("{status} {body}")));
        }

        resp.json()
            .await
            .map_err(|e| Error::upstream("placement", format!("undecodable response: {e}")))
    }
}
