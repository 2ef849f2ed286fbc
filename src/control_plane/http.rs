//! reqwest-backed [`ControlPlane`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    ControlPlane, DeviceRequest, ImageRecord, InstantiateRequest, LinkRecord, LinkRequest,
    NodeRecord, ProjectRecord, QemuTemplate, TemplateRecord,
};
use crate::{Error, Result};

const SERVICE: &str = "control plane";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Control-plane client speaking the v3 REST API with a bearer token.
///
/// Cheap to clone; clones share the underlying connection pool and token.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpControlPlane {
    /// Client using a pre-issued token (or none, for unauthenticated servers).
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Log in with username/password and keep the issued access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamUnavailable`] if the server is unreachable or
    /// rejects the credentials.
    pub async fn login(base_url: impl Into<String>, username: &str, password: &str) -> Result<Self> {
        let mut this = Self::new(base_url, None);
        let resp = this
            .client
            .post(this.url("/v3/access/users/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let login: LoginResponse = decode(resp, "login").await?;
        tracing::info!(base_url = %this.base_url, "authenticated against control plane");
        this.token = Some(login.access_token);
        Ok(this)
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let resp = self.authed(self.client.get(self.url(path))).send().await?;
        decode(resp, what).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, what: &str) -> Result<T>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .authed(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        decode(resp, what).await
    }
}

async fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::upstream(SERVICE, format!("{what}: {status} {body}")))
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
    let resp = ensure_success(resp, what).await?;
    resp.json::<T>()
        .await
        .map_err(|e| Error::upstream(SERVICE, format!("{what}: undecodable response: {e}")))
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        self.get_json("/v3/projects", "list projects").await
    }

    async fn create_project(&self, name: &str) -> Result<ProjectRecord> {
        self.post_json("/v3/projects", &serde_json::json!({ "name": name }), "create project")
            .await
    }

    async fn open_project(&self, project_id: &str) -> Result<()> {
        let resp = self
            .authed(
                self.client
                    .post(self.url(&format!("/v3/projects/{project_id}/open"))),
            )
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            tracing::debug!(project_id, "project already open");
            return Ok(());
        }
        ensure_success(resp, "open project").await?;
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        self.get_json("/v3/templates", "list templates").await
    }

    async fn list_images(&self, image_type: &str) -> Result<Vec<ImageRecord>> {
        let resp = self
            .authed(self.client.get(self.url("/v3/images")))
            .query(&[("image_type", image_type)])
            .send()
            .await?;
        decode(resp, "list images").await
    }

    async fn create_template(&self, template: &QemuTemplate) -> Result<TemplateRecord> {
        self.post_json("/v3/templates", template, "create template").await
    }

    async fn instantiate_template(
        &self,
        project_id: &str,
        template_id: &str,
        request: &InstantiateRequest,
    ) -> Result<NodeRecord> {
        self.post_json(
            &format!("/v3/projects/{project_id}/templates/{template_id}"),
            request,
            "instantiate template",
        )
        .await
    }

    async fn create_node(&self, project_id: &str, request: &DeviceRequest) -> Result<NodeRecord> {
        self.post_json(&format!("/v3/projects/{project_id}/nodes"), request, "create node")
            .await
    }

    async fn list_nodes(&self, project_id: &str) -> Result<Vec<NodeRecord>> {
        self.get_json(&format!("/v3/projects/{project_id}/nodes"), "list nodes")
            .await
    }

    async fn start_all_nodes(&self, project_id: &str) -> Result<()> {
        let resp = self
            .authed(
                self.client
                    .post(self.url(&format!("/v3/projects/{project_id}/nodes/start"))),
            )
            .send()
            .await?;
        ensure_success(resp, "start nodes").await?;
        Ok(())
    }

    async fn create_link(&self, project_id: &str, request: &LinkRequest) -> Result<LinkRecord> {
        self.post_json(&format!("/v3/projects/{project_id}/links"), request, "create link")
            .await
    }
}
