//! HTTP implementation of [`PlatformClient`] over the platform REST API.
//!
//! Every project gets its own base URL, `{url}/projects/{project_id}`.
//! Collections live under `/{collection}`, records under
//! `/{collection}/{id}`, and actions are `POST ...?action={name}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::client::{PlatformClient, PlatformFactory};
use crate::error::{PlatformError, PlatformResult};
use crate::types::{Collection, ListOpts, ResourceKind};

/// Default per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// API key pair used for basic auth against the platform.
#[derive(Clone, Default)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct RawCollection {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    pagination: Option<RawPagination>,
}

#[derive(Deserialize)]
struct RawPagination {
    #[serde(default)]
    next: Option<String>,
}

/// Project-scoped REST client.
#[derive(Clone)]
pub struct HttpPlatform {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<Credentials>,
}

impl HttpPlatform {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<Credentials>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}/{}", self.base_url, kind.collection())
    }

    fn record_url(&self, kind: ResourceKind, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.collection(), id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).basic_auth(
            &self.credentials.access_key,
            Some(&self.credentials.secret_key),
        )
    }

    /// Send a request, mapping non-2xx responses to `PlatformError::Status`.
    async fn send(&self, req: RequestBuilder) -> PlatformResult<Option<Value>> {
        let resp = req
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let status = resp.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PlatformError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn send_expecting_body(&self, req: RequestBuilder) -> PlatformResult<Value> {
        Ok(self.send(req).await?.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PlatformClient for HttpPlatform {
    async fn get_by_id(&self, kind: ResourceKind, id: &str) -> PlatformResult<Option<Value>> {
        let url = self.record_url(kind, id);
        debug!(%url, "platform get");
        match self.send(self.request(Method::GET, &url)).await {
            Err(PlatformError::Status { code: 404, .. }) => Ok(None),
            other => other,
        }
    }

    async fn list(&self, kind: ResourceKind, opts: &ListOpts) -> PlatformResult<Collection> {
        // A marker is the absolute `next` link handed out by the platform.
        let req = match &opts.marker {
            Some(next) => self.request(Method::GET, next),
            None => self
                .request(Method::GET, &self.collection_url(kind))
                .query(&opts.filters),
        };
        debug!(kind = kind.collection(), marker = ?opts.marker, "platform list");

        let raw = match self.send(req).await? {
            Some(body) => serde_json::from_value::<RawCollection>(body)
                .map_err(|e| PlatformError::Decode(e.to_string()))?,
            None => return Ok(Collection::default()),
        };
        Ok(Collection {
            data: raw.data,
            next: raw.pagination.and_then(|p| p.next),
        })
    }

    async fn create(&self, kind: ResourceKind, body: &Value) -> PlatformResult<Value> {
        let url = self.collection_url(kind);
        debug!(%url, "platform create");
        self.send_expecting_body(self.request(Method::POST, &url).json(body))
            .await
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: &Value) -> PlatformResult<Value> {
        let url = self.record_url(kind, id);
        debug!(%url, "platform update");
        self.send_expecting_body(self.request(Method::PUT, &url).json(body))
            .await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> PlatformResult<()> {
        let url = self.record_url(kind, id);
        debug!(%url, "platform delete");
        self.send(self.request(Method::DELETE, &url)).await?;
        Ok(())
    }

    async fn action(
        &self,
        kind: ResourceKind,
        id: &str,
        action: &str,
        body: &Value,
    ) -> PlatformResult<Value> {
        let url = self.record_url(kind, id);
        debug!(%url, %action, "platform action");
        self.send_expecting_body(
            self.request(Method::POST, &url)
                .query(&[("action", action)])
                .json(body),
        )
        .await
    }
}

/// Builds [`HttpPlatform`] clients that share one connection pool.
#[derive(Clone)]
pub struct HttpPlatformFactory {
    http: reqwest::Client,
    url: String,
    credentials: Arc<Credentials>,
}

impl HttpPlatformFactory {
    pub fn new(url: &str, credentials: Credentials) -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            credentials: Arc::new(credentials),
        })
    }

    /// Base URL for a project's resources.
    pub fn project_url(&self, project_id: &str) -> String {
        format!("{}/projects/{}", self.url, project_id)
    }
}

impl PlatformFactory for HttpPlatformFactory {
    fn client(&self, project_id: &str) -> PlatformResult<Arc<dyn PlatformClient>> {
        Ok(Arc::new(HttpPlatform::new(
            self.http.clone(),
            self.project_url(project_id),
            Arc::clone(&self.credentials),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> HttpPlatformFactory {
        HttpPlatformFactory::new(
            "http://platform:8080/v2-beta/",
            Credentials {
                access_key: "ak".to_string(),
                secret_key: "sk".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn project_urls_are_scoped() {
        assert_eq!(
            factory().project_url("1a5"),
            "http://platform:8080/v2-beta/projects/1a5"
        );
    }

    #[test]
    fn record_and_collection_urls() {
        let client = HttpPlatform::new(
            reqwest::Client::new(),
            "http://platform/v2-beta/projects/1a5/",
            Arc::new(Credentials::default()),
        );
        assert_eq!(
            client.collection_url(ResourceKind::GenericObject),
            "http://platform/v2-beta/projects/1a5/genericobjects"
        );
        assert_eq!(
            client.record_url(ResourceKind::Host, "1h3"),
            "http://platform/v2-beta/projects/1a5/hosts/1h3"
        );
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials {
            access_key: "ak".to_string(),
            secret_key: "hunter2".to_string(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
