//! REST API handlers.
//!
//! Receivers are read and written through the project's platform client;
//! redemption verifies the token (or resolves the key), checks the grant
//! has not been revoked, and runs the driver.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use hookgrid_platform::{PlatformClient, ResourceKind};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use crate::ApiState;
use crate::error::ApiError;
use crate::receivers::{self, Receiver, StoredGrant};

/// Header carrying the project id when it is not in the query.
pub const PROJECT_HEADER: &str = "x-api-project-id";

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct ProjectQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedeemQuery {
    pub token: Option<String>,
    pub key: Option<String>,
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

/// Body of `POST /v1-webhooks/receivers`.
#[derive(Debug, Deserialize)]
struct CreateReceiver {
    #[serde(default)]
    name: String,
    #[serde(default)]
    driver: String,
    /// Holds the `<driver>Config` field.
    #[serde(flatten)]
    rest: Map<String, Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn project_id(query: ProjectQuery, headers: &HeaderMap) -> ApiResult<String> {
    non_empty(query.project_id)
        .or_else(|| {
            headers
                .get(PROJECT_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("project id not provided"))
}

/// Scheme and host the request reached us on.
fn base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|p| !p.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

/// Optional JSON payload of a redemption.
fn parse_body(body: &Bytes) -> ApiResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
}

fn client_for(state: &ApiState, project_id: &str) -> ApiResult<Arc<dyn PlatformClient>> {
    Ok(state.platforms.client(project_id)?)
}

// ── Receivers ──────────────────────────────────────────────────

/// POST /v1-webhooks/receivers
pub async fn create_receiver(
    State(state): State<ApiState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let json_body = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !json_body {
        return Err(ApiError::bad_request(
            "Content-Type must be supplied as header. Only application/json is supported",
        ));
    }
    let project_id = project_id(query, &headers)?;

    let mut request: CreateReceiver = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("bad request body: {e}")))?;
    if request.name.is_empty() {
        return Err(ApiError::bad_request("name not provided"));
    }
    if request.driver.is_empty() {
        return Err(ApiError::bad_request("driver not provided"));
    }

    let driver = state.registry.lookup(&request.driver)?;
    let raw_config = request
        .rest
        .remove(&format!("{}Config", driver.id()))
        .unwrap_or(Value::Null);
    let config = driver.bind_config(raw_config)?;

    let client = client_for(&state, &project_id)?;
    if receivers::name_in_use(client.as_ref(), &request.name).await? {
        return Err(ApiError::bad_request(format!(
            "webhook name {} is already in use",
            request.name
        )));
    }
    driver.validate_payload(&config, client.as_ref()).await?;

    let config = config.to_value()?;
    let issued = state.codec.issue(driver.id(), &project_id, &config)?;
    let url = format!(
        "{}/v1-webhooks/endpoint?token={}",
        base_url(&headers),
        issued.token
    );

    let object = receivers::save(
        client.as_ref(),
        &request.name,
        &issued.nonce,
        &url,
        driver.id(),
        &config,
    )
    .await?;

    info!(
        project = %project_id,
        driver = driver.id(),
        name = %request.name,
        id = %object.id,
        "issued webhook"
    );
    Ok((StatusCode::CREATED, Json(Receiver::from_object(&object))).into_response())
}

/// GET /v1-webhooks/receivers
pub async fn list_receivers(
    State(state): State<ApiState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project_id = project_id(query, &headers)?;
    let client = client_for(&state, &project_id)?;

    let data: Vec<Receiver> = receivers::list(client.as_ref())
        .await?
        .iter()
        .map(Receiver::from_object)
        .collect();
    Ok(Json(json!({
        "type": "collection",
        "resourceType": "receiver",
        "data": data,
    }))
    .into_response())
}

/// GET /v1-webhooks/receivers/{id}
pub async fn get_receiver(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project_id = project_id(query, &headers)?;
    let client = client_for(&state, &project_id)?;

    match receivers::get(client.as_ref(), &id).await? {
        Some(object) => Ok(Json(Receiver::from_object(&object)).into_response()),
        None => Err(ApiError::not_found(format!("webhook {id} not found"))),
    }
}

/// DELETE /v1-webhooks/receivers/{id}
pub async fn delete_receiver(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let project_id = project_id(query, &headers)?;
    let client = client_for(&state, &project_id)?;

    if receivers::get(client.as_ref(), &id).await?.is_none() {
        return Err(ApiError::not_found(format!("webhook {id} not found")));
    }
    client
        .delete(ResourceKind::GenericObject, &id)
        .await?;

    info!(project = %project_id, id = %id, "revoked webhook");
    Ok(StatusCode::NO_CONTENT)
}

// ── Redemption ─────────────────────────────────────────────────

/// POST /v1-webhooks/endpoint
pub async fn redeem(
    State(state): State<ApiState>,
    Query(query): Query<RedeemQuery>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let body = parse_body(&body)?;

    if let Some(token) = non_empty(query.token) {
        redeem_token(&state, &token, body).await?;
        return Ok(StatusCode::OK);
    }

    let key = non_empty(query.key).ok_or_else(|| {
        ApiError::bad_request("invalid execute url, should have 'token' or 'key'")
    })?;
    let project_id = non_empty(query.project_id)
        .ok_or_else(|| ApiError::bad_request("invalid execute url, url must contain projectId"))?;
    redeem_key(&state, &key, &project_id, body).await?;
    Ok(StatusCode::OK)
}

async fn redeem_token(state: &ApiState, token: &str, body: Option<Value>) -> ApiResult<()> {
    let grant = state.codec.verify(token)?;
    let driver = state.registry.lookup(&grant.driver)?;
    let client = client_for(state, &grant.project_id)?;

    if receivers::find_by_key(client.as_ref(), &grant.nonce)
        .await?
        .is_none()
    {
        return Err(ApiError::forbidden("requested webhook has been revoked"));
    }

    let config = driver.bind_config(grant.config)?;
    driver.execute(&config, client, body).await?;
    info!(project = %grant.project_id, driver = driver.id(), "executed webhook");
    Ok(())
}

async fn redeem_key(
    state: &ApiState,
    key: &str,
    project_id: &str,
    body: Option<Value>,
) -> ApiResult<()> {
    let client = client_for(state, project_id)?;
    let object = receivers::find_by_key(client.as_ref(), key)
        .await?
        .ok_or_else(|| {
            ApiError::forbidden("requested webhook has been revoked/does not exist for this project")
        })?;
    let StoredGrant { driver, config } = StoredGrant::from_object(&object)
        .ok_or_else(|| ApiError::bad_request("stored webhook has no driver configuration"))?;
    debug!(id = %object.id, %driver, "resolved webhook by key");

    let driver = state.registry.lookup(&driver)?;
    let config = driver.bind_config(config)?;
    driver.execute(&config, client, body).await?;
    info!(project = %project_id, driver = driver.id(), "executed webhook");
    Ok(())
}

// ── Discovery ──────────────────────────────────────────────────

/// GET /v1-webhooks/schemas
pub async fn list_schemas(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "type": "collection",
        "resourceType": "schema",
        "data": state.registry.schemas(),
    }))
}

/// GET /version
pub async fn version() -> impl IntoResponse {
    Json(json!({
        "type": "apiVersion",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "receivers": "/v1-webhooks/receivers",
            "schemas": "/v1-webhooks/schemas",
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn project_id_prefers_query_then_header() {
        let mut headers = HeaderMap::new();
        headers.insert(PROJECT_HEADER, HeaderValue::from_static("1a7"));

        let from_query = project_id(
            ProjectQuery {
                project_id: Some("1a5".into()),
            },
            &headers,
        );
        assert_eq!(from_query.unwrap(), "1a5");
        assert_eq!(project_id(ProjectQuery::default(), &headers).unwrap(), "1a7");

        let err = project_id(ProjectQuery::default(), &HeaderMap::new()).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn base_url_honours_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("hooks.example.com"));
        assert_eq!(base_url(&headers), "http://hooks.example.com");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(base_url(&headers), "https://hooks.example.com");
    }

    #[test]
    fn empty_body_is_no_payload() {
        assert_eq!(parse_body(&Bytes::new()).unwrap(), None);
        assert_eq!(parse_body(&Bytes::from_static(b"  \n")).unwrap(), None);
        assert_eq!(
            parse_body(&Bytes::from_static(b"{\"a\":1}")).unwrap(),
            Some(json!({"a": 1}))
        );
        assert_eq!(
            parse_body(&Bytes::from_static(b"{nope")).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn version_reports_crate_version() {
        let resp = version().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
