//! hookgrid-api — REST API for HookGrid.
//!
//! Issues webhook capability tokens, manages the issued receivers of a
//! project, and redeems tokens by running the bound driver.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/v1-webhooks/receivers` | Issue a webhook |
//! | GET | `/v1-webhooks/receivers` | List a project's webhooks |
//! | GET | `/v1-webhooks/receivers/{id}` | Get one webhook |
//! | DELETE | `/v1-webhooks/receivers/{id}` | Revoke a webhook |
//! | POST | `/v1-webhooks/endpoint` | Redeem `?token=` or `?key=&projectId=` |
//! | GET | `/v1-webhooks/schemas` | Driver configuration schemas |
//! | GET | `/version` | API version |
//!
//! Receiver routes take the project from `?projectId=` or the
//! `X-API-Project-Id` header.

pub mod error;
pub mod handlers;
pub mod receivers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use hookgrid_drivers::DriverRegistry;
use hookgrid_platform::PlatformFactory;
use hookgrid_token::TokenCodec;

pub use error::ApiError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<DriverRegistry>,
    pub codec: Arc<TokenCodec>,
    pub platforms: Arc<dyn PlatformFactory>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let webhook_routes = Router::new()
        .route(
            "/receivers",
            get(handlers::list_receivers).post(handlers::create_receiver),
        )
        .route(
            "/receivers/{id}",
            get(handlers::get_receiver).delete(handlers::delete_receiver),
        )
        .route("/endpoint", post(handlers::redeem))
        .route("/schemas", get(handlers::list_schemas));

    Router::new()
        .nest("/v1-webhooks", webhook_routes)
        .route("/version", get(handlers::version))
        .with_state(state)
}
