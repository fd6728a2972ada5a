//! The platform client contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PlatformResult;
use crate::types::{Collection, ListOpts, ResourceKind};

/// A tenant-scoped handle on the orchestration platform.
///
/// Every method addresses a resource kind; bodies and results are raw JSON
/// records. Transport, auth, and retry behaviour belong to the
/// implementation.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch a record, `None` if it does not exist.
    async fn get_by_id(&self, kind: ResourceKind, id: &str) -> PlatformResult<Option<Value>>;

    /// List one page of records.
    async fn list(&self, kind: ResourceKind, opts: &ListOpts) -> PlatformResult<Collection>;

    async fn create(&self, kind: ResourceKind, body: &Value) -> PlatformResult<Value>;

    async fn update(&self, kind: ResourceKind, id: &str, body: &Value) -> PlatformResult<Value>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> PlatformResult<()>;

    /// Invoke a named action on a record (e.g. `upgrade`, `finishupgrade`).
    async fn action(
        &self,
        kind: ResourceKind,
        id: &str,
        action: &str,
        body: &Value,
    ) -> PlatformResult<Value>;
}

/// Builds a [`PlatformClient`] scoped to one project.
pub trait PlatformFactory: Send + Sync {
    fn client(&self, project_id: &str) -> PlatformResult<Arc<dyn PlatformClient>>;
}
