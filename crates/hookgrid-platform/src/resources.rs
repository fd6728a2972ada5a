//! Typed helpers over [`PlatformClient`].
//!
//! These decode raw records into the structs from [`crate::types`] and
//! wrap the multi-call sequences drivers need (full pagination, host
//! evacuation, upgrade actions).

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::PlatformClient;
use crate::error::{PlatformError, PlatformResult};
use crate::types::*;

/// Decode a raw record into a typed view.
pub fn decode<T: DeserializeOwned>(value: Value) -> PlatformResult<T> {
    serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))
}

/// Follow `next` cursors until the collection is exhausted.
pub async fn list_all(
    client: &dyn PlatformClient,
    kind: ResourceKind,
    opts: &ListOpts,
) -> PlatformResult<Vec<Value>> {
    let mut page = client.list(kind, opts).await?;
    let mut records = std::mem::take(&mut page.data);
    let mut pages = 1;

    while let Some(marker) = page.next.take() {
        let opts = opts.clone().with_marker(Some(marker));
        page = client.list(kind, &opts).await?;
        records.append(&mut page.data);
        pages += 1;
    }

    debug!(kind = kind.collection(), records = records.len(), pages, "listed collection");
    Ok(records)
}

pub async fn get_host(client: &dyn PlatformClient, id: &str) -> PlatformResult<Option<Host>> {
    client.get_by_id(ResourceKind::Host, id).await?.map(decode).transpose()
}

/// All hosts in the project, newest first.
pub async fn list_hosts_newest_first(client: &dyn PlatformClient) -> PlatformResult<Vec<Host>> {
    list_all(client, ResourceKind::Host, &ListOpts::new().newest_first())
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

/// Remove a host by evacuating it through an external host event.
pub async fn evacuate_host(client: &dyn PlatformClient, host_id: &str) -> PlatformResult<()> {
    client
        .create(
            ResourceKind::ExternalHostEvent,
            &json!({
                "eventType": "host.evacuate",
                "hostId": host_id,
                "deleteHost": true,
            }),
        )
        .await?;
    Ok(())
}

pub async fn get_service(client: &dyn PlatformClient, id: &str) -> PlatformResult<Option<Service>> {
    client.get_by_id(ResourceKind::Service, id).await?.map(decode).transpose()
}

pub async fn list_services(client: &dyn PlatformClient) -> PlatformResult<Vec<Service>> {
    list_all(client, ResourceKind::Service, &ListOpts::new())
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

/// Start an in-service rolling upgrade.
pub async fn upgrade_service(
    client: &dyn PlatformClient,
    id: &str,
    upgrade: &ServiceUpgrade,
) -> PlatformResult<Service> {
    let body = serde_json::to_value(upgrade).map_err(|e| PlatformError::Decode(e.to_string()))?;
    decode(client.action(ResourceKind::Service, id, "upgrade", &body).await?)
}

/// Confirm a completed upgrade.
pub async fn finish_upgrade(client: &dyn PlatformClient, id: &str) -> PlatformResult<Service> {
    decode(
        client
            .action(ResourceKind::Service, id, "finishupgrade", &json!({}))
            .await?,
    )
}

/// Generic objects whose `key` equals `key`.
pub async fn find_generic_objects_by_key(
    client: &dyn PlatformClient,
    key: &str,
) -> PlatformResult<Vec<GenericObject>> {
    let page = client
        .list(ResourceKind::GenericObject, &ListOpts::new().filter("key", key))
        .await?;
    page.data.into_iter().map(decode).collect()
}
