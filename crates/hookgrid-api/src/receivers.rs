//! Issued webhooks, persisted as platform generic objects.
//!
//! A receiver is stored as a generic object of kind `webhookReceiver`
//! whose `key` is the token nonce and whose `resourceData` holds
//! `{url, driver, config}`. Deleting the object revokes the token.

use hookgrid_platform::resources::{decode, find_generic_objects_by_key, list_all};
use hookgrid_platform::{GenericObject, ListOpts, PlatformClient, PlatformResult, ResourceKind};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Generic object kind used for issued webhooks.
pub const RECEIVER_KIND: &str = "webhookReceiver";

/// Receiver resource returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receiver {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub driver: String,
    pub url: String,
    /// The single `<driver>Config` field.
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl Receiver {
    pub fn from_object(object: &GenericObject) -> Self {
        let data = &object.resource_data;
        let text = |field: &str| {
            data.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let driver = text("driver");

        let mut config = Map::new();
        config.insert(
            format!("{driver}Config"),
            data.get("config").cloned().unwrap_or(Value::Null),
        );

        Self {
            id: object.id.clone(),
            kind: "receiver",
            name: object.name.clone(),
            url: text("url"),
            driver,
            config,
        }
    }
}

/// What a receiver record resolves to at redemption time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredGrant {
    pub driver: String,
    pub config: Value,
}

impl StoredGrant {
    pub fn from_object(object: &GenericObject) -> Option<Self> {
        let driver = object.resource_data.get("driver")?.as_str()?.to_string();
        let config = object.resource_data.get("config")?.clone();
        Some(Self { driver, config })
    }
}

fn is_receiver(object: &GenericObject) -> bool {
    object.kind == RECEIVER_KIND
}

pub async fn save(
    client: &dyn PlatformClient,
    name: &str,
    key: &str,
    url: &str,
    driver: &str,
    config: &Value,
) -> PlatformResult<GenericObject> {
    let body = json!({
        "name": name,
        "key": key,
        "kind": RECEIVER_KIND,
        "resourceData": {
            "url": url,
            "driver": driver,
            "config": config,
        },
    });
    decode(client.create(ResourceKind::GenericObject, &body).await?)
}

pub async fn list(client: &dyn PlatformClient) -> PlatformResult<Vec<GenericObject>> {
    let opts = ListOpts::new().filter("kind", RECEIVER_KIND);
    let objects: Vec<GenericObject> = list_all(client, ResourceKind::GenericObject, &opts)
        .await?
        .into_iter()
        .map(decode)
        .collect::<PlatformResult<_>>()?;
    Ok(objects.into_iter().filter(is_receiver).collect())
}

pub async fn get(client: &dyn PlatformClient, id: &str) -> PlatformResult<Option<GenericObject>> {
    let object: Option<GenericObject> = client
        .get_by_id(ResourceKind::GenericObject, id)
        .await?
        .map(decode)
        .transpose()?;
    Ok(object.filter(is_receiver))
}

pub async fn name_in_use(client: &dyn PlatformClient, name: &str) -> PlatformResult<bool> {
    let opts = ListOpts::new()
        .filter("kind", RECEIVER_KIND)
        .filter("name", name);
    let page = client.list(ResourceKind::GenericObject, &opts).await?;
    Ok(!page.data.is_empty())
}

/// The receiver stored under `key`, if it has not been revoked.
pub async fn find_by_key(
    client: &dyn PlatformClient,
    key: &str,
) -> PlatformResult<Option<GenericObject>> {
    Ok(find_generic_objects_by_key(client, key)
        .await?
        .into_iter()
        .find(is_receiver))
}
