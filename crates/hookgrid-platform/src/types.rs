//! Domain types for platform resources.
//!
//! Records travel as JSON. These structs are typed views over the fields
//! the drivers read; unknown fields are either ignored or, for launch
//! configs, carried through untouched so an upgrade never drops them.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Label map attached to hosts and launch configs.
pub type Labels = BTreeMap<String, String>;

/// Label set on replaced launch configs so the new image is always pulled.
pub const PULL_IMAGE_LABEL: &str = "io.rancher.container.pull_image";

// ── Addressing ─────────────────────────────────────────────────────

/// Kinds of platform resources the drivers touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Host,
    Service,
    GenericObject,
    ExternalHostEvent,
}

impl ResourceKind {
    /// Collection path segment in the platform API.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Host => "hosts",
            ResourceKind::Service => "services",
            ResourceKind::GenericObject => "genericobjects",
            ResourceKind::ExternalHostEvent => "externalhostevents",
        }
    }
}

/// Filters and paging cursor for a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOpts {
    pub filters: BTreeMap<String, String>,
    /// Opaque cursor from a previous [`Collection::next`].
    pub marker: Option<String>,
}

impl ListOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, key: &str, value: &str) -> Self {
        self.filters.insert(key.to_string(), value.to_string());
        self
    }

    /// Newest records first.
    pub fn newest_first(self) -> Self {
        self.filter("sort", "created").filter("order", "desc")
    }

    pub fn with_marker(mut self, marker: Option<String>) -> Self {
        self.marker = marker;
        self
    }
}

/// One page of a list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub data: Vec<Value>,
    /// Cursor for the following page, if the listing was partial.
    pub next: Option<String>,
}

// ── Hosts ──────────────────────────────────────────────────────────

/// A compute host registered with the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub state: String,
    /// Machine driver that provisioned the host; empty for hand-added hosts.
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub host_template_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub labels: Labels,
    #[serde(default)]
    pub removed: Option<String>,
}

impl Host {
    /// Name shown to users: `name` when set, otherwise `hostname`.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.hostname.as_deref().unwrap_or_default(),
        }
    }

    /// Whether infrastructure provisioned this host (and it can be cloned).
    pub fn is_provisioned(&self) -> bool {
        self.driver.as_deref().is_some_and(|d| !d.is_empty())
    }

    pub fn is_removed(&self) -> bool {
        self.removed.as_deref().is_some_and(|r| !r.is_empty())
    }
}

// ── Services ───────────────────────────────────────────────────────

/// A long-running service and its launch configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub state: String,
    #[serde(default)]
    pub scale: i64,
    #[serde(default)]
    pub transitioning: Option<String>,
    #[serde(default)]
    pub transitioning_message: Option<String>,
    #[serde(default)]
    pub launch_config: Option<LaunchConfig>,
    #[serde(default, deserialize_with = "nullable")]
    pub secondary_launch_configs: Vec<LaunchConfig>,
    #[serde(default)]
    pub removed: Option<String>,
}

/// Where a service is in an asynchronous transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    InProgress,
    Settled,
    Failed(String),
}

impl Service {
    pub fn transition(&self) -> Transition {
        match self.transitioning.as_deref() {
            Some("yes") => Transition::InProgress,
            None | Some("no") | Some("") => Transition::Settled,
            Some(_) => Transition::Failed(
                self.transitioning_message.clone().unwrap_or_default(),
            ),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Container launch configuration. Fields not modelled here are kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uuid: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub labels: Labels,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Rolling upgrade parameters for the `upgrade` service action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InServiceStrategy {
    pub batch_size: i64,
    pub interval_millis: i64,
    pub start_first: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_config: Option<LaunchConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_launch_configs: Option<Vec<LaunchConfig>>,
}

/// Body of the `upgrade` service action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpgrade {
    pub in_service_strategy: InServiceStrategy,
}

// ── Generic objects ────────────────────────────────────────────────

/// Free-form record used to persist issued webhooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericObject {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub key: String,
    pub kind: String,
    #[serde(default)]
    pub resource_data: Value,
}

/// Treat an explicit JSON `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_name_prefers_name() {
        let mut host = Host {
            name: Some("web1".to_string()),
            hostname: Some("ip-10-0-0-1".to_string()),
            ..Default::default()
        };
        assert_eq!(host.display_name(), "web1");

        host.name = Some(String::new());
        assert_eq!(host.display_name(), "ip-10-0-0-1");

        host.name = None;
        host.hostname = None;
        assert_eq!(host.display_name(), "");
    }

    #[test]
    fn host_tolerates_null_fields() {
        let host: Host = serde_json::from_value(json!({
            "id": "1h1",
            "labels": null,
            "state": null,
            "driver": "amazonec2"
        }))
        .unwrap();
        assert!(host.labels.is_empty());
        assert!(host.is_provisioned());
        assert!(!host.is_removed());
    }

    #[test]
    fn launch_config_keeps_unknown_fields() {
        let raw = json!({
            "imageUuid": "docker:nginx:1.0",
            "labels": {"app": "web"},
            "ports": ["80:80/tcp"],
            "name": "sidekick"
        });
        let cfg: LaunchConfig = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(cfg.extra.get("ports"), Some(&json!(["80:80/tcp"])));
        assert_eq!(serde_json::to_value(&cfg).unwrap(), raw);
    }

    #[test]
    fn transition_states() {
        let mut svc = Service::default();
        assert_eq!(svc.transition(), Transition::Settled);
        svc.transitioning = Some("yes".to_string());
        assert_eq!(svc.transition(), Transition::InProgress);
        svc.transitioning = Some("error".to_string());
        svc.transitioning_message = Some("pull failed".to_string());
        assert_eq!(svc.transition(), Transition::Failed("pull failed".to_string()));
    }

    #[test]
    fn newest_first_sets_sort_filters() {
        let opts = ListOpts::new().newest_first();
        assert_eq!(opts.filters.get("sort").map(String::as_str), Some("created"));
        assert_eq!(opts.filters.get("order").map(String::as_str), Some("desc"));
    }
}
