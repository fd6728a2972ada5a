//! `scaleHost` — grow or shrink a group of hosts.
//!
//! The group is recomputed from a fresh host listing on every invocation:
//!
//! ```text
//! hostSelector   → hosts whose labels match (hosts in `error` are skipped)
//! hostTemplateId → hosts created from the template
//! hostId         → hosts sharing the referenced host's name prefix
//! ```
//!
//! Scaling up clones the seed host (the newest infrastructure-provisioned
//! member, or the referenced host) under the next free names. Scaling
//! down removes unhealthy members first, then walks the group newest- or
//! oldest-first. Steps run sequentially and are not rolled back when a
//! later platform call fails.

use std::sync::Arc;

use async_trait::async_trait;
use hookgrid_platform::resources::{evacuate_host, get_host, list_hosts_newest_first};
use hookgrid_platform::{Host, Labels, PlatformClient, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::driver::{Driver, DriverConfig, ScaleAction, decode_config, mismatched};
use crate::error::{DriverError, DriverResult};
use crate::labels;
use crate::naming::{self, HostName};
use crate::schema::{DriverSchema, FieldDescriptor};

pub const DRIVER_ID: &str = "scaleHost";

/// Host states removed ahead of the configured delete order.
pub const UNHEALTHY_STATES: [&str; 4] = ["inactive", "deactivating", "reconnecting", "disconnected"];

/// Fields of the seed record that must not be copied into a clone.
const NON_CLONABLE_FIELDS: [&str; 11] = [
    "id",
    "uuid",
    "actions",
    "links",
    "created",
    "createdTS",
    "state",
    "transitioning",
    "transitioningMessage",
    "removed",
    "agentId",
];

// ── Configuration ──────────────────────────────────────────────────

/// Which hosts to remove first when scaling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteOption {
    MostRecent,
    LeastRecent,
}

/// How the scaling group is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSelector {
    Labels(Labels),
    Template(String),
    /// Legacy single-host mode: the group is every host sharing this
    /// host's name prefix and the host itself is never removed.
    Host(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScaleHostConfig", into = "RawScaleHostConfig")]
pub struct ScaleHostConfig {
    pub selector: HostSelector,
    pub action: ScaleAction,
    pub amount: i64,
    pub min: i64,
    pub max: i64,
    pub delete_option: Option<DeleteOption>,
}

/// Wire form: exactly one of the three selector fields is set.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScaleHostConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host_selector: Option<Labels>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host_id: Option<String>,
    action: ScaleAction,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    min: i64,
    #[serde(default)]
    max: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete_option: Option<DeleteOption>,
}

impl TryFrom<RawScaleHostConfig> for ScaleHostConfig {
    type Error = String;

    fn try_from(raw: RawScaleHostConfig) -> Result<Self, Self::Error> {
        let mut selectors = Vec::new();
        if let Some(labels) = raw.host_selector.filter(|l| !l.is_empty()) {
            selectors.push(HostSelector::Labels(labels));
        }
        if let Some(id) = raw.host_template_id.filter(|id| !id.is_empty()) {
            selectors.push(HostSelector::Template(id));
        }
        if let Some(id) = raw.host_id.filter(|id| !id.is_empty()) {
            selectors.push(HostSelector::Host(id));
        }

        let selector = match selectors.len() {
            0 => return Err("host selector not provided".to_string()),
            1 => selectors.remove(0),
            _ => {
                return Err(
                    "only one of hostSelector, hostTemplateId and hostId may be set".to_string(),
                );
            }
        };

        Ok(Self {
            selector,
            action: raw.action,
            amount: raw.amount,
            min: raw.min,
            max: raw.max,
            delete_option: raw.delete_option,
        })
    }
}

impl From<ScaleHostConfig> for RawScaleHostConfig {
    fn from(config: ScaleHostConfig) -> Self {
        let (host_selector, host_template_id, host_id) = match config.selector {
            HostSelector::Labels(labels) => (Some(labels), None, None),
            HostSelector::Template(id) => (None, Some(id), None),
            HostSelector::Host(id) => (None, None, Some(id)),
        };
        Self {
            host_selector,
            host_template_id,
            host_id,
            action: config.action,
            amount: config.amount,
            min: config.min,
            max: config.max,
            delete_option: config.delete_option,
        }
    }
}

impl ScaleHostConfig {
    fn check(&self) -> DriverResult<()> {
        if self.amount <= 0 {
            return Err(DriverError::validation(format!("invalid amount: {}", self.amount)));
        }
        if self.min <= 0 {
            return Err(DriverError::validation("minimum scale not provided/invalid"));
        }
        if self.max <= 0 {
            return Err(DriverError::validation("maximum scale not provided/invalid"));
        }
        if self.min >= self.max {
            return Err(DriverError::validation("max must be greater than min"));
        }
        match (self.action, self.delete_option) {
            (ScaleAction::Up, Some(_)) => Err(DriverError::validation(
                "delete option not to be provided while scaling up",
            )),
            (ScaleAction::Down, None) => Err(DriverError::validation(
                "delete option must be mostRecent or leastRecent when scaling down",
            )),
            _ => Ok(()),
        }
    }
}

// ── Scaling group ──────────────────────────────────────────────────

/// Point-in-time snapshot of the hosts a selector resolves to, newest first.
#[derive(Debug, Clone)]
pub struct ScalingGroup {
    hosts: Vec<Host>,
    seed: Option<usize>,
    protected: Option<String>,
}

impl ScalingGroup {
    /// Resolve `selector` against `hosts` (newest first).
    pub fn resolve(selector: &HostSelector, hosts: Vec<Host>) -> DriverResult<Self> {
        let live = hosts.into_iter().filter(|h| !h.is_removed());

        let group = match selector {
            HostSelector::Labels(selector) => {
                let hosts: Vec<Host> = live
                    .filter(|h| h.state != "error" && labels::matches(selector, &h.labels))
                    .collect();
                let seed = hosts.iter().position(Host::is_provisioned);
                Self {
                    hosts,
                    seed,
                    protected: None,
                }
            }
            HostSelector::Template(template_id) => {
                let hosts: Vec<Host> = live
                    .filter(|h| h.host_template_id.as_deref() == Some(template_id.as_str()))
                    .collect();
                let seed = hosts.iter().position(Host::is_provisioned);
                Self {
                    hosts,
                    seed,
                    protected: None,
                }
            }
            HostSelector::Host(base_id) => {
                let all: Vec<Host> = live.collect();
                let base = all
                    .iter()
                    .find(|h| &h.id == base_id)
                    .ok_or_else(|| DriverError::NotFound(format!("host {base_id} not found")))?;
                let prefix = HostName::parse(base.display_name()).prefix.to_string();

                let hosts: Vec<Host> = all
                    .into_iter()
                    .filter(|h| HostName::parse(h.display_name()).prefix == prefix)
                    .collect();
                let seed = hosts.iter().position(|h| &h.id == base_id);
                Self {
                    hosts,
                    seed,
                    protected: Some(base_id.clone()),
                }
            }
        };
        Ok(group)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Host used as the cloning template.
    pub fn seed(&self) -> DriverResult<&Host> {
        self.seed.map(|i| &self.hosts[i]).ok_or_else(|| {
            DriverError::InvalidState("cannot use ad-hoc hosts as a cloning source".to_string())
        })
    }

    /// Names for `amount` new clones of the seed.
    ///
    /// Numbering continues from the newest member sharing the seed's prefix.
    pub fn clone_names(&self, amount: usize) -> DriverResult<impl Iterator<Item = String> + '_> {
        let base = HostName::parse(self.seed()?.display_name());
        let high_water = self
            .hosts
            .iter()
            .map(|h| HostName::parse(h.display_name()))
            .find(|name| name.prefix == base.prefix)
            .map_or(base.suffix, |name| name.suffix);

        debug!(prefix = base.prefix, high_water, "computed clone names");
        Ok(naming::clone_names(base, high_water, amount))
    }

    /// Hosts to remove for a scale-down of `amount`, in removal order.
    ///
    /// Unhealthy hosts always go first and count against `amount`.
    pub fn removal_plan(&self, amount: usize, option: DeleteOption) -> DriverResult<Vec<&Host>> {
        let mut doomed: Vec<&Host> = Vec::new();
        for host in self.hosts.iter().filter(|h| is_unhealthy(h)) {
            if doomed.len() >= amount {
                return Err(DriverError::InvalidState(format!(
                    "unhealthy hosts exceed the scale down amount of {amount}"
                )));
            }
            doomed.push(host);
        }

        let walk: Vec<&Host> = match option {
            DeleteOption::MostRecent => self.hosts.iter().collect(),
            DeleteOption::LeastRecent => self.hosts.iter().rev().collect(),
        };
        let wanted = amount - doomed.len();
        doomed.extend(walk.into_iter().filter(|h| !is_unhealthy(h)).take(wanted));

        if let Some(base) = &self.protected {
            if doomed.iter().any(|h| &h.id == base) {
                return Err(DriverError::validation(format!("cannot delete base host {base}")));
            }
        }
        Ok(doomed)
    }
}

fn is_unhealthy(host: &Host) -> bool {
    UNHEALTHY_STATES.contains(&host.state.as_str())
}

/// Seed record reduced to what a new host can be created from.
fn clone_template(mut raw: Value, selector: &HostSelector) -> Value {
    if let Value::Object(fields) = &mut raw {
        for field in NON_CLONABLE_FIELDS {
            fields.remove(field);
        }
        fields.insert("name".to_string(), Value::Null);

        // Keep clones discoverable by the same selector.
        if let HostSelector::Labels(selector) = selector {
            let labels = fields
                .entry("labels")
                .or_insert_with(|| json!({}));
            if !labels.is_object() {
                *labels = json!({});
            }
            if let Value::Object(labels) = labels {
                for (key, value) in selector {
                    labels.insert(key.clone(), Value::String(value.clone()));
                }
            }
        }
    }
    raw
}

// ── Driver ─────────────────────────────────────────────────────────

fn group_size(group: &ScalingGroup) -> i64 {
    i64::try_from(group.len()).unwrap_or(i64::MAX)
}

pub struct ScaleHostDriver;

impl ScaleHostDriver {
    fn config<'a>(&self, config: &'a DriverConfig) -> DriverResult<&'a ScaleHostConfig> {
        match config {
            DriverConfig::ScaleHost(c) => Ok(c),
            other => Err(mismatched(DRIVER_ID, other)),
        }
    }

    async fn scale_up(
        &self,
        client: &dyn PlatformClient,
        config: &ScaleHostConfig,
        group: &ScalingGroup,
    ) -> DriverResult<()> {
        let seed = group.seed()?;
        let target = group_size(group)
            .checked_add(config.amount)
            .filter(|target| *target <= config.max);
        if target.is_none() {
            return Err(DriverError::validation(format!(
                "cannot scale above max scale {}: group has {} hosts",
                config.max,
                group.len()
            )));
        }
        let amount = usize::try_from(config.amount)
            .map_err(|_| DriverError::validation(format!("invalid amount: {}", config.amount)))?;
        let names = group.clone_names(amount)?;

        info!(seed = %seed.id, "using host as base for cloning");
        let raw = client
            .get_by_id(ResourceKind::Host, &seed.id)
            .await?
            .ok_or_else(|| DriverError::NotFound(format!("host {} not found", seed.id)))?;
        let template = clone_template(raw, &config.selector);

        for name in names {
            let mut body = template.clone();
            body["hostname"] = Value::String(name.clone());
            client.create(ResourceKind::Host, &body).await?;
            info!(hostname = %name, seed = %seed.id, "created host");
        }
        Ok(())
    }

    async fn scale_down(
        &self,
        client: &dyn PlatformClient,
        config: &ScaleHostConfig,
        group: &ScalingGroup,
    ) -> DriverResult<()> {
        let target = group_size(group)
            .checked_sub(config.amount)
            .filter(|target| *target >= config.min);
        if target.is_none() {
            return Err(DriverError::validation(format!(
                "cannot scale below min scale {}: group has {} hosts",
                config.min,
                group.len()
            )));
        }
        // Bounded by the group size once the min check has passed.
        let amount = usize::try_from(config.amount)
            .map_err(|_| DriverError::validation(format!("invalid amount: {}", config.amount)))?;
        let option = config.delete_option.unwrap_or(DeleteOption::MostRecent);
        let doomed = group.removal_plan(amount, option)?;

        for host in doomed {
            evacuate_host(client, &host.id).await?;
            info!(host = %host.id, state = %host.state, "removed host");
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for ScaleHostDriver {
    fn id(&self) -> &'static str {
        DRIVER_ID
    }

    fn bind_config(&self, raw: Value) -> DriverResult<DriverConfig> {
        decode_config(DRIVER_ID, raw).map(DriverConfig::ScaleHost)
    }

    async fn validate_payload(
        &self,
        config: &DriverConfig,
        client: &dyn PlatformClient,
    ) -> DriverResult<()> {
        let config = self.config(config)?;
        config.check()?;

        if let HostSelector::Host(id) = &config.selector {
            match get_host(client, id).await? {
                Some(host) if !host.is_removed() => {}
                _ => return Err(DriverError::validation(format!("invalid host {id}"))),
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        config: &DriverConfig,
        client: Arc<dyn PlatformClient>,
        _body: Option<Value>,
    ) -> DriverResult<()> {
        let config = self.config(config)?;
        config.check()?;

        let hosts = list_hosts_newest_first(client.as_ref()).await?;
        let group = ScalingGroup::resolve(&config.selector, hosts)?;
        debug!(hosts = group.len(), action = ?config.action, "resolved scaling group");

        match config.action {
            ScaleAction::Up => self.scale_up(client.as_ref(), config, &group).await,
            ScaleAction::Down => self.scale_down(client.as_ref(), config, &group).await,
        }
    }

    fn describe_schema(&self) -> DriverSchema {
        DriverSchema::new(DRIVER_ID)
            .field("hostSelector", FieldDescriptor::new("map[string]"))
            .field("hostTemplateId", FieldDescriptor::new("reference[hostTemplate]"))
            .field("hostId", FieldDescriptor::new("reference[host]"))
            .field("action", FieldDescriptor::new("string").required().options(&["up", "down"]))
            .field("amount", FieldDescriptor::new("int").required().min(1))
            .field("min", FieldDescriptor::new("int").required().min(1).default(json!(1)))
            .field("max", FieldDescriptor::new("int").required().min(1).default(json!(100)))
            .field(
                "deleteOption",
                FieldDescriptor::new("string").options(&["mostRecent", "leastRecent"]),
            )
    }
}
