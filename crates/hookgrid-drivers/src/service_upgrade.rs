//! `serviceUpgrade` — roll a pushed image out to every matching service.
//!
//! A redemption either carries a registry push notification or nothing,
//! in which case the configured `image:tag` is the target. Pushes for
//! other tags are ignored. For a matching tag, every service whose
//! primary or secondary launch configs match the selector gets its own
//! detached task that starts an in-service upgrade, polls the service
//! until the transition settles, and confirms it. The triggering request
//! does not wait for those tasks and nothing cancels them.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use hookgrid_platform::resources::{finish_upgrade, get_service, list_services, upgrade_service};
use hookgrid_platform::{
    InServiceStrategy, Labels, LaunchConfig, PULL_IMAGE_LABEL, PlatformClient, PlatformError,
    Service, ServiceUpgrade, Transition,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::driver::{Driver, DriverConfig, decode_config, mismatched};
use crate::error::{DriverError, DriverResult};
use crate::labels;
use crate::schema::{DriverSchema, FieldDescriptor};

pub const DRIVER_ID: &str = "serviceUpgrade";

const MAX_TAG_LEN: usize = 128;

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("tag pattern is valid")
});

// ── Configuration ──────────────────────────────────────────────────

/// Shape of the registry push notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// `repository.repo_name`
    #[default]
    Dockerhub,
    /// `registry.<region>.aliyuncs.com/<repository.repo_full_name>`
    Alicloud,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpgradeConfig {
    #[serde(default)]
    pub service_selector: Labels,
    /// Image used when a redemption carries no push notification.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub batch_size: i64,
    #[serde(default)]
    pub interval_millis: i64,
    #[serde(default)]
    pub start_first: bool,
    #[serde(default)]
    pub payload_format: PayloadFormat,
}

impl ServiceUpgradeConfig {
    fn check(&self) -> DriverResult<()> {
        if self.service_selector.is_empty() {
            return Err(DriverError::validation("service selectors not provided"));
        }
        if self.tag.is_empty() {
            return Err(DriverError::validation("tag not provided"));
        }
        validate_tag(&self.tag)?;
        if self.batch_size <= 0 {
            return Err(DriverError::validation(
                "batch size for upgrade not provided/invalid",
            ));
        }
        if self.interval_millis <= 0 {
            return Err(DriverError::validation(
                "batch interval for upgrade not provided/invalid",
            ));
        }
        // The platform takes the interval in microseconds.
        if self.interval_millis.checked_mul(1000).is_none() {
            return Err(DriverError::validation(format!(
                "batch interval for upgrade too large: {}",
                self.interval_millis
            )));
        }
        Ok(())
    }

    fn strategy(&self) -> InServiceStrategy {
        InServiceStrategy {
            batch_size: self.batch_size,
            interval_millis: self.interval_millis.saturating_mul(1000),
            start_first: self.start_first,
            launch_config: None,
            secondary_launch_configs: None,
        }
    }
}

/// Check a tag against the Docker tag grammar.
pub fn validate_tag(tag: &str) -> DriverResult<()> {
    if tag.len() > MAX_TAG_LEN || !TAG_PATTERN.is_match(tag) {
        return Err(DriverError::validation(format!(
            "invalid tag {tag}: must be at most {MAX_TAG_LEN} characters of [A-Za-z0-9_.-] \
             and cannot start with '.' or '-'"
        )));
    }
    Ok(())
}

/// How long to wait for each service's upgrade to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradePolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_polls: 36,
        }
    }
}

// ── Push notifications ─────────────────────────────────────────────

/// An image reference announced by a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedImage {
    pub repository: String,
    pub tag: String,
}

impl PushedImage {
    /// `repository:tag`
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Extract the pushed image from a registry notification.
pub fn parse_push(body: &Value, format: PayloadFormat) -> DriverResult<PushedImage> {
    let body = body
        .as_object()
        .ok_or_else(|| DriverError::validation("body should be a JSON object"))?;
    let push_data = body
        .get("push_data")
        .ok_or_else(|| DriverError::validation("incomplete webhook response provided"))?;
    let tag = push_data
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| DriverError::validation("webhook response contains no tag"))?;
    let repository = body.get("repository").ok_or_else(|| {
        DriverError::validation("response provided without repository information")
    })?;
    let field = |name: &str| repository.get(name).and_then(Value::as_str);

    let repository = match format {
        PayloadFormat::Dockerhub => field("repo_name")
            .ok_or_else(|| DriverError::validation("response provided without image name"))?
            .to_string(),
        PayloadFormat::Alicloud => match (field("repo_full_name"), field("region")) {
            (Some(name), Some(region)) => format!("registry.{region}.aliyuncs.com/{name}"),
            _ => {
                return Err(DriverError::validation(
                    "alicloud response provided without image name",
                ));
            }
        },
    };

    Ok(PushedImage {
        repository,
        tag: tag.to_string(),
    })
}

// ── Upgrade tasks ──────────────────────────────────────────────────

/// Why a single service's upgrade was abandoned.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Remote(#[from] PlatformError),

    #[error("service {0} disappeared during upgrade")]
    Vanished(String),

    #[error("timeout waiting for {service} to finish after {polls} polls")]
    Timeout { service: String, polls: u32 },

    #[error("waiting for {service} failed: {message}")]
    Failed { service: String, message: String },
}

fn with_image(config: &LaunchConfig, image_uuid: &str) -> LaunchConfig {
    let mut config = config.clone();
    config.image_uuid = Some(image_uuid.to_string());
    config
        .labels
        .insert(PULL_IMAGE_LABEL.to_string(), "always".to_string());
    config
}

/// The upgrade to send for `service`, or `None` when nothing matches.
///
/// Only the launch configs whose labels match are replaced.
pub fn plan_upgrade(
    service: &Service,
    selector: &Labels,
    image_uuid: &str,
    strategy: &InServiceStrategy,
) -> Option<ServiceUpgrade> {
    let primary = service
        .launch_config
        .as_ref()
        .filter(|lc| labels::matches(selector, &lc.labels))
        .map(|lc| with_image(lc, image_uuid));
    let secondaries: Vec<LaunchConfig> = service
        .secondary_launch_configs
        .iter()
        .filter(|lc| labels::matches(selector, &lc.labels))
        .map(|lc| with_image(lc, image_uuid))
        .collect();

    if primary.is_none() && secondaries.is_empty() {
        return None;
    }

    Some(ServiceUpgrade {
        in_service_strategy: InServiceStrategy {
            launch_config: primary,
            secondary_launch_configs: (!secondaries.is_empty()).then_some(secondaries),
            ..strategy.clone()
        },
    })
}

/// Reload `service_id` until its transition settles or polls run out.
async fn wait_for_transition(
    client: &dyn PlatformClient,
    service_id: &str,
    policy: UpgradePolicy,
) -> Result<Service, UpgradeError> {
    let mut service = None;
    for _ in 0..policy.max_polls {
        let current = get_service(client, service_id)
            .await?
            .ok_or_else(|| UpgradeError::Vanished(service_id.to_string()))?;
        let settled = current.transition() != Transition::InProgress;
        service = Some(current);
        if settled {
            break;
        }
        tokio::time::sleep(policy.poll_interval).await;
    }

    let service = service.ok_or_else(|| UpgradeError::Timeout {
        service: service_id.to_string(),
        polls: policy.max_polls,
    })?;
    match service.transition() {
        Transition::Settled => Ok(service),
        Transition::InProgress => Err(UpgradeError::Timeout {
            service: service_id.to_string(),
            polls: policy.max_polls,
        }),
        Transition::Failed(message) => Err(UpgradeError::Failed {
            service: service_id.to_string(),
            message,
        }),
    }
}

/// Upgrade one service and confirm it once it reaches `upgraded`.
pub async fn run_upgrade(
    client: &dyn PlatformClient,
    service_id: &str,
    upgrade: &ServiceUpgrade,
    policy: UpgradePolicy,
) -> Result<(), UpgradeError> {
    upgrade_service(client, service_id, upgrade).await?;
    let service = wait_for_transition(client, service_id, policy).await?;

    if service.state != "upgraded" {
        debug!(service = %service_id, state = %service.state, "upgrade settled without finishing");
        return Ok(());
    }
    finish_upgrade(client, service_id).await?;
    info!(service = %service_id, "finished upgrade");
    Ok(())
}

/// Start a detached upgrade task for every service matching the config.
///
/// Listing errors are returned; per-service failures are only logged by
/// their tasks. The handles are for callers that want to observe the
/// outcome; dropping them leaves the tasks running.
pub async fn dispatch_upgrades(
    client: Arc<dyn PlatformClient>,
    config: &ServiceUpgradeConfig,
    image: &PushedImage,
    policy: UpgradePolicy,
) -> DriverResult<Vec<JoinHandle<Result<(), UpgradeError>>>> {
    let image_uuid = format!("docker:{}", image.reference());
    let strategy = config.strategy();
    let services = list_services(client.as_ref()).await?;

    let mut tasks = Vec::new();
    for service in services.iter().filter(|s| !s.is_removed()) {
        let Some(upgrade) = plan_upgrade(service, &config.service_selector, &image_uuid, &strategy)
        else {
            continue;
        };

        let client = Arc::clone(&client);
        let service_id = service.id.clone();
        info!(service = %service_id, image = %image_uuid, "upgrading service");
        tasks.push(tokio::spawn(async move {
            let result = run_upgrade(client.as_ref(), &service_id, &upgrade, policy).await;
            if let Err(e) = &result {
                error!(service = %service_id, error = %e, "service upgrade abandoned");
            }
            result
        }));
    }

    if tasks.is_empty() {
        warn!(selector = ?config.service_selector, "no services match selector");
    }
    Ok(tasks)
}

// ── Driver ─────────────────────────────────────────────────────────

pub struct ServiceUpgradeDriver {
    policy: UpgradePolicy,
}

impl ServiceUpgradeDriver {
    pub fn new(policy: UpgradePolicy) -> Self {
        Self { policy }
    }

    fn config<'a>(&self, config: &'a DriverConfig) -> DriverResult<&'a ServiceUpgradeConfig> {
        match config {
            DriverConfig::ServiceUpgrade(c) => Ok(c),
            other => Err(mismatched(DRIVER_ID, other)),
        }
    }

    /// The image a redemption targets.
    fn target(config: &ServiceUpgradeConfig, body: Option<&Value>) -> DriverResult<PushedImage> {
        match body.filter(|b| !b.is_null()) {
            Some(body) => parse_push(body, config.payload_format),
            None if !config.image.is_empty() => Ok(PushedImage {
                repository: config.image.clone(),
                tag: config.tag.clone(),
            }),
            None => Err(DriverError::validation("no payload received")),
        }
    }
}

impl Default for ServiceUpgradeDriver {
    fn default() -> Self {
        Self::new(UpgradePolicy::default())
    }
}

#[async_trait]
impl Driver for ServiceUpgradeDriver {
    fn id(&self) -> &'static str {
        DRIVER_ID
    }

    fn bind_config(&self, raw: Value) -> DriverResult<DriverConfig> {
        decode_config(DRIVER_ID, raw).map(DriverConfig::ServiceUpgrade)
    }

    async fn validate_payload(
        &self,
        config: &DriverConfig,
        _client: &dyn PlatformClient,
    ) -> DriverResult<()> {
        self.config(config)?.check()
    }

    async fn execute(
        &self,
        config: &DriverConfig,
        client: Arc<dyn PlatformClient>,
        body: Option<Value>,
    ) -> DriverResult<()> {
        let config = self.config(config)?;
        config.check()?;
        let pushed = Self::target(config, body.as_ref())?;

        if pushed.tag != config.tag {
            debug!(pushed = %pushed.tag, wanted = %config.tag, "ignoring push for other tag");
            return Ok(());
        }

        info!(
            image = %pushed.reference(),
            selector = ?config.service_selector,
            "image pushed, upgrading services"
        );
        // Detach: the redemption returns as soon as tasks are started.
        dispatch_upgrades(client, config, &pushed, self.policy).await?;
        Ok(())
    }

    fn describe_schema(&self) -> DriverSchema {
        DriverSchema::new(DRIVER_ID)
            .field("serviceSelector", FieldDescriptor::new("map[string]").required())
            .field("image", FieldDescriptor::new("string"))
            .field("tag", FieldDescriptor::new("string").required())
            .field(
                "payloadFormat",
                FieldDescriptor::new("string")
                    .options(&["dockerhub", "alicloud"])
                    .default(json!("dockerhub")),
            )
            .field("batchSize", FieldDescriptor::new("int").min(1).default(json!(1)))
            .field("intervalMillis", FieldDescriptor::new("int").min(1).default(json!(2)))
            .field("startFirst", FieldDescriptor::new("boolean").default(json!(false)))
    }
}
