//! `scaleService` — change a service's scale by a fixed amount.

use std::sync::Arc;

use async_trait::async_trait;
use hookgrid_platform::resources::get_service;
use hookgrid_platform::{PlatformClient, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::driver::{Driver, DriverConfig, ScaleAction, decode_config, mismatched};
use crate::error::{DriverError, DriverResult};
use crate::schema::{DriverSchema, FieldDescriptor};

pub const DRIVER_ID: &str = "scaleService";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleServiceConfig {
    #[serde(default)]
    pub service_id: String,
    pub action: ScaleAction,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub min: i64,
    #[serde(default)]
    pub max: i64,
}

impl ScaleServiceConfig {
    fn check(&self) -> DriverResult<()> {
        if self.amount <= 0 {
            return Err(DriverError::validation(format!("invalid amount: {}", self.amount)));
        }
        if self.service_id.is_empty() {
            return Err(DriverError::validation("serviceId not provided"));
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
        Ok(())
    }

    /// Scale after applying the action, bounded by `[min, max]`.
    fn target_scale(&self, current: i64) -> DriverResult<i64> {
        let target = match self.action {
            ScaleAction::Up => current.checked_add(self.amount),
            ScaleAction::Down => current.checked_sub(self.amount),
        };
        let Some(target) = target else {
            return Err(DriverError::validation(format!(
                "cannot scale service from {current} by {}",
                self.amount
            )));
        };
        if target > self.max {
            return Err(DriverError::validation(format!(
                "cannot scale above max scale {} (would be {target})",
                self.max
            )));
        }
        if target < self.min {
            return Err(DriverError::validation(format!(
                "cannot scale below min scale {} (would be {target})",
                self.min
            )));
        }
        Ok(target)
    }
}

pub struct ScaleServiceDriver;

impl ScaleServiceDriver {
    fn config<'a>(&self, config: &'a DriverConfig) -> DriverResult<&'a ScaleServiceConfig> {
        match config {
            DriverConfig::ScaleService(c) => Ok(c),
            other => Err(mismatched(DRIVER_ID, other)),
        }
    }
}

#[async_trait]
impl Driver for ScaleServiceDriver {
    fn id(&self) -> &'static str {
        DRIVER_ID
    }

    fn bind_config(&self, raw: Value) -> DriverResult<DriverConfig> {
        decode_config(DRIVER_ID, raw).map(DriverConfig::ScaleService)
    }

    async fn validate_payload(
        &self,
        config: &DriverConfig,
        client: &dyn PlatformClient,
    ) -> DriverResult<()> {
        let config = self.config(config)?;
        config.check()?;

        match get_service(client, &config.service_id).await? {
            Some(service) if !service.is_removed() => Ok(()),
            _ => Err(DriverError::validation(format!(
                "invalid service {}",
                config.service_id
            ))),
        }
    }

    async fn execute(
        &self,
        config: &DriverConfig,
        client: Arc<dyn PlatformClient>,
        _body: Option<Value>,
    ) -> DriverResult<()> {
        let config = self.config(config)?;
        let service = get_service(client.as_ref(), &config.service_id)
            .await?
            .filter(|s| !s.is_removed())
            .ok_or_else(|| DriverError::NotFound(format!("service {} not found", config.service_id)))?;

        let scale = config.target_scale(service.scale)?;
        client
            .update(ResourceKind::Service, &service.id, &json!({ "scale": scale }))
            .await?;

        info!(service = %service.id, from = service.scale, to = scale, "scaled service");
        Ok(())
    }

    fn describe_schema(&self) -> DriverSchema {
        DriverSchema::new(DRIVER_ID)
            .field("serviceId", FieldDescriptor::new("reference[service]").required())
            .field("action", FieldDescriptor::new("string").required().options(&["up", "down"]))
            .field("amount", FieldDescriptor::new("int").required().min(1))
            .field("min", FieldDescriptor::new("int").required().min(1).default(json!(1)))
            .field("max", FieldDescriptor::new("int").required().min(1).default(json!(100)))
    }
}
