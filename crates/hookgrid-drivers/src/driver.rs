//! The driver contract and the closed set of driver configurations.

use std::sync::Arc;

use async_trait::async_trait;
use hookgrid_platform::PlatformClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DriverError, DriverResult};
use crate::scale_host::ScaleHostConfig;
use crate::scale_service::ScaleServiceConfig;
use crate::schema::DriverSchema;
use crate::service_upgrade::ServiceUpgradeConfig;

/// One automation action a webhook can trigger.
///
/// `validate_payload` may read from the platform but never mutates it.
/// `execute` performs the action; remote failures keep the platform's
/// status code.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Registry id, e.g. `scaleHost`.
    fn id(&self) -> &'static str;

    /// Decode a raw configuration into this driver's variant.
    fn bind_config(&self, raw: Value) -> DriverResult<DriverConfig>;

    async fn validate_payload(
        &self,
        config: &DriverConfig,
        client: &dyn PlatformClient,
    ) -> DriverResult<()>;

    /// Run the action. `body` is the JSON payload of the triggering request,
    /// if it carried one.
    async fn execute(
        &self,
        config: &DriverConfig,
        client: Arc<dyn PlatformClient>,
        body: Option<Value>,
    ) -> DriverResult<()>;

    fn describe_schema(&self) -> DriverSchema;
}

/// Direction of a scaling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleAction {
    Up,
    Down,
}

/// Validated configuration, one variant per driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverConfig {
    ScaleService(ScaleServiceConfig),
    ScaleHost(ScaleHostConfig),
    ServiceUpgrade(ServiceUpgradeConfig),
}

impl DriverConfig {
    /// Id of the driver this configuration belongs to.
    pub fn driver_id(&self) -> &'static str {
        match self {
            DriverConfig::ScaleService(_) => crate::scale_service::DRIVER_ID,
            DriverConfig::ScaleHost(_) => crate::scale_host::DRIVER_ID,
            DriverConfig::ServiceUpgrade(_) => crate::service_upgrade::DRIVER_ID,
        }
    }

    /// Field name the configuration is published under, `<driver>Config`.
    pub fn field_name(&self) -> String {
        format!("{}Config", self.driver_id())
    }

    pub fn to_value(&self) -> DriverResult<Value> {
        let value = match self {
            DriverConfig::ScaleService(c) => serde_json::to_value(c),
            DriverConfig::ScaleHost(c) => serde_json::to_value(c),
            DriverConfig::ServiceUpgrade(c) => serde_json::to_value(c),
        };
        value.map_err(|e| DriverError::Internal(format!("encode config: {e}")))
    }
}

/// Decode a raw configuration, reporting shape errors as validation errors.
pub(crate) fn decode_config<T: DeserializeOwned>(driver: &str, raw: Value) -> DriverResult<T> {
    if raw.is_null() {
        return Err(DriverError::validation(format!("{driver}Config not provided")));
    }
    serde_json::from_value(raw)
        .map_err(|e| DriverError::validation(format!("invalid {driver}Config: {e}")))
}

/// Error for a configuration variant handed to the wrong driver.
pub(crate) fn mismatched(driver: &str, config: &DriverConfig) -> DriverError {
    DriverError::Internal(format!(
        "{driver} driver cannot process {} config",
        config.driver_id()
    ))
}
