//! Name-keyed driver registry.
//!
//! Built once at start-up and shared read-only; lookups need no locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::driver::Driver;
use crate::error::RegistryError;
use crate::scale_host::ScaleHostDriver;
use crate::scale_service::ScaleServiceDriver;
use crate::schema::DriverSchema;
use crate::service_upgrade::{ServiceUpgradeDriver, UpgradePolicy};

#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<&'static str, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in driver.
    pub fn standard(policy: UpgradePolicy) -> Self {
        Self::new()
            .with_driver(Arc::new(ScaleServiceDriver))
            .with_driver(Arc::new(ScaleHostDriver))
            .with_driver(Arc::new(ServiceUpgradeDriver::new(policy)))
    }

    /// Add a driver, replacing any driver with the same id.
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.drivers.insert(driver.id(), driver);
        self
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<dyn Driver>, RegistryError> {
        self.drivers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDriver(id.to_string()))
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drivers.keys().copied()
    }

    pub fn schemas(&self) -> Vec<DriverSchema> {
        self.drivers.values().map(|d| d.describe_schema()).collect()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .finish()
    }
}
