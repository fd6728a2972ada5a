//! hookgrid-drivers — the actions a webhook can trigger.
//!
//! Every action implements [`Driver`]: it binds a raw configuration into
//! its [`DriverConfig`] variant, validates it without mutating the
//! platform, executes against a [`hookgrid_platform::PlatformClient`], and
//! describes its configuration fields.
//!
//! # Drivers
//!
//! - **`scaleService`** — adjust a service's scale within `[min, max]`
//! - **`scaleHost`** — clone or remove hosts in a label, template, or
//!   name-prefix group
//! - **`serviceUpgrade`** — roll a pushed image out to matching services
//!
//! The [`DriverRegistry`] maps driver ids to implementations and is built
//! once at start-up.

pub mod driver;
pub mod error;
pub mod labels;
pub mod naming;
pub mod registry;
pub mod scale_host;
pub mod scale_service;
pub mod schema;
pub mod service_upgrade;

pub use driver::{Driver, DriverConfig, ScaleAction};
pub use error::{DriverError, DriverResult, RegistryError};
pub use registry::DriverRegistry;
pub use scale_host::{DeleteOption, HostSelector, ScaleHostConfig, ScaleHostDriver, ScalingGroup};
pub use scale_service::{ScaleServiceConfig, ScaleServiceDriver};
pub use schema::{DriverSchema, FieldDescriptor};
pub use service_upgrade::{
    PayloadFormat, PushedImage, ServiceUpgradeConfig, ServiceUpgradeDriver, UpgradeError,
    UpgradePolicy,
};
