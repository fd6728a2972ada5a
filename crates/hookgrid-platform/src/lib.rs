//! hookgrid-platform — the boundary between webhook drivers and the
//! remote orchestration platform.
//!
//! Drivers only ever see a [`PlatformClient`]: a small, resource-kind
//! addressed CRUD surface plus named actions. Two implementations ship:
//!
//! - [`HttpPlatform`] talks to the platform's REST API with basic auth.
//! - `InMemoryPlatform` keeps everything in process, including upgrade
//!   transitions, a call log and failure injection. It is a test double and
//!   only built with the `testing` feature (or for this crate's own tests).
//!
//! Typed views over the raw JSON records (`Host`, `Service`, ...) live in
//! [`types`]; the helpers in [`resources`] decode them.

pub mod client;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod resources;
pub mod types;

pub use client::{PlatformClient, PlatformFactory};
pub use error::{PlatformError, PlatformResult};
pub use http::{Credentials, HttpPlatform, HttpPlatformFactory};
#[cfg(any(test, feature = "testing"))]
pub use memory::{CallOp, InMemoryFactory, InMemoryPlatform, PlatformCall};
pub use types::*;
