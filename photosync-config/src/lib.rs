//! Configuration for the photosync engine.
//!
//! Values are layered with environment variables taking precedence over an
//! optional TOML file, which takes precedence over built-in defaults. A `.env`
//! file is loaded into the process environment first when present.

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{ConfigMetadata, DatabaseConfig, HealthServerConfig, SyncConfig};
pub use validation::{ConfigWarning, ConfigWarnings};
