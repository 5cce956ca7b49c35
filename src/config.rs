//! Configuration System
//!
//! Layered host configuration: built-in defaults, then the global config file,
//! then an explicit file, then `EVALHOST__SECTION__KEY` environment variables.
//! Every section deserializes with defaults, so an empty source is a valid one.

use crate::console::ConsoleConfig;
use crate::error::SetupError;
use crate::logging::LoggingConfig;
use crate::service::ServicesConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

mod merge {
    pub(super) mod merge_policy;
}
mod sources {
    pub(super) mod environment;
    pub(super) mod explicit_file;
    pub(super) mod global_file;
}

pub use sources::environment::ENV_PREFIX;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Console(String),
    Service(String, String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Console(msg) => write!(f, "Console: {}", msg),
            ValidationError::Service(name, msg) => write!(f, "Service '{}': {}", name, msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl HostConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.console.validate() {
            errors.push(ValidationError::Console(e));
        }

        if let Err(service_errors) = self.services.validate() {
            errors.extend(
                service_errors
                    .into_iter()
                    .map(|(name, msg)| ValidationError::Service(name, msg)),
            );
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Builds a `HostConfig` from the configured sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, optionally layering an explicit file over the global one.
    pub fn load(explicit: Option<&Path>) -> Result<HostConfig, SetupError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            builder = sources::explicit_file::add_to_builder(builder, path)?;
        }
        builder = sources::environment::add_to_builder(builder);

        let config: HostConfig = builder.build()?.try_deserialize()?;
        debug!(explicit = ?explicit, "Loaded host configuration");
        Ok(config)
    }

    /// Load from a single file, ignoring the global file and environment.
    pub fn load_from_file(path: &Path) -> Result<HostConfig, SetupError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::explicit_file::add_to_builder(builder, path)?;
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load and validate; validation failures become a single `SetupError`.
    pub fn load_validated(explicit: Option<&Path>) -> Result<HostConfig, SetupError> {
        let config = Self::load(explicit)?;
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            SetupError::Config(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(config)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }
}
