//! Merge rules: defaults first, later sources override earlier ones.

use crate::console::ConsoleConfig;
use crate::service::ServicesConfig;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    let console = ConsoleConfig::default();
    let services = ServicesConfig::default();
    Config::builder()
        .set_default("console.batch_threshold", console.batch_threshold as i64)?
        .set_default("console.time_slice_ms", console.time_slice_ms as i64)?
        .set_default("console.shutdown_timeout_ms", console.shutdown_timeout_ms as i64)?
        .set_default("services.checker.name", services.checker.name)?
        .set_default("services.checker.modules", services.checker.modules)?
        .set_default("services.summary.name", services.summary.name)?
        .set_default("services.summary.modules", services.summary.modules)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")
}
