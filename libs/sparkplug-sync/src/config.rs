//! Bridge configuration
//!
//! ```yaml
//! group_id: "UWC nodes"
//! edge_node_id: "edge-1"
//! death_error_codes: [2003]
//! logging:
//!   level: info
//! catalog:
//!   devices: []
//! ```
//!
//! Every key can be overridden with `SPARKPLUG_BRIDGE_`-prefixed environment
//! variables, nested keys separated by `__`.

use crate::catalog::StaticCatalog;
use crate::error::{Result, SyncError};
use gateway_common::config::{env_prefix, load_config_with_env};
use gateway_common::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const SERVICE_NAME: &str = "sparkplug-bridge";

fn default_group_id() -> String {
    "UWC nodes".to_string()
}

fn default_app_name() -> String {
    "SPARKPLUG-BRIDGE".to_string()
}

fn default_death_error_codes() -> Vec<u64> {
    vec![2003]
}

fn default_internal_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sparkplug group id
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Sparkplug edge node id
    #[serde(default)]
    pub edge_node_id: String,
    /// Value of the node birth `Name` metric
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Modbus error codes that mean the device itself is unreachable
    #[serde(default = "default_death_error_codes")]
    pub death_error_codes: Vec<u64>,
    /// Internal-bus outage after which devices are declared dead
    #[serde(default = "default_internal_timeout_secs")]
    pub internal_timeout_secs: u64,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub catalog: StaticCatalog,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            edge_node_id: String::new(),
            app_name: default_app_name(),
            death_error_codes: default_death_error_codes(),
            internal_timeout_secs: default_internal_timeout_secs(),
            logging: LogConfig::default(),
            catalog: StaticCatalog::default(),
        }
    }
}

impl SyncConfig {
    /// Load from `path` with environment overrides, then validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: SyncConfig = load_config_with_env(path, &env_prefix(SERVICE_NAME))?;
        config.validate()?;
        info!(
            "Loaded configuration from {}: group={}, edge={}, {} catalog devices",
            path.display(),
            config.group_id,
            config.edge_node_id,
            config.catalog.devices.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid_id = |id: &str| id.is_empty() || id.contains(['/', '+', '#']);
        if invalid_id(&self.group_id) {
            return Err(SyncError::Config(format!(
                "group_id '{}' must be non-empty and free of '/', '+', '#'",
                self.group_id
            )));
        }
        if invalid_id(&self.edge_node_id) {
            return Err(SyncError::Config(format!(
                "edge_node_id '{}' must be non-empty and free of '/', '+', '#'",
                self.edge_node_id
            )));
        }
        if self.internal_timeout_secs == 0 {
            return Err(SyncError::Config(
                "internal_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn internal_timeout(&self) -> Duration {
        Duration::from_secs(self.internal_timeout_secs)
    }
}
