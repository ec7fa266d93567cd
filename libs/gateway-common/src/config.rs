//! Layered configuration loading for gateway services
//!
//! Sources are merged with figment, later sources overriding earlier ones.

use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Separator for nested keys in environment variables, e.g. `SPARKPLUG_LOGGING__LEVEL`
pub const ENV_NESTING_SEPARATOR: &str = "__";

/// Environment variable prefix derived from a service name
///
/// `sparkplug-bridge` becomes `SPARKPLUG_BRIDGE_`.
pub fn env_prefix(service_name: &str) -> String {
    format!("{}_", service_name.to_uppercase().replace('-', "_"))
}

/// Load configuration from the standard locations
///
/// Priority (highest to lowest):
/// 1. Environment variables prefixed with the service name
/// 2. Service-specific file (`config/{service}.yaml`)
/// 3. Default config file (`config/default.yaml` / `config/default.json`)
/// 4. `Default` values of `T`
pub fn load_config<T>(service_name: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
{
    let figment = Figment::new()
        .merge(Serialized::defaults(T::default()))
        .merge(Yaml::file("config/default.yaml"))
        .merge(Json::file("config/default.json"))
        .merge(Yaml::file(format!("config/{}.yaml", service_name)))
        .merge(Env::prefixed(&env_prefix(service_name)).split(ENV_NESTING_SEPARATOR));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

fn file_figment(path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    match extension {
        "yaml" | "yml" => Ok(Figment::new().merge(Yaml::file(path))),
        "json" => Ok(Figment::new().merge(Json::file(path))),
        _ => Err(Error::Config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}

/// Load configuration from a specific file
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    file_figment(path.as_ref())?
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration from file: {}", e)))
}

/// Load configuration from a file, then apply `{prefix}`-prefixed environment overrides
pub fn load_config_with_env<T, P>(path: P, prefix: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    file_figment(path.as_ref())?
        .merge(Env::prefixed(prefix).split(ENV_NESTING_SEPARATOR))
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Save configuration to a yaml or json file
pub fn save_config_to_file<T, P>(config: &T, path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = match extension {
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        _ => {
            return Err(Error::Config(format!(
                "Unsupported config file format: {}",
                extension
            )))
        }
    };

    std::fs::write(path, content)?;
    Ok(())
}
