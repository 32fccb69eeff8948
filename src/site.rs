//! Site configuration
//!
//! Secrets and addresses are baked in at build time from environment
//! variables so they never land in the repository, e.g.
//!
//! ```text
//! PURPLEAIR_API_KEY=... OUTDOOR_SENSOR_IP=192.168.1.50,192.168.1.51 \
//! OUTDOOR_SENSOR_IDS=1234,5678 cargo build -p aqi_vent --release
//! ```
//!
//! `VENT_CONFIG_JSON` replaces the whole configuration when set.

use alloc::string::String;

use vent::config::{FormLoggerConfig, GroupConfig};
use vent::{Config, ConfigError};

const API_KEY: Option<&str> = option_env!("PURPLEAIR_API_KEY");
const OUTDOOR_SENSOR_IP: Option<&str> = option_env!("OUTDOOR_SENSOR_IP");
const OUTDOOR_SENSOR_IDS: Option<&str> = option_env!("OUTDOOR_SENSOR_IDS");
const INDOOR_SENSOR_IP: Option<&str> = option_env!("INDOOR_SENSOR_IP");
const INDOOR_SENSOR_IDS: Option<&str> = option_env!("INDOOR_SENSOR_IDS");
const FORM_PATH: Option<&str> = option_env!("FORM_PATH");
const CONFIG_JSON: Option<&str> = option_env!("VENT_CONFIG_JSON");

/// Parses a comma separated list of sensor IDs, skipping anything that is
/// not a number.
pub fn parse_ids(text: &str) -> impl Iterator<Item = u32> + '_ {
    text.split(',').filter_map(|id| id.trim().parse().ok())
}

/// Splits a comma separated list of sensor addresses.
pub fn parse_hosts(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.split(',').map(str::trim).filter(|host| !host.is_empty())
}

/// Builds the configuration for this device.
pub fn config() -> Result<Config, ConfigError> {
    if let Some(json) = CONFIG_JSON {
        return Config::from_json(json);
    }

    let mut config = Config::default();
    if let Some(key) = API_KEY {
        config.api.key = String::from(key);
    }
    if let Some(hosts) = OUTDOOR_SENSOR_IP {
        config.outdoor.local_hosts = parse_hosts(hosts).map(String::from).collect();
    }
    if let Some(ids) = OUTDOOR_SENSOR_IDS {
        config.outdoor.sensor_ids = parse_ids(ids).collect();
    }
    if INDOOR_SENSOR_IP.is_some() || INDOOR_SENSOR_IDS.is_some() {
        config.indoor = Some(GroupConfig {
            name: String::from("Indoor"),
            local_hosts: INDOOR_SENSOR_IP
                .map(|hosts| parse_hosts(hosts).map(String::from).collect())
                .unwrap_or_default(),
            sensor_ids: INDOOR_SENSOR_IDS.map(|ids| parse_ids(ids).collect()).unwrap_or_default(),
        });
    }
    if let Some(path) = FORM_PATH {
        config.form_logger = Some(FormLoggerConfig {
            path: String::from(path),
            ..FormLoggerConfig::default()
        });
    }

    config.validate()?;
    Ok(config)
}
