//! Controller configuration.
//!
//! Every field has a default, so a JSON document only needs to name what it
//! changes. The firmware starts from [`Config::default`] and fills in the
//! site secrets at build time.

use alloc::string::String;
use alloc::vec::Vec;

use serde::Deserialize;

use crate::decision::Thresholds;
use crate::error::ConfigError;
use crate::poller::PollSettings;
use crate::scheduler::AcquisitionScheduler;
use crate::source::SensorSource;
use crate::telemetry::{FormFields, FormLogger, LogPolicy};
use crate::wait::ConnectTiming;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub thresholds: ThresholdConfig,
    pub outdoor: GroupConfig,
    pub indoor: Option<GroupConfig>,
    pub local: LocalConfig,
    pub api: ApiConfig,
    pub timing: TimingConfig,
    pub form_logger: Option<FormLoggerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub enable: u16,
    pub disable: u16,
}

/// Sources for one measured space.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub name: String,
    /// Addresses of the local sensors; their readings are averaged.
    pub local_hosts: Vec<String>,
    /// Cloud sensor IDs; empty disables the API for this group.
    pub sensor_ids: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub port: u16,
    pub interval_ms: u64,
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub key: String,
    pub interval_ms: u64,
    pub max_age_s: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub loop_delay_ms: u64,
    pub watchdog_slice_ms: u64,
    pub connect_attempt_timeout_ms: u64,
    pub connect_retry_delay_ms: u64,
    pub countdown_interval_ms: u64,
    /// Uptime after which the control loop returns so the device can reset.
    pub max_run_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormLoggerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub entries: FormFields,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            outdoor: GroupConfig {
                name: String::from("Outdoor"),
                ..GroupConfig::default()
            },
            indoor: None,
            local: LocalConfig::default(),
            api: ApiConfig::default(),
            timing: TimingConfig::default(),
            form_logger: None,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            enable: thresholds.enable(),
            disable: thresholds.disable(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            port: 80,
            interval_ms: 60_000,
            attempts: 3,
            retry_delay_ms: 500,
            timeout_ms: 10_000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: String::from("api.purpleair.com"),
            port: 443,
            key: String::new(),
            interval_ms: 1_200_000,
            max_age_s: 3_600,
            timeout_ms: 10_000,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            loop_delay_ms: 1_000,
            watchdog_slice_ms: 100,
            connect_attempt_timeout_ms: 15_000,
            connect_retry_delay_ms: 5_000,
            countdown_interval_ms: 30_000,
            max_run_time_ms: 12 * 60 * 60 * 1_000,
        }
    }
}

impl Default for FormLoggerConfig {
    fn default() -> Self {
        Self {
            host: String::from("docs.google.com"),
            port: 443,
            path: String::new(),
            entries: FormFields::default(),
            interval_ms: 15 * 60 * 1_000,
            timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Parses and validates a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds()?;

        let intervals = [
            ("local.interval_ms", self.local.interval_ms),
            ("api.interval_ms", self.api.interval_ms),
            ("timing.loop_delay_ms", self.timing.loop_delay_ms),
            ("timing.watchdog_slice_ms", self.timing.watchdog_slice_ms),
            ("timing.max_run_time_ms", self.timing.max_run_time_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        if let Some(form) = &self.form_logger {
            if form.interval_ms == 0 {
                return Err(ConfigError::ZeroInterval("form_logger.interval_ms"));
            }
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(self.thresholds.enable, self.thresholds.disable)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            local_attempts: self.local.attempts,
            local_retry_delay_ms: self.local.retry_delay_ms,
            local_timeout_ms: self.local.timeout_ms,
            api_timeout_ms: self.api.timeout_ms,
            api_max_age_s: self.api.max_age_s,
            watchdog_slice_ms: self.timing.watchdog_slice_ms,
        }
    }

    pub fn connect_timing(&self) -> ConnectTiming {
        ConnectTiming {
            attempt_timeout_ms: self.timing.connect_attempt_timeout_ms,
            retry_delay_ms: self.timing.connect_retry_delay_ms,
            slice_ms: self.timing.watchdog_slice_ms,
        }
    }

    pub fn outdoor_scheduler(&self) -> AcquisitionScheduler {
        self.scheduler(&self.outdoor, "Outdoor")
    }

    pub fn indoor_scheduler(&self) -> Option<AcquisitionScheduler> {
        self.indoor.as_ref().map(|group| self.scheduler(group, "Indoor"))
    }

    /// The remote logger and its policy, if one is configured.
    pub fn form_logger(&self) -> Option<(FormLogger, LogPolicy)> {
        let form = self.form_logger.as_ref().filter(|f| !f.path.is_empty())?;
        let logger = FormLogger {
            host: form.host.clone(),
            port: form.port,
            path: form.path.clone(),
            fields: form.entries.clone(),
            timeout_ms: form.timeout_ms,
        };
        Some((logger, LogPolicy::new(form.interval_ms)))
    }

    fn scheduler(&self, group: &GroupConfig, fallback_name: &str) -> AcquisitionScheduler {
        let name = if group.name.is_empty() {
            fallback_name
        } else {
            group.name.as_str()
        };
        let locals = group
            .local_hosts
            .iter()
            .filter(|host| !host.is_empty())
            .map(|host| SensorSource::local(name, host, self.local.port, self.local.interval_ms))
            .collect();
        let api = (!self.api.key.is_empty() && !group.sensor_ids.is_empty()).then(|| {
            SensorSource::cloud_api(
                name,
                &self.api.host,
                self.api.port,
                &self.api.key,
                &group.sensor_ids,
                self.api.interval_ms,
            )
        });
        AcquisitionScheduler::new(name, locals, api)
    }
}
