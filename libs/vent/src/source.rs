//! Sensor sources and their poll timing.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Where a reading comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceKind {
    /// Sensor on the local network, fetched over plain HTTP.
    Local,
    /// PurpleAir cloud API, fetched over HTTPS.
    CloudApi,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => f.write_str("local"),
            SourceKind::CloudApi => f.write_str("api"),
        }
    }
}

/// A single pollable endpoint.
///
/// Built once from configuration. Only the scheduler moves `last_poll_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSource {
    pub name: String,
    pub kind: SourceKind,
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub sensor_ids: Vec<u32>,
    pub min_interval_ms: u64,
    /// `None` until the first poll, which makes the source due immediately.
    pub last_poll_ms: Option<u64>,
}

impl SensorSource {
    pub fn local(name: &str, host: &str, port: u16, min_interval_ms: u64) -> Self {
        Self {
            name: String::from(name),
            kind: SourceKind::Local,
            host: String::from(host),
            port,
            api_key: None,
            sensor_ids: Vec::new(),
            min_interval_ms,
            last_poll_ms: None,
        }
    }

    pub fn cloud_api(
        name: &str,
        host: &str,
        port: u16,
        api_key: &str,
        sensor_ids: &[u32],
        min_interval_ms: u64,
    ) -> Self {
        Self {
            name: String::from(name),
            kind: SourceKind::CloudApi,
            host: String::from(host),
            port,
            api_key: Some(String::from(api_key)),
            sensor_ids: sensor_ids.to_vec(),
            min_interval_ms,
            last_poll_ms: None,
        }
    }

    /// A local source needs a host; an API source needs a host, a key and
    /// at least one sensor ID.
    pub fn is_configured(&self) -> bool {
        if self.host.is_empty() {
            return false;
        }
        match self.kind {
            SourceKind::Local => true,
            SourceKind::CloudApi => {
                self.api_key.as_deref().is_some_and(|k| !k.is_empty())
                    && !self.sensor_ids.is_empty()
            }
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.time_until_due(now_ms) == 0
    }

    /// Milliseconds left before the next poll is allowed.
    pub fn time_until_due(&self, now_ms: u64) -> u64 {
        match self.last_poll_ms {
            None => 0,
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last);
                self.min_interval_ms.saturating_sub(elapsed)
            }
        }
    }

    pub fn mark_polled(&mut self, now_ms: u64) {
        self.last_poll_ms = Some(now_ms);
    }
}
