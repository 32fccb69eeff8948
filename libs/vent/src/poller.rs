//! Source pollers
//!
//! One fetch against one source. The local variant retries a few times
//! with a short watchdog-fed pause; the cloud variant makes a single request
//! and leaves retrying to the scheduler's interval.

use core::fmt::Write;

use heapless::String;
use serde_json::Value;

use crate::error::{AcquisitionError, TransportError};
use crate::extract::{fields_table_average, parse_and_extract};
use crate::ports::{request, Clock, Connectivity, Endpoint, Platform, Transport, Watchdog};
use crate::reading::RawReading;
use crate::source::{SensorSource, SourceKind};
use crate::wait::sleep_fed;

/// Path served by the local sensor.
pub const LOCAL_PATH: &str = "/json";

/// Column requested from the cloud API.
pub const API_FIELD: &str = "pm2.5_10minute";

pub const API_PATH_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub local_attempts: u32,
    pub local_retry_delay_ms: u64,
    pub local_timeout_ms: u64,
    pub api_timeout_ms: u64,
    pub api_max_age_s: u32,
    pub watchdog_slice_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            local_attempts: 3,
            local_retry_delay_ms: 500,
            local_timeout_ms: 10_000,
            api_timeout_ms: 10_000,
            api_max_age_s: 3_600,
            watchdog_slice_ms: 100,
        }
    }
}

/// Polls `source` once and returns its AQI.
pub async fn poll_source<T, N, K, W>(
    source: &SensorSource,
    settings: &PollSettings,
    platform: &mut Platform<T, N, K, W>,
) -> Result<u16, AcquisitionError>
where
    T: Transport,
    N: Connectivity,
    K: Clock,
    W: Watchdog,
{
    if !platform.connectivity.is_connected() {
        warn!("{}: link down, skipping {} poll", source.name.as_str(), source.kind);
        return Err(AcquisitionError::ConnectivityUnavailable);
    }
    if !source.is_configured() {
        return Err(AcquisitionError::NotConfigured);
    }

    match source.kind {
        SourceKind::Local => poll_local(source, settings, platform).await,
        SourceKind::CloudApi => poll_api(source, settings, platform).await,
    }
}

async fn poll_local<T, N, K, W>(
    source: &SensorSource,
    settings: &PollSettings,
    platform: &mut Platform<T, N, K, W>,
) -> Result<u16, AcquisitionError>
where
    T: Transport,
    K: Clock,
    W: Watchdog,
{
    let attempts = settings.local_attempts.max(1);
    let mut last_error = AcquisitionError::NoUsableData;

    for attempt in 1..=attempts {
        platform.watchdog.feed();
        info!(
            "{}: polling local sensor {} (attempt {}/{})",
            source.name.as_str(),
            source.host.as_str(),
            attempt,
            attempts
        );

        match fetch_local(source, settings, &mut platform.transport).await {
            Ok(aqi) => {
                info!("{}: local AQI {}", source.name.as_str(), aqi);
                return Ok(aqi);
            }
            Err(e) => {
                warn!("{}: local attempt {} failed: {}", source.name.as_str(), attempt, e);
                last_error = e;
            }
        }

        if attempt < attempts {
            sleep_fed(
                &platform.clock,
                &mut platform.watchdog,
                settings.local_retry_delay_ms,
                settings.watchdog_slice_ms,
            )
            .await;
        }
    }

    Err(last_error)
}

async fn fetch_local<T: Transport>(
    source: &SensorSource,
    settings: &PollSettings,
    transport: &mut T,
) -> Result<u16, AcquisitionError> {
    if !transport.probe(&source.host, source.port).await {
        return Err(TransportError::Unreachable.into());
    }

    let endpoint = Endpoint {
        host: &source.host,
        port: source.port,
        secure: false,
        timeout_ms: settings.local_timeout_ms,
    };
    let response = request(transport, &endpoint, LOCAL_PATH, &[]).await?;

    if !response.is_success() {
        return Err(AcquisitionError::Protocol(response.status));
    }
    let raw = parse_and_extract(&response.body, &source.sensor_ids)?;
    raw.to_aqi().ok_or(AcquisitionError::NoUsableData)
}

async fn poll_api<T, N, K, W>(
    source: &SensorSource,
    settings: &PollSettings,
    platform: &mut Platform<T, N, K, W>,
) -> Result<u16, AcquisitionError>
where
    T: Transport,
    W: Watchdog,
{
    let key = source
        .api_key
        .as_deref()
        .ok_or(AcquisitionError::NotConfigured)?;
    let path = api_path(&source.sensor_ids, settings.api_max_age_s)?;
    info!("{}: requesting {}", source.name.as_str(), path.as_str());

    let endpoint = Endpoint {
        host: &source.host,
        port: source.port,
        secure: true,
        timeout_ms: settings.api_timeout_ms,
    };
    let headers = [("X-API-Key", key), ("Content-Type", "application/json")];

    platform.watchdog.feed();
    let response = request(&mut platform.transport, &endpoint, &path, &headers).await?;
    platform.watchdog.feed();

    if !response.is_success() {
        warn!("{}: API returned status {}", source.name.as_str(), response.status);
        return Err(AcquisitionError::Protocol(response.status));
    }

    let doc: Value =
        serde_json::from_slice(&response.body).map_err(|_| AcquisitionError::MalformedPayload)?;
    let pm25 = fields_table_average(&doc, API_FIELD)?;
    let aqi = RawReading::Pm25(pm25)
        .to_aqi()
        .ok_or(AcquisitionError::NoUsableData)?;
    info!("{}: API AQI {}", source.name.as_str(), aqi);
    Ok(aqi)
}

/// Builds the sensors query for `ids`, e.g.
/// `/v1/sensors?fields=pm2.5_10minute&show_only=1%2C2&max_age=3600`.
pub fn api_path(ids: &[u32], max_age_s: u32) -> Result<String<API_PATH_CAPACITY>, AcquisitionError> {
    let mut path = String::new();
    build_api_path(&mut path, ids, max_age_s).map_err(|_| AcquisitionError::RequestTooLong)?;
    Ok(path)
}

fn build_api_path(out: &mut impl Write, ids: &[u32], max_age_s: u32) -> core::fmt::Result {
    write!(out, "/v1/sensors?fields={}&show_only=", API_FIELD)?;
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.write_str("%2C")?;
        }
        write!(out, "{}", id)?;
    }
    write!(out, "&max_age={}", max_age_s)
}
