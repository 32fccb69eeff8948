//! Error types for acquisition, transport and configuration.

use thiserror::Error;

/// Failures reported by a [`Transport`](crate::ports::Transport) or one of
/// its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    #[error("host unreachable")]
    Unreachable,
    #[error("connection failed")]
    ConnectFailed,
    #[error("request timed out")]
    Timeout,
    #[error("i/o error")]
    Io,
}

/// Why a source poll produced no AQI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionError {
    #[error("network link is down")]
    ConnectivityUnavailable,
    #[error("source is not configured")]
    NotConfigured,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("unexpected HTTP status {0}")]
    Protocol(u16),
    #[error("payload is not valid JSON")]
    MalformedPayload,
    #[error("payload carried no usable PM2.5 data")]
    NoUsableData,
    #[error("request path too long")]
    RequestTooLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("enable threshold {enable} must be below disable threshold {disable}")]
    ThresholdOrder { enable: u16, disable: u16 },
    #[error("interval `{0}` must be non-zero")]
    ZeroInterval(&'static str),
    #[error("configuration is not valid JSON")]
    Parse,
}
