//! Ventilation control core
//!
//! Decides whether to ventilate a space from outdoor AQI readings. Readings
//! come from a sensor on the local network when it answers and from the
//! PurpleAir cloud API otherwise. A two-threshold hysteresis keeps the relays
//! from chattering and a three-position switch overrides everything.
//!
//! The crate is `no_std` and needs an allocator for JSON handling. All I/O
//! goes through the traits in [`ports`], so the same code runs on the firmware
//! and in host tests.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// This must go FIRST so that all the other modules see its macros.
mod fmt;

pub mod config;
pub mod controller;
pub mod decision;
pub mod effector;
pub mod error;
pub mod extract;
pub mod poller;
pub mod ports;
pub mod reading;
pub mod scheduler;
pub mod source;
pub mod telemetry;
pub mod wait;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::Config;
pub use controller::{Controller, CycleReport};
pub use decision::{SwitchPosition, Thresholds, VentilationState};
pub use error::{AcquisitionError, ConfigError, TransportError};
pub use reading::{AqiReading, RawReading};
pub use scheduler::{AcquisitionScheduler, CycleOutcome};
pub use source::{SensorSource, SourceKind};
