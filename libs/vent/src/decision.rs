//! Ventilation decision
//!
//! A two-threshold hysteresis on the outdoor AQI, overridden by the manual
//! switch. Unknown AQI never changes the state.

use core::fmt;
use core::mem;

use crate::error::ConfigError;

/// Three-position selector wired to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchPosition {
    ForceOn,
    ForceOff,
    /// Follow the AQI.
    Auto,
}

impl fmt::Display for SwitchPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchPosition::ForceOn => f.write_str("ON"),
            SwitchPosition::ForceOff => f.write_str("OFF"),
            SwitchPosition::Auto => f.write_str("AUTO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VentilationState {
    Ventilating,
    Idle,
}

impl VentilationState {
    pub fn is_ventilating(&self) -> bool {
        matches!(self, VentilationState::Ventilating)
    }
}

impl fmt::Display for VentilationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VentilationState::Ventilating => f.write_str("ON"),
            VentilationState::Idle => f.write_str("OFF"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reason {
    ManualOn,
    ManualOff,
    NoAqiData,
    BelowEnable(u16),
    AboveDisable(u16),
    /// Inside the hysteresis band; the previous state was kept.
    WithinBand(u16),
}

impl Reason {
    /// Same variant, ignoring the AQI value carried.
    pub fn same_kind(&self, other: &Reason) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ManualOn => f.write_str("Manual ON"),
            Reason::ManualOff => f.write_str("Manual OFF"),
            Reason::NoAqiData => f.write_str("No AQI data"),
            Reason::BelowEnable(aqi) => write!(f, "AQI good ({})", aqi),
            Reason::AboveDisable(aqi) => write!(f, "AQI too high ({})", aqi),
            Reason::WithinBand(aqi) => write!(f, "AQI in hysteresis band ({})", aqi),
        }
    }
}

/// Enable/disable pair. `enable < disable` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Thresholds {
    enable: u16,
    disable: u16,
}

impl Thresholds {
    pub fn new(enable: u16, disable: u16) -> Result<Self, ConfigError> {
        if enable >= disable {
            return Err(ConfigError::ThresholdOrder { enable, disable });
        }
        Ok(Self { enable, disable })
    }

    /// Ventilate below this AQI.
    pub fn enable(&self) -> u16 {
        self.enable
    }

    /// Stop ventilating at or above this AQI.
    pub fn disable(&self) -> u16 {
        self.disable
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            enable: 120,
            disable: 130,
        }
    }
}

/// Computes the next state.
///
/// # Examples
///
/// ```
/// use vent::decision::{decide, Reason, SwitchPosition, Thresholds, VentilationState};
///
/// let thresholds = Thresholds::new(120, 130).unwrap();
/// let (state, reason) = decide(SwitchPosition::Auto, VentilationState::Ventilating, Some(135), thresholds);
/// assert_eq!(state, VentilationState::Idle);
/// assert_eq!(reason, Reason::AboveDisable(135));
/// ```
pub fn decide(
    switch: SwitchPosition,
    previous: VentilationState,
    aqi: Option<u16>,
    thresholds: Thresholds,
) -> (VentilationState, Reason) {
    match switch {
        SwitchPosition::ForceOn => (VentilationState::Ventilating, Reason::ManualOn),
        SwitchPosition::ForceOff => (VentilationState::Idle, Reason::ManualOff),
        SwitchPosition::Auto => match aqi {
            None => (previous, Reason::NoAqiData),
            Some(aqi) if aqi < thresholds.enable => {
                (VentilationState::Ventilating, Reason::BelowEnable(aqi))
            }
            Some(aqi) if aqi >= thresholds.disable => {
                (VentilationState::Idle, Reason::AboveDisable(aqi))
            }
            Some(aqi) => (previous, Reason::WithinBand(aqi)),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub state: VentilationState,
    pub reason: Reason,
    /// The state, or the kind of reason, differs from the previous cycle.
    pub changed: bool,
}

/// Holds the ventilation state between cycles. Starts out ventilating so a
/// controller that never gets data still moves air.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VentilationController {
    thresholds: Thresholds,
    state: VentilationState,
    reason: Option<Reason>,
}

impl VentilationController {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: VentilationState::Ventilating,
            reason: None,
        }
    }

    pub fn state(&self) -> VentilationState {
        self.state
    }

    pub fn reason(&self) -> Option<Reason> {
        self.reason
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Runs the decision once. Call exactly once per cycle.
    pub fn update(&mut self, switch: SwitchPosition, aqi: Option<u16>) -> Transition {
        let (state, reason) = decide(switch, self.state, aqi, self.thresholds);
        let changed = state != self.state
            || self.reason.map_or(true, |previous| !previous.same_kind(&reason));
        self.state = state;
        self.reason = Some(reason);
        Transition {
            state,
            reason,
            changed,
        }
    }
}
