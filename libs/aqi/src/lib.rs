//! AQI library
//!
//! This library provides the numeric side of the ventilation controller:
//! piecewise-linear breakpoint interpolation, the EPA PM2.5 AQI table built
//! on top of it, and the EPA category names for a given AQI. It supports both
//! std and no_std environments, but is best used on systems with hardware
//! floating point support.

#![no_std]

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

/// Highest value on the AQI scale.
pub const AQI_MAX: u16 = 500;

/// Category enum provides the EPA AQI levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Category {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl Category {
    /// Maps an AQI value onto the EPA category ranges.
    ///
    /// # Examples
    ///
    /// ```
    /// use aqi::Category;
    ///
    /// assert_eq!(Category::from_aqi(42), Category::Good);
    /// assert_eq!(Category::from_aqi(135), Category::UnhealthyForSensitiveGroups);
    /// ```
    pub fn from_aqi(aqi: u16) -> Self {
        match aqi {
            0..=50 => Category::Good,
            51..=100 => Category::Moderate,
            101..=150 => Category::UnhealthyForSensitiveGroups,
            151..=200 => Category::Unhealthy,
            201..=300 => Category::VeryUnhealthy,
            _ => Category::Hazardous,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Good => "Good",
            Category::Moderate => "Moderate",
            Category::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Category::Unhealthy => "Unhealthy",
            Category::VeryUnhealthy => "Very Unhealthy",
            Category::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Linearly interpolates between two breakpoints.
///
/// # Arguments
///
/// * `c_low`, `c_high` - The concentration endpoints of the band
/// * `i_low`, `i_high` - The index values at those endpoints
/// * `point` - The concentration to map
/// * `trim` - Clamp `point` into `[c_low, c_high]` before interpolating
///
/// # Returns
///
/// The interpolated index value. A band whose endpoints coincide yields
/// `i_high` when `point >= c_low` and `i_low` otherwise.
///
/// # Examples
///
/// ```
/// use aqi::interpolate;
///
/// assert_eq!(interpolate(0.0, 10.0, 0.0, 100.0, 5.0, false), 50.0);
/// assert_eq!(interpolate(0.0, 10.0, 0.0, 100.0, 20.0, true), 100.0);
/// ```
pub fn interpolate(
    c_low: f64,
    c_high: f64,
    i_low: f64,
    i_high: f64,
    point: f64,
    trim: bool,
) -> f64 {
    let point = if trim {
        point.max(c_low).min(c_high)
    } else {
        point
    };

    if c_high == c_low {
        return if point >= c_low { i_high } else { i_low };
    }

    // AQI = ((AQIhigh - AQIlow) / (PMhigh - PMlow)) * (PMactual - PMlow) + AQIlow
    (i_high - i_low) / (c_high - c_low) * (point - c_low) + i_low
}

/// PM2.5 bands as (threshold, c_low, c_high, i_low, i_high), highest first.
/// A concentration strictly above `threshold` selects the band.
const PM25_BANDS: [(f64, f64, f64, f64, f64); 6] = [
    (350.5, 350.5, 500.4, 401.0, 500.0), // Hazardous (upper)
    (250.5, 250.5, 350.4, 301.0, 400.0), // Hazardous
    (150.5, 150.5, 250.4, 201.0, 300.0), // Very Unhealthy
    (55.5, 55.5, 150.4, 151.0, 200.0),   // Unhealthy
    (35.5, 35.5, 55.4, 101.0, 150.0),    // Unhealthy for Sensitive Groups
    (12.1, 12.1, 35.4, 51.0, 100.0),     // Moderate
];

/// Calculate the unrounded AQI for the provided PM2.5 concentration.
///
/// Negative (and non-finite) concentrations map to 0. The top band is
/// clamped so the result never exceeds [`AQI_MAX`].
pub fn calculate_aqi_exact(pm25: f64) -> f64 {
    if !(pm25 >= 0.0) {
        return 0.0;
    }

    for (i, &(threshold, c_low, c_high, i_low, i_high)) in PM25_BANDS.iter().enumerate() {
        if pm25 > threshold {
            // Only the open-ended top band is trimmed
            return interpolate(c_low, c_high, i_low, i_high, pm25, i == 0);
        }
    }

    // Good: 0 <= pm25 <= 12.1
    interpolate(0.0, 12.0, 0.0, 50.0, pm25, false)
}

/// Calulate the AQI for the provided PM2.5 value.
///
/// # Arguments
///
/// * `pm25` - The PM 2.5 concentration in µg/m³
///
/// # Returns
///
/// The calculated AQI value using breakpoints and a formula
/// provided by the EPA, rounded half away from zero.
///
/// # Examples
///
/// ```
/// use aqi::calculate_aqi;
///
/// assert_eq!(calculate_aqi(12.0), 50);
/// assert_eq!(calculate_aqi(35.4), 100);
/// assert_eq!(calculate_aqi(-5.0), 0);
/// ```
pub fn calculate_aqi(pm25: f64) -> u16 {
    let aqi = libm::round(calculate_aqi_exact(pm25));
    if aqi >= AQI_MAX as f64 {
        AQI_MAX
    } else {
        aqi as u16
    }
}
