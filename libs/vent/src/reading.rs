//! AQI readings and the raw values they are derived from.

use crate::source::SourceKind;

/// What the extractor pulled out of a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RawReading {
    /// PM2.5 concentration in µg/m³.
    Pm25(f64),
    /// AQI already computed by the sensor.
    Aqi(f64),
}

impl RawReading {
    /// Converts to an integer AQI, or `None` when the value is unusable.
    pub fn to_aqi(&self) -> Option<u16> {
        match *self {
            RawReading::Pm25(pm) if pm.is_finite() && pm >= 0.0 => Some(aqi::calculate_aqi(pm)),
            RawReading::Aqi(value) if value.is_finite() && value >= 0.0 => {
                let rounded = libm::round(value);
                Some(if rounded >= aqi::AQI_MAX as f64 {
                    aqi::AQI_MAX
                } else {
                    rounded as u16
                })
            }
            _ => None,
        }
    }
}

/// An AQI value tagged with its origin. `aqi == None` means no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AqiReading {
    pub aqi: Option<u16>,
    pub source: SourceKind,
    pub at_ms: u64,
}

impl AqiReading {
    pub fn valid(aqi: u16, source: SourceKind, at_ms: u64) -> Self {
        Self {
            aqi: Some(aqi),
            source,
            at_ms,
        }
    }

    pub fn no_data(source: SourceKind, at_ms: u64) -> Self {
        Self {
            aqi: None,
            source,
            at_ms,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.aqi.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pm25_to_aqi() {
        assert_eq!(RawReading::Pm25(12.0).to_aqi(), Some(50));
        assert_eq!(RawReading::Pm25(0.0).to_aqi(), Some(0));
        assert_eq!(RawReading::Pm25(-1.0).to_aqi(), None);
        assert_eq!(RawReading::Pm25(f64::NAN).to_aqi(), None);
    }

    #[test]
    fn test_precomputed_aqi() {
        assert_eq!(RawReading::Aqi(42.5).to_aqi(), Some(43));
        assert_eq!(RawReading::Aqi(812.0).to_aqi(), Some(500));
        assert_eq!(RawReading::Aqi(f64::INFINITY).to_aqi(), None);
    }

    #[test]
    fn test_zero_is_a_valid_reading() {
        let reading = AqiReading::valid(0, SourceKind::Local, 10);
        assert!(reading.is_valid());
        assert!(!AqiReading::no_data(SourceKind::Local, 10).is_valid());
    }
}
