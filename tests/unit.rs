#![no_std]
#![no_main]

use defmt_rtt as _;
use defmt_test as _;
use embassy_stm32 as _;
use panic_probe as _;

use aqi_vent::indicator::duty;
use aqi_vent::site::{parse_hosts, parse_ids};
use aqi_vent::switch::decode;
use vent::SwitchPosition;

#[defmt_test::tests]
mod tests {
    use super::*;
    use defmt::assert_eq;

    #[test]
    fn test_decode_switch() {
        // Inputs are pulled up, a closed contact reads low
        assert_eq!(decode(false, false), SwitchPosition::Auto);
        assert_eq!(decode(true, false), SwitchPosition::ForceOff);
        assert_eq!(decode(false, true), SwitchPosition::ForceOn);

        // A shorted switch must not force ventilation
        assert_eq!(decode(true, true), SwitchPosition::ForceOff);
    }

    #[test]
    fn test_indicator_duty() {
        assert_eq!(duty(0, 1000), 0);
        assert_eq!(duty(255, 1000), 1000);
        assert_eq!(duty(50, 1000), 196);
        assert_eq!(duty(255, u16::MAX), u16::MAX);
    }

    #[test]
    fn test_parse_ids() {
        let ids: heapless::Vec<u32, 4> = parse_ids("1234, 5678,,abc,42").collect();
        assert_eq!(ids.as_slice(), &[1234, 5678, 42]);

        let empty: heapless::Vec<u32, 4> = parse_ids("").collect();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_hosts() {
        let hosts: heapless::Vec<&str, 4> = parse_hosts("192.168.1.50, 192.168.1.51,").collect();
        assert_eq!(hosts.as_slice(), &["192.168.1.50", "192.168.1.51"]);
    }
}
