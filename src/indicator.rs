//! RGB indicator helpers.

/// Scales an 8-bit colour channel to a PWM compare value.
///
/// # Examples
///
/// ```
/// use aqi_vent::indicator::duty;
///
/// assert_eq!(duty(0, 1000), 0);
/// assert_eq!(duty(255, 1000), 1000);
/// ```
pub fn duty(channel: u8, max_duty: u16) -> u16 {
    (channel as u32 * max_duty as u32 / u8::MAX as u32) as u16
}
