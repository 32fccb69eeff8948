//! Three-position selector decoding.
//!
//! The switch pulls one of two inputs to ground; both inputs have pull-ups,
//! so the centre position reads high on both.

use vent::SwitchPosition;

/// Maps the two input levels (`true` = pulled low) to a position.
///
/// Both inputs low cannot happen with a working switch; it is treated as
/// off so a wiring fault never forces the fan on.
pub fn decode(off_low: bool, on_low: bool) -> SwitchPosition {
    match (off_low, on_low) {
        (true, _) => SwitchPosition::ForceOff,
        (false, true) => SwitchPosition::ForceOn,
        (false, false) => SwitchPosition::Auto,
    }
}
