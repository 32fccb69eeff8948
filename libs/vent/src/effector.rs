//! Drives the relays and the status indicator.

use crate::decision::VentilationState;
use crate::ports::{Indicator, Relay, RelayOutputs, Rgb};

pub const VENTILATING: Rgb = Rgb(0, 50, 0);
pub const IDLE: Rgb = Rgb(50, 0, 0);
pub const LINK_CONNECTING: Rgb = Rgb(0, 0, 50);
pub const LINK_CONNECTED: Rgb = Rgb(50, 50, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    Connecting,
    Connected,
}

pub struct Effector<R, I> {
    relays: R,
    indicator: I,
}

impl<R: RelayOutputs, I: Indicator> Effector<R, I> {
    pub fn new(relays: R, indicator: I) -> Self {
        Self { relays, indicator }
    }

    /// Energises both relays while ventilating and shows the state colour.
    pub fn apply(&mut self, state: VentilationState) {
        let on = state.is_ventilating();
        self.relays.write(Relay::One, on);
        self.relays.write(Relay::Two, on);
        self.indicator
            .write_rgb(if on { VENTILATING } else { IDLE });
    }

    pub fn show_link(&mut self, status: LinkStatus) {
        self.indicator.write_rgb(match status {
            LinkStatus::Connecting => LINK_CONNECTING,
            LinkStatus::Connected => LINK_CONNECTED,
        });
    }

    pub fn relays(&self) -> &R {
        &self.relays
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }
}
