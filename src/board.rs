//! Peripheral adapters for the NUCLEO-F767ZI.
//!
//! Relays sit on PF12/PF13, the selector switch on PF14 (off) and PF15 (on),
//! and the RGB status LED on TIM1 channels 1-3 (PE9, PE11, PE13).

use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pull, Speed};
use embassy_stm32::peripherals::{IWDG, PE11, PE13, PE9, PF12, PF13, PF14, PF15, TIM1};
use embassy_stm32::time::{khz, Hertz};
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_time::{Instant, Timer};

use aqi_vent::{indicator, switch};
use vent::ports::{Clock, Indicator, Relay, RelayOutputs, Rgb, SwitchInput, Watchdog};
use vent::SwitchPosition;

/// 216 MHz from the 8 MHz ST-LINK clock; Ethernet needs HCLK >= 25 MHz.
pub fn clock_config() -> embassy_stm32::Config {
    use embassy_stm32::rcc::*;

    let mut config = embassy_stm32::Config::default();
    config.rcc.hse = Some(Hse {
        freq: Hertz(8_000_000),
        mode: HseMode::Bypass,
    });
    config.rcc.pll_src = PllSource::HSE;
    config.rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL216,
        divp: Some(PllPDiv::DIV2),
        divq: None,
        divr: None,
    });
    config.rcc.ahb_pre = AHBPrescaler::DIV1;
    config.rcc.apb1_pre = APBPrescaler::DIV4;
    config.rcc.apb2_pre = APBPrescaler::DIV2;
    config.rcc.sys = Sysclk::PLL1_P;
    config
}

pub struct Relays {
    relay1: Output<'static>,
    relay2: Output<'static>,
}

impl Relays {
    pub fn new(pf12: PF12, pf13: PF13) -> Self {
        Self {
            relay1: Output::new(pf12, Level::Low, Speed::Low),
            relay2: Output::new(pf13, Level::Low, Speed::Low),
        }
    }
}

impl RelayOutputs for Relays {
    fn write(&mut self, relay: Relay, energised: bool) {
        let pin = match relay {
            Relay::One => &mut self.relay1,
            Relay::Two => &mut self.relay2,
        };
        pin.set_level(if energised { Level::High } else { Level::Low });
    }
}

pub struct Switch {
    off: Input<'static>,
    on: Input<'static>,
}

impl Switch {
    pub fn new(pf14: PF14, pf15: PF15) -> Self {
        Self {
            off: Input::new(pf14, Pull::Up),
            on: Input::new(pf15, Pull::Up),
        }
    }
}

impl SwitchInput for Switch {
    fn read(&mut self) -> SwitchPosition {
        switch::decode(self.off.is_low(), self.on.is_low())
    }
}

pub struct RgbLed {
    pwm: SimplePwm<'static, TIM1>,
}

impl RgbLed {
    pub fn new(tim1: TIM1, red: PE9, green: PE11, blue: PE13) -> Self {
        let red = PwmPin::new_ch1(red, OutputType::PushPull);
        let green = PwmPin::new_ch2(green, OutputType::PushPull);
        let blue = PwmPin::new_ch3(blue, OutputType::PushPull);
        let mut pwm = SimplePwm::new(
            tim1,
            Some(red),
            Some(green),
            Some(blue),
            None,
            khz(1),
            CountingMode::EdgeAlignedUp,
        );
        pwm.ch1().enable();
        pwm.ch2().enable();
        pwm.ch3().enable();
        Self { pwm }
    }
}

impl Indicator for RgbLed {
    fn write_rgb(&mut self, colour: Rgb) {
        let max = self.pwm.max_duty_cycle();
        self.pwm.ch1().set_duty_cycle(indicator::duty(colour.0, max));
        self.pwm.ch2().set_duty_cycle(indicator::duty(colour.1, max));
        self.pwm.ch3().set_duty_cycle(indicator::duty(colour.2, max));
    }
}

/// Independent watchdog, running from the moment it is created.
pub struct Iwdg(IndependentWatchdog<'static, IWDG>);

impl Iwdg {
    pub fn start(iwdg: IWDG, timeout_us: u32) -> Self {
        let mut wdg = IndependentWatchdog::new(iwdg, timeout_us);
        wdg.unleash();
        Self(wdg)
    }
}

impl Watchdog for Iwdg {
    fn feed(&mut self) {
        self.0.pet();
    }
}

pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    async fn sleep_ms(&self, ms: u64) {
        Timer::after_millis(ms).await;
    }
}
