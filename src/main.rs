#![no_std]
#![no_main]

extern crate alloc;

mod board;
mod net;

use defmt::{error, info, unwrap};
use embassy_executor::Spawner;
use embassy_stm32::bind_interrupts;
use embassy_stm32::eth::generic_smi::GenericSMI;
use embassy_stm32::eth::{self, Ethernet, PacketQueue};
use embassy_stm32::peripherals;
use embassy_stm32::rng::{self, Rng};
use embassy_time::Timer;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use aqi_vent::{heap, site};
use vent::effector::Effector;
use vent::ports::Platform;
use vent::Controller;

// The ventilation fan must not be left running on a hung controller
const WATCHDOG_TIMEOUT_US: u32 = 16_000_000;

// Locally administered address
const MAC_ADDR: [u8; 6] = [0x02, 0x00, 0x00, 0xA0, 0x1E, 0x01];

bind_interrupts!(struct Irqs {
    ETH => eth::InterruptHandler;
    RNG => rng::InterruptHandler<peripherals::RNG>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    heap::init();
    let p = embassy_stm32::init(board::clock_config());
    info!("aqi_vent starting");

    let watchdog = board::Iwdg::start(p.IWDG, WATCHDOG_TIMEOUT_US);

    let effector = Effector::new(
        board::Relays::new(p.PF12, p.PF13),
        board::RgbLed::new(p.TIM1, p.PE9, p.PE11, p.PE13),
    );
    let mut switch = board::Switch::new(p.PF14, p.PF15);

    let controller = site::config().and_then(|config| vent::Controller::new(&config, effector));
    let mut controller: Controller<_, _> = match controller {
        Ok(controller) => controller,
        Err(e) => {
            error!("invalid configuration: {}", e);
            // Never feed the watchdog again; it resets the board
            loop {
                Timer::after_secs(1).await;
            }
        }
    };

    // Seed for both the IP stack and TLS
    let mut rng = Rng::new(p.RNG, Irqs);
    let mut seed = [0; 8];
    unwrap!(rng.async_fill_bytes(&mut seed).await);
    let seed = u64::from_le_bytes(seed);

    static PACKETS: StaticCell<PacketQueue<4, 4>> = StaticCell::new();
    let device = Ethernet::new(
        PACKETS.init(PacketQueue::<4, 4>::new()),
        p.ETH,
        Irqs,
        p.PA1,
        p.PA2,
        p.PC1,
        p.PA7,
        p.PC4,
        p.PC5,
        p.PG13,
        p.PB13,
        p.PG11,
        GenericSMI::new(0),
        MAC_ADDR,
    );
    let (stack, runner) = net::stack(device, seed);
    unwrap!(spawner.spawn(net::net_task(runner)));

    let mut platform = Platform::new(
        net::NetTransport::new(stack, seed),
        net::Link::new(stack),
        board::EmbassyClock,
        watchdog,
    );

    controller.start(&mut platform).await;
    controller.run(&mut platform, &mut switch).await;

    // Periodic restart clears anything the network stack may have leaked
    info!("maximum run time reached, resetting");
    cortex_m::peripheral::SCB::sys_reset();
}
