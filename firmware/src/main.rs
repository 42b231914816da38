#![no_main]
#![no_std]
#![cfg(target_arch = "arm")]

// Third party
use panic_persist as _;

// Modules
mod monotonic_stm32l0;

#[rtic::app(device = stm32l0xx_hal::pac, peripherals = true)]
mod app {
    // Libcore
    use core::fmt::Write;

    // Third party
    use stm32l0xx_hal::gpio::{
        gpioa::{PA0, PA1, PA10, PA9},
        Analog, OpenDrain, Output, Pin, PushPull,
    };
    use stm32l0xx_hal::prelude::*;
    use stm32l0xx_hal::{
        self as hal,
        adc::{self, Adc, Align},
        delay::Delay,
        i2c::I2c,
        pac,
        pwr::PWR,
        serial::{self, Serial},
        time,
    };

    // First party crates
    use config::CONFIG;
    use powerguard_common::{
        lcd::Hd44780, power::PowerSwitch, sensor::AnalogSensors, PowerGuard,
    };

    // Crate-internal
    use crate::monotonic_stm32l0::{ExtendedLptim, LSE_FREQ};

    type I2C1 = I2c<pac::I2C1, PA10<Output<OpenDrain>>, PA9<Output<OpenDrain>>>;
    type Sensors = AnalogSensors<Adc<adc::Ready>, PA0<Analog>, PA1<Analog>>;
    type Lcd = Hd44780<I2C1, Delay>;
    type PushPullPin = Pin<Output<PushPull>>;
    type Guard = PowerGuard<Sensors, PushPullPin, PushPullPin, Lcd, Serial<pac::USART1>, LSE_FREQ>;

    const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
    const BANNER: &str = concat!(
        "PowerGuard v",
        env!("CARGO_PKG_VERSION_MAJOR"),
        ".",
        env!("CARGO_PKG_VERSION_MINOR"),
    );

    #[monotonic(binds = LPTIM1, default = true)]
    type Mono = ExtendedLptim<pac::LPTIM>;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        guard: Guard,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local, init::Monotonics) {
        let cp = ctx.core;
        let dp: pac::Peripherals = ctx.device;

        // Clock configuration. Use HSI at 16 MHz.
        let mut rcc = dp.RCC.freeze(hal::rcc::Config::hsi16());

        // The monotonic runs from the LSE
        let pwr = PWR::new(dp.PWR, &mut rcc);
        rcc.enable_lse(&pwr);
        let mono = ExtendedLptim::init(dp.LPTIM);

        // Get access to GPIOs
        let gpioa = dp.GPIOA.split(&mut rcc);
        let gpiob = dp.GPIOB.split(&mut rcc);

        // Initialize serial port for diagnostics
        let mut debug = match serial::Serial::usart1(
            dp.USART1,
            gpiob.pb6.into_floating_input(),
            gpiob.pb7.into_floating_input(),
            serial::Config {
                baudrate: time::Bps(CONFIG.debug_baudrate),
                wordlength: serial::WordLength::DataBits8,
                parity: serial::Parity::ParityNone,
                stopbits: serial::StopBits::STOP1,
            },
            &mut rcc,
        ) {
            Ok(s) => s,
            Err(e) => panic!("Error: Could not set up debug serial: {:?}", e),
        };

        writeln!(debug, "Booting: PowerGuard firmware={}", FIRMWARE_VERSION).ok();

        // Check whether we just woke up after a panic
        if let Some(msg) = panic_persist::get_panic_message_utf8() {
            // If yes, send backtrace via serial
            writeln!(debug, "=== 🔥 FOUND PANIC 🔥 ===").ok();
            writeln!(debug, "{}", msg.trim_end()).ok();
            writeln!(debug, "==== 🚒 END PANIC 🚒 ====").ok();
        }

        if let Err(e) = CONFIG.validate() {
            panic!("Error: Invalid configuration: {}", e);
        }
        if cfg!(feature = "dev") {
            writeln!(debug, "Config: {:?}", CONFIG).ok();
        }

        // Initialize sense inputs. 10 bit precision, so that a sample
        // matches `CONFIG.adc.max_value`.
        let mut adc = dp.ADC.constrain(&mut rcc);
        adc.set_precision(adc::Precision::B_10);
        adc.set_align(Align::Right);
        adc.set_sample_time(adc::SampleTime::T_79_5);
        let sensors = AnalogSensors::new(adc, gpioa.pa0.into_analog(), gpioa.pa1.into_analog());

        // Initialize relay and status LED. Both start out low.
        let power = PowerSwitch::new(
            gpioa.pa5.into_push_pull_output().downgrade(),
            gpiob.pb3.into_push_pull_output().downgrade(),
        );

        // Set up I²C and the LCD
        writeln!(debug, "Init LCD…").ok();
        let sda = gpioa.pa10.into_open_drain_output();
        let scl = gpioa.pa9.into_open_drain_output();
        let i2c = dp.I2C1.i2c(sda, scl, 100.khz(), &mut rcc);
        let delay = Delay::new(cp.SYST, rcc.clocks);
        let mut lcd = Hd44780::new(i2c, CONFIG.lcd_address, delay);
        lcd.init().unwrap_or_else(|e| {
            // Keep going, the relay must work without a display
            writeln!(debug, "LCD: Could not initialize: {:?}", e).ok();
        });

        writeln!(debug, "Initialization done").ok();

        let guard = PowerGuard::new(CONFIG, sensors, power, lcd, debug);
        (Shared {}, Local { guard }, init::Monotonics(mono))
    }

    /// Runs the control loop. Never sleeps: the guard is polled
    /// continuously and decides itself when a tick is due.
    #[idle(local = [guard])]
    fn idle(ctx: idle::Context) -> ! {
        let guard = ctx.local.guard;

        if let Err(e) = guard.start(monotonics::now(), BANNER) {
            writeln!(guard.diagnostics_mut(), "Error: {}", e).ok();
        }

        loop {
            if let Err(e) = guard.poll(monotonics::now()) {
                writeln!(guard.diagnostics_mut(), "Error: {}", e).ok();
            }
        }
    }
}
