//! The sense-decide-act loop.
//!
//! [`PowerGuard`] owns all state of the firmware: the sensor inputs, the
//! relay and indicator, the display and the diagnostic stream. The main
//! loop calls [`PowerGuard::poll`] as often as it likes; every
//! `check_interval_ms` a tick runs
//!
//! 1. sense: read and convert both inputs,
//! 2. decide: evaluate the charging-complete predicate,
//! 3. act: cut power on the first tick the predicate holds,
//! 4. report: redraw the display and write a diagnostic record.
//!
//! Nothing in here blocks. The startup banner and the completion message are
//! held using deadlines instead of delays.

use core::fmt::Write;

use config::Config;
use embedded_hal::digital::v2::OutputPin;

use crate::charge::is_charging_complete;
use crate::diagnostics;
use crate::display::{Screen, TextDisplay};
use crate::error::Error;
use crate::power::{PowerState, PowerSwitch};
use crate::scheduler::{millis, Instant, TickScheduler};
use crate::sensor::{Reading, SampleSource, SensorFault};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase<const HZ: u32> {
    /// `start` was not called yet
    Idle,
    /// Showing the banner, outputs off
    Banner { until: Instant<HZ> },
    /// Monitoring the charge
    Running(PowerState),
}

/// Outcome of one tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TickReport {
    pub reading: Result<Reading, SensorFault>,
    /// The charging-complete predicate held in this tick
    pub complete: bool,
    /// Power state after the tick
    pub power: PowerState,
}

pub struct PowerGuard<S, R, L, D, W, const HZ: u32> {
    config: Config,
    sensors: S,
    power: PowerSwitch<R, L>,
    display: D,
    diagnostics: W,
    scheduler: TickScheduler<HZ>,
    phase: Phase<HZ>,
}

impl<S, R, L, D, W, E, const HZ: u32> PowerGuard<S, R, L, D, W, HZ>
where
    S: SampleSource,
    R: OutputPin<Error = E>,
    L: OutputPin<Error = E>,
    D: TextDisplay,
    W: Write,
{
    /// The outputs are not touched until [`start`](Self::start).
    pub fn new(
        config: Config,
        sensors: S,
        power: PowerSwitch<R, L>,
        display: D,
        diagnostics: W,
    ) -> Self {
        Self {
            scheduler: TickScheduler::new(millis(config.timing.check_interval_ms)),
            config,
            sensors,
            power,
            display,
            diagnostics,
            phase: Phase::Idle,
        }
    }

    /// Switch the outputs off and show `banner`. The relay is energized once
    /// the banner time has passed, even if the banner could not be drawn.
    pub fn start(&mut self, now: Instant<HZ>, banner: &str) -> Result<(), Error<E, D::Error>> {
        self.power.de_energize().map_err(Error::Output)?;
        self.phase = Phase::Banner {
            until: now + millis::<HZ>(self.config.timing.banner_ms),
        };
        writeln!(self.diagnostics, "{}", banner).ok();
        self.display
            .show(&Screen::banner(banner))
            .map_err(Error::Display)
    }

    /// Run a tick if one is due. Returns `None` when there was nothing to do.
    pub fn poll(&mut self, now: Instant<HZ>) -> Result<Option<TickReport>, Error<E, D::Error>> {
        match self.phase {
            Phase::Idle => return Ok(None),
            Phase::Banner { until } => {
                if now < until {
                    return Ok(None);
                }
                self.power.energize().map_err(Error::Output)?;
                self.phase = Phase::Running(PowerState::Powered);
                writeln!(self.diagnostics, "Power on").ok();
            }
            Phase::Running(_) => {}
        }

        if !self.scheduler.poll(now) {
            return Ok(None);
        }
        self.tick(now).map(Some)
    }

    fn tick(&mut self, now: Instant<HZ>) -> Result<TickReport, Error<E, D::Error>> {
        let reading = self
            .sensors
            .sample()
            .and_then(|raw| Reading::from_raw(raw, &self.config));

        let complete = match &reading {
            Ok(r) => is_charging_complete(r, &self.config.thresholds),
            Err(_) => false,
        };

        // The cut is latched: it happens on the first complete tick only,
        // and nothing re-energizes the relay afterwards.
        let cut = match (complete, &reading, self.power_state()) {
            (true, Ok(r), Some(PowerState::Powered)) => Some(self.cut_power(now, r)),
            _ => None,
        };

        diagnostics::write_record(&mut self.diagnostics, &reading).ok();
        match cut {
            // The completion message stays up while the scheduler holds.
            Some(result) => result?,
            None => {
                let screen = match &reading {
                    Ok(r) => Screen::readings(r),
                    Err(fault) => Screen::fault(fault),
                };
                self.display.show(&screen).map_err(Error::Display)?;
            }
        }

        Ok(TickReport {
            reading,
            complete,
            power: self.power_state().unwrap_or(PowerState::Powered),
        })
    }

    /// The phase only changes once the relay is off, a failed write is
    /// retried on the next tick.
    fn cut_power(&mut self, now: Instant<HZ>, reading: &Reading) -> Result<(), Error<E, D::Error>> {
        self.power.de_energize().map_err(Error::Output)?;
        self.phase = Phase::Running(PowerState::Cut);
        self.scheduler
            .hold(now, millis(self.config.timing.cutoff_hold_ms));
        diagnostics::write_cutoff(&mut self.diagnostics, reading).ok();
        self.display
            .show(&Screen::completion())
            .map_err(Error::Display)
    }

    /// `None` while starting up.
    pub fn power_state(&self) -> Option<PowerState> {
        match self.phase {
            Phase::Running(state) => Some(state),
            Phase::Idle | Phase::Banner { .. } => None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn outputs(&self) -> &PowerSwitch<R, L> {
        &self.power
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn diagnostics(&self) -> &W {
        &self.diagnostics
    }

    /// For log lines of the surrounding application.
    pub fn diagnostics_mut(&mut self) -> &mut W {
        &mut self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use config::CONFIG;
    use rstest::rstest;

    use crate::display::tests::RecordingDisplay;
    use crate::power::tests::FakePin;
    use crate::sensor::{RawSamples, SenseChannel};

    /// Sample source returning whatever the test put in.
    struct Script(Result<RawSamples, SensorFault>);

    impl SampleSource for Script {
        fn sample(&mut self) -> Result<RawSamples, SensorFault> {
            self.0
        }
    }

    type Guard = PowerGuard<Script, FakePin, FakePin, RecordingDisplay, String, 1000>;

    fn at(ms: u32) -> Instant<1000> {
        Instant::from_ticks(ms)
    }

    fn raw(voltage: u16, current: u16) -> Result<RawSamples, SensorFault> {
        Ok(RawSamples { voltage, current })
    }

    fn guard(samples: Result<RawSamples, SensorFault>) -> Guard {
        PowerGuard::new(
            CONFIG,
            Script(samples),
            PowerSwitch::new(FakePin::default(), FakePin::default()),
            RecordingDisplay::default(),
            String::new(),
        )
    }

    /// Start at t=0 and run up to the first tick at t=2000.
    fn started(samples: Result<RawSamples, SensorFault>) -> (Guard, TickReport) {
        let mut g = guard(samples);
        g.start(at(0), "PowerGuard v1.0").unwrap();
        let report = g.poll(at(2000)).unwrap().unwrap();
        (g, report)
    }

    fn relay_high(g: &Guard) -> bool {
        g.outputs().relay().high
    }

    fn completion_screens(g: &Guard) -> usize {
        let completion = Screen::completion();
        g.display().shown.iter().filter(|s| **s == completion).count()
    }

    #[test]
    fn test_nothing_happens_before_start() {
        let mut g = guard(raw(430, 520));
        assert_eq!(g.poll(at(5000)), Ok(None));
        assert_eq!(g.power_state(), None);
        assert!(g.display().shown.is_empty());
        assert_eq!(g.outputs().relay().writes, 0);
    }

    #[test]
    fn test_banner_then_power_on() {
        let mut g = guard(raw(307, 614));
        g.start(at(0), "PowerGuard v1.0").unwrap();
        assert_eq!(g.display().last().line(0), "PowerGuard v1.0");
        assert!(!relay_high(&g));

        for t in [1, 500, 1999] {
            assert_eq!(g.poll(at(t)), Ok(None));
            assert!(!relay_high(&g));
            assert_eq!(g.power_state(), None);
        }

        // The first tick fires together with power on
        let report = g.poll(at(2000)).unwrap();
        assert!(report.is_some());
        assert!(relay_high(&g));
        assert!(g.outputs().indicator().high);
        assert_eq!(g.power_state(), Some(PowerState::Powered));
        assert!(g.diagnostics().starts_with("PowerGuard v1.0\nPower on\n"));
    }

    #[test]
    fn test_charging_keeps_power_on() {
        // 3.0 V, 0.5 A
        let (g, report) = started(raw(307, 614));
        let r = report.reading.unwrap();
        assert!(r.charging);
        assert!(!report.complete);
        assert_eq!(report.power, PowerState::Powered);
        assert!(relay_high(&g));

        let screen = g.display().last();
        assert_eq!(screen.line(0), "3.0V 0.5A");
        assert_eq!(screen.line(1), "Charging...");
        assert!(g
            .diagnostics()
            .contains("Voltage: 3.00V, Current: 0.50A, Status: Charging"));
    }

    #[rstest]
    #[case(430, 532)] // 4.20 V, 0.098 A
    #[case(460, 522)] // 4.50 V, 0.049 A
    fn test_complete_cuts_power(#[case] voltage: u16, #[case] current: u16) {
        let (g, report) = started(raw(voltage, current));
        assert!(report.complete);
        assert_eq!(report.power, PowerState::Cut);
        assert_eq!(g.power_state(), Some(PowerState::Cut));
        assert!(!relay_high(&g));
        assert!(!g.outputs().indicator().high);

        let screen = g.display().last();
        assert_eq!(screen.line(0), "Charging Complete");
        assert_eq!(screen.line(1), "Power Cut Off");

        // The tick still produces its record
        assert!(g.diagnostics().contains("power cut off"));
        assert!(g.diagnostics().contains("Status: Not Charging"));
    }

    #[test]
    fn test_cut_is_latched() {
        let (mut g, _) = started(raw(430, 520));
        assert_eq!(completion_screens(&g), 1);

        // Completion message is held for 5 s
        for t in (2001..7000).step_by(100) {
            assert_eq!(g.poll(at(t)), Ok(None));
        }
        assert_eq!(g.display().last(), &Screen::completion());

        // Predicate still true: no second cut, readings are shown again
        let report = g.poll(at(7000)).unwrap().unwrap();
        assert!(report.complete);
        assert_eq!(report.power, PowerState::Cut);
        assert!(!relay_high(&g));
        assert_eq!(completion_screens(&g), 1);
        assert_eq!(g.display().last().line(0), "4.2V 0.0A");
        assert_eq!(g.diagnostics().matches("power cut off").count(), 1);

        // Back to the regular interval after the hold
        assert_eq!(g.poll(at(7999)), Ok(None));
        assert!(g.poll(at(8000)).unwrap().is_some());
    }

    #[test]
    fn test_power_is_not_restored() {
        let (mut g, _) = started(raw(430, 520));
        let relay_writes = g.outputs().relay().writes;

        // Readings flicker back to "charging"
        g.sensors_mut().0 = raw(307, 614);
        let report = g.poll(at(7000)).unwrap().unwrap();
        assert!(!report.complete);
        assert_eq!(report.power, PowerState::Cut);
        assert!(!relay_high(&g));

        g.sensors_mut().0 = raw(430, 520);
        g.poll(at(8000)).unwrap().unwrap();
        assert!(!relay_high(&g));
        assert_eq!(g.outputs().relay().writes, relay_writes);
        assert_eq!(completion_screens(&g), 1);
    }

    #[rstest]
    #[case(raw(430, 0), SensorFault::Saturated { channel: SenseChannel::Current, raw: 0 })]
    #[case(raw(1023, 520), SensorFault::Saturated { channel: SenseChannel::Voltage, raw: 1023 })]
    #[case(Err(SensorFault::ReadFailed(SenseChannel::Voltage)), SensorFault::ReadFailed(SenseChannel::Voltage))]
    fn test_fault_never_cuts(
        #[case] samples: Result<RawSamples, SensorFault>,
        #[case] fault: SensorFault,
    ) {
        let (g, report) = started(samples);
        assert_eq!(report.reading, Err(fault));
        assert!(!report.complete);
        assert_eq!(report.power, PowerState::Powered);
        assert!(relay_high(&g));

        assert_eq!(g.display().last(), &Screen::fault(&fault));
        assert!(g.diagnostics().contains("Sensor fault: "));
    }

    #[test]
    fn test_tick_interval() {
        let (mut g, _) = started(raw(307, 614));
        let mut ticks = Vec::new();
        for t in 2001..6000 {
            if g.poll(at(t)).unwrap().is_some() {
                ticks.push(t);
            }
        }
        assert_eq!(ticks, [3000, 4000, 5000]);
    }

    #[test]
    fn test_display_error_is_reported() {
        let (mut g, _) = started(raw(307, 614));
        g.display.fail = true;
        assert_eq!(g.poll(at(3000)), Err(Error::Display("i2c nack")));

        // The loop keeps going once the display recovers
        g.display.fail = false;
        assert!(g.poll(at(4000)).unwrap().is_some());
    }

    #[test]
    fn test_failed_banner_still_powers_on() {
        let mut g = guard(raw(307, 614));
        g.display.fail = true;
        assert_eq!(g.start(at(0), "PowerGuard v1.0"), Err(Error::Display("i2c nack")));
        assert!(!relay_high(&g));
        g.display.fail = false;

        assert_eq!(g.poll(at(1999)), Ok(None));
        assert!(g.poll(at(2000)).unwrap().is_some());
        assert!(relay_high(&g));
        assert_eq!(g.power_state(), Some(PowerState::Powered));
    }

    #[test]
    fn test_failed_completion_screen_still_cuts() {
        let mut g = guard(raw(430, 520));
        g.start(at(0), "PowerGuard v1.0").unwrap();
        g.display.fail = true;
        assert_eq!(g.poll(at(2000)), Err(Error::Display("i2c nack")));

        assert!(!relay_high(&g));
        assert_eq!(g.power_state(), Some(PowerState::Cut));
        assert!(g.diagnostics().contains("power cut off"));
        assert!(g.diagnostics().contains("Status: Not Charging"));

        // Still held, and no second cut once the display is back
        g.display.fail = false;
        assert_eq!(g.poll(at(6999)), Ok(None));
        let report = g.poll(at(7000)).unwrap().unwrap();
        assert_eq!(report.power, PowerState::Cut);
        assert_eq!(completion_screens(&g), 0);
        assert_eq!(g.diagnostics().matches("power cut off").count(), 1);
    }
}
