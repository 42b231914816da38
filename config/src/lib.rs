#![cfg_attr(not(test), no_std)]
//! # Device Configuration
//!
//! The device configuration is fixed at compile time. There is no EEPROM
//! layout and no runtime configuration surface: the firmware reads
//! [`CONFIG`] and validates it once during init.
//!
//! ## Signal chain
//!
//! ```text
//!   battery + ──┬── R ──┬── PA0 (ADC, 10 bit)        voltage = raw * Vref / 1023 * gain
//!               │       R
//!               │       │
//!              GND ─────┘
//!
//!   load ── ACS712 ── PA1 (ADC, 10 bit)              current = (raw - 512) * 0.0049 A
//! ```
//!
//! ## Fields
//!
//! ### ADC (`adc`)
//!
//! - `reference_voltage`: ADC reference in volts
//! - `max_value`: highest raw sample, `2^bits - 1`
//! - `divider_gain`: inverse ratio of the voltage sense divider
//!
//! ### Current sensor (`current_sensor`)
//!
//! - `zero_offset`: raw sample at zero current (mid-scale for an ACS712)
//! - `scale`: amps per ADC step
//!
//! ### Thresholds (`thresholds`)
//!
//! Power is cut once `voltage >= cutoff_voltage` and
//! `current <= cutoff_current` hold in the same tick. A reading is shown
//! as "charging" while `current > charging_current`.
//!
//! ### Timing (`timing`)
//!
//! All values in milliseconds.

use core::fmt;

#[derive(PartialEq, Debug, Copy, Clone)]
pub struct AdcConfig {
    /// ADC reference voltage (V)
    pub reference_voltage: f32,
    /// Largest raw value the ADC can produce
    pub max_value: u16,
    /// Gain of the voltage divider in front of the voltage sense pin
    pub divider_gain: f32,
}

#[derive(PartialEq, Debug, Copy, Clone)]
pub struct CurrentSensorConfig {
    /// Raw sample that corresponds to 0 A
    pub zero_offset: u16,
    /// Amps per ADC step
    pub scale: f32,
}

#[derive(PartialEq, Debug, Copy, Clone)]
pub struct Thresholds {
    /// Minimum voltage (V) for the charge to count as complete
    pub cutoff_voltage: f32,
    /// Maximum current (A) for the charge to count as complete
    pub cutoff_current: f32,
    /// Current (A) above which the load is considered to be charging
    pub charging_current: f32,
}

#[derive(PartialEq, Debug, Copy, Clone)]
pub struct Timing {
    /// Period of the sense-decide-act loop
    pub check_interval_ms: u32,
    /// How long the startup banner is shown before the relay is energized
    pub banner_ms: u32,
    /// How long the completion message is held after cutting power
    pub cutoff_hold_ms: u32,
}

#[derive(PartialEq, Debug, Copy, Clone)]
pub struct Config {
    pub adc: AdcConfig,
    pub current_sensor: CurrentSensorConfig,
    pub thresholds: Thresholds,
    pub timing: Timing,
    /// 7-bit I²C address of the PCF8574 LCD backpack
    pub lcd_address: u8,
    /// Baudrate of the diagnostic serial port
    pub debug_baudrate: u32,
}

/// The configuration the firmware is built with.
pub const CONFIG: Config = Config {
    adc: AdcConfig {
        reference_voltage: 5.0,
        max_value: 1023,
        divider_gain: 2.0,
    },
    current_sensor: CurrentSensorConfig {
        zero_offset: 512,
        scale: 0.0049,
    },
    thresholds: Thresholds {
        cutoff_voltage: 4.2,
        cutoff_current: 0.1,
        charging_current: 0.1,
    },
    timing: Timing {
        check_interval_ms: 1000,
        banner_ms: 2000,
        cutoff_hold_ms: 5000,
    },
    lcd_address: 0x27,
    debug_baudrate: 9600,
};

#[derive(PartialEq, Debug, Copy, Clone)]
pub enum ConfigError {
    /// The zero-current offset lies outside the ADC range.
    ZeroOffsetOutOfRange(u16),
    /// A conversion factor is zero or negative.
    NonPositiveFactor(&'static str),
    /// The charging detection threshold lies above the cutoff current, so
    /// a completed charge could still be shown as charging.
    ChargingAboveCutoff,
    /// The loop interval is zero.
    ZeroInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroOffsetOutOfRange(v) => {
                write!(f, "Current sensor zero offset out of ADC range ({})", v)
            }
            Self::NonPositiveFactor(name) => write!(f, "Factor `{}` must be positive", name),
            Self::ChargingAboveCutoff => {
                write!(f, "Charging threshold must not exceed cutoff current")
            }
            Self::ZeroInterval => write!(f, "Check interval must not be zero"),
        }
    }
}

impl Config {
    /// Check the configuration for values the control loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.current_sensor.zero_offset > self.adc.max_value {
            return Err(ConfigError::ZeroOffsetOutOfRange(
                self.current_sensor.zero_offset,
            ));
        }

        // Written as `!(x > 0)` so that NaN is rejected too
        let factors = [
            ("reference_voltage", self.adc.reference_voltage),
            ("divider_gain", self.adc.divider_gain),
            ("scale", self.current_sensor.scale),
        ];
        for (name, value) in factors {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositiveFactor(name));
            }
        }
        if self.adc.max_value == 0 {
            return Err(ConfigError::NonPositiveFactor("max_value"));
        }

        if self.thresholds.charging_current > self.thresholds.cutoff_current {
            return Err(ConfigError::ChargingAboveCutoff);
        }

        if self.timing.check_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        Ok(())
    }
}
