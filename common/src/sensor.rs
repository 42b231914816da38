//! Reading the voltage and current sense inputs.

use core::fmt;

use config::Config;
use embedded_hal::adc::{Channel, OneShot};

/// The two analog inputs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SenseChannel {
    Voltage,
    Current,
}

impl SenseChannel {
    fn symbol(self) -> char {
        match self {
            Self::Voltage => 'V',
            Self::Current => 'I',
        }
    }
}

impl fmt::Display for SenseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voltage => write!(f, "voltage"),
            Self::Current => write!(f, "current"),
        }
    }
}

/// A sample that can't be turned into a physical value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SensorFault {
    /// The ADC reported an error.
    ReadFailed(SenseChannel),
    /// The sample is larger than the ADC can produce.
    OutOfRange { channel: SenseChannel, raw: u16 },
    /// The sample sits on a supply rail: the input is floating, shorted,
    /// or beyond what the front end can measure.
    Saturated { channel: SenseChannel, raw: u16 },
}

impl SensorFault {
    pub fn channel(&self) -> SenseChannel {
        match *self {
            Self::ReadFailed(channel) => channel,
            Self::OutOfRange { channel, .. } | Self::Saturated { channel, .. } => channel,
        }
    }

    /// Short description that fits the 16 visible LCD columns.
    pub fn label(&self) -> (char, &'static str) {
        let what = match self {
            Self::ReadFailed(_) => "read error",
            Self::OutOfRange { .. } => "out of range",
            Self::Saturated { .. } => "saturated",
        };
        (self.channel().symbol(), what)
    }
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(channel) => write!(f, "{} channel: ADC read failed", channel),
            Self::OutOfRange { channel, raw } => {
                write!(f, "{} channel: sample out of range (raw {})", channel, raw)
            }
            Self::Saturated { channel, raw } => {
                write!(f, "{} channel: input saturated (raw {})", channel, raw)
            }
        }
    }
}

/// One raw ADC sample per input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RawSamples {
    pub voltage: u16,
    pub current: u16,
}

/// Anything that can deliver a pair of raw samples.
pub trait SampleSource {
    fn sample(&mut self) -> Result<RawSamples, SensorFault>;
}

/// Voltage and current sense inputs on a one-shot ADC.
pub struct AnalogSensors<A, V, C> {
    adc: A,
    voltage_pin: V,
    current_pin: C,
}

impl<A, V, C> AnalogSensors<A, V, C>
where
    A: OneShot<A, u16, V> + OneShot<A, u16, C>,
    V: Channel<A>,
    C: Channel<A>,
{
    /// The ADC must already be configured for the precision given by
    /// `AdcConfig::max_value`.
    pub fn new(adc: A, voltage_pin: V, current_pin: C) -> Self {
        Self {
            adc,
            voltage_pin,
            current_pin,
        }
    }

    pub fn read_voltage_raw(&mut self) -> Result<u16, SensorFault> {
        nb::block!(OneShot::<A, u16, V>::read(&mut self.adc, &mut self.voltage_pin))
            .map_err(|_| SensorFault::ReadFailed(SenseChannel::Voltage))
    }

    pub fn read_current_raw(&mut self) -> Result<u16, SensorFault> {
        nb::block!(OneShot::<A, u16, C>::read(&mut self.adc, &mut self.current_pin))
            .map_err(|_| SensorFault::ReadFailed(SenseChannel::Current))
    }

    pub fn free(self) -> (A, V, C) {
        (self.adc, self.voltage_pin, self.current_pin)
    }
}

impl<A, V, C> SampleSource for AnalogSensors<A, V, C>
where
    A: OneShot<A, u16, V> + OneShot<A, u16, C>,
    V: Channel<A>,
    C: Channel<A>,
{
    fn sample(&mut self) -> Result<RawSamples, SensorFault> {
        Ok(RawSamples {
            voltage: self.read_voltage_raw()?,
            current: self.read_current_raw()?,
        })
    }
}

/// Convert a raw voltage sample to volts.
pub fn convert_voltage(raw: u16, config: &Config) -> f32 {
    let adc = &config.adc;
    (raw as f32) * (adc.reference_voltage / adc.max_value as f32) * adc.divider_gain
}

/// Convert a raw current sample to amps. Negative below the zero offset.
pub fn convert_current(raw: u16, config: &Config) -> f32 {
    let sensor = &config.current_sensor;
    (i32::from(raw) - i32::from(sensor.zero_offset)) as f32 * sensor.scale
}

/// The converted readings of one tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Reading {
    pub raw: RawSamples,
    /// Volts
    pub voltage: f32,
    /// Amps
    pub current: f32,
    /// Current is above the charging detection threshold
    pub charging: bool,
}

impl Reading {
    /// Validate and convert a pair of raw samples.
    pub fn from_raw(raw: RawSamples, config: &Config) -> Result<Self, SensorFault> {
        let max = config.adc.max_value;

        if raw.voltage > max {
            return Err(SensorFault::OutOfRange {
                channel: SenseChannel::Voltage,
                raw: raw.voltage,
            });
        }
        if raw.current > max {
            return Err(SensorFault::OutOfRange {
                channel: SenseChannel::Current,
                raw: raw.current,
            });
        }

        // 0 V is a legitimate voltage reading (no battery), but the current
        // sensor idles at mid-scale, so either rail means trouble.
        if raw.voltage == max {
            return Err(SensorFault::Saturated {
                channel: SenseChannel::Voltage,
                raw: raw.voltage,
            });
        }
        if raw.current == 0 || raw.current == max {
            return Err(SensorFault::Saturated {
                channel: SenseChannel::Current,
                raw: raw.current,
            });
        }

        let voltage = convert_voltage(raw.voltage, config);
        let current = convert_current(raw.current, config);
        Ok(Self {
            raw,
            voltage,
            current,
            charging: current > config.thresholds.charging_current,
        })
    }
}
