//! Deciding on the charge state.

use core::fmt;

use config::Thresholds;

use crate::sensor::{Reading, SensorFault};

/// True once the battery voltage has reached the cutoff voltage while the
/// charge current has dropped to the cutoff current. Both bounds inclusive.
///
/// This has no memory: readings that hover around a threshold can make it
/// flip between ticks. Latching is up to the caller.
pub fn is_charging_complete(reading: &Reading, thresholds: &Thresholds) -> bool {
    reading.voltage >= thresholds.cutoff_voltage && reading.current <= thresholds.cutoff_current
}

/// What the operator is shown for a tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChargeStatus {
    Charging,
    NotCharging,
    Fault(SensorFault),
}

impl ChargeStatus {
    pub fn of(reading: &Result<Reading, SensorFault>) -> Self {
        match reading {
            Ok(r) if r.charging => Self::Charging,
            Ok(_) => Self::NotCharging,
            Err(fault) => Self::Fault(*fault),
        }
    }

    /// Text for the second LCD line.
    pub fn lcd_label(&self) -> &'static str {
        match self {
            Self::Charging => "Charging...",
            Self::NotCharging => "Not Charging",
            Self::Fault(_) => "Sensor Fault",
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charging => write!(f, "Charging"),
            Self::NotCharging => write!(f, "Not Charging"),
            Self::Fault(fault) => write!(f, "Sensor Fault ({})", fault),
        }
    }
}
