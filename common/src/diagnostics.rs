//! Diagnostic records written to the serial log, one line per tick.

use core::fmt::{self, Write};

use crate::charge::ChargeStatus;
use crate::sensor::{Reading, SensorFault};

/// `Voltage: 4.20V, Current: 0.04A, Status: Not Charging`
///
/// With the `dev` feature the raw ADC samples are appended.
pub fn write_record<W: Write>(w: &mut W, reading: &Result<Reading, SensorFault>) -> fmt::Result {
    match reading {
        Ok(r) => {
            write!(
                w,
                "Voltage: {:.2}V, Current: {:.2}A, Status: {}",
                r.voltage,
                r.current,
                ChargeStatus::of(reading)
            )?;
            if cfg!(feature = "dev") {
                write!(w, " (raw 0x{:03x}, 0x{:03x})", r.raw.voltage, r.raw.current)?;
            }
            writeln!(w)
        }
        Err(fault) => writeln!(w, "Sensor fault: {}", fault),
    }
}

/// Logged once when the relay is opened.
pub fn write_cutoff<W: Write>(w: &mut W, reading: &Reading) -> fmt::Result {
    writeln!(
        w,
        "Charging complete at {:.2}V, {:.2}A: power cut off",
        reading.voltage, reading.current
    )
}
