//! Screen contents for the 16x2 character display.

use core::fmt::{self, Write};

use heapless::String;

use crate::charge::ChargeStatus;
use crate::sensor::{Reading, SensorFault};

pub const ROWS: usize = 2;
pub const COLUMNS: usize = 16;

/// Length of one line of HD44780 display RAM. Characters beyond
/// [`COLUMNS`] are stored but not visible.
pub const LINE_CAPACITY: usize = 40;

pub type Line = String<LINE_CAPACITY>;

/// Writer that silently drops whatever doesn't fit into the line.
struct Clipped<'a>(&'a mut Line);

impl Write for Clipped<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn line(args: fmt::Arguments<'_>) -> Line {
    let mut line = Line::new();
    // Clipped never fails; a failing Display impl only truncates the line.
    let _ = Clipped(&mut line).write_fmt(args);
    line
}

/// The full contents of the display, redrawn as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Screen {
    lines: [Line; ROWS],
}

impl Screen {
    pub fn new(first: &str, second: &str) -> Self {
        Self {
            lines: [line(format_args!("{}", first)), line(format_args!("{}", second))],
        }
    }

    /// Startup banner, second line left empty.
    pub fn banner(text: &str) -> Self {
        Self::new(text, "")
    }

    /// `"4.2V 0.1A"` / `"Charging..."`.
    pub fn readings(reading: &Reading) -> Self {
        let status = ChargeStatus::of(&Ok(*reading));
        Self {
            lines: [
                line(format_args!("{:.1}V {:.1}A", reading.voltage, reading.current)),
                line(format_args!("{}", status.lcd_label())),
            ],
        }
    }

    pub fn fault(fault: &SensorFault) -> Self {
        let (channel, what) = fault.label();
        Self {
            lines: [
                line(format_args!("{}", ChargeStatus::Fault(*fault).lcd_label())),
                line(format_args!("{}: {}", channel, what)),
            ],
        }
    }

    /// Shown once when power is cut.
    pub fn completion() -> Self {
        Self::new("Charging Complete", "Power Cut Off")
    }

    pub fn lines(&self) -> &[Line; ROWS] {
        &self.lines
    }

    /// # Panics
    ///
    /// If `row` is not below [`ROWS`].
    pub fn line(&self, row: usize) -> &str {
        &self.lines[row]
    }

    /// The part of a line that fits on the display. Panics like
    /// [`line`](Self::line).
    pub fn visible(&self, row: usize) -> &str {
        let text = self.line(row);
        match text.char_indices().nth(COLUMNS) {
            Some((end, _)) => &text[..end],
            None => text,
        }
    }
}

/// A character display that can show a [`Screen`].
pub trait TextDisplay {
    type Error;

    /// Clear the display and write all lines.
    fn show(&mut self, screen: &Screen) -> Result<(), Self::Error>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use rstest::rstest;

    use crate::sensor::{RawSamples, SenseChannel};

    /// Display double that records every screen.
    #[derive(Default)]
    pub(crate) struct RecordingDisplay {
        pub shown: Vec<Screen>,
        pub fail: bool,
    }

    impl RecordingDisplay {
        pub fn last(&self) -> &Screen {
            self.shown.last().unwrap()
        }
    }

    impl TextDisplay for RecordingDisplay {
        type Error = &'static str;

        fn show(&mut self, screen: &Screen) -> Result<(), Self::Error> {
            if self.fail {
                return Err("i2c nack");
            }
            self.shown.push(screen.clone());
            Ok(())
        }
    }

    fn reading(voltage: f32, current: f32, charging: bool) -> Reading {
        Reading {
            raw: RawSamples {
                voltage: 0,
                current: 0,
            },
            voltage,
            current,
            charging,
        }
    }

    #[rstest]
    #[case(3.0, 0.5, true, "3.0V 0.5A", "Charging...")]
    #[case(4.2033, 0.0392, false, "4.2V 0.0A", "Not Charging")]
    #[case(0.0, -0.49, false, "0.0V -0.5A", "Not Charging")]
    #[case(10.0, 2.5, true, "10.0V 2.5A", "Charging...")]
    fn test_readings_screen(
        #[case] voltage: f32,
        #[case] current: f32,
        #[case] charging: bool,
        #[case] first: &str,
        #[case] second: &str,
    ) {
        let screen = Screen::readings(&reading(voltage, current, charging));
        assert_eq!(screen.line(0), first);
        assert_eq!(screen.line(1), second);
    }

    #[test]
    fn test_completion_screen() {
        let screen = Screen::completion();
        assert_eq!(screen.line(0), "Charging Complete");
        assert_eq!(screen.line(1), "Power Cut Off");
        // 17 characters, the last one is outside the visible area
        assert_eq!(screen.visible(0), "Charging Complet");
        assert_eq!(screen.visible(1), "Power Cut Off");
    }

    #[test]
    fn test_fault_screen() {
        let screen = Screen::fault(&SensorFault::OutOfRange {
            channel: SenseChannel::Voltage,
            raw: 2000,
        });
        assert_eq!(screen.line(0), "Sensor Fault");
        assert_eq!(screen.line(1), "V: out of range");
    }

    #[test]
    fn test_overlong_line_is_clipped() {
        let long = "0123456789".repeat(5);
        let screen = Screen::banner(&long);
        assert_eq!(screen.line(0).len(), LINE_CAPACITY);
        assert_eq!(screen.line(0), &long[..LINE_CAPACITY]);
        assert_eq!(screen.line(1), "");
    }

    #[test]
    #[should_panic]
    fn test_line_beyond_last_row() {
        Screen::completion().line(ROWS);
    }
}
