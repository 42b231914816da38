//! HD44780 character LCD behind a PCF8574 I²C port expander.
//!
//! The expander's 8 outputs are wired to the display like this (the usual
//! "LCM1602" backpack):
//!
//! ```text
//!   P7 P6 P5 P4 | P3        | P2 | P1 | P0
//!   D7 D6 D5 D4 | backlight | E  | RW | RS
//! ```
//!
//! The display runs in 4-bit mode, every byte is sent as two nibbles, each
//! latched by a pulse on E. RW is always low (write only).

use embedded_hal::blocking::{
    delay::{DelayMs, DelayUs},
    i2c::Write,
};

use crate::display::{Screen, TextDisplay};

const REGISTER_SELECT: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

/// DDRAM address of the first column of each row
const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

/// DDRAM columns per row, the visible 16 included
const ROW_LENGTH: u8 = 40;

/// Instruction bytes, see HD44780 datasheet table 6.
mod commands {
    /// Clear display and return the cursor home. Takes 1.52 ms.
    pub const CLEAR: u8 = 0x01;

    /// Cursor moves right after each character, no display shift.
    pub const ENTRY_MODE_INCREMENT: u8 = 0x06;

    /// Display on, cursor off, blink off.
    pub const DISPLAY_ON: u8 = 0x0C;

    /// 8-bit interface. Only the upper nibble is sent during reset.
    pub const FUNCTION_8BIT: u8 = 0x30;

    /// 4-bit interface, only the upper nibble is sent when switching.
    pub const FUNCTION_4BIT: u8 = 0x20;

    /// 4-bit interface, two lines, 5x8 dots.
    pub const FUNCTION_4BIT_2LINE: u8 = 0x28;

    /// Set DDRAM address, OR-ed with the address.
    pub const SET_DDRAM_ADDR: u8 = 0x80;
}

pub struct Hd44780<I2C, D> {
    i2c: I2C,
    address: u8,
    delay: D,
    backlight: u8,
}

impl<I2C, D, E> Hd44780<I2C, D>
where
    I2C: Write<Error = E>,
    D: DelayUs<u16> + DelayMs<u16>,
{
    /// Create the driver. The display is not touched until [`init`](Self::init).
    pub fn new(i2c: I2C, address: u8, delay: D) -> Self {
        Self {
            i2c,
            address,
            delay,
            backlight: BACKLIGHT,
        }
    }

    /// Run the initialization-by-instruction sequence (datasheet figure 24)
    /// and switch to 4-bit mode. Leaves the display cleared and on.
    pub fn init(&mut self) -> Result<(), E> {
        // Wait for Vcc to settle after power-on
        self.delay.delay_ms(50);

        // Three times 8-bit mode to get into a known state, no matter which
        // nibble the controller was waiting for.
        self.write_nibble(commands::FUNCTION_8BIT, false)?;
        self.delay.delay_us(4_500);
        self.write_nibble(commands::FUNCTION_8BIT, false)?;
        self.delay.delay_us(4_500);
        self.write_nibble(commands::FUNCTION_8BIT, false)?;
        self.delay.delay_us(150);
        self.write_nibble(commands::FUNCTION_4BIT, false)?;

        self.command(commands::FUNCTION_4BIT_2LINE)?;
        self.command(commands::DISPLAY_ON)?;
        self.command(commands::ENTRY_MODE_INCREMENT)?;
        self.clear()
    }

    pub fn clear(&mut self) -> Result<(), E> {
        self.command(commands::CLEAR)?;
        self.delay.delay_us(2_000);
        Ok(())
    }

    /// Move the cursor. Rows beyond the second wrap to the first, columns
    /// beyond the end of a row stay on its last column.
    pub fn set_cursor(&mut self, row: u8, col: u8) -> Result<(), E> {
        let offset = ROW_OFFSETS[usize::from(row) % ROW_OFFSETS.len()];
        let col = col.min(ROW_LENGTH - 1);
        self.command(commands::SET_DDRAM_ADDR | (offset + col))
    }

    /// Write text at the cursor position. Non-ASCII characters are shown
    /// as `?`.
    pub fn write_str(&mut self, s: &str) -> Result<(), E> {
        for c in s.chars() {
            let byte = if c.is_ascii() { c as u8 } else { b'?' };
            self.send(byte, true)?;
        }
        Ok(())
    }

    /// Switch the backlight. Takes effect with the next transfer, so an
    /// empty write is issued right away.
    pub fn set_backlight(&mut self, on: bool) -> Result<(), E> {
        self.backlight = if on { BACKLIGHT } else { 0 };
        self.i2c.write(self.address, &[self.backlight])
    }

    pub fn free(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn command(&mut self, cmd: u8) -> Result<(), E> {
        self.send(cmd, false)
    }

    fn send(&mut self, byte: u8, data: bool) -> Result<(), E> {
        self.write_nibble(byte & 0xF0, data)?;
        self.write_nibble(byte << 4, data)
    }

    /// Latch the upper four bits of `nibble` with an enable pulse.
    fn write_nibble(&mut self, nibble: u8, data: bool) -> Result<(), E> {
        let rs = if data { REGISTER_SELECT } else { 0 };
        let frame = (nibble & 0xF0) | self.backlight | rs;
        self.i2c.write(self.address, &[frame | ENABLE])?;
        self.delay.delay_us(1);
        self.i2c.write(self.address, &[frame])?;
        // Most instructions take 37 µs
        self.delay.delay_us(50);
        Ok(())
    }
}

impl<I2C, D, E> TextDisplay for Hd44780<I2C, D>
where
    I2C: Write<Error = E>,
    D: DelayUs<u16> + DelayMs<u16>,
{
    type Error = E;

    fn show(&mut self, screen: &Screen) -> Result<(), E> {
        self.clear()?;
        for (row, line) in screen.lines().iter().enumerate() {
            self.set_cursor(row as u8, 0)?;
            self.write_str(line)?;
        }
        Ok(())
    }
}
