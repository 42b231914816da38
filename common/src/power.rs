//! Controlling the load relay and the status indicator.

use embedded_hal::digital::v2::OutputPin;

/// Whether power is delivered to the load.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PowerState {
    Powered,
    Cut,
}

/// Relay and status indicator. Both are driven high while the load is
/// powered.
pub struct PowerSwitch<R, L> {
    /// Load relay
    relay: R,
    /// Status indicator LED
    indicator: L,
}

impl<R, L, E> PowerSwitch<R, L>
where
    R: OutputPin<Error = E>,
    L: OutputPin<Error = E>,
{
    pub fn new(relay: R, indicator: L) -> Self {
        Self { relay, indicator }
    }

    pub fn energize(&mut self) -> Result<(), E> {
        self.relay.set_high()?;
        self.indicator.set_high()
    }

    /// Drop the relay first, the indicator only follows.
    pub fn de_energize(&mut self) -> Result<(), E> {
        self.relay.set_low()?;
        self.indicator.set_low()
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }

    pub fn free(self) -> (R, L) {
        (self.relay, self.indicator)
    }
}
