#![cfg_attr(not(test), no_std)]
//! Hardware independent part of the PowerGuard firmware.
//!
//! Everything in here is generic over the `embedded-hal` traits, so that
//! the control loop can be exercised on the host. The firmware crate only
//! wires the STM32L0 peripherals into [`controller::PowerGuard`].

pub mod charge;
pub mod controller;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod lcd;
pub mod power;
pub mod scheduler;
pub mod sensor;

pub use controller::{PowerGuard, TickReport};
pub use error::Error;
