//! Fixed-period tick scheduler.
//!
//! The scheduler is polled from a busy loop. It never blocks: a poll either
//! starts a tick or returns right away. Missed periods are dropped, not
//! caught up.
//!
//! Instants are `fugit` timer instants at the monotonic's tick rate `HZ`.
//! Their comparison wraps around, so a 32-bit counter overflow is fine as
//! long as polls are less than half the counter range apart.

use fugit::ExtU32;

pub type Instant<const HZ: u32> = fugit::TimerInstantU32<HZ>;
pub type Duration<const HZ: u32> = fugit::TimerDurationU32<HZ>;

/// Convert milliseconds to a duration at the tick rate `HZ`.
pub fn millis<const HZ: u32>(ms: u32) -> Duration<HZ> {
    ms.millis()
}

pub struct TickScheduler<const HZ: u32> {
    interval: Duration<HZ>,
    /// Start of the last tick
    last: Option<Instant<HZ>>,
    /// No tick fires before this instant
    hold_until: Option<Instant<HZ>>,
}

impl<const HZ: u32> TickScheduler<HZ> {
    pub fn new(interval: Duration<HZ>) -> Self {
        Self {
            interval,
            last: None,
            hold_until: None,
        }
    }

    /// Return whether a tick is due at `now`. If so, `now` becomes the
    /// reference point for the next one.
    ///
    /// The first poll (and the first poll after a hold) fires immediately,
    /// since the interval has already elapsed by then.
    pub fn poll(&mut self, now: Instant<HZ>) -> bool {
        if let Some(until) = self.hold_until {
            if now < until {
                return false;
            }
            self.hold_until = None;
        }

        let due = match self.last {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .map_or(false, |elapsed| elapsed >= self.interval),
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    /// Suppress all ticks until `now + duration`.
    pub fn hold(&mut self, now: Instant<HZ>, duration: Duration<HZ>) {
        self.hold_until = Some(now + duration);
    }

    pub fn is_holding(&self) -> bool {
        self.hold_until.is_some()
    }

    pub fn interval(&self) -> Duration<HZ> {
        self.interval
    }
}

/// Extend a 16-bit hardware count with the number of counter overflows.
///
/// Timers like the STM32 LPTIM raise their overflow flag as soon as the
/// counter *reaches* `0xffff`, one count before it wraps to 0. The count is
/// shifted by one so that `0xffff` is already the first tick of the next
/// period. That way the flag and the low half always agree.
pub fn extend_counter(overflows: u16, counter: u16) -> u32 {
    (u32::from(overflows) << 16) | u32::from(counter.wrapping_add(1))
}

/// Compare register value at which the extended counter reaches `ticks`.
pub fn compare_value(ticks: u32) -> u16 {
    (ticks as u16).wrapping_sub(1)
}
