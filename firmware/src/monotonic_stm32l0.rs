//! Uptime clock on the STM32L0 low-power timer, usable as RTIC monotonic.
//!
//! LPTIM runs from the 32.768 kHz LSE and is software-extended from 16 to
//! 32 bits by counting overflows, see
//! [`extend_counter`](powerguard_common::scheduler::extend_counter). One
//! overflow happens every 2 seconds, the extended counter wraps after about
//! 36 hours. Instants compare with
//! wrap-around, so the control loop keeps running across the wrap.
//!
//! No tasks are scheduled on this monotonic, the idle loop only polls
//! `now()`. That's why the overflow (ARRM) interrupt is enabled
//! permanently, otherwise the overflow counter would only advance on
//! compare matches.

use powerguard_common::scheduler::{compare_value, extend_counter};
use rtic::Monotonic;
use stm32l0xx_hal::pac;

pub const LSE_FREQ: u32 = 32_768;

/// Software-extended LPTIM.
pub struct ExtendedLptim<TIM> {
    timer: TIM,
    overflow: u16,
}

impl ExtendedLptim<pac::LPTIM> {
    /// The LSE must be running before the timer is started.
    pub fn init(timer: pac::LPTIM) -> Self {
        // Correctness: Only LPTIM related bits of the RCC register block are
        // modified, and we own pac::LPTIM.
        unsafe {
            let rcc = &*pac::RCC::ptr();

            // Select clock source: LSE
            rcc.ccipr.modify(|_, w| w.lptim1sel().lse());

            // Enable timer clock
            rcc.apb1enr.modify(|_, w| w.lptim1en().set_bit());

            // Reset timer
            rcc.apb1rstr.modify(|_, w| w.lptim1rst().set_bit());
            rcc.apb1rstr.modify(|_, w| w.lptim1rst().clear_bit());
        }

        // IER may only be written while the timer is disabled
        timer
            .ier
            .modify(|_, w| w.cmpmie().set_bit().arrmie().set_bit());

        Self { timer, overflow: 0 }
    }

    fn is_overflow(&self) -> bool {
        self.timer.isr.read().arrm().bit_is_set()
    }

    fn clear_overflow_flag(&self) {
        self.timer.icr.write(|w| w.arrmcf().set_bit());
    }
}

impl Monotonic for ExtendedLptim<pac::LPTIM> {
    // Overflows are counted in the interrupt, it must never be disabled.
    const DISABLE_INTERRUPT_ON_EMPTY_QUEUE: bool = false;

    type Instant = fugit::TimerInstantU32<LSE_FREQ>;
    type Duration = fugit::TimerDurationU32<LSE_FREQ>;

    #[inline(always)]
    fn now(&mut self) -> Self::Instant {
        let counter = self.timer.cnt.read().cnt().bits();

        // An overflow whose interrupt is still pending has not been counted
        // yet. The flag is raised at 0xffff, so the counter read before the
        // check may be stale. Read it again.
        let (overflow, counter) = if self.is_overflow() {
            let counter_after = self.timer.cnt.read().cnt().bits();
            (self.overflow.wrapping_add(1), counter_after)
        } else {
            (self.overflow, counter)
        };

        Self::Instant::from_ticks(extend_counter(overflow, counter))
    }

    #[inline(always)]
    fn zero() -> Self::Instant {
        Self::Instant::from_ticks(0)
    }

    /// Called once by RTIC after `#[init]`.
    ///
    /// # Correctness
    ///
    /// The user may not call this method.
    unsafe fn reset(&mut self) {
        self.timer.cr.modify(|_, w| w.enable().set_bit());

        // ARR can only be written while enabled. Count the full 16 bits.
        self.timer.arr.write(|w| w.bits(0xffff));

        // Continuous mode
        self.timer.cr.modify(|_, w| w.cntstrt().set_bit());
    }

    fn set_compare(&mut self, instant: Self::Instant) {
        let now = self.now();

        let compare_register_val = match instant.checked_duration_since(now) {
            // Further away than one timer period. Fire at the next wrap,
            // RTIC re-arms from there.
            Some(duration) if duration.ticks() > 0xffff => 0,

            // Already due, RTIC handles this
            None => 0,

            Some(_) => compare_value(instant.duration_since_epoch().ticks()),
        };

        self.timer.cmp.write(|w| w.cmp().bits(compare_register_val));
    }

    fn clear_compare_flag(&mut self) {
        self.timer.icr.write(|w| w.cmpmcf().set_bit());
    }

    fn on_interrupt(&mut self) {
        if self.is_overflow() {
            self.clear_overflow_flag();
            self.overflow = self.overflow.wrapping_add(1);
        }
    }
}
