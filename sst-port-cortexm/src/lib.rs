// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binds [`sst_kern::Port`] to a bare Cortex-M NVIC.
//!
//! An active object's [`sst_abi::Priority`] doubles as its interrupt number:
//! `Priority(n)` is IRQn `n`. This keeps the mapping from AO to hardware
//! vector total and mechanical -- there is exactly one place (the
//! application's vector table) where an IRQn is wired to the `fn()` that
//! calls that AO's `Task::activate`.
//!
//! Critical sections are provided by `cortex-m`'s own
//! `critical-section-single-core` feature (PRIMASK masking); this crate does
//! not implement [`critical_section::Impl`] itself.
#![no_std]

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::{Peripherals, NVIC};
use sst_abi::Priority;
use sst_kern::Port;

/// Adapts a raw IRQn to `cortex-m`'s `InterruptNumber`, since this crate has
/// no PAC-generated interrupt enum to borrow one from.
#[derive(Clone, Copy)]
struct Vector(u8);

// SAFETY: `number` returns the value `Vector` was constructed with,
// unmodified, which is `InterruptNumber`'s only requirement.
unsafe impl InterruptNumber for Vector {
    fn number(self) -> u16 {
        self.0 as u16
    }
}

/// The NVIC-backed [`Port`].
///
/// Application code does not construct this type; it only ever appears as
/// the `P` in `Task<N, S>`'s and `Kernel<P, _>`'s type parameters.
pub struct CortexMPort;

impl Port for CortexMPort {
    /// Programs this AO's NVIC priority register. The vector table entry
    /// itself is fixed at link time (via `#[cortex_m_rt::interrupt]` or a
    /// PAC's table), so `isr` is not used here -- it exists so application
    /// code and the hosted simulator share one `Kernel::start_task` call
    /// site.
    fn bind_activation(prio: Priority, _isr: fn()) {
        // SAFETY: taking the peripherals exactly once per priority during
        // single-threaded startup, before any interrupt is unmasked.
        let mut p = unsafe { Peripherals::steal() };
        // SAFETY: NVIC priority registers are only written here and only
        // before the corresponding interrupt is unmasked by `enable`.
        unsafe {
            p.NVIC.set_priority(Vector(prio.0), prio.0);
        }
    }

    fn enable(prio: Priority) {
        // SAFETY: unmasking an interrupt whose priority was already
        // programmed by `bind_activation` and whose handler is wired into
        // the vector table by the application.
        unsafe {
            NVIC::unmask(Vector(prio.0));
        }
    }

    fn pend(prio: Priority) {
        NVIC::pend(Vector(prio.0));
    }

    fn enable_interrupts() {
        // SAFETY: called once, from `Kernel::run`, after every peripheral
        // priority has already been programmed by `on_start`.
        unsafe {
            cortex_m::interrupt::enable();
        }
    }

    fn wait_for_interrupt() {
        cortex_m::asm::wfi();
    }
}

#[cfg(feature = "reset-on-panic")]
mod panic_reset {
    use core::panic::PanicInfo;

    /// Mirrors the source lineage's `Q_onAssert`: mask every interrupt so
    /// nothing else can run on the way down, then reset. There is nowhere
    /// safe left to report the failure from once a panic has unwound this
    /// far, which is why `sst_kern::fail::on_assert` records a ringbuf entry
    /// *before* panicking rather than relying on this handler to do it.
    #[panic_handler]
    fn panic(_info: &PanicInfo) -> ! {
        cortex_m::interrupt::disable();
        cortex_m::peripheral::SCB::sys_reset();
    }
}
