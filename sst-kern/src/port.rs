// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The seam between the kernel and a concrete interrupt controller.

use sst_abi::Priority;

/// Everything the kernel needs from the underlying interrupt controller.
///
/// Implemented once per target: [`sst_port_sim`](https://docs.rs/sst-port-sim)
/// for a hosted, deterministic stand-in used by tests, and a Cortex-M NVIC
/// backend for real hardware. Every method is a plain associated function —
/// there is no controller *instance* to hold, since a microcontroller has
/// exactly one interrupt controller and it is always reachable through
/// memory-mapped registers or, in the simulator's case, a single piece of
/// process-wide state.
///
/// A `Port` implementation is a zero-sized marker type; the kernel is always
/// generic over `P: Port` rather than holding a `&dyn Port`, so every call
/// here monomorphizes down to the concrete backend with no indirection.
pub trait Port {
    /// Associates `isr` with the activation vector for `prio`.
    ///
    /// On real hardware the vector table is normally wired statically at
    /// link time and this is a no-op; [`sst_port_sim`] is the exception,
    /// since a hosted process has no linker-fixed vector table and must
    /// record the callback at runtime.
    fn bind_activation(prio: Priority, isr: fn()) {
        let _ = (prio, isr);
    }

    /// Enables the activation vector for `prio` so it can fire.
    fn enable(prio: Priority);

    /// Marks the activation vector for `prio` pending. If `prio` is more
    /// urgent than whatever is currently running, the controller preempts
    /// immediately; otherwise it tail-chains once the current activation
    /// (and anything more urgent queued ahead of it) completes.
    fn pend(prio: Priority);

    /// Lifts whatever global interrupt mask the core booted with.
    ///
    /// Called once by [`crate::kernel::Kernel::run`], after the
    /// application's `on_start` hook has finished configuring every
    /// peripheral's priority via [`Port::enable`]. Most targets already
    /// have interrupts unmasked at reset, so the default is a no-op; ports
    /// that boot masked, or that want one explicit, auditable point where
    /// the system goes live, override it.
    fn enable_interrupts() {}

    /// Parks the core until the next interrupt, then returns.
    ///
    /// Called once per iteration of [`crate::kernel::Kernel::run`]'s idle
    /// loop, with interrupts re-enabled for the duration of the wait by the
    /// wait primitive itself (e.g. Cortex-M's `wfi`). Implementations
    /// intended only for tests may return immediately rather than actually
    /// blocking, since `Kernel::run` is not the only way to drive the
    /// system under test.
    fn wait_for_interrupt();
}
