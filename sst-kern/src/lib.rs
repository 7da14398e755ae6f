// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A preemptive, priority-based, run-to-completion active-object kernel.
//!
//! Every active object is bound to a distinct, prioritized interrupt
//! vector through a [`port::Port`] implementation; preemption between
//! active objects is entirely the interrupt controller's hardware
//! tail-chaining, not a software ready-queue or scheduler loop. The kernel
//! itself only supplies the pieces hardware can't: a per-task event queue
//! ([`queue::Queue`], wrapped by [`task::Task`]), software timers
//! ([`time::TimeEvt`]), a startup-time priority registry
//! ([`kernel::Kernel`]), and a small diagnostic trace ring ([`diag`]).
//!
//! See `sst-port-sim` for a hosted `Port` used in this crate's own test
//! suite, and `sst-port-cortexm` for a real-hardware NVIC backend.

#![cfg_attr(not(test), no_std)]

// Unit tests call `critical_section::with` but never reference
// `sst-port-sim` by name, so without this the linker drops its
// `critical-section` impl and leaves `_critical_section_1_0_*` undefined.
#[cfg(test)]
extern crate sst_port_sim as _;

pub mod diag;
pub mod fail;
pub mod kernel;
pub mod port;
pub mod queue;
pub mod task;
pub mod time;

pub use kernel::Kernel;
pub use port::Port;
pub use queue::Queue;
pub use task::Task;
pub use time::{TimeEvt, TimeEvtRegistry};
