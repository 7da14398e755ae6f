// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! System startup and the cross-task priority registry.

use core::cell::Cell;
use core::marker::PhantomData;
use critical_section::Mutex;
use sst_abi::{EventRef, Priority};

use crate::fail::on_assert;
use crate::port::Port;
use crate::task::Task;

/// Wires active objects to a concrete [`Port`] and enforces that no two
/// registered tasks share a priority.
///
/// Priority collisions are not a recoverable condition: two active objects
/// sharing a hardware vector would silently steal each other's activations,
/// so this is checked once at startup (when the cost of an assertion is
/// irrelevant) rather than left as a subtle integration bug. `MAX_TASKS`
/// bounds the registry's fixed backing storage; it should be set to the
/// application's actual active object count, not left at its default on a
/// memory-constrained target.
pub struct Kernel<P: Port, const MAX_TASKS: usize = 32> {
    registered: Mutex<Cell<[Option<Priority>; MAX_TASKS]>>,
    count: Mutex<Cell<usize>>,
    _port: PhantomData<P>,
}

impl<P: Port, const MAX_TASKS: usize> Kernel<P, MAX_TASKS> {
    pub const fn new() -> Self {
        Kernel {
            registered: Mutex::new(Cell::new([None; MAX_TASKS])),
            count: Mutex::new(Cell::new(0)),
            _port: PhantomData,
        }
    }

    /// Pre-start setup.
    ///
    /// Idempotent: calling this more than once before [`Kernel::run`] has
    /// no additional effect. Exists so application startup code has a named
    /// place to call before wiring any [`Task`], matching every other
    /// lifecycle entry point below.
    pub fn init(&self) {}

    /// Registers `task` with the port: binds its activation ISR to `isr`,
    /// programs its hardware priority, runs `task`'s `init_fn` against
    /// `initial_event`, then enables its vector. Records its priority for
    /// collision checking along the way.
    ///
    /// Must be called once per active object, before [`Kernel::run`]. Order
    /// relative to other `start_task` calls does not matter: a vector's
    /// `init_fn` runs, and only then is its vector enabled, so no event can
    /// reach a task before its own init has completed, and no event can be
    /// posted to a task application code hasn't obtained a `&'static`
    /// reference to yet.
    pub fn start_task<const N: usize, S>(
        &self,
        task: &'static Task<N, S>,
        isr: fn(),
        initial_event: Option<EventRef>,
    ) {
        let prio = task.priority();
        critical_section::with(|cs| {
            let mut slots = self.registered.borrow(cs).get();
            let n = self.count.borrow(cs).get();
            if slots[..n].iter().flatten().any(|&p| p == prio) {
                on_assert("kernel", line!());
            }
            if n == MAX_TASKS {
                on_assert("kernel", line!());
            }
            slots[n] = Some(prio);
            self.registered.borrow(cs).set(slots);
            self.count.borrow(cs).set(n + 1);
        });
        P::bind_activation(prio, isr);
        task.run_init(initial_event);
        P::enable(prio);
    }

    /// How many tasks have been registered so far. Exposed for tests and
    /// diagnostics.
    pub fn task_count(&self) -> usize {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }

    /// Starts the system: calls the application's `on_start` (expected to
    /// finish configuring the tick source and every peripheral's interrupt
    /// priority via the port), lifts the global interrupt mask, then loops
    /// forever, each iteration disabling interrupts, calling `on_idle_cond`,
    /// and re-enabling them -- parking the core with [`Port::wait_for_interrupt`]
    /// whenever `on_idle_cond` reports it is safe to do so.
    ///
    /// Call once, after every active object has been registered with
    /// [`Kernel::start_task`]. Never returns on real hardware.
    pub fn run(&self, on_start: fn(), on_idle_cond: fn() -> bool) -> ! {
        on_start();
        P::enable_interrupts();
        loop {
            let safe_to_wait = critical_section::with(|_cs| on_idle_cond());
            if safe_to_wait {
                P::wait_for_interrupt();
            }
        }
    }
}

impl<P: Port, const MAX_TASKS: usize> Default for Kernel<P, MAX_TASKS> {
    fn default() -> Self {
        Self::new()
    }
}
