// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A hosted stand-in for a hardware interrupt controller.
//!
//! This is not a timing-accurate simulator; it models exactly the one
//! property `sst-kern`'s tests need: that posting an event to a
//! higher-priority active object preempts whatever is currently
//! dispatching, and that control returns to the preempted activation once
//! the preempting one drains its queue, all without a software scheduler.
//! It does this by calling a pended activation's ISR *synchronously,
//! recursively* out of [`pend`] -- real tail-chaining falls naturally out
//! of the native call stack, with no separate "run the scheduler" step for
//! tests to remember to invoke. Because of that, a test that posts an
//! event through a [`SimPort`]-driven [`sst_kern::Kernel`] observes every
//! resulting activation as already having happened by the time `post`
//! returns.
//!
//! State lives in a [`std::thread_local`] rather than a process-wide
//! global so that `cargo test`'s default parallel harness can't have one
//! test's active objects interfere with another's. Because the default
//! harness *reuses* threads across tests, call [`reset`] at the start of
//! every test that touches this module.

use std::cell::RefCell;

use critical_section::RawRestoreState;
use sst_abi::Priority;
use sst_kern::Port;

const NUM_PRIORITIES: usize = 256;

struct Sim {
    isrs: [Option<fn()>; NUM_PRIORITIES],
    enabled: [bool; NUM_PRIORITIES],
    pending: [bool; NUM_PRIORITIES],
    /// Priorities of activations currently on the (simulated) call stack,
    /// outermost first. The last entry is whatever is "currently running",
    /// the only thing a new pend needs to compare against.
    running: Vec<u8>,
    cs_depth: u32,
}

impl Sim {
    fn new() -> Self {
        Sim {
            isrs: [None; NUM_PRIORITIES],
            enabled: [false; NUM_PRIORITIES],
            pending: [false; NUM_PRIORITIES],
            running: Vec::new(),
            cs_depth: 0,
        }
    }
}

thread_local! {
    static SIM: RefCell<Sim> = RefCell::new(Sim::new());
}

/// Clears all bindings, pending flags, and nesting state on the calling
/// thread. Call this at the start of every test that uses [`SimPort`] or
/// the free functions in this module: `cargo test`'s harness reuses OS
/// threads across test functions, and this module's state is thread-local,
/// not test-local.
pub fn reset() {
    SIM.with(|sim| *sim.borrow_mut() = Sim::new());
}

fn bind_activation(prio: u8, isr: fn()) {
    SIM.with(|sim| sim.borrow_mut().isrs[prio as usize] = Some(isr));
}

fn enable(prio: u8) {
    SIM.with(|sim| sim.borrow_mut().enabled[prio as usize] = true);
}

fn pend(prio: u8) {
    SIM.with(|sim| sim.borrow_mut().pending[prio as usize] = true);
    drain_pending();
}

/// Services every pending, enabled priority more urgent than whatever is
/// currently running, most urgent first, recursing into each ISR in turn.
/// A no-op while a critical section is held: real hardware can't tail-chain
/// into a masked vector either.
fn drain_pending() {
    loop {
        let next = SIM.with(|sim| {
            let mut sim = sim.borrow_mut();
            if sim.cs_depth > 0 {
                return None;
            }
            let current = sim.running.last().copied();
            let candidate = (0..NUM_PRIORITIES as u16).map(|p| p as u8).find(|&p| {
                sim.pending[p as usize]
                    && sim.enabled[p as usize]
                    && current.map_or(true, |c| p < c)
            });
            candidate.map(|p| {
                sim.pending[p as usize] = false;
                sim.running.push(p);
                sim.isrs[p as usize]
            })
        });
        match next {
            Some(Some(isr)) => {
                isr();
                SIM.with(|sim| {
                    sim.borrow_mut().running.pop();
                });
            }
            Some(None) => {
                // pended and enabled, but never bound: nothing to run.
                SIM.with(|sim| {
                    sim.borrow_mut().running.pop();
                });
            }
            None => break,
        }
    }
}

struct SimCriticalSection;
critical_section::set_impl!(SimCriticalSection);

unsafe impl critical_section::Impl for SimCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        SIM.with(|sim| sim.borrow_mut().cs_depth += 1);
    }

    unsafe fn release(_token: RawRestoreState) {
        let depth = SIM.with(|sim| {
            let mut sim = sim.borrow_mut();
            sim.cs_depth -= 1;
            sim.cs_depth
        });
        if depth == 0 {
            drain_pending();
        }
    }
}

/// The `sst_kern::Port` implementation backing this simulator.
pub struct SimPort;

impl Port for SimPort {
    fn bind_activation(prio: Priority, isr: fn()) {
        bind_activation(prio.0, isr);
    }

    fn enable(prio: Priority) {
        enable(prio.0);
    }

    fn pend(prio: Priority) {
        pend(prio.0);
    }

    fn wait_for_interrupt() {
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    thread_local! {
        static TRACE: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    }
    fn trace(tag: &'static str) {
        TRACE.with(|t| t.borrow_mut().push(tag));
    }

    #[test]
    fn higher_priority_activation_preempts_a_running_one() {
        reset();
        TRACE.with(|t| t.borrow_mut().clear());

        fn low_isr() {
            trace("low-start");
            // while "running", low pends high, which must preempt before
            // low continues
            pend(1);
            trace("low-end");
        }
        fn high_isr() {
            trace("high");
        }

        bind_activation(5, low_isr);
        enable(5);
        bind_activation(1, high_isr);
        enable(1);

        pend(5);

        let order = TRACE.with(|t| t.borrow().clone());
        assert_eq!(order, vec!["low-start", "high", "low-end"]);
    }

    #[test]
    fn lower_priority_does_not_preempt_a_running_one() {
        reset();
        TRACE.with(|t| t.borrow_mut().clear());

        fn running_isr() {
            trace("running-start");
            pend(9); // larger number: less urgent, must not preempt
            trace("running-end");
        }
        fn other_isr() {
            trace("other");
        }

        bind_activation(7, running_isr);
        enable(7);
        bind_activation(9, other_isr);
        enable(9);

        pend(7);

        // "other" (prio 9) only runs after running_isr finishes.
        let order = TRACE.with(|t| t.borrow().clone());
        assert_eq!(order, vec!["running-start", "running-end", "other"]);
    }

    #[test]
    fn pend_inside_critical_section_is_deferred_until_release() {
        reset();
        TRACE.with(|t| t.borrow_mut().clear());

        fn isr() {
            trace("ran");
        }
        bind_activation(9, isr);
        enable(9);

        critical_section::with(|_cs| {
            pend(9);
            // still masked: must not have run yet
            assert!(TRACE.with(|t| t.borrow().is_empty()));
        });
        assert_eq!(TRACE.with(|t| t.borrow().clone()), vec!["ran"]);
    }

    #[test]
    fn reset_clears_bindings_between_tests_on_a_reused_thread() {
        reset();
        TRACE.with(|t| t.borrow_mut().clear());
        fn isr() {
            trace("ran");
        }
        bind_activation(3, isr);
        enable(3);

        reset();
        // after reset, priority 3 has no binding and no enabled flag
        pend(3);
        assert!(TRACE.with(|t| t.borrow().is_empty()));
    }
}
