// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Software timers.
//!
//! A [`TimeEvt`] counts down a fixed number of tick-ISR periods and then
//! posts a caller-supplied event to a caller-supplied destination. One-shot
//! and periodic timers share the same type; a periodic timer simply
//! reloads its counter from its interval on expiry instead of staying
//! disarmed.

use core::cell::Cell;
use critical_section::Mutex;

use crate::diag::Trace;
use crate::ringbuf_entry;
use sst_abi::EventRef;

/// A single armable software timer.
///
/// Destinations are expressed as a plain `fn(EventRef)` rather than a
/// generic task reference: different active objects are different
/// monomorphizations of `Task<N, S>`, so a `TimeEvt` that could target any
/// of them generically would force every call site into the task's full
/// type, which in turn would force every timer's type to carry its
/// destination task's `N` and `S`. A free function wrapping
/// `MY_TASK.post::<MyPort>(evt)` avoids that entirely, at the cost of one
/// small function per distinct destination -- the same function-pointer
/// polymorphism the kernel already uses at the port boundary.
///
/// `TimeEvt`s are registered into a [`TimeEvtRegistry`] via an intrusive
/// singly linked list (the `next` field) so arming one never allocates.
pub struct TimeEvt {
    evt: EventRef,
    post: fn(EventRef),
    ticks: Cell<u32>,
    interval: Cell<u32>,
    next: Cell<Option<&'static TimeEvt>>,
}

// SAFETY: every field is only ever read or written from within the
// critical section held by `TimeEvtRegistry::tick`, `arm`, or `disarm`.
// There is no access path that reaches a `TimeEvt`'s fields without going
// through the registry first.
unsafe impl Sync for TimeEvt {}

impl TimeEvt {
    /// Builds a disarmed timer that will post `evt` to `post` once armed.
    pub const fn new(evt: EventRef, post: fn(EventRef)) -> Self {
        TimeEvt {
            evt,
            post,
            ticks: Cell::new(0),
            interval: Cell::new(0),
            next: Cell::new(None),
        }
    }

    /// Whether this timer currently has ticks remaining.
    pub fn is_armed(&self) -> bool {
        self.ticks.get() > 0
    }
}

/// Owns the linked list of timers a given tick source drives.
///
/// An application typically declares one `static` registry per independent
/// tick rate (often just one, fed by a SysTick ISR) and calls
/// [`TimeEvtRegistry::tick`] from that ISR.
pub struct TimeEvtRegistry {
    head: Mutex<Cell<Option<&'static TimeEvt>>>,
}

impl TimeEvtRegistry {
    pub const fn new() -> Self {
        TimeEvtRegistry {
            head: Mutex::new(Cell::new(None)),
        }
    }

    fn contains(&self, cs: critical_section::CriticalSection<'_>, te: &'static TimeEvt) -> bool {
        let mut cur = self.head.borrow(cs).get();
        while let Some(node) = cur {
            if core::ptr::eq(node, te) {
                return true;
            }
            cur = node.next.get();
        }
        false
    }

    /// Arms `te` to fire after `ticks` calls to [`TimeEvtRegistry::tick`],
    /// then every `interval` ticks thereafter if `interval` is nonzero (a
    /// one-shot timer if `interval == 0`).
    ///
    /// Re-arming an already-armed timer simply reloads its countdown; it is
    /// not removed and re-inserted into the list, so it keeps its place in
    /// iteration order. `ticks` of zero is rejected: a timer due
    /// immediately is indistinguishable from a bug at the call site, since
    /// the kernel offers no way to observe "fires on this exact tick" as
    /// opposed to "fires next tick".
    pub fn arm(&self, te: &'static TimeEvt, ticks: u32, interval: u32) {
        if ticks == 0 {
            crate::fail::on_assert("time", line!());
        }
        critical_section::with(|cs| {
            te.ticks.set(ticks);
            te.interval.set(interval);
            if !self.contains(cs, te) {
                let head = self.head.borrow(cs);
                te.next.set(head.get());
                head.set(Some(te));
            }
        });
        ringbuf_entry!(Trace::TimerArmed { ticks });
    }

    /// Stops `te` from counting down and unlinks it from the list, so a
    /// timer nobody re-arms does not keep costing [`tick`](Self::tick) a
    /// visit for the rest of the program's life.
    ///
    /// A no-op, returning `false`, if `te` was not armed (whether or not it
    /// happens to still be linked). Returns `true` if it was armed. Safe to
    /// call from inside a destination's dispatch while this registry's own
    /// `tick` is still walking the list further up the call stack -- `tick`
    /// captures each node's `next` pointer before posting, so an unlink
    /// triggered reentrantly from that post never invalidates the walk in
    /// progress.
    pub fn disarm(&self, te: &'static TimeEvt) -> bool {
        critical_section::with(|cs| {
            let was_armed = te.ticks.get() > 0;
            te.ticks.set(0);

            let head = self.head.borrow(cs);
            let mut prev: Option<&'static TimeEvt> = None;
            let mut cur = head.get();
            while let Some(node) = cur {
                if core::ptr::eq(node, te) {
                    match prev {
                        Some(p) => p.next.set(node.next.get()),
                        None => head.set(node.next.get()),
                    }
                    node.next.set(None);
                    break;
                }
                prev = Some(node);
                cur = node.next.get();
            }

            was_armed
        })
    }

    /// Advances every armed timer by one tick, posting and (for periodic
    /// timers) reloading any that reach zero.
    ///
    /// Intended to be called from a single periodic ISR. Destinations are
    /// posted to while still inside this function's critical section;
    /// `Task::post` itself only needs a critical section for as long as it
    /// takes to push one entry into a queue, so nesting here does not
    /// meaningfully extend how long this tick's timers are masked.
    pub fn tick(&self) {
        critical_section::with(|cs| {
            let mut cur = self.head.borrow(cs).get();
            while let Some(te) = cur {
                // captured before posting: a destination that reentrantly
                // disarms a timer further down the list must not corrupt
                // this walk.
                let next = te.next.get();
                if te.ticks.get() > 0 {
                    let remaining = te.ticks.get() - 1;
                    if remaining == 0 {
                        if te.interval.get() > 0 {
                            te.ticks.set(te.interval.get());
                        } else {
                            te.ticks.set(0);
                        }
                        (te.post)(te.evt);
                        ringbuf_entry!(Trace::TimerFired);
                    } else {
                        te.ticks.set(remaining);
                    }
                }
                cur = next;
            }
        });
    }
}

impl Default for TimeEvtRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::Port;
    use crate::task::Task;
    use sst_abi::{impl_event, Priority, Signal};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopPort;
    impl Port for NoopPort {
        fn enable(_prio: Priority) {}
        fn pend(_prio: Priority) {}
        fn wait_for_interrupt() {}
    }

    struct TickEvt {
        sig: Signal,
    }
    impl_event!(TickEvt);

    fn noop_init<S>(_s: &mut S, _e: Option<EventRef>) {}

    // Each test below declares its own statics rather than sharing module-
    // level ones: `critical_section::with` only guarantees mutual exclusion
    // against nested activations on the same simulated "core", not against
    // genuinely concurrent OS threads, and `cargo test` runs test functions
    // in parallel by default.

    #[test]
    fn one_shot_fires_exactly_once_at_deadline() {
        static TICK_EVT: TickEvt = TickEvt { sig: 1 };
        static FIRES: AtomicU32 = AtomicU32::new(0);
        struct RecvState;
        fn recv_dispatch(_s: &mut RecvState, _e: EventRef) {
            FIRES.fetch_add(1, Ordering::SeqCst);
        }
        static RECEIVER: Task<4, RecvState> = Task::new(Priority(3), RecvState, noop_init, recv_dispatch);
        fn post_to_receiver(e: EventRef) {
            RECEIVER.post::<NoopPort>(e);
        }
        static REG: TimeEvtRegistry = TimeEvtRegistry::new();
        static TE: TimeEvt = TimeEvt::new(&TICK_EVT, post_to_receiver);

        REG.arm(&TE, 3, 0);
        REG.tick();
        REG.tick();
        assert_eq!(RECEIVER.queue_len(), 0);
        REG.tick();
        assert_eq!(RECEIVER.queue_len(), 1);
        REG.tick();
        REG.tick();
        assert_eq!(RECEIVER.queue_len(), 1);
        assert!(!TE.is_armed());
        while RECEIVER.queue_len() > 0 {
            RECEIVER.activate::<NoopPort>();
        }
        assert_eq!(FIRES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn periodic_timer_reloads_and_keeps_firing() {
        static TICK_EVT: TickEvt = TickEvt { sig: 1 };
        static FIRES: AtomicU32 = AtomicU32::new(0);
        struct RecvState;
        fn recv_dispatch(_s: &mut RecvState, _e: EventRef) {
            FIRES.fetch_add(1, Ordering::SeqCst);
        }
        static RECEIVER: Task<8, RecvState> = Task::new(Priority(3), RecvState, noop_init, recv_dispatch);
        fn post_to_receiver(e: EventRef) {
            RECEIVER.post::<NoopPort>(e);
        }
        static REG: TimeEvtRegistry = TimeEvtRegistry::new();
        static TE: TimeEvt = TimeEvt::new(&TICK_EVT, post_to_receiver);

        REG.arm(&TE, 2, 2);
        for _ in 0..8 {
            REG.tick();
        }
        // period 2, first fire at tick 2: fires at ticks 2, 4, 6, 8 -> 4 times
        while RECEIVER.queue_len() > 0 {
            RECEIVER.activate::<NoopPort>();
        }
        assert_eq!(FIRES.load(Ordering::SeqCst), 4);
        assert!(TE.is_armed());
    }

    #[test]
    fn disarm_stops_further_posts() {
        static TICK_EVT: TickEvt = TickEvt { sig: 1 };
        static FIRES: AtomicU32 = AtomicU32::new(0);
        struct RecvState;
        fn recv_dispatch(_s: &mut RecvState, _e: EventRef) {
            FIRES.fetch_add(1, Ordering::SeqCst);
        }
        static RECEIVER: Task<4, RecvState> = Task::new(Priority(3), RecvState, noop_init, recv_dispatch);
        fn post_to_receiver(e: EventRef) {
            RECEIVER.post::<NoopPort>(e);
        }
        static REG: TimeEvtRegistry = TimeEvtRegistry::new();
        static TE: TimeEvt = TimeEvt::new(&TICK_EVT, post_to_receiver);

        REG.arm(&TE, 2, 2);
        REG.tick();
        REG.tick();
        assert!(REG.disarm(&TE));
        for _ in 0..10 {
            REG.tick();
        }
        assert!(!TE.is_armed());
        while RECEIVER.queue_len() > 0 {
            RECEIVER.activate::<NoopPort>();
        }
        assert_eq!(FIRES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disarming_a_never_armed_timer_is_a_no_op_returning_false() {
        static TICK_EVT: TickEvt = TickEvt { sig: 1 };
        static REG: TimeEvtRegistry = TimeEvtRegistry::new();
        static TE: TimeEvt = TimeEvt::new(&TICK_EVT, |_e| {});

        assert!(!REG.disarm(&TE));
        assert!(!TE.is_armed());
    }

    #[test]
    fn disarming_is_idempotent_after_the_first_call() {
        static TICK_EVT: TickEvt = TickEvt { sig: 1 };
        static REG: TimeEvtRegistry = TimeEvtRegistry::new();
        static TE: TimeEvt = TimeEvt::new(&TICK_EVT, |_e| {});

        REG.arm(&TE, 5, 0);
        assert!(REG.disarm(&TE));
        // already disarmed: a second call is a no-op, not a double-unlink
        // panic, and still reports "was not armed".
        assert!(!REG.disarm(&TE));
        assert!(!REG.disarm(&TE));
    }

    #[test]
    fn disarming_during_tick_handling_prevents_that_ticks_post() {
        static TICK_EVT: TickEvt = TickEvt { sig: 1 };
        struct RecvState;
        fn recv_dispatch(_s: &mut RecvState, _e: EventRef) {}
        static RECEIVER: Task<4, RecvState> = Task::new(Priority(3), RecvState, noop_init, recv_dispatch);
        fn post_to_receiver(e: EventRef) {
            RECEIVER.post::<NoopPort>(e);
        }
        static REG: TimeEvtRegistry = TimeEvtRegistry::new();
        static VICTIM: TimeEvt = TimeEvt::new(&TICK_EVT, post_to_receiver);

        // `TRIGGER` disarms `VICTIM` from within its own post, reentrantly,
        // while `REG.tick()` is still walking the list. Both are due on the
        // same tick, and `TRIGGER` is linked ahead of `VICTIM` (armed
        // second, so it sits closer to the list's head).
        fn disarm_victim(_e: EventRef) {
            REG.disarm(&VICTIM);
        }
        static TRIGGER: TimeEvt = TimeEvt::new(&TICK_EVT, disarm_victim);

        REG.arm(&VICTIM, 1, 0);
        REG.arm(&TRIGGER, 1, 0);
        REG.tick();

        assert!(!VICTIM.is_armed());
        assert_eq!(RECEIVER.queue_len(), 0);
    }
}
