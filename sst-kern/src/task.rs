// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Active objects.

use core::cell::RefCell;
use critical_section::Mutex;
use sst_abi::{EventRef, Priority};

use crate::diag::Trace;
use crate::fail::on_assert;
use crate::port::Port;
use crate::queue::Queue;
use crate::ringbuf_entry;

/// An active object: a priority, an event queue of capacity `N`, a piece of
/// private state `S`, and a dispatch function that consumes one event at a
/// time and may mutate that state.
///
/// A `Task` is meant to be declared as a single `'static` per active
/// object, e.g.:
///
/// ```ignore
/// static BLINKY: Task<4, BlinkyState> = Task::new(
///     Priority(2),
///     BlinkyState { on: false },
///     blinky_init,
///     blinky_dispatch,
/// );
/// ```
///
/// `N` replaces the caller-supplied `qbuf`/`qlen` pointer pair of the
/// lineage this is descended from: capacity is still fixed at construction
/// and still chosen per task, just encoded in the type rather than passed
/// as a runtime pointer, so there is no way to under-size a queue's backing
/// storage relative to its claimed length.
///
/// Polymorphism across differently-shaped active objects is via the two
/// function pointers `init_fn` and `dispatch_fn`, plus the private `state`
/// they close over -- no vtable, no generic dispatch trait.
pub struct Task<const N: usize, S> {
    prio: Priority,
    queue: Mutex<RefCell<Queue<N>>>,
    state: RefCell<S>,
    init_fn: fn(&mut S, Option<EventRef>),
    dispatch_fn: fn(&mut S, EventRef),
}

// SAFETY: `queue` is only ever touched from within a `critical_section`,
// which is this crate's definition of "synchronized" on a single-core
// target with no threads, only nested interrupts. `state` is only ever
// touched from `activate`, and an active object's own activation vector can
// never reenter itself -- the interrupt controller masks a vector against
// itself while it runs -- so at most one mutable borrow of `state` is ever
// live at a time even though it is taken outside the critical section that
// guards `queue`.
unsafe impl<const N: usize, S> Sync for Task<N, S> {}

impl<const N: usize, S> Task<N, S> {
    /// Builds a task with the given priority, initial state, init hook, and
    /// dispatch function. `prio` must be unique among every task registered
    /// with a given [`crate::kernel::Kernel`]; see
    /// [`crate::kernel::Kernel::start_task`].
    ///
    /// Construction alone has no effect beyond storing these hooks: `init_fn`
    /// only runs once [`Kernel::start_task`](crate::kernel::Kernel::start_task)
    /// invokes it synchronously, just before the task becomes eligible to
    /// receive events.
    pub const fn new(
        prio: Priority,
        initial: S,
        init_fn: fn(&mut S, Option<EventRef>),
        dispatch_fn: fn(&mut S, EventRef),
    ) -> Self {
        Task {
            prio,
            queue: Mutex::new(RefCell::new(Queue::new())),
            state: RefCell::new(initial),
            init_fn,
            dispatch_fn,
        }
    }

    /// This task's scheduling priority.
    pub fn priority(&self) -> Priority {
        self.prio
    }

    /// Runs this task's `init_fn` synchronously against `initial_event`.
    ///
    /// Called once by [`crate::kernel::Kernel::start_task`], before the
    /// task's activation vector is enabled: nothing can preempt into
    /// `dispatch_fn` while this runs, so `init_fn` observes exactly one
    /// mutable borrow of `state` and needs no locking of its own. A null
    /// initial event where `init_fn` requires one, or vice versa, is a
    /// contract violation `init_fn` itself must reject via [`on_assert`];
    /// the framework has no way to check an event's validity against a
    /// given AO's expectations on its behalf.
    pub(crate) fn run_init(&'static self, initial_event: Option<EventRef>) {
        // SAFETY: see the `unsafe impl Sync` comment above. `start_task`
        // calls this before `enable`, so no activation can be running
        // concurrently.
        let state = unsafe { &mut *self.state.as_ptr() };
        (self.init_fn)(state, initial_event);
    }

    /// Queue occupancy, for diagnostics and tests. Not meaningful as a
    /// basis for application logic: by the time the caller observes the
    /// result, a higher-priority context may already have posted again.
    pub fn queue_len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow(cs).borrow().len())
    }

    /// Enqueues `evt` and marks this task's activation vector pending.
    ///
    /// May be called from any priority level, including from inside another
    /// task's `dispatch` function (cross-task posting), and from ordinary
    /// (non-interrupt) code such as `main` during startup. An event posted
    /// while this task's own activation is already running is queued behind
    /// whatever is already waiting, preserving FIFO order across the whole
    /// lifetime of the queue rather than just within one activation.
    ///
    /// Escalates to [`on_assert`] if the queue is full: a queue sized by the
    /// integrator for the application's worst case should never overflow in
    /// practice, and there is no sensible way for a poster several stack
    /// frames above `dispatch` to recover from a dropped event.
    pub fn post<P: Port>(&'static self, evt: EventRef) {
        critical_section::with(|cs| {
            let mut q = self.queue.borrow(cs).borrow_mut();
            if q.push(evt).is_err() {
                on_assert("task", line!());
            }
        });
        ringbuf_entry!(Trace::Posted {
            prio: self.prio.0,
            sig: evt.signal(),
        });
        P::pend(self.prio);
    }

    /// Dispatches exactly one queued event, then returns.
    ///
    /// This is the body of a task's activation ISR: the port's vector table
    /// (real hardware) or [`crate::port::Port::bind_activation`] callback
    /// (simulated) calls this directly once the controller has raised this
    /// task's priority level. Processing one event per activation, rather
    /// than draining the whole queue, bounds how long this task can hold a
    /// more urgent one off the processor to a single dispatch: if another
    /// event is already waiting behind the one just dispatched, this
    /// re-pends its own vector so the controller schedules another
    /// activation for it exactly as it would for a freshly posted event,
    /// giving any now-more-urgent pending task a chance to run first.
    ///
    /// Escalates to [`on_assert`] if the queue is found empty: `activate`
    /// should only ever run because something pended it, which only
    /// happens alongside a push, so an empty queue here means the
    /// controller and the software queue have fallen out of sync.
    pub fn activate<P: Port>(&'static self) {
        let evt = critical_section::with(|cs| self.queue.borrow(cs).borrow_mut().pop());
        let Some(evt) = evt else {
            on_assert("task", line!());
        };
        ringbuf_entry!(Trace::Dispatched {
            prio: self.prio.0,
            sig: evt.signal(),
        });
        // SAFETY: see the `unsafe impl Sync` comment above.
        let state = unsafe { &mut *self.state.as_ptr() };
        (self.dispatch_fn)(state, evt);

        let more_pending = critical_section::with(|cs| !self.queue.borrow(cs).borrow().is_empty());
        if more_pending {
            P::pend(self.prio);
        }
    }
}
