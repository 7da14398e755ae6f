// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-task event ring buffer.

use sst_abi::EventRef;

/// Failure returned by [`Queue::push`] when the buffer is already full.
///
/// The framework always escalates this to [`crate::fail::on_assert`] rather
/// than handing it back to application code (queues must be sized by the
/// integrator up front), but the type is still `Result`-shaped so kernel call
/// sites stay `?`-friendly internally.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Overflow;

/// Fixed-capacity, FIFO ring buffer of event references.
///
/// `N` is chosen at the `Task`'s `static` declaration site, the Rust
/// replacement for the source lineage's caller-supplied `qbuf`/`qlen`
/// pointer pair: capacity is still fixed and still caller-chosen, just
/// expressed as a type parameter instead of a runtime pointer, so there is
/// no buffer to mismanage and no possibility of a stray alias into task
/// memory.
///
/// # Invariants
///
/// - `0 <= n_used <= N` at every observable point.
/// - `head` and `tail` are always in `0..N` (`N == 0` is rejected by
///   [`Queue::new`]).
/// - `n_used` tracks the number of live slots between `tail` and `head`.
///
/// Per spec: `push` must be called from a context at least as urgent as any
/// concurrent pusher (in practice: always from within a critical section, as
/// [`crate::task::Task::post`] arranges), and `pop` must be called with
/// interrupts disabled. This type does not itself enforce that — it is a
/// plain data structure; [`crate::task::Task`] is the only thing that is
/// allowed to call these methods, and it always does so under
/// `critical_section::with`.
pub struct Queue<const N: usize> {
    buf: [Option<EventRef>; N],
    head: usize,
    tail: usize,
    n_used: usize,
}

impl<const N: usize> Queue<N> {
    /// Builds an empty queue. `N` must be nonzero: a zero-capacity AO can
    /// never receive an event, which is never useful and is almost certainly
    /// a configuration mistake, so no `const` path to creating one exists.
    pub const fn new() -> Self {
        assert!(N > 0, "a Task's queue capacity must be nonzero");
        Queue {
            buf: [None; N],
            head: 0,
            tail: 0,
            n_used: 0,
        }
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.n_used
    }

    /// Capacity, for diagnostics.
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        self.n_used == 0
    }

    pub fn is_full(&self) -> bool {
        self.n_used == N
    }

    /// Enqueues `evt` at the tail. Fails with [`Overflow`] if the queue is
    /// already at capacity; never overwrites existing entries.
    pub fn push(&mut self, evt: EventRef) -> Result<(), Overflow> {
        if self.n_used == N {
            return Err(Overflow);
        }
        self.buf[self.head] = Some(evt);
        self.head = (self.head + 1) % N;
        self.n_used += 1;
        Ok(())
    }

    /// Dequeues the oldest event, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<EventRef> {
        if self.n_used == 0 {
            return None;
        }
        let evt = self.buf[self.tail].take();
        self.tail = (self.tail + 1) % N;
        self.n_used -= 1;
        evt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sst_abi::{BaseEvent, Event};

    static A: BaseEvent = BaseEvent { sig: 10 };
    static B: BaseEvent = BaseEvent { sig: 11 };
    static C: BaseEvent = BaseEvent { sig: 12 };

    #[test]
    fn fifo_order_is_preserved() {
        let mut q: Queue<4> = Queue::new();
        q.push(&A).unwrap();
        q.push(&B).unwrap();
        q.push(&C).unwrap();
        assert_eq!(q.pop().unwrap().signal(), 10);
        assert_eq!(q.pop().unwrap().signal(), 11);
        assert_eq!(q.pop().unwrap().signal(), 12);
        assert!(q.pop().is_none());
    }

    #[test]
    fn overflow_is_rejected_without_disturbing_existing_entries() {
        let mut q: Queue<2> = Queue::new();
        q.push(&A).unwrap();
        q.push(&B).unwrap();
        assert_eq!(q.push(&C), Err(Overflow));
        assert_eq!(q.pop().unwrap().signal(), 10);
        assert_eq!(q.pop().unwrap().signal(), 11);
    }

    #[test]
    fn wraps_around_the_backing_array() {
        let mut q: Queue<2> = Queue::new();
        for _ in 0..5 {
            q.push(&A).unwrap();
            q.push(&B).unwrap();
            assert_eq!(q.pop().unwrap().signal(), 10);
            assert_eq!(q.pop().unwrap().signal(), 11);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn max_n_used_never_exceeds_capacity() {
        let mut q: Queue<3> = Queue::new();
        for _ in 0..3 {
            q.push(&A).unwrap();
        }
        assert!(q.is_full());
        assert_eq!(q.len(), 3);
        assert!(q.push(&A).is_err());
        assert_eq!(q.len(), 3);
    }
}
