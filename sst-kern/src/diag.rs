// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A small fixed-capacity trace ring, the kernel's only logging facility.
//!
//! There is no text formatting and no backend to flush to: every entry is a
//! plain `Copy` value pushed into a `static` ring under a critical section,
//! cheap enough to call from any activation including the most urgent one.
//! A debugger (or, in tests, [`snapshot`]) reads the ring directly out of
//! memory instead of the firmware spending cycles rendering strings nobody
//! may ever look at.
//!
//! A busy call site repeating the same entry tick after tick (a retried
//! timer, a flooded signal) does not evict the history around it: recording
//! the same [`Trace`] as the most recent entry just increments that entry's
//! `count` in place, the way the source lineage's own ring buffer collapses
//! repeats instead of spending its limited slots on duplicates.

use core::cell::RefCell;
use critical_section::Mutex;

const CAPACITY: usize = 32;

/// One recorded kernel event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Trace {
    /// Slot never written, or overwritten by a later entry.
    Empty,
    /// An event was posted to a task at the given priority.
    Posted { prio: u8, sig: u16 },
    /// A task's activation ISR ran and dispatched the given signal.
    Dispatched { prio: u8, sig: u16 },
    /// A time event was armed for the given initial delay.
    TimerArmed { ticks: u32 },
    /// A time event expired and posted its payload.
    TimerFired,
    /// `on_assert` fired; see [`crate::fail::on_assert`].
    Assert { module: &'static str, line: u32 },
}

impl Default for Trace {
    fn default() -> Self {
        Trace::Empty
    }
}

/// A ring slot: a [`Trace`] plus how many consecutive times it was recorded
/// in a row without a different entry in between.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RingEntry {
    pub trace: Trace,
    pub count: u32,
}

impl RingEntry {
    const EMPTY: RingEntry = RingEntry {
        trace: Trace::Empty,
        count: 0,
    };
}

struct Ring {
    buf: [RingEntry; CAPACITY],
    next: usize,
    last: Option<usize>,
}

impl Ring {
    const fn new() -> Self {
        Ring {
            buf: [RingEntry::EMPTY; CAPACITY],
            next: 0,
            last: None,
        }
    }

    /// Appends `trace`, collapsing into the previous slot's count if it
    /// repeats the most recently recorded entry, otherwise overwriting the
    /// oldest slot once the ring is full.
    fn push(&mut self, trace: Trace) {
        if let Some(last) = self.last {
            if self.buf[last].trace == trace {
                if let Some(count) = self.buf[last].count.checked_add(1) {
                    self.buf[last].count = count;
                    return;
                }
                // count saturated: fall through and start a fresh entry
                // rather than lose the repeat entirely.
            }
        }
        let idx = self.next;
        self.buf[idx] = RingEntry { trace, count: 1 };
        self.next = (idx + 1) % CAPACITY;
        self.last = Some(idx);
    }

    /// Copies out the ring's current contents, oldest entry first.
    fn snapshot(&self) -> [RingEntry; CAPACITY] {
        let mut out = [RingEntry::EMPTY; CAPACITY];
        for i in 0..CAPACITY {
            out[i] = self.buf[(self.next + i) % CAPACITY];
        }
        out
    }
}

static RING: Mutex<RefCell<Ring>> = Mutex::new(RefCell::new(Ring::new()));

/// Appends `entry`, overwriting the oldest slot once the ring is full.
/// Prefer the [`ringbuf_entry!`] macro at call sites.
pub fn record(entry: Trace) {
    critical_section::with(|cs| RING.borrow(cs).borrow_mut().push(entry));
}

/// Copies out the ring's current contents, oldest entry first. Intended for
/// tests and debuggers, not for use from application dispatch code.
pub fn snapshot() -> [RingEntry; CAPACITY] {
    critical_section::with(|cs| RING.borrow(cs).borrow().snapshot())
}

/// Records a [`Trace`] entry. A thin wrapper over [`record`] so call sites
/// read the way the teacher lineage's own tracing macros do.
#[macro_export]
macro_rules! ringbuf_entry {
    ($e:expr) => {
        $crate::diag::record($e)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn wraps_without_panicking_past_capacity() {
        // `RING` is process-global, so other tests' own `record` calls may
        // interleave with this loop; only check that writing well past
        // capacity never panics and that our own marker entries survive in
        // FIFO order relative to each other.
        const MARKER: u32 = 0xC0FFEE;
        for i in 0..(CAPACITY as u32 * 3) {
            record(Trace::TimerArmed {
                ticks: MARKER + i,
            });
        }
        let snap = snapshot();
        assert_eq!(snap.len(), CAPACITY);
        let ours: Vec<u32> = snap
            .iter()
            .filter_map(|e| match e.trace {
                Trace::TimerArmed { ticks } if ticks >= MARKER => Some(ticks - MARKER),
                _ => None,
            })
            .collect();
        // every surviving marker entry we wrote is still in relative order
        assert!(ours.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn repeating_the_same_entry_increments_count_instead_of_displacing_history() {
        // exercised directly against a local `Ring`, not the process-global
        // `RING`, since `record`/`snapshot` are shared across every test in
        // this binary and this needs the previous entry to genuinely be the
        // immediately preceding call.
        let mut ring = Ring::new();
        ring.push(Trace::TimerFired);
        ring.push(Trace::Posted { prio: 1, sig: 10 });
        ring.push(Trace::Posted { prio: 1, sig: 10 });
        ring.push(Trace::Posted { prio: 1, sig: 10 });

        let snap = ring.snapshot();
        let written: Vec<RingEntry> = snap.iter().copied().filter(|e| e.count > 0).collect();
        assert_eq!(
            written,
            vec![
                RingEntry { trace: Trace::TimerFired, count: 1 },
                RingEntry { trace: Trace::Posted { prio: 1, sig: 10 }, count: 3 },
            ]
        );
    }
}
