// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Two blinking LEDs driven by a debounced button, ported from
//! `bsp_nucleo-h743zi.c`.
//!
//! `Button` samples a simulated GPIO pin on every tick and debounces it with
//! the Ganssle two-sample edge detector from the source lineage's
//! `SysTick_Handler`. On each edge it fans out to two different targets the
//! way the original `Button2b` example does: a forwarded work event
//! (carrying a toggle count) to `Blinky3`, and a plain press/release signal
//! to `ButtonLog`. `Blinky1` blinks on its own independent cadence,
//! unrelated to the button, to show two AOs running at different priorities
//! side by side.
//!
//! Runs entirely on the host against `sst-port-sim`; there is no hardware
//! target for this demo.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use sst_abi::{define_signals, impl_event, BaseEvent, EventRef, Priority, Signal};
use sst_kern::fail::on_assert;
use sst_kern::{Kernel, Task, TimeEvt, TimeEvtRegistry};
use sst_port_sim::SimPort;

define_signals! {
    BUTTON_PRESSED_SIG,
    BUTTON_RELEASED_SIG,
    FORWARD_PRESSED_SIG,
    FORWARD_RELEASED_SIG,
    BLINK_TICK_SIG,
}

/// A forwarded work request: blink `toggles` times, one per subsequent
/// tick. Mirrors `BSP_getWorkEvtBlinky3`'s payload in the source lineage.
struct WorkEvt {
    sig: Signal,
    toggles: u16,
}
impl_event!(WorkEvt);

static TICK: BaseEvent = BaseEvent { sig: BLINK_TICK_SIG };
static FORWARD_PRESSED: WorkEvt = WorkEvt {
    sig: FORWARD_PRESSED_SIG,
    toggles: 4,
};
static FORWARD_RELEASED: WorkEvt = WorkEvt {
    sig: FORWARD_RELEASED_SIG,
    toggles: 0,
};
static BUTTON_PRESSED: BaseEvent = BaseEvent {
    sig: BUTTON_PRESSED_SIG,
};
static BUTTON_RELEASED: BaseEvent = BaseEvent {
    sig: BUTTON_RELEASED_SIG,
};

/// Simulated GPIO: the demo driver (or a test) calls [`set_pin`] to move the
/// button; `Button`'s dispatch reads it back every tick the same way the
/// original reads `GPIOC->IDR`.
static PIN: AtomicU8 = AtomicU8::new(0);

pub fn set_pin(level: u8) {
    PIN.store(level, Ordering::SeqCst);
}

fn read_pin() -> u8 {
    PIN.load(Ordering::SeqCst)
}

/// External telemetry, separate from each AO's own private dispatch state:
/// a real application would expose counters like these to a logging task or
/// a debug probe rather than reach into another AO's state directly.
static BLINKY1_TOGGLES: AtomicU32 = AtomicU32::new(0);
static BLINKY3_TOGGLES: AtomicU32 = AtomicU32::new(0);
static BUTTON_PRESSES: AtomicU32 = AtomicU32::new(0);
static BUTTON_RELEASES: AtomicU32 = AtomicU32::new(0);

pub struct Blinky1State {
    on: bool,
}
fn blinky1_init(_s: &mut Blinky1State, e: Option<EventRef>) {
    if e.is_some() {
        on_assert("blinky1", line!());
    }
}
fn blinky1_dispatch(s: &mut Blinky1State, e: EventRef) {
    match e.signal() {
        BLINK_TICK_SIG => {
            s.on = !s.on;
            BLINKY1_TOGGLES.fetch_add(1, Ordering::SeqCst);
        }
        _ => on_assert("blinky1", line!()),
    }
}
pub static BLINKY1: Task<4, Blinky1State> = Task::new(
    Priority(3),
    Blinky1State { on: false },
    blinky1_init,
    blinky1_dispatch,
);

/// Idle until the button forwards a work request, then toggles its LED the
/// requested number of times as its own timer fires, one toggle per tick.
pub struct Blinky3State {
    on: bool,
    remaining: u16,
}
fn blinky3_init(_s: &mut Blinky3State, e: Option<EventRef>) {
    if e.is_some() {
        on_assert("blinky3", line!());
    }
}
fn blinky3_dispatch(s: &mut Blinky3State, e: EventRef) {
    match e.signal() {
        FORWARD_PRESSED_SIG => {
            let w = e
                .as_any()
                .downcast_ref::<WorkEvt>()
                .expect("FORWARD_PRESSED_SIG always carries a WorkEvt");
            s.remaining = w.toggles;
        }
        FORWARD_RELEASED_SIG => {
            s.remaining = 0;
        }
        BLINK_TICK_SIG => {
            if s.remaining > 0 {
                s.on = !s.on;
                s.remaining -= 1;
                BLINKY3_TOGGLES.fetch_add(1, Ordering::SeqCst);
            }
        }
        _ => on_assert("blinky3", line!()),
    }
}
pub static BLINKY3: Task<8, Blinky3State> = Task::new(
    Priority(2),
    Blinky3State {
        on: false,
        remaining: 0,
    },
    blinky3_init,
    blinky3_dispatch,
);

fn button_log_init(_s: &mut (), e: Option<EventRef>) {
    if e.is_some() {
        on_assert("button_log", line!());
    }
}
fn button_log_dispatch(_s: &mut (), e: EventRef) {
    match e.signal() {
        BUTTON_PRESSED_SIG => {
            BUTTON_PRESSES.fetch_add(1, Ordering::SeqCst);
        }
        BUTTON_RELEASED_SIG => {
            BUTTON_RELEASES.fetch_add(1, Ordering::SeqCst);
        }
        _ => on_assert("button_log", line!()),
    }
}
pub static BUTTON_LOG: Task<4, ()> =
    Task::new(Priority(1), (), button_log_init, button_log_dispatch);

/// Ganssle two-sample debounce from `bsp_nucleo-h743zi.c`'s
/// `SysTick_Handler`: a transition only registers once it has held for two
/// consecutive ticks.
pub struct ButtonState {
    previous: u8,
    depressed: u8,
}
fn button_init(_s: &mut ButtonState, e: Option<EventRef>) {
    if e.is_some() {
        on_assert("button", line!());
    }
}
fn button_dispatch(s: &mut ButtonState, e: EventRef) {
    match e.signal() {
        BLINK_TICK_SIG => {
            let current = read_pin();
            let before = s.depressed;
            s.depressed |= s.previous & current;
            s.depressed &= s.previous | current;
            s.previous = current;
            if before != s.depressed {
                if s.depressed != 0 {
                    BLINKY3.post::<SimPort>(&FORWARD_PRESSED);
                    BUTTON_LOG.post::<SimPort>(&BUTTON_PRESSED);
                } else {
                    BLINKY3.post::<SimPort>(&FORWARD_RELEASED);
                    BUTTON_LOG.post::<SimPort>(&BUTTON_RELEASED);
                }
            }
        }
        _ => on_assert("button", line!()),
    }
}
pub static BUTTON: Task<4, ButtonState> = Task::new(
    Priority(4),
    ButtonState {
        previous: 0,
        depressed: 0,
    },
    button_init,
    button_dispatch,
);

fn blinky1_isr() {
    BLINKY1.activate::<SimPort>();
}
fn blinky3_isr() {
    BLINKY3.activate::<SimPort>();
}
fn button_isr() {
    BUTTON.activate::<SimPort>();
}
fn button_log_isr() {
    BUTTON_LOG.activate::<SimPort>();
}

fn post_to_blinky1(e: EventRef) {
    BLINKY1.post::<SimPort>(e);
}
fn post_to_blinky3(e: EventRef) {
    BLINKY3.post::<SimPort>(e);
}
fn post_to_button(e: EventRef) {
    BUTTON.post::<SimPort>(e);
}

static TICK_REG: TimeEvtRegistry = TimeEvtRegistry::new();
static BLINKY1_TE: TimeEvt = TimeEvt::new(&TICK, post_to_blinky1);
static BLINKY3_TE: TimeEvt = TimeEvt::new(&TICK, post_to_blinky3);
static BUTTON_TE: TimeEvt = TimeEvt::new(&TICK, post_to_button);

fn wire_up() -> Kernel<SimPort, 8> {
    let k: Kernel<SimPort, 8> = Kernel::new();
    k.init();
    k.start_task(&BLINKY1, blinky1_isr, None);
    k.start_task(&BLINKY3, blinky3_isr, None);
    k.start_task(&BUTTON, button_isr, None);
    k.start_task(&BUTTON_LOG, button_log_isr, None);

    // one shared tick source drives every AO's cadence, the way a single
    // SysTick ISR does on the original board
    TICK_REG.arm(&BLINKY1_TE, 1, 1);
    TICK_REG.arm(&BLINKY3_TE, 1, 1);
    TICK_REG.arm(&BUTTON_TE, 1, 1);
    k
}

// This demo drives its own tick source by hand instead of calling
// `k.run`: `run` loops forever waiting for interrupts, which would hang
// both `main` and the test below. Ticking happens at BSP level on real
// hardware anyway; what `wire_up` demonstrates is `Kernel::init` and
// `start_task`'s lifecycle, not the idle loop.
fn main() {
    let _k = wire_up();

    for tick in 1..=20u32 {
        if tick == 3 {
            set_pin(1); // press starts
        }
        if tick == 8 {
            set_pin(0); // release starts
        }
        TICK_REG.tick();
    }

    println!(
        "blinky1 toggled {} times, blinky3 toggled {} times, {} press(es), {} release(s)",
        BLINKY1_TOGGLES.load(Ordering::SeqCst),
        BLINKY3_TOGGLES.load(Ordering::SeqCst),
        BUTTON_PRESSES.load(Ordering::SeqCst),
        BUTTON_RELEASES.load(Ordering::SeqCst),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // This binary's statics (BLINKY1, BUTTON, the telemetry counters, ...)
    // are process-global, so unlike `sst-kern`'s own tests this one test
    // drives the whole wiring exactly once; a second `#[test]` here would
    // observe the first test's state.
    #[test]
    fn button_press_forwards_a_work_item_to_blinky3_and_logs_once() {
        sst_port_sim::reset();
        let _k = wire_up();

        for tick in 1..=20u32 {
            if tick == 3 {
                set_pin(1);
            }
            if tick == 8 {
                set_pin(0);
            }
            TICK_REG.tick();
        }

        assert_eq!(BUTTON_PRESSES.load(Ordering::SeqCst), 1);
        assert_eq!(BUTTON_RELEASES.load(Ordering::SeqCst), 1);
        // Blinky3 was handed exactly one 4-toggle work item and had enough
        // remaining ticks to run all four before the demo loop ended.
        assert_eq!(BLINKY3_TOGGLES.load(Ordering::SeqCst), 4);
        assert!(BLINKY1_TOGGLES.load(Ordering::SeqCst) >= 18);
    }
}
