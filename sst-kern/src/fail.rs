// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contract-violation handling.
//!
//! The kernel has exactly one error model: a violated invariant is a
//! programming mistake, not a recoverable condition, so every internal
//! failure funnels through [`on_assert`] rather than threading `Result`
//! through call sites that have no sensible way to handle being wrong about
//! their own preconditions. This mirrors the `Q_ASSERT`-style discipline
//! of the lineage this kernel is descended from: an impossible `match` arm
//! or a full queue is a defect to be caught during integration, not
//! something dispatch code is expected to recover from at runtime.

use crate::diag::Trace;
use crate::ringbuf_entry;

/// Records `module`/`line` to the trace ring and halts via panic.
///
/// `module` should be a short, stable name (`"task"`, `"time"`, ...) rather
/// than `module_path!()`, which on some targets pulls in a surprisingly
/// large string table. `line` is conventionally `line!()` from the call
/// site.
///
/// Never returns. On hardware ports, the registered `#[panic_handler]`
/// typically captures the trace ring into non-volatile memory before
/// resetting, so the entry recorded here survives the panic.
#[inline(never)]
pub fn on_assert(module: &'static str, line: u32) -> ! {
    ringbuf_entry!(Trace::Assert { module, line });
    panic!("sst: assertion failed at {module}:{line}");
}
