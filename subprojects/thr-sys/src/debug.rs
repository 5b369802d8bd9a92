//! Fatal diagnostics
//!
//! Usage errors (destroying a contended lock, unlocking a mutex owned by another thread, joining
//! an unknown thread, ...) are contract violations, not recoverable conditions. They terminate the
//! process through [`fatal`], after emitting a diagnostic naming the violated invariant.

use core::fmt;

/// Reports a violated runtime invariant and aborts the current thread of execution.
///
/// The diagnostic is emitted at `error` level and then raised as a panic whose message ends with
/// the invariant name, e.g. `"mutex unlocked by a thread that does not own it: MUTEX_UNLOCK_NOT_OWNER"`.
/// On the target the panic strategy is `abort`, which terminates the whole process.
#[cold]
#[track_caller]
pub fn fatal(invariant: &'static str, args: fmt::Arguments<'_>) -> ! {
    log::error!("{args}: {invariant}");
    panic!("{args}: {invariant}");
}
