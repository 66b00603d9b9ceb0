//! Per-invocation depth tracking for the interpreter's resource limit.
//!
//! `spec.md` §4.3/§5: the depth counter "is stored in thread-local state so
//! concurrent evaluations do not share limits," and is "cleared on return
//! (including on panic/abnormal return) so that reused worker threads start
//! each evaluation with a zero counter." [`DepthGuard`] gets both properties
//! from `Drop`: every recursive step enters a guard before descending and
//! the guard's destructor always runs, panic or not.

use std::cell::Cell;

use crate::error::InterpError;

/// The default maximum expression-tree depth a single evaluation may
/// traverse before failing with [`InterpError::ResourceLimitExceeded`].
pub const DEFAULT_MAX_DEPTH: usize = 128;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Guards one recursive step of an `Evaluate` call: increments the
/// thread-local depth counter on construction, decrements it on drop.
pub(crate) struct DepthGuard;

impl DepthGuard {
    /// Enters one more level of recursion, failing if `limit` is exceeded.
    ///
    /// The guard is constructed (and the counter incremented) unconditionally
    /// before the limit check, so a failed call still unwinds through
    /// `Drop` and leaves `DEPTH` exactly where it found it -- the counter
    /// must never come out of a failed `enter` call permanently off by one.
    pub(crate) fn enter(limit: usize) -> Result<Self, InterpError> {
        let guard = Self;
        let depth = DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        if depth > limit {
            drop(guard);
            return Err(InterpError::ResourceLimitExceeded { limit, depth });
        }
        Ok(guard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
