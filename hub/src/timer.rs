use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::AbortHandle;

use crate::Hub;

/// A cancellable timer returned by `schedule_call_global`/`schedule_call_now`.
///
/// Cancellation is idempotent (`spec.md` §3): calling `cancel()` more than once, or after the
/// timer has already fired, is harmless. Internally this is a tombstone flag checked just before
/// the callback runs, per the "mark-and-skip" guidance in `spec.md` §9 ("Cancellation should
/// mark-and-skip (tombstone) rather than heap-delete"), plus `AbortHandle::abort` as a
/// best-effort early exit for timers that haven't fired yet.
pub struct Timer {
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl Timer {
    /// Cancel this timer. A cancelled timer is guaranteed not to invoke its callback thereafter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Hub {
    /// Return a cancellable timer that fires `cb()` after `seconds` of real time. Fires even if
    /// the scheduling task has since exited — the callback is driven by a task owned by the hub
    /// itself, not by the caller's task.
    ///
    /// `seconds <= 0.0` is honored as an immediate-next-iteration dispatch (`spec.md` §4.1: "MAY
    /// be honored as an immediate-next-iteration dispatch"); this also resolves the Open Question
    /// of negative durations by treating them the same as zero.
    pub fn schedule_call_global<F>(&self, seconds: f64, cb: F) -> Timer
    where
        F: FnOnce() + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_in_task = cancelled.clone();
        let dur = Hub::duration_from_secs(seconds);

        let join = self.spawn_local(async move {
            if dur.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(dur).await;
            }
            if !cancelled_in_task.load(Ordering::SeqCst) {
                cb();
            }
        });

        Timer {
            cancelled,
            abort: join.abort_handle(),
        }
    }

    /// Schedule `cb` for the next loop iteration. Semantically a zero-delay
    /// `schedule_call_global`, using a dedicated fast path that skips the duration bookkeeping.
    pub fn schedule_call_now<F>(&self, cb: F) -> Timer
    where
        F: FnOnce() + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_in_task = cancelled.clone();

        let join = self.spawn_local(async move {
            tokio::task::yield_now().await;
            if !cancelled_in_task.load(Ordering::SeqCst) {
                cb();
            }
        });

        Timer {
            cancelled,
            abort: join.abort_handle(),
        }
    }
}
