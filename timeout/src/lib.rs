//! A scoped deadline that injects an exception into its owning computation when it elapses.
//!
//! Grounded on `spec.md` §4.4 and, at one remove, on `task_executor::TailTasks::wait`'s
//! `tokio::select! { biased; ... }` race between a timeout and the work it bounds — the same
//! shape, generalized so the timed-out branch carries a caller-chosen exception value instead of
//! a fixed outcome.

use std::future::Future;

/// The default exception injected by `Timeout`/`with_timeout` when no caller-supplied exception
/// value is given. May be "subclassed" (in spirit) by using `with_timeout_exc`/`Timeout::run`
/// with a different `E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutError;

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("deadline exceeded")
    }
}

impl std::error::Error for TimeoutError {}

/// A scoped deadline, armed on construction and implicitly disarmed when the future it bounds
/// (via `run`) settles — normally, exceptionally, or by timing out. There is no separate
/// teardown step to call: unlike `spec.md`'s stackful-coroutine rendition (where a
/// `hub.schedule_call_global` timer must be explicitly cancelled on every scope-exit path), the
/// `tokio::select!` race in `run` *is* the cancellation: the losing branch (the sleep, if the
/// body wins; the body, if the sleep wins) is simply dropped, which tears down whatever it was
/// doing.
///
/// A `Timeout` with `seconds = None` is a no-op arm: `run` just awaits the body directly.
pub struct Timeout {
    seconds: Option<f64>,
}

impl Timeout {
    pub fn new(seconds: Option<f64>) -> Timeout {
        Timeout { seconds }
    }

    /// Run `future` under this deadline. `seconds <= 0.0` fires at the earliest following
    /// iteration, per `spec.md` §4.4.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, TimeoutError> {
        match self.seconds {
            None => Ok(future.await),
            Some(seconds) => {
                let duration = hub::Hub::duration_from_secs(seconds);
                tokio::select! {
                    biased;
                    value = future => Ok(value),
                    () = tokio::time::sleep(duration) => Err(TimeoutError),
                }
            }
        }
    }

    /// Same as `run`, but the timed-out branch carries a caller-supplied exception value instead
    /// of the default `TimeoutError` — the generalization of `spec.md`'s `exc` parameter.
    pub async fn run_exc<F, E>(&self, future: F, timeout_exc: impl FnOnce() -> E) -> Result<F::Output, E>
    where
        F: Future,
    {
        match self.seconds {
            None => Ok(future.await),
            Some(seconds) => {
                let duration = hub::Hub::duration_from_secs(seconds);
                tokio::select! {
                    biased;
                    value = future => Ok(value),
                    () = tokio::time::sleep(duration) => Err(timeout_exc()),
                }
            }
        }
    }
}

/// Run `future` under a `seconds`-deadline, re-raising `TimeoutError` on expiry.
pub async fn with_timeout<F: Future>(seconds: Option<f64>, future: F) -> Result<F::Output, TimeoutError> {
    Timeout::new(seconds).run(future).await
}

/// Run `future` under a `seconds`-deadline; on expiry, return `timeout_value()` instead of
/// re-raising. The Rust-idiomatic rendering of `spec.md`'s `with_timeout(..., timeout_value=_UNSET)`
/// sentinel-default parameter: rather than a sentinel, the "re-raise" and "substitute a value"
/// behaviors are two distinct entry points (`with_timeout` vs. this function).
pub async fn with_timeout_or<F: Future>(
    seconds: Option<f64>,
    future: F,
    timeout_value: impl FnOnce() -> F::Output,
) -> F::Output {
    match Timeout::new(seconds).run(future).await {
        Ok(value) => value,
        Err(TimeoutError) => timeout_value(),
    }
}
