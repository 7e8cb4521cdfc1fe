//! The canonical "wait for I/O, optionally with a timeout" primitive that all I/O-blocking code
//! in this ecosystem funnels through.
//!
//! Grounded on `examples/original_source/guv/hubs/trampoline.py`'s `trampoline()`: register a
//! listener, optionally arm a timeout, switch control to the hub, and unconditionally clean up
//! both on the way out. Under the native async-task option (`spec.md` §9 option (b)) "switch to
//! the hub" is simply `.await`ing the listener's readiness future, raced against the timer via
//! `tokio::select!`.

use std::os::unix::io::RawFd;
use std::time::Duration;

use hub::{ClosedError, Hub, HubError};
use reactor::Direction;

/// Why a `trampoline` call did not return readiness.
#[derive(Debug)]
pub enum TrampolineError<E> {
    /// `hub.add` reported that `(dir, fd)` already has a listener. No listener was installed and
    /// no timer was left pending.
    Registration(HubError),
    /// The deadline elapsed before the fd became ready. Carries the caller-supplied exception
    /// value (`timeout_exc` in `spec.md` §4.2).
    Timeout(E),
    /// The fd was closed externally while this call was waiting on it.
    Closed(ClosedError),
}

impl<E: std::fmt::Display> std::fmt::Display for TrampolineError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrampolineError::Registration(e) => write!(f, "{e}"),
            TrampolineError::Timeout(e) => write!(f, "{e}"),
            TrampolineError::Closed(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for TrampolineError<E> {}

/// Wait until `fd` is ready for I/O in direction `dir`, or until `timeout` elapses.
///
/// - `timeout = None`: wait indefinitely.
/// - `timeout = Some(d)`: if `d` elapses first, return `Err(TrampolineError::Timeout(_))` with
///   the value produced by `timeout_exc`. The watch direction is exclusive — a single call can
///   only wait on one of `Read`/`Write`; a caller needing both must serialize the two waits
///   (`spec.md` §4.2).
///
/// On every exit path — readiness, timeout, or the fd being closed externally — the listener is
/// removed and the timer (if any) is cancelled before this function returns; `spec.md` §8
/// invariant 2.
pub async fn trampoline<E>(
    hub: &Hub,
    fd: RawFd,
    dir: Direction,
    timeout: Option<Duration>,
    timeout_exc: impl FnOnce() -> E,
) -> Result<(), TrampolineError<E>> {
    let listener = hub.add(dir, fd).map_err(TrampolineError::Registration)?;

    let outcome = match timeout {
        None => listener.ready().await.map_err(TrampolineError::Closed),
        Some(duration) => {
            tokio::select! {
                biased;
                ready = listener.ready() => ready.map_err(TrampolineError::Closed),
                () = tokio::time::sleep(duration) => Err(TrampolineError::Timeout(timeout_exc())),
            }
        }
    };

    // `listener`'s Drop impl also removes it, but we remove explicitly (and first) so the
    // registry is clear before this function's caller observes the result, matching "unconditionally
    // remove the listener and cancel the timer" as a postcondition of `trampoline` returning.
    hub.remove(&listener);

    outcome
}
