//! The per-thread scheduler: owns the event loop, the timer facility, and the listener
//! registry. Everything else in this workspace (`trampoline`, `task`, `timeout`) is built in
//! terms of the handful of operations exposed here.
//!
//! # Concurrency model
//!
//! A `Hub` is confined to the OS thread that created it: it is backed by a `Rc`, not an `Arc`,
//! and its tasks are spawned onto a `tokio::task::LocalSet` rather than the default
//! multi-threaded executor. This makes "tasks within a hub never run in parallel" and "a hub's
//! state cannot be touched from another thread" compiler-enforced invariants rather than
//! documentation: a `Hub` (and anything spawned through it) is simply not `Send`.
//!
//! This is a deliberate divergence from `task_executor::Executor` (the pattern this crate is
//! otherwise modeled on), which is `Arc`-backed and multi-threaded by design; see `DESIGN.md`.

mod listener;
mod timer;

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::os::unix::io::RawFd;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::Duration;

use reactor::Direction;
use tokio::runtime::Runtime;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, LocalSet};

pub use listener::{ClosedError, Listener};
pub use timer::Timer;

/// Configuration accepted by `Hub::new_owned`.
///
/// This is the only configuration surface the core exposes: the hub is a library component, not
/// an application, so there is no file-based config layer (see `SPEC_FULL.md` §6). It corresponds
/// 1:1 to `AbstractHub._debug_exceptions` in the original Python implementation.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// When true, exceptions from fire-and-forget (`spawn_n`) tasks are logged at `error` level
    /// instead of being silently swallowed.
    pub debug_exceptions: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            debug_exceptions: true,
        }
    }
}

/// Raised synchronously by `Hub::add` when a second listener is registered for a `(dir, fd)`
/// pair that already has one. A programming bug, not a runtime condition: see `SPEC_FULL.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubError {
    pub dir: Direction,
    pub fd: RawFd,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "multiple listeners on fd {} for direction {} are not supported",
            self.fd, self.dir
        )
    }
}

impl std::error::Error for HubError {}

struct Inner {
    /// `Some` for an owned hub (built by `new_owned`, drives its own `run()`); `None` for a
    /// borrowed hub that adopts an already-running ambient executor (used in tests, mirroring
    /// `#[tokio::test]`/`Executor::new()`).
    runtime: Option<Runtime>,
    local: LocalSet,
    listeners: parking_lot::Mutex<HashSet<(Direction, RawFd)>>,
    stop_notify: Notify,
    stopping: std::sync::atomic::AtomicBool,
    config: HubConfig,
}

/// The per-thread scheduler and event-loop owner.
///
/// Cheap to clone: clones share the same underlying event loop, listener registry and timer
/// facility (an `Rc` bump), exactly like `task_executor::Executor::to_borrowed` shares a
/// `Handle` — except here sharing is also the *only* mode, since a `Hub` never crosses threads.
#[derive(Clone)]
pub struct Hub(Rc<Inner>);

impl Hub {
    /// Adopts the ambient tokio executor (a `LocalSet` must already be entered by the caller, via
    /// `LocalSet::run_until`/`LocalSet::enter` — e.g. inside a `#[tokio::test]`). The returned
    /// hub will not itself drive a loop; `run`/`abort` are not meaningful on it. This mirrors
    /// `Executor::new()` adopting `Handle::current()`.
    pub fn new(config: HubConfig) -> Hub {
        Hub(Rc::new(Inner {
            runtime: None,
            local: LocalSet::new(),
            listeners: parking_lot::Mutex::new(HashSet::new()),
            stop_notify: Notify::new(),
            stopping: std::sync::atomic::AtomicBool::new(false),
            config,
        }))
    }

    /// Builds and owns a single-threaded `tokio::runtime::Runtime` to drive its event loop.
    /// Mirrors `Executor::new_owned`, minus the thread-pool sizing (a hub is, by definition, one
    /// OS thread).
    pub fn new_owned(config: HubConfig) -> Result<Hub, String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start the hub's runtime: {e}"))?;
        Ok(Hub(Rc::new(Inner {
            runtime: Some(runtime),
            local: LocalSet::new(),
            listeners: parking_lot::Mutex::new(HashSet::new()),
            stop_notify: Notify::new(),
            stopping: std::sync::atomic::AtomicBool::new(false),
            config,
        })))
    }

    /// Execute the event loop until `abort()` is called.
    ///
    /// Must be called at most once per hub lifetime, from the thread that owns it, on a hub built
    /// via `new_owned`. Panics if called on a borrowed hub (one built via `new`), since there is
    /// no owned `Runtime` to drive.
    ///
    /// `spec.md` §4.1 also terminates `run()` when "no live handles remain". Detecting
    /// "the `LocalSet` is fully idle" is not exposed by tokio's public API, so this
    /// implementation supports termination via `abort()` only; see `DESIGN.md` Open Questions.
    ///
    /// # Hub-task resurrection
    ///
    /// The root future driven here only awaits `abort()`'s notification; it never touches
    /// application state, so an escaping panic almost always means a bug in this loop body
    /// itself rather than in a spawned task (tokio already isolates those — a panicking
    /// `spawn_local`'d task cannot bring this root future down). If the root future does panic,
    /// `run()` does not tear the hub down: `self.0.local` (the `LocalSet` holding every
    /// still-registered listener and timer task) is untouched by the unwind, so a fresh root
    /// future is simply driven in its place, and everything already spawned on it keeps running
    /// under the new one. `run()` only returns once `abort()` has actually been observed.
    pub fn run(&self) {
        let runtime = self
            .0
            .runtime
            .as_ref()
            .expect("Hub::run() called on a borrowed hub with no owned runtime");

        loop {
            if self.is_stopping() {
                break;
            }

            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                runtime.block_on(self.0.local.run_until(async {
                    self.0.stop_notify.notified().await;
                }));
            }));

            match result {
                Ok(()) => break,
                Err(payload) => {
                    log::error!(
                        "hub event loop's root task panicked ({}); resuming with a fresh root \
                         task on the same LocalSet, so already-registered listeners and timers \
                         are unaffected",
                        panic_payload_message(&payload),
                    );
                }
            }
        }
    }

    /// Request loop termination. Safe to call from any task sharing this hub. The loop exits
    /// after the current iteration completes.
    pub fn abort(&self) {
        self.0
            .stopping
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.0.stop_notify.notify_waiters();
    }

    pub fn is_stopping(&self) -> bool {
        self.0.stopping.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn debug_exceptions(&self) -> bool {
        self.0.config.debug_exceptions
    }

    /// Spawn a `!Send` future onto this hub's `LocalSet`. The building block every `spawn`-family
    /// function in the `task` crate is implemented in terms of.
    pub fn spawn_local<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.0.local.spawn_local(future)
    }

    /// Drive this hub's `LocalSet` until `future` completes, returning its output.
    ///
    /// This is the entry point for a *borrowed* hub (one built via `Hub::new`, e.g. in tests
    /// running under `#[tokio::test]`'s own ambient runtime): it has no owned `Runtime` to call
    /// `block_on` with, so callers await `drive` directly from within that ambient runtime.
    pub async fn drive<F: Future>(&self, future: F) -> F::Output {
        self.0.local.run_until(future).await
    }

    pub(crate) fn listeners(&self) -> &parking_lot::Mutex<HashSet<(Direction, RawFd)>> {
        &self.0.listeners
    }

    /// Whether a listener is currently registered for `(dir, fd)`. Mostly useful for asserting
    /// the cleanup invariants in `spec.md` §8 from tests; not needed for ordinary use of the hub.
    pub fn has_listener(&self, dir: Direction, fd: RawFd) -> bool {
        self.0.listeners.lock().contains(&(dir, fd))
    }

    /// Clamp a `spec.md`-style `seconds` value (which may be zero or negative) to a `Duration`,
    /// treating anything `<= 0.0` as zero. This is the resolution of the Open Question "whether
    /// `sleep(negative)` should be treated as `sleep(0)` or be an error" — see `DESIGN.md`.
    pub fn duration_from_secs(seconds: f64) -> Duration {
        if seconds <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(seconds)
        }
    }
}

thread_local! {
    static HUB: RefCell<Option<Hub>> = const { RefCell::new(None) };
}

/// Lazily create (on first access in this thread) or return the thread's `Hub`.
///
/// Grounded on `AbstractHub.ensure_greenlet`/the module-level `get_hub()` singleton accessor in
/// `examples/original_source/guv/hubs/abc.py`: a hub is a per-thread singleton, created on
/// demand.
pub fn get_hub() -> Hub {
    HUB.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let hub = Hub::new_owned(HubConfig::default())
                .expect("failed to initialize this thread's hub");
            *slot = Some(hub);
        }
        slot.as_ref().unwrap().clone()
    })
}

/// Install `hub` as the current thread's hub, replacing any existing one. Intended for tests that
/// need a borrowed hub (adopting `#[tokio::test]`'s ambient runtime) instead of the default owned
/// one that `get_hub()` would otherwise lazily construct.
pub fn set_hub(hub: Hub) {
    HUB.with(|cell| {
        *cell.borrow_mut() = Some(hub);
    });
}

fn panic_payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
