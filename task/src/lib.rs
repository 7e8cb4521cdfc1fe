//! Lightweight-task ("greenthread") lifecycle: spawn, yield, sleep, kill.
//!
//! Grounded on `examples/original_source/guv/greenthread.py`'s module-level `spawn`/`spawn_n`/
//! `spawn_after`/`sleep`/`kill` functions, and on `task_executor::Executor`/`TailTasks` for the
//! ambient shape (result rendezvous via a join handle, fire-and-forget via a logged background
//! watcher).

use std::future::Future;

use hub::Hub;
use tokio::task::{AbortHandle, JoinHandle};

/// The reason a task stopped without producing its normal result.
#[derive(Debug)]
pub enum Cancellation {
    /// The task was killed (`kill()`), or its `JoinHandle`/`AbortHandle` was aborted directly.
    /// Corresponds to `spec.md`'s `TaskExit`.
    TaskExit,
    /// The task's body panicked; carries the panic payload formatted as a string.
    Panicked(String),
}

impl std::fmt::Display for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cancellation::TaskExit => f.write_str("task exited"),
            Cancellation::Panicked(msg) => write!(f, "task panicked: {msg}"),
        }
    }
}

impl std::error::Error for Cancellation {}

impl From<tokio::task::JoinError> for Cancellation {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Cancellation::TaskExit
        } else {
            let payload = err.into_panic();
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            };
            Cancellation::Panicked(msg)
        }
    }
}

/// A task created by `spawn`, with a result rendezvous the caller can `join` on.
///
/// Any exception (panic) raised by the task's body is captured here and re-raised (as
/// `Cancellation::Panicked`) on `join`, per `spec.md` §4.3.
pub struct Task<T> {
    handle: JoinHandle<T>,
}

impl<T: 'static> Task<T> {
    /// Wait for the task to finish and return its result, or the reason it didn't produce one.
    pub async fn join(self) -> Result<T, Cancellation> {
        self.handle.await.map_err(Cancellation::from)
    }
}

/// A task created by `spawn_n`: fire-and-forget, with no result rendezvous.
pub struct TaskHandle {
    abort: AbortHandle,
}

/// Anything `kill` can be called on: both the linked (`Task`) and fire-and-forget (`TaskHandle`)
/// flavors of task.
pub trait Killable {
    #[doc(hidden)]
    fn abort_handle(&self) -> AbortHandle;
}

impl<T> Killable for Task<T> {
    fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }
}

impl Killable for TaskHandle {
    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

/// Schedule `future` to run in a fresh task on the next loop iteration, returning a handle whose
/// result can be awaited via `Task::join`.
pub fn spawn<F>(hub: &Hub, future: F) -> Task<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    Task {
        handle: hub.spawn_local(future),
    }
}

/// Fire-and-forget variant of `spawn`. Any exception is reported via the hub's debug-exception
/// path (logged at `error` level when `HubConfig::debug_exceptions` is set) and otherwise
/// swallowed — mirroring `task_executor::TailTasks`' handling of a failed `JoinSet` member, but
/// without the caller having to wait for completion.
pub fn spawn_n<F>(hub: &Hub, name: impl Into<String>, future: F) -> TaskHandle
where
    F: Future<Output = ()> + 'static,
{
    let name = name.into();
    let debug_exceptions = hub.debug_exceptions();

    let handle = hub.spawn_local(future);
    let abort = handle.abort_handle();

    hub.spawn_local(async move {
        if let Err(err) = handle.await {
            let cancellation = Cancellation::from(err);
            if debug_exceptions && !matches!(cancellation, Cancellation::TaskExit) {
                log::error!("unhandled exception in task `{name}`: {cancellation}");
            }
        }
    });

    TaskHandle { abort }
}

/// Schedule `f()` to be spawned (via `spawn_n`) after `seconds` of real time.
pub fn spawn_after<F, Fut>(
    hub: &Hub,
    seconds: f64,
    name: impl Into<String>,
    f: F,
) -> hub::Timer
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    let hub_for_spawn = hub.clone();
    let name = name.into();
    hub.schedule_call_global(seconds, move || {
        spawn_n(&hub_for_spawn, name, f());
    })
}

/// Cause `task` to raise `Cancellation::TaskExit` at its next suspension point. A no-op if `task`
/// is already dead.
pub fn kill(task: &impl Killable) {
    task.abort_handle().abort();
}

/// Yield to other tasks: the current task is re-enqueued for the next loop iteration, giving all
/// other ready tasks a turn first. Equivalent to `sleep(0)`.
///
/// Grounded on `examples/original_source/guv/hubs/trampoline.py`'s `gyield()`:
/// `hub.schedule_call_now(current.switch); hub.switch()`.
pub async fn gyield(hub: &Hub) {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let _timer = hub.schedule_call_now(move || {
        let _ = tx.send(());
    });
    let _ = rx.await;
}

/// Suspend the current task for `seconds` of real time. `seconds <= 0.0` takes the
/// immediate-dispatch (`gyield`) path rather than arming a timer — `spec.md` §4.3: "`sleep(0)`
/// MUST use the immediate-dispatch path (pure yield)".
pub async fn sleep(hub: &Hub, seconds: f64) {
    if seconds <= 0.0 {
        gyield(hub).await;
    } else {
        tokio::time::sleep(hub::Hub::duration_from_secs(seconds)).await;
    }
}

#[cfg(test)]
mod tests;
