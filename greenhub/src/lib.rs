//! Public surface of the cooperative concurrency runtime core: hub, trampoline, and the
//! greenthread lifecycle, re-exported from their individual crates into one module tree.
//!
//! Grounded directly on `examples/original_source/guv/__init__.py`, which re-exports `gyield`
//! from `hubs.trampoline`, `sleep`/`spawn`/`spawn_n`/`spawn_after`/`kill` from `greenthread`, and
//! `Timeout`/`with_timeout` from `timeout` into the top-level `guv` package — the one place a
//! downstream consumer (a socket wrapper, a server loop, a pool) imports from.

pub use hub::{get_hub, set_hub, ClosedError, Hub, HubConfig, HubError, Listener, Timer};
pub use reactor::Direction;
pub use task::{gyield, kill, sleep, spawn, spawn_after, spawn_n, Cancellation, Killable, Task, TaskHandle};
pub use timeout::{with_timeout, with_timeout_or, Timeout, TimeoutError};
pub use trampoline::{trampoline, TrampolineError};

pub const READ: Direction = Direction::Read;
pub const WRITE: Direction = Direction::Write;
