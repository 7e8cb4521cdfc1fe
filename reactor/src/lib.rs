//! Binding between raw file descriptors and the OS-level readiness poller that the rest of the
//! core is built on.
//!
//! This is the leaf of the dependency order: hub, trampoline and task all sit on top of it, and
//! it depends on nothing in this workspace.

use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use tokio::io::unix::AsyncFd;

/// The two directions a file descriptor can be watched in.
///
/// Opaque outside of this crate beyond equality/hashing: callers never need to know how a
/// direction is represented, only that `Read` and `Write` are distinct keys into a listener
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Read => "READ",
            Direction::Write => "WRITE",
        })
    }
}

/// A raw fd wrapper satisfying `AsRawFd` without taking ownership of (or closing) the
/// descriptor. The caller remains responsible for the fd's lifetime; we only ever borrow it for
/// the duration of a single readiness registration.
struct BorrowedFd(RawFd);

impl AsRawFd for BorrowedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// A transient registration of one fd with the reactor.
///
/// Dropping a `Watch` deregisters the fd from the poller. Construction is cheap; the Hub creates
/// one per `add()` call and drops it on `remove()`.
pub struct Watch {
    inner: AsyncFd<BorrowedFd>,
}

impl Watch {
    /// Register `fd` with the reactor. Fails if called outside of a tokio runtime context, or if
    /// the fd is already at its OS-level registration limit.
    pub fn new(fd: RawFd) -> io::Result<Watch> {
        Ok(Watch {
            inner: AsyncFd::new(BorrowedFd(fd))?,
        })
    }

    /// Wait for `fd` to become ready in `dir`. Resolves as soon as the poller reports readiness;
    /// does not perform any I/O itself, so a caller that gets a false-positive wakeup (spurious
    /// readiness) should simply retry its read/write and call `ready` again.
    pub async fn ready(&self, dir: Direction) -> io::Result<()> {
        match dir {
            Direction::Read => {
                let mut guard = self.inner.readable().await?;
                guard.clear_ready();
            }
            Direction::Write => {
                let mut guard = self.inner.writable().await?;
                guard.clear_ready();
            }
        }
        Ok(())
    }
}
