use std::cell::Cell;
use std::fmt;
use std::os::unix::io::RawFd;

use reactor::{Direction, Watch};

use crate::{Hub, HubError};

/// Raised when the listener's underlying file descriptor was closed out from under it while a
/// task was waiting on it. Delivered to the waiter in place of a readiness result — the "throw"
/// continuation from `spec.md` §3/§4.1 collapses to this `Err` arm under the async-task model,
/// since there is no separate resume/throw callback pair to juggle.
#[derive(Debug)]
pub struct ClosedError {
    pub dir: Direction,
    pub fd: RawFd,
    source: std::io::Error,
}

impl fmt::Display for ClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listener for fd {} ({}) was closed externally: {}",
            self.fd, self.dir, self.source
        )
    }
}

impl std::error::Error for ClosedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// One task's registered intent to wait for readiness on a `(direction, fd)`.
///
/// Lives until `Hub::remove` is called or the `Listener` is dropped, whichever comes first;
/// dropping without an explicit `remove` still deregisters (idempotent), matching
/// `spec.md` §3's "lives until `hub.remove` or until its fd is closed" lifecycle.
pub struct Listener {
    hub: Hub,
    dir: Direction,
    fd: RawFd,
    watch: Watch,
    removed: Cell<bool>,
}

impl Listener {
    pub fn direction(&self) -> Direction {
        self.dir
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Wait for this listener's fd to become ready. Returns `Ok(())` on readiness, or
    /// `Err(ClosedError)` if the descriptor was closed externally.
    pub async fn ready(&self) -> Result<(), ClosedError> {
        self.watch.ready(self.dir).await.map_err(|source| ClosedError {
            dir: self.dir,
            fd: self.fd,
            source,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.hub.remove(self);
    }
}

impl Hub {
    /// Register interest in `(dir, fd)`. Fails synchronously, without touching the reactor, if a
    /// listener for that pair is already registered — `spec.md` §4.1's "fails with a 'multiple
    /// listeners' error if (dir, fd) is already registered".
    pub fn add(&self, dir: Direction, fd: RawFd) -> Result<Listener, HubError> {
        {
            let mut listeners = self.listeners().lock();
            if !listeners.insert((dir, fd)) {
                return Err(HubError { dir, fd });
            }
        }
        log::trace!("hub: registered listener for fd {fd} ({dir})");

        let watch = match Watch::new(fd) {
            Ok(watch) => watch,
            Err(err) => {
                // Roll back the registry entry: registration failed before a Listener (and thus
                // its Drop impl) ever existed to do so.
                self.listeners().lock().remove(&(dir, fd));
                // `reactor::Watch::new` only fails if there is no ambient reactor to register
                // with, or the fd is already registered with *that* reactor under a different
                // interest set (an invariant violation the registry above is meant to prevent).
                // Surface it with the same error shape as any other registration failure.
                log::warn!("hub: failed to register fd {fd} ({dir}) with the reactor: {err}");
                return Err(HubError { dir, fd });
            }
        };

        Ok(Listener {
            hub: self.clone(),
            dir,
            fd,
            watch,
            removed: Cell::new(false),
        })
    }

    /// Unregister `listener`. Idempotent: calling this twice (directly, or once directly and once
    /// via `Drop`) does not corrupt the registry.
    pub fn remove(&self, listener: &Listener) {
        if listener.removed.replace(true) {
            return;
        }
        self.listeners().lock().remove(&(listener.dir, listener.fd));
        log::trace!(
            "hub: removed listener for fd {} ({})",
            listener.fd,
            listener.dir
        );
    }
}
