use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::ptr;
use std::task::Waker;
use std::time::Duration;

use bitflags::bitflags;
use tracing::trace;

use crate::io::{Error, Result};
use crate::rt::io::errno;

bitflags! {
    /// Readiness directions a task can wait on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Interest: u8 {
        /// The descriptor has data to read, or the peer hung up.
        const READABLE = 1;
        /// The descriptor can accept writes, or a connect resolved.
        const WRITABLE = 1 << 1;
    }
}

/// Armed wakers for one file descriptor, one slot per direction.
#[derive(Debug, Default)]
struct Registration {
    read: Option<Waker>,
    write: Option<Waker>,
    /// Whether the descriptor is currently in the epoll interest list.
    /// A one-shot delivery disables the kernel entry without removing
    /// it, so re-arming must use `EPOLL_CTL_MOD` rather than `ADD`.
    in_epoll: bool,
}

impl Registration {
    fn armed(&self) -> Interest {
        let mut interest = Interest::empty();
        if self.read.is_some() {
            interest |= Interest::READABLE;
        }
        if self.write.is_some() {
            interest |= Interest::WRITABLE;
        }
        interest
    }
}

/// I/O driver backed by `epoll(7)`.
///
/// All kernel interest is edge-triggered and one-shot: every delivery
/// clears the armed waker slot before the waker runs, so a resumed task
/// that observes `EAGAIN` can immediately re-arm without racing a stale
/// notification, and no readiness is ever delivered twice.
pub(crate) struct Driver {
    /// The `epoll(7)` instance.
    epoll: OwnedFd,
    /// Event buffer reused across `wait` calls.
    events: Vec<libc::epoll_event>,
    /// Armed interest per file descriptor.
    registered: HashMap<RawFd, Registration>,
}

impl Driver {
    /// Total number of events returned by one `wait` call at most.
    const MAX_EVENTS: usize = 1024;

    /// Creates a new `Driver`.
    ///
    /// # Panics
    ///
    /// This function panics if the `epoll(7)` instance could not be
    /// created; the runtime cannot exist without one.
    pub(crate) fn new() -> Self {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd == -1 {
            panic!("{}", errno!("failed to create epoll instance"));
        }

        Driver {
            // SAFETY: `fd` was just returned by `epoll_create1` and is
            // owned by nothing else.
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
            events: Vec::with_capacity(Self::MAX_EVENTS),
            registered: HashMap::new(),
        }
    }

    /// Returns `true` while any direction of any descriptor is armed.
    pub(crate) fn has_registrations(&self) -> bool {
        self.registered.values().any(|r| !r.armed().is_empty())
    }

    /// Arms one-shot interest in `interest` readiness of `fd`,
    /// associating it with `waker`.
    ///
    /// At most one task may wait on each direction of a descriptor:
    /// arming a direction held by a different task fails with
    /// [`Error::Busy`]. Re-arming by the same task replaces the stored
    /// waker.
    pub(crate) fn register(&mut self, fd: RawFd, interest: Interest, waker: Waker) -> Result<()> {
        debug_assert_eq!(
            interest.bits().count_ones(),
            1,
            "registrations arm one direction at a time"
        );

        let entry = self.registered.entry(fd).or_default();
        let slot = if interest.contains(Interest::READABLE) {
            &mut entry.read
        } else {
            &mut entry.write
        };

        match slot {
            Some(existing) if !existing.will_wake(&waker) => return Err(Error::Busy),
            _ => *slot = Some(waker),
        }

        let armed = entry.armed();
        if let Err(err) = arm(self.epoll.as_raw_fd(), fd, armed, entry.in_epoll) {
            // Roll back the slot so an unarmed descriptor is not
            // counted as a pending registration.
            if interest.contains(Interest::READABLE) {
                entry.read = None;
            } else {
                entry.write = None;
            }
            if entry.armed().is_empty() && !entry.in_epoll {
                self.registered.remove(&fd);
            }
            return Err(err);
        }

        entry.in_epoll = true;
        trace!(fd, ?armed, "readiness interest armed");
        Ok(())
    }

    /// Removes every trace of `fd` from the driver.
    ///
    /// Tolerates descriptors the kernel no longer knows about: closing
    /// an fd removes its epoll entries on its own.
    pub(crate) fn unregister(&mut self, fd: RawFd) {
        let Some(entry) = self.registered.remove(&fd) else {
            return;
        };

        if entry.in_epoll {
            let rc = unsafe {
                libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, ptr::null_mut())
            };
            if rc == -1 {
                let code = io::Error::last_os_error().raw_os_error();
                if code != Some(libc::ENOENT) && code != Some(libc::EBADF) {
                    panic!("{}", errno!("failed to remove fd {fd} from epoll interest list"));
                }
            }
        }

        trace!(fd, "readiness interest dropped");
    }

    /// Blocks for up to `timeout` (indefinitely if [`None`]) awaiting
    /// readiness on any armed descriptor, then appends the wakers of
    /// delivered registrations to `wakeups` in the order the kernel
    /// reports them.
    ///
    /// The caller runs the wakers once its borrow of the driver ends: a
    /// wake can release the last reference to a finished task, and the
    /// values that task abandoned may unregister descriptors on drop.
    ///
    /// A delivery clears the armed slot before its waker is handed out;
    /// if the descriptor's other direction remains armed, the kernel
    /// entry is re-armed with the remaining mask.
    ///
    /// # Panics
    ///
    /// This function panics if waiting on the `epoll(7)` instance fails
    /// for any reason other than signal delivery, which is retried.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>, wakeups: &mut Vec<Waker>) {
        if !self.has_registrations() {
            return;
        }

        let timeout_ms: i32 = match timeout {
            // Rounded up: waking a hair late is fine, but waking early
            // turns the caller's loop into a spin.
            Some(t) if t.is_zero() => 0,
            Some(t) => {
                let ms = i64::try_from(t.as_millis()).unwrap_or(i64::MAX);
                ms.saturating_add(1).min(i32::MAX as i64) as i32
            }
            None => -1,
        };

        let ready = loop {
            let rc = unsafe {
                libc::epoll_wait(
                    self.epoll.as_raw_fd(),
                    self.events.as_mut_ptr(),
                    Self::MAX_EVENTS as i32,
                    timeout_ms,
                )
            };

            if rc >= 0 {
                break rc as usize;
            }
            if io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            panic!("{}", errno!("failed to wait on epoll"));
        };

        // SAFETY: the kernel initialized the first `ready` events.
        unsafe { self.events.set_len(ready) };

        let events = std::mem::take(&mut self.events);
        for event in &events {
            self.dispatch(event.u64 as RawFd, event.events, wakeups);
        }
        self.events = events;
    }

    /// Collects the wakers of one delivered event and re-arms the
    /// direction that did not fire, if any.
    fn dispatch(&mut self, fd: RawFd, delivered: u32, wakeups: &mut Vec<Waker>) {
        let Some(entry) = self.registered.get_mut(&fd) else {
            return;
        };

        let read_mask = (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32;
        let write_mask = (libc::EPOLLOUT | libc::EPOLLHUP | libc::EPOLLERR) as u32;

        trace!(fd, delivered, "readiness delivered");

        if delivered & read_mask != 0 {
            if let Some(waker) = entry.read.take() {
                wakeups.push(waker);
            }
        }
        if delivered & write_mask != 0 {
            if let Some(waker) = entry.write.take() {
                wakeups.push(waker);
            }
        }

        // The one-shot delivery disabled the whole kernel entry, which
        // may still owe the other direction a notification.
        let remaining = entry.armed();
        if !remaining.is_empty() {
            if let Err(err) = arm(self.epoll.as_raw_fd(), fd, remaining, true) {
                panic!("failed to re-arm fd {fd} after one-shot delivery: {err}");
            }
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("epoll", &self.epoll)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

/// Installs `interest` for `fd` on the epoll instance.
///
/// `in_epoll` selects between `EPOLL_CTL_ADD` and `EPOLL_CTL_MOD`, but
/// either way the complementary op is retried on `EEXIST`/`ENOENT`: a
/// one-shot entry can survive in the kernel after this table forgot the
/// descriptor, and vice versa.
fn arm(epoll_fd: RawFd, fd: RawFd, interest: Interest, in_epoll: bool) -> Result<()> {
    let mut ev = libc::epoll_event {
        events: events_mask(interest),
        u64: fd as u64,
    };

    let op = if in_epoll { libc::EPOLL_CTL_MOD } else { libc::EPOLL_CTL_ADD };
    if unsafe { libc::epoll_ctl(epoll_fd, op, fd, &mut ev) } != -1 {
        return Ok(());
    }

    let retry_op = match io::Error::last_os_error().raw_os_error() {
        Some(libc::EEXIST) => libc::EPOLL_CTL_MOD,
        Some(libc::ENOENT) => libc::EPOLL_CTL_ADD,
        _ => return Err(Error::last_os_error()),
    };

    if unsafe { libc::epoll_ctl(epoll_fd, retry_op, fd, &mut ev) } == -1 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

fn events_mask(interest: Interest) -> u32 {
    let mut mask = libc::EPOLLET | libc::EPOLLONESHOT;
    if interest.contains(Interest::READABLE) {
        mask |= libc::EPOLLIN | libc::EPOLLRDHUP;
    }
    if interest.contains(Interest::WRITABLE) {
        mask |= libc::EPOLLOUT;
    }
    mask as u32
}
