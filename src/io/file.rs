use std::fmt;
use std::future::Future;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::io::{AsyncRead, AsyncWrite, Error, Result};
use crate::rt::io::Interest;
use crate::rt::scheduler::Scheduler;

/// Non-blocking wrapper around an owned file descriptor.
///
/// The descriptor is switched to non-blocking mode at construction and
/// stays that way for the wrapper's lifetime. On drop, any reactor
/// interest is withdrawn before the descriptor closes; the close itself
/// happens exactly once, through the inner [`OwnedFd`].
///
/// [`read`] and [`write`] are single-shot operations: each suspends at
/// most once for readiness and hands a persistent no-progress condition
/// back to the caller as [`Error::WouldBlock`]. The [`AsyncRead`] and
/// [`AsyncWrite`] implementations layer the outer retry loop on top,
/// re-arming readiness for as long as the descriptor would block.
///
/// [`read`]: AsyncFile::read
/// [`write`]: AsyncFile::write
pub struct AsyncFile {
    fd: OwnedFd,
}

impl AsyncFile {
    /// Wraps `fd`, switching it to non-blocking mode.
    pub fn new(fd: OwnedFd) -> Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        Ok(AsyncFile { fd })
    }

    /// Wraps a raw descriptor, taking ownership of it.
    ///
    /// # Safety
    ///
    /// `fd` must be open and owned by nothing else; the returned file
    /// closes it on drop.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Result<Self> {
        // SAFETY: ownership of `fd` is transferred by the caller's
        // contract.
        AsyncFile::new(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Reads bytes into `buf`, suspending until the descriptor is
    /// readable.
    ///
    /// Completes with the number of bytes read; `0` signals end of
    /// file. If the descriptor would still block after one
    /// readiness-armed retry, completes with [`Error::WouldBlock`],
    /// leaving the outer retry to the caller.
    pub fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadFut<'a> {
        ReadFut {
            file: self,
            buf,
            armed: false,
        }
    }

    /// Writes bytes from `buf`, suspending until the descriptor is
    /// writable.
    ///
    /// Completes with the number of bytes accepted, which may be fewer
    /// than `buf.len()`; composing full writes is the caller's job.
    /// [`Error::WouldBlock`] after one armed retry, as for
    /// [`read`](AsyncFile::read).
    pub fn write<'a>(&'a mut self, buf: &'a [u8]) -> WriteFut<'a> {
        WriteFut {
            file: self,
            buf,
            armed: false,
        }
    }
}

impl AsRawFd for AsyncFile {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for AsyncFile {
    fn drop(&mut self) {
        // Outside a runtime context no interest can be armed for this
        // descriptor, so there is nothing to withdraw.
        if let Some(scheduler) = Scheduler::try_current() {
            scheduler.unregister_fd(self.fd.as_raw_fd());
        }

        // The inner `OwnedFd` closes the descriptor...
    }
}

impl fmt::Debug for AsyncFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFile").field("fd", &self.fd).finish()
    }
}

impl AsyncRead for AsyncFile {
    fn poll_read(
        self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        let fd = self.fd.as_raw_fd();

        loop {
            match try_read(fd, buf) {
                Err(Error::Interrupted) => continue,
                Err(Error::WouldBlock) => {
                    return match arm(fd, Interest::READABLE, ctx) {
                        Ok(()) => Poll::Pending,
                        Err(err) => Poll::Ready(Err(err)),
                    };
                }
                result => return Poll::Ready(result),
            }
        }
    }
}

impl AsyncWrite for AsyncFile {
    fn poll_write(
        self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>> {
        let fd = self.fd.as_raw_fd();

        loop {
            match try_write(fd, buf) {
                Err(Error::Interrupted) => continue,
                Err(Error::WouldBlock) => {
                    return match arm(fd, Interest::WRITABLE, ctx) {
                        Ok(()) => Poll::Pending,
                        Err(err) => Poll::Ready(Err(err)),
                    };
                }
                result => return Poll::Ready(result),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<()>> {
        // Writes go straight to the descriptor; there is no buffer.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<()>> {
        // A plain descriptor has no write half to shut down; sockets
        // override this at the stream layer.
        Poll::Ready(Ok(()))
    }
}

/// Future returned by [`AsyncFile::read`].
#[must_use = "futures do nothing unless awaited"]
pub struct ReadFut<'a> {
    file: &'a mut AsyncFile,
    buf: &'a mut [u8],
    /// Set once readiness interest is armed; the attempt after the
    /// wakeup is final.
    armed: bool,
}

impl Future for ReadFut<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Result<usize>> {
        let this = self.get_mut();
        let fd = this.file.fd.as_raw_fd();

        loop {
            match try_read(fd, this.buf) {
                Err(Error::Interrupted) => continue,
                Err(Error::WouldBlock) => {
                    if this.armed {
                        // Readiness fired but the data was gone again;
                        // hand the no-progress result to the caller.
                        return Poll::Ready(Err(Error::WouldBlock));
                    }

                    this.armed = true;
                    return match arm(fd, Interest::READABLE, ctx) {
                        Ok(()) => Poll::Pending,
                        Err(err) => Poll::Ready(Err(err)),
                    };
                }
                result => return Poll::Ready(result),
            }
        }
    }
}

impl fmt::Debug for ReadFut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadFut")
            .field("fd", &self.file.as_raw_fd())
            .field("armed", &self.armed)
            .finish()
    }
}

/// Future returned by [`AsyncFile::write`].
#[must_use = "futures do nothing unless awaited"]
pub struct WriteFut<'a> {
    file: &'a mut AsyncFile,
    buf: &'a [u8],
    /// Set once readiness interest is armed; the attempt after the
    /// wakeup is final.
    armed: bool,
}

impl Future for WriteFut<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Result<usize>> {
        let this = self.get_mut();
        let fd = this.file.fd.as_raw_fd();

        loop {
            match try_write(fd, this.buf) {
                Err(Error::Interrupted) => continue,
                Err(Error::WouldBlock) => {
                    if this.armed {
                        return Poll::Ready(Err(Error::WouldBlock));
                    }

                    this.armed = true;
                    return match arm(fd, Interest::WRITABLE, ctx) {
                        Ok(()) => Poll::Pending,
                        Err(err) => Poll::Ready(Err(err)),
                    };
                }
                result => return Poll::Ready(result),
            }
        }
    }
}

impl fmt::Debug for WriteFut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteFut")
            .field("fd", &self.file.as_raw_fd())
            .field("armed", &self.armed)
            .finish()
    }
}

/// Switches `fd` to non-blocking mode, if it is not already.
fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(Error::last_os_error());
    }

    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

fn try_read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if n == -1 {
        return Err(Error::from_io(io::Error::last_os_error()));
    }
    Ok(n as usize)
}

fn try_write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    if n == -1 {
        return Err(Error::from_io(io::Error::last_os_error()));
    }
    Ok(n as usize)
}

/// Arms one-shot readiness interest for the current task.
fn arm(fd: RawFd, interest: Interest, ctx: &mut Context<'_>) -> Result<()> {
    Scheduler::current().register_fd(fd, interest, ctx.waker().clone())
}
