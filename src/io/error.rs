use std::io;

/// Specialized [`Result`](std::result::Result) for runtime I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure category of a runtime I/O operation.
///
/// Syscall failures surface as one of these categories rather than a
/// raw `errno`; the underlying OS error is preserved and can be
/// recovered through [`Error::os_code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A non-blocking operation made no progress, even after waiting
    /// for readiness once. Recovered internally everywhere except the
    /// single-shot [`AsyncFile`] operations, which hand the no-progress
    /// result to the caller.
    ///
    /// [`AsyncFile`]: crate::io::AsyncFile
    #[error("operation would block")]
    WouldBlock,

    /// A syscall was interrupted by a signal before it could complete.
    /// Always retried internally; user code does not observe this.
    #[error("operation interrupted")]
    Interrupted,

    /// The file descriptor is closed, or the peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// A connection attempt failed once the socket became ready; the
    /// payload is the `SO_ERROR` code reported by the kernel.
    #[error("connect failed (os error {0})")]
    Connect(i32),

    /// The file descriptor is already registered with the reactor for
    /// this interest by another task. Two tasks waiting on the same
    /// direction of one descriptor is a usage error.
    #[error("file descriptor already registered for this interest")]
    Busy,

    /// Any other terminal OS error.
    #[error(transparent)]
    Os(io::Error),
}

impl Error {
    /// Categorizes an OS error.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::Interrupted => Error::Interrupted,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Error::Closed,
            _ => Error::Os(err),
        }
    }

    /// Categorizes the calling thread's most recent OS error.
    pub(crate) fn last_os_error() -> Self {
        Error::from_io(io::Error::last_os_error())
    }

    /// The underlying OS error code, when one exists.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Error::WouldBlock => Some(libc::EAGAIN),
            Error::Interrupted => Some(libc::EINTR),
            Error::Connect(code) => Some(*code),
            Error::Os(err) => err.raw_os_error(),
            Error::Closed | Error::Busy => None,
        }
    }
}
