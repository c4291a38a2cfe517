use std::net::{SocketAddr, ToSocketAddrs};
use std::os::fd::OwnedFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::io::{AsyncFile, AsyncRead, AsyncWrite, Error, Result};
use crate::net::socket::{self, TcpSocket};

/// A TCP stream between a local and a remote socket.
///
/// Reading and writing a `TcpStream` is usually done through the
/// methods found on the [`AsyncReadExt`] and [`AsyncWriteExt`] traits.
///
/// [`AsyncReadExt`]: crate::io::AsyncReadExt
/// [`AsyncWriteExt`]: crate::io::AsyncWriteExt
#[derive(Debug)]
pub struct TcpStream {
    file: AsyncFile,
}

impl TcpStream {
    /// Opens a TCP connection to a remote host.
    ///
    /// `addr` is an address of the remote host. Anything which
    /// implements the [`ToSocketAddrs`] trait can be supplied as the
    /// address. If `addr` yields multiple addresses, connect will be
    /// attempted with each of the addresses until a connection is
    /// successful. If none of the addresses result in a successful
    /// connection, the error returned from the last connection attempt
    /// (the last address) is returned.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let addrs = addr.to_socket_addrs().map_err(Error::from_io)?;

        let mut last_err = None;

        for addr in addrs {
            match TcpStream::connect_addr(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Os(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "could not resolve any provided address",
            ))
        }))
    }

    /// Returns the socket address of the local half of this TCP
    /// connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        socket::socket_addr(self.file.as_raw_fd(), libc::getsockname)
    }

    /// Returns the socket address of the remote peer of this TCP
    /// connection.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        socket::socket_addr(self.file.as_raw_fd(), libc::getpeername)
    }

    /// Wraps a connected, non-blocking file.
    pub(crate) fn from_file(file: AsyncFile) -> Self {
        TcpStream { file }
    }

    /// Establishes a connection to the specified `addr`.
    async fn connect_addr(addr: SocketAddr) -> Result<TcpStream> {
        TcpSocket::new(addr)?.connect().await
    }
}

impl TryFrom<std::net::TcpStream> for TcpStream {
    type Error = Error;

    fn try_from(stream: std::net::TcpStream) -> Result<Self> {
        // `AsyncFile::new` switches the descriptor to non-blocking, so
        // the stream can be polled without ever blocking the executor.
        Ok(TcpStream::from_file(AsyncFile::new(OwnedFd::from(stream))?))
    }
}

impl AsRawFd for TcpStream {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsyncRead for TcpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        Pin::new(&mut self.file).poll_read(ctx, buf)
    }
}

impl AsyncWrite for TcpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>> {
        Pin::new(&mut self.file).poll_write(ctx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.file).poll_flush(ctx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<()>> {
        let rc = unsafe { libc::shutdown(self.file.as_raw_fd(), libc::SHUT_WR) };
        if rc == -1 {
            return Poll::Ready(Err(Error::last_os_error()));
        }

        Poll::Ready(Ok(()))
    }
}
