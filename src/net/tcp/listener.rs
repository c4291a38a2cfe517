use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::io::{Error, Result};
use crate::net::tcp::TcpStream;
use crate::rt::io::Interest;
use crate::rt::scheduler::Scheduler;

/// A TCP socket server, listening for connections.
///
/// The Transmission Control Protocol is specified in [IETF RFC 793].
///
/// [IETF RFC 793]: https://tools.ietf.org/html/rfc793
#[derive(Debug)]
pub struct TcpListener {
    ln: std::net::TcpListener,
    /// Readiness is edge-triggered, so each wakeup must drain the
    /// listener: several connections may be ready before `accept()`
    /// would block again. Connections beyond the first are queued.
    queue: RefCell<VecDeque<(TcpStream, SocketAddr)>>,
}

impl TcpListener {
    /// Creates a new `TcpListener`, which will be bound to the
    /// specified address.
    ///
    /// The returned listener is ready for accepting connections.
    ///
    /// Binding with a port number of 0 will request that the OS assigns
    /// a port to this listener.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let ln = std::net::TcpListener::bind(addr).map_err(Error::from_io)?;

        // Required so `accept` can be polled without blocking.
        ln.set_nonblocking(true).map_err(Error::from_io)?;

        Ok(TcpListener {
            ln,
            queue: RefCell::new(Default::default()),
        })
    }

    /// Accepts a new incoming connection from this listener.
    ///
    /// This function will yield once a new TCP connection is
    /// established. When established, the corresponding [`TcpStream`]
    /// and the remote peer's address will be returned.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        AcceptFut(self).await
    }

    /// Returns the local address that this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.ln.local_addr().map_err(Error::from_io)
    }

    /// Queues a connection accepted while draining.
    fn enqueue_connection(&self, stream: TcpStream, addr: SocketAddr) {
        self.queue.borrow_mut().push_back((stream, addr));
    }

    /// Returns a queued accepted connection, or [`None`] if the queue
    /// is empty.
    fn dequeue_connection(&self) -> Option<(TcpStream, SocketAddr)> {
        self.queue.borrow_mut().pop_front()
    }
}

impl AsRawFd for TcpListener {
    fn as_raw_fd(&self) -> RawFd {
        self.ln.as_raw_fd()
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        // Outside a runtime context no interest can be armed for this
        // descriptor, so there is nothing to withdraw.
        if let Some(scheduler) = Scheduler::try_current() {
            scheduler.unregister_fd(self.ln.as_raw_fd());
        }

        // Inner `std::net::TcpListener` and queued connections drop...
    }
}

/// A future that resolves to the next incoming connection on a TCP
/// listener.
struct AcceptFut<'a>(&'a TcpListener);

impl Future for AcceptFut<'_> {
    type Output = Result<(TcpStream, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(conn) = self.0.dequeue_connection() {
            return Poll::Ready(Ok(conn));
        }

        loop {
            match self.0.ln.accept() {
                Ok((stream, addr)) => match TcpStream::try_from(stream) {
                    Ok(stream) => {
                        // Keep draining; the edge that woke this task
                        // may cover several pending connections.
                        self.0.enqueue_connection(stream, addr);
                        continue;
                    }
                    Err(e) => return Poll::Ready(Err(e)),
                },
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let register = Scheduler::current().register_fd(
                        self.0.ln.as_raw_fd(),
                        Interest::READABLE,
                        ctx.waker().clone(),
                    );
                    if let Err(err) = register {
                        return Poll::Ready(Err(err));
                    }

                    // A connection may have been queued while draining.
                    return match self.0.dequeue_connection() {
                        Some(conn) => Poll::Ready(Ok(conn)),
                        None => Poll::Pending,
                    };
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Poll::Ready(Err(Error::from_io(e))),
            }
        }
    }
}
