use std::future::Future;
use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::ptr;
use std::task::{Context, Poll};

use crate::io::{AsyncFile, Error, Result};
use crate::net::tcp::TcpStream;
use crate::rt::io::{errno, Interest};
use crate::rt::scheduler::Scheduler;

/// Raw, non-blocking socket used for initiating outbound TCP
/// connections.
pub(crate) struct TcpSocket {
    fd: OwnedFd,
    addr: libc::sockaddr_storage,
    addr_len: libc::socklen_t,
}

impl TcpSocket {
    /// Creates a new non-blocking `TcpSocket` aimed at the given remote
    /// address.
    pub(crate) fn new(addr: SocketAddr) -> Result<Self> {
        let (storage, addr_len) = to_sockaddr(addr);

        let fd = unsafe {
            libc::socket(
                storage.ss_family as libc::c_int,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd == -1 {
            return Err(Error::from_io(errno!("failed to create non-blocking socket")));
        }

        Ok(TcpSocket {
            // SAFETY: `fd` was just returned by `socket(2)` and is owned
            // by nothing else.
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            addr: storage,
            addr_len,
        })
    }

    /// Returns a future that resolves to a [`TcpStream`] once the
    /// connection is established.
    pub(crate) fn connect(self) -> ConnectFut {
        ConnectFut {
            socket: Some(self),
            in_progress: false,
        }
    }

    fn into_stream(self) -> Result<TcpStream> {
        Ok(TcpStream::from_file(AsyncFile::new(self.fd)?))
    }
}

/// A future that resolves to a TCP connection with a remote host.
///
/// The connect is issued non-blocking; once the socket reports
/// writability, the outcome is read back from `SO_ERROR` exactly once.
/// The `connect(2)` call itself is never re-issued.
pub(crate) struct ConnectFut {
    socket: Option<TcpSocket>,
    in_progress: bool,
}

impl Future for ConnectFut {
    type Output = Result<TcpStream>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let socket = this.socket.as_ref().expect("polled after completion");
        let fd = socket.fd.as_raw_fd();

        if !this.in_progress {
            let rc = unsafe {
                libc::connect(
                    fd,
                    (&socket.addr as *const libc::sockaddr_storage).cast(),
                    socket.addr_len,
                )
            };

            if rc == -1 {
                match io::Error::last_os_error().raw_os_error() {
                    Some(libc::EINPROGRESS) | Some(libc::EAGAIN) => {
                        // The socket becomes writable once the
                        // connection resolves, either way.
                        this.in_progress = true;
                        return match Scheduler::current().register_fd(
                            fd,
                            Interest::WRITABLE,
                            ctx.waker().clone(),
                        ) {
                            Ok(()) => Poll::Pending,
                            Err(err) => Poll::Ready(Err(err)),
                        };
                    }
                    _ => {
                        return Poll::Ready(Err(Error::from_io(errno!(
                            "failed to connect to remote host"
                        ))))
                    }
                }
            }

            // Connected on the first try; loopback commonly does.
            return Poll::Ready(this.socket.take().expect("socket present").into_stream());
        }

        // Writability after `EINPROGRESS`: the true result lives in
        // `SO_ERROR`, queried once.
        let mut code: libc::c_int = 0;
        let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                (&mut code as *mut libc::c_int).cast(),
                &mut len,
            )
        };
        if rc == -1 {
            return Poll::Ready(Err(Error::from_io(errno!("failed to query SO_ERROR"))));
        }

        if code != 0 {
            return Poll::Ready(Err(Error::Connect(code)));
        }

        Poll::Ready(this.socket.take().expect("socket present").into_stream())
    }
}

/// Encodes `addr` as a `sockaddr_storage` suitable for `connect(2)`.
pub(crate) fn to_sockaddr(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };

    let len = match addr {
        SocketAddr::V4(v4) => {
            let ipv4 = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(), // network-byte order
                sin_addr: libc::in_addr {
                    // Already in network-byte order.
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };

            unsafe {
                ptr::write((&mut storage as *mut libc::sockaddr_storage).cast(), ipv4);
            }

            mem::size_of_val(&ipv4)
        }
        SocketAddr::V6(v6) => {
            let ipv6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(), // network-byte order
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };

            unsafe {
                ptr::write((&mut storage as *mut libc::sockaddr_storage).cast(), ipv6);
            }

            mem::size_of_val(&ipv6)
        }
    };

    (storage, len as libc::socklen_t)
}

/// Decodes a `sockaddr_storage` produced by the kernel.
pub(crate) fn from_sockaddr(storage: &libc::sockaddr_storage) -> Result<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            // SAFETY: the kernel wrote a `sockaddr_in` for `AF_INET`.
            let ipv4: libc::sockaddr_in =
                unsafe { ptr::read((storage as *const libc::sockaddr_storage).cast()) };

            Ok(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(ipv4.sin_addr.s_addr.to_ne_bytes()),
                u16::from_be(ipv4.sin_port),
            )))
        }
        libc::AF_INET6 => {
            // SAFETY: the kernel wrote a `sockaddr_in6` for `AF_INET6`.
            let ipv6: libc::sockaddr_in6 =
                unsafe { ptr::read((storage as *const libc::sockaddr_storage).cast()) };

            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(ipv6.sin6_addr.s6_addr),
                u16::from_be(ipv6.sin6_port),
                ipv6.sin6_flowinfo,
                ipv6.sin6_scope_id,
            )))
        }
        family => Err(Error::Os(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected address family {family}"),
        ))),
    }
}

/// Queries one of the socket-name syscalls (`getsockname(2)` or
/// `getpeername(2)`) and decodes the result.
pub(crate) fn socket_addr(
    fd: RawFd,
    query: unsafe extern "C" fn(
        libc::c_int,
        *mut libc::sockaddr,
        *mut libc::socklen_t,
    ) -> libc::c_int,
) -> Result<SocketAddr> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

    let rc = unsafe { query(fd, (&mut storage as *mut libc::sockaddr_storage).cast(), &mut len) };
    if rc == -1 {
        return Err(Error::from_io(errno!("failed to query socket address")));
    }

    from_sockaddr(&storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockaddr_round_trips_v4() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let (storage, _) = to_sockaddr(addr);
        assert_eq!(from_sockaddr(&storage).unwrap(), addr);
    }

    #[test]
    fn sockaddr_round_trips_v6() {
        let addr: SocketAddr = "[::1]:443".parse().unwrap();
        let (storage, _) = to_sockaddr(addr);
        assert_eq!(from_sockaddr(&storage).unwrap(), addr);
    }
}
