//! Non-blocking I/O: sockets, readiness suspension, and error mapping.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::thread;
use std::time::{Duration, Instant};

use corio::io::{AsyncFile, AsyncReadExt, AsyncWriteExt, Error};
use corio::net::{TcpListener, TcpStream};
use corio::rt::Runtime;
use corio::time::sleep;

/// Binds a throwaway server on loopback, runs `serve` on an accepted
/// connection in a background thread, and returns the address to dial.
fn spawn_server(serve: impl FnOnce(std::net::TcpStream) + Send + 'static) -> SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        serve(stream);
    });

    addr
}

#[test]
fn delayed_server_write_suspends_the_reader() {
    let addr = spawn_server(|mut stream| {
        thread::sleep(Duration::from_millis(50));
        stream.write_all(b"PONG\n").expect("server write");
    });

    let rt = Runtime::new();
    let start = Instant::now();

    let (n, buf) = rt.block_on(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");

        let mut buf = [0u8; 8];
        let n = stream.read(&mut buf).await.expect("read");
        (n, buf)
    });

    assert_eq!(n, 5);
    assert_eq!(&buf[..n], b"PONG\n");
    // The read can only have completed by suspending on readiness
    // until the delayed write arrived.
    assert!(start.elapsed() >= Duration::from_millis(45));
}

#[test]
fn echoed_bytes_round_trip_to_eof() {
    const PAYLOAD_LEN: usize = 64 * 1024;

    let addr = spawn_server(|mut stream| {
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).expect("server read");
            if n == 0 {
                break;
            }
            stream.write_all(&buf[..n]).expect("server write");
        }
        // Dropping the stream closes it, signalling EOF to the client.
    });

    let payload: Vec<u8> = (0..PAYLOAD_LEN).map(|i| (i % 251) as u8).collect();

    let rt = Runtime::new();
    let echoed = rt.block_on(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");

        stream.write_all(&payload).await.expect("write");
        stream.shutdown().await.expect("shutdown");

        let mut echoed = Vec::with_capacity(PAYLOAD_LEN);
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            echoed.extend_from_slice(&buf[..n]);
        }
        echoed
    });

    assert_eq!(echoed.len(), PAYLOAD_LEN);
    let expected: Vec<u8> = (0..PAYLOAD_LEN).map(|i| (i % 251) as u8).collect();
    assert_eq!(echoed, expected);
}

#[test]
fn refused_connections_surface_their_os_code() {
    // Bind to grab a free port, then close it so the dial is refused.
    let addr = StdTcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("local addr");

    let rt = Runtime::new();
    let err = rt
        .block_on(async move { TcpStream::connect(addr).await })
        .expect_err("connect must fail");

    assert_eq!(err.os_code(), Some(libc::ECONNREFUSED), "got {err:?}");
}

#[test]
fn listener_and_client_share_one_executor() {
    let rt = Runtime::new();

    let echoed = rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let server = corio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 64];
            loop {
                let n = stream.read(&mut buf).await.expect("server read");
                if n == 0 {
                    break;
                }
                stream.write_all(&buf[..n]).await.expect("server write");
            }
        });

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        assert_eq!(stream.peer_addr().expect("peer addr"), addr);

        stream.write_all(b"hello, corio").await.expect("write");
        stream.shutdown().await.expect("shutdown");

        let mut echoed = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = stream.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            echoed.extend_from_slice(&buf[..n]);
        }

        drop(stream);
        server.await;
        echoed
    });

    assert_eq!(echoed, b"hello, corio");
}

#[test]
fn async_file_reads_arrive_on_readiness() {
    let mut fds = [0 as libc::c_int; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    assert_ne!(rc, -1, "pipe2 failed");
    let [rx, tx] = fds;

    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        let n = unsafe { libc::write(tx, b"ready".as_ptr().cast(), 5) };
        assert_eq!(n, 5);
        unsafe { libc::close(tx) };
    });

    let rt = Runtime::new();
    let start = Instant::now();

    let (n, buf) = rt.block_on(async move {
        // SAFETY: the read end of the pipe is owned by nothing else.
        let mut file = unsafe { AsyncFile::from_raw_fd(rx) }.expect("wrap fd");

        let mut buf = [0u8; 8];
        let n = file.read(&mut buf).await.expect("read");
        (n, buf)
    });

    assert_eq!(n, 5);
    assert_eq!(&buf[..n], b"ready");
    assert!(start.elapsed() >= Duration::from_millis(25), "read must have suspended");

    writer.join().expect("writer thread");
}

#[test]
fn async_file_sees_eof_after_the_writer_closes() {
    let mut fds = [0 as libc::c_int; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    assert_ne!(rc, -1, "pipe2 failed");
    let [rx, tx] = fds;

    unsafe { libc::close(tx) };

    let rt = Runtime::new();
    let n = rt.block_on(async move {
        // SAFETY: the read end of the pipe is owned by nothing else.
        let mut file = unsafe { AsyncFile::from_raw_fd(rx) }.expect("wrap fd");
        let mut buf = [0u8; 8];
        file.read(&mut buf).await.expect("read")
    });

    assert_eq!(n, 0, "closed writer means EOF");
}

#[test]
fn write_all_reports_a_closed_peer() {
    let addr = spawn_server(|stream| {
        // Close immediately; sustained writes must eventually fail.
        drop(stream);
    });

    let rt = Runtime::new();
    let err = rt.block_on(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");

        // Give the peer time to close before flooding it.
        sleep(Duration::from_millis(20)).await;

        let chunk = [0u8; 64 * 1024];
        loop {
            if let Err(err) = stream.write_all(&chunk).await {
                return err;
            }
        }
    });

    assert!(
        matches!(err, Error::Closed | Error::Os(_)),
        "expected a terminal write error, got {err:?}"
    );
}
