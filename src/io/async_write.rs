use std::future::{self, Future};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::io::{Error, Result};

/// Writes bytes asynchronously.
///
/// This trait is analogous to the [`std::io::Write`] trait, but
/// integrates with the asynchronous task system and assumes the
/// underlying object is non-blocking.
pub trait AsyncWrite {
    /// Attempts to write bytes from `buf`, returning the number of
    /// bytes written.
    ///
    /// Returns [`Poll::Pending`] if the write operation would block.
    fn poll_write(
        self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>>;

    /// Flushes any buffered data.
    fn poll_flush(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Result<()>>;

    /// Shuts down the write half of this object.
    fn poll_shutdown(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Result<()>>;
}

/// Implemented as an extension trait, adding utility methods to
/// `AsyncWrite` types.
pub trait AsyncWriteExt: AsyncWrite {
    /// Writes bytes from `buf`, completing with the number of bytes
    /// written. The write may be short; use
    /// [`write_all`](AsyncWriteExt::write_all) to drain a full buffer.
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> impl Future<Output = Result<usize>> + 'a
    where
        Self: Unpin,
    {
        future::poll_fn(move |ctx| Pin::new(&mut *self).poll_write(ctx, buf))
    }

    /// Writes an entire buffer into this writer.
    fn write_all<'a>(&'a mut self, mut buf: &'a [u8]) -> impl Future<Output = Result<()>> + 'a
    where
        Self: Unpin,
    {
        async move {
            while !buf.is_empty() {
                let n = self.write(buf).await?;

                if n == 0 {
                    return Err(Error::Closed);
                }

                buf = &buf[n..];
            }

            Ok(())
        }
    }

    /// Flushes any buffered data.
    fn flush<'a>(&'a mut self) -> impl Future<Output = Result<()>> + 'a
    where
        Self: Unpin,
    {
        future::poll_fn(move |ctx| Pin::new(&mut *self).poll_flush(ctx))
    }

    /// Shuts down the write half of this object.
    fn shutdown<'a>(&'a mut self) -> impl Future<Output = Result<()>> + 'a
    where
        Self: Unpin,
    {
        future::poll_fn(move |ctx| Pin::new(&mut *self).poll_shutdown(ctx))
    }
}

impl<T: AsyncWrite + ?Sized> AsyncWriteExt for T {}
