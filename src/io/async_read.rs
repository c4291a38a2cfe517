use std::future::{self, Future};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::io::Result;

/// Reads bytes from a source.
///
/// This trait is analogous to the [`std::io::Read`] trait, but
/// integrates with the asynchronous task system: `poll_read` arms
/// readiness interest and returns [`Poll::Pending`] instead of
/// blocking.
pub trait AsyncRead {
    /// Attempts to read bytes into `buf`, returning the number of bytes
    /// read.
    ///
    /// Returns [`Poll::Pending`] if the read operation would block.
    fn poll_read(
        self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>>;
}

/// Implemented as an extension trait, adding utility methods to
/// `AsyncRead` types.
pub trait AsyncReadExt: AsyncRead {
    /// Reads bytes into `buf`, completing with the number of bytes
    /// read. A return of `0` signals end of stream.
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> impl Future<Output = Result<usize>> + 'a
    where
        Self: Unpin,
    {
        future::poll_fn(move |ctx| Pin::new(&mut *self).poll_read(ctx, buf))
    }
}

impl<T: AsyncRead + ?Sized> AsyncReadExt for T {}
