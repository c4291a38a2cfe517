//! Traits, helpers, and type definitions for asynchronous I/O
//! functionality.

mod async_read;
pub use async_read::{AsyncRead, AsyncReadExt};

mod async_write;
pub use async_write::{AsyncWrite, AsyncWriteExt};

mod error;
pub use error::{Error, Result};

mod file;
pub use file::{AsyncFile, ReadFut, WriteFut};
