//! Task handles and concurrent composition.
//!
//! A [`Task`] is the owning handle to one lazily-started coroutine:
//! nothing runs until the handle is awaited or submitted via
//! [`spawn`](crate::spawn). [`all`] and [`any`] compose handles into a
//! single task whose children run concurrently under the executor.

mod handle;
pub(crate) use handle::PanicPayload;
pub use handle::Task;

mod all;
pub use all::all;

mod any;
pub use any::any;

mod yield_now;
pub use yield_now::yield_now;
