//! Type-erased task machinery for the scheduler.
//!
//! The typed half of a task (its result cell and owning handle) lives
//! in [`crate::task`]; by the time a coroutine reaches the scheduler it
//! has been erased into a [`RawTask`] whose only job is to be polled.

mod core;
pub(crate) use self::core::{RawTask, TaskId, TaskRef};

mod waker;
pub(crate) use waker::TaskWaker;
