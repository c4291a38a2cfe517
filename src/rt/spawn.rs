use std::future::Future;

use crate::task::Task;

/// Spawns a new asynchronous task, returning a [`Task`] handle that can
/// be awaited for its output.
///
/// The task starts immediately: it is queued for its first poll within
/// the current executor tick and makes progress whether or not the
/// handle is ever awaited. Dropping the handle detaches the task, which
/// keeps running with its output discarded.
///
/// # Panics
///
/// Panics when called outside of a runtime context.
pub fn spawn<F>(future: F) -> Task<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let mut task = Task::new(future);
    task.start();
    task
}
