use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

thread_local! {
    /// Guarantees that each task on this thread is assigned a unique ID.
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Shared handle to a [`RawTask`] for single-threaded contexts.
pub(crate) type TaskRef = Rc<RawTask>;

/// Unique identifier for a task within one executor thread.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub(crate) struct TaskId(u64);

impl TaskId {
    #[inline]
    fn next() -> Self {
        TaskId(NEXT_ID.with(|c| {
            let id = c.get();
            c.set(id + 1);
            id
        }))
    }
}

/// Type-erased unit of execution owned by the scheduler.
///
/// The coroutine itself sits behind a `RefCell` so that the task's ID
/// and scheduled flag stay reachable while it is being polled; a waker
/// fired from inside the poll (a task rescheduling itself) must not
/// touch the coroutine storage.
pub(crate) struct RawTask {
    /// Used to uniquely identify the task.
    pub(crate) id: TaskId,
    /// Set while the task sits in the ready queue, so duplicate wakes
    /// are not enqueued twice.
    pub(crate) scheduled: Cell<bool>,
    /// Pinned, heap-allocated, type-erased [`Future`].
    future: RefCell<Pin<Box<dyn Future<Output = ()>>>>,
}

impl RawTask {
    /// Creates a new `RawTask` from the provided future.
    #[inline]
    pub(crate) fn new<F: Future<Output = ()> + 'static>(future: F) -> Self {
        RawTask {
            id: TaskId::next(),
            scheduled: Cell::new(false),
            future: RefCell::new(Box::pin(future)),
        }
    }

    /// Polls the inner future, returning the [`Poll`] result.
    #[inline]
    pub(crate) fn poll(&self, ctx: &mut Context<'_>) -> Poll<()> {
        self.future.borrow_mut().as_mut().poll(ctx)
    }
}

impl fmt::Debug for RawTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTask")
            .field("id", &self.id)
            .field("scheduled", &self.scheduled)
            .finish()
    }
}
