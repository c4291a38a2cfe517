use std::fmt;
use std::future::Future;
use std::panic;
use std::rc::Rc;

use crate::rt::scheduler::Scheduler;
use crate::task::Task;

/// The `corio` runtime.
///
/// A single-threaded cooperative executor. [`block_on`] is the entry
/// point for all asynchronous execution: it drives the given root task,
/// and every task spawned beneath it, on the calling thread.
///
/// [`block_on`]: Runtime::block_on
pub struct Runtime {
    scheduler: Rc<Scheduler>,
}

impl Runtime {
    /// Creates a new `Runtime` instance.
    ///
    /// # Panics
    ///
    /// Panics if the I/O driver's `epoll(7)` instance cannot be
    /// created.
    pub fn new() -> Self {
        Runtime {
            scheduler: Rc::new(Scheduler::new()),
        }
    }

    /// Runs a future to completion, serving as the runtime's entry
    /// point.
    ///
    /// The future runs as the root task on the current thread, blocking
    /// until it completes and yielding its output. Tasks spawned under
    /// the root run concurrently with it; any still unfinished when the
    /// root completes (for example, the losers of a
    /// [`task::any`](crate::task::any) race) are dropped with the
    /// runtime.
    ///
    /// If the root task panics, the panic is resumed on the caller with
    /// its original payload.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a runtime context (the executor
    /// does not nest), or if the executor stalls: the root task is
    /// incomplete but no task is ready, no timer is pending, and no I/O
    /// is registered.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let _guard = Scheduler::enter(Rc::clone(&self.scheduler));

        let mut root = Task::new(future);
        root.start();

        loop {
            self.scheduler.tick();

            match root.try_finish() {
                Some(Ok(output)) => return output,
                Some(Err(payload)) => panic::resume_unwind(payload),
                None => {}
            }

            assert!(
                !self.scheduler.is_stalled(),
                "executor stalled: the root task is incomplete, but no task is \
                 ready, no timer is pending, and no I/O is registered"
            );

            self.scheduler.park();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}
