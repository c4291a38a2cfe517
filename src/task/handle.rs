use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::rt::scheduler::Scheduler;
use crate::rt::task::RawTask;

/// Payload of a task that ended by panicking.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Owning handle to a lazily-started coroutine producing a `T`.
///
/// Constructing a task runs none of its body: the coroutine starts when
/// the handle is first awaited, or when it is submitted to the executor
/// through [`spawn`]. Once started, the coroutine frame is owned by the
/// executor, and dropping the handle merely abandons the task — it
/// keeps running, and its output is discarded on completion. Dropping a
/// handle that never started drops the coroutine without running it.
///
/// Awaiting a `Task` yields its output; once the coroutine finishes,
/// the awaiter resumes within the same executor tick. If the task
/// panicked, awaiting it (or calling [`Task::result`]) resumes the
/// panic with the original payload.
///
/// [`spawn`]: crate::spawn
#[must_use = "tasks run nothing until awaited or spawned"]
pub struct Task<T> {
    state: State<T>,
}

enum State<T> {
    /// Not yet started; the handle still owns the coroutine.
    Idle(Pin<Box<dyn Future<Output = T>>>),
    /// Started; the executor owns the coroutine and fills the cell.
    Running(Rc<ResultCell<T>>),
    /// The output has been taken.
    Consumed,
}

impl<T: 'static> Task<T> {
    /// Wraps `future` in a task handle without starting it.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        Task {
            state: State::Idle(Box::pin(future)),
        }
    }

    /// Submits the coroutine to the current runtime's scheduler. A
    /// no-op if the task already started.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a runtime context.
    pub(crate) fn start(&mut self) {
        if !matches!(self.state, State::Idle(_)) {
            return;
        }

        let State::Idle(future) = mem::replace(&mut self.state, State::Consumed) else {
            unreachable!();
        };

        let cell = Rc::new(ResultCell::new());
        Scheduler::current().submit(RawTask::new(Drive {
            future,
            cell: Rc::clone(&cell),
        }));

        self.state = State::Running(cell);
    }

    /// Polls for the task's outcome without unwinding on failure,
    /// starting the task if necessary. The stored continuation waker is
    /// replaced on every poll, so a single awaiter may move between
    /// wakers freely.
    pub(crate) fn poll_outcome(
        &mut self,
        ctx: &mut Context<'_>,
    ) -> Poll<Result<T, PanicPayload>> {
        self.start();

        let State::Running(cell) = &self.state else {
            panic!("task polled after its output was taken");
        };

        if let Some(outcome) = cell.try_take() {
            self.state = State::Consumed;
            return Poll::Ready(outcome);
        }

        cell.set_continuation(ctx.waker());
        Poll::Pending
    }

    /// Takes the outcome of a finished task, or [`None`] if it is still
    /// running or never started.
    pub(crate) fn try_finish(&mut self) -> Option<Result<T, PanicPayload>> {
        match &self.state {
            State::Idle(_) => None,
            State::Running(cell) => {
                let outcome = cell.try_take();
                if outcome.is_some() {
                    self.state = State::Consumed;
                }
                outcome
            }
            State::Consumed => panic!("task output already taken"),
        }
    }

    /// Returns `true` once the task has run to completion.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Idle(_) => false,
            State::Running(cell) => cell.is_complete(),
            State::Consumed => true,
        }
    }

    /// Output of a completed task.
    ///
    /// Intended for reading a result out of a handle after the fact;
    /// awaiting the task is the usual way to consume it.
    ///
    /// # Panics
    ///
    /// Panics if the task has not completed. If the task panicked, the
    /// panic is resumed with its original payload.
    pub fn result(mut self) -> T {
        match self.try_finish() {
            Some(Ok(output)) => output,
            Some(Err(payload)) => panic::resume_unwind(payload),
            None => panic!("`Task::result` called before the task completed"),
        }
    }
}

impl<T: 'static> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<T> {
        match self.get_mut().poll_outcome(ctx) {
            Poll::Ready(Ok(output)) => Poll::Ready(output),
            Poll::Ready(Err(payload)) => panic::resume_unwind(payload),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Idle(_) => "idle",
            State::Running(_) => "running",
            State::Consumed => "consumed",
        };
        f.debug_struct("Task").field("state", &state).finish()
    }
}

/// Completion slot shared between a running coroutine and its handle.
///
/// The slot is written exactly once, at the coroutine's final
/// suspension. The continuation waker, when present, is the single
/// resumer interested in that write: waking it is what hands control
/// back from a finished child to its awaiter.
pub(crate) struct ResultCell<T> {
    slot: RefCell<Slot<T>>,
    continuation: RefCell<Option<Waker>>,
}

enum Slot<T> {
    Empty,
    Value(T),
    Panicked(PanicPayload),
    Taken,
}

impl<T> ResultCell<T> {
    fn new() -> Self {
        ResultCell {
            slot: RefCell::new(Slot::Empty),
            continuation: RefCell::new(None),
        }
    }

    /// Records the coroutine's outcome and resumes the awaiter, if any.
    fn complete(&self, outcome: Result<T, PanicPayload>) {
        {
            let mut slot = self.slot.borrow_mut();
            debug_assert!(matches!(*slot, Slot::Empty), "task completed twice");
            *slot = match outcome {
                Ok(value) => Slot::Value(value),
                Err(payload) => Slot::Panicked(payload),
            };
        }

        if let Some(waker) = self.continuation.borrow_mut().take() {
            waker.wake();
        }
    }

    /// Takes the outcome if the coroutine has finished.
    fn try_take(&self) -> Option<Result<T, PanicPayload>> {
        let mut slot = self.slot.borrow_mut();

        if matches!(*slot, Slot::Empty) {
            return None;
        }

        match mem::replace(&mut *slot, Slot::Taken) {
            Slot::Value(value) => Some(Ok(value)),
            Slot::Panicked(payload) => Some(Err(payload)),
            Slot::Taken => panic!("task outcome taken twice"),
            Slot::Empty => unreachable!(),
        }
    }

    fn is_complete(&self) -> bool {
        !matches!(*self.slot.borrow(), Slot::Empty)
    }

    /// Parks `waker` as the continuation to run on completion.
    fn set_continuation(&self, waker: &Waker) {
        let mut continuation = self.continuation.borrow_mut();
        match &*continuation {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *continuation = Some(waker.clone()),
        }
    }
}

/// Executor-facing wrapper that runs a coroutine to completion and
/// deposits its outcome into the shared cell.
struct Drive<T> {
    future: Pin<Box<dyn Future<Output = T>>>,
    cell: Rc<ResultCell<T>>,
}

impl<T> Future for Drive<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        // A panicking coroutine still completes normally from the
        // executor's point of view: the payload parks in the cell and
        // resurfaces wherever the task is observed. One task failing
        // can never take down its siblings or the executor.
        match panic::catch_unwind(AssertUnwindSafe(|| this.future.as_mut().poll(ctx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => {
                this.cell.complete(Ok(output));
                Poll::Ready(())
            }
            Err(payload) => {
                this.cell.complete(Err(payload));
                Poll::Ready(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct CountWaker(AtomicUsize);

    impl Wake for CountWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn cell_completion_wakes_the_continuation_once() {
        let cell = ResultCell::new();
        let count = Arc::new(CountWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&count));

        cell.set_continuation(&waker);
        assert!(cell.try_take().is_none());
        assert!(!cell.is_complete());

        cell.complete(Ok(7));
        assert_eq!(count.0.load(Ordering::SeqCst), 1);
        assert!(cell.is_complete());

        assert!(matches!(cell.try_take(), Some(Ok(7))));
    }

    #[test]
    fn continuation_is_not_duplicated_for_the_same_waker() {
        let cell: ResultCell<()> = ResultCell::new();
        let count = Arc::new(CountWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&count));

        cell.set_continuation(&waker);
        cell.set_continuation(&waker.clone());

        cell.complete(Ok(()));
        assert_eq!(count.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_payload_is_preserved() {
        let cell: ResultCell<()> = ResultCell::new();
        cell.complete(Err(Box::new("boom")));

        let payload = cell.try_take().unwrap().unwrap_err();
        assert_eq!(*payload.downcast_ref::<&str>().unwrap(), "boom");
    }
}
