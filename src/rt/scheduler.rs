use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::task::{Context, Waker};
use std::thread;
use std::time::Instant;

use tracing::trace;

use crate::io::Result;
use crate::rt::io::{Driver, Interest};
use crate::rt::task::{RawTask, TaskId, TaskRef, TaskWaker};
use crate::rt::timer::TimerQueue;

thread_local! {
    /// Scheduler of the runtime the current thread has entered, if any.
    ///
    /// Set for the duration of `Runtime::block_on` by an [`EnterGuard`];
    /// `spawn`, timers, and the reactor reach the executor through it.
    static CURRENT: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
}

type TaskEntry = (TaskRef, TaskWaker);

/// Single-threaded task scheduler.
///
/// Owns the three wakeup sources of the executor: the FIFO ready queue,
/// the timer queue, and the epoll driver. All of it is mutated from one
/// thread, so plain `RefCell`s stand in for locks.
pub(crate) struct Scheduler {
    /// Stores all live tasks keyed by their ID, each paired with its
    /// `TaskWaker`.
    tasks: RefCell<HashMap<TaskId, TaskEntry>>,
    /// Queue of task IDs ready to be polled, in FIFO order.
    ready: RefCell<VecDeque<TaskId>>,
    /// Pending wakeups ordered by deadline.
    timers: RefCell<TimerQueue>,
    /// Readiness driver for file descriptors.
    driver: RefCell<Driver>,
}

impl Scheduler {
    /// Creates a new `Scheduler`.
    pub(crate) fn new() -> Self {
        Scheduler {
            tasks: Default::default(),
            ready: RefCell::new(Default::default()),
            timers: Default::default(),
            driver: RefCell::new(Driver::new()),
        }
    }

    /// Scheduler of the runtime the current thread has entered.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a runtime context.
    pub(crate) fn current() -> Rc<Scheduler> {
        Scheduler::try_current().expect(
            "no runtime context on this thread; spawning, sleeping, and I/O \
             must happen inside `Runtime::block_on`",
        )
    }

    /// Scheduler of the current runtime context, or [`None`] outside
    /// one.
    pub(crate) fn try_current() -> Option<Rc<Scheduler>> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    /// Installs `scheduler` as the thread's runtime context until the
    /// returned guard drops.
    ///
    /// # Panics
    ///
    /// Panics if a context is already entered; the executor is strictly
    /// single-threaded and does not nest.
    pub(crate) fn enter(scheduler: Rc<Scheduler>) -> EnterGuard {
        CURRENT.with(|cell| {
            let mut current = cell.borrow_mut();
            assert!(
                current.is_none(),
                "cannot nest `Runtime::block_on` inside a running runtime"
            );
            *current = Some(scheduler);
        });

        EnterGuard { _priv: () }
    }

    /// Registers a new task and queues it for its first poll, which
    /// happens within the current tick if one is in progress.
    pub(crate) fn submit(self: &Rc<Self>, raw: RawTask) {
        let id = raw.id;
        let task: TaskRef = Rc::new(raw);
        let waker = TaskWaker::new(Rc::clone(&task), Rc::clone(self));

        trace!(?id, "task submitted");

        task.scheduled.set(true);
        self.tasks.borrow_mut().insert(id, (task, waker));
        self.schedule(id);
    }

    /// Marks the task associated with the provided ID as ready to be
    /// polled.
    #[inline]
    pub(crate) fn schedule(&self, id: TaskId) {
        self.ready.borrow_mut().push_back(id);
    }

    /// Registers a timer wakeup.
    pub(crate) fn add_timer(&self, deadline: Instant, waker: Waker) {
        self.timers.borrow_mut().insert(deadline, waker);
    }

    /// Arms one-shot readiness interest in `fd` on behalf of `waker`.
    pub(crate) fn register_fd(&self, fd: RawFd, interest: Interest, waker: Waker) -> Result<()> {
        self.driver.borrow_mut().register(fd, interest, waker)
    }

    /// Drops any readiness interest in `fd`.
    pub(crate) fn unregister_fd(&self, fd: RawFd) {
        self.driver.borrow_mut().unregister(fd);
    }

    /// Returns `true` when no wakeup source can make further progress:
    /// nothing is ready, no timer is pending, and no descriptor is
    /// registered.
    pub(crate) fn is_stalled(&self) -> bool {
        self.ready.borrow().is_empty()
            && self.timers.borrow().is_empty()
            && !self.driver.borrow().has_registrations()
    }

    /// One work pass of the executor loop: drains the ready queue, then
    /// fires due timers and drains the wakeups they produce, so timer
    /// expiry is observable within the same tick. Never blocks.
    pub(crate) fn tick(&self) {
        self.run_ready();

        loop {
            let now = Instant::now();
            if self.timers.borrow_mut().drain_expired(now) == 0 {
                break;
            }
            self.run_ready();
        }
    }

    /// Blocks until the next wakeup source has something to deliver:
    /// readiness on a registered descriptor, or the earliest timer
    /// deadline. A no-op when ready work already exists or nothing is
    /// pending at all.
    pub(crate) fn park(&self) {
        if !self.ready.borrow().is_empty() {
            return;
        }

        let deadline = self.timers.borrow().next_deadline();
        let has_io = self.driver.borrow().has_registrations();

        if has_io {
            let timeout = deadline.map(|d| d.saturating_duration_since(Instant::now()));

            // Wakers run only after the driver borrow ends: a wake can
            // release the last reference to a finished task, and the
            // values it abandoned may unregister descriptors on drop.
            let mut wakeups = Vec::new();
            self.driver.borrow_mut().wait(timeout, &mut wakeups);
            for waker in wakeups {
                waker.wake();
            }
        } else if let Some(deadline) = deadline {
            // Timer-only case: nothing can wake the executor early, so
            // plain thread sleep replaces the epoll wait.
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }
    }

    /// Polls ready tasks in FIFO order until the queue is exhausted.
    /// Tasks woken or spawned while draining are polled in the same
    /// pass.
    fn run_ready(&self) {
        loop {
            let next = self.ready.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };

            // Temporarily remove the task entry from the map.
            let entry = self.tasks.borrow_mut().remove(&id);
            let Some((task, waker)) = entry else {
                // Wakes can outlive their task; a stale ID is not an
                // error.
                continue;
            };

            // Cleared before polling so the task can re-wake itself.
            task.scheduled.set(false);

            let mut ctx = Context::from_waker(&waker);
            if task.poll(&mut ctx).is_pending() {
                // Re-insert the task for future polling.
                self.tasks.borrow_mut().insert(id, (task, waker));
            } else {
                trace!(?id, "task finished");
            }

            // A completed task (and its waker entry) drops here...
        }
    }
}

/// Guard holding the thread's runtime context; clears it on drop.
#[derive(Debug)]
pub(crate) struct EnterGuard {
    _priv: (),
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        CURRENT.with(|cell| cell.borrow_mut().take());
    }
}
