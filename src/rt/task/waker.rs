use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

use crate::rt::scheduler::Scheduler;
use crate::rt::task::TaskRef;

/// Wrapper around [`Waker`] that enforces `!Send` and `!Sync`.
///
/// `Waker` is `Send + Sync` by definition, but the vtable below hands
/// out `Rc` clones; the marker keeps the wrapper (and anything holding
/// it) on the executor thread, which is what makes that sound.
pub(crate) struct TaskWaker {
    waker: Waker,
    _marker: PhantomData<Rc<()>>,
}

struct WakerData {
    task: TaskRef,
    scheduler: Rc<Scheduler>,
}

impl TaskWaker {
    /// Creates a new `TaskWaker` for the given task and scheduler.
    pub(crate) fn new(task: TaskRef, scheduler: Rc<Scheduler>) -> Self {
        let data = Rc::new(WakerData { task, scheduler });

        TaskWaker {
            // SAFETY: the vtable functions are only ever handed pointers
            // minted from `Rc<WakerData>`, and the marker above keeps
            // every clone on the executor thread.
            waker: unsafe { Waker::from_raw(raw_waker(data)) },
            _marker: PhantomData,
        }
    }
}

impl Deref for TaskWaker {
    type Target = Waker;

    fn deref(&self) -> &Self::Target {
        &self.waker
    }
}

impl fmt::Debug for TaskWaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWaker").field("waker", &self.waker).finish()
    }
}

fn raw_waker(data: Rc<WakerData>) -> RawWaker {
    // Does not decrement the reference count of `data`.
    RawWaker::new(Rc::into_raw(data) as *const (), &VTABLE)
}

/// Marks the task ready to be polled, unless it is already sitting in
/// the ready queue.
///
/// Reads only the task's ID and scheduled flag: a task may invoke its
/// own waker mid-poll, while the scheduler holds the coroutine borrow.
fn schedule(data: &WakerData) {
    if !data.task.scheduled.replace(true) {
        data.scheduler.schedule(data.task.id);
    }
}

const VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_waker);

unsafe fn clone(ptr: *const ()) -> RawWaker {
    // SAFETY: `ptr` was minted by `Rc::into_raw` in `raw_waker`.
    let data: Rc<WakerData> = unsafe { Rc::from_raw(ptr as *const WakerData) };
    let cloned = Rc::clone(&data);

    // The original reference stays alive inside the calling waker.
    mem::forget(data);

    raw_waker(cloned)
}

unsafe fn wake(ptr: *const ()) {
    // SAFETY: as in `clone`. Waking by value consumes the waker's
    // reference; `data` drops here.
    let data: Rc<WakerData> = unsafe { Rc::from_raw(ptr as *const WakerData) };
    schedule(&data);
}

unsafe fn wake_by_ref(ptr: *const ()) {
    // SAFETY: as in `clone`.
    let data: Rc<WakerData> = unsafe { Rc::from_raw(ptr as *const WakerData) };
    schedule(&data);

    // Waking by reference must not consume the waker.
    mem::forget(data);
}

unsafe fn drop_waker(ptr: *const ()) {
    // SAFETY: as in `clone`.
    drop(unsafe { Rc::from_raw(ptr as *const WakerData) });
}
