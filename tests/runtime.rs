//! Executor and task-handle semantics.

use std::cell::Cell;
use std::future;
use std::panic;
use std::rc::Rc;
use std::time::Duration;

use corio::rt::Runtime;
use corio::task::{self, Task};
use corio::time::sleep;

#[test]
fn block_on_returns_the_root_output() {
    let rt = Runtime::new();
    assert_eq!(rt.block_on(async { 1 + 2 }), 3);
}

#[test]
fn constructing_a_task_runs_nothing() {
    let counter = Rc::new(Cell::new(0));

    let seen = Rc::clone(&counter);
    let task = Task::new(async move {
        seen.set(seen.get() + 1);
    });

    assert_eq!(counter.get(), 0, "constructed task must not run");
    drop(task);
    assert_eq!(counter.get(), 0, "dropped unstarted task must not run");
}

#[test]
fn a_task_runs_once_awaited() {
    let rt = Runtime::new();
    let counter = Rc::new(Cell::new(0));

    let seen = Rc::clone(&counter);
    rt.block_on(async move {
        let task = Task::new(async move {
            seen.set(seen.get() + 1);
            7
        });
        assert_eq!(task.await, 7);
    });

    assert_eq!(counter.get(), 1);
}

#[test]
fn spawned_tasks_run_concurrently_with_the_root() {
    let rt = Runtime::new();

    let out = rt.block_on(async {
        let a = corio::spawn(async {
            sleep(Duration::from_millis(5)).await;
            "a"
        });
        let b = corio::spawn(async {
            sleep(Duration::from_millis(5)).await;
            "b"
        });
        (a.await, b.await)
    });

    assert_eq!(out, ("a", "b"));
}

#[test]
fn spawned_tasks_poll_in_spawn_order() {
    let rt = Runtime::new();
    let log = Rc::new(std::cell::RefCell::new(Vec::new()));

    let seen = Rc::clone(&log);
    rt.block_on(async move {
        let tasks: Vec<_> = (0..5)
            .map(|index| {
                let log = Rc::clone(&seen);
                corio::spawn(async move {
                    log.borrow_mut().push(index);
                })
            })
            .collect();

        for task in tasks {
            task.await;
        }
    });

    assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn chained_awaits_use_constant_native_stack() {
    const DEPTH: usize = 100_000;

    let rt = Runtime::new();

    let mut task = Task::new(async { 42 });
    for _ in 0..DEPTH {
        let prev = task;
        task = Task::new(async move { prev.await });
    }

    assert_eq!(rt.block_on(task), 42);
}

#[test]
fn result_reads_a_finished_task() {
    let rt = Runtime::new();

    rt.block_on(async {
        let task = corio::spawn(async { 7 });
        assert!(!task.is_finished());

        // One trip through the ready queue lets the spawned task run.
        task::yield_now().await;

        assert!(task.is_finished());
        assert_eq!(task.result(), 7);
    });
}

#[test]
fn a_panicking_task_resurfaces_at_the_await_point() {
    let rt = Runtime::new();

    let payload = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        rt.block_on(async {
            let task = corio::spawn(async {
                panic!("boom {}", 42);
            });
            task.await;
        })
    }))
    .unwrap_err();

    assert_eq!(payload.downcast_ref::<String>().unwrap(), "boom 42");
}

#[test]
fn dropping_a_failed_task_discards_the_panic() {
    let rt = Runtime::new();

    rt.block_on(async {
        let task = corio::spawn(async {
            panic!("unobserved");
        });
        task::yield_now().await;
        drop(task);

        // The executor is intact; unrelated work still completes.
        sleep(Duration::from_millis(1)).await;
    });
}

#[test]
fn an_abandoned_task_keeps_running() {
    let rt = Runtime::new();
    let counter = Rc::new(Cell::new(0));

    let seen = Rc::clone(&counter);
    rt.block_on(async move {
        let task = corio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            seen.set(seen.get() + 1);
        });
        drop(task);

        sleep(Duration::from_millis(40)).await;
    });

    assert_eq!(counter.get(), 1, "detached task must finish on its own");
}

#[test]
#[should_panic(expected = "executor stalled")]
fn a_stalled_executor_panics_instead_of_hanging() {
    let rt = Runtime::new();
    rt.block_on(future::pending::<()>());
}

#[test]
#[should_panic(expected = "no runtime context")]
fn spawning_outside_a_runtime_panics() {
    let _ = corio::spawn(async {});
}

#[test]
#[should_panic(expected = "cannot nest")]
fn nested_block_on_panics() {
    let rt = Runtime::new();
    rt.block_on(async {
        let inner = Runtime::new();
        inner.block_on(async {});
    });
}

#[test]
#[should_panic(expected = "before the task completed")]
fn result_before_completion_is_a_usage_error() {
    let rt = Runtime::new();
    rt.block_on(async {
        let task = corio::spawn(async {
            sleep(Duration::from_millis(50)).await;
        });
        // Still sleeping; reading the result now is a usage error.
        task.result();
    });
}
