//! Timer semantics: ordering, concurrency, and executor parking.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use corio::rt::Runtime;
use corio::task::{all, any, Task};
use corio::time::{sleep, sleep_until};

#[test]
fn sleeps_resume_in_deadline_order() {
    let rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    // Registered as 30ms, 10ms, 20ms; expected to fire as 1, 2, 0.
    let seen = Rc::clone(&log);
    rt.block_on(async move {
        let children = [30u64, 10, 20]
            .into_iter()
            .enumerate()
            .map(|(index, ms)| {
                let log = Rc::clone(&seen);
                Task::new(async move {
                    sleep(Duration::from_millis(ms)).await;
                    log.borrow_mut().push(index);
                })
            })
            .collect();

        all(children).await;
    });

    assert_eq!(*log.borrow(), vec![1, 2, 0]);
}

#[test]
fn sleep_until_honors_absolute_deadlines() {
    let rt = Runtime::new();

    let start = Instant::now();
    rt.block_on(async move {
        sleep_until(start + Duration::from_millis(20)).await;
    });

    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn an_expired_deadline_completes_without_parking() {
    let rt = Runtime::new();

    let start = Instant::now();
    rt.block_on(async move {
        sleep_until(Instant::now() - Duration::from_millis(5)).await;
        sleep(Duration::ZERO).await;
    });

    assert!(start.elapsed() < Duration::from_millis(20));
}

#[test]
fn concurrent_sleeps_overlap_under_all() {
    let rt = Runtime::new();

    let start = Instant::now();
    let out = rt.block_on(async {
        all(vec![
            Task::new(async {
                sleep(Duration::from_millis(100)).await;
                "a"
            }),
            Task::new(async {
                sleep(Duration::from_millis(100)).await;
                "b"
            }),
        ])
        .await
    });
    let elapsed = start.elapsed();

    assert_eq!(out, vec!["a", "b"]);
    assert!(elapsed >= Duration::from_millis(95), "finished in {elapsed:?}");
    assert!(elapsed < Duration::from_millis(250), "finished in {elapsed:?}");
}

#[test]
fn the_shortest_sleep_wins_under_any() {
    let rt = Runtime::new();

    let start = Instant::now();
    let (index, value) = rt.block_on(async {
        any(vec![
            Task::new(async {
                sleep(Duration::from_millis(100)).await;
                1
            }),
            Task::new(async {
                sleep(Duration::from_millis(200)).await;
                2
            }),
        ])
        .await
    });
    let elapsed = start.elapsed();

    assert_eq!((index, value), (0, 1));
    assert!(elapsed >= Duration::from_millis(95), "finished in {elapsed:?}");
    assert!(elapsed < Duration::from_millis(190), "finished in {elapsed:?}");
}

#[test]
fn the_executor_returns_promptly_after_the_root_sleep() {
    let rt = Runtime::new();

    let start = Instant::now();
    rt.block_on(async {
        sleep(Duration::from_millis(10)).await;
    });
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(10), "returned in {elapsed:?}");
    assert!(elapsed < Duration::from_millis(50), "returned in {elapsed:?}");
}
