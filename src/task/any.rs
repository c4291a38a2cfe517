use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::task::Task;

/// Runs every task concurrently and yields the first success.
///
/// All children start together when the returned task is first polled,
/// and run as independent tasks under the executor. The output is
/// `(index, output)` for the first child to complete successfully,
/// where `index` is the child's position in the input.
///
/// A child that panics before any success propagates its panic
/// immediately; there is no well-defined fallback once a contestant has
/// failed. Children still running when the race is decided are
/// abandoned: they continue executing under the runtime for as long as
/// it lives, and their outputs are discarded.
///
/// # Panics
///
/// Panics if `tasks` is empty — a race with no contestants can never
/// finish.
pub fn any<T: 'static>(tasks: Vec<Task<T>>) -> Task<(usize, T)> {
    assert!(!tasks.is_empty(), "`any` requires at least one task");

    Task::new(Any {
        children: tasks,
        started: false,
    })
}

struct Any<T> {
    children: Vec<Task<T>>,
    started: bool,
}

impl<T: 'static> Future for Any<T> {
    type Output = (usize, T);

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<(usize, T)> {
        let this = self.get_mut();

        if !this.started {
            this.started = true;
            for child in &mut this.children {
                child.start();
            }
        }

        for (index, child) in this.children.iter_mut().enumerate() {
            match child.poll_outcome(ctx) {
                Poll::Ready(Ok(output)) => return Poll::Ready((index, output)),
                Poll::Ready(Err(payload)) => panic::resume_unwind(payload),
                Poll::Pending => {}
            }
        }

        Poll::Pending
    }
}
