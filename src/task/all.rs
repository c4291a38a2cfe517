use std::future::Future;
use std::mem;
use std::panic;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::task::{PanicPayload, Task};

/// Runs every task concurrently and collects their outputs.
///
/// All children start together when the returned task is first polled,
/// and run as independent tasks under the executor. The combinator
/// completes once every child has finalized, with outputs in input
/// order.
///
/// If a child panics, `all` still waits for the remaining children to
/// finalize — their side effects are observable — and only then resumes
/// the first panic it saw.
///
/// An empty input completes immediately with an empty `Vec`.
pub fn all<T: 'static>(tasks: Vec<Task<T>>) -> Task<Vec<T>> {
    Task::new(All {
        children: tasks.into_iter().map(Child::Waiting).collect(),
        panicked: None,
        started: false,
    })
}

enum Child<T> {
    Waiting(Task<T>),
    Finished(T),
    /// Panicked; its payload moved to the shared `panicked` slot.
    Failed,
}

struct All<T> {
    children: Vec<Child<T>>,
    /// First failure observed; re-raised once every child is done.
    panicked: Option<PanicPayload>,
    started: bool,
}

impl<T: 'static> Future for All<T> {
    type Output = Vec<T>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Vec<T>> {
        // SAFETY: `All` never pins its fields in place — children are
        // moved freely in and out of the `Vec` (e.g. via `mem::take`
        // and reassignment), so projecting to `&mut Self` here is sound
        // without requiring `T: Unpin`.
        let this = unsafe { self.get_unchecked_mut() };

        if !this.started {
            this.started = true;
            for child in &mut this.children {
                if let Child::Waiting(task) = child {
                    task.start();
                }
            }
        }

        let mut done = true;
        for child in &mut this.children {
            let Child::Waiting(task) = child else {
                continue;
            };

            match task.poll_outcome(ctx) {
                Poll::Ready(Ok(output)) => *child = Child::Finished(output),
                Poll::Ready(Err(payload)) => {
                    if this.panicked.is_none() {
                        this.panicked = Some(payload);
                    }
                    *child = Child::Failed;
                }
                Poll::Pending => done = false,
            }
        }

        if !done {
            return Poll::Pending;
        }

        if let Some(payload) = this.panicked.take() {
            panic::resume_unwind(payload);
        }

        let children = mem::take(&mut this.children);
        Poll::Ready(
            children
                .into_iter()
                .map(|child| match child {
                    Child::Finished(output) => output,
                    _ => unreachable!("every child finished successfully"),
                })
                .collect(),
        )
    }
}
