use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::rt::scheduler::Scheduler;

/// Waits until `duration` has elapsed.
///
/// This is equivalent to calling `sleep_until(Instant::now() +
/// duration)`, and functions as an asynchronous alternative to
/// `std::thread::sleep`.
pub fn sleep(duration: Duration) -> Sleep {
    // Wait for a relative amount of time from `Instant::now`.
    Sleep::new_timeout(Instant::now() + duration)
}

/// Waits until `deadline` is reached.
pub fn sleep_until(deadline: Instant) -> Sleep {
    // Wait until the specific absolute time.
    Sleep::new_timeout(deadline)
}

/// Future returned by [`sleep`] and [`sleep_until`].
///
/// A deadline already in the past completes on the first poll, within
/// the current tick, without touching the timer queue.
#[derive(Debug)]
pub struct Sleep {
    /// Point in time at which the sleep completes.
    deadline: Instant,
    /// Indicates whether the deadline has been registered with the
    /// timer queue.
    registered: bool,
}

impl Sleep {
    #[inline]
    fn new_timeout(deadline: Instant) -> Self {
        Sleep {
            deadline,
            registered: false,
        }
    }

    /// The instant this sleep completes.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }

        if !self.registered {
            self.registered = true;
            Scheduler::current().add_timer(self.deadline, ctx.waker().clone());
        }

        Poll::Pending
    }
}
