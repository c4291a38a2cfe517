use std::collections::BTreeMap;
use std::task::Waker;
use std::time::Instant;

/// Time-ordered set of pending wakeups.
///
/// Entries are keyed by `(deadline, seq)`: iteration yields expirations
/// earliest-deadline-first, and the monotonically increasing insertion
/// sequence keeps entries with equal deadlines in FIFO order. Deadlines
/// are [`Instant`]s, so wall-clock adjustments cannot fire a timer
/// early.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    entries: BTreeMap<(Instant, u64), Waker>,
    next_seq: u64,
}

impl TimerQueue {
    /// Registers `waker` to be woken once `deadline` has passed.
    pub(crate) fn insert(&mut self, deadline: Instant, waker: Waker) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline, seq), waker);
    }

    /// Returns the earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Returns `true` if no timers are pending.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wakes every entry whose deadline is at or before `now`, earliest
    /// first, and returns how many entries fired.
    pub(crate) fn drain_expired(&mut self, now: Instant) -> usize {
        let mut fired = 0;

        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }

            entry.remove().wake();
            fired += 1;
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};
    use std::task::Wake;
    use std::time::Duration;

    use rstest::rstest;

    struct LogWaker {
        log: Arc<Mutex<Vec<usize>>>,
        index: usize,
    }

    impl Wake for LogWaker {
        fn wake(self: Arc<Self>) {
            self.log.lock().unwrap().push(self.index);
        }
    }

    fn log_waker(log: &Arc<Mutex<Vec<usize>>>, index: usize) -> Waker {
        Waker::from(Arc::new(LogWaker {
            log: Arc::clone(log),
            index,
        }))
    }

    #[rstest]
    #[case::sorted(&[0, 1, 2])]
    #[case::reversed(&[2, 1, 0])]
    #[case::mixed(&[1, 2, 0])]
    fn fires_in_deadline_order(#[case] insert_order: &[usize]) {
        let base = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimerQueue::default();

        for &index in insert_order {
            let deadline = base + Duration::from_millis(10 * index as u64);
            queue.insert(deadline, log_waker(&log, index));
        }

        assert_eq!(queue.drain_expired(base + Duration::from_millis(100)), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn equal_deadlines_fire_in_insertion_order() {
        let deadline = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimerQueue::default();

        for index in 0..4 {
            queue.insert(deadline, log_waker(&log, index));
        }

        queue.drain_expired(deadline);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn next_deadline_is_the_earliest() {
        let base = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimerQueue::default();
        assert_eq!(queue.next_deadline(), None);

        queue.insert(base + Duration::from_millis(30), log_waker(&log, 0));
        queue.insert(base + Duration::from_millis(10), log_waker(&log, 1));

        assert_eq!(queue.next_deadline(), Some(base + Duration::from_millis(10)));
    }

    #[test]
    fn drain_leaves_unexpired_entries() {
        let base = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimerQueue::default();

        queue.insert(base + Duration::from_millis(5), log_waker(&log, 0));
        queue.insert(base + Duration::from_millis(50), log_waker(&log, 1));

        assert_eq!(queue.drain_expired(base + Duration::from_millis(10)), 1);
        assert_eq!(*log.lock().unwrap(), vec![0]);
        assert_eq!(queue.next_deadline(), Some(base + Duration::from_millis(50)));
    }
}
