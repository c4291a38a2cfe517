//! Asynchronous time: sleeping on durations and deadlines.

mod sleep;
pub use sleep::{sleep, sleep_until, Sleep};
