//! Minimal single-threaded cooperative async runtime.
//!
//! `corio` schedules lazily-started [`Task`]s on a single executor
//! thread, multiplexing timer expirations and file-descriptor readiness
//! (via `epoll(7)`) into task wakeups. Suspension is strictly
//! cooperative: a task yields only at `.await` points, and nothing else
//! in the runtime ever blocks the executor.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! let rt = corio::rt::Runtime::new();
//! let out = rt.block_on(async {
//!     let task = corio::spawn(async {
//!         corio::time::sleep(Duration::from_millis(1)).await;
//!         1
//!     });
//!     task.await
//! });
//! assert_eq!(out, 1);
//! ```
//!
//! [`Task`]: crate::task::Task

#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unused_must_use)]

pub mod io;
pub mod net;
pub mod rt;
pub mod task;
pub mod time;

pub use rt::spawn;
