//! A concurrent-safe boolean that starts unset and, once set, can never be unset again.
//!
//! A [`Flag`] is used to signal that something has happened: a shutdown was requested, an
//! initialization step finished, some work was cancelled. Any number of threads may set it, poll
//! it or wait for it at the same time.
//!
//! The usage pattern is as follows:
//!
//! 1. Create a [`Flag`] with [`Flag::new()`] and share it by reference, e.g. behind an `Arc`.
//! 2. Signal the event with [`Flag::set()`]. Setting an already set flag does nothing.
//! 3. Observe the event with [`Flag::is_set()`] (never blocks) or with the [`Done`] handle
//!    returned by [`Flag::done()`], either by blocking in [`Done::wait()`] or by selecting on
//!    [`Done::receiver()`] together with other channels.
//!
//! # Example
//!
//! ```
//! use std::{sync::Arc, thread, time::Duration};
//! use concurrent_flag::Flag;
//! use crossbeam_channel::{after, select};
//!
//! let flag = Arc::new(Flag::new());
//! let done = flag.done();
//!
//! let setter = thread::spawn({
//!     let flag = flag.clone();
//!     move || flag.set()
//! });
//!
//! select! {
//!     recv(done.receiver()) -> _ => assert!(flag.is_set()),
//!     recv(after(Duration::from_secs(10))) -> _ => panic!("the flag was never set"),
//! }
//! setter.join().unwrap();
//! ```

mod done;
mod flag;

pub use done::{Done, Never};
pub use flag::Flag;
