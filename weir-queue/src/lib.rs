//! # weir-queue
//!
//! A blocking bounded MPMC queue built directly from a mutex and two
//! condition variables: producers sleep while the queue is full, consumers
//! sleep while it is empty.
//!
//! ## Features
//!
//! - **Blocking `put`/`take`**: strict FIFO hand-off between any number of
//!   producer and consumer threads
//! - **Cancellation**: abort a blocked operation from another thread via a
//!   [`CancelToken`](mpmc::bounded::CancelToken)
//! - **Fairness policy**: optional strict arrival-order wakeup, chosen at
//!   construction
//! - **Bounded waits**: `try_*` and `*_timeout` variants alongside the
//!   indefinitely blocking calls
//!
//! ## Design Goals
//!
//! - Correct under arbitrary interleavings: every wait re-checks its
//!   predicate in a loop, so racing waiters and spurious wakeups are safe
//! - Element storage is allocated once at construction and never resized
//! - No busy-waiting: blocked threads sleep on a condition variable and are
//!   signalled exactly on the state transitions that can unblock them
//!
//! ## Example
//!
//! ```
//! use weir_queue::mpmc::bounded::BlockingQueue;
//! use std::thread;
//!
//! // A handle per thread; clones share one queue.
//! let queue = BlockingQueue::new(64);
//!
//! let consumer = {
//!     let queue = queue.clone();
//!     thread::spawn(move || (0..100u64).map(|_| queue.take()).sum::<u64>())
//! };
//!
//! for i in 0..100u64 {
//!     queue.put(i);
//! }
//!
//! assert_eq!(consumer.join().unwrap(), 4950);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod mpmc;
