//! Multi-producer multi-consumer (MPMC) bounded blocking queue.
//!
//! A fixed-capacity FIFO built from one mutex and two condition variables:
//! `put` sleeps while the queue is full, `take` sleeps while it is empty.
//! Any number of threads may share a cloned [`BlockingQueue`] handle.
//!
//! # Example
//!
//! ```
//! use weir_queue::mpmc::bounded::BlockingQueue;
//! use std::thread;
//!
//! let queue = BlockingQueue::new(2);
//!
//! let consumer = {
//!     let queue = queue.clone();
//!     thread::spawn(move || queue.take())
//! };
//!
//! queue.put(7u64);
//! assert_eq!(consumer.join().unwrap(), 7);
//! ```
//!
//! # Cancellation
//!
//! A blocked operation can be aborted from another thread through a
//! [`CancelToken`] created by [`BlockingQueue::cancel_token`]. Cancelling a
//! token fails only the operations that were handed that token; every other
//! waiter re-checks its predicate and keeps sleeping.
//!
//! ```
//! use weir_queue::mpmc::bounded::{BlockingQueue, TakeError};
//! use std::thread;
//!
//! let queue: BlockingQueue<u64> = BlockingQueue::new(4);
//! let token = queue.cancel_token();
//!
//! let waiter = {
//!     let queue = queue.clone();
//!     let token = token.clone();
//!     thread::spawn(move || queue.take_cancellable(&token))
//! };
//!
//! token.cancel();
//! assert_eq!(waiter.join().unwrap(), Err(TakeError::Cancelled));
//! ```
//!
//! # Fairness
//!
//! By default the queue makes no promise about which blocked thread wins
//! when a slot or an element becomes available. Constructing the queue with
//! [`Fairness::Fair`] switches to strict arrival order: each side's waiters
//! form a FIFO and proceed one at a time, and `try_put`/`try_take` refuse to
//! barge past them.
//!
//! # Design Notes
//!
//! Every wait re-evaluates its predicate in a loop after each wakeup. With
//! more than two threads a woken waiter can lose the race for the slot it
//! was signalled about, and the platform may wake a waiter spuriously with
//! no signal at all; a single check-then-wait mishandles both.
//!
//! Signals are tied to state transitions: each `put` signals one consumer,
//! each `take` signals one producer. Fair mode broadcasts instead, because
//! a single wakeup could land on a waiter that is not at the front of the
//! arrival queue and must keep sleeping.

mod ring;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

use ring::Ring;

/// Wakeup policy for blocked operations, chosen at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fairness {
    /// Whichever waiter wins the race for the lock proceeds first.
    #[default]
    Unfair,
    /// Waiters on each side proceed in strict arrival order.
    Fair,
}

/// How long a blocking operation is willing to wait.
#[derive(Clone, Copy)]
enum Wait {
    Forever,
    Until(Instant),
}

/// Arrival-order FIFO of blocked operations, used only in fair mode.
///
/// Each blocking call takes a ticket on entry and may only operate while
/// its ticket is at the front. A ticket is removed when its operation
/// finishes or gives up, wherever it sits in the line.
#[derive(Debug)]
struct WaitQueue {
    next_ticket: u64,
    waiting: VecDeque<u64>,
}

impl WaitQueue {
    fn new() -> Self {
        Self {
            next_ticket: 0,
            waiting: VecDeque::new(),
        }
    }

    fn join(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiting.push_back(ticket);
        ticket
    }

    fn is_front(&self, ticket: u64) -> bool {
        self.waiting.front() == Some(&ticket)
    }

    fn leave(&mut self, ticket: u64) {
        if let Some(pos) = self.waiting.iter().position(|&t| t == ticket) {
            self.waiting.remove(pos);
        }
    }

    fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Everything the mutex guards.
struct State<T> {
    ring: Ring<T>,
    producers: WaitQueue,
    consumers: WaitQueue,
}

/// Shared core behind every cloned handle.
///
/// The mutex and the two condition variables sit on separate cache lines;
/// producers hammering `not_full` should not invalidate the line consumers
/// spin their wakeups on.
struct Shared<T> {
    state: CachePadded<Mutex<State<T>>>,
    /// Waited on by producers; predicate: ring not full (and front ticket).
    not_full: CachePadded<Condvar>,
    /// Waited on by consumers; predicate: ring not empty (and front ticket).
    not_empty: CachePadded<Condvar>,
    capacity: usize,
    fairness: Fairness,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // State is only mutated under the lock and never left half-updated,
        // so a poisoned mutex still guards a well-formed ring.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal_not_full(&self) {
        match self.fairness {
            Fairness::Unfair => {
                self.not_full.notify_one();
            }
            Fairness::Fair => {
                self.not_full.notify_all();
            }
        }
    }

    fn signal_not_empty(&self) {
        match self.fairness {
            Fairness::Unfair => {
                self.not_empty.notify_one();
            }
            Fairness::Fair => {
                self.not_empty.notify_all();
            }
        }
    }

    /// Removes a producer-side waiter that is giving up.
    ///
    /// If space is available, the wakeup this waiter may have absorbed is
    /// handed to a sibling; in fair mode leaving also promotes the next
    /// ticket to the front.
    fn abandon_producer(&self, state: &mut State<T>, ticket: Option<u64>) {
        if let Some(ticket) = ticket {
            state.producers.leave(ticket);
        }
        if !state.ring.is_full() {
            self.signal_not_full();
        }
    }

    /// Consumer-side counterpart of [`Shared::abandon_producer`].
    fn abandon_consumer(&self, state: &mut State<T>, ticket: Option<u64>) {
        if let Some(ticket) = ticket {
            state.consumers.leave(ticket);
        }
        if !state.ring.is_empty() {
            self.signal_not_empty();
        }
    }
}

/// Wakes a queue's waiters on behalf of a [`CancelToken`], without knowing
/// the element type.
trait WaitTarget: Send + Sync {
    fn cancel_waiters(&self, flag: &AtomicBool);
}

impl<T: Send> WaitTarget for Shared<T> {
    fn cancel_waiters(&self, flag: &AtomicBool) {
        // The flag must flip under the lock: setting it in between a
        // waiter's flag check and its wait would lose the wakeup.
        let _state = self.lock();
        flag.store(true, Ordering::SeqCst);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

/// Aborts blocked operations that were handed this token.
///
/// Created by [`BlockingQueue::cancel_token`]; clones share the same flag.
/// Once cancelled, a token stays cancelled: later cancellable calls using
/// it fail immediately without touching the queue.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    target: Arc<dyn WaitTarget>,
}

impl CancelToken {
    /// Cancels every pending and future operation using this token.
    ///
    /// Blocked waiters holding the token wake, release the lock, and
    /// report `Cancelled` with the queue state untouched. Waiters with
    /// other tokens (or none) re-check their predicate and keep waiting.
    pub fn cancel(&self) {
        self.target.cancel_waiters(&self.cancelled);
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called on this
    /// token or any of its clones.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A fixed-capacity MPMC FIFO queue that blocks producers when full and
/// consumers when empty.
///
/// Handles are cheap to clone and share one queue. All mutation happens
/// under a single internal mutex; the queue allocates its storage once at
/// construction and never resizes.
///
/// # Example
///
/// ```
/// use weir_queue::mpmc::bounded::BlockingQueue;
///
/// let queue = BlockingQueue::new(2);
/// queue.put("a");
/// queue.put("b");
///
/// assert_eq!(queue.take(), "a");
/// assert_eq!(queue.take(), "b");
/// ```
pub struct BlockingQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BlockingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> BlockingQueue<T> {
    /// Creates a queue holding at most `capacity` elements, with the
    /// default [`Fairness::Unfair`] wakeup policy.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_fairness(capacity, Fairness::Unfair)
    }

    /// Creates a queue with an explicit wakeup policy.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use weir_queue::mpmc::bounded::{BlockingQueue, Fairness};
    ///
    /// let queue = BlockingQueue::with_fairness(8, Fairness::Fair);
    /// queue.put(1u32);
    /// assert_eq!(queue.take(), 1);
    /// ```
    pub fn with_fairness(capacity: usize, fairness: Fairness) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");

        Self {
            shared: Arc::new(Shared {
                state: CachePadded::new(Mutex::new(State {
                    ring: Ring::with_capacity(capacity),
                    producers: WaitQueue::new(),
                    consumers: WaitQueue::new(),
                })),
                not_full: CachePadded::new(Condvar::new()),
                not_empty: CachePadded::new(Condvar::new()),
                capacity,
                fairness,
            }),
        }
    }

    /// Enqueues `value`, blocking while the queue is full.
    ///
    /// The element becomes observable to `take` calls as soon as this
    /// returns; the internal lock orders every put against every take.
    pub fn put(&self, value: T) {
        match self.put_inner(value, Wait::Forever, None) {
            Ok(()) => (),
            // No deadline and no token were supplied.
            Err(PutError::Cancelled(_) | PutError::TimedOut(_)) => unreachable!(),
        }
    }

    /// Dequeues the oldest element, blocking while the queue is empty.
    pub fn take(&self) -> T {
        match self.take_inner(Wait::Forever, None) {
            Ok(value) => value,
            // No deadline and no token were supplied.
            Err(TakeError::Cancelled | TakeError::TimedOut) => unreachable!(),
        }
    }

    /// Attempts to enqueue `value` without blocking.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if every slot is occupied, or, in fair
    /// mode, if blocked producers are queued ahead of this call.
    ///
    /// # Example
    ///
    /// ```
    /// use weir_queue::mpmc::bounded::{BlockingQueue, Full};
    ///
    /// let queue = BlockingQueue::new(1);
    ///
    /// assert!(queue.try_put(1).is_ok());
    /// assert!(matches!(queue.try_put(2), Err(Full(2))));
    /// ```
    pub fn try_put(&self, value: T) -> Result<(), Full<T>> {
        let shared = &*self.shared;
        let mut state = shared.lock();

        // Fair mode: blocked producers hold arrival order; do not barge.
        if shared.fairness == Fairness::Fair && !state.producers.is_empty() {
            return Err(Full(value));
        }

        state.ring.push(value)?;
        shared.signal_not_empty();
        Ok(())
    }

    /// Attempts to dequeue without blocking.
    ///
    /// # Errors
    ///
    /// Returns `Err(Empty)` if no element is queued, or, in fair mode, if
    /// blocked consumers are queued ahead of this call.
    ///
    /// # Example
    ///
    /// ```
    /// use weir_queue::mpmc::bounded::{BlockingQueue, Empty};
    ///
    /// let queue: BlockingQueue<u32> = BlockingQueue::new(1);
    ///
    /// assert_eq!(queue.try_take(), Err(Empty));
    /// queue.put(5);
    /// assert_eq!(queue.try_take(), Ok(5));
    /// ```
    pub fn try_take(&self) -> Result<T, Empty> {
        let shared = &*self.shared;
        let mut state = shared.lock();

        if shared.fairness == Fairness::Fair && !state.consumers.is_empty() {
            return Err(Empty);
        }

        match state.ring.pop() {
            Some(value) => {
                shared.signal_not_full();
                Ok(value)
            }
            None => Err(Empty),
        }
    }

    /// Enqueues `value`, waiting at most `timeout` for a free slot.
    ///
    /// The deadline is re-checked under the lock before giving up, so a
    /// slot freed at the last instant is still used.
    ///
    /// # Errors
    ///
    /// Returns `Err(PutError::TimedOut(value))` when the queue stayed full
    /// for the whole timeout.
    pub fn put_timeout(&self, value: T, timeout: Duration) -> Result<(), PutError<T>> {
        let wait = Instant::now()
            .checked_add(timeout)
            .map_or(Wait::Forever, Wait::Until);
        self.put_inner(value, wait, None)
    }

    /// Dequeues, waiting at most `timeout` for an element.
    ///
    /// # Errors
    ///
    /// Returns `Err(TakeError::TimedOut)` when the queue stayed empty for
    /// the whole timeout.
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, TakeError> {
        let wait = Instant::now()
            .checked_add(timeout)
            .map_or(Wait::Forever, Wait::Until);
        self.take_inner(wait, None)
    }

    /// Enqueues `value`, blocking while full, unless `token` is cancelled.
    ///
    /// A token cancelled before the call fails it immediately; the queue
    /// is not touched either way on the error path.
    ///
    /// # Errors
    ///
    /// Returns `Err(PutError::Cancelled(value))` once `token` fires.
    pub fn put_cancellable(&self, value: T, token: &CancelToken) -> Result<(), PutError<T>> {
        self.put_inner(value, Wait::Forever, Some(token))
    }

    /// Dequeues, blocking while empty, unless `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Err(TakeError::Cancelled)` once `token` fires.
    pub fn take_cancellable(&self, token: &CancelToken) -> Result<T, TakeError> {
        self.take_inner(Wait::Forever, Some(token))
    }

    /// Returns the number of queued elements.
    ///
    /// Note: This is a snapshot and may be immediately stale in concurrent
    /// contexts.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.lock().ring.len()
    }

    /// Returns `true` if no element is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.lock().ring.is_full()
    }

    /// Returns the fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Returns the wakeup policy chosen at construction.
    #[inline]
    pub fn fairness(&self) -> Fairness {
        self.shared.fairness
    }

    fn put_inner(
        &self,
        mut value: T,
        wait: Wait,
        token: Option<&CancelToken>,
    ) -> Result<(), PutError<T>> {
        let shared = &*self.shared;
        let mut state = shared.lock();

        let ticket = match shared.fairness {
            Fairness::Unfair => None,
            Fairness::Fair => Some(state.producers.join()),
        };

        loop {
            if token.is_some_and(CancelToken::is_cancelled) {
                shared.abandon_producer(&mut state, ticket);
                return Err(PutError::Cancelled(value));
            }

            if ticket.map_or(true, |t| state.producers.is_front(t)) {
                match state.ring.push(value) {
                    Ok(()) => {
                        if let Some(t) = ticket {
                            state.producers.leave(t);
                            // Space may remain for the next queued producer.
                            if !state.ring.is_full() && !state.producers.is_empty() {
                                shared.not_full.notify_all();
                            }
                        }
                        shared.signal_not_empty();
                        return Ok(());
                    }
                    Err(Full(v)) => value = v,
                }
            }

            state = match wait {
                Wait::Forever => shared
                    .not_full
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Wait::Until(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        shared.abandon_producer(&mut state, ticket);
                        return Err(PutError::TimedOut(value));
                    }
                    let (guard, _) = shared
                        .not_full
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
            };
        }
    }

    fn take_inner(&self, wait: Wait, token: Option<&CancelToken>) -> Result<T, TakeError> {
        let shared = &*self.shared;
        let mut state = shared.lock();

        let ticket = match shared.fairness {
            Fairness::Unfair => None,
            Fairness::Fair => Some(state.consumers.join()),
        };

        loop {
            if token.is_some_and(CancelToken::is_cancelled) {
                shared.abandon_consumer(&mut state, ticket);
                return Err(TakeError::Cancelled);
            }

            if ticket.map_or(true, |t| state.consumers.is_front(t)) {
                if let Some(value) = state.ring.pop() {
                    if let Some(t) = ticket {
                        state.consumers.leave(t);
                        // Elements may remain for the next queued consumer.
                        if !state.ring.is_empty() && !state.consumers.is_empty() {
                            shared.not_empty.notify_all();
                        }
                    }
                    shared.signal_not_full();
                    return Ok(value);
                }
            }

            state = match wait {
                Wait::Forever => shared
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Wait::Until(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        shared.abandon_consumer(&mut state, ticket);
                        return Err(TakeError::TimedOut);
                    }
                    let (guard, _) = shared
                        .not_empty
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
            };
        }
    }
}

impl<T: Send + 'static> BlockingQueue<T> {
    /// Creates a cancellation token bound to this queue.
    ///
    /// Hand the token (or a clone) to [`BlockingQueue::put_cancellable`] /
    /// [`BlockingQueue::take_cancellable`]; cancelling it aborts exactly
    /// those calls.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            target: Arc::clone(&self.shared) as Arc<dyn WaitTarget>,
        }
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("fairness", &self.fairness())
            .finish_non_exhaustive()
    }
}

/// Error returned by [`BlockingQueue::try_put`].
///
/// Contains the value that couldn't be enqueued.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that couldn't be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<T> std::error::Error for Full<T> {}

/// Error returned by [`BlockingQueue::try_take`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

impl fmt::Display for Empty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is empty")
    }
}

impl std::error::Error for Empty {}

/// Error returned by the blocking put variants.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PutError<T> {
    /// The operation's token fired. Contains the value that couldn't be
    /// enqueued.
    Cancelled(T),
    /// The wait deadline expired. Contains the value that couldn't be
    /// enqueued.
    TimedOut(T),
}

impl<T> PutError<T> {
    /// Returns the value that couldn't be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Cancelled(val) | Self::TimedOut(val) => val,
        }
    }

    /// Returns `true` if this error is the `Cancelled` variant.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns `true` if this error is the `TimedOut` variant.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled(_) => write!(f, "put cancelled"),
            Self::TimedOut(_) => write!(f, "put timed out waiting for space"),
        }
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<T> std::error::Error for PutError<T> {}

/// Error returned by the blocking take variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    /// The operation's token fired.
    Cancelled,
    /// The wait deadline expired.
    TimedOut,
}

impl TakeError {
    /// Returns `true` if this error is the `Cancelled` variant.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this error is the `TimedOut` variant.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl fmt::Display for TakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "take cancelled"),
            Self::TimedOut => write!(f, "take timed out waiting for an element"),
        }
    }
}

impl std::error::Error for TakeError {}
