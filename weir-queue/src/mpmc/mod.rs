//! Multi-producer multi-consumer (MPMC) queues.
//!
//! Any number of threads may clone a queue handle and call the put/take
//! families concurrently. The only variant is [`bounded`]: fixed capacity,
//! blocking semantics, configurable wakeup fairness.

pub mod bounded;
