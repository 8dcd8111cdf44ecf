//! Batch recovery scheduling for Reclaim.
//!
//! Jobs are queued by priority and handed to workers up to a concurrency
//! bound. Failed attempts are retried, successful ones feed the pattern store
//! and the candidate cache so later jobs start from better guesses.

pub mod config;
pub mod queue;
pub mod scheduler;
pub mod tuning;

pub use config::{RetryPriority, SchedulerConfig};
pub use queue::JobQueue;
pub use scheduler::{BatchScheduler, JobRequest, SchedulerStatus};
pub use tuning::{MIN_APPLY_SUCCESS_RATE, apply_learned_patterns, prepend_candidate};
