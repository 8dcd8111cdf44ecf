//! Reclaim Core
//!
//! Core domain types, traits, and error handling for Reclaim.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the scheduler, the candidate cache and the worker adapters.

pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod ports;

pub use error::{Error, Result};
pub use ids::*;
