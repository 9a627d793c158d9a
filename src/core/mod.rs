//! Core deterministic primitives.
//!
//! Nothing in this module reads the system clock or global randomness.

pub mod clock;
pub mod rng;

// Re-export core types
pub use clock::{DueTimer, Millis, Scheduler, TimerHandle};
pub use rng::{derive_session_seed, DeterministicRng};
