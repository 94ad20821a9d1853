//! Shared helpers for the workspace: logging setup, thread signalling,
//! and bounded parallel fan-out.

pub mod atomic_float;
pub mod latch;
pub mod log_setup;
pub mod parallel;

pub use atomic_float::AtomicF64;
pub use latch::Latch;
pub use parallel::{FanOut, worker_count};
