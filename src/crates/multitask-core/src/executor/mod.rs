//! Pipeline Execution Module
//!
//! Engines wrap the stepping interpreter with a [`FanOut`](crate::FanOut)
//! deciding where ParallelMap elements run. This crate ships the in-process
//! engine; the distributed engine lives in `multitask-distributed`.

pub mod single_thread;

pub use single_thread::{run_single_thread, SingleThreadExecutor};
