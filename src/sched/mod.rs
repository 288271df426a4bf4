// src/sched/mod.rs

//! Dependency scheduler: the fixed-interval poll that promotes waiting
//! tasks once their dependencies resolve.

pub mod scheduler;

pub(crate) use scheduler::poll_loop;
pub use scheduler::POLL_INTERVAL;
