// src/state/mod.rs

//! Task registry / state store.
//!
//! - [`lifecycle`] defines the task lifecycle enum and its transition rules.
//! - [`registry`] owns the mutable per-batch state of every task instance:
//!   lifecycle state, accumulated output, timestamps, dependency snapshot,
//!   and callback lineage.

pub mod lifecycle;
pub mod registry;

pub use lifecycle::TaskLifecycle;
pub use registry::{SharedRegistry, TaskRecord, TaskRegistry, TaskSnapshot};
