// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`process`] owns the process manager: it spawns task commands via
//!   `tokio::process::Command`, streams their output into the registry, and
//!   tracks live handles so they can be killed.
//! - [`executor`] drives one task definition to completion and hands off to
//!   the callback system.

pub mod executor;
pub mod process;

pub use process::{CommandEnd, ProcessManager};
