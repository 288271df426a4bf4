// src/config/mod.rs

//! TOML task-file surface for the CLI.
//!
//! This is a flat file of already-concrete tasks; the layered config
//! merging and `extend` resolution of a full editor integration is out of
//! scope and assumed to have happened before a file reaches this crate.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, TaskEntry};
