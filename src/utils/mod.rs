//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Process output helpers shared by executors

pub mod command;
