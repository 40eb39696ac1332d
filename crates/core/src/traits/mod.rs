//! Core traits for Testbed.
//!
//! - `gateway`: the engine gateway every component issues remote intents through
//! - `reaper`: best-effort reclamation of leaked resources

pub mod gateway;
pub mod reaper;

pub use gateway::*;
pub use reaper::*;
