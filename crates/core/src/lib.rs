#![deny(unused)]
//! Core types, traits, and error definitions for Testbed.
//!
//! This crate provides the building blocks shared by the lifecycle engine and
//! the engine gateway implementations.

pub mod config;
pub mod error;
pub mod labels;
pub mod mocks;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
