//! Core type definitions for Testbed.
//!
//! Value objects exchanged between the engine gateway and the components
//! that drive container lifecycles.

pub mod container;
pub mod exec;
pub mod frame;
pub mod image;
pub mod info;
pub mod logs;
pub mod network;

pub use container::*;
pub use exec::*;
pub use frame::*;
pub use image::*;
pub use info::*;
pub use logs::*;
pub use network::*;
