#![deny(unused)]
//! Lifecycle engine for ephemeral test containers.
//!
//! Drives containers, networks and images on behalf of a test runner through
//! an [`EngineGateway`](testbed_core::EngineGateway).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Exec Orchestrator        Startup Checks      │
//! │    create → start → inspect   poll → classify │
//! │    ↓ captures output          ↓ throttled     │
//! ├───────────────────────────────────────────────┤
//! │  Output Demultiplexer     Image Cache         │
//! │    frames → per-type sinks    bulk → per-ref  │
//! ├───────────────────────────────────────────────┤
//! │  Network Lifecycle  →  Resource Reaper        │
//! ├───────────────────────────────────────────────┤
//! │  EngineGateway (bollard, mocks, ...)          │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use testbed_engine::{ExecOrchestrator, IsRunningStartupCheck, StartupChecker};
//!
//! let ready = StartupChecker::new(IsRunningStartupCheck)
//!     .wait_until_startup_successful(gateway.as_ref(), &container_id)
//!     .await?;
//!
//! let exec = ExecOrchestrator::new(gateway.clone());
//! let result = exec.exec_in_container(&container_id, &["echo", "hi"]).await?;
//! ```

pub mod capabilities;
pub mod exec;
pub mod images;
pub mod logs;
pub mod network;
pub mod output;
pub mod reaper;
pub mod startup;

pub use capabilities::EngineCapabilities;
pub use exec::ExecOrchestrator;
pub use images::{CacheMode, ImageCache};
pub use logs::{attach_output, follow_output, get_output};
pub use network::{Network, NetworkBuilder};
pub use output::{
    AttachedStream, ChainedConsumer, Demultiplexer, FnConsumer, FrameConsumer,
    FrameConsumerExt, LoggingConsumer, ToStringConsumer, WaitingConsumer,
};
pub use reaper::GatewayReaper;
pub use startup::{
    IsRunningStartupCheck, MinimumDurationRunningStartupCheck, OneShotStartupCheck,
    PollRateLimiter, StartupCheckStrategy, StartupChecker, StartupVerdict,
};
