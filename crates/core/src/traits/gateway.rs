//! Engine gateway contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ContainerInfo, CreateExecRequest, CreateNetworkRequest, EngineInfo, ExecInspect,
    FrameStream, ImageInspect, ImageSummary, LogsRequest,
};

/// Abstract interface to a container-engine daemon.
///
/// Each method is one remote intent, executed once. Implementations map
/// daemon "not found" replies to [`crate::Error::NotFound`] and operations
/// the provider cannot perform to [`crate::Error::Unsupported`].
#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// Engine-wide information used for capability probing.
    async fn info(&self) -> Result<EngineInfo>;

    /// Inspect a container, including its current state.
    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInfo>;

    /// Create an exec instance and return its id.
    async fn create_exec(&self, request: &CreateExecRequest) -> Result<String>;

    /// Start an exec instance and attach to its multiplexed output.
    async fn start_exec(&self, exec_id: &str) -> Result<FrameStream>;

    /// Inspect an exec instance (exit code once finished).
    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecInspect>;

    /// List local images.
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Inspect a single image by reference.
    async fn inspect_image(&self, reference: &str) -> Result<ImageInspect>;

    /// Create a network and return its id.
    async fn create_network(&self, request: &CreateNetworkRequest) -> Result<String>;

    /// Remove a network by id.
    async fn remove_network(&self, network_id: &str) -> Result<()>;

    /// Fetch a container's output as a frame stream.
    async fn logs(&self, request: &LogsRequest) -> Result<FrameStream>;
}
