//! Mock implementations of core traits for testing.
//!
//! `MockGateway` plays back scripted engine replies and records every intent
//! it receives, so components can be exercised without a Docker daemon.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::{
    traits::{EngineGateway, ResourceReaper},
    types::{
        ContainerInfo, ContainerState, CreateExecRequest, CreateNetworkRequest, EngineInfo,
        ExecInspect, FrameStream, ImageInspect, ImageSummary, LogsRequest, OutputFrame,
    },
    Error, Result,
};

// =============================================================================
// Mock Engine Gateway
// =============================================================================

/// One intent received by [`MockGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Info,
    InspectContainer(String),
    CreateExec(CreateExecRequest),
    StartExec(String),
    InspectExec(String),
    ListImages,
    InspectImage(String),
    CreateNetwork(CreateNetworkRequest),
    RemoveNetwork(String),
    Logs(LogsRequest),
}

#[derive(Default)]
struct MockState {
    info: EngineInfo,
    /// Per-container state script; the last state repeats forever.
    containers: HashMap<String, VecDeque<ContainerState>>,
    container_inspect_unsupported: bool,
    exec_id: Option<String>,
    exec_frames: Vec<OutputFrame>,
    exec_stream_error: Option<String>,
    exec_exit_code: Option<i64>,
    /// `None` means the provider cannot list images.
    images: Option<Vec<ImageSummary>>,
    inspected_images: HashMap<String, ImageInspect>,
    image_inspect_unsupported: bool,
    log_frames: Vec<OutputFrame>,
    network_delay: Duration,
    network_seq: usize,
    calls: Vec<(Instant, GatewayCall)>,
}

/// Scripted engine gateway.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the states returned by successive inspections of `container_id`.
    pub fn with_container_states(self, container_id: &str, states: Vec<ContainerState>) -> Self {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(container_id.to_string(), states.into());
        self
    }

    /// Shorthand for a container that is always running.
    pub fn with_running_container(self, container_id: &str) -> Self {
        self.with_container_states(
            container_id,
            vec![ContainerState::running_since(chrono::Utc::now())],
        )
    }

    pub fn with_container_inspect_unsupported(self) -> Self {
        self.state.lock().unwrap().container_inspect_unsupported = true;
        self
    }

    pub fn with_info(self, info: EngineInfo) -> Self {
        self.state.lock().unwrap().info = info;
        self
    }

    /// Script the next exec: its id, output frames and final exit code.
    pub fn with_exec(self, exec_id: &str, frames: Vec<OutputFrame>, exit_code: i64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.exec_id = Some(exec_id.to_string());
            state.exec_frames = frames;
            state.exec_exit_code = Some(exit_code);
        }
        self
    }

    /// Make the exec output stream fail after its scripted frames.
    pub fn with_exec_stream_error(self, message: &str) -> Self {
        self.state.lock().unwrap().exec_stream_error = Some(message.to_string());
        self
    }

    pub fn with_images(self, images: Vec<ImageSummary>) -> Self {
        self.state.lock().unwrap().images = Some(images);
        self
    }

    pub fn with_image_inspect_unsupported(self) -> Self {
        self.state.lock().unwrap().image_inspect_unsupported = true;
        self
    }

    pub fn with_inspected_image(self, reference: &str, image: ImageInspect) -> Self {
        self.set_inspected_image(reference, Some(image));
        self
    }

    /// Add or remove the image returned for `reference` while a test runs.
    pub fn set_inspected_image(&self, reference: &str, image: Option<ImageInspect>) {
        let mut state = self.state.lock().unwrap();
        match image {
            Some(image) => {
                state.inspected_images.insert(reference.to_string(), image);
            }
            None => {
                state.inspected_images.remove(reference);
            }
        }
    }

    pub fn with_log_frames(self, frames: Vec<OutputFrame>) -> Self {
        self.state.lock().unwrap().log_frames = frames;
        self
    }

    /// Delay every create-network reply, widening race windows in tests.
    pub fn with_network_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().network_delay = delay;
        self
    }

    /// All intents received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Number of received intents matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(_, call)| predicate(call))
            .count()
    }

    /// When each container inspection was received.
    pub fn inspect_container_times(&self) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(_, call)| matches!(call, GatewayCall::InspectContainer(_)))
            .map(|(at, _)| *at)
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push((Instant::now(), call));
    }
}

/// Listing entry for an image with the given tags.
pub fn image_summary(id: &str, repo_tags: &[&str]) -> ImageSummary {
    ImageSummary {
        id: id.to_string(),
        repo_tags: Some(repo_tags.iter().map(|t| t.to_string()).collect()),
        created: 1_700_000_000,
        raw: serde_json::json!({ "Id": id, "RepoTags": repo_tags }),
    }
}

/// Inspect reply for an image with the given tags.
pub fn image_inspect(id: &str, repo_tags: &[&str]) -> ImageInspect {
    ImageInspect {
        id: id.to_string(),
        repo_tags: repo_tags.iter().map(|t| t.to_string()).collect(),
        created: None,
        raw: serde_json::json!({ "Id": id, "RepoTags": repo_tags }),
    }
}

#[async_trait]
impl EngineGateway for MockGateway {
    async fn info(&self) -> Result<EngineInfo> {
        self.record(GatewayCall::Info);
        Ok(self.state.lock().unwrap().info.clone())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInfo> {
        self.record(GatewayCall::InspectContainer(container_id.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.container_inspect_unsupported {
            return Err(Error::unsupported("container inspection"));
        }
        let script = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| Error::not_found(format!("container {}", container_id)))?;
        let current = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        Ok(ContainerInfo {
            id: container_id.to_string(),
            name: format!("/{}", container_id),
            state: current.unwrap_or_default(),
        })
    }

    async fn create_exec(&self, request: &CreateExecRequest) -> Result<String> {
        self.record(GatewayCall::CreateExec(request.clone()));
        self.state
            .lock()
            .unwrap()
            .exec_id
            .clone()
            .ok_or_else(|| Error::engine("no exec scripted"))
    }

    async fn start_exec(&self, exec_id: &str) -> Result<FrameStream> {
        self.record(GatewayCall::StartExec(exec_id.to_string()));
        let state = self.state.lock().unwrap();
        let mut items: Vec<Result<OutputFrame>> =
            state.exec_frames.iter().cloned().map(Ok).collect();
        if let Some(message) = &state.exec_stream_error {
            items.push(Err(Error::engine(message.clone())));
        }
        Ok(futures::stream::iter(items).boxed())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecInspect> {
        self.record(GatewayCall::InspectExec(exec_id.to_string()));
        Ok(ExecInspect {
            running: false,
            exit_code: self.state.lock().unwrap().exec_exit_code,
        })
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.record(GatewayCall::ListImages);
        self.state
            .lock()
            .unwrap()
            .images
            .clone()
            .ok_or_else(|| Error::unsupported("image listing"))
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageInspect> {
        self.record(GatewayCall::InspectImage(reference.to_string()));
        let state = self.state.lock().unwrap();
        if state.image_inspect_unsupported {
            return Err(Error::unsupported("image inspection"));
        }
        state
            .inspected_images
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("image {}", reference)))
    }

    async fn create_network(&self, request: &CreateNetworkRequest) -> Result<String> {
        self.record(GatewayCall::CreateNetwork(request.clone()));
        let (delay, seq) = {
            let mut state = self.state.lock().unwrap();
            state.network_seq += 1;
            (state.network_delay, state.network_seq)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(format!("net-{}", seq))
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        self.record(GatewayCall::RemoveNetwork(network_id.to_string()));
        Ok(())
    }

    async fn logs(&self, request: &LogsRequest) -> Result<FrameStream> {
        self.record(GatewayCall::Logs(request.clone()));
        let frames: Vec<Result<OutputFrame>> = self
            .state
            .lock()
            .unwrap()
            .log_frames
            .iter()
            .filter(|f| match f.kind {
                crate::types::OutputType::Stdout => request.stdout,
                crate::types::OutputType::Stderr => request.stderr,
            })
            .cloned()
            .map(Ok)
            .collect();
        Ok(futures::stream::iter(frames).boxed())
    }
}

// =============================================================================
// Mock Resource Reaper
// =============================================================================

/// Reaper that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingReaper {
    registered: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingReaper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceReaper for RecordingReaper {
    fn register_network(&self, network_id: &str) {
        self.registered
            .lock()
            .unwrap()
            .push(network_id.to_string());
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        self.removed.lock().unwrap().push(network_id.to_string());
        Ok(())
    }
}
