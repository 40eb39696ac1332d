//! Container output helpers built on the demultiplexer.

use std::sync::Arc;

use testbed_core::{EngineGateway, LogsRequest, OutputType, Result};

use crate::output::{
    AttachedStream, Demultiplexer, FrameConsumer, FrameConsumerExt, ToStringConsumer,
    WaitingConsumer,
};

const ALL_TYPES: [OutputType; 2] = [OutputType::Stdout, OutputType::Stderr];

/// Attach `demux` to the container's output from the beginning. Only the
/// output types it has consumers for are requested.
pub async fn attach_output(
    gateway: &dyn EngineGateway,
    container_id: &str,
    demux: Demultiplexer,
    follow: bool,
) -> Result<AttachedStream> {
    let request = LogsRequest::new(container_id)
        .with_follow(follow)
        .with_since(0)
        .with_stdout(demux.is_registered(OutputType::Stdout))
        .with_stderr(demux.is_registered(OutputType::Stderr));
    let stream = gateway.logs(&request).await?;
    Ok(demux.attach(stream))
}

/// Stream the container's output into `consumer` as it is produced.
/// An empty `types` means both stdout and stderr.
pub async fn follow_output(
    gateway: &dyn EngineGateway,
    container_id: &str,
    consumer: Arc<dyn FrameConsumer>,
    types: &[OutputType],
) -> Result<AttachedStream> {
    let types = if types.is_empty() { &ALL_TYPES[..] } else { types };
    let demux = Demultiplexer::new().with_consumer_for(types, consumer);
    attach_output(gateway, container_id, demux, true).await
}

/// Output produced so far, as UTF-8 text.
pub async fn get_output(
    gateway: &dyn EngineGateway,
    container_id: &str,
    types: &[OutputType],
) -> Result<String> {
    let types = if types.is_empty() { &ALL_TYPES[..] } else { types };
    let text = Arc::new(ToStringConsumer::new());
    let waiter = Arc::new(WaitingConsumer::new());
    let demux = Demultiplexer::new().with_consumer_for(types, text.clone().and_then(waiter.clone()));

    let attached = attach_output(gateway, container_id, demux, false).await?;
    waiter.wait_until_end(None).await?;
    attached.close().await?;
    Ok(text.to_utf8_string())
}
