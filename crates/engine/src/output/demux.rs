//! Stream demultiplexer.
//!
//! Reads one interleaved frame stream and fans each frame out to the consumers
//! registered for its output type.

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use testbed_core::{Error, FrameStream, OutputType, Result};

use super::consumers::FrameConsumer;

/// Routing table from output type to consumers.
#[derive(Default)]
pub struct Demultiplexer {
    routes: Vec<(OutputType, Arc<dyn FrameConsumer>)>,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` for frames of `kind`.
    pub fn with_consumer(mut self, kind: OutputType, consumer: Arc<dyn FrameConsumer>) -> Self {
        self.routes.push((kind, consumer));
        self
    }

    /// Register `consumer` for each of `kinds`. It is still closed only once.
    pub fn with_consumer_for(
        mut self,
        kinds: &[OutputType],
        consumer: Arc<dyn FrameConsumer>,
    ) -> Self {
        for kind in kinds {
            self.routes.push((*kind, consumer.clone()));
        }
        self
    }

    pub fn is_registered(&self, kind: OutputType) -> bool {
        self.routes.iter().any(|(k, _)| *k == kind)
    }

    /// Start pumping `stream` into the registered consumers.
    ///
    /// Must be called within a tokio runtime.
    pub fn attach(self, stream: FrameStream) -> AttachedStream {
        AttachedStream {
            task: Some(tokio::spawn(pump(stream, self.routes))),
        }
    }
}

async fn pump(
    mut stream: FrameStream,
    routes: Vec<(OutputType, Arc<dyn FrameConsumer>)>,
) -> Result<()> {
    let _release = CloseOnDrop::new(&routes);

    while let Some(item) = stream.next().await {
        let frame = item.inspect_err(|e| {
            tracing::debug!(error = %e, "Frame stream failed");
        })?;
        for (kind, consumer) in &routes {
            if *kind == frame.kind {
                consumer.accept(&frame)?;
            }
        }
    }

    tracing::trace!("Frame stream reached end of input");
    Ok(())
}

/// Closes every distinct consumer exactly once when the pump stops, including
/// when its task is aborted.
struct CloseOnDrop {
    consumers: Vec<Arc<dyn FrameConsumer>>,
}

impl CloseOnDrop {
    fn new(routes: &[(OutputType, Arc<dyn FrameConsumer>)]) -> Self {
        let mut consumers: Vec<Arc<dyn FrameConsumer>> = Vec::new();
        for (_, consumer) in routes {
            if !consumers.iter().any(|c| Arc::ptr_eq(c, consumer)) {
                consumers.push(consumer.clone());
            }
        }
        Self { consumers }
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        for consumer in &self.consumers {
            consumer.close();
        }
    }
}

/// Scoped handle on a running demultiplexer.
///
/// Dropping the handle cancels the pump; consumers are closed either way.
pub struct AttachedStream {
    task: Option<JoinHandle<Result<()>>>,
}

impl AttachedStream {
    /// Whether the underlying stream has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the stream to end on its own, returning any transport or
    /// consumer failure.
    pub async fn await_completion(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => join(task).await,
            None => Ok(()),
        }
    }

    /// Stop the pump if still running. Every consumer has been closed by the
    /// time this returns.
    pub async fn close(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => {
                task.abort();
                join(task).await
            }
            None => Ok(()),
        }
    }
}

async fn join(task: JoinHandle<Result<()>>) -> Result<()> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(Error::consumer(format!("frame pump panicked: {}", e))),
    }
}

impl Drop for AttachedStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
