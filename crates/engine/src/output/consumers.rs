//! Frame consumers: sinks that receive demultiplexed output frames.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use testbed_core::{Error, OutputEncoding, OutputFrame, Result};

// =============================================================================
// Consumer Trait
// =============================================================================

/// Receives frames of the output types it was registered for.
///
/// `accept` is called once per frame, in the order the engine emitted them.
/// `close` is called exactly once when the attached stream is released,
/// whether it ended, failed or was cancelled.
pub trait FrameConsumer: Send + Sync {
    fn accept(&self, frame: &OutputFrame) -> Result<()>;

    fn close(&self) {}
}

/// Composition helpers for concrete consumers.
pub trait FrameConsumerExt {
    /// Feed every frame to `self`, then to `next`.
    fn and_then(self, next: Arc<dyn FrameConsumer>) -> Arc<dyn FrameConsumer>;
}

impl<C: FrameConsumer + 'static> FrameConsumerExt for Arc<C> {
    fn and_then(self, next: Arc<dyn FrameConsumer>) -> Arc<dyn FrameConsumer> {
        Arc::new(ChainedConsumer::new(self, next))
    }
}

/// Two consumers behaving as one.
pub struct ChainedConsumer {
    first: Arc<dyn FrameConsumer>,
    second: Arc<dyn FrameConsumer>,
}

impl ChainedConsumer {
    pub fn new(first: Arc<dyn FrameConsumer>, second: Arc<dyn FrameConsumer>) -> Self {
        Self { first, second }
    }
}

impl FrameConsumer for ChainedConsumer {
    fn accept(&self, frame: &OutputFrame) -> Result<()> {
        self.first.accept(frame)?;
        self.second.accept(frame)
    }

    fn close(&self) {
        self.first.close();
        self.second.close();
    }
}

/// Adapts a closure into a consumer.
pub struct FnConsumer<F>(F);

impl<F> FnConsumer<F>
where
    F: Fn(&OutputFrame) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> FrameConsumer for FnConsumer<F>
where
    F: Fn(&OutputFrame) + Send + Sync,
{
    fn accept(&self, frame: &OutputFrame) -> Result<()> {
        (self.0)(frame);
        Ok(())
    }
}

// =============================================================================
// Accumulate-to-string
// =============================================================================

/// Buffers every byte it receives for rendering as text afterwards.
#[derive(Default)]
pub struct ToStringConsumer {
    buffer: Mutex<Vec<u8>>,
}

impl ToStringConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Render the bytes observed so far using `encoding`.
    pub fn to_string_with(&self, encoding: OutputEncoding) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        encoding.decode(&buffer)
    }

    pub fn to_utf8_string(&self) -> String {
        self.to_string_with(OutputEncoding::Utf8)
    }
}

impl FrameConsumer for ToStringConsumer {
    fn accept(&self, frame: &OutputFrame) -> Result<()> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&frame.payload);
        Ok(())
    }
}

// =============================================================================
// Block-until-complete
// =============================================================================

/// Output kept for waits that begin after it arrived.
const RETAINED_OUTPUT: usize = 64 * 1024;

#[derive(Default)]
struct WaitState {
    tail: Vec<u8>,
    frames: usize,
    ended: bool,
    next_watch: u64,
    watches: HashMap<u64, NeedleWatch>,
}

struct NeedleWatch {
    needle: Vec<u8>,
    found: bool,
}

impl WaitState {
    fn append(&mut self, payload: &[u8]) {
        let before = self.tail.len();
        self.tail.extend_from_slice(payload);
        for pending in self.watches.values_mut().filter(|w| !w.found) {
            // Rescan only the overlap a match could start in.
            let from = before.saturating_sub(pending.needle.len().saturating_sub(1));
            pending.found = contains(&self.tail[from..], &pending.needle);
        }
        if self.tail.len() > 2 * RETAINED_OUTPUT {
            let excess = self.tail.len() - RETAINED_OUTPUT;
            self.tail.drain(..excess);
        }
    }
}

/// Unregisters a needle when its wait finishes or is cancelled.
struct WatchGuard<'a> {
    state: &'a watch::Sender<WaitState>,
    id: u64,
}

impl Drop for WatchGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| {
            s.watches.remove(&self.id);
        });
    }
}

/// Lets a caller block until the stream ends or a byte sequence shows up.
///
/// Only the most recent 64 KiB of output is kept; a wait that begins later
/// searches that window and everything that arrives afterwards.
pub struct WaitingConsumer {
    state: watch::Sender<WaitState>,
}

impl Default for WaitingConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitingConsumer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WaitState::default());
        Self { state }
    }

    pub fn frames_seen(&self) -> usize {
        self.state.borrow().frames
    }

    pub fn has_ended(&self) -> bool {
        self.state.borrow().ended
    }

    /// Wait until the attached stream ends. `None` waits indefinitely.
    pub async fn wait_until_end(&self, timeout: Option<Duration>) -> Result<()> {
        let mut rx = self.state.subscribe();
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx.wait_for(|s| s.ended))
                .await
                .map_err(|_| Error::timeout(format!("stream did not end within {:?}", limit)))?
                .map(|_| ()),
            None => rx.wait_for(|s| s.ended).await.map(|_| ()),
        };
        outcome.map_err(|_| Error::internal("waiting consumer dropped"))
    }

    /// Wait until `needle` appears in the output.
    ///
    /// Fails with [`Error::StreamEnded`] if the stream ends first and with
    /// [`Error::Timeout`] if `timeout` elapses.
    pub async fn wait_until_output(&self, needle: &[u8], timeout: Duration) -> Result<()> {
        let mut rx = self.state.subscribe();
        let mut id = 0;
        self.state.send_modify(|s| {
            id = s.next_watch;
            s.next_watch += 1;
            let found = contains(&s.tail, needle);
            s.watches.insert(
                id,
                NeedleWatch {
                    needle: needle.to_vec(),
                    found,
                },
            );
        });
        let _guard = WatchGuard {
            state: &self.state,
            id,
        };

        let found = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| s.ended || s.watches.get(&id).is_some_and(|w| w.found)),
        )
        .await
        .map_err(|_| {
            Error::timeout(format!(
                "'{}' not observed within {:?}",
                String::from_utf8_lossy(needle),
                timeout
            ))
        })?
        .map(|s| s.watches.get(&id).is_some_and(|w| w.found))
        .map_err(|_| Error::internal("waiting consumer dropped"))?;

        if found {
            Ok(())
        } else {
            Err(Error::StreamEnded(format!(
                "'{}' never appeared in the output",
                String::from_utf8_lossy(needle)
            )))
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

impl FrameConsumer for WaitingConsumer {
    fn accept(&self, frame: &OutputFrame) -> Result<()> {
        self.state.send_modify(|s| {
            s.append(&frame.payload);
            s.frames += 1;
        });
        Ok(())
    }

    fn close(&self) {
        self.state.send_modify(|s| s.ended = true);
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Forwards container output to `tracing`, one event per line.
#[derive(Default)]
pub struct LoggingConsumer {
    prefix: Option<String>,
}

impl LoggingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl FrameConsumer for LoggingConsumer {
    fn accept(&self, frame: &OutputFrame) -> Result<()> {
        let text = frame.utf8_string();
        let prefix = self.prefix.as_deref().unwrap_or("container");
        for line in text.lines() {
            tracing::info!(target: "testbed::output", stream = %frame.kind, source = prefix, "{}", line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_consumer_renders_encoding() {
        let consumer = ToStringConsumer::new();
        consumer.accept(&OutputFrame::stdout(&b"caf"[..])).unwrap();
        consumer.accept(&OutputFrame::stdout(&[0xe9u8][..])).unwrap();
        assert_eq!(consumer.to_string_with(OutputEncoding::Latin1), "café");
        assert_eq!(consumer.to_utf8_string(), "caf\u{fffd}");
    }

    #[test]
    fn test_chained_consumer_feeds_both() {
        let a = Arc::new(ToStringConsumer::new());
        let b = Arc::new(WaitingConsumer::new());
        let chained = a.clone().and_then(b.clone());
        chained.accept(&OutputFrame::stderr("x")).unwrap();
        chained.close();
        assert_eq!(a.to_utf8_string(), "x");
        assert_eq!(b.frames_seen(), 1);
        assert!(b.has_ended());
    }

    #[tokio::test]
    async fn test_wait_until_end_times_out() {
        let waiter = WaitingConsumer::new();
        let err = waiter
            .wait_until_end(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_wait_until_end_released_by_close() {
        let waiter = Arc::new(WaitingConsumer::new());
        let closer = waiter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
        });
        waiter
            .wait_until_end(Some(Duration::from_secs(5)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_output_spans_frames() {
        let waiter = WaitingConsumer::new();
        waiter.accept(&OutputFrame::stdout("database sys")).unwrap();
        waiter.accept(&OutputFrame::stdout("tem is ready")).unwrap();
        waiter
            .wait_until_output(b"system is ready", Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_output_stream_ended_first() {
        let waiter = WaitingConsumer::new();
        waiter.accept(&OutputFrame::stdout("booting")).unwrap();
        waiter.close();
        let err = waiter
            .wait_until_output(b"ready", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamEnded(_)));
    }

    #[tokio::test]
    async fn test_wait_until_output_keeps_bounded_tail() {
        let waiter = Arc::new(WaitingConsumer::new());
        let pending = {
            let waiter = waiter.clone();
            tokio::spawn(async move {
                waiter
                    .wait_until_output(b"ready", Duration::from_secs(1))
                    .await
            })
        };
        while waiter.state.borrow().watches.is_empty() {
            tokio::task::yield_now().await;
        }

        // All frames land before the waiting task is polled again, so the
        // match must be recorded on arrival.
        let filler = vec![b'.'; 1024];
        for i in 0..300 {
            waiter.accept(&OutputFrame::stdout(filler.clone())).unwrap();
            if i == 10 {
                waiter.accept(&OutputFrame::stdout("rea")).unwrap();
                waiter.accept(&OutputFrame::stdout("dy")).unwrap();
            }
        }
        assert!(waiter.state.borrow().tail.len() <= 2 * RETAINED_OUTPUT);

        pending.await.unwrap().unwrap();
        assert!(waiter.state.borrow().watches.is_empty());

        waiter.accept(&OutputFrame::stdout("listening")).unwrap();
        waiter
            .wait_until_output(b"listening", Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[test]
    fn test_fn_consumer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = FnConsumer::new(move |f: &OutputFrame| {
            sink.lock().unwrap().push(f.kind);
        });
        consumer.accept(&OutputFrame::stdout("a")).unwrap();
        consumer.accept(&OutputFrame::stderr("b")).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![testbed_core::OutputType::Stdout, testbed_core::OutputType::Stderr]
        );
    }
}
