//! Production implementations backed by Tokio.

use crate::{EngineContext, EnvError, EventEnvelope, EventTransport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::Instrument;

/// Production context backed by Tokio and the OS clock.
///
/// This is the "real" implementation used by the server binary.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("task", name = %name);
        tokio::spawn(future.instrument(span));
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

/// Transport that forwards envelopes into an unbounded tokio channel.
///
/// The hosting process owns the receiving end and fans envelopes out to
/// connections (or, in the reference server, prints them as JSON lines).
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl ChannelTransport {
    /// Creates a transport and the receiver its envelopes arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventTransport for ChannelTransport {
    async fn deliver(&self, envelope: EventEnvelope) -> Result<(), EnvError> {
        self.tx
            .send(envelope)
            .map_err(|_| EnvError::transport("subscriber channel closed"))
    }
}
