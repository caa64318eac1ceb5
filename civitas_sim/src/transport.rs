//! Simulated event transport that records every envelope.

use async_trait::async_trait;
use civitas_core::{Delivery, OutboundEvent};
use civitas_env::{Audience, EnvError, EventEnvelope, EventTransport, PlayerId};
use std::sync::{Arc, Mutex};

/// Recording transport for simulation runs.
///
/// Envelopes are kept in delivery order. A transport can be told to fail,
/// which lets scenarios check that a broken subscriber never affects room
/// state.
#[derive(Clone, Default)]
pub struct SimTransport {
    log: Arc<Mutex<Vec<EventEnvelope>>>,
    failing: Arc<Mutex<bool>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Makes every subsequent delivery fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    /// Synchronous delivery used by the single-threaded sim loop.
    pub fn record(&self, envelope: EventEnvelope) -> Result<(), EnvError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(EnvError::transport("simulated subscriber failure"));
        }
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(envelope);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Decoded events that `player` would have seen, in order.
    pub fn visible_to(&self, player: PlayerId) -> Vec<OutboundEvent> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|envelope| envelope.is_visible_to(player))
            .filter_map(|envelope| Delivery::decode(envelope).ok())
            .collect()
    }

    /// Every decoded event with its audience.
    pub fn events(&self) -> Vec<(Audience, OutboundEvent)> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|envelope| Delivery::decode(envelope).ok().map(|event| (envelope.audience, event)))
            .collect()
    }
}

#[async_trait]
impl EventTransport for SimTransport {
    async fn deliver(&self, envelope: EventEnvelope) -> Result<(), EnvError> {
        self.record(envelope)
    }
}
