//! Outbound event transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::EventEnvelope;

/// Abstraction for delivering outbound room events to subscribers.
///
/// Framing, connection tracking and room membership live on the far side of
/// this trait. The engine only decides *who* should see an event
/// (see [`crate::Audience`]) and hands over an opaque envelope.
///
/// # Implementations
///
/// - **Production**: `ChannelTransport`, forwarding into a tokio channel that
///   the hosting process drains onto its sockets or stdout
/// - **Simulation**: `SimTransport`, recording every envelope for assertions
///
/// # Event Flow
///
/// ```text
/// Room task                   Transport                  Subscribers
///   |                             |                          |
///   |-- deliver(envelope) ------->|                          |
///   |                             |-- [fan out by audience] ->|
/// ```
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Delivers one envelope.
    ///
    /// # Returns
    /// * `Ok(())` - Envelope accepted for delivery
    /// * `Err(EnvError::TransportError)` - Immediate failure (e.g. receiver dropped)
    ///
    /// # Note
    /// Delivery is best effort. A failed delivery never rolls back engine state.
    async fn deliver(&self, envelope: EventEnvelope) -> Result<(), EnvError>;

    /// Delivers a batch of envelopes in order, stopping at the first failure.
    ///
    /// # Returns
    /// Number of envelopes accepted.
    async fn deliver_all(&self, envelopes: Vec<EventEnvelope>) -> Result<usize, EnvError> {
        let mut delivered = 0;
        for envelope in envelopes {
            self.deliver(envelope).await?;
            delivered += 1;
        }
        Ok(delivered)
    }
}
