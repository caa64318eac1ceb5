//! Civitas Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing Civitas room
//! engines to run in both **Production** (tokio) and **Simulation**
//! (virtual clock) environments.
//!
//! # Core Concept
//!
//! The engine never touches a clock, a socket or a task spawner directly:
//! - Time (`now()`, `sleep()`) drives lock deadlines and economy ticks
//! - Transport (`deliver()`) carries outbound events to room subscribers
//! - Spawning (`spawn()`) schedules deferred lock expiry
//!
//! Swapping the context for a virtual clock makes every room run
//! reproducible from a single seed.
//!
//! # Example
//!
//! ```ignore
//! use civitas_env::{EngineContext, EventTransport};
//!
//! async fn room_loop<Ctx: EngineContext, T: EventTransport>(ctx: &Ctx, transport: &T) {
//!     loop {
//!         tokio::select! {
//!             cmd = inbox.recv() => handle(cmd),
//!             _ = ctx.sleep(Duration::from_secs(1)) => tick(),
//!         }
//!     }
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;

pub use context::EngineContext;
pub use transport::EventTransport;
pub use types::{Audience, EventEnvelope, PlayerId, RoomCode};
pub use error::EnvError;
pub use tokio_impl::{ChannelTransport, TokioContext};
