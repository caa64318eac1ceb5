//! Civitas Deterministic Simulation Testing (DST) Harness
//!
//! Runs whole rooms on a virtual clock so that every contention, outage and
//! refund path can be replayed from a single seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock that only moves when the harness advances it
//! - **Timers**: lock expiries sit in a time-ordered schedule, not spawned tasks
//! - **Randomness**: player ids, terrain and action streams all derive from one 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock + seeded RNG)              │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │  Room   │              │  Room   │     ...               │
//! │  │ CONTEST │              │  BURST  │                       │
//! │  └────┬────┘              └────┬────┘                       │
//! │       │    outbox envelopes    │                            │
//! │  ┌────▼────────────────────────▼────┐                       │
//! │  │          SimTransport             │                       │
//! │  │   (records every delivery)        │                       │
//! │  └───────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use civitas_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_ticks(20).run(ScenarioId::PowerOutageCascade);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod invariants;
mod runner;
mod terrain;
mod transport;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{PlayerFrame, RoomFrame, SimEvent, SimExport, SimFrame};
pub use invariants::{check_room, InvariantViolation};
pub use runner::{ScenarioFailure, ScenarioResult, ScenarioRunner};
pub use terrain::{TerrainGenerator, TerrainMix};
pub use transport::SimTransport;
pub use world::{SimConfig, SimMetrics, SimWorld};
