//! Civitas Core - Authoritative Room Engine for Multiplayer City Building
//!
//! This library arbitrates concurrently submitted player actions against a
//! shared city grid and runs the room's economy:
//! 1. **Arbitration**: a priority queue drained to empty on every submission,
//!    an ordered validator (turn, coordinate lock, affordability) and an
//!    all-or-nothing executor
//! 2. **Economy**: a fixed-interval tick over a chained resource economy whose
//!    derived classes are gated on their inputs and on power
//! 3. **Operability**: power outages knock out the roads around a player's
//!    zones, which drops those zones from the economy until power returns

pub mod action;
pub mod config;
pub mod costs;
pub mod economy;
pub mod error;
pub mod events;
pub mod executor;
pub mod grid;
pub mod ledger;
pub mod locks;
pub mod operability;
pub mod queue;
pub mod resources;
pub mod room;
pub mod runtime;
pub mod session;
pub mod turn;
pub mod validator;

// Re-export key types for convenience
pub use action::{Action, ActionId, ActionKind, ActionPayload, ActionSubmission, MalformedAction};
pub use config::{ConfigError, EngineConfig};
pub use costs::{AffordabilityHint, BuildCostTable};
pub use economy::{Census, EconomyRates, EconomyTicker, PoolTick};
pub use error::{RuntimeError, SessionError};
pub use events::{Delivery, OutboundEvent, PlayerInfo};
pub use grid::{BuildingCell, BuildingKind, CityGrid, Coord};
pub use ledger::{LedgerError, PoolSnapshot, ResourceLedger, ResourcePool};
pub use locks::{CoordinateLockTable, LockTicket};
pub use operability::{OperabilityChange, OperabilityPropagator};
pub use resources::{ResourceBundle, ResourceKind};
pub use room::{Room, RoomSnapshot, TickReport};
pub use runtime::{RoomCommand, RoomHandle, RoomRuntime, RoomStatus};
pub use session::SessionManager;
pub use turn::TurnController;
pub use validator::RejectionReason;
