//! Room Runtime - hosts one [`Room`] inside a single task.
//!
//! This module is the integration layer between the synchronous room engine
//! and the environment abstraction (`EngineContext` + `EventTransport`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RoomRuntime                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: EngineContext                  │   │
//! │  │  • now() → lock deadlines                            │   │
//! │  │  • sleep() → economy tick schedule, lock expiry      │   │
//! │  │  • spawn() → deferred expiry messages                │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │        RoomCommand ──► ┌──────┐ ──► outbox ──► Transport     │
//! │        tick ─────────► │ Room │                              │
//! │        ExpireLock ───► └──────┘                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation of the room happens on the runtime task, one command at a
//! time. Lock expiry timers run as separate tasks that only post an
//! `ExpireLock` message back through the inbox.
//!
//! # Usage
//!
//! ```ignore
//! use civitas_core::runtime::RoomRuntime;
//! use civitas_env::{ChannelTransport, TokioContext};
//!
//! let (transport, mut events) = ChannelTransport::new();
//! let handle = RoomRuntime::spawn(room, TokioContext::shared(), Arc::new(transport));
//! handle.join(player, "alice").await?;
//! handle.submit(ActionSubmission::advance_turn(player))?;
//! ```

use crate::action::ActionSubmission;
use crate::error::RuntimeError;
use crate::locks::LockTicket;
use crate::room::{Room, RoomSnapshot};
use crate::error::SessionError;
use civitas_env::{EngineContext, EnvError, EventTransport, PlayerId, RoomCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Messages accepted by a room's task.
#[derive(Debug)]
pub enum RoomCommand {
    Submit(ActionSubmission),
    Join {
        player: PlayerId,
        name: String,
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },
    Leave {
        player: PlayerId,
    },
    /// Posted by a lock's expiry timer
    ExpireLock(LockTicket),
    Snapshot(oneshot::Sender<RoomSnapshot>),
    Status(oneshot::Sender<RoomStatus>),
    Shutdown,
}

/// Point-in-time summary of a running room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub code: RoomCode,
    pub players: usize,
    pub turn_index: usize,
    pub current_player: Option<PlayerId>,
    /// Lock entries still stored, lapsed or not
    pub stored_locks: usize,
    pub tick_count: u64,
}

/// Cloneable sending side of a room's inbox.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: RoomCode,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// True once the room task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: RoomCommand) -> Result<(), EnvError> {
        self.tx
            .send(command)
            .map_err(|_| EnvError::room_closed(&self.code))
    }

    pub fn submit(&self, submission: ActionSubmission) -> Result<(), EnvError> {
        self.send(RoomCommand::Submit(submission))
    }

    pub async fn join(&self, player: PlayerId, name: impl Into<String>) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            player,
            name: name.into(),
            reply,
        })?;
        let joined = rx.await.map_err(|_| EnvError::room_closed(&self.code))??;
        Ok(joined)
    }

    pub fn leave(&self, player: PlayerId) -> Result<(), EnvError> {
        self.send(RoomCommand::Leave { player })
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, EnvError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot(tx))?;
        rx.await.map_err(|_| EnvError::room_closed(&self.code))
    }

    pub async fn status(&self) -> Result<RoomStatus, EnvError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomCommand::Status(tx))?;
        rx.await.map_err(|_| EnvError::room_closed(&self.code))
    }

    pub fn shutdown(&self) -> Result<(), EnvError> {
        self.send(RoomCommand::Shutdown)
    }
}

/// A room plus the environment it runs in.
///
/// Generic over the context and transport implementations, allowing the
/// same room code to run in production (tokio) or simulation.
pub struct RoomRuntime<Ctx, T>
where
    Ctx: EngineContext,
    T: EventTransport,
{
    room: Room,
    context: Arc<Ctx>,
    transport: Arc<T>,
    inbox: mpsc::UnboundedReceiver<RoomCommand>,
    /// Weak so pending expiry timers do not keep the room alive
    expiry_tx: mpsc::WeakUnboundedSender<RoomCommand>,
}

impl<Ctx, T> RoomRuntime<Ctx, T>
where
    Ctx: EngineContext,
    T: EventTransport,
{
    pub fn new(room: Room, context: Arc<Ctx>, transport: Arc<T>) -> (Self, RoomHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let handle = RoomHandle {
            code: room.code().clone(),
            tx: tx.clone(),
        };
        let runtime = Self {
            room,
            context,
            transport,
            inbox,
            expiry_tx: tx.downgrade(),
        };
        (runtime, handle)
    }

    /// Starts the room on the context's spawner and returns its handle.
    pub fn spawn(room: Room, context: Arc<Ctx>, transport: Arc<T>) -> RoomHandle {
        let name = format!("room-{}", room.code());
        let spawner = Arc::clone(&context);
        let (runtime, handle) = Self::new(room, context, transport);
        spawner.spawn(&name, runtime.run());
        handle
    }

    /// Runs until shutdown, until every handle is dropped, or until the last
    /// player leaves.
    pub async fn run(mut self) {
        let interval = self.room.config().tick_interval();
        let mut next_tick = self.context.now() + interval;
        info!(room = %self.room.code(), interval_ms = interval.as_millis() as u64, "Room runtime started");

        loop {
            let wait = next_tick.saturating_sub(self.context.now());
            tokio::select! {
                command = self.inbox.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command) {
                        self.flush().await;
                        break;
                    }
                }
                _ = self.context.sleep(wait) => {
                    self.room.tick(self.context.now());
                    next_tick += interval;
                }
            }
            self.schedule_expiries();
            self.flush().await;
        }

        info!(room = %self.room.code(), ticks = self.room.tick_count(), "Room runtime stopped");
    }

    /// Applies one command. Returns false when the runtime should stop.
    fn handle(&mut self, command: RoomCommand) -> bool {
        let now = self.context.now();
        match command {
            RoomCommand::Submit(submission) => {
                self.room.submit(submission, now);
            }
            RoomCommand::Join { player, name, reply } => {
                let result = self.room.join(player, name);
                if let Err(err) = &result {
                    debug!(room = %self.room.code(), player = %player, error = %err, "Join refused");
                }
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player } => {
                self.room.leave(player);
                if self.room.is_empty() {
                    return false;
                }
            }
            RoomCommand::ExpireLock(ticket) => {
                self.room.expire_lock(ticket);
            }
            RoomCommand::Snapshot(reply) => {
                let _ = reply.send(self.room.snapshot());
            }
            RoomCommand::Status(reply) => {
                let _ = reply.send(RoomStatus {
                    code: self.room.code().clone(),
                    players: self.room.players().len(),
                    turn_index: self.room.turns().index(),
                    current_player: self.room.turns().current(),
                    stored_locks: self.room.locks().len(),
                    tick_count: self.room.tick_count(),
                });
            }
            RoomCommand::Shutdown => return false,
        }
        true
    }

    fn schedule_expiries(&mut self) {
        let ttl = self.room.config().lock_ttl();
        for ticket in self.room.take_scheduled_locks() {
            let context = Arc::clone(&self.context);
            let tx = self.expiry_tx.clone();
            self.context.spawn("lock-expiry", async move {
                context.sleep(ttl).await;
                if let Some(tx) = tx.upgrade() {
                    let _ = tx.send(RoomCommand::ExpireLock(ticket));
                }
            });
        }
    }

    async fn flush(&mut self) {
        let outbox = self.room.take_outbox();
        if outbox.is_empty() {
            return;
        }

        let timestamp = self.context.unix_millis();
        let mut envelopes = Vec::with_capacity(outbox.len());
        for delivery in outbox {
            match delivery.into_envelope(self.room.code(), timestamp) {
                Ok(envelope) => envelopes.push(envelope),
                Err(err) => warn!(room = %self.room.code(), error = %err, "Failed to encode event"),
            }
        }

        if let Err(err) = self.transport.deliver_all(envelopes).await {
            warn!(room = %self.room.code(), error = %err, "Event delivery failed");
        }
    }
}
