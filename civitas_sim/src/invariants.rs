//! Room invariants checked after every simulated step.

use civitas_core::{Coord, ResourceKind, Room};
use civitas_env::{PlayerId, RoomCode};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("room {room}: turn index {index} out of range for {len} players")]
    TurnIndexOutOfRange { room: RoomCode, index: usize, len: usize },

    #[error("room {room}: turn order and roster disagree")]
    TurnOrderMismatch { room: RoomCode },

    #[error("room {room}: {resource} of {player} is {quantity}, above max {max}")]
    QuantityAboveMax {
        room: RoomCode,
        player: PlayerId,
        resource: ResourceKind,
        quantity: u32,
        max: u32,
    },

    #[error("room {room}: roster has {players} players but ledger holds {pools} pools")]
    LedgerRosterMismatch { room: RoomCode, players: usize, pools: usize },

    #[error("room {room}: {hosts} hosts among {players} players")]
    HostCount { room: RoomCode, hosts: usize, players: usize },

    #[error("room {room}: lock at {coord} held by departed player {holder}")]
    OrphanLock { room: RoomCode, coord: Coord, holder: PlayerId },

    #[error("room {room}: {count} actions still queued after a submission")]
    QueueNotDrained { room: RoomCode, count: usize },

    #[error("room {room}: {count} roads inoperable with no player in outage")]
    StrayOutage { room: RoomCode, count: usize },

    #[error("room {room}: outage recorded for departed player {player}")]
    OutageForDeparted { room: RoomCode, player: PlayerId },
}

/// Checks every structural invariant of `room` at `now`.
pub fn check_room(room: &Room, now: Duration) -> Result<(), InvariantViolation> {
    let code = room.code().clone();
    let roster: HashSet<PlayerId> = room.players().iter().map(|p| p.id).collect();

    let turns = room.turns();
    if !turns.is_empty() && turns.index() >= turns.len() {
        return Err(InvariantViolation::TurnIndexOutOfRange {
            room: code,
            index: turns.index(),
            len: turns.len(),
        });
    }
    let order: HashSet<PlayerId> = turns.order().iter().copied().collect();
    if order != roster || turns.len() != roster.len() {
        return Err(InvariantViolation::TurnOrderMismatch { room: code });
    }

    if room.ledger().len() != roster.len() {
        return Err(InvariantViolation::LedgerRosterMismatch {
            room: code,
            players: roster.len(),
            pools: room.ledger().len(),
        });
    }
    for (player, pool) in room.ledger().pools() {
        for resource in ResourceKind::ALL {
            let (quantity, max) = (pool.quantity(resource), pool.max(resource));
            if quantity > max {
                return Err(InvariantViolation::QuantityAboveMax {
                    room: code,
                    player,
                    resource,
                    quantity,
                    max,
                });
            }
        }
    }

    let hosts = room.players().iter().filter(|p| p.is_host).count();
    if !roster.is_empty() && hosts != 1 {
        return Err(InvariantViolation::HostCount {
            room: code,
            hosts,
            players: roster.len(),
        });
    }

    // The table is keyed by coordinate, so uniqueness per cell is structural;
    // what can still go wrong is a lock outliving its holder.
    if let Some((coord, lock)) = room.locks().iter_active(now).find(|(_, lock)| !roster.contains(&lock.holder)) {
        return Err(InvariantViolation::OrphanLock {
            room: code,
            coord,
            holder: lock.holder,
        });
    }

    if room.queue_len() != 0 {
        return Err(InvariantViolation::QueueNotDrained {
            room: code,
            count: room.queue_len(),
        });
    }

    if let Some(player) = room.outages().iter().find(|p| !roster.contains(p)) {
        return Err(InvariantViolation::OutageForDeparted { room: code, player: *player });
    }
    let dark = room.grid().inoperable_road_count();
    if room.outages().is_empty() && dark > 0 {
        return Err(InvariantViolation::StrayOutage { room: code, count: dark });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use civitas_core::{ActionSubmission, BuildingKind, CityGrid, EngineConfig};
    use std::sync::Arc;

    fn room() -> Room {
        Room::new(
            RoomCode::new("INV"),
            CityGrid::filled(8, 8, BuildingKind::Grass),
            Arc::new(EngineConfig::default()),
        )
    }

    #[test]
    fn test_fresh_room_is_consistent() {
        let mut room = room();
        assert_eq!(check_room(&room, Duration::ZERO), Ok(()));

        room.join(PlayerId::from_seed(1), "a").unwrap();
        room.join(PlayerId::from_seed(2), "b").unwrap();
        assert_eq!(check_room(&room, Duration::ZERO), Ok(()));
    }

    #[test]
    fn test_consistent_after_actions_and_leave() {
        let mut room = room();
        let a = PlayerId::from_seed(1);
        let b = PlayerId::from_seed(2);
        room.join(a, "a").unwrap();
        room.join(b, "b").unwrap();

        room.submit(ActionSubmission::place(a, Coord::new(1, 1), BuildingKind::Road), Duration::ZERO);
        room.leave(a);
        room.tick(Duration::from_secs(1));

        assert_eq!(check_room(&room, Duration::from_secs(1)), Ok(()));
        assert_eq!(room.host(), Some(b));
    }

    #[test]
    fn test_violation_messages_name_the_room() {
        let violation = InvariantViolation::QueueNotDrained {
            room: RoomCode::new("abc"),
            count: 2,
        };
        assert_eq!(violation.to_string(), "room ABC: 2 actions still queued after a submission");
    }
}
