//! Turn controller - the room's turn order and whose turn it is.
//!
//! The index only moves on an executed AdvanceTurn, wrapping modulo the
//! number of players. Departures filter the order and clamp the index so it
//! always points at a real entry; the index itself is not shifted, so when an
//! earlier player leaves the turn passes to whoever slides into that slot.

use civitas_env::PlayerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnController {
    order: Vec<PlayerId>,
    index: usize,
}

impl TurnController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a controller from persisted state, clamping the index.
    pub fn from_parts(order: Vec<PlayerId>, index: usize) -> Self {
        let mut controller = Self { order, index };
        controller.clamp();
        controller
    }

    /// The player whose turn it is, or `None` for an empty room.
    pub fn current(&self) -> Option<PlayerId> {
        self.order.get(self.index).copied()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn order(&self) -> &[PlayerId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.order.contains(&player)
    }

    /// Appends a player to the end of the order. Duplicates are ignored.
    pub fn add_player(&mut self, player: PlayerId) -> bool {
        if self.contains(player) {
            return false;
        }
        self.order.push(player);
        true
    }

    /// Moves to the next player. Returns the new index.
    pub fn advance(&mut self) -> usize {
        if !self.order.is_empty() {
            self.index = (self.index + 1) % self.order.len();
        }
        self.index
    }

    /// Filters `player` out of the order and clamps the index.
    ///
    /// Returns true if the current turn holder changed as a result.
    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        let holder_before = self.current();
        let Some(position) = self.order.iter().position(|p| *p == player) else {
            return false;
        };

        self.order.remove(position);
        self.clamp();
        self.current() != holder_before
    }

    fn clamp(&mut self) {
        if self.order.is_empty() {
            self.index = 0;
        } else if self.index >= self.order.len() {
            self.index = self.order.len() - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn players(n: u64) -> Vec<PlayerId> {
        (0..n).map(PlayerId::from_seed).collect()
    }

    #[test]
    fn test_advance_wraps() {
        let ids = players(3);
        let mut turns = TurnController::from_parts(ids.clone(), 0);
        assert_eq!(turns.current(), Some(ids[0]));
        turns.advance();
        turns.advance();
        assert_eq!(turns.current(), Some(ids[2]));
        assert_eq!(turns.advance(), 0);
        assert_eq!(turns.current(), Some(ids[0]));
    }

    #[test]
    fn test_remove_last_holder_clamps() {
        let ids = players(3);
        let mut turns = TurnController::from_parts(ids.clone(), 2);
        assert!(turns.remove_player(ids[2]));
        assert_eq!(turns.index(), 1);
        assert_eq!(turns.current(), Some(ids[1]));
    }

    #[test]
    fn test_remove_earlier_player_shifts_turn_forward() {
        let ids = players(4);
        let mut turns = TurnController::from_parts(ids.clone(), 2);
        assert!(turns.remove_player(ids[0]));
        assert_eq!(turns.index(), 2);
        assert_eq!(turns.current(), Some(ids[3]));
    }

    #[test]
    fn test_remove_later_player_keeps_holder() {
        let ids = players(4);
        let mut turns = TurnController::from_parts(ids.clone(), 1);
        assert!(!turns.remove_player(ids[3]));
        assert_eq!(turns.current(), Some(ids[1]));
    }

    #[test]
    fn test_remove_until_empty() {
        let ids = players(2);
        let mut turns = TurnController::from_parts(ids.clone(), 1);
        turns.remove_player(ids[1]);
        turns.remove_player(ids[0]);
        assert!(turns.is_empty());
        assert_eq!(turns.current(), None);
        assert_eq!(turns.advance(), 0);
    }

    #[test]
    fn test_add_player_ignores_duplicates() {
        let mut turns = TurnController::new();
        let p = PlayerId::from_seed(1);
        assert!(turns.add_player(p));
        assert!(!turns.add_player(p));
        assert_eq!(turns.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_index_always_valid(
            n in 1u64..8,
            start in 0usize..8,
            ops in proptest::collection::vec((any::<bool>(), 0u64..8), 0..40)
        ) {
            let mut turns = TurnController::from_parts(players(n), start);
            for (advance, who) in ops {
                if advance {
                    turns.advance();
                } else {
                    turns.remove_player(PlayerId::from_seed(who));
                }
                if turns.is_empty() {
                    prop_assert_eq!(turns.index(), 0);
                } else {
                    prop_assert!(turns.index() < turns.len());
                }
            }
        }
    }
}
