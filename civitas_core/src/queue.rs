//! Per-room pending-action queue.
//!
//! Stable priority insert: a new action goes immediately before the first
//! entry with a strictly greater priority, so equal priorities keep
//! submission order.

use crate::action::Action;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct ActionQueue {
    entries: VecDeque<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `action` behind every entry of equal or lower priority.
    pub fn insert(&mut self, action: Action) {
        let priority = action.priority();
        let position = self
            .entries
            .iter()
            .position(|queued| queued.priority() > priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, action);
    }

    pub fn pop_front(&mut self) -> Option<Action> {
        self.entries.pop_front()
    }

    pub fn peek(&self) -> Option<&Action> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.entries.iter()
    }

    /// Drops every queued action submitted by `actor`.
    pub fn discard_from(&mut self, actor: civitas_env::PlayerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|a| a.actor != actor);
        before - self.entries.len()
    }
}
