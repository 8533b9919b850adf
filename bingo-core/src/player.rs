use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PlayerId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    pub show_own_events: bool,
    pub use_suggested_items: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_own_events: true,
            use_suggested_items: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub board_layout: Vec<String>,
    pub covered_positions: BTreeSet<usize>,
    pub has_won: bool,
    pub is_connected: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub preferences: Preferences,
}

impl PlayerState {
    pub fn new(
        id: impl Into<PlayerId>,
        name: impl Into<String>,
        board_layout: Vec<String>,
        free_index: Option<usize>,
        preferences: Preferences,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            board_layout,
            covered_positions: free_index.into_iter().collect(),
            has_won: false,
            is_connected: false,
            last_seen: now,
            created_at: now,
            preferences,
        }
    }

    pub fn is_covered(&self, position: usize) -> bool {
        self.covered_positions.contains(&position)
    }

    /// Flips one cell and returns whether it is now covered.
    pub fn toggle(&mut self, position: usize) -> bool {
        if self.covered_positions.remove(&position) {
            false
        } else {
            self.covered_positions.insert(position);
            true
        }
    }

    /// New layout, nothing covered but the free cell, win cleared.
    pub fn reset(&mut self, board_layout: Vec<String>, free_index: Option<usize>) {
        self.board_layout = board_layout;
        self.covered_positions = free_index.into_iter().collect();
        self.has_won = false;
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}
