use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::item::ItemPool;
use crate::GameError;

/// Text shown in the free center cell.
pub const FREE_SQUARE: &str = "FREE";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum BoardSize {
    Four,
    #[default]
    Five,
}

impl BoardSize {
    pub fn dimension(self) -> usize {
        match self {
            BoardSize::Four => 4,
            BoardSize::Five => 5,
        }
    }

    pub fn cells(self) -> usize {
        self.dimension() * self.dimension()
    }

    /// Only the 5x5 board has a true center.
    pub fn center(self) -> Option<usize> {
        match self {
            BoardSize::Four => None,
            BoardSize::Five => Some(12),
        }
    }
}

impl TryFrom<u8> for BoardSize {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(BoardSize::Four),
            5 => Ok(BoardSize::Five),
            other => Err(format!("unsupported board size {other}")),
        }
    }
}

impl From<BoardSize> for u8 {
    fn from(size: BoardSize) -> Self {
        size.dimension() as u8
    }
}

/// Deals one player's board from a template's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardGenerator {
    pub size: BoardSize,
    pub free_square: bool,
}

impl BoardGenerator {
    pub fn new(size: BoardSize, free_square: bool) -> Self {
        Self { size, free_square }
    }

    /// Index of the pre-covered cell, if this board has one.
    pub fn free_index(&self) -> Option<usize> {
        if self.free_square {
            self.size.center()
        } else {
            None
        }
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        pool: &ItemPool,
        use_suggested: bool,
        rng: &mut R,
    ) -> Result<Vec<String>, GameError> {
        let needed = self.size.cells();
        let mut items = pool.eligible(use_suggested);
        if items.len() < needed {
            return Err(GameError::InsufficientItems {
                needed,
                available: items.len(),
            });
        }

        items.shuffle(rng);
        let mut layout: Vec<String> = items.into_iter().take(needed).map(str::to_owned).collect();
        // Overwrites whatever was dealt to the center.
        if let Some(center) = self.free_index() {
            layout[center] = FREE_SQUARE.to_string();
        }
        Ok(layout)
    }
}
