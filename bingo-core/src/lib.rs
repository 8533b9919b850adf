//! Game session engine for multiplayer bingo.
//!
//! Pure state: item pools, board generation, win evaluation, per-player mark
//! tracking and the event log. No networking or async lives here; the server
//! crate wraps a [`GameSession`] in a lock and fans its results out.

pub mod board;
pub mod code;
pub mod event;
pub mod item;
pub mod player;
pub mod session;
pub mod win;

use thiserror::Error;

pub use board::{BoardGenerator, BoardSize, FREE_SQUARE};
pub use code::GameCode;
pub use event::{EventLog, GameEvent, RecentEvent};
pub use item::{Approval, BoardItem, BoardTemplate, ItemOrigin, ItemPool};
pub use player::{PlayerState, Preferences};
pub use session::{
    CellUpdate, GameSession, GameSettings, GameStateView, GameSummary, JoinOutcome, PlayerSummary,
    WinOutcome,
};
pub use win::{WinCondition, WinEvaluator};

pub type PlayerId = String;
pub type GameId = String;
pub type TemplateId = String;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 50;
/// Longest accepted item or suggestion text, in characters.
pub const MAX_ITEM_LEN: usize = 64;
/// Longest accepted game name, in characters.
pub const MAX_GAME_NAME_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("game not found")]
    GameNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("game is not active")]
    GameInactive,
    #[error("player has already won")]
    AlreadyWon,
    #[error("not enough eligible items: need {needed}, have {available}")]
    InsufficientItems { needed: usize, available: usize },
    #[error("item already exists")]
    DuplicateItem,
    #[error("position {0} is off the board")]
    InvalidPosition(usize),
    #[error("the free square stays covered")]
    FreeSquareLocked,
}

/// Trims a display name and checks its length.
pub fn validate_name(raw: &str) -> Result<String, GameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GameError::Validation("name required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(GameError::Validation(format!(
            "name longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  Zoë 🎲 ").unwrap(), "Zoë 🎲");
        assert!(matches!(validate_name("   "), Err(GameError::Validation(_))));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(validate_name(&long), Err(GameError::Validation(_))));
        // length is counted in characters, not bytes
        let wide = "é".repeat(MAX_NAME_LEN);
        assert!(validate_name(&wide).is_ok());
    }
}
