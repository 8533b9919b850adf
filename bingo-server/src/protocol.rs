use std::collections::BTreeSet;

use bingo_core::{
    BoardSize, CellUpdate, GameEvent, GameSession, GameStateView, GameSummary, PlayerState,
    RecentEvent, MAX_ITEM_LEN,
};
use serde::{Deserialize, Deserializer, Serialize};

/// How many suggestion fields the client form offers.
pub const SUGGESTION_FIELDS: usize = 3;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    MarkPosition {
        #[serde(deserialize_with = "lenient_position")]
        position: usize,
    },
    RequestState,
    ClearBoard,
    MakeSuggestions,
    SubmitSuggestions {
        #[serde(default)]
        suggestion1: Option<String>,
        #[serde(default)]
        suggestion2: Option<String>,
        #[serde(default)]
        suggestion3: Option<String>,
    },
    ChangeName {
        name: String,
    },
    SetPreferences {
        #[serde(default)]
        show_own_events: Option<bool>,
        #[serde(default)]
        use_suggested_items: Option<bool>,
    },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

// Form-driven clients send positions as strings.
fn lenient_position<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Position {
        Number(usize),
        Text(String),
    }

    match Position::deserialize(deserializer)? {
        Position::Number(n) => Ok(n),
        Position::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventView {
    pub player: String,
    pub message: String,
    /// Milliseconds since the epoch.
    pub created_at: i64,
    pub remove_in: f64,
}

impl From<&RecentEvent> for EventView {
    fn from(recent: &RecentEvent) -> Self {
        Self {
            remove_in: recent.remove_in,
            ..EventView::live(&recent.event, 0.0)
        }
    }
}

impl EventView {
    pub fn live(event: &GameEvent, remove_in: f64) -> Self {
        Self {
            player: event.player_name.clone(),
            message: event.message.clone(),
            created_at: event.created_at.timestamp_millis(),
            remove_in,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardView {
    pub board_size: BoardSize,
    pub board_layout: Vec<String>,
    pub covered_positions: BTreeSet<usize>,
    pub free_position: Option<usize>,
    pub has_won: bool,
}

impl BoardView {
    pub fn of(game: &GameSession, player: &PlayerState) -> Self {
        Self {
            board_size: game.settings().board_size,
            board_layout: player.board_layout.clone(),
            covered_positions: player.covered_positions.clone(),
            free_position: game.free_index(),
            has_won: player.has_won,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState(GameStateView),
    SpectatorState(GameSummary),
    Board(BoardView),
    Cell(CellUpdate),
    /// Sent only to the player who completed a pattern.
    Won { message: String },
    Winner { winner: String },
    Event(EventView),
    Events { events: Vec<EventView> },
    Players { connected_players: Vec<String> },
    GameEnded { winner: Option<String> },
    SuggestionForm { fields: usize, max_length: usize },
    SuggestionsRecorded { accepted: Vec<String>, rejected: Vec<String> },
    Rejected { message: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn invalid_format() -> Self {
        ServerMessage::Error {
            message: "Invalid message format".to_string(),
        }
    }

    pub fn suggestion_form() -> Self {
        ServerMessage::SuggestionForm {
            fields: SUGGESTION_FIELDS,
            max_length: MAX_ITEM_LEN,
        }
    }

    /// Whether spectators may see this message.
    pub fn is_game_wide(&self) -> bool {
        match self {
            ServerMessage::Event(_)
            | ServerMessage::Winner { .. }
            | ServerMessage::Players { .. }
            | ServerMessage::GameEnded { .. } => true,
            ServerMessage::GameState(_)
            | ServerMessage::SpectatorState(_)
            | ServerMessage::Board(_)
            | ServerMessage::Cell(_)
            | ServerMessage::Won { .. }
            | ServerMessage::Events { .. }
            | ServerMessage::SuggestionForm { .. }
            | ServerMessage::SuggestionsRecorded { .. }
            | ServerMessage::Rejected { .. }
            | ServerMessage::Error { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_tagged_client_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"mark_position","position":7}"#),
            Some(ClientMessage::MarkPosition { position: 7 })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"mark_position","position":"12"}"#),
            Some(ClientMessage::MarkPosition { position: 12 })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"request_state"}"#),
            Some(ClientMessage::RequestState)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"submit_suggestions","suggestion1":"a","suggestion3":""}"#),
            Some(ClientMessage::SubmitSuggestions {
                suggestion1: Some("a".into()),
                suggestion2: None,
                suggestion3: Some(String::new()),
            })
        );
    }

    #[test]
    fn malformed_messages_do_not_decode() {
        assert_eq!(ClientMessage::parse("not json"), None);
        assert_eq!(ClientMessage::parse(r#"{"type":"fly"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"type":"mark_position"}"#), None);
        assert_eq!(
            ClientMessage::parse(r#"{"type":"mark_position","position":"x"}"#),
            None
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"mark_position","position":-1}"#),
            None
        );
    }

    #[test]
    fn server_messages_carry_type_tag() {
        let value = serde_json::to_value(ServerMessage::invalid_format()).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "Invalid message format"}));

        let value = serde_json::to_value(ServerMessage::Players {
            connected_players: vec!["ann".into()],
        })
        .unwrap();
        assert_eq!(value["type"], "players");
    }

    #[test]
    fn per_player_feedback_is_not_game_wide() {
        assert!(!ServerMessage::Won { message: "bingo".into() }.is_game_wide());
        assert!(!ServerMessage::suggestion_form().is_game_wide());
        assert!(ServerMessage::Winner { winner: "ann".into() }.is_game_wide());
        assert!(ServerMessage::GameEnded { winner: None }.is_game_wide());
    }
}
