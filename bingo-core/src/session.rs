use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{BoardGenerator, BoardSize};
use crate::code::GameCode;
use crate::event::{EventLog, GameEvent};
use crate::item::{BoardItem, BoardTemplate, ItemPool};
use crate::player::{PlayerState, Preferences};
use crate::win::{WinCondition, WinEvaluator};
use crate::{
    validate_name, GameError, GameId, PlayerId, TemplateId, MAX_GAME_NAME_LEN, MAX_ITEM_LEN,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub board_size: BoardSize,
    #[serde(default)]
    pub has_free_square: bool,
    #[serde(default)]
    pub win_condition: WinCondition,
    #[serde(default)]
    pub is_private: bool,
}

/// Authoritative state of one game: settings, roster and activity log.
///
/// Fields are private so every mutation goes through the methods below,
/// which keep the free-square and bounds invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    id: GameId,
    code: GameCode,
    template_id: TemplateId,
    creator: String,
    settings: GameSettings,
    is_active: bool,
    winner: Option<PlayerId>,
    players: Vec<PlayerState>,
    events: EventLog,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub player_id: PlayerId,
    pub rejoined: bool,
    pub event: Option<GameEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellUpdate {
    pub position: usize,
    pub covered: bool,
    pub text: String,
    pub free: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinOutcome {
    pub player_name: String,
    /// Set when this win is the game's first.
    pub first_winner: bool,
    pub game_ended: bool,
    pub event: GameEvent,
}

/// The `game_state` snapshot sent to one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStateView {
    pub is_active: bool,
    pub has_won: bool,
    pub winner: Option<String>,
    pub covered_positions: BTreeSet<usize>,
    pub connected_players: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSummary {
    pub name: String,
    pub is_connected: bool,
    pub has_won: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSummary {
    pub id: GameId,
    pub code: GameCode,
    pub name: Option<String>,
    pub board_size: BoardSize,
    pub has_free_square: bool,
    pub win_condition: WinCondition,
    pub is_active: bool,
    pub is_private: bool,
    pub winner: Option<String>,
    pub players: Vec<PlayerSummary>,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    pub fn create(
        code: GameCode,
        template: &BoardTemplate,
        creator: impl Into<String>,
        mut settings: GameSettings,
        retain_events: bool,
    ) -> Result<Self, GameError> {
        settings.name = match settings.name.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) if name.chars().count() > MAX_GAME_NAME_LEN => {
                return Err(GameError::Validation(format!(
                    "game name longer than {MAX_GAME_NAME_LEN} characters"
                )))
            }
            Some(name) => Some(name.to_string()),
        };

        let needed = settings.board_size.cells();
        let available = template.items.eligible_count(true);
        if available < needed {
            return Err(GameError::InsufficientItems { needed, available });
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            code,
            template_id: template.id.clone(),
            creator: creator.into(),
            settings,
            is_active: true,
            winner: None,
            players: Vec::new(),
            events: EventLog::new(retain_events),
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    pub fn code(&self) -> &GameCode {
        &self.code
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn winner(&self) -> Option<&PlayerState> {
        let id = self.winner.as_ref()?;
        self.player(id)
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn generator(&self) -> BoardGenerator {
        BoardGenerator::new(self.settings.board_size, self.settings.has_free_square)
    }

    pub fn evaluator(&self) -> WinEvaluator {
        WinEvaluator::new(self.settings.board_size, self.settings.win_condition)
    }

    pub fn free_index(&self) -> Option<usize> {
        self.generator().free_index()
    }

    /// Ends the game. Returns false if it had already ended.
    pub fn deactivate(&mut self) -> bool {
        std::mem::replace(&mut self.is_active, false)
    }

    /// Reuses the player named by `identity` when it belongs to this game,
    /// otherwise deals a new board. Only new players need an active game.
    pub fn join<R: Rng + ?Sized>(
        &mut self,
        identity: Option<&str>,
        name: &str,
        use_suggested: bool,
        pool: &ItemPool,
        rng: &mut R,
    ) -> Result<JoinOutcome, GameError> {
        let name = validate_name(name)?;

        if let Some(existing) = identity.and_then(|id| self.players.iter_mut().find(|p| p.id == id)) {
            existing.name = name;
            existing.preferences.use_suggested_items = use_suggested;
            existing.touch();
            return Ok(JoinOutcome {
                player_id: existing.id.clone(),
                rejoined: true,
                event: None,
            });
        }

        if !self.is_active {
            return Err(GameError::GameInactive);
        }

        let generator = self.generator();
        let layout = generator.generate(pool, use_suggested, rng)?;
        let preferences = Preferences {
            use_suggested_items: use_suggested,
            ..Preferences::default()
        };
        let player = PlayerState::new(
            Uuid::new_v4().to_string(),
            name,
            layout,
            generator.free_index(),
            preferences,
        );
        let event = self
            .events
            .record(&player.id, &player.name, format!("{} joined the game", player.name));
        let player_id = player.id.clone();
        self.players.push(player);

        Ok(JoinOutcome {
            player_id,
            rejoined: false,
            event: Some(event),
        })
    }

    /// Toggles one cell. Win detection is left to [`GameSession::check_win`].
    pub fn mark(
        &mut self,
        player_id: &str,
        position: usize,
    ) -> Result<(CellUpdate, GameEvent), GameError> {
        let free_index = self.free_index();
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;

        if !self.is_active {
            return Err(GameError::GameInactive);
        }
        if player.has_won {
            return Err(GameError::AlreadyWon);
        }
        let text = player
            .board_layout
            .get(position)
            .cloned()
            .ok_or(GameError::InvalidPosition(position))?;
        if free_index == Some(position) {
            return Err(GameError::FreeSquareLocked);
        }

        let covered = player.toggle(position);
        player.touch();
        let action = if covered { "marked" } else { "unmarked" };
        let event = self.events.record(
            &player.id,
            &player.name,
            format!("{} {action} '{text}'", player.name),
        );

        Ok((
            CellUpdate {
                position,
                covered,
                text,
                free: false,
            },
            event,
        ))
    }

    /// Evaluates the player's board. Returns `Some` only for a new win.
    pub fn check_win(
        &mut self,
        player_id: &str,
        end_on_win: bool,
    ) -> Result<Option<WinOutcome>, GameError> {
        let evaluator = self.evaluator();
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;

        if player.has_won || !evaluator.is_win(&player.covered_positions) {
            return Ok(None);
        }

        player.has_won = true;
        let first_winner = self.winner.is_none();
        if first_winner {
            self.winner = Some(player.id.clone());
        }
        let event = self.events.record(
            &player.id,
            &player.name,
            format!("{} has won the game!", player.name),
        );
        let player_name = player.name.clone();
        let game_ended = end_on_win && self.deactivate();

        Ok(Some(WinOutcome {
            player_name,
            first_winner,
            game_ended,
            event,
        }))
    }

    /// Deals a fresh board for the player. Allowed after the game has ended.
    pub fn reset_board<R: Rng + ?Sized>(
        &mut self,
        player_id: &str,
        pool: &ItemPool,
        rng: &mut R,
    ) -> Result<&PlayerState, GameError> {
        let generator = self.generator();
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;

        let layout = generator.generate(pool, player.preferences.use_suggested_items, rng)?;
        player.reset(layout, generator.free_index());
        player.touch();
        Ok(player)
    }

    /// Adds a player's suggestion to the template pool, unmoderated.
    pub fn record_suggestion(
        &mut self,
        player_id: &str,
        text: &str,
        pool: &mut ItemPool,
    ) -> Result<GameEvent, GameError> {
        let player = self
            .players
            .iter()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;

        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return Err(GameError::Validation("suggestion required".into()));
        }
        if text.chars().count() > MAX_ITEM_LEN {
            return Err(GameError::Validation(format!(
                "suggestion longer than {MAX_ITEM_LEN} characters"
            )));
        }
        pool.insert(BoardItem::suggested(text.clone(), player.name.clone()))?;

        Ok(self.events.record(
            &player.id,
            &player.name,
            format!("{} suggested '{text}'", player.name),
        ))
    }

    /// Returns the event only when the name actually changed.
    pub fn rename(&mut self, player_id: &str, name: &str) -> Result<Option<GameEvent>, GameError> {
        let name = validate_name(name)?;
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;

        if player.name == name {
            return Ok(None);
        }
        let old = std::mem::replace(&mut player.name, name);
        let event = self.events.record(
            &player.id,
            &player.name,
            format!("{old} is now known as {}", player.name),
        );
        Ok(Some(event))
    }

    pub fn set_preferences(
        &mut self,
        player_id: &str,
        show_own_events: Option<bool>,
        use_suggested_items: Option<bool>,
    ) -> Result<Preferences, GameError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        if let Some(show) = show_own_events {
            player.preferences.show_own_events = show;
        }
        if let Some(use_suggested) = use_suggested_items {
            player.preferences.use_suggested_items = use_suggested;
        }
        Ok(player.preferences)
    }

    pub fn set_connected(&mut self, player_id: &str, connected: bool) -> Result<(), GameError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.is_connected = connected;
        player.touch();
        Ok(())
    }

    /// Clears presence on every player. Used when a game is loaded from
    /// disk, where no socket can still be attached.
    pub fn disconnect_all(&mut self) {
        for player in &mut self.players {
            player.is_connected = false;
        }
    }

    pub fn connected_players(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| p.is_connected)
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn state_for(&self, player_id: &str) -> Result<GameStateView, GameError> {
        let player = self.player(player_id).ok_or(GameError::PlayerNotFound)?;
        Ok(GameStateView {
            is_active: self.is_active,
            has_won: player.has_won,
            winner: self.winner().map(|w| w.name.clone()),
            covered_positions: player.covered_positions.clone(),
            connected_players: self.connected_players(),
        })
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            id: self.id.clone(),
            code: self.code.clone(),
            name: self.settings.name.clone(),
            board_size: self.settings.board_size,
            has_free_square: self.free_index().is_some(),
            win_condition: self.settings.win_condition,
            is_active: self.is_active,
            is_private: self.settings.is_private,
            winner: self.winner().map(|w| w.name.clone()),
            players: self
                .players
                .iter()
                .map(|p| PlayerSummary {
                    name: p.name.clone(),
                    is_connected: p.is_connected,
                    has_won: p.has_won,
                })
                .collect(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::FREE_SQUARE;
    use crate::item::Approval;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn template(n: usize) -> BoardTemplate {
        let texts = (0..n).map(|i| format!("item {i}"));
        BoardTemplate::new("t1", "Office bingo", "host", texts).unwrap()
    }

    fn settings(size: BoardSize, free: bool, win: WinCondition) -> GameSettings {
        GameSettings {
            board_size: size,
            has_free_square: free,
            win_condition: win,
            ..GameSettings::default()
        }
    }

    fn base_game() -> (GameSession, BoardTemplate, ChaCha8Rng) {
        let template = template(30);
        let game = GameSession::create(
            GameCode::parse("ABC").unwrap(),
            &template,
            "host",
            settings(BoardSize::Five, true, WinCondition::Traditional),
            true,
        )
        .unwrap();
        (game, template, ChaCha8Rng::seed_from_u64(11))
    }

    fn join(game: &mut GameSession, template: &BoardTemplate, rng: &mut ChaCha8Rng, name: &str) -> PlayerId {
        game.join(None, name, true, &template.items, rng)
            .unwrap()
            .player_id
    }

    #[test]
    fn create_requires_enough_items() {
        let err = GameSession::create(
            GameCode::parse("ABC").unwrap(),
            &template(24),
            "host",
            settings(BoardSize::Five, false, WinCondition::Traditional),
            true,
        )
        .unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientItems {
                needed: 25,
                available: 24
            }
        );

        let game = GameSession::create(
            GameCode::parse("ABC").unwrap(),
            &template(16),
            "host",
            settings(BoardSize::Four, false, WinCondition::AllSquares),
            true,
        )
        .unwrap();
        assert!(game.is_active());
    }

    #[test]
    fn unapproved_suggestions_do_not_count_toward_minimum() {
        let mut template = template(24);
        template
            .items
            .insert(BoardItem::suggested("extra", "ann"))
            .unwrap();
        let create = |t: &BoardTemplate| {
            GameSession::create(
                GameCode::parse("ABC").unwrap(),
                t,
                "host",
                GameSettings::default(),
                true,
            )
        };
        assert!(create(&template).is_err());
        template.items.set_approval("extra", Approval::Approved).unwrap();
        assert!(create(&template).is_ok());
    }

    #[test]
    fn join_deals_board_with_free_square_covered() {
        let (mut game, template, mut rng) = base_game();
        let outcome = game.join(None, " ann ", true, &template.items, &mut rng).unwrap();
        assert!(!outcome.rejoined);
        assert_eq!(
            outcome.event.unwrap().message,
            "ann joined the game".to_string()
        );

        let player = game.player(&outcome.player_id).unwrap();
        assert_eq!(player.name, "ann");
        assert_eq!(player.board_layout.len(), 25);
        assert_eq!(player.board_layout[12], FREE_SQUARE);
        assert_eq!(player.covered_positions, BTreeSet::from([12]));
    }

    #[test]
    fn rejoin_reuses_player_and_updates_name() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        let layout = game.player(&id).unwrap().board_layout.clone();

        let outcome = game
            .join(Some(id.as_str()), "annie", false, &template.items, &mut rng)
            .unwrap();
        assert!(outcome.rejoined);
        assert_eq!(outcome.player_id, id);
        let player = game.player(&id).unwrap();
        assert_eq!(player.name, "annie");
        assert!(!player.preferences.use_suggested_items);
        assert_eq!(player.board_layout, layout);
        assert_eq!(game.players().len(), 1);
    }

    #[test]
    fn foreign_identity_creates_new_player() {
        let (mut game, template, mut rng) = base_game();
        join(&mut game, &template, &mut rng, "ann");
        let outcome = game
            .join(Some("someone-elses-id"), "bo", true, &template.items, &mut rng)
            .unwrap();
        assert!(!outcome.rejoined);
        assert_eq!(game.players().len(), 2);
    }

    #[test]
    fn inactive_game_rejects_new_players_but_not_rejoins() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        assert!(game.deactivate());
        assert!(!game.deactivate());

        let err = game
            .join(None, "bo", true, &template.items, &mut rng)
            .unwrap_err();
        assert_eq!(err, GameError::GameInactive);
        assert!(game.join(Some(id.as_str()), "ann", true, &template.items, &mut rng).is_ok());
    }

    #[test]
    fn join_validates_name() {
        let (mut game, template, mut rng) = base_game();
        let err = game.join(None, "  ", true, &template.items, &mut rng).unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
        assert!(game.players().is_empty());
    }

    #[test]
    fn mark_toggles_and_logs() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        let text = game.player(&id).unwrap().board_layout[3].clone();

        let (cell, event) = game.mark(&id, 3).unwrap();
        assert!(cell.covered);
        assert_eq!(cell.text, text);
        assert_eq!(event.message, format!("ann marked '{text}'"));

        let (cell, event) = game.mark(&id, 3).unwrap();
        assert!(!cell.covered);
        assert_eq!(event.message, format!("ann unmarked '{text}'"));
        assert_eq!(game.player(&id).unwrap().covered_positions, BTreeSet::from([12]));
    }

    #[test]
    fn mark_rejected_without_mutation() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        let logged = game.events().len();

        assert_eq!(game.mark(&id, 12).unwrap_err(), GameError::FreeSquareLocked);
        assert_eq!(game.mark(&id, 25).unwrap_err(), GameError::InvalidPosition(25));
        assert_eq!(game.mark("nobody", 0).unwrap_err(), GameError::PlayerNotFound);

        game.deactivate();
        assert_eq!(game.mark(&id, 0).unwrap_err(), GameError::GameInactive);
        assert_eq!(game.player(&id).unwrap().covered_positions, BTreeSet::from([12]));
        assert_eq!(game.events().len(), logged);
    }

    #[test]
    fn top_row_scenario_wins_on_fifth_mark() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        assert!(game.player(&id).unwrap().is_covered(12));

        for pos in 0..4 {
            game.mark(&id, pos).unwrap();
            assert_eq!(game.check_win(&id, false).unwrap(), None);
        }
        game.mark(&id, 4).unwrap();
        let win = game.check_win(&id, false).unwrap().unwrap();
        assert!(win.first_winner);
        assert!(!win.game_ended);
        assert_eq!(win.event.message, "ann has won the game!");
        assert!(game.is_active());
        assert_eq!(game.winner().unwrap().id, id);

        // a second check does not announce again
        assert_eq!(game.check_win(&id, false).unwrap(), None);
        assert_eq!(game.mark(&id, 5).unwrap_err(), GameError::AlreadyWon);
    }

    #[test]
    fn center_counts_toward_diagonal() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        for pos in [0, 6, 18, 24] {
            game.mark(&id, pos).unwrap();
        }
        assert!(game.check_win(&id, false).unwrap().is_some());
    }

    #[test]
    fn end_on_win_deactivates_and_keeps_first_winner() {
        let (mut game, template, mut rng) = base_game();
        let ann = join(&mut game, &template, &mut rng, "ann");
        let bo = join(&mut game, &template, &mut rng, "bo");
        for pos in [5, 6, 7, 8, 9] {
            game.mark(&bo, pos).unwrap();
        }
        for pos in 0..5 {
            game.mark(&ann, pos).unwrap();
        }
        let first = game.check_win(&ann, false).unwrap().unwrap();
        assert!(first.first_winner);
        let second = game.check_win(&bo, true).unwrap().unwrap();
        assert!(!second.first_winner);
        assert!(second.game_ended);
        assert!(!game.is_active());
        assert_eq!(game.winner().unwrap().name, "ann");
    }

    #[test]
    fn all_squares_requires_full_board() {
        let template = template(16);
        let mut game = GameSession::create(
            GameCode::parse("ABC").unwrap(),
            &template,
            "host",
            settings(BoardSize::Four, true, WinCondition::AllSquares),
            true,
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let id = join(&mut game, &template, &mut rng, "ann");
        // no free square on 4x4
        assert!(game.player(&id).unwrap().covered_positions.is_empty());
        for pos in 0..15 {
            game.mark(&id, pos).unwrap();
            assert_eq!(game.check_win(&id, false).unwrap(), None);
        }
        game.mark(&id, 15).unwrap();
        assert!(game.check_win(&id, false).unwrap().is_some());
    }

    #[test]
    fn reset_twice_gives_valid_boards_even_after_end() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        for pos in 0..5 {
            game.mark(&id, pos).unwrap();
        }
        game.check_win(&id, true).unwrap();
        assert!(!game.is_active());

        for _ in 0..2 {
            let player = game.reset_board(&id, &template.items, &mut rng).unwrap();
            assert_eq!(player.board_layout.len(), 25);
            assert_eq!(player.board_layout[12], FREE_SQUARE);
            assert_eq!(player.covered_positions, BTreeSet::from([12]));
            assert!(!player.has_won);
        }
    }

    #[test]
    fn reset_failure_leaves_board_untouched() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        game.mark(&id, 0).unwrap();
        let before = game.player(&id).unwrap().clone();
        let err = game
            .reset_board(&id, &ItemPool::new(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, GameError::InsufficientItems { .. }));
        assert_eq!(game.player(&id).unwrap(), &before);
    }

    #[test]
    fn suggestions_are_normalized_and_deduplicated() {
        let (mut game, mut template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");

        let event = game
            .record_suggestion(&id, "  Printer Jam ", &mut template.items)
            .unwrap();
        assert_eq!(event.message, "ann suggested 'printer jam'");
        let item = template.items.items().last().unwrap();
        assert_eq!(item.text, "printer jam");
        assert_eq!(item.approval, Approval::Unset);
        assert!(!item.is_authored());

        let err = game
            .record_suggestion(&id, "PRINTER JAM", &mut template.items)
            .unwrap_err();
        assert_eq!(err, GameError::DuplicateItem);
        assert!(matches!(
            game.record_suggestion(&id, " ", &mut template.items),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn rename_logs_only_real_changes() {
        let (mut game, template, mut rng) = base_game();
        let id = join(&mut game, &template, &mut rng, "ann");
        assert_eq!(game.rename(&id, "ann").unwrap(), None);
        let event = game.rename(&id, "Ann B").unwrap().unwrap();
        assert_eq!(event.message, "ann is now known as Ann B");
        assert_eq!(game.player(&id).unwrap().name, "Ann B");
    }

    #[test]
    fn two_players_marks_read_back_newest_first() {
        let (mut game, template, mut rng) = base_game();
        let ann = join(&mut game, &template, &mut rng, "ann");
        let bo = join(&mut game, &template, &mut rng, "bo");
        game.mark(&ann, 0).unwrap();
        game.mark(&bo, 1).unwrap();

        let recent = game.events().recent(60, Utc::now());
        let names: Vec<_> = recent
            .iter()
            .take(2)
            .map(|r| r.event.player_name.as_str())
            .collect();
        assert_eq!(names, vec!["bo", "ann"]);
        assert!(recent[0].event.message.starts_with("bo marked"));
        assert!(recent[1].event.message.starts_with("ann marked"));
    }

    #[test]
    fn forgotten_events_still_reach_callers() {
        let template = template(30);
        let mut game = GameSession::create(
            GameCode::parse("ABC").unwrap(),
            &template,
            "host",
            GameSettings::default(),
            false,
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let id = join(&mut game, &template, &mut rng, "ann");
        let (_, event) = game.mark(&id, 0).unwrap();
        assert!(event.message.starts_with("ann marked"));
        assert!(game.events().is_empty());
    }

    #[test]
    fn state_view_lists_connected_players_and_winner() {
        let (mut game, template, mut rng) = base_game();
        let ann = join(&mut game, &template, &mut rng, "ann");
        let bo = join(&mut game, &template, &mut rng, "bo");
        game.set_connected(&ann, true).unwrap();
        for pos in 0..5 {
            game.mark(&bo, pos).unwrap();
        }
        game.check_win(&bo, false).unwrap();

        let view = game.state_for(&ann).unwrap();
        assert!(view.is_active);
        assert!(!view.has_won);
        assert_eq!(view.winner.as_deref(), Some("bo"));
        assert_eq!(view.connected_players, vec!["ann".to_string()]);
        assert_eq!(game.summary().players.len(), 2);
    }

    #[test]
    fn game_name_is_bounded() {
        let s = GameSettings {
            name: Some("x".repeat(MAX_GAME_NAME_LEN + 1)),
            ..GameSettings::default()
        };
        let err = GameSession::create(GameCode::parse("ABC").unwrap(), &template(30), "host", s, true)
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[test]
    fn disconnect_all_clears_presence() {
        let (mut game, template, mut rng) = base_game();
        let ann = join(&mut game, &template, &mut rng, "ann");
        let bo = join(&mut game, &template, &mut rng, "bo");
        game.set_connected(&ann, true).unwrap();
        game.set_connected(&bo, true).unwrap();
        assert_eq!(game.connected_players().len(), 2);

        game.disconnect_all();
        assert!(game.connected_players().is_empty());
        assert_eq!(game.players().len(), 2);
    }
}
