use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bingo_core::{
    BoardTemplate, GameCode, GameError, GameEvent, GameId, GameSession, GameSettings, PlayerId,
    TemplateId,
};
use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broadcast::{Broadcaster, ConnectionId};
use crate::config::Config;
use crate::error::AppError;
use crate::protocol::{EventView, ServerMessage};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRecord {
    pub session: GameSession,
    pub host_token: String,
}

pub type SharedGame = Arc<Mutex<GameRecord>>;
pub type SharedTemplate = Arc<RwLock<BoardTemplate>>;

/// Everything the handlers share.
///
/// Lock order when more than one is needed: game, then template, then rng.
/// Map locks are only held long enough to clone an `Arc` out.
#[derive(Clone)]
pub struct AppState {
    templates: Arc<RwLock<HashMap<TemplateId, SharedTemplate>>>,
    games: Arc<RwLock<HashMap<GameId, SharedGame>>>,
    codes: Arc<RwLock<HashMap<String, GameId>>>,
    players: Arc<RwLock<HashMap<PlayerId, GameId>>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
    persist_lock: Arc<Mutex<()>>,
    pub broadcaster: Broadcaster,
    pub config: Arc<Config>,
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    templates: Vec<BoardTemplate>,
    games: Vec<GameRecord>,
}

pub struct CreatedGame {
    pub game_id: GameId,
    pub code: GameCode,
    pub host_token: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let rng = config
            .seed
            .map(ChaCha8Rng::seed_from_u64)
            .unwrap_or_else(ChaCha8Rng::from_entropy);
        Self {
            templates: Arc::new(RwLock::new(HashMap::new())),
            games: Arc::new(RwLock::new(HashMap::new())),
            codes: Arc::new(RwLock::new(HashMap::new())),
            players: Arc::new(RwLock::new(HashMap::new())),
            rng: Arc::new(Mutex::new(rng)),
            persist_lock: Arc::new(Mutex::new(())),
            broadcaster: Broadcaster::new(config.subscriber_buffer),
            config: Arc::new(config),
        }
    }

    /// Builds the state and loads the snapshot at `config.persist_path`, if
    /// one exists. An unreadable snapshot is logged and skipped.
    pub async fn with_persistence(config: Config) -> Self {
        let state = Self::new(config);
        let Some(path) = state.persist_path().cloned() else {
            return state;
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                info!(path = %path.display(), %err, "no snapshot loaded");
                return state;
            }
        };
        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => state.restore(snapshot).await,
            Err(err) => warn!(path = %path.display(), %err, "ignoring unreadable snapshot"),
        }
        state
    }

    async fn restore(&self, snapshot: Snapshot) {
        let mut templates = self.templates.write().await;
        for template in snapshot.templates {
            templates.insert(template.id.clone(), Arc::new(RwLock::new(template)));
        }
        drop(templates);

        let mut codes = self.codes.write().await;
        let mut games = self.games.write().await;
        let mut players = self.players.write().await;
        for mut record in snapshot.games {
            // no socket survives a restart
            record.session.disconnect_all();
            let game_id = record.session.id().clone();
            codes.insert(record.session.code().to_string(), game_id.clone());
            for player in record.session.players() {
                players.insert(player.id.clone(), game_id.clone());
            }
            games.insert(game_id, Arc::new(Mutex::new(record)));
        }
        info!(games = games.len(), players = players.len(), "snapshot restored");
    }

    fn persist_path(&self) -> Option<&PathBuf> {
        self.config.persist_path.as_ref()
    }

    /// Writes the snapshot. Must not be called while holding a game lock.
    ///
    /// Writers are serialized, and each one writes a sibling temp file that
    /// is renamed over the target, so readers never see a torn snapshot.
    pub async fn persist(&self) {
        let Some(path) = self.persist_path() else {
            return;
        };
        let _writer = self.persist_lock.lock().await;

        let mut snapshot = Snapshot::default();
        for template in self.all_templates().await {
            snapshot.templates.push(template.read().await.clone());
        }
        for game in self.all_games().await {
            snapshot.games.push(game.lock().await.clone());
        }

        match serde_json::to_vec_pretty(&snapshot) {
            Ok(json) => {
                let tmp = path.with_extension("tmp");
                let written = match tokio::fs::write(&tmp, json).await {
                    Ok(()) => tokio::fs::rename(&tmp, path).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = written {
                    error!(path = %path.display(), %err, "persist failed");
                }
            }
            Err(err) => error!(%err, "snapshot serialization failed"),
        }
    }

    pub async fn rng(&self) -> MutexGuard<'_, ChaCha8Rng> {
        self.rng.lock().await
    }

    pub async fn create_template(
        &self,
        name: &str,
        creator: &str,
        items: Vec<String>,
    ) -> Result<TemplateId, AppError> {
        let id = Uuid::new_v4().to_string();
        let template = BoardTemplate::new(id.clone(), name, creator, items)?;
        self.templates
            .write()
            .await
            .insert(id.clone(), Arc::new(RwLock::new(template)));
        Ok(id)
    }

    pub async fn template(&self, id: &str) -> Result<SharedTemplate, AppError> {
        self.templates
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(AppError::BoardNotFound)
    }

    async fn all_templates(&self) -> Vec<SharedTemplate> {
        self.templates.read().await.values().cloned().collect()
    }

    pub async fn create_game(
        &self,
        board_id: &str,
        creator: &str,
        settings: GameSettings,
    ) -> Result<CreatedGame, AppError> {
        let template = self.template(board_id).await?;
        let template = template.read().await;

        // Held across generation and insert so two creates cannot share a code.
        let mut codes = self.codes.write().await;
        let code = {
            let mut rng = self.rng().await;
            GameCode::generate(&mut *rng, self.config.code_length, |c| {
                codes.contains_key(c.as_str())
            })
        };
        let session = GameSession::create(
            code.clone(),
            &template,
            creator,
            settings,
            !self.config.forget_events,
        )?;
        let game_id = session.id().clone();
        let host_token = Uuid::new_v4().to_string();

        self.games.write().await.insert(
            game_id.clone(),
            Arc::new(Mutex::new(GameRecord {
                session,
                host_token: host_token.clone(),
            })),
        );
        codes.insert(code.to_string(), game_id.clone());
        drop(codes);

        Ok(CreatedGame {
            game_id,
            code,
            host_token,
        })
    }

    /// Resolves a user-typed code. Unknown or malformed codes are not found.
    pub async fn game_by_code(&self, raw: &str) -> Result<SharedGame, AppError> {
        let code = GameCode::parse(raw)?;
        let game_id = self
            .codes
            .read()
            .await
            .get(code.as_str())
            .cloned()
            .ok_or(GameError::GameNotFound)?;
        self.game(&game_id).await
    }

    pub async fn game(&self, game_id: &str) -> Result<SharedGame, AppError> {
        self.games
            .read()
            .await
            .get(game_id)
            .cloned()
            .ok_or(AppError::Game(GameError::GameNotFound))
    }

    pub async fn game_for_player(&self, player_id: &str) -> Result<SharedGame, AppError> {
        let game_id = self
            .players
            .read()
            .await
            .get(player_id)
            .cloned()
            .ok_or(GameError::PlayerNotFound)?;
        self.game(&game_id).await
    }

    pub async fn register_player(&self, player_id: &str, game_id: &str) {
        self.players
            .write()
            .await
            .insert(player_id.to_string(), game_id.to_string());
    }

    pub async fn all_games(&self) -> Vec<SharedGame> {
        self.games.read().await.values().cloned().collect()
    }

    /// Publishes a freshly logged event to the game's channel.
    pub fn announce(&self, game_id: &str, event: &GameEvent, origin: Option<ConnectionId>) {
        let view = EventView::live(event, self.config.event_window_secs as f64);
        self.broadcaster
            .publish(game_id, ServerMessage::Event(view), origin);
    }

    pub fn announce_roster(&self, session: &GameSession) {
        let message = ServerMessage::Players {
            connected_players: session.connected_players(),
        };
        self.broadcaster.publish(session.id(), message, None);
    }

    /// Backfill of events still inside the recent window.
    pub fn recent_events(&self, session: &GameSession) -> Vec<EventView> {
        session
            .events()
            .recent(self.config.event_window_secs, Utc::now())
            .iter()
            .map(EventView::from)
            .collect()
    }
}
