use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bingo_core::{BoardTemplate, GameError, GameSettings, GameSummary, Preferences};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::identity;
use crate::protocol::{BoardView, EventView, ServerMessage};
use crate::state::AppState;

const ADMIN_HEADER: &str = "x-admin-password";
const HOST_HEADER: &str = "x-host-token";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    match header(headers, ADMIN_HEADER) {
        Some(provided) if provided == state.config.admin_password => Ok(()),
        _ => Err(AppError::Unauthorized("invalid admin password")),
    }
}

fn default_creator() -> String {
    "admin".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct CreateBoardRequest {
    name: String,
    #[serde(default = "default_creator")]
    creator: String,
    items: Vec<String>,
}

#[derive(Serialize)]
struct CreateBoardResponse {
    board_id: String,
}

#[instrument(skip_all, fields(board = %payload.name))]
pub async fn create_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let board_id = state
        .create_template(&payload.name, &payload.creator, payload.items)
        .await?;
    info!(%board_id, "board created");
    state.persist().await;

    Ok((StatusCode::CREATED, Json(CreateBoardResponse { board_id })))
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<BoardTemplate>, AppError> {
    let template = state.template(&board_id).await?;
    let template = template.read().await.clone();
    Ok(Json(template))
}

#[derive(Deserialize)]
pub struct CreateGameRequest {
    board_id: String,
    #[serde(default = "default_creator")]
    creator: String,
    #[serde(flatten)]
    settings: GameSettings,
}

#[derive(Serialize)]
struct CreateGameResponse {
    game_id: String,
    code: String,
    host_token: String,
}

#[instrument(skip_all, fields(board = %payload.board_id))]
pub async fn create_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateGameRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let created = state
        .create_game(&payload.board_id, &payload.creator, payload.settings)
        .await?;
    info!(game = %created.code, "game created");
    state.persist().await;

    Ok((
        StatusCode::CREATED,
        Json(CreateGameResponse {
            game_id: created.game_id,
            code: created.code.to_string(),
            host_token: created.host_token,
        }),
    ))
}

/// Active public games, newest first.
pub async fn list_games(State(state): State<AppState>) -> Json<Vec<GameSummary>> {
    let mut listed = Vec::new();
    for game in state.all_games().await {
        let record = game.lock().await;
        let session = &record.session;
        if session.is_active() && !session.settings().is_private {
            listed.push(session.summary());
        }
    }
    listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(listed)
}

pub async fn get_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GameSummary>, AppError> {
    let game = state.game_by_code(&code).await?;
    let summary = game.lock().await.session.summary();
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    all: bool,
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<EventView>,
}

pub async fn game_events(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let game = state.game_by_code(&code).await?;
    let record = game.lock().await;
    let events = if query.all {
        record
            .session
            .events()
            .all()
            .iter()
            .map(|event| EventView::live(event, 0.0))
            .collect()
    } else {
        state.recent_events(&record.session)
    };
    Ok(Json(EventsResponse { events }))
}

#[instrument(skip_all, fields(game = %code))]
pub async fn end_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GameSummary>, AppError> {
    let game = state.game_by_code(&code).await?;
    let mut record = game.lock().await;

    let Some(token) = header(&headers, HOST_HEADER) else {
        return Err(AppError::Unauthorized("host token required"));
    };
    if token != record.host_token {
        return Err(AppError::Unauthorized("invalid host token"));
    }

    if record.session.deactivate() {
        info!("game ended by host");
        let winner = record.session.winner().map(|w| w.name.clone());
        state.broadcaster.publish(
            record.session.id(),
            ServerMessage::GameEnded { winner },
            None,
        );
    }
    let summary = record.session.summary();
    drop(record);
    state.persist().await;

    Ok(Json(summary))
}

#[derive(Serialize)]
struct JoinPrefill {
    game: GameSummary,
    recent_name: Option<String>,
    /// Set when the identity cookie already belongs to this game.
    player_id: Option<String>,
}

pub async fn join_form(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let game = state.game_by_code(&code).await?;
    let record = game.lock().await;
    let session = &record.session;

    let player_id = identity::player_id(&headers)
        .filter(|id| session.player(id).is_some())
        .map(str::to_string);
    if !session.is_active() && player_id.is_none() {
        return Err(GameError::GameInactive.into());
    }

    Ok(Json(JoinPrefill {
        game: session.summary(),
        recent_name: identity::recent_name(&headers),
        player_id,
    }))
}

#[derive(Deserialize)]
pub struct JoinRequest {
    name: String,
    #[serde(default = "default_true")]
    use_suggested_items: bool,
}

#[derive(Serialize)]
struct JoinResponse {
    player_id: String,
    rejoined: bool,
}

/// Creates or reclaims a player, then redirects to the play view with the
/// identity cookies set.
#[instrument(skip_all, fields(game = %code))]
pub async fn join_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<JoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    let game = state.game_by_code(&code).await?;
    let mut record = game.lock().await;
    let template = state.template(record.session.template_id()).await?;
    let template = template.read().await;

    let outcome = {
        let mut rng = state.rng().await;
        record.session.join(
            identity::player_id(&headers),
            &payload.name,
            payload.use_suggested_items,
            &template.items,
            &mut *rng,
        )?
    };
    drop(template);

    let name = record
        .session
        .player(&outcome.player_id)
        .map(|p| p.name.clone())
        .ok_or(GameError::PlayerNotFound)?;
    let game_id = record.session.id().clone();
    if let Some(event) = &outcome.event {
        state.announce(&game_id, event, None);
    }
    drop(record);

    state.register_player(&outcome.player_id, &game_id).await;
    info!(player = %outcome.player_id, rejoined = outcome.rejoined, "player joined");
    state.persist().await;

    let location = HeaderValue::from_str(&format!("/play/{}", outcome.player_id))
        .map_err(|err| AppError::Internal(err.to_string()))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(LOCATION, location);
    identity::remember(&mut response_headers, &outcome.player_id, &name);

    Ok((
        StatusCode::SEE_OTHER,
        response_headers,
        Json(JoinResponse {
            player_id: outcome.player_id,
            rejoined: outcome.rejoined,
        }),
    ))
}

#[derive(Serialize)]
struct PlayView {
    player_id: String,
    name: String,
    preferences: Preferences,
    board: BoardView,
    game: GameSummary,
}

pub async fn play_view(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let game = state.game_for_player(&player_id).await?;
    let record = game.lock().await;
    let session = &record.session;
    let player = session.player(&player_id).ok_or(GameError::PlayerNotFound)?;
    if !session.is_active() && !player.has_won {
        return Err(GameError::GameInactive.into());
    }

    Ok(Json(PlayView {
        player_id: player.id.clone(),
        name: player.name.clone(),
        preferences: player.preferences,
        board: BoardView::of(session, player),
        game: session.summary(),
    }))
}

/// Deals a new board. Works after the game has ended.
#[instrument(skip_all, fields(player = %player_id))]
pub async fn clear_board(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<BoardView>, AppError> {
    let game = state.game_for_player(&player_id).await?;
    let mut record = game.lock().await;
    let template = state.template(record.session.template_id()).await?;
    let template = template.read().await;

    {
        let mut rng = state.rng().await;
        record
            .session
            .reset_board(&player_id, &template.items, &mut *rng)?;
    }
    drop(template);

    let session = &record.session;
    let player = session.player(&player_id).ok_or(GameError::PlayerNotFound)?;
    let board = BoardView::of(session, player);
    drop(record);
    state.persist().await;

    Ok(Json(board))
}

pub async fn healthz() -> &'static str {
    "ok"
}
