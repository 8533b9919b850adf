pub mod broadcast;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod protocol;
pub mod state;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::AppError;
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/board", post(http::create_board))
        .route("/board/:id", get(http::get_board))
        .route("/game", post(http::create_game))
        .route("/games", get(http::list_games))
        .route("/game/:code", get(http::get_game))
        .route("/game/:code/events", get(http::game_events))
        .route("/game/:code/end", post(http::end_game))
        .route("/join/:code", get(http::join_form).post(http::join_game))
        .route("/play/:player_id", get(http::play_view))
        .route("/player/:player_id/clear", post(http::clear_board))
        .route("/ws/game/:player_id", get(ws::player_ws))
        .route("/ws/spectate/:code", get(ws::spectator_ws))
        .route("/healthz", get(http::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
