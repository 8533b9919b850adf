use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bingo_core::GameError;
use serde::Serialize;

/// Close code for an unexpected server fault.
pub const CLOSE_INTERNAL: u16 = 4000;
/// Close code when the player or game does not exist.
pub const CLOSE_NOT_FOUND: u16 = 4004;
/// Close code when the game has ended for this client.
pub const CLOSE_GAME_INACTIVE: u16 = 4010;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("board not found")]
    BoardNotFound,
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Game(err) => match err {
                GameError::Validation(_) | GameError::InvalidPosition(_) => StatusCode::BAD_REQUEST,
                GameError::GameNotFound | GameError::PlayerNotFound => StatusCode::NOT_FOUND,
                GameError::GameInactive
                | GameError::AlreadyWon
                | GameError::DuplicateItem
                | GameError::FreeSquareLocked => StatusCode::CONFLICT,
                GameError::InsufficientItems { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::BoardNotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Which websocket close code a failed connect maps to.
    pub fn close_code(&self) -> u16 {
        match self {
            AppError::Game(GameError::GameNotFound | GameError::PlayerNotFound)
            | AppError::BoardNotFound => CLOSE_NOT_FOUND,
            AppError::Game(GameError::GameInactive) => CLOSE_GAME_INACTIVE,
            _ => CLOSE_INTERNAL,
        }
    }

    /// Text safe to show a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!(%detail, "request failed");
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
