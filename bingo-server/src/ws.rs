//! Realtime channels: one per player connection, plus read-only spectators.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use bingo_core::{GameError, GameId, PlayerId};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::broadcast::{ConnectionId, Outbound, Role, Subscription};
use crate::error::{AppError, CLOSE_INTERNAL};
use crate::protocol::{BoardView, ClientMessage, ServerMessage};
use crate::state::{AppState, SharedGame};

type Sink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

const WIN_MESSAGE: &str = "BINGO! You won!";

pub async fn player_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| player_socket(socket, state, player_id))
}

pub async fn spectator_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| spectator_socket(socket, state, code))
}

/// What a player connection needs to act on its game.
pub struct PlayerContext {
    pub game: SharedGame,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub connection: ConnectionId,
}

async fn refuse(mut socket: WebSocket, err: &AppError) {
    info!(code = err.close_code(), %err, "connection refused");
    let frame = CloseFrame {
        code: err.close_code(),
        reason: err.public_message().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn close_with(sink: &Sink, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    let _ = sink.lock().await.send(Message::Close(Some(frame))).await;
}

/// Drains the connection's queue into the socket until either side goes away.
fn spawn_forwarder(sink: Sink, mut rx: mpsc::Receiver<Outbound>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&*message) {
                Ok(text) => text,
                Err(err) => {
                    error!(%err, "failed to encode outbound message");
                    continue;
                }
            };
            if sink.lock().await.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    })
}

/// Subscribes the player and queues the connect-time snapshot. Everything
/// happens under the game lock so no event can slip in ahead of the state.
pub(crate) async fn connect_player(
    state: &AppState,
    player_id: &str,
) -> Result<(PlayerContext, Subscription, mpsc::Receiver<Outbound>), AppError> {
    let game = state.game_for_player(player_id).await?;
    let mut record = game.lock().await;
    let session = &mut record.session;

    let player = session.player(player_id).ok_or(GameError::PlayerNotFound)?;
    if !session.is_active() && !player.has_won {
        return Err(GameError::GameInactive.into());
    }
    let role = Role::Player {
        player_id: player.id.clone(),
        show_own_events: player.preferences.show_own_events,
    };

    let (subscription, rx) = state.broadcaster.subscribe(session.id(), role);
    session.set_connected(player_id, true)?;
    state.announce_roster(session);

    let connection = subscription.id();
    state
        .broadcaster
        .send_to(connection, ServerMessage::GameState(session.state_for(player_id)?));
    if let Some(player) = session.player(player_id) {
        state
            .broadcaster
            .send_to(connection, ServerMessage::Board(BoardView::of(session, player)));
    }
    state.broadcaster.send_to(
        connection,
        ServerMessage::Events {
            events: state.recent_events(session),
        },
    );

    let context = PlayerContext {
        game_id: session.id().clone(),
        game: Arc::clone(&game),
        player_id: player_id.to_string(),
        connection,
    };
    Ok((context, subscription, rx))
}

#[instrument(skip_all, fields(player = %player_id))]
async fn player_socket(socket: WebSocket, state: AppState, player_id: String) {
    let (context, subscription, rx) = match connect_player(&state, &player_id).await {
        Ok(connected) => connected,
        Err(err) => return refuse(socket, &err).await,
    };
    info!(game = %context.game_id, connection = context.connection, "player connected");

    let (sink, stream) = socket.split();
    let sink: Sink = Arc::new(Mutex::new(sink));
    let mut send_task = spawn_forwarder(Arc::clone(&sink), rx);

    let outcome = tokio::select! {
        _ = &mut send_task => {
            debug!("outbound queue closed");
            Ok(())
        }
        result = receive_loop(&state, &context, stream) => result,
    };
    send_task.abort();

    if let Err(err) = outcome {
        error!(%err, "closing connection after internal error");
        close_with(&sink, CLOSE_INTERNAL, &err.public_message()).await;
    }

    drop(subscription);
    disconnect(&state, &context).await;
    info!(game = %context.game_id, "player disconnected");
}

async fn receive_loop(
    state: &AppState,
    context: &PlayerContext,
    mut stream: SplitStream<WebSocket>,
) -> Result<(), AppError> {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let Some(message) = ClientMessage::parse(&text) else {
            state
                .broadcaster
                .send_to(context.connection, ServerMessage::invalid_format());
            continue;
        };

        match dispatch(state, context, message).await {
            Ok(()) => {}
            Err(err @ AppError::Internal(_)) => return Err(err),
            Err(err) => {
                debug!(%err, "rejected");
                state.broadcaster.send_to(
                    context.connection,
                    ServerMessage::Rejected {
                        message: err.public_message(),
                    },
                );
            }
        }
    }
    Ok(())
}

async fn disconnect(state: &AppState, context: &PlayerContext) {
    {
        let mut record = context.game.lock().await;
        // another tab may still be open
        if state.broadcaster.player_connections(&context.player_id) > 0 {
            return;
        }
        if let Err(err) = record.session.set_connected(&context.player_id, false) {
            warn!(%err, "player vanished before disconnect");
        }
        state.announce_roster(&record.session);
    }
    state.persist().await;
}

/// Applies one inbound message. Business-rule failures come back as errors
/// for the caller to turn into `rejected` replies.
pub async fn dispatch(
    state: &AppState,
    context: &PlayerContext,
    message: ClientMessage,
) -> Result<(), AppError> {
    let reply = |message: ServerMessage| {
        state.broadcaster.send_to(context.connection, message);
    };

    match message {
        ClientMessage::MarkPosition { position } => {
            let mut record = context.game.lock().await;
            let session = &mut record.session;
            let (cell, event) = session.mark(&context.player_id, position)?;
            let win = session.check_win(&context.player_id, state.config.end_game_on_win)?;

            reply(ServerMessage::Cell(cell));
            state.announce(&context.game_id, &event, Some(context.connection));
            if let Some(win) = win {
                info!(game = %context.game_id, winner = %win.player_name, "player won");
                reply(ServerMessage::Won {
                    message: WIN_MESSAGE.to_string(),
                });
                state.broadcaster.publish(
                    &context.game_id,
                    ServerMessage::Winner {
                        winner: win.player_name.clone(),
                    },
                    None,
                );
                state.announce(&context.game_id, &win.event, Some(context.connection));
                if win.game_ended {
                    let winner = session.winner().map(|w| w.name.clone());
                    state.broadcaster.publish(
                        &context.game_id,
                        ServerMessage::GameEnded { winner },
                        None,
                    );
                }
            }
            drop(record);
            state.persist().await;
        }
        ClientMessage::RequestState => {
            let record = context.game.lock().await;
            let session = &record.session;
            reply(ServerMessage::GameState(session.state_for(&context.player_id)?));
            if let Some(player) = session.player(&context.player_id) {
                reply(ServerMessage::Board(BoardView::of(session, player)));
            }
        }
        ClientMessage::ClearBoard => {
            reset_and_send_board(state, context).await?;
            state.persist().await;
        }
        ClientMessage::MakeSuggestions => reply(ServerMessage::suggestion_form()),
        ClientMessage::SubmitSuggestions {
            suggestion1,
            suggestion2,
            suggestion3,
        } => {
            let texts: Vec<String> = [suggestion1, suggestion2, suggestion3]
                .into_iter()
                .flatten()
                .filter(|text| !text.trim().is_empty())
                .collect();
            if texts.is_empty() {
                return Err(GameError::Validation("at least one suggestion required".into()).into());
            }

            let mut accepted = Vec::new();
            let mut rejected = Vec::new();
            {
                let mut record = context.game.lock().await;
                let template = state.template(record.session.template_id()).await?;
                let mut template = template.write().await;
                for text in texts {
                    match record
                        .session
                        .record_suggestion(&context.player_id, &text, &mut template.items)
                    {
                        Ok(event) => {
                            state.announce(&context.game_id, &event, Some(context.connection));
                            accepted.push(text.trim().to_lowercase());
                        }
                        Err(GameError::DuplicateItem | GameError::Validation(_)) => {
                            rejected.push(text)
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
            info!(accepted = accepted.len(), rejected = rejected.len(), "suggestions recorded");
            reply(ServerMessage::SuggestionsRecorded { accepted, rejected });
            // accepted suggestions are already in the pool; save them even
            // if the fresh board cannot be dealt
            let reset = reset_and_send_board(state, context).await;
            state.persist().await;
            reset?;
        }
        ClientMessage::ChangeName { name } => {
            let mut record = context.game.lock().await;
            if let Some(event) = record.session.rename(&context.player_id, &name)? {
                state.announce(&context.game_id, &event, Some(context.connection));
                state.announce_roster(&record.session);
            }
            drop(record);
            state.persist().await;
        }
        ClientMessage::SetPreferences {
            show_own_events,
            use_suggested_items,
        } => {
            let mut record = context.game.lock().await;
            let preferences = record.session.set_preferences(
                &context.player_id,
                show_own_events,
                use_suggested_items,
            )?;
            state
                .broadcaster
                .set_show_own_events(&context.player_id, preferences.show_own_events);
            drop(record);
            state.persist().await;
        }
    }
    Ok(())
}

async fn reset_and_send_board(state: &AppState, context: &PlayerContext) -> Result<(), AppError> {
    let mut record = context.game.lock().await;
    let template = state.template(record.session.template_id()).await?;
    let template = template.read().await;
    {
        let mut rng = state.rng().await;
        record
            .session
            .reset_board(&context.player_id, &template.items, &mut *rng)?;
    }
    drop(template);

    let session = &record.session;
    let player = session
        .player(&context.player_id)
        .ok_or(GameError::PlayerNotFound)?;
    let board = ServerMessage::Board(BoardView::of(session, player));
    let game_state = ServerMessage::GameState(session.state_for(&context.player_id)?);
    state.broadcaster.send_to(context.connection, board);
    state.broadcaster.send_to(context.connection, game_state);
    Ok(())
}

#[instrument(skip_all, fields(game = %code))]
async fn spectator_socket(socket: WebSocket, state: AppState, code: String) {
    let (subscription, rx) = match connect_spectator(&state, &code).await {
        Ok(connected) => connected,
        Err(err) => return refuse(socket, &err).await,
    };
    info!(connection = subscription.id(), "spectator connected");

    let (sink, mut stream) = socket.split();
    let sink: Sink = Arc::new(Mutex::new(sink));
    let mut send_task = spawn_forwarder(sink, rx);

    // read-only: inbound frames are drained and ignored until close
    let drain = async {
        while let Some(frame) = stream.next().await {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    };
    tokio::select! {
        _ = &mut send_task => {}
        _ = drain => {}
    }
    send_task.abort();
    drop(subscription);
    info!("spectator disconnected");
}

async fn connect_spectator(
    state: &AppState,
    code: &str,
) -> Result<(Subscription, mpsc::Receiver<Outbound>), AppError> {
    let game = state.game_by_code(code).await?;
    let record = game.lock().await;
    let session = &record.session;

    let (subscription, rx) = state.broadcaster.subscribe(session.id(), Role::Spectator);
    state
        .broadcaster
        .send_to(subscription.id(), ServerMessage::SpectatorState(session.summary()));
    state.broadcaster.send_to(
        subscription.id(),
        ServerMessage::Events {
            events: state.recent_events(session),
        },
    );
    Ok((subscription, rx))
}
