use crate::domain::errors::JoinError;
use crate::domain::state::now_millis;
use crate::domain::{ChatMessage, Direction, Intent, IntentKind, SessionId, Tile};
use crate::interface_adapters::http::error_response;
use crate::interface_adapters::protocol::{ChatDto, ClientMessage, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::ids::next_session_id;
use crate::use_cases::{Placement, leave};

use axum::{
    Error,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::Response,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, watch};
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    IntentsClosed,
    SnapshotsClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ConnectQuery {
    // Forwarded to the character store on join.
    #[serde(default)]
    access_token: Option<String>,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_ACCESS_TOKEN_LEN: usize = 4096;
const SYSTEM_SENDER: &str = "System";

const WELCOME_NOTICE_PREFIX: &str = "Welcome! Spawned at";
const MAP_FULL_NOTICE: &str = "Map is full. Try again later.";
const LOAD_FAILED_NOTICE: &str = "Unable to load character.";

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let access_token = query
        .access_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty() && token.len() <= MAX_ACCESS_TOKEN_LEN);
    let Some(access_token) = access_token else {
        return error_response(StatusCode::UNAUTHORIZED, "access_token is required");
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, access_token))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, access_token: String) {
    let session_id = next_session_id();
    let span = info_span!("conn", session_id, character_id = tracing::field::Empty);
    run_connection(socket, state, access_token, session_id)
        .instrument(span)
        .await
}

async fn run_connection(
    mut socket: WebSocket,
    state: Arc<AppState>,
    access_token: String,
    session_id: SessionId,
) {
    // Subscribe before any await so no snapshot or chat line is missed.
    let mut ctx = ConnCtx::new(session_id, access_token, &state);

    // Tell the client "This is who you are".
    match send_message(&mut socket, &ServerMessage::Identity { session_id }).await {
        Ok(bytes) => ctx.record_out(bytes),
        Err(e) => {
            warn!(error = ?e, "failed to send identity");
            return;
        }
    }
    info!("client connected");

    if let Err(e) = run_client_loop(&mut socket, &state, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }

    disconnect_cleanup(&state, &ctx).await;
}

struct ConnCtx {
    session_id: SessionId,
    access_token: String,
    // Intents are only accepted once a character is in the world.
    joined: bool,

    snapshot_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    snapshot_latest_rx: watch::Receiver<Utf8Bytes>,
    chat_rx: broadcast::Receiver<ChatMessage>,
    // Count lag recovery snapshots sent to this client.
    lag_recovery_count: u64,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_snapshot_lag_log: Instant,
    last_chat_lag_log: Instant,
    last_invalid_input_log: Instant,

    close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    fn new(session_id: SessionId, access_token: String, state: &AppState) -> Self {
        let now = Instant::now() - LOG_THROTTLE;
        Self {
            session_id,
            access_token,
            joined: false,
            snapshot_bytes_rx: state.snapshot_bytes_tx.subscribe(),
            snapshot_latest_rx: state.snapshot_latest_tx.subscribe(),
            chat_rx: state.broadcaster.subscribe_chat(),
            lag_recovery_count: 0,
            msgs_in: 0,
            msgs_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            invalid_json: 0,
            last_snapshot_lag_log: now,
            last_chat_lag_log: now,
            last_invalid_input_log: now,
            close_frame: None,
        }
    }

    fn record_out(&mut self, bytes: usize) {
        self.msgs_out += 1;
        self.bytes_out += bytes as u64;
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

async fn run_client_loop(
    socket: &mut WebSocket,
    state: &AppState,
    ctx: &mut ConnCtx,
) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let control = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => handle_incoming_ws(socket, state, ctx, incoming).await,

            // Outgoing snapshot
            snapshot = ctx.snapshot_bytes_rx.recv() => match snapshot {
                Ok(bytes) => Ok(forward_bytes(socket, ctx, bytes).await),
                Err(broadcast::error::RecvError::Lagged(n)) => Ok(recover_from_lag(socket, ctx, n).await),
                Err(broadcast::error::RecvError::Closed) => Err(NetError::SnapshotsClosed),
            },

            // Outgoing chat
            chat = ctx.chat_rx.recv() => match chat {
                Ok(message) => Ok(forward_chat(socket, ctx, message).await),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    if should_log(&mut ctx.last_chat_lag_log) {
                        warn!(missed = n, "chat lagged; messages dropped for this client");
                    }
                    Ok(LoopControl::Continue)
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("chat channel closed; disconnecting");
                    Ok(LoopControl::Disconnect)
                }
            },
        };

        let disconnect = match control {
            Ok(LoopControl::Continue) => false,
            Ok(LoopControl::Disconnect) => true,
            Err(e) => {
                fatal = Some(e);
                true
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_incoming_ws(
    socket: &mut WebSocket,
    state: &AppState,
    ctx: &mut ConnCtx,
    incoming: Option<Result<Message, Error>>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                ctx.bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => handle_client_message(socket, state, ctx, message).await,
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_input_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if ctx.invalid_json > MAX_INVALID_JSON {
                            ctx.close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn handle_client_message(
    socket: &mut WebSocket,
    state: &AppState,
    ctx: &mut ConnCtx,
    message: ClientMessage,
) -> Result<LoopControl, NetError> {
    let kind = match message {
        ClientMessage::JoinCharacter { character_id } => {
            return Ok(join_character(socket, state, ctx, character_id).await);
        }
        ClientMessage::MoveCharacter { direction } => match Direction::parse(&direction) {
            Some(direction) => IntentKind::Move { direction },
            None => {
                debug!(%direction, "unknown direction dropped");
                return Ok(LoopControl::Continue);
            }
        },
        ClientMessage::SendMessage { text } => IntentKind::Message { text },
        ClientMessage::StartAutoWalk { dest_x, dest_y } => IntentKind::Pathfind {
            dest: Tile::new(dest_x, dest_y),
        },
    };

    if !ctx.joined {
        if should_log(&mut ctx.last_invalid_input_log) {
            warn!("intent before join ignored");
        }
        return Ok(LoopControl::Continue);
    }

    state
        .intents
        .enqueue(Intent::new(ctx.session_id, kind))
        .map_err(|_| NetError::IntentsClosed)?;
    Ok(LoopControl::Continue)
}

async fn join_character(
    socket: &mut WebSocket,
    state: &AppState,
    ctx: &mut ConnCtx,
    character_id: Uuid,
) -> LoopControl {
    let notice = match state
        .join
        .execute(&ctx.access_token, character_id, ctx.session_id)
        .await
    {
        Ok(Placement::Spawned(tile)) => {
            ctx.joined = true;
            Span::current().record("character_id", tracing::field::display(character_id));
            format!("{WELCOME_NOTICE_PREFIX} ({}, {}).", tile.x, tile.y)
        }
        Ok(Placement::AlreadyPresent(_)) => {
            // Repeated joins keep the session stable.
            if should_log(&mut ctx.last_invalid_input_log) {
                warn!("duplicate join ignored");
            }
            return LoopControl::Continue;
        }
        Err(JoinError::WorldFull) => {
            warn!(%character_id, "no open spawn tile; join rejected");
            MAP_FULL_NOTICE.to_string()
        }
        Err(JoinError::CharacterUnavailable(error)) => {
            warn!(%character_id, %error, "failed to load character");
            LOAD_FAILED_NOTICE.to_string()
        }
    };

    let message = ChatMessage {
        timestamp_ms: now_millis(),
        sender_name: SYSTEM_SENDER.to_string(),
        text: notice,
    };
    forward_chat(socket, ctx, message).await
}

async fn forward_bytes(socket: &mut WebSocket, ctx: &mut ConnCtx, bytes: Utf8Bytes) -> LoopControl {
    let bytes_len = bytes.len();
    match socket.send(Message::Text(bytes)).await.map_err(NetError::Ws) {
        Ok(()) => {
            ctx.record_out(bytes_len);
            LoopControl::Continue
        }
        Err(err) => {
            // Disconnect follows immediately.
            warn!(error = ?err, "failed to send snapshot");
            LoopControl::Disconnect
        }
    }
}

async fn recover_from_lag(socket: &mut WebSocket, ctx: &mut ConnCtx, missed: u64) -> LoopControl {
    if should_log(&mut ctx.last_snapshot_lag_log) {
        warn!(missed, "snapshots lagged; sending latest");
    }

    // Resync strategy: send the latest snapshot only.
    let latest = ctx.snapshot_latest_rx.borrow().clone();
    if latest.is_empty() {
        return LoopControl::Continue;
    }
    ctx.lag_recovery_count += 1;
    debug!(count = ctx.lag_recovery_count, "sent lag recovery snapshot");
    forward_bytes(socket, ctx, latest).await
}

async fn forward_chat(socket: &mut WebSocket, ctx: &mut ConnCtx, message: ChatMessage) -> LoopControl {
    match send_message(socket, &ServerMessage::Message(ChatDto::from(message))).await {
        Ok(bytes) => {
            ctx.record_out(bytes);
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send chat message");
            LoopControl::Disconnect
        }
    }
}

async fn disconnect_cleanup(state: &AppState, ctx: &ConnCtx) {
    // Leave is idempotent; connections that never joined remove nothing.
    let left = leave(&state.registry, ctx.session_id).await;
    info!(
        joined = ctx.joined,
        left,
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        lag_recovery = ctx.lag_recovery_count,
        "client disconnected"
    );
}
