//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::ConnId;
use crate::rooms::RoomError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Per-connection outbound queue depth
const OUTBOUND_CAPACITY: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(player_id = %conn_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id: conn_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %conn_id, error = %e, "Failed to send welcome");
        return;
    }

    run_session(conn_id, ws_sink, ws_stream, &state).await;

    // Cleanup on disconnect
    if let Some(room) = state.rooms.current_room(&conn_id) {
        state.rooms.leave_room(conn_id).await;
        info!(player_id = %conn_id, room = %room, "Left room on disconnect");
    }

    info!(player_id = %conn_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: ConnId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_CAPACITY);

    // Writer task: room output -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> room
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_intent() {
                    warn!(player_id = %conn_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => route_message(conn_id, client_msg, &out_tx, state).await,
                    Err(e) => {
                        warn!(player_id = %conn_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Hand a parsed message to the connection layer or the player's room
async fn route_message(
    conn_id: ConnId,
    msg: ClientMsg,
    out_tx: &mpsc::Sender<ServerMsg>,
    state: &AppState,
) {
    match msg {
        ClientMsg::JoinRoom { room } => {
            if let Err(e) = state
                .rooms
                .join_room(conn_id, room.as_deref(), out_tx.clone())
                .await
            {
                warn!(player_id = %conn_id, error = %e, "Join failed");
            }
        }
        ClientMsg::Ping { t } => {
            let _ = out_tx.try_send(ServerMsg::Pong { t });
        }
        other => match state.rooms.dispatch(conn_id, other).await {
            Ok(()) => {}
            Err(RoomError::NotInRoom) => {
                debug!(player_id = %conn_id, "Intent before joining a room, ignoring");
            }
            Err(e) => {
                debug!(player_id = %conn_id, error = %e, "Intent not delivered");
            }
        },
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
