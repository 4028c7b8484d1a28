use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::Method;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use varta_shared::protocol::{ClientFrame, ServerFrame};

use crate::error::RelayError;
use crate::relay::RelayState;

pub fn build_router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the relay on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, state: RelayState) -> Result<(), RelayError> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Relay listening");
    }
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    clients: usize,
    rooms: usize,
}

async fn health_check(State(state): State<RelayState>) -> Json<HealthResponse> {
    let stats = state.stats();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: stats.clients,
        rooms: stats.rooms,
    })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (sid, mut outbound) = state.register();
    let (mut ws_tx, mut ws_rx) = socket.split();

    if let Err(e) = state.send_to(&sid, &ServerFrame::Session { sid: sid.clone() }) {
        warn!(sid = %sid, error = %e, "Failed to queue session frame");
        state.unregister(&sid);
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        // The session was unregistered: hang up.
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    while let Some(incoming) = ws_rx.next().await {
        let text = match incoming {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(sid = %sid, error = %e, "Socket read failed");
                break;
            }
        };

        let frame = match ClientFrame::from_json(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(sid = %sid, error = %e, "Dropping malformed client frame");
                continue;
            }
        };

        match frame {
            ClientFrame::JoinRoom(room) => {
                if let Err(e) = state.join(&sid, &room.id) {
                    warn!(sid = %sid, room = %room.id, error = %e, "Join refused");
                }
            }
            ClientFrame::LeaveRoom(room) => state.leave(&sid, &room.id),
            ClientFrame::SendMessage(message) => {
                debug!(sid = %sid, origin = %message.sender_id, room = %message.room_id, "Transmission");
                if let Err(e) = state.route(message) {
                    warn!(sid = %sid, error = %e, "Failed to relay message");
                }
            }
        }
    }

    state.unregister(&sid);
    writer.abort();
}
