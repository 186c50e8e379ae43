//! Telephony WebSocket endpoint.
//!
//! Each accepted connection becomes one [`BridgeSession`] that lives for the
//! duration of the call. The session registers itself in the process-wide
//! registry once the `start` event arrives and removes itself on close.

use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

use crate::api::AppState;
use crate::bridge::session::BridgeSession;

/// WebSocket upgrade handler for the telephony peer.
pub async fn telephony_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_telephony(socket, state))
}

/// Runs one call end to end.
async fn handle_telephony(socket: WebSocket, state: AppState) {
    let (session, telephony_rx) = BridgeSession::accept(
        (*state.config).clone(),
        state.registry.clone(),
        state.stats_writer.clone(),
    );

    log::info!(
        "[WS] New telephony connection - session: {}",
        session.session_id()
    );

    let session_id = session.session_id().to_string();
    session.run(socket, telephony_rx).await;

    log::info!("[WS] Session {} ended", session_id);
}
