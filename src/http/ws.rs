//! Websocket upgrade endpoint: drives one session end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::StreamExt;
use tracing::info;
use uuid::Uuid;

use super::to_int;
use crate::session::browser_io::{BrowserIo, WsBrowserIo};
use crate::session::{router, Session};
use crate::state::AppState;

const DEFAULT_WIDTH: u16 = 80;
const DEFAULT_HEIGHT: u16 = 24;
/// Idle-connection ping interval, matching the original server's
/// `WebSocketResponse(heartbeat=15)`.
const HEARTBEAT: Duration = Duration::from_secs(15);

pub async fn handle_websocket(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let width = to_int(params.get("width"), DEFAULT_WIDTH);
    let height = to_int(params.get("height"), DEFAULT_HEIGHT);
    ws.on_upgrade(move |socket| run_session(state, socket, width, height))
}

async fn run_session(state: Arc<AppState>, socket: WebSocket, width: u16, height: u16) {
    let (sink, mut stream) = socket.split();
    let browser = Arc::new(WsBrowserIo::new(sink));
    let id = Uuid::new_v4().to_string();

    info!(session = %id, width, height, "session starting");

    let session = Session::new(
        id.clone(),
        state.config.command.clone(),
        state.config.debug,
        browser.clone(),
        state.broker.clone(),
    );
    session.start(width, height).await;

    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    heartbeat.tick().await; // first tick fires immediately, skip it

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        router::handle_browser_message(&session, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(session = %id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if !browser.ping().await {
                    break;
                }
            }
        }
    }

    session.stop().await;
    info!(session = %id, "session ended");
}
