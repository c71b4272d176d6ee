//! WebSocket session watch
//!
//! `GET /ws/sessions/:id` replays a session's event log and then follows its
//! live events, in sequence order and without duplicates. Watchers that fall
//! behind resynchronize from the log. Watching is read-only: a watcher never
//! influences the session task. Supports ping/pong for connection keepalive.

use crate::error::AppError;
use crate::session::{
    ProgressEvent, SessionId, SessionRegistry, SessionStatus, Subscription,
};
use crate::state::SharedState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{error, info, warn};

/// How often a watcher re-checks the session status
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// WebSocket message types for session watching
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum WebSocketMessage {
    /// Sent once on connect
    #[serde(rename = "session_state")]
    SessionState {
        /// Watched session
        session_id: SessionId,
        /// Status at connect time
        status: SessionStatus,
    },
    /// One progress event
    #[serde(rename = "progress_event")]
    ProgressEvent {
        /// The event
        event: ProgressEvent,
    },
    /// The watched run is over; no further events follow
    #[serde(rename = "session_closed")]
    SessionClosed {
        /// Final status, if the session still exists
        status: Option<SessionStatus>,
    },
    /// Ping message for connection keepalive
    #[serde(rename = "ping")]
    Ping,
    /// Pong message responding to ping
    #[serde(rename = "pong")]
    Pong,
}

impl WebSocketMessage {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                error!("Failed to serialize WebSocket message: {}", e);
                None
            }
        }
    }
}

/// WebSocket upgrade handler for a session watch
///
/// # Returns
/// * `Ok(Response)` - HTTP response initiating the WebSocket connection
/// * `Err(AppError::SessionNotFound)` - Unknown or expired session
pub async fn session_watch_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Path(id): Path<SessionId>,
) -> Result<Response, AppError> {
    let subscription = state.sessions.subscribe(&id).await?;
    let registry = state.sessions.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, registry, id, subscription)))
}

// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    registry: SessionRegistry,
    session_id: SessionId,
    subscription: Subscription,
) {
    let (mut sender, mut receiver) = socket.split();
    info!(session_id = %session_id, "WebSocket watcher connected");

    // Use a channel to send messages from the other tasks to the sender
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Task to forward messages from channel to sender
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sender.send(msg).await {
                error!("Failed to send message: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Task to follow the session
    let follow_tx = tx.clone();
    let follow_id = session_id.clone();
    let mut follow_task = tokio::spawn(async move {
        follow_session(registry, follow_id, subscription, follow_tx).await;
    });

    // Receive messages
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<WebSocketMessage>(&text) {
                        Ok(WebSocketMessage::Ping) => {
                            if let Some(pong) = WebSocketMessage::Pong.to_message() {
                                if tx.send(pong).is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(other) => warn!("Received unhandled WebSocket message: {:?}", other),
                        Err(_) => warn!("Received unparseable WebSocket message"),
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket client disconnected");
                    break;
                }
                Ok(Message::Pong(_)) => {
                    // Client responded to ping
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for the sender or the receiver to finish. The follow task ending
    // only means no more events; the close frame it queued still has to go out.
    tokio::select! {
        _ = &mut send_task => {
            follow_task.abort();
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            follow_task.abort();
        }
    }

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Replay the backlog, then forward live events until the run is over
async fn follow_session(
    registry: SessionRegistry,
    session_id: SessionId,
    subscription: Subscription,
    tx: mpsc::UnboundedSender<Message>,
) {
    let Subscription {
        backlog,
        mut live,
        status,
    } = subscription;

    let mut cursor = Cursor::default();
    let initial = WebSocketMessage::SessionState {
        session_id: session_id.clone(),
        status,
    };
    if !cursor.send(&tx, initial) {
        return;
    }
    for event in backlog {
        if !cursor.forward(&tx, event) {
            return;
        }
    }

    let mut poll = tokio::time::interval(STATUS_POLL_INTERVAL);
    while !cursor.done {
        tokio::select! {
            received = live.recv() => match received {
                Ok(event) if event.seq > cursor.last_seq + 1 => {
                    // Gap: take the missing events from the log.
                    if !cursor.resync(&registry, &session_id, &tx).await {
                        return;
                    }
                }
                Ok(event) => {
                    if !cursor.forward(&tx, event) {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %session_id, skipped, "Watcher lagged, resynchronizing");
                    if !cursor.resync(&registry, &session_id, &tx).await {
                        return;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            _ = poll.tick() => {
                match registry.status(&session_id).await {
                    Some(status) if !status.is_finished() => {}
                    // Finished without a terminal event (cancelled) or swept.
                    _ => {
                        if !cursor.resync(&registry, &session_id, &tx).await {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    }

    let status = registry.status(&session_id).await;
    if cursor.send(&tx, WebSocketMessage::SessionClosed { status }) {
        let _ = tx.send(Message::Close(None));
    }
}

/// Position of a watcher in the session's event sequence
#[derive(Default)]
struct Cursor {
    last_seq: u64,
    done: bool,
}

impl Cursor {
    fn send(&self, tx: &mpsc::UnboundedSender<Message>, msg: WebSocketMessage) -> bool {
        match msg.to_message() {
            Some(message) => tx.send(message).is_ok(),
            None => true,
        }
    }

    /// Forward an event unless it was already sent
    fn forward(&mut self, tx: &mpsc::UnboundedSender<Message>, event: ProgressEvent) -> bool {
        if event.seq <= self.last_seq || self.done {
            return true;
        }
        self.last_seq = event.seq;
        self.done = event.kind.is_terminal();
        self.send(tx, WebSocketMessage::ProgressEvent { event })
    }

    /// Forward everything the log holds past the cursor
    async fn resync(
        &mut self,
        registry: &SessionRegistry,
        session_id: &str,
        tx: &mpsc::UnboundedSender<Message>,
    ) -> bool {
        let Some(events) = registry.events_since(session_id, self.last_seq).await else {
            self.done = true;
            return true;
        };
        for event in events {
            if !self.forward(tx, event) {
                return false;
            }
        }
        true
    }
}
