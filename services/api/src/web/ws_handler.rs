//! services/api/src/web/ws_handler.rs
//!
//! The editor WebSocket. Each connection owns one `EditorSession`: the client
//! streams its form state in, and status changes are streamed back out.

use crate::error::ApiError;
use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, AuthContext},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use cv_builder_core::autosave::{EditorSession, StatusView};
use cv_builder_core::domain::Document;
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn editor_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, auth))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, auth: AuthContext) {
    info!(user_id = %auth.user_id, "Editor connection established");

    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // --- 1. Mount the editor over this connection's form state ---
    let (form_tx, form_rx) = watch::channel(Document::default());
    let mut session = EditorSession::start(
        form_rx,
        app_state.editor_services(&auth),
        app_state.config.autosave(),
    )
    .await;

    let forwarding = CancellationToken::new();
    let forwarder = tokio::spawn(forward_status(
        session.subscribe(),
        ws_sender.clone(),
        forwarding.clone(),
    ));

    // --- 2. Main Message Loop ---
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = handle_text_message(text.as_str(), &session, &form_tx).await;
                if let Some(reply) = reply {
                    if let Err(e) = send_message(&ws_sender, &reply).await {
                        warn!("Failed to reply to editor: {}", e);
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Editor connection error: {}", e);
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    forwarding.cancel();
    session.close();
    if let Err(e) = forwarder.await {
        error!("Status forwarder ended abnormally: {:?}", e);
    }
    info!(user_id = %auth.user_id, "Editor connection closed");
}

/// Applies one client message and returns the direct reply, if any.
async fn handle_text_message(
    text: &str,
    session: &EditorSession,
    form_tx: &watch::Sender<Document>,
) -> Option<ServerMessage> {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            return Some(ServerMessage::Error {
                message: "Unrecognized message".to_string(),
            });
        }
    };

    match client_msg {
        ClientMessage::UpdateDocument { document } => {
            form_tx.send_replace(document);
            None
        }
        ClientMessage::ManualSave => Some(match session.manual_save().await {
            Ok(outcome) => ServerMessage::save_result(outcome),
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            },
        }),
        ClientMessage::LoadRecord { record_id } => {
            Some(match session.load_record(record_id, form_tx).await {
                Ok(document) => ServerMessage::RecordLoaded {
                    record_id,
                    document,
                },
                Err(e) => {
                    warn!(record_id = %record_id, "Failed to load CV: {}", e);
                    ServerMessage::Error {
                        message: e.to_string(),
                    }
                }
            })
        }
        ClientMessage::NewSession => {
            session.start_new_session(form_tx).await;
            None
        }
    }
}

/// Pushes every status change to the client until cancelled.
async fn forward_status(
    mut status: watch::Receiver<StatusView>,
    ws_sender: WsSender,
    shutdown: CancellationToken,
) {
    loop {
        let view = status.borrow_and_update().clone();
        if let Err(e) = send_message(&ws_sender, &ServerMessage::Status { view }).await {
            warn!("Failed to send status update: {}", e);
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn send_message(ws_sender: &WsSender, msg: &ServerMessage) -> Result<(), ApiError> {
    let json = serde_json::to_string(msg)?;
    ws_sender.lock().await.send(Message::Text(json.into())).await?;
    Ok(())
}
