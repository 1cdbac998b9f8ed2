use axum::{
    Json,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use app_error::{AppError, AppResult};
use app_middleware::AuthUser;
use app_models::{ActiveChat, ChatInbound, ChatMessage, ChatSession, MessageResponse};

use super::ChatIdQuery;
use crate::chat::{self, HubEvent};
use crate::state::AppState;

pub async fn start_chat(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ChatSession>> {
    let session = chat::get_or_create_session(state.store.as_ref(), user.id()).await?;
    Ok(Json(session))
}

/// Messages of a session, visible to its client and to admins.
pub async fn chat_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ChatIdQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let chat_id = query.require()?;

    let session = state
        .store
        .get_chat_session(&chat_id)
        .await?
        .ok_or_else(|| AppError::resource_not_found("Chat session", &chat_id))?;
    if session.client_id != user.id() && !user.is_admin() {
        return Err(AppError::AuthorizationError(
            "You can only read your own chats".to_string(),
        ));
    }

    Ok(Json(state.store.chat_history(&chat_id).await?))
}

pub async fn active_chats(State(state): State<AppState>) -> AppResult<Json<Vec<ActiveChat>>> {
    let mut chats = Vec::new();

    for (chat_id, clients) in state.chat.active() {
        // Rooms are only opened for stored sessions; a missing one was deleted.
        let Some(session) = state.store.get_chat_session(&chat_id).await? else {
            continue;
        };
        chats.push(ActiveChat {
            chat_id,
            client: session.client_id,
            started_at: session.created_at,
            clients,
        });
    }

    Ok(Json(chats))
}

pub async fn close_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ChatIdQuery>,
) -> AppResult<Json<MessageResponse>> {
    let chat_id = query.require()?;

    if state.store.close_chat_session(&chat_id).await?.is_none() {
        return Err(AppError::resource_not_found("Chat session", &chat_id));
    }
    let disconnected = state.chat.close(&chat_id);
    info!(chat_id = %chat_id, admin = %user.id(), disconnected, "Chat closed");

    Ok(Json(MessageResponse::new("Chat closed successfully")))
}

/// `GET /ws?chat_id=`: joins the requested chat while it is active and owned
/// by the caller (or the caller is an admin), else the caller's own active chat.
pub async fn ws_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ChatIdQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let requested = query
        .require()
        .map_err(|_| AppError::InputError("Missing chat session ID".to_string()))?;

    let session = chat::resolve_session(
        state.store.as_ref(),
        &requested,
        user.id(),
        user.is_admin(),
    )
    .await?;
    if session.id != requested {
        debug!(requested = %requested, chat_id = %session.id, "Using caller's active chat");
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let fallback_name = user.0.email.clone();
    Ok(upgrade.on_upgrade(move |socket| run_socket(socket, state, session.id, fallback_name)))
}

async fn run_socket(socket: WebSocket, state: AppState, chat_id: String, fallback_name: String) {
    let mut membership = state.chat.join(&chat_id);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = membership.recv() => match event {
                Some(HubEvent::Message(message)) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode chat message: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(HubEvent::Closed) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&state, &chat_id, &fallback_name, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(chat_id = %membership.chat_id(), "Chat socket finished");
}

async fn handle_frame(state: &AppState, chat_id: &str, fallback_name: &str, text: &str) {
    let inbound: ChatInbound = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(chat_id, "Ignoring malformed chat frame: {}", e);
            return;
        }
    };

    let Some(message) = chat::stamp_message(chat_id, fallback_name, inbound) else {
        return;
    };

    if let Err(e) = state.store.save_chat_message(&ChatMessage::from(&message)).await {
        error!(chat_id, "Failed to save chat message: {}", e);
    }
    state.chat.publish(message);
}
