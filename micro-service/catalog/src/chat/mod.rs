pub mod hub;

pub use hub::{ChatHub, HubEvent, Membership};

use chrono::Utc;
use tracing::{info, warn};

use app_database::Store;
use app_error::AppResult;
use app_models::{ChatInbound, ChatSession, ChatWsMessage};

/// The caller's active session, opened on first use.
pub async fn get_or_create_session(store: &dyn Store, client_id: &str) -> AppResult<ChatSession> {
    if let Some(session) = store.find_active_chat_session(client_id).await? {
        return Ok(session);
    }

    let session = ChatSession::open(client_id.to_string());
    store.create_chat_session(&session).await?;
    info!(chat_id = %session.id, client = %client_id, "Opened chat session");
    Ok(session)
}

/// The session a socket joins: the requested one while it is active and the
/// caller owns it (admins may join any), otherwise the caller's own active
/// session.
pub async fn resolve_session(
    store: &dyn Store,
    requested: &str,
    client_id: &str,
    is_admin: bool,
) -> AppResult<ChatSession> {
    match store.get_chat_session(requested).await? {
        Some(session) if session.is_active() && (is_admin || session.client_id == client_id) => {
            Ok(session)
        }
        Some(session) if session.is_active() => {
            warn!(chat_id = %session.id, client = %client_id, "Refusing to join another user's chat");
            get_or_create_session(store, client_id).await
        }
        _ => get_or_create_session(store, client_id).await,
    }
}

/// Turns an inbound frame into the broadcast form. The room and time are
/// always set here; blank usernames fall back to the caller's name and blank
/// content is dropped.
pub fn stamp_message(chat_id: &str, fallback_name: &str, inbound: ChatInbound) -> Option<ChatWsMessage> {
    let content = inbound.content.trim();
    if content.is_empty() {
        return None;
    }

    let username = inbound
        .username
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| fallback_name.to_string());

    Some(ChatWsMessage {
        chat_id: chat_id.to_string(),
        username,
        content: content.to_string(),
        timestamp: Utc::now(),
    })
}
