use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::new_id;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Active,
    Closed,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown chat status '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatSession {
    pub id: String,
    /// User id of the client who opened the chat.
    pub client_id: String,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    pub fn open(client_id: String) -> Self {
        Self {
            id: new_id(),
            client_id,
            status: ChatStatus::Active,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ChatStatus::Active
    }
}

/// Persisted chat line.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub chat_session_id: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Frame a client sends over the socket.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatInbound {
    #[serde(default)]
    pub username: Option<String>,
    pub content: String,
}

/// Frame broadcast to every member of a room.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatWsMessage {
    pub chat_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatWsMessage> for ChatMessage {
    fn from(msg: &ChatWsMessage) -> Self {
        Self {
            id: new_id(),
            chat_session_id: msg.chat_id.clone(),
            sender: msg.username.clone(),
            content: msg.content.clone(),
            timestamp: msg.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActiveChat {
    pub chat_id: String,
    pub client: String,
    pub started_at: DateTime<Utc>,
    pub clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_form() {
        assert_eq!("closed".parse::<ChatStatus>().unwrap(), ChatStatus::Closed);
        assert!("open".parse::<ChatStatus>().is_err());

        let session = ChatSession::open("u1".into());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"], "active");
        assert!(session.is_active());
    }

    #[test]
    fn test_inbound_username_optional() {
        let inbound: ChatInbound = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert!(inbound.username.is_none());
        assert_eq!(inbound.content, "hi");
    }
}
