use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::new_id;

/// Audit record of a business action (signup, login, checkout, review).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActivityLog {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(user_id: Option<String>, action: &str, detail: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            user_id,
            action: action.to_string(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}
