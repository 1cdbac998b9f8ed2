use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::new_id;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Review {
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub movie_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(content: String, user_id: String, movie_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            content,
            user_id,
            movie_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewReview {
    pub content: String,
    pub movie_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReviewUpdate {
    pub content: String,
}
