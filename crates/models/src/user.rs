use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::new_id;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string, never the plain password.
    pub password: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub verification_token: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    // Create a new user with default values for fields that aren't provided
    pub fn new(name: String, email: String, password_hash: String, admin: bool) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name,
            email,
            password: password_hash,
            admin,
            email_verified: false,
            verification_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_verification_token(mut self, token: String) -> Self {
        self.verification_token = Some(token);
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub admin: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

// Convert User to UserProfile (hiding sensitive data)
impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            admin: user.admin,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub admin: bool,
    pub user: UserProfile,
}
