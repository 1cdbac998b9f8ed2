use async_trait::async_trait;

use app_error::AppResult;
use app_models::{
    ActivityLog, ChatMessage, ChatSession, Movie, MoviePatch, Order, Review, User,
};

use crate::query::MovieQuery;

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn create_movie(&self, movie: &Movie) -> AppResult<()>;
    async fn get_movie(&self, id: &str) -> AppResult<Option<Movie>>;
    async fn list_movies(&self) -> AppResult<Vec<Movie>>;
    /// Returns `None` when no movie has this id.
    async fn update_movie(&self, id: &str, patch: MoviePatch) -> AppResult<Option<Movie>>;
    async fn delete_movie(&self, id: &str) -> AppResult<bool>;
    /// One page of matching movies plus the total number of matches.
    async fn find_movies(&self, query: &MovieQuery) -> AppResult<(Vec<Movie>, u64)>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> AppResult<()>;
    async fn get_user(&self, id: &str) -> AppResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn get_user_by_verification_token(&self, token: &str) -> AppResult<Option<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    async fn mark_email_verified(&self, id: &str) -> AppResult<bool>;
    async fn delete_user(&self, id: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn create_review(&self, review: &Review) -> AppResult<()>;
    async fn get_review(&self, id: &str) -> AppResult<Option<Review>>;
    async fn list_reviews(&self, movie_id: Option<&str>) -> AppResult<Vec<Review>>;
    async fn update_review(&self, id: &str, content: &str) -> AppResult<Option<Review>>;
    async fn delete_review(&self, id: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: &Order) -> AppResult<()>;
    async fn list_orders(&self) -> AppResult<Vec<Order>>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn log_activity(&self, entry: &ActivityLog) -> AppResult<()>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat_session(&self, session: &ChatSession) -> AppResult<()>;
    async fn get_chat_session(&self, id: &str) -> AppResult<Option<ChatSession>>;
    async fn find_active_chat_session(&self, client_id: &str) -> AppResult<Option<ChatSession>>;
    /// Marks the session closed; `None` when it does not exist.
    async fn close_chat_session(&self, id: &str) -> AppResult<Option<ChatSession>>;
    async fn save_chat_message(&self, message: &ChatMessage) -> AppResult<()>;
    /// Messages of a session, oldest first.
    async fn chat_history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>>;
}

/// Everything the catalog service needs from persistence.
pub trait Store:
    MovieStore + UserStore + ReviewStore + OrderStore + ActivityStore + ChatStore
{
}

impl<T> Store for T where
    T: MovieStore + UserStore + ReviewStore + OrderStore + ActivityStore + ChatStore
{
}
