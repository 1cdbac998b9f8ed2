pub mod activity;
pub mod chat;
pub mod movie;
pub mod order;
pub mod responses;
pub mod review;
pub mod user;

pub use activity::ActivityLog;
pub use chat::{ActiveChat, ChatInbound, ChatMessage, ChatSession, ChatStatus, ChatWsMessage};
pub use movie::{Movie, MoviePatch, NewMovie};
pub use order::{CheckoutRequest, CheckoutResponse, Order, OrderItem};
pub use responses::{Dashboard, MessageResponse, PurchasedMovie, StatusResponse};
pub use review::{NewReview, Review, ReviewUpdate};
pub use user::{LoginInput, LoginResponse, SignupInput, User, UserProfile};

/// Generate a new record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
