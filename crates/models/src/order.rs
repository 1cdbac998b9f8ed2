use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::new_id;

pub const ORDER_PENDING: &str = "pending";

/// A cart line as sent by the client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderItem {
    pub id: String,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub image: String,
    pub quantity: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub movies: Vec<OrderItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub movies: Vec<OrderItem>,
    pub total: f64,
    pub order_status: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn pending(user_id: String, movies: Vec<OrderItem>) -> Self {
        let total = movies.iter().map(OrderItem::line_total).sum();
        Self {
            id: new_id(),
            user_id,
            movies,
            total,
            order_status: ORDER_PENDING.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub status: String,
    pub message: String,
    pub order_id: String,
    pub total: f64,
}
