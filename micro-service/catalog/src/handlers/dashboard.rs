use axum::{Json, extract::State};
use std::collections::HashMap;

use app_error::AppResult;
use app_models::{Dashboard, Order, PurchasedMovie};

use crate::state::AppState;

const TOP_MOVIES: usize = 5;

/// Sales totals and the most purchased movies by quantity. Ties are broken
/// by movie id so the ranking is stable.
pub fn summarize(orders: &[Order]) -> Dashboard {
    let mut purchased: HashMap<&str, PurchasedMovie> = HashMap::new();

    for item in orders.iter().flat_map(|order| order.movies.iter()) {
        let entry = purchased
            .entry(item.id.as_str())
            .or_insert_with(|| PurchasedMovie {
                id: item.id.clone(),
                title: item.title.clone(),
                total_quantity: 0,
            });
        // Rows written before cart limits existed may carry huge quantities.
        entry.total_quantity = entry.total_quantity.saturating_add(item.quantity);
    }

    let mut most_purchased: Vec<PurchasedMovie> = purchased.into_values().collect();
    most_purchased.sort_by(|a, b| {
        b.total_quantity
            .cmp(&a.total_quantity)
            .then_with(|| a.id.cmp(&b.id))
    });
    most_purchased.truncate(TOP_MOVIES);

    Dashboard {
        total_sales: orders.iter().map(|order| order.total).sum(),
        order_count: orders.len(),
        most_purchased_movies: most_purchased,
    }
}

pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<Dashboard>> {
    let orders = state.store.list_orders().await?;
    Ok(Json(summarize(&orders)))
}
