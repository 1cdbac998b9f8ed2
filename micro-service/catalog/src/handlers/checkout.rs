use axum::{Json, extract::State};
use tracing::info;

use app_error::AppResult;
use app_middleware::{AuthUser, validation};
use app_models::{CheckoutRequest, CheckoutResponse, Order};

use super::JsonBody;
use crate::{service::record_activity, state::AppState};

/// Stores the cart as a pending order for the caller.
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<CheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    validation::validate_cart(&request.movies)?;

    let order = Order::pending(user.id().to_string(), request.movies);
    state.store.create_order(&order).await?;
    info!(order = %order.id, user = %order.user_id, total = order.total, "Order placed");

    record_activity(
        state.store.as_ref(),
        Some(order.user_id.clone()),
        "checkout",
        format!("Order {} with {} item(s), total {:.2}", order.id, order.movies.len(), order.total),
    )
    .await;

    Ok(Json(CheckoutResponse {
        status: "success".to_string(),
        message: "Checkout successful!".to_string(),
        order_id: order.id,
        total: order.total,
    }))
}
