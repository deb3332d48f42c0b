use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use hal_db::Page;
use hal_db::models::NewOrder;
use hal_db::queries::{OrderError, OrderSide};
use hal_types::api::{CreateOrderRequest, OrderResponse, UpdateOrderStatusRequest};
use hal_types::models::{OrderStatus, Role};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::middleware::{CurrentUser, require_roles};
use crate::pagination::paged;
use crate::validate::Validator;

const MAX_NOTES: usize = 500;

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

fn status_filter(raw: Option<&str>) -> ApiResult<Option<OrderStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse::<OrderStatus>()
            .map(Some)
            .map_err(|_| ApiError::bad_request("Invalid status")),
        None => Ok(None),
    }
}

async fn list(state: AppState, side: OrderSide, user_id: Uuid, q: OrderListQuery) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 10);
    let status = status_filter(q.status.as_deref())?;
    let result = state
        .query(move |db| db.list_orders(side, user_id, status, page))
        .await?;
    let orders: Vec<OrderResponse> = result.items.into_iter().map(OrderResponse::from).collect();
    Ok(Json(Value::Object(paged("orders", orders, page, result.total)?)))
}

/// GET /orders
pub async fn buyer_orders(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(q): Query<OrderListQuery>,
) -> ApiResult<Json<Value>> {
    list(state, OrderSide::Buyer, user.id, q).await
}

/// GET /orders/seller
pub async fn seller_orders(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(q): Query<OrderListQuery>,
) -> ApiResult<Json<Value>> {
    require_roles(&user, &[Role::Seller])?;
    list(state, OrderSide::Seller, user.id, q).await
}

/// POST /orders. Stock is reserved in the same transaction as the insert.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    v.check(req.quantity >= 1, "quantity", "Quantity must be at least 1")
        .check(req.delivery_address.is_some(), "deliveryAddress", "Delivery address is required");
    if let Some(notes) = &req.notes {
        v.check(notes.chars().count() <= MAX_NOTES, "notes", "Notes cannot exceed 500 characters");
    }
    v.finish()?;
    let delivery_address = req
        .delivery_address
        .ok_or_else(|| ApiError::bad_request("Delivery address is required"))?;

    let new = NewOrder {
        buyer_id: user.id,
        product_id: req.product_id,
        quantity: req.quantity,
        delivery_address,
        notes: req.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        payment_method: req.payment_method.unwrap_or_default(),
    };
    let order = state.query(move |db| db.place_order(&new)).await?;
    info!(
        "{} ordered {} x {} ({})",
        user.email, order.quantity, order.product_id, order.id
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Order created successfully",
            "order": OrderResponse::from(order),
        })),
    ))
}

/// GET /orders/{id}. Buyer or seller only.
pub async fn get_order(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let order = state
        .query(move |db| db.get_order(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    if order.buyer.id != user.id && order.seller.id != user.id {
        return Err(ApiError::forbidden(OrderError::NotAuthorized.to_string()));
    }
    Ok(Json(json!({ "order": OrderResponse::from(order) })))
}

/// PUT /orders/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<UpdateOrderStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    let status = v.parse::<OrderStatus>("status", &req.status, "Invalid status");
    v.finish()?;
    let status = status.ok_or_else(|| ApiError::bad_request("Invalid status"))?;

    let actor_id = user.id;
    let reason = req.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let order = state
        .query(move |db| db.update_order_status(id, actor_id, status, reason.as_deref()))
        .await?;
    info!("Order {} moved to {} by {}", order.id, status, user.email);

    Ok(Json(json!({
        "message": "Order status updated successfully",
        "order": OrderResponse::from(order),
    })))
}

/// DELETE /orders/{id}. Buyer only, while still pending.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let buyer_id = user.id;
    state.query(move |db| db.cancel_order(id, buyer_id)).await?;
    info!("Order {} cancelled by {}", id, user.email);
    Ok(Json(json!({ "message": "Order cancelled successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_parsing() {
        assert_eq!(status_filter(None).unwrap(), None);
        assert_eq!(status_filter(Some("shipped")).unwrap(), Some(OrderStatus::Shipped));
        assert!(matches!(status_filter(Some("lost")), Err(ApiError::BadRequest(_))));
    }
}
