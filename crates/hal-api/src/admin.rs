//! Moderation and account administration. Every route here sits behind
//! `require_auth` and `require_admin`.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use hal_db::Page;
use hal_db::queries::ProductQuery;
use hal_types::api::{BlockUserRequest, ProductResponse, RejectProductRequest, UserProfile, UserSummary};
use hal_types::models::{ModerationStatus, UserType};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::middleware::CurrentUser;
use crate::notify;
use crate::pagination::paged;
use crate::products::PageQuery;

const RECENT_LIMIT: u32 = 5;
const USER_SEARCH_LIMIT: u32 = 20;
const DEFAULT_REJECTION: &str = "Admin tarafından onay kaldırıldı";

fn product_list(rows: Vec<hal_db::models::ProductRow>) -> Vec<ProductResponse> {
    rows.into_iter().map(ProductResponse::from).collect()
}

/// GET /admin/dashboard
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let (stats, products, users) = state
        .query(|db| {
            Ok((
                db.dashboard_stats()?,
                db.recent_products(RECENT_LIMIT)?,
                db.recent_users(RECENT_LIMIT)?,
            ))
        })
        .await?;
    let users: Vec<UserSummary> = users.iter().map(UserSummary::from).collect();
    Ok(Json(json!({
        "stats": stats,
        "recentProducts": product_list(products),
        "recentUsers": users,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AdminProductQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
}

/// Moderation filter for `?status=`. Approved unless asked otherwise;
/// `all` lifts the filter.
fn moderation_filter(raw: Option<&str>) -> ApiResult<Option<ModerationStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Some(ModerationStatus::Approved)),
        Some("all") => Ok(None),
        Some(s) => s
            .parse::<ModerationStatus>()
            .map(Some)
            .map_err(|_| ApiError::bad_request("Invalid status")),
    }
}

async fn list_by(state: AppState, query: ProductQuery, page: Page) -> ApiResult<Json<Value>> {
    let result = state.query(move |db| db.list_products(&query, page)).await?;
    Ok(Json(Value::Object(paged("products", product_list(result.items), page, result.total)?)))
}

/// GET /admin/products
pub async fn list_products(
    State(state): State<AppState>,
    Query(q): Query<AdminProductQuery>,
) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 10);
    let query = ProductQuery {
        status: moderation_filter(q.status.as_deref())?,
        search: q.search,
        ..Default::default()
    };
    list_by(state, query, page).await
}

/// GET /admin/products/pending
pub async fn pending_products(State(state): State<AppState>, Query(q): Query<PageQuery>) -> ApiResult<Json<Value>> {
    let query = ProductQuery {
        status: Some(ModerationStatus::Pending),
        ..Default::default()
    };
    list_by(state, query, Page::new(q.page, q.limit, 10)).await
}

/// GET /admin/products/rejected
pub async fn rejected_products(State(state): State<AppState>, Query(q): Query<PageQuery>) -> ApiResult<Json<Value>> {
    let query = ProductQuery {
        status: Some(ModerationStatus::Rejected),
        ..Default::default()
    };
    list_by(state, query, Page::new(q.page, q.limit, 10)).await
}

/// GET /admin/products/featured
pub async fn featured_products(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let query = ProductQuery {
        featured_only: true,
        ..Default::default()
    };
    let page = Page::new(None, Some(Page::MAX_LIMIT), Page::MAX_LIMIT);
    let result = state.query(move |db| db.list_products(&query, page)).await?;
    Ok(Json(json!({ "products": product_list(result.items) })))
}

/// PUT /admin/products/{id}/approve
pub async fn approve_product(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let admin_id = admin.id;
    let product = state
        .query(move |db| db.approve_product(id, admin_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    info!("{} approved \"{}\" ({})", admin.email, product.title, product.id);

    notify::product_approved(&state, &product).await;
    notify::notify_matching_buyers(&state, &product).await;

    Ok(Json(json!({
        "message": "Product approved successfully",
        "product": ProductResponse::from(product),
    })))
}

/// PUT /admin/products/{id}/reject
pub async fn reject_product(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectProductRequest>>,
) -> ApiResult<impl IntoResponse> {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REJECTION.to_string());

    let admin_id = admin.id;
    let stored_reason = reason.clone();
    let product = state
        .query(move |db| db.reject_product(id, admin_id, &stored_reason))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    info!("{} rejected \"{}\": {}", admin.email, product.title, reason);

    notify::product_rejected(&state, &product, Some(&reason)).await;

    Ok(Json(json!({
        "message": "Product approval removed",
        "product": ProductResponse::from(product),
    })))
}

/// PUT /admin/products/{id}/featured
pub async fn toggle_featured(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let product = state
        .query(move |db| db.toggle_featured(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let message = if product.is_featured {
        notify::product_featured(&state, &product).await;
        "Product marked as featured"
    } else {
        "Product unmarked as featured"
    };
    Ok(Json(json!({
        "message": message,
        "isFeatured": product.is_featured,
        "product": ProductResponse::from(product),
    })))
}

/// DELETE /admin/products/{id}. Local image files go with the listing.
pub async fn delete_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let product = state
        .query(move |db| db.delete_product(id, None))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let mut deleted = 0;
    for image in &product.images {
        if state.uploads.delete_by_url(&image.url).await {
            deleted += 1;
        }
    }
    info!("Product deleted: {}, images deleted: {}", product.title, deleted);

    Ok(Json(json!({
        "message": "Product and images deleted successfully",
        "deletedImages": deleted,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub user_type: Option<String>,
    pub is_active: Option<bool>,
}

/// GET /admin/users
pub async fn list_users(State(state): State<AppState>, Query(q): Query<AdminUserQuery>) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 10);
    let user_type = match q.user_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => Some(
            t.parse::<UserType>()
                .map_err(|_| ApiError::bad_request("Invalid user type"))?,
        ),
        None => None,
    };
    let is_active = q.is_active;
    let result = state
        .query(move |db| db.list_users(user_type, is_active, page))
        .await?;
    let users: Vec<UserProfile> = result.items.into_iter().map(UserProfile::from).collect();
    Ok(Json(Value::Object(paged("users", users, page, result.total)?)))
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub q: Option<String>,
}

/// GET /admin/users/search?q=
pub async fn search_users(
    State(state): State<AppState>,
    Query(q): Query<UserSearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let needle = q.q.unwrap_or_default().trim().to_string();
    if needle.chars().count() < 2 {
        return Ok(Json(json!({ "users": [] })));
    }
    let users = state
        .query(move |db| db.search_users(&needle, USER_SEARCH_LIMIT))
        .await?;
    let users: Vec<UserProfile> = users.into_iter().map(UserProfile::from).collect();
    Ok(Json(json!({ "users": users })))
}

/// PUT /admin/users/{id}/block
pub async fn block_user(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<BlockUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let is_active = req.is_active;
    let user = state
        .query(move |db| {
            if !db.set_user_active(id, is_active)? {
                return Ok(None);
            }
            db.get_user_by_id(id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let verb = if is_active { "unblocked" } else { "blocked" };
    info!("{} {} {}", admin.email, verb, user.email);
    Ok(Json(json!({
        "message": format!("User {verb} successfully"),
        "user": UserSummary::from(&user),
    })))
}

/// DELETE /admin/users/{id}. Listings go with the account.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.query(move |db| db.delete_user(id)).await? {
        return Err(ApiError::not_found("User not found"));
    }
    info!("{} deleted user {}", admin.email, id);
    Ok(Json(json!({ "message": "User and associated products deleted successfully" })))
}

/// GET /admin/users/{id}/products
pub async fn user_products(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let query = ProductQuery {
        seller_id: Some(id),
        ..Default::default()
    };
    let page = Page::new(None, Some(Page::MAX_LIMIT), Page::MAX_LIMIT);
    let result = state.query(move |db| db.list_products(&query, page)).await?;
    Ok(Json(json!({ "products": product_list(result.items) })))
}
