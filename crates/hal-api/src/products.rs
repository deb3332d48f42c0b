use std::str::FromStr;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use tracing::info;
use uuid::Uuid;

use hal_db::Page;
use hal_db::queries::{ProductQuery, ProductSort};
use hal_types::api::{CategoryInfo, CreateProductRequest, ProductResponse, UpdateProductRequest};
use hal_types::models::{Category, ModerationStatus, Role};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::middleware::{CurrentUser, require_roles};
use crate::notify;
use crate::pagination::paged;
use crate::validate;

const FEATURED_LIMIT: u32 = 10;

/// The static category list with display names and icons.
pub fn category_list() -> Vec<CategoryInfo> {
    Category::iter()
        .map(|c| CategoryInfo {
            id: c,
            name: c.display_name(),
            icon: c.icon(),
        })
        .collect()
}

/// `None` for an absent or blank param, 400 for an unknown category.
pub fn parse_category(raw: Option<&str>) -> ApiResult<Option<Category>> {
    match raw.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => Category::from_str(c)
            .map(Some)
            .map_err(|_| ApiError::bad_request("Invalid category")),
        None => Ok(None),
    }
}

fn product_list(rows: Vec<hal_db::models::ProductRow>) -> Vec<ProductResponse> {
    rows.into_iter().map(ProductResponse::from).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// GET /products
pub async fn list_products(
    State(state): State<AppState>,
    Query(q): Query<ProductListQuery>,
) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 10);
    let query = ProductQuery {
        category: parse_category(q.category.as_deref())?,
        city: q.city,
        min_price: q.min_price,
        max_price: q.max_price,
        search: q.search,
        sort: q.sort_by.as_deref().and_then(ProductSort::from_param).unwrap_or_default(),
        ascending: q.sort_order.as_deref() == Some("asc"),
        ..ProductQuery::public()
    };

    let result = state.query(move |db| db.list_products(&query, page)).await?;
    Ok(Json(Value::Object(paged("products", product_list(result.items), page, result.total)?)))
}

/// GET /products/featured
pub async fn featured_products(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let query = ProductQuery {
        featured_only: true,
        ..ProductQuery::public()
    };
    let page = Page::new(None, Some(FEATURED_LIMIT), FEATURED_LIMIT);
    let result = state.query(move |db| db.list_products(&query, page)).await?;
    Ok(Json(json!({ "products": product_list(result.items) })))
}

/// GET /products/categories and GET /categories
pub async fn categories() -> impl IntoResponse {
    Json(json!({ "categories": category_list() }))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// GET /products/favorites
pub async fn favorite_products(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 20);
    let query = ProductQuery {
        status: Some(ModerationStatus::Approved),
        favorited_by: Some(user.id),
        ..Default::default()
    };
    let result = state.query(move |db| db.list_products(&query, page)).await?;
    Ok(Json(Value::Object(paged("products", product_list(result.items), page, result.total)?)))
}

#[derive(Debug, Deserialize)]
pub struct MyProductsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

/// GET /products/seller/my-products
pub async fn my_products(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(q): Query<MyProductsQuery>,
) -> ApiResult<Json<Value>> {
    require_roles(&user, &[Role::Seller])?;
    let page = Page::new(q.page, q.limit, 10);
    let is_available = match q.status.as_deref() {
        Some("active") => Some(true),
        Some("inactive") => Some(false),
        _ => None,
    };
    let query = ProductQuery {
        seller_id: Some(user.id),
        is_available,
        ..Default::default()
    };
    let result = state.query(move |db| db.list_products(&query, page)).await?;
    Ok(Json(Value::Object(paged("products", product_list(result.items), page, result.total)?)))
}

/// GET /products/seller/count
pub async fn my_product_counts(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    require_roles(&user, &[Role::Seller])?;
    let seller_id = user.id;
    let counts = state.query(move |db| db.seller_product_counts(seller_id)).await?;
    Ok(Json(counts))
}

/// PUT /products/{id}/views
pub async fn increment_views(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let views = state
        .query(move |db| db.increment_views(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(json!({ "message": "Views incremented successfully", "views": views })))
}

/// GET /products/{id}. Counts as a view.
pub async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let product = state
        .query(move |db| {
            if db.increment_views(id)?.is_none() {
                return Ok(None);
            }
            db.get_product(id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(json!({ "product": ProductResponse::from(product) })))
}

/// POST /products. New listings wait for moderation.
pub async fn create_product(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    require_roles(&user, &[Role::Seller])?;
    let draft = validate::new_product(req)?;

    let seller_id = user.id;
    let product = state.query(move |db| db.create_product(seller_id, &draft)).await?;
    info!("{} listed \"{}\" ({})", user.email, product.title, product.id);

    notify::product_pending(&state, &product).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Product created successfully",
            "product": ProductResponse::from(product),
        })),
    ))
}

/// PUT /products/{id}. Owner only.
pub async fn update_product(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<UpdateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    require_roles(&user, &[Role::Seller])?;
    let update = validate::product_update(req)?;

    let seller_id = user.id;
    let product = state
        .query(move |db| db.update_product(id, seller_id, update))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    Ok(Json(json!({
        "message": "Product updated successfully",
        "product": ProductResponse::from(product),
    })))
}

/// DELETE /products/{id}. Owner only.
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_roles(&user, &[Role::Seller])?;
    let seller_id = user.id;
    let product = state
        .query(move |db| db.delete_product(id, Some(seller_id)))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    info!("{} deleted \"{}\"", user.email, product.title);
    Ok(Json(json!({ "message": "Product deleted successfully" })))
}

/// POST /products/{id}/favorite
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    let favorited = state
        .query(move |db| db.toggle_favorite(id, user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(json!({ "message": "Favorite status updated", "isFavorited": favorited })))
}

/// DELETE /products/{id}/favorite
pub async fn remove_favorite(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    if !state.query(move |db| db.remove_favorite(id, user_id)).await? {
        return Err(ApiError::not_found("Product not found"));
    }
    Ok(Json(json!({ "message": "Product removed from favorites" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_param_parsing() {
        assert_eq!(parse_category(None).unwrap(), None);
        assert_eq!(parse_category(Some("  ")).unwrap(), None);
        assert_eq!(parse_category(Some("zirai_ilac")).unwrap(), Some(Category::ZiraiIlac));
        assert!(matches!(parse_category(Some("tahil")), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn category_list_is_complete() {
        let list = category_list();
        assert_eq!(list.len(), 15);
        assert_eq!(list[0].id, Category::Meyve);
        assert_eq!(list[0].icon, "nutrition");
        assert!(list.iter().any(|c| c.name == "Zirai İlaç"));
    }
}
