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
use hal_db::queries::ProfileUpdate;
use hal_types::api::{ProfileImageRequest, SellerProfile, SwitchRoleRequest, UpdateProfileRequest, UserProfile};
use hal_types::models::Role;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::middleware::CurrentUser;
use crate::pagination::paged;
use crate::validate::{Validator, is_phone};

pub async fn get_profile(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(json!({ "user": UserProfile::from(user) }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    if let Some(name) = &req.name {
        v.length("name", name, 2, 50, "Name must be 2-50 characters");
    }
    if let Some(phone) = &req.phone {
        v.check(is_phone(phone.trim()), "phone", "Please provide a valid phone number");
    }
    if let Some(location) = &req.location {
        if let Some(city) = &location.city {
            v.length("location.city", city, 2, usize::MAX, "City must be at least 2 characters");
        }
        if let Some(district) = &location.district {
            v.length("location.district", district, 2, usize::MAX, "District must be at least 2 characters");
        }
    }
    v.finish()?;

    // Seller details only stick to seller accounts
    let seller_info = req.seller_info.filter(|_| user.has_any_role(&[Role::Seller]));
    let update = ProfileUpdate {
        name: req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        phone: req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        location: req.location,
        seller_info,
        preferences: req.preferences,
    };

    let user_id = user.id;
    let updated = state
        .query(move |db| db.update_profile(user_id, &update))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": UserProfile::from(updated),
    })))
}

pub async fn update_profile_image(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<ProfileImageRequest>,
) -> ApiResult<impl IntoResponse> {
    let url = req.profile_image.trim().to_string();
    let mut v = Validator::new();
    v.check(
        url.starts_with("http://") || url.starts_with("https://"),
        "profileImage",
        "Please provide a valid image URL",
    );
    v.finish()?;

    let user_id = user.id;
    let updated = state
        .query(move |db| db.set_profile_image(user_id, &url))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(json!({
        "message": "Profile image updated successfully",
        "user": UserProfile::from(updated),
    })))
}

/// Add a marketplace role if missing and make it the active one.
pub async fn switch_role(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<SwitchRoleRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    let role = v.parse::<Role>("role", &req.role, "Role must be buyer or seller");
    v.finish()?;
    let role = role.ok_or_else(|| ApiError::bad_request("Role must be buyer or seller"))?;

    let user_id = user.id;
    let updated = state
        .query(move |db| db.switch_role(user_id, role))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!("{} switched to {}", updated.email, role);

    Ok(Json(json!({
        "message": "Role switched successfully",
        "user": UserProfile::from(updated),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SellerQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub city: Option<String>,
    pub rating: Option<f64>,
}

pub async fn list_sellers(
    State(state): State<AppState>,
    Query(q): Query<SellerQuery>,
) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 10);
    let result = state
        .query(move |db| db.list_sellers(q.city.as_deref(), q.rating, page))
        .await?;
    let sellers: Vec<SellerProfile> = result.items.into_iter().map(SellerProfile::from).collect();
    Ok(Json(Value::Object(paged("sellers", sellers, page, result.total)?)))
}

pub async fn get_seller(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let seller = state
        .query(move |db| db.get_seller(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Seller not found"))?;
    Ok(Json(json!({ "seller": SellerProfile::from(seller) })))
}

pub async fn deactivate_account(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    state.query(move |db| db.set_user_active(user_id, false)).await?;
    info!("{} deactivated their account", user.email);
    Ok(Json(json!({ "message": "Account deactivated successfully" })))
}
