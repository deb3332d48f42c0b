use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use hal_types::api::{CityResponse, DistrictResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// GET /locations/cities
pub async fn list_cities(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let cities = state.query(|db| db.list_cities()).await?;
    let cities: Vec<CityResponse> = cities.into_iter().map(CityResponse::from).collect();
    Ok(Json(cities))
}

#[derive(Debug, Deserialize)]
pub struct DistrictQuery {
    pub city: Option<String>,
}

/// GET /locations/districts?city=
pub async fn districts_by_city_name(
    State(state): State<AppState>,
    Query(q): Query<DistrictQuery>,
) -> ApiResult<impl IntoResponse> {
    let city = q
        .city
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("City parameter is required"))?;

    let districts = state
        .query(move |db| match db.find_city(&city)? {
            Some(found) => db.list_districts(found.id).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(|| ApiError::not_found("City not found"))?;

    let districts: Vec<DistrictResponse> = districts.into_iter().map(DistrictResponse::from).collect();
    Ok(Json(districts))
}

/// GET /locations/cities/{id}/districts
pub async fn city_districts(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let districts = state
        .query(move |db| match db.get_city(id)? {
            Some(_) => db.list_districts(id).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(|| ApiError::not_found("City not found"))?;

    let districts: Vec<DistrictResponse> = districts.into_iter().map(DistrictResponse::from).collect();
    Ok(Json(json!({ "total": districts.len(), "districts": districts })))
}
