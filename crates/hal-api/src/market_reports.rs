//! Daily wholesale market price reports. Admins post them, everyone reads
//! them, and they expire a day after posting.

use axum::{
    Extension, Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use hal_db::Page;
use hal_db::models::NewMarketReport;
use hal_db::queries::{ReportChanges, ReportFilter};
use hal_types::api::{MarketReportInput, MarketReportResponse};
use hal_types::models::ReportImage;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::middleware::CurrentUser;
use crate::pagination::paged;
use crate::upload::{FilePolicy, IncomingFile, REPORTS_DIR, check_file, multipart_error};

const NOT_FOUND: &str = "Piyasa raporu bulunamadı";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub city: Option<String>,
    pub is_active: Option<bool>,
}

async fn list(state: AppState, filter: ReportFilter, page: Page) -> ApiResult<Json<Value>> {
    let result = state
        .query(move |db| db.list_market_reports(&filter, Utc::now(), page))
        .await?;
    let reports: Vec<MarketReportResponse> = result.items.into_iter().map(MarketReportResponse::from).collect();

    // Reports use their own envelope: page instead of currentPage
    let mut body = paged("reports", reports, page, result.total)?;
    if let Some(current) = body.remove("currentPage") {
        body.insert("page".into(), current);
    }
    Ok(Json(Value::Object(body)))
}

/// GET /market-reports
pub async fn list_reports(State(state): State<AppState>, Query(q): Query<ReportListQuery>) -> ApiResult<Json<Value>> {
    let filter = ReportFilter {
        city: q.city,
        is_active: Some(true),
    };
    list(state, filter, Page::new(q.page, q.limit, 50)).await
}

/// GET /market-reports/admin/all. Inactive reports included.
pub async fn admin_list_reports(
    State(state): State<AppState>,
    Query(q): Query<ReportListQuery>,
) -> ApiResult<Json<Value>> {
    let filter = ReportFilter {
        city: q.city,
        is_active: q.is_active,
    };
    list(state, filter, Page::new(q.page, q.limit, 50)).await
}

/// GET /market-reports/cities/list
pub async fn report_cities(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let cities = state.query(|db| db.market_report_cities(Utc::now())).await?;
    Ok(Json(json!({ "cities": cities })))
}

/// GET /market-reports/{id}
pub async fn get_report(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let report = state
        .query(move |db| db.get_market_report(id, Utc::now()))
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(Json(MarketReportResponse::from(report)))
}

/// Report fields plus an optional image, from either a JSON body or a
/// multipart form with an `image` part.
async fn read_form(state: &AppState, req: Request) -> ApiResult<(MarketReportInput, Option<IncomingFile>)> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));
    if !is_multipart {
        let JsonBody(input) = JsonBody::<MarketReportInput>::from_request(req, state).await?;
        return Ok((input, None));
    }

    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;
    let mut input = MarketReportInput::default();
    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file = IncomingFile {
                content_type: field.content_type().unwrap_or_default().to_string(),
                file_name: field.file_name().map(str::to_string),
                data: field.bytes().await.map_err(multipart_error)?,
            };
            check_file(&file, FilePolicy::REPORT_IMAGE)?;
            image = Some(file);
            continue;
        }

        let text = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "title" => input.title = Some(text),
            "city" => input.city = Some(text),
            "district" => input.district = Some(text),
            "marketName" => input.market_name = Some(text),
            "description" => input.description = Some(text),
            "reportDate" => input.report_date = Some(parse_report_date(&text)?),
            "isActive" => input.is_active = Some(text.trim() == "true"),
            _ => {}
        }
    }
    Ok((input, image))
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
fn parse_report_date(raw: &str) -> ApiResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| ApiError::bad_request("Invalid report date"))
}

fn blank_to_none(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

async fn store_image(state: &AppState, file: Option<IncomingFile>) -> ApiResult<Option<ReportImage>> {
    let Some(file) = file else {
        return Ok(None);
    };
    let stored = state
        .uploads
        .save(Some(REPORTS_DIR), "market-report", &file, false)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Some(ReportImage {
        url: stored.url,
        public_id: Some(stored.filename),
    }))
}

/// POST /market-reports (admin)
pub async fn create_report(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    req: Request,
) -> ApiResult<impl IntoResponse> {
    let (input, file) = read_form(&state, req).await?;
    let (Some(title), Some(city)) = (blank_to_none(input.title), blank_to_none(input.city)) else {
        return Err(ApiError::bad_request("Başlık ve şehir gereklidir"));
    };

    let image = match store_image(&state, file).await? {
        Some(image) => Some(image),
        None => input.image,
    };
    let new = NewMarketReport {
        title,
        city,
        district: blank_to_none(input.district),
        market_name: blank_to_none(input.market_name),
        report_date: input.report_date.unwrap_or_else(Utc::now),
        description: blank_to_none(input.description),
        image,
        created_by: admin.id,
    };
    let report = state.query(move |db| db.create_market_report(&new)).await?;
    info!(
        "Market report created: {} \"{}\" ({}), expires {}",
        report.id, report.title, report.city, report.expires_at
    );

    Ok((StatusCode::CREATED, Json(MarketReportResponse::from(report))))
}

/// PUT /market-reports/{id} (admin). A new image replaces the old file.
pub async fn update_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    req: Request,
) -> ApiResult<impl IntoResponse> {
    let (input, file) = read_form(&state, req).await?;
    let exists = state.query(move |db| db.get_market_report(id, Utc::now())).await?;
    if exists.is_none() {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    let image = match store_image(&state, file).await? {
        Some(image) => Some(image),
        None => input.image,
    };
    let changes = ReportChanges {
        title: blank_to_none(input.title),
        city: blank_to_none(input.city),
        district: input.district,
        market_name: input.market_name,
        report_date: input.report_date,
        description: input.description,
        image,
        is_active: input.is_active,
    };
    let (report, replaced) = state
        .query(move |db| db.update_market_report(id, &changes))
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    if let Some(old) = replaced {
        state.uploads.delete_by_url(&old.url).await;
    }
    info!("Market report updated: {} \"{}\"", report.id, report.title);
    Ok(Json(MarketReportResponse::from(report)))
}

/// DELETE /market-reports/{id} (admin)
pub async fn delete_report(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let report = state
        .query(move |db| db.delete_market_report(id))
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    if let Some(image) = &report.image {
        state.uploads.delete_by_url(&image.url).await;
    }
    info!("Market report deleted: {} \"{}\"", report.id, report.title);
    Ok(Json(json!({ "message": "Piyasa raporu silindi" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_dates() {
        let d = parse_report_date("2025-04-02").unwrap();
        assert_eq!(d.to_rfc3339(), "2025-04-02T00:00:00+00:00");
        let t = parse_report_date("2025-04-02T06:30:00+03:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2025-04-02T03:30:00+00:00");
        assert!(parse_report_date("02.04.2025").is_err());
    }

    #[test]
    fn blanks_are_dropped() {
        assert_eq!(blank_to_none(Some("  ".into())), None);
        assert_eq!(blank_to_none(Some(" Antalya ".into())).as_deref(), Some("Antalya"));
    }
}
