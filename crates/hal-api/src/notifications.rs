use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use hal_db::Page;
use hal_db::models::NotificationRow;
use hal_db::queries::ProductQuery;
use hal_types::api::{NotificationResponse, ProductRequestInput, ProductRequestResponse, ProductResponse};
use hal_types::models::{Category, ModerationStatus, NotificationType};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::middleware::CurrentUser;
use crate::pagination::paged;
use crate::validate::Validator;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub unread_only: Option<bool>,
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(q): Query<NotificationListQuery>,
) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 20);
    let unread_only = q.unread_only.unwrap_or(false);
    let user_id = user.id;
    let (result, unread) = state
        .query(move |db| {
            let result = db.list_notifications(user_id, unread_only, page)?;
            let unread = db.unread_notification_count(user_id)?;
            Ok((result, unread))
        })
        .await?;

    let items: Vec<NotificationResponse> = result.items.into_iter().map(NotificationResponse::from).collect();
    let mut body = paged("notifications", items, page, result.total)?;
    body.insert("unreadCount".into(), json!(unread));
    Ok(Json(Value::Object(body)))
}

/// PUT /notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    state
        .query(move |db| db.mark_notification_read(id, user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Notification not found"))?;
    Ok(Json(json!({ "message": "Notification marked as read" })))
}

/// PUT /notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    let updated = state.query(move |db| db.mark_all_notifications_read(user_id)).await?;
    Ok(Json(json!({ "message": "All notifications marked as read", "updated": updated })))
}

/// DELETE /notifications/{id}
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    if !state.query(move |db| db.delete_notification(id, user_id)).await? {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(json!({ "message": "Notification deleted" })))
}

fn clean(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// POST /notifications/product-request
pub async fn create_product_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<ProductRequestInput>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    let category = v.parse::<Category>("category", &req.category, "Invalid category");
    v.finish()?;
    let category = category.ok_or_else(|| ApiError::bad_request("Invalid category"))?;

    let keywords = req.keywords.map(|kws| {
        kws.into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
    });
    let (description, city) = (clean(req.description), clean(req.city));

    let user_id = user.id;
    let (request, created) = state
        .query(move |db| db.upsert_product_request(user_id, category, keywords, description, city))
        .await?;

    let message = if created {
        "Product request created. You will be notified when matching products are added."
    } else {
        "Product request updated"
    };
    Ok(Json(json!({ "message": message, "request": ProductRequestResponse::from(request) })))
}

/// GET /notifications/product-requests
pub async fn list_product_requests(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    let requests = state.query(move |db| db.user_product_requests(user_id)).await?;
    let requests: Vec<ProductRequestResponse> = requests.into_iter().map(ProductRequestResponse::from).collect();
    Ok(Json(json!({ "requests": requests })))
}

/// DELETE /notifications/product-requests/{id}
pub async fn delete_product_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    if !state.query(move |db| db.delete_product_request(id, user_id)).await? {
        return Err(ApiError::not_found("Product request not found"));
    }
    Ok(Json(json!({ "message": "Product request deleted" })))
}

fn data_str(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn data_keywords(data: &Value) -> Vec<String> {
    data.get("keywords")
        .and_then(Value::as_array)
        .map(|kws| kws.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct RequestProductsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// GET /notifications/request-products/{notificationId}
///
/// Approved listings matching the request a `product_available`
/// notification answered.
pub async fn request_products(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(notification_id): Path<Uuid>,
    Query(q): Query<RequestProductsQuery>,
) -> ApiResult<Json<Value>> {
    let page = Page::new(q.page, q.limit, 20);
    let user_id = user.id;
    let notification = state
        .query(move |db| db.get_notification(notification_id, user_id))
        .await?
        .filter(|n| n.kind == NotificationType::ProductAvailable)
        .ok_or_else(|| ApiError::not_found("Request not found"))?;

    let data = &notification.data;
    let category = data_str(data, "category").and_then(|c| Category::from_str(&c).ok());
    let city = data_str(data, "city");
    let keywords = data_keywords(data);

    let Some(category) = category else {
        return Err(ApiError::not_found("Request not found"));
    };
    let query = ProductQuery {
        status: Some(ModerationStatus::Approved),
        category: Some(category),
        city: city.clone(),
        keywords: keywords.clone(),
        search: data_str(data, "searchQuery"),
        ..Default::default()
    };
    let result = state.query(move |db| db.list_products(&query, page)).await?;

    let products: Vec<ProductResponse> = result.items.into_iter().map(ProductResponse::from).collect();
    let mut body = paged("products", products, page, result.total)?;
    body.insert(
        "requestInfo".into(),
        json!({
            "category": category,
            "city": city,
            "keywords": keywords,
            "originalRequestId": notification_id,
        }),
    );
    Ok(Json(Value::Object(body)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub category: Option<String>,
    pub city: Option<String>,
    pub keywords: Vec<String>,
    pub first_notification_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationGroup {
    pub request_info: RequestInfo,
    pub notifications: Vec<NotificationResponse>,
    pub product_count: usize,
    pub latest_notification: DateTime<Utc>,
}

/// Group match notifications by the request that produced them:
/// category, city (or "all") and the joined keywords. Latest group first.
pub fn group_notifications(rows: Vec<NotificationRow>) -> Vec<NotificationGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<NotificationGroup> = Vec::new();

    for row in rows {
        let category = data_str(&row.data, "category");
        let city = data_str(&row.data, "city");
        let keywords = data_keywords(&row.data);
        let key = format!(
            "{}_{}_{}",
            category.as_deref().unwrap_or_default(),
            city.as_deref().unwrap_or("all"),
            keywords.join(",")
        );

        let i = *index.entry(key).or_insert_with(|| {
            groups.push(NotificationGroup {
                request_info: RequestInfo {
                    category,
                    city,
                    keywords,
                    first_notification_id: row.id,
                },
                notifications: Vec::new(),
                product_count: 0,
                latest_notification: row.created_at,
            });
            groups.len() - 1
        });

        let group = &mut groups[i];
        group.latest_notification = group.latest_notification.max(row.created_at);
        group.product_count += 1;
        group.notifications.push(NotificationResponse::from(row));
    }

    groups.sort_by(|a, b| b.latest_notification.cmp(&a.latest_notification));
    groups
}

/// GET /notifications/grouped-products
pub async fn grouped_products(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    let rows = state
        .query(move |db| db.notifications_of_kind(user_id, NotificationType::ProductAvailable))
        .await?;
    let groups = group_notifications(rows);
    Ok(Json(json!({ "totalGroups": groups.len(), "groupedRequests": groups })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(data: Value, minutes_ago: i64) -> NotificationRow {
        NotificationRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: NotificationType::ProductAvailable,
            title: "Aradığınız Ürün Eklendi! 🎯".into(),
            message: "mesaj".into(),
            product_id: None,
            data,
            is_read: false,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            product: None,
        }
    }

    #[test]
    fn groups_by_request_criteria() {
        let rows = vec![
            row(json!({ "category": "meyve", "city": "Antalya", "keywords": ["elma"] }), 1),
            row(json!({ "category": "sebze", "keywords": [] }), 5),
            row(json!({ "category": "meyve", "city": "Antalya", "keywords": ["elma"] }), 10),
        ];
        let first_id = rows[0].id;

        let groups = group_notifications(rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].product_count, 2);
        assert_eq!(groups[0].request_info.first_notification_id, first_id);
        assert_eq!(groups[0].request_info.city.as_deref(), Some("Antalya"));
        assert_eq!(groups[1].request_info.city, None);
        assert!(groups[0].latest_notification > groups[1].latest_notification);
    }

    #[test]
    fn keywords_read_from_data() {
        assert_eq!(data_keywords(&json!({ "keywords": ["a", 1, "b"] })), vec!["a", "b"]);
        assert!(data_keywords(&json!({})).is_empty());
        assert_eq!(data_str(&json!({ "city": "  " }), "city"), None);
    }
}
