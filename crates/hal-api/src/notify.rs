//! Notification helpers. Every stored notification is also pushed to the
//! recipient's live gateway connections. Failures are logged and swallowed:
//! a missed notification never fails the request that caused it.

use serde_json::{Value, json};
use tracing::{debug, error, info};
use uuid::Uuid;

use hal_db::codec::fold_case;
use hal_db::models::{NewNotification, NotificationRow, ProductRequestRow, ProductRow};
use hal_types::api::NotificationResponse;
use hal_types::events::GatewayEvent;
use hal_types::models::NotificationType;

use crate::auth::AppStateInner;

/// Generic title when no request keyword shows up in the listing.
const MATCH_TITLE: &str = "Aradığınız Ürün Eklendi! 🎯";

/// Store a notification and push it to the user. `None` on failure.
pub async fn notify(
    state: &AppStateInner,
    user_id: Uuid,
    kind: NotificationType,
    title: String,
    message: String,
    product_id: Option<Uuid>,
    data: Value,
) -> Option<NotificationRow> {
    let new = NewNotification {
        user_id,
        kind,
        title,
        message,
        product_id,
        data,
    };
    let row = match state.query(move |db| db.create_notification(&new)).await {
        Ok(row) => row,
        Err(e) => {
            error!("Failed to create {} notification for {}: {}", kind, user_id, e);
            return None;
        }
    };
    debug!("Notification {} ({}) created for {}", row.id, kind, user_id);

    state
        .dispatcher
        .send_to_user(
            user_id,
            GatewayEvent::NotificationCreate {
                notification: NotificationResponse::from(row.clone()),
            },
        )
        .await;
    Some(row)
}

pub async fn product_pending(state: &AppStateInner, product: &ProductRow) {
    notify(
        state,
        product.seller_id,
        NotificationType::ProductPending,
        "Ürün Onay Sürecinde".into(),
        format!(
            "\"{}\" ürününüz onay için gönderildi. Admin incelemesinden sonra yayınlanacaktır.",
            product.title
        ),
        Some(product.id),
        json!({}),
    )
    .await;
}

pub async fn product_approved(state: &AppStateInner, product: &ProductRow) {
    notify(
        state,
        product.seller_id,
        NotificationType::ProductApproved,
        "Ürün Onaylandı! 🎉".into(),
        format!("\"{}\" ürününüz onaylandı ve şimdi yayında!", product.title),
        Some(product.id),
        json!({}),
    )
    .await;
}

pub async fn product_rejected(state: &AppStateInner, product: &ProductRow, reason: Option<&str>) {
    notify(
        state,
        product.seller_id,
        NotificationType::ProductRejected,
        "Ürün Reddedildi".into(),
        format!(
            "\"{}\" ürününüz reddedildi. Sebep: {}",
            product.title,
            reason.unwrap_or("Belirtilmedi")
        ),
        Some(product.id),
        json!({ "rejectionReason": reason }),
    )
    .await;
}

pub async fn product_featured(state: &AppStateInner, product: &ProductRow) {
    notify(
        state,
        product.seller_id,
        NotificationType::ProductFeatured,
        "Ürününüz Öne Çıkarıldı! ⭐".into(),
        format!(
            "\"{}\" ürününüz admin tarafından öne çıkarıldı. Ana sayfada görünecek!",
            product.title
        ),
        Some(product.id),
        json!({}),
    )
    .await;
}

/// A request accepted for a listing.
#[derive(Debug, PartialEq)]
pub struct RequestMatch {
    /// First request keyword found in the listing, if any.
    pub keyword: Option<String>,
}

impl RequestMatch {
    pub fn title(&self) -> String {
        match &self.keyword {
            Some(kw) => format!("\"{kw}\" Ürünü Eklendi! 🎯"),
            None => MATCH_TITLE.to_string(),
        }
    }
}

/// Decide whether a buyer request is answered by a listing.
///
/// Cities must agree when both sides name one. A request with keywords
/// needs at least one of them inside the listing's title or description.
pub fn match_request(request: &ProductRequestRow, product: &ProductRow) -> Option<RequestMatch> {
    let request_city = request.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let product_city = product.location.city.trim();
    if let Some(city) = request_city {
        if !product_city.is_empty() && fold_case(city) != fold_case(product_city) {
            debug!("Request {} skipped: city {} != {}", request.id, city, product_city);
            return None;
        }
    }

    if request.keywords.is_empty() {
        return Some(RequestMatch { keyword: None });
    }

    let haystack = fold_case(&format!("{} {}", product.title, product.description));
    let keyword = request
        .keywords
        .iter()
        .find(|kw| !kw.is_empty() && haystack.contains(&fold_case(kw)));
    match keyword {
        Some(kw) => Some(RequestMatch {
            keyword: Some(kw.clone()),
        }),
        None => {
            debug!("Request {} skipped: no keyword in \"{}\"", request.id, product.title);
            None
        }
    }
}

/// Notify every buyer whose active request in the listing's category is
/// answered by it, then drop those requests. Returns the number notified.
pub async fn notify_matching_buyers(state: &AppStateInner, product: &ProductRow) -> usize {
    let category = product.category;
    let requests = match state
        .query(move |db| db.active_requests_in_category(category))
        .await
    {
        Ok(requests) => requests,
        Err(e) => {
            error!("Failed to load product requests for {}: {}", product.id, e);
            return 0;
        }
    };
    debug!("{} open requests in {} for \"{}\"", requests.len(), category, product.title);

    let mut notified = 0;
    for request in requests {
        let Some(m) = match_request(&request, product) else {
            continue;
        };

        let search_query = if request.keywords.is_empty() {
            product.title.clone()
        } else {
            request.keywords.join(" ")
        };
        let data = json!({
            "category": product.category,
            "city": product.location.city,
            "keywords": request.keywords,
            "matchedRequestId": request.id,
            "productTitle": product.title,
            "productPrice": product.price,
            "productUnit": product.unit,
            "searchQuery": search_query,
        });
        let message = format!(
            "\"{}\" - {} kategorisinde aradığınız ürün eklendi. Talebiniz tamamlandı ve silindi.",
            product.title, product.category
        );

        if notify(
            state,
            request.user_id,
            NotificationType::ProductAvailable,
            m.title(),
            message,
            Some(product.id),
            data,
        )
        .await
        .is_none()
        {
            continue;
        }

        let request_id = request.id;
        if let Err(e) = state
            .query(move |db| db.fulfill_product_request(request_id))
            .await
        {
            error!("Failed to close fulfilled request {}: {}", request_id, e);
        }
        notified += 1;
    }

    info!("Notified {} buyers about \"{}\"", notified, product.title);
    notified
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hal_types::models::{Category, Currency, ModerationStatus, ProductLocation, Rating, Unit};

    fn product(title: &str, description: &str, city: &str) -> ProductRow {
        ProductRow {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            price: 20.0,
            currency: Currency::Tl,
            category: Category::Meyve,
            images: vec![],
            seller_id: Uuid::new_v4(),
            location: ProductLocation {
                city: city.into(),
                district: None,
                address: None,
            },
            is_available: true,
            stock: 5,
            unit: Unit::Kg,
            category_data: json!({}),
            tags: vec![],
            views: 0,
            favorites_count: 0,
            rating: Rating::default(),
            is_featured: false,
            status: ModerationStatus::Approved,
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
            rejected_at: None,
            rejected_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            seller: None,
        }
    }

    fn request(keywords: &[&str], city: Option<&str>) -> ProductRequestRow {
        ProductRequestRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            category: Category::Meyve,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            description: None,
            city: city.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn open_request_matches_anything_in_category() {
        let m = match_request(&request(&[], None), &product("Elma", "Amasya elması", "Amasya")).unwrap();
        assert_eq!(m.keyword, None);
        assert_eq!(m.title(), MATCH_TITLE);
    }

    #[test]
    fn city_must_agree_ignoring_case_and_spaces() {
        let p = product("Elma", "Amasya elması", "Amasya");
        assert!(match_request(&request(&[], Some(" amasya ")), &p).is_some());
        assert!(match_request(&request(&[], Some("Tokat")), &p).is_none());
    }

    #[test]
    fn keyword_found_in_description() {
        let p = product("Kırmızı Elma", "Tatlı starking çeşidi", "Isparta");
        let m = match_request(&request(&["armut", "Starking"], None), &p).unwrap();
        assert_eq!(m.keyword.as_deref(), Some("Starking"));
        assert_eq!(m.title(), "\"Starking\" Ürünü Eklendi! 🎯");

        assert!(match_request(&request(&["armut", "ayva"], None), &p).is_none());
    }

    #[test]
    fn dotted_capital_i_folds_like_the_catalog() {
        let p = product("İNCİR", "Taze İzmir inciri", "İzmir");
        assert!(match_request(&request(&[], Some("izmir")), &p).is_some());
        assert!(match_request(&request(&[], Some("İZMİR")), &p).is_some());

        let m = match_request(&request(&["incir"], Some("Izmir")), &p).unwrap();
        assert_eq!(m.keyword.as_deref(), Some("incir"));
    }
}
