use serde::Serialize;
use serde_json::{Map, Value, json};

use hal_db::Page;

use crate::error::{ApiError, ApiResult};

/// `{ <key>: items, totalPages, currentPage, total }`
pub fn paged<T: Serialize>(key: &str, items: Vec<T>, page: Page, total: i64) -> ApiResult<Map<String, Value>> {
    let items = serde_json::to_value(items).map_err(|e| ApiError::Internal(e.into()))?;
    let mut body = Map::new();
    body.insert(key.to_string(), items);
    body.insert("totalPages".into(), json!(page.total_pages(total)));
    body.insert("currentPage".into(), json!(page.page));
    body.insert("total".into(), json!(total));
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let body = paged("products", vec![1, 2], Page::new(Some(2), Some(2), 10), 5).unwrap();
        assert_eq!(
            Value::Object(body),
            json!({ "products": [1, 2], "totalPages": 3, "currentPage": 2, "total": 5 })
        );
    }
}
