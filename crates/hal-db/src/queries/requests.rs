use anyhow::Result;
use chrono::Utc;
use hal_types::models::Category;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::codec::{enum_col, json_col, to_json};
use crate::models::ProductRequestRow;
use crate::Database;

const REQUEST_COLUMNS: &str =
    "id, user_id, category, keywords, description, city, is_active, created_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<ProductRequestRow> {
    Ok(ProductRequestRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: enum_col(row, 2)?,
        keywords: json_col(row, 3)?,
        description: row.get(4)?,
        city: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Database {
    /// A user holds at most one active request per category. A second
    /// request updates the first, overwriting only the fields supplied.
    /// Returns the request and whether it was newly created.
    pub fn upsert_product_request(
        &self,
        user_id: Uuid,
        category: Category,
        keywords: Option<Vec<String>>,
        description: Option<String>,
        city: Option<String>,
    ) -> Result<(ProductRequestRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<Uuid> = tx
                .query_row(
                    "SELECT id FROM product_requests
                     WHERE user_id = ?1 AND category = ?2 AND is_active = 1",
                    params![user_id, category.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let keywords_json = keywords.as_ref().map(to_json).transpose()?;
            let (id, created) = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE product_requests SET
                            keywords = COALESCE(?2, keywords),
                            description = COALESCE(?3, description),
                            city = COALESCE(?4, city)
                         WHERE id = ?1",
                        params![id, keywords_json, description, city],
                    )?;
                    (id, false)
                }
                None => {
                    let id = Uuid::new_v4();
                    tx.execute(
                        "INSERT INTO product_requests (id, user_id, category, keywords, description,
                                                       city, is_active, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                        params![
                            id,
                            user_id,
                            category.as_str(),
                            keywords_json.unwrap_or_else(|| "[]".to_string()),
                            description,
                            city,
                            Utc::now(),
                        ],
                    )?;
                    (id, true)
                }
            };

            let row = query_request(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Product request vanished after upsert"))?;
            tx.commit()?;
            Ok((row, created))
        })
    }

    /// The user's active requests, newest first.
    pub fn user_product_requests(&self, user_id: Uuid) -> Result<Vec<ProductRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM product_requests
                 WHERE user_id = ?1 AND is_active = 1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], request_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Delete one of the user's requests. `false` if it isn't theirs.
    pub fn delete_product_request(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM product_requests WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Active requests in `category`, oldest first.
    pub fn active_requests_in_category(&self, category: Category) -> Result<Vec<ProductRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM product_requests
                 WHERE category = ?1 AND is_active = 1
                 ORDER BY created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([category.as_str()], request_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Drop a request once a listing has answered it. A fulfilled request
    /// can't match again.
    pub fn fulfill_product_request(&self, request_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM product_requests WHERE id = ?1", [request_id])?;
            Ok(n > 0)
        })
    }
}

fn query_request(conn: &Connection, id: Uuid) -> Result<Option<ProductRequestRow>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM product_requests WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], request_from_row).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use hal_types::models::UserType;

    #[test]
    fn second_request_in_category_updates_first() {
        let db = Database::open_in_memory().unwrap();
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);

        let (first, created) = db
            .upsert_product_request(
                buyer.id,
                Category::Meyve,
                Some(vec!["elma".into()]),
                Some("kırmızı".into()),
                Some("Isparta".into()),
            )
            .unwrap();
        assert!(created);

        let (second, created) = db
            .upsert_product_request(buyer.id, Category::Meyve, Some(vec!["armut".into()]), None, None)
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.keywords, vec!["armut".to_string()]);
        // unsupplied fields survive
        assert_eq!(second.city.as_deref(), Some("Isparta"));
        assert_eq!(second.description.as_deref(), Some("kırmızı"));

        db.upsert_product_request(buyer.id, Category::Sebze, None, None, None)
            .unwrap();
        assert_eq!(db.user_product_requests(buyer.id).unwrap().len(), 2);
    }

    #[test]
    fn fulfilled_requests_are_removed() {
        let db = Database::open_in_memory().unwrap();
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let (request, _) = db
            .upsert_product_request(buyer.id, Category::Et, None, None, None)
            .unwrap();
        db.upsert_product_request(buyer.id, Category::Sut, None, None, None)
            .unwrap();

        assert_eq!(db.active_requests_in_category(Category::Et).unwrap().len(), 1);
        assert!(db.fulfill_product_request(request.id).unwrap());
        assert!(db.active_requests_in_category(Category::Et).unwrap().is_empty());
        assert!(!db.fulfill_product_request(request.id).unwrap());

        let left = db.user_product_requests(buyer.id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].category, Category::Sut);
    }

    #[test]
    fn only_owner_deletes_request() {
        let db = Database::open_in_memory().unwrap();
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let other = fixtures::user(&db, "o@example.com", UserType::Buyer);
        let (request, _) = db
            .upsert_product_request(buyer.id, Category::Sut, None, None, None)
            .unwrap();

        assert!(!db.delete_product_request(request.id, other.id).unwrap());
        assert!(db.delete_product_request(request.id, buyer.id).unwrap());
    }
}
