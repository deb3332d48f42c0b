use anyhow::Result;
use chrono::Utc;
use hal_types::api::ProductCounts;
use hal_types::models::{
    Category, Currency, ModerationStatus, ProductImage, ProductLocation, Rating, Unit,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use uuid::Uuid;

use super::count;
use crate::codec::{enum_col, fold_case, json_col, json_col_opt, like_pattern, search_key, to_json};
use crate::filter::{Filter, Page, Paged};
use crate::models::{ProductDraft, ProductRow, SellerCard};
use crate::Database;

const PRODUCT_SELECT: &str = "SELECT p.id, p.title, p.description, p.price, p.currency, \
     p.category, p.images, p.seller_id, p.city, p.district, p.address, p.is_available, \
     p.stock, p.unit, p.category_data, p.tags, p.views, \
     (SELECT COUNT(*) FROM product_favorites f WHERE f.product_id = p.id), \
     p.rating_average, p.rating_count, p.is_featured, p.status, p.approved_at, p.approved_by, \
     p.rejection_reason, p.rejected_at, p.rejected_by, p.created_at, p.updated_at, \
     u.id, u.name, u.phone, u.location, u.seller_info, u.profile_image \
     FROM products p LEFT JOIN users u ON u.id = p.seller_id";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<ProductRow> {
    let seller = match row.get::<_, Option<Uuid>>(29)? {
        Some(id) => Some(SellerCard {
            id,
            name: row.get(30)?,
            phone: row.get(31)?,
            location: json_col(row, 32)?,
            seller_info: json_col_opt(row, 33)?,
            profile_image: row.get(34)?,
        }),
        None => None,
    };

    Ok(ProductRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        currency: enum_col(row, 4)?,
        category: enum_col(row, 5)?,
        images: json_col(row, 6)?,
        seller_id: row.get(7)?,
        location: ProductLocation {
            city: row.get(8)?,
            district: row.get(9)?,
            address: row.get(10)?,
        },
        is_available: row.get(11)?,
        stock: row.get(12)?,
        unit: enum_col(row, 13)?,
        category_data: json_col(row, 14)?,
        tags: json_col(row, 15)?,
        views: row.get(16)?,
        favorites_count: row.get(17)?,
        rating: Rating {
            average: row.get(18)?,
            count: row.get(19)?,
        },
        is_featured: row.get(20)?,
        status: enum_col(row, 21)?,
        approved_at: row.get(22)?,
        approved_by: row.get(23)?,
        rejection_reason: row.get(24)?,
        rejected_at: row.get(25)?,
        rejected_by: row.get(26)?,
        created_at: row.get(27)?,
        updated_at: row.get(28)?,
        seller,
    })
}

fn product_search_text(title: &str, description: &str, tags: &[String]) -> String {
    let mut parts = vec![title, description];
    parts.extend(tags.iter().map(String::as_str));
    search_key(&parts)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    CreatedAt,
    Price,
    Views,
    Title,
}

impl ProductSort {
    /// Parse the `sortBy` query value. Unknown values are ignored.
    pub fn from_param(s: &str) -> Option<Self> {
        match s {
            "createdAt" => Some(Self::CreatedAt),
            "price" => Some(Self::Price),
            "views" => Some(Self::Views),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "p.created_at",
            Self::Price => "p.price",
            Self::Views => "p.views",
            Self::Title => "p.title",
        }
    }
}

/// Listing search. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub status: Option<ModerationStatus>,
    pub is_available: Option<bool>,
    pub featured_only: bool,
    pub seller_id: Option<Uuid>,
    pub favorited_by: Option<Uuid>,
    pub category: Option<Category>,
    /// Case-insensitive substring of the listing city.
    pub city: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Substring of title, description or tags.
    pub search: Option<String>,
    /// At least one must appear in title, description or tags.
    pub keywords: Vec<String>,
    pub sort: ProductSort,
    pub ascending: bool,
}

impl ProductQuery {
    /// What anonymous visitors may see: approved and available.
    pub fn public() -> Self {
        Self {
            status: Some(ModerationStatus::Approved),
            is_available: Some(true),
            ..Default::default()
        }
    }

    fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(status) = self.status {
            filter.push("p.status = ?", status.as_str());
        }
        if let Some(available) = self.is_available {
            filter.push("p.is_available = ?", available);
        }
        if self.featured_only {
            filter.raw("p.is_featured = 1");
        }
        if let Some(seller_id) = self.seller_id {
            filter.push("p.seller_id = ?", seller_id);
        }
        if let Some(user_id) = self.favorited_by {
            filter.push(
                "EXISTS (SELECT 1 FROM product_favorites f WHERE f.product_id = p.id AND f.user_id = ?)",
                user_id,
            );
        }
        if let Some(category) = self.category {
            filter.push("p.category = ?", category.as_str());
        }
        if let Some(city) = self.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            filter.push("p.city_key LIKE ? ESCAPE '\\'", like_pattern(&fold_case(city)));
        }
        if let Some(min) = self.min_price {
            filter.push("p.price >= ?", min);
        }
        if let Some(max) = self.max_price {
            filter.push("p.price <= ?", max);
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            filter.push("p.search_text LIKE ? ESCAPE '\\'", like_pattern(&fold_case(search)));
        }
        let keywords = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| like_pattern(&fold_case(k)))
            .collect();
        filter.any_like("p.search_text", keywords);
        filter
    }

    fn order_sql(&self) -> String {
        let dir = if self.ascending { "ASC" } else { "DESC" };
        format!("{} {dir}, p.id", self.sort.column())
    }
}

/// Partial listing edit, already validated. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<Currency>,
    pub category: Option<Category>,
    pub images: Option<Vec<ProductImage>>,
    pub location: Option<ProductLocation>,
    pub is_available: Option<bool>,
    pub stock: Option<i64>,
    pub unit: Option<Unit>,
    pub category_data: Option<Value>,
    pub tags: Option<Vec<String>>,
}

impl ProductUpdate {
    fn apply(self, p: &mut ProductRow) {
        if let Some(v) = self.title {
            p.title = v;
        }
        if let Some(v) = self.description {
            p.description = v;
        }
        if let Some(v) = self.price {
            p.price = v;
        }
        if let Some(v) = self.currency {
            p.currency = v;
        }
        if let Some(v) = self.category {
            p.category = v;
        }
        if let Some(v) = self.images {
            p.images = v;
        }
        if let Some(v) = self.location {
            p.location = v;
        }
        if let Some(v) = self.is_available {
            p.is_available = v;
        }
        if let Some(v) = self.stock {
            p.stock = v;
        }
        if let Some(v) = self.unit {
            p.unit = v;
        }
        if let Some(v) = self.category_data {
            p.category_data = v;
        }
        if let Some(v) = self.tags {
            p.tags = v;
        }
    }
}

impl Database {
    // -- Seller side --

    /// New listings start out pending moderation.
    pub fn create_product(&self, seller_id: Uuid, draft: &ProductDraft) -> Result<ProductRow> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO products (id, title, description, price, currency, category, images,
                                       seller_id, city, district, address, is_available, stock, unit,
                                       category_data, tags, search_text, city_key, status,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                         ?18, 'pending', ?19, ?19)",
                params![
                    id,
                    draft.title,
                    draft.description,
                    draft.price,
                    draft.currency.to_string(),
                    draft.category.as_str(),
                    to_json(&draft.images)?,
                    seller_id,
                    draft.location.city,
                    draft.location.district,
                    draft.location.address,
                    draft.is_available,
                    draft.stock,
                    draft.unit.to_string(),
                    to_json(&draft.category_data)?,
                    to_json(&draft.tags)?,
                    product_search_text(&draft.title, &draft.description, &draft.tags),
                    fold_case(draft.location.city.trim()),
                    now,
                ],
            )?;
            query_product(conn, id)?.ok_or_else(|| anyhow::anyhow!("Product vanished after insert"))
        })
    }

    /// Apply `update` to a listing owned by `seller_id`. `None` when the
    /// listing doesn't exist or belongs to someone else.
    pub fn update_product(&self, id: Uuid, seller_id: Uuid, update: ProductUpdate) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let Some(mut product) = query_product(conn, id)?.filter(|p| p.seller_id == seller_id) else {
                return Ok(None);
            };
            update.apply(&mut product);

            conn.execute(
                "UPDATE products SET title = ?2, description = ?3, price = ?4, currency = ?5,
                                     category = ?6, images = ?7, city = ?8, district = ?9,
                                     address = ?10, is_available = ?11, stock = ?12, unit = ?13,
                                     category_data = ?14, tags = ?15, search_text = ?16,
                                     city_key = ?17, updated_at = ?18
                 WHERE id = ?1",
                params![
                    id,
                    product.title,
                    product.description,
                    product.price,
                    product.currency.to_string(),
                    product.category.as_str(),
                    to_json(&product.images)?,
                    product.location.city,
                    product.location.district,
                    product.location.address,
                    product.is_available,
                    product.stock,
                    product.unit.to_string(),
                    to_json(&product.category_data)?,
                    to_json(&product.tags)?,
                    product_search_text(&product.title, &product.description, &product.tags),
                    fold_case(product.location.city.trim()),
                    Utc::now(),
                ],
            )?;
            query_product(conn, id)
        })
    }

    /// Delete a listing and return what was deleted. With `owner` set, only
    /// that seller's listing is touched.
    pub fn delete_product(&self, id: Uuid, owner: Option<Uuid>) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let Some(product) = query_product(conn, id)? else {
                return Ok(None);
            };
            if owner.is_some_and(|o| o != product.seller_id) {
                return Ok(None);
            }
            conn.execute("DELETE FROM products WHERE id = ?1", [id])?;
            Ok(Some(product))
        })
    }

    pub fn seller_product_counts(&self, seller_id: Uuid) -> Result<ProductCounts> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'approved'), 0),
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(status = 'rejected'), 0)
                 FROM products WHERE seller_id = ?1",
                [seller_id],
                |row| {
                    Ok(ProductCounts {
                        total: row.get(0)?,
                        approved: row.get(1)?,
                        pending: row.get(2)?,
                        rejected: row.get(3)?,
                    })
                },
            )?)
        })
    }

    // -- Reading --

    pub fn get_product(&self, id: Uuid) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| query_product(conn, id))
    }

    /// Bump the view counter. Returns the new count, `None` if missing.
    pub fn increment_views(&self, id: Uuid) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "UPDATE products SET views = views + 1 WHERE id = ?1 RETURNING views",
                    [id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn list_products(&self, query: &ProductQuery, page: Page) -> Result<Paged<ProductRow>> {
        let filter = query.filter();
        self.with_conn(|conn| {
            let where_sql = filter.where_sql();
            let total = count(
                conn,
                &format!("SELECT COUNT(*) FROM products p{where_sql}"),
                &filter.params(),
            )?;
            let sql = format!(
                "{PRODUCT_SELECT}{where_sql} ORDER BY {} LIMIT ? OFFSET ?",
                query.order_sql()
            );
            let offset = page.offset();
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(filter.paged_params(&page, &offset).as_slice(), product_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Paged { items, total })
        })
    }

    // -- Favorites --

    /// Add or remove a favorite. `Some(true)` when now favorited, `None`
    /// when the listing doesn't exist.
    pub fn toggle_favorite(&self, product_id: Uuid, user_id: Uuid) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !product_exists(&tx, product_id)? {
                return Ok(None);
            }
            let removed = tx.execute(
                "DELETE FROM product_favorites WHERE product_id = ?1 AND user_id = ?2",
                params![product_id, user_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO product_favorites (product_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    params![product_id, user_id, Utc::now()],
                )?;
            }
            tx.commit()?;
            Ok(Some(removed == 0))
        })
    }

    /// Idempotent removal. `false` when the listing doesn't exist.
    pub fn remove_favorite(&self, product_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            if !product_exists(conn, product_id)? {
                return Ok(false);
            }
            conn.execute(
                "DELETE FROM product_favorites WHERE product_id = ?1 AND user_id = ?2",
                params![product_id, user_id],
            )?;
            Ok(true)
        })
    }

    // -- Moderation --

    pub fn approve_product(&self, id: Uuid, admin_id: Uuid) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let n = conn.execute(
                "UPDATE products SET status = 'approved', approved_at = ?2, approved_by = ?3,
                                     rejection_reason = NULL, rejected_at = NULL, rejected_by = NULL,
                                     updated_at = ?2
                 WHERE id = ?1",
                params![id, now, admin_id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_product(conn, id)
        })
    }

    /// Rejected listings also lose their featured flag.
    pub fn reject_product(&self, id: Uuid, admin_id: Uuid, reason: &str) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let n = conn.execute(
                "UPDATE products SET status = 'rejected', is_featured = 0, rejection_reason = ?2,
                                     rejected_at = ?3, rejected_by = ?4, approved_at = NULL,
                                     approved_by = NULL, updated_at = ?3
                 WHERE id = ?1",
                params![id, reason, now, admin_id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_product(conn, id)
        })
    }

    pub fn toggle_featured(&self, id: Uuid) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE products SET is_featured = NOT is_featured, updated_at = ?2 WHERE id = ?1",
                params![id, Utc::now()],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_product(conn, id)
        })
    }

    pub fn recent_products(&self, limit: u32) -> Result<Vec<ProductRow>> {
        self.with_conn(|conn| {
            let sql = format!("{PRODUCT_SELECT} ORDER BY p.created_at DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], product_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_product(conn: &Connection, id: Uuid) -> Result<Option<ProductRow>> {
    let sql = format!("{PRODUCT_SELECT} WHERE p.id = ?1");
    Ok(conn.query_row(&sql, [id], product_from_row).optional()?)
}

fn product_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    Ok(count(conn, "SELECT COUNT(*) FROM products WHERE id = ?1", &[&id])? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use hal_types::models::UserType;

    fn page() -> Page {
        Page::new(None, None, 10)
    }

    #[test]
    fn new_products_are_pending_and_hidden() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let product = db
            .create_product(seller.id, &fixtures::draft("Domates", Category::Sebze, "Antalya"))
            .unwrap();

        assert_eq!(product.status, ModerationStatus::Pending);
        assert_eq!(product.seller.as_ref().unwrap().name, "Test Kullanıcı");
        assert_eq!(db.list_products(&ProductQuery::public(), page()).unwrap().total, 0);

        db.approve_product(product.id, seller.id).unwrap();
        let public = db.list_products(&ProductQuery::public(), page()).unwrap();
        assert_eq!(public.total, 1);
        assert_eq!(public.items[0].id, product.id);
    }

    #[test]
    fn search_covers_title_description_and_tags() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let mut draft = fixtures::draft("Şeftali", Category::Meyve, "Bursa");
        draft.tags = vec!["Organik".into()];
        let product = db.create_product(seller.id, &draft).unwrap();
        db.approve_product(product.id, seller.id).unwrap();

        for term in ["ŞEFTALİ", "şeftali", "ORGANİK", "uygun"] {
            let query = ProductQuery {
                search: Some(term.into()),
                ..ProductQuery::public()
            };
            assert_eq!(db.list_products(&query, page()).unwrap().total, 1, "term {term}");
        }
    }

    #[test]
    fn price_and_city_filters() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let mut cheap = fixtures::draft("Elma", Category::Meyve, "Isparta");
        cheap.price = 5.0;
        let mut dear = fixtures::draft("Kiraz", Category::Meyve, "Konya");
        dear.price = 80.0;
        for draft in [cheap, dear] {
            let p = db.create_product(seller.id, &draft).unwrap();
            db.approve_product(p.id, seller.id).unwrap();
        }

        let query = ProductQuery {
            min_price: Some(10.0),
            ..ProductQuery::public()
        };
        let rows = db.list_products(&query, page()).unwrap();
        assert_eq!(rows.items.len(), 1);
        assert_eq!(rows.items[0].title, "Kiraz");

        let query = ProductQuery {
            city: Some("İSPAR".into()),
            ..ProductQuery::public()
        };
        assert_eq!(db.list_products(&query, page()).unwrap().items[0].title, "Elma");

        let query = ProductQuery {
            sort: ProductSort::Price,
            ascending: true,
            ..ProductQuery::public()
        };
        assert_eq!(db.list_products(&query, page()).unwrap().items[0].title, "Elma");
    }

    #[test]
    fn update_requires_owner() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "o@example.com", UserType::Seller);
        let other = fixtures::user(&db, "x@example.com", UserType::Seller);
        let product = db
            .create_product(owner.id, &fixtures::draft("Patates", Category::Sebze, "Niğde"))
            .unwrap();

        let update = ProductUpdate {
            price: Some(12.5),
            tags: Some(vec!["çuval".into()]),
            ..Default::default()
        };
        assert!(db.update_product(product.id, other.id, update.clone()).unwrap().is_none());

        let updated = db.update_product(product.id, owner.id, update).unwrap().unwrap();
        assert_eq!(updated.price, 12.5);
        assert_eq!(updated.title, "Patates");

        assert!(db.delete_product(product.id, Some(other.id)).unwrap().is_none());
        assert!(db.delete_product(product.id, Some(owner.id)).unwrap().is_some());
        assert!(db.get_product(product.id).unwrap().is_none());
    }

    #[test]
    fn favorites_toggle() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let product = fixtures::approved_product(&db, &seller, "Üzüm", Category::Meyve);

        assert_eq!(db.toggle_favorite(product.id, buyer.id).unwrap(), Some(true));
        assert_eq!(db.get_product(product.id).unwrap().unwrap().favorites_count, 1);

        let favorites = ProductQuery {
            favorited_by: Some(buyer.id),
            status: Some(ModerationStatus::Approved),
            ..Default::default()
        };
        assert_eq!(db.list_products(&favorites, page()).unwrap().total, 1);

        assert_eq!(db.toggle_favorite(product.id, buyer.id).unwrap(), Some(false));
        assert!(db.remove_favorite(product.id, buyer.id).unwrap());
        assert_eq!(db.toggle_favorite(Uuid::new_v4(), buyer.id).unwrap(), None);
    }

    #[test]
    fn reject_clears_featured() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let product = fixtures::approved_product(&db, &seller, "Nohut", Category::Bakliyat);

        let featured = db.toggle_featured(product.id).unwrap().unwrap();
        assert!(featured.is_featured);

        let rejected = db.reject_product(product.id, seller.id, "Eksik bilgi").unwrap().unwrap();
        assert_eq!(rejected.status, ModerationStatus::Rejected);
        assert!(!rejected.is_featured);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Eksik bilgi"));
        assert!(rejected.approved_at.is_none());

        let counts = db.seller_product_counts(seller.id).unwrap();
        assert_eq!((counts.total, counts.rejected, counts.approved), (1, 1, 0));
    }

    #[test]
    fn views_increment() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let product = fixtures::approved_product(&db, &seller, "Ayva", Category::Meyve);
        assert_eq!(db.increment_views(product.id).unwrap(), Some(1));
        assert_eq!(db.increment_views(product.id).unwrap(), Some(2));
        assert_eq!(db.increment_views(Uuid::new_v4()).unwrap(), None);
    }
}
