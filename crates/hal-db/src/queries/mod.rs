mod locations;
mod market_reports;
mod messages;
mod notifications;
mod orders;
mod products;
mod requests;
mod stats;
mod users;

pub use market_reports::{REPORT_TTL_HOURS, ReportChanges, ReportFilter};
pub use orders::{OrderError, OrderSide};
pub use products::{ProductQuery, ProductSort, ProductUpdate};
pub use users::ProfileUpdate;

use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::ToSql;

fn count(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<i64> {
    Ok(conn.query_row(sql, params, |row| row.get(0))?)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::Database;
    use crate::models::{NewUser, ProductDraft, ProductRow, UserRow};
    use hal_types::models::{Category, Currency, ProductImage, ProductLocation, Unit, UserType};

    pub fn user(db: &Database, email: &str, user_type: UserType) -> UserRow {
        db.create_user(&NewUser {
            name: "Test Kullanıcı",
            email,
            password_hash: "$argon2id$stub",
            phone: "05321234567",
            user_type,
        })
        .unwrap()
    }

    pub fn draft(title: &str, category: Category, city: &str) -> ProductDraft {
        ProductDraft {
            title: title.to_string(),
            description: format!("{title} taze ve uygun fiyatlı"),
            price: 25.0,
            currency: Currency::Tl,
            category,
            images: vec![ProductImage::placeholder()],
            location: ProductLocation {
                city: city.to_string(),
                district: None,
                address: None,
            },
            is_available: true,
            stock: 10,
            unit: Unit::Kg,
            category_data: serde_json::json!({}),
            tags: vec![],
        }
    }

    /// Create and approve a listing.
    pub fn approved_product(db: &Database, seller: &UserRow, title: &str, category: Category) -> ProductRow {
        let product = db.create_product(seller.id, &draft(title, category, "Antalya")).unwrap();
        db.approve_product(product.id, seller.id).unwrap().unwrap()
    }
}
