use anyhow::Result;
use hal_types::api::DashboardStats;

use crate::Database;

impl Database {
    /// Admin dashboard counters in one round trip.
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM products),
                    (SELECT COUNT(*) FROM products WHERE status = 'pending'),
                    (SELECT COUNT(*) FROM products WHERE status = 'approved'),
                    (SELECT COUNT(*) FROM users WHERE is_active = 1),
                    (SELECT COUNT(*) FROM users WHERE is_active = 0),
                    (SELECT COUNT(*) FROM products WHERE is_featured = 1),
                    (SELECT COUNT(*) FROM market_reports),
                    (SELECT COALESCE(SUM(views), 0) FROM products),
                    (SELECT COUNT(*) FROM product_favorites)",
                [],
                |row| {
                    Ok(DashboardStats {
                        total_users: row.get(0)?,
                        total_products: row.get(1)?,
                        pending_products: row.get(2)?,
                        approved_products: row.get(3)?,
                        active_users: row.get(4)?,
                        blocked_users: row.get(5)?,
                        featured_products: row.get(6)?,
                        total_market_reports: row.get(7)?,
                        total_views: row.get(8)?,
                        total_favorites: row.get(9)?,
                    })
                },
            )?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use hal_types::models::{Category, UserType};

    #[test]
    fn counts_reflect_moderation_state() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let approved = fixtures::approved_product(&db, &seller, "Elma", Category::Meyve);
        db.create_product(seller.id, &fixtures::draft("Armut", Category::Meyve, "Bursa"))
            .unwrap();
        db.increment_views(approved.id).unwrap();
        db.toggle_favorite(approved.id, buyer.id).unwrap();
        db.set_user_active(buyer.id, false).unwrap();

        let stats = db.dashboard_stats().unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.blocked_users, 1);
        assert_eq!(stats.total_products, 2);
        assert_eq!(stats.pending_products, 1);
        assert_eq!(stats.approved_products, 1);
        assert_eq!(stats.total_views, 1);
        assert_eq!(stats.total_favorites, 1);
    }
}
