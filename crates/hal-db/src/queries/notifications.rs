use anyhow::Result;
use chrono::Utc;
use hal_types::models::NotificationType;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::count;
use crate::codec::{enum_col, json_col, to_json};
use crate::filter::{Filter, Page, Paged};
use crate::models::{NewNotification, NotificationRow, ProductBriefRow};
use crate::Database;

const NOTIFICATION_SELECT: &str = "SELECT n.id, n.user_id, n.kind, n.title, n.message, \
     n.product_id, n.data, n.is_read, n.created_at, \
     p.id, p.title, p.images, p.price, p.currency \
     FROM notifications n LEFT JOIN products p ON p.id = n.product_id";

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    let product = match row.get::<_, Option<Uuid>>(9)? {
        Some(id) => Some(ProductBriefRow {
            id,
            title: row.get(10)?,
            images: json_col(row, 11)?,
            price: row.get(12)?,
            currency: enum_col(row, 13)?,
        }),
        None => None,
    };
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: enum_col(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        product_id: row.get(5)?,
        data: json_col(row, 6)?,
        is_read: row.get(7)?,
        created_at: row.get(8)?,
        product,
    })
}

impl Database {
    pub fn create_notification(&self, new: &NewNotification) -> Result<NotificationRow> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, title, message, product_id, data,
                                            is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    id,
                    new.user_id,
                    new.kind.as_str(),
                    new.title,
                    new.message,
                    new.product_id,
                    to_json(&new.data)?,
                    Utc::now(),
                ],
            )?;
            query_notification(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Notification vanished after insert"))
        })
    }

    /// The user's notifications, newest first.
    pub fn list_notifications(&self, user_id: Uuid, unread_only: bool, page: Page) -> Result<Paged<NotificationRow>> {
        let mut filter = Filter::new();
        filter.push("n.user_id = ?", user_id);
        if unread_only {
            filter.raw("n.is_read = 0");
        }
        self.with_conn(|conn| {
            let where_sql = filter.where_sql();
            let total = count(
                conn,
                &format!("SELECT COUNT(*) FROM notifications n{where_sql}"),
                &filter.params(),
            )?;
            let sql = format!("{NOTIFICATION_SELECT}{where_sql} ORDER BY n.created_at DESC LIMIT ? OFFSET ?");
            let offset = page.offset();
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(filter.paged_params(&page, &offset).as_slice(), notification_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Paged { items, total })
        })
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            count(
                conn,
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                &[&user_id],
            )
        })
    }

    /// One of the user's notifications. Other users' ids read as missing.
    pub fn get_notification(&self, id: Uuid, user_id: Uuid) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| Ok(query_notification(conn, id)?.filter(|n| n.user_id == user_id)))
    }

    pub fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_notification(conn, id)
        })
    }

    /// Returns how many were flipped.
    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?)
        })
    }

    pub fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Every notification of one kind for the user, newest first.
    pub fn notifications_of_kind(&self, user_id: Uuid, kind: NotificationType) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{NOTIFICATION_SELECT} WHERE n.user_id = ?1 AND n.kind = ?2 ORDER BY n.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, kind.as_str()], notification_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

fn query_notification(conn: &Connection, id: Uuid) -> Result<Option<NotificationRow>> {
    let sql = format!("{NOTIFICATION_SELECT} WHERE n.id = ?1");
    Ok(conn.query_row(&sql, [id], notification_from_row).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use hal_types::models::{Category, UserType};
    use serde_json::json;

    fn note(user_id: Uuid, kind: NotificationType, product_id: Option<Uuid>) -> NewNotification {
        NewNotification {
            user_id,
            kind,
            title: "Başlık".into(),
            message: "Mesaj".into(),
            product_id,
            data: json!({ "category": "meyve" }),
        }
    }

    #[test]
    fn notifications_embed_product_brief() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let product = fixtures::approved_product(&db, &seller, "Kayısı", Category::Meyve);

        let row = db
            .create_notification(&note(seller.id, NotificationType::ProductApproved, Some(product.id)))
            .unwrap();
        let brief = row.product.unwrap();
        assert_eq!(brief.title, "Kayısı");
        assert_eq!(row.data["category"], "meyve");

        // deleting the listing keeps the notification but drops the link
        db.delete_product(product.id, None).unwrap();
        let row = db.get_notification(row.id, seller.id).unwrap().unwrap();
        assert!(row.product_id.is_none());
        assert!(row.product.is_none());
    }

    #[test]
    fn read_state_and_ownership() {
        let db = Database::open_in_memory().unwrap();
        let user = fixtures::user(&db, "u@example.com", UserType::Buyer);
        let other = fixtures::user(&db, "o@example.com", UserType::Buyer);
        let a = db.create_notification(&note(user.id, NotificationType::System, None)).unwrap();
        db.create_notification(&note(user.id, NotificationType::System, None)).unwrap();

        assert_eq!(db.unread_notification_count(user.id).unwrap(), 2);
        assert!(db.mark_notification_read(a.id, other.id).unwrap().is_none());
        assert!(db.mark_notification_read(a.id, user.id).unwrap().unwrap().is_read);

        let page = Page::new(None, None, 20);
        assert_eq!(db.list_notifications(user.id, true, page).unwrap().total, 1);
        assert_eq!(db.mark_all_notifications_read(user.id).unwrap(), 1);
        assert_eq!(db.unread_notification_count(user.id).unwrap(), 0);

        assert!(!db.delete_notification(a.id, other.id).unwrap());
        assert!(db.delete_notification(a.id, user.id).unwrap());
        assert_eq!(db.list_notifications(user.id, false, page).unwrap().total, 1);
    }
}
