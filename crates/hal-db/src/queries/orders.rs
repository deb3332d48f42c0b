use anyhow::Result;
use chrono::Utc;
use hal_types::models::{ModerationStatus, OrderStatus, PaymentStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::count;
use crate::codec::{enum_col, json_col, to_json};
use crate::filter::{Filter, Page, Paged};
use crate::models::{NewOrder, OrderRow, PartyRow, ProductBriefRow};
use crate::Database;

/// Business-rule failures from order operations. Carried inside
/// `anyhow::Error`, so callers downcast to map them to responses.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Product not found")]
    ProductNotFound,
    #[error("Product is not available")]
    ProductUnavailable,
    #[error("Insufficient stock")]
    InsufficientStock,
    #[error("Order not found")]
    NotFound,
    #[error("Not authorized")]
    NotAuthorized,
    #[error("Can only cancel pending orders")]
    NotPending,
    #[error("Cancelled orders cannot be reopened")]
    AlreadyCancelled,
}

/// Which party's orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buyer,
    Seller,
}

const ORDER_SELECT: &str = "SELECT o.id, o.product_id, o.quantity, o.unit_price, o.total_price, \
     o.status, o.delivery_address, o.notes, o.payment_method, o.payment_status, \
     o.delivered_at, o.cancelled_at, o.cancellation_reason, o.created_at, o.updated_at, \
     b.id, b.name, b.phone, b.location, \
     s.id, s.name, s.phone, s.location, \
     p.id, p.title, p.images, p.price, p.currency \
     FROM orders o \
     JOIN users b ON b.id = o.buyer_id \
     JOIN users s ON s.id = o.seller_id \
     LEFT JOIN products p ON p.id = o.product_id";

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    let product = match row.get::<_, Option<Uuid>>(23)? {
        Some(id) => Some(ProductBriefRow {
            id,
            title: row.get(24)?,
            images: json_col(row, 25)?,
            price: row.get(26)?,
            currency: enum_col(row, 27)?,
        }),
        None => None,
    };
    Ok(OrderRow {
        id: row.get(0)?,
        product_id: row.get(1)?,
        quantity: row.get(2)?,
        unit_price: row.get(3)?,
        total_price: row.get(4)?,
        status: enum_col(row, 5)?,
        delivery_address: json_col(row, 6)?,
        notes: row.get(7)?,
        payment_method: enum_col(row, 8)?,
        payment_status: enum_col(row, 9)?,
        delivered_at: row.get(10)?,
        cancelled_at: row.get(11)?,
        cancellation_reason: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        buyer: PartyRow {
            id: row.get(15)?,
            name: row.get(16)?,
            phone: row.get(17)?,
            location: json_col(row, 18)?,
        },
        seller: PartyRow {
            id: row.get(19)?,
            name: row.get(20)?,
            phone: row.get(21)?,
            location: json_col(row, 22)?,
        },
        product,
    })
}

impl Database {
    /// Place an order. The stock decrement and the order insert commit
    /// together; stock never goes negative.
    pub fn place_order(&self, new: &NewOrder) -> Result<OrderRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let product: Option<(Uuid, f64, String, bool)> = tx
                .query_row(
                    "SELECT seller_id, price, status, is_available FROM products WHERE id = ?1",
                    [new.product_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let Some((seller_id, unit_price, status, is_available)) = product else {
                return Err(OrderError::ProductNotFound.into());
            };
            if !is_available || status != ModerationStatus::Approved.as_str() {
                return Err(OrderError::ProductUnavailable.into());
            }

            let now = Utc::now();
            let updated = tx.execute(
                "UPDATE products SET stock = stock - ?2,
                                     is_available = CASE WHEN stock - ?2 = 0 THEN 0 ELSE is_available END,
                                     updated_at = ?3
                 WHERE id = ?1 AND stock >= ?2",
                params![new.product_id, new.quantity, now],
            )?;
            if updated == 0 {
                return Err(OrderError::InsufficientStock.into());
            }

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO orders (id, buyer_id, seller_id, product_id, quantity, unit_price,
                                     total_price, status, delivery_address, notes, payment_method,
                                     payment_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    id,
                    new.buyer_id,
                    seller_id,
                    new.product_id,
                    new.quantity,
                    unit_price,
                    unit_price * new.quantity as f64,
                    OrderStatus::Pending.as_str(),
                    to_json(&new.delivery_address)?,
                    new.notes,
                    new.payment_method.to_string(),
                    PaymentStatus::Pending.to_string(),
                    now,
                ],
            )?;

            let order = query_order(&tx, id)?.ok_or(OrderError::NotFound)?;
            tx.commit()?;
            Ok(order)
        })
    }

    pub fn get_order(&self, id: Uuid) -> Result<Option<OrderRow>> {
        self.with_conn(|conn| query_order(conn, id))
    }

    /// Orders where `user_id` is on `side`, newest first.
    pub fn list_orders(
        &self,
        side: OrderSide,
        user_id: Uuid,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<Paged<OrderRow>> {
        let mut filter = Filter::new();
        match side {
            OrderSide::Buyer => filter.push("o.buyer_id = ?", user_id),
            OrderSide::Seller => filter.push("o.seller_id = ?", user_id),
        };
        if let Some(status) = status {
            filter.push("o.status = ?", status.as_str());
        }

        self.with_conn(|conn| {
            let where_sql = filter.where_sql();
            let total = count(conn, &format!("SELECT COUNT(*) FROM orders o{where_sql}"), &filter.params())?;
            let sql = format!("{ORDER_SELECT}{where_sql} ORDER BY o.created_at DESC LIMIT ? OFFSET ?");
            let offset = page.offset();
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(filter.paged_params(&page, &offset).as_slice(), order_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Paged { items, total })
        })
    }

    /// Move an order to `status` on behalf of its buyer or seller.
    /// Cancelling a live order puts its quantity back on the shelf.
    /// Cancellation is final: the only accepted status afterwards is
    /// `Cancelled` again, which changes nothing.
    pub fn update_order_status(
        &self,
        id: Uuid,
        actor_id: Uuid,
        status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<OrderRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let order = query_order(&tx, id)?.ok_or(OrderError::NotFound)?;
            if order.buyer.id != actor_id && order.seller.id != actor_id {
                return Err(OrderError::NotAuthorized.into());
            }

            if order.status == OrderStatus::Cancelled {
                if status != OrderStatus::Cancelled {
                    return Err(OrderError::AlreadyCancelled.into());
                }
                return Ok(order);
            }

            let now = Utc::now();
            match status {
                OrderStatus::Delivered => {
                    tx.execute(
                        "UPDATE orders SET status = ?2, delivered_at = ?3, updated_at = ?3 WHERE id = ?1",
                        params![id, status.as_str(), now],
                    )?;
                }
                OrderStatus::Cancelled => {
                    cancel(&tx, &order, reason)?;
                }
                _ => {
                    tx.execute(
                        "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
                        params![id, status.as_str(), now],
                    )?;
                }
            }

            let order = query_order(&tx, id)?.ok_or(OrderError::NotFound)?;
            tx.commit()?;
            Ok(order)
        })
    }

    /// Buyer-initiated cancellation of a pending order.
    pub fn cancel_order(&self, id: Uuid, buyer_id: Uuid) -> Result<OrderRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let order = query_order(&tx, id)?.ok_or(OrderError::NotFound)?;
            if order.buyer.id != buyer_id {
                return Err(OrderError::NotAuthorized.into());
            }
            if order.status != OrderStatus::Pending {
                return Err(OrderError::NotPending.into());
            }
            cancel(&tx, &order, None)?;

            let order = query_order(&tx, id)?.ok_or(OrderError::NotFound)?;
            tx.commit()?;
            Ok(order)
        })
    }
}

fn cancel(conn: &Connection, order: &OrderRow, reason: Option<&str>) -> Result<()> {
    let now = Utc::now();
    conn.execute(
        "UPDATE orders SET status = 'cancelled', cancelled_at = ?2, cancellation_reason = ?3,
                           updated_at = ?2
         WHERE id = ?1",
        params![order.id, now, reason],
    )?;
    conn.execute(
        "UPDATE products SET stock = stock + ?2, is_available = 1, updated_at = ?3 WHERE id = ?1",
        params![order.product_id, order.quantity, now],
    )?;
    Ok(())
}

fn query_order(conn: &Connection, id: Uuid) -> Result<Option<OrderRow>> {
    let sql = format!("{ORDER_SELECT} WHERE o.id = ?1");
    Ok(conn.query_row(&sql, [id], order_from_row).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRow;
    use crate::queries::fixtures;
    use hal_types::models::{Category, DeliveryAddress, PaymentMethod, UserType};

    fn order_for(buyer: &UserRow, product_id: Uuid, quantity: i64) -> NewOrder {
        NewOrder {
            buyer_id: buyer.id,
            product_id,
            quantity,
            delivery_address: DeliveryAddress {
                street: "Atatürk Cd. 1".into(),
                city: "Antalya".into(),
                district: "Muratpaşa".into(),
                ..Default::default()
            },
            notes: None,
            payment_method: PaymentMethod::Cash,
        }
    }

    fn downcast(err: anyhow::Error) -> OrderError {
        err.downcast::<OrderError>().unwrap()
    }

    #[test]
    fn ordering_decrements_stock_and_closes_sold_out_listing() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let product = fixtures::approved_product(&db, &seller, "Portakal", Category::Meyve);
        assert_eq!(product.stock, 10);

        let order = db.place_order(&order_for(&buyer, product.id, 4)).unwrap();
        assert_eq!(order.total_price, 100.0);
        assert_eq!(order.seller.id, seller.id);
        assert_eq!(order.status, OrderStatus::Pending);

        let err = db.place_order(&order_for(&buyer, product.id, 7)).unwrap_err();
        assert_eq!(downcast(err), OrderError::InsufficientStock);
        assert_eq!(db.get_product(product.id).unwrap().unwrap().stock, 6);

        db.place_order(&order_for(&buyer, product.id, 6)).unwrap();
        let sold_out = db.get_product(product.id).unwrap().unwrap();
        assert_eq!(sold_out.stock, 0);
        assert!(!sold_out.is_available);

        let err = db.place_order(&order_for(&buyer, product.id, 1)).unwrap_err();
        assert_eq!(downcast(err), OrderError::ProductUnavailable);
    }

    #[test]
    fn pending_listings_cannot_be_ordered() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let product = db
            .create_product(seller.id, &fixtures::draft("Fasulye", Category::Bakliyat, "Konya"))
            .unwrap();

        let err = db.place_order(&order_for(&buyer, product.id, 1)).unwrap_err();
        assert_eq!(downcast(err), OrderError::ProductUnavailable);

        let err = db.place_order(&order_for(&buyer, Uuid::new_v4(), 1)).unwrap_err();
        assert_eq!(downcast(err), OrderError::ProductNotFound);
    }

    #[test]
    fn cancelling_restores_stock() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let stranger = fixtures::user(&db, "x@example.com", UserType::Buyer);
        let product = fixtures::approved_product(&db, &seller, "Limon", Category::Meyve);
        let order = db.place_order(&order_for(&buyer, product.id, 10)).unwrap();

        let err = db.cancel_order(order.id, stranger.id).unwrap_err();
        assert_eq!(downcast(err), OrderError::NotAuthorized);

        let cancelled = db.cancel_order(order.id, buyer.id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        let restored = db.get_product(product.id).unwrap().unwrap();
        assert_eq!(restored.stock, 10);
        assert!(restored.is_available);

        let err = db.cancel_order(order.id, buyer.id).unwrap_err();
        assert_eq!(downcast(err), OrderError::NotPending);
    }

    #[test]
    fn status_updates_by_participants_only() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let stranger = fixtures::user(&db, "x@example.com", UserType::Buyer);
        let product = fixtures::approved_product(&db, &seller, "Mandalina", Category::Meyve);
        let order = db.place_order(&order_for(&buyer, product.id, 2)).unwrap();

        let err = db
            .update_order_status(order.id, stranger.id, OrderStatus::Confirmed, None)
            .unwrap_err();
        assert_eq!(downcast(err), OrderError::NotAuthorized);

        let delivered = db
            .update_order_status(order.id, seller.id, OrderStatus::Delivered, None)
            .unwrap();
        assert!(delivered.delivered_at.is_some());

        // cancelling twice restores stock once
        db.update_order_status(order.id, seller.id, OrderStatus::Cancelled, Some("iade"))
            .unwrap();
        let again = db
            .update_order_status(order.id, seller.id, OrderStatus::Cancelled, None)
            .unwrap();
        assert_eq!(again.cancellation_reason.as_deref(), Some("iade"));
        assert_eq!(db.get_product(product.id).unwrap().unwrap().stock, 10);

        let page = Page::new(None, None, 10);
        assert_eq!(db.list_orders(OrderSide::Seller, seller.id, None, page).unwrap().total, 1);
        assert_eq!(
            db.list_orders(OrderSide::Buyer, buyer.id, Some(OrderStatus::Pending), page)
                .unwrap()
                .total,
            0
        );
    }

    #[test]
    fn cancelled_orders_stay_cancelled() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let product = fixtures::approved_product(&db, &seller, "Kayısı", Category::Meyve);
        let order = db.place_order(&order_for(&buyer, product.id, 1)).unwrap();
        db.cancel_order(order.id, buyer.id).unwrap();

        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let err = db.update_order_status(order.id, buyer.id, status, None).unwrap_err();
            assert_eq!(downcast(err), OrderError::AlreadyCancelled);
        }
        let err = db.cancel_order(order.id, buyer.id).unwrap_err();
        assert_eq!(downcast(err), OrderError::NotPending);

        let product = db.get_product(product.id).unwrap().unwrap();
        assert_eq!(product.stock, 10);
        assert_eq!(db.get_order(order.id).unwrap().unwrap().status, OrderStatus::Cancelled);
    }
}
