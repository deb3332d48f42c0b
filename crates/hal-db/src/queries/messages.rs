use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::models::{ConversationRow, ConversationSummaryRow, MessageRow};
use crate::Database;

const CONVERSATION_SELECT: &str = "SELECT c.id, c.buyer_id, c.seller_id, c.product_id, p.title, \
     c.created_at, c.updated_at \
     FROM conversations c LEFT JOIN products p ON p.id = c.product_id";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, created_at, read_at";

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        buyer_id: row.get(1)?,
        seller_id: row.get(2)?,
        product_id: row.get(3)?,
        product_title: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
        read_at: row.get(5)?,
    })
}

impl Database {
    // -- Conversations --

    /// The conversation between this buyer and seller about `product_id`,
    /// created on first contact.
    pub fn get_or_create_conversation(
        &self,
        buyer_id: Uuid,
        seller_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<Uuid> = tx
                .query_row(
                    "SELECT id FROM conversations
                     WHERE buyer_id = ?1 AND seller_id = ?2 AND product_id IS ?3",
                    params![buyer_id, seller_id, product_id],
                    |row| row.get(0),
                )
                .optional()?;

            let (id, created) = match existing {
                Some(id) => (id, false),
                None => {
                    let id = Uuid::new_v4();
                    tx.execute(
                        "INSERT INTO conversations (id, buyer_id, seller_id, product_id, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        params![id, buyer_id, seller_id, product_id, Utc::now()],
                    )?;
                    (id, true)
                }
            };

            let row = query_conversation(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Conversation vanished after insert"))?;
            tx.commit()?;
            Ok((row, created))
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// The user's conversations, most recently active first.
    pub fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{CONVERSATION_SELECT} WHERE c.buyer_id = ?1 OR c.seller_id = ?1
                 ORDER BY c.updated_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let conversations = stmt
                .query_map([user_id], conversation_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            conversations
                .into_iter()
                .map(|conversation| summarize(conn, conversation, user_id))
                .collect()
        })
    }

    /// One conversation as seen by `user_id`. `None` unless they take part in it.
    pub fn conversation_summary(&self, id: Uuid, user_id: Uuid) -> Result<Option<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            query_conversation(conn, id)?
                .filter(|c| c.is_participant(user_id))
                .map(|conversation| summarize(conn, conversation, user_id))
                .transpose()
        })
    }

    // -- Messages --

    /// Store a message and bump the conversation.
    pub fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, body: &str) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = Uuid::new_v4();
            let now = Utc::now();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, conversation_id, sender_id, body, now],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                params![conversation_id, now],
            )?;
            let row = tx.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                message_from_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Up to `limit` messages older than `before`, newest first.
    pub fn get_messages(
        &self,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at < ?2)
                 ORDER BY created_at DESC LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![conversation_id, before, limit], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Mark everything the other participant sent as read. Returns the
    /// number of messages updated and the read timestamp.
    pub fn mark_conversation_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<(usize, DateTime<Utc>)> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET read_at = ?3
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
                params![conversation_id, reader_id, now],
            )?;
            Ok((n, now))
        })
    }
}

/// Counterpart, last message and unread count for one conversation.
fn summarize(conn: &Connection, conversation: ConversationRow, user_id: Uuid) -> Result<ConversationSummaryRow> {
    let counterpart_id = conversation.other_participant(user_id);
    let (counterpart_name, counterpart_image): (String, Option<String>) = conn.query_row(
        "SELECT name, profile_image FROM users WHERE id = ?1",
        [counterpart_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let last_message = conn
        .query_row(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC LIMIT 1"
            ),
            [conversation.id],
            message_from_row,
        )
        .optional()?;
    let unread_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
        params![conversation.id, user_id],
        |row| row.get(0),
    )?;

    Ok(ConversationSummaryRow {
        conversation,
        counterpart_id,
        counterpart_name,
        counterpart_image,
        last_message,
        unread_count,
    })
}

fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<ConversationRow>> {
    let sql = format!("{CONVERSATION_SELECT} WHERE c.id = ?1");
    Ok(conn.query_row(&sql, [id], conversation_from_row).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use hal_types::models::{Category, UserType};

    #[test]
    fn conversation_is_unique_per_pair_and_product() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let product = fixtures::approved_product(&db, &seller, "Biber", Category::Sebze);

        let (a, created) = db.get_or_create_conversation(buyer.id, seller.id, Some(product.id)).unwrap();
        assert!(created);
        assert_eq!(a.product_title.as_deref(), Some("Biber"));
        let (b, created) = db.get_or_create_conversation(buyer.id, seller.id, Some(product.id)).unwrap();
        assert!(!created);
        assert_eq!(a.id, b.id);

        // no-product conversations dedupe too
        let (c, _) = db.get_or_create_conversation(buyer.id, seller.id, None).unwrap();
        let (d, created) = db.get_or_create_conversation(buyer.id, seller.id, None).unwrap();
        assert!(!created);
        assert_eq!(c.id, d.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn unread_counts_and_read_receipts() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let (conv, _) = db.get_or_create_conversation(buyer.id, seller.id, None).unwrap();

        db.insert_message(conv.id, buyer.id, "Merhaba").unwrap();
        db.insert_message(conv.id, buyer.id, "Fiyat nedir?").unwrap();
        db.insert_message(conv.id, seller.id, "Kilosu 20 TL").unwrap();

        let seller_view = db.list_conversations(seller.id).unwrap();
        assert_eq!(seller_view.len(), 1);
        assert_eq!(seller_view[0].unread_count, 2);
        assert_eq!(seller_view[0].counterpart_id, buyer.id);
        assert_eq!(seller_view[0].last_message.as_ref().unwrap().body, "Kilosu 20 TL");

        let (n, _) = db.mark_conversation_read(conv.id, seller.id).unwrap();
        assert_eq!(n, 2);
        assert_eq!(db.list_conversations(seller.id).unwrap()[0].unread_count, 0);
        assert_eq!(db.list_conversations(buyer.id).unwrap()[0].unread_count, 1);
    }

    #[test]
    fn messages_page_backwards() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let (conv, _) = db.get_or_create_conversation(buyer.id, seller.id, None).unwrap();

        for body in ["1", "2", "3"] {
            db.insert_message(conv.id, buyer.id, body).unwrap();
        }
        let newest = db.get_messages(conv.id, None, 2).unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].body, "3");

        let older = db.get_messages(conv.id, Some(newest[1].created_at), 10).unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].body, "1");
    }

    #[test]
    fn summary_for_participants_only() {
        let db = Database::open_in_memory().unwrap();
        let seller = fixtures::user(&db, "s@example.com", UserType::Seller);
        let buyer = fixtures::user(&db, "b@example.com", UserType::Buyer);
        let stranger = fixtures::user(&db, "x@example.com", UserType::Buyer);
        let (conv, _) = db.get_or_create_conversation(buyer.id, seller.id, None).unwrap();
        db.insert_message(conv.id, seller.id, "Buyrun").unwrap();

        let summary = db.conversation_summary(conv.id, buyer.id).unwrap().unwrap();
        assert_eq!(summary.conversation.id, conv.id);
        assert_eq!(summary.counterpart_id, seller.id);
        assert_eq!(summary.unread_count, 1);

        assert!(db.conversation_summary(conv.id, stranger.id).unwrap().is_none());
        assert!(db.conversation_summary(Uuid::new_v4(), buyer.id).unwrap().is_none());
    }
}
