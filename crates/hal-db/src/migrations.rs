use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Ids are UUID blobs, timestamps are UTC text, nested documents are JSON text.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  BLOB PRIMARY KEY,
            name                TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            phone               TEXT NOT NULL,
            user_type           TEXT NOT NULL,
            user_roles          TEXT NOT NULL DEFAULT '[]',
            active_role         TEXT NOT NULL,
            profile_image       TEXT,
            is_active           INTEGER NOT NULL DEFAULT 1,
            location            TEXT NOT NULL DEFAULT '{}',
            seller_info         TEXT,
            preferences         TEXT NOT NULL DEFAULT '{}',
            reset_token_hash    TEXT,
            reset_expires_at    TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_type ON users(user_type, is_active);
        CREATE INDEX IF NOT EXISTS idx_users_created ON users(created_at);

        CREATE TABLE IF NOT EXISTS products (
            id                  BLOB PRIMARY KEY,
            title               TEXT NOT NULL,
            description         TEXT NOT NULL,
            price               REAL NOT NULL,
            currency            TEXT NOT NULL,
            category            TEXT NOT NULL,
            images              TEXT NOT NULL DEFAULT '[]',
            seller_id           BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            city                TEXT NOT NULL,
            district            TEXT,
            address             TEXT,
            is_available        INTEGER NOT NULL DEFAULT 1,
            stock               INTEGER NOT NULL DEFAULT 1 CHECK (stock >= 0),
            unit                TEXT NOT NULL,
            category_data       TEXT NOT NULL DEFAULT '{}',
            tags                TEXT NOT NULL DEFAULT '[]',
            search_text         TEXT NOT NULL,
            city_key            TEXT NOT NULL,
            views               INTEGER NOT NULL DEFAULT 0,
            rating_average      REAL NOT NULL DEFAULT 0,
            rating_count        INTEGER NOT NULL DEFAULT 0,
            is_featured         INTEGER NOT NULL DEFAULT 0,
            status              TEXT NOT NULL DEFAULT 'pending',
            approved_at         TEXT,
            approved_by         BLOB,
            rejection_reason    TEXT,
            rejected_at         TEXT,
            rejected_by         BLOB,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_public
            ON products(status, is_available, category, created_at);
        CREATE INDEX IF NOT EXISTS idx_products_seller ON products(seller_id);

        CREATE TABLE IF NOT EXISTS product_favorites (
            product_id  BLOB NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            user_id     BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (product_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_favorites_user ON product_favorites(user_id);

        CREATE TABLE IF NOT EXISTS product_requests (
            id          BLOB PRIMARY KEY,
            user_id     BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            category    TEXT NOT NULL,
            keywords    TEXT NOT NULL DEFAULT '[]',
            description TEXT,
            city        TEXT,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_requests_category
            ON product_requests(category, is_active, created_at);
        CREATE INDEX IF NOT EXISTS idx_requests_user ON product_requests(user_id, is_active);

        CREATE TABLE IF NOT EXISTS notifications (
            id          BLOB PRIMARY KEY,
            user_id     BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind        TEXT NOT NULL,
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            product_id  BLOB REFERENCES products(id) ON DELETE SET NULL,
            data        TEXT NOT NULL DEFAULT '{}',
            is_read     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_notifications_unread
            ON notifications(user_id, is_read);

        CREATE TABLE IF NOT EXISTS orders (
            id                  BLOB PRIMARY KEY,
            buyer_id            BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            seller_id           BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            product_id          BLOB NOT NULL,
            quantity            INTEGER NOT NULL CHECK (quantity >= 1),
            unit_price          REAL NOT NULL,
            total_price         REAL NOT NULL,
            status              TEXT NOT NULL DEFAULT 'pending',
            delivery_address    TEXT NOT NULL,
            notes               TEXT,
            payment_method      TEXT NOT NULL DEFAULT 'cash',
            payment_status      TEXT NOT NULL DEFAULT 'pending',
            delivered_at        TEXT,
            cancelled_at        TEXT,
            cancellation_reason TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_orders_seller ON orders(seller_id, created_at);

        CREATE TABLE IF NOT EXISTS conversations (
            id          BLOB PRIMARY KEY,
            buyer_id    BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            seller_id   BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            product_id  BLOB REFERENCES products(id) ON DELETE SET NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_buyer ON conversations(buyer_id, updated_at);
        CREATE INDEX IF NOT EXISTS idx_conversations_seller ON conversations(seller_id, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              BLOB PRIMARY KEY,
            conversation_id BLOB NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id       BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            body            TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            read_at         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS market_reports (
            id          BLOB PRIMARY KEY,
            title       TEXT NOT NULL,
            city        TEXT NOT NULL,
            city_key    TEXT NOT NULL,
            district    TEXT,
            market_name TEXT,
            report_date TEXT NOT NULL,
            description TEXT,
            image       TEXT,
            created_by  BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            is_active   INTEGER NOT NULL DEFAULT 1,
            expires_at  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reports_expiry ON market_reports(expires_at);

        CREATE TABLE IF NOT EXISTS cities (
            id          BLOB PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            code        TEXT NOT NULL UNIQUE,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS districts (
            id          BLOB PRIMARY KEY,
            city_id     BLOB NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            UNIQUE(city_id, name)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
