use anyhow::Result;
use chrono::{DateTime, Utc};
use hal_types::models::{Location, Preferences, Role, SellerInfo, UserType};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::count;
use crate::codec::{enum_col, json_col, json_col_opt, like_pattern, to_json};
use crate::filter::{Filter, Page, Paged};
use crate::models::{NewUser, UserRow};
use crate::Database;

pub(crate) const USER_COLUMNS: &str = "u.id, u.name, u.email, u.password, u.phone, u.user_type, \
     u.user_roles, u.active_role, u.profile_image, u.is_active, u.location, u.seller_info, \
     u.preferences, u.created_at, u.updated_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        phone: row.get(4)?,
        user_type: enum_col(row, 5)?,
        user_roles: json_col(row, 6)?,
        active_role: enum_col(row, 7)?,
        profile_image: row.get(8)?,
        is_active: row.get(9)?,
        location: json_col(row, 10)?,
        seller_info: json_col_opt(row, 11)?,
        preferences: json_col(row, 12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Partial profile edit. `None` leaves the stored value alone.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<Location>,
    pub seller_info: Option<SellerInfo>,
    pub preferences: Option<Preferences>,
}

impl Database {
    // -- Accounts --

    /// Insert a new account. Buyer and seller accounts start with their own
    /// type as their only role.
    pub fn create_user(&self, new: &NewUser<'_>) -> Result<UserRow> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let roles: Vec<Role> = new.user_type.default_role().into_iter().collect();
        let seller_info = (new.user_type == UserType::Seller).then(SellerInfo::default);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, phone, user_type, user_roles,
                                    active_role, is_active, location, seller_info, preferences,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?6, 1, ?8, ?9, ?10, ?11, ?11)",
                params![
                    id,
                    new.name,
                    new.email.to_lowercase(),
                    new.password_hash,
                    new.phone,
                    new.user_type.as_str(),
                    to_json(&roles)?,
                    to_json(&Location::default())?,
                    seller_info.as_ref().map(to_json).transpose()?,
                    to_json(&Preferences::default())?,
                    now,
                ],
            )?;
            query_user_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("User vanished after insert"))
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1");
            Ok(conn
                .query_row(&sql, [email.to_lowercase()], user_from_row)
                .optional()?)
        })
    }

    pub fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    phone = COALESCE(?3, phone),
                    location = COALESCE(?4, location),
                    seller_info = COALESCE(?5, seller_info),
                    preferences = COALESCE(?6, preferences),
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    update.name,
                    update.phone,
                    update.location.as_ref().map(to_json).transpose()?,
                    update.seller_info.as_ref().map(to_json).transpose()?,
                    update.preferences.as_ref().map(to_json).transpose()?,
                    Utc::now(),
                ],
            )?;
            query_user_by_id(conn, id)
        })
    }

    pub fn set_profile_image(&self, id: Uuid, url: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET profile_image = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, url, Utc::now()],
            )?;
            query_user_by_id(conn, id)
        })
    }

    /// Grant `role` if missing and make it the active one.
    pub fn switch_role(&self, id: Uuid, role: Role) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let Some(user) = query_user_by_id(conn, id)? else {
                return Ok(None);
            };
            let mut roles = user.user_roles;
            if !roles.contains(&role) {
                roles.push(role);
            }
            conn.execute(
                "UPDATE users SET user_roles = ?2, active_role = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, to_json(&roles)?, role.as_str(), Utc::now()],
            )?;
            query_user_by_id(conn, id)
        })
    }

    /// Returns false when no such user exists.
    pub fn set_user_active(&self, id: Uuid, is_active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, is_active, Utc::now()],
            )?;
            Ok(n > 0)
        })
    }

    /// Delete the account. Listings, requests and notifications cascade.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Password reset --

    pub fn set_reset_token(&self, id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET reset_token_hash = ?2, reset_expires_at = ?3 WHERE id = ?1",
                params![id, token_hash, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn clear_reset_token(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET reset_token_hash = NULL, reset_expires_at = NULL WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    /// User holding an unexpired reset token with this hash.
    pub fn find_user_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE u.reset_token_hash = ?1 AND u.reset_expires_at > ?2"
            );
            Ok(conn.query_row(&sql, params![token_hash, now], user_from_row).optional()?)
        })
    }

    /// Store a new password hash and burn any outstanding reset token.
    pub fn set_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, reset_token_hash = NULL, reset_expires_at = NULL,
                                  updated_at = ?3
                 WHERE id = ?1",
                params![id, password_hash, Utc::now()],
            )?;
            Ok(())
        })
    }

    // -- Directory --

    /// Active sellers, best rated first.
    pub fn list_sellers(&self, city: Option<&str>, min_rating: Option<f64>, page: Page) -> Result<Paged<UserRow>> {
        let mut filter = Filter::new();
        filter.raw("u.is_active = 1").raw(
            "(u.user_type = 'seller' OR EXISTS (SELECT 1 FROM json_each(u.user_roles) WHERE value = 'seller'))",
        );
        if let Some(city) = city.filter(|c| !c.trim().is_empty()) {
            filter.push(
                "json_extract(u.location, '$.city') LIKE ? ESCAPE '\\'",
                like_pattern(city.trim()),
            );
        }
        if let Some(rating) = min_rating {
            filter.push("COALESCE(json_extract(u.seller_info, '$.rating'), 0) >= ?", rating);
        }

        self.with_conn(|conn| {
            let where_sql = filter.where_sql();
            let total = count(conn, &format!("SELECT COUNT(*) FROM users u{where_sql}"), &filter.params())?;
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u{where_sql}
                 ORDER BY COALESCE(json_extract(u.seller_info, '$.rating'), 0) DESC, u.created_at DESC
                 LIMIT ? OFFSET ?"
            );
            let offset = page.offset();
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(filter.paged_params(&page, &offset).as_slice(), user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Paged { items, total })
        })
    }

    /// An active seller account by id.
    pub fn get_seller(&self, id: Uuid) -> Result<Option<UserRow>> {
        Ok(self
            .get_user_by_id(id)?
            .filter(|u| u.is_active && (u.user_type == UserType::Seller || u.user_roles.contains(&Role::Seller))))
    }

    pub fn list_users(&self, user_type: Option<UserType>, is_active: Option<bool>, page: Page) -> Result<Paged<UserRow>> {
        let mut filter = Filter::new();
        if let Some(t) = user_type {
            filter.push("u.user_type = ?", t.as_str());
        }
        if let Some(active) = is_active {
            filter.push("u.is_active = ?", active);
        }

        self.with_conn(|conn| {
            let where_sql = filter.where_sql();
            let total = count(conn, &format!("SELECT COUNT(*) FROM users u{where_sql}"), &filter.params())?;
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u{where_sql} ORDER BY u.created_at DESC LIMIT ? OFFSET ?"
            );
            let offset = page.offset();
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(filter.paged_params(&page, &offset).as_slice(), user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Paged { items, total })
        })
    }

    /// Name, email or phone contains `q`. At most `limit` rows.
    pub fn search_users(&self, q: &str, limit: u32) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE u.name LIKE ?1 ESCAPE '\\' OR u.email LIKE ?1 ESCAPE '\\' OR u.phone LIKE ?1 ESCAPE '\\'
                 ORDER BY u.created_at DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![like_pattern(q), limit], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn recent_users(&self, limit: u32) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.created_at DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
    Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
}
