use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use hal_types::models::ReportImage;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;
use uuid::Uuid;

use super::count;
use crate::codec::{fold_case, json_col_opt, like_pattern, to_json};
use crate::filter::{Filter, Page, Paged};
use crate::models::{MarketReportRow, NewMarketReport};
use crate::Database;

/// Reports vanish this long after they are posted.
pub const REPORT_TTL_HOURS: i64 = 24;

const REPORT_SELECT: &str = "SELECT r.id, r.title, r.city, r.district, r.market_name, \
     r.report_date, r.description, r.image, r.created_by, u.name, r.is_active, r.expires_at, \
     r.created_at, r.updated_at \
     FROM market_reports r JOIN users u ON u.id = r.created_by";

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<MarketReportRow> {
    Ok(MarketReportRow {
        id: row.get(0)?,
        title: row.get(1)?,
        city: row.get(2)?,
        district: row.get(3)?,
        market_name: row.get(4)?,
        report_date: row.get(5)?,
        description: row.get(6)?,
        image: json_col_opt(row, 7)?,
        created_by: row.get(8)?,
        author_name: row.get(9)?,
        is_active: row.get(10)?,
        expires_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// Case-insensitive substring of the city.
    pub city: Option<String>,
    pub is_active: Option<bool>,
}

/// Admin edit of a report. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ReportChanges {
    pub title: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub market_name: Option<String>,
    pub report_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub image: Option<ReportImage>,
    pub is_active: Option<bool>,
}

impl Database {
    pub fn create_market_report(&self, new: &NewMarketReport) -> Result<MarketReportRow> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO market_reports (id, title, city, city_key, district, market_name,
                                             report_date, description, image, created_by, is_active,
                                             expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?12, ?12)",
                params![
                    id,
                    new.title,
                    new.city,
                    fold_case(&new.city),
                    new.district,
                    new.market_name,
                    new.report_date,
                    new.description,
                    new.image.as_ref().map(to_json).transpose()?,
                    new.created_by,
                    now + Duration::hours(REPORT_TTL_HOURS),
                    now,
                ],
            )?;
            query_report(conn, id)?.ok_or_else(|| anyhow::anyhow!("Report vanished after insert"))
        })
    }

    /// Unexpired reports, newest first.
    pub fn list_market_reports(&self, filter: &ReportFilter, now: DateTime<Utc>, page: Page) -> Result<Paged<MarketReportRow>> {
        let mut sql_filter = Filter::new();
        sql_filter.push("r.expires_at > ?", now);
        if let Some(city) = filter.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            sql_filter.push("r.city_key LIKE ? ESCAPE '\\'", like_pattern(&fold_case(city)));
        }
        if let Some(active) = filter.is_active {
            sql_filter.push("r.is_active = ?", active);
        }

        self.with_conn(|conn| {
            let where_sql = sql_filter.where_sql();
            let total = count(
                conn,
                &format!("SELECT COUNT(*) FROM market_reports r{where_sql}"),
                &sql_filter.params(),
            )?;
            let sql = format!("{REPORT_SELECT}{where_sql} ORDER BY r.created_at DESC LIMIT ? OFFSET ?");
            let offset = page.offset();
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(sql_filter.paged_params(&page, &offset).as_slice(), report_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Paged { items, total })
        })
    }

    /// A report that hasn't expired yet.
    pub fn get_market_report(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<MarketReportRow>> {
        self.with_conn(|conn| Ok(query_report(conn, id)?.filter(|r| r.expires_at > now)))
    }

    /// Apply admin edits. Returns the updated report and the image it
    /// replaced, if any.
    pub fn update_market_report(
        &self,
        id: Uuid,
        changes: &ReportChanges,
    ) -> Result<Option<(MarketReportRow, Option<ReportImage>)>> {
        self.with_conn(|conn| {
            let Some(current) = query_report(conn, id)? else {
                return Ok(None);
            };
            conn.execute(
                "UPDATE market_reports SET
                    title = COALESCE(?2, title),
                    city = COALESCE(?3, city),
                    city_key = COALESCE(?4, city_key),
                    district = COALESCE(?5, district),
                    market_name = COALESCE(?6, market_name),
                    report_date = COALESCE(?7, report_date),
                    description = COALESCE(?8, description),
                    image = COALESCE(?9, image),
                    is_active = COALESCE(?10, is_active),
                    updated_at = ?11
                 WHERE id = ?1",
                params![
                    id,
                    changes.title,
                    changes.city,
                    changes.city.as_deref().map(fold_case),
                    changes.district,
                    changes.market_name,
                    changes.report_date,
                    changes.description,
                    changes.image.as_ref().map(to_json).transpose()?,
                    changes.is_active,
                    Utc::now(),
                ],
            )?;
            let replaced = match changes.image {
                Some(_) => current.image,
                None => None,
            };
            Ok(query_report(conn, id)?.map(|row| (row, replaced)))
        })
    }

    /// Delete a report and return it so its image can be removed.
    pub fn delete_market_report(&self, id: Uuid) -> Result<Option<MarketReportRow>> {
        self.with_conn(|conn| {
            let Some(report) = query_report(conn, id)? else {
                return Ok(None);
            };
            conn.execute("DELETE FROM market_reports WHERE id = ?1", [id])?;
            Ok(Some(report))
        })
    }

    /// Sorted distinct cities of live, active reports.
    pub fn market_report_cities(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT city FROM market_reports
                 WHERE is_active = 1 AND expires_at > ?1 ORDER BY city",
            )?;
            let rows = stmt
                .query_map([now], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(rows)
        })
    }

    /// Delete every report that expired at or before `now`. Returns the
    /// deleted rows so their images can be removed.
    pub fn sweep_expired_reports(&self, now: DateTime<Utc>) -> Result<Vec<MarketReportRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let expired = {
                let sql = format!("{REPORT_SELECT} WHERE r.expires_at <= ?1");
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map([now], report_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            tx.execute("DELETE FROM market_reports WHERE expires_at <= ?1", [now])?;
            tx.commit()?;

            if !expired.is_empty() {
                info!("Swept {} expired market reports", expired.len());
            }
            Ok(expired)
        })
    }
}

fn query_report(conn: &Connection, id: Uuid) -> Result<Option<MarketReportRow>> {
    let sql = format!("{REPORT_SELECT} WHERE r.id = ?1");
    Ok(conn.query_row(&sql, [id], report_from_row).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use hal_types::models::UserType;

    fn report(admin_id: Uuid, city: &str) -> NewMarketReport {
        NewMarketReport {
            title: "Günlük hal fiyatları".into(),
            city: city.into(),
            district: Some("Muratpaşa".into()),
            market_name: None,
            report_date: Utc::now(),
            description: None,
            image: Some(ReportImage {
                url: "/uploads/market-reports/a.jpg".into(),
                public_id: Some("a.jpg".into()),
            }),
            created_by: admin_id,
        }
    }

    #[test]
    fn reports_expire_after_a_day() {
        let db = Database::open_in_memory().unwrap();
        let admin = fixtures::user(&db, "admin@example.com", UserType::Admin);
        let row = db.create_market_report(&report(admin.id, "Antalya")).unwrap();
        assert_eq!(row.author_name, "Test Kullanıcı");
        assert_eq!(row.expires_at - row.created_at, Duration::hours(REPORT_TTL_HOURS));

        let page = Page::new(None, None, 50);
        let now = Utc::now();
        assert_eq!(db.list_market_reports(&ReportFilter::default(), now, page).unwrap().total, 1);

        let later = now + Duration::hours(25);
        assert_eq!(db.list_market_reports(&ReportFilter::default(), later, page).unwrap().total, 0);
        assert!(db.get_market_report(row.id, later).unwrap().is_none());

        let swept = db.sweep_expired_reports(later).unwrap();
        assert_eq!(swept.len(), 1);
        assert!(swept[0].image.is_some());
        assert!(db.get_market_report(row.id, now).unwrap().is_none());
    }

    #[test]
    fn city_filter_and_city_list() {
        let db = Database::open_in_memory().unwrap();
        let admin = fixtures::user(&db, "admin@example.com", UserType::Admin);
        db.create_market_report(&report(admin.id, "İzmir")).unwrap();
        let ankara = db.create_market_report(&report(admin.id, "Ankara")).unwrap();

        let now = Utc::now();
        let page = Page::new(None, None, 50);
        let filter = ReportFilter {
            city: Some("izmir".into()),
            ..Default::default()
        };
        assert_eq!(db.list_market_reports(&filter, now, page).unwrap().total, 1);

        db.update_market_report(
            ankara.id,
            &ReportChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(db.market_report_cities(now).unwrap(), vec!["İzmir".to_string()]);
    }

    #[test]
    fn replacing_image_returns_old_one() {
        let db = Database::open_in_memory().unwrap();
        let admin = fixtures::user(&db, "admin@example.com", UserType::Admin);
        let row = db.create_market_report(&report(admin.id, "Bursa")).unwrap();

        let (updated, replaced) = db
            .update_market_report(
                row.id,
                &ReportChanges {
                    title: Some("Sabah fiyatları".into()),
                    image: Some(ReportImage {
                        url: "/uploads/market-reports/b.jpg".into(),
                        public_id: Some("b.jpg".into()),
                    }),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Sabah fiyatları");
        assert_eq!(replaced.unwrap().public_id.as_deref(), Some("a.jpg"));
        assert_eq!(updated.district.as_deref(), Some("Muratpaşa"));
    }
}
