use anyhow::Result;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::codec::fold_case;
use crate::models::{CityRow, DistrictRow};
use crate::Database;

fn city_from_row(row: &Row<'_>) -> rusqlite::Result<CityRow> {
    Ok(CityRow {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
    })
}

fn district_from_row(row: &Row<'_>) -> rusqlite::Result<DistrictRow> {
    Ok(DistrictRow {
        id: row.get(0)?,
        city_id: row.get(1)?,
        name: row.get(2)?,
        is_active: row.get(3)?,
    })
}

impl Database {
    /// Active cities sorted by name.
    pub fn list_cities(&self) -> Result<Vec<CityRow>> {
        let mut cities = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, code FROM cities WHERE is_active = 1")?;
            let rows = stmt
                .query_map([], city_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        // SQLite orders by byte value, which puts İ after Z
        cities.sort_by_cached_key(|c| fold_case(&c.name).replace('ı', "i"));
        Ok(cities)
    }

    /// First active city whose name contains `name`, case-insensitively.
    pub fn find_city(&self, name: &str) -> Result<Option<CityRow>> {
        let needle = fold_case(name.trim());
        Ok(self
            .list_cities()?
            .into_iter()
            .find(|c| fold_case(&c.name).contains(&needle)))
    }

    pub fn get_city(&self, id: Uuid) -> Result<Option<CityRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, code FROM cities WHERE id = ?1 AND is_active = 1",
                    [id],
                    city_from_row,
                )
                .optional()?)
        })
    }

    /// Active districts of a city, by name.
    pub fn list_districts(&self, city_id: Uuid) -> Result<Vec<DistrictRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, city_id, name, is_active FROM districts
                 WHERE city_id = ?1 AND is_active = 1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([city_id], district_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cities_sort_with_turkish_letters() {
        let db = Database::open_in_memory().unwrap();
        db.seed_locations().unwrap();
        let names: Vec<String> = db.list_cities().unwrap().into_iter().map(|c| c.name).collect();
        let istanbul = names.iter().position(|n| n == "İstanbul").unwrap();
        let konya = names.iter().position(|n| n == "Konya").unwrap();
        assert!(istanbul < konya);
    }

    #[test]
    fn find_city_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.seed_locations().unwrap();

        let izmir = db.find_city("izmir").unwrap().unwrap();
        assert_eq!(izmir.code, "35");
        let districts = db.list_districts(izmir.id).unwrap();
        assert!(districts.iter().any(|d| d.name == "Bornova"));

        assert!(db.find_city("Paris").unwrap().is_none());
    }
}
