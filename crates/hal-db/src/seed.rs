use anyhow::Result;
use chrono::Utc;
use rusqlite::params;
use tracing::info;
use uuid::Uuid;

use crate::Database;

/// Cities (with plate codes) and districts loaded on first start.
const CITIES: &[(&str, &str, &[&str])] = &[
    (
        "İstanbul",
        "34",
        &[
            "Adalar", "Arnavutköy", "Ataşehir", "Avcılar", "Bağcılar", "Bahçelievler",
            "Bakırköy", "Başakşehir", "Bayrampaşa", "Beşiktaş", "Beykoz", "Beylikdüzü",
            "Beyoğlu", "Büyükçekmece", "Çatalca", "Çekmeköy", "Esenler", "Esenyurt",
            "Eyüpsultan", "Fatih", "Gaziosmanpaşa", "Güngören", "Kadıköy", "Kağıthane",
            "Kartal", "Küçükçekmece", "Maltepe", "Pendik", "Sancaktepe", "Sarıyer",
            "Silivri", "Sultanbeyli", "Sultangazi", "Şile", "Şişli", "Tuzla", "Ümraniye",
            "Üsküdar", "Zeytinburnu",
        ],
    ),
    (
        "Ankara",
        "06",
        &[
            "Çankaya", "Keçiören", "Mamak", "Yenimahalle", "Altındağ", "Etimesgut", "Sincan",
            "Pursaklar", "Gölbaşı", "Kazan", "Akyurt", "Bala", "Beypazarı", "Çamlıdere",
            "Çubuk", "Elmadağ", "Evren", "Haymana", "Kalecik", "Kızılcahamam", "Nallıhan",
            "Polatlı", "Şereflikoçhisar",
        ],
    ),
    (
        "İzmir",
        "35",
        &[
            "Konak", "Balçova", "Bayraklı", "Bornova", "Buca", "Çiğli", "Gaziemir",
            "Güzelbahçe", "Karabağlar", "Karşıyaka", "Narlıdere", "Bergama", "Beydağ",
            "Aliağa", "Çeşme", "Dikili", "Foça", "Karaburun", "Kemalpaşa", "Kınık", "Kiraz",
            "Menderes", "Menemen", "Ödemiş", "Seferihisar", "Selçuk", "Tire", "Torbalı",
            "Urla",
        ],
    ),
    (
        "Bursa",
        "16",
        &[
            "Osmangazi", "Nilüfer", "Yıldırım", "Büyükorhan", "Gemlik", "Gürsu", "Harmancık",
            "İnegöl", "İznik", "Karacabey", "Keles", "Kestel", "Mudanya", "Mustafakemalpaşa",
            "Orhaneli", "Orhangazi", "Yenişehir",
        ],
    ),
    (
        "Antalya",
        "07",
        &[
            "Muratpaşa", "Kepez", "Konyaaltı", "Aksu", "Döşemealtı", "Akseki", "Alanya",
            "Demre", "Elmalı", "Finike", "Gazipaşa", "Gündoğmuş", "İbradı", "Kaş", "Kemer",
            "Korkuteli", "Kumluca", "Manavgat", "Serik",
        ],
    ),
    (
        "Adana",
        "01",
        &[
            "Seyhan", "Yüreğir", "Çukurova", "Sarıçam", "Ceyhan", "İmamoğlu", "Karaisalı",
            "Karataş", "Kozan", "Pozantı", "Saimbeyli", "Tufanbeyli", "Yumurtalık", "Feke",
            "Aladağ",
        ],
    ),
    (
        "Konya",
        "42",
        &[
            "Meram", "Karatay", "Selçuklu", "Ahırlı", "Akören", "Akşehir", "Altınekin",
            "Beyşehir", "Bozkır", "Cihanbeyli", "Çeltik", "Çumra", "Derbent", "Derebucak",
            "Doğanhisar", "Emirgazi", "Ereğli", "Güneysinir", "Hadim", "Halkapınar", "Hüyük",
            "Ilgın", "Kadınhanı", "Karapınar", "Kulu", "Sarayönü", "Seydişehir", "Taşkent",
            "Tuzlukçu", "Yalıhüyük", "Yunak",
        ],
    ),
    (
        "Gaziantep",
        "27",
        &[
            "Şahinbey", "Şehitkamil", "Oğuzeli", "Nizip", "İslahiye", "Nurdağı", "Karkamış",
            "Yavuzeli", "Araban",
        ],
    ),
    (
        "Mersin",
        "33",
        &[
            "Akdeniz", "Mezitli", "Toroslar", "Yenişehir", "Anamur", "Aydıncık", "Bozyazı",
            "Çamlıyayla", "Erdemli", "Gülnar", "Mut", "Silifke", "Tarsus",
        ],
    ),
    (
        "Diyarbakır",
        "21",
        &[
            "Bağlar", "Kayapınar", "Sur", "Yenişehir", "Bismil", "Çermik", "Çınar", "Çüngüş",
            "Dicle", "Eğil", "Ergani", "Hani", "Hazro", "Kocaköy", "Kulp", "Lice", "Silvan",
        ],
    ),
];

impl Database {
    /// Load the city list into an empty database. Returns how many cities were inserted.
    pub fn seed_locations(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let existing: i64 = conn.query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))?;
            if existing > 0 {
                return Ok(0);
            }

            let now = Utc::now();
            let tx = conn.transaction()?;
            for (name, code, districts) in CITIES {
                let city_id = Uuid::new_v4();
                tx.execute(
                    "INSERT INTO cities (id, name, code, is_active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4, ?4)",
                    params![city_id, name, code, now],
                )?;
                for district in *districts {
                    tx.execute(
                        "INSERT INTO districts (id, city_id, name, is_active, created_at)
                         VALUES (?1, ?2, ?3, 1, ?4)",
                        params![Uuid::new_v4(), city_id, district, now],
                    )?;
                }
            }
            tx.commit()?;

            info!("Seeded {} cities", CITIES.len());
            Ok(CITIES.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_runs_once() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.seed_locations().unwrap(), CITIES.len());
        assert_eq!(db.seed_locations().unwrap(), 0);

        let cities = db.list_cities().unwrap();
        assert_eq!(cities.len(), CITIES.len());
        // sorted by name
        assert_eq!(cities[0].name, "Adana");
    }
}
