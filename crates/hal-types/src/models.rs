use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Served in place of a missing or client-local product image.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://via.placeholder.com/400x300?text=No+Image";
pub const UNAVAILABLE_IMAGE_URL: &str =
    "https://via.placeholder.com/400x300?text=Image+Not+Available";

// -- Roles --

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserType {
    Buyer,
    Seller,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// The marketplace role this account type starts with, if any.
    pub fn default_role(&self) -> Option<Role> {
        match self {
            Self::Buyer => Some(Role::Buyer),
            Self::Seller => Some(Role::Seller),
            Self::Admin => None,
        }
    }
}

/// A marketplace role a user can hold. Every user may be buyer and seller at once.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl From<Role> for UserType {
    fn from(role: Role) -> Self {
        match role {
            Role::Buyer => UserType::Buyer,
            Role::Seller => UserType::Seller,
        }
    }
}

// -- Listings --

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Meyve,
    Sebze,
    Nakliye,
    Kasa,
    ZiraiIlac,
    Ambalaj,
    IndirBindir,
    Emlak,
    Arac,
    Gida,
    Et,
    Sut,
    Bakliyat,
    Baharat,
    Diger,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Meyve => "Meyve",
            Self::Sebze => "Sebze",
            Self::Nakliye => "Nakliye",
            Self::Kasa => "Kasa",
            Self::ZiraiIlac => "Zirai İlaç",
            Self::Ambalaj => "Ambalaj",
            Self::IndirBindir => "İndir-Bindir",
            Self::Emlak => "Emlak",
            Self::Arac => "Araç",
            Self::Gida => "Gıda",
            Self::Et => "Et",
            Self::Sut => "Süt",
            Self::Bakliyat => "Bakliyat",
            Self::Baharat => "Baharat",
            Self::Diger => "Diğer",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Meyve => "nutrition",
            Self::Sebze | Self::Bakliyat => "leaf",
            Self::Nakliye => "car",
            Self::Kasa => "cube",
            Self::ZiraiIlac => "medical",
            Self::Ambalaj => "archive",
            Self::IndirBindir => "people",
            Self::Emlak => "home",
            Self::Arac => "car-sport",
            Self::Gida | Self::Et | Self::Sut => "restaurant",
            Self::Baharat => "flame",
            Self::Diger => "ellipsis-horizontal",
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
pub enum Currency {
    #[default]
    #[serde(rename = "TL")]
    #[strum(serialize = "TL")]
    Tl,
    #[serde(rename = "USD")]
    #[strum(serialize = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    #[strum(serialize = "EUR")]
    Eur,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
pub enum Unit {
    #[default]
    #[serde(rename = "kg")]
    #[strum(serialize = "kg")]
    Kg,
    #[serde(rename = "adet")]
    #[strum(serialize = "adet")]
    Adet,
    #[serde(rename = "paket")]
    #[strum(serialize = "paket")]
    Paket,
    #[serde(rename = "litre")]
    #[strum(serialize = "litre")]
    Litre,
    #[serde(rename = "gram")]
    #[strum(serialize = "gram")]
    Gram,
    #[serde(rename = "ton")]
    #[strum(serialize = "ton")]
    Ton,
    #[serde(rename = "kasa")]
    #[strum(serialize = "kasa")]
    Kasa,
    #[serde(rename = "km")]
    #[strum(serialize = "km")]
    Km,
    #[serde(rename = "gün")]
    #[strum(serialize = "gün")]
    Gun,
    #[serde(rename = "kişi")]
    #[strum(serialize = "kişi")]
    Kisi,
    #[serde(rename = "saat")]
    #[strum(serialize = "saat")]
    Saat,
    #[serde(rename = "rol")]
    #[strum(serialize = "rol")]
    Rol,
    #[serde(rename = "kutu")]
    #[strum(serialize = "kutu")]
    Kutu,
    #[serde(rename = "metre")]
    #[strum(serialize = "metre")]
    Metre,
    #[serde(rename = "m²")]
    #[strum(serialize = "m²")]
    MetreKare,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

/// Moderation state of a listing. Only approved listings are public.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// -- Notifications --

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    /// Seller: listing approved
    ProductApproved,
    /// Seller: listing rejected
    ProductRejected,
    /// Seller: listing submitted for review
    ProductPending,
    /// Buyer: a listing matching one of their requests went live
    ProductAvailable,
    /// Seller: listing featured by an admin
    ProductFeatured,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// -- Orders --

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Transfer,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

// -- Value objects (stored as JSON columns) --

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A user's location. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub city: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// Where a listing is offered. City is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLocation {
    #[serde(default)]
    pub city: String,
    pub district: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub district: String,
    pub postal_code: Option<String>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerInfo {
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub company_name: Option<String>,
    pub tax_number: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_ratings: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub push: bool,
    pub sms: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
            sms: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub notifications: NotificationPreferences,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "tr".to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: NotificationPreferences::default(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub url: String,
    pub public_id: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
}

impl ProductImage {
    pub fn placeholder() -> Self {
        Self {
            url: PLACEHOLDER_IMAGE_URL.to_string(),
            public_id: None,
            is_primary: true,
            kind: MediaKind::Image,
        }
    }

    /// Client-local `file://` URLs can't be fetched by anyone else.
    pub fn sanitized(mut self) -> Self {
        if self.url.starts_with("file://") {
            self.url = UNAVAILABLE_IMAGE_URL.to_string();
        }
        self
    }
}

/// URL of the image flagged primary, else the first image.
pub fn primary_image_url(images: &[ProductImage]) -> Option<&str> {
    images
        .iter()
        .find(|img| img.is_primary)
        .or_else(|| images.first())
        .map(|img| img.url.as_str())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportImage {
    pub url: String,
    pub public_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn category_ids_match_wire_names() {
        assert_eq!(Category::ZiraiIlac.as_str(), "zirai_ilac");
        assert_eq!(Category::from_str("indir_bindir").unwrap(), Category::IndirBindir);
        assert!(Category::from_str("tahil").is_err());

        for category in Category::iter() {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json, category.as_str());
        }
    }

    #[test]
    fn units_keep_turkish_spelling() {
        assert_eq!(Unit::from_str("gün").unwrap(), Unit::Gun);
        assert_eq!(serde_json::to_value(Unit::MetreKare).unwrap(), "m²");
    }

    #[test]
    fn primary_image_falls_back_to_first() {
        let mut images = vec![
            ProductImage {
                url: "a.jpg".into(),
                public_id: None,
                is_primary: false,
                kind: MediaKind::Image,
            },
            ProductImage {
                url: "b.jpg".into(),
                public_id: None,
                is_primary: false,
                kind: MediaKind::Image,
            },
        ];
        assert_eq!(primary_image_url(&images), Some("a.jpg"));

        images[1].is_primary = true;
        assert_eq!(primary_image_url(&images), Some("b.jpg"));

        assert_eq!(primary_image_url(&[]), None);
    }

    #[test]
    fn file_urls_are_replaced() {
        let img = ProductImage {
            url: "file:///var/mobile/photo.jpg".into(),
            public_id: None,
            is_primary: true,
            kind: MediaKind::Image,
        };
        assert_eq!(img.sanitized().url, UNAVAILABLE_IMAGE_URL);
    }

    #[test]
    fn admin_has_no_default_role() {
        assert_eq!(UserType::Seller.default_role(), Some(Role::Seller));
        assert_eq!(UserType::Admin.default_role(), None);
    }
}
