//! Database row types. JSON columns are decoded, enum columns parsed.
//! Distinct from hal-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use hal_types::models::{
    Category, Currency, DeliveryAddress, Location, ModerationStatus, NotificationType,
    OrderStatus, PaymentMethod, PaymentStatus, Preferences, ProductImage, ProductLocation, Rating,
    ReportImage, Role, SellerInfo, Unit, UserType,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub user_type: UserType,
    pub user_roles: Vec<Role>,
    pub active_role: UserType,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub location: Location,
    pub seller_info: Option<SellerInfo>,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    /// Admins pass every check. Otherwise the explicit roles decide, then the
    /// active role, then the account type.
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        if self.is_admin() {
            return true;
        }
        if self.user_roles.iter().any(|r| roles.contains(r)) {
            return true;
        }
        roles
            .iter()
            .any(|r| UserType::from(*r) == self.active_role || UserType::from(*r) == self.user_type)
    }
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub phone: &'a str,
    pub user_type: UserType,
}

/// Seller fields joined onto a product row.
#[derive(Debug, Clone)]
pub struct SellerCard {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: Location,
    pub seller_info: Option<SellerInfo>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: Currency,
    pub category: Category,
    pub images: Vec<ProductImage>,
    pub seller_id: Uuid,
    pub location: ProductLocation,
    pub is_available: bool,
    pub stock: i64,
    pub unit: Unit,
    pub category_data: Value,
    pub tags: Vec<String>,
    pub views: i64,
    pub favorites_count: i64,
    pub rating: Rating,
    pub is_featured: bool,
    pub status: ModerationStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seller: Option<SellerCard>,
}

/// Everything a seller supplies for a listing, already validated.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: Currency,
    pub category: Category,
    pub images: Vec<ProductImage>,
    pub location: ProductLocation,
    pub is_available: bool,
    pub stock: i64,
    pub unit: Unit,
    pub category_data: Value,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProductRequestRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: Category,
    pub keywords: Vec<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub product_id: Option<Uuid>,
    pub data: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub product: Option<ProductBriefRow>,
}

#[derive(Debug, Clone)]
pub struct ProductBriefRow {
    pub id: Uuid,
    pub title: String,
    pub images: Vec<ProductImage>,
    pub price: f64,
    pub currency: Currency,
}

pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub product_id: Option<Uuid>,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct PartyRow {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: Uuid,
    pub buyer: PartyRow,
    pub seller: PartyRow,
    pub product_id: Uuid,
    pub product: Option<ProductBriefRow>,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
    pub status: OrderStatus,
    pub delivery_address: DeliveryAddress,
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewOrder {
    pub buyer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub delivery_address: DeliveryAddress,
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The participant who isn't `user_id`.
    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if self.buyer_id == user_id {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}

/// A conversation as listed for one participant.
#[derive(Debug, Clone)]
pub struct ConversationSummaryRow {
    pub conversation: ConversationRow,
    pub counterpart_id: Uuid,
    pub counterpart_name: String,
    pub counterpart_image: Option<String>,
    pub last_message: Option<MessageRow>,
    pub unread_count: i64,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MarketReportRow {
    pub id: Uuid,
    pub title: String,
    pub city: String,
    pub district: Option<String>,
    pub market_name: Option<String>,
    pub report_date: DateTime<Utc>,
    pub description: Option<String>,
    pub image: Option<ReportImage>,
    pub created_by: Uuid,
    pub author_name: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewMarketReport {
    pub title: String,
    pub city: String,
    pub district: Option<String>,
    pub market_name: Option<String>,
    pub report_date: DateTime<Utc>,
    pub description: Option<String>,
    pub image: Option<ReportImage>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct CityRow {
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct DistrictRow {
    pub id: Uuid,
    pub city_id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_type: UserType, roles: Vec<Role>, active: UserType) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            name: "Ayşe".into(),
            email: "ayse@example.com".into(),
            password: String::new(),
            phone: "05321234567".into(),
            user_type,
            user_roles: roles,
            active_role: active,
            profile_image: None,
            is_active: true,
            location: Location::default(),
            seller_info: None,
            preferences: Preferences::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_passes_every_role_check() {
        let admin = user(UserType::Admin, vec![], UserType::Admin);
        assert!(admin.has_any_role(&[Role::Seller]));
    }

    #[test]
    fn roles_then_active_role_decide() {
        let buyer = user(UserType::Buyer, vec![Role::Buyer], UserType::Buyer);
        assert!(buyer.has_any_role(&[Role::Buyer]));
        assert!(!buyer.has_any_role(&[Role::Seller]));

        let both = user(UserType::Buyer, vec![Role::Buyer, Role::Seller], UserType::Buyer);
        assert!(both.has_any_role(&[Role::Seller]));

        // Legacy account with no explicit roles falls back to active role
        let legacy = user(UserType::Buyer, vec![], UserType::Seller);
        assert!(legacy.has_any_role(&[Role::Seller]));
    }
}
