use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    Category, Currency, DeliveryAddress, Location, ModerationStatus, NotificationType,
    OrderStatus, PaymentMethod, PaymentStatus, Preferences, ProductImage, ProductLocation,
    MediaKind, Rating, ReportImage, Role, SellerInfo, Unit, UserType,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

/// One failed validation rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

// -- Auth --

/// Enum-valued fields arrive as strings so bad values become field errors
/// instead of body rejections.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub user_type: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserSummary,
}

// -- Users --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub user_type: UserType,
    pub user_roles: Vec<Role>,
    pub active_role: UserType,
    pub profile_image: Option<String>,
}

/// Full profile. The password hash and reset token never leave the DB layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
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

/// Public seller card, as embedded in listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerSummary {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: Location,
    pub seller_info: Option<SellerInfo>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: Location,
    pub seller_info: Option<SellerInfo>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<Location>,
    pub seller_info: Option<SellerInfo>,
    pub preferences: Option<Preferences>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageRequest {
    #[serde(default)]
    pub profile_image: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchRoleRequest {
    #[serde(default)]
    pub role: String,
}

// -- Products --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: Currency,
    pub category: Category,
    pub images: Vec<ProductImage>,
    pub primary_image: Option<String>,
    pub seller: Option<SellerSummary>,
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
    pub is_approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact listing reference embedded in notifications and orders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBrief {
    pub id: Uuid,
    pub title: String,
    pub images: Vec<ProductImage>,
    pub price: f64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    pub url: Option<String>,
    pub public_id: Option<String>,
    pub is_primary: Option<bool>,
    #[serde(rename = "type")]
    pub kind: Option<MediaKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub category: String,
    pub images: Option<Vec<ImageInput>>,
    #[serde(default)]
    pub location: ProductLocation,
    pub stock: Option<i64>,
    pub unit: Option<String>,
    pub category_data: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub images: Option<Vec<ImageInput>>,
    pub location: Option<ProductLocation>,
    pub stock: Option<i64>,
    pub unit: Option<String>,
    pub category_data: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryInfo {
    pub id: Category,
    pub name: &'static str,
    pub icon: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductCounts {
    pub total: i64,
    pub approved: i64,
    pub pending: i64,
    pub rejected: i64,
}

// -- Notifications & product requests --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: Uuid,
    pub user: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub product_id: Option<Uuid>,
    pub product: Option<ProductBrief>,
    pub data: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ProductRequestInput {
    #[serde(default)]
    pub category: String,
    pub keywords: Option<Vec<String>>,
    pub description: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequestResponse {
    pub id: Uuid,
    pub user: Uuid,
    pub category: Category,
    pub keywords: Vec<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// -- Orders --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub buyer: PartySummary,
    pub seller: PartySummary,
    pub product: Option<ProductBrief>,
    pub product_id: Uuid,
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub quantity: i64,
    pub delivery_address: Option<DeliveryAddress>,
    pub notes: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    #[serde(default)]
    pub status: String,
    pub reason: Option<String>,
}

// -- Messaging --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub id: Uuid,
    pub name: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_title: Option<String>,
    pub counterpart: Counterpart,
    pub last_message: Option<ChatMessage>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Market reports --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAuthor {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketReportResponse {
    pub id: Uuid,
    pub title: String,
    pub city: String,
    pub district: Option<String>,
    pub market_name: Option<String>,
    pub report_date: DateTime<Utc>,
    pub formatted_date: String,
    pub location: String,
    pub description: Option<String>,
    pub image: Option<ReportImage>,
    pub created_by: ReportAuthor,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketReportInput {
    pub title: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub market_name: Option<String>,
    pub report_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub image: Option<ReportImage>,
    pub is_active: Option<bool>,
}

// -- Locations --

#[derive(Debug, Clone, Serialize)]
pub struct CityResponse {
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictResponse {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

// -- Admin --

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_products: i64,
    pub pending_products: i64,
    pub approved_products: i64,
    pub active_users: i64,
    pub blocked_users: i64,
    pub featured_products: i64,
    pub total_market_reports: i64,
    pub total_views: i64,
    pub total_favorites: i64,
}

#[derive(Debug, Deserialize)]
pub struct RejectProductRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUserRequest {
    pub is_active: bool,
}
