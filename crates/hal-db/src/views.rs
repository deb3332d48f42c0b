//! Conversions from rows to the JSON shapes the clients consume.

use hal_types::api::{
    ChatMessage, CityResponse, ConversationResponse, Counterpart, DistrictResponse,
    MarketReportResponse, NotificationResponse, OrderResponse, PartySummary, ProductBrief,
    ProductRequestResponse, ProductResponse, ReportAuthor, SellerProfile, SellerSummary,
    UserProfile, UserSummary,
};
use hal_types::models::{ModerationStatus, ProductImage, primary_image_url};

use crate::models::{
    CityRow, ConversationSummaryRow, DistrictRow, MarketReportRow, MessageRow, NotificationRow,
    OrderRow, PartyRow, ProductBriefRow, ProductRequestRow, ProductRow, SellerCard, UserRow,
};

fn sanitize_images(images: Vec<ProductImage>) -> Vec<ProductImage> {
    images.into_iter().map(ProductImage::sanitized).collect()
}

impl From<&UserRow> for UserSummary {
    fn from(u: &UserRow) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            phone: u.phone.clone(),
            user_type: u.user_type,
            user_roles: u.user_roles.clone(),
            active_role: u.active_role,
            profile_image: u.profile_image.clone(),
        }
    }
}

impl From<UserRow> for UserProfile {
    fn from(u: UserRow) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            phone: u.phone,
            user_type: u.user_type,
            user_roles: u.user_roles,
            active_role: u.active_role,
            profile_image: u.profile_image,
            is_active: u.is_active,
            location: u.location,
            seller_info: u.seller_info,
            preferences: u.preferences,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

impl From<UserRow> for SellerProfile {
    fn from(u: UserRow) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            phone: u.phone,
            location: u.location,
            seller_info: u.seller_info,
            profile_image: u.profile_image,
        }
    }
}

impl From<SellerCard> for SellerSummary {
    fn from(s: SellerCard) -> Self {
        Self {
            id: s.id,
            name: s.name,
            phone: s.phone,
            location: s.location,
            seller_info: s.seller_info,
            profile_image: s.profile_image,
        }
    }
}

impl From<ProductRow> for ProductResponse {
    fn from(p: ProductRow) -> Self {
        let images = sanitize_images(p.images);
        let primary_image = primary_image_url(&images).map(str::to_string);
        Self {
            id: p.id,
            title: p.title,
            description: p.description,
            price: p.price,
            currency: p.currency,
            category: p.category,
            images,
            primary_image,
            seller: p.seller.map(SellerSummary::from),
            seller_id: p.seller_id,
            location: p.location,
            is_available: p.is_available,
            stock: p.stock,
            unit: p.unit,
            category_data: p.category_data,
            tags: p.tags,
            views: p.views,
            favorites_count: p.favorites_count,
            rating: p.rating,
            is_featured: p.is_featured,
            status: p.status,
            is_approved: p.status == ModerationStatus::Approved,
            approved_at: p.approved_at,
            approved_by: p.approved_by,
            rejection_reason: p.rejection_reason,
            rejected_at: p.rejected_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<ProductBriefRow> for ProductBrief {
    fn from(p: ProductBriefRow) -> Self {
        Self {
            id: p.id,
            title: p.title,
            images: sanitize_images(p.images),
            price: p.price,
            currency: p.currency,
        }
    }
}

impl From<NotificationRow> for NotificationResponse {
    fn from(n: NotificationRow) -> Self {
        Self {
            id: n.id,
            user: n.user_id,
            kind: n.kind,
            title: n.title,
            message: n.message,
            product_id: n.product_id,
            product: n.product.map(ProductBrief::from),
            data: n.data,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

impl From<ProductRequestRow> for ProductRequestResponse {
    fn from(r: ProductRequestRow) -> Self {
        Self {
            id: r.id,
            user: r.user_id,
            category: r.category,
            keywords: r.keywords,
            description: r.description,
            city: r.city,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

impl From<PartyRow> for PartySummary {
    fn from(p: PartyRow) -> Self {
        Self {
            id: p.id,
            name: p.name,
            phone: p.phone,
            location: p.location,
        }
    }
}

/// `ORD-` plus the last eight hex digits of the id.
pub fn order_number(id: &uuid::Uuid) -> String {
    let hex = id.simple().to_string();
    format!("ORD-{}", hex[hex.len() - 8..].to_uppercase())
}

impl From<OrderRow> for OrderResponse {
    fn from(o: OrderRow) -> Self {
        Self {
            id: o.id,
            order_number: order_number(&o.id),
            buyer: o.buyer.into(),
            seller: o.seller.into(),
            product: o.product.map(ProductBrief::from),
            product_id: o.product_id,
            quantity: o.quantity,
            unit_price: o.unit_price,
            total_price: o.total_price,
            status: o.status,
            delivery_address: o.delivery_address,
            notes: o.notes,
            payment_method: o.payment_method,
            payment_status: o.payment_status,
            delivered_at: o.delivered_at,
            cancelled_at: o.cancelled_at,
            cancellation_reason: o.cancellation_reason,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

impl From<MessageRow> for ChatMessage {
    fn from(m: MessageRow) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            body: m.body,
            created_at: m.created_at,
            read_at: m.read_at,
        }
    }
}

impl From<ConversationSummaryRow> for ConversationResponse {
    fn from(s: ConversationSummaryRow) -> Self {
        let c = s.conversation;
        Self {
            id: c.id,
            buyer_id: c.buyer_id,
            seller_id: c.seller_id,
            product_id: c.product_id,
            product_title: c.product_title,
            counterpart: Counterpart {
                id: s.counterpart_id,
                name: s.counterpart_name,
                profile_image: s.counterpart_image,
            },
            last_message: s.last_message.map(ChatMessage::from),
            unread_count: s.unread_count,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

impl From<MarketReportRow> for MarketReportResponse {
    fn from(r: MarketReportRow) -> Self {
        let location = match &r.district {
            Some(d) if !d.is_empty() => format!("{}, {}", d, r.city),
            _ => r.city.clone(),
        };
        Self {
            id: r.id,
            title: r.title,
            formatted_date: r.report_date.format("%d.%m.%Y").to_string(),
            location,
            city: r.city,
            district: r.district,
            market_name: r.market_name,
            report_date: r.report_date,
            description: r.description,
            image: r.image,
            created_by: ReportAuthor {
                id: r.created_by,
                name: r.author_name,
            },
            is_active: r.is_active,
            expires_at: r.expires_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<CityRow> for CityResponse {
    fn from(c: CityRow) -> Self {
        Self {
            id: c.id,
            name: c.name,
            code: c.code,
        }
    }
}

impl From<DistrictRow> for DistrictResponse {
    fn from(d: DistrictRow) -> Self {
        Self {
            id: d.id,
            name: d.name,
            is_active: d.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn order_number_uses_id_tail() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(order_number(&id), "ORD-0E5FE0C8");
    }
}
