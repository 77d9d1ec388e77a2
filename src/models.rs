// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment status written by the webhook once the provider reports a capture.
pub const PAYMENT_STATUS_COMPLETED: &str = "completed";
pub const PAYMENT_STATUS_PENDING: &str = "pending";

/// The only payment method that counts towards library access.
pub const PAYMENT_METHOD_WEBHOOK_VERIFIED: &str = "razorpay_webhook_verified";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub instagram_link: Option<String>,
    pub sign_up_time: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub brand: String,
    pub description: Option<String>,
    pub price: String,
    pub original_price: Option<String>,
    pub category: String,
    pub image_url: String,
    pub demo_link: Option<String>,
    pub access_link: Option<String>,
    pub razorpay_link: Option<String>,
    pub rating: String,
    pub review_count: i32,
    pub view_count: i32,
    pub sold_count: i32,
    pub in_stock: bool,
    pub is_high_demand: bool,
    pub has_instant_access: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Admin payload for creating or replacing a product. Prices are decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub brand: String,
    pub description: Option<String>,
    pub price: String,
    pub original_price: Option<String>,
    pub category: String,
    pub image_url: String,
    pub demo_link: Option<String>,
    pub access_link: Option<String>,
    pub razorpay_link: Option<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub is_high_demand: bool,
    #[serde(default = "default_true")]
    pub has_instant_access: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: i32,
    pub user_id: String,
    pub product_id: i32,
    pub quantity: i32,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Product,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: i32,
    pub user_id: String,
    pub product_id: i32,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteLine {
    #[serde(flatten)]
    pub favorite: Favorite,
    pub product: Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i32,
    pub user_id: String,
    pub total_amount: String,
    pub status: String,
    pub tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub shipping_address: Option<serde_json::Value>,
    pub tracking_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    /// Unit price captured at checkout.
    pub price: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub id: i32,
    pub order_id: i32,
    pub tracking_number: String,
    pub carrier: String,
    pub status: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub event_time: DateTime<Utc>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub tracking: Vec<TrackingEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i32,
    pub payment_id: Option<String>,
    pub user_id: String,
    pub product_id: i32,
    pub razorpay_link_used: Option<String>,
    pub amount: String,
    pub date_time: Option<DateTime<Utc>>,
    pub status: String,
    pub payment_method: Option<String>,
    pub issue_notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_verified(&self) -> bool {
        self.status == PAYMENT_STATUS_COMPLETED
            && self.payment_method.as_deref() == Some(PAYMENT_METHOD_WEBHOOK_VERIFIED)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    pub id: i32,
    pub user_id: String,
    pub product_id: i32,
    pub access_granted: bool,
    pub purchase_date: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    #[serde(flatten)]
    pub entry: LibraryEntry,
    pub product: Product,
}
