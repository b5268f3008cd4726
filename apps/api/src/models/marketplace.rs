use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub unit_price_cents: i64,
    pub currency: String,
    pub min_order_quantity: i32,
    pub stock: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RfqRow {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub quantity: i32,
    pub target_price_cents: Option<i64>,
    pub currency: String,
    pub deadline: DateTime<Utc>,
    pub status: String,
    pub awarded_quote_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuoteRow {
    pub id: Uuid,
    pub rfq_id: Uuid,
    pub business_id: Uuid,
    pub submitted_by: Uuid,
    pub unit_price_cents: i64,
    pub lead_time_days: i32,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub business_id: Uuid,
    pub status: String,
    pub total_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItemRow {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// An order together with its line items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRow,
    pub items: Vec<OrderItemRow>,
}
