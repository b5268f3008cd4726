//! Catalog, RFQ and order rules. The service modules load rows and defer
//! every decision to the functions here.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::marketplace::ProductRow;
use crate::validation::{check_currency, check_len, check_optional_len};

pub const MAX_ORDER_LINES: usize = 50;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProductStatus::Active),
            "archived" => Some(ProductStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProductFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    pub unit_price_cents: i64,
    pub currency: String,
    #[serde(default = "default_moq")]
    pub min_order_quantity: i32,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub status: ProductStatus,
}

fn default_moq() -> i32 {
    1
}

impl ProductFields {
    pub fn from_row(row: &ProductRow) -> Result<Self, AppError> {
        let status = ProductStatus::parse(&row.status).ok_or_else(|| {
            anyhow::anyhow!("Product {} has unknown status {}", row.id, row.status)
        })?;
        Ok(Self {
            name: row.name.clone(),
            description: row.description.clone(),
            category: row.category.clone(),
            unit_price_cents: row.unit_price_cents,
            currency: row.currency.clone(),
            min_order_quantity: row.min_order_quantity,
            stock: row.stock,
            status,
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        check_len("name", &self.name, 2, 150)?;
        check_optional_len("description", self.description.as_deref(), 5000)?;
        check_len("category", &self.category, 1, 80)?;
        check_currency("currency", &self.currency)?;
        if self.unit_price_cents <= 0 {
            return Err(AppError::Validation(
                "unit_price_cents must be positive".to_string(),
            ));
        }
        if self.min_order_quantity < 1 {
            return Err(AppError::Validation(
                "min_order_quantity must be at least 1".to_string(),
            ));
        }
        if self.stock < 0 {
            return Err(AppError::Validation("stock must not be negative".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RfqStatus {
    Open,
    Awarded,
    Closed,
}

impl RfqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RfqStatus::Open => "open",
            RfqStatus::Awarded => "awarded",
            RfqStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Awarded,
    Rejected,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Awarded => "awarded",
            QuoteStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewRfq {
    pub title: String,
    pub description: String,
    pub category: String,
    pub quantity: i32,
    #[serde(default)]
    pub target_price_cents: Option<i64>,
    pub currency: String,
    pub deadline: DateTime<Utc>,
}

impl NewRfq {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        check_len("title", &self.title, 3, 150)?;
        check_len("description", &self.description, 10, 5000)?;
        check_len("category", &self.category, 1, 80)?;
        check_currency("currency", &self.currency)?;
        if self.quantity < 1 {
            return Err(AppError::Validation("quantity must be at least 1".to_string()));
        }
        if self.target_price_cents.is_some_and(|p| p <= 0) {
            return Err(AppError::Validation(
                "target_price_cents must be positive".to_string(),
            ));
        }
        if self.deadline <= now {
            return Err(AppError::Validation("deadline must be in the future".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewQuote {
    pub business_id: Uuid,
    pub unit_price_cents: i64,
    pub lead_time_days: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewQuote {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.unit_price_cents <= 0 {
            return Err(AppError::Validation(
                "unit_price_cents must be positive".to_string(),
            ));
        }
        if !(0..=365).contains(&self.lead_time_days) {
            return Err(AppError::Validation(
                "lead_time_days must be between 0 and 365".to_string(),
            ));
        }
        check_optional_len("notes", self.notes.as_deref(), 2000)
    }
}

/// Checks an RFQ is still taking quotes at `now`.
pub fn check_quotable(status: &str, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppError> {
    if status != RfqStatus::Open.as_str() {
        return Err(AppError::Validation(format!("RFQ is {status}")));
    }
    if deadline <= now {
        return Err(AppError::Validation("The RFQ deadline has passed".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Which side of an order is acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderParty {
    Buyer,
    Seller,
}

pub fn check_order_transition(
    party: OrderParty,
    current: OrderStatus,
    next: OrderStatus,
) -> Result<(), AppError> {
    use OrderStatus::*;
    let allowed = match (current, next) {
        (Pending | Confirmed, Cancelled) => true,
        (Pending, Confirmed) | (Confirmed, Shipped) | (Shipped, Delivered) => {
            party == OrderParty::Seller
        }
        _ => false,
    };
    if allowed {
        return Ok(());
    }
    let err = format!(
        "Cannot move an order from {} to {}",
        current.as_str(),
        next.as_str()
    );
    if party == OrderParty::Buyer && next != Cancelled {
        Err(AppError::Forbidden(err))
    } else {
        Err(AppError::Validation(err))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewOrder {
    pub business_id: Uuid,
    pub items: Vec<OrderLine>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.items.is_empty() {
            return Err(AppError::Validation("An order needs at least one item".to_string()));
        }
        if self.items.len() > MAX_ORDER_LINES {
            return Err(AppError::Validation(format!(
                "An order may contain at most {MAX_ORDER_LINES} items"
            )));
        }
        let mut seen = HashSet::new();
        for (i, line) in self.items.iter().enumerate() {
            if !seen.insert(line.product_id) {
                return Err(AppError::Validation(format!(
                    "items[{i}]: product {} is listed twice",
                    line.product_id
                )));
            }
            if line.quantity < 1 {
                return Err(AppError::Validation(format!(
                    "items[{i}].quantity must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// A validated line ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub total_cents: i64,
    pub currency: String,
}

/// Prices `order` against the current product rows (locked by the caller).
pub fn price_order(order: &NewOrder, products: &[ProductRow]) -> Result<PricedOrder, AppError> {
    let by_id: HashMap<Uuid, &ProductRow> = products.iter().map(|p| (p.id, p)).collect();
    let mut lines = Vec::with_capacity(order.items.len());
    let mut total: i64 = 0;
    let mut currency: Option<&str> = None;

    for (i, line) in order.items.iter().enumerate() {
        let product = by_id
            .get(&line.product_id)
            .filter(|p| p.business_id == order.business_id)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "items[{i}]: product {} is not sold by this business",
                    line.product_id
                ))
            })?;
        if product.status != ProductStatus::Active.as_str() {
            return Err(AppError::Validation(format!(
                "items[{i}]: {} is no longer available",
                product.name
            )));
        }
        if line.quantity < product.min_order_quantity {
            return Err(AppError::Validation(format!(
                "items[{i}]: minimum order quantity for {} is {}",
                product.name, product.min_order_quantity
            )));
        }
        if line.quantity > product.stock {
            return Err(AppError::Conflict(format!(
                "items[{i}]: only {} of {} in stock",
                product.stock, product.name
            )));
        }
        match currency {
            None => currency = Some(product.currency.as_str()),
            Some(c) if c != product.currency => {
                return Err(AppError::Validation(
                    "All items in an order must share one currency".to_string(),
                ))
            }
            Some(_) => {}
        }

        total = product
            .unit_price_cents
            .checked_mul(i64::from(line.quantity))
            .and_then(|t| total.checked_add(t))
            .ok_or_else(|| AppError::Validation("Order total is too large".to_string()))?;
        lines.push(PricedLine {
            product_id: product.id,
            quantity: line.quantity,
            unit_price_cents: product.unit_price_cents,
        });
    }

    Ok(PricedOrder {
        lines,
        total_cents: total,
        currency: currency.unwrap_or_default().to_string(),
    })
}
