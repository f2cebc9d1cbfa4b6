//! # Domain Types
//!
//! Core domain types used throughout Shopkeep.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐      │
//! │  │    Product      │   │      Order       │   │    Purchase     │      │
//! │  │  ─────────────  │   │  ──────────────  │   │  ─────────────  │      │
//! │  │  id (UUID)      │   │  id (UUID)       │   │  id (UUID)      │      │
//! │  │  sku (business) │   │  order_number    │   │  purchase_number│      │
//! │  │  stock          │   │  kind ─────────┐ │   │  supplier       │      │
//! │  │  prices         │   │  items[]       │ │   │  items[]        │      │
//! │  └─────────────────┘   └────────────────┼─┘   └─────────────────┘      │
//! │                                         ▼                               │
//! │                        ┌────────────────────────────────┐              │
//! │                        │ OrderKind                      │              │
//! │                        │  Sale                          │              │
//! │                        │  Exchange { related_order_code}│              │
//! │                        │  Return   { related_order_code}│              │
//! │                        └────────────────────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Order and purchase items copy the product name, unit price and cost at
//! transaction time. Later catalog edits never rewrite them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - unique business identifier.
    pub sku: String,

    /// Barcode, unique when present.
    pub barcode: Option<String>,

    pub name: String,

    pub category: Option<String>,

    /// Current reference cost in cents, refreshed by every purchase.
    pub purchase_price_cents: i64,

    /// Sale price in cents.
    pub sale_price_cents: i64,

    /// On-hand quantity. Never negative; only the stock ledger writes it.
    pub stock: i64,

    /// Reorder threshold.
    pub min_stock_level: i64,

    /// Unit of measure ("pcs", "kg", ...).
    pub unit: String,

    /// Inactive products cannot be sold. Used instead of deletion.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }

    #[inline]
    pub fn purchase_price(&self) -> Money {
        Money::from_cents(self.purchase_price_cents)
    }

    /// Checks if `quantity` units can be sold right now.
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.is_active && self.stock >= quantity
    }

    /// Stock at or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock_level
    }
}

/// Catalog intake payload.
///
/// When the SKU or barcode already exists the payload is merged into the
/// existing product instead of creating a duplicate: `stock` is added, and
/// the optional fields overwrite only when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub sale_price_cents: Option<i64>,
    /// Units received with the intake (default 0).
    pub stock: Option<i64>,
    pub min_stock_level: Option<i64>,
    pub unit: Option<String>,
    pub is_active: Option<bool>,
}

/// Partial edit of pricing and metadata. Stock is deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub sale_price_cents: Option<i64>,
    pub min_stock_level: Option<i64>,
    pub unit: Option<String>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Stock ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockOperation {
    /// Increase stock by the quantity.
    Add,
    /// Decrease stock by the quantity; fails rather than going negative.
    Subtract,
    /// Override stock with the quantity.
    Set,
}

impl std::str::FromStr for StockOperation {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(StockOperation::Add),
            "subtract" => Ok(StockOperation::Subtract),
            "set" => Ok(StockOperation::Set),
            other => Err(crate::error::ValidationError::InvalidFormat {
                field: "op".to_string(),
                reason: format!("unknown stock operation '{other}'"),
            }),
        }
    }
}

// =============================================================================
// Order Enums
// =============================================================================

/// Flat order type as stored in the `orders.order_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Sale,
    Exchange,
    Return,
}

/// Lifecycle status of an order or purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Internal payment bookkeeping flag. No gateway is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    /// Completed sale not yet paid.
    Debt,
    /// Paid sale that was cancelled.
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
}

// =============================================================================
// Order Kind
// =============================================================================

/// What an order is, with the fields that only make sense for that kind.
///
/// Linked orders always carry the `order_number` of the sale they came from;
/// a sale never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "order_type", rename_all = "snake_case")]
pub enum OrderKind {
    Sale,
    Exchange { related_order_code: String },
    Return { related_order_code: String },
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Sale => OrderType::Sale,
            OrderKind::Exchange { .. } => OrderType::Exchange,
            OrderKind::Return { .. } => OrderType::Return,
        }
    }

    pub fn related_order_code(&self) -> Option<&str> {
        match self {
            OrderKind::Sale => None,
            OrderKind::Exchange { related_order_code }
            | OrderKind::Return { related_order_code } => Some(related_order_code),
        }
    }

    /// Rebuilds the kind from its stored columns.
    ///
    /// Returns `None` for inconsistent rows: a sale with a related code, or a
    /// linked order without one.
    pub fn from_parts(order_type: OrderType, related_order_code: Option<String>) -> Option<Self> {
        match (order_type, related_order_code) {
            (OrderType::Sale, None) => Some(OrderKind::Sale),
            (OrderType::Exchange, Some(code)) => Some(OrderKind::Exchange {
                related_order_code: code,
            }),
            (OrderType::Return, Some(code)) => Some(OrderKind::Return {
                related_order_code: code,
            }),
            _ => None,
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// A line of an order. Name, price and cost are frozen at transaction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub product_name: String,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Purchase price in cents at time of sale (frozen).
    pub cost_basis_cents: i64,
    /// quantity × unit_price.
    pub subtotal_cents: i64,
}

/// A sale, exchange or return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// `ORD`/`EX`/`RF` + YYMMDD + sequence. Unique.
    pub order_number: String,
    pub kind: OrderKind,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Historical marker: the order was created as a debt.
    pub was_debt: bool,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn order_type(&self) -> OrderType {
        self.kind.order_type()
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Outstanding debt: a completed sale still flagged as debt.
    pub fn is_open_debt(&self) -> bool {
        self.status == OrderStatus::Completed && self.payment_status == PaymentStatus::Debt
    }

    /// Checks the money invariants for the order's kind.
    ///
    /// - Sale/Exchange: `total == subtotal + tax - discount`
    /// - Return: `subtotal == total == -Σ item subtotals`
    pub fn totals_are_consistent(&self) -> bool {
        let items: i64 = self.items.iter().map(|i| i.subtotal_cents).sum();
        match self.kind {
            OrderKind::Sale | OrderKind::Exchange { .. } => {
                items == self.subtotal_cents
                    && self.total_cents
                        == self.subtotal_cents + self.tax_cents - self.discount_cents
            }
            OrderKind::Return { .. } => {
                self.total_cents == -items && self.subtotal_cents == self.total_cents
            }
        }
    }
}

/// A line taken back by an exchange, priced at the original sale's price.
///
/// Kept next to the exchange order so the settlement difference can be
/// recomputed later. Not part of the exchange's `items` or `total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnedLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

/// Money to settle with the customer after an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExchangeSettlement {
    pub order_number: String,
    pub related_order_code: String,
    /// Value of the replacement items (the exchange order's total).
    pub exchange_total_cents: i64,
    /// Value of the returned items at original prices.
    pub returned_value_cents: i64,
    /// `exchange_total - returned_value`. Positive: customer pays the shop.
    /// Negative: shop refunds the customer.
    pub difference_cents: i64,
}

impl ExchangeSettlement {
    pub fn new(
        order_number: impl Into<String>,
        related_order_code: impl Into<String>,
        exchange_total: Money,
        returned_value: Money,
    ) -> Self {
        ExchangeSettlement {
            order_number: order_number.into(),
            related_order_code: related_order_code.into(),
            exchange_total_cents: exchange_total.cents(),
            returned_value_cents: returned_value.cents(),
            difference_cents: (exchange_total - returned_value).cents(),
        }
    }
}

/// Result of an exchange: the new order plus its settlement figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExchangeOutcome {
    pub order: Order,
    pub settlement: ExchangeSettlement,
}

// =============================================================================
// Order Requests
// =============================================================================

/// A requested line: product and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        LineRequest {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Sale order request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSaleOrder {
    pub items: Vec<LineRequest>,
    pub tax_cents: Option<i64>,
    pub discount_cents: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    /// Record as unpaid debt instead of a paid sale.
    pub is_debt: bool,
    pub created_by: String,
}

/// Return request against an original sale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnRequest {
    pub original_order_code: String,
    pub return_items: Vec<LineRequest>,
    pub notes: Option<String>,
    pub created_by: String,
}

/// Exchange request: lines taken back plus replacement lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExchangeRequest {
    pub original_order_code: String,
    pub return_items: Vec<LineRequest>,
    pub exchange_items: Vec<LineRequest>,
    pub notes: Option<String>,
    pub created_by: String,
}

/// Half-open time window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    pub from: DateTime<Utc>,
    #[ts(as = "String")]
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange { from, to }
    }

    /// The `days` days leading up to `now`.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        DateRange {
            from: now - chrono::Duration::days(days),
            to: now,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// Order listing filter. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderFilter {
    pub order_type: Option<OrderType>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub range: Option<DateRange>,
    pub limit: Option<u32>,
}

// =============================================================================
// Purchase
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Cancelled,
}

/// A line of a supplier delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    /// Invoice price per unit; becomes the product's reference cost.
    pub purchase_price_cents: i64,
    pub subtotal_cents: i64,
}

/// A recorded supplier intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    /// `PUR` + YYMMDD + sequence. Unique.
    pub purchase_number: String,
    pub items: Vec<PurchaseItem>,
    pub supplier: Option<String>,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub status: PurchaseStatus,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A requested purchase line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseLineRequest {
    pub product_id: String,
    pub quantity: i64,
    pub purchase_price_cents: i64,
}

/// Purchase intake request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchase {
    pub items: Vec<PurchaseLineRequest>,
    pub supplier: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
}
