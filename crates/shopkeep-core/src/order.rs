//! # Order Rules
//!
//! Pure pricing and reconciliation for sales, exchanges and returns.
//!
//! ## Where This Sits in a Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  shopkeep-db OrderRepository::create_sale (one SQLite transaction)      │
//! │                                                                         │
//! │  allocate ORD number                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each line: load product ──► price_sale_line() ← THIS MODULE       │
//! │                       │              (active? enough stock? snapshot)  │
//! │                       ▼                                                 │
//! │                 ledger SUBTRACT (guarded UPDATE)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sale_totals() ← THIS MODULE ──► INSERT order + items ──► COMMIT       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Returns and exchanges go through [`reconcile_returns`], which checks every
//! requested line against what the original sale still covers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{
    LineRequest, Order, OrderItem, OrderKind, OrderStatus, PaymentStatus, Product, ReturnedLine,
};

// =============================================================================
// Priced Lines
// =============================================================================

/// A validated line with its snapshot values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub cost_basis: Money,
    subtotal: Money,
}

impl PricedLine {
    /// Builds a line, computing `quantity × unit_price` once.
    ///
    /// ## Errors
    /// [`ValidationError::Overflow`] when the subtotal does not fit in `i64`.
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: i64,
        unit_price: Money,
        cost_basis: Money,
    ) -> CoreResult<Self> {
        let subtotal = unit_price
            .checked_multiply_quantity(quantity)
            .ok_or_else(|| ValidationError::overflow("subtotal"))?;

        Ok(PricedLine {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            cost_basis,
            subtotal,
        })
    }

    /// `quantity × unit_price`.
    #[inline]
    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    /// Materialises the line as an order item.
    pub fn to_order_item(&self, id: String, order_id: &str) -> OrderItem {
        OrderItem {
            id,
            order_id: order_id.to_string(),
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            quantity: self.quantity,
            unit_price_cents: self.unit_price.cents(),
            cost_basis_cents: self.cost_basis.cents(),
            subtotal_cents: self.subtotal().cents(),
        }
    }

    /// Materialises the line as an exchange's returned line.
    pub fn to_returned_line(&self, id: String, order_id: &str) -> ReturnedLine {
        ReturnedLine {
            id,
            order_id: order_id.to_string(),
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            quantity: self.quantity,
            unit_price_cents: self.unit_price.cents(),
            subtotal_cents: self.subtotal().cents(),
        }
    }
}

/// Sum of line subtotals.
pub fn lines_value(lines: &[PricedLine]) -> CoreResult<Money> {
    Money::checked_sum(lines.iter().map(PricedLine::subtotal))
        .ok_or_else(|| ValidationError::overflow("subtotal").into())
}

/// Prices one sale (or exchange replacement) line from the current product.
///
/// ## Errors
/// - [`CoreError::InactiveProduct`] when the product is deactivated
/// - [`CoreError::InsufficientStock`] when `stock < quantity`
///
/// ```rust,ignore
/// let line = price_sale_line(&product, 3)?;
/// assert_eq!(line.unit_price, product.sale_price());
/// ```
pub fn price_sale_line(product: &Product, quantity: i64) -> CoreResult<PricedLine> {
    if !product.can_sell(quantity) {
        return Err(if product.is_active {
            CoreError::InsufficientStock {
                sku: product.sku.clone(),
                available: product.stock,
                requested: quantity,
            }
        } else {
            CoreError::InactiveProduct {
                sku: product.sku.clone(),
            }
        });
    }

    PricedLine::new(
        product.id.as_str(),
        product.name.as_str(),
        quantity,
        product.sale_price(),
        product.purchase_price(),
    )
}

// =============================================================================
// Sale Totals
// =============================================================================

/// Money totals of a sale or exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

/// Computes `total = subtotal + tax - discount`.
///
/// A discount that would push the total below zero is rejected; refunds are
/// expressed as return orders, not as discounted sales.
pub fn sale_totals(lines: &[PricedLine], tax: Money, discount: Money) -> CoreResult<OrderTotals> {
    let subtotal = lines_value(lines)?;
    let gross = subtotal
        .checked_add(tax)
        .ok_or_else(|| ValidationError::overflow("total"))?;
    let total = gross
        .checked_sub(discount)
        .ok_or_else(|| ValidationError::overflow("total"))?;

    if total.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: gross.cents(),
        }
        .into());
    }

    Ok(OrderTotals {
        subtotal,
        tax,
        discount,
        total,
    })
}

/// Initial payment state of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialPayment {
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub was_debt: bool,
}

/// Debt sales start unpaid; everything else is paid on creation.
pub fn initial_payment(is_debt: bool, now: DateTime<Utc>) -> InitialPayment {
    if is_debt {
        InitialPayment {
            status: PaymentStatus::Debt,
            paid_at: None,
            was_debt: true,
        }
    } else {
        InitialPayment {
            status: PaymentStatus::Paid,
            paid_at: Some(now),
            was_debt: false,
        }
    }
}

// =============================================================================
// State Transitions
// =============================================================================

/// Checks that a debt can be settled.
pub fn ensure_debt_payable(order: &Order) -> CoreResult<()> {
    if order.is_open_debt() {
        return Ok(());
    }

    let state = if order.status != OrderStatus::Completed {
        format!("{:?}", order.status).to_lowercase()
    } else {
        format!("{:?}", order.payment_status).to_lowercase()
    };

    Err(CoreError::InvalidState {
        entity: "Order",
        key: order.order_number.clone(),
        state,
        operation: "pay debt",
    })
}

/// Checks that a sale can be cancelled.
///
/// Only completed sales without linked exchanges/returns qualify; once units
/// have come back through a linked order the stock history would double count.
pub fn ensure_cancellable(order: &Order, linked_orders: usize) -> CoreResult<()> {
    let reason = if !matches!(order.kind, OrderKind::Sale) {
        Some(format!("{:?}", order.order_type()).to_lowercase())
    } else if order.status != OrderStatus::Completed {
        Some(format!("{:?}", order.status).to_lowercase())
    } else if linked_orders > 0 {
        Some(format!("linked to {linked_orders} order(s)"))
    } else {
        None
    };

    match reason {
        None => Ok(()),
        Some(state) => Err(CoreError::InvalidState {
            entity: "Order",
            key: order.order_number.clone(),
            state,
            operation: "cancel",
        }),
    }
}

/// Payment status after cancellation: paid money goes back to the customer.
pub fn payment_after_cancel(current: PaymentStatus) -> PaymentStatus {
    match current {
        PaymentStatus::Paid => PaymentStatus::Refunded,
        other => other,
    }
}

// =============================================================================
// Returns & Exchanges
// =============================================================================

/// Checks that an order can be the original of a return or exchange.
pub fn ensure_returnable_original(original: &Order) -> CoreResult<()> {
    if matches!(original.kind, OrderKind::Sale) && original.status == OrderStatus::Completed {
        return Ok(());
    }

    let state = if matches!(original.kind, OrderKind::Sale) {
        format!("{:?}", original.status).to_lowercase()
    } else {
        format!("{:?}", original.order_type()).to_lowercase()
    };

    Err(CoreError::InvalidState {
        entity: "Order",
        key: original.order_number.clone(),
        state,
        operation: "accept returns",
    })
}

/// Sums requested quantities per product, keeping first-seen order.
pub fn merge_lines(lines: &[LineRequest]) -> Vec<LineRequest> {
    let mut merged: Vec<LineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    merged
}

/// Validates return lines against the original sale and prices them.
///
/// ## Rules
/// - Every product must appear on the original order
/// - `requested ≤ purchased − already_returned`, where `already_returned`
///   counts units that came back through earlier linked returns/exchanges
/// - Lines are priced at the original order's unit price and cost basis,
///   never at the current catalog price
///
/// ## Errors
/// [`CoreError::InvalidReturn`] on the first offending line.
pub fn reconcile_returns(
    original: &Order,
    already_returned: &HashMap<String, i64>,
    requested: &[LineRequest],
) -> CoreResult<Vec<PricedLine>> {
    let mut lines = Vec::new();

    for request in merge_lines(requested) {
        let purchased: i64 = original
            .items
            .iter()
            .filter(|i| i.product_id == request.product_id)
            .map(|i| i.quantity)
            .sum();
        let returned = already_returned
            .get(&request.product_id)
            .copied()
            .unwrap_or(0);
        let returnable = (purchased - returned).max(0);

        let source = original
            .items
            .iter()
            .find(|i| i.product_id == request.product_id);

        let source = match source {
            Some(item) if request.quantity <= returnable => item,
            _ => {
                return Err(CoreError::InvalidReturn {
                    order_number: original.order_number.clone(),
                    product_id: request.product_id.clone(),
                    requested: request.quantity,
                    returnable,
                })
            }
        };

        lines.push(PricedLine::new(
            source.product_id.as_str(),
            source.product_name.as_str(),
            request.quantity,
            Money::from_cents(source.unit_price_cents),
            Money::from_cents(source.cost_basis_cents),
        )?);
    }

    Ok(lines)
}

/// Totals of a return order: `subtotal = total = -Σ returned values`.
pub fn return_totals(lines: &[PricedLine]) -> CoreResult<OrderTotals> {
    let refund = -lines_value(lines)?;
    Ok(OrderTotals {
        subtotal: refund,
        tax: Money::zero(),
        discount: Money::zero(),
        total: refund,
    })
}

/// Totals of an exchange order.
///
/// Only the replacement items count; the returned value is settled
/// separately through [`crate::types::ExchangeSettlement`].
pub fn exchange_totals(replacements: &[PricedLine]) -> CoreResult<OrderTotals> {
    let subtotal = lines_value(replacements)?;
    Ok(OrderTotals {
        subtotal,
        tax: Money::zero(),
        discount: Money::zero(),
        total: subtotal,
    })
}
