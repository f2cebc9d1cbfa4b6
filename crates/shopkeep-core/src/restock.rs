//! # Restock Recommendations
//!
//! Suggests what to reorder from 30-day sales velocity.
//!
//! ## Formula
//! ```text
//!   avg_daily     = total_sold / 30
//!   safety_stock  = avg_daily > 0 ? ceil(avg_daily × 7 × 1.5) : min_stock_level
//!   target_stock  = max(min_stock_level × 2, avg_daily × 7 + safety_stock)
//!   recommended   = max(0, ceil(target_stock − current_stock))
//!   stock_ratio   = current_stock / max(min_stock_level, 1)
//! ```
//!
//! Priority comes from the first matching rule in [`classify`]. A product is
//! listed when it needs units or is high priority.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Product;

/// Days of sales history considered.
pub const WINDOW_DAYS: i64 = 30;

/// Supplier lead time in days.
pub const LEAD_TIME_DAYS: f64 = 7.0;

pub const SAFETY_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RestockPriority {
    High,
    Medium,
    Low,
}

/// Why a product got its priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RestockReason {
    SellingFastLowStock,
    CriticallyLow,
    VeryFastSeller,
    LowStockWithDemand,
    DecliningStock,
    SlowSeller,
    NoRecentDemand,
    MaintainPerDemand,
}

impl RestockReason {
    pub const fn message(&self) -> &'static str {
        match self {
            RestockReason::SellingFastLowStock => "selling fast and low stock",
            RestockReason::CriticallyLow => "critically low stock",
            RestockReason::VeryFastSeller => "very fast seller",
            RestockReason::LowStockWithDemand => "low stock with demand",
            RestockReason::DecliningStock => "declining stock",
            RestockReason::SlowSeller => "slow seller",
            RestockReason::NoRecentDemand => "no recent demand",
            RestockReason::MaintainPerDemand => "maintain per demand",
        }
    }
}

impl fmt::Display for RestockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// One recommendation line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockItem {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub min_stock_level: i64,
    pub total_sold: i64,
    pub avg_daily_sales: f64,
    pub recommended_qty: i64,
    pub priority: RestockPriority,
    pub reason: RestockReason,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total_recommended_units: i64,
}

/// Recommendations grouped by priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockReport {
    pub high: Vec<RestockItem>,
    pub medium: Vec<RestockItem>,
    pub low: Vec<RestockItem>,
    pub summary: RestockSummary,
}

/// Priority rules, first match wins.
pub fn classify(
    current_stock: i64,
    min_stock_level: i64,
    total_sold: i64,
) -> (RestockPriority, RestockReason) {
    let avg = total_sold as f64 / WINDOW_DAYS as f64;
    let ratio = current_stock as f64 / min_stock_level.max(1) as f64;

    if ratio <= 1.0 && total_sold >= 20 {
        (RestockPriority::High, RestockReason::SellingFastLowStock)
    } else if ratio <= 0.5 && avg > 0.0 {
        (RestockPriority::High, RestockReason::CriticallyLow)
    } else if total_sold >= 50 && ratio <= 2.0 {
        (RestockPriority::High, RestockReason::VeryFastSeller)
    } else if ratio <= 1.5 && total_sold >= 10 {
        (RestockPriority::Medium, RestockReason::LowStockWithDemand)
    } else if ratio <= 2.0 && avg > 0.0 {
        (RestockPriority::Medium, RestockReason::DecliningStock)
    } else if total_sold > 0 && total_sold < 10 {
        (RestockPriority::Low, RestockReason::SlowSeller)
    } else if avg == 0.0 && current_stock > min_stock_level {
        (RestockPriority::Low, RestockReason::NoRecentDemand)
    } else {
        (RestockPriority::Medium, RestockReason::MaintainPerDemand)
    }
}

/// Units to order to reach the target stock.
pub fn recommended_quantity(current_stock: i64, min_stock_level: i64, total_sold: i64) -> i64 {
    let avg = total_sold as f64 / WINDOW_DAYS as f64;
    let lead_time_demand = avg * LEAD_TIME_DAYS;

    let safety_stock = if avg > 0.0 {
        (lead_time_demand * SAFETY_MULTIPLIER).ceil()
    } else {
        min_stock_level as f64
    };

    let target = ((min_stock_level * 2) as f64).max(lead_time_demand + safety_stock);
    (target - current_stock as f64).ceil().max(0.0) as i64
}

/// Assesses a single product.
pub fn assess(product: &Product, total_sold: i64) -> RestockItem {
    let (priority, reason) = classify(product.stock, product.min_stock_level, total_sold);
    RestockItem {
        product_id: product.id.clone(),
        sku: product.sku.clone(),
        name: product.name.clone(),
        current_stock: product.stock,
        min_stock_level: product.min_stock_level,
        total_sold,
        avg_daily_sales: total_sold as f64 / WINDOW_DAYS as f64,
        recommended_qty: recommended_quantity(
            product.stock,
            product.min_stock_level,
            total_sold,
        ),
        priority,
        reason,
        message: reason.message().to_string(),
    }
}

/// Builds the report over active products.
///
/// `sold` maps product id to units sold over the window; missing entries
/// mean no sales.
pub fn recommend(products: &[Product], sold: &HashMap<String, i64>) -> RestockReport {
    let mut report = RestockReport::default();

    for product in products.iter().filter(|p| p.is_active) {
        let total_sold = sold.get(&product.id).copied().unwrap_or(0);
        let item = assess(product, total_sold);

        if item.recommended_qty == 0 && item.priority != RestockPriority::High {
            continue;
        }

        report.summary.total_recommended_units += item.recommended_qty;
        match item.priority {
            RestockPriority::High => report.high.push(item),
            RestockPriority::Medium => report.medium.push(item),
            RestockPriority::Low => report.low.push(item),
        }
    }

    for group in [&mut report.high, &mut report.medium, &mut report.low] {
        group.sort_by(|a, b| {
            b.recommended_qty
                .cmp(&a.recommended_qty)
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    report.summary.high = report.high.len();
    report.summary.medium = report.medium.len();
    report.summary.low = report.low.len();
    report
}
