//! # Sales Statistics
//!
//! Revenue, cost and profit over a time window.
//!
//! Only settled sales count: SALE orders that are COMPLETED and PAID with
//! `created_at` in the half-open window. Exchanges and returns are excluded.
//!
//! The storage layer does the grouping in SQL and hands over one
//! [`SettledTotals`] plus one [`ProductAggregate`] per product sold;
//! [`summarize`] turns those into [`SalesStatistics`].
//!
//! ## Cost Basis
//! ```text
//!   cost = Σ quantity × CURRENT purchase_price of the product
//! ```
//! The frozen `cost_basis_cents` on order items is NOT used here. A later
//! purchase at a new price moves the cost of past sales as well; products
//! missing from the catalog cost zero.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::DateRange;

/// Number of products listed in [`SalesStatistics::top_products`].
pub const TOP_PRODUCTS: usize = 5;

/// Named reporting windows, resolved against a caller-supplied `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "period", rename_all = "snake_case")]
pub enum StatisticsPeriod {
    /// Current UTC day.
    Today,
    Last7Days,
    Last30Days,
    /// From January 1st (UTC) through the end of today.
    ThisYear,
    Custom { range: DateRange },
}

impl StatisticsPeriod {
    pub fn resolve(&self, now: DateTime<Utc>) -> DateRange {
        let today = now.date_naive();
        let midnight = today.and_time(NaiveTime::MIN).and_utc();
        let tomorrow = midnight + Duration::days(1);

        match self {
            StatisticsPeriod::Today => DateRange::new(midnight, tomorrow),
            StatisticsPeriod::Last7Days => DateRange::last_days(now, 7),
            StatisticsPeriod::Last30Days => DateRange::last_days(now, 30),
            StatisticsPeriod::ThisYear => {
                let jan_first = midnight - Duration::days(i64::from(today.ordinal0()));
                DateRange::new(jan_first, tomorrow)
            }
            StatisticsPeriod::Custom { range } => *range,
        }
    }
}

/// Units and revenue of one product in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductSales {
    pub product_id: String,
    pub product_name: String,
    pub units_sold: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesStatistics {
    pub range: DateRange,
    pub order_count: i64,
    pub units_sold: i64,
    pub total_revenue_cents: i64,
    pub total_cost_cents: i64,
    pub profit_cents: i64,
    /// `profit / revenue × 100`, 0 when there is no revenue.
    pub profit_margin: f64,
    /// Open debt across all time, not limited to the window.
    pub outstanding_debt_cents: i64,
    pub top_products: Vec<ProductSales>,
}

/// Order count and revenue of the settled sales in a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SettledTotals {
    pub order_count: i64,
    pub revenue_cents: i64,
}

/// One product's settled-sale lines in a window, grouped.
///
/// `unit_cost_cents` is the product's purchase price as of now, 0 when the
/// product no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductAggregate {
    pub product_id: String,
    pub product_name: String,
    pub units_sold: i64,
    pub revenue_cents: i64,
    pub unit_cost_cents: i64,
}

/// Builds the statistics from pre-grouped rows.
///
/// ## Errors
/// `ValidationError::Overflow` when cost or unit totals leave `i64`.
pub fn summarize(
    range: DateRange,
    totals: SettledTotals,
    products: Vec<ProductAggregate>,
    outstanding_debt: Money,
) -> CoreResult<SalesStatistics> {
    let revenue = Money::from_cents(totals.revenue_cents);
    let mut cost = Money::zero();
    let mut units: i64 = 0;
    let mut top_products = Vec::with_capacity(products.len());

    for row in products {
        let line_cost = Money::from_cents(row.unit_cost_cents)
            .checked_multiply_quantity(row.units_sold)
            .and_then(|c| cost.checked_add(c))
            .ok_or_else(|| ValidationError::overflow("total_cost"))?;
        cost = line_cost;
        units = units
            .checked_add(row.units_sold)
            .ok_or_else(|| ValidationError::overflow("units_sold"))?;

        top_products.push(ProductSales {
            product_id: row.product_id,
            product_name: row.product_name,
            units_sold: row.units_sold,
            revenue_cents: row.revenue_cents,
        });
    }

    top_products.sort_by(|a, b| {
        b.units_sold
            .cmp(&a.units_sold)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    top_products.truncate(TOP_PRODUCTS);

    let profit = revenue
        .checked_sub(cost)
        .ok_or_else(|| ValidationError::overflow("profit"))?;

    Ok(SalesStatistics {
        range,
        order_count: totals.order_count,
        units_sold: units,
        total_revenue_cents: revenue.cents(),
        total_cost_cents: cost.cents(),
        profit_cents: profit.cents(),
        profit_margin: profit.percentage_of(revenue),
        outstanding_debt_cents: outstanding_debt.cents(),
        top_products,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn row(product: &str, units: i64, revenue: i64, unit_cost: i64) -> ProductAggregate {
        ProductAggregate {
            product_id: product.to_string(),
            product_name: product.to_uppercase(),
            units_sold: units,
            revenue_cents: revenue,
            unit_cost_cents: unit_cost,
        }
    }

    #[test]
    fn test_summarize_uses_current_costs() {
        let range = DateRange::new(at(1, 0), at(10, 0));
        let totals = SettledTotals {
            order_count: 2,
            revenue_cents: 2000,
        };
        // product b is gone from the catalog, so it costs nothing
        let rows = vec![row("b", 1, 1000, 0), row("a", 2, 1000, 300)];

        let stats = summarize(range, totals, rows, Money::from_cents(4500)).unwrap();
        assert_eq!(stats.order_count, 2);
        assert_eq!(stats.units_sold, 3);
        assert_eq!(stats.total_revenue_cents, 2000);
        assert_eq!(stats.total_cost_cents, 600);
        assert_eq!(stats.profit_cents, 1400);
        assert!((stats.profit_margin - 70.0).abs() < 1e-9);
        assert_eq!(stats.outstanding_debt_cents, 4500);
        assert_eq!(stats.top_products[0].product_id, "a");
        assert_eq!(stats.top_products[0].units_sold, 2);
    }

    #[test]
    fn test_zero_revenue_has_zero_margin() {
        let range = DateRange::new(at(1, 0), at(2, 0));
        let stats = summarize(range, SettledTotals::default(), Vec::new(), Money::zero()).unwrap();
        assert_eq!(stats.profit_margin, 0.0);
        assert!(stats.top_products.is_empty());
    }

    #[test]
    fn test_top_products_are_capped_and_ordered() {
        let range = DateRange::new(at(1, 0), at(2, 0));
        let rows = vec![
            row("f", 1, 10, 0),
            row("e", 3, 10, 0),
            row("d", 3, 10, 0),
            row("c", 7, 10, 0),
            row("b", 2, 10, 0),
            row("a", 1, 10, 0),
        ];
        let stats = summarize(range, SettledTotals::default(), rows, Money::zero()).unwrap();
        let ids: Vec<&str> = stats.top_products.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, ["c", "d", "e", "b", "a"]);
        assert_eq!(stats.units_sold, 17);
    }

    #[test]
    fn test_oversized_cost_is_an_error() {
        let range = DateRange::new(at(1, 0), at(2, 0));
        let rows = vec![row("a", 3, 10, i64::MAX / 2)];
        let err = summarize(range, SettledTotals::default(), rows, Money::zero()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_period_resolution() {
        let now = at(15, 13);
        let today = StatisticsPeriod::Today.resolve(now);
        assert_eq!(today.from, at(15, 0));
        assert_eq!(today.to, at(16, 0));

        let week = StatisticsPeriod::Last7Days.resolve(now);
        assert_eq!(week.from, at(8, 13));
        assert_eq!(week.to, now);

        let year = StatisticsPeriod::ThisYear.resolve(now);
        assert_eq!(year.from, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert!(year.contains(now));
    }
}
