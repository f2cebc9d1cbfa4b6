//! # Report Commands
//!
//! Sales statistics and restock recommendations. Read-only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use shopkeep_core::restock::{RestockItem, RestockPriority, RestockReport};
use shopkeep_core::stats::{ProductSales, SalesStatistics, StatisticsPeriod};
use shopkeep_db::Database;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSalesDto {
    pub product_id: String,
    pub product_name: String,
    pub units_sold: i64,
    pub revenue_cents: i64,
}

impl From<ProductSales> for ProductSalesDto {
    fn from(p: ProductSales) -> Self {
        ProductSalesDto {
            product_id: p.product_id,
            product_name: p.product_name,
            units_sold: p.units_sold,
            revenue_cents: p.revenue_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsDto {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub order_count: i64,
    pub units_sold: i64,
    pub total_revenue_cents: i64,
    pub total_cost_cents: i64,
    pub profit_cents: i64,
    /// Percent, two decimals.
    pub profit_margin: f64,
    pub outstanding_debt_cents: i64,
    pub top_products: Vec<ProductSalesDto>,
}

impl From<SalesStatistics> for StatisticsDto {
    fn from(s: SalesStatistics) -> Self {
        StatisticsDto {
            from: s.range.from,
            to: s.range.to,
            order_count: s.order_count,
            units_sold: s.units_sold,
            total_revenue_cents: s.total_revenue_cents,
            total_cost_cents: s.total_cost_cents,
            profit_cents: s.profit_cents,
            profit_margin: (s.profit_margin * 100.0).round() / 100.0,
            outstanding_debt_cents: s.outstanding_debt_cents,
            top_products: s.top_products.into_iter().map(ProductSalesDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockItemDto {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub min_stock_level: i64,
    pub total_sold: i64,
    pub avg_daily_sales: f64,
    pub recommended_qty: i64,
    pub priority: RestockPriority,
    pub message: String,
}

impl From<RestockItem> for RestockItemDto {
    fn from(item: RestockItem) -> Self {
        RestockItemDto {
            product_id: item.product_id,
            sku: item.sku,
            name: item.name,
            current_stock: item.current_stock,
            min_stock_level: item.min_stock_level,
            total_sold: item.total_sold,
            avg_daily_sales: (item.avg_daily_sales * 100.0).round() / 100.0,
            recommended_qty: item.recommended_qty,
            priority: item.priority,
            message: item.message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockSummaryDto {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total_recommended_units: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockReportDto {
    pub high: Vec<RestockItemDto>,
    pub medium: Vec<RestockItemDto>,
    pub low: Vec<RestockItemDto>,
    pub summary: RestockSummaryDto,
}

impl From<RestockReport> for RestockReportDto {
    fn from(report: RestockReport) -> Self {
        RestockReportDto {
            high: report.high.into_iter().map(RestockItemDto::from).collect(),
            medium: report.medium.into_iter().map(RestockItemDto::from).collect(),
            low: report.low.into_iter().map(RestockItemDto::from).collect(),
            summary: RestockSummaryDto {
                high: report.summary.high,
                medium: report.summary.medium,
                low: report.summary.low,
                total_recommended_units: report.summary.total_recommended_units,
            },
        }
    }
}

/// Statistics for a named period, resolved against the current time.
pub async fn get_statistics(
    db: &Database,
    period: StatisticsPeriod,
) -> Result<StatisticsDto, ApiError> {
    debug!(?period, "get_statistics command");

    if let StatisticsPeriod::Custom { range } = period {
        if range.from >= range.to {
            return Err(ApiError::validation("'from' must be before 'to'"));
        }
    }

    let stats = db.reports().statistics_for(period, Utc::now()).await?;
    info!(
        orders = stats.order_count,
        revenue = stats.total_revenue_cents,
        "Statistics computed"
    );
    Ok(stats.into())
}

pub async fn restock_report(db: &Database) -> Result<RestockReportDto, ApiError> {
    debug!("restock_report command");
    let report = db.reports().restock_recommendations(Utc::now()).await?;
    Ok(report.into())
}
