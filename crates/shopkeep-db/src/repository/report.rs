//! # Report Repository
//!
//! Read-only views: sales statistics and restock recommendations.
//!
//! ## Query Plan
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settled sale = order_type 'sale', status 'completed', payment 'paid'  │
//! │                                                                         │
//! │  1. COUNT + SUM(total_cents) over settled sales in [from, to)          │
//! │  2. order_items ⋈ settled sales ⟕ products, GROUP BY product           │
//! │       → units, line revenue, CURRENT purchase price                    │
//! │  3. open debt (all time)                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The grouped rows go to `shopkeep_core::stats::summarize` and
//! `shopkeep_core::restock::recommend`; no order is hydrated.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::order::OrderRepository;
use crate::repository::product::select_products;
use shopkeep_core::restock::{recommend, RestockReport, WINDOW_DAYS};
use shopkeep_core::stats::{
    summarize, ProductAggregate, SalesStatistics, SettledTotals, StatisticsPeriod,
};
use shopkeep_core::{DateRange, Product};

/// `WHERE` clause selecting settled sales of alias `o` in `[?1, ?2)`.
macro_rules! settled_sales_in_range {
    () => {
        " o.order_type = 'sale' AND o.status = 'completed' AND o.payment_status = 'paid' \
          AND o.created_at >= ?1 AND o.created_at < ?2 "
    };
}

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    async fn settled_totals(&self, range: DateRange) -> DbResult<SettledTotals> {
        let totals = sqlx::query_as::<_, SettledTotals>(concat!(
            "SELECT COUNT(*) AS order_count, COALESCE(SUM(o.total_cents), 0) AS revenue_cents \
             FROM orders o WHERE",
            settled_sales_in_range!()
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(totals)
    }

    /// Settled-sale lines in `range` grouped by product, with each
    /// product's current purchase price.
    async fn product_aggregates(&self, range: DateRange) -> DbResult<Vec<ProductAggregate>> {
        let rows = sqlx::query_as::<_, ProductAggregate>(concat!(
            r#"
            SELECT
                i.product_id AS product_id,
                MAX(i.product_name) AS product_name,
                SUM(i.quantity) AS units_sold,
                SUM(i.subtotal_cents) AS revenue_cents,
                COALESCE(p.purchase_price_cents, 0) AS unit_cost_cents
            FROM order_items i
            INNER JOIN orders o ON o.id = i.order_id
            LEFT JOIN products p ON p.id = i.product_id
            WHERE"#,
            settled_sales_in_range!(),
            "GROUP BY i.product_id, p.purchase_price_cents"
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Revenue, cost (at current purchase prices), profit and margin.
    pub async fn statistics(&self, range: DateRange) -> DbResult<SalesStatistics> {
        debug!(from = %range.from, to = %range.to, "Computing statistics");

        let totals = self.settled_totals(range).await?;
        let products = self.product_aggregates(range).await?;
        let outstanding = OrderRepository::new(self.pool.clone())
            .outstanding_debt()
            .await?;

        Ok(summarize(range, totals, products, outstanding)?)
    }

    pub async fn statistics_for(
        &self,
        period: StatisticsPeriod,
        now: DateTime<Utc>,
    ) -> DbResult<SalesStatistics> {
        self.statistics(period.resolve(now)).await
    }

    /// Restock report over the last 30 days of settled sales.
    pub async fn restock_recommendations(&self, now: DateTime<Utc>) -> DbResult<RestockReport> {
        let window = DateRange::last_days(now, WINDOW_DAYS);
        let sold: HashMap<String, i64> = self
            .product_aggregates(window)
            .await?
            .into_iter()
            .map(|row| (row.product_id, row.units_sold))
            .collect();

        let products = sqlx::query_as::<_, Product>(concat!(
            select_products!(),
            " WHERE is_active = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        let report = recommend(&products, &sold);
        debug!(
            high = report.summary.high,
            medium = report.summary.medium,
            low = report.summary.low,
            "Restock report built"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use shopkeep_core::restock::{RestockPriority, RestockReason};
    use shopkeep_core::stats::StatisticsPeriod;
    use shopkeep_core::{
        LineRequest, NewProduct, NewPurchase, NewSaleOrder, Product, PurchaseLineRequest,
        ReturnRequest,
    };

    async fn product(db: &Database, sku: &str, cost: i64, price: i64, stock: i64, min: i64) -> Product {
        db.products()
            .create(NewProduct {
                sku: sku.into(),
                name: format!("Item {sku}"),
                purchase_price_cents: Some(cost),
                sale_price_cents: Some(price),
                stock: Some(stock),
                min_stock_level: Some(min),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn sale(product: &Product, qty: i64, is_debt: bool) -> NewSaleOrder {
        NewSaleOrder {
            items: vec![LineRequest::new(product.id.clone(), qty)],
            is_debt,
            created_by: "clerk".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_statistics_use_current_cost() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "MUG", 100, 300, 20, 2).await;

        let paid = db.orders().create_sale(sale(&p, 2, false)).await.unwrap();
        db.orders().create_sale(sale(&p, 1, true)).await.unwrap();
        db.orders()
            .create_return(ReturnRequest {
                original_order_code: paid.order_number.clone(),
                return_items: vec![LineRequest::new(p.id.clone(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let stats = db
            .reports()
            .statistics_for(StatisticsPeriod::Today, Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.order_count, 1);
        assert_eq!(stats.total_revenue_cents, 600);
        assert_eq!(stats.total_cost_cents, 200);
        assert_eq!(stats.outstanding_debt_cents, 300);

        db.purchases()
            .create(NewPurchase {
                items: vec![PurchaseLineRequest {
                    product_id: p.id.clone(),
                    quantity: 10,
                    purchase_price_cents: 150,
                }],
                created_by: "manager".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let stats = db
            .reports()
            .statistics_for(StatisticsPeriod::Last7Days, Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.total_cost_cents, 300);
        assert_eq!(stats.profit_cents, 300);
        assert!((stats.profit_margin - 50.0).abs() < 1e-9);
        assert_eq!(stats.top_products[0].units_sold, 2);
    }

    #[tokio::test]
    async fn test_statistics_group_lines_per_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mug = product(&db, "MUG", 100, 300, 10, 0).await;
        let cup = product(&db, "CUP", 50, 200, 10, 0).await;

        db.orders()
            .create_sale(NewSaleOrder {
                items: vec![
                    LineRequest::new(mug.id.clone(), 2),
                    LineRequest::new(cup.id.clone(), 1),
                ],
                tax_cents: Some(100),
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.orders().create_sale(sale(&mug, 1, false)).await.unwrap();
        let cancelled = db.orders().create_sale(sale(&cup, 4, false)).await.unwrap();
        db.orders().cancel_sale(&cancelled.id).await.unwrap();

        let stats = db
            .reports()
            .statistics_for(StatisticsPeriod::Today, Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.order_count, 2);
        assert_eq!(stats.total_revenue_cents, 1200);
        assert_eq!(stats.units_sold, 4);
        assert_eq!(stats.total_cost_cents, 350);
        assert_eq!(stats.top_products.len(), 2);
        assert_eq!(stats.top_products[0].product_id, mug.id);
        assert_eq!(stats.top_products[0].units_sold, 3);
        assert_eq!(stats.top_products[0].revenue_cents, 900);
        assert_eq!(stats.top_products[1].product_name, "Item CUP");
        assert_eq!(stats.top_products[1].revenue_cents, 200);
    }

    #[tokio::test]
    async fn test_restock_flags_fast_seller_with_low_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let fast = product(&db, "FAST", 100, 200, 33, 10).await;
        product(&db, "IDLE", 100, 200, 100, 10).await;

        db.orders().create_sale(sale(&fast, 25, false)).await.unwrap();

        let report = db.reports().restock_recommendations(Utc::now()).await.unwrap();

        assert_eq!(report.high.len(), 1);
        let item = &report.high[0];
        assert_eq!(item.sku, "FAST");
        assert_eq!(item.current_stock, 8);
        assert_eq!(item.total_sold, 25);
        assert_eq!(item.priority, RestockPriority::High);
        assert_eq!(item.reason, RestockReason::SellingFastLowStock);
        assert_eq!(item.recommended_qty, 12);

        // plenty on hand and no demand
        assert!(report.low.iter().all(|i| i.sku != "IDLE"));
        assert_eq!(report.summary.total_recommended_units, 12);
    }
}
