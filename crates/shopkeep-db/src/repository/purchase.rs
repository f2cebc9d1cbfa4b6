//! # Purchase Repository
//!
//! Supplier intake. A purchase adds stock through the ledger and refreshes
//! each product's purchase price, which later statistics use as the cost
//! basis.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::product::{apply_stock, require_product};
use crate::repository::sequence::next_document_number;
use shopkeep_core::numbering::DocumentKind;
use shopkeep_core::validation::validate_purchase_request;
use shopkeep_core::{
    CoreError, DateRange, Money, NewPurchase, Purchase, PurchaseItem, PurchaseStatus,
    StockOperation, ValidationError,
};

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: String,
    purchase_number: String,
    supplier: Option<String>,
    total_cents: i64,
    notes: Option<String>,
    status: PurchaseStatus,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl PurchaseRow {
    fn into_purchase(self, items: Vec<PurchaseItem>) -> Purchase {
        Purchase {
            id: self.id,
            purchase_number: self.purchase_number,
            items,
            supplier: self.supplier,
            total_cents: self.total_cents,
            notes: self.notes,
            status: self.status,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

macro_rules! select_purchases {
    () => {
        "SELECT id, purchase_number, supplier, total_cents, notes, status, created_by, \
         created_at FROM purchases"
    };
}

async fn load_items(conn: &mut SqliteConnection, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
    let items = sqlx::query_as::<_, PurchaseItem>(
        r#"
        SELECT id, purchase_id, product_id, product_name, quantity,
               purchase_price_cents, subtotal_cents
        FROM purchase_items
        WHERE purchase_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(purchase_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Repository for purchase operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Records a completed delivery.
    ///
    /// ## Steps (one transaction)
    /// 1. Allocate `PUR` number
    /// 2. Per line: ledger ADD, set the product's purchase price
    /// 3. Insert purchase and items
    pub async fn create(&self, request: NewPurchase) -> DbResult<Purchase> {
        validate_purchase_request(&request)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let purchase_number =
            next_document_number(&mut tx, DocumentKind::Purchase, now.date_naive()).await?;
        let id = Uuid::new_v4().to_string();

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = require_product(&mut tx, &line.product_id).await?;
            apply_stock(&mut tx, &product.id, StockOperation::Add, line.quantity).await?;

            sqlx::query(
                "UPDATE products SET purchase_price_cents = ?2, updated_at = ?3 WHERE id = ?1",
            )
            .bind(&product.id)
            .bind(line.purchase_price_cents)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            items.push(PurchaseItem {
                id: Uuid::new_v4().to_string(),
                purchase_id: id.clone(),
                product_id: product.id,
                product_name: product.name,
                quantity: line.quantity,
                purchase_price_cents: line.purchase_price_cents,
                subtotal_cents: Money::from_cents(line.purchase_price_cents)
                    .checked_multiply_quantity(line.quantity)
                    .ok_or_else(|| CoreError::from(ValidationError::overflow("subtotal")))?
                    .cents(),
            });
        }

        let total = Money::checked_sum(
            items
                .iter()
                .map(|item| Money::from_cents(item.subtotal_cents)),
        )
        .ok_or_else(|| CoreError::from(ValidationError::overflow("total")))?;

        let purchase = Purchase {
            id,
            purchase_number,
            items,
            supplier: request.supplier,
            total_cents: total.cents(),
            notes: request.notes,
            status: PurchaseStatus::Completed,
            created_by: request.created_by,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, purchase_number, supplier, total_cents, notes, status,
                created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.purchase_number)
        .bind(&purchase.supplier)
        .bind(purchase.total_cents)
        .bind(&purchase.notes)
        .bind(purchase.status)
        .bind(&purchase.created_by)
        .bind(purchase.created_at)
        .execute(&mut *tx)
        .await?;

        for item in &purchase.items {
            sqlx::query(
                r#"
                INSERT INTO purchase_items (
                    id, purchase_id, product_id, product_name, quantity,
                    purchase_price_cents, subtotal_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&item.purchase_id)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.purchase_price_cents)
            .bind(item.subtotal_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            purchase_number = %purchase.purchase_number,
            lines = purchase.items.len(),
            total = purchase.total_cents,
            "Purchase recorded"
        );
        Ok(purchase)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Purchase>> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query_as::<_, PurchaseRow>(concat!(select_purchases!(), " WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                let items = load_items(&mut conn, &row.id).await?;
                Ok(Some(row.into_purchase(items)))
            }
            None => Ok(None),
        }
    }

    pub async fn get_by_number(&self, purchase_number: &str) -> DbResult<Option<Purchase>> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query_as::<_, PurchaseRow>(concat!(
            select_purchases!(),
            " WHERE purchase_number = ?1"
        ))
        .bind(purchase_number)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let items = load_items(&mut conn, &row.id).await?;
                Ok(Some(row.into_purchase(items)))
            }
            None => Ok(None),
        }
    }

    /// Lists purchases, newest first, optionally within a date range.
    pub async fn list(&self, range: Option<DateRange>, limit: Option<u32>) -> DbResult<Vec<Purchase>> {
        debug!(?range, ?limit, "Listing purchases");
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, PurchaseRow>(concat!(
            select_purchases!(),
            r#"
            WHERE (?1 IS NULL OR created_at >= ?1)
              AND (?2 IS NULL OR created_at < ?2)
            ORDER BY created_at DESC, purchase_number DESC
            LIMIT ?3
            "#
        ))
        .bind(range.map(|r| r.from))
        .bind(range.map(|r| r.to))
        .bind(limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&mut *conn)
        .await?;

        let mut purchases = Vec::with_capacity(rows.len());
        for row in rows {
            let items = load_items(&mut conn, &row.id).await?;
            purchases.push(row.into_purchase(items));
        }
        Ok(purchases)
    }
}
