//! # Product Repository
//!
//! Catalog storage and the stock ledger.
//!
//! ## Stock Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              The ONLY statements that write products.stock              │
//! │                                                                         │
//! │  ADD        UPDATE products SET stock = stock + ?2 WHERE id = ?1        │
//! │  SET        UPDATE products SET stock = ?2        WHERE id = ?1        │
//! │  SUBTRACT   UPDATE products SET stock = stock - ?2                     │
//! │             WHERE id = ?1 AND stock >= ?2       ← floor in the WHERE   │
//! │                                                                         │
//! │  Two registers selling the last unit:                                  │
//! │     A: stock 1 → 0   (1 row affected)                                  │
//! │     B: WHERE stock >= 1 fails → 0 rows → InsufficientStock            │
//! │                                                                         │
//! │  Backed by CHECK (stock >= 0) in the schema.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`apply_stock`] runs on the caller's connection, so sales, exchanges,
//! returns and purchases fold their stock movements into their own
//! transaction.
//!
//! ## FTS5 Search
//! `products_fts` indexes sku, name and barcode. Each search word becomes a
//! quoted prefix term (`"cola"*`), so user input can't inject FTS syntax.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use shopkeep_core::validation::{
    validate_ledger_quantity, validate_new_product, validate_product_patch,
    validate_search_query, validate_sku,
};
use shopkeep_core::{CoreError, NewProduct, Product, ProductPatch, StockOperation};

/// `SELECT` over every product column, for `query_as::<_, Product>`.
macro_rules! select_products {
    () => {
        "SELECT id, sku, barcode, name, category, purchase_price_cents, sale_price_cents, \
         stock, min_stock_level, unit, is_active, created_at, updated_at FROM products"
    };
}

pub(crate) use select_products;

// =============================================================================
// Connection-level helpers (used inside other repositories' transactions)
// =============================================================================

pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(concat!(select_products!(), " WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(product)
}

pub(crate) async fn require_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    fetch_product(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

/// Applies one ledger operation on `conn`.
///
/// Only `stock` is written. A SUBTRACT that would go below zero changes
/// nothing and fails with `InsufficientStock`.
pub(crate) async fn apply_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    op: StockOperation,
    quantity: i64,
) -> DbResult<()> {
    let sql = match op {
        StockOperation::Add => "UPDATE products SET stock = stock + ?2 WHERE id = ?1",
        StockOperation::Set => "UPDATE products SET stock = ?2 WHERE id = ?1",
        StockOperation::Subtract => {
            "UPDATE products SET stock = stock - ?2 WHERE id = ?1 AND stock >= ?2"
        }
    };

    let result = sqlx::query(sql)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 1 {
        debug!(product_id = %product_id, ?op, quantity, "Stock adjusted");
        return Ok(());
    }

    // Zero rows: either the product is missing or the floor guard refused.
    let current: Option<(String, i64)> =
        sqlx::query_as("SELECT sku, stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    match current {
        None => Err(DbError::not_found("Product", product_id)),
        Some((sku, available)) => {
            warn!(sku = %sku, available, requested = quantity, "Stock subtract refused");
            Err(CoreError::InsufficientStock {
                sku,
                available,
                requested: quantity,
            }
            .into())
        }
    }
}

/// Trimmed barcode, with a blank one treated as absent.
///
/// Applied before validation so dedup lookups and the stored column agree
/// with [`ProductRepository::get_by_barcode`].
fn normalize_barcode(barcode: Option<String>) -> Option<String> {
    barcode
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
}

/// Builds an FTS5 MATCH expression: every word becomes a quoted prefix term.
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| format!("\"{}\"*", word.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog operations and the stock ledger.
///
/// ## Usage
/// ```rust,ignore
/// let soap = db.products().create(NewProduct { sku: "SOAP-01".into(), .. }).await?;
/// let soap = db.products().adjust_stock(&soap.id, StockOperation::Add, 24).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Catalog intake with deduplication.
    ///
    /// ## Flow (one transaction)
    /// ```text
    /// INSERT … ON CONFLICT DO NOTHING
    ///      │
    ///      ├── inserted ──────────────► new product, stock = dto.stock
    ///      │
    ///      └── sku/barcode taken
    ///            │
    ///            ▼
    ///      existing = by sku, else by barcode
    ///            │
    ///            ▼
    ///      overwrite fields present in dto, ledger ADD dto.stock
    /// ```
    ///
    /// The insert goes first so the transaction holds the write lock from its
    /// first statement.
    pub async fn create(&self, dto: NewProduct) -> DbResult<Product> {
        let dto = NewProduct {
            barcode: normalize_barcode(dto.barcode),
            ..dto
        };
        validate_new_product(&dto)?;

        let sku = dto.sku.trim().to_string();
        let stock = dto.stock.unwrap_or(0);
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        debug!(sku = %sku, "Creating product");

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, category,
                purchase_price_cents, sale_price_cents, stock, min_stock_level,
                unit, is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?12
            )
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&sku)
        .bind(&dto.barcode)
        .bind(dto.name.trim())
        .bind(&dto.category)
        .bind(dto.purchase_price_cents.unwrap_or(0))
        .bind(dto.sale_price_cents.unwrap_or(0))
        .bind(stock)
        .bind(dto.min_stock_level.unwrap_or(0))
        .bind(dto.unit.as_deref().unwrap_or("pcs"))
        .bind(dto.is_active.unwrap_or(true))
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            let product = require_product(&mut tx, &id).await?;
            tx.commit().await?;
            info!(sku = %product.sku, id = %product.id, "Product created");
            return Ok(product);
        }

        // SKU match wins over barcode match.
        let mut existing = sqlx::query_as::<_, Product>(concat!(select_products!(), " WHERE sku = ?1"))
            .bind(&sku)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_none() {
            if let Some(barcode) = dto.barcode.as_deref() {
                existing =
                    sqlx::query_as::<_, Product>(concat!(select_products!(), " WHERE barcode = ?1"))
                        .bind(barcode)
                        .fetch_optional(&mut *tx)
                        .await?;
            }
        }
        let existing = existing.ok_or_else(|| DbError::duplicate("sku", &sku))?;

        sqlx::query(
            r#"
            UPDATE products SET
                barcode = COALESCE(?2, barcode),
                name = ?3,
                category = COALESCE(?4, category),
                purchase_price_cents = COALESCE(?5, purchase_price_cents),
                sale_price_cents = COALESCE(?6, sale_price_cents),
                min_stock_level = COALESCE(?7, min_stock_level),
                unit = COALESCE(?8, unit),
                is_active = COALESCE(?9, is_active),
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&existing.id)
        .bind(&dto.barcode)
        .bind(dto.name.trim())
        .bind(&dto.category)
        .bind(dto.purchase_price_cents)
        .bind(dto.sale_price_cents)
        .bind(dto.min_stock_level)
        .bind(&dto.unit)
        .bind(dto.is_active)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if stock > 0 {
            apply_stock(&mut tx, &existing.id, StockOperation::Add, stock).await?;
        }

        let product = require_product(&mut tx, &existing.id).await?;
        tx.commit().await?;

        info!(
            sku = %product.sku,
            id = %product.id,
            added = stock,
            stock = product.stock,
            "Product merged into existing record"
        );
        Ok(product)
    }

    /// Ledger entry point: ADD, SUBTRACT or SET and return the product.
    ///
    /// ## Errors
    /// - `ValidationError` for a non-positive ADD/SUBTRACT or a negative SET
    /// - `NotFound` for an unknown product
    /// - `InsufficientStock` when SUBTRACT would go below zero
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        op: StockOperation,
        quantity: i64,
    ) -> DbResult<Product> {
        validate_ledger_quantity(op, quantity)?;

        let mut tx = self.pool.begin().await?;
        apply_stock(&mut tx, product_id, op, quantity).await?;
        let product = require_product(&mut tx, product_id).await?;
        tx.commit().await?;

        Ok(product)
    }

    /// Searches active products using full-text search.
    ///
    /// An empty query lists active products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;

        debug!(query = %query, limit = %limit, "Searching products");

        if query.is_empty() {
            return self.list_active(limit).await;
        }

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                p.id, p.sku, p.barcode, p.name, p.category,
                p.purchase_price_cents, p.sale_price_cents, p.stock, p.min_stock_level,
                p.unit, p.is_active, p.created_at, p.updated_at
            FROM products p
            INNER JOIN products_fts fts ON p.rowid = fts.rowid
            WHERE products_fts MATCH ?1
            AND p.is_active = 1
            ORDER BY rank
            LIMIT ?2
            "#,
        )
        .bind(fts_query(&query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(concat!(
            select_products!(),
            " WHERE is_active = 1 ORDER BY name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        validate_sku(sku)?;

        let product = sqlx::query_as::<_, Product>(concat!(select_products!(), " WHERE sku = ?1"))
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its barcode.
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let product =
            sqlx::query_as::<_, Product>(concat!(select_products!(), " WHERE barcode = ?1"))
                .bind(barcode.trim())
                .fetch_optional(&self.pool)
                .await?;

        Ok(product)
    }

    /// Edits pricing and metadata. Stock is never touched here.
    pub async fn update(&self, id: &str, patch: ProductPatch) -> DbResult<Product> {
        let patch = ProductPatch {
            barcode: normalize_barcode(patch.barcode),
            ..patch
        };
        validate_product_patch(&patch)?;

        debug!(id = %id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = COALESCE(?2, name),
                barcode = COALESCE(?3, barcode),
                category = COALESCE(?4, category),
                purchase_price_cents = COALESCE(?5, purchase_price_cents),
                sale_price_cents = COALESCE(?6, sale_price_cents),
                min_stock_level = COALESCE(?7, min_stock_level),
                unit = COALESCE(?8, unit),
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(patch.name.as_deref().map(str::trim))
        .bind(&patch.barcode)
        .bind(&patch.category)
        .bind(patch.purchase_price_cents)
        .bind(patch.sale_price_cents)
        .bind(patch.min_stock_level)
        .bind(&patch.unit)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Activates or deactivates a product.
    ///
    /// Deactivation replaces deletion: historical orders keep their
    /// references, and inactive products can't be sold.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<Product> {
        debug!(id = %id, active, "Setting product active flag");

        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Active products at or below their minimum stock level.
    pub async fn list_low_stock(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(concat!(
            select_products!(),
            " WHERE is_active = 1 AND stock <= min_stock_level ORDER BY stock, name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts active products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use shopkeep_core::ErrorKind;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn soap(stock: i64) -> NewProduct {
        NewProduct {
            sku: "A1".into(),
            barcode: Some("5901234123457".into()),
            name: "Olive Soap".into(),
            category: Some("Bath".into()),
            purchase_price_cents: Some(120),
            sale_price_cents: Some(250),
            stock: Some(stock),
            min_stock_level: Some(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_same_sku_merges_stock() {
        let db = db().await;
        let repo = db.products();

        let first = repo.create(soap(5)).await.unwrap();
        assert_eq!(first.stock, 5);
        assert_eq!(first.unit, "pcs");
        assert!(first.is_active);

        let second = repo
            .create(NewProduct {
                sale_price_cents: Some(275),
                ..soap(3)
            })
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.stock, 8);
        assert_eq!(second.sale_price_cents, 275);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_merges_on_barcode() {
        let db = db().await;
        let repo = db.products();

        let first = repo.create(soap(2)).await.unwrap();
        let merged = repo
            .create(NewProduct {
                sku: "A1-NEW".into(),
                category: None,
                ..soap(4)
            })
            .await
            .unwrap();

        assert_eq!(merged.id, first.id);
        assert_eq!(merged.sku, "A1");
        assert_eq!(merged.stock, 6);
        assert_eq!(merged.category.as_deref(), Some("Bath"));
    }

    #[tokio::test]
    async fn test_barcode_whitespace_is_ignored() {
        let db = db().await;
        let repo = db.products();

        let padded = repo
            .create(NewProduct {
                sku: "A".into(),
                barcode: Some("12345 ".into()),
                name: "Padded".into(),
                stock: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(padded.barcode.as_deref(), Some("12345"));

        let merged = repo
            .create(NewProduct {
                sku: "B".into(),
                barcode: Some("12345".into()),
                name: "Padded".into(),
                stock: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(merged.id, padded.id);
        assert_eq!(merged.stock, 3);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(
            repo.get_by_barcode("12345 ").await.unwrap().unwrap().id,
            padded.id
        );

        let blank = repo
            .create(NewProduct {
                sku: "C".into(),
                barcode: Some("  ".into()),
                name: "No Code".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(blank.barcode, None);

        let updated = repo
            .update(
                &blank.id,
                ProductPatch {
                    barcode: Some(" 67890 ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.barcode.as_deref(), Some("67890"));

        let err = repo
            .update(
                &blank.id,
                ProductPatch {
                    barcode: Some("12345\t".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let db = db().await;
        let err = db
            .products()
            .create(NewProduct {
                sku: " ".into(),
                ..soap(1)
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ValidationError));

        let err = db
            .products()
            .create(NewProduct {
                sale_price_cents: Some(-1),
                ..soap(1)
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ValidationError));
    }

    #[tokio::test]
    async fn test_ledger_operations() {
        let db = db().await;
        let repo = db.products();
        let p = repo.create(soap(10)).await.unwrap();

        let p = repo.adjust_stock(&p.id, StockOperation::Subtract, 3).await.unwrap();
        assert_eq!(p.stock, 7);

        let err = repo
            .adjust_stock(&p.id, StockOperation::Subtract, 8)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock {
                available: 7,
                requested: 8,
                ..
            })
        ));
        assert_eq!(repo.get_by_id(&p.id).await.unwrap().unwrap().stock, 7);

        let p = repo.adjust_stock(&p.id, StockOperation::Add, 5).await.unwrap();
        assert_eq!(p.stock, 12);

        let p = repo.adjust_stock(&p.id, StockOperation::Set, 0).await.unwrap();
        assert_eq!(p.stock, 0);

        let err = repo
            .adjust_stock(&p.id, StockOperation::Add, 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ValidationError));

        let err = repo
            .adjust_stock(&Uuid::new_v4().to_string(), StockOperation::Add, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_ledger_leaves_updated_at_alone() {
        let db = db().await;
        let repo = db.products();
        let p = repo.create(soap(10)).await.unwrap();

        let after = repo.adjust_stock(&p.id, StockOperation::Add, 1).await.unwrap();
        assert_eq!(after.updated_at, p.updated_at);
    }

    #[tokio::test]
    async fn test_schema_rejects_negative_stock() {
        let db = db().await;
        let p = db.products().create(soap(1)).await.unwrap();

        let err: DbError = sqlx::query("UPDATE products SET stock = -1 WHERE id = ?1")
            .bind(&p.id)
            .execute(db.pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_search() {
        let db = db().await;
        let repo = db.products();
        repo.create(soap(1)).await.unwrap();
        let cola = repo
            .create(NewProduct {
                sku: "COLA-330".into(),
                barcode: None,
                name: "Cola 330ml".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let hits = repo.search("col", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, cola.id);

        assert_eq!(repo.search("590123", 10).await.unwrap().len(), 1);
        assert_eq!(repo.search("", 10).await.unwrap().len(), 2);
        assert!(repo.search("\"bad (syntax", 10).await.unwrap().is_empty());

        repo.set_active(&cola.id, false).await.unwrap();
        assert!(repo.search("cola", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_never_touches_stock() {
        let db = db().await;
        let repo = db.products();
        let p = repo.create(soap(9)).await.unwrap();

        let updated = repo
            .update(
                &p.id,
                ProductPatch {
                    name: Some("Olive Soap XL".into()),
                    min_stock_level: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Olive Soap XL");
        assert_eq!(updated.stock, 9);
        assert_eq!(updated.sale_price_cents, 250);

        let low = repo.list_low_stock().await.unwrap();
        assert_eq!(low.len(), 1);

        let missing = repo
            .update(&Uuid::new_v4().to_string(), ProductPatch::default())
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_lookup_by_codes() {
        let db = db().await;
        let repo = db.products();
        let p = repo.create(soap(1)).await.unwrap();

        assert_eq!(repo.get_by_sku("A1").await.unwrap().unwrap().id, p.id);
        assert_eq!(
            repo.get_by_barcode("5901234123457").await.unwrap().unwrap().id,
            p.id
        );
        assert!(repo.get_by_sku("B2").await.unwrap().is_none());
    }

    #[test]
    fn test_fts_query_quotes_words() {
        assert_eq!(fts_query("cola 330"), "\"cola\"* \"330\"*");
        assert_eq!(fts_query("a\"b"), "\"a\"\"b\"*");
    }
}
