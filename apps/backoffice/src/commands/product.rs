//! # Product Commands
//!
//! Catalog maintenance, search and the stock ledger.
//!
//! ## Search Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Product Search Flow                                  │
//! │                                                                         │
//! │  search_products("5901234567890")                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌───────────────────────────────────────────┐                         │
//! │  │  Is query a barcode? (8-14 digits)        │                         │
//! │  │  YES: Try exact barcode lookup first      │──► Found? Return [1]    │
//! │  │  NO:  Use FTS5 full-text search           │                         │
//! │  └───────────────────────────────────────────┘                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  FTS5 prefix query, ordered by rank                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::ApiError;
use shopkeep_core::{NewProduct, Product, ProductPatch, StockOperation};
use shopkeep_db::Database;

/// Product DTO for API callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub id: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub purchase_price_cents: i64,
    pub sale_price_cents: i64,
    pub stock: i64,
    pub min_stock_level: i64,
    pub unit: String,
    pub is_active: bool,
    /// `stock <= minStockLevel`
    pub is_low_stock: bool,
}

impl From<Product> for ProductDto {
    fn from(p: Product) -> Self {
        ProductDto {
            is_low_stock: p.is_low_stock(),
            id: p.id,
            sku: p.sku,
            barcode: p.barcode,
            name: p.name,
            category: p.category,
            purchase_price_cents: p.purchase_price_cents,
            sale_price_cents: p.sale_price_cents,
            stock: p.stock,
            min_stock_level: p.min_stock_level,
            unit: p.unit,
            is_active: p.is_active,
        }
    }
}

/// Input for [`create_product`]. An existing SKU or barcode is merged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductInput {
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub sale_price_cents: Option<i64>,
    pub stock: Option<i64>,
    pub min_stock_level: Option<i64>,
    pub unit: Option<String>,
    pub is_active: Option<bool>,
}

impl From<CreateProductInput> for NewProduct {
    fn from(input: CreateProductInput) -> Self {
        NewProduct {
            sku: input.sku,
            barcode: input.barcode,
            name: input.name,
            category: input.category,
            purchase_price_cents: input.purchase_price_cents,
            sale_price_cents: input.sale_price_cents,
            stock: input.stock,
            min_stock_level: input.min_stock_level,
            unit: input.unit,
            is_active: input.is_active,
        }
    }
}

/// Input for [`update_product`]. Stock is not editable here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub sale_price_cents: Option<i64>,
    pub min_stock_level: Option<i64>,
    pub unit: Option<String>,
}

impl From<UpdateProductInput> for ProductPatch {
    fn from(input: UpdateProductInput) -> Self {
        ProductPatch {
            name: input.name,
            barcode: input.barcode,
            category: input.category,
            purchase_price_cents: input.purchase_price_cents,
            sale_price_cents: input.sale_price_cents,
            min_stock_level: input.min_stock_level,
            unit: input.unit,
        }
    }
}

/// `{ productId, op: "add" | "subtract" | "set", quantity }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockInput {
    pub product_id: String,
    pub op: String,
    pub quantity: i64,
}

/// Checks if a query looks like a barcode (EAN-8 to GTIN-14).
fn is_barcode_query(query: &str) -> bool {
    let len = query.len();
    (8..=14).contains(&len) && query.chars().all(|c| c.is_ascii_digit())
}

/// Searches products by SKU, name or barcode.
///
/// ## Arguments
/// * `query` - Search term; empty lists active products by name
/// * `limit` - Maximum results to return (default: 20, max: 100)
pub async fn search_products(
    db: &Database,
    query: &str,
    limit: Option<u32>,
) -> Result<Vec<ProductDto>, ApiError> {
    let start = Instant::now();
    let query = query.trim();
    let limit = limit.unwrap_or(20).clamp(1, 100);

    debug!(query = %query, limit = %limit, "search_products command");

    if is_barcode_query(query) {
        if let Some(product) = db.products().get_by_barcode(query).await? {
            info!(
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "search_products barcode lookup"
            );
            return Ok(vec![ProductDto::from(product)]);
        }
        debug!("Barcode not found, falling back to FTS search");
    }

    let products = db.products().search(query, limit).await?;
    let dtos: Vec<ProductDto> = products.into_iter().map(ProductDto::from).collect();

    info!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        count = dtos.len(),
        query = %query,
        "search_products FTS complete"
    );
    Ok(dtos)
}

pub async fn get_product(db: &Database, id: &str) -> Result<ProductDto, ApiError> {
    debug!(id = %id, "get_product command");
    db.products()
        .get_by_id(id)
        .await?
        .map(ProductDto::from)
        .ok_or_else(|| ApiError::not_found("Product", id))
}

pub async fn get_product_by_sku(db: &Database, sku: &str) -> Result<ProductDto, ApiError> {
    debug!(sku = %sku, "get_product_by_sku command");
    db.products()
        .get_by_sku(sku)
        .await?
        .map(ProductDto::from)
        .ok_or_else(|| ApiError::not_found("Product", sku))
}

/// Creates a product, or merges into the one holding the same SKU/barcode.
pub async fn create_product(
    db: &Database,
    input: CreateProductInput,
) -> Result<ProductDto, ApiError> {
    debug!(sku = %input.sku, "create_product command");
    let product = db.products().create(input.into()).await?;
    Ok(product.into())
}

pub async fn update_product(
    db: &Database,
    id: &str,
    input: UpdateProductInput,
) -> Result<ProductDto, ApiError> {
    debug!(id = %id, "update_product command");
    let product = db.products().update(id, input.into()).await?;
    Ok(product.into())
}

/// Deactivates or reactivates a product. Products are never deleted.
pub async fn set_product_active(
    db: &Database,
    id: &str,
    active: bool,
) -> Result<ProductDto, ApiError> {
    debug!(id = %id, active, "set_product_active command");
    let product = db.products().set_active(id, active).await?;
    Ok(product.into())
}

/// Applies a ledger operation.
pub async fn adjust_stock(db: &Database, input: AdjustStockInput) -> Result<ProductDto, ApiError> {
    let op: StockOperation = input.op.parse()?;
    debug!(product_id = %input.product_id, ?op, quantity = input.quantity, "adjust_stock command");

    let product = db
        .products()
        .adjust_stock(&input.product_id, op, input.quantity)
        .await?;
    Ok(product.into())
}

pub async fn low_stock_products(db: &Database) -> Result<Vec<ProductDto>, ApiError> {
    let products = db.products().list_low_stock().await?;
    Ok(products.into_iter().map(ProductDto::from).collect())
}
