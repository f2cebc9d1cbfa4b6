//! # Purchase Commands
//!
//! Supplier deliveries: stock goes up and each product's purchase price is
//! replaced by the delivery price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use shopkeep_core::{
    DateRange, NewPurchase, Purchase, PurchaseItem, PurchaseLineRequest, PurchaseStatus,
};
use shopkeep_db::Database;

/// `{ productId, quantity, purchasePriceCents }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLineInput {
    pub product_id: String,
    pub quantity: i64,
    pub purchase_price_cents: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInput {
    pub items: Vec<PurchaseLineInput>,
    pub supplier: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItemDto {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub purchase_price_cents: i64,
    pub subtotal_cents: i64,
}

impl From<PurchaseItem> for PurchaseItemDto {
    fn from(item: PurchaseItem) -> Self {
        PurchaseItemDto {
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            purchase_price_cents: item.purchase_price_cents,
            subtotal_cents: item.subtotal_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseDto {
    pub id: String,
    pub purchase_number: String,
    pub items: Vec<PurchaseItemDto>,
    pub supplier: Option<String>,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub status: PurchaseStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<Purchase> for PurchaseDto {
    fn from(p: Purchase) -> Self {
        PurchaseDto {
            id: p.id,
            purchase_number: p.purchase_number,
            items: p.items.into_iter().map(PurchaseItemDto::from).collect(),
            supplier: p.supplier,
            total_cents: p.total_cents,
            notes: p.notes,
            status: p.status,
            created_by: p.created_by,
            created_at: p.created_at,
        }
    }
}

pub async fn create_purchase(
    db: &Database,
    actor: &str,
    input: PurchaseInput,
) -> Result<PurchaseDto, ApiError> {
    debug!(lines = input.items.len(), supplier = ?input.supplier, "create_purchase command");

    let purchase = db
        .purchases()
        .create(NewPurchase {
            items: input
                .items
                .into_iter()
                .map(|line| PurchaseLineRequest {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    purchase_price_cents: line.purchase_price_cents,
                })
                .collect(),
            supplier: input.supplier,
            notes: input.notes,
            created_by: actor.to_string(),
        })
        .await?;
    Ok(purchase.into())
}

pub async fn get_purchase_by_number(
    db: &Database,
    purchase_number: &str,
) -> Result<PurchaseDto, ApiError> {
    db.purchases()
        .get_by_number(purchase_number)
        .await?
        .map(PurchaseDto::from)
        .ok_or_else(|| ApiError::not_found("Purchase", purchase_number))
}

/// Purchases in `range` (all time when absent), newest first.
pub async fn list_purchases(
    db: &Database,
    range: Option<DateRange>,
    limit: Option<u32>,
) -> Result<Vec<PurchaseDto>, ApiError> {
    let purchases = db
        .purchases()
        .list(range, Some(limit.unwrap_or(50).clamp(1, 500)))
        .await?;
    Ok(purchases.into_iter().map(PurchaseDto::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::product::{create_product, get_product, CreateProductInput};
    use crate::error::ErrorCode;
    use shopkeep_db::DbConfig;

    #[tokio::test]
    async fn test_purchase_command() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let flour = create_product(
            &db,
            CreateProductInput {
                sku: "FLOUR-1KG".into(),
                name: "Flour 1kg".into(),
                purchase_price_cents: Some(80),
                stock: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let purchase = create_purchase(
            &db,
            "manager",
            PurchaseInput {
                items: vec![PurchaseLineInput {
                    product_id: flour.id.clone(),
                    quantity: 50,
                    purchase_price_cents: 90,
                }],
                supplier: Some("Mill & Co".into()),
                notes: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(purchase.total_cents, 4500);
        assert_eq!(purchase.created_by, "manager");

        let after = get_product(&db, &flour.id).await.unwrap();
        assert_eq!(after.stock, 52);
        assert_eq!(after.purchase_price_cents, 90);

        let fetched = get_purchase_by_number(&db, &purchase.purchase_number)
            .await
            .unwrap();
        assert_eq!(fetched.id, purchase.id);
        assert_eq!(list_purchases(&db, None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_purchase_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = create_purchase(&db, "manager", PurchaseInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
