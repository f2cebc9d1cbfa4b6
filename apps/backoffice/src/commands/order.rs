//! # Order Commands
//!
//! Sales, debt settlement, exchanges, returns and cancellation.
//!
//! ## Command Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Order Commands                                       │
//! │                                                                         │
//! │  create_sale(SaleInput)        ──► ORD… (PAID, or DEBT if isDebt)      │
//! │  pay_debt(orderId)             ──► DEBT → PAID                         │
//! │  create_exchange(ExchangeInput)──► EX…  + settlement difference        │
//! │  create_return(ReturnInput)    ──► RF…  (negative total)               │
//! │  cancel_sale(orderId)          ──► CANCELLED, items restocked          │
//! │                                                                         │
//! │  Each call is one database transaction; on error nothing is written.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `actor` is the id of whoever triggers the write; it is stored as
//! `createdBy`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use shopkeep_core::{
    DateRange, ExchangeOutcome, ExchangeRequest, ExchangeSettlement, LineRequest, NewSaleOrder,
    Order, OrderFilter, OrderItem, OrderStatus, OrderType, PaymentMethod, PaymentStatus,
    ReturnRequest,
};
use shopkeep_db::Database;

// =============================================================================
// Inputs
// =============================================================================

/// `{ productId, quantity }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInput {
    pub product_id: String,
    pub quantity: i64,
}

impl From<LineInput> for LineRequest {
    fn from(line: LineInput) -> Self {
        LineRequest::new(line.product_id, line.quantity)
    }
}

fn lines(input: Vec<LineInput>) -> Vec<LineRequest> {
    input.into_iter().map(LineRequest::from).collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleInput {
    pub items: Vec<LineInput>,
    #[serde(default)]
    pub tax_cents: Option<i64>,
    #[serde(default)]
    pub discount_cents: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub is_debt: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInput {
    pub original_order_code: String,
    pub return_items: Vec<LineInput>,
    #[serde(default)]
    pub exchange_items: Vec<LineInput>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnInput {
    pub original_order_code: String,
    pub return_items: Vec<LineInput>,
    pub notes: Option<String>,
}

/// Filters for [`list_orders`]; absent fields do not filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub order_type: Option<OrderType>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl OrderQuery {
    fn into_filter(self) -> Result<OrderFilter, ApiError> {
        let range = match (self.from, self.to) {
            (Some(from), Some(to)) if from >= to => {
                return Err(ApiError::validation("'from' must be before 'to'"))
            }
            (Some(from), Some(to)) => Some(DateRange::new(from, to)),
            // orders are never dated in the future
            (Some(from), None) => Some(DateRange::new(from, Utc::now() + Duration::days(1))),
            (None, Some(to)) => Some(DateRange::new(DateTime::UNIX_EPOCH, to)),
            (None, None) => None,
        };

        Ok(OrderFilter {
            order_type: self.order_type,
            status: self.status,
            payment_status: self.payment_status,
            range,
            limit: Some(self.limit.unwrap_or(50).clamp(1, 500)),
        })
    }
}

// =============================================================================
// Outputs
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub cost_basis_cents: i64,
    pub subtotal_cents: i64,
}

impl From<OrderItem> for OrderItemDto {
    fn from(item: OrderItem) -> Self {
        OrderItemDto {
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            cost_basis_cents: item.cost_basis_cents,
            subtotal_cents: item.subtotal_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: String,
    pub order_number: String,
    pub order_type: OrderType,
    /// Set for exchanges and returns.
    pub related_order_code: Option<String>,
    pub items: Vec<OrderItemDto>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub was_debt: bool,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderDto {
    fn from(order: Order) -> Self {
        OrderDto {
            order_type: order.order_type(),
            related_order_code: order.kind.related_order_code().map(str::to_string),
            id: order.id,
            order_number: order.order_number,
            items: order.items.into_iter().map(OrderItemDto::from).collect(),
            subtotal_cents: order.subtotal_cents,
            tax_cents: order.tax_cents,
            discount_cents: order.discount_cents,
            total_cents: order.total_cents,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            paid_at: order.paid_at,
            was_debt: order.was_debt,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            notes: order.notes,
            created_by: order.created_by,
            created_at: order.created_at,
        }
    }
}

/// Positive `differenceCents`: the customer pays; negative: the shop refunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementDto {
    pub order_number: String,
    pub related_order_code: String,
    pub exchange_total_cents: i64,
    pub returned_value_cents: i64,
    pub difference_cents: i64,
}

impl From<ExchangeSettlement> for SettlementDto {
    fn from(s: ExchangeSettlement) -> Self {
        SettlementDto {
            order_number: s.order_number,
            related_order_code: s.related_order_code,
            exchange_total_cents: s.exchange_total_cents,
            returned_value_cents: s.returned_value_cents,
            difference_cents: s.difference_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDto {
    pub order: OrderDto,
    pub settlement: SettlementDto,
}

impl From<ExchangeOutcome> for ExchangeDto {
    fn from(outcome: ExchangeOutcome) -> Self {
        ExchangeDto {
            order: outcome.order.into(),
            settlement: outcome.settlement.into(),
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

pub async fn create_sale(db: &Database, actor: &str, input: SaleInput) -> Result<OrderDto, ApiError> {
    debug!(lines = input.items.len(), is_debt = input.is_debt, "create_sale command");

    let order = db
        .orders()
        .create_sale(NewSaleOrder {
            items: lines(input.items),
            tax_cents: input.tax_cents,
            discount_cents: input.discount_cents,
            customer_name: input.customer_name,
            customer_phone: input.customer_phone,
            notes: input.notes,
            payment_method: input.payment_method,
            is_debt: input.is_debt,
            created_by: actor.to_string(),
        })
        .await?;
    Ok(order.into())
}

/// Settles the whole total of a debt sale.
pub async fn pay_debt(db: &Database, order_id: &str) -> Result<OrderDto, ApiError> {
    debug!(order_id = %order_id, "pay_debt command");
    Ok(db.orders().pay_debt(order_id).await?.into())
}

pub async fn create_exchange(
    db: &Database,
    actor: &str,
    input: ExchangeInput,
) -> Result<ExchangeDto, ApiError> {
    debug!(original = %input.original_order_code, "create_exchange command");

    let outcome = db
        .orders()
        .create_exchange(ExchangeRequest {
            original_order_code: input.original_order_code,
            return_items: lines(input.return_items),
            exchange_items: lines(input.exchange_items),
            notes: input.notes,
            created_by: actor.to_string(),
        })
        .await?;
    Ok(outcome.into())
}

pub async fn create_return(
    db: &Database,
    actor: &str,
    input: ReturnInput,
) -> Result<OrderDto, ApiError> {
    debug!(original = %input.original_order_code, "create_return command");

    let order = db
        .orders()
        .create_return(ReturnRequest {
            original_order_code: input.original_order_code,
            return_items: lines(input.return_items),
            notes: input.notes,
            created_by: actor.to_string(),
        })
        .await?;
    Ok(order.into())
}

pub async fn cancel_sale(db: &Database, order_id: &str) -> Result<OrderDto, ApiError> {
    debug!(order_id = %order_id, "cancel_sale command");
    Ok(db.orders().cancel_sale(order_id).await?.into())
}

pub async fn get_order(db: &Database, id: &str) -> Result<OrderDto, ApiError> {
    db.orders()
        .get(id)
        .await?
        .map(OrderDto::from)
        .ok_or_else(|| ApiError::not_found("Order", id))
}

pub async fn get_order_by_number(db: &Database, order_number: &str) -> Result<OrderDto, ApiError> {
    db.orders()
        .get_by_number(order_number)
        .await?
        .map(OrderDto::from)
        .ok_or_else(|| ApiError::not_found("Order", order_number))
}

/// Lists orders, newest first (default limit 50, max 500).
pub async fn list_orders(db: &Database, query: OrderQuery) -> Result<Vec<OrderDto>, ApiError> {
    let filter = query.into_filter()?;
    let orders = db.orders().list(&filter).await?;
    Ok(orders.into_iter().map(OrderDto::from).collect())
}

/// Exchanges and returns recorded against a sale.
pub async fn linked_orders(db: &Database, order_number: &str) -> Result<Vec<OrderDto>, ApiError> {
    let orders = db.orders().linked_orders(order_number).await?;
    Ok(orders.into_iter().map(OrderDto::from).collect())
}

pub async fn list_debts(db: &Database) -> Result<Vec<OrderDto>, ApiError> {
    let orders = db.orders().list_debts().await?;
    Ok(orders.into_iter().map(OrderDto::from).collect())
}

pub async fn exchange_settlement(
    db: &Database,
    order_number: &str,
) -> Result<SettlementDto, ApiError> {
    Ok(db.orders().exchange_settlement(order_number).await?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::product::{create_product, CreateProductInput, ProductDto};
    use crate::error::ErrorCode;
    use shopkeep_db::DbConfig;

    async fn setup() -> (Database, ProductDto, ProductDto) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut products = Vec::new();
        for (sku, price) in [("CUP-01", 300), ("CUP-02", 450)] {
            products.push(
                create_product(
                    &db,
                    CreateProductInput {
                        sku: sku.into(),
                        name: format!("Cup {sku}"),
                        sale_price_cents: Some(price),
                        purchase_price_cents: Some(100),
                        stock: Some(10),
                        ..Default::default()
                    },
                )
                .await
                .unwrap(),
            );
        }
        let second = products.pop().unwrap();
        let first = products.pop().unwrap();
        (db, first, second)
    }

    fn line(p: &ProductDto, quantity: i64) -> LineInput {
        LineInput {
            product_id: p.id.clone(),
            quantity,
        }
    }

    #[test]
    fn test_sale_input_from_json() {
        let input: SaleInput = serde_json::from_value(serde_json::json!({
            "items": [{ "productId": "p1", "quantity": 2 }],
            "paymentMethod": "bank_transfer",
            "isDebt": true
        }))
        .unwrap();

        assert_eq!(input.items[0].quantity, 2);
        assert_eq!(input.payment_method, Some(PaymentMethod::BankTransfer));
        assert!(input.is_debt);
        assert!(input.tax_cents.is_none());
    }

    #[tokio::test]
    async fn test_sale_exchange_return_flow() {
        let (db, cup, mug) = setup().await;

        let sale = create_sale(
            &db,
            "alice",
            SaleInput {
                items: vec![line(&cup, 2)],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(sale.created_by, "alice");
        assert_eq!(sale.total_cents, 600);

        let exchange = create_exchange(
            &db,
            "bob",
            ExchangeInput {
                original_order_code: sale.order_number.clone(),
                return_items: vec![line(&cup, 1)],
                exchange_items: vec![line(&mug, 1)],
                notes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(exchange.order.order_type, OrderType::Exchange);
        assert_eq!(exchange.settlement.difference_cents, 150);

        let json = serde_json::to_value(&exchange).unwrap();
        assert_eq!(json["order"]["relatedOrderCode"], sale.order_number.as_str());
        assert_eq!(json["settlement"]["differenceCents"], 150);

        let refund = create_return(
            &db,
            "bob",
            ReturnInput {
                original_order_code: sale.order_number.clone(),
                return_items: vec![line(&cup, 1)],
                notes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(refund.total_cents, -300);

        let err = create_return(
            &db,
            "bob",
            ReturnInput {
                original_order_code: sale.order_number.clone(),
                return_items: vec![line(&cup, 1)],
                notes: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidReturn);

        assert_eq!(linked_orders(&db, &sale.order_number).await.unwrap().len(), 2);
        let settlement = exchange_settlement(&db, &exchange.order.order_number)
            .await
            .unwrap();
        assert_eq!(settlement, exchange.settlement);
    }

    #[tokio::test]
    async fn test_exchange_without_replacements_is_refused() {
        let (db, cup, _) = setup().await;
        let sale = create_sale(
            &db,
            "alice",
            SaleInput {
                items: vec![line(&cup, 2)],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let input: ExchangeInput = serde_json::from_value(serde_json::json!({
            "originalOrderCode": sale.order_number.clone(),
            "returnItems": [{ "productId": cup.id.clone(), "quantity": 1 }]
        }))
        .unwrap();
        assert!(input.exchange_items.is_empty());

        let err = create_exchange(&db, "bob", input).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(linked_orders(&db, &sale.order_number).await.unwrap().is_empty());

        let refund = create_return(
            &db,
            "bob",
            ReturnInput {
                original_order_code: sale.order_number.clone(),
                return_items: vec![line(&cup, 1)],
                notes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(refund.order_type, OrderType::Return);
        assert_eq!(refund.total_cents, -300);
    }

    #[tokio::test]
    async fn test_debt_commands() {
        let (db, cup, _) = setup().await;

        let sale = create_sale(
            &db,
            "alice",
            SaleInput {
                items: vec![line(&cup, 1)],
                is_debt: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(sale.payment_status, PaymentStatus::Debt);
        assert_eq!(list_debts(&db).await.unwrap().len(), 1);

        let paid = pay_debt(&db, &sale.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert!(paid.paid_at.is_some());

        let err = pay_debt(&db, &sale.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
    }

    #[tokio::test]
    async fn test_cancel_and_list() {
        let (db, cup, _) = setup().await;
        let sale = create_sale(
            &db,
            "alice",
            SaleInput {
                items: vec![line(&cup, 3)],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let cancelled = cancel_sale(&db, &sale.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);

        let found = list_orders(
            &db,
            OrderQuery {
                status: Some(OrderStatus::Cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            get_order_by_number(&db, &sale.order_number).await.unwrap().id,
            sale.id
        );

        let now = Utc::now();
        let err = list_orders(
            &db,
            OrderQuery {
                from: Some(now),
                to: Some(now),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
