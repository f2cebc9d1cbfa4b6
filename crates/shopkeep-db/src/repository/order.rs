//! # Order Repository
//!
//! The order engine: sales, debts, exchanges, returns and cancellation.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Order Lifecycle                                  │
//! │                                                                         │
//! │  create_sale ──► SALE  COMPLETED  PAID ─────────────┐                  │
//! │       │                                              │ cancel_sale     │
//! │       └─(is_debt)► SALE COMPLETED DEBT ──pay_debt──► PAID               │
//! │                         │                            │                  │
//! │                         │ cancel_sale                ▼                  │
//! │                         ▼                   CANCELLED REFUNDED          │
//! │                 CANCELLED DEBT (not payable)                           │
//! │                                                                         │
//! │  create_exchange(ORD…) ──► EXCHANGE EX… related_order_code = ORD…      │
//! │  create_return(ORD…)   ──► RETURN   RF… related_order_code = ORD…      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Transaction Per Operation
//! Every write operation allocates its number (or runs its conditional
//! UPDATE) as the first statement, then validates, moves stock through the
//! ledger and inserts rows. Any error drops the transaction: no order, no
//! stock change, and the number is handed out again.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::{apply_stock, require_product};
use crate::repository::sequence::next_document_number;
use shopkeep_core::numbering::DocumentKind;
use shopkeep_core::order::{
    ensure_cancellable, ensure_debt_payable, ensure_returnable_original, exchange_totals,
    initial_payment, lines_value, payment_after_cancel, price_sale_line, reconcile_returns,
    return_totals, sale_totals, OrderTotals, PricedLine,
};
use shopkeep_core::validation::{
    validate_exchange_request, validate_return_request, validate_sale_request,
};
use shopkeep_core::{
    CoreError, ExchangeOutcome, ExchangeRequest, ExchangeSettlement, LineRequest, Money,
    NewSaleOrder, Order, OrderFilter, OrderItem, OrderKind, OrderStatus, OrderType,
    PaymentMethod, PaymentStatus, ReturnRequest, ReturnedLine, StockOperation,
};

macro_rules! select_orders {
    () => {
        "SELECT id, order_number, order_type, related_order_code, subtotal_cents, tax_cents, \
         discount_cents, total_cents, status, payment_status, payment_method, paid_at, \
         was_debt, customer_name, customer_phone, notes, created_by, created_at FROM orders"
    };
}

/// Flat `orders` row; items are loaded separately.
#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    order_type: OrderType,
    related_order_code: Option<String>,
    subtotal_cents: i64,
    tax_cents: i64,
    discount_cents: i64,
    total_cents: i64,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: Option<PaymentMethod>,
    paid_at: Option<DateTime<Utc>>,
    was_debt: bool,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> DbResult<Order> {
        let kind = OrderKind::from_parts(self.order_type, self.related_order_code).ok_or_else(
            || DbError::Corrupt(format!("order {} has an inconsistent link", self.order_number)),
        )?;

        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            kind,
            items,
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            discount_cents: self.discount_cents,
            total_cents: self.total_cents,
            status: self.status,
            payment_status: self.payment_status,
            payment_method: self.payment_method,
            paid_at: self.paid_at,
            was_debt: self.was_debt,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn load_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT id, order_id, product_id, product_name, quantity,
               unit_price_cents, cost_basis_cents, subtotal_cents
        FROM order_items
        WHERE order_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

async fn hydrate(conn: &mut SqliteConnection, rows: Vec<OrderRow>) -> DbResult<Vec<Order>> {
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = load_items(&mut *conn, &row.id).await?;
        orders.push(row.into_order(items)?);
    }
    Ok(orders)
}

async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(concat!(select_orders!(), " WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let items = load_items(&mut *conn, &row.id).await?;
            Ok(Some(row.into_order(items)?))
        }
        None => Ok(None),
    }
}

async fn fetch_order_by_number(
    conn: &mut SqliteConnection,
    order_number: &str,
) -> DbResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(concat!(select_orders!(), " WHERE order_number = ?1"))
        .bind(order_number)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let items = load_items(&mut *conn, &row.id).await?;
            Ok(Some(row.into_order(items)?))
        }
        None => Ok(None),
    }
}

async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(order_number = %order.order_number, items = order.items.len(), "Inserting order");

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, order_type, related_order_code,
            subtotal_cents, tax_cents, discount_cents, total_cents,
            status, payment_status, payment_method, paid_at, was_debt,
            customer_name, customer_phone, notes, created_by, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17, ?18
        )
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(order.order_type())
    .bind(order.kind.related_order_code())
    .bind(order.subtotal_cents)
    .bind(order.tax_cents)
    .bind(order.discount_cents)
    .bind(order.total_cents)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.payment_method)
    .bind(order.paid_at)
    .bind(order.was_debt)
    .bind(&order.customer_name)
    .bind(&order.customer_phone)
    .bind(&order.notes)
    .bind(&order.created_by)
    .bind(order.created_at)
    .execute(&mut *conn)
    .await?;

    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, product_name, quantity,
                unit_price_cents, cost_basis_cents, subtotal_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.cost_basis_cents)
        .bind(item.subtotal_cents)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn insert_returned_lines(conn: &mut SqliteConnection, lines: &[ReturnedLine]) -> DbResult<()> {
    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO exchange_returned_items (
                id, order_id, product_id, product_name, quantity,
                unit_price_cents, subtotal_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&line.id)
        .bind(&line.order_id)
        .bind(&line.product_id)
        .bind(&line.product_name)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(line.subtotal_cents)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_returned_lines(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<ReturnedLine>> {
    let lines = sqlx::query_as::<_, ReturnedLine>(
        r#"
        SELECT id, order_id, product_id, product_name, quantity,
               unit_price_cents, subtotal_cents
        FROM exchange_returned_items
        WHERE order_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(lines)
}

/// Units per product already taken back against `original_code`, through
/// returns (their items) and exchanges (their returned lines).
async fn already_returned(
    conn: &mut SqliteConnection,
    original_code: &str,
) -> DbResult<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT product_id, SUM(quantity) FROM (
            SELECT oi.product_id, oi.quantity
            FROM order_items oi
            INNER JOIN orders o ON o.id = oi.order_id
            WHERE o.related_order_code = ?1 AND o.order_type = 'return'
            UNION ALL
            SELECT ri.product_id, ri.quantity
            FROM exchange_returned_items ri
            INNER JOIN orders o ON o.id = ri.order_id
            WHERE o.related_order_code = ?1 AND o.order_type = 'exchange'
        )
        GROUP BY product_id
        "#,
    )
    .bind(original_code)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Prices each line from the current catalog and takes it out of stock.
///
/// Lines are processed in order, so a product listed twice is checked
/// against the stock left by its first line.
async fn price_and_take(
    conn: &mut SqliteConnection,
    lines: &[LineRequest],
) -> DbResult<Vec<PricedLine>> {
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let product = require_product(&mut *conn, &line.product_id).await?;
        let priced_line = price_sale_line(&product, line.quantity)?;
        apply_stock(&mut *conn, &line.product_id, StockOperation::Subtract, line.quantity).await?;
        priced.push(priced_line);
    }
    Ok(priced)
}

fn order_items(lines: &[PricedLine], order_id: &str) -> Vec<OrderItem> {
    lines
        .iter()
        .map(|line| line.to_order_item(Uuid::new_v4().to_string(), order_id))
        .collect()
}

/// A completed, paid order linked to `original`.
#[allow(clippy::too_many_arguments)]
fn linked_order(
    original: &Order,
    kind: OrderKind,
    order_number: String,
    lines: &[PricedLine],
    totals: OrderTotals,
    notes: Option<String>,
    created_by: String,
    now: DateTime<Utc>,
) -> Order {
    let id = Uuid::new_v4().to_string();
    Order {
        items: order_items(lines, &id),
        id,
        order_number,
        kind,
        subtotal_cents: totals.subtotal.cents(),
        tax_cents: totals.tax.cents(),
        discount_cents: totals.discount.cents(),
        total_cents: totals.total.cents(),
        status: OrderStatus::Completed,
        payment_status: PaymentStatus::Paid,
        payment_method: original.payment_method,
        paid_at: Some(now),
        was_debt: false,
        customer_name: original.customer_name.clone(),
        customer_phone: original.customer_phone.clone(),
        notes,
        created_by,
        created_at: now,
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates a completed sale.
    ///
    /// ## Steps (one transaction)
    /// 1. Allocate `ORD` number
    /// 2. Per line: load product, check active and stock, snapshot name,
    ///    price and cost, ledger SUBTRACT
    /// 3. `total = subtotal + tax - discount`
    /// 4. Payment state: debt sales start unpaid
    /// 5. Insert order and items
    ///
    /// ## Errors
    /// `ValidationError`, `NotFound`, `InactiveProduct`, `InsufficientStock`.
    /// Nothing is written on error.
    pub async fn create_sale(&self, request: NewSaleOrder) -> DbResult<Order> {
        validate_sale_request(&request)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let order_number = next_document_number(&mut tx, DocumentKind::Sale, now.date_naive()).await?;
        let lines = price_and_take(&mut tx, &request.items).await?;
        let totals = sale_totals(
            &lines,
            Money::from_cents(request.tax_cents.unwrap_or(0)),
            Money::from_cents(request.discount_cents.unwrap_or(0)),
        )?;
        let payment = initial_payment(request.is_debt, now);

        let id = Uuid::new_v4().to_string();
        let order = Order {
            items: order_items(&lines, &id),
            id,
            order_number,
            kind: OrderKind::Sale,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            status: OrderStatus::Completed,
            payment_status: payment.status,
            payment_method: request.payment_method,
            paid_at: payment.paid_at,
            was_debt: payment.was_debt,
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            notes: request.notes,
            created_by: request.created_by,
            created_at: now,
        };

        insert_order(&mut tx, &order).await?;
        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            total = order.total_cents,
            debt = order.was_debt,
            "Sale created"
        );
        Ok(order)
    }

    /// Settles a debt sale: DEBT → PAID, `paid_at = now`.
    ///
    /// A single conditional UPDATE, so of two concurrent settlements exactly
    /// one wins and the other gets `InvalidState`.
    pub async fn pay_debt(&self, order_id: &str) -> DbResult<Order> {
        debug!(order_id = %order_id, "Paying debt");

        let result = sqlx::query(
            r#"
            UPDATE orders SET payment_status = 'paid', paid_at = ?2
            WHERE id = ?1 AND status = 'completed' AND payment_status = 'debt'
            "#,
        )
        .bind(order_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let order = self
            .get(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if result.rows_affected() == 0 {
            warn!(order_number = %order.order_number, "Debt payment refused");
            return Err(match ensure_debt_payable(&order) {
                Err(err) => err.into(),
                Ok(()) => DbError::Internal(format!(
                    "debt on {} changed during payment",
                    order.order_number
                )),
            });
        }

        info!(order_number = %order.order_number, total = order.total_cents, "Debt paid");
        Ok(order)
    }

    /// Takes back units of an original sale and issues replacements.
    ///
    /// ## Steps (one transaction)
    /// 1. Allocate `EX` number
    /// 2. Original must be a completed sale
    /// 3. Returned lines checked against what the sale still covers
    /// 4. Ledger ADD for returned lines
    /// 5. Replacement lines priced from the catalog, ledger SUBTRACT
    /// 6. Insert the exchange (replacements only) and its returned lines
    ///
    /// The settlement difference is `exchange_total - returned_value`.
    pub async fn create_exchange(&self, request: ExchangeRequest) -> DbResult<ExchangeOutcome> {
        validate_exchange_request(&request)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let order_number =
            next_document_number(&mut tx, DocumentKind::Exchange, now.date_naive()).await?;

        let original = fetch_order_by_number(&mut tx, &request.original_order_code)
            .await?
            .ok_or_else(|| DbError::not_found("Order", &request.original_order_code))?;
        ensure_returnable_original(&original)?;

        let returned = already_returned(&mut tx, &original.order_number).await?;
        let returned_lines = reconcile_returns(&original, &returned, &request.return_items)?;
        for line in &returned_lines {
            apply_stock(&mut tx, &line.product_id, StockOperation::Add, line.quantity).await?;
        }

        let replacements = price_and_take(&mut tx, &request.exchange_items).await?;
        let totals = exchange_totals(&replacements)?;
        let returned_value = lines_value(&returned_lines)?;

        let order = linked_order(
            &original,
            OrderKind::Exchange {
                related_order_code: original.order_number.clone(),
            },
            order_number,
            &replacements,
            totals,
            request.notes,
            request.created_by,
            now,
        );
        insert_order(&mut tx, &order).await?;

        let stored_lines: Vec<ReturnedLine> = returned_lines
            .iter()
            .map(|line| line.to_returned_line(Uuid::new_v4().to_string(), &order.id))
            .collect();
        insert_returned_lines(&mut tx, &stored_lines).await?;

        tx.commit().await?;

        let settlement = ExchangeSettlement::new(
            &order.order_number,
            &original.order_number,
            totals.total,
            returned_value,
        );

        info!(
            order_number = %order.order_number,
            original = %original.order_number,
            difference = settlement.difference_cents,
            "Exchange created"
        );
        Ok(ExchangeOutcome { order, settlement })
    }

    /// Refunds units of an original sale.
    ///
    /// Items are priced at the original sale's unit price and cost basis;
    /// `subtotal = total = -Σ line values`.
    pub async fn create_return(&self, request: ReturnRequest) -> DbResult<Order> {
        validate_return_request(&request)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let order_number =
            next_document_number(&mut tx, DocumentKind::Return, now.date_naive()).await?;

        let original = fetch_order_by_number(&mut tx, &request.original_order_code)
            .await?
            .ok_or_else(|| DbError::not_found("Order", &request.original_order_code))?;
        ensure_returnable_original(&original)?;

        let returned = already_returned(&mut tx, &original.order_number).await?;
        let lines = reconcile_returns(&original, &returned, &request.return_items)?;
        for line in &lines {
            apply_stock(&mut tx, &line.product_id, StockOperation::Add, line.quantity).await?;
        }

        let order = linked_order(
            &original,
            OrderKind::Return {
                related_order_code: original.order_number.clone(),
            },
            order_number,
            &lines,
            return_totals(&lines)?,
            request.notes,
            request.created_by,
            now,
        );
        insert_order(&mut tx, &order).await?;
        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            original = %original.order_number,
            refund = order.total_cents,
            "Return created"
        );
        Ok(order)
    }

    /// Cancels a completed sale with no linked orders and restocks its items.
    ///
    /// A paid sale becomes REFUNDED; a debt sale keeps DEBT but is no longer
    /// payable or counted as outstanding.
    pub async fn cancel_sale(&self, order_id: &str) -> DbResult<Order> {
        debug!(order_id = %order_id, "Cancelling sale");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = 'cancelled'
            WHERE id = ?1
              AND order_type = 'sale'
              AND status = 'completed'
              AND NOT EXISTS (
                  SELECT 1 FROM orders linked
                  WHERE linked.related_order_code = orders.order_number
              )
            "#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if result.rows_affected() == 0 {
            let linked: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE related_order_code = ?1")
                    .bind(&order.order_number)
                    .fetch_one(&mut *tx)
                    .await?;
            warn!(order_number = %order.order_number, linked, "Cancellation refused");
            return Err(match ensure_cancellable(&order, linked as usize) {
                Err(err) => err.into(),
                Ok(()) => DbError::Internal(format!(
                    "order {} changed during cancellation",
                    order.order_number
                )),
            });
        }

        let payment_status = payment_after_cancel(order.payment_status);
        if payment_status != order.payment_status {
            sqlx::query("UPDATE orders SET payment_status = ?2 WHERE id = ?1")
                .bind(order_id)
                .bind(payment_status)
                .execute(&mut *tx)
                .await?;
        }

        for item in &order.items {
            apply_stock(&mut tx, &item.product_id, StockOperation::Add, item.quantity).await?;
        }

        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;
        tx.commit().await?;

        info!(order_number = %order.order_number, "Sale cancelled");
        Ok(order)
    }

    /// Gets an order with its items.
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    /// Gets an order by its `ORD`/`EX`/`RF` number.
    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_by_number(&mut conn, order_number).await
    }

    /// Lists orders, newest first. Unset filter fields do not filter.
    pub async fn list(&self, filter: &OrderFilter) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            select_orders!(),
            r#"
            WHERE (?1 IS NULL OR order_type = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR payment_status = ?3)
              AND (?4 IS NULL OR created_at >= ?4)
              AND (?5 IS NULL OR created_at < ?5)
            ORDER BY created_at DESC, order_number DESC
            LIMIT ?6
            "#
        ))
        .bind(filter.order_type)
        .bind(filter.status)
        .bind(filter.payment_status)
        .bind(filter.range.map(|r| r.from))
        .bind(filter.range.map(|r| r.to))
        // SQLite: a negative LIMIT means no limit
        .bind(filter.limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&mut *conn)
        .await?;

        hydrate(&mut conn, rows).await
    }

    /// Exchanges and returns that reference `order_number`.
    pub async fn linked_orders(&self, order_number: &str) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            select_orders!(),
            " WHERE related_order_code = ?1 ORDER BY created_at, order_number"
        ))
        .bind(order_number)
        .fetch_all(&mut *conn)
        .await?;

        hydrate(&mut conn, rows).await
    }

    /// Completed orders still awaiting payment, oldest first.
    pub async fn list_debts(&self) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            select_orders!(),
            " WHERE status = 'completed' AND payment_status = 'debt' ORDER BY created_at"
        ))
        .fetch_all(&mut *conn)
        .await?;

        hydrate(&mut conn, rows).await
    }

    /// Sum of open debt.
    pub async fn outstanding_debt(&self) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM orders \
             WHERE status = 'completed' AND payment_status = 'debt'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    /// Lines taken back by an exchange.
    pub async fn returned_lines(&self, order_id: &str) -> DbResult<Vec<ReturnedLine>> {
        let mut conn = self.pool.acquire().await?;
        load_returned_lines(&mut conn, order_id).await
    }

    /// Recomputes the settlement of a stored exchange.
    pub async fn exchange_settlement(&self, order_number: &str) -> DbResult<ExchangeSettlement> {
        let mut conn = self.pool.acquire().await?;

        let order = fetch_order_by_number(&mut conn, order_number)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_number))?;

        let related = match &order.kind {
            OrderKind::Exchange { related_order_code } => related_order_code.clone(),
            other => {
                return Err(CoreError::InvalidState {
                    entity: "Order",
                    key: order.order_number.clone(),
                    state: format!("{:?}", other.order_type()).to_lowercase(),
                    operation: "settle as an exchange",
                }
                .into())
            }
        };

        let returned = load_returned_lines(&mut conn, &order.id).await?;
        let returned_value =
            Money::checked_sum(returned.iter().map(|line| Money::from_cents(line.subtotal_cents)))
                .ok_or_else(|| {
                    DbError::Corrupt(format!("returned value of {} overflows", order.order_number))
                })?;

        Ok(ExchangeSettlement::new(
            &order.order_number,
            related,
            order.total(),
            returned_value,
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use shopkeep_core::{ErrorKind, NewProduct, Product, MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn product(db: &Database, sku: &str, price: i64, cost: i64, stock: i64) -> Product {
        db.products()
            .create(NewProduct {
                sku: sku.into(),
                name: format!("Product {sku}"),
                purchase_price_cents: Some(cost),
                sale_price_cents: Some(price),
                stock: Some(stock),
                min_stock_level: Some(5),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn sale(lines: &[(&Product, i64)]) -> NewSaleOrder {
        NewSaleOrder {
            items: lines
                .iter()
                .map(|(p, qty)| LineRequest::new(p.id.clone(), *qty))
                .collect(),
            payment_method: Some(PaymentMethod::Cash),
            created_by: "clerk".into(),
            ..Default::default()
        }
    }

    async fn stock_of(db: &Database, p: &Product) -> i64 {
        db.products().get_by_id(&p.id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn test_sale_decrements_stock_and_snapshots_prices() {
        let db = db().await;
        let x = product(&db, "X1", 250, 120, 10).await;

        let order = db.orders().create_sale(sale(&[(&x, 3)])).await.unwrap();

        assert!(order.order_number.starts_with("ORD"));
        assert_eq!(order.order_number.len(), 13);
        assert_eq!(order.total_cents, 750);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert!(order.paid_at.is_some());
        assert!(order.totals_are_consistent());
        assert_eq!(order.items[0].cost_basis_cents, 120);
        assert_eq!(stock_of(&db, &x).await, 7);

        let err = db.orders().create_sale(sale(&[(&x, 8)])).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock));
        assert_eq!(stock_of(&db, &x).await, 7);

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn test_sale_with_tax_and_discount() {
        let db = db().await;
        let x = product(&db, "X1", 1000, 400, 10).await;

        let mut request = sale(&[(&x, 2)]);
        request.tax_cents = Some(160);
        request.discount_cents = Some(300);
        let order = db.orders().create_sale(request).await.unwrap();
        assert_eq!(order.subtotal_cents, 2000);
        assert_eq!(order.total_cents, 1860);

        let mut request = sale(&[(&x, 1)]);
        request.discount_cents = Some(1001);
        let err = db.orders().create_sale(request).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ValidationError));
        assert_eq!(stock_of(&db, &x).await, 8);
    }

    #[tokio::test]
    async fn test_oversized_prices_never_reach_a_sale() {
        let db = db().await;

        let err = db
            .products()
            .create(NewProduct {
                sku: "GOLD-1".into(),
                name: "Gold bar".into(),
                sale_price_cents: Some(i64::MAX / 2 + 1),
                stock: Some(2),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ValidationError));

        // the largest accepted figures still total exactly
        let gold = product(&db, "GOLD-2", MAX_AMOUNT_CENTS, 0, MAX_ITEM_QUANTITY).await;
        let mut request = sale(&[(&gold, MAX_ITEM_QUANTITY)]);
        request.tax_cents = Some(MAX_AMOUNT_CENTS);
        let order = db.orders().create_sale(request).await.unwrap();
        assert_eq!(
            order.total_cents,
            MAX_AMOUNT_CENTS * MAX_ITEM_QUANTITY + MAX_AMOUNT_CENTS
        );
        assert!(order.totals_are_consistent());

        let mut request = sale(&[(&gold, 1)]);
        request.tax_cents = Some(MAX_AMOUNT_CENTS + 1);
        let err = db.orders().create_sale(request).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ValidationError));
    }

    #[tokio::test]
    async fn test_failing_line_rolls_back_whole_sale() {
        let db = db().await;
        let x = product(&db, "X1", 100, 50, 10).await;
        let y = product(&db, "Y1", 100, 50, 1).await;

        let err = db
            .orders()
            .create_sale(sale(&[(&x, 4), (&y, 2)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock));

        assert_eq!(stock_of(&db, &x).await, 10);
        assert!(db.orders().list(&OrderFilter::default()).await.unwrap().is_empty());

        // the number was handed back with the rollback
        let ok = db.orders().create_sale(sale(&[(&x, 1)])).await.unwrap();
        assert!(ok.order_number.ends_with("0001"));
    }

    #[tokio::test]
    async fn test_inactive_and_unknown_products() {
        let db = db().await;
        let x = product(&db, "X1", 100, 50, 10).await;
        db.products().set_active(&x.id, false).await.unwrap();

        let err = db.orders().create_sale(sale(&[(&x, 1)])).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InactiveProduct));

        let err = db
            .orders()
            .create_sale(NewSaleOrder {
                items: vec![LineRequest::new(Uuid::new_v4().to_string(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_debt_lifecycle() {
        let db = db().await;
        let x = product(&db, "X1", 500, 200, 10).await;

        let mut request = sale(&[(&x, 2)]);
        request.is_debt = true;
        let order = db.orders().create_sale(request).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Debt);
        assert!(order.paid_at.is_none());
        assert!(order.was_debt);

        assert_eq!(db.orders().list_debts().await.unwrap().len(), 1);
        assert_eq!(db.orders().outstanding_debt().await.unwrap().cents(), 1000);

        let paid = db.orders().pay_debt(&order.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert!(paid.paid_at.is_some());
        assert!(paid.was_debt);

        let err = db.orders().pay_debt(&order.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
        assert!(db.orders().outstanding_debt().await.unwrap().is_zero());

        let err = db
            .orders()
            .pay_debt(&Uuid::new_v4().to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_exchange_cannot_return_more_than_sold() {
        let db = db().await;
        let x = product(&db, "X1", 300, 100, 10).await;
        let y = product(&db, "Y1", 400, 100, 10).await;
        let original = db.orders().create_sale(sale(&[(&x, 2)])).await.unwrap();

        let err = db
            .orders()
            .create_exchange(ExchangeRequest {
                original_order_code: original.order_number.clone(),
                return_items: vec![LineRequest::new(x.id.clone(), 3)],
                exchange_items: vec![LineRequest::new(y.id.clone(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidReturn {
                requested: 3,
                returnable: 2,
                ..
            })
        ));
        assert_eq!(stock_of(&db, &x).await, 8);
        assert_eq!(stock_of(&db, &y).await, 10);
    }

    #[tokio::test]
    async fn test_exchange_settlement() {
        let db = db().await;
        let x = product(&db, "X1", 300, 100, 10).await;
        let y = product(&db, "Y1", 400, 100, 10).await;
        let original = db.orders().create_sale(sale(&[(&x, 2)])).await.unwrap();

        // a later price change must not affect the returned value
        db.products()
            .update(
                &x.id,
                shopkeep_core::ProductPatch {
                    sale_price_cents: Some(999),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = db
            .orders()
            .create_exchange(ExchangeRequest {
                original_order_code: original.order_number.clone(),
                return_items: vec![LineRequest::new(x.id.clone(), 2)],
                exchange_items: vec![LineRequest::new(y.id.clone(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let order = &outcome.order;
        assert!(order.order_number.starts_with("EX"));
        assert!(order.order_number.ends_with("0001"));
        assert_eq!(order.kind.related_order_code(), Some(original.order_number.as_str()));
        assert_eq!(order.total_cents, 400);
        assert_eq!(order.tax_cents, 0);
        assert!(order.totals_are_consistent());

        assert_eq!(outcome.settlement.returned_value_cents, 600);
        assert_eq!(outcome.settlement.difference_cents, -200);

        assert_eq!(stock_of(&db, &x).await, 10);
        assert_eq!(stock_of(&db, &y).await, 9);

        let again = db
            .orders()
            .exchange_settlement(&order.order_number)
            .await
            .unwrap();
        assert_eq!(again, outcome.settlement);

        let linked = db.orders().linked_orders(&original.order_number).await.unwrap();
        assert_eq!(linked.len(), 1);

        let err = db
            .orders()
            .exchange_settlement(&original.order_number)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
    }

    #[tokio::test]
    async fn test_return_flow_and_cumulative_limit() {
        let db = db().await;
        let x = product(&db, "X1", 300, 100, 10).await;
        let original = db.orders().create_sale(sale(&[(&x, 3)])).await.unwrap();

        let refund = db
            .orders()
            .create_return(ReturnRequest {
                original_order_code: original.order_number.clone(),
                return_items: vec![LineRequest::new(x.id.clone(), 2)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(refund.order_number.starts_with("RF"));
        assert_eq!(refund.order_type(), OrderType::Return);
        assert_eq!(refund.total_cents, -600);
        assert_eq!(refund.subtotal_cents, -600);
        assert_eq!(refund.items[0].unit_price_cents, 300);
        assert_eq!(refund.payment_status, PaymentStatus::Paid);
        assert!(refund.totals_are_consistent());
        assert_eq!(stock_of(&db, &x).await, 9);

        let err = db
            .orders()
            .create_return(ReturnRequest {
                original_order_code: original.order_number.clone(),
                return_items: vec![LineRequest::new(x.id.clone(), 2)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidReturn { returnable: 1, .. })
        ));

        // returns against a return are refused
        let err = db
            .orders()
            .create_return(ReturnRequest {
                original_order_code: refund.order_number.clone(),
                return_items: vec![LineRequest::new(x.id.clone(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));

        let err = db
            .orders()
            .create_return(ReturnRequest {
                original_order_code: "ORD0000000000".into(),
                return_items: vec![LineRequest::new(x.id.clone(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_cancel_sale() {
        let db = db().await;
        let x = product(&db, "X1", 300, 100, 10).await;

        let paid = db.orders().create_sale(sale(&[(&x, 4)])).await.unwrap();
        let cancelled = db.orders().cancel_sale(&paid.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
        assert_eq!(stock_of(&db, &x).await, 10);

        let err = db.orders().cancel_sale(&paid.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));

        let mut request = sale(&[(&x, 1)]);
        request.is_debt = true;
        let debt = db.orders().create_sale(request).await.unwrap();
        let cancelled = db.orders().cancel_sale(&debt.id).await.unwrap();
        assert_eq!(cancelled.payment_status, PaymentStatus::Debt);
        assert!(db.orders().outstanding_debt().await.unwrap().is_zero());
        let err = db.orders().pay_debt(&debt.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));

        let linked = db.orders().create_sale(sale(&[(&x, 2)])).await.unwrap();
        db.orders()
            .create_return(ReturnRequest {
                original_order_code: linked.order_number.clone(),
                return_items: vec![LineRequest::new(x.id.clone(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let err = db.orders().cancel_sale(&linked.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
        assert_eq!(stock_of(&db, &x).await, 9);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = db().await;
        let x = product(&db, "X1", 100, 50, 20).await;

        let first = db.orders().create_sale(sale(&[(&x, 1)])).await.unwrap();
        let mut request = sale(&[(&x, 1)]);
        request.is_debt = true;
        db.orders().create_sale(request).await.unwrap();
        db.orders()
            .create_return(ReturnRequest {
                original_order_code: first.order_number.clone(),
                return_items: vec![LineRequest::new(x.id.clone(), 1)],
                created_by: "clerk".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let all = db.orders().list(&OrderFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let sales = db
            .orders()
            .list(&OrderFilter {
                order_type: Some(OrderType::Sale),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sales.len(), 2);

        let debts = db
            .orders()
            .list(&OrderFilter {
                payment_status: Some(PaymentStatus::Debt),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(debts.len(), 1);

        let limited = db
            .orders()
            .list(&OrderFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let none = db
            .orders()
            .list(&OrderFilter {
                range: Some(shopkeep_core::DateRange::new(
                    Utc::now() - chrono::Duration::days(10),
                    Utc::now() - chrono::Duration::days(9),
                )),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sales_never_oversell() {
        let db = db().await;
        let x = product(&db, "X1", 100, 50, 5).await;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let db = db.clone();
            let request = sale(&[(&x, 1)]);
            handles.push(tokio::spawn(async move { db.orders().create_sale(request).await }));
        }

        let mut numbers = Vec::new();
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(order) => numbers.push(order.order_number),
                Err(err) => {
                    assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock));
                    refused += 1;
                }
            }
        }

        assert_eq!(numbers.len(), 5);
        assert_eq!(refused, 7);
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 5);
        assert_eq!(stock_of(&db, &x).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_on_file_database() {
        let path = std::env::temp_dir().join(format!("shopkeep-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(4))
            .await
            .unwrap();
        let x = product(&db, "X1", 100, 50, 1000).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            let request = sale(&[(&x, 2)]);
            handles.push(tokio::spawn(async move { db.orders().create_sale(request).await }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().order_number);
        }
        numbers.sort();
        numbers.dedup();

        assert_eq!(numbers.len(), 20);
        assert_eq!(stock_of(&db, &x).await, 960);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
