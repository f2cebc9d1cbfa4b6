//! # Validation Module
//!
//! Input validation for the engine's operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: API layer (out of scope)                                     │
//! │  └── Deserialization into the request DTOs                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - shape checks before any query runs             │
//! │  ├── blank SKU, bad quantities, negative or oversized money            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── UNIQUE (sku, barcode, order_number, purchase_number)              │
//! │  └── CHECK (stock >= 0)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{
    ExchangeRequest, LineRequest, NewProduct, NewPurchase, NewSaleOrder, ProductPatch,
    PurchaseLineRequest, ReturnRequest,
};
use crate::{MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY, MAX_ORDER_LINES, MAX_PURCHASE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be blank
/// - At most 50 characters
/// - Only alphanumerics, hyphens, underscores
///
/// ```rust
/// use shopkeep_core::validation::validate_sku;
///
/// assert!(validate_sku("SOAP-01").is_ok());
/// assert!(validate_sku("   ").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a barcode: digits only, 4 to 32 of them.
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.len() < 4 || barcode.len() > 32 || !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must be 4 to 32 digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name: not blank, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    validate_max_len("name", name, 200)
}

fn validate_max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

fn validate_optional_text(field: &str, value: Option<&String>, max: usize) -> ValidationResult<()> {
    match value {
        Some(v) => validate_max_len(field, v, max),
        None => Ok(()),
    }
}

/// Validates a search query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();
    validate_max_len("query", query, 100)?;
    Ok(query.to_string())
}

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order line quantity: 1 to [`MAX_ITEM_QUANTITY`].
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a money amount in cents: 0 to [`MAX_AMOUNT_CENTS`].
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates a stock ledger quantity.
///
/// ADD and SUBTRACT need a positive amount; SET may zero the stock.
pub fn validate_ledger_quantity(op: crate::types::StockOperation, qty: i64) -> ValidationResult<()> {
    use crate::types::StockOperation;

    match op {
        StockOperation::Set if qty >= 0 => Ok(()),
        StockOperation::Set => Err(ValidationError::Negative {
            field: "quantity".to_string(),
        }),
        StockOperation::Add | StockOperation::Subtract if qty > 0 => Ok(()),
        StockOperation::Add | StockOperation::Subtract => Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }),
    }
}

// =============================================================================
// Request Validators
// =============================================================================

fn validate_lines(field: &str, lines: &[LineRequest], allow_empty: bool) -> ValidationResult<()> {
    if lines.is_empty() && !allow_empty {
        return Err(ValidationError::Empty {
            field: field.to_string(),
        });
    }

    if lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    for line in lines {
        validate_uuid("product_id", &line.product_id)?;
        validate_quantity(line.quantity)?;
    }

    Ok(())
}

/// Validates catalog intake.
pub fn validate_new_product(dto: &NewProduct) -> ValidationResult<()> {
    validate_sku(&dto.sku)?;
    validate_product_name(&dto.name)?;

    if let Some(barcode) = dto.barcode.as_deref() {
        validate_barcode(barcode)?;
    }
    if let Some(cents) = dto.purchase_price_cents {
        validate_amount_cents("purchase_price", cents)?;
    }
    if let Some(cents) = dto.sale_price_cents {
        validate_amount_cents("sale_price", cents)?;
    }
    if let Some(stock) = dto.stock {
        if stock < 0 {
            return Err(ValidationError::Negative {
                field: "stock".to_string(),
            });
        }
    }
    if let Some(level) = dto.min_stock_level {
        if level < 0 {
            return Err(ValidationError::Negative {
                field: "min_stock_level".to_string(),
            });
        }
    }
    validate_optional_text("category", dto.category.as_ref(), 100)?;
    validate_optional_text("unit", dto.unit.as_ref(), 20)?;

    Ok(())
}

/// Validates a product edit.
pub fn validate_product_patch(patch: &ProductPatch) -> ValidationResult<()> {
    if let Some(name) = patch.name.as_deref() {
        validate_product_name(name)?;
    }
    if let Some(barcode) = patch.barcode.as_deref() {
        validate_barcode(barcode)?;
    }
    if let Some(cents) = patch.purchase_price_cents {
        validate_amount_cents("purchase_price", cents)?;
    }
    if let Some(cents) = patch.sale_price_cents {
        validate_amount_cents("sale_price", cents)?;
    }
    if let Some(level) = patch.min_stock_level {
        if level < 0 {
            return Err(ValidationError::Negative {
                field: "min_stock_level".to_string(),
            });
        }
    }
    validate_optional_text("category", patch.category.as_ref(), 100)?;
    validate_optional_text("unit", patch.unit.as_ref(), 20)?;
    Ok(())
}

/// Validates a sale request's shape. Totals are checked once prices are known.
pub fn validate_sale_request(req: &NewSaleOrder) -> ValidationResult<()> {
    validate_lines("items", &req.items, false)?;
    validate_amount_cents("tax", req.tax_cents.unwrap_or(0))?;
    validate_amount_cents("discount", req.discount_cents.unwrap_or(0))?;
    validate_optional_text("customer_name", req.customer_name.as_ref(), 200)?;
    validate_optional_text("customer_phone", req.customer_phone.as_ref(), 30)?;
    validate_optional_text("notes", req.notes.as_ref(), 1000)?;
    Ok(())
}

fn validate_original_code(code: &str) -> ValidationResult<()> {
    if code.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "original_order_code".to_string(),
        });
    }
    Ok(())
}

/// Validates a return request's shape.
pub fn validate_return_request(req: &ReturnRequest) -> ValidationResult<()> {
    validate_original_code(&req.original_order_code)?;
    validate_lines("return_items", &req.return_items, false)?;
    validate_optional_text("notes", req.notes.as_ref(), 1000)
}

/// Validates an exchange request's shape.
///
/// Both sides must be present: an exchange without replacements is a return,
/// and one without returned lines is a sale.
pub fn validate_exchange_request(req: &ExchangeRequest) -> ValidationResult<()> {
    validate_original_code(&req.original_order_code)?;
    validate_lines("return_items", &req.return_items, false)?;
    // exchange_items is optional on the wire because returns share the input
    // shape. Without replacements the request is a return and goes through
    // create_return, which books the refund as a negative RF total; a
    // zero-total EX document would record it nowhere.
    validate_lines("exchange_items", &req.exchange_items, false)?;
    validate_optional_text("notes", req.notes.as_ref(), 1000)
}

fn validate_purchase_line(line: &PurchaseLineRequest) -> ValidationResult<()> {
    validate_uuid("product_id", &line.product_id)?;

    if line.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if line.quantity > MAX_PURCHASE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_PURCHASE_QUANTITY,
        });
    }

    validate_amount_cents("purchase_price", line.purchase_price_cents)
}

/// Validates a purchase intake request.
pub fn validate_purchase_request(req: &NewPurchase) -> ValidationResult<()> {
    if req.items.is_empty() {
        return Err(ValidationError::Empty {
            field: "items".to_string(),
        });
    }
    if req.items.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }
    for line in &req.items {
        validate_purchase_line(line)?;
    }
    validate_optional_text("supplier", req.supplier.as_ref(), 200)?;
    validate_optional_text("notes", req.notes.as_ref(), 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StockOperation;

    const PRODUCT: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("SOAP-01").is_ok());
        assert!(validate_sku("A1").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("5901234123457").is_ok());
        assert!(validate_barcode("12a4").is_err());
        assert!(validate_barcode("12").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_amount_cents() {
        assert!(validate_amount_cents("sale_price", 0).is_ok());
        assert!(validate_amount_cents("sale_price", MAX_AMOUNT_CENTS).is_ok());
        assert!(matches!(
            validate_amount_cents("sale_price", MAX_AMOUNT_CENTS + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate_amount_cents("tax", -1),
            Err(ValidationError::Negative { .. })
        ));
    }

    #[test]
    fn test_oversized_price_is_rejected() {
        let dto = NewProduct {
            sku: "GOLD-1".into(),
            name: "Gold bar".into(),
            sale_price_cents: Some(i64::MAX / 2 + 1),
            ..Default::default()
        };
        assert!(matches!(
            validate_new_product(&dto),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_ledger_quantity() {
        assert!(validate_ledger_quantity(StockOperation::Set, 0).is_ok());
        assert!(validate_ledger_quantity(StockOperation::Set, -1).is_err());
        assert!(validate_ledger_quantity(StockOperation::Add, 0).is_err());
        assert!(validate_ledger_quantity(StockOperation::Subtract, 3).is_ok());
    }

    #[test]
    fn test_validate_new_product_rejects_blank_sku() {
        let dto = NewProduct {
            sku: "  ".into(),
            name: "Soap".into(),
            ..Default::default()
        };
        assert!(matches!(
            validate_new_product(&dto),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_sale_request() {
        let mut req = NewSaleOrder {
            items: vec![LineRequest::new(PRODUCT, 2)],
            created_by: "clerk".into(),
            ..Default::default()
        };
        assert!(validate_sale_request(&req).is_ok());

        req.discount_cents = Some(-5);
        assert!(validate_sale_request(&req).is_err());

        req.discount_cents = None;
        req.items.clear();
        assert!(matches!(
            validate_sale_request(&req),
            Err(ValidationError::Empty { .. })
        ));

        req.items.push(LineRequest::new("not-a-uuid", 1));
        assert!(validate_sale_request(&req).is_err());
    }

    #[test]
    fn test_validate_exchange_needs_both_sides() {
        let req = ExchangeRequest {
            original_order_code: "ORD2610160001".into(),
            return_items: vec![LineRequest::new(PRODUCT, 1)],
            exchange_items: vec![],
            ..Default::default()
        };
        assert!(matches!(
            validate_exchange_request(&req),
            Err(ValidationError::Empty { ref field }) if field == "exchange_items"
        ));

        let req = ExchangeRequest {
            return_items: vec![],
            exchange_items: vec![LineRequest::new(PRODUCT, 1)],
            ..req
        };
        assert!(matches!(
            validate_exchange_request(&req),
            Err(ValidationError::Empty { ref field }) if field == "return_items"
        ));
    }

    #[test]
    fn test_validate_purchase_request() {
        let req = NewPurchase {
            items: vec![PurchaseLineRequest {
                product_id: PRODUCT.into(),
                quantity: 5000,
                purchase_price_cents: 120,
            }],
            ..Default::default()
        };
        assert!(validate_purchase_request(&req).is_ok());

        let req = NewPurchase {
            items: vec![PurchaseLineRequest {
                product_id: PRODUCT.into(),
                quantity: 1,
                purchase_price_cents: -1,
            }],
            ..Default::default()
        };
        assert!(validate_purchase_request(&req).is_err());
    }
}
