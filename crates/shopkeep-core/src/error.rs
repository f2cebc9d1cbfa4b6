//! # Error Types
//!
//! Domain-specific error types for shopkeep-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shopkeep-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  shopkeep-db errors (separate crate)                                   │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  backoffice errors (app)                                               │
//! │  └── ApiError         - What callers see (code + message)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Caller       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant maps to exactly one [`ErrorKind`]. Callers branch on the
//! kind; the message is for humans.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// Stable classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing product, order or purchase.
    NotFound,
    /// A SUBTRACT would drive stock below zero.
    InsufficientStock,
    /// Sale against a deactivated product.
    InactiveProduct,
    /// Return/exchange line not covered by the original sale.
    InvalidReturn,
    /// Operation not allowed in the record's current state.
    InvalidState,
    /// Malformed input.
    ValidationError,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record could not be found by id or business code.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Insufficient stock to complete the operation.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 8 × SOAP-01
    ///      │
    ///      ▼
    /// Ledger SUBTRACT: available=7
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "SOAP-01", available: 7, requested: 8 }
    ///      │
    ///      ▼
    /// Whole order rolled back, stock stays 7
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Product is deactivated and cannot be sold.
    #[error("Product {sku} is inactive")]
    InactiveProduct { sku: String },

    /// Return or exchange line exceeds what the original sale still covers.
    ///
    /// `returnable` is zero when the product was never on the original order.
    #[error(
        "Invalid return against {order_number}: product {product_id} requested {requested}, returnable {returnable}"
    )]
    InvalidReturn {
        order_number: String,
        product_id: String,
        requested: i64,
        returnable: i64,
    },

    /// Record is not in a state that allows the operation.
    #[error("{entity} {key} is {state}, cannot {operation}")]
    InvalidState {
        entity: &'static str,
        key: String,
        state: String,
        operation: &'static str,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error.
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::InactiveProduct { .. } => ErrorKind::InactiveProduct,
            CoreError::InvalidReturn { .. } => ErrorKind::InvalidReturn,
            CoreError::InvalidState { .. } => ErrorKind::InvalidState,
            CoreError::Validation(_) => ErrorKind::ValidationError,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A list that needs entries is empty.
    #[error("{field} must contain at least one entry")]
    Empty { field: String },

    /// A computed amount does not fit in `i64` cents.
    #[error("{field} is too large")]
    Overflow { field: String },
}

impl ValidationError {
    pub fn overflow(field: &str) -> Self {
        ValidationError::Overflow {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
