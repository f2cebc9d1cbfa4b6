//! # shopkeep-core: Pure Business Logic for Shopkeep
//!
//! This crate holds the rules that keep stock counts, money totals and the
//! sale/exchange/return/debt lifecycle consistent. Everything here is a pure
//! function over plain data; persistence and transactions live in
//! `shopkeep-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shopkeep Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              API layer / backoffice CLI (apps/backoffice)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  shopkeep-db (transactions)                     │   │
//! │  │   catalog + stock ledger │ order engine │ purchases │ reports   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shopkeep-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌────────┐ ┌────────┐  │   │
//! │  │   │  types  │ │  order  │ │ numbering │ │ stats  │ │restock │  │   │
//! │  │   │ Product │ │ pricing │ │ ORD/EX/RF │ │ profit │ │priority│  │   │
//! │  │   │  Order  │ │ returns │ │   /PUR    │ │ margin │ │  qty   │  │   │
//! │  │   └─────────┘ └─────────┘ └───────────┘ └────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Order, Purchase, statuses)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types and the stable [`ErrorKind`]
//! - [`validation`] - Input validation
//! - [`numbering`] - `PREFIX + YYMMDD + NNNN` document numbers
//! - [`order`] - Sale pricing, return/exchange reconciliation
//! - [`stats`] - Revenue/cost/profit aggregation
//! - [`restock`] - Restocking recommendation heuristic
//!
//! ## Example Usage
//!
//! ```rust
//! use shopkeep_core::money::Money;
//!
//! let unit_price = Money::from_cents(1250);
//! let line = unit_price.multiply_quantity(3);
//! assert_eq!(line.cents(), 3750);
//! ```

pub mod error;
pub mod money;
pub mod numbering;
pub mod order;
pub mod restock;
pub mod stats;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use numbering::DocumentKind;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single order or purchase.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single order line.
///
/// ## Business Reason
/// Prevents accidental over-ordering at the counter (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum quantity of a single purchase line.
///
/// Supplier deliveries come in cases and pallets, so the ceiling is higher
/// than for counter sales.
pub const MAX_PURCHASE_QUANTITY: i64 = 100_000;

/// Ceiling for any single money amount entered by a caller: unit prices,
/// purchase prices, tax and discount. One billion in major units.
///
/// With [`MAX_ORDER_LINES`] and [`MAX_PURCHASE_QUANTITY`] this keeps every
/// order and purchase total well inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;
