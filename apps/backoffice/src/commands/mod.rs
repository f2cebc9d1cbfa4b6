//! # Back-office Commands
//!
//! Functions an API layer calls directly. Each takes the shared
//! [`Database`](shopkeep_db::Database) handle, speaks camelCase DTOs and
//! returns `Result<_, ApiError>`.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (exports)
//! ├── product.rs   ◄─── Catalog, search, stock ledger
//! ├── order.rs     ◄─── Sales, debts, exchanges, returns, cancellation
//! ├── purchase.rs  ◄─── Supplier deliveries
//! └── report.rs    ◄─── Statistics, restock recommendations
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  API handler                                                           │
//! │     let input: SaleInput = serde_json::from_slice(body)?;              │
//! │     commands::order::create_sale(&db, &actor, input).await             │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  shopkeep-db transaction ──► Order ──► OrderDto (camelCase JSON)       │
//! │         │                                                               │
//! │         ▼ on failure                                                    │
//! │  ApiError { code: "INSUFFICIENT_STOCK", message: "..." }               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod order;
pub mod product;
pub mod purchase;
pub mod report;
