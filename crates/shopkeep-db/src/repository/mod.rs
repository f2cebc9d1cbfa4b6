//! # Repository Module
//!
//! Database repository implementations for Shopkeep.
//!
//! ## Transaction Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Each write operation is one transaction on one connection:            │
//! │                                                                         │
//! │   BEGIN                                                                 │
//! │     first statement is a write  (number upsert / conditional UPDATE)   │
//! │     reads + ledger moves        (helpers take &mut SqliteConnection)   │
//! │     inserts                                                             │
//! │   COMMIT   or drop → ROLLBACK                                          │
//! │                                                                         │
//! │  Starting with a write takes SQLite's write lock up front, so a        │
//! │  concurrent writer waits on busy_timeout instead of failing a lock     │
//! │  upgrade halfway through.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog, search, stock ledger
//! - [`OrderRepository`](order::OrderRepository) - Sales, debts, exchanges, returns
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Supplier intake
//! - [`ReportRepository`](report::ReportRepository) - Statistics, restock

pub mod order;
pub mod product;
pub mod purchase;
pub mod report;
pub(crate) mod sequence;
