//! # Document Number Counters
//!
//! Allocates `ORD`/`EX`/`RF`/`PUR` numbers from per-day, per-kind counter
//! rows.
//!
//! ```text
//! INSERT INTO sequences (scope, day, value) VALUES ('sale', '261016', 1)
//! ON CONFLICT (scope, day) DO UPDATE SET value = value + 1
//! RETURNING value                                  → 7 → "ORD2610160007"
//! ```
//!
//! The upsert is a single write, so two concurrent sales can never read the
//! same count. Callers allocate inside their own transaction: a rolled back
//! order gives its number back.

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use shopkeep_core::numbering::{day_key, format_document_number, DocumentKind};

/// Allocates the next number for `kind` on `date`.
pub(crate) async fn next_document_number(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    date: NaiveDate,
) -> DbResult<String> {
    let day = day_key(date);

    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (scope, day, value) VALUES (?1, ?2, 1)
        ON CONFLICT (scope, day) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(kind.scope())
    .bind(&day)
    .fetch_one(conn)
    .await?;

    let number = format_document_number(kind, date, value);
    debug!(scope = kind.scope(), day = %day, number = %number, "Allocated document number");
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_counters_are_per_kind_and_day() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();

        let a = next_document_number(&mut conn, DocumentKind::Sale, day).await.unwrap();
        let b = next_document_number(&mut conn, DocumentKind::Sale, day).await.unwrap();
        let ex = next_document_number(&mut conn, DocumentKind::Exchange, day).await.unwrap();
        let c = next_document_number(&mut conn, DocumentKind::Sale, next_day).await.unwrap();

        assert_eq!(a, "ORD2610160001");
        assert_eq!(b, "ORD2610160002");
        assert_eq!(ex, "EX2610160001");
        assert_eq!(c, "ORD2610170001");
    }
}
