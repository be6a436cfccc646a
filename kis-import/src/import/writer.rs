//! Transactional writes of a reconciled batch
//!
//! New rows go out as one multi-row `INSERT` (split only where the SQLite bind
//! parameter limit demands it), changed rows as one `UPDATE` each touching just
//! the differing columns. All statements run on the caller's transaction; the
//! caller commits only when every statement succeeded.

use anyhow::{Context, Result, bail};
use sqlx::SqliteConnection;

use super::reconcile::Reconciliation;
use super::types::EntityDescriptor;
use crate::store::{insert_query, update_query};

/// Conservative bind parameter limit (SQLite builds before 3.32 allow 999)
pub const MAX_BIND_PARAMS: usize = 999;

/// Rows written by one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub added: usize,
    pub updated: usize,
}

/// How many rows fit one insert statement for `columns` columns
pub fn rows_per_insert(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Write `plan` through `conn`
///
/// Any failing statement aborts the batch with an error; the caller's
/// transaction must then be rolled back.
pub async fn write_batch(
    conn: &mut SqliteConnection,
    descriptor: &EntityDescriptor,
    plan: &Reconciliation,
) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();

    if !plan.new.is_empty() {
        let columns = descriptor.insert_columns();
        for chunk in plan.new.chunks(rows_per_insert(columns.len())) {
            let mut builder = insert_query(descriptor, &columns, chunk.iter().map(|row| &row.values));
            let result = builder
                .build()
                .execute(&mut *conn)
                .await
                .with_context(|| format!("Failed to insert into {}", descriptor.table))?;
            summary.added += result.rows_affected() as usize;
        }
        log::debug!("{}: inserted {} rows", descriptor.table, summary.added);
    }

    for row in &plan.changed {
        let assignments = row.assignments();
        let mut builder = update_query(descriptor, &row.id, &assignments);
        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to update {} '{}'", descriptor.table, row.key))?;
        if result.rows_affected() != 1 {
            bail!(
                "Update of {} '{}' affected {} rows",
                descriptor.table,
                row.key,
                result.rows_affected()
            );
        }

        let columns: Vec<_> = row.changes.iter().map(|c| c.column).collect();
        log::debug!("{}: updated '{}' ({})", descriptor.table, row.key, columns.join(", "));
        summary.updated += 1;
    }

    Ok(summary)
}
