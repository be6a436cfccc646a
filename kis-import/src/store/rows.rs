//! Generic row access driven by entity descriptors

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::import::types::{Column, ColumnType, DestinationRow, EntityDescriptor, NaturalKey, Value};

/// Load every row of an entity table with its identity, key and tracked columns
///
/// Rows whose key columns are all empty cannot be matched and are left out
/// with a warning.
pub async fn load_rows(
    conn: &mut SqliteConnection,
    descriptor: &EntityDescriptor,
) -> Result<Vec<DestinationRow>> {
    let columns = descriptor.insert_columns();
    let mut selected: Vec<&str> = vec![descriptor.id.name];
    selected.extend(columns.iter().map(|c| c.name).filter(|n| *n != descriptor.id.name));

    let sql = format!("SELECT {} FROM {}", selected.join(", "), descriptor.table);
    let records = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("Failed to read {}", descriptor.table))?;

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let id = read_value(&record, descriptor.id)?;
        let mut values = BTreeMap::new();
        for column in &columns {
            values.insert(column.name, read_value(&record, *column)?);
        }

        let parts: Vec<Option<String>> = descriptor
            .key
            .iter()
            .map(|c| values.get(c.name).map(Value::key_component))
            .collect();

        match NaturalKey::new(descriptor.kind, &parts) {
            Ok(key) => rows.push(DestinationRow { id, key, values }),
            Err(err) => log::warn!("{}: ignoring row {}: {}", descriptor.table, id, err),
        }
    }

    Ok(rows)
}

fn read_value(record: &SqliteRow, column: Column) -> Result<Value> {
    let name = column.name;
    let value = match column.ty {
        ColumnType::Text => Value::opt_text(record.try_get(name)?),
        ColumnType::Integer => Value::opt_int(record.try_get(name)?),
        ColumnType::Bool => record
            .try_get::<Option<bool>, _>(name)?
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        ColumnType::Date => Value::opt_date(record.try_get(name)?),
        ColumnType::DateTime => Value::opt_datetime(record.try_get(name)?),
    };
    Ok(value)
}

/// Append a value to a statement as a bind parameter (NULL is written inline)
pub fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value.clone() {
        Value::Null => builder.push("NULL"),
        Value::Text(s) => builder.push_bind(s),
        Value::Int(i) => builder.push_bind(i),
        Value::Bool(b) => builder.push_bind(b),
        Value::Date(d) => builder.push_bind(d),
        Value::DateTime(dt) => builder.push_bind(dt),
    };
}

/// Build one multi-row `INSERT` for `rows`, writing `columns` in order
///
/// Columns missing from a row are written as NULL.
pub fn insert_query<'r>(
    descriptor: &EntityDescriptor,
    columns: &[Column],
    rows: impl IntoIterator<Item = &'r BTreeMap<&'static str, Value>>,
) -> QueryBuilder<'static, Sqlite> {
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES ",
        descriptor.table,
        names.join(", ")
    ));

    for (row_index, values) in rows.into_iter().enumerate() {
        if row_index > 0 {
            builder.push(", ");
        }
        builder.push("(");
        for (col_index, column) in columns.iter().enumerate() {
            if col_index > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, values.get(column.name).unwrap_or(&Value::Null));
        }
        builder.push(")");
    }

    builder
}

/// Build an `UPDATE` touching only `changes` on the row identified by `id`
pub fn update_query(
    descriptor: &EntityDescriptor,
    id: &Value,
    changes: &[(&'static str, Value)],
) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", descriptor.table));
    for (index, (column, value)) in changes.iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        builder.push(format!("{} = ", column));
        push_value(&mut builder, value);
    }
    builder.push(format!(" WHERE {} = ", descriptor.id.name));
    push_value(&mut builder, id);
    builder
}
