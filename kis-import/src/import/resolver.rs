//! Name-to-id resolution of source references
//!
//! References arrive as natural keys of upstream rows. They are looked up in
//! per-entity lookup tables that are loaded once and kept for the run, and
//! handled per the reference's missing-value policy when they do not resolve.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use sqlx::SqliteConnection;

use super::records::RowContext;
use super::types::{
    EntityDescriptor, EntityKind, MissingReference, NaturalKey, Reference, ResolvedRow,
    SkippedRecord, SourceRow, Value,
};
use crate::store::{insert_query, load_rows};

/// Natural key -> destination identity for one entity type
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    ids: HashMap<NaturalKey, Value>,
}

impl LookupTable {
    pub fn get(&self, key: &NaturalKey) -> Option<&Value> {
        self.ids.get(key)
    }

    pub fn insert(&mut self, key: NaturalKey, id: Value) {
        self.ids.insert(key, id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Run-level cache of lookup tables
///
/// Tables are loaded lazily on first use. Any table an entity stage wrote to
/// must be invalidated before the next stage reads it.
#[derive(Debug, Default)]
pub struct LookupCache {
    tables: HashMap<EntityKind, LookupTable>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lookup table for `kind`, loading it through `conn` if needed
    pub async fn table(
        &mut self,
        conn: &mut SqliteConnection,
        kind: EntityKind,
    ) -> Result<&mut LookupTable> {
        match self.tables.entry(kind) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let rows = load_rows(conn, kind.descriptor()).await?;
                log::debug!("Loaded {} lookup keys for {}", rows.len(), kind);
                let mut table = LookupTable::default();
                for row in rows {
                    table.insert(row.key, row.id);
                }
                Ok(entry.insert(table))
            }
        }
    }

    /// Check if a table is currently cached
    pub fn is_cached(&self, kind: EntityKind) -> bool {
        self.tables.contains_key(&kind)
    }

    /// Drop the cached table for `kind`
    pub fn invalidate(&mut self, kind: EntityKind) {
        if self.tables.remove(&kind).is_some() {
            log::debug!("Invalidated lookup cache for {}", kind);
        }
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

/// Outcome of resolving one batch
#[derive(Debug, Default)]
pub struct Resolution {
    pub rows: Vec<ResolvedRow>,
    /// Records dropped because a reference did not resolve
    pub skipped: Vec<SkippedRecord>,
    pub stubs_created: usize,
    /// Entity tables written to while resolving (stub inserts)
    pub touched: BTreeSet<EntityKind>,
}

/// Turn the by-name references of `rows` into destination ids
///
/// Stubs are inserted through `conn`, so they share the caller's transaction.
/// A record's stubs are only created once every other reference of that
/// record has resolved, so skipped records never leave stub rows behind.
pub async fn resolve_rows(
    conn: &mut SqliteConnection,
    cache: &mut LookupCache,
    descriptor: &EntityDescriptor,
    rows: Vec<SourceRow>,
    ctx: &RowContext,
) -> Result<Resolution> {
    let mut resolution = Resolution::default();

    'rows: for row in rows {
        let SourceRow { key, mut values, references, .. } = row;
        let mut stubbable: Vec<(&Reference, NaturalKey)> = Vec::new();

        for reference in descriptor.references {
            let target = references.get(reference.column).cloned().flatten();
            let Some(target_key) = target else {
                if reference.required {
                    log::warn!("{}: skipping '{}': no {} given", descriptor.kind, key, reference.target);
                    skip(&mut resolution, &key, format!("missing required {}", reference.target));
                    continue 'rows;
                }
                values.insert(reference.column, Value::Null);
                continue;
            };

            if reference.on_missing == MissingReference::CreateStub {
                stubbable.push((reference, target_key));
                continue;
            }

            let found = cache.table(conn, reference.target).await?.get(&target_key).cloned();
            match found {
                Some(id) => {
                    values.insert(reference.column, id);
                }
                None if reference.on_missing == MissingReference::Null => {
                    log::warn!(
                        "{}: '{}' references unknown {} '{}', writing NULL",
                        descriptor.kind,
                        key,
                        reference.target,
                        target_key
                    );
                    values.insert(reference.column, Value::Null);
                }
                None => {
                    log::warn!(
                        "{}: skipping '{}': {} '{}' not found",
                        descriptor.kind,
                        key,
                        reference.target,
                        target_key
                    );
                    skip(&mut resolution, &key, format!("{} '{}' not found", reference.target, target_key));
                    continue 'rows;
                }
            }
        }

        for (reference, target_key) in stubbable {
            match lookup(conn, cache, reference, &target_key, ctx, &mut resolution).await? {
                Some(id) => {
                    values.insert(reference.column, id);
                }
                None => {
                    skip(&mut resolution, &key, format!("{} '{}' not found", reference.target, target_key));
                    continue 'rows;
                }
            }
        }

        resolution.rows.push(ResolvedRow { key, values });
    }

    Ok(resolution)
}

fn skip(resolution: &mut Resolution, key: &NaturalKey, reason: String) {
    resolution.skipped.push(SkippedRecord {
        record: key.to_string(),
        reason,
    });
}

/// Resolve one reference, creating a stub when the policy allows it
async fn lookup(
    conn: &mut SqliteConnection,
    cache: &mut LookupCache,
    reference: &Reference,
    key: &NaturalKey,
    ctx: &RowContext,
    resolution: &mut Resolution,
) -> Result<Option<Value>> {
    if let Some(id) = cache.table(conn, reference.target).await?.get(key) {
        return Ok(Some(id.clone()));
    }
    if reference.on_missing != MissingReference::CreateStub {
        return Ok(None);
    }

    match reference.target {
        EntityKind::Country => {
            let id = insert_stub(conn, cache, EntityKind::Country, key, stub_values(key), resolution).await?;
            Ok(Some(id))
        }
        EntityKind::City => {
            let country_key = NaturalKey::single(EntityKind::Country, &ctx.default_country)
                .context("Invalid default country")?;
            let existing = cache
                .table(conn, EntityKind::Country)
                .await?
                .get(&country_key)
                .cloned();
            let country_id = match existing {
                Some(id) => id,
                None => {
                    insert_stub(
                        conn,
                        cache,
                        EntityKind::Country,
                        &country_key,
                        stub_values(&country_key),
                        resolution,
                    )
                    .await?
                }
            };

            let mut values = stub_values(key);
            values.insert("country_id", country_id);
            let id = insert_stub(conn, cache, EntityKind::City, key, values, resolution).await?;
            Ok(Some(id))
        }
        other => {
            log::warn!("{} rows cannot be stub-created", other);
            Ok(None)
        }
    }
}

/// Minimal values of a name-keyed stub row
fn stub_values(key: &NaturalKey) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([("name", Value::text(key.components().concat()))])
}

async fn insert_stub(
    conn: &mut SqliteConnection,
    cache: &mut LookupCache,
    kind: EntityKind,
    key: &NaturalKey,
    values: BTreeMap<&'static str, Value>,
    resolution: &mut Resolution,
) -> Result<Value> {
    let descriptor = kind.descriptor();
    let columns: Vec<_> = descriptor
        .insert_columns()
        .into_iter()
        .filter(|c| values.contains_key(c.name))
        .collect();

    let mut builder = insert_query(descriptor, &columns, [&values]);
    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to create {} stub '{}'", kind, key))?;

    let id = Value::Int(result.last_insert_rowid());
    cache.table(conn, kind).await?.insert(key.clone(), id.clone());
    resolution.stubs_created += 1;
    resolution.touched.insert(kind);

    log::info!("Created {} stub '{}' (id {})", kind, key, id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::connect_in_memory;

    fn manufacturer(name: &str, country: Option<&str>) -> SourceRow {
        SourceRow::new(
            EntityKind::Manufacturer,
            NaturalKey::single(EntityKind::Manufacturer, name).unwrap(),
        )
        .with_value("name", Value::text(name))
        .with_reference(
            "country_id",
            country.map(|c| NaturalKey::single(EntityKind::Country, c).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_country_stub_is_created_once() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO countries (name) VALUES ('Germany')")
            .execute(&pool)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let mut cache = LookupCache::new();
        let rows = vec![
            manufacturer("Siemens", Some("Germany")),
            manufacturer("Olivetti", Some("Italy")),
            manufacturer("Fiat", Some("Italy")),
        ];
        let resolution = resolve_rows(
            &mut conn,
            &mut cache,
            EntityKind::Manufacturer.descriptor(),
            rows,
            &RowContext::default(),
        )
        .await
        .unwrap();

        assert_eq!(resolution.rows.len(), 3);
        assert_eq!(resolution.stubs_created, 1);
        assert!(resolution.touched.contains(&EntityKind::Country));
        assert_eq!(resolution.rows[0].get("country_id"), &Value::Int(1));
        assert_eq!(resolution.rows[1].get("country_id"), &Value::Int(2));
        assert_eq!(resolution.rows[2].get("country_id"), &Value::Int(2));
    }

    #[tokio::test]
    async fn test_missing_required_reference_skips() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let mut cache = LookupCache::new();

        let resolution = resolve_rows(
            &mut conn,
            &mut cache,
            EntityKind::Manufacturer.descriptor(),
            vec![manufacturer("Nameless", None)],
            &RowContext::default(),
        )
        .await
        .unwrap();

        assert!(resolution.rows.is_empty());
        assert_eq!(resolution.skipped.len(), 1);
        assert_eq!(resolution.stubs_created, 0);
    }

    #[tokio::test]
    async fn test_skip_and_null_policies() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let mut cache = LookupCache::new();

        let person = SourceRow::new(
            EntityKind::Person,
            NaturalKey::new(EntityKind::Person, &[Some("Ivanov"), Some("Ivan"), None]).unwrap(),
        )
        .with_reference(
            "counterparty_id",
            Some(NaturalKey::single(EntityKind::Counterparty, "Ghost LLC").unwrap()),
        );
        let resolution = resolve_rows(
            &mut conn,
            &mut cache,
            EntityKind::Person.descriptor(),
            vec![person],
            &RowContext::default(),
        )
        .await
        .unwrap();
        assert_eq!(resolution.rows.len(), 1);
        assert_eq!(resolution.rows[0].get("counterparty_id"), &Value::Null);

        let counterparty = SourceRow::new(
            EntityKind::Counterparty,
            NaturalKey::single(EntityKind::Counterparty, "Barion").unwrap(),
        )
        .with_reference(
            "form_id",
            Some(NaturalKey::single(EntityKind::CounterpartyForm, "ООО").unwrap()),
        );
        let resolution = resolve_rows(
            &mut conn,
            &mut cache,
            EntityKind::Counterparty.descriptor(),
            vec![counterparty],
            &RowContext::default(),
        )
        .await
        .unwrap();
        assert!(resolution.rows.is_empty());
        assert_eq!(resolution.skipped[0].record, "Barion");
    }

    fn counterparty(name: &str, city: &str, form: &str) -> SourceRow {
        SourceRow::new(
            EntityKind::Counterparty,
            NaturalKey::single(EntityKind::Counterparty, name).unwrap(),
        )
        .with_reference("city_id", Some(NaturalKey::single(EntityKind::City, city).unwrap()))
        .with_reference(
            "form_id",
            Some(NaturalKey::single(EntityKind::CounterpartyForm, form).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_city_stub_uses_default_country() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO counterparty_form (name) VALUES ('ООО')")
            .execute(&pool)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let mut cache = LookupCache::new();

        let resolution = resolve_rows(
            &mut conn,
            &mut cache,
            EntityKind::Counterparty.descriptor(),
            vec![counterparty("Barion", "Томск", "ООО")],
            &RowContext::default(),
        )
        .await
        .unwrap();

        assert_eq!(resolution.rows.len(), 1);
        assert_eq!(resolution.stubs_created, 2);
        let country: String = sqlx::query_scalar(
            "SELECT countries.name FROM cities JOIN countries ON countries.id = cities.country_id WHERE cities.name = 'Томск'",
        )
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!(country, "Россия");
    }

    #[tokio::test]
    async fn test_skipped_record_creates_no_stubs() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let mut cache = LookupCache::new();

        let resolution = resolve_rows(
            &mut conn,
            &mut cache,
            EntityKind::Counterparty.descriptor(),
            vec![counterparty("Ghost", "Томск", "НетТакой")],
            &RowContext::default(),
        )
        .await
        .unwrap();

        assert!(resolution.rows.is_empty());
        assert_eq!(resolution.skipped.len(), 1);
        assert_eq!(resolution.stubs_created, 0);
        assert!(resolution.touched.is_empty());

        for table in ["cities", "countries"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&mut *conn)
                .await
                .unwrap();
            assert_eq!(count, 0, "{} should stay empty", table);
        }
    }

    #[tokio::test]
    async fn test_invalidate_reloads_table() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let mut cache = LookupCache::new();

        assert!(cache.table(&mut conn, EntityKind::Country).await.unwrap().is_empty());
        sqlx::query("INSERT INTO countries (name) VALUES ('Germany')")
            .execute(&mut *conn)
            .await
            .unwrap();
        assert!(cache.table(&mut conn, EntityKind::Country).await.unwrap().is_empty());

        cache.invalidate(EntityKind::Country);
        assert!(!cache.is_cached(EntityKind::Country));
        assert_eq!(cache.table(&mut conn, EntityKind::Country).await.unwrap().len(), 1);
    }
}
