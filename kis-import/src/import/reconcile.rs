//! Natural-key reconciliation of resolved source rows against the destination
//!
//! One generic routine serves every entity type: rows are matched by natural
//! key and classified as new, changed or unchanged by comparing the tracked
//! columns of the entity descriptor.

use std::collections::{HashMap, HashSet};

use super::types::{DestinationRow, EntityDescriptor, NaturalKey, ResolvedRow, Value};

/// A tracked column whose value differs between source and destination
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub column: &'static str,
    pub old: Value,
    pub new: Value,
}

/// An existing destination row that needs an update
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedRow {
    /// Identity of the destination row
    pub id: Value,
    pub key: NaturalKey,
    /// Only the columns that differ
    pub changes: Vec<FieldChange>,
}

impl ChangedRow {
    /// Column assignments for the update statement
    pub fn assignments(&self) -> Vec<(&'static str, Value)> {
        self.changes.iter().map(|c| (c.column, c.new.clone())).collect()
    }
}

/// Classification of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Rows with no destination counterpart, in source order
    pub new: Vec<ResolvedRow>,
    pub changed: Vec<ChangedRow>,
    pub unchanged: Vec<NaturalKey>,
}

impl Reconciliation {
    /// Number of rows classified
    pub fn len(&self) -> usize {
        self.new.len() + self.changed.len() + self.unchanged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a batch could not be reconciled
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("natural key '{0}' appears more than once in the source batch")]
    DuplicateSourceKey(NaturalKey),
    #[error("natural key '{0}' matches more than one destination row")]
    DuplicateDestinationKey(NaturalKey),
}

/// Classify `source` rows against the current `destination` rows
pub fn reconcile(
    descriptor: &EntityDescriptor,
    source: Vec<ResolvedRow>,
    destination: Vec<DestinationRow>,
) -> Result<Reconciliation, ReconcileError> {
    let mut existing: HashMap<NaturalKey, DestinationRow> = HashMap::with_capacity(destination.len());
    for row in destination {
        if existing.contains_key(&row.key) {
            return Err(ReconcileError::DuplicateDestinationKey(row.key));
        }
        existing.insert(row.key.clone(), row);
    }

    let mut seen: HashSet<NaturalKey> = HashSet::with_capacity(source.len());
    for row in &source {
        if !seen.insert(row.key.clone()) {
            return Err(ReconcileError::DuplicateSourceKey(row.key.clone()));
        }
    }

    let mut result = Reconciliation::default();
    for row in source {
        let Some(current) = existing.get(&row.key) else {
            result.new.push(row);
            continue;
        };

        let changes: Vec<FieldChange> = descriptor
            .tracked
            .iter()
            .filter(|column| !row.get(column.name).same_as(current.get(column.name)))
            .map(|column| FieldChange {
                column: column.name,
                old: current.get(column.name).clone(),
                new: row.get(column.name).clone(),
            })
            .collect();

        if changes.is_empty() {
            result.unchanged.push(row.key);
        } else {
            result.changed.push(ChangedRow {
                id: current.id.clone(),
                key: row.key,
                changes,
            });
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::types::EntityKind;
    use std::collections::BTreeMap;

    fn country(name: &str) -> ResolvedRow {
        ResolvedRow {
            key: NaturalKey::single(EntityKind::Country, name).unwrap(),
            values: BTreeMap::from([("name", Value::text(name))]),
        }
    }

    fn stored_country(id: i64, name: &str) -> DestinationRow {
        DestinationRow {
            id: Value::Int(id),
            key: NaturalKey::single(EntityKind::Country, name).unwrap(),
            values: BTreeMap::from([("name", Value::text(name))]),
        }
    }

    fn work(name: &str, description: Option<&str>, active: bool) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("name", Value::text(name)),
            ("description", Value::opt_text(description.map(String::from))),
            ("active", Value::Bool(active)),
        ])
    }

    #[test]
    fn test_countries_classification() {
        let descriptor = EntityKind::Country.descriptor();
        let first = reconcile(descriptor, vec![country("Germany"), country("Russia")], vec![]).unwrap();
        assert_eq!(first.new.len(), 2);

        let stored = vec![stored_country(1, "Germany"), stored_country(2, "Russia")];
        let second = reconcile(
            descriptor,
            vec![country("Germany"), country("Russia"), country("France")],
            stored,
        )
        .unwrap();
        assert_eq!(second.new.len(), 1);
        assert_eq!(second.new[0].key.to_string(), "France");
        assert_eq!(second.unchanged.len(), 2);
        assert!(second.changed.is_empty());
    }

    #[test]
    fn test_change_detection_is_field_scoped() {
        let descriptor = EntityKind::Work.descriptor();
        let key = NaturalKey::single(EntityKind::Work, "Сборка").unwrap();
        let source = ResolvedRow {
            key: key.clone(),
            values: work("Сборка", Some("шкафы"), false),
        };
        let stored = DestinationRow {
            id: Value::Int(7),
            key,
            values: work("Сборка", Some("шкафы"), true),
        };

        let result = reconcile(descriptor, vec![source], vec![stored]).unwrap();
        assert_eq!(result.changed.len(), 1);
        let changed = &result.changed[0];
        assert_eq!(changed.id, Value::Int(7));
        assert_eq!(changed.assignments(), vec![("active", Value::Bool(false))]);
    }

    #[test]
    fn test_null_and_empty_are_unchanged() {
        let descriptor = EntityKind::Work.descriptor();
        let key = NaturalKey::single(EntityKind::Work, "Пайка").unwrap();
        let mut source_values = work("Пайка", None, true);
        source_values.insert("description", Value::Text(String::new()));
        let source = ResolvedRow { key: key.clone(), values: source_values };
        let stored = DestinationRow { id: Value::Int(1), key, values: work("Пайка", None, true) };

        let result = reconcile(descriptor, vec![source], vec![stored]).unwrap();
        assert_eq!(result.unchanged.len(), 1);
    }

    #[test]
    fn test_duplicate_source_key_rejects_batch() {
        let descriptor = EntityKind::Country.descriptor();
        let err = reconcile(descriptor, vec![country("Germany"), country("Germany")], vec![]).unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateSourceKey(_)));
    }

    #[test]
    fn test_duplicate_destination_key_rejects_batch() {
        let descriptor = EntityKind::Currency.descriptor();
        let a = DestinationRow {
            id: Value::Int(1),
            key: NaturalKey::single(EntityKind::Currency, "usd").unwrap(),
            values: BTreeMap::new(),
        };
        let b = DestinationRow {
            id: Value::Int(2),
            key: NaturalKey::single(EntityKind::Currency, "USD").unwrap(),
            values: BTreeMap::new(),
        };
        let err = reconcile(descriptor, vec![], vec![a, b]).unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateDestinationKey(_)));
    }

    #[test]
    fn test_case_and_whitespace_are_distinct_keys() {
        let descriptor = EntityKind::Country.descriptor();
        let result = reconcile(
            descriptor,
            vec![country("germany"), country("Germany ")],
            vec![stored_country(1, "Germany")],
        )
        .unwrap();
        assert_eq!(result.new.len(), 2);
        assert!(result.unchanged.is_empty());
    }
}
