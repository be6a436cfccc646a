//! Row shapes flowing through the import pipeline

use std::collections::BTreeMap;

use super::entity::EntityKind;
use super::key::NaturalKey;
use super::value::Value;

/// A validated source record before its references are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Entity type the row belongs to
    pub kind: EntityKind,
    /// Natural key of the row itself
    pub key: NaturalKey,
    /// Plain column values (key columns and non-reference tracked columns)
    pub values: BTreeMap<&'static str, Value>,
    /// Reference column -> natural key of the referenced row (None if absent)
    pub references: BTreeMap<&'static str, Option<NaturalKey>>,
}

impl SourceRow {
    /// Start a row for `kind` with the given natural key
    pub fn new(kind: EntityKind, key: NaturalKey) -> Self {
        SourceRow {
            kind,
            key,
            values: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    /// Set a plain column value
    pub fn with_value(mut self, column: &'static str, value: Value) -> Self {
        self.values.insert(column, value);
        self
    }

    /// Set a by-name reference
    pub fn with_reference(mut self, column: &'static str, target: Option<NaturalKey>) -> Self {
        self.references.insert(column, target);
        self
    }
}

/// A source row whose references have all been turned into destination ids
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub key: NaturalKey,
    /// Every insert column of the entity type
    pub values: BTreeMap<&'static str, Value>,
}

impl ResolvedRow {
    /// Get a column value (missing columns read as Null)
    pub fn get(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(column).unwrap_or(&NULL)
    }
}

/// A row currently stored in the destination table
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRow {
    /// Identity column value (surrogate id or serial)
    pub id: Value,
    pub key: NaturalKey,
    /// Tracked column values
    pub values: BTreeMap<&'static str, Value>,
}

impl DestinationRow {
    /// Get a column value (missing columns read as Null)
    pub fn get(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(column).unwrap_or(&NULL)
    }
}
