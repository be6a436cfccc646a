//! Sources that do not talk to the legacy site
//!
//! Currencies and order statuses never existed in KIS2; they are seeded from
//! configuration through [`SeededSource`]. [`StaticSource`] serves fixed
//! batches, which is what offline runs and tests feed the importer with.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{SourceError, SourceExtractor};
use crate::import::types::EntityKind;

/// Serves configured seed batches and delegates everything else
pub struct SeededSource {
    inner: Box<dyn SourceExtractor>,
    seeds: HashMap<EntityKind, Vec<Value>>,
}

impl SeededSource {
    pub fn new(inner: Box<dyn SourceExtractor>) -> Self {
        SeededSource {
            inner,
            seeds: HashMap::new(),
        }
    }

    /// Serve `records` for `kind` instead of asking the inner source
    pub fn with_seed(mut self, kind: EntityKind, records: Vec<Value>) -> Self {
        self.seeds.insert(kind, records);
        self
    }

    /// Seed a name-only entity type from a list of names
    pub fn with_names<S: AsRef<str>>(self, kind: EntityKind, names: &[S]) -> Self {
        let records = names.iter().map(|n| json!({ "name": n.as_ref() })).collect();
        self.with_seed(kind, records)
    }

    pub fn is_seeded(&self, kind: EntityKind) -> bool {
        self.seeds.contains_key(&kind)
    }
}

#[async_trait]
impl SourceExtractor for SeededSource {
    async fn fetch(&self, kind: EntityKind) -> Result<Vec<Value>, SourceError> {
        match self.seeds.get(&kind) {
            Some(records) => {
                log::debug!("Serving {} seeded {} records", records.len(), kind);
                Ok(records.clone())
            }
            None => self.inner.fetch(kind).await,
        }
    }
}

/// Fixed per-entity batches; entity types without a batch yield no records
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    batches: HashMap<EntityKind, Result<Vec<Value>, SourceError>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, kind: EntityKind, records: Vec<Value>) -> Self {
        self.batches.insert(kind, Ok(records));
        self
    }

    /// Make fetching `kind` fail with `error`
    pub fn with_error(mut self, kind: EntityKind, error: SourceError) -> Self {
        self.batches.insert(kind, Err(error));
        self
    }

    /// Check if a batch (or error) is registered for `kind`
    pub fn contains(&self, kind: EntityKind) -> bool {
        self.batches.contains_key(&kind)
    }

    /// Load batches from a JSON object keyed by entity slug
    pub fn from_document(document: Value) -> Result<Self, String> {
        let Value::Object(entries) = document else {
            return Err("expected an object keyed by entity type".to_string());
        };

        let mut source = StaticSource::new();
        for (name, records) in entries {
            let kind: EntityKind = name.parse()?;
            let Value::Array(records) = records else {
                return Err(format!("'{}' must be an array of records", name));
            };
            source = source.with_records(kind, records);
        }
        Ok(source)
    }
}

#[async_trait]
impl SourceExtractor for StaticSource {
    async fn fetch(&self, kind: EntityKind) -> Result<Vec<Value>, SourceError> {
        self.batches.get(&kind).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}
