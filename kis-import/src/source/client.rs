//! REST extractor for the KIS2 API

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::retry::RetryConfig;
use super::session::Kis2Session;
use super::{SourceError, SourceExtractor, json_type};
use crate::import::types::EntityKind;

/// Fields the API sends as numeric ids of another entity type
fn id_fields(kind: EntityKind) -> &'static [(&'static str, EntityKind)] {
    match kind {
        EntityKind::Manufacturer => &[("country", EntityKind::Country)],
        EntityKind::Counterparty => &[("city", EntityKind::City), ("form", EntityKind::CounterpartyForm)],
        EntityKind::Person => &[("company", EntityKind::Counterparty)],
        EntityKind::Order => &[("customer", EntityKind::Counterparty)],
        EntityKind::BoxAccounting => &[
            ("scheme_developer", EntityKind::Person),
            ("assembler", EntityKind::Person),
            ("programmer", EntityKind::Person),
            ("tester", EntityKind::Person),
        ],
        EntityKind::OrderComment => &[("person", EntityKind::Person)],
        _ => &[],
    }
}

/// Value standing in for a referenced record: its name, or its name parts for people
fn reference_label(kind: EntityKind, record: &Value) -> Option<Value> {
    match kind {
        EntityKind::Person => Some(json!({
            "surname": record.get("surname")?.as_str()?,
            "name": record.get("name")?.as_str()?,
            "patronymic": record.get("patronymic").cloned().unwrap_or(Value::Null),
        })),
        _ => record.get("name").filter(|v| v.is_string()).cloned(),
    }
}

/// Extractor backed by a logged-in KIS2 session
pub struct Kis2Source {
    session: Kis2Session,
    endpoints: HashMap<EntityKind, String>,
    retry: RetryConfig,
    /// entity type -> legacy id -> reference label, filled on demand
    labels: Mutex<HashMap<EntityKind, HashMap<i64, Value>>>,
}

impl Kis2Source {
    pub fn new(session: Kis2Session, retry: RetryConfig) -> Self {
        Kis2Source {
            session,
            endpoints: HashMap::new(),
            retry,
            labels: Mutex::new(HashMap::new()),
        }
    }

    /// Override endpoint paths (entity types not listed keep their defaults)
    pub fn with_endpoints(mut self, endpoints: HashMap<EntityKind, String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn endpoint(&self, kind: EntityKind) -> &str {
        self.endpoints
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_endpoint())
    }

    /// Fetch an endpoint and require a top-level array
    async fn fetch_array(&self, kind: EntityKind) -> Result<Vec<Value>, SourceError> {
        let path = self.endpoint(kind);
        let label = format!("GET {}", path);
        let document = self.retry.run(&label, || self.session.get_json(path)).await?;

        match document {
            Value::Array(items) => Ok(items),
            other => Err(SourceError::UnexpectedShape {
                url: self.session.url(path),
                found: json_type(&other),
            }),
        }
    }

    fn cached_labels(&self, kind: EntityKind) -> Option<HashMap<i64, Value>> {
        self.labels.lock().ok()?.get(&kind).cloned()
    }

    /// id -> label table for `kind`, fetched once per session
    async fn labels_for(&self, kind: EntityKind) -> Result<HashMap<i64, Value>, SourceError> {
        if let Some(table) = self.cached_labels(kind) {
            return Ok(table);
        }

        let records = self.fetch_array(kind).await?;
        let table: HashMap<i64, Value> = records
            .iter()
            .filter_map(|r| Some((r.get("id")?.as_i64()?, reference_label(kind, r)?)))
            .collect();
        log::debug!("Cached {} {} labels for id expansion", table.len(), kind);

        if let Ok(mut labels) = self.labels.lock() {
            labels.insert(kind, table.clone());
        }
        Ok(table)
    }

    /// Replace numeric foreign ids in `records` with the referenced labels
    async fn expand_ids(&self, kind: EntityKind, records: &mut [Value]) -> Result<(), SourceError> {
        for (field, target) in id_fields(kind) {
            let needs_expansion = records
                .iter()
                .any(|r| r.get(*field).is_some_and(Value::is_i64));
            if !needs_expansion {
                continue;
            }

            let table = self.labels_for(*target).await?;
            for record in records.iter_mut() {
                let Some(slot) = record.get_mut(*field) else { continue };
                let Some(id) = slot.as_i64() else { continue };
                *slot = match table.get(&id) {
                    Some(label) => label.clone(),
                    None => {
                        log::warn!("{}: unknown {} id {} in field '{}'", kind, target, id, field);
                        Value::Null
                    }
                };
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SourceExtractor for Kis2Source {
    async fn fetch(&self, kind: EntityKind) -> Result<Vec<Value>, SourceError> {
        let mut records = self.fetch_array(kind).await?;
        self.expand_ids(kind, &mut records).await?;
        log::debug!("Fetched {} {} records", records.len(), kind);
        Ok(records)
    }
}
