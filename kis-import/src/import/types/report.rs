//! Structured import results
//!
//! These replace console counters: every entity type's outcome is reported as
//! `{status, added, updated, unchanged}` plus diagnostics, and the whole run
//! is a list of those in import order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::entity::EntityKind;

/// Pipeline state of one entity type within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    Idle,
    Fetching,
    Resolving,
    Diffing,
    Writing,
    Done,
    Failed,
    Skipped,
}

impl ImportState {
    /// Check if the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Done | ImportState::Failed | ImportState::Skipped)
    }

    /// Check if moving to `next` is a legal transition
    pub fn can_advance_to(&self, next: ImportState) -> bool {
        use ImportState::*;
        match (self, next) {
            (Idle, Fetching) | (Idle, Skipped) | (Idle, Failed) => true,
            (Fetching, Resolving) | (Resolving, Diffing) | (Diffing, Writing) => true,
            (Writing, Done) => true,
            (Fetching | Resolving | Diffing | Writing, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ImportState::Idle => "idle",
            ImportState::Fetching => "fetching",
            ImportState::Resolving => "resolving",
            ImportState::Diffing => "diffing",
            ImportState::Writing => "writing",
            ImportState::Done => "done",
            ImportState::Failed => "failed",
            ImportState::Skipped => "skipped",
        };
        write!(f, "{}", label)
    }
}

/// Outcome status exposed to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Error,
}

/// Why a source record did not reach the writer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// Natural key (or a best-effort label for records that failed to decode)
    pub record: String,
    pub reason: String,
}

/// Result of importing one entity type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportResult {
    pub entity: EntityKind,
    pub status: ImportStatus,
    pub state: ImportState,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records skipped because a reference did not resolve
    pub skipped: usize,
    /// Records rejected before resolution (decode or validation errors)
    pub invalid: usize,
    /// Stub rows created in referenced tables
    pub stubs_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_records: Vec<SkippedRecord>,
}

impl ImportResult {
    /// A zero-effect result in the given terminal state
    fn empty(entity: EntityKind, status: ImportStatus, state: ImportState) -> Self {
        ImportResult {
            entity,
            status,
            state,
            added: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            invalid: 0,
            stubs_created: 0,
            error: None,
            skipped_records: Vec::new(),
        }
    }

    /// A successful result with no counts yet
    pub fn done(entity: EntityKind) -> Self {
        Self::empty(entity, ImportStatus::Success, ImportState::Done)
    }

    /// A zero-effect failure
    pub fn failed(entity: EntityKind, error: impl Into<String>) -> Self {
        let mut result = Self::empty(entity, ImportStatus::Error, ImportState::Failed);
        result.error = Some(error.into());
        result
    }

    /// A zero-effect result for an entity type whose upstream dependency failed
    pub fn skipped_for(entity: EntityKind, upstream: &[EntityKind]) -> Self {
        let names: Vec<_> = upstream.iter().map(|k| k.slug()).collect();
        let mut result = Self::empty(entity, ImportStatus::Error, ImportState::Skipped);
        result.error = Some(format!("upstream dependency did not complete: {}", names.join(", ")));
        result
    }

    /// Check if the entity type completed
    pub fn is_success(&self) -> bool {
        self.status == ImportStatus::Success
    }

    /// Records accounted for by this result
    pub fn total(&self) -> usize {
        self.added + self.updated + self.unchanged + self.skipped + self.invalid
    }
}

/// Report of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Run-level error (authentication failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub entities: Vec<ImportResult>,
}

impl RunReport {
    /// Start a new report
    pub fn new() -> Self {
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            entities: Vec::new(),
        }
    }

    /// Report a run that could not authenticate: every entity failed, nothing written
    pub fn authentication_failed(kinds: &[EntityKind], error: impl Into<String>) -> Self {
        let error = error.into();
        let mut report = Self::new();
        report.entities = kinds
            .iter()
            .map(|k| ImportResult::failed(*k, format!("authentication failed: {}", error)))
            .collect();
        report.error = Some(error);
        report.finish();
        report
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Find the result for an entity type
    pub fn find(&self, kind: EntityKind) -> Option<&ImportResult> {
        self.entities.iter().find(|r| r.entity == kind)
    }

    /// Check if every entity type succeeded and there was no run-level error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.entities.iter().all(|r| r.is_success())
    }

    /// Total rows added across entity types
    pub fn added(&self) -> usize {
        self.entities.iter().map(|r| r.added).sum()
    }

    /// Total rows updated across entity types
    pub fn updated(&self) -> usize {
        self.entities.iter().map(|r| r.updated).sum()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
