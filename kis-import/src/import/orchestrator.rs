//! Import orchestration
//!
//! Drives each entity type through fetch, resolve, diff and write inside its
//! own transaction, in dependency order. A failed or skipped type makes every
//! type that references it skip as well.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::plan::import_order;
use super::reconcile::reconcile;
use super::records::{RowContext, decode_batch};
use super::resolver::{LookupCache, resolve_rows};
use super::types::{EntityKind, ImportResult, ImportState, RunReport};
use super::writer::write_batch;
use crate::source::{SourceError, SourceExtractor};
use crate::store::load_rows;

/// Settings shared by every entity stage
#[derive(Debug, Clone, Default)]
pub struct ImportSettings {
    pub row_context: RowContext,
    /// Abort (and roll back) an entity stage that runs longer than this
    pub entity_timeout: Option<Duration>,
}

/// Runs imports against one destination pool and one source
pub struct Importer {
    pool: SqlitePool,
    source: Box<dyn SourceExtractor>,
    settings: ImportSettings,
    cache: LookupCache,
}

impl Importer {
    pub fn new(pool: SqlitePool, source: Box<dyn SourceExtractor>, settings: ImportSettings) -> Self {
        Importer {
            pool,
            source,
            settings,
            cache: LookupCache::new(),
        }
    }

    /// Import one entity type
    ///
    /// Never panics or returns an error: failures are reported in the result
    /// and leave the destination untouched.
    pub async fn import_entity(&mut self, kind: EntityKind) -> ImportResult {
        let started = Instant::now();
        let mut state = ImportState::Idle;

        let outcome = match self.settings.entity_timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, self.run_stage(kind, &mut state)).await;
                match timed {
                    Ok(outcome) => outcome,
                    Err(_) => Err(anyhow::anyhow!("timed out after {:?} while {}", limit, state)),
                }
            }
            None => self.run_stage(kind, &mut state).await,
        };

        match outcome {
            Ok(result) => {
                log::info!(
                    "{}: {} added, {} updated, {} unchanged, {} skipped, {} invalid ({:.2?})",
                    kind,
                    result.added,
                    result.updated,
                    result.unchanged,
                    result.skipped,
                    result.invalid,
                    started.elapsed()
                );
                result
            }
            Err(err) => {
                // stubs and rows cached during the failed stage were rolled back
                self.cache.clear();
                advance(kind, &mut state, ImportState::Failed);
                log::error!("{}: import failed: {:#}", kind, err);
                ImportResult::failed(kind, format!("{:#}", err))
            }
        }
    }

    async fn run_stage(&mut self, kind: EntityKind, state: &mut ImportState) -> Result<ImportResult> {
        let descriptor = kind.descriptor();

        advance(kind, state, ImportState::Fetching);
        let raw = self.source.fetch(kind).await?;
        let fetched = raw.len();
        let decoded = decode_batch(kind, raw, &self.settings.row_context);

        advance(kind, state, ImportState::Resolving);
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;
        let resolution = resolve_rows(
            &mut *tx,
            &mut self.cache,
            descriptor,
            decoded.rows,
            &self.settings.row_context,
        )
        .await?;

        advance(kind, state, ImportState::Diffing);
        let destination = load_rows(&mut *tx, descriptor).await?;
        let plan = reconcile(descriptor, resolution.rows, destination)?;

        advance(kind, state, ImportState::Writing);
        let summary = write_batch(&mut *tx, descriptor, &plan).await?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit {}", descriptor.table))?;
        advance(kind, state, ImportState::Done);

        self.cache.invalidate(kind);
        for touched in &resolution.touched {
            self.cache.invalidate(*touched);
        }

        let mut result = ImportResult::done(kind);
        result.added = summary.added;
        result.updated = summary.updated;
        result.unchanged = plan.unchanged.len();
        result.skipped = resolution.skipped.len();
        result.invalid = decoded.invalid.len();
        result.stubs_created = resolution.stubs_created;
        result.skipped_records = decoded.invalid.into_iter().chain(resolution.skipped).collect();

        if result.total() != fetched {
            log::warn!("{}: {} records fetched but {} accounted for", kind, fetched, result.total());
        }
        Ok(result)
    }

    /// Import `selection` in dependency order
    pub async fn run(&mut self, selection: &[EntityKind]) -> RunReport {
        let mut report = RunReport::new();
        log::info!("Starting import run {}", report.run_id);

        let order = match import_order(selection) {
            Ok(order) => order,
            Err(err) => {
                log::error!("{}", err);
                report.entities = selection
                    .iter()
                    .map(|k| ImportResult::failed(*k, err.to_string()))
                    .collect();
                report.error = Some(err.to_string());
                report.finish();
                return report;
            }
        };

        let mut incomplete: BTreeSet<EntityKind> = BTreeSet::new();
        for kind in order {
            let blocked: Vec<EntityKind> = kind
                .dependencies()
                .into_iter()
                .filter(|d| incomplete.contains(d))
                .collect();

            let result = if blocked.is_empty() {
                self.import_entity(kind).await
            } else {
                log::warn!("{}: skipped because an upstream import did not complete", kind);
                ImportResult::skipped_for(kind, &blocked)
            };

            if !result.is_success() {
                incomplete.insert(kind);
            }
            report.entities.push(result);
        }

        report.finish();
        log::info!(
            "Import run {} finished: {} added, {} updated, {} of {} entity types succeeded",
            report.run_id,
            report.added(),
            report.updated(),
            report.entities.iter().filter(|r| r.is_success()).count(),
            report.entities.len()
        );
        report
    }
}

/// Authenticate, then run `selection`
///
/// A failed login is a run-level error: every selected entity type is reported
/// failed and nothing is written.
pub async fn login_and_run<F, Fut>(
    pool: SqlitePool,
    settings: ImportSettings,
    selection: &[EntityKind],
    connect: F,
) -> RunReport
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Box<dyn SourceExtractor>, SourceError>>,
{
    match connect().await {
        Ok(source) => Importer::new(pool, source, settings).run(selection).await,
        Err(err) => {
            log::error!("{}", err);
            let order = import_order(selection).unwrap_or_else(|_| selection.to_vec());
            RunReport::authentication_failed(&order, err.to_string())
        }
    }
}

fn advance(kind: EntityKind, state: &mut ImportState, next: ImportState) {
    debug_assert!(state.can_advance_to(next), "{}: {} -> {}", kind, state, next);
    log::debug!("{}: {} -> {}", kind, state, next);
    *state = next;
}
