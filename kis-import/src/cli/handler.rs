//! Import command handlers

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::{GlobalArgs, ImportArgs, OutputArgs, RunArgs, output};
use crate::config::{Config, ImportConfig};
use crate::import::{EntityKind, Importer, RunReport, login_and_run};
use crate::source::{Kis2Session, Kis2Source, SeededSource, SourceExtractor, StaticSource};
use crate::store;

/// Handle `run`
pub async fn handle_run(global: &GlobalArgs, args: RunArgs) -> Result<bool> {
    let selection = if args.only.is_empty() {
        EntityKind::ALL.to_vec()
    } else {
        args.only
    };
    execute(global, &selection, &args.output).await
}

/// Handle `import ENTITY`
pub async fn handle_import(global: &GlobalArgs, args: ImportArgs) -> Result<bool> {
    execute(global, &[args.entity], &args.output).await
}

/// Handle `entities`
pub fn handle_entities(global: &GlobalArgs) -> Result<bool> {
    let mut config = Config::load(global.config.as_deref())?;
    config.apply_env();
    output::print_entities(&config.endpoints()?);
    Ok(true)
}

async fn execute(global: &GlobalArgs, selection: &[EntityKind], out: &OutputArgs) -> Result<bool> {
    let mut config = Config::load(global.config.as_deref())?;
    config.apply_env();
    if let Some(url) = &global.database_url {
        config.destination.database_url = url.clone();
    }

    let pool = store::connect(&config.destination.database_url, &config.store_options()).await?;
    let settings = config.import_settings();

    let report = match &out.source_file {
        Some(path) => {
            let snapshot = load_snapshot(path)?;
            let source = with_seeds(&config.import, Box::new(snapshot.clone()), |kind| snapshot.contains(kind));
            Importer::new(pool, Box::new(source), settings).run(selection).await
        }
        None => {
            config.validate()?;
            config.ensure_password()?;

            let session_config = config.session_config();
            let retry = config.retry_config();
            let endpoints = config.endpoints()?;
            let seeds = config.import.clone();

            login_and_run(pool, settings, selection, || async move {
                let session = Kis2Session::login(&session_config).await?;
                let source = Kis2Source::new(session, retry).with_endpoints(endpoints);
                let seeded = with_seeds(&seeds, Box::new(source), |_| false);
                Ok(Box::new(seeded) as Box<dyn SourceExtractor>)
            })
            .await
        }
    };

    report_outcome(&report, out.json)?;
    Ok(report.is_success())
}

/// Wrap `inner` so configured currencies and order statuses are served from config
fn with_seeds(
    import: &ImportConfig,
    inner: Box<dyn SourceExtractor>,
    provided: impl Fn(EntityKind) -> bool,
) -> SeededSource {
    let mut source = SeededSource::new(inner);
    if !provided(EntityKind::Currency) {
        source = source.with_names(EntityKind::Currency, &import.currencies);
    }
    if !provided(EntityKind::OrderStatus) {
        source = source.with_names(EntityKind::OrderStatus, &import.order_statuses);
    }
    source
}

fn load_snapshot(path: &Path) -> Result<StaticSource> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Snapshot is not valid JSON: {}", path.display()))?;
    StaticSource::from_document(document)
        .map_err(|e| anyhow::anyhow!("Invalid snapshot {}: {}", path.display(), e))
}

fn report_outcome(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{}", rendered);
    } else {
        output::print_report(report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceExtractor;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_entries_win_over_seeds() {
        let snapshot = StaticSource::new()
            .with_records(EntityKind::Currency, vec![json!({"name": "CNY"})]);
        let source = with_seeds(&ImportConfig::default(), Box::new(snapshot.clone()), |kind| {
            snapshot.contains(kind)
        });

        let currencies = source.fetch(EntityKind::Currency).await.unwrap();
        assert_eq!(currencies, vec![json!({"name": "CNY"})]);

        let statuses = source.fetch(EntityKind::OrderStatus).await.unwrap();
        assert_eq!(statuses.len(), 8);
    }
}
