//! Human-readable report rendering

use std::collections::HashMap;

use colored::*;
use is_terminal::IsTerminal;

use crate::import::{EntityKind, ImportResult, ImportState, RunReport};

/// Skipped records listed per entity type before the list is cut short
const MAX_LISTED_RECORDS: usize = 10;

/// Turn colors off when asked to or when stdout is not a terminal
pub fn configure_colors(no_color: bool) {
    if no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
}

fn state_label(result: &ImportResult) -> ColoredString {
    let label = format!("{:<8}", result.state.to_string());
    match result.state {
        ImportState::Done => label.green(),
        ImportState::Skipped => label.yellow(),
        _ => label.red(),
    }
}

/// Print the run report as a table followed by errors and skipped records
pub fn print_report(report: &RunReport) {
    println!("{} {}", "Import run".bold(), report.run_id.to_string().dimmed());
    if let Some(error) = &report.error {
        println!("{} {}", "Run failed:".red().bold(), error);
    }
    println!();

    println!(
        "{}",
        format!(
            "{:<18} {:<8} {:>7} {:>8} {:>10} {:>8} {:>8} {:>6}",
            "ENTITY", "STATE", "ADDED", "UPDATED", "UNCHANGED", "SKIPPED", "INVALID", "STUBS"
        )
        .bold()
    );
    for result in &report.entities {
        println!(
            "{:<18} {} {:>7} {:>8} {:>10} {:>8} {:>8} {:>6}",
            result.entity.slug(),
            state_label(result),
            result.added,
            result.updated,
            result.unchanged,
            result.skipped,
            result.invalid,
            result.stubs_created
        );
    }

    for result in &report.entities {
        if let Some(error) = &result.error {
            println!();
            println!("{} {}", format!("{}:", result.entity).red().bold(), error);
        }
        if !result.skipped_records.is_empty() {
            println!();
            println!(
                "{}",
                format!("{}: {} records not imported", result.entity, result.skipped_records.len()).yellow()
            );
            for record in result.skipped_records.iter().take(MAX_LISTED_RECORDS) {
                println!("  {} {}", record.record, format!("({})", record.reason).dimmed());
            }
            if result.skipped_records.len() > MAX_LISTED_RECORDS {
                println!("  {}", format!("... and {} more", result.skipped_records.len() - MAX_LISTED_RECORDS).dimmed());
            }
        }
    }

    println!();
    let summary = format!("{} added, {} updated", report.added(), report.updated());
    if report.is_success() {
        println!("{} {}", "✓".green().bold(), summary);
    } else {
        println!("{} {}", "✗".red().bold(), summary);
    }
}

/// Endpoint `kind` is fetched from, honoring configured overrides
fn endpoint_for(kind: EntityKind, overrides: &HashMap<EntityKind, String>) -> &str {
    overrides
        .get(&kind)
        .map(String::as_str)
        .unwrap_or_else(|| kind.default_endpoint())
}

/// Print entity types in import order with their endpoints and dependencies
pub fn print_entities(endpoints: &HashMap<EntityKind, String>) {
    for (position, kind) in EntityKind::ALL.iter().enumerate() {
        let deps: Vec<&str> = kind.dependencies().iter().map(|d| d.slug()).collect();
        let deps = if deps.is_empty() {
            String::new()
        } else {
            format!("<- {}", deps.join(", "))
        };
        println!(
            "{:>2}. {:<18} {:<22} {:<20} {}",
            position + 1,
            kind.slug().bold(),
            kind.descriptor().table,
            endpoint_for(*kind, endpoints).dimmed(),
            deps.cyan()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_for_prefers_override() {
        let mut overrides = HashMap::new();
        overrides.insert(EntityKind::Work, "/api/v2/Works/".to_string());

        assert_eq!(endpoint_for(EntityKind::Work, &overrides), "/api/v2/Works/");
        assert_eq!(
            endpoint_for(EntityKind::Country, &overrides),
            EntityKind::Country.default_endpoint()
        );
    }
}
