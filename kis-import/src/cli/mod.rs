//! Command-line interface

pub mod handler;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::import::EntityKind;

/// Import KIS2 data into the KIS3 database
#[derive(Parser, Debug)]
#[command(name = "kis-import")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file (defaults to <config dir>/kis-import/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Destination database URL (overrides config and KIS3_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import every entity type (or a selection) in dependency order
    Run(RunArgs),

    /// Import a single entity type
    Import(ImportArgs),

    /// List entity types in import order
    Entities,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only import these entity types (dependencies outside the selection must already be present)
    #[arg(long, num_args = 1.., value_name = "ENTITY")]
    pub only: Vec<EntityKind>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Entity type to import (e.g. country, order-comment)
    pub entity: EntityKind,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Read records from a JSON snapshot (object keyed by entity type) instead of KIS2
    #[arg(long, value_name = "PATH")]
    pub source_file: Option<PathBuf>,
}

/// Dispatch a parsed command line
///
/// Returns `false` when the import ran but did not fully succeed.
pub async fn run(cli: Cli) -> Result<bool> {
    output::configure_colors(cli.global.no_color);

    match cli.command {
        Commands::Run(args) => handler::handle_run(&cli.global, args).await,
        Commands::Import(args) => handler::handle_import(&cli.global, args).await,
        Commands::Entities => handler::handle_entities(&cli.global),
    }
}
