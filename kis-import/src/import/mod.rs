//! KIS2 -> KIS3 import pipeline
//!
//! Records flow through decoding ([`records`]), reference resolution
//! ([`resolver`]), reconciliation ([`reconcile`]) and writing ([`writer`]),
//! one entity type at a time, driven by the [`orchestrator`].

pub mod orchestrator;
pub mod plan;
pub mod reconcile;
pub mod records;
pub mod resolver;
pub mod types;
pub mod writer;

pub use orchestrator::{ImportSettings, Importer, login_and_run};
pub use plan::{CycleError, DependencyGraph, import_order};
pub use reconcile::{ReconcileError, Reconciliation, reconcile};
pub use records::{RecordError, RowContext, decode_batch};
pub use resolver::{LookupCache, resolve_rows};
pub use types::{EntityKind, ImportResult, ImportState, ImportStatus, RunReport};
pub use writer::write_batch;
