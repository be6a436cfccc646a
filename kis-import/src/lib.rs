//! Reconciling importer from the legacy KIS2 site into a KIS3 database
//!
//! Records are pulled per entity type from the KIS2 REST endpoints, matched
//! to destination rows by natural key and written back as inserts and
//! field-scoped updates, one transaction per entity type.

pub mod cli;
pub mod config;
pub mod import;
pub mod source;
pub mod store;
