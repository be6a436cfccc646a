//! Core types for the import pipeline

mod entity;
mod key;
mod report;
mod row;
mod value;

pub use entity::*;
pub use key::*;
pub use report::*;
pub use row::*;
pub use value::*;
