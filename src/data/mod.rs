//! Tabular engine backing the CSV tools.
//!
//! This module provides just enough of a dataframe to serve the analyzer:
//!
//! - [`DataFrame`] - CSV loading with per-column type inference
//! - [`query`] - boolean filter expressions over rows
//! - [`describe`] - descriptive statistics
//!
//! Every operation works on a freshly loaded frame; nothing is cached.

pub mod describe;
pub mod error;
pub mod frame;
pub mod query;
pub mod value;

pub use error::{DataError, DataResult};
pub use frame::{Column, ColumnSchema, DataFrame, Record};
pub use query::{Query, QueryError};
pub use value::{DType, Value};
