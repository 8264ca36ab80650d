//! Error taxonomy for the typed record store.
//!
//! Every failure mode is surfaced synchronously to the caller; nothing is
//! retried internally and committed writes are never rolled back.

use std::io;

use thiserror::Error;

use crate::value::LogicalType;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A raw cell value cannot be converted to its column's declared type.
    #[error("cannot coerce '{value}' to {target}")]
    Coercion { target: LogicalType, value: String },

    /// A required, non-calculated field is blank after defaulting.
    #[error("required field '{field}' is blank")]
    Validation { field: String },

    /// An update attempted to change a final column's existing non-blank value.
    #[error("final column '{field}' cannot be changed on row {row}")]
    Immutability { field: String, row: usize },

    /// An operation referenced a logical field with no physical header.
    #[error("no header mapped for field '{field}'")]
    SchemaMapping { field: String },

    #[error("unknown column type '{token}'")]
    UnknownType { token: String },

    #[error("header '{header}' not present in table")]
    UnknownHeader { header: String },

    #[error("table '{table}' not found")]
    UnknownTable { table: String },

    #[error("row index {index} out of range (table has {rows} row(s))")]
    RowOutOfRange { index: usize, rows: usize },

    #[error("id column '{field}' must be declared as number, found {found}")]
    IdColumnType { field: String, found: LogicalType },

    #[error("commit rejected by tabular source: {reason}")]
    CommitFailed { reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
