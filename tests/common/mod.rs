#![allow(dead_code)]

use std::collections::BTreeMap;

use gridbase::error::{Result, StoreError};
use gridbase::repo::Record;
use gridbase::schema::{ColumnSpec, DefaultValue, TableDefinition};
use gridbase::source::{DataBody, GridSource, TabularSource};
use gridbase::value::{Cell, LogicalType};

/// Builds a logical record from field/cell pairs.
pub fn record(pairs: &[(&str, Cell)]) -> Record {
    pairs
        .iter()
        .map(|(field, cell)| (field.to_string(), cell.clone()))
        .collect()
}

/// An `orders`-style definition: numeric id, required name, free amount,
/// calculated total, final code.
pub fn orders_definition() -> TableDefinition {
    let mut columns = BTreeMap::new();
    columns.insert(
        "id".to_string(),
        ColumnSpec::new(LogicalType::Number).required(),
    );
    columns.insert(
        "name".to_string(),
        ColumnSpec::new(LogicalType::String).required(),
    );
    columns.insert("amount".to_string(), ColumnSpec::new(LogicalType::Number));
    columns.insert(
        "total".to_string(),
        ColumnSpec::new(LogicalType::Number).calculated(),
    );
    columns.insert(
        "code".to_string(),
        ColumnSpec::new(LogicalType::String).final_column(),
    );
    TableDefinition {
        columns,
        names: BTreeMap::new(),
        order: vec![
            "id".to_string(),
            "name".to_string(),
            "amount".to_string(),
            "total".to_string(),
            "code".to_string(),
        ],
    }
}

pub fn orders_headers() -> Vec<String> {
    vec![
        "id".to_string(),
        "name".to_string(),
        "amount".to_string(),
        "total".to_string(),
        "code".to_string(),
    ]
}

pub fn empty_orders() -> GridSource {
    GridSource::new(orders_headers(), vec![])
}

pub fn orders_with_rows(rows: Vec<Vec<Cell>>) -> GridSource {
    GridSource::new(orders_headers(), rows)
}

/// Returns the definition with a default attached to one field.
pub fn with_default(
    mut definition: TableDefinition,
    field: &str,
    default: DefaultValue,
) -> TableDefinition {
    if let Some(spec) = definition.columns.get_mut(field) {
        spec.default = Some(default);
    }
    definition
}

/// Delegating source that fails on the n-th commit (1-based), leaving all
/// earlier commits durable.
pub struct FlakySource {
    inner: GridSource,
    fail_on_commit: usize,
    commits_seen: usize,
}

impl FlakySource {
    pub fn new(inner: GridSource, fail_on_commit: usize) -> Self {
        Self {
            inner,
            fail_on_commit,
            commits_seen: 0,
        }
    }

    pub fn into_inner(self) -> GridSource {
        self.inner
    }
}

impl TabularSource for FlakySource {
    fn header_row(&mut self) -> Result<Vec<String>> {
        self.inner.header_row()
    }

    fn data_body(&mut self) -> Result<DataBody> {
        self.inner.data_body()
    }

    fn column(&mut self, header: &str) -> Result<Vec<Cell>> {
        self.inner.column(header)
    }

    fn append_rows(&mut self, rows: Vec<Vec<Cell>>) -> Result<()> {
        self.inner.append_rows(rows)
    }

    fn insert_rows(&mut self, at: usize, rows: Vec<Vec<Cell>>) -> Result<()> {
        self.inner.insert_rows(at, rows)
    }

    fn delete_row(&mut self, index: usize) -> Result<()> {
        self.inner.delete_row(index)
    }

    fn clear_rows_contents(&mut self) -> Result<()> {
        self.inner.clear_rows_contents()
    }

    fn write_row(&mut self, index: usize, values: Vec<Cell>) -> Result<()> {
        self.inner.write_row(index, values)
    }

    fn commit(&mut self) -> Result<()> {
        self.commits_seen += 1;
        if self.commits_seen == self.fail_on_commit {
            return Err(StoreError::CommitFailed {
                reason: "injected commit failure".to_string(),
            });
        }
        self.inner.commit()
    }

    fn metadata_block(&mut self, max_depth: usize) -> Result<Vec<Vec<Cell>>> {
        self.inner.metadata_block(max_depth)
    }
}
