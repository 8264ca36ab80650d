//! Typed CRUD over a tabular source, driven by a table definition.
//!
//! A [`Repository`] is a stateless wrapper: every operation re-reads what it
//! needs from the source, so the grid stays the single source of truth. Each
//! write step ends in a `commit`, and committed steps are durable — a
//! failure partway through `add_many`, `update_by`, or `delete_by` leaves
//! the earlier steps applied (documented in the error policy, never rolled
//! back).
//!
//! Column constraints honored on every write path:
//! - `calculated` columns are never written; the cell is always left blank
//!   so externally derived values survive
//! - `final` columns accept a value once; updates that would change a
//!   non-blank value are rejected
//! - `required` columns must be non-blank after defaulting
//!
//! Autoincrement ids are assigned as `max(existing) + 1` with no guard
//! against concurrent writers; duplicate ids across racing callers are a
//! documented hazard of the design, not a defect of this module.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::debug;

use crate::{
    error::{Result, StoreError},
    mapping::ColumnMapping,
    schema::TableDefinition,
    source::TabularSource,
    value::{Cell, FindOptions, LogicalType, cells_equal, coerce},
};

/// A logical record: field name -> coerced cell value.
pub type Record = BTreeMap<String, Cell>;

/// The conventional autoincrement key field.
pub const ID_FIELD: &str = "id";

const DEFAULT_CHUNK_SIZE: usize = 500;

/// A matched row: its zero-based body index and logical projection.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMatch {
    pub index: usize,
    pub record: Record,
}

/// Options for the insert/replace family.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Apply column defaults to blank incoming values.
    pub fill_defaults: bool,
    /// Coerce incoming values to their declared types.
    pub coerce: bool,
    /// Rows per independently committed batch in [`Repository::add_many`].
    pub chunk_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            fill_defaults: true,
            coerce: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

pub struct Repository<S: TabularSource> {
    source: S,
    definition: TableDefinition,
}

impl<S: TabularSource> Repository<S> {
    pub fn new(source: S, definition: TableDefinition) -> Self {
        Self { source, definition }
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    fn mapping(&mut self) -> Result<ColumnMapping> {
        let headers = self.source.header_row()?;
        Ok(ColumnMapping::new(&self.definition, &headers))
    }

    /// Reads the full body as validated, coerced logical records in
    /// physical row order.
    pub fn get_all(&mut self) -> Result<Vec<Record>> {
        let mapping = self.mapping()?;
        let body = self.source.data_body()?;
        let mut records = Vec::with_capacity(body.row_count);
        for row in &body.values {
            let record = project_row(&mapping, row)?;
            validate_required_record(&mapping, &record)?;
            records.push(record);
        }
        Ok(records)
    }

    /// First row whose `field` column equals `value` under the options.
    /// A missing match is a soft `Ok(None)`; an unmapped field is an error.
    pub fn find_first_by(
        &mut self,
        field: &str,
        value: impl Into<Cell>,
        opts: FindOptions,
    ) -> Result<Option<RowMatch>> {
        let matches = self.find_matches(field, value.into(), opts, true)?;
        let first = matches.into_iter().next();
        if let Some(found) = &first {
            let mapping = self.mapping()?;
            validate_required_record(&mapping, &found.record)?;
        }
        Ok(first)
    }

    pub fn find_all_by(
        &mut self,
        field: &str,
        value: impl Into<Cell>,
        opts: FindOptions,
    ) -> Result<Vec<RowMatch>> {
        self.find_matches(field, value.into(), opts, false)
    }

    fn find_matches(
        &mut self,
        field: &str,
        value: Cell,
        opts: FindOptions,
        first_only: bool,
    ) -> Result<Vec<RowMatch>> {
        let mapping = self.mapping()?;
        let header = mapping
            .header_for(field)
            .ok_or_else(|| StoreError::SchemaMapping {
                field: field.to_string(),
            })?
            .to_string();
        let column_type = mapping.logical_type(field);
        let target = coerce(column_type, &value)?;
        let column = self.source.column(&header)?;
        if column.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.source.data_body()?;

        let mut matches = Vec::new();
        for (index, raw) in column.iter().enumerate() {
            let candidate = coerce(column_type, raw)?;
            if !cells_equal(&candidate, &target, opts) {
                continue;
            }
            let row = body.values.get(index).map(Vec::as_slice).unwrap_or(&[]);
            matches.push(RowMatch {
                index,
                record: project_row(&mapping, row)?,
            });
            if first_only {
                break;
            }
        }
        Ok(matches)
    }

    /// Appends exactly one row, assigning an autoincrement id when the
    /// table maps an `id` column and the incoming value is blank. Returns
    /// the logical record as written.
    pub fn add(&mut self, record: Record, opts: &WriteOptions) -> Result<Record> {
        let mapping = self.mapping()?;
        let mut record = record;
        if self.definition.columns.contains_key(ID_FIELD) && blank_field(&record, ID_FIELD) {
            let next = self.max_id(&mapping)? + 1.0;
            record.insert(ID_FIELD.to_string(), Cell::Number(next));
        }
        let row = build_row(&mapping, &record, opts, None)?;
        validate_required_row(&mapping, &row)?;
        let written = project_row(&mapping, &row)?;
        self.source.append_rows(vec![row])?;
        self.source.commit()?;
        Ok(written)
    }

    /// Bulk insert with a single autoincrement counter seeded once from the
    /// current max. Rows are written in `chunk_size` batches, each committed
    /// independently — a failure partway leaves earlier batches durable.
    pub fn add_many(&mut self, records: Vec<Record>, opts: &WriteOptions) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mapping = self.mapping()?;
        let has_id = self.definition.columns.contains_key(ID_FIELD);
        let mut next_id = if has_id { self.max_id(&mapping)? + 1.0 } else { 0.0 };

        let mut rows = Vec::with_capacity(records.len());
        for mut record in records {
            if has_id && blank_field(&record, ID_FIELD) {
                record.insert(ID_FIELD.to_string(), Cell::Number(next_id));
                next_id += 1.0;
            }
            let row = build_row(&mapping, &record, opts, None)?;
            validate_required_row(&mapping, &row)?;
            rows.push(row);
        }

        let total = rows.len();
        let chunk_size = opts.chunk_size.max(1);
        for (batch, chunk) in rows.chunks(chunk_size).enumerate() {
            self.source.append_rows(chunk.to_vec())?;
            self.source.commit()?;
            debug!("Committed batch {} ({} row(s))", batch + 1, chunk.len());
        }
        Ok(total)
    }

    /// Replaces the entire body. Final columns keep their previous non-blank
    /// value: matched by id when the table maps a numeric `id` column,
    /// positionally otherwise.
    pub fn set_all(&mut self, records: Vec<Record>, opts: &WriteOptions) -> Result<()> {
        let mapping = self.mapping()?;
        let existing = self.source.data_body()?;

        let keyed_by_id = self
            .definition
            .column(ID_FIELD)
            .map(|spec| spec.column_type == LogicalType::Number)
            .unwrap_or(false)
            && mapping.header_index(ID_FIELD).is_some();
        let old_by_id = if keyed_by_id {
            index_rows_by_id(&mapping, &existing.values)
        } else {
            BTreeMap::new()
        };

        let mut rows = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            let previous = if keyed_by_id {
                record_id(&mapping, record).and_then(|id| old_by_id.get(&id).copied())
            } else {
                existing.values.get(position).map(Vec::as_slice)
            };
            let row = build_row(&mapping, record, opts, previous)?;
            validate_required_row(&mapping, &row)?;
            rows.push(row);
        }

        if existing.row_count > 0 {
            self.source.clear_rows_contents()?;
            self.source.commit()?;
        }
        if !rows.is_empty() {
            self.source.append_rows(rows)?;
            self.source.commit()?;
        }
        Ok(())
    }

    /// Merges `patch` into every row matching `field == value`. Calculated
    /// columns are re-blanked, final columns reject changed non-blank
    /// values, and each row is written and committed independently.
    pub fn update_by(
        &mut self,
        field: &str,
        value: impl Into<Cell>,
        patch: &Record,
    ) -> Result<usize> {
        let matches = self.find_all_by(field, value, FindOptions::default())?;
        if matches.is_empty() {
            return Ok(0);
        }
        let mapping = self.mapping()?;

        for matched in &matches {
            let row = merge_patch(&mapping, matched, patch)?;
            validate_required_row(&mapping, &row)?;
            self.source.write_row(matched.index, row)?;
            self.source.commit()?;
        }
        Ok(matches.len())
    }

    /// Deletes every matching row, bottom-up so earlier deletions cannot
    /// shift the indices of later ones. One commit per deletion.
    pub fn delete_by(
        &mut self,
        field: &str,
        value: impl Into<Cell>,
        opts: FindOptions,
    ) -> Result<usize> {
        let matches = self.find_all_by(field, value, opts)?;
        let indices: Vec<usize> = matches
            .iter()
            .map(|m| m.index)
            .sorted_by(|a, b| b.cmp(a))
            .collect();
        for index in &indices {
            self.source.delete_row(*index)?;
            self.source.commit()?;
        }
        Ok(indices.len())
    }

    /// Maximum of the finite, coerced values in the `id` column; 0 when the
    /// table is empty. The column must be declared as `number`.
    pub fn get_max_id(&mut self) -> Result<f64> {
        let mapping = self.mapping()?;
        self.max_id(&mapping)
    }

    fn max_id(&mut self, mapping: &ColumnMapping) -> Result<f64> {
        let spec =
            self.definition
                .column(ID_FIELD)
                .ok_or_else(|| StoreError::SchemaMapping {
                    field: ID_FIELD.to_string(),
                })?;
        if spec.column_type != LogicalType::Number {
            return Err(StoreError::IdColumnType {
                field: ID_FIELD.to_string(),
                found: spec.column_type,
            });
        }
        let header = mapping
            .header_for(ID_FIELD)
            .ok_or_else(|| StoreError::SchemaMapping {
                field: ID_FIELD.to_string(),
            })?
            .to_string();
        let column = self.source.column(&header)?;
        let max = column
            .iter()
            .filter_map(|cell| match coerce(LogicalType::Number, cell) {
                Ok(Cell::Number(n)) if n.is_finite() => Some(n),
                _ => None,
            })
            .fold(0.0_f64, f64::max);
        Ok(max)
    }
}

fn blank_field(record: &Record, field: &str) -> bool {
    record.get(field).map(Cell::is_blank).unwrap_or(true)
}

/// Projects a physical row to its logical record, coercing every mapped
/// column; headers without a logical field are skipped.
fn project_row(mapping: &ColumnMapping, row: &[Cell]) -> Result<Record> {
    let mut record = Record::new();
    for (position, header) in mapping.headers().iter().enumerate() {
        let Some(field) = mapping.field_for(header) else {
            continue;
        };
        let raw = row.get(position).cloned().unwrap_or(Cell::Blank);
        record.insert(field.to_string(), coerce(mapping.logical_type(field), &raw)?);
    }
    Ok(record)
}

/// Builds a physical row from a logical record: calculated columns blank,
/// defaults applied to blanks, values coerced. When `previous` is given,
/// final columns keep its non-blank values (the `set_all` policy).
fn build_row(
    mapping: &ColumnMapping,
    record: &Record,
    opts: &WriteOptions,
    previous: Option<&[Cell]>,
) -> Result<Vec<Cell>> {
    let mut row = Vec::with_capacity(mapping.headers().len());
    for (position, header) in mapping.headers().iter().enumerate() {
        let Some(field) = mapping.field_for(header) else {
            row.push(Cell::Blank);
            continue;
        };
        if mapping.is_calculated(field) {
            row.push(Cell::Blank);
            continue;
        }
        if mapping.is_final(field)
            && let Some(previous_row) = previous
        {
            let prior = previous_row.get(position).cloned().unwrap_or(Cell::Blank);
            if !prior.is_blank() {
                row.push(prior);
                continue;
            }
        }
        let mut value = record.get(field).cloned().unwrap_or(Cell::Blank);
        if value.is_blank()
            && opts.fill_defaults
            && let Some(default) = mapping.default_for(field)
        {
            value = default;
        }
        if opts.coerce {
            value = coerce(mapping.logical_type(field), &value)?;
        }
        row.push(value);
    }
    Ok(row)
}

/// Merge for `update_by`: patch wins where supplied, current value
/// otherwise; final columns raise on changed non-blank values.
fn merge_patch(mapping: &ColumnMapping, matched: &RowMatch, patch: &Record) -> Result<Vec<Cell>> {
    let mut row = Vec::with_capacity(mapping.headers().len());
    for header in mapping.headers() {
        let Some(field) = mapping.field_for(header) else {
            row.push(Cell::Blank);
            continue;
        };
        if mapping.is_calculated(field) {
            row.push(Cell::Blank);
            continue;
        }
        let column_type = mapping.logical_type(field);
        let current = matched.record.get(field).cloned().unwrap_or(Cell::Blank);
        let incoming = patch.get(field);

        if mapping.is_final(field) {
            if let Some(incoming) = incoming
                && !incoming.is_blank()
            {
                let incoming = coerce(column_type, incoming)?;
                // First write to a blank final cell is the one allowed set.
                if current.is_blank() {
                    row.push(incoming);
                    continue;
                }
                if !cells_equal(&incoming, &current, FindOptions::default()) {
                    return Err(StoreError::Immutability {
                        field: field.to_string(),
                        row: matched.index,
                    });
                }
            }
            row.push(current);
            continue;
        }

        let value = incoming.cloned().unwrap_or(current);
        row.push(coerce(column_type, &value)?);
    }
    Ok(row)
}

fn validate_required_record(mapping: &ColumnMapping, record: &Record) -> Result<()> {
    for field in mapping.required_fields() {
        if mapping.is_calculated(field) {
            continue;
        }
        if record.get(field).map(Cell::is_blank).unwrap_or(true) {
            return Err(StoreError::Validation {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_required_row(mapping: &ColumnMapping, row: &[Cell]) -> Result<()> {
    for field in mapping.required_fields() {
        if mapping.is_calculated(field) {
            continue;
        }
        let blank = match mapping.header_index(field) {
            Some(position) => row.get(position).map(Cell::is_blank).unwrap_or(true),
            // No physical column to hold the value.
            None => true,
        };
        if blank {
            return Err(StoreError::Validation {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

fn index_rows_by_id<'a>(
    mapping: &ColumnMapping,
    rows: &'a [Vec<Cell>],
) -> BTreeMap<i64, &'a [Cell]> {
    let Some(position) = mapping.header_index(ID_FIELD) else {
        return BTreeMap::new();
    };
    let mut by_id = BTreeMap::new();
    for row in rows {
        let Some(raw) = row.get(position) else {
            continue;
        };
        if let Ok(Cell::Number(n)) = coerce(LogicalType::Number, raw)
            && n.is_finite()
        {
            by_id.insert(n.round() as i64, row.as_slice());
        }
    }
    by_id
}

fn record_id(mapping: &ColumnMapping, record: &Record) -> Option<i64> {
    let raw = record.get(ID_FIELD)?;
    match coerce(mapping.logical_type(ID_FIELD), raw) {
        Ok(Cell::Number(n)) if n.is_finite() => Some(n.round() as i64),
        _ => None,
    }
}
