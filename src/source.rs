//! The tabular-source boundary and the in-memory grid implementation.
//!
//! [`TabularSource`] is the only surface the repository and the inference
//! engine know about: header/row/column reads, queued mutations, and an
//! explicit [`TabularSource::commit`] that applies the queue. The commit is
//! the durability point — once it returns `Ok`, its effect survives any
//! later failure in the same logical operation, and nothing is ever rolled
//! back.
//!
//! [`GridSource`] keeps a table in memory: an optional metadata block (rows
//! above the header with a label cell on the left), the header row, and the
//! committed data body. [`Workbook`] is a named collection of grids.

use std::{collections::BTreeMap, io::Read, path::Path};

use crate::{
    error::{Result, StoreError},
    schema::MetaLabel,
    value::Cell,
};

/// Full data body of a table, or an explicit "no rows" signal.
#[derive(Debug, Clone, Default)]
pub struct DataBody {
    pub values: Vec<Vec<Cell>>,
    pub row_count: usize,
}

/// Boundary contract for grid-shaped storage. Row indices are zero-based
/// over the data body; mutations queue until `commit`.
pub trait TabularSource {
    fn header_row(&mut self) -> Result<Vec<String>>;
    fn data_body(&mut self) -> Result<DataBody>;
    fn column(&mut self, header: &str) -> Result<Vec<Cell>>;
    fn append_rows(&mut self, rows: Vec<Vec<Cell>>) -> Result<()>;
    fn insert_rows(&mut self, at: usize, rows: Vec<Vec<Cell>>) -> Result<()>;
    fn delete_row(&mut self, index: usize) -> Result<()>;
    fn clear_rows_contents(&mut self) -> Result<()>;
    fn write_row(&mut self, index: usize, values: Vec<Cell>) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    /// Raw rows of the metadata block above the header, each shaped as a
    /// label cell followed by one cell per data column. Bottom row last.
    fn metadata_block(&mut self, max_depth: usize) -> Result<Vec<Vec<Cell>>>;
}

#[derive(Debug, Clone)]
enum Mutation {
    Append(Vec<Vec<Cell>>),
    Insert(usize, Vec<Vec<Cell>>),
    Delete(usize),
    Clear,
    Write(usize, Vec<Cell>),
}

/// An in-memory grid table with queued-mutation commit semantics.
#[derive(Debug, Clone, Default)]
pub struct GridSource {
    meta_rows: Vec<Vec<Cell>>,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
    pending: Vec<Mutation>,
    commits: usize,
}

impl GridSource {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        let rows = rows.into_iter().map(|r| fit_width(r, width)).collect();
        Self {
            meta_rows: Vec::new(),
            headers,
            rows,
            pending: Vec::new(),
            commits: 0,
        }
    }

    pub fn with_metadata(mut self, meta_rows: Vec<Vec<Cell>>) -> Self {
        self.meta_rows = meta_rows;
        self
    }

    /// Number of commits applied so far; one per logical read-then-write step.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Loads a grid from CSV. Leading records whose first cell is one of the
    /// metadata labels form the metadata block; when a block is present the
    /// remaining records carry the (blank) label column too, and it is
    /// stripped from the header and data rows. Every cell loads as text —
    /// typing is the inference engine's concern.
    pub fn from_csv_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let mut meta_rows: Vec<Vec<Cell>> = Vec::new();
        let mut headers: Option<Vec<String>> = None;
        let mut rows: Vec<Vec<Cell>> = Vec::new();

        for record in csv_reader.records() {
            let record = record?;
            let cells: Vec<String> = record.iter().map(str::to_string).collect();
            if headers.is_none() {
                let is_meta = cells
                    .first()
                    .and_then(|label| MetaLabel::parse(label))
                    .is_some();
                if is_meta {
                    meta_rows.push(cells.into_iter().map(text_cell).collect());
                    continue;
                }
                let mut header_cells = cells;
                if !meta_rows.is_empty() && !header_cells.is_empty() {
                    header_cells.remove(0); // label column
                }
                headers = Some(header_cells);
                continue;
            }
            let mut data_cells = cells;
            if !meta_rows.is_empty() && !data_cells.is_empty() {
                data_cells.remove(0);
            }
            rows.push(data_cells.into_iter().map(text_cell).collect());
        }

        let headers = headers.unwrap_or_default();
        Ok(GridSource::new(headers, rows).with_metadata(meta_rows))
    }

    pub fn from_csv_path(path: &Path, delimiter: u8) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file, delimiter)
    }

    fn header_position(&self, header: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == header)
            .ok_or_else(|| StoreError::UnknownHeader {
                header: header.to_string(),
            })
    }

    fn apply(&mut self, mutation: Mutation) -> Result<()> {
        let width = self.headers.len();
        match mutation {
            Mutation::Append(new_rows) => {
                self.rows
                    .extend(new_rows.into_iter().map(|r| fit_width(r, width)));
            }
            Mutation::Insert(at, new_rows) => {
                if at > self.rows.len() {
                    return Err(StoreError::RowOutOfRange {
                        index: at,
                        rows: self.rows.len(),
                    });
                }
                for (offset, row) in new_rows.into_iter().enumerate() {
                    self.rows.insert(at + offset, fit_width(row, width));
                }
            }
            Mutation::Delete(index) => {
                if index >= self.rows.len() {
                    return Err(StoreError::RowOutOfRange {
                        index,
                        rows: self.rows.len(),
                    });
                }
                self.rows.remove(index);
            }
            Mutation::Clear => self.rows.clear(),
            Mutation::Write(index, values) => {
                if index >= self.rows.len() {
                    return Err(StoreError::RowOutOfRange {
                        index,
                        rows: self.rows.len(),
                    });
                }
                self.rows[index] = fit_width(values, width);
            }
        }
        Ok(())
    }
}

fn text_cell(text: String) -> Cell {
    if text.is_empty() {
        Cell::Blank
    } else {
        Cell::Text(text)
    }
}

fn fit_width(mut row: Vec<Cell>, width: usize) -> Vec<Cell> {
    row.resize(width, Cell::Blank);
    row
}

impl TabularSource for GridSource {
    fn header_row(&mut self) -> Result<Vec<String>> {
        Ok(self.headers.clone())
    }

    fn data_body(&mut self) -> Result<DataBody> {
        Ok(DataBody {
            values: self.rows.clone(),
            row_count: self.rows.len(),
        })
    }

    fn column(&mut self, header: &str) -> Result<Vec<Cell>> {
        let position = self.header_position(header)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(position).cloned().unwrap_or(Cell::Blank))
            .collect())
    }

    fn append_rows(&mut self, rows: Vec<Vec<Cell>>) -> Result<()> {
        self.pending.push(Mutation::Append(rows));
        Ok(())
    }

    fn insert_rows(&mut self, at: usize, rows: Vec<Vec<Cell>>) -> Result<()> {
        self.pending.push(Mutation::Insert(at, rows));
        Ok(())
    }

    fn delete_row(&mut self, index: usize) -> Result<()> {
        self.pending.push(Mutation::Delete(index));
        Ok(())
    }

    fn clear_rows_contents(&mut self) -> Result<()> {
        self.pending.push(Mutation::Clear);
        Ok(())
    }

    fn write_row(&mut self, index: usize, values: Vec<Cell>) -> Result<()> {
        self.pending.push(Mutation::Write(index, values));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let queued = std::mem::take(&mut self.pending);
        for mutation in queued {
            self.apply(mutation)?;
        }
        self.commits += 1;
        Ok(())
    }

    fn metadata_block(&mut self, max_depth: usize) -> Result<Vec<Vec<Cell>>> {
        let start = self.meta_rows.len().saturating_sub(max_depth);
        Ok(self.meta_rows[start..].to_vec())
    }
}

/// A named collection of grid tables; the `listTables` surface of the
/// boundary contract.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    tables: BTreeMap<String, GridSource>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, source: GridSource) {
        self.tables.insert(name.to_string(), source);
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut GridSource> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownTable {
                table: name.to_string(),
            })
    }

    pub fn remove(&mut self, name: &str) -> Option<GridSource> {
        self.tables.remove(name)
    }
}
