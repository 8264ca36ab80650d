//! Schema inference: scans a tabular source and derives table definitions.
//!
//! For each table the scanner collects the header row, a bounded number of
//! sample data rows, and the optional metadata block directly above the
//! header. Types resolve in priority order: explicit metadata `type` label,
//! header-name heuristic, sample-value heuristic, `string` fallback.
//! Inference is best-effort: a metadata value that does not parse under the
//! resolved type is dropped silently, never raised.

use std::{collections::BTreeMap, sync::OnceLock};

use heck::ToSnakeCase;
use log::{debug, warn};
use regex::Regex;

use crate::{
    error::Result,
    schema::{ColumnSpec, DefaultValue, MetaLabel, SchemaDoc, TableDefinition, TableDoc},
    source::{TabularSource, Workbook},
    value::{Cell, LogicalType, coerce, truthy},
};

const DEFAULT_SAMPLE_ROWS: usize = 50;
const DEFAULT_METADATA_DEPTH: usize = 50;

/// Metadata label -> one cell per data column, bottom-most occurrence.
pub type MetaMap = BTreeMap<MetaLabel, Vec<Cell>>;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Number of data rows sampled for the value heuristic (0 = all).
    pub sample_rows: usize,
    /// Rows above the header inspected for the metadata block.
    pub metadata_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            metadata_depth: DEFAULT_METADATA_DEPTH,
        }
    }
}

/// Raw scan result for one table.
#[derive(Debug, Clone)]
pub struct TableScan {
    pub table: String,
    pub headers: Vec<String>,
    pub samples: Vec<Vec<Cell>>,
    pub meta: MetaMap,
}

/// An inferred definition plus its rendered document.
#[derive(Debug, Clone)]
pub struct InferredTable {
    pub table: String,
    pub definition: TableDefinition,
    pub doc: TableDoc,
}

pub fn scan_table<S: TabularSource>(
    source: &mut S,
    table: &str,
    opts: &ScanOptions,
) -> Result<TableScan> {
    let headers = source.header_row()?;
    let body = source.data_body()?;
    let mut samples = body.values;
    if opts.sample_rows > 0 {
        samples.truncate(opts.sample_rows);
    }

    let block = source.metadata_block(opts.metadata_depth)?;
    let mut meta = MetaMap::new();
    // Bottom-up so the occurrence nearest the header wins on duplicates.
    for row in block.iter().rev() {
        let Some(label) = row.first().and_then(|cell| MetaLabel::parse(&cell.as_display()))
        else {
            continue;
        };
        meta.entry(label)
            .or_insert_with(|| row.get(1..).unwrap_or(&[]).to_vec());
    }

    debug!(
        "Scanned table '{}': {} header(s), {} sample row(s), {} metadata label(s)",
        table,
        headers.len(),
        samples.len(),
        meta.len()
    );
    Ok(TableScan {
        table: table.to_string(),
        headers,
        samples,
        meta,
    })
}

pub fn infer_table(scan: &TableScan) -> InferredTable {
    let keys: Vec<String> = scan.headers.iter().map(|h| sanitize_identifier(h)).collect();

    let mut names = BTreeMap::new();
    for (key, header) in keys.iter().zip(&scan.headers) {
        if key != header {
            names.insert(key.clone(), header.clone());
        }
    }

    let mut columns: BTreeMap<String, ColumnSpec> = BTreeMap::new();
    for (index, key) in keys.iter().enumerate() {
        if columns.contains_key(key) {
            warn!(
                "Duplicate logical name '{}' in table '{}'; keeping the last column",
                key, scan.table
            );
        }
        let column_type = resolve_type(scan, index);
        let mut spec = ColumnSpec::new(column_type);
        if truthy(meta_cell(scan, MetaLabel::Required, index)) {
            spec = spec.required();
        }
        if truthy(meta_cell(scan, MetaLabel::Calculated, index)) {
            spec = spec.calculated();
        }
        if truthy(meta_cell(scan, MetaLabel::Final, index)) {
            spec = spec.final_column();
        }
        let reference = meta_cell(scan, MetaLabel::ReferenceTo, index)
            .as_display()
            .trim()
            .to_string();
        if !reference.is_empty() {
            spec = spec.references(&reference);
        }
        if let Some(default) =
            default_from_cell(meta_cell(scan, MetaLabel::DefaultValue, index), column_type)
        {
            spec = spec.with_default(default);
        }
        columns.insert(key.clone(), spec);
    }

    let definition = TableDefinition {
        columns,
        names,
        order: keys,
    };
    let doc = definition.to_doc(&scan.table);
    InferredTable {
        table: scan.table.clone(),
        definition,
        doc,
    }
}

/// Scans and infers every table of a workbook, in name order.
pub fn scan_workbook(workbook: &mut Workbook, opts: &ScanOptions) -> Result<Vec<InferredTable>> {
    let mut inferred = Vec::new();
    for name in workbook.table_names() {
        let scan = scan_table(workbook.table_mut(&name)?, &name, opts)?;
        inferred.push(infer_table(&scan));
    }
    Ok(inferred)
}

/// The persistable artifact for a whole workbook; deterministic for the
/// same scan inputs.
pub fn workbook_schema_doc(workbook: &mut Workbook, opts: &ScanOptions) -> Result<SchemaDoc> {
    let tables = scan_workbook(workbook, opts)?
        .into_iter()
        .map(|t| t.doc)
        .collect();
    Ok(SchemaDoc { tables })
}

fn meta_cell(scan: &TableScan, label: MetaLabel, index: usize) -> &Cell {
    scan.meta
        .get(&label)
        .and_then(|cells| cells.get(index))
        .unwrap_or(&Cell::Blank)
}

fn resolve_type(scan: &TableScan, index: usize) -> LogicalType {
    let declared = meta_cell(scan, MetaLabel::Type, index);
    if !declared.is_blank() {
        // An unknown token still counts as an explicit declaration.
        return declared
            .as_display()
            .parse()
            .unwrap_or(LogicalType::Any);
    }
    let header = scan.headers.get(index).map(String::as_str).unwrap_or("");
    if let Some(guessed) = guess_type_from_header(header) {
        return guessed;
    }
    let samples: Vec<&Cell> = scan
        .samples
        .iter()
        .filter_map(|row| row.get(index))
        .filter(|cell| !cell.is_blank())
        .collect();
    guess_type_from_cells(&samples)
}

fn sanitize_identifier(header: &str) -> String {
    let cleaned: String = header
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let snake = cleaned.to_snake_case();
    if snake.is_empty() {
        return "field".to_string();
    }
    if snake.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        snake
    } else {
        format!("f_{snake}")
    }
}

fn header_regex(cache: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cache.get_or_init(|| Regex::new(pattern).expect("header heuristic pattern compiles"))
}

fn guess_type_from_header(header: &str) -> Option<LogicalType> {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    static BOOL_RE: OnceLock<Regex> = OnceLock::new();
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    static STRING_RE: OnceLock<Regex> = OnceLock::new();

    let lowered = header.to_lowercase();
    if header_regex(&ID_RE, r"^(id|#id|record ?id)$|id$").is_match(&lowered) {
        return Some(LogicalType::Number);
    }
    if header_regex(&BOOL_RE, r"^(is|has)[ _-]?|(active|enabled|disabled|archived)$")
        .is_match(&lowered)
    {
        return Some(LogicalType::Boolean);
    }
    if header_regex(&DATE_RE, r"(date|created|updated|time|at)$").is_match(&lowered) {
        return Some(LogicalType::Date);
    }
    if header_regex(
        &STRING_RE,
        r"email|phone|name|title|desc|address|city|country|zip",
    )
    .is_match(&lowered)
    {
        return Some(LogicalType::String);
    }
    None
}

fn guess_type_from_cells(cells: &[&Cell]) -> LogicalType {
    const BOOL_TOKENS: &[&str] = &["true", "false", "yes", "no", "y", "n", "0", "1"];
    for cell in cells {
        match cell {
            Cell::Date(_) => return LogicalType::Date,
            Cell::Bool(_) => return LogicalType::Boolean,
            Cell::Number(_) => return LogicalType::Number,
            Cell::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let lowered = trimmed.to_ascii_lowercase();
                if BOOL_TOKENS.contains(&lowered.as_str()) {
                    return LogicalType::Boolean;
                }
                if trimmed.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
                    return LogicalType::Number;
                }
                if crate::value::parse_date_text(trimmed).is_some() {
                    return LogicalType::Date;
                }
            }
            Cell::Blank => continue,
        }
    }
    LogicalType::String
}

/// Parses a declared default under the resolved type; `None` (dropped) when
/// the cell does not parse — inference is advisory.
fn default_from_cell(cell: &Cell, column_type: LogicalType) -> Option<DefaultValue> {
    if cell.is_blank() {
        return None;
    }
    match column_type {
        LogicalType::Number => coerce(LogicalType::Number, cell).ok().map(DefaultValue::Literal),
        LogicalType::Boolean => Some(DefaultValue::Literal(Cell::Bool(truthy(cell)))),
        LogicalType::Date => match coerce(LogicalType::Date, cell) {
            Ok(Cell::Date(dt)) => Some(DefaultValue::date(dt)),
            _ => None,
        },
        LogicalType::String | LogicalType::Any => {
            Some(DefaultValue::Literal(Cell::Text(cell.as_display())))
        }
    }
}
