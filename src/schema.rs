//! Table definitions, column constraints, and the persisted schema document.
//!
//! A [`TableDefinition`] is the contract for one logical table: per-column
//! types and flags plus an optional rename map from logical field names to
//! physical header texts. Definitions are produced once (by hand or by the
//! inference engine in [`crate::infer`]) and stay immutable for the lifetime
//! of a repository.
//!
//! The [`SchemaDoc`] family is the JSON artifact that inference renders and
//! that can be loaded back as a set of runtime definitions.

use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
    sync::Arc,
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, StoreError},
    value::{Cell, LogicalType},
};

/// Case-insensitive row labels recognized in a table's metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetaLabel {
    Type,
    Required,
    Calculated,
    ReferenceTo,
    Final,
    DefaultValue,
}

impl MetaLabel {
    pub fn all() -> &'static [MetaLabel] {
        &[
            MetaLabel::Type,
            MetaLabel::Required,
            MetaLabel::Calculated,
            MetaLabel::ReferenceTo,
            MetaLabel::Final,
            MetaLabel::DefaultValue,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetaLabel::Type => "type",
            MetaLabel::Required => "required",
            MetaLabel::Calculated => "calculated",
            MetaLabel::ReferenceTo => "referenceto",
            MetaLabel::Final => "final",
            MetaLabel::DefaultValue => "defaultvalue",
        }
    }

    pub fn parse(text: &str) -> Option<MetaLabel> {
        let normalized = text.trim().to_ascii_lowercase();
        MetaLabel::all()
            .iter()
            .copied()
            .find(|label| label.as_str() == normalized)
    }
}

/// A column default: either a literal cell or a zero-argument producer.
///
/// Date defaults are always producers so every materialization yields a
/// fresh value instead of one shared timestamp.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Cell),
    Producer(Arc<dyn Fn() -> Cell + Send + Sync>),
}

impl DefaultValue {
    pub fn date(dt: NaiveDateTime) -> Self {
        DefaultValue::Producer(Arc::new(move || Cell::Date(dt)))
    }

    pub fn materialize(&self) -> Cell {
        match self {
            DefaultValue::Literal(cell) => cell.clone(),
            DefaultValue::Producer(producer) => producer(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(cell) => f.debug_tuple("Literal").field(cell).finish(),
            DefaultValue::Producer(_) => write!(f, "Producer(<fn>)"),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        self.materialize() == other.materialize()
    }
}

/// Per-column contract: type, constraints, and optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub column_type: LogicalType,
    pub required: bool,
    pub calculated: bool,
    pub is_final: bool,
    pub reference_to: Option<String>,
    pub default: Option<DefaultValue>,
}

impl ColumnSpec {
    pub fn new(column_type: LogicalType) -> Self {
        Self {
            column_type,
            required: false,
            calculated: false,
            is_final: false,
            reference_to: None,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn calculated(mut self) -> Self {
        self.calculated = true;
        self
    }

    pub fn final_column(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn references(mut self, table: &str) -> Self {
        self.reference_to = Some(table.to_string());
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// The schema contract for one logical table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDefinition {
    /// Logical field name -> column contract.
    pub columns: BTreeMap<String, ColumnSpec>,
    /// Logical field name -> physical header text, when they differ.
    pub names: BTreeMap<String, String>,
    /// Write order for columns; read always respects actual header order.
    pub order: Vec<String>,
}

impl TableDefinition {
    /// The physical header for a logical field; identity when no rename
    /// entry exists.
    pub fn header_for<'a>(&'a self, field: &'a str) -> &'a str {
        self.names.get(field).map(String::as_str).unwrap_or(field)
    }

    pub fn column(&self, field: &str) -> Option<&ColumnSpec> {
        self.columns.get(field)
    }

    pub fn to_doc(&self, table: &str) -> TableDoc {
        let order = if self.order.is_empty() {
            self.columns.keys().cloned().collect()
        } else {
            self.order.clone()
        };
        let fields = order
            .iter()
            .filter_map(|field| {
                self.columns.get(field).map(|spec| FieldDoc {
                    name: field.clone(),
                    datatype: spec.column_type,
                })
            })
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|(field, spec)| (field.clone(), ColumnDoc::from_spec(spec)))
            .collect();
        TableDoc {
            table: table.to_string(),
            fields,
            columns,
            names: self.names.clone(),
            order,
        }
    }

    pub fn from_doc(doc: &TableDoc) -> Self {
        let columns = doc
            .columns
            .iter()
            .map(|(field, col)| (field.clone(), col.to_spec()))
            .collect();
        TableDefinition {
            columns,
            names: doc.names.clone(),
            order: doc.order.clone(),
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// One field of a table's interface-like rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub datatype: LogicalType,
}

/// Rendered default: dates become tagged zero-argument producers, other
/// types stay JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultDoc {
    Date { date: NaiveDateTime },
    Bool(bool),
    Number(f64),
    Text(String),
}

impl DefaultDoc {
    fn from_cell(cell: &Cell) -> DefaultDoc {
        match cell {
            Cell::Date(dt) => DefaultDoc::Date { date: *dt },
            Cell::Bool(b) => DefaultDoc::Bool(*b),
            Cell::Number(n) => DefaultDoc::Number(*n),
            Cell::Text(s) => DefaultDoc::Text(s.clone()),
            Cell::Blank => DefaultDoc::Text(String::new()),
        }
    }

    fn to_runtime(&self) -> DefaultValue {
        match self {
            DefaultDoc::Date { date } => DefaultValue::date(*date),
            DefaultDoc::Bool(b) => DefaultValue::Literal(Cell::Bool(*b)),
            DefaultDoc::Number(n) => DefaultValue::Literal(Cell::Number(*n)),
            DefaultDoc::Text(s) => DefaultValue::Literal(Cell::Text(s.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDoc {
    #[serde(rename = "type")]
    pub datatype: LogicalType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub calculated: bool,
    #[serde(rename = "final", default, skip_serializing_if = "is_false")]
    pub is_final: bool,
    #[serde(rename = "referenceTo", default, skip_serializing_if = "Option::is_none")]
    pub reference_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultDoc>,
}

impl ColumnDoc {
    fn from_spec(spec: &ColumnSpec) -> ColumnDoc {
        ColumnDoc {
            datatype: spec.column_type,
            required: spec.required,
            calculated: spec.calculated,
            is_final: spec.is_final,
            reference_to: spec.reference_to.clone(),
            default: spec
                .default
                .as_ref()
                .map(|dv| DefaultDoc::from_cell(&dv.materialize())),
        }
    }

    fn to_spec(&self) -> ColumnSpec {
        ColumnSpec {
            column_type: self.datatype,
            required: self.required,
            calculated: self.calculated,
            is_final: self.is_final,
            reference_to: self.reference_to.clone(),
            default: self.default.as_ref().map(DefaultDoc::to_runtime),
        }
    }
}

/// Per-table rendering of an inferred (or hand-written) definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDoc {
    pub table: String,
    pub fields: Vec<FieldDoc>,
    pub columns: BTreeMap<String, ColumnDoc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub names: BTreeMap<String, String>,
    pub order: Vec<String>,
}

/// The persisted schema artifact: one document per scanned source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDoc {
    pub tables: Vec<TableDoc>,
}

impl SchemaDoc {
    pub fn table(&self, name: &str) -> Option<&TableDoc> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn definition(&self, name: &str) -> Result<TableDefinition> {
        self.table(name)
            .map(TableDefinition::from_doc)
            .ok_or_else(|| StoreError::UnknownTable {
                table: name.to_string(),
            })
    }

    /// Deterministic rendering: same scan inputs yield byte-identical output.
    pub fn render(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| StoreError::CommitFailed {
            reason: format!("rendering schema document: {err}"),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let doc = serde_json::from_reader(reader).map_err(|err| StoreError::CommitFailed {
            reason: format!("parsing schema document: {err}"),
        })?;
        Ok(doc)
    }
}

impl FromStr for SchemaDoc {
    type Err = StoreError;

    fn from_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| StoreError::CommitFailed {
            reason: format!("parsing schema document: {err}"),
        })
    }
}
