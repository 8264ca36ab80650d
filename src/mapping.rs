//! Bidirectional lookups between logical fields and physical headers.
//!
//! A [`ColumnMapping`] is built from a [`TableDefinition`] plus the header
//! row actually observed in the tabular source. Fields without a matching
//! physical header drop out of the header-keyed lookup (ignored on read,
//! written blank on insert); headers without a logical field are preserved
//! physically but never typed-read or written.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    schema::{DefaultValue, TableDefinition},
    value::{Cell, LogicalType},
};

#[derive(Debug, Clone)]
pub struct ColumnMapping {
    headers: Vec<String>,
    field_by_header: BTreeMap<String, String>,
    header_by_field: BTreeMap<String, String>,
    types: BTreeMap<String, LogicalType>,
    defaults: BTreeMap<String, DefaultValue>,
    required: BTreeSet<String>,
    finals: BTreeSet<String>,
    calculated: BTreeSet<String>,
}

impl ColumnMapping {
    pub fn new(definition: &TableDefinition, headers: &[String]) -> Self {
        let mut header_by_field = BTreeMap::new();
        let mut types = BTreeMap::new();
        let mut defaults = BTreeMap::new();
        let mut required = BTreeSet::new();
        let mut finals = BTreeSet::new();
        let mut calculated = BTreeSet::new();

        for (field, spec) in &definition.columns {
            header_by_field.insert(field.clone(), definition.header_for(field).to_string());
            types.insert(field.clone(), spec.column_type);
            if let Some(default) = &spec.default {
                defaults.insert(field.clone(), default.clone());
            }
            if spec.required {
                required.insert(field.clone());
            }
            if spec.is_final {
                finals.insert(field.clone());
            }
            if spec.calculated {
                calculated.insert(field.clone());
            }
        }

        let field_by_header = headers
            .iter()
            .filter_map(|header| {
                header_by_field
                    .iter()
                    .find(|(_, mapped)| *mapped == header)
                    .map(|(field, _)| (header.clone(), field.clone()))
            })
            .collect();

        Self {
            headers: headers.to_vec(),
            field_by_header,
            header_by_field,
            types,
            defaults,
            required,
            finals,
            calculated,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// The physical header declared for a logical field, mapped or not.
    pub fn header_for(&self, field: &str) -> Option<&str> {
        self.header_by_field.get(field).map(String::as_str)
    }

    /// The logical field behind an observed physical header, if any.
    pub fn field_for(&self, header: &str) -> Option<&str> {
        self.field_by_header.get(header).map(String::as_str)
    }

    /// Position of a field's header within the observed header row.
    pub fn header_index(&self, field: &str) -> Option<usize> {
        let header = self.header_for(field)?;
        self.headers.iter().position(|h| h == header)
    }

    pub fn logical_type(&self, field: &str) -> LogicalType {
        self.types.get(field).copied().unwrap_or(LogicalType::Any)
    }

    /// Materializes the field's default, producing a fresh cell each call.
    pub fn default_for(&self, field: &str) -> Option<Cell> {
        self.defaults.get(field).map(DefaultValue::materialize)
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.contains(field)
    }

    pub fn is_final(&self, field: &str) -> bool {
        self.finals.contains(field)
    }

    pub fn is_calculated(&self, field: &str) -> bool {
        self.calculated.contains(field)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(String::as_str)
    }
}
