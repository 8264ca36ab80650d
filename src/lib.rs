//! Typed record storage on top of grid-shaped tabular data.
//!
//! The crate pairs two subsystems composed by the caller:
//!
//! - the schema inference engine ([`infer`]), which scans a tabular source's
//!   headers, sample rows, and optional metadata block into a
//!   [`schema::TableDefinition`] plus a persistable [`schema::SchemaDoc`];
//! - the typed record repository ([`repo::Repository`]), which uses such a
//!   definition to run coerced, validated CRUD against any
//!   [`source::TabularSource`].
//!
//! The two never call each other; a definition produced by inference (or by
//! hand) is handed to the repository once and stays immutable for its
//! lifetime.

pub mod cli;
pub mod error;
pub mod infer;
pub mod mapping;
pub mod repo;
pub mod schema;
pub mod source;
pub mod table;
pub mod value;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    schema::SchemaDoc,
    source::{GridSource, Workbook},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("gridbase", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Columns(args) => handle_columns(&args),
    }
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let delimiter = args.delimiter.unwrap_or(b',');
    info!("Probing '{}'", args.input.display());
    let source = GridSource::from_csv_path(&args.input, delimiter)
        .with_context(|| format!("Loading grid from {:?}", args.input))?;
    let table = match &args.table {
        Some(name) => name.clone(),
        None => args
            .input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table".to_string()),
    };
    let mut workbook = Workbook::new();
    workbook.insert(&table, source);
    let opts = infer::ScanOptions {
        sample_rows: args.sample_rows,
        ..Default::default()
    };
    let doc = infer::workbook_schema_doc(&mut workbook, &opts)
        .with_context(|| format!("Inferring schema from {:?}", args.input))?;
    doc.save(&args.schema)
        .with_context(|| format!("Writing schema to {:?}", args.schema))?;
    info!(
        "Inferred {} table(s) written to {:?}",
        doc.tables.len(),
        args.schema
    );
    Ok(())
}

fn handle_columns(args: &cli::ColumnsArgs) -> Result<()> {
    let doc = SchemaDoc::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;
    if doc.tables.is_empty() {
        info!("Schema {:?} does not define any tables", args.schema);
        return Ok(());
    }

    for table_doc in &doc.tables {
        let mut rows = Vec::with_capacity(table_doc.order.len());
        for (idx, field) in table_doc.order.iter().enumerate() {
            let Some(column) = table_doc.columns.get(field) else {
                continue;
            };
            let mut flags = Vec::new();
            if column.required {
                flags.push("required");
            }
            if column.calculated {
                flags.push("calculated");
            }
            if column.is_final {
                flags.push("final");
            }
            let header = table_doc
                .names
                .get(field)
                .cloned()
                .unwrap_or_default();
            rows.push(vec![
                (idx + 1).to_string(),
                field.clone(),
                column.datatype.to_string(),
                header,
                flags.join(","),
                column
                    .reference_to
                    .clone()
                    .unwrap_or_default(),
            ]);
        }
        println!("{}", table_doc.table);
        let headers = vec![
            "#".to_string(),
            "field".to_string(),
            "type".to_string(),
            "header".to_string(),
            "flags".to_string(),
            "references".to_string(),
        ];
        table::print_table(&headers, &rows);
        info!(
            "Listed {} column(s) for table '{}'",
            rows.len(),
            table_doc.table
        );
    }
    Ok(())
}
