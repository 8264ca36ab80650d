use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Typed records and schema inference for grid-shaped data", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Probe a grid CSV file and infer a table definition into a schema file
    Probe(ProbeArgs),
    /// List the columns of a saved schema file as a formatted table
    Columns(ColumnsArgs),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input CSV file holding the grid (optionally with a metadata block)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination schema file path
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Logical table name (defaults to the input file stem)
    #[arg(long)]
    pub table: Option<String>,
    /// Number of rows to sample when inferring types (0 means full scan)
    #[arg(long, default_value_t = 50)]
    pub sample_rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Schema file produced by `probe`
    #[arg(short, long)]
    pub schema: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
