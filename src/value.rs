//! Cell values, logical column types, and the coercion rules between them.
//!
//! This module owns [`Cell`] (the raw value held in one grid cell), the
//! [`LogicalType`] enum (5 supported logical types), and [`coerce()`], the
//! single conversion path used by the repository and the inference engine.
//!
//! ## Responsibilities
//!
//! - Blankness policy: a cell is blank when it is [`Cell::Blank`] or an empty
//!   string; `0` and `false` are never blank
//! - Deterministic coercion of raw cells to declared column types
//! - Spreadsheet date-serial decoding (epoch 1899-12-30, 86 400 000 ms/day)
//! - Value comparison with optional trimming and case folding

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::StoreError;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A raw value held in a single cell of a tabular source.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Blank,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    /// Blank means absent or empty string. `Number(0.0)` and `Bool(false)`
    /// carry real values and are not blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Blank => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Blank => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => {
                // Whole values render without a fractional part, but only
                // inside f64's exact-integer range.
                if n.fract() == 0.0 && n.abs() < 1.0e15 {
                    (*n as i64).to_string()
                } else {
                    n.to_string()
                }
            }
            Cell::Bool(b) => b.to_string(),
            Cell::Date(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(value: NaiveDateTime) -> Self {
        Cell::Date(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogicalType {
    String,
    Number,
    Boolean,
    Date,
    Any,
}

impl LogicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalType::String => "string",
            LogicalType::Number => "number",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Any => "any",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "number", "boolean", "date", "any"]
    }
}

impl Serialize for LogicalType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogicalType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(|err| de::Error::custom(format!("{err}")))
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogicalType {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "text" | "varchar" => Ok(LogicalType::String),
            "number" | "numeric" | "int" | "integer" | "float" | "double" => {
                Ok(LogicalType::Number)
            }
            "boolean" | "bool" | "true/false" => Ok(LogicalType::Boolean),
            "date" | "datetime" | "timestamp" => Ok(LogicalType::Date),
            "any" => Ok(LogicalType::Any),
            _ => Err(StoreError::UnknownType {
                token: value.to_string(),
            }),
        }
    }
}

/// Options applied when comparing cells during row lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions {
    pub case_insensitive: bool,
    pub trim: bool,
}

/// The epoch used by the spreadsheet date-serial convention (1900 system).
pub fn serial_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("1899-12-30T00:00:00 is a valid timestamp")
}

/// Decodes a spreadsheet date serial (days since the epoch, fractional part
/// carrying the time of day) into a timestamp. `None` when the serial is
/// non-finite or lands outside the representable date range.
pub fn date_from_serial(serial: f64) -> Option<NaiveDateTime> {
    let millis = (serial * MILLIS_PER_DAY).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    serial_epoch().checked_add_signed(Duration::milliseconds(millis as i64))
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.3fZ",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parses a date from free text, accepting both date and datetime shapes.
pub fn parse_date_text(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    parse_naive_datetime(trimmed)
        .or_else(|| parse_naive_date(trimmed).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn truthy_text(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

/// Converts a raw cell to the declared logical type.
///
/// Blank cells pass through untouched for every type; required-field
/// enforcement is the repository's job, not coercion's.
pub fn coerce(ty: LogicalType, cell: &Cell) -> Result<Cell, StoreError> {
    if cell.is_blank() || ty == LogicalType::Any {
        return Ok(cell.clone());
    }
    let coerced = match ty {
        LogicalType::String => Cell::Text(cell.as_display()),
        LogicalType::Number => match cell {
            Cell::Number(n) => Cell::Number(*n),
            Cell::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Cell::Date(dt) => Cell::Number(dt.and_utc().timestamp_millis() as f64),
            Cell::Text(s) => {
                // f64's parser accepts "NaN"/"inf"; neither is a usable
                // cell value, so non-finite parses fail like garbage text.
                let parsed = s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| StoreError::Coercion {
                        target: ty,
                        value: s.clone(),
                    })?;
                Cell::Number(parsed)
            }
            Cell::Blank => Cell::Blank,
        },
        LogicalType::Boolean => match cell {
            Cell::Bool(b) => Cell::Bool(*b),
            Cell::Number(n) => Cell::Bool(*n != 0.0),
            Cell::Text(s) => Cell::Bool(truthy_text(s)),
            Cell::Date(_) => Cell::Bool(true),
            Cell::Blank => Cell::Blank,
        },
        LogicalType::Date => match cell {
            Cell::Date(dt) => Cell::Date(*dt),
            Cell::Number(serial) => {
                let decoded = date_from_serial(*serial).ok_or_else(|| StoreError::Coercion {
                    target: ty,
                    value: serial.to_string(),
                })?;
                Cell::Date(decoded)
            }
            Cell::Text(s) => {
                let parsed = parse_date_text(s).ok_or_else(|| StoreError::Coercion {
                    target: ty,
                    value: s.clone(),
                })?;
                Cell::Date(parsed)
            }
            Cell::Bool(b) => {
                return Err(StoreError::Coercion {
                    target: ty,
                    value: b.to_string(),
                });
            }
            Cell::Blank => Cell::Blank,
        },
        LogicalType::Any => cell.clone(),
    };
    Ok(coerced)
}

/// Truthiness used by the metadata block's flag rows.
pub fn truthy(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(b) => *b,
        Cell::Number(n) => *n != 0.0,
        Cell::Text(s) => truthy_text(s),
        Cell::Date(_) | Cell::Blank => false,
    }
}

fn normalize_for_compare(cell: &Cell, opts: FindOptions) -> Cell {
    match cell {
        Cell::Date(dt) => Cell::Number(dt.and_utc().timestamp_millis() as f64),
        Cell::Text(s) => {
            let mut s = s.clone();
            if opts.trim {
                s = s.trim().to_string();
            }
            if opts.case_insensitive {
                s = s.to_lowercase();
            }
            Cell::Text(s)
        }
        other => other.clone(),
    }
}

/// Equality under the lookup options; dates compare as epoch millis.
pub fn cells_equal(a: &Cell, b: &Cell, opts: FindOptions) -> bool {
    normalize_for_compare(a, opts) == normalize_for_compare(b, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn blank_cells_pass_through_every_type() {
        for ty in [
            LogicalType::String,
            LogicalType::Number,
            LogicalType::Boolean,
            LogicalType::Date,
            LogicalType::Any,
        ] {
            assert_eq!(coerce(ty, &Cell::Blank).unwrap(), Cell::Blank);
            assert_eq!(
                coerce(ty, &Cell::Text(String::new())).unwrap(),
                Cell::Text(String::new())
            );
        }
    }

    #[test]
    fn zero_and_false_are_not_blank() {
        assert!(!Cell::Number(0.0).is_blank());
        assert!(!Cell::Bool(false).is_blank());
        assert!(Cell::Blank.is_blank());
        assert!(Cell::Text(String::new()).is_blank());
    }

    #[test]
    fn date_serial_law() {
        assert_eq!(
            coerce(LogicalType::Date, &Cell::Number(1.0)).unwrap(),
            Cell::Date(ymd(1899, 12, 31))
        );
        assert_eq!(
            coerce(LogicalType::Date, &Cell::Number(2.0)).unwrap(),
            Cell::Date(ymd(1900, 1, 1))
        );
    }

    #[test]
    fn fractional_serial_carries_time_of_day() {
        let coerced = coerce(LogicalType::Date, &Cell::Number(2.5)).unwrap();
        let expected = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(coerced, Cell::Date(expected));
    }

    #[test]
    fn number_from_date_is_epoch_millis() {
        let dt = ymd(1970, 1, 2);
        assert_eq!(
            coerce(LogicalType::Number, &Cell::Date(dt)).unwrap(),
            Cell::Number(86_400_000.0)
        );
    }

    #[test]
    fn number_rejects_non_numeric_text() {
        let err = coerce(LogicalType::Number, &Cell::Text("abc".into())).unwrap_err();
        assert!(matches!(err, StoreError::Coercion { .. }));
    }

    #[test]
    fn number_rejects_non_finite_text() {
        for token in ["NaN", "nan", "inf", "-inf", "infinity", "-Infinity"] {
            let err = coerce(LogicalType::Number, &Cell::Text(token.into())).unwrap_err();
            assert!(matches!(err, StoreError::Coercion { .. }), "{token}");
        }
    }

    #[test]
    fn out_of_range_serial_is_a_coercion_error() {
        for serial in [1.0e15, -1.0e15, 1.0e9, f64::NAN, f64::INFINITY] {
            let err = coerce(LogicalType::Date, &Cell::Number(serial)).unwrap_err();
            assert!(matches!(err, StoreError::Coercion { .. }), "{serial}");
        }
        assert!(date_from_serial(f64::NAN).is_none());
        assert!(date_from_serial(2.0).is_some());
    }

    #[test]
    fn display_of_huge_whole_numbers_does_not_saturate() {
        assert_eq!(Cell::Number(1.0e20).as_display(), "100000000000000000000");
        assert_eq!(Cell::Number(2.0).as_display(), "2");
        assert_eq!(Cell::Number(2.5).as_display(), "2.5");
    }

    #[test]
    fn boolean_text_matches_truthy_tokens_only() {
        for token in ["true", "TRUE", " Yes ", "y", "1"] {
            assert_eq!(
                coerce(LogicalType::Boolean, &Cell::Text(token.into())).unwrap(),
                Cell::Bool(true)
            );
        }
        for token in ["false", "no", "n", "0", "maybe"] {
            assert_eq!(
                coerce(LogicalType::Boolean, &Cell::Text(token.into())).unwrap(),
                Cell::Bool(false)
            );
        }
    }

    #[test]
    fn date_text_accepts_multiple_formats() {
        let expected = Cell::Date(ymd(2024, 5, 6));
        assert_eq!(
            coerce(LogicalType::Date, &Cell::Text("2024-05-06".into())).unwrap(),
            expected
        );
        assert_eq!(
            coerce(LogicalType::Date, &Cell::Text("06/05/2024".into())).unwrap(),
            expected
        );
        assert!(coerce(LogicalType::Date, &Cell::Text("not a date".into())).is_err());
    }

    #[test]
    fn coercion_is_idempotent() {
        let cases = [
            (LogicalType::String, Cell::Number(42.5)),
            (LogicalType::Number, Cell::Text("13.37".into())),
            (LogicalType::Boolean, Cell::Text("yes".into())),
            (LogicalType::Date, Cell::Number(44_197.0)),
            (LogicalType::Any, Cell::Text("anything".into())),
        ];
        for (ty, raw) in cases {
            let once = coerce(ty, &raw).unwrap();
            let twice = coerce(ty, &once).unwrap();
            assert_eq!(once, twice, "coerce({ty}, _) must be idempotent");
        }
    }

    #[test]
    fn logical_type_synonyms_normalize() {
        assert_eq!("int".parse::<LogicalType>().unwrap(), LogicalType::Number);
        assert_eq!("Float".parse::<LogicalType>().unwrap(), LogicalType::Number);
        assert_eq!("bool".parse::<LogicalType>().unwrap(), LogicalType::Boolean);
        assert_eq!(
            "timestamp".parse::<LogicalType>().unwrap(),
            LogicalType::Date
        );
        assert_eq!(
            "varchar".parse::<LogicalType>().unwrap(),
            LogicalType::String
        );
        assert!("blob".parse::<LogicalType>().is_err());
    }

    #[test]
    fn cells_equal_honors_trim_and_case() {
        let opts = FindOptions {
            case_insensitive: true,
            trim: true,
        };
        assert!(cells_equal(
            &Cell::Text(" Alice ".into()),
            &Cell::Text("alice".into()),
            opts
        ));
        assert!(!cells_equal(
            &Cell::Text(" Alice ".into()),
            &Cell::Text("alice".into()),
            FindOptions::default()
        ));
        let dt = ymd(2024, 1, 1);
        assert!(cells_equal(
            &Cell::Date(dt),
            &Cell::Number(dt.and_utc().timestamp_millis() as f64),
            FindOptions::default()
        ));
    }
}
