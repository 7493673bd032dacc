//! In-memory tabular dataset loaded from CSV.
//!
//! Columns are typed once at load time: a column whose present cells all parse
//! as booleans is `Bool`, then `Int`, then `Float`, otherwise `Text`. Empty
//! cells and the usual NA spellings are missing in every column type.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{DataChatError, Result};

/// Cell texts read as missing values.
const NA_VALUES: &[&str] = &["", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "<NA>"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

/// Column-major table.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    cells: Vec<Vec<Cell>>,
    rows: usize,
}

impl Dataset {
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            DataChatError::Dataset(format!("could not read {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_csv_str(&text)?;
        log::info!(
            "Loaded dataset {} ({} rows, {} columns)",
            path.display(),
            dataset.len(),
            dataset.columns.len()
        );
        Ok(dataset)
    }

    pub fn from_csv_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_csv_str(&text)
    }

    fn from_csv_str(text: &str) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut records = parse_records(text)?.into_iter();
        let header = records
            .next()
            .ok_or_else(|| DataChatError::Dataset("empty CSV: no header row".to_string()))?;
        let columns = dedupe_names(header);

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
        let mut rows = 0;
        for (i, record) in records.enumerate() {
            // A lone empty field is a blank line.
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            if record.len() != columns.len() {
                return Err(DataChatError::Dataset(format!(
                    "row {} has {} fields, expected {}",
                    i + 2,
                    record.len(),
                    columns.len()
                )));
            }
            for (column, field) in raw.iter_mut().zip(record) {
                column.push(field);
            }
            rows += 1;
        }

        let cells = raw.into_iter().map(|column| type_column(&column)).collect();
        Ok(Self { columns, cells, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Cells per column, in column order.
    pub fn column_cells(&self) -> &[Vec<Cell>] {
        &self.cells
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.cells[i].as_slice())
    }

    /// Header plus the first `n` rows as comma-separated lines.
    pub fn preview(&self, n: usize) -> String {
        let mut lines = vec![self.columns.join(",")];
        for row in 0..self.rows.min(n) {
            let fields: Vec<String> = self.cells.iter().map(|col| col[row].to_string()).collect();
            lines.push(fields.join(","));
        }
        lines.join("\n")
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Missing => f.write_str(""),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

fn is_missing(field: &str) -> bool {
    NA_VALUES.contains(&field.trim())
}

fn parse_bool(field: &str) -> Option<bool> {
    match field.trim() {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

fn parse_int(field: &str) -> Option<i64> {
    field.trim().parse().ok()
}

fn parse_float(field: &str) -> Option<f64> {
    let t = field.trim();
    match t {
        "inf" | "Infinity" => Some(f64::INFINITY),
        "-inf" | "-Infinity" => Some(f64::NEG_INFINITY),
        _ if t.chars().any(|c| c.is_ascii_digit()) => t.parse().ok(),
        _ => None,
    }
}

fn type_column(fields: &[String]) -> Vec<Cell> {
    let present = || fields.iter().filter(|f| !is_missing(f));
    let kind = if present().next().is_none() {
        ColumnKind::Float
    } else if present().all(|f| parse_bool(f).is_some()) {
        ColumnKind::Bool
    } else if present().all(|f| parse_int(f).is_some()) {
        ColumnKind::Int
    } else if present().all(|f| parse_float(f).is_some()) {
        ColumnKind::Float
    } else {
        ColumnKind::Text
    };

    fields
        .iter()
        .map(|f| {
            if is_missing(f) {
                return Cell::Missing;
            }
            match kind {
                ColumnKind::Bool => parse_bool(f).map(Cell::Bool),
                ColumnKind::Int => parse_int(f).map(Cell::Int),
                ColumnKind::Float => parse_float(f).map(Cell::Float),
                ColumnKind::Text => Some(Cell::Text(f.clone())),
            }
            .unwrap_or(Cell::Missing)
        })
        .collect()
}

/// Repeated header names get `.1`, `.2`, ... suffixes; blank ones become `Unnamed: i`.
fn dedupe_names(header: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(header.len());
    for (i, name) in header.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        out.push(candidate);
    }
    out
}

/// RFC 4180 records: quoted fields may hold commas, newlines and doubled quotes.
fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(DataChatError::Dataset(format!("unterminated quoted field (line {})", line)));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> Dataset {
        Dataset::from_csv_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_column_typing() {
        let ds = load("id,price,flag,name\n1,2.5,true,apple\n2,3,false,pear\n");
        assert_eq!(ds.columns(), &["id", "price", "flag", "name"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.column("id").unwrap(), &[Cell::Int(1), Cell::Int(2)]);
        assert_eq!(ds.column("price").unwrap(), &[Cell::Float(2.5), Cell::Float(3.0)]);
        assert_eq!(ds.column("flag").unwrap(), &[Cell::Bool(true), Cell::Bool(false)]);
        assert_eq!(
            ds.column("name").unwrap(),
            &[Cell::Text("apple".to_string()), Cell::Text("pear".to_string())]
        );
    }

    #[test]
    fn test_missing_cells_keep_column_type() {
        let ds = load("a,b\n1,\nNA,x\n3,y\n");
        assert_eq!(ds.column("a").unwrap(), &[Cell::Int(1), Cell::Missing, Cell::Int(3)]);
        assert_eq!(ds.column("b").unwrap()[0], Cell::Missing);
    }

    #[test]
    fn test_quoted_fields() {
        let ds = load("name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n\"multi\nline\",x\n");
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.column("name").unwrap()[0], Cell::Text("Smith, J".to_string()));
        assert_eq!(ds.column("note").unwrap()[0], Cell::Text("said \"hi\"".to_string()));
        assert_eq!(ds.column("name").unwrap()[1], Cell::Text("multi\nline".to_string()));
    }

    #[test]
    fn test_crlf_and_trailing_blank_line() {
        let ds = load("a,b\r\n1,2\r\n3,4\r\n\r\n");
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.column("b").unwrap(), &[Cell::Int(2), Cell::Int(4)]);
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let err = Dataset::from_csv_reader("a,b\n1,2,3\n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Dataset error: row 2 has 3 fields, expected 2");
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(Dataset::from_csv_reader("".as_bytes()).is_err());
    }

    #[test]
    fn test_unterminated_quote() {
        let err = Dataset::from_csv_reader("a\n\"open\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let ds = load("a,a,\n1,2,3\n");
        assert_eq!(ds.columns(), &["a", "a.1", "Unnamed: 2"]);
    }

    #[test]
    fn test_preview() {
        let ds = load("a,b\n1,x\n2,y\n3,z\n");
        assert_eq!(ds.preview(2), "a,b\n1,x\n2,y");
    }

    #[test]
    fn test_from_csv_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        fs::write(&path, "x\n1\n2\n").unwrap();
        let ds = Dataset::from_csv_path(&path).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(Dataset::from_csv_path(&dir.path().join("missing.csv")).is_err());
    }
}
