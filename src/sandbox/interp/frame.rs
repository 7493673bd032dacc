//! Column store behind the pandas surface: scalars, indexes, series and frames.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use chrono::{NaiveDateTime, Timelike};

use super::error::{Eval, Fault};
use super::value::{HashKey, Value, float_repr, str_repr};
use crate::dataset::{Cell, Dataset};

const MAX_ROWS: usize = 60;
const EDGE_ROWS: usize = 5;
const DISPLAY_DECIMALS: usize = 6;

#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    DateTime(NaiveDateTime),
    Tuple(Rc<[Scalar]>),
}

impl Scalar {
    pub fn is_missing(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Null => Some(f64::NAN),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Null => Value::Float(f64::NAN),
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Int(*i),
            Scalar::Float(f) => Value::Float(*f),
            Scalar::Str(s) => Value::Str(s.clone()),
            Scalar::DateTime(d) => Value::DateTime(*d),
            Scalar::Tuple(items) => Value::tuple(items.iter().map(Scalar::to_value).collect()),
        }
    }

    pub fn from_value(value: &Value) -> Eval<Scalar> {
        Ok(match value {
            Value::None => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Int(i) => Scalar::Int(*i),
            Value::Float(f) => Scalar::Float(*f),
            Value::Str(s) => Scalar::Str(s.clone()),
            Value::DateTime(d) => Scalar::DateTime(*d),
            Value::Date(d) => Scalar::DateTime(d.and_time(chrono::NaiveTime::MIN)),
            Value::Tuple(items) => Scalar::Tuple(
                items
                    .iter()
                    .map(Scalar::from_value)
                    .collect::<Eval<Vec<_>>>()?
                    .into(),
            ),
            other => {
                return Err(Fault::type_error(format!(
                    "cannot store '{}' in a column",
                    other.type_name()
                )));
            }
        })
    }

    pub fn key(&self) -> HashKey {
        match self {
            Scalar::Null => HashKey::None,
            Scalar::Float(f) if f.is_nan() => HashKey::None,
            other => other.to_value().hash_key().unwrap_or(HashKey::None),
        }
    }

    pub fn same(&self, other: &Scalar) -> bool {
        self.key() == other.key()
    }

    /// Sort order with missing values last.
    pub fn sort_cmp(&self, other: &Scalar) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::DateTime(a), Scalar::DateTime(b)) => a.cmp(b),
            (Scalar::Tuple(a), Scalar::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                // Mixed kinds: numbers before text.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.display().cmp(&b.display()),
            },
        }
    }

    /// Plain cell text, no column-wide alignment.
    pub fn display(&self) -> String {
        match self {
            Scalar::Null => "NaN".to_string(),
            Scalar::Bool(true) => "True".to_string(),
            Scalar::Bool(false) => "False".to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) if f.is_nan() => "NaN".to_string(),
            Scalar::Float(f) => float_repr(*f),
            Scalar::Str(s) => s.to_string(),
            Scalar::DateTime(d) => datetime_text(d),
            Scalar::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|s| s.display()).collect();
                format!("({})", parts.join(", "))
            }
        }
    }

    pub fn json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Int(i) => serde_json::Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            other => serde_json::Value::String(other.display()),
        }
    }
}

impl From<&Cell> for Scalar {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Missing => Scalar::Null,
            Cell::Bool(b) => Scalar::Bool(*b),
            Cell::Int(i) => Scalar::Int(*i),
            Cell::Float(f) => Scalar::Float(*f),
            Cell::Text(s) => Scalar::Str(Rc::from(s.as_str())),
        }
    }
}

fn datetime_text(d: &NaiveDateTime) -> String {
    if d.time().num_seconds_from_midnight() == 0 {
        d.format("%Y-%m-%d").to_string()
    } else {
        d.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Int64,
    Float64,
    Bool,
    Object,
    DateTime,
}

impl Dtype {
    pub fn name(self) -> &'static str {
        match self {
            Dtype::Int64 => "int64",
            Dtype::Float64 => "float64",
            Dtype::Bool => "bool",
            Dtype::Object => "object",
            Dtype::DateTime => "datetime64[ns]",
        }
    }

    pub fn infer(values: &[Scalar]) -> Dtype {
        let (mut ints, mut floats, mut bools, mut dates, mut other, mut nulls) = (0, 0, 0, 0, 0, 0);
        for v in values {
            match v {
                Scalar::Null => nulls += 1,
                Scalar::Int(_) => ints += 1,
                Scalar::Float(_) => floats += 1,
                Scalar::Bool(_) => bools += 1,
                Scalar::DateTime(_) => dates += 1,
                _ => other += 1,
            }
        }
        if other > 0 {
            Dtype::Object
        } else if dates > 0 {
            if ints + floats + bools == 0 { Dtype::DateTime } else { Dtype::Object }
        } else if bools > 0 {
            if ints + floats + nulls == 0 { Dtype::Bool } else { Dtype::Object }
        } else if floats > 0 || nulls > 0 {
            if ints + floats == 0 && nulls > 0 { Dtype::Object } else { Dtype::Float64 }
        } else if ints > 0 {
            Dtype::Int64
        } else {
            Dtype::Object
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Dtype::Int64 | Dtype::Float64)
    }
}

pub fn is_numeric(values: &[Scalar]) -> bool {
    Dtype::infer(values).is_numeric()
}

/// Row labels. Multi-level labels are stored as `Scalar::Tuple`.
#[derive(Debug, Clone)]
pub struct Index {
    pub names: Vec<Option<String>>,
    pub labels: Vec<Scalar>,
}

impl Index {
    pub fn range(n: usize) -> Self {
        Self {
            names: vec![None],
            labels: (0..n as i64).map(Scalar::Int).collect(),
        }
    }

    pub fn named(name: Option<String>, labels: Vec<Scalar>) -> Self {
        Self {
            names: vec![name],
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn is_default(&self) -> bool {
        self.names.len() == 1
            && self.names[0].is_none()
            && self
                .labels
                .iter()
                .enumerate()
                .all(|(i, l)| matches!(l, Scalar::Int(v) if *v == i as i64))
    }

    pub fn position(&self, label: &Scalar) -> Option<usize> {
        self.labels.iter().position(|l| l.same(label))
    }

    pub fn take(&self, rows: &[usize]) -> Index {
        Index {
            names: self.names.clone(),
            labels: rows.iter().map(|&r| self.labels[r].clone()).collect(),
        }
    }

    pub fn levels(&self) -> usize {
        self.names.len()
    }

    /// Level values of every label, one column per level.
    pub fn level_columns(&self) -> Vec<(String, Vec<Scalar>)> {
        let levels = self.levels();
        let mut columns: Vec<Vec<Scalar>> = vec![Vec::with_capacity(self.len()); levels];
        for label in &self.labels {
            match label {
                Scalar::Tuple(parts) if levels > 1 => {
                    for (level, part) in parts.iter().enumerate().take(levels) {
                        columns[level].push(part.clone());
                    }
                }
                other => columns[0].push(other.clone()),
            }
        }
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.clone().unwrap_or_else(|| {
                    if levels == 1 { "index".to_string() } else { format!("level_{}", i) }
                });
                (name, std::mem::take(&mut columns[i]))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    pub name: Option<String>,
    pub index: Index,
    pub values: Vec<Scalar>,
    /// Rendered and typed as a numpy array rather than a Series.
    pub is_array: bool,
}

impl Series {
    pub fn new(name: Option<String>, values: Vec<Scalar>) -> Self {
        Self {
            name,
            index: Index::range(values.len()),
            values,
            is_array: false,
        }
    }

    pub fn with_index(name: Option<String>, index: Index, values: Vec<Scalar>) -> Self {
        Self {
            name,
            index,
            values,
            is_array: false,
        }
    }

    pub fn array(values: Vec<Scalar>) -> Self {
        Self {
            is_array: true,
            ..Self::new(None, values)
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dtype(&self) -> Dtype {
        Dtype::infer(&self.values)
    }

    pub fn take(&self, rows: &[usize]) -> Series {
        Series {
            name: self.name.clone(),
            index: self.index.take(rows),
            values: rows.iter().map(|&r| self.values[r].clone()).collect(),
            is_array: self.is_array,
        }
    }

    pub fn map_values(&self, values: Vec<Scalar>) -> Series {
        Series {
            name: self.name.clone(),
            index: self.index.clone(),
            values,
            is_array: self.is_array,
        }
    }

    pub fn numbers(&self) -> Vec<f64> {
        numeric_values(&self.values)
    }

    pub fn render(&self) -> String {
        if self.is_array {
            return render_array(&self.values);
        }
        let n = self.len();
        let rows: Vec<Option<usize>> = visible_rows(n);
        let cells = format_column(&self.values);
        let labels = format_labels(&self.index);

        let label_width = rows
            .iter()
            .map(|r| r.map(|i| labels[i].chars().count()).unwrap_or(3))
            .max()
            .unwrap_or(0);
        let value_width = rows
            .iter()
            .map(|r| r.map(|i| cells[i].chars().count()).unwrap_or(3))
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        if let Some(Some(index_name)) = self.index.names.first()
            && self.index.levels() == 1
        {
            let _ = writeln!(out, "{}", index_name);
        }
        for row in &rows {
            match row {
                Some(i) => {
                    let _ = writeln!(
                        out,
                        "{:<lw$}    {:>vw$}",
                        labels[*i],
                        cells[*i],
                        lw = label_width,
                        vw = value_width
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "{:<lw$}    {:>vw$}",
                        "..",
                        "...",
                        lw = label_width,
                        vw = value_width
                    );
                }
            }
        }
        let mut footer = Vec::new();
        if let Some(name) = &self.name {
            footer.push(format!("Name: {}", name));
        }
        if n > MAX_ROWS {
            footer.push(format!("Length: {}", n));
        }
        footer.push(format!("dtype: {}", self.dtype().name()));
        out.push_str(&footer.join(", "));
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (label, value) in self.index.labels.iter().zip(self.values.iter()) {
            map.insert(label.display(), value.json());
        }
        serde_json::Value::Object(map)
    }
}

#[derive(Debug, Clone)]
pub struct DataFrame {
    pub index: Index,
    pub columns: Vec<String>,
    /// Column-major cells: `data[column][row]`.
    pub data: Vec<Vec<Scalar>>,
}

impl DataFrame {
    pub fn empty() -> Self {
        Self {
            index: Index::range(0),
            columns: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        let data: Vec<Vec<Scalar>> = dataset
            .column_cells()
            .iter()
            .map(|cells| cells.iter().map(Scalar::from).collect())
            .collect();
        Self {
            index: Index::range(dataset.len()),
            columns: dataset.columns().to_vec(),
            data,
        }
    }

    pub fn from_columns(columns: Vec<(String, Vec<Scalar>)>) -> Eval<Self> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if columns.iter().any(|(_, v)| v.len() != rows) {
            return Err(Fault::value_error("All arrays must be of the same length"));
        }
        let (names, data) = columns.into_iter().unzip();
        Ok(Self {
            index: Index::range(rows),
            columns: names,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 || self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn column(&self, name: &str) -> Eval<Series> {
        let pos = self
            .position(name)
            .ok_or_else(|| Fault::key_error(str_repr(name)))?;
        Ok(Series::with_index(
            Some(name.to_string()),
            self.index.clone(),
            self.data[pos].clone(),
        ))
    }

    pub fn set_column(&mut self, name: &str, values: Vec<Scalar>) -> Eval<()> {
        if !self.columns.is_empty() && values.len() != self.len() {
            return Err(Fault::value_error(format!(
                "Length of values ({}) does not match length of index ({})",
                values.len(),
                self.len()
            )));
        }
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = Index::range(values.len());
        }
        match self.position(name) {
            Some(pos) => self.data[pos] = values,
            None => {
                self.columns.push(name.to_string());
                self.data.push(values);
            }
        }
        Ok(())
    }

    pub fn select(&self, names: &[String]) -> Eval<DataFrame> {
        let mut data = Vec::with_capacity(names.len());
        for name in names {
            let pos = self
                .position(name)
                .ok_or_else(|| Fault::key_error(format!("\"['{}'] not in index\"", name)))?;
            data.push(self.data[pos].clone());
        }
        Ok(DataFrame {
            index: self.index.clone(),
            columns: names.to_vec(),
            data,
        })
    }

    pub fn take(&self, rows: &[usize]) -> DataFrame {
        DataFrame {
            index: self.index.take(rows),
            columns: self.columns.clone(),
            data: self
                .data
                .iter()
                .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
                .collect(),
        }
    }

    pub fn row(&self, row: usize) -> Series {
        Series::with_index(
            Some(self.index.labels[row].display()),
            Index::named(None, str_labels(self.columns.iter().map(String::as_str))),
            self.data.iter().map(|col| col[row].clone()).collect(),
        )
    }

    pub fn dtypes(&self) -> Vec<Dtype> {
        self.data.iter().map(|c| Dtype::infer(c)).collect()
    }

    pub fn numeric_columns(&self) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, c)| is_numeric(c))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index levels moved back into ordinary leading columns.
    pub fn reset_index(&self, drop: bool) -> DataFrame {
        let mut columns = Vec::new();
        let mut data = Vec::new();
        if !drop {
            for (name, values) in self.index.level_columns() {
                columns.push(name);
                data.push(values);
            }
        }
        columns.extend(self.columns.iter().cloned());
        data.extend(self.data.iter().cloned());
        DataFrame {
            index: Index::range(self.len()),
            columns,
            data,
        }
    }

    pub fn render(&self) -> String {
        if self.columns.is_empty() {
            return format!("Empty DataFrame\nColumns: []\nIndex: [{}]", self.len());
        }
        let n = self.len();
        let rows = visible_rows(n);
        let labels = format_labels(&self.index);
        let cells: Vec<Vec<String>> = self.data.iter().map(|c| format_column(c)).collect();

        let label_width = rows
            .iter()
            .map(|r| r.map(|i| labels[i].chars().count()).unwrap_or(3))
            .max()
            .unwrap_or(0);
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(c, name)| {
                rows.iter()
                    .map(|r| r.map(|i| cells[c][i].chars().count()).unwrap_or(3))
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let _ = write!(out, "{:lw$}", "", lw = label_width);
        for (c, name) in self.columns.iter().enumerate() {
            let _ = write!(out, "  {:>w$}", name, w = widths[c]);
        }
        out.push('\n');

        let named_index: Vec<String> = self.index.names.iter().flatten().cloned().collect();
        if !named_index.is_empty() {
            let _ = writeln!(out, "{:<lw$}", named_index.join(" "), lw = label_width);
        }

        for (pos, row) in rows.iter().enumerate() {
            match row {
                Some(i) => {
                    let _ = write!(out, "{:<lw$}", labels[*i], lw = label_width);
                    for (c, width) in widths.iter().enumerate() {
                        let _ = write!(out, "  {:>w$}", cells[c][*i], w = width);
                    }
                }
                None => {
                    let _ = write!(out, "{:<lw$}", "..", lw = label_width);
                    for width in &widths {
                        let _ = write!(out, "  {:>w$}", "...", w = width);
                    }
                }
            }
            if pos + 1 < rows.len() {
                out.push('\n');
            }
        }
        if n > MAX_ROWS {
            let _ = write!(out, "\n\n[{} rows x {} columns]", n, self.columns.len());
        }
        out
    }

    pub fn info(&self) -> String {
        let mut out = String::from("<class 'pandas.core.frame.DataFrame'>\n");
        if self.index.is_default() {
            let _ = writeln!(
                out,
                "RangeIndex: {} entries, 0 to {}",
                self.len(),
                self.len().saturating_sub(1)
            );
        } else {
            let _ = writeln!(out, "Index: {} entries", self.len());
        }
        let _ = writeln!(out, "Data columns (total {} columns):", self.columns.len());
        let name_width = self.columns.iter().map(|c| c.len()).max().unwrap_or(6).max(6);
        let _ = writeln!(out, " #   {:<nw$}  Non-Null Count  Dtype", "Column", nw = name_width);
        let _ = writeln!(out, "---  {:<nw$}  --------------  -----", "------", nw = name_width);
        let dtypes = self.dtypes();
        for (i, name) in self.columns.iter().enumerate() {
            let non_null = self.data[i].iter().filter(|v| !v.is_missing()).count();
            let _ = writeln!(
                out,
                " {:<3} {:<nw$}  {:<14}  {}",
                i,
                name,
                format!("{} non-null", non_null),
                dtypes[i].name(),
                nw = name_width
            );
        }
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for dtype in &dtypes {
            match counts.iter_mut().find(|(n, _)| *n == dtype.name()) {
                Some(entry) => entry.1 += 1,
                None => counts.push((dtype.name(), 1)),
            }
        }
        counts.sort();
        let summary: Vec<String> = counts.iter().map(|(n, c)| format!("{}({})", n, c)).collect();
        let _ = write!(out, "dtypes: {}", summary.join(", "));
        out
    }

    pub fn to_csv(&self, index: bool) -> String {
        let mut out = String::new();
        let mut header: Vec<String> = Vec::new();
        if index {
            header.push(String::new());
        }
        header.extend(self.columns.iter().map(|c| csv_field(c)));
        let _ = writeln!(out, "{}", header.join(","));
        for row in 0..self.len() {
            let mut fields: Vec<String> = Vec::new();
            if index {
                fields.push(csv_field(&self.index.labels[row].display()));
            }
            for col in &self.data {
                let cell = &col[row];
                fields.push(if cell.is_missing() {
                    String::new()
                } else {
                    csv_field(&cell.display())
                });
            }
            let _ = writeln!(out, "{}", fields.join(","));
        }
        out
    }

    /// `orient="columns"` (pandas default) or `"records"`.
    pub fn to_json(&self, orient: &str) -> Eval<serde_json::Value> {
        match orient {
            "columns" => {
                let mut outer = serde_json::Map::new();
                for (c, name) in self.columns.iter().enumerate() {
                    let mut inner = serde_json::Map::new();
                    for (label, value) in self.index.labels.iter().zip(self.data[c].iter()) {
                        inner.insert(label.display(), value.json());
                    }
                    outer.insert(name.clone(), serde_json::Value::Object(inner));
                }
                Ok(serde_json::Value::Object(outer))
            }
            "records" => {
                let records = (0..self.len())
                    .map(|row| {
                        let mut map = serde_json::Map::new();
                        for (c, name) in self.columns.iter().enumerate() {
                            map.insert(name.clone(), self.data[c][row].json());
                        }
                        serde_json::Value::Object(map)
                    })
                    .collect();
                Ok(serde_json::Value::Array(records))
            }
            other => Err(Fault::value_error(format!("unsupported orient '{}'", other))),
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from(
            "<table border=\"1\" class=\"dataframe\">\n  <thead>\n    \
             <tr style=\"text-align: right;\">\n      <th></th>\n",
        );
        for name in &self.columns {
            let _ = writeln!(out, "      <th>{}</th>", html_escape(name));
        }
        out.push_str("    </tr>\n  </thead>\n  <tbody>\n");
        let cells: Vec<Vec<String>> = self.data.iter().map(|c| format_column(c)).collect();
        let labels = format_labels(&self.index);
        for row in 0..self.len() {
            out.push_str("    <tr>\n");
            let _ = writeln!(out, "      <th>{}</th>", html_escape(&labels[row]));
            for col in &cells {
                let _ = writeln!(out, "      <td>{}</td>", html_escape(col[row].trim()));
            }
            out.push_str("    </tr>\n");
        }
        out.push_str("  </tbody>\n</table>");
        out
    }
}

pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn str_labels<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<Scalar> {
    labels.map(|l| Scalar::Str(Rc::from(l))).collect()
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn visible_rows(n: usize) -> Vec<Option<usize>> {
    if n <= MAX_ROWS {
        (0..n).map(Some).collect()
    } else {
        (0..EDGE_ROWS)
            .map(Some)
            .chain(std::iter::once(None))
            .chain((n - EDGE_ROWS..n).map(Some))
            .collect()
    }
}

fn format_labels(index: &Index) -> Vec<String> {
    index
        .labels
        .iter()
        .map(|label| match label {
            Scalar::Tuple(parts) if index.levels() > 1 => {
                parts.iter().map(|p| p.display()).collect::<Vec<_>>().join(" ")
            }
            other => other.display(),
        })
        .collect()
}

/// Cell texts for one column, floats sharing a common number of decimals.
pub fn format_column(values: &[Scalar]) -> Vec<String> {
    let has_float = values.iter().any(|v| matches!(v, Scalar::Float(_)));
    let numeric_only = values
        .iter()
        .all(|v| matches!(v, Scalar::Float(_) | Scalar::Int(_) | Scalar::Null));
    if !(has_float && numeric_only) {
        return values.iter().map(Scalar::display).collect();
    }

    let finite: Vec<f64> = values
        .iter()
        .filter_map(|v| v.as_f64())
        .filter(|f| f.is_finite())
        .collect();
    let use_sci = finite.iter().any(|f| f.abs() >= 1e15);
    let decimals = finite
        .iter()
        .map(|f| decimals_needed(*f))
        .max()
        .unwrap_or(1)
        .max(1);

    values
        .iter()
        .map(|v| match v.as_f64() {
            Some(f) if f.is_nan() => "NaN".to_string(),
            Some(f) if f.is_infinite() => if f > 0.0 { "inf".into() } else { "-inf".into() },
            Some(f) if use_sci => format!("{:.6e}", f),
            Some(f) => format!("{:.*}", decimals, f),
            None => v.display(),
        })
        .collect()
}

fn decimals_needed(f: f64) -> usize {
    let text = format!("{:.*}", DISPLAY_DECIMALS, f);
    match text.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len(),
        None => 0,
    }
}

fn render_array(values: &[Scalar]) -> String {
    let cells = match Dtype::infer(values) {
        Dtype::Object => values
            .iter()
            .map(|v| match v {
                Scalar::Str(s) => str_repr(s),
                other => other.display(),
            })
            .collect(),
        _ => format_column(values),
    };
    format!("[{}]", cells.join(" "))
}

pub fn numeric_values(values: &[Scalar]) -> Vec<f64> {
    values
        .iter()
        .filter(|v| !v.is_missing())
        .filter_map(Scalar::as_f64)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Std,
    Var,
    Count,
    Nunique,
    Prod,
    First,
    Last,
    Size,
}

impl Reduce {
    pub fn parse(name: &str) -> Option<Reduce> {
        Some(match name {
            "sum" => Reduce::Sum,
            "mean" | "average" => Reduce::Mean,
            "median" => Reduce::Median,
            "min" => Reduce::Min,
            "max" => Reduce::Max,
            "std" => Reduce::Std,
            "var" => Reduce::Var,
            "count" => Reduce::Count,
            "nunique" => Reduce::Nunique,
            "prod" => Reduce::Prod,
            "first" => Reduce::First,
            "last" => Reduce::Last,
            "size" => Reduce::Size,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Reduce::Sum => "sum",
            Reduce::Mean => "mean",
            Reduce::Median => "median",
            Reduce::Min => "min",
            Reduce::Max => "max",
            Reduce::Std => "std",
            Reduce::Var => "var",
            Reduce::Count => "count",
            Reduce::Nunique => "nunique",
            Reduce::Prod => "prod",
            Reduce::First => "first",
            Reduce::Last => "last",
            Reduce::Size => "size",
        }
    }

    /// Whether the reduction only makes sense on numeric columns.
    pub fn numeric_only(self) -> bool {
        matches!(self, Reduce::Mean | Reduce::Median | Reduce::Std | Reduce::Var | Reduce::Prod)
    }
}

pub fn reduce(values: &[Scalar], op: Reduce) -> Eval<Scalar> {
    let present: Vec<&Scalar> = values.iter().filter(|v| !v.is_missing()).collect();
    Ok(match op {
        Reduce::Count => Scalar::Int(present.len() as i64),
        Reduce::Size => Scalar::Int(values.len() as i64),
        Reduce::Nunique => {
            let mut seen: Vec<HashKey> = Vec::new();
            for v in &present {
                let key = v.key();
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
            Scalar::Int(seen.len() as i64)
        }
        Reduce::First => present.first().map(|v| (*v).clone()).unwrap_or(Scalar::Null),
        Reduce::Last => present.last().map(|v| (*v).clone()).unwrap_or(Scalar::Null),
        Reduce::Min | Reduce::Max => {
            let mut best: Option<&Scalar> = None;
            for v in &present {
                best = match best {
                    None => Some(v),
                    Some(b) => {
                        let ord = v.sort_cmp(b);
                        let better = if op == Reduce::Min {
                            ord == Ordering::Less
                        } else {
                            ord == Ordering::Greater
                        };
                        if better { Some(v) } else { Some(b) }
                    }
                };
            }
            best.cloned().unwrap_or(Scalar::Float(f64::NAN))
        }
        Reduce::Sum => {
            if present.iter().all(|v| matches!(v, Scalar::Int(_) | Scalar::Bool(_))) {
                let mut total: i64 = 0;
                for v in &present {
                    if let Some(f) = v.as_f64() {
                        total = total.wrapping_add(f as i64);
                    }
                }
                Scalar::Int(total)
            } else if present.iter().all(|v| matches!(v, Scalar::Str(_))) {
                let joined: String = present.iter().map(|v| v.display()).collect();
                Scalar::Str(Rc::from(joined.as_str()))
            } else {
                Scalar::Float(numbers_of(&present, op)?.iter().sum())
            }
        }
        Reduce::Prod => Scalar::Float(numbers_of(&present, op)?.iter().product()),
        Reduce::Mean => Scalar::Float(mean(&numbers_of(&present, op)?)),
        Reduce::Median => Scalar::Float(quantile(&numbers_of(&present, op)?, 0.5)),
        Reduce::Std => Scalar::Float(variance(&numbers_of(&present, op)?, 1).sqrt()),
        Reduce::Var => Scalar::Float(variance(&numbers_of(&present, op)?, 1)),
    })
}

fn numbers_of(present: &[&Scalar], op: Reduce) -> Eval<Vec<f64>> {
    present
        .iter()
        .map(|v| match v {
            Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_) => {
                Ok(v.as_f64().unwrap_or(f64::NAN))
            }
            other => Err(Fault::type_error(format!(
                "could not compute {} of non-numeric value {}",
                op.name(),
                str_repr(&other.display())
            ))),
        })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn variance(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - ddof) as f64
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Pearson correlation over pairwise-complete observations.
pub fn pearson(x: &[Scalar], y: &[Scalar]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| !a.is_missing() && !b.is_missing())
        .filter_map(|(a, b)| Some((a.as_f64()?, b.as_f64()?)))
        .collect();
    pearson_pairs(&pairs)
}

pub fn pearson_pairs(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in pairs {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

/// Stable argsort, missing values last regardless of direction.
pub fn argsort(values: &[Scalar], ascending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&values[a], &values[b]);
        if x.is_missing() || y.is_missing() || ascending {
            x.sort_cmp(y)
        } else {
            y.sort_cmp(x)
        }
    });
    order
}

/// Distinct non-missing values in first-seen order.
pub fn unique(values: &[Scalar]) -> Vec<Scalar> {
    let mut seen: HashMap<HashKey, ()> = HashMap::new();
    let mut out = Vec::new();
    for v in values {
        if seen.insert(v.key(), ()).is_none() {
            out.push(v.clone());
        }
    }
    out
}

pub fn value_counts(series: &Series, normalize: bool, ascending: bool) -> Series {
    let mut counts: Vec<(Scalar, i64)> = Vec::new();
    let mut slots: HashMap<HashKey, usize> = HashMap::new();
    for v in series.values.iter().filter(|v| !v.is_missing()) {
        match slots.get(&v.key()) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                slots.insert(v.key(), counts.len());
                counts.push((v.clone(), 1));
            }
        }
    }
    counts.sort_by(|a, b| if ascending { a.1.cmp(&b.1) } else { b.1.cmp(&a.1) });
    let total: i64 = counts.iter().map(|c| c.1).sum();
    let (labels, values): (Vec<Scalar>, Vec<Scalar>) = counts
        .into_iter()
        .map(|(label, count)| {
            let value = if normalize {
                Scalar::Float(count as f64 / total.max(1) as f64)
            } else {
                Scalar::Int(count)
            };
            (label, value)
        })
        .unzip();
    Series::with_index(
        Some(if normalize { "proportion" } else { "count" }.to_string()),
        Index::named(series.name.clone(), labels),
        values,
    )
}

pub const DESCRIBE_LABELS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

pub fn describe_numbers(values: &[Scalar]) -> Vec<Scalar> {
    let nums = numeric_values(values);
    let min = nums.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let (min, max) = if nums.is_empty() { (f64::NAN, f64::NAN) } else { (min, max) };
    vec![
        Scalar::Float(nums.len() as f64),
        Scalar::Float(mean(&nums)),
        Scalar::Float(variance(&nums, 1).sqrt()),
        Scalar::Float(min),
        Scalar::Float(quantile(&nums, 0.25)),
        Scalar::Float(quantile(&nums, 0.5)),
        Scalar::Float(quantile(&nums, 0.75)),
        Scalar::Float(max),
    ]
}

pub fn describe_objects(values: &[Scalar]) -> (Vec<&'static str>, Vec<Scalar>) {
    let present: Vec<Scalar> = values.iter().filter(|v| !v.is_missing()).cloned().collect();
    let counts = value_counts(&Series::new(None, present.clone()), false, false);
    let top = counts.index.labels.first().cloned().unwrap_or(Scalar::Null);
    let freq = counts.values.first().cloned().unwrap_or(Scalar::Null);
    (
        vec!["count", "unique", "top", "freq"],
        vec![
            Scalar::Int(present.len() as i64),
            Scalar::Int(unique(&present).len() as i64),
            top,
            freq,
        ],
    )
}

pub fn describe_frame(frame: &DataFrame) -> Eval<DataFrame> {
    let numeric = frame.numeric_columns();
    let mut out = DataFrame {
        index: Index::named(None, Vec::new()),
        columns: Vec::new(),
        data: Vec::new(),
    };
    if numeric.is_empty() {
        for (c, name) in frame.columns.iter().enumerate() {
            let (labels, values) = describe_objects(&frame.data[c]);
            out.index = Index::named(None, str_labels(labels.iter().copied()));
            out.columns.push(name.clone());
            out.data.push(values);
        }
        return Ok(out);
    }
    out.index = Index::named(None, str_labels(DESCRIBE_LABELS.iter().copied()));
    for c in numeric {
        out.columns.push(frame.columns[c].clone());
        out.data.push(describe_numbers(&frame.data[c]));
    }
    Ok(out)
}

/// Grouped view over a frame.
#[derive(Debug, Clone)]
pub struct GroupBy {
    pub frame: DataFrame,
    pub keys: Vec<String>,
    /// Columns picked with `groupby(..)[cols]`.
    pub selection: Option<Vec<String>>,
    /// `groupby(..)['col']` yields series results.
    pub series_result: bool,
    /// `as_index=False` moves group keys back into columns.
    pub as_index: bool,
}

impl GroupBy {
    pub fn new(frame: DataFrame, keys: Vec<String>) -> Eval<Self> {
        for key in &keys {
            if frame.position(key).is_none() {
                return Err(Fault::key_error(str_repr(key)));
            }
        }
        Ok(Self {
            frame,
            keys,
            selection: None,
            series_result: false,
            as_index: true,
        })
    }

    /// Sorted group labels with their member rows. Rows with a missing key are dropped.
    pub fn groups(&self) -> Vec<(Scalar, Vec<usize>)> {
        let key_columns: Vec<&Vec<Scalar>> = self
            .keys
            .iter()
            .filter_map(|k| self.frame.position(k))
            .map(|p| &self.frame.data[p])
            .collect();
        let mut groups: Vec<(Scalar, Vec<usize>)> = Vec::new();
        let mut slots: HashMap<HashKey, usize> = HashMap::new();
        for row in 0..self.frame.len() {
            let parts: Vec<Scalar> = key_columns.iter().map(|c| c[row].clone()).collect();
            if parts.iter().any(Scalar::is_missing) {
                continue;
            }
            let label = if parts.len() == 1 {
                parts.into_iter().next().unwrap_or(Scalar::Null)
            } else {
                Scalar::Tuple(parts.into())
            };
            match slots.get(&label.key()) {
                Some(&slot) => groups[slot].1.push(row),
                None => {
                    slots.insert(label.key(), groups.len());
                    groups.push((label, vec![row]));
                }
            }
        }
        groups.sort_by(|a, b| a.0.sort_cmp(&b.0));
        groups
    }

    pub fn value_columns(&self) -> Vec<String> {
        match &self.selection {
            Some(cols) => cols.clone(),
            None => self
                .frame
                .columns
                .iter()
                .filter(|c| !self.keys.contains(c))
                .cloned()
                .collect(),
        }
    }

    fn result_index(&self, groups: &[(Scalar, Vec<usize>)]) -> Index {
        Index {
            names: self.keys.iter().map(|k| Some(k.clone())).collect(),
            labels: groups.iter().map(|g| g.0.clone()).collect(),
        }
    }

    /// One reduction per value column.
    pub fn aggregate(&self, op: Reduce) -> Eval<DataFrame> {
        let plan: Vec<(String, Reduce)> = self
            .value_columns()
            .into_iter()
            .filter(|c| {
                !op.numeric_only()
                    || self
                        .frame
                        .position(c)
                        .map(|p| is_numeric(&self.frame.data[p]))
                        .unwrap_or(false)
            })
            .map(|c| (c, op))
            .collect();
        self.aggregate_plan(&plan, false)
    }

    /// Explicit column/reduction pairs; `suffix` names outputs `col_op`.
    pub fn aggregate_plan(&self, plan: &[(String, Reduce)], suffix: bool) -> Eval<DataFrame> {
        let groups = self.groups();
        let mut out = DataFrame {
            index: self.result_index(&groups),
            columns: Vec::new(),
            data: Vec::new(),
        };
        for (column, op) in plan {
            let pos = self
                .frame
                .position(column)
                .ok_or_else(|| Fault::key_error(format!("Column(s) ['{}'] do not exist", column)))?;
            let source = &self.frame.data[pos];
            let mut values = Vec::with_capacity(groups.len());
            for (_, rows) in &groups {
                let members: Vec<Scalar> = rows.iter().map(|&r| source[r].clone()).collect();
                values.push(reduce(&members, *op)?);
            }
            out.columns
                .push(if suffix { format!("{}_{}", column, op.name()) } else { column.clone() });
            out.data.push(values);
        }
        Ok(out)
    }

    pub fn size(&self) -> Series {
        let groups = self.groups();
        Series::with_index(
            None,
            self.result_index(&groups),
            groups.iter().map(|g| Scalar::Int(g.1.len() as i64)).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Scalar {
        Scalar::Str(Rc::from(text))
    }

    fn sample() -> DataFrame {
        DataFrame::from_columns(vec![
            ("city".to_string(), vec![s("b"), s("a"), s("b")]),
            ("sales".to_string(), vec![Scalar::Int(10), Scalar::Int(5), Scalar::Int(20)]),
            ("price".to_string(), vec![Scalar::Float(1.5), Scalar::Float(2.0), Scalar::Null]),
        ])
        .unwrap()
    }

    #[test]
    fn test_dtype_inference() {
        let frame = sample();
        let names: Vec<&str> = frame.dtypes().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["object", "int64", "float64"]);
    }

    #[test]
    fn test_render_aligns_columns() {
        let rendered = sample().render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "   city  sales  price");
        assert_eq!(lines[1], "0     b     10    1.5");
        assert_eq!(lines[3], "2     b     20    NaN");
    }

    #[test]
    fn test_series_render_footer() {
        let series = sample().column("sales").unwrap();
        assert!(series.render().ends_with("Name: sales, dtype: int64"));
    }

    #[test]
    fn test_reductions_skip_missing() {
        let frame = sample();
        assert!(matches!(reduce(&frame.data[1], Reduce::Sum).unwrap(), Scalar::Int(35)));
        match reduce(&frame.data[2], Reduce::Mean).unwrap() {
            Scalar::Float(f) => assert!((f - 1.75).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(reduce(&frame.data[2], Reduce::Count).unwrap(), Scalar::Int(2)));
        assert!(reduce(&frame.data[0], Reduce::Mean).is_err());
    }

    #[test]
    fn test_groupby_sorts_keys() {
        let grouped = GroupBy::new(sample(), vec!["city".into()]).unwrap();
        let out = grouped.aggregate(Reduce::Sum).unwrap();
        let labels: Vec<String> = out.index.labels.iter().map(|l| l.display()).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert!(matches!(out.data[0][1], Scalar::Int(30)));
    }

    #[test]
    fn test_value_counts_orders_by_frequency() {
        let counts = value_counts(&sample().column("city").unwrap(), false, false);
        assert_eq!(counts.index.labels[0].display(), "b");
        assert!(matches!(counts.values[0], Scalar::Int(2)));
        assert_eq!(counts.name.as_deref(), Some("count"));
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.25), 1.75);
    }

    #[test]
    fn test_pearson_perfect_line() {
        let x: Vec<Scalar> = (0..5).map(Scalar::Int).collect();
        let y: Vec<Scalar> = (0..5).map(|i| Scalar::Float(i as f64 * 2.0 + 1.0)).collect();
        assert!((pearson(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reset_index_restores_group_keys() {
        let grouped = GroupBy::new(sample(), vec!["city".into()]).unwrap();
        let flat = grouped.aggregate(Reduce::Sum).unwrap().reset_index(false);
        assert_eq!(flat.columns, vec!["city", "sales", "price"]);
        assert!(flat.index.is_default());
    }

    #[test]
    fn test_csv_quotes_fields() {
        let frame = DataFrame::from_columns(vec![("a".into(), vec![s("x,y")])]).unwrap();
        assert_eq!(frame.to_csv(false), "a\n\"x,y\"\n");
    }
}
