//! The pandas-shaped API over the column store in `frame`.
//!
//! Series and frames are values; every method returns a new object unless it
//! takes `inplace=True`, which rewrites the shared frame cell.

mod broadcast;
mod grouped;
mod indexing;
mod series;
mod table;

use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::builtins::{parse_float, round_float};
use super::error::{Eval, Fault};
use super::eval::{Interpreter, bound_method, no_attribute};
use super::frame::{DataFrame, Index, Scalar, Series};
use super::value::{Args, Builtin, Module, Shared, Value, shared};

pub use broadcast::{broadcast_binary, broadcast_compare, broadcast_unary};
pub use indexing::{get_item, set_item};

const FRAME_METHODS: &[&str] = &[
    "head", "tail", "describe", "info", "isnull", "isna", "notnull", "notna", "sum", "mean",
    "median", "min", "max", "std", "var", "count", "nunique", "prod", "sort_values", "sort_index",
    "groupby", "dropna", "fillna", "corr", "nlargest", "nsmallest", "copy", "to_csv", "to_json",
    "to_html", "round", "astype", "apply", "reset_index", "set_index", "rename", "drop", "iterrows",
    "items", "to_dict", "select_dtypes", "drop_duplicates", "duplicated", "sample", "assign",
    "pivot_table", "agg", "aggregate", "quantile", "idxmax", "idxmin", "plot", "hist",
    "value_counts", "abs", "any", "all", "first", "last", "cumsum",
];

const SERIES_METHODS: &[&str] = &[
    "head", "tail", "describe", "isnull", "isna", "notnull", "notna", "sum", "mean", "median",
    "min", "max", "std", "var", "count", "nunique", "prod", "unique", "value_counts", "sort_values",
    "sort_index", "dropna", "fillna", "round", "astype", "tolist", "to_list", "to_numpy", "copy",
    "apply", "map", "isin", "between", "clip", "abs", "cumsum", "diff", "pct_change", "shift",
    "corr", "idxmax", "idxmin", "nlargest", "nsmallest", "quantile", "mode", "any", "all", "item",
    "to_frame", "reset_index", "rename", "to_dict", "replace", "agg", "aggregate", "to_json",
    "to_csv", "plot", "hist", "sample", "first", "last", "groupby",
];

const GROUPBY_METHODS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "std", "var", "count", "nunique", "prod", "first",
    "last", "size", "agg", "aggregate", "get_group", "head", "apply", "transform",
];

static FUNCTIONS: &[Builtin] = &[
    Builtin { name: "DataFrame", func: new_frame },
    Builtin { name: "Series", func: new_series },
    Builtin { name: "isna", func: isna },
    Builtin { name: "isnull", func: isna },
    Builtin { name: "notna", func: notna },
    Builtin { name: "notnull", func: notna },
    Builtin { name: "to_datetime", func: to_datetime },
    Builtin { name: "to_numeric", func: to_numeric },
    Builtin { name: "concat", func: concat },
    Builtin { name: "read_csv", func: read_csv },
];

pub fn module() -> Value {
    let attrs = FUNCTIONS
        .iter()
        .map(|b| (b.name.to_string(), Value::Builtin(b)))
        .collect();
    Value::Module(Rc::new(Module {
        name: "pandas".to_string(),
        attrs,
    }))
}

pub fn frame_value(frame: DataFrame) -> Value {
    Value::Frame(shared(frame))
}

pub fn series_value(series: Series) -> Value {
    Value::Series(Rc::new(series))
}

pub(super) fn text(s: &str) -> Scalar {
    Scalar::Str(Rc::from(s))
}

pub(super) fn column_index(names: &[String]) -> Index {
    Index::named(None, names.iter().map(|n| text(n)).collect())
}

fn is_list_like(value: &Value) -> bool {
    matches!(
        value,
        Value::List(_) | Value::Tuple(_) | Value::Series(_) | Value::Range(..) | Value::Set(_)
    )
}

/// Cells of any list-like value.
pub fn scalars_of(interp: &mut Interpreter, value: &Value) -> Eval<Vec<Scalar>> {
    match value {
        Value::Series(s) => Ok(s.values.clone()),
        other => interp
            .iterate(other)?
            .iter()
            .map(Scalar::from_value)
            .collect(),
    }
}

/// Column names from a string or a list-like of labels.
pub(super) fn names_of(interp: &mut Interpreter, value: &Value) -> Eval<Vec<String>> {
    match value {
        Value::Str(s) => Ok(vec![s.to_string()]),
        other => Ok(scalars_of(interp, other)?.iter().map(Scalar::display).collect()),
    }
}

pub(super) fn int_arg(args: &Args, index: usize, name: &str, default: i64) -> Eval<i64> {
    match args.opt(index, name) {
        Some(v) => v.expect_int(name),
        None => Ok(default),
    }
}

/// Row positions for `head(n)` / `tail(n)`; negative `n` counts from the other end.
pub(super) fn edge_rows(len: usize, n: i64, head: bool) -> Vec<usize> {
    let take = if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub(n.unsigned_abs() as usize)
    };
    if head { (0..take).collect() } else { (len - take..len).collect() }
}

pub(super) fn round_scalar(value: &Scalar, digits: i64) -> Scalar {
    match value {
        Scalar::Float(f) => Scalar::Float(round_float(*f, digits)),
        other => other.clone(),
    }
}

pub(super) fn map_frame(frame: &DataFrame, f: impl Fn(&Scalar) -> Scalar) -> DataFrame {
    DataFrame {
        index: frame.index.clone(),
        columns: frame.columns.clone(),
        data: frame
            .data
            .iter()
            .map(|col| col.iter().map(&f).collect())
            .collect(),
    }
}

/// Writes `content` to the `path` argument when given, otherwise returns it.
pub(super) fn write_or_return(
    interp: &Interpreter,
    path: Option<&Value>,
    content: String,
) -> Eval<Value> {
    match path {
        Some(path) => {
            interp.write_output(path, content.as_bytes())?;
            Ok(Value::None)
        }
        None => Ok(Value::str(&content)),
    }
}

/// Name of a dtype given as a string or as a type object like `int`.
pub(super) fn dtype_name(value: &Value) -> Eval<String> {
    match value {
        Value::Str(s) => Ok(s.to_ascii_lowercase()),
        Value::Builtin(b) => Ok(b.name.to_string()),
        Value::Class(n) => Ok(n.to_string()),
        other => Err(Fault::type_error(format!(
            "data type '{}' not understood",
            other.to_str()
        ))),
    }
}

pub(super) fn cast(values: &[Scalar], dtype: &str) -> Eval<Vec<Scalar>> {
    values.iter().map(|v| cast_scalar(v, dtype)).collect()
}

fn cast_scalar(value: &Scalar, dtype: &str) -> Eval<Scalar> {
    let nonfinite =
        || Fault::value_error("Cannot convert non-finite values (NA or inf) to integer");
    Ok(match dtype {
        d if d.starts_with("int") || d.starts_with("uint") => match value {
            Scalar::Int(_) => value.clone(),
            Scalar::Bool(b) => Scalar::Int(*b as i64),
            Scalar::Float(f) if f.is_finite() => Scalar::Int(f.trunc() as i64),
            Scalar::Float(_) | Scalar::Null => return Err(nonfinite()),
            Scalar::Str(s) => s.trim().parse::<i64>().map(Scalar::Int).map_err(|_| {
                Fault::value_error(format!("invalid literal for int() with base 10: '{}'", s))
            })?,
            Scalar::DateTime(d) => {
                Scalar::Int(d.and_utc().timestamp_nanos_opt().unwrap_or(i64::MAX))
            }
            Scalar::Tuple(_) => return Err(Fault::type_error("cannot convert a tuple to int")),
        },
        d if d.starts_with("float") => match value {
            Scalar::Null => Scalar::Float(f64::NAN),
            Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_) => {
                Scalar::Float(value.as_f64().unwrap_or(f64::NAN))
            }
            Scalar::Str(s) => Scalar::Float(parse_float(s).ok_or_else(|| {
                Fault::value_error(format!("could not convert string to float: '{}'", s))
            })?),
            other => {
                return Err(Fault::type_error(format!(
                    "cannot convert '{}' to float",
                    other.display()
                )));
            }
        },
        "str" | "string" => {
            if value.is_missing() {
                text("nan")
            } else {
                text(&value.display())
            }
        }
        "bool" => Scalar::Bool(match value {
            Scalar::Null => true,
            other => other.to_value().truthy(),
        }),
        "object" | "category" => value.clone(),
        d if d.starts_with("datetime") => match value {
            Scalar::Str(s) => Scalar::DateTime(parse_datetime(s, None).ok_or_else(|| {
                Fault::value_error(format!(
                    "Unknown datetime string format, unable to parse: {}",
                    s
                ))
            })?),
            other => other.clone(),
        },
        other => return Err(Fault::type_error(format!("data type '{}' not understood", other))),
    })
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y",
    "%d %B %Y",
];

/// Parses a timestamp with an explicit strptime format or one of the common layouts.
pub fn parse_datetime(text: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Some(format) = format {
        return NaiveDateTime::parse_from_str(text, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, format).ok().map(|d| d.and_time(NaiveTime::MIN))
            });
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return Some(parsed.and_time(NaiveTime::MIN));
        }
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    // Year-month only.
    NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Row positions drawn by `sample(n=.., frac=.., random_state=..)`.
pub(super) fn sample_rows(len: usize, args: &Args) -> Eval<Vec<usize>> {
    let n = match (args.get(0, "n"), args.kw("frac")) {
        (Some(n), _) if !n.is_none() => n.expect_int("n")?.max(0) as usize,
        (_, Some(frac)) => (frac.expect_f64("frac")? * len as f64).round().max(0.0) as usize,
        _ => 1,
    };
    if n > len {
        return Err(Fault::value_error(
            "Cannot take a larger sample than population when 'replace=False'",
        ));
    }
    let mut rng = match args.kw("random_state").filter(|v| !v.is_none()) {
        Some(seed) => StdRng::seed_from_u64(seed.expect_int("random_state")? as u64),
        None => StdRng::from_os_rng(),
    };
    Ok(rand::seq::index::sample(&mut rng, len, n).into_vec())
}

// Module functions.

fn new_frame(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let columns = match args.opt(2, "columns") {
        Some(c) => Some(names_of(interp, c)?),
        None => None,
    };
    let mut frame = match args.opt(0, "data") {
        None => DataFrame::empty(),
        Some(Value::Frame(f)) => f.borrow().clone(),
        Some(Value::Series(s)) => s_to_frame(s, None),
        Some(Value::Dict(d)) => {
            let items = d.borrow().items();
            let mut cols: Vec<(String, Vec<Scalar>)> = Vec::with_capacity(items.len());
            let mut broadcast: Vec<(usize, Scalar)> = Vec::new();
            for (key, value) in items {
                if is_list_like(&value) {
                    cols.push((key.to_str(), scalars_of(interp, &value)?));
                } else {
                    broadcast.push((cols.len(), Scalar::from_value(&value)?));
                    cols.push((key.to_str(), Vec::new()));
                }
            }
            if !broadcast.is_empty() {
                let rows = cols
                    .iter()
                    .enumerate()
                    .find(|(i, _)| !broadcast.iter().any(|(b, _)| b == i))
                    .map(|(_, (_, v))| v.len())
                    .ok_or_else(|| {
                        Fault::value_error("If using all scalar values, you must pass an index")
                    })?;
                for (slot, value) in broadcast {
                    cols[slot].1 = vec![value; rows];
                }
            }
            DataFrame::from_columns(cols)?
        }
        Some(data @ (Value::List(_) | Value::Tuple(_))) => {
            let rows = interp.iterate(data)?;
            let frame = if !rows.is_empty() && rows.iter().all(|r| matches!(r, Value::Dict(_))) {
                from_records(&rows)?
            } else {
                from_rows(interp, &rows, columns.as_deref())?
            };
            return finish_frame(interp, frame, &args);
        }
        Some(other) => {
            return Err(Fault::value_error(format!(
                "DataFrame constructor not properly called! Got '{}'",
                other.type_name()
            )));
        }
    };
    if let Some(names) = &columns {
        frame = frame.select(names)?;
    }
    finish_frame(interp, frame, &args)
}

fn finish_frame(interp: &mut Interpreter, mut frame: DataFrame, args: &Args) -> Eval<Value> {
    if let Some(index) = args.opt(1, "index") {
        let labels = scalars_of(interp, index)?;
        if labels.len() != frame.len() {
            return Err(Fault::value_error(format!(
                "Length of values ({}) does not match length of index ({})",
                labels.len(),
                frame.len()
            )));
        }
        frame.index = Index::named(None, labels);
    }
    Ok(frame_value(frame))
}

fn from_records(rows: &[Value]) -> Eval<DataFrame> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Dict(d) = row {
            for key in d.borrow().keys() {
                let key = key.to_str();
                if !names.contains(&key) {
                    names.push(key);
                }
            }
        }
    }
    let mut data: Vec<Vec<Scalar>> = vec![Vec::with_capacity(rows.len()); names.len()];
    for row in rows {
        if let Value::Dict(d) = row {
            let d = d.borrow();
            for (c, name) in names.iter().enumerate() {
                data[c].push(match d.get_str(name) {
                    Some(v) => Scalar::from_value(&v)?,
                    None => Scalar::Null,
                });
            }
        }
    }
    DataFrame::from_columns(names.into_iter().zip(data).collect())
}

fn from_rows(
    interp: &mut Interpreter,
    rows: &[Value],
    columns: Option<&[String]>,
) -> Eval<DataFrame> {
    let mut cells: Vec<Vec<Scalar>> = Vec::with_capacity(rows.len());
    for row in rows {
        cells.push(if is_list_like(row) {
            scalars_of(interp, row)?
        } else {
            vec![Scalar::from_value(row)?]
        });
    }
    let width = match columns {
        Some(names) => names.len(),
        None => cells.iter().map(Vec::len).max().unwrap_or(0),
    };
    if let Some(row) = cells.iter().find(|r| r.len() > width) {
        return Err(Fault::value_error(format!(
            "{} columns passed, passed data had {} columns",
            width,
            row.len()
        )));
    }
    let names: Vec<String> = match columns {
        Some(names) => names.to_vec(),
        None => (0..width).map(|i| i.to_string()).collect(),
    };
    let mut data: Vec<Vec<Scalar>> = vec![Vec::with_capacity(cells.len()); width];
    for row in cells {
        for (c, column) in data.iter_mut().enumerate() {
            column.push(row.get(c).cloned().unwrap_or(Scalar::Null));
        }
    }
    DataFrame::from_columns(names.into_iter().zip(data).collect())
}

pub(super) fn s_to_frame(series: &Series, name: Option<String>) -> DataFrame {
    let name = name
        .or_else(|| series.name.clone())
        .unwrap_or_else(|| "0".to_string());
    DataFrame {
        index: series.index.clone(),
        columns: vec![name],
        data: vec![series.values.clone()],
    }
}

fn new_series(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let name = args.opt(3, "name").map(Value::to_str);
    let (labels, mut values) = match args.opt(0, "data") {
        None => (None, Vec::new()),
        Some(Value::Dict(d)) => {
            let items = d.borrow().items();
            let mut labels = Vec::with_capacity(items.len());
            let mut values = Vec::with_capacity(items.len());
            for (k, v) in items {
                labels.push(Scalar::from_value(&k)?);
                values.push(Scalar::from_value(&v)?);
            }
            (Some(labels), values)
        }
        Some(Value::Series(s)) => (Some(s.index.labels.clone()), s.values.clone()),
        Some(v) if is_list_like(v) => (None, scalars_of(interp, v)?),
        Some(v) => (None, vec![Scalar::from_value(v)?]),
    };
    let labels = match args.opt(1, "index") {
        Some(index) => Some(scalars_of(interp, index)?),
        None => labels,
    };
    if let Some(dtype) = args.opt(2, "dtype") {
        values = cast(&values, &dtype_name(dtype)?)?;
    }
    let series = match labels {
        Some(labels) => {
            if labels.len() != values.len() {
                return Err(Fault::value_error(format!(
                    "Length of values ({}) does not match length of index ({})",
                    values.len(),
                    labels.len()
                )));
            }
            Series::with_index(name, Index::named(None, labels), values)
        }
        None => Series::new(name, values),
    };
    Ok(series_value(series))
}

fn missing_value(value: &Value) -> bool {
    match value {
        Value::None => true,
        Value::Float(f) => f.is_nan(),
        _ => false,
    }
}

fn missing_mask(value: &Value, missing: bool) -> Value {
    match value {
        Value::Series(s) => series_value(s.map_values(
            s.values
                .iter()
                .map(|v| Scalar::Bool(v.is_missing() == missing))
                .collect(),
        )),
        Value::Frame(f) => {
            frame_value(map_frame(&f.borrow(), |v| Scalar::Bool(v.is_missing() == missing)))
        }
        other => Value::Bool(missing_value(other) == missing),
    }
}

fn isna(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(missing_mask(args.required(0, "obj", "isna")?, true))
}

fn notna(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(missing_mask(args.required(0, "obj", "notna")?, false))
}

fn to_datetime(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let arg = args.required(0, "arg", "to_datetime")?;
    let format = args.kw("format").and_then(Value::as_str).map(str::to_string);
    let coerce = args.kw("errors").and_then(Value::as_str) == Some("coerce");
    let convert = |cell: &Scalar| -> Eval<Scalar> {
        match cell {
            Scalar::Str(s) => match parse_datetime(s, format.as_deref()) {
                Some(parsed) => Ok(Scalar::DateTime(parsed)),
                None if coerce => Ok(Scalar::Null),
                None => Err(Fault::value_error(match &format {
                    Some(f) => format!("time data \"{}\" doesn't match format \"{}\"", s, f),
                    None => format!("Unknown datetime string format, unable to parse: {}", s),
                })),
            },
            Scalar::DateTime(_) => Ok(cell.clone()),
            c if c.is_missing() => Ok(Scalar::Null),
            _ if coerce => Ok(Scalar::Null),
            other => Err(Fault::type_error(format!(
                "cannot convert {} to datetime",
                other.display()
            ))),
        }
    };
    match arg {
        Value::Series(s) => {
            let values = s.values.iter().map(convert).collect::<Eval<Vec<_>>>()?;
            Ok(series_value(s.map_values(values)))
        }
        Value::Date(_) | Value::DateTime(_) => Ok(arg.clone()),
        v if is_list_like(v) => {
            let values = scalars_of(interp, v)?
                .iter()
                .map(convert)
                .collect::<Eval<Vec<_>>>()?;
            Ok(series_value(Series::array(values)))
        }
        other => Ok(convert(&Scalar::from_value(other)?)?.to_value()),
    }
}

fn to_numeric(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let arg = args.required(0, "arg", "to_numeric")?;
    let coerce = args.kw("errors").and_then(Value::as_str) == Some("coerce");
    let convert = |cell: &Scalar| -> Eval<Scalar> {
        match cell {
            Scalar::Str(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(Scalar::Int(i));
                }
                match parse_float(trimmed) {
                    Some(f) => Ok(Scalar::Float(f)),
                    None if coerce => Ok(Scalar::Null),
                    None => Err(Fault::value_error(format!("Unable to parse string \"{}\"", s))),
                }
            }
            Scalar::DateTime(_) | Scalar::Tuple(_) if coerce => Ok(Scalar::Null),
            Scalar::DateTime(_) | Scalar::Tuple(_) => Err(Fault::type_error(format!(
                "Invalid object type {}",
                cell.display()
            ))),
            other => Ok(other.clone()),
        }
    };
    match arg {
        Value::Series(s) => {
            let values = s.values.iter().map(convert).collect::<Eval<Vec<_>>>()?;
            Ok(series_value(s.map_values(values)))
        }
        v if is_list_like(v) => {
            let values = scalars_of(interp, v)?
                .iter()
                .map(convert)
                .collect::<Eval<Vec<_>>>()?;
            Ok(series_value(Series::array(values)))
        }
        other => Ok(convert(&Scalar::from_value(other)?)?.to_value()),
    }
}

fn concat(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let objs = interp.iterate(args.required(0, "objs", "concat")?)?;
    let ignore_index = args.flag("ignore_index", false);
    let axis = match args.kw("axis") {
        Some(Value::Str(s)) if &**s == "columns" => 1,
        Some(v) => v.expect_int("axis")?,
        None => 0,
    };
    if objs.is_empty() {
        return Err(Fault::value_error("No objects to concatenate"));
    }
    if axis == 0 && objs.iter().all(|o| matches!(o, Value::Series(_))) {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        let mut name = None;
        for obj in &objs {
            if let Value::Series(s) = obj {
                labels.extend(s.index.labels.iter().cloned());
                values.extend(s.values.iter().cloned());
                name = name.or_else(|| s.name.clone());
            }
        }
        let index = if ignore_index {
            Index::range(values.len())
        } else {
            Index::named(None, labels)
        };
        return Ok(series_value(Series::with_index(name, index, values)));
    }
    let frames = objs
        .iter()
        .map(|o| match o {
            Value::Frame(f) => Ok(f.borrow().clone()),
            Value::Series(s) => Ok(s_to_frame(s, None)),
            other => Err(Fault::type_error(format!(
                "cannot concatenate object of type '{}'; only Series and DataFrame objs are valid",
                other.type_name()
            ))),
        })
        .collect::<Eval<Vec<DataFrame>>>()?;
    if axis == 1 {
        let mut out = frames[0].clone();
        for frame in &frames[1..] {
            for (name, column) in frame.columns.iter().zip(&frame.data) {
                if column.len() != out.len() {
                    return Err(Fault::value_error(
                        "all frames must have the same length to concatenate columns",
                    ));
                }
                out.columns.push(name.clone());
                out.data.push(column.clone());
            }
        }
        return Ok(frame_value(out));
    }
    let mut names: Vec<String> = Vec::new();
    for frame in &frames {
        for name in &frame.columns {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    let mut data: Vec<Vec<Scalar>> = vec![Vec::new(); names.len()];
    let mut labels = Vec::new();
    for frame in &frames {
        labels.extend(frame.index.labels.iter().cloned());
        for (c, name) in names.iter().enumerate() {
            match frame.position(name) {
                Some(p) => data[c].extend(frame.data[p].iter().cloned()),
                None => data[c].extend(std::iter::repeat_n(Scalar::Null, frame.len())),
            }
        }
    }
    let rows = labels.len();
    Ok(frame_value(DataFrame {
        index: if ignore_index { Index::range(rows) } else { Index::named(None, labels) },
        columns: names,
        data,
    }))
}

fn read_csv(_: &mut Interpreter, _: Args) -> Eval<Value> {
    Err(Fault::new(
        "PermissionError",
        "reading files is not allowed; the dataset is already loaded as `df`",
    ))
}

// Attributes.

pub fn get_attr(obj: &Value, name: &str) -> Eval<Value> {
    match obj {
        Value::Frame(frame) => frame_attr(obj, &frame.borrow(), name),
        Value::Series(series) => series_attr(obj, series, name),
        Value::GroupBy(group) => grouped::attr(obj, group, name),
        Value::Indexer(indexer) => indexing::indexer_attr(obj, indexer, name),
        other => Err(no_attribute(other, name)),
    }
}

fn frame_attr(obj: &Value, frame: &DataFrame, name: &str) -> Eval<Value> {
    use super::value::Indexer;
    Ok(match name {
        "shape" => Value::tuple(vec![
            Value::Int(frame.len() as i64),
            Value::Int(frame.columns.len() as i64),
        ]),
        "columns" => series_value(Series::array(frame.columns.iter().map(|c| text(c)).collect())),
        "index" => series_value(Series::array(frame.index.labels.clone())),
        "dtypes" => series_value(Series::with_index(
            None,
            column_index(&frame.columns),
            frame.dtypes().iter().map(|d| text(d.name())).collect(),
        )),
        "values" => Value::list(
            (0..frame.len())
                .map(|r| Value::list(frame.data.iter().map(|c| c[r].to_value()).collect()))
                .collect(),
        ),
        "empty" => Value::Bool(frame.is_empty()),
        "size" => Value::Int((frame.len() * frame.columns.len()) as i64),
        "ndim" => Value::Int(2),
        "iloc" => Value::Indexer(Rc::new(Indexer::ILoc(obj.clone()))),
        "loc" => Value::Indexer(Rc::new(Indexer::Loc(obj.clone()))),
        "plot" => Value::Indexer(Rc::new(Indexer::Plot(obj.clone()))),
        _ if FRAME_METHODS.contains(&name) => bound_method(obj, name),
        _ if frame.position(name).is_some() => series_value(frame.column(name)?),
        _ => return Err(no_attribute(obj, name)),
    })
}

fn series_attr(obj: &Value, series: &Rc<Series>, name: &str) -> Eval<Value> {
    use super::value::Indexer;
    Ok(match name {
        "shape" => Value::tuple(vec![Value::Int(series.len() as i64)]),
        "values" => series_value(Series::array(series.values.clone())),
        "index" => series_value(Series::array(series.index.labels.clone())),
        "name" => series.name.as_deref().map(Value::str).unwrap_or(Value::None),
        "dtype" => Value::str(series.dtype().name()),
        "size" => Value::Int(series.len() as i64),
        "empty" => Value::Bool(series.is_empty()),
        "ndim" => Value::Int(1),
        "is_unique" => Value::Bool(super::frame::unique(&series.values).len() == series.len()),
        "iloc" => Value::Indexer(Rc::new(Indexer::ILoc(obj.clone()))),
        "loc" => Value::Indexer(Rc::new(Indexer::Loc(obj.clone()))),
        "plot" => Value::Indexer(Rc::new(Indexer::Plot(obj.clone()))),
        "str" => Value::Indexer(Rc::new(Indexer::Str(series.clone()))),
        "dt" => Value::Indexer(Rc::new(Indexer::Dt(series.clone()))),
        _ if SERIES_METHODS.contains(&name) => bound_method(obj, name),
        _ => return Err(no_attribute(obj, name)),
    })
}

/// `df.columns = [...]`, `df.index = [...]` and `df.existing_col = values`.
pub fn set_attr(
    interp: &mut Interpreter,
    frame: &Shared<DataFrame>,
    name: &str,
    value: Value,
) -> Eval<()> {
    match name {
        "columns" => {
            let names = names_of(interp, &value)?;
            let mut frame = frame.borrow_mut();
            if names.len() != frame.columns.len() {
                return Err(Fault::value_error(format!(
                    "Length mismatch: Expected axis has {} elements, new values have {} elements",
                    frame.columns.len(),
                    names.len()
                )));
            }
            frame.columns = names;
            Ok(())
        }
        "index" => {
            let labels = scalars_of(interp, &value)?;
            let mut frame = frame.borrow_mut();
            if labels.len() != frame.len() {
                return Err(Fault::value_error(format!(
                    "Length mismatch: Expected axis has {} elements, new values have {} elements",
                    frame.len(),
                    labels.len()
                )));
            }
            frame.index = Index::named(None, labels);
            Ok(())
        }
        column if frame.borrow().position(column).is_some() => {
            let index = frame.borrow().index.clone();
            let values = indexing::column_values(interp, &value, &index)?;
            frame.borrow_mut().set_column(column, values)
        }
        other => Err(Fault::attribute_error(format!(
            "cannot set attribute '{}' on 'DataFrame' object",
            other
        ))),
    }
}

// Methods.

pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Args,
) -> Eval<Value> {
    match receiver {
        Value::Series(s) => series::method(interp, receiver, s, name, args),
        Value::Frame(f) => table::method(interp, receiver, f, name, args),
        Value::GroupBy(g) => grouped::method(interp, receiver, g, name, args),
        Value::Indexer(ix) => indexing::indexer_method(interp, receiver, ix, name, args),
        other => Err(no_attribute(other, name)),
    }
}

/// Iteration: series values, frame column names, or `(key, group)` pairs.
pub fn iterate(value: &Value) -> Eval<Vec<Value>> {
    match value {
        Value::Series(s) => Ok(s.values.iter().map(Scalar::to_value).collect()),
        Value::Frame(f) => Ok(f.borrow().columns.iter().map(|c| Value::str(c)).collect()),
        Value::GroupBy(g) => grouped::pairs(g),
        other => Err(Fault::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_common_layouts() {
        let d = parse_datetime("2024-03-05", None).unwrap();
        assert_eq!(d.to_string(), "2024-03-05 00:00:00");
        let d = parse_datetime("2024-03-05T14:30:00", None).unwrap();
        assert_eq!(d.to_string(), "2024-03-05 14:30:00");
        let d = parse_datetime("03/05/2024", None).unwrap();
        assert_eq!(d.to_string(), "2024-03-05 00:00:00");
        assert!(parse_datetime("not a date", None).is_none());
    }

    #[test]
    fn test_parse_datetime_explicit_format() {
        let d = parse_datetime("05-03-2024", Some("%d-%m-%Y")).unwrap();
        assert_eq!(d.to_string(), "2024-03-05 00:00:00");
        assert!(parse_datetime("2024-03-05", Some("%d-%m-%Y")).is_none());
    }

    #[test]
    fn test_edge_rows() {
        assert_eq!(edge_rows(5, 2, true), vec![0, 1]);
        assert_eq!(edge_rows(5, 2, false), vec![3, 4]);
        assert_eq!(edge_rows(3, 10, true), vec![0, 1, 2]);
        assert_eq!(edge_rows(5, -2, true), vec![0, 1, 2]);
    }

    #[test]
    fn test_cast_rules() {
        let out = cast(&[text("3"), Scalar::Float(2.9)], "int64").unwrap();
        assert!(matches!(out[0], Scalar::Int(3)));
        assert!(matches!(out[1], Scalar::Int(2)));
        assert!(cast(&[Scalar::Null], "int").is_err());
        assert!(cast(&[text("x")], "float").is_err());
        let out = cast(&[Scalar::Null, Scalar::Int(1)], "str").unwrap();
        assert_eq!(out[0].display(), "nan");
        assert_eq!(out[1].display(), "1");
    }

    #[test]
    fn test_sample_is_seeded() {
        let mut args = Args::new(vec![Value::Int(3)]);
        args.kw.push(("random_state".into(), Value::Int(7)));
        let a = sample_rows(10, &args).unwrap();
        let b = sample_rows(10, &args).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        let too_many = Args::new(vec![Value::Int(11)]);
        assert!(sample_rows(10, &too_many).is_err());
    }
}
