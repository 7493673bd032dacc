//! Subscripts (`df[..]`, `.loc`, `.iloc`) and the `.str`, `.dt` and `.plot` accessors.

use std::collections::HashMap;
use std::rc::Rc;

use chrono::{Datelike, Timelike};

use super::super::error::{Eval, Fault};
use super::super::eval::{Interpreter, bound_method, no_attribute, seq_index, slice_indices};
use super::super::format::strftime;
use super::super::frame::{DataFrame, Dtype, Index, Scalar, Series};
use super::super::methods::str_method;
use super::super::plot;
use super::super::value::{Args, HashKey, Indexer, Shared, Value, str_repr};
use super::{frame_value, grouped, names_of, scalars_of, series_value, text};

enum Rows {
    One(usize),
    Many(Vec<usize>),
}

enum Cols {
    One(usize),
    Many(Vec<usize>),
}

fn is_mask(values: &[Scalar]) -> bool {
    !values.is_empty() && values.iter().all(|v| matches!(v, Scalar::Bool(_)))
}

fn mask_rows(mask: &[Scalar], n: usize) -> Eval<Vec<usize>> {
    if mask.len() != n {
        return Err(Fault::index_error(format!(
            "Boolean index has wrong length: {} instead of {}",
            mask.len(),
            n
        )));
    }
    Ok(mask
        .iter()
        .enumerate()
        .filter(|(_, v)| matches!(v, Scalar::Bool(true)))
        .map(|(i, _)| i)
        .collect())
}

fn label_position(index: &Index, label: &Scalar) -> Eval<usize> {
    index
        .position(label)
        .ok_or_else(|| Fault::key_error(label_repr(label)))
}

fn label_repr(label: &Scalar) -> String {
    match label {
        Scalar::Str(s) => str_repr(s),
        other => other.display(),
    }
}

fn iloc_rows(interp: &mut Interpreter, sel: &Value, n: usize) -> Eval<Rows> {
    match sel {
        Value::Int(_) => Ok(Rows::One(seq_index(sel, n, "iloc")?)),
        Value::Slice(a, b, c) => Ok(Rows::Many(slice_indices(n, *a, *b, *c)?)),
        Value::List(_) | Value::Tuple(_) | Value::Series(_) | Value::Range(..) => {
            let picks = scalars_of(interp, sel)?;
            if is_mask(&picks) {
                return Ok(Rows::Many(mask_rows(&picks, n)?));
            }
            picks
                .iter()
                .map(|p| seq_index(&p.to_value(), n, "iloc"))
                .collect::<Eval<Vec<_>>>()
                .map(Rows::Many)
        }
        other => Err(Fault::type_error(format!(
            "Cannot index by location index with a non-integer key of type '{}'",
            other.type_name()
        ))),
    }
}

fn loc_rows(interp: &mut Interpreter, index: &Index, sel: &Value) -> Eval<Rows> {
    let n = index.len();
    match sel {
        Value::Slice(a, b, None | Some(1)) => {
            let start = match a {
                Some(label) => label_position(index, &Scalar::Int(*label))?,
                None => 0,
            };
            let stop = match b {
                Some(label) => label_position(index, &Scalar::Int(*label))? + 1,
                None => n,
            };
            Ok(Rows::Many((start..stop.max(start)).collect()))
        }
        Value::Slice(..) => Err(Fault::type_error("label slices with a step are not supported")),
        Value::List(_) | Value::Series(_) | Value::Range(..) => {
            let picks = scalars_of(interp, sel)?;
            if is_mask(&picks) {
                return Ok(Rows::Many(mask_rows(&picks, n)?));
            }
            let missing: Vec<String> = picks
                .iter()
                .filter(|p| index.position(p).is_none())
                .map(label_repr)
                .collect();
            if !missing.is_empty() {
                return Err(Fault::key_error(format!("\"[{}] not in index\"", missing.join(", "))));
            }
            Ok(Rows::Many(picks.iter().filter_map(|p| index.position(p)).collect()))
        }
        label => Ok(Rows::One(label_position(index, &Scalar::from_value(label)?)?)),
    }
}

fn iloc_cols(interp: &mut Interpreter, frame: &DataFrame, sel: &Value) -> Eval<Cols> {
    let n = frame.columns.len();
    match sel {
        Value::Int(_) => Ok(Cols::One(seq_index(sel, n, "iloc")?)),
        Value::Slice(a, b, c) => Ok(Cols::Many(slice_indices(n, *a, *b, *c)?)),
        other => interp
            .iterate(other)?
            .iter()
            .map(|p| seq_index(p, n, "iloc"))
            .collect::<Eval<Vec<_>>>()
            .map(Cols::Many),
    }
}

fn loc_cols(interp: &mut Interpreter, frame: &DataFrame, sel: &Value) -> Eval<Cols> {
    let position =
        |name: &str| frame.position(name).ok_or_else(|| Fault::key_error(str_repr(name)));
    match sel {
        Value::Str(name) => Ok(Cols::One(position(name)?)),
        Value::Slice(None, None, None) => Ok(Cols::Many((0..frame.columns.len()).collect())),
        Value::Slice(..) => Err(Fault::type_error("column label slices are not supported")),
        other => names_of(interp, other)?
            .iter()
            .map(|n| position(n))
            .collect::<Eval<Vec<_>>>()
            .map(Cols::Many),
    }
}

fn pick(frame: &DataFrame, rows: Rows, cols: Option<Cols>) -> Value {
    match (rows, cols) {
        (Rows::One(r), None) => series_value(frame.row(r)),
        (Rows::Many(rs), None) => frame_value(frame.take(&rs)),
        (Rows::One(r), Some(Cols::One(c))) => frame.data[c][r].to_value(),
        (Rows::One(r), Some(Cols::Many(cs))) => {
            let names: Vec<String> = cs.iter().map(|&c| frame.columns[c].clone()).collect();
            series_value(Series::with_index(
                Some(frame.index.labels[r].display()),
                super::column_index(&names),
                cs.iter().map(|&c| frame.data[c][r].clone()).collect(),
            ))
        }
        (Rows::Many(rs), Some(Cols::One(c))) => series_value(Series::with_index(
            Some(frame.columns[c].clone()),
            frame.index.take(&rs),
            rs.iter().map(|&r| frame.data[c][r].clone()).collect(),
        )),
        (Rows::Many(rs), Some(Cols::Many(cs))) => frame_value(DataFrame {
            index: frame.index.take(&rs),
            columns: cs.iter().map(|&c| frame.columns[c].clone()).collect(),
            data: cs
                .iter()
                .map(|&c| rs.iter().map(|&r| frame.data[c][r].clone()).collect())
                .collect(),
        }),
    }
}

/// Splits `obj[rows, cols]` into its two selectors.
fn split_key(key: &Value) -> (&Value, Option<&Value>) {
    match key {
        Value::Tuple(items) if items.len() == 2 => (&items[0], Some(&items[1])),
        other => (other, None),
    }
}

pub fn get_item(interp: &mut Interpreter, obj: &Value, key: &Value) -> Eval<Value> {
    match obj {
        Value::Frame(f) => {
            let frame = f.borrow().clone();
            frame_item(interp, &frame, key)
        }
        Value::Series(s) => series_item(interp, s, key),
        Value::GroupBy(g) => match key {
            Value::Str(name) => grouped::select(g, vec![name.to_string()], true),
            other => {
                let names = names_of(interp, other)?;
                grouped::select(g, names, false)
            }
        },
        Value::Indexer(ix) => match &**ix {
            Indexer::ILoc(Value::Frame(f)) => {
                let frame = f.borrow().clone();
                let (row_key, col_key) = split_key(key);
                let rows = iloc_rows(interp, row_key, frame.len())?;
                let cols = col_key.map(|c| iloc_cols(interp, &frame, c)).transpose()?;
                Ok(pick(&frame, rows, cols))
            }
            Indexer::Loc(Value::Frame(f)) => {
                let frame = f.borrow().clone();
                let (row_key, col_key) = if frame.index.levels() > 1 {
                    (key, None)
                } else {
                    split_key(key)
                };
                let rows = loc_rows(interp, &frame.index, row_key)?;
                let cols = col_key.map(|c| loc_cols(interp, &frame, c)).transpose()?;
                Ok(pick(&frame, rows, cols))
            }
            Indexer::ILoc(Value::Series(s)) => match iloc_rows(interp, key, s.len())? {
                Rows::One(r) => Ok(s.values[r].to_value()),
                Rows::Many(rs) => Ok(series_value(s.take(&rs))),
            },
            Indexer::Loc(Value::Series(s)) => match loc_rows(interp, &s.index, key)? {
                Rows::One(r) => Ok(s.values[r].to_value()),
                Rows::Many(rs) => Ok(series_value(s.take(&rs))),
            },
            Indexer::Str(s) => str_subscript(s, key),
            _ => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                obj.type_name()
            ))),
        },
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn frame_item(interp: &mut Interpreter, frame: &DataFrame, key: &Value) -> Eval<Value> {
    match key {
        Value::Str(name) => Ok(series_value(frame.column(name)?)),
        Value::Slice(a, b, c) => {
            Ok(frame_value(frame.take(&slice_indices(frame.len(), *a, *b, *c)?)))
        }
        Value::Frame(mask) => {
            // `df[df > 0]` keeps cells where the mask holds.
            let mask = mask.borrow();
            let mut out = frame.clone();
            for (c, name) in frame.columns.iter().enumerate() {
                let Some(m) = mask.position(name) else { continue };
                for (r, cell) in out.data[c].iter_mut().enumerate() {
                    if !matches!(mask.data[m].get(r), Some(Scalar::Bool(true))) {
                        *cell = Scalar::Null;
                    }
                }
            }
            Ok(frame_value(out))
        }
        Value::List(_) | Value::Tuple(_) | Value::Series(_) => {
            let picks = scalars_of(interp, key)?;
            if is_mask(&picks) {
                return Ok(frame_value(frame.take(&mask_rows(&picks, frame.len())?)));
            }
            let names: Vec<String> = picks.iter().map(Scalar::display).collect();
            Ok(frame_value(frame.select(&names)?))
        }
        other => Err(Fault::key_error(other.repr())),
    }
}

fn series_item(interp: &mut Interpreter, s: &Series, key: &Value) -> Eval<Value> {
    match key {
        Value::Slice(a, b, c) => Ok(series_value(s.take(&slice_indices(s.len(), *a, *b, *c)?))),
        Value::List(_) | Value::Tuple(_) | Value::Series(_) | Value::Range(..) => {
            let picks = scalars_of(interp, key)?;
            if is_mask(&picks) {
                return Ok(series_value(s.take(&mask_rows(&picks, s.len())?)));
            }
            let rows = picks
                .iter()
                .map(|p| label_position(&s.index, p))
                .collect::<Eval<Vec<_>>>()?;
            Ok(series_value(s.take(&rows)))
        }
        label => {
            let label = Scalar::from_value(label)?;
            if let Some(p) = s.index.position(&label) {
                return Ok(s.values[p].to_value());
            }
            let integer_labels = s.index.labels.iter().all(|l| matches!(l, Scalar::Int(_)));
            match label {
                Scalar::Int(_) if !integer_labels || s.is_array => {
                    let r = seq_index(&label.to_value(), s.len(), "index")?;
                    Ok(s.values[r].to_value())
                }
                other => Err(Fault::key_error(label_repr(&other))),
            }
        }
    }
}

/// Cells for a new or replaced column, aligned to `index` when given a labelled series.
pub(super) fn column_values(
    interp: &mut Interpreter,
    value: &Value,
    index: &Index,
) -> Eval<Vec<Scalar>> {
    match value {
        Value::Series(s) => Ok(align_to(s, index)),
        Value::Frame(f) => {
            let f = f.borrow();
            if f.columns.len() != 1 {
                return Err(Fault::value_error(
                    "Cannot set a DataFrame with multiple columns to the single column",
                ));
            }
            Ok(align_to(&f.column(&f.columns[0])?, index))
        }
        Value::List(_) | Value::Tuple(_) | Value::Range(..) | Value::Set(_) => {
            scalars_of(interp, value)
        }
        scalar => Ok(vec![Scalar::from_value(scalar)?; index.len()]),
    }
}

fn align_to(s: &Series, index: &Index) -> Vec<Scalar> {
    let same = s.len() == index.len()
        && s.index.labels.iter().zip(&index.labels).all(|(a, b)| a.same(b));
    if s.is_array || same || index.is_empty() {
        return s.values.clone();
    }
    let mut slots: HashMap<HashKey, usize> = HashMap::new();
    for (p, label) in s.index.labels.iter().enumerate() {
        slots.entry(label.key()).or_insert(p);
    }
    index
        .labels
        .iter()
        .map(|l| slots.get(&l.key()).map(|&p| s.values[p].clone()).unwrap_or(Scalar::Null))
        .collect()
}

pub fn set_item(interp: &mut Interpreter, obj: &Value, key: &Value, value: Value) -> Eval<()> {
    match obj {
        Value::Frame(f) => match key {
            Value::Str(name) => {
                let index = f.borrow().index.clone();
                let cells = column_values(interp, &value, &index)?;
                f.borrow_mut().set_column(name, cells)
            }
            Value::List(_) | Value::Tuple(_) => {
                let names = names_of(interp, key)?;
                let index = f.borrow().index.clone();
                for (i, name) in names.iter().enumerate() {
                    let cells = match &value {
                        Value::Frame(source) => {
                            let source = source.borrow();
                            source
                                .data
                                .get(i)
                                .cloned()
                                .ok_or_else(|| {
                                    Fault::value_error("Columns must be same length as key")
                                })?
                        }
                        other => column_values(interp, other, &index)?,
                    };
                    f.borrow_mut().set_column(name, cells)?;
                }
                Ok(())
            }
            other => Err(Fault::type_error(format!(
                "cannot assign to a DataFrame with a key of type '{}'",
                other.type_name()
            ))),
        },
        Value::Indexer(ix) => match &**ix {
            Indexer::Loc(Value::Frame(f)) => assign_cells(interp, f, key, value, false),
            Indexer::ILoc(Value::Frame(f)) => assign_cells(interp, f, key, value, true),
            _ => Err(Fault::type_error(
                "Series values are read-only here; assign through the DataFrame instead",
            )),
        },
        Value::Series(_) => Err(Fault::type_error(
            "'Series' object does not support item assignment; assign the column on its DataFrame",
        )),
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `df.loc[rows, cols] = value` and the positional `.iloc` form.
fn assign_cells(
    interp: &mut Interpreter,
    cell: &Shared<DataFrame>,
    key: &Value,
    value: Value,
    positional: bool,
) -> Eval<()> {
    let frame = cell.borrow().clone();
    let (row_key, col_key) = split_key(key);
    let rows = match if positional {
        iloc_rows(interp, row_key, frame.len())?
    } else {
        loc_rows(interp, &frame.index, row_key)?
    } {
        Rows::One(r) => vec![r],
        Rows::Many(rs) => rs,
    };
    let names: Vec<String> = match col_key {
        None => frame.columns.clone(),
        Some(sel) if positional => match iloc_cols(interp, &frame, sel)? {
            Cols::One(c) => vec![frame.columns[c].clone()],
            Cols::Many(cs) => cs.iter().map(|&c| frame.columns[c].clone()).collect(),
        },
        // Label assignment may introduce a new column.
        Some(Value::Str(name)) => vec![name.to_string()],
        Some(sel) => names_of(interp, sel)?,
    };
    let cells: Vec<Scalar> = match &value {
        Value::Series(s) => {
            let labels = frame.index.take(&rows);
            align_to(s, &labels)
        }
        Value::List(_) | Value::Tuple(_) => scalars_of(interp, &value)?,
        scalar => vec![Scalar::from_value(scalar)?; rows.len()],
    };
    if cells.len() != rows.len() {
        return Err(Fault::value_error(format!(
            "Must have equal len keys and value when setting with an iterable ({} != {})",
            cells.len(),
            rows.len()
        )));
    }
    let mut target = cell.borrow_mut();
    for name in &names {
        let c = match target.position(name) {
            Some(c) => c,
            None => {
                let len = target.len();
                target.columns.push(name.clone());
                target.data.push(vec![Scalar::Null; len]);
                target.columns.len() - 1
            }
        };
        for (&r, v) in rows.iter().zip(&cells) {
            target.data[c][r] = v.clone();
        }
    }
    Ok(())
}

// Accessors.

const DT_FIELDS: &[&str] = &[
    "year", "month", "day", "hour", "minute", "second", "weekday", "dayofweek", "day_of_week",
    "quarter", "dayofyear", "day_of_year", "date",
];

pub(super) fn indexer_attr(obj: &Value, indexer: &Indexer, name: &str) -> Eval<Value> {
    match indexer {
        Indexer::Dt(s) if DT_FIELDS.contains(&name) => dt_field(s, name),
        Indexer::Dt(_) | Indexer::Str(_) | Indexer::Plot(_) => Ok(bound_method(obj, name)),
        _ => Err(no_attribute(obj, name)),
    }
}

fn dt_field(s: &Series, name: &str) -> Eval<Value> {
    let values = s
        .values
        .iter()
        .map(|v| match v {
            Scalar::DateTime(d) => Ok(match name {
                "year" => Scalar::Int(d.year() as i64),
                "month" => Scalar::Int(d.month() as i64),
                "day" => Scalar::Int(d.day() as i64),
                "hour" => Scalar::Int(d.hour() as i64),
                "minute" => Scalar::Int(d.minute() as i64),
                "second" => Scalar::Int(d.second() as i64),
                "quarter" => Scalar::Int(((d.month() - 1) / 3 + 1) as i64),
                "dayofyear" | "day_of_year" => Scalar::Int(d.ordinal() as i64),
                "date" => Scalar::DateTime(d.date().and_time(chrono::NaiveTime::MIN)),
                _ => Scalar::Int(d.weekday().num_days_from_monday() as i64),
            }),
            missing if missing.is_missing() => Ok(Scalar::Null),
            _ => Err(not_datetime()),
        })
        .collect::<Eval<Vec<_>>>()?;
    Ok(series_value(s.map_values(values)))
}

fn not_datetime() -> Fault {
    Fault::attribute_error("Can only use .dt accessor with datetimelike values")
}

pub(super) fn indexer_method(
    interp: &mut Interpreter,
    receiver: &Value,
    indexer: &Indexer,
    name: &str,
    args: Args,
) -> Eval<Value> {
    match indexer {
        Indexer::Str(s) => str_accessor(interp, s, name, args),
        Indexer::Dt(s) => dt_method(s, name, &args),
        Indexer::Plot(target) => plot::pandas_plot(interp, target, Some(name), args),
        _ => Err(no_attribute(receiver, name)),
    }
}

fn dt_method(s: &Series, name: &str, args: &Args) -> Eval<Value> {
    if s.dtype() != Dtype::DateTime && s.values.iter().any(|v| !v.is_missing()) {
        return Err(not_datetime());
    }
    let format: String = match name {
        "strftime" => {
            args.required(0, "date_format", "strftime")?.expect_str("date_format")?.to_string()
        }
        "day_name" => "%A".to_string(),
        "month_name" => "%B".to_string(),
        "to_period" => {
            let freq = args.opt(0, "freq").and_then(Value::as_str).unwrap_or("D");
            match freq.to_ascii_uppercase().as_str() {
                "M" | "ME" => "%Y-%m".to_string(),
                "Y" | "A" | "YE" => "%Y".to_string(),
                "D" => "%Y-%m-%d".to_string(),
                "Q" | "QE" => "quarter".to_string(),
                other => return Err(Fault::value_error(format!("Invalid frequency: {}", other))),
            }
        }
        "normalize" => {
            let values = s
                .values
                .iter()
                .map(|v| match v {
                    Scalar::DateTime(d) => {
                        Scalar::DateTime(d.date().and_time(chrono::NaiveTime::MIN))
                    }
                    other => other.clone(),
                })
                .collect();
            return Ok(series_value(s.map_values(values)));
        }
        _ => {
            return Err(Fault::attribute_error(format!(
                "'DatetimeProperties' object has no attribute '{}'",
                name
            )));
        }
    };
    let values = s
        .values
        .iter()
        .map(|v| match v {
            Scalar::DateTime(d) if format == "quarter" => {
                Ok(text(&format!("{}Q{}", d.year(), (d.month() - 1) / 3 + 1)))
            }
            Scalar::DateTime(d) => strftime(d, &format).map(|t| text(&t)),
            _ => Ok(Scalar::Null),
        })
        .collect::<Eval<Vec<_>>>()?;
    Ok(series_value(s.map_values(values)))
}

fn str_subscript(s: &Series, key: &Value) -> Eval<Value> {
    let values = s
        .values
        .iter()
        .map(|v| match (v, key) {
            (Scalar::Str(text_value), Value::Slice(a, b, c)) => {
                let chars: Vec<char> = text_value.chars().collect();
                let picked: String = slice_indices(chars.len(), *a, *b, *c)?
                    .iter()
                    .map(|&i| chars[i])
                    .collect();
                Ok(text(&picked))
            }
            (Scalar::Str(text_value), k) => {
                let chars: Vec<char> = text_value.chars().collect();
                Ok(match seq_index(k, chars.len(), "string") {
                    Ok(i) => text(&chars[i].to_string()),
                    Err(_) => Scalar::Null,
                })
            }
            (Scalar::Tuple(items), k) => Ok(match seq_index(k, items.len(), "list") {
                Ok(i) => items[i].clone(),
                Err(_) => Scalar::Null,
            }),
            _ => Ok(Scalar::Null),
        })
        .collect::<Eval<Vec<_>>>()?;
    Ok(series_value(s.map_values(values)))
}

/// Per-cell string method; list results are kept as tuple cells.
fn cell_of(value: Value) -> Eval<Scalar> {
    match value {
        Value::List(items) => Ok(Scalar::Tuple(
            items
                .borrow()
                .iter()
                .map(Scalar::from_value)
                .collect::<Eval<Vec<_>>>()?
                .into(),
        )),
        other => Scalar::from_value(&other),
    }
}

fn str_accessor(interp: &mut Interpreter, s: &Series, name: &str, args: Args) -> Eval<Value> {
    let only_text = |f: &mut dyn FnMut(&Rc<str>) -> Eval<Scalar>| -> Eval<Vec<Scalar>> {
        s.values
            .iter()
            .map(|v| match v {
                Scalar::Str(t) => f(t),
                _ => Ok(Scalar::Null),
            })
            .collect()
    };
    let values = match name {
        "len" => s
            .values
            .iter()
            .map(|v| match v {
                Scalar::Str(t) => Scalar::Int(t.chars().count() as i64),
                Scalar::Tuple(items) => Scalar::Int(items.len() as i64),
                _ => Scalar::Null,
            })
            .collect(),
        "contains" => {
            let pattern = args.required(0, "pat", "contains")?.expect_str("pat")?;
            let case = args.flag("case", true);
            let regex = args.flag("regex", true);
            let na = match args.kw("na") {
                Some(v) => Scalar::from_value(v)?,
                None => Scalar::Bool(false),
            };
            // Alternation is the only regex feature honoured.
            let needles: Vec<String> = if regex {
                pattern.split('|').map(str::to_string).collect()
            } else {
                vec![pattern.to_string()]
            };
            let fold = |t: &str| if case { t.to_string() } else { t.to_lowercase() };
            let needles: Vec<String> = needles.iter().map(|n| fold(n)).collect();
            s.values
                .iter()
                .map(|v| match v {
                    Scalar::Str(t) => {
                        let hay = fold(t);
                        Scalar::Bool(needles.iter().any(|n| hay.contains(n.as_str())))
                    }
                    _ => na.clone(),
                })
                .collect()
        }
        "get" => {
            let key = args.required(0, "i", "get")?.clone();
            return str_subscript(s, &key);
        }
        "slice" => {
            let bound = |i: usize, n: &str| -> Eval<Option<i64>> {
                args.opt(i, n).map(|v| v.expect_int(n)).transpose()
            };
            let key = Value::Slice(bound(0, "start")?, bound(1, "stop")?, bound(2, "step")?);
            return str_subscript(s, &key);
        }
        "cat" => {
            let sep = args.kw("sep").and_then(Value::as_str).unwrap_or("").to_string();
            let parts: Vec<String> =
                s.values.iter().filter(|v| !v.is_missing()).map(Scalar::display).collect();
            return Ok(Value::str(&parts.join(&sep)));
        }
        _ => {
            let mut call = |t: &Rc<str>| -> Eval<Scalar> {
                let cloned = Args {
                    pos: args.pos.clone(),
                    kw: args.kw.clone(),
                };
                cell_of(str_method(interp, t, name, cloned)?)
            };
            only_text(&mut call)?
        }
    };
    Ok(series_value(s.map_values(values)))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::super::super::value::shared;
    use super::*;

    fn interp() -> Interpreter {
        Interpreter::new(PathBuf::from("/tmp/datachat-index-test"), 100_000)
    }

    fn sample() -> Value {
        frame_value(
            DataFrame::from_columns(vec![
                ("name".into(), vec![text("ann"), text("bob"), text("cy")]),
                ("age".into(), vec![Scalar::Int(31), Scalar::Int(45), Scalar::Int(28)]),
            ])
            .unwrap(),
        )
    }

    fn loc(frame: &Value) -> Value {
        Value::Indexer(Rc::new(Indexer::Loc(frame.clone())))
    }

    fn iloc(frame: &Value) -> Value {
        Value::Indexer(Rc::new(Indexer::ILoc(frame.clone())))
    }

    #[test]
    fn test_boolean_mask_filters_rows() {
        let mut interp = interp();
        let df = sample();
        let mask = Value::list(vec![Value::Bool(true), Value::Bool(false), Value::Bool(true)]);
        match get_item(&mut interp, &df, &mask).unwrap() {
            Value::Frame(f) => {
                let f = f.borrow();
                assert_eq!(f.len(), 2);
                assert_eq!(f.index.labels[1].display(), "2");
            }
            other => panic!("expected frame, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_iloc_scalar_and_row() {
        let mut interp = interp();
        let df = sample();
        let key = Value::tuple(vec![Value::Int(-1), Value::Int(1)]);
        let cell = get_item(&mut interp, &iloc(&df), &key).unwrap();
        assert!(matches!(cell, Value::Int(28)));
        match get_item(&mut interp, &iloc(&df), &Value::Int(0)).unwrap() {
            Value::Series(row) => assert_eq!(row.values[0].display(), "ann"),
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_loc_label_slice_is_inclusive() {
        let mut interp = interp();
        let df = sample();
        let key = Value::tuple(vec![Value::Slice(Some(0), Some(1), None), Value::str("age")]);
        match get_item(&mut interp, &loc(&df), &key).unwrap() {
            Value::Series(s) => assert_eq!(s.len(), 2),
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_loc_assignment_creates_column() {
        let mut interp = interp();
        let df = sample();
        let mask = Value::list(vec![Value::Bool(false), Value::Bool(true), Value::Bool(false)]);
        let key = Value::tuple(vec![mask, Value::str("senior")]);
        set_item(&mut interp, &loc(&df), &key, Value::Bool(true)).unwrap();
        let Value::Frame(f) = &df else { unreachable!() };
        let f = f.borrow();
        let senior = &f.data[f.position("senior").unwrap()];
        assert!(senior[0].is_missing());
        assert!(matches!(senior[1], Scalar::Bool(true)));
    }

    #[test]
    fn test_column_assignment_aligns_labels() {
        let mut interp = interp();
        let column = vec![("a".into(), vec![Scalar::Int(1), Scalar::Int(2)])];
        let cell = shared(DataFrame::from_columns(column).unwrap());
        let df = Value::Frame(cell.clone());
        let reversed = series_value(Series::with_index(
            None,
            Index::named(None, vec![Scalar::Int(1), Scalar::Int(0)]),
            vec![Scalar::Int(20), Scalar::Int(10)],
        ));
        set_item(&mut interp, &df, &Value::str("b"), reversed).unwrap();
        let shown: Vec<String> = cell.borrow().data[1].iter().map(Scalar::display).collect();
        assert_eq!(shown, vec!["10", "20"]);
    }

    #[test]
    fn test_str_accessor() {
        let mut interp = interp();
        let s = Series::new(None, vec![text("Apple"), Scalar::Null, text("berry")]);
        let out = str_accessor(&mut interp, &s, "upper", Args::default()).unwrap();
        match out {
            Value::Series(s) => {
                assert_eq!(s.values[0].display(), "APPLE");
                assert!(s.values[1].is_missing());
            }
            other => panic!("expected series, got {}", other.type_name()),
        }
        let mut args = Args::new(vec![Value::str("app|err")]);
        args.kw.push(("case".into(), Value::Bool(false)));
        match str_accessor(&mut interp, &s, "contains", args).unwrap() {
            Value::Series(s) => {
                let shown: Vec<String> = s.values.iter().map(Scalar::display).collect();
                assert_eq!(shown, vec!["True", "False", "True"]);
            }
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_split_then_index() {
        let mut interp = interp();
        let s = Series::new(None, vec![text("a-b"), text("c-d")]);
        let parts =
            str_accessor(&mut interp, &s, "split", Args::new(vec![Value::str("-")])).unwrap();
        let Value::Series(parts) = parts else { panic!("expected series") };
        let firsts = str_subscript(&parts, &Value::Int(1)).unwrap();
        match firsts {
            Value::Series(s) => assert_eq!(s.values[1].display(), "d"),
            other => panic!("expected series, got {}", other.type_name()),
        }
    }
}
