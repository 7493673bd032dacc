//! DataFrame methods.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::super::error::{Eval, Fault};
use super::super::eval::{Interpreter, no_attribute};
use super::super::frame::{
    DataFrame, Dtype, GroupBy, Index, Reduce, Scalar, Series, argsort, describe_frame, is_numeric,
    numeric_values, pearson, quantile, reduce, value_counts,
};
use super::super::plot;
use super::super::value::{Args, Dict, HashKey, Shared, Value, str_repr};
use super::indexing::column_values;
use super::series::{cumulative_sum, extreme, reduce_series, reduction_of};
use super::{
    cast, column_index, dtype_name, edge_rows, frame_value, int_arg, map_frame, names_of,
    round_scalar, sample_rows, series_value, text, write_or_return,
};

pub(super) fn method(
    interp: &mut Interpreter,
    receiver: &Value,
    cell: &Shared<DataFrame>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    let frame = cell.borrow().clone();
    if let Some(op) = Reduce::parse(name)
        && op != Reduce::Size
    {
        return reduce_frame(&frame, op, &args);
    }
    let result = match name {
        "head" | "tail" => {
            let n = int_arg(&args, 0, "n", 5)?;
            frame.take(&edge_rows(frame.len(), n, name == "head"))
        }
        "describe" => describe_frame(&frame)?,
        "info" => {
            interp.write(&frame.info());
            interp.write("\n");
            return Ok(Value::None);
        }
        "isnull" | "isna" => map_frame(&frame, |v| Scalar::Bool(v.is_missing())),
        "notnull" | "notna" => map_frame(&frame, |v| Scalar::Bool(!v.is_missing())),
        "sort_values" => sort_frame(interp, &frame, &args)?,
        "sort_index" => frame.take(&argsort(&frame.index.labels, args.flag("ascending", true))),
        "dropna" => drop_missing(interp, &frame, &args)?,
        "fillna" => fill_missing(&frame, &args)?,
        "corr" => correlation(&frame),
        "nlargest" | "nsmallest" => {
            let n = int_arg(&args, 0, "n", 5)?.max(0) as usize;
            let by = names_of(interp, args.required(1, "columns", name)?)?;
            let columns = positions(&frame, &by)?;
            let ascending = vec![name == "nsmallest"; columns.len()];
            let rows: Vec<usize> = order_rows(&frame, &columns, &ascending)
                .into_iter()
                .filter(|&r| !frame.data[columns[0]][r].is_missing())
                .take(n)
                .collect();
            frame.take(&rows)
        }
        "copy" => frame,
        "round" => round_frame(&frame, &args)?,
        "astype" => astype_frame(&frame, &args)?,
        "reset_index" => frame.reset_index(args.flag("drop", false)),
        "set_index" => set_index(interp, &frame, &args)?,
        "rename" => rename_frame(interp, &frame, &args)?,
        "drop" => drop_labels(interp, &frame, &args)?,
        "drop_duplicates" => {
            let kept = kept_rows(interp, &frame, &args)?;
            let rows: Vec<usize> = (0..frame.len()).filter(|r| kept[*r]).collect();
            frame.take(&rows)
        }
        "select_dtypes" => select_dtypes(interp, &frame, &args)?,
        "sample" => frame.take(&sample_rows(frame.len(), &args)?),
        "assign" => assign(interp, frame, &args)?,
        "pivot_table" => pivot_table(interp, &frame, &args)?,
        "abs" => abs_frame(&frame)?,
        "cumsum" => {
            let mut out = frame.clone();
            for c in frame.numeric_columns() {
                out.data[c] = cumulative_sum(&frame.data[c])?;
            }
            out
        }
        "groupby" => return group_by(interp, frame, &args),
        "apply" => return apply(interp, &frame, &args),
        "iterrows" => {
            return Ok(Value::list(
                (0..frame.len())
                    .map(|r| {
                        let label = frame.index.labels[r].to_value();
                        Value::tuple(vec![label, series_value(frame.row(r))])
                    })
                    .collect(),
            ));
        }
        "items" => {
            return Ok(Value::list(
                frame
                    .columns
                    .iter()
                    .map(|c| -> Eval<Value> {
                        Ok(Value::tuple(vec![Value::str(c), series_value(frame.column(c)?)]))
                    })
                    .collect::<Eval<Vec<_>>>()?,
            ));
        }
        "to_dict" => return to_dict(&frame, &args),
        "to_csv" => {
            let csv = frame.to_csv(args.flag("index", true));
            return write_or_return(interp, args.opt(0, "path_or_buf"), csv);
        }
        "to_json" => {
            let orient = args.kw("orient").and_then(Value::as_str).unwrap_or("columns");
            let json = frame.to_json(orient)?;
            let rendered = match args.kw("indent") {
                Some(v) if !v.is_none() => serde_json::to_string_pretty(&json)
                    .map_err(|e| Fault::value_error(e.to_string()))?,
                _ => json.to_string(),
            };
            return write_or_return(interp, args.opt(0, "path_or_buf"), rendered);
        }
        "to_html" => return write_or_return(interp, args.opt(0, "buf"), frame.to_html()),
        "duplicated" => {
            let kept = kept_rows(interp, &frame, &args)?;
            return Ok(series_value(Series::with_index(
                None,
                frame.index.clone(),
                kept.iter().map(|k| Scalar::Bool(!k)).collect(),
            )));
        }
        "agg" | "aggregate" => return aggregate(interp, &frame, &args),
        "quantile" => return quantile_frame(interp, &frame, &args),
        "idxmax" | "idxmin" => {
            let numeric = frame.numeric_columns();
            let labels = numeric
                .iter()
                .map(|&c| {
                    extreme(&frame.data[c], name == "idxmax")
                        .map(|r| frame.index.labels[r].clone())
                        .unwrap_or(Scalar::Null)
                })
                .collect();
            let names: Vec<String> = numeric.iter().map(|&c| frame.columns[c].clone()).collect();
            return Ok(series_value(Series::with_index(None, column_index(&names), labels)));
        }
        "any" | "all" => {
            let values = frame
                .data
                .iter()
                .map(|col| {
                    let truthy = |v: &Scalar| !v.is_missing() && v.to_value().truthy();
                    Scalar::Bool(if name == "any" {
                        col.iter().any(truthy)
                    } else {
                        col.iter().all(|v| v.is_missing() || truthy(v))
                    })
                })
                .collect();
            return Ok(series_value(Series::with_index(None, column_index(&frame.columns), values)));
        }
        "value_counts" => {
            let all: Vec<usize> = (0..frame.columns.len()).collect();
            let rows: Vec<Scalar> = (0..frame.len()).map(|r| row_tuple(&frame, &all, r)).collect();
            let mut counts = value_counts(
                &Series::new(None, rows),
                args.flag("normalize", false),
                args.flag("ascending", false),
            );
            counts.index.names = frame.columns.iter().map(|c| Some(c.clone())).collect();
            return Ok(series_value(counts));
        }
        "plot" => return plot::pandas_plot(interp, receiver, None, args),
        "hist" => return plot::pandas_plot(interp, receiver, Some("hist"), args),
        _ => return Err(no_attribute(receiver, name)),
    };
    if args.flag("inplace", false) {
        *cell.borrow_mut() = result;
        return Ok(Value::None);
    }
    Ok(frame_value(result))
}

fn axis_of(args: &Args) -> Eval<i64> {
    match args.kw("axis") {
        None => Ok(0),
        Some(Value::Str(s)) => match &**s {
            "index" | "rows" => Ok(0),
            "columns" => Ok(1),
            other => Err(Fault::value_error(format!(
                "No axis named {} for object type DataFrame",
                other
            ))),
        },
        Some(v) => v.expect_int("axis"),
    }
}

/// The cells of row `r` in `columns`, as one tuple scalar.
fn row_tuple(frame: &DataFrame, columns: &[usize], r: usize) -> Scalar {
    Scalar::Tuple(columns.iter().map(|&c| frame.data[c][r].clone()).collect::<Vec<_>>().into())
}

fn positions(frame: &DataFrame, names: &[String]) -> Eval<Vec<usize>> {
    names
        .iter()
        .map(|n| frame.position(n).ok_or_else(|| Fault::key_error(str_repr(n))))
        .collect()
}

fn reduce_frame(frame: &DataFrame, op: Reduce, args: &Args) -> Eval<Value> {
    if axis_of(args)? == 1 {
        let columns = frame.numeric_columns();
        let values = (0..frame.len())
            .map(|r| {
                let cells = columns.iter().map(|&c| frame.data[c][r].clone()).collect();
                let row = Series::new(None, cells);
                reduce_series(&row, op, args)
            })
            .collect::<Eval<Vec<_>>>()?;
        return Ok(series_value(Series::with_index(None, frame.index.clone(), values)));
    }
    let numeric_only = args.flag("numeric_only", false);
    let mut names = Vec::new();
    let mut values = Vec::new();
    for (name, column) in frame.columns.iter().zip(&frame.data) {
        if numeric_only && !is_numeric(column) {
            continue;
        }
        values.push(reduce_series(&Series::new(None, column.clone()), op, args)?);
        names.push(name.clone());
    }
    Ok(series_value(Series::with_index(None, column_index(&names), values)))
}

/// Stable multi-key row order; missing cells sort last in either direction.
pub(super) fn order_rows(frame: &DataFrame, columns: &[usize], ascending: &[bool]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..frame.len()).collect();
    order.sort_by(|&a, &b| {
        for (&c, &asc) in columns.iter().zip(ascending) {
            let (x, y) = (&frame.data[c][a], &frame.data[c][b]);
            let ord = if x.is_missing() || y.is_missing() || asc {
                x.sort_cmp(y)
            } else {
                y.sort_cmp(x)
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    order
}

fn sort_frame(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let by = names_of(interp, args.required(0, "by", "sort_values")?)?;
    let ascending: Vec<bool> = match args.get(1, "ascending") {
        Some(v @ (Value::List(_) | Value::Tuple(_))) => {
            interp.iterate(v)?.iter().map(Value::truthy).collect()
        }
        Some(v) => vec![v.truthy(); by.len()],
        None => vec![true; by.len()],
    };
    if ascending.len() != by.len() {
        return Err(Fault::value_error(format!(
            "Length of ascending ({}) != length of by ({})",
            ascending.len(),
            by.len()
        )));
    }
    let columns = positions(frame, &by)?;
    Ok(frame.take(&order_rows(frame, &columns, &ascending)))
}

fn drop_missing(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let how_all = args.kw("how").and_then(Value::as_str) == Some("all");
    let missing_ok =
        |missing: usize, total: usize| if how_all { missing < total } else { missing == 0 };
    if axis_of(args)? == 1 {
        let keep: Vec<String> = frame
            .columns
            .iter()
            .zip(&frame.data)
            .filter(|(_, col)| {
                missing_ok(col.iter().filter(|v| v.is_missing()).count(), col.len().max(1))
            })
            .map(|(n, _)| n.clone())
            .collect();
        return frame.select(&keep);
    }
    let columns = match args.kw("subset").filter(|v| !v.is_none()) {
        Some(subset) => positions(frame, &names_of(interp, subset)?)?,
        None => (0..frame.columns.len()).collect(),
    };
    let rows: Vec<usize> = (0..frame.len())
        .filter(|&r| {
            let missing = columns.iter().filter(|&&c| frame.data[c][r].is_missing()).count();
            missing_ok(missing, columns.len())
        })
        .collect();
    Ok(frame.take(&rows))
}

fn fill_missing(frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let mut out = frame.clone();
    let fill_column = |column: &mut Vec<Scalar>, with: &Scalar| {
        for cell in column.iter_mut() {
            if cell.is_missing() {
                *cell = with.clone();
            }
        }
    };
    match args.required(0, "value", "fillna")? {
        Value::Dict(mapping) => {
            for (key, value) in mapping.borrow().items() {
                if let Some(c) = out.position(&key.to_str()) {
                    fill_column(&mut out.data[c], &Scalar::from_value(&value)?);
                }
            }
        }
        Value::Series(per_column) => {
            for (label, value) in per_column.index.labels.iter().zip(&per_column.values) {
                if let Some(c) = out.position(&label.display()) {
                    fill_column(&mut out.data[c], value);
                }
            }
        }
        value => {
            let with = Scalar::from_value(value)?;
            for column in out.data.iter_mut() {
                fill_column(column, &with);
            }
        }
    }
    Ok(out)
}

fn correlation(frame: &DataFrame) -> DataFrame {
    let numeric = frame.numeric_columns();
    let names: Vec<String> = numeric.iter().map(|&c| frame.columns[c].clone()).collect();
    let data = numeric
        .iter()
        .map(|&a| {
            numeric
                .iter()
                .map(|&b| {
                    Scalar::Float(if a == b {
                        1.0
                    } else {
                        pearson(&frame.data[a], &frame.data[b])
                    })
                })
                .collect()
        })
        .collect();
    DataFrame {
        index: column_index(&names),
        columns: names,
        data,
    }
}

fn round_frame(frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let mut out = frame.clone();
    match args.opt(0, "decimals") {
        Some(Value::Dict(per_column)) => {
            for (key, digits) in per_column.borrow().items() {
                if let Some(c) = out.position(&key.to_str()) {
                    let digits = digits.expect_int("decimals")?;
                    out.data[c] = frame.data[c].iter().map(|v| round_scalar(v, digits)).collect();
                }
            }
        }
        other => {
            let digits = other.map(|v| v.expect_int("decimals")).transpose()?.unwrap_or(0);
            out = map_frame(frame, |v| round_scalar(v, digits));
        }
    }
    Ok(out)
}

fn astype_frame(frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let mut out = frame.clone();
    match args.required(0, "dtype", "astype")? {
        Value::Dict(per_column) => {
            for (key, dtype) in per_column.borrow().items() {
                let name = key.to_str();
                let c = out.position(&name).ok_or_else(|| {
                    Fault::key_error(format!(
                        "Only a column name can be used for the key in a dtype mappings \
                         argument. '{}' not found in columns.",
                        name
                    ))
                })?;
                out.data[c] = cast(&frame.data[c], &dtype_name(&dtype)?)?;
            }
        }
        dtype => {
            let dtype = dtype_name(dtype)?;
            for (c, column) in frame.data.iter().enumerate() {
                out.data[c] = cast(column, &dtype)?;
            }
        }
    }
    Ok(out)
}

fn set_index(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let keys = names_of(interp, args.required(0, "keys", "set_index")?)?;
    let columns = positions(frame, &keys)?;
    let labels: Vec<Scalar> = if columns.len() == 1 {
        frame.data[columns[0]].clone()
    } else {
        (0..frame.len()).map(|r| row_tuple(frame, &columns, r)).collect()
    };
    let mut out = if args.flag("drop", true) {
        let rest: Vec<String> =
            frame.columns.iter().filter(|c| !keys.contains(c)).cloned().collect();
        frame.select(&rest)?
    } else {
        frame.clone()
    };
    out.index = Index {
        names: keys.into_iter().map(Some).collect(),
        labels,
    };
    Ok(out)
}

fn rename_frame(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let mut out = frame.clone();
    if let Some(mapper) = args.kw("columns").or_else(|| args.opt(0, "mapper")) {
        out.columns = match mapper {
            Value::Dict(mapping) => {
                let mapping = mapping.borrow();
                frame
                    .columns
                    .iter()
                    .map(|c| mapping.get_str(c).map(|v| v.to_str()).unwrap_or_else(|| c.clone()))
                    .collect()
            }
            callable => frame
                .columns
                .iter()
                .map(|c| Ok(interp.call_value(callable, Args::new(vec![Value::str(c)]))?.to_str()))
                .collect::<Eval<Vec<_>>>()?,
        };
    }
    if let Some(Value::Dict(mapping)) = args.kw("index") {
        let mapping = mapping.borrow();
        for label in out.index.labels.iter_mut() {
            if let Some(to) = mapping.get(&label.to_value())? {
                *label = Scalar::from_value(&to)?;
            }
        }
    }
    Ok(out)
}

fn drop_labels(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let ignore = args.kw("errors").and_then(Value::as_str) == Some("ignore");
    let (columns, rows) = match (args.kw("columns"), args.kw("index"), args.opt(0, "labels")) {
        (Some(c), _, _) => (Some(c), None),
        (None, Some(i), _) => (None, Some(i)),
        (None, None, Some(labels)) if axis_of(args)? == 1 => (Some(labels), None),
        (None, None, Some(labels)) => (None, Some(labels)),
        (None, None, None) => {
            return Err(Fault::type_error(
                "Need to specify at least one of 'labels', 'index' or 'columns'",
            ));
        }
    };
    let mut out = frame.clone();
    if let Some(columns) = columns {
        let names = names_of(interp, columns)?;
        let missing: Vec<&String> = names.iter().filter(|n| frame.position(n).is_none()).collect();
        if !missing.is_empty() && !ignore {
            let listed: Vec<String> = missing.iter().map(|n| str_repr(n)).collect();
            return Err(Fault::key_error(format!("\"[{}] not found in axis\"", listed.join(", "))));
        }
        let keep: Vec<String> =
            frame.columns.iter().filter(|c| !names.contains(c)).cloned().collect();
        out = out.select(&keep)?;
    }
    if let Some(rows) = rows {
        let labels = match rows {
            v @ (Value::List(_) | Value::Tuple(_) | Value::Series(_) | Value::Range(..)) => {
                super::scalars_of(interp, v)?
            }
            single => vec![Scalar::from_value(single)?],
        };
        let drop: HashSet<HashKey> = labels.iter().map(Scalar::key).collect();
        let found = labels.iter().all(|l| out.index.position(l).is_some());
        if !found && !ignore {
            return Err(Fault::key_error("labels not found in axis"));
        }
        let keep: Vec<usize> = (0..out.len())
            .filter(|&r| !drop.contains(&out.index.labels[r].key()))
            .collect();
        out = out.take(&keep);
    }
    Ok(out)
}

/// Which rows survive `drop_duplicates(subset, keep)`.
fn kept_rows(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<Vec<bool>> {
    let columns = match args.opt(0, "subset") {
        Some(subset) => positions(frame, &names_of(interp, subset)?)?,
        None => (0..frame.columns.len()).collect(),
    };
    let key =
        |r: usize| -> Vec<HashKey> { columns.iter().map(|&c| frame.data[c][r].key()).collect() };
    let mut kept = vec![false; frame.len()];
    match args.kw("keep") {
        Some(Value::Bool(false)) => {
            let mut counts: HashMap<Vec<HashKey>, usize> = HashMap::new();
            for r in 0..frame.len() {
                *counts.entry(key(r)).or_default() += 1;
            }
            for (r, slot) in kept.iter_mut().enumerate() {
                *slot = counts.get(&key(r)) == Some(&1);
            }
        }
        Some(Value::Str(s)) if &**s == "last" => {
            let mut seen: HashSet<Vec<HashKey>> = HashSet::new();
            for r in (0..frame.len()).rev() {
                kept[r] = seen.insert(key(r));
            }
        }
        _ => {
            let mut seen: HashSet<Vec<HashKey>> = HashSet::new();
            for (r, slot) in kept.iter_mut().enumerate() {
                *slot = seen.insert(key(r));
            }
        }
    }
    Ok(kept)
}

fn dtype_matches(dtype: Dtype, want: &str) -> bool {
    match want {
        "number" | "numeric" => dtype.is_numeric(),
        "int" | "int64" | "integer" => dtype == Dtype::Int64,
        "float" | "float64" => dtype == Dtype::Float64,
        "bool" => dtype == Dtype::Bool,
        "object" | "str" | "string" | "category" => dtype == Dtype::Object,
        w if w.starts_with("datetime") => dtype == Dtype::DateTime,
        _ => false,
    }
}

fn select_dtypes(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let mut kinds = |value: Option<&Value>| -> Eval<Option<Vec<String>>> {
        let Some(value) = value.filter(|v| !v.is_none()) else {
            return Ok(None);
        };
        let items = match value {
            Value::List(_) | Value::Tuple(_) => interp.iterate(value)?,
            single => vec![single.clone()],
        };
        items.iter().map(dtype_name).collect::<Eval<Vec<_>>>().map(Some)
    };
    let include = kinds(args.opt(0, "include"))?;
    let exclude = kinds(args.opt(1, "exclude"))?;
    if include.is_none() && exclude.is_none() {
        return Err(Fault::value_error("at least one of include or exclude must be nonempty"));
    }
    let dtypes = frame.dtypes();
    let keep: Vec<String> = frame
        .columns
        .iter()
        .zip(dtypes)
        .filter(|(_, dtype)| {
            include.as_ref().is_none_or(|inc| inc.iter().any(|w| dtype_matches(*dtype, w)))
                && exclude.as_ref().is_none_or(|exc| !exc.iter().any(|w| dtype_matches(*dtype, w)))
        })
        .map(|(n, _)| n.clone())
        .collect();
    frame.select(&keep)
}

fn assign(interp: &mut Interpreter, mut frame: DataFrame, args: &Args) -> Eval<DataFrame> {
    for (name, value) in &args.kw {
        let value = match value {
            Value::Function(_) | Value::Builtin(_) | Value::Method(_) => {
                interp.call_value(value, Args::new(vec![frame_value(frame.clone())]))?
            }
            other => other.clone(),
        };
        let cells = column_values(interp, &value, &frame.index)?;
        frame.set_column(name, cells)?;
    }
    Ok(frame)
}

fn abs_frame(frame: &DataFrame) -> Eval<DataFrame> {
    let mut out = frame.clone();
    for (c, column) in frame.data.iter().enumerate() {
        out.data[c] = column
            .iter()
            .map(|v| match v {
                Scalar::Int(i) => Ok(Scalar::Int(i.saturating_abs())),
                Scalar::Float(f) => Ok(Scalar::Float(f.abs())),
                Scalar::Null | Scalar::Bool(_) => Ok(v.clone()),
                other => Err(Fault::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.to_value().type_name()
                ))),
            })
            .collect::<Eval<Vec<_>>>()?;
    }
    Ok(out)
}

/// `pivot_table(values, index, columns, aggfunc)` with flattened column labels.
fn pivot_table(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<DataFrame> {
    let index = names_of(interp, args.required(1, "index", "pivot_table")?)?;
    let across = match args.opt(2, "columns") {
        Some(c) => names_of(interp, c)?.into_iter().next(),
        None => None,
    };
    let op = match args.opt(3, "aggfunc") {
        Some(f) => reduction_of(f)?,
        None => Reduce::Mean,
    };
    let values: Vec<String> = match args.opt(0, "values") {
        Some(v) => names_of(interp, v)?,
        None => frame
            .numeric_columns()
            .into_iter()
            .map(|c| frame.columns[c].clone())
            .filter(|c| !index.contains(c) && across.as_ref() != Some(c))
            .collect(),
    };
    let grouped = GroupBy::new(frame.clone(), index.clone())?;
    let Some(across) = across else {
        let plan: Vec<(String, Reduce)> = values.into_iter().map(|v| (v, op)).collect();
        return grouped.aggregate_plan(&plan, false);
    };
    let pivot = frame
        .position(&across)
        .ok_or_else(|| Fault::key_error(str_repr(&across)))?;
    let mut headings: Vec<Scalar> = super::super::frame::unique(&frame.data[pivot])
        .into_iter()
        .filter(|v| !v.is_missing())
        .collect();
    headings.sort_by(|a, b| a.sort_cmp(b));
    let groups = grouped.groups();
    let mut out = DataFrame {
        index: Index {
            names: index.iter().map(|k| Some(k.clone())).collect(),
            labels: groups.iter().map(|g| g.0.clone()).collect(),
        },
        columns: Vec::new(),
        data: Vec::new(),
    };
    for value in &values {
        let source = frame
            .position(value)
            .ok_or_else(|| Fault::key_error(str_repr(value)))?;
        for heading in &headings {
            let mut cells = Vec::with_capacity(groups.len());
            for (_, rows) in &groups {
                let members: Vec<Scalar> = rows
                    .iter()
                    .filter(|&&r| frame.data[pivot][r].same(heading))
                    .map(|&r| frame.data[source][r].clone())
                    .collect();
                cells.push(if members.is_empty() { Scalar::Null } else { reduce(&members, op)? });
            }
            out.columns.push(if values.len() == 1 {
                heading.display()
            } else {
                format!("{}_{}", value, heading.display())
            });
            out.data.push(cells);
        }
    }
    Ok(out)
}

fn group_by(interp: &mut Interpreter, mut frame: DataFrame, args: &Args) -> Eval<Value> {
    let by = args.required(0, "by", "groupby")?;
    let items = match by {
        Value::List(_) | Value::Tuple(_) => interp.iterate(by)?,
        single => vec![single.clone()],
    };
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Series(s) => {
                // An external key sequence becomes a key column.
                let name = s.name.clone().unwrap_or_else(|| format!("key_{}", keys.len()));
                let cells = column_values(interp, &Value::Series(s), &frame.index)?;
                frame.set_column(&name, cells)?;
                keys.push(name);
            }
            other => keys.push(other.to_str()),
        }
    }
    let mut grouped = GroupBy::new(frame, keys)?;
    grouped.as_index = args.flag("as_index", true);
    Ok(Value::GroupBy(Rc::new(grouped)))
}

fn apply(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<Value> {
    let func = args.required(0, "func", "apply")?.clone();
    if axis_of(args)? == 1 {
        let mut values = Vec::with_capacity(frame.len());
        for r in 0..frame.len() {
            let out = interp.call_value(&func, Args::new(vec![series_value(frame.row(r))]))?;
            values.push(Scalar::from_value(&out)?);
        }
        return Ok(series_value(Series::with_index(None, frame.index.clone(), values)));
    }
    let mut results = Vec::with_capacity(frame.columns.len());
    for name in &frame.columns {
        results.push(interp.call_value(&func, Args::new(vec![series_value(frame.column(name)?)]))?);
    }
    if results.iter().all(|r| matches!(r, Value::Series(_))) && !results.is_empty() {
        let mut out = frame.clone();
        for (c, result) in results.iter().enumerate() {
            if let Value::Series(s) = result {
                if s.len() != frame.len() {
                    return Err(Fault::value_error("apply() results must keep the column length"));
                }
                out.data[c] = s.values.clone();
            }
        }
        return Ok(frame_value(out));
    }
    let values = results.iter().map(Scalar::from_value).collect::<Eval<Vec<_>>>()?;
    Ok(series_value(Series::with_index(None, column_index(&frame.columns), values)))
}

fn to_dict(frame: &DataFrame, args: &Args) -> Eval<Value> {
    let orient = args.opt(0, "orient").and_then(Value::as_str).unwrap_or("dict");
    let row_dict = |r: usize| -> Eval<Value> {
        let mut row = Dict::new();
        for (c, name) in frame.columns.iter().enumerate() {
            row.insert(Value::str(name), frame.data[c][r].to_value())?;
        }
        Ok(Value::dict(row))
    };
    match orient {
        "records" => Ok(Value::list((0..frame.len()).map(row_dict).collect::<Eval<Vec<_>>>()?)),
        "index" => {
            let mut out = Dict::new();
            for r in 0..frame.len() {
                out.insert(frame.index.labels[r].to_value(), row_dict(r)?)?;
            }
            Ok(Value::dict(out))
        }
        "list" => {
            let mut out = Dict::new();
            for (c, name) in frame.columns.iter().enumerate() {
                out.insert(
                    Value::str(name),
                    Value::list(frame.data[c].iter().map(Scalar::to_value).collect()),
                )?;
            }
            Ok(Value::dict(out))
        }
        "dict" => {
            let mut out = Dict::new();
            for (c, name) in frame.columns.iter().enumerate() {
                let mut inner = Dict::new();
                for (label, value) in frame.index.labels.iter().zip(&frame.data[c]) {
                    inner.insert(label.to_value(), value.to_value())?;
                }
                out.insert(Value::str(name), Value::dict(inner))?;
            }
            Ok(Value::dict(out))
        }
        other => Err(Fault::value_error(format!("orient '{}' not understood", other))),
    }
}

fn aggregate(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<Value> {
    let spec = args.required(0, "func", "agg")?;
    let column_series = |c: usize| Series::new(None, frame.data[c].clone());
    match spec {
        Value::List(_) | Value::Tuple(_) => {
            let ops = interp
                .iterate(spec)?
                .iter()
                .map(reduction_of)
                .collect::<Eval<Vec<_>>>()?;
            let mut out = DataFrame {
                index: Index::named(None, ops.iter().map(|op| text(op.name())).collect()),
                columns: frame.columns.clone(),
                data: Vec::with_capacity(frame.columns.len()),
            };
            for c in 0..frame.columns.len() {
                let series = column_series(c);
                out.data.push(
                    ops.iter()
                        .map(|op| reduce_series(&series, *op, &Args::default()))
                        .collect::<Eval<Vec<_>>>()?,
                );
            }
            Ok(frame_value(out))
        }
        Value::Dict(per_column) => {
            let mut plan: Vec<(usize, Vec<Reduce>)> = Vec::new();
            let mut single = true;
            for (key, ops) in per_column.borrow().items() {
                let name = key.to_str();
                let c = frame.position(&name).ok_or_else(|| {
                    Fault::key_error(format!("Column(s) ['{}'] do not exist", name))
                })?;
                let ops = match &ops {
                    Value::List(_) | Value::Tuple(_) => {
                        single = false;
                        interp.iterate(&ops)?.iter().map(reduction_of).collect::<Eval<Vec<_>>>()?
                    }
                    one => vec![reduction_of(one)?],
                };
                plan.push((c, ops));
            }
            if single {
                let mut names = Vec::new();
                let mut values = Vec::new();
                for (c, ops) in &plan {
                    names.push(frame.columns[*c].clone());
                    values.push(reduce_series(&column_series(*c), ops[0], &Args::default())?);
                }
                return Ok(series_value(Series::with_index(None, column_index(&names), values)));
            }
            let mut row_ops: Vec<Reduce> = Vec::new();
            for (_, ops) in &plan {
                for op in ops {
                    if !row_ops.contains(op) {
                        row_ops.push(*op);
                    }
                }
            }
            let mut out = DataFrame {
                index: Index::named(None, row_ops.iter().map(|op| text(op.name())).collect()),
                columns: Vec::new(),
                data: Vec::new(),
            };
            for (c, ops) in &plan {
                let series = column_series(*c);
                let mut cells = Vec::with_capacity(row_ops.len());
                for op in &row_ops {
                    cells.push(if ops.contains(op) {
                        reduce_series(&series, *op, &Args::default())?
                    } else {
                        Scalar::Null
                    });
                }
                out.columns.push(frame.columns[*c].clone());
                out.data.push(cells);
            }
            Ok(frame_value(out))
        }
        single => reduce_frame(frame, reduction_of(single)?, &Args::default()),
    }
}

fn quantile_frame(interp: &mut Interpreter, frame: &DataFrame, args: &Args) -> Eval<Value> {
    let numeric = frame.numeric_columns();
    let names: Vec<String> = numeric.iter().map(|&c| frame.columns[c].clone()).collect();
    let nums: Vec<Vec<f64>> = numeric.iter().map(|&c| numeric_values(&frame.data[c])).collect();
    match args.opt(0, "q") {
        Some(q @ (Value::List(_) | Value::Tuple(_))) => {
            let qs = interp
                .iterate(q)?
                .iter()
                .map(|q| q.expect_f64("q"))
                .collect::<Eval<Vec<_>>>()?;
            let data = nums
                .iter()
                .map(|n| qs.iter().map(|&q| Scalar::Float(quantile(n, q))).collect())
                .collect();
            Ok(frame_value(DataFrame {
                index: Index::named(None, qs.iter().map(|&q| Scalar::Float(q)).collect()),
                columns: names,
                data,
            }))
        }
        q => {
            let q = q.map(|v| v.expect_f64("q")).transpose()?.unwrap_or(0.5);
            let values = nums.iter().map(|n| Scalar::Float(quantile(n, q))).collect();
            Ok(series_value(Series::with_index(
                Some(super::super::value::float_repr(q)),
                column_index(&names),
                values,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::super::super::value::shared;
    use super::*;

    fn sample() -> DataFrame {
        DataFrame::from_columns(vec![
            ("region".into(), vec![text("west"), text("east"), text("west"), text("east")]),
            ("units".into(), vec![Scalar::Int(3), Scalar::Int(1), Scalar::Int(4), Scalar::Null]),
            ("price".into(), [2.5, 1.0, 3.0, 4.0].into_iter().map(Scalar::Float).collect()),
        ])
        .unwrap()
    }

    fn call(frame: DataFrame, name: &str, args: Args) -> Value {
        let cell = shared(frame);
        let receiver = Value::Frame(cell.clone());
        let mut interp = Interpreter::new(PathBuf::from("/tmp/datachat-table-test"), 100_000);
        method(&mut interp, &receiver, &cell, name, args).unwrap()
    }

    fn kw(pairs: Vec<(&str, Value)>) -> Args {
        Args {
            pos: Vec::new(),
            kw: pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn frame_of(v: Value) -> DataFrame {
        match v {
            Value::Frame(f) => f.borrow().clone(),
            other => panic!("expected frame, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_sort_values_multi_key() {
        let args = Args {
            pos: vec![Value::list(vec![Value::str("region"), Value::str("price")])],
            kw: vec![(
                "ascending".into(),
                Value::list(vec![Value::Bool(true), Value::Bool(false)]),
            )],
        };
        let out = frame_of(call(sample(), "sort_values", args));
        let prices: Vec<String> = out.data[2].iter().map(Scalar::display).collect();
        assert_eq!(prices, vec!["4.0", "1.0", "3.0", "2.5"]);
    }

    #[test]
    fn test_dropna_subset() {
        let subset = |name: &str| kw(vec![("subset", Value::list(vec![Value::str(name)]))]);
        let out = frame_of(call(sample(), "dropna", subset("units")));
        assert_eq!(out.len(), 3);
        let out = frame_of(call(sample(), "dropna", subset("price")));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_inplace_rewrites_cell() {
        let cell = shared(sample());
        let receiver = Value::Frame(cell.clone());
        let mut interp = Interpreter::new(PathBuf::from("/tmp/datachat-table-test"), 100_000);
        let args = Args {
            pos: vec![Value::Int(0)],
            kw: vec![("inplace".into(), Value::Bool(true))],
        };
        let out = method(&mut interp, &receiver, &cell, "fillna", args).unwrap();
        assert!(out.is_none());
        assert!(matches!(cell.borrow().data[1][3], Scalar::Int(0)));
    }

    #[test]
    fn test_numeric_only_reduction() {
        let out = call(sample(), "mean", kw(vec![("numeric_only", Value::Bool(true))]));
        match out {
            Value::Series(s) => {
                assert_eq!(s.index.labels.len(), 2);
                assert!(matches!(s.values[0], Scalar::Float(f) if (f - 8.0 / 3.0).abs() < 1e-12));
            }
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_pivot_table_spreads_columns() {
        let frame = DataFrame::from_columns(vec![
            ("region".into(), vec![text("w"), text("e"), text("w")]),
            ("kind".into(), vec![text("a"), text("a"), text("b")]),
            ("units".into(), vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]),
        ])
        .unwrap();
        let out = frame_of(call(
            frame,
            "pivot_table",
            kw(vec![
                ("values", Value::str("units")),
                ("index", Value::str("region")),
                ("columns", Value::str("kind")),
                ("aggfunc", Value::str("sum")),
            ]),
        ));
        assert_eq!(out.columns, vec!["a", "b"]);
        assert_eq!(out.index.labels[0].display(), "e");
        assert!(matches!(out.data[0][0], Scalar::Int(2)));
        assert!(out.data[1][0].is_missing());
    }

    #[test]
    fn test_drop_duplicates_keep_last() {
        let frame = DataFrame::from_columns(vec![
            ("k".into(), vec![text("x"), text("y"), text("x")]),
            ("v".into(), vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]),
        ])
        .unwrap();
        let args = Args {
            pos: vec![Value::list(vec![Value::str("k")])],
            kw: vec![("keep".into(), Value::str("last"))],
        };
        let out = frame_of(call(frame, "drop_duplicates", args));
        let values: Vec<String> = out.data[1].iter().map(Scalar::display).collect();
        assert_eq!(values, vec!["2", "3"]);
    }

    #[test]
    fn test_select_dtypes_number() {
        let args = kw(vec![("include", Value::str("number"))]);
        let out = frame_of(call(sample(), "select_dtypes", args));
        assert_eq!(out.columns, vec!["units", "price"]);
    }

    #[test]
    fn test_to_dict_records() {
        let out = call(sample(), "to_dict", Args::new(vec![Value::str("records")]));
        match out {
            Value::List(rows) => {
                assert_eq!(rows.borrow().len(), 4);
                assert_eq!(rows.borrow()[0].repr(), "{'region': 'west', 'units': 3, 'price': 2.5}");
            }
            other => panic!("expected list, got {}", other.type_name()),
        }
    }
}
