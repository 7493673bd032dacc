//! `groupby` results: reductions, `agg`, `transform`, `apply` and iteration.

use std::rc::Rc;

use super::super::error::{Eval, Fault};
use super::super::eval::{Interpreter, bound_method, no_attribute};
use super::super::frame::{DataFrame, GroupBy, Reduce, Scalar, Series, reduce};
use super::super::value::{Args, Value, str_repr};
use super::series::reduction_of;
use super::{GROUPBY_METHODS, frame_value, int_arg, series_value};

pub(super) fn attr(obj: &Value, group: &Rc<GroupBy>, name: &str) -> Eval<Value> {
    if name == "ngroups" {
        return Ok(Value::Int(group.groups().len() as i64));
    }
    if GROUPBY_METHODS.contains(&name) {
        return Ok(bound_method(obj, name));
    }
    if group.frame.position(name).is_some() && !group.keys.iter().any(|k| k == name) {
        return select(group, vec![name.to_string()], true);
    }
    Err(no_attribute(obj, name))
}

/// `grouped['col']` or `grouped[['a', 'b']]`.
pub(super) fn select(group: &GroupBy, columns: Vec<String>, series: bool) -> Eval<Value> {
    if let Some(missing) = columns.iter().find(|c| group.frame.position(c).is_none()) {
        return Err(Fault::key_error(format!("Column not found: {}", missing)));
    }
    let mut out = group.clone();
    out.selection = Some(columns);
    out.series_result = series;
    Ok(Value::GroupBy(Rc::new(out)))
}

/// The rows of one group, shaped by the current selection.
fn members(group: &GroupBy, rows: &[usize]) -> Eval<Value> {
    let frame = group.frame.take(rows);
    match &group.selection {
        Some(cols) if group.series_result && cols.len() == 1 => {
            Ok(series_value(frame.column(&cols[0])?))
        }
        Some(cols) => Ok(frame_value(frame.select(cols)?)),
        None => Ok(frame_value(frame)),
    }
}

/// `for key, part in df.groupby(..)`.
pub(super) fn pairs(group: &GroupBy) -> Eval<Vec<Value>> {
    group
        .groups()
        .iter()
        .map(|(label, rows)| -> Eval<Value> {
            Ok(Value::tuple(vec![label.to_value(), members(group, rows)?]))
        })
        .collect()
}

fn finish(group: &GroupBy, out: DataFrame) -> Value {
    if group.series_result && group.as_index && out.columns.len() == 1 {
        let DataFrame {
            index,
            mut columns,
            mut data,
        } = out;
        let values = data.pop().unwrap_or_default();
        return series_value(Series::with_index(columns.pop(), index, values));
    }
    finish_frame(group, out)
}

fn finish_frame(group: &GroupBy, out: DataFrame) -> Value {
    if group.as_index {
        frame_value(out)
    } else {
        frame_value(out.reset_index(false))
    }
}

fn reduction(spec: &Value) -> Eval<Option<Reduce>> {
    match spec {
        Value::Str(_) => reduction_of(spec).map(Some),
        Value::Builtin(b) => Ok(Reduce::parse(b.name)),
        _ => Ok(None),
    }
}

pub(super) fn method(
    interp: &mut Interpreter,
    receiver: &Value,
    group: &Rc<GroupBy>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    if let Some(op) = Reduce::parse(name) {
        if op == Reduce::Size {
            let sizes = group.size();
            if group.as_index {
                return Ok(series_value(sizes));
            }
            let out = DataFrame {
                index: sizes.index,
                columns: vec!["size".to_string()],
                data: vec![sizes.values],
            };
            return Ok(frame_value(out.reset_index(false)));
        }
        return Ok(finish(group, group.aggregate(op)?));
    }
    match name {
        "agg" | "aggregate" => aggregate(interp, group, &args),
        "get_group" => {
            let key = Scalar::from_value(args.required(0, "name", "get_group")?)?;
            let groups = group.groups();
            let (_, rows) = groups
                .iter()
                .find(|(label, _)| label.same(&key))
                .ok_or_else(|| Fault::key_error(str_repr(&key.display())))?;
            members(group, rows)
        }
        "head" => {
            let n = int_arg(&args, 0, "n", 5)?.max(0) as usize;
            let mut rows: Vec<usize> = group
                .groups()
                .iter()
                .flat_map(|(_, rows)| rows.iter().take(n).copied())
                .collect();
            rows.sort_unstable();
            members(group, &rows)
        }
        "apply" => {
            let func = args.required(0, "func", "apply")?.clone();
            let groups = group.groups();
            let mut values = Vec::with_capacity(groups.len());
            for (_, rows) in &groups {
                let result = interp.call_value(&func, Args::new(vec![members(group, rows)?]))?;
                values.push(Scalar::from_value(&result).map_err(|_| {
                    Fault::type_error(
                        "groupby().apply() supports functions returning one scalar per group",
                    )
                })?);
            }
            let index = super::super::frame::Index {
                names: group.keys.iter().map(|k| Some(k.clone())).collect(),
                labels: groups.iter().map(|g| g.0.clone()).collect(),
            };
            Ok(series_value(Series::with_index(None, index, values)))
        }
        "transform" => transform(interp, group, &args),
        _ => Err(no_attribute(receiver, name)),
    }
}

fn aggregate(interp: &mut Interpreter, group: &GroupBy, args: &Args) -> Eval<Value> {
    if args.pos.is_empty() && !args.kw.is_empty() {
        // Named aggregation: `agg(total=('sales', 'sum'))`.
        let mut plan = Vec::with_capacity(args.kw.len());
        let mut names = Vec::with_capacity(args.kw.len());
        for (name, spec) in &args.kw {
            let (column, op) = match spec {
                Value::Tuple(pair) if pair.len() == 2 => {
                    (pair[0].to_str(), reduction_of(&pair[1])?)
                }
                single if group.series_result => {
                    let column = group.value_columns().into_iter().next().unwrap_or_default();
                    (column, reduction_of(single)?)
                }
                _ => {
                    return Err(Fault::type_error(
                        "Must provide 'func' or tuples of '(column, aggfunc)'.",
                    ));
                }
            };
            plan.push((column, op));
            names.push(name.clone());
        }
        let mut out = group.aggregate_plan(&plan, false)?;
        out.columns = names;
        return Ok(finish_frame(group, out));
    }
    let spec = args.required(0, "func", "agg")?;
    match spec {
        Value::List(_) | Value::Tuple(_) => {
            let ops = interp
                .iterate(spec)?
                .iter()
                .map(reduction_of)
                .collect::<Eval<Vec<_>>>()?;
            let mut plan = Vec::new();
            let mut names = Vec::new();
            for column in group.value_columns() {
                for op in &ops {
                    names.push(if group.series_result {
                        op.name().to_string()
                    } else {
                        format!("{}_{}", column, op.name())
                    });
                    plan.push((column.clone(), *op));
                }
            }
            let mut out = group.aggregate_plan(&plan, false)?;
            out.columns = names;
            Ok(finish_frame(group, out))
        }
        Value::Dict(per_column) => {
            let mut plan = Vec::new();
            let mut names = Vec::new();
            for (key, ops) in per_column.borrow().items() {
                let column = key.to_str();
                match &ops {
                    Value::List(_) | Value::Tuple(_) => {
                        for op in interp.iterate(&ops)? {
                            let op = reduction_of(&op)?;
                            names.push(format!("{}_{}", column, op.name()));
                            plan.push((column.clone(), op));
                        }
                    }
                    single => {
                        names.push(column.clone());
                        plan.push((column.clone(), reduction_of(single)?));
                    }
                }
            }
            let mut out = group.aggregate_plan(&plan, false)?;
            out.columns = names;
            Ok(finish_frame(group, out))
        }
        other => match reduction(other)? {
            Some(op) => Ok(finish(group, group.aggregate(op)?)),
            None => {
                // A callable applied to each group's column.
                let groups = group.groups();
                let mut out = group.aggregate_plan(&[], false)?;
                for column in group.value_columns() {
                    let pos = group
                        .frame
                        .position(&column)
                        .ok_or_else(|| Fault::key_error(str_repr(&column)))?;
                    let mut cells = Vec::with_capacity(groups.len());
                    for (_, rows) in &groups {
                        let part = Series::with_index(
                            Some(column.clone()),
                            group.frame.index.take(rows),
                            rows.iter().map(|&r| group.frame.data[pos][r].clone()).collect(),
                        );
                        let result = interp.call_value(other, Args::new(vec![series_value(part)]))?;
                        cells.push(Scalar::from_value(&result)?);
                    }
                    out.columns.push(column);
                    out.data.push(cells);
                }
                Ok(finish(group, out))
            }
        },
    }
}

/// Per-group results broadcast back onto the original rows.
fn transform(interp: &mut Interpreter, group: &GroupBy, args: &Args) -> Eval<Value> {
    let spec = args.required(0, "func", "transform")?.clone();
    let op = reduction(&spec)?;
    let groups = group.groups();
    let columns = group.value_columns();
    let n = group.frame.len();
    let mut data = Vec::with_capacity(columns.len());
    for column in &columns {
        let pos = group
            .frame
            .position(column)
            .ok_or_else(|| Fault::key_error(str_repr(column)))?;
        let source = &group.frame.data[pos];
        let mut cells = vec![Scalar::Null; n];
        for (_, rows) in &groups {
            let part: Vec<Scalar> = rows.iter().map(|&r| source[r].clone()).collect();
            let results = match op {
                Some(op) => vec![reduce(&part, op)?; rows.len()],
                None => {
                    let index = group.frame.index.take(rows);
                    let series = Series::with_index(Some(column.clone()), index, part);
                    match interp.call_value(&spec, Args::new(vec![series_value(series)]))? {
                        Value::Series(s) if s.len() == rows.len() => s.values.clone(),
                        Value::Series(_) => {
                            return Err(Fault::value_error(
                                "transform function must return a like-indexed result",
                            ));
                        }
                        scalar => vec![Scalar::from_value(&scalar)?; rows.len()],
                    }
                }
            };
            for (&r, value) in rows.iter().zip(results) {
                cells[r] = value;
            }
        }
        data.push(cells);
    }
    if group.series_result && data.len() == 1 {
        return Ok(series_value(Series::with_index(
            columns.first().cloned(),
            group.frame.index.clone(),
            data.pop().unwrap_or_default(),
        )));
    }
    Ok(frame_value(DataFrame {
        index: group.frame.index.clone(),
        columns,
        data,
    }))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::super::text;
    use super::*;

    fn grouped(series: bool) -> Rc<GroupBy> {
        let frame = DataFrame::from_columns(vec![
            ("team".into(), vec![text("b"), text("a"), text("b"), text("a")]),
            ("pts".into(), vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3), Scalar::Int(4)]),
            ("name".into(), vec![text("w"), text("x"), text("y"), text("z")]),
        ])
        .unwrap();
        let mut group = GroupBy::new(frame, vec!["team".into()]).unwrap();
        if series {
            group.selection = Some(vec!["pts".into()]);
            group.series_result = true;
        }
        Rc::new(group)
    }

    fn call(group: Rc<GroupBy>, name: &str, args: Args) -> Value {
        let receiver = Value::GroupBy(group.clone());
        let mut interp = Interpreter::new(PathBuf::from("/tmp/datachat-group-test"), 100_000);
        method(&mut interp, &receiver, &group, name, args).unwrap()
    }

    #[test]
    fn test_selected_sum_is_series() {
        match call(grouped(true), "sum", Args::default()) {
            Value::Series(s) => {
                assert_eq!(s.name.as_deref(), Some("pts"));
                assert_eq!(s.index.labels[0].display(), "a");
                assert!(matches!(s.values[0], Scalar::Int(6)));
            }
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_mean_skips_text_columns() {
        match call(grouped(false), "mean", Args::default()) {
            Value::Frame(f) => assert_eq!(f.borrow().columns, vec!["pts"]),
            other => panic!("expected frame, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_named_aggregation() {
        let args = Args {
            pos: Vec::new(),
            kw: vec![(
                "best".into(),
                Value::tuple(vec![Value::str("pts"), Value::str("max")]),
            )],
        };
        match call(grouped(false), "agg", args) {
            Value::Frame(f) => {
                let f = f.borrow();
                assert_eq!(f.columns, vec!["best"]);
                assert!(matches!(f.data[0][1], Scalar::Int(3)));
            }
            other => panic!("expected frame, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_transform_broadcasts() {
        match call(grouped(true), "transform", Args::new(vec![Value::str("sum")])) {
            Value::Series(s) => {
                let shown: Vec<String> = s.values.iter().map(Scalar::display).collect();
                assert_eq!(shown, vec!["4", "6", "4", "6"]);
            }
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_iteration_pairs() {
        let pairs = pairs(&grouped(false)).unwrap();
        assert_eq!(pairs.len(), 2);
        match &pairs[0] {
            Value::Tuple(items) => {
                assert_eq!(items[0].to_str(), "a");
                assert!(matches!(items[1], Value::Frame(_)));
            }
            other => panic!("expected tuple, got {}", other.type_name()),
        }
    }
}
