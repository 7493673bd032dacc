//! Series methods.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

use super::super::error::{Eval, Fault};
use super::super::eval::{Interpreter, no_attribute};
use super::super::frame::{
    DESCRIBE_LABELS, DataFrame, GroupBy, Index, Reduce, Scalar, Series, argsort, describe_numbers,
    describe_objects, is_numeric, numeric_values, pearson, quantile, reduce, unique, value_counts,
    variance,
};
use super::super::plot;
use super::super::value::{Args, Dict, HashKey, Value};
use super::{
    cast, dtype_name, edge_rows, frame_value, int_arg, round_scalar, s_to_frame, sample_rows,
    scalars_of, series_value, text, write_or_return,
};

pub(super) fn method(
    interp: &mut Interpreter,
    receiver: &Value,
    s: &Rc<Series>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    if let Some(op) = Reduce::parse(name)
        && op != Reduce::Size
    {
        return Ok(reduce_series(s, op, &args)?.to_value());
    }
    let keep = |values: Vec<Scalar>| series_value(s.map_values(values));
    let rows_where = |pred: &dyn Fn(&Scalar) -> bool| -> Vec<usize> {
        s.values
            .iter()
            .enumerate()
            .filter(|(_, v)| pred(v))
            .map(|(i, _)| i)
            .collect()
    };
    Ok(match name {
        "head" | "tail" => {
            let n = int_arg(&args, 0, "n", 5)?;
            series_value(s.take(&edge_rows(s.len(), n, name == "head")))
        }
        "describe" => series_value(describe_series(s)),
        "isnull" | "isna" => keep(s.values.iter().map(|v| Scalar::Bool(v.is_missing())).collect()),
        "notnull" | "notna" => {
            keep(s.values.iter().map(|v| Scalar::Bool(!v.is_missing())).collect())
        }
        "unique" => series_value(Series::array(unique(&s.values))),
        "value_counts" => series_value(value_counts(
            s,
            args.flag("normalize", false),
            args.flag("ascending", false),
        )),
        "sort_values" => series_value(s.take(&argsort(&s.values, args.flag("ascending", true)))),
        "sort_index" => {
            series_value(s.take(&argsort(&s.index.labels, args.flag("ascending", true))))
        }
        "dropna" => series_value(s.take(&rows_where(&|v| !v.is_missing()))),
        "fillna" => {
            let fill = Scalar::from_value(args.required(0, "value", "fillna")?)?;
            keep(
                s.values
                    .iter()
                    .map(|v| if v.is_missing() { fill.clone() } else { v.clone() })
                    .collect(),
            )
        }
        "round" => {
            let digits = int_arg(&args, 0, "decimals", 0)?;
            keep(s.values.iter().map(|v| round_scalar(v, digits)).collect())
        }
        "astype" => {
            let dtype = dtype_name(args.required(0, "dtype", "astype")?)?;
            keep(cast(&s.values, &dtype)?)
        }
        "tolist" | "to_list" => Value::list(s.values.iter().map(Scalar::to_value).collect()),
        "to_numpy" => series_value(Series::array(s.values.clone())),
        "copy" => series_value((**s).clone()),
        "apply" | "map" => {
            let func = args.required(0, "func", name)?.clone();
            keep(map_with(interp, &s.values, &func)?)
        }
        "isin" => {
            let wanted: HashSet<HashKey> = scalars_of(interp, args.required(0, "values", "isin")?)?
                .iter()
                .map(Scalar::key)
                .collect();
            keep(
                s.values
                    .iter()
                    .map(|v| Scalar::Bool(!v.is_missing() && wanted.contains(&v.key())))
                    .collect(),
            )
        }
        "between" => {
            let lo = Scalar::from_value(args.required(0, "left", "between")?)?;
            let hi = Scalar::from_value(args.required(1, "right", "between")?)?;
            let inclusive =
                args.kw("inclusive").and_then(Value::as_str).unwrap_or("both").to_string();
            let (lo_closed, hi_closed) = match inclusive.as_str() {
                "both" => (true, true),
                "neither" => (false, false),
                "left" => (true, false),
                "right" => (false, true),
                other => {
                    return Err(Fault::value_error(format!(
                        "Inclusive has to be either string of 'both', 'left', 'right', \
                         or 'neither', got {}",
                        other
                    )));
                }
            };
            keep(
                s.values
                    .iter()
                    .map(|v| {
                        if v.is_missing() {
                            return Scalar::Bool(false);
                        }
                        let above = match v.sort_cmp(&lo) {
                            Ordering::Greater => true,
                            Ordering::Equal => lo_closed,
                            Ordering::Less => false,
                        };
                        let below = match v.sort_cmp(&hi) {
                            Ordering::Less => true,
                            Ordering::Equal => hi_closed,
                            Ordering::Greater => false,
                        };
                        Scalar::Bool(above && below)
                    })
                    .collect(),
            )
        }
        "clip" => {
            let lower = args.opt(0, "lower").map(|v| v.expect_f64("lower")).transpose()?;
            let upper = args.opt(1, "upper").map(|v| v.expect_f64("upper")).transpose()?;
            let values = s
                .values
                .iter()
                .map(|v| {
                    let Some(mut f) = v.as_f64().filter(|_| !v.is_missing()) else {
                        return Ok(v.clone());
                    };
                    if let Some(lo) = lower {
                        f = f.max(lo);
                    }
                    if let Some(hi) = upper {
                        f = f.min(hi);
                    }
                    Ok(match v {
                        Scalar::Int(_) if f.fract() == 0.0 => Scalar::Int(f as i64),
                        _ => Scalar::Float(f),
                    })
                })
                .collect::<Eval<Vec<_>>>()?;
            keep(values)
        }
        "abs" => keep(
            s.values
                .iter()
                .map(|v| match v {
                    Scalar::Int(i) => Ok(Scalar::Int(i.saturating_abs())),
                    Scalar::Float(f) => Ok(Scalar::Float(f.abs())),
                    Scalar::Bool(b) => Ok(Scalar::Int(*b as i64)),
                    Scalar::Null => Ok(Scalar::Null),
                    other => Err(Fault::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.to_value().type_name()
                    ))),
                })
                .collect::<Eval<Vec<_>>>()?,
        ),
        "cumsum" => keep(cumulative_sum(&s.values)?),
        "diff" => {
            let periods = int_arg(&args, 0, "periods", 1)?;
            let shifted = shift(&s.values, periods);
            keep(
                s.values
                    .iter()
                    .zip(&shifted)
                    .map(|(v, prev)| numeric_step(v, prev, |a, b| a - b))
                    .collect(),
            )
        }
        "pct_change" => {
            let periods = int_arg(&args, 0, "periods", 1)?;
            let shifted = shift(&s.values, periods);
            keep(
                s.values
                    .iter()
                    .zip(&shifted)
                    .map(|(v, prev)| match numeric_step(v, prev, |a, b| a / b - 1.0) {
                        Scalar::Int(i) => Scalar::Float(i as f64),
                        other => other,
                    })
                    .collect(),
            )
        }
        "shift" => {
            let periods = int_arg(&args, 0, "periods", 1)?;
            keep(shift(&s.values, periods))
        }
        "corr" => match args.required(0, "other", "corr")? {
            Value::Series(other) => Value::Float(pearson(&s.values, &other.values)),
            other => {
                return Err(Fault::type_error(format!(
                    "corr() expects a Series, got '{}'",
                    other.type_name()
                )));
            }
        },
        "idxmax" | "idxmin" => {
            let best = extreme(&s.values, name == "idxmax").ok_or_else(|| {
                Fault::value_error(format!("attempt to get arg{} of an empty sequence", &name[3..]))
            })?;
            s.index.labels[best].to_value()
        }
        "nlargest" | "nsmallest" => {
            let n = int_arg(&args, 0, "n", 5)?.max(0) as usize;
            let order: Vec<usize> = argsort(&s.values, name == "nsmallest")
                .into_iter()
                .filter(|&i| !s.values[i].is_missing())
                .take(n)
                .collect();
            series_value(s.take(&order))
        }
        "quantile" => {
            let nums = numeric_values(&s.values);
            match args.opt(0, "q") {
                Some(q @ (Value::List(_) | Value::Tuple(_))) => {
                    let qs = interp.iterate(q)?;
                    let mut labels = Vec::with_capacity(qs.len());
                    let mut values = Vec::with_capacity(qs.len());
                    for q in qs {
                        let q = q.expect_f64("q")?;
                        labels.push(Scalar::Float(q));
                        values.push(Scalar::Float(quantile(&nums, q)));
                    }
                    let index = Index::named(None, labels);
                    series_value(Series::with_index(s.name.clone(), index, values))
                }
                Some(q) => Value::Float(quantile(&nums, q.expect_f64("q")?)),
                None => Value::Float(quantile(&nums, 0.5)),
            }
        }
        "mode" => series_value(Series::new(s.name.clone(), modes(s))),
        "any" => Value::Bool(s.values.iter().any(|v| !v.is_missing() && v.to_value().truthy())),
        "all" => Value::Bool(s.values.iter().all(|v| v.is_missing() || v.to_value().truthy())),
        "item" => {
            if s.len() != 1 {
                return Err(Fault::value_error(
                    "can only convert an array of size 1 to a Python scalar",
                ));
            }
            s.values[0].to_value()
        }
        "to_frame" => frame_value(s_to_frame(s, args.opt(0, "name").map(Value::to_str))),
        "reset_index" => {
            if args.flag("drop", false) {
                series_value(Series::new(s.name.clone(), s.values.clone()))
            } else {
                let name = args
                    .kw("name")
                    .map(Value::to_str)
                    .or_else(|| s.name.clone())
                    .unwrap_or_else(|| "0".to_string());
                let mut columns = s.index.level_columns();
                columns.push((name, s.values.clone()));
                frame_value(DataFrame::from_columns(columns)?)
            }
        }
        "rename" => match args.opt(0, "index") {
            Some(Value::Dict(mapping)) => {
                let mapping = mapping.borrow();
                let labels = s
                    .index
                    .labels
                    .iter()
                    .map(|l| match mapping.get(&l.to_value())? {
                        Some(v) => Scalar::from_value(&v),
                        None => Ok(l.clone()),
                    })
                    .collect::<Eval<Vec<_>>>()?;
                let mut out = (**s).clone();
                out.index.labels = labels;
                series_value(out)
            }
            Some(other) => {
                let mut out = (**s).clone();
                out.name = Some(other.to_str());
                series_value(out)
            }
            None => series_value((**s).clone()),
        },
        "to_dict" => {
            let mut dict = Dict::new();
            for (label, value) in s.index.labels.iter().zip(&s.values) {
                dict.insert(label.to_value(), value.to_value())?;
            }
            Value::dict(dict)
        }
        "replace" => {
            let from = args.required(0, "to_replace", "replace")?;
            let mapping: Vec<(Scalar, Scalar)> = match from {
                Value::Dict(d) => d
                    .borrow()
                    .items()
                    .iter()
                    .map(|(k, v)| Ok((Scalar::from_value(k)?, Scalar::from_value(v)?)))
                    .collect::<Eval<Vec<_>>>()?,
                Value::List(_) | Value::Tuple(_) => {
                    let to = Scalar::from_value(args.required(1, "value", "replace")?)?;
                    scalars_of(interp, from)?.into_iter().map(|k| (k, to.clone())).collect()
                }
                single => vec![(
                    Scalar::from_value(single)?,
                    Scalar::from_value(args.required(1, "value", "replace")?)?,
                )],
            };
            keep(replace_values(&s.values, &mapping))
        }
        "agg" | "aggregate" => {
            let spec = args.required(0, "func", name)?;
            match spec {
                Value::List(_) | Value::Tuple(_) => {
                    let mut labels = Vec::new();
                    let mut values = Vec::new();
                    for op in interp.iterate(spec)? {
                        let op = reduction_of(&op)?;
                        labels.push(text(op.name()));
                        values.push(reduce_series(s, op, &Args::default())?);
                    }
                    let index = Index::named(None, labels);
                    series_value(Series::with_index(s.name.clone(), index, values))
                }
                single => reduce_series(s, reduction_of(single)?, &Args::default())?.to_value(),
            }
        }
        "to_json" => write_or_return(interp, args.opt(0, "path_or_buf"), s.to_json().to_string())?,
        "to_csv" => {
            let csv = s_to_frame(s, None).to_csv(args.flag("index", true));
            write_or_return(interp, args.opt(0, "path_or_buf"), csv)?
        }
        "plot" => plot::pandas_plot(interp, receiver, None, args)?,
        "hist" => plot::pandas_plot(interp, receiver, Some("hist"), args)?,
        "sample" => series_value(s.take(&sample_rows(s.len(), &args)?)),
        "groupby" => {
            // `s.groupby(keys)` groups the series by a parallel key sequence.
            let keys = scalars_of(interp, args.required(0, "by", "groupby")?)?;
            if keys.len() != s.len() {
                return Err(Fault::value_error("Grouper and axis must be same length"));
            }
            let value_name = s.name.clone().unwrap_or_else(|| "0".to_string());
            let key_name = if value_name == "key" { "key_".to_string() } else { "key".to_string() };
            let frame = DataFrame::from_columns(vec![
                (key_name.clone(), keys),
                (value_name.clone(), s.values.clone()),
            ])?;
            let mut group = GroupBy::new(frame, vec![key_name])?;
            group.selection = Some(vec![value_name]);
            group.series_result = true;
            Value::GroupBy(Rc::new(group))
        }
        _ => return Err(no_attribute(receiver, name)),
    })
}

/// Reduction honoring `ddof`; numpy arrays default to the population variance.
pub(super) fn reduce_series(s: &Series, op: Reduce, args: &Args) -> Eval<Scalar> {
    if matches!(op, Reduce::Std | Reduce::Var) {
        let default = if s.is_array { 0 } else { 1 };
        let ddof = match args.kw("ddof") {
            Some(v) => v.expect_int("ddof")?.max(0) as usize,
            None => default,
        };
        if !is_numeric(&s.values) && s.values.iter().any(|v| !v.is_missing()) {
            return reduce(&s.values, op);
        }
        let var = variance(&numeric_values(&s.values), ddof);
        return Ok(Scalar::Float(if op == Reduce::Std { var.sqrt() } else { var }));
    }
    reduce(&s.values, op)
}

/// A reduction named by a string or a numpy function such as `np.mean`.
pub(super) fn reduction_of(value: &Value) -> Eval<Reduce> {
    let name = match value {
        Value::Str(s) => s.to_string(),
        Value::Builtin(b) => b.name.to_string(),
        other => {
            return Err(Fault::type_error(format!(
                "'{}' is not a valid aggregation",
                other.to_str()
            )));
        }
    };
    Reduce::parse(&name).ok_or_else(|| {
        Fault::attribute_error(format!("'{}' is not a valid function for aggregation", name))
    })
}

pub(super) fn describe_series(s: &Series) -> Series {
    if is_numeric(&s.values) {
        return Series::with_index(
            s.name.clone(),
            Index::named(None, DESCRIBE_LABELS.iter().map(|l| text(l)).collect()),
            describe_numbers(&s.values),
        );
    }
    let (labels, values) = describe_objects(&s.values);
    Series::with_index(
        s.name.clone(),
        Index::named(None, labels.iter().map(|l| text(l)).collect()),
        values,
    )
}

/// Maps every cell through a dict, a series lookup, or a callable.
pub(super) fn map_with(
    interp: &mut Interpreter,
    values: &[Scalar],
    func: &Value,
) -> Eval<Vec<Scalar>> {
    match func {
        Value::Dict(mapping) => {
            let mapping = mapping.borrow();
            values
                .iter()
                .map(|v| match mapping.get(&v.to_value())? {
                    Some(hit) => Scalar::from_value(&hit),
                    None => Ok(Scalar::Null),
                })
                .collect()
        }
        Value::Series(lookup) => Ok(values
            .iter()
            .map(|v| {
                lookup
                    .index
                    .position(v)
                    .map(|p| lookup.values[p].clone())
                    .unwrap_or(Scalar::Null)
            })
            .collect()),
        callable => values
            .iter()
            .map(|v| {
                let out = interp.call_value(callable, Args::new(vec![v.to_value()]))?;
                Scalar::from_value(&out)
            })
            .collect(),
    }
}

pub(super) fn replace_values(values: &[Scalar], mapping: &[(Scalar, Scalar)]) -> Vec<Scalar> {
    values
        .iter()
        .map(|v| {
            mapping
                .iter()
                .find(|(from, _)| from.same(v))
                .map(|(_, to)| to.clone())
                .unwrap_or_else(|| v.clone())
        })
        .collect()
}

fn shift(values: &[Scalar], periods: i64) -> Vec<Scalar> {
    let n = values.len() as i64;
    (0..n)
        .map(|i| {
            let src = i - periods;
            if src < 0 || src >= n { Scalar::Null } else { values[src as usize].clone() }
        })
        .collect()
}

fn numeric_step(current: &Scalar, previous: &Scalar, f: impl Fn(f64, f64) -> f64) -> Scalar {
    if current.is_missing() || previous.is_missing() {
        return Scalar::Null;
    }
    match (current.as_f64(), previous.as_f64()) {
        (Some(a), Some(b)) => Scalar::Float(f(a, b)),
        _ => Scalar::Null,
    }
}

pub(super) fn cumulative_sum(values: &[Scalar]) -> Eval<Vec<Scalar>> {
    let ints = values.iter().all(|v| matches!(v, Scalar::Int(_) | Scalar::Bool(_)));
    let mut total = 0.0;
    let mut int_total: i64 = 0;
    values
        .iter()
        .map(|v| {
            if v.is_missing() {
                return Ok(Scalar::Null);
            }
            let f = match v {
                Scalar::Str(_) | Scalar::DateTime(_) | Scalar::Tuple(_) => {
                    return Err(Fault::type_error("cumsum requires numeric values"));
                }
                other => other.as_f64().unwrap_or(f64::NAN),
            };
            if ints {
                int_total = int_total.wrapping_add(f as i64);
                Ok(Scalar::Int(int_total))
            } else {
                total += f;
                Ok(Scalar::Float(total))
            }
        })
        .collect()
}

/// Position of the largest (or smallest) non-missing cell, first on ties.
pub(super) fn extreme(values: &[Scalar], largest: bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_missing() {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(b) => {
                let ord = v.sort_cmp(&values[b]);
                let better = if largest { ord.is_gt() } else { ord.is_lt() };
                Some(if better { i } else { b })
            }
        };
    }
    best
}

fn modes(s: &Series) -> Vec<Scalar> {
    let counts = value_counts(s, false, false);
    let Some(top) = counts.values.first().and_then(Scalar::as_f64) else {
        return Vec::new();
    };
    let mut winners: Vec<Scalar> = counts
        .index
        .labels
        .iter()
        .zip(&counts.values)
        .filter(|(_, c)| c.as_f64() == Some(top))
        .map(|(l, _)| l.clone())
        .collect();
    winners.sort_by(|a, b| a.sort_cmp(b));
    winners
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn interp() -> Interpreter {
        Interpreter::new(PathBuf::from("/tmp/datachat-series-test"), 100_000)
    }

    fn call(s: Series, name: &str, args: Args) -> Value {
        let receiver = series_value(s);
        let Value::Series(rc) = &receiver else { unreachable!() };
        let rc = rc.clone();
        method(&mut interp(), &receiver, &rc, name, args).unwrap()
    }

    fn ints(values: &[i64]) -> Series {
        Series::new(Some("n".into()), values.iter().map(|&i| Scalar::Int(i)).collect())
    }

    fn shown(v: &Value) -> Vec<String> {
        match v {
            Value::Series(s) => s.values.iter().map(Scalar::display).collect(),
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_reductions() {
        assert!(matches!(call(ints(&[1, 2, 3]), "sum", Args::default()), Value::Int(6)));
        let mean = call(ints(&[1, 2, 3]), "mean", Args::default());
        assert!(matches!(mean, Value::Float(f) if f == 2.0));
        let std = call(ints(&[1, 2, 3, 4]), "std", Args::default());
        assert!(matches!(std, Value::Float(f) if (f - 1.2909944).abs() < 1e-6));
    }

    #[test]
    fn test_array_std_is_population() {
        let arr = Series::array((1..=4).map(Scalar::Int).collect());
        let std = call(arr, "std", Args::default());
        assert!(matches!(std, Value::Float(f) if (f - 1.1180339).abs() < 1e-6));
    }

    #[test]
    fn test_cumsum_diff_shift() {
        assert_eq!(shown(&call(ints(&[1, 2, 3]), "cumsum", Args::default())), vec!["1", "3", "6"]);
        let diff = call(ints(&[1, 4, 9]), "diff", Args::default());
        assert_eq!(shown(&diff), vec!["NaN", "3.0", "5.0"]);
        assert_eq!(shown(&call(ints(&[1, 2, 3]), "shift", Args::default())), vec!["NaN", "1", "2"]);
    }

    #[test]
    fn test_idxmax_returns_label() {
        let s = Series::with_index(
            None,
            Index::named(None, vec![text("a"), text("b"), text("c")]),
            vec![Scalar::Int(3), Scalar::Int(9), Scalar::Int(1)],
        );
        assert_eq!(call(s, "idxmax", Args::default()).to_str(), "b");
    }

    #[test]
    fn test_between_and_isin() {
        let mut args = Args::new(vec![Value::Int(2), Value::Int(3)]);
        let between = call(ints(&[1, 2, 3, 4]), "between", args);
        assert_eq!(shown(&between), vec!["False", "True", "True", "False"]);
        args = Args::new(vec![Value::list(vec![Value::Int(4), Value::Int(1)])]);
        assert_eq!(shown(&call(ints(&[1, 2, 4]), "isin", args)), vec!["True", "False", "True"]);
    }

    #[test]
    fn test_map_with_dict() {
        let mut mapping = Dict::new();
        mapping.insert(Value::Int(1), Value::str("one")).unwrap();
        let args = Args::new(vec![Value::dict(mapping)]);
        assert_eq!(shown(&call(ints(&[1, 2]), "map", args)), vec!["one", "NaN"]);
    }

    #[test]
    fn test_mode_and_nlargest() {
        assert_eq!(shown(&call(ints(&[3, 1, 3, 1, 2]), "mode", Args::default())), vec!["1", "3"]);
        let args = Args::new(vec![Value::Int(2)]);
        assert_eq!(shown(&call(ints(&[5, 9, 1, 7]), "nlargest", args)), vec!["9", "7"]);
    }

    #[test]
    fn test_agg_list() {
        let args = Args::new(vec![Value::list(vec![Value::str("min"), Value::str("max")])]);
        let out = call(ints(&[4, 2, 8]), "agg", args);
        match out {
            Value::Series(s) => {
                assert_eq!(s.index.labels[0].display(), "min");
                assert_eq!(shown(&series_value((*s).clone())), vec!["2", "8"]);
            }
            other => panic!("expected series, got {}", other.type_name()),
        }
    }
}
