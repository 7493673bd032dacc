//! The slice of numpy analysis snippets reach for. Arrays are
//! [`Series`] values flagged `is_array`, so pandas arithmetic applies to them.
//!
//! Reductions skip missing values, i.e. `np.mean` behaves like `np.nanmean`.

use std::cmp::Ordering;

use super::super::builtins::round_float;
use super::super::error::{Eval, Fault};
use super::super::eval::Interpreter;
use super::super::frame::{
    DataFrame, Reduce, Scalar, Series, numeric_values, quantile, reduce, unique, variance,
};
use super::super::pandas::{frame_value, scalars_of, series_value};
use super::super::plot::histogram as bin_edges;
use super::super::value::{Args, Builtin, Value};
use super::module_of;

const MAX_ARRAY_LEN: usize = 10_000_000;

static FUNCTIONS: &[Builtin] = &[
    Builtin { name: "array", func: array },
    Builtin { name: "asarray", func: array },
    Builtin { name: "mean", func: mean },
    Builtin { name: "nanmean", func: mean },
    Builtin { name: "average", func: average },
    Builtin { name: "median", func: median },
    Builtin { name: "nanmedian", func: median },
    Builtin { name: "std", func: std },
    Builtin { name: "nanstd", func: std },
    Builtin { name: "var", func: var },
    Builtin { name: "nanvar", func: var },
    Builtin { name: "sum", func: sum },
    Builtin { name: "nansum", func: sum },
    Builtin { name: "prod", func: prod },
    Builtin { name: "min", func: min },
    Builtin { name: "nanmin", func: min },
    Builtin { name: "amin", func: min },
    Builtin { name: "max", func: max },
    Builtin { name: "nanmax", func: max },
    Builtin { name: "amax", func: max },
    Builtin { name: "percentile", func: percentile },
    Builtin { name: "quantile", func: np_quantile },
    Builtin { name: "sqrt", func: sqrt },
    Builtin { name: "log", func: log },
    Builtin { name: "log10", func: log10 },
    Builtin { name: "log2", func: log2 },
    Builtin { name: "log1p", func: log1p },
    Builtin { name: "exp", func: exp },
    Builtin { name: "abs", func: abs },
    Builtin { name: "absolute", func: abs },
    Builtin { name: "floor", func: floor },
    Builtin { name: "ceil", func: ceil },
    Builtin { name: "round", func: round },
    Builtin { name: "around", func: round },
    Builtin { name: "isnan", func: isnan },
    Builtin { name: "arange", func: arange },
    Builtin { name: "linspace", func: linspace },
    Builtin { name: "zeros", func: zeros },
    Builtin { name: "ones", func: ones },
    Builtin { name: "where", func: where_ },
    Builtin { name: "unique", func: np_unique },
    Builtin { name: "cumsum", func: cumsum },
    Builtin { name: "histogram", func: histogram },
    Builtin { name: "argmax", func: argmax },
    Builtin { name: "argmin", func: argmin },
    Builtin { name: "corrcoef", func: corrcoef },
    Builtin { name: "clip", func: clip },
];

pub fn module() -> Value {
    let mut extra: Vec<(String, Value)> = [
        ("nan", f64::NAN),
        ("inf", f64::INFINITY),
        ("pi", std::f64::consts::PI),
        ("e", std::f64::consts::E),
    ]
    .into_iter()
    .map(|(name, v)| (name.to_string(), Value::Float(v)))
    .collect();
    // dtype names, as accepted by `astype` and `select_dtypes`.
    for dtype in ["number", "float64", "int64", "object", "bool_"] {
        extra.push((dtype.to_string(), Value::str(dtype)));
    }
    module_of("numpy", FUNCTIONS, extra)
}

fn arr(values: Vec<Scalar>) -> Value {
    series_value(Series::array(values))
}

fn first<'a>(args: &'a Args, func: &str) -> Eval<&'a Value> {
    args.required(0, "a", func)
}

fn values_of(interp: &mut Interpreter, args: &Args, func: &str) -> Eval<Vec<Scalar>> {
    match first(args, func)? {
        Value::Frame(frame) => Ok(frame.borrow().data.concat()),
        other => scalars_of(interp, other),
    }
}

fn array(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    match first(&args, "array")? {
        Value::Series(s) => Ok(arr(s.values.clone())),
        other => Ok(arr(scalars_of(interp, other)?)),
    }
}

fn reduce_with(interp: &mut Interpreter, args: &Args, op: Reduce) -> Eval<Value> {
    let values = values_of(interp, args, op.name())?;
    Ok(reduce(&values, op)?.to_value())
}

fn mean(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    reduce_with(interp, &args, Reduce::Mean)
}

fn median(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    reduce_with(interp, &args, Reduce::Median)
}

fn sum(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    reduce_with(interp, &args, Reduce::Sum)
}

fn prod(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    reduce_with(interp, &args, Reduce::Prod)
}

fn min(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    reduce_with(interp, &args, Reduce::Min)
}

fn max(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    reduce_with(interp, &args, Reduce::Max)
}

fn average(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let Some(weights) = args.opt(1, "weights") else {
        return reduce_with(interp, &args, Reduce::Mean);
    };
    let values = floats(interp, first(&args, "average")?)?;
    let weights = floats(interp, weights)?;
    if values.len() != weights.len() {
        return Err(Fault::value_error("Length of weights not compatible with specified axis."));
    }
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return Err(Fault::zero_division("Weights sum to zero, can't be normalized"));
    }
    let weighted: f64 = values.iter().zip(&weights).map(|(v, w)| v * w).sum();
    Ok(Value::Float(weighted / total))
}

/// numpy defaults to the population statistic (`ddof=0`).
fn spread(interp: &mut Interpreter, args: &Args, func: &str) -> Eval<f64> {
    let values = numeric_values(&values_of(interp, args, func)?);
    let ddof = match args.kw("ddof") {
        Some(v) => v.expect_int("ddof")?.max(0) as usize,
        None => 0,
    };
    Ok(variance(&values, ddof))
}

fn std(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Float(spread(interp, &args, "std")?.sqrt()))
}

fn var(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Float(spread(interp, &args, "var")?))
}

fn floats(interp: &mut Interpreter, value: &Value) -> Eval<Vec<f64>> {
    scalars_of(interp, value)?
        .iter()
        .map(|s| {
            s.as_f64().ok_or_else(|| {
                Fault::type_error(format!("could not convert '{}' to float", s.display()))
            })
        })
        .collect()
}

/// Quantiles at one `q` or a list of them; `scale` maps `q` into `[0, 1]`.
fn quantiles(interp: &mut Interpreter, args: &Args, func: &str, scale: f64) -> Eval<Value> {
    let values = numeric_values(&values_of(interp, args, func)?);
    let q = args.required(1, "q", func)?;
    let at = |q: f64| -> Eval<f64> {
        let q = q / scale;
        if !(0.0..=1.0).contains(&q) {
            return Err(Fault::value_error(if scale == 100.0 {
                "Percentiles must be in the range [0, 100]"
            } else {
                "Quantiles must be in the range [0, 1]"
            }));
        }
        Ok(quantile(&values, q))
    };
    match q {
        Value::Int(_) | Value::Float(_) => Ok(Value::Float(at(q.expect_f64("q")?)?)),
        other => {
            let points = floats(interp, other)?;
            let out = points.into_iter().map(|p| at(p).map(Scalar::Float)).collect::<Eval<_>>()?;
            Ok(arr(out))
        }
    }
}

fn percentile(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    quantiles(interp, &args, "percentile", 100.0)
}

fn np_quantile(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    quantiles(interp, &args, "quantile", 1.0)
}

/// Applies `f` cell by cell, keeping the container's shape: scalars stay
/// scalars, Series keep their index, frames keep their columns.
fn elementwise(
    interp: &mut Interpreter,
    value: &Value,
    f: &dyn Fn(&Scalar) -> Eval<Scalar>,
) -> Eval<Value> {
    match value {
        Value::Series(s) => {
            let values = s.values.iter().map(f).collect::<Eval<_>>()?;
            Ok(series_value(s.map_values(values)))
        }
        Value::Frame(frame) => {
            let frame = frame.borrow();
            let data = frame
                .data
                .iter()
                .map(|col| col.iter().map(f).collect::<Eval<Vec<_>>>())
                .collect::<Eval<_>>()?;
            Ok(frame_value(DataFrame {
                index: frame.index.clone(),
                columns: frame.columns.clone(),
                data,
            }))
        }
        Value::List(_) | Value::Tuple(_) | Value::Range(..) => {
            let values = scalars_of(interp, value)?.iter().map(f).collect::<Eval<_>>()?;
            Ok(arr(values))
        }
        other => Ok(f(&Scalar::from_value(other)?)?.to_value()),
    }
}

fn ufunc(interp: &mut Interpreter, args: &Args, name: &str, f: fn(f64) -> f64) -> Eval<Value> {
    let value = args.required(0, "x", name)?;
    elementwise(interp, value, &|s| match s {
        Scalar::Null => Ok(Scalar::Float(f64::NAN)),
        Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_) => {
            Ok(Scalar::Float(f(s.as_f64().unwrap_or(f64::NAN))))
        }
        _ => Err(Fault::type_error(format!(
            "ufunc '{}' not supported for the input types",
            name
        ))),
    })
}

fn sqrt(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "sqrt", f64::sqrt)
}

fn log(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "log", f64::ln)
}

fn log10(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "log10", f64::log10)
}

fn log2(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "log2", f64::log2)
}

fn log1p(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "log1p", f64::ln_1p)
}

fn exp(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "exp", f64::exp)
}

fn floor(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "floor", f64::floor)
}

fn ceil(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    ufunc(interp, &args, "ceil", f64::ceil)
}

fn abs(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = args.required(0, "x", "abs")?;
    elementwise(interp, value, &|s| match s {
        Scalar::Int(i) => Ok(Scalar::Int(i.wrapping_abs())),
        Scalar::Bool(b) => Ok(Scalar::Bool(*b)),
        Scalar::Float(f) => Ok(Scalar::Float(f.abs())),
        Scalar::Null => Ok(Scalar::Float(f64::NAN)),
        _ => Err(Fault::type_error("bad operand type for abs()")),
    })
}

fn round(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = args.required(0, "a", "round")?;
    let decimals = match args.get(1, "decimals") {
        Some(v) => v.expect_int("decimals")?,
        None => 0,
    };
    elementwise(interp, value, &|s| match s {
        Scalar::Float(f) => Ok(Scalar::Float(round_float(*f, decimals))),
        Scalar::Int(_) | Scalar::Bool(_) | Scalar::Null => Ok(s.clone()),
        _ => Err(Fault::type_error("ufunc 'round' not supported for the input types")),
    })
}

fn isnan(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = args.required(0, "x", "isnan")?;
    elementwise(interp, value, &|s| match s {
        Scalar::Str(_) | Scalar::DateTime(_) | Scalar::Tuple(_) => Err(Fault::type_error(
            "ufunc 'isnan' not supported for the input types",
        )),
        other => Ok(Scalar::Bool(other.is_missing())),
    })
}

fn checked_len(len: f64) -> Eval<usize> {
    if !len.is_finite() || len > MAX_ARRAY_LEN as f64 {
        return Err(Fault::value_error("Maximum allowed size exceeded"));
    }
    Ok(len.max(0.0) as usize)
}

fn arange(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let (start, stop) = match (args.pos.first(), args.pos.get(1).or_else(|| args.kw("stop"))) {
        (Some(start), Some(stop)) => (start.clone(), stop.clone()),
        (Some(stop), None) => (Value::Int(0), stop.clone()),
        (None, _) => return Err(Fault::type_error("arange() requires stop to be specified.")),
    };
    let step = args.get(2, "step").cloned().unwrap_or(Value::Int(1));
    let all_int =
        [&start, &stop, &step].iter().all(|v| matches!(v, Value::Int(_) | Value::Bool(_)));
    let a = start.expect_f64("start")?;
    let b = stop.expect_f64("stop")?;
    let s = step.expect_f64("step")?;
    if s == 0.0 {
        return Err(Fault::zero_division("division by zero"));
    }
    let n = checked_len(((b - a) / s).ceil())?;
    interp.charge(n as u64)?;
    let values = (0..n)
        .map(|i| {
            let v = a + s * i as f64;
            if all_int { Scalar::Int(v as i64) } else { Scalar::Float(v) }
        })
        .collect();
    Ok(arr(values))
}

fn linspace(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let start = args.required(0, "start", "linspace")?.expect_f64("start")?;
    let stop = args.required(1, "stop", "linspace")?.expect_f64("stop")?;
    let num = match args.get(2, "num") {
        Some(v) => v.expect_int("num")?,
        None => 50,
    };
    if num < 0 {
        return Err(Fault::value_error(format!(
            "Number of samples, {}, must be non-negative.",
            num
        )));
    }
    let num = checked_len(num as f64)?;
    interp.charge(num as u64)?;
    let endpoint = args.flag("endpoint", true);
    let div = if endpoint { num.saturating_sub(1) } else { num };
    let step = if div == 0 { 0.0 } else { (stop - start) / div as f64 };
    let values = (0..num)
        .map(|i| {
            if endpoint && i + 1 == num && num > 1 {
                Scalar::Float(stop)
            } else {
                Scalar::Float(start + step * i as f64)
            }
        })
        .collect();
    Ok(arr(values))
}

fn filled(interp: &mut Interpreter, args: &Args, func: &str, value: f64) -> Eval<Value> {
    let n = args.required(0, "shape", func)?.expect_int("shape")?;
    let n = checked_len(n as f64)?;
    interp.charge(n as u64)?;
    Ok(arr(vec![Scalar::Float(value); n]))
}

fn zeros(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    filled(interp, &args, "zeros", 0.0)
}

fn ones(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    filled(interp, &args, "ones", 1.0)
}

/// `where(cond, x, y)`; `x` and `y` broadcast when scalar.
fn where_(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let cond = scalars_of(interp, args.required(0, "condition", "where")?)?;
    let n = cond.len();
    let mut branch = |index: usize, name: &str| -> Eval<Vec<Scalar>> {
        let value = args.required(index, name, "where")?;
        let values = match value {
            Value::Series(_) | Value::List(_) | Value::Tuple(_) | Value::Range(..) => {
                scalars_of(interp, value)?
            }
            scalar => vec![Scalar::from_value(scalar)?; n],
        };
        if values.len() != n {
            return Err(Fault::value_error(
                "operands could not be broadcast together with the condition",
            ));
        }
        Ok(values)
    };
    let yes = branch(1, "x")?;
    let no = branch(2, "y")?;
    let values = cond
        .iter()
        .zip(yes.into_iter().zip(no))
        .map(|(c, (y, n))| {
            if !c.is_missing() && c.as_f64().is_some_and(|f| f != 0.0) { y } else { n }
        })
        .collect();
    Ok(arr(values))
}

fn np_unique(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let mut values = unique(&values_of(interp, &args, "unique")?);
    values.sort_by(|a, b| a.sort_cmp(b));
    Ok(arr(values))
}

fn cumsum(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let values = values_of(interp, &args, "cumsum")?;
    let ints = values.iter().all(|v| matches!(v, Scalar::Int(_) | Scalar::Bool(_)));
    let mut total = 0.0;
    let out = values
        .iter()
        .map(|v| {
            total += v.as_f64().unwrap_or(f64::NAN);
            if ints { Scalar::Int(total as i64) } else { Scalar::Float(total) }
        })
        .collect();
    Ok(arr(out))
}

/// Returns `(counts, edges)` like numpy.
fn histogram(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let values = numeric_values(&values_of(interp, &args, "histogram")?);
    let bins = match args.get(1, "bins") {
        Some(v) => v.expect_int("bins")?,
        None => 10,
    };
    if bins < 1 {
        return Err(Fault::value_error("`bins` must be positive, when an integer"));
    }
    let (edges, counts) = bin_edges(&values, bins as usize);
    Ok(Value::tuple(vec![
        arr(counts.into_iter().map(|c| Scalar::Int(c as i64)).collect()),
        arr(edges.into_iter().map(Scalar::Float).collect()),
    ]))
}

fn arg_extreme(interp: &mut Interpreter, args: &Args, func: &str, want: Ordering) -> Eval<Value> {
    let values = values_of(interp, args, func)?;
    let mut best: Option<(usize, &Scalar)> = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_missing() {
            continue;
        }
        if best.is_none_or(|(_, b)| v.sort_cmp(b) == want) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| Value::Int(i as i64))
        .ok_or_else(|| Fault::value_error(format!("attempt to get {} of an empty sequence", func)))
}

fn argmax(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    arg_extreme(interp, &args, "argmax", Ordering::Greater)
}

fn argmin(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    arg_extreme(interp, &args, "argmin", Ordering::Less)
}

/// 2x2 correlation matrix as a list of two arrays.
fn corrcoef(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let x = scalars_of(interp, args.required(0, "x", "corrcoef")?)?;
    let y = scalars_of(interp, args.required(1, "y", "corrcoef")?)?;
    if x.len() != y.len() {
        return Err(Fault::value_error("all the input array dimensions must match exactly"));
    }
    let r = super::super::frame::pearson(&x, &y);
    Ok(Value::list(vec![
        arr(vec![Scalar::Float(1.0), Scalar::Float(r)]),
        arr(vec![Scalar::Float(r), Scalar::Float(1.0)]),
    ]))
}

fn clip(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = args.required(0, "a", "clip")?;
    let lo = args.opt(1, "a_min").map(|v| v.expect_f64("a_min")).transpose()?;
    let hi = args.opt(2, "a_max").map(|v| v.expect_f64("a_max")).transpose()?;
    elementwise(interp, value, &|s| {
        let Some(x) = s.as_f64().filter(|_| !s.is_missing()) else {
            return Ok(s.clone());
        };
        let clipped = x.max(lo.unwrap_or(f64::NEG_INFINITY)).min(hi.unwrap_or(f64::INFINITY));
        Ok(match s {
            Scalar::Int(_) if clipped.fract() == 0.0 => Scalar::Int(clipped as i64),
            _ => Scalar::Float(clipped),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs `source` with numpy imported as `np` and returns `name`'s str().
    fn eval(source: &str, name: &str) -> String {
        let mut interp =
            Interpreter::new(std::env::temp_dir().join("datachat-numpy-tests"), 1_000_000);
        interp.run(&format!("import numpy as np\n{}", source)).unwrap();
        interp
            .locals()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_str())
            .unwrap_or_default()
    }

    #[test]
    fn test_reductions() {
        assert_eq!(eval("r = np.mean([1, 2, 3, 4])", "r"), "2.5");
        assert_eq!(eval("r = np.median([3, 1, 2])", "r"), "2.0");
        assert_eq!(eval("r = np.std([2, 4, 4, 4, 5, 5, 7, 9])", "r"), "2.0");
        assert_eq!(eval("r = np.percentile([1, 2, 3, 4, 5], 50)", "r"), "3.0");
        assert_eq!(eval("r = np.sum([1, 2, np.nan])", "r"), "3");
    }

    #[test]
    fn test_arange_and_linspace() {
        assert_eq!(eval("r = np.arange(5).tolist()", "r"), "[0, 1, 2, 3, 4]");
        assert_eq!(eval("r = np.arange(0, 1, 0.25).tolist()", "r"), "[0.0, 0.25, 0.5, 0.75]");
        assert_eq!(eval("r = np.linspace(0, 1, 5).tolist()", "r"), "[0.0, 0.25, 0.5, 0.75, 1.0]");
    }

    #[test]
    fn test_elementwise_keeps_shape() {
        assert_eq!(eval("r = np.sqrt(16)", "r"), "4.0");
        assert_eq!(eval("r = np.round([1.234, 5.678], 1).tolist()", "r"), "[1.2, 5.7]");
        let src = "import pandas as pd\ns = pd.Series([1, 4], name='v')\nr = np.sqrt(s).name";
        assert_eq!(eval(src, "r"), "v");
    }

    #[test]
    fn test_where_and_argmax() {
        let src = "r = np.where([True, False, True], 'a', 'b').tolist()";
        assert_eq!(eval(src, "r"), "['a', 'b', 'a']");
        assert_eq!(eval("r = np.argmax([3, 9, 2])", "r"), "1");
    }

    #[test]
    fn test_histogram_counts() {
        let src = "counts, edges = np.histogram([1, 2, 2, 3, 4], bins=3)\n\
                   c = counts.tolist()\n\
                   n = len(edges)\n";
        assert_eq!(eval(src, "c"), "[1, 2, 2]");
        assert_eq!(eval(src, "n"), "4");
    }
}
