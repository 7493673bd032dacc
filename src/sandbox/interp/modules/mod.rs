//! The import table. Every importable name maps to a module value built once
//! per interpreter and cached.

mod datetime;
mod numpy;
mod profiling;
mod stats;

use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::BinOp;
use super::error::{Eval, Fault};
use super::eval::Interpreter;
use super::value::{Args, Builtin, Module, Value};
use super::{ops, pandas, plot};

pub use datetime::{class_attr, constructor, datetime_attr, datetime_method};
pub use profiling::{Profile, profile_method};

pub fn import(interp: &mut Interpreter, name: &str) -> Eval<Value> {
    if let Some(module) = interp.cached_module(name) {
        return Ok(module);
    }
    let module = match name {
        "math" => module_of("math", MATH, math_constants()),
        "datetime" => datetime::module(),
        "numpy" => numpy::module(),
        "pandas" => pandas::module(),
        "matplotlib" => plot::matplotlib_module(),
        "matplotlib.pyplot" => plot::pyplot_module(),
        "seaborn" => plot::seaborn_module(),
        "plotly" => {
            let express = import(interp, "plotly.express")?;
            module_of("plotly", &[], vec![("express".to_string(), express)])
        }
        "plotly.express" => plot::express_module(),
        "ydata_profiling" => profiling::module(),
        "scipy" => {
            let stats = import(interp, "scipy.stats")?;
            module_of("scipy", &[], vec![("stats".to_string(), stats)])
        }
        "scipy.stats" => stats::module(),
        _ => {
            return Err(Fault::new(
                "ModuleNotFoundError",
                format!("No module named '{}'", name),
            ));
        }
    };
    log::debug!("sandbox import {}", name);
    interp.cache_module(name, module.clone());
    Ok(module)
}

pub(super) fn module_of(
    name: &str,
    functions: &'static [Builtin],
    extra: Vec<(String, Value)>,
) -> Value {
    let mut attrs: IndexMap<String, Value> = functions
        .iter()
        .map(|b| (b.name.to_string(), Value::Builtin(b)))
        .collect();
    attrs.extend(extra);
    Value::Module(Rc::new(Module {
        name: name.to_string(),
        attrs,
    }))
}

// math

static MATH: &[Builtin] = &[
    Builtin { name: "sqrt", func: sqrt },
    Builtin { name: "exp", func: exp },
    Builtin { name: "log", func: log },
    Builtin { name: "log10", func: log10 },
    Builtin { name: "log2", func: log2 },
    Builtin { name: "log1p", func: log1p },
    Builtin { name: "floor", func: floor },
    Builtin { name: "ceil", func: ceil },
    Builtin { name: "trunc", func: trunc },
    Builtin { name: "fabs", func: fabs },
    Builtin { name: "pow", func: pow },
    Builtin { name: "sin", func: sin },
    Builtin { name: "cos", func: cos },
    Builtin { name: "tan", func: tan },
    Builtin { name: "asin", func: asin },
    Builtin { name: "acos", func: acos },
    Builtin { name: "atan", func: atan },
    Builtin { name: "atan2", func: atan2 },
    Builtin { name: "hypot", func: hypot },
    Builtin { name: "degrees", func: degrees },
    Builtin { name: "radians", func: radians },
    Builtin { name: "isnan", func: isnan },
    Builtin { name: "isinf", func: isinf },
    Builtin { name: "isfinite", func: isfinite },
    Builtin { name: "isclose", func: isclose },
    Builtin { name: "factorial", func: factorial },
    Builtin { name: "gcd", func: gcd },
    Builtin { name: "fsum", func: fsum },
    Builtin { name: "prod", func: prod },
];

fn math_constants() -> Vec<(String, Value)> {
    [
        ("pi", std::f64::consts::PI),
        ("e", std::f64::consts::E),
        ("tau", std::f64::consts::TAU),
        ("inf", f64::INFINITY),
        ("nan", f64::NAN),
    ]
    .into_iter()
    .map(|(name, v)| (name.to_string(), Value::Float(v)))
    .collect()
}

fn real(args: &Args, index: usize, func: &str) -> Eval<f64> {
    let name = if index == 0 { "x" } else { "y" };
    args.required(index, name, func)?.expect_f64(&format!("{}() argument", func))
}

fn domain_error() -> Fault {
    Fault::value_error("math domain error")
}

/// One-argument float function; `valid` guards the domain.
fn unary(args: &Args, func: &str, f: fn(f64) -> f64, valid: fn(f64) -> bool) -> Eval<Value> {
    let x = real(args, 0, func)?;
    if !valid(x) {
        return Err(domain_error());
    }
    Ok(Value::Float(f(x)))
}

fn any(_: f64) -> bool {
    true
}

fn positive(x: f64) -> bool {
    x > 0.0 || x.is_nan()
}

fn sqrt(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "sqrt", f64::sqrt, |x| x >= 0.0 || x.is_nan())
}

fn exp(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let x = real(&args, 0, "exp")?;
    let y = x.exp();
    if y.is_infinite() && x.is_finite() {
        return Err(Fault::new("OverflowError", "math range error"));
    }
    Ok(Value::Float(y))
}

fn log(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let x = real(&args, 0, "log")?;
    if !positive(x) {
        return Err(domain_error());
    }
    match args.get(1, "base") {
        Some(base) => {
            let base = base.expect_f64("log() base")?;
            if !positive(base) || base == 1.0 {
                return Err(if base == 1.0 {
                    Fault::zero_division("float division by zero")
                } else {
                    domain_error()
                });
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
        None => Ok(Value::Float(x.ln())),
    }
}

fn log10(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "log10", f64::log10, positive)
}

fn log2(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "log2", f64::log2, positive)
}

fn log1p(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "log1p", f64::ln_1p, |x| x > -1.0 || x.is_nan())
}

/// `floor`/`ceil`/`trunc` return integers, as in Python 3.
fn to_int(args: &Args, func: &str, f: fn(f64) -> f64) -> Eval<Value> {
    let value = args.required(0, "x", func)?;
    if let Value::Int(i) = value {
        return Ok(Value::Int(*i));
    }
    let x = f(value.expect_f64(&format!("{}() argument", func))?);
    if x.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if x.is_infinite() || x.abs() >= 9.2e18 {
        return Err(Fault::new("OverflowError", "cannot convert float infinity to integer"));
    }
    Ok(Value::Int(x as i64))
}

fn floor(_: &mut Interpreter, args: Args) -> Eval<Value> {
    to_int(&args, "floor", f64::floor)
}

fn ceil(_: &mut Interpreter, args: Args) -> Eval<Value> {
    to_int(&args, "ceil", f64::ceil)
}

fn trunc(_: &mut Interpreter, args: Args) -> Eval<Value> {
    to_int(&args, "trunc", f64::trunc)
}

fn fabs(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "fabs", f64::abs, any)
}

fn pow(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let (x, y) = (real(&args, 0, "pow")?, real(&args, 1, "pow")?);
    if x == 0.0 && y < 0.0 || x < 0.0 && y.fract() != 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.powf(y)))
}

fn sin(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "sin", f64::sin, |x| !x.is_infinite())
}

fn cos(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "cos", f64::cos, |x| !x.is_infinite())
}

fn tan(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "tan", f64::tan, |x| !x.is_infinite())
}

fn asin(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "asin", f64::asin, |x| (-1.0..=1.0).contains(&x) || x.is_nan())
}

fn acos(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "acos", f64::acos, |x| (-1.0..=1.0).contains(&x) || x.is_nan())
}

fn atan(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "atan", f64::atan, any)
}

fn atan2(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Float(real(&args, 0, "atan2")?.atan2(real(&args, 1, "atan2")?)))
}

fn hypot(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let total: f64 = args
        .pos
        .iter()
        .map(|v| v.expect_f64("hypot() argument").map(|x| x * x))
        .sum::<Eval<f64>>()?;
    Ok(Value::Float(total.sqrt()))
}

fn degrees(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "degrees", f64::to_degrees, any)
}

fn radians(_: &mut Interpreter, args: Args) -> Eval<Value> {
    unary(&args, "radians", f64::to_radians, any)
}

fn isnan(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Bool(real(&args, 0, "isnan")?.is_nan()))
}

fn isinf(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Bool(real(&args, 0, "isinf")?.is_infinite()))
}

fn isfinite(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Bool(real(&args, 0, "isfinite")?.is_finite()))
}

fn isclose(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let (a, b) = (real(&args, 0, "isclose")?, real(&args, 1, "isclose")?);
    let rel = args.kw("rel_tol").map(|v| v.expect_f64("rel_tol")).transpose()?.unwrap_or(1e-9);
    let abs = args.kw("abs_tol").map(|v| v.expect_f64("abs_tol")).transpose()?.unwrap_or(0.0);
    if rel < 0.0 || abs < 0.0 {
        return Err(Fault::value_error("tolerances must be non-negative"));
    }
    let close = a == b || (a - b).abs() <= (rel * a.abs().max(b.abs())).max(abs);
    Ok(Value::Bool(close))
}

fn factorial(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let n = args.required(0, "n", "factorial")?.expect_int("factorial() argument")?;
    if n < 0 {
        return Err(Fault::value_error("factorial() not defined for negative values"));
    }
    (1..=n)
        .try_fold(1i64, |acc, k| acc.checked_mul(k))
        .map(Value::Int)
        .ok_or_else(|| Fault::new("OverflowError", "factorial() result too large"))
}

fn gcd(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let mut acc: i64 = 0;
    for v in &args.pos {
        let mut b = v.expect_int("gcd() argument")?.abs();
        let mut a = acc;
        while b != 0 {
            (a, b) = (b, a % b);
        }
        acc = a;
    }
    Ok(Value::Int(acc))
}

fn fsum(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let items = interp.iterate(args.required(0, "seq", "fsum")?)?;
    // Neumaier compensated sum.
    let (mut sum, mut carry) = (0.0f64, 0.0f64);
    for item in items {
        let x = item.expect_f64("fsum() element")?;
        let t = sum + x;
        carry += if sum.abs() >= x.abs() { (sum - t) + x } else { (x - t) + sum };
        sum = t;
    }
    Ok(Value::Float(sum + carry))
}

fn prod(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let items = interp.iterate(args.required(0, "iterable", "prod")?)?;
    let mut acc = args.kw("start").cloned().unwrap_or(Value::Int(1));
    for item in items {
        acc = ops::binary(BinOp::Mul, &acc, &item)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> Interpreter {
        Interpreter::new(std::env::temp_dir().join("datachat-module-tests"), 1_000_000)
    }

    fn eval(source: &str, name: &str) -> String {
        let mut interp = interpreter();
        interp.run(source).unwrap();
        interp
            .locals()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.repr())
            .unwrap_or_default()
    }

    fn fault(source: &str) -> Fault {
        interpreter().run(source).unwrap_err()
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(eval("import math\nr = math.sqrt(16)", "r"), "4.0");
        assert_eq!(eval("import math\nr = math.floor(2.7)", "r"), "2");
        assert_eq!(eval("import math\nr = math.log(8, 2)", "r"), "3.0");
        assert_eq!(eval("from math import factorial\nr = factorial(5)", "r"), "120");
        assert_eq!(eval("import math\nr = math.gcd(12, 18)", "r"), "6");
        assert_eq!(eval("import math\nr = round(math.pi, 4)", "r"), "3.1416");
    }

    #[test]
    fn test_math_domain_error() {
        let f = fault("import math\nmath.sqrt(-1)\n");
        assert_eq!(f.kind, "ValueError");
        assert_eq!(f.message, "math domain error");
    }

    #[test]
    fn test_unknown_module() {
        let f = fault("import os\n");
        assert_eq!(f.kind, "ModuleNotFoundError");
        assert_eq!(f.message, "No module named 'os'");
    }

    #[test]
    fn test_dotted_imports() {
        assert_eq!(eval("import scipy.stats\nr = callable(scipy.stats.zscore)", "r"), "True");
        assert_eq!(eval("from scipy import stats\nr = callable(stats.pearsonr)", "r"), "True");
        assert_eq!(eval("import plotly.express as px\nr = callable(px.bar)", "r"), "True");
    }

    #[test]
    fn test_module_cache_returns_same_module() {
        assert_eq!(eval("import numpy as np\nimport numpy\nr = np is numpy", "r"), "True");
    }
}
