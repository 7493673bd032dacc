//! Builtin functions and the builtin type objects.

use std::cmp::Ordering;

use indexmap::IndexMap;

use super::ast::BinOp;
use super::error::{Eval, Fault, is_exception_kind, is_subclass};
use super::eval::Interpreter;
use super::format::format_value;
use super::ops;
use super::value::{Args, Builtin, Dict, Value, py_eq, range_len, shared, sort_cmp};

static BUILTINS: &[Builtin] = &[
    Builtin { name: "abs", func: abs },
    Builtin { name: "all", func: all },
    Builtin { name: "any", func: any },
    Builtin { name: "bin", func: bin },
    Builtin { name: "bool", func: bool_ },
    Builtin { name: "callable", func: callable },
    Builtin { name: "chr", func: chr },
    Builtin { name: "dict", func: dict },
    Builtin { name: "divmod", func: divmod },
    Builtin { name: "enumerate", func: enumerate },
    Builtin { name: "filter", func: filter },
    Builtin { name: "float", func: float },
    Builtin { name: "format", func: format },
    Builtin { name: "hex", func: hex },
    Builtin { name: "int", func: int },
    Builtin { name: "isinstance", func: isinstance },
    Builtin { name: "len", func: len },
    Builtin { name: "list", func: list },
    Builtin { name: "map", func: map },
    Builtin { name: "max", func: max },
    Builtin { name: "min", func: min },
    Builtin { name: "oct", func: oct },
    Builtin { name: "ord", func: ord },
    Builtin { name: "pow", func: pow },
    Builtin { name: "print", func: print },
    Builtin { name: "range", func: range },
    Builtin { name: "repr", func: repr },
    Builtin { name: "reversed", func: reversed },
    Builtin { name: "round", func: round },
    Builtin { name: "set", func: set },
    Builtin { name: "sorted", func: sorted },
    Builtin { name: "str", func: str_ },
    Builtin { name: "sum", func: sum },
    Builtin { name: "tuple", func: tuple },
    Builtin { name: "type", func: type_ },
    Builtin { name: "zip", func: zip },
];

pub fn lookup(name: &str) -> Option<Value> {
    if let Some(builtin) = BUILTINS.iter().find(|b| b.name == name) {
        return Some(Value::Builtin(builtin));
    }
    is_exception_kind(name).then(|| Value::Class(name.into()))
}

pub fn make_set(values: Vec<Value>) -> Eval<Value> {
    let mut set = IndexMap::with_capacity(values.len());
    for v in values {
        set.entry(v.hash_key()?).or_insert(v);
    }
    Ok(Value::Set(shared(set)))
}

/// Stable sort with an optional key function; comparison errors propagate.
pub fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Eval<Vec<Value>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(f) => interp.call_value(f, Args::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        keyed.push((k, item));
    }
    interp.charge(keyed.len() as u64)?;
    let mut failure = None;
    keyed.sort_by(|a, b| {
        let ord = match sort_cmp(&a.0, &b.0) {
            Ok(o) => o,
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        };
        if reverse { ord.reverse() } else { ord }
    });
    if let Some(fault) = failure {
        return Err(fault);
    }
    Ok(keyed.into_iter().map(|(_, v)| v).collect())
}

fn one<'a>(args: &'a Args, func: &str) -> Eval<&'a Value> {
    args.pos
        .first()
        .ok_or_else(|| {
            Fault::type_error(format!("{}() takes exactly one argument (0 given)", func))
        })
}

fn abs(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let v = one(&args, "abs")?;
    Ok(match v {
        Value::Int(i) => i.checked_abs().map(Value::Int).unwrap_or(Value::Float((*i as f64).abs())),
        Value::Bool(b) => Value::Int(*b as i64),
        Value::Float(f) => Value::Float(f.abs()),
        Value::TimeDelta(t) => Value::TimeDelta(t.abs()),
        Value::Series(_) | Value::Frame(_) => return interp.call_method(v, "abs", Args::default()),
        other => {
            return Err(Fault::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            )));
        }
    })
}

fn all(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    for item in interp.iterate(one(&args, "all")?)? {
        if !item.truth()? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn any(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    for item in interp.iterate(one(&args, "any")?)? {
        if item.truth()? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn radix(args: &Args, func: &str, prefix: &str, render: fn(u64) -> String) -> Eval<Value> {
    let i = one(args, func)?.expect_int(&format!("{}() argument", func))?;
    let sign = if i < 0 { "-" } else { "" };
    Ok(Value::str(&format!("{}{}{}", sign, prefix, render(i.unsigned_abs()))))
}

fn bin(_: &mut Interpreter, args: Args) -> Eval<Value> {
    radix(&args, "bin", "0b", |n| format!("{:b}", n))
}

fn hex(_: &mut Interpreter, args: Args) -> Eval<Value> {
    radix(&args, "hex", "0x", |n| format!("{:x}", n))
}

fn oct(_: &mut Interpreter, args: Args) -> Eval<Value> {
    radix(&args, "oct", "0o", |n| format!("{:o}", n))
}

fn bool_(_: &mut Interpreter, args: Args) -> Eval<Value> {
    match args.pos.first() {
        Some(v) => Ok(Value::Bool(v.truth()?)),
        None => Ok(Value::Bool(false)),
    }
}

fn callable(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Bool(matches!(
        one(&args, "callable")?,
        Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::Class(_)
    )))
}

fn chr(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let i = one(&args, "chr")?.expect_int("chr() argument")?;
    let c = u32::try_from(i)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| Fault::value_error("chr() arg not in range(0x110000)"))?;
    Ok(Value::str(c.encode_utf8(&mut [0; 4])))
}

fn ord(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let s = one(&args, "ord")?.expect_str("ord() argument")?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(c as i64)),
        _ => Err(Fault::type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

fn dict(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let mut out = Dict::new();
    if let Some(source) = args.pos.first() {
        match source {
            Value::Dict(d) => out = d.borrow().clone(),
            other => {
                for pair in interp.iterate(other)? {
                    let kv = interp.iterate(&pair)?;
                    if kv.len() != 2 {
                        return Err(Fault::value_error(format!(
                            "dictionary update sequence element has length {}; 2 is required",
                            kv.len()
                        )));
                    }
                    out.insert(kv[0].clone(), kv[1].clone())?;
                }
            }
        }
    }
    for (k, v) in args.kw {
        out.insert(Value::str(&k), v)?;
    }
    Ok(Value::dict(out))
}

fn divmod(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let a = args.required(0, "a", "divmod")?;
    let b = args.required(1, "b", "divmod")?;
    Ok(Value::tuple(vec![
        ops::binary(BinOp::FloorDiv, a, b)?,
        ops::binary(BinOp::Mod, a, b)?,
    ]))
}

fn enumerate(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let items = interp.iterate(args.required(0, "iterable", "enumerate")?)?;
    let start = match args.get(1, "start") {
        Some(v) => v.expect_int("start")?,
        None => 0,
    };
    Ok(Value::list(
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
            .collect(),
    ))
}

fn filter(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let func = args.required(0, "function", "filter")?.clone();
    let items = interp.iterate(args.required(1, "iterable", "filter")?)?;
    let mut out = Vec::new();
    for item in items {
        let keep = if func.is_none() {
            item.truth()?
        } else {
            interp.call_value(&func, Args::new(vec![item.clone()]))?.truth()?
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

pub fn parse_float(text: &str) -> Option<f64> {
    let t = text.trim().replace('_', "");
    match t.to_ascii_lowercase().as_str() {
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        _ => t.parse().ok(),
    }
}

fn float(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let Some(v) = args.pos.first() else {
        return Ok(Value::Float(0.0));
    };
    Ok(Value::Float(match v {
        Value::Str(s) => parse_float(s).ok_or_else(|| {
            Fault::value_error(format!("could not convert string to float: {}", v.repr()))
        })?,
        other => other.as_f64().ok_or_else(|| {
            Fault::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        })?,
    }))
}

fn format(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = args.required(0, "value", "format")?;
    let spec = match args.get(1, "format_spec") {
        Some(s) => s.expect_str("format_spec")?.to_string(),
        None => String::new(),
    };
    Ok(Value::str(&format_value(value, &spec)?))
}

fn int(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let Some(v) = args.pos.first() else {
        return Ok(Value::Int(0));
    };
    let base = match args.get(1, "base") {
        Some(b) => Some(b.expect_int("base")?),
        None => None,
    };
    match (v, base) {
        (Value::Str(s), base) => {
            let base = base.unwrap_or(10);
            let text = s.trim().replace('_', "");
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest.to_string()),
                None => (false, text.trim_start_matches('+').to_string()),
            };
            let (base, digits) = match (base, digits.get(..2).map(|p| p.to_ascii_lowercase())) {
                (16 | 0, Some(p)) if p == "0x" => (16, digits[2..].to_string()),
                (8 | 0, Some(p)) if p == "0o" => (8, digits[2..].to_string()),
                (2 | 0, Some(p)) if p == "0b" => (2, digits[2..].to_string()),
                (0, _) => (10, digits),
                (b, _) => (b, digits),
            };
            let parsed = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .and_then(|b| i64::from_str_radix(&digits, b).ok())
                .ok_or_else(|| {
                    Fault::value_error(format!(
                        "invalid literal for int() with base {}: {}",
                        base,
                        v.repr()
                    ))
                })?;
            Ok(Value::Int(if negative { -parsed } else { parsed }))
        }
        (_, Some(_)) => Err(Fault::type_error("int() can't convert non-string with explicit base")),
        (Value::Int(i), None) => Ok(Value::Int(*i)),
        (Value::Bool(b), None) => Ok(Value::Int(*b as i64)),
        (Value::Float(f), None) => {
            if f.is_nan() {
                return Err(Fault::value_error("cannot convert float NaN to integer"));
            }
            if f.is_infinite() {
                return Err(Fault::new("OverflowError", "cannot convert float infinity to integer"));
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        (other, None) => Err(Fault::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn instance_of(value: &Value, class: &Value) -> Eval<bool> {
    let name: &str = match class {
        Value::Class(name) => name,
        Value::Builtin(b) => b.name,
        Value::Tuple(classes) => {
            for c in classes.iter() {
                if instance_of(value, c)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        other => {
            return Err(Fault::type_error(format!(
                "isinstance() arg 2 must be a type, a tuple of types, or a union, not '{}'",
                other.type_name()
            )));
        }
    };
    Ok(match value {
        Value::Exception(fault) => is_subclass(&fault.kind, name),
        Value::Bool(_) => matches!(name, "bool" | "int"),
        Value::Series(s) if s.is_array => name == "ndarray" || name == "array",
        other => other.type_name() == name,
    })
}

fn isinstance(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = args.required(0, "obj", "isinstance")?;
    let class = args.required(1, "class_or_tuple", "isinstance")?;
    Ok(Value::Bool(instance_of(value, class)?))
}

pub fn length(value: &Value) -> Eval<usize> {
    Ok(match value {
        Value::Str(s) => s.chars().count(),
        Value::List(l) => l.borrow().len(),
        Value::Tuple(t) => t.len(),
        Value::Dict(d) => d.borrow().len(),
        Value::Set(s) => s.borrow().len(),
        Value::Range(a, b, c) => range_len(*a, *b, *c) as usize,
        Value::Series(s) => s.len(),
        Value::Frame(f) => f.borrow().len(),
        Value::GroupBy(g) => g.groups().len(),
        other => {
            return Err(Fault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    })
}

fn len(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Int(length(one(&args, "len")?)? as i64))
}

fn list(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    match args.pos.first() {
        Some(v) => Ok(Value::list(interp.iterate(v)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn tuple(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    match args.pos.first() {
        Some(Value::Tuple(t)) => Ok(Value::Tuple(t.clone())),
        Some(v) => Ok(Value::tuple(interp.iterate(v)?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

fn set(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    match args.pos.first() {
        Some(v) => make_set(interp.iterate(v)?),
        None => make_set(Vec::new()),
    }
}

fn map(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let func = args.required(0, "function", "map")?.clone();
    let mut columns = Vec::new();
    for it in args.pos.iter().skip(1) {
        columns.push(interp.iterate(it)?);
    }
    if columns.is_empty() {
        return Err(Fault::type_error("map() must have at least two arguments."));
    }
    let n = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let call = columns.iter().map(|c| c[i].clone()).collect();
        out.push(interp.call_value(&func, Args::new(call))?);
    }
    Ok(Value::list(out))
}

fn extremum(interp: &mut Interpreter, args: Args, func: &str, want: Ordering) -> Eval<Value> {
    let items = match args.pos.len() {
        0 => return Err(Fault::type_error(format!("{} expected at least 1 argument, got 0", func))),
        1 => interp.iterate(&args.pos[0])?,
        _ => args.pos.clone(),
    };
    let key = args.kw("key").filter(|k| !k.is_none()).cloned();
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let k = match &key {
            Some(f) => interp.call_value(f, Args::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        let better = match &best {
            None => true,
            Some((best_key, _)) => sort_cmp(&k, best_key)? == want,
        };
        if better {
            best = Some((k, item));
        }
    }
    match best {
        Some((_, v)) => Ok(v),
        None => args
            .kw("default")
            .cloned()
            .ok_or_else(|| Fault::value_error(format!("{}() iterable argument is empty", func))),
    }
}

fn max(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    extremum(interp, args, "max", Ordering::Greater)
}

fn min(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    extremum(interp, args, "min", Ordering::Less)
}

fn pow(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let base = args.required(0, "base", "pow")?;
    let exp = args.required(1, "exp", "pow")?;
    let result = ops::binary(BinOp::Pow, base, exp)?;
    match args.opt(2, "mod") {
        Some(m) => ops::binary(BinOp::Mod, &result, m),
        None => Ok(result),
    }
}

fn print(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let sep = match args.kw("sep") {
        Some(Value::None) | None => " ".to_string(),
        Some(v) => v.expect_str("sep")?.to_string(),
    };
    let end = match args.kw("end") {
        Some(Value::None) | None => "\n".to_string(),
        Some(v) => v.expect_str("end")?.to_string(),
    };
    let parts: Vec<String> = args.pos.iter().map(Value::to_str).collect();
    let line = format!("{}{}", parts.join(&sep), end);
    interp.write(&line);
    Ok(Value::None)
}

fn range(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let ints = args
        .pos
        .iter()
        .map(|v| v.expect_int("range() argument"))
        .collect::<Eval<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(Fault::type_error(format!(
                "range expected 1 to 3 arguments, got {}",
                ints.len()
            )));
        }
    };
    if step == 0 {
        return Err(Fault::value_error("range() arg 3 must not be zero"));
    }
    Ok(Value::Range(start, stop, step))
}

fn repr(_: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::str(&one(&args, "repr")?.repr()))
}

fn str_(_: &mut Interpreter, args: Args) -> Eval<Value> {
    match args.pos.first() {
        Some(v) => Ok(Value::str(&v.to_str())),
        None => Ok(Value::str("")),
    }
}

fn reversed(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let mut items = interp.iterate(one(&args, "reversed")?)?;
    items.reverse();
    Ok(Value::list(items))
}

pub fn round_float(f: f64, digits: i64) -> f64 {
    if !f.is_finite() {
        return f;
    }
    let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
    let scaled = f * scale;
    if !scaled.is_finite() {
        return f;
    }
    scaled.round_ties_even() / scale
}

fn round(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = args.required(0, "number", "round")?;
    let digits = match args.opt(1, "ndigits") {
        Some(d) => Some(d.expect_int("ndigits")?),
        None => None,
    };
    match (value, digits) {
        (Value::Series(_) | Value::Frame(_), _) => {
            let decimals = Value::Int(digits.unwrap_or(0));
            interp.call_method(value, "round", Args::new(vec![decimals]))
        }
        (Value::Int(_) | Value::Bool(_), None) => {
            Ok(Value::Int(value.as_i64().unwrap_or_default()))
        }
        (Value::Int(i), Some(d)) => {
            if d >= 0 {
                return Ok(Value::Int(*i));
            }
            Ok(Value::Int(round_float(*i as f64, d) as i64))
        }
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(Fault::value_error("cannot convert float NaN or infinity to integer"));
            }
            Ok(Value::Int(f.round_ties_even() as i64))
        }
        (Value::Float(f), Some(d)) => Ok(Value::Float(round_float(*f, d))),
        (other, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn sorted(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let items = interp.iterate(one(&args, "sorted")?)?;
    let key = args.kw("key").filter(|k| !k.is_none()).cloned();
    let reverse = args.flag("reverse", false);
    Ok(Value::list(sort_values(interp, items, key.as_ref(), reverse)?))
}

fn sum(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let items = interp.iterate(args.required(0, "iterable", "sum")?)?;
    let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
    if total.as_str().is_some() {
        return Err(Fault::type_error("sum() can't sum strings [use ''.join(seq) instead]"));
    }
    for item in items {
        total = ops::binary(BinOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn type_(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let value = one(&args, "type")?;
    Ok(match value {
        Value::Exception(fault) => Value::Class(fault.kind.as_str().into()),
        other => Value::Class(other.type_name().into()),
    })
}

fn zip(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let mut columns = Vec::with_capacity(args.pos.len());
    for it in &args.pos {
        columns.push(interp.iterate(it)?);
    }
    let strict = args.flag("strict", false);
    if strict && columns.windows(2).any(|w| w[0].len() != w[1].len()) {
        return Err(Fault::value_error("zip() arguments have different lengths"));
    }
    let n = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..n)
            .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
            .collect(),
    ))
}

/// Position of the first element equal to `needle`.
pub fn index_of(items: &[Value], needle: &Value) -> Option<usize> {
    items.iter().position(|v| py_eq(v, needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> String {
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000_000);
        interp.run(&format!("result = {}", source)).unwrap();
        interp
            .locals()
            .into_iter()
            .find(|(k, _)| k == "result")
            .map(|(_, v)| v.repr())
            .unwrap_or_default()
    }

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(eval("round(2.5)"), "2");
        assert_eq!(eval("round(3.5)"), "4");
        assert_eq!(eval("round(3.14159, 2)"), "3.14");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(eval("int('  42 ')"), "42");
        assert_eq!(eval("int('ff', 16)"), "255");
        assert_eq!(eval("int(-3.9)"), "-3");
        assert_eq!(eval("float('1e3')"), "1000.0");
        assert_eq!(eval("str(1.50)"), "'1.5'");
    }

    #[test]
    fn test_sorted_with_key_and_reverse() {
        assert_eq!(eval("sorted(['bb', 'a', 'ccc'], key=len, reverse=True)"), "['ccc', 'bb', 'a']");
        assert_eq!(eval("sorted([3, 1, 2])"), "[1, 2, 3]");
    }

    #[test]
    fn test_min_max_with_key() {
        assert_eq!(eval("max({'a': 3, 'b': 5}.items(), key=lambda kv: kv[1])"), "('b', 5)");
        assert_eq!(eval("min([], default=0)"), "0");
    }

    #[test]
    fn test_isinstance_and_type() {
        assert_eq!(eval("isinstance(True, int)"), "True");
        assert_eq!(eval("isinstance(1.0, (int, str))"), "False");
        assert_eq!(eval("type(3) == int"), "True");
        assert_eq!(eval("isinstance(ValueError('x'), Exception)"), "True");
    }

    #[test]
    fn test_zip_and_enumerate() {
        assert_eq!(eval("list(zip([1, 2, 3], 'ab'))"), "[(1, 'a'), (2, 'b')]");
        assert_eq!(eval("list(enumerate(['x'], 1))"), "[(1, 'x')]");
    }

    #[test]
    fn test_sorting_mixed_types_fails() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000_000);
        let fault = interp.run("sorted([1, 'a'])").unwrap_err();
        assert_eq!(fault.kind, "TypeError");
    }
}
