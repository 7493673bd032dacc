//! Operator semantics for scalar and container values.

use chrono::TimeDelta;
use indexmap::IndexMap;

use super::ast::{BinOp, CmpOp, UnaryOp};
use super::error::{Eval, Fault, alloc_len};
use super::format::percent_format;
use super::frame::Scalar;
use super::pandas;
use super::value::{Value, py_eq, py_partial_cmp, range_len, shared};

fn unsupported(op: BinOp, a: &Value, b: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

fn is_tabular(v: &Value) -> bool {
    matches!(v, Value::Series(_) | Value::Frame(_))
}

pub fn binary(op: BinOp, a: &Value, b: &Value) -> Eval<Value> {
    if is_tabular(a) || is_tabular(b) {
        return pandas::broadcast_binary(op, a, b);
    }

    match (a, b) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            let (x, y) = (a.as_i64().unwrap_or_default(), b.as_i64().unwrap_or_default());
            if let (Value::Bool(p), Value::Bool(q), BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) =
                (a, b, op)
            {
                return Ok(Value::Bool(match op {
                    BinOp::BitAnd => p & q,
                    BinOp::BitOr => p | q,
                    _ => p ^ q,
                }));
            }
            int_binary(op, x, y).ok_or_else(|| unsupported(op, a, b))?
        }
        (
            Value::Int(_) | Value::Bool(_) | Value::Float(_),
            Value::Int(_) | Value::Bool(_) | Value::Float(_),
        ) => {
            let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            float_binary(op, x, y).ok_or_else(|| unsupported(op, a, b))?
        }
        (Value::Str(x), Value::Str(y)) if op == BinOp::Add => {
            alloc_len(x.len() + y.len(), 1)?;
            Ok(Value::str(&format!("{}{}", x, y)))
        }
        (Value::Str(x), other) if op == BinOp::Mod => Ok(Value::str(&percent_format(x, other)?)),
        (Value::Str(s), n @ (Value::Int(_) | Value::Bool(_)))
        | (n @ (Value::Int(_) | Value::Bool(_)), Value::Str(s))
            if op == BinOp::Mul =>
        {
            let times = repeat_count(n);
            alloc_len(s.len(), times)?;
            Ok(Value::str(&s.repeat(times)))
        }
        (Value::List(x), Value::List(y)) if op == BinOp::Add => {
            let (x, y) = (x.borrow(), y.borrow());
            let mut out = Vec::with_capacity(alloc_len(x.len() + y.len(), 1)?);
            out.extend(x.iter().cloned());
            out.extend(y.iter().cloned());
            Ok(Value::list(out))
        }
        (Value::Tuple(x), Value::Tuple(y)) if op == BinOp::Add => {
            let mut out = Vec::with_capacity(alloc_len(x.len() + y.len(), 1)?);
            out.extend(x.iter().cloned());
            out.extend(y.iter().cloned());
            Ok(Value::tuple(out))
        }
        (Value::List(l), n @ (Value::Int(_) | Value::Bool(_)))
        | (n @ (Value::Int(_) | Value::Bool(_)), Value::List(l))
            if op == BinOp::Mul =>
        {
            Ok(Value::list(repeat(&l.borrow(), n)?))
        }
        (Value::Tuple(t), n @ (Value::Int(_) | Value::Bool(_)))
        | (n @ (Value::Int(_) | Value::Bool(_)), Value::Tuple(t))
            if op == BinOp::Mul =>
        {
            Ok(Value::tuple(repeat(t, n)?))
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            let out: IndexMap<_, _> = match op {
                BinOp::BitOr => {
                    x.iter().chain(y.iter()).map(|(k, v)| (k.clone(), v.clone())).collect()
                }
                BinOp::BitAnd => x
                    .iter()
                    .filter(|(k, _)| y.contains_key(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                BinOp::Sub => x
                    .iter()
                    .filter(|(k, _)| !y.contains_key(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                BinOp::BitXor => x
                    .iter()
                    .filter(|(k, _)| !y.contains_key(*k))
                    .chain(y.iter().filter(|(k, _)| !x.contains_key(*k)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                _ => return Err(unsupported(op, a, b)),
            };
            Ok(Value::Set(shared(out)))
        }
        (Value::Dict(x), Value::Dict(y)) if op == BinOp::BitOr => {
            let mut out = x.borrow().clone();
            for (k, v) in y.borrow().items() {
                out.insert(k, v)?;
            }
            Ok(Value::dict(out))
        }
        _ => temporal_binary(op, a, b).ok_or_else(|| unsupported(op, a, b))?,
    }
}

fn repeat_count(n: &Value) -> usize {
    n.as_i64().unwrap_or_default().max(0) as usize
}

fn repeat(items: &[Value], n: &Value) -> Eval<Vec<Value>> {
    let times = if items.is_empty() { 0 } else { repeat_count(n) };
    let mut out = Vec::with_capacity(alloc_len(items.len(), times)?);
    for _ in 0..times {
        out.extend(items.iter().cloned());
    }
    Ok(out)
}

/// Integer arithmetic; overflow falls back to float.
fn int_binary(op: BinOp, x: i64, y: i64) -> Option<Eval<Value>> {
    Some(Ok(match op {
        BinOp::Add => promote(x.checked_add(y), x as f64 + y as f64),
        BinOp::Sub => promote(x.checked_sub(y), x as f64 - y as f64),
        BinOp::Mul => promote(x.checked_mul(y), x as f64 * y as f64),
        BinOp::Div => {
            if y == 0 {
                return Some(Err(Fault::zero_division("division by zero")));
            }
            Value::Float(x as f64 / y as f64)
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Some(Err(Fault::zero_division("integer division or modulo by zero")));
            }
            promote(x.checked_div(y).map(|_| floor_div(x, y)), (x as f64 / y as f64).floor())
        }
        BinOp::Mod => {
            if y == 0 {
                return Some(Err(Fault::zero_division("integer division or modulo by zero")));
            }
            Value::Int(py_mod(x, y))
        }
        BinOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Some(Err(Fault::zero_division(
                        "0.0 cannot be raised to a negative power",
                    )));
                }
                Value::Float((x as f64).powf(y as f64))
            } else {
                let exp = u32::try_from(y).ok();
                promote(exp.and_then(|e| x.checked_pow(e)), (x as f64).powf(y as f64))
            }
        }
        BinOp::BitAnd => Value::Int(x & y),
        BinOp::BitOr => Value::Int(x | y),
        BinOp::BitXor => Value::Int(x ^ y),
        BinOp::LShift => {
            if y < 0 {
                return Some(Err(Fault::value_error("negative shift count")));
            }
            promote(
                u32::try_from(y)
                    .ok()
                    .and_then(|s| x.checked_shl(s))
                    .filter(|r| r >> y.min(63) == x),
                x as f64 * 2f64.powf(y as f64),
            )
        }
        BinOp::RShift => {
            if y < 0 {
                return Some(Err(Fault::value_error("negative shift count")));
            }
            Value::Int(x >> y.min(63))
        }
        BinOp::MatMul => return None,
    }))
}

fn promote(checked: Option<i64>, approx: f64) -> Value {
    checked.map(Value::Int).unwrap_or(Value::Float(approx))
}

pub fn floor_div(x: i64, y: i64) -> i64 {
    let q = x.wrapping_div(y);
    if x.wrapping_rem(y) != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q }
}

pub fn py_mod(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }
}

pub fn py_fmod(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }
}

fn float_binary(op: BinOp, x: f64, y: f64) -> Option<Eval<Value>> {
    Some(Ok(Value::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Some(Err(Fault::zero_division("float division by zero")));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Some(Err(Fault::zero_division("float floor division by zero")));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Some(Err(Fault::zero_division("float modulo by zero")));
            }
            py_fmod(x, y)
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Some(Err(Fault::zero_division(
                    "0.0 cannot be raised to a negative power",
                )));
            }
            x.powf(y)
        }
        _ => return None,
    })))
}

fn temporal_binary(op: BinOp, a: &Value, b: &Value) -> Option<Eval<Value>> {
    let shifted = |r: Option<Value>| {
        Some(r.ok_or_else(|| Fault::new("OverflowError", "date value out of range")))
    };
    match (a, b, op) {
        (Value::Date(d), Value::TimeDelta(t), BinOp::Add)
        | (Value::TimeDelta(t), Value::Date(d), BinOp::Add) => {
            shifted(d.checked_add_signed(TimeDelta::days(t.num_days())).map(Value::Date))
        }
        (Value::Date(d), Value::TimeDelta(t), BinOp::Sub) => {
            shifted(d.checked_sub_signed(TimeDelta::days(t.num_days())).map(Value::Date))
        }
        (Value::DateTime(d), Value::TimeDelta(t), BinOp::Add)
        | (Value::TimeDelta(t), Value::DateTime(d), BinOp::Add) => {
            shifted(d.checked_add_signed(*t).map(Value::DateTime))
        }
        (Value::DateTime(d), Value::TimeDelta(t), BinOp::Sub) => {
            shifted(d.checked_sub_signed(*t).map(Value::DateTime))
        }
        (Value::Date(x), Value::Date(y), BinOp::Sub) => {
            Some(Ok(Value::TimeDelta(x.signed_duration_since(*y))))
        }
        (Value::DateTime(x), Value::DateTime(y), BinOp::Sub) => {
            Some(Ok(Value::TimeDelta(x.signed_duration_since(*y))))
        }
        (Value::TimeDelta(x), Value::TimeDelta(y), BinOp::Add) => {
            Some(Ok(Value::TimeDelta(*x + *y)))
        }
        (Value::TimeDelta(x), Value::TimeDelta(y), BinOp::Sub) => {
            Some(Ok(Value::TimeDelta(*x - *y)))
        }
        (Value::TimeDelta(x), Value::TimeDelta(y), BinOp::Div) => {
            let denom = y.num_milliseconds();
            if denom == 0 {
                return Some(Err(Fault::zero_division("division by zero")));
            }
            Some(Ok(Value::Float(x.num_milliseconds() as f64 / denom as f64)))
        }
        (Value::TimeDelta(t), Value::Int(n), BinOp::Mul)
        | (Value::Int(n), Value::TimeDelta(t), BinOp::Mul) => {
            let n = i32::try_from(*n).ok()?;
            shifted(t.checked_mul(n).map(Value::TimeDelta))
        }
        _ => None,
    }
}

pub fn compare(op: CmpOp, a: &Value, b: &Value) -> Eval<Value> {
    let elementwise = matches!(
        op,
        CmpOp::Eq | CmpOp::NotEq | CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE
    );
    if elementwise && (is_tabular(a) || is_tabular(b)) {
        return pandas::broadcast_compare(op, a, b);
    }
    Ok(Value::Bool(match op {
        CmpOp::Eq => py_eq(a, b),
        CmpOp::NotEq => !py_eq(a, b),
        CmpOp::Lt => ordering(a, b, "<")?.is_some_and(|o| o.is_lt()),
        CmpOp::LtE => ordering(a, b, "<=")?.is_some_and(|o| o.is_le()),
        CmpOp::Gt => ordering(a, b, ">")?.is_some_and(|o| o.is_gt()),
        CmpOp::GtE => ordering(a, b, ">=")?.is_some_and(|o| o.is_ge()),
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => a.is(b),
        CmpOp::IsNot => !a.is(b),
    }))
}

fn ordering(a: &Value, b: &Value, symbol: &str) -> Eval<Option<std::cmp::Ordering>> {
    py_partial_cmp(a, b).map_err(|_| {
        Fault::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            a.type_name(),
            b.type_name()
        ))
    })
}

pub fn unary(op: UnaryOp, v: &Value) -> Eval<Value> {
    if is_tabular(v) && op != UnaryOp::Not {
        return pandas::broadcast_unary(op, v);
    }
    let bad = || {
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not",
        };
        Fault::type_error(format!("bad operand type for unary {}: '{}'", symbol, v.type_name()))
    };
    Ok(match (op, v) {
        (UnaryOp::Not, other) => Value::Bool(!other.truth()?),
        (UnaryOp::Neg, Value::Int(i)) => {
            i.checked_neg().map(Value::Int).unwrap_or(Value::Float(-(*i as f64)))
        }
        (UnaryOp::Neg, Value::Bool(b)) => Value::Int(-(*b as i64)),
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnaryOp::Neg, Value::TimeDelta(t)) => Value::TimeDelta(-*t),
        (UnaryOp::Pos, Value::Bool(b)) => Value::Int(*b as i64),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_) | Value::TimeDelta(_))) => v.clone(),
        (UnaryOp::Invert, Value::Int(i)) => Value::Int(!i),
        (UnaryOp::Invert, Value::Bool(b)) => Value::Int(!(*b as i64)),
        _ => return Err(bad()),
    })
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> Eval<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| py_eq(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| py_eq(v, item))),
        Value::Dict(dict) => dict.borrow().contains(item),
        Value::Set(set) => Ok(set.borrow().contains_key(&item.hash_key()?)),
        Value::Range(start, stop, step) => Ok(match item.as_i64() {
            Some(i) => {
                let offset = i - start;
                let len = range_len(*start, *stop, *step);
                offset % step == 0 && (0..len).contains(&(offset / step))
            }
            None => false,
        }),
        Value::Series(series) => {
            let label = Scalar::from_value(item)?;
            Ok(series.index.position(&label).is_some())
        }
        Value::Frame(frame) => Ok(match item {
            Value::Str(name) => frame.borrow().position(name).is_some(),
            _ => false,
        }),
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_floor_division_and_modulo_follow_sign_of_divisor() {
        assert_eq!(binary(BinOp::FloorDiv, &int(-7), &int(2)).unwrap().repr(), "-4");
        assert_eq!(binary(BinOp::Mod, &int(-7), &int(2)).unwrap().repr(), "1");
        assert_eq!(binary(BinOp::Mod, &int(7), &int(-2)).unwrap().repr(), "-1");
        assert_eq!(binary(BinOp::Mod, &Value::Float(-7.5), &int(2)).unwrap().repr(), "0.5");
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary(BinOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert!(binary(BinOp::Mod, &Value::Float(1.0), &Value::Float(0.0)).is_err());
    }

    #[test]
    fn test_overflow_promotes_to_float() {
        let v = binary(BinOp::Mul, &int(i64::MAX), &int(2)).unwrap();
        assert!(matches!(v, Value::Float(_)));
        assert_eq!(binary(BinOp::Pow, &int(2), &int(10)).unwrap().repr(), "1024");
        assert_eq!(binary(BinOp::Pow, &int(2), &int(-1)).unwrap().repr(), "0.5");
        let big = binary(BinOp::Pow, &int(2), &int(100)).unwrap();
        assert_eq!(big.repr(), "1.2676506002282294e+30");
        let wrapped = binary(BinOp::FloorDiv, &int(i64::MIN), &int(-1)).unwrap();
        assert_eq!(wrapped.repr(), "9.223372036854776e+18");
        assert_eq!(binary(BinOp::Mod, &int(i64::MIN), &int(-1)).unwrap().repr(), "0");
    }

    #[test]
    fn test_oversized_repeat_is_memory_error() {
        let err = binary(BinOp::Mul, &Value::str("a"), &int(100_000_000_000)).unwrap_err();
        assert_eq!(err.kind, "MemoryError");
        assert!(err.matches("Exception"));

        let big = binary(BinOp::Mul, &Value::list(vec![int(0)]), &int(1_000_000)).unwrap();
        let err = binary(BinOp::Mul, &big, &int(100_000)).unwrap_err();
        assert_eq!(err.kind, "MemoryError");
        let pair = Value::tuple(vec![int(1), int(2)]);
        let err = binary(BinOp::Mul, &int(i64::MAX), &pair).unwrap_err();
        assert_eq!(err.kind, "MemoryError");

        let empty = binary(BinOp::Mul, &Value::list(Vec::new()), &int(i64::MAX)).unwrap();
        assert_eq!(empty.repr(), "[]");
        assert_eq!(binary(BinOp::Mul, &Value::str("ab"), &int(-3)).unwrap().repr(), "''");
    }

    #[test]
    fn test_sequence_operators() {
        let joined = binary(BinOp::Add, &Value::str("ab"), &Value::str("cd")).unwrap();
        assert_eq!(joined.repr(), "'abcd'");
        let repeated = binary(BinOp::Mul, &Value::list(vec![int(1)]), &int(3)).unwrap();
        assert_eq!(repeated.repr(), "[1, 1, 1]");
        assert!(binary(BinOp::Add, &Value::str("a"), &int(1)).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Lt, &int(1), &Value::Float(1.5)).unwrap().truthy());
        assert!(compare(CmpOp::In, &Value::str("b"), &Value::str("abc")).unwrap().truthy());
        assert!(compare(CmpOp::NotIn, &int(4), &Value::Range(0, 10, 3)).unwrap().truthy());
        assert!(compare(CmpOp::In, &int(9), &Value::Range(0, 10, 3)).unwrap().truthy());
        let err = compare(CmpOp::Lt, &int(1), &Value::str("a")).unwrap_err();
        assert_eq!(err.message, "'<' not supported between instances of 'int' and 'str'");
    }

    #[test]
    fn test_bool_bitwise_stays_bool() {
        let v = binary(BinOp::BitAnd, &Value::Bool(true), &Value::Bool(false)).unwrap();
        assert_eq!(v.repr(), "False");
    }
}
