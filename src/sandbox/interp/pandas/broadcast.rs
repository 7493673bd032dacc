//! Elementwise operators between series, frames and scalars.

use std::collections::HashMap;

use super::super::ast::{BinOp, CmpOp, UnaryOp};
use super::super::error::{Eval, Fault};
use super::super::frame::{DataFrame, Index, Scalar, Series};
use super::super::ops;
use super::super::value::{HashKey, Value, py_eq, py_partial_cmp};
use super::{frame_value, series_value};

enum Operand {
    Series(Series),
    Frame(DataFrame),
    Scalar(Scalar),
}

fn operand(value: &Value) -> Eval<Operand> {
    Ok(match value {
        Value::Series(s) => Operand::Series((**s).clone()),
        Value::Frame(f) => Operand::Frame(f.borrow().clone()),
        Value::List(items) => {
            let values = items
                .borrow()
                .iter()
                .map(Scalar::from_value)
                .collect::<Eval<Vec<_>>>()?;
            Operand::Series(Series::array(values))
        }
        other => Operand::Scalar(Scalar::from_value(other).map_err(|_| {
            Fault::type_error(format!(
                "unsupported operand type for elementwise operation: '{}'",
                other.type_name()
            ))
        })?),
    })
}

/// Pairs two series: positionally when their labels agree, by label otherwise.
fn align(a: &Series, b: &Series) -> (Index, Vec<(Scalar, Scalar)>) {
    let same_labels = a.len() == b.len()
        && (a.is_array
            || b.is_array
            || a.index.labels.iter().zip(&b.index.labels).all(|(x, y)| x.same(y)));
    if same_labels {
        let pairs = a.values.iter().cloned().zip(b.values.iter().cloned()).collect();
        return (a.index.clone(), pairs);
    }
    let mut slots: HashMap<HashKey, usize> = HashMap::new();
    for (i, label) in b.index.labels.iter().enumerate() {
        slots.entry(label.key()).or_insert(i);
    }
    let mut labels = Vec::with_capacity(a.len());
    let mut pairs = Vec::with_capacity(a.len());
    let mut used: Vec<bool> = vec![false; b.len()];
    for (label, value) in a.index.labels.iter().zip(&a.values) {
        let other = match slots.get(&label.key()) {
            Some(&j) => {
                used[j] = true;
                b.values[j].clone()
            }
            None => Scalar::Null,
        };
        labels.push(label.clone());
        pairs.push((value.clone(), other));
    }
    for (j, label) in b.index.labels.iter().enumerate() {
        if !used[j] {
            labels.push(label.clone());
            pairs.push((Scalar::Null, b.values[j].clone()));
        }
    }
    (Index::named(a.index.names.first().cloned().flatten(), labels), pairs)
}

fn apply(a: &Value, b: &Value, f: impl Fn(&Scalar, &Scalar) -> Eval<Scalar>) -> Eval<Value> {
    match (operand(a)?, operand(b)?) {
        (Operand::Series(x), Operand::Series(y)) => {
            let (index, pairs) = align(&x, &y);
            let values = pairs.iter().map(|(p, q)| f(p, q)).collect::<Eval<Vec<_>>>()?;
            let name = if x.name == y.name { x.name.clone() } else { None };
            Ok(series_value(Series {
                name,
                index,
                values,
                is_array: x.is_array && y.is_array,
            }))
        }
        (Operand::Series(x), Operand::Scalar(s)) => {
            let values = x.values.iter().map(|v| f(v, &s)).collect::<Eval<Vec<_>>>()?;
            Ok(series_value(x.map_values(values)))
        }
        (Operand::Scalar(s), Operand::Series(y)) => {
            let values = y.values.iter().map(|v| f(&s, v)).collect::<Eval<Vec<_>>>()?;
            Ok(series_value(y.map_values(values)))
        }
        (Operand::Frame(x), Operand::Scalar(s)) => {
            let data = x
                .data
                .iter()
                .map(|col| col.iter().map(|v| f(v, &s)).collect::<Eval<Vec<_>>>())
                .collect::<Eval<Vec<_>>>()?;
            Ok(frame_value(DataFrame { data, ..x }))
        }
        (Operand::Scalar(s), Operand::Frame(y)) => {
            let data = y
                .data
                .iter()
                .map(|col| col.iter().map(|v| f(&s, v)).collect::<Eval<Vec<_>>>())
                .collect::<Eval<Vec<_>>>()?;
            Ok(frame_value(DataFrame { data, ..y }))
        }
        (Operand::Frame(x), Operand::Frame(y)) => {
            if x.len() != y.len() {
                return Err(Fault::value_error(
                    "Can only compare identically-labeled DataFrame objects",
                ));
            }
            let mut out = x.clone();
            for (c, name) in x.columns.iter().enumerate() {
                out.data[c] = match y.position(name) {
                    Some(p) => x.data[c]
                        .iter()
                        .zip(&y.data[p])
                        .map(|(p, q)| f(p, q))
                        .collect::<Eval<Vec<_>>>()?,
                    None => vec![Scalar::Null; x.len()],
                };
            }
            Ok(frame_value(out))
        }
        _ => Err(Fault::type_error(format!(
            "unsupported operand types: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn is_number(s: &Scalar) -> bool {
    matches!(s, Scalar::Int(_) | Scalar::Float(_) | Scalar::Bool(_))
}

fn logical(op: BinOp, x: &Scalar, y: &Scalar) -> Option<Scalar> {
    let truth = |s: &Scalar| match s {
        Scalar::Bool(b) => Some(*b),
        s if s.is_missing() => Some(false),
        _ => None,
    };
    if !matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) {
        return None;
    }
    if matches!((x, y), (Scalar::Int(_), Scalar::Int(_))) {
        return None;
    }
    let (p, q) = (truth(x)?, truth(y)?);
    Some(Scalar::Bool(match op {
        BinOp::BitAnd => p && q,
        BinOp::BitOr => p || q,
        _ => p ^ q,
    }))
}

/// One arithmetic step on cells. Missing propagates, division follows IEEE rules.
fn scalar_binary(op: BinOp, x: &Scalar, y: &Scalar) -> Eval<Scalar> {
    if let Some(result) = logical(op, x, y) {
        return Ok(result);
    }
    if x.is_missing() || y.is_missing() {
        return Ok(Scalar::Null);
    }
    if is_number(x) && is_number(y) {
        let (p, q) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
        let both_int = !matches!(x, Scalar::Float(_)) && !matches!(y, Scalar::Float(_));
        match op {
            BinOp::Div => return Ok(Scalar::Float(p / q)),
            BinOp::FloorDiv | BinOp::Mod if q == 0.0 => {
                return Ok(Scalar::Float(match op {
                    BinOp::FloorDiv if p != 0.0 => p / q,
                    _ => f64::NAN,
                }));
            }
            BinOp::FloorDiv if !both_int => return Ok(Scalar::Float((p / q).floor())),
            BinOp::Mod if !both_int => return Ok(Scalar::Float(ops::py_fmod(p, q))),
            _ => {}
        }
    }
    let result = ops::binary(op, &x.to_value(), &y.to_value())?;
    Scalar::from_value(&result)
}

pub fn broadcast_binary(op: BinOp, a: &Value, b: &Value) -> Eval<Value> {
    apply(a, b, |x, y| scalar_binary(op, x, y))
}

fn scalar_compare(op: CmpOp, x: &Scalar, y: &Scalar) -> Eval<Scalar> {
    if x.is_missing() || y.is_missing() {
        return Ok(Scalar::Bool(op == CmpOp::NotEq));
    }
    let (p, q) = (x.to_value(), y.to_value());
    let result = match op {
        CmpOp::Eq => py_eq(&p, &q),
        CmpOp::NotEq => !py_eq(&p, &q),
        _ => {
            let ord = py_partial_cmp(&p, &q).map_err(|_| {
                Fault::type_error(format!(
                    "Invalid comparison between dtype={} and {}",
                    p.type_name(),
                    q.type_name()
                ))
            })?;
            match (op, ord) {
                (_, None) => false,
                (CmpOp::Lt, Some(o)) => o.is_lt(),
                (CmpOp::LtE, Some(o)) => o.is_le(),
                (CmpOp::Gt, Some(o)) => o.is_gt(),
                (_, Some(o)) => o.is_ge(),
            }
        }
    };
    Ok(Scalar::Bool(result))
}

pub fn broadcast_compare(op: CmpOp, a: &Value, b: &Value) -> Eval<Value> {
    apply(a, b, |x, y| scalar_compare(op, x, y))
}

fn scalar_unary(op: UnaryOp, x: &Scalar) -> Eval<Scalar> {
    Ok(match (op, x) {
        (_, s) if s.is_missing() => Scalar::Null,
        (UnaryOp::Invert, Scalar::Bool(b)) => Scalar::Bool(!b),
        (UnaryOp::Neg, Scalar::Bool(_)) => {
            return Err(Fault::type_error(
                "The numpy boolean negative, the `-` operator, is not supported, \
                 use the `~` operator",
            ));
        }
        (op, s) => Scalar::from_value(&ops::unary(op, &s.to_value())?)?,
    })
}

pub fn broadcast_unary(op: UnaryOp, v: &Value) -> Eval<Value> {
    match v {
        Value::Series(s) => {
            let values = s.values.iter().map(|x| scalar_unary(op, x)).collect::<Eval<Vec<_>>>()?;
            Ok(series_value(s.map_values(values)))
        }
        Value::Frame(f) => {
            let frame = f.borrow().clone();
            let data = frame
                .data
                .iter()
                .map(|col| col.iter().map(|x| scalar_unary(op, x)).collect::<Eval<Vec<_>>>())
                .collect::<Eval<Vec<_>>>()?;
            Ok(frame_value(DataFrame { data, ..frame }))
        }
        other => ops::unary(op, other),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn series(values: Vec<Scalar>) -> Value {
        series_value(Series::new(Some("x".into()), values))
    }

    fn values_of(v: &Value) -> Vec<String> {
        match v {
            Value::Series(s) => s.values.iter().map(Scalar::display).collect(),
            other => panic!("expected series, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_series_scalar_arithmetic() {
        let s = series(vec![Scalar::Int(1), Scalar::Int(2), Scalar::Null]);
        let out = broadcast_binary(BinOp::Mul, &s, &Value::Int(10)).unwrap();
        assert_eq!(values_of(&out), vec!["10", "20", "NaN"]);
    }

    #[test]
    fn test_division_by_zero_is_ieee() {
        let s = series(vec![Scalar::Int(1), Scalar::Int(0)]);
        let out = broadcast_binary(BinOp::Div, &s, &Value::Int(0)).unwrap();
        match out {
            Value::Series(s) => {
                assert!(matches!(s.values[0], Scalar::Float(f) if f.is_infinite()));
                assert!(s.values[1].is_missing());
            }
            _ => panic!("expected series"),
        }
    }

    #[test]
    fn test_comparison_mask_and_logic() {
        let s = series(vec![Scalar::Int(1), Scalar::Int(5), Scalar::Null]);
        let big = broadcast_compare(CmpOp::Gt, &s, &Value::Int(2)).unwrap();
        assert_eq!(values_of(&big), vec!["False", "True", "False"]);
        let small = broadcast_compare(CmpOp::Lt, &s, &Value::Int(2)).unwrap();
        let either = broadcast_binary(BinOp::BitOr, &big, &small).unwrap();
        assert_eq!(values_of(&either), vec!["True", "True", "False"]);
        let inverted = broadcast_unary(UnaryOp::Invert, &big).unwrap();
        assert_eq!(values_of(&inverted), vec!["True", "False", "True"]);
    }

    #[test]
    fn test_alignment_by_label() {
        let a = series_value(Series::with_index(
            None,
            Index::named(None, vec![Scalar::Str(Rc::from("a")), Scalar::Str(Rc::from("b"))]),
            vec![Scalar::Int(1), Scalar::Int(2)],
        ));
        let b = series_value(Series::with_index(
            None,
            Index::named(None, vec![Scalar::Str(Rc::from("b")), Scalar::Str(Rc::from("c"))]),
            vec![Scalar::Int(10), Scalar::Int(20)],
        ));
        let out = broadcast_binary(BinOp::Add, &a, &b).unwrap();
        assert_eq!(values_of(&out), vec!["NaN", "12", "NaN"]);
    }

    #[test]
    fn test_string_concatenation() {
        let s = series(vec![Scalar::Str(Rc::from("a")), Scalar::Str(Rc::from("b"))]);
        let out = broadcast_binary(BinOp::Add, &s, &Value::str("!")).unwrap();
        assert_eq!(values_of(&out), vec!["a!", "b!"]);
    }
}
