//! Runtime values.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use indexmap::IndexMap;

use super::ast::FunctionDef;
use super::error::{Eval, Fault};
use super::eval::Scope;
use super::frame::{DataFrame, GroupBy, Series};
use super::plot::{Chart, Figure};
use super::modules::Profile;

pub type Shared<T> = Rc<RefCell<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Nesting depth past which rendering gives up (self-referencing containers).
const MAX_RENDER_DEPTH: usize = 48;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Shared<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Shared<Dict>),
    Set(Shared<IndexMap<HashKey, Value>>),
    Range(i64, i64, i64),
    Slice(Option<i64>, Option<i64>, Option<i64>),
    Function(Rc<Closure>),
    Builtin(&'static Builtin),
    Method(Rc<Method>),
    Module(Rc<Module>),
    Class(Rc<str>),
    Exception(Rc<Fault>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    TimeDelta(TimeDelta),
    Series(Rc<Series>),
    Frame(Shared<DataFrame>),
    GroupBy(Rc<GroupBy>),
    Indexer(Rc<Indexer>),
    Figure(Shared<Figure>),
    Axes(Shared<Figure>, usize),
    Chart(Shared<Chart>),
    Profile(Rc<Profile>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.type_name(), self.repr())
    }
}

pub type BuiltinFn = fn(&mut super::eval::Interpreter, Args) -> Eval<Value>;

/// A named native function from the builtin or module tables.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
    pub scope: Rc<Scope>,
}

/// `receiver.name`, resolved at call time.
pub struct Method {
    pub receiver: Value,
    pub name: Rc<str>,
}

pub struct Module {
    pub name: String,
    pub attrs: IndexMap<String, Value>,
}

/// Accessor objects such as `df.iloc` or `s.str`.
pub enum Indexer {
    ILoc(Value),
    Loc(Value),
    Str(Rc<Series>),
    Dt(Rc<Series>),
    Plot(Value),
}

/// Call arguments after `*`/`**` expansion.
#[derive(Default)]
pub struct Args {
    pub pos: Vec<Value>,
    pub kw: Vec<(String, Value)>,
}

impl Args {
    pub fn new(pos: Vec<Value>) -> Self {
        Self { pos, kw: Vec::new() }
    }

    pub fn kw(&self, name: &str) -> Option<&Value> {
        self.kw.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Positional argument `index`, or keyword `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.pos.get(index).or_else(|| self.kw(name))
    }

    pub fn required(&self, index: usize, name: &str, func: &str) -> Eval<&Value> {
        self.get(index, name).ok_or_else(|| {
            Fault::type_error(format!("{}() missing required argument '{}'", func, name))
        })
    }

    /// Positional or keyword argument, treating `None` as absent.
    pub fn opt(&self, index: usize, name: &str) -> Option<&Value> {
        self.get(index, name).filter(|v| !matches!(v, Value::None))
    }

    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.kw(name).map(|v| v.truthy()).unwrap_or(default)
    }
}

/// Insertion-ordered mapping with Python key semantics.
#[derive(Clone, Default)]
pub struct Dict {
    entries: IndexMap<HashKey, (Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Eval<Option<Value>> {
        Ok(self.entries.get(&key.hash_key()?).map(|(_, v)| v.clone()))
    }

    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.entries.get(&HashKey::Str(Rc::from(key))).map(|(_, v)| v.clone())
    }

    pub fn contains(&self, key: &Value) -> Eval<bool> {
        Ok(self.entries.contains_key(&key.hash_key()?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Eval<()> {
        let hk = key.hash_key()?;
        match self.entries.get_mut(&hk) {
            Some(slot) => slot.1 = value,
            None => {
                self.entries.insert(hk, (key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Eval<Option<Value>> {
        Ok(self.entries.shift_remove(&key.hash_key()?).map(|(_, v)| v))
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        self.entries.pop().map(|(_, kv)| kv)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.values().cloned().collect()
    }
}

/// Hashable projection of a value. Equal numbers hash equally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Class(Rc<str>),
    Ptr(usize),
}

fn float_key(f: f64) -> HashKey {
    if f.fract() == 0.0 && f.abs() < 9.2e18 {
        HashKey::Int(f as i64)
    } else {
        HashKey::Float(f.to_bits())
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(shared(items))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(shared(dict))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Range(..) => "range",
            Value::Slice(..) => "slice",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Method(_) => "method",
            Value::Module(_) => "module",
            Value::Class(_) => "type",
            Value::Exception(_) => "Exception",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::TimeDelta(_) => "timedelta",
            Value::Series(s) if s.is_array => "ndarray",
            Value::Series(_) => "Series",
            Value::Frame(_) => "DataFrame",
            Value::GroupBy(_) => "DataFrameGroupBy",
            Value::Indexer(_) => "_Indexer",
            Value::Figure(_) => "Figure",
            Value::Axes(..) => "Axes",
            Value::Chart(_) => "Figure",
            Value::Profile(_) => "ProfileReport",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::Range(start, stop, step) => range_len(*start, *stop, *step) > 0,
            Value::TimeDelta(d) => !d.is_zero(),
            _ => true,
        }
    }

    /// Truthiness that refuses ambiguous pandas objects.
    pub fn truth(&self) -> Eval<bool> {
        match self {
            Value::Series(_) | Value::Frame(_) => Err(Fault::value_error(format!(
                "The truth value of a {} is ambiguous. \
                 Use a.empty, a.bool(), a.item(), a.any() or a.all().",
                self.type_name()
            ))),
            other => Ok(other.truthy()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn expect_int(&self, what: &str) -> Eval<i64> {
        self.as_i64().ok_or_else(|| {
            Fault::type_error(format!("{} must be an integer, not '{}'", what, self.type_name()))
        })
    }

    pub fn expect_f64(&self, what: &str) -> Eval<f64> {
        self.as_f64().ok_or_else(|| {
            Fault::type_error(format!("{} must be a real number, not '{}'", what, self.type_name()))
        })
    }

    pub fn expect_str(&self, what: &str) -> Eval<Rc<str>> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            other => Err(Fault::type_error(format!(
                "{} must be str, not '{}'",
                what,
                other.type_name()
            ))),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Value::Module(_))
    }

    fn ptr(&self) -> usize {
        match self {
            Value::List(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Dict(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Set(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Function(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Builtin(b) => *b as *const Builtin as usize,
            Value::Method(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Module(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Exception(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Series(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Frame(r) => Rc::as_ptr(r) as *const () as usize,
            Value::GroupBy(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Indexer(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Figure(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Axes(r, panel) => Rc::as_ptr(r) as *const () as usize + panel,
            Value::Chart(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Profile(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Tuple(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Str(s) => s.as_ptr() as usize,
            _ => 0,
        }
    }

    pub fn hash_key(&self) -> Eval<HashKey> {
        Ok(match self {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) => float_key(*f),
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Tuple(items) => {
                HashKey::Tuple(items.iter().map(Value::hash_key).collect::<Eval<_>>()?)
            }
            Value::Date(d) => HashKey::Date(*d),
            Value::DateTime(d) => HashKey::DateTime(*d),
            Value::Class(name) => HashKey::Class(name.clone()),
            Value::List(_)
            | Value::Dict(_)
            | Value::Set(_)
            | Value::Series(_)
            | Value::Frame(_) => {
                return Err(Fault::type_error(format!("unhashable type: '{}'", self.type_name())));
            }
            other => HashKey::Ptr(other.ptr()),
        })
    }

    /// `is` identity.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (a, b) if a.ptr() != 0 => a.ptr() == b.ptr() && a.type_name() == b.type_name(),
            _ => false,
        }
    }

    /// `str(x)`; containers fall back to a placeholder when nested too deep.
    pub fn to_str(&self) -> String {
        self.try_str().unwrap_or_else(|| "[...]".to_string())
    }

    pub fn repr(&self) -> String {
        self.try_repr().unwrap_or_else(|| "[...]".to_string())
    }

    pub fn try_str(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.to_string()),
            Value::Exception(fault) => Some(fault.message.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(d) => Some(d.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::TimeDelta(d) => Some(timedelta_str(d)),
            other => other.try_repr(),
        }
    }

    pub fn try_repr(&self) -> Option<String> {
        let mut out = String::new();
        self.render_repr(&mut out, 0).then_some(out)
    }

    fn render_repr(&self, out: &mut String, depth: usize) -> bool {
        if depth > MAX_RENDER_DEPTH {
            return false;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Value::Float(f) => out.push_str(&float_repr(*f)),
            Value::Str(s) => out.push_str(&str_repr(s)),
            Value::List(items) => {
                let Ok(items) = items.try_borrow() else {
                    return false;
                };
                return render_seq(out, "[", "]", &items, depth);
            }
            Value::Tuple(items) => {
                if items.len() == 1 {
                    out.push('(');
                    if !items[0].render_repr(out, depth + 1) {
                        return false;
                    }
                    out.push_str(",)");
                } else {
                    return render_seq(out, "(", ")", items, depth);
                }
            }
            Value::Dict(dict) => {
                let Ok(dict) = dict.try_borrow() else {
                    return false;
                };
                out.push('{');
                for (i, (k, v)) in dict.items().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if !k.render_repr(out, depth + 1) {
                        return false;
                    }
                    out.push_str(": ");
                    if !v.render_repr(out, depth + 1) {
                        return false;
                    }
                }
                out.push('}');
            }
            Value::Set(set) => {
                let Ok(set) = set.try_borrow() else {
                    return false;
                };
                if set.is_empty() {
                    out.push_str("set()");
                } else {
                    let items: Vec<Value> = set.values().cloned().collect();
                    return render_seq(out, "{", "}", &items, depth);
                }
            }
            Value::Range(start, stop, step) => {
                if *step == 1 {
                    let _ = write!(out, "range({}, {})", start, stop);
                } else {
                    let _ = write!(out, "range({}, {}, {})", start, stop, step);
                }
            }
            Value::Slice(a, b, c) => {
                let part = |p: &Option<i64>| {
                    p.map(|v| v.to_string()).unwrap_or_else(|| "None".into())
                };
                let _ = write!(out, "slice({}, {}, {})", part(a), part(b), part(c));
            }
            Value::Function(c) => {
                let _ = write!(out, "<function {}>", c.def.name);
            }
            Value::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name);
            }
            Value::Method(m) => {
                let _ = write!(out, "<bound method {}.{}>", m.receiver.type_name(), m.name);
            }
            Value::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name);
            }
            Value::Class(name) => {
                let _ = write!(out, "<class '{}'>", name);
            }
            Value::Exception(f) => {
                let _ = write!(out, "{}({})", f.kind, str_repr(&f.message));
            }
            Value::Date(d) => {
                let _ = write!(
                    out,
                    "datetime.date({}, {}, {})",
                    d.format("%Y"),
                    d.format("%-m"),
                    d.format("%-d")
                );
            }
            Value::DateTime(d) => {
                let _ = write!(out, "Timestamp('{}')", d.format("%Y-%m-%d %H:%M:%S"));
            }
            Value::TimeDelta(d) => {
                let _ = write!(out, "datetime.timedelta(seconds={})", d.num_seconds());
            }
            Value::Series(s) => out.push_str(&s.render()),
            Value::Frame(f) => {
                let Ok(frame) = f.try_borrow() else {
                    return false;
                };
                out.push_str(&frame.render());
            }
            Value::GroupBy(g) => {
                let _ = write!(out, "<DataFrameGroupBy by {:?}>", g.keys);
            }
            Value::Indexer(_) => out.push_str("<indexer>"),
            Value::Figure(f) => {
                let fig = f.borrow();
                let _ = write!(out, "Figure({}x{})", fig.width_px(), fig.height_px());
            }
            Value::Axes(f, panel) => {
                let fig = f.borrow();
                let title =
                    fig.panels.get(*panel).and_then(|p| p.title.clone()).unwrap_or_default();
                let _ = write!(out, "Axes(title={:?})", title);
            }
            Value::Chart(c) => {
                let _ = write!(out, "Figure(plotly {})", c.borrow().kind.name());
            }
            Value::Profile(p) => {
                let _ = write!(out, "ProfileReport(title={:?})", p.title);
            }
        }
        true
    }
}

fn render_seq(out: &mut String, open: &str, close: &str, items: &[Value], depth: usize) -> bool {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if !item.render_repr(out, depth + 1) {
            return false;
        }
    }
    out.push_str(close);
    true
}

pub fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / (-step)
    } else {
        0
    }
}

fn timedelta_str(d: &TimeDelta) -> String {
    let total = d.num_seconds();
    let days = total.div_euclid(86_400);
    let rest = total.rem_euclid(86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => clock,
        1 | -1 => format!("{} day, {}", days, clock),
        _ => format!("{} days, {}", days, clock),
    }
}

/// Python's `repr(float)`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0".into() } else { "0.0".into() };
    }
    let abs = f.abs();
    if !(1e-4..1e16).contains(&abs) {
        let sci = format!("{:e}", f);
        if let Some((mantissa, exp)) = sci.split_once('e') {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            return format!("{}e{}{:02}", mantissa, sign, exp.abs());
        }
        return sci;
    }
    let plain = format!("{}", f);
    if plain.contains('.') { plain } else { format!("{}.0", plain) }
}

/// Python's `repr(str)`.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// `==` with numeric cross-type equality.
pub fn py_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| py_eq(p, q))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| py_eq(p, q))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .items()
                    .iter()
                    .all(|(k, v)| matches!(y.get(k), Ok(Some(other)) if py_eq(v, &other)))
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.keys().all(|k| y.contains_key(k))
        }
        (Value::Range(a1, b1, c1), Value::Range(a2, b2, c2)) => (a1, b1, c1) == (a2, b2, c2),
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::DateTime(x), Value::DateTime(y)) => x == y,
        (Value::TimeDelta(x), Value::TimeDelta(y)) => x == y,
        (Value::Class(x), Value::Class(y)) => x == y,
        (Value::Class(x), Value::Builtin(b)) | (Value::Builtin(b), Value::Class(x)) => {
            &**x == b.name
        }
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(p), Some(q)) => p == q,
            _ => x.is(y),
        },
    }
}

/// Ordering for `<` and friends. `Ok(None)` means unordered (NaN).
pub fn py_partial_cmp(a: &Value, b: &Value) -> Eval<Option<Ordering>> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            seq_cmp(&x, &y)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_cmp(x, y),
        (Value::Date(x), Value::Date(y)) => Ok(Some(x.cmp(y))),
        (Value::DateTime(x), Value::DateTime(y)) => Ok(Some(x.cmp(y))),
        (Value::TimeDelta(x), Value::TimeDelta(y)) => Ok(Some(x.cmp(y))),
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(p), Some(q)) => match (x.as_i64(), y.as_i64()) {
                (Some(i), Some(j)) => Ok(Some(i.cmp(&j))),
                _ => Ok(p.partial_cmp(&q)),
            },
            _ => Err(Fault::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                x.type_name(),
                y.type_name()
            ))),
        },
    }
}

fn seq_cmp(x: &[Value], y: &[Value]) -> Eval<Option<Ordering>> {
    for (p, q) in x.iter().zip(y.iter()) {
        if !py_eq(p, q) {
            return py_partial_cmp(p, q);
        }
    }
    Ok(Some(x.len().cmp(&y.len())))
}

/// Total order for sorting; unordered pairs compare equal.
pub fn sort_cmp(a: &Value, b: &Value) -> Eval<Ordering> {
    Ok(py_partial_cmp(a, b)?.unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(2.0), "2.0");
        assert_eq!(float_repr(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(-3.25), "-3.25");
        assert_eq!(float_repr(f64::NAN), "nan");
    }

    #[test]
    fn test_str_repr_quotes() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
    }

    #[test]
    fn test_numeric_keys_collapse() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::str("int")).unwrap();
        dict.insert(Value::Float(1.0), Value::str("float")).unwrap();
        dict.insert(Value::Bool(true), Value::str("bool")).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&Value::Int(1)).unwrap().unwrap().to_str(), "bool");
    }

    #[test]
    fn test_list_is_unhashable() {
        let err = Value::list(vec![]).hash_key().unwrap_err();
        assert_eq!(err.kind, "TypeError");
    }

    #[test]
    fn test_container_repr() {
        let v = Value::list(vec![
            Value::Int(1),
            Value::str("a"),
            Value::tuple(vec![Value::Float(2.5)]),
            Value::None,
        ]);
        assert_eq!(v.repr(), "[1, 'a', (2.5,), None]");
    }

    #[test]
    fn test_self_referencing_list_is_unrenderable() {
        let list = shared(Vec::new());
        list.borrow_mut().push(Value::List(list.clone()));
        assert!(Value::List(list.clone()).try_str().is_none());
        list.borrow_mut().clear();
    }

    #[test]
    fn test_cross_type_equality_and_ordering() {
        assert!(py_eq(&Value::Int(2), &Value::Float(2.0)));
        assert!(!py_eq(&Value::Int(2), &Value::str("2")));
        assert_eq!(
            py_partial_cmp(&Value::Int(1), &Value::Float(1.5)).unwrap(),
            Some(Ordering::Less)
        );
        assert!(py_partial_cmp(&Value::Int(1), &Value::str("a")).is_err());
    }

    #[test]
    fn test_range_len() {
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -2), 5);
        assert_eq!(range_len(5, 5, 1), 0);
    }
}
