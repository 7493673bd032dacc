//! Methods on the builtin scalar and container types.

use std::rc::Rc;

use indexmap::IndexMap;

use super::builtins::{index_of, sort_values};
use super::error::{Eval, Fault, alloc_len};
use super::eval::{Interpreter, no_attribute, seq_index};
use super::format::str_format;
use super::value::{Args, Dict, HashKey, Shared, Value, py_eq, shared};

fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

fn str_arg(args: &Args, index: usize, name: &str, func: &str) -> Eval<Rc<str>> {
    args.required(index, name, func)?
        .expect_str(&format!("{}() argument", func))
}

fn opt_str(args: &Args, index: usize, name: &str) -> Eval<Option<Rc<str>>> {
    match args.opt(index, name) {
        Some(v) => Ok(Some(v.expect_str(name)?)),
        None => Ok(None),
    }
}

fn pad_width(args: &Args, func: &str) -> Eval<usize> {
    let width = args.required(0, "width", func)?.expect_int("width")?.max(0) as usize;
    alloc_len(width, 1)
}

fn width_and_fill(args: &Args, func: &str) -> Eval<(usize, char)> {
    let width = pad_width(args, func)?;
    let fill = match opt_str(args, 1, "fillchar")? {
        Some(f) => {
            let mut chars = f.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(Fault::type_error(
                        "The fill character must be exactly one character long",
                    ));
                }
            }
        }
        None => ' ',
    };
    Ok((width, fill))
}

fn affix_matches(s: &str, args: &Args, func: &str, test: fn(&str, &str) -> bool) -> Eval<bool> {
    match args.required(0, "prefix", func)? {
        Value::Str(p) => Ok(test(s, p)),
        Value::Tuple(options) => {
            for option in options.iter() {
                if test(s, &option.expect_str(func)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(Fault::type_error(format!(
            "{} first arg must be str or a tuple of str, not {}",
            func,
            other.type_name()
        ))),
    }
}

fn split_whitespace(s: &str, maxsplit: i64, from_right: bool) -> Vec<Value> {
    let words: Vec<&str> = s.split_whitespace().collect();
    if maxsplit < 0 || words.len() as i64 <= maxsplit {
        return words.into_iter().map(Value::str).collect();
    }
    let keep = maxsplit as usize;
    if from_right {
        // Left remainder keeps its inner whitespace.
        let mut rest = s.trim_end();
        let mut tail = Vec::new();
        for _ in 0..keep {
            match rest.rfind(char::is_whitespace) {
                Some(pos) => {
                    tail.push(Value::str(rest[pos..].trim_start()));
                    rest = rest[..pos].trim_end();
                }
                None => break,
            }
        }
        let mut out = vec![Value::str(rest.trim_start())];
        out.extend(tail.into_iter().rev());
        out
    } else {
        let mut rest = s.trim_start();
        let mut out = Vec::new();
        for _ in 0..keep {
            match rest.find(char::is_whitespace) {
                Some(pos) => {
                    out.push(Value::str(&rest[..pos]));
                    rest = rest[pos..].trim_start();
                }
                None => break,
            }
        }
        out.push(Value::str(rest.trim_end()));
        out
    }
}

pub fn str_method(interp: &mut Interpreter, s: &Rc<str>, name: &str, args: Args) -> Eval<Value> {
    let text: &str = s;
    Ok(match name {
        "lower" => Value::str(&text.to_lowercase()),
        "upper" => Value::str(&text.to_uppercase()),
        "casefold" => Value::str(&text.to_lowercase()),
        "swapcase" => Value::str(
            &text
                .chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<String>()
                    } else {
                        c.to_uppercase().collect()
                    }
                })
                .collect::<String>(),
        ),
        "strip" | "lstrip" | "rstrip" => {
            let chars = opt_str(&args, 0, "chars")?;
            let pred = |c: char| match &chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            Value::str(match name {
                "strip" => text.trim_matches(pred),
                "lstrip" => text.trim_start_matches(pred),
                _ => text.trim_end_matches(pred),
            })
        }
        "split" | "rsplit" => {
            let sep = opt_str(&args, 0, "sep")?;
            let maxsplit = match args.get(1, "maxsplit") {
                Some(v) => v.expect_int("maxsplit")?,
                None => -1,
            };
            let parts = match sep {
                None => split_whitespace(text, maxsplit, name == "rsplit"),
                Some(sep) if sep.is_empty() => return Err(Fault::value_error("empty separator")),
                Some(sep) => {
                    let parts: Vec<&str> = match (maxsplit < 0, name == "rsplit") {
                        (true, _) => text.split(&*sep).collect(),
                        (false, false) => text.splitn(maxsplit as usize + 1, &*sep).collect(),
                        (false, true) => {
                            let mut p: Vec<&str> =
                                text.rsplitn(maxsplit as usize + 1, &*sep).collect();
                            p.reverse();
                            p
                        }
                    };
                    parts.into_iter().map(Value::str).collect()
                }
            };
            Value::list(parts)
        }
        "splitlines" => Value::list(text.lines().map(Value::str).collect()),
        "join" => {
            let items = interp.iterate(args.required(0, "iterable", "join")?)?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(p) => parts.push(p.to_string()),
                    other => {
                        return Err(Fault::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )));
                    }
                }
            }
            Value::str(&parts.join(text))
        }
        "replace" => {
            let old = str_arg(&args, 0, "old", "replace")?;
            let new = str_arg(&args, 1, "new", "replace")?;
            match args.get(2, "count").map(|c| c.expect_int("count")).transpose()? {
                Some(n) if n >= 0 => Value::str(&text.replacen(&*old, &new, n as usize)),
                _ => Value::str(&text.replace(&*old, &new)),
            }
        }
        "startswith" => {
            Value::Bool(affix_matches(text, &args, "startswith", |s, p| s.starts_with(p))?)
        }
        "endswith" => {
            Value::Bool(affix_matches(text, &args, "endswith", |s, p| s.ends_with(p))?)
        }
        "removeprefix" => {
            let p = str_arg(&args, 0, "prefix", "removeprefix")?;
            Value::str(text.strip_prefix(&*p).unwrap_or(text))
        }
        "removesuffix" => {
            let p = str_arg(&args, 0, "suffix", "removesuffix")?;
            Value::str(text.strip_suffix(&*p).unwrap_or(text))
        }
        "find" | "index" | "rfind" | "rindex" => {
            let sub = str_arg(&args, 0, "sub", name)?;
            let found = if name.starts_with('r') { text.rfind(&*sub) } else { text.find(&*sub) };
            match found {
                Some(byte) => Value::Int(char_index(text, byte)),
                None if name.ends_with("index") => {
                    return Err(Fault::value_error("substring not found"));
                }
                None => Value::Int(-1),
            }
        }
        "count" => {
            let sub = str_arg(&args, 0, "sub", "count")?;
            if sub.is_empty() {
                Value::Int(text.chars().count() as i64 + 1)
            } else {
                Value::Int(text.matches(&*sub).count() as i64)
            }
        }
        "format" => Value::str(&str_format(interp, text, &args)?),
        "title" => {
            let mut out = String::with_capacity(text.len());
            let mut prev_cased = false;
            for c in text.chars() {
                if prev_cased {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                prev_cased = c.is_alphabetic();
            }
            Value::str(&out)
        }
        "capitalize" => {
            let mut chars = text.chars();
            let out = match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.as_str().to_lowercase().chars())
                    .collect(),
                None => String::new(),
            };
            Value::str(&out)
        }
        "isdigit" | "isnumeric" | "isdecimal" => {
            let digits = text.chars().all(|c| c.is_ascii_digit() || c.is_numeric());
            Value::Bool(!text.is_empty() && digits)
        }
        "isalpha" => Value::Bool(!text.is_empty() && text.chars().all(char::is_alphabetic)),
        "isalnum" => Value::Bool(!text.is_empty() && text.chars().all(char::is_alphanumeric)),
        "isspace" => Value::Bool(!text.is_empty() && text.chars().all(char::is_whitespace)),
        "isupper" => Value::Bool(
            text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase),
        ),
        "islower" => Value::Bool(
            text.chars().any(char::is_lowercase) && !text.chars().any(char::is_uppercase),
        ),
        "zfill" => {
            let width = pad_width(&args, "zfill")?;
            let len = text.chars().count();
            if len >= width {
                Value::Str(s.clone())
            } else {
                let (sign, digits) = match text.chars().next() {
                    Some(c @ ('+' | '-')) => (c.to_string(), &text[1..]),
                    _ => (String::new(), text),
                };
                Value::str(&format!("{}{}{}", sign, "0".repeat(width - len), digits))
            }
        }
        "center" | "ljust" | "rjust" => {
            let (width, fill) = width_and_fill(&args, name)?;
            let len = text.chars().count();
            if len >= width {
                Value::Str(s.clone())
            } else {
                let gap = width - len;
                let run = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
                Value::str(&match name {
                    "ljust" => format!("{}{}", text, run(gap)),
                    "rjust" => format!("{}{}", run(gap), text),
                    _ => {
                        let left = gap / 2 + (gap & width & 1);
                        format!("{}{}{}", run(left), text, run(gap - left))
                    }
                })
            }
        }
        "partition" | "rpartition" => {
            let sep = str_arg(&args, 0, "sep", name)?;
            let found = if name == "partition" { text.find(&*sep) } else { text.rfind(&*sep) };
            let parts = match found {
                Some(i) => [&text[..i], &*sep, &text[i + sep.len()..]],
                None if name == "partition" => [text, "", ""],
                None => ["", "", text],
            };
            Value::tuple(parts.iter().map(|p| Value::str(p)).collect())
        }
        "encode" => Value::Str(s.clone()),
        _ => return Err(no_attribute(&Value::Str(s.clone()), name)),
    })
}

pub fn list_method(
    interp: &mut Interpreter,
    list: &Shared<Vec<Value>>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    match name {
        "append" => {
            let item = args.required(0, "object", "append")?.clone();
            list.borrow_mut().push(item);
        }
        "extend" => {
            let items = interp.iterate(args.required(0, "iterable", "extend")?)?;
            list.borrow_mut().extend(items);
        }
        "insert" => {
            let index = args.required(0, "index", "insert")?.expect_int("index")?;
            let item = args.required(1, "object", "insert")?.clone();
            let mut list = list.borrow_mut();
            let len = list.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            list.insert(at as usize, item);
        }
        "pop" => {
            let mut list = list.borrow_mut();
            if list.is_empty() {
                return Err(Fault::index_error("pop from empty list"));
            }
            let index = match args.get(0, "index") {
                Some(v) => seq_index(v, list.len(), "pop")?,
                None => list.len() - 1,
            };
            return Ok(list.remove(index));
        }
        "remove" => {
            let item = args.required(0, "value", "remove")?;
            let pos = index_of(&list.borrow(), item)
                .ok_or_else(|| Fault::value_error("list.remove(x): x not in list"))?;
            list.borrow_mut().remove(pos);
        }
        "index" => {
            let item = args.required(0, "value", "index")?;
            let pos = index_of(&list.borrow(), item)
                .ok_or_else(|| Fault::value_error(format!("{} is not in list", item.repr())))?;
            return Ok(Value::Int(pos as i64));
        }
        "count" => {
            let item = args.required(0, "value", "count")?;
            return Ok(Value::Int(list.borrow().iter().filter(|v| py_eq(v, item)).count() as i64));
        }
        "sort" => {
            let items = list.borrow().clone();
            let key = args.kw("key").filter(|k| !k.is_none()).cloned();
            let sorted = sort_values(interp, items, key.as_ref(), args.flag("reverse", false))?;
            *list.borrow_mut() = sorted;
        }
        "reverse" => list.borrow_mut().reverse(),
        "copy" => return Ok(Value::list(list.borrow().clone())),
        "clear" => list.borrow_mut().clear(),
        _ => return Err(no_attribute(&Value::List(list.clone()), name)),
    }
    Ok(Value::None)
}

pub fn dict_method(
    interp: &mut Interpreter,
    dict: &Shared<Dict>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    Ok(match name {
        "get" => {
            let key = args.required(0, "key", "get")?;
            let found = dict.borrow().get(key)?;
            found.unwrap_or_else(|| args.get(1, "default").cloned().unwrap_or(Value::None))
        }
        "keys" => Value::list(dict.borrow().keys()),
        "values" => Value::list(dict.borrow().values()),
        "items" => Value::list(
            dict.borrow()
                .items()
                .into_iter()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .collect(),
        ),
        "pop" => {
            let key = args.required(0, "key", "pop")?;
            let removed = dict.borrow_mut().remove(key)?;
            match (removed, args.get(1, "default")) {
                (Some(v), _) => v,
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(Fault::key_error(key.repr())),
            }
        }
        "popitem" => {
            let (k, v) = dict
                .borrow_mut()
                .pop_last()
                .ok_or_else(|| Fault::key_error("'popitem(): dictionary is empty'"))?;
            Value::tuple(vec![k, v])
        }
        "setdefault" => {
            let key = args.required(0, "key", "setdefault")?;
            let existing = dict.borrow().get(key)?;
            match existing {
                Some(v) => v,
                None => {
                    let default = args.get(1, "default").cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(key.clone(), default.clone())?;
                    default
                }
            }
        }
        "update" => {
            let mut pairs = Vec::new();
            match args.pos.first() {
                Some(Value::Dict(other)) => pairs.extend(other.borrow().items()),
                Some(other) => {
                    for pair in interp.iterate(other)? {
                        let kv = interp.iterate(&pair)?;
                        if kv.len() != 2 {
                            return Err(Fault::value_error(format!(
                                "dictionary update sequence element has length {}; 2 is required",
                                kv.len()
                            )));
                        }
                        pairs.push((kv[0].clone(), kv[1].clone()));
                    }
                }
                None => {}
            }
            for (k, v) in &args.kw {
                pairs.push((Value::str(k), v.clone()));
            }
            let mut dict = dict.borrow_mut();
            for (k, v) in pairs {
                dict.insert(k, v)?;
            }
            Value::None
        }
        "copy" => Value::dict(dict.borrow().clone()),
        "clear" => {
            dict.borrow_mut().clear();
            Value::None
        }
        _ => return Err(no_attribute(&Value::Dict(dict.clone()), name)),
    })
}

type SetMap = IndexMap<HashKey, Value>;

fn set_operand(interp: &mut Interpreter, value: &Value) -> Eval<SetMap> {
    if let Value::Set(s) = value {
        return Ok(s.borrow().clone());
    }
    let mut out = SetMap::new();
    for item in interp.iterate(value)? {
        out.entry(item.hash_key()?).or_insert(item);
    }
    Ok(out)
}

pub fn set_method(
    interp: &mut Interpreter,
    set: &Shared<SetMap>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    let mut others = Vec::with_capacity(args.pos.len());
    if matches!(
        name,
        "union"
            | "intersection"
            | "difference"
            | "symmetric_difference"
            | "update"
            | "issubset"
            | "issuperset"
            | "isdisjoint"
    ) {
        for value in &args.pos {
            others.push(set_operand(interp, value)?);
        }
    }
    let wrap = |map: SetMap| Value::Set(shared(map));
    Ok(match name {
        "add" => {
            let item = args.required(0, "elem", "add")?.clone();
            set.borrow_mut().entry(item.hash_key()?).or_insert(item);
            Value::None
        }
        "remove" => {
            let item = args.required(0, "elem", "remove")?;
            if set.borrow_mut().shift_remove(&item.hash_key()?).is_none() {
                return Err(Fault::key_error(item.repr()));
            }
            Value::None
        }
        "discard" => {
            let item = args.required(0, "elem", "discard")?;
            set.borrow_mut().shift_remove(&item.hash_key()?);
            Value::None
        }
        "pop" => set
            .borrow_mut()
            .shift_remove_index(0)
            .map(|(_, v)| v)
            .ok_or_else(|| Fault::key_error("'pop from an empty set'"))?,
        "union" => {
            let mut out = set.borrow().clone();
            for other in others {
                for (k, v) in other {
                    out.entry(k).or_insert(v);
                }
            }
            wrap(out)
        }
        "update" => {
            let mut target = set.borrow_mut();
            for other in others {
                for (k, v) in other {
                    target.entry(k).or_insert(v);
                }
            }
            Value::None
        }
        "intersection" => {
            let mut out = set.borrow().clone();
            for other in &others {
                out.retain(|k, _| other.contains_key(k));
            }
            wrap(out)
        }
        "difference" => {
            let mut out = set.borrow().clone();
            for other in &others {
                out.retain(|k, _| !other.contains_key(k));
            }
            wrap(out)
        }
        "symmetric_difference" => {
            let mine = set.borrow().clone();
            let other = others.into_iter().next().unwrap_or_default();
            let mut out: SetMap = mine
                .iter()
                .filter(|(k, _)| !other.contains_key(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (k, v) in other {
                if !mine.contains_key(&k) {
                    out.insert(k, v);
                }
            }
            wrap(out)
        }
        "issubset" => {
            let other = others.into_iter().next().unwrap_or_default();
            Value::Bool(set.borrow().keys().all(|k| other.contains_key(k)))
        }
        "issuperset" => {
            let other = others.into_iter().next().unwrap_or_default();
            let mine = set.borrow();
            Value::Bool(other.keys().all(|k| mine.contains_key(k)))
        }
        "isdisjoint" => {
            let other = others.into_iter().next().unwrap_or_default();
            Value::Bool(!set.borrow().keys().any(|k| other.contains_key(k)))
        }
        "copy" => wrap(set.borrow().clone()),
        "clear" => {
            set.borrow_mut().clear();
            Value::None
        }
        _ => return Err(no_attribute(&Value::Set(set.clone()), name)),
    })
}

pub fn tuple_method(items: &Rc<Vec<Value>>, name: &str, args: Args) -> Eval<Value> {
    match name {
        "count" => {
            let item = args.required(0, "value", "count")?;
            Ok(Value::Int(items.iter().filter(|v| py_eq(v, item)).count() as i64))
        }
        "index" => {
            let item = args.required(0, "value", "index")?;
            index_of(items, item)
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| Fault::value_error("tuple.index(x): x not in tuple"))
        }
        _ => Err(no_attribute(&Value::Tuple(items.clone()), name)),
    }
}

pub fn number_method(receiver: &Value, name: &str, _args: Args) -> Eval<Value> {
    match (receiver, name) {
        (Value::Float(f), "is_integer") => Ok(Value::Bool(f.is_finite() && f.fract() == 0.0)),
        (Value::Int(i), "bit_length") => {
            Ok(Value::Int(64 - i.unsigned_abs().leading_zeros() as i64))
        }
        (Value::Int(_) | Value::Bool(_), "is_integer") => Ok(Value::Bool(true)),
        (Value::Float(_) | Value::Int(_), "conjugate") => Ok(receiver.clone()),
        _ => Err(no_attribute(receiver, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> String {
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000_000);
        interp.run(source).unwrap();
        interp
            .locals()
            .into_iter()
            .find(|(k, _)| k == "result")
            .map(|(_, v)| v.repr())
            .unwrap_or_default()
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval("result = '  a,b ,c '.strip().split(',')"), "['a', 'b ', 'c']");
        assert_eq!(eval("result = 'a b  c'.split(None, 1)"), "['a', 'b  c']");
        assert_eq!(eval("result = 'x-y-z'.rsplit('-', 1)"), "['x-y', 'z']");
        assert_eq!(eval("result = ', '.join(['a', 'b'])"), "'a, b'");
        assert_eq!(eval("result = 'hello world'.title()"), "'Hello World'");
        assert_eq!(eval("result = '42'.zfill(5)"), "'00042'");
        assert_eq!(eval("result = 'héllo'.find('l')"), "2");
        assert_eq!(eval("result = '{:.1f}%'.format(12.345)"), "'12.3%'");
    }

    #[test]
    fn test_oversized_padding_raises_memory_error() {
        assert_eq!(eval("result = 'ab'.center(6, '*')"), "'**ab**'");
        let source =
            "try:\n    result = 'x'.ljust(10 ** 11)\nexcept MemoryError:\n    result = 'refused'";
        assert_eq!(eval(source), "'refused'");
        let source = "try:\n    result = '7'.zfill(10 ** 11)\n\
                      except MemoryError as err:\n    result = 'refused'";
        assert_eq!(eval(source), "'refused'");
    }

    #[test]
    fn test_list_methods_mutate_in_place() {
        assert_eq!(
            eval("result = [3, 1, 2]\nalias = result\nalias.sort(reverse=True)\nalias.append(0)"),
            "[3, 2, 1, 0]"
        );
        assert_eq!(eval("result = [1, 2, 3]\nresult.pop(0)\nresult.insert(-1, 9)"), "[2, 9, 3]");
    }

    #[test]
    fn test_extend_with_self() {
        assert_eq!(eval("result = [1, 2]\nresult.extend(result)"), "[1, 2, 1, 2]");
    }

    #[test]
    fn test_dict_methods() {
        assert_eq!(eval("d = {'a': 1}\nresult = d.get('b', 0) + d.setdefault('c', 5)"), "5");
        assert_eq!(eval("result = {'a': 1}\nresult.update(b=2)"), "{'a': 1, 'b': 2}");
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000);
        let fault = interp.run("{}.pop('missing')").unwrap_err();
        assert_eq!(fault.to_string(), "KeyError: 'missing' (line 1)");
    }

    #[test]
    fn test_set_methods() {
        assert_eq!(eval("result = {1, 2, 3}.intersection([2, 3, 4])"), "{2, 3}");
        assert_eq!(eval("result = {1, 2}.issubset(range(5))"), "True");
    }
}
