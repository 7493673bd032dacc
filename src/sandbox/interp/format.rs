//! Format-spec mini-language, `%` formatting and `str.format`.

use std::fmt::Write as _;

use chrono::{NaiveDateTime, NaiveTime};

use super::error::{Eval, Fault, alloc_len};
use super::eval::Interpreter;
use super::value::{Args, Value};

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn digits_value(digits: &[char]) -> Eval<usize> {
    digits
        .iter()
        .collect::<String>()
        .parse()
        .map_err(|_| Fault::value_error("Too many decimal digits in format string"))
}

fn parse_spec(spec: &str) -> Eval<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i)
        && matches!(c, '+' | '-' | ' ')
    {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        out.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        out.width = alloc_len(digits_value(&chars[start..i])?, 1)?;
    }
    if let Some(&c) = chars.get(i)
        && matches!(c, ',' | '_')
    {
        out.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(Fault::value_error("Format specifier missing precision"));
        }
        out.precision = Some(alloc_len(digits_value(&chars[start..i])?, 1)?);
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(Fault::value_error(format!("Invalid format specifier '{}'", spec)));
    }
    Ok(out)
}

/// `format(value, spec)`.
pub fn format_value(value: &Value, spec: &str) -> Eval<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    match value {
        Value::Date(d) => return strftime(&d.and_time(NaiveTime::MIN), spec),
        Value::DateTime(d) => return strftime(d, spec),
        _ => {}
    }
    let spec_parsed = parse_spec(spec)?;
    match value {
        Value::Int(_) | Value::Bool(_) => format_int(value, &spec_parsed),
        Value::Float(f) => format_float(*f, &spec_parsed),
        Value::Str(s) => {
            if !matches!(spec_parsed.kind, None | Some('s')) {
                return Err(unknown_code(spec_parsed.kind, "str"));
            }
            let mut text: String = s.to_string();
            if let Some(p) = spec_parsed.precision {
                text = text.chars().take(p).collect();
            }
            Ok(pad(&text, &spec_parsed, '<'))
        }
        Value::None | Value::Series(_) | Value::Frame(_) | Value::List(_) | Value::Dict(_) => {
            if spec_parsed.kind.is_none() && spec_parsed.precision.is_none() {
                return Ok(pad(&value.to_str(), &spec_parsed, '<'));
            }
            Err(Fault::type_error(format!(
                "unsupported format string passed to {}.__format__",
                value.type_name()
            )))
        }
        other => Ok(pad(&other.to_str(), &spec_parsed, '<')),
    }
}

/// chrono reports bad directives through `fmt::Error`; surface them as ValueError.
pub fn strftime(d: &NaiveDateTime, spec: &str) -> Eval<String> {
    let mut out = String::new();
    write!(out, "{}", d.format(spec))
        .map_err(|_| Fault::value_error(format!("Invalid format string '{}'", spec)))?;
    Ok(out)
}

fn unknown_code(kind: Option<char>, type_name: &str) -> Fault {
    Fault::value_error(format!(
        "Unknown format code '{}' for object of type '{}'",
        kind.unwrap_or(' '),
        type_name
    ))
}

fn format_int(value: &Value, spec: &Spec) -> Eval<String> {
    let i = value.as_i64().unwrap_or_default();
    let kind = match spec.kind {
        None if matches!(value, Value::Bool(_)) && spec.sign.is_none() && !spec.zero => {
            return Ok(pad(&value.to_str(), spec, '>'));
        }
        None | Some('d') | Some('n') => 'd',
        Some(k @ ('b' | 'o' | 'x' | 'X' | 'c')) => k,
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return format_float(i as f64, spec),
        other => return Err(unknown_code(other, "int")),
    };
    if spec.precision.is_some() {
        return Err(Fault::value_error("Precision not allowed in integer format specifier"));
    }
    let magnitude = i.unsigned_abs();
    let (mut digits, prefix) = match kind {
        'b' => (format!("{:b}", magnitude), "0b"),
        'o' => (format!("{:o}", magnitude), "0o"),
        'x' => (format!("{:x}", magnitude), "0x"),
        'X' => (format!("{:X}", magnitude), "0X"),
        'c' => {
            let c = u32::try_from(i)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Fault::new("OverflowError", "%c arg not in range(0x110000)"))?;
            return Ok(pad(&c.to_string(), spec, '<'));
        }
        _ => (magnitude.to_string(), ""),
    };
    if let Some(sep) = spec.grouping {
        digits = group(&digits, sep, if kind == 'd' { 3 } else { 4 });
    }
    let prefix = if spec.alternate { prefix } else { "" };
    Ok(pad_number(&sign_of(i < 0, spec), &format!("{}{}", prefix, digits), spec))
}

fn format_float(f: f64, spec: &Spec) -> Eval<String> {
    let negative = f.is_sign_negative() && !f.is_nan();
    let x = f.abs();
    let body = match spec.kind {
        None => match spec.precision {
            None => {
                let text = super::value::float_repr(x);
                group_float(&text, spec)
            }
            Some(p) => {
                let text = general(x, p.max(1), spec.alternate);
                if text.contains(['.', 'e', 'n', 'i']) { text } else { format!("{}.0", text) }
            }
        },
        Some('f') | Some('F') => {
            let text = fixed(x, spec.precision.unwrap_or(6));
            let text = if spec.alternate && !text.contains('.') {
                format!("{}.", text)
            } else {
                text
            };
            let text = group_float(&text, spec);
            if spec.kind == Some('F') { text.to_uppercase() } else { text }
        }
        Some('e') | Some('E') => {
            let text = scientific(x, spec.precision.unwrap_or(6));
            if spec.kind == Some('E') { text.to_uppercase() } else { text }
        }
        Some('g') | Some('G') => {
            let text = general(x, spec.precision.unwrap_or(6).max(1), spec.alternate);
            let text = group_float(&text, spec);
            if spec.kind == Some('G') { text.to_uppercase() } else { text }
        }
        Some('%') => {
            let text = fixed(x * 100.0, spec.precision.unwrap_or(6));
            format!("{}%", group_float(&text, spec))
        }
        other => return Err(unknown_code(other, "float")),
    };
    Ok(pad_number(&sign_of(negative, spec), &body, spec))
}

fn fixed(x: f64, precision: usize) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return "inf".into();
    }
    format!("{:.*}", precision, x)
}

fn scientific(x: f64, precision: usize) -> String {
    if !x.is_finite() {
        return fixed(x, 0);
    }
    let raw = format!("{:.*e}", precision, x);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            format!("{}e{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
        }
        None => raw,
    }
}

/// `g` presentation: fixed or scientific depending on the exponent.
fn general(x: f64, precision: usize, alternate: bool) -> String {
    if !x.is_finite() {
        return fixed(x, 0);
    }
    if x == 0.0 {
        return if alternate { format!("{:.*}", precision - 1, 0.0) } else { "0".into() };
    }
    let raw = format!("{:.*e}", precision - 1, x);
    let exp: i32 = raw.split_once('e').and_then(|(_, e)| e.parse().ok()).unwrap_or(0);
    if exp < -4 || exp >= precision as i32 {
        let sci = scientific(x, precision - 1);
        if alternate {
            sci
        } else {
            match sci.split_once('e') {
                Some((m, e)) => format!("{}e{}", trim_zeros(m), e),
                None => sci,
            }
        }
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        let text = format!("{:.*}", decimals, x);
        if alternate { text } else { trim_zeros(&text) }
    }
}

fn trim_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

fn sign_of(negative: bool, spec: &Spec) -> String {
    match (negative, spec.sign) {
        (true, _) => "-".into(),
        (false, Some('+')) => "+".into(),
        (false, Some(' ')) => " ".into(),
        _ => String::new(),
    }
}

fn group(digits: &str, sep: char, every: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(chars.len() + chars.len() / every);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}

fn group_float(text: &str, spec: &Spec) -> String {
    let Some(sep) = spec.grouping else {
        return text.to_string();
    };
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group(int, sep, 3), frac),
        None => group(text, sep, 3),
    }
}

fn pad_number(sign: &str, body: &str, spec: &Spec) -> String {
    if spec.zero && spec.align.is_none() {
        let spec = Spec {
            fill: Some('0'),
            align: Some('='),
            width: spec.width,
            ..Spec::default()
        };
        return pad_signed(sign, body, &spec);
    }
    pad_signed(sign, body, spec)
}

fn pad_signed(sign: &str, body: &str, spec: &Spec) -> String {
    if spec.align == Some('=') {
        let len = sign.chars().count() + body.chars().count();
        let gap = spec.width.saturating_sub(len);
        let fill: String = std::iter::repeat_n(spec.fill.unwrap_or(' '), gap).collect();
        return format!("{}{}{}", sign, fill, body);
    }
    pad(&format!("{}{}", sign, body), spec, '>')
}

fn pad(text: &str, spec: &Spec, default_align: char) -> String {
    let len = text.chars().count();
    if len >= spec.width {
        return text.to_string();
    }
    let gap = spec.width - len;
    let fill = spec.fill.unwrap_or(' ');
    let run = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{}{}", text, run(gap)),
        '^' => format!("{}{}{}", run(gap / 2), text, run(gap - gap / 2)),
        _ => format!("{}{}", run(gap), text),
    }
}

/// `template % args`.
pub fn percent_format(template: &str, args: &Value) -> Eval<String> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        Value::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mut next = 0;
    let mut out = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let mut key = None;
        if chars.get(i) == Some(&'(') {
            let close = chars[i..]
                .iter()
                .position(|&c| c == ')')
                .ok_or_else(|| Fault::value_error("incomplete format key"))?;
            key = Some(chars[i + 1..i + close].iter().collect::<String>());
            i += close + 1;
        }
        let mut flags = String::new();
        while let Some(&c) = chars.get(i)
            && matches!(c, '-' | '+' | ' ' | '0' | '#')
        {
            flags.push(c);
            i += 1;
        }
        let mut width = String::new();
        while let Some(&c) = chars.get(i)
            && c.is_ascii_digit()
        {
            width.push(c);
            i += 1;
        }
        let mut precision = None;
        if chars.get(i) == Some(&'.') {
            i += 1;
            let mut p = String::new();
            while let Some(&c) = chars.get(i)
                && c.is_ascii_digit()
            {
                p.push(c);
                i += 1;
            }
            precision = Some(if p.is_empty() { "0".to_string() } else { p });
        }
        let Some(&conv) = chars.get(i) else {
            return Err(Fault::value_error("incomplete format"));
        };
        i += 1;
        if conv == '%' {
            out.push('%');
            continue;
        }

        let value = match (&key, args) {
            (Some(k), Value::Dict(d)) => d
                .borrow()
                .get_str(k)
                .ok_or_else(|| Fault::key_error(super::value::str_repr(k)))?,
            (Some(_), _) => return Err(Fault::type_error("format requires a mapping")),
            (None, _) => {
                let v = positional
                    .get(next)
                    .cloned()
                    .ok_or_else(|| Fault::type_error("not enough arguments for format string"))?;
                next += 1;
                v
            }
        };

        let mut spec = String::new();
        if flags.contains('-') {
            spec.push('<');
        }
        if flags.contains('+') {
            spec.push('+');
        } else if flags.contains(' ') {
            spec.push(' ');
        }
        if flags.contains('#') {
            spec.push('#');
        }
        let numeric = matches!(
            conv,
            'd' | 'i' | 'u' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o'
        );
        if flags.contains('0') && !flags.contains('-') && numeric {
            spec.push('0');
        }
        spec.push_str(&width);

        let piece = match conv {
            's' | 'r' | 'a' => {
                let text = if conv == 's' { value.to_str() } else { value.repr() };
                if let Some(p) = &precision {
                    spec.push('.');
                    spec.push_str(p);
                }
                let spec = if spec.starts_with('<') { spec } else { format!(">{}", spec) };
                format_value(&Value::str(&text), &spec)?
            }
            'd' | 'i' | 'u' => {
                let n = match &value {
                    Value::Float(f) => Value::Int(f.trunc() as i64),
                    Value::Int(_) | Value::Bool(_) => value.clone(),
                    other => {
                        return Err(Fault::type_error(format!(
                            "%{} format: a real number is required, not {}",
                            conv,
                            other.type_name()
                        )));
                    }
                };
                spec.push('d');
                format_value(&n, &spec)?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let f = value.expect_f64("%-format argument")?;
                spec.push('.');
                spec.push_str(precision.as_deref().unwrap_or("6"));
                spec.push(conv);
                format_value(&Value::Float(f), &spec)?
            }
            'x' | 'X' | 'o' | 'c' => {
                let n = value.expect_int("%-format argument")?;
                spec.push(conv);
                format_value(&Value::Int(n), &spec)?
            }
            other => {
                return Err(Fault::value_error(format!(
                    "unsupported format character '{}'",
                    other
                )));
            }
        };
        out.push_str(&piece);
    }
    if key_free(args) && next < positional.len() {
        return Err(Fault::type_error("not all arguments converted during string formatting"));
    }
    Ok(out)
}

fn key_free(args: &Value) -> bool {
    !matches!(args, Value::Dict(_))
}

/// `template.format(*args, **kwargs)`.
pub fn str_format(interp: &mut Interpreter, template: &str, args: &Args) -> Eval<String> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut auto = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '}' => return Err(Fault::value_error("Single '}' encountered in format string")),
            '{' => {
                let mut depth = 1;
                let mut j = i + 1;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(Fault::value_error("expected '}' before end of string"));
                }
                let field: String = chars[i + 1..j - 1].iter().collect();
                out.push_str(&replacement(interp, &field, args, &mut auto)?);
                i = j;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn index_out_of_range(n: usize) -> Fault {
    Fault::index_error(format!(
        "Replacement index {} out of range for positional args tuple",
        n
    ))
}

fn replacement(
    interp: &mut Interpreter,
    field: &str,
    args: &Args,
    auto: &mut usize,
) -> Eval<String> {
    let (head, spec) = match field.split_once(':') {
        Some((h, s)) => (h, s.to_string()),
        None => (field, String::new()),
    };
    let (name, conversion) = match head.split_once('!') {
        Some((n, c)) => (n, c.chars().next()),
        None => (head, None),
    };

    let split = name.find(['.', '[']).unwrap_or(name.len());
    let (base, mut rest) = name.split_at(split);
    let mut value = if base.is_empty() {
        let v = args.pos.get(*auto).cloned().ok_or_else(|| index_out_of_range(*auto))?;
        *auto += 1;
        v
    } else if let Ok(n) = base.parse::<usize>() {
        args.pos.get(n).cloned().ok_or_else(|| index_out_of_range(n))?
    } else {
        args.kw(base).cloned().ok_or_else(|| Fault::key_error(super::value::str_repr(base)))?
    };

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            value = interp.get_attr(&value, &after[..end])?;
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after
                .find(']')
                .ok_or_else(|| Fault::value_error("Missing ']' in format string"))?;
            let key = &after[..end];
            let index = match key.parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => Value::str(key),
            };
            value = interp.get_item(&value, &index)?;
            rest = &after[end + 1..];
        } else {
            return Err(Fault::value_error(
                "Only '.' or '[' may follow ']' in format field specifier",
            ));
        }
    }

    // Nested fields in the format spec, e.g. `{:{width}}`.
    let spec = if spec.contains('{') { str_format(interp, &spec, args)? } else { spec };
    let value = match conversion {
        Some('r') | Some('a') => Value::str(&value.repr()),
        Some('s') => Value::str(&value.to_str()),
        _ => value,
    };
    format_value(&value, &spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(v: Value, spec: &str) -> String {
        format_value(&v, spec).unwrap()
    }

    #[test]
    fn test_float_presentations() {
        assert_eq!(fmt(Value::Float(3.14159), ".2f"), "3.14");
        assert_eq!(fmt(Value::Float(1234567.891), ",.2f"), "1,234,567.89");
        assert_eq!(fmt(Value::Float(0.256), ".1%"), "25.6%");
        assert_eq!(fmt(Value::Float(12345.678), ".3e"), "1.235e+04");
        assert_eq!(fmt(Value::Float(0.0001234), "g"), "0.0001234");
        assert_eq!(fmt(Value::Float(123456789.0), "g"), "1.23457e+08");
        assert_eq!(fmt(Value::Float(2.50), "g"), "2.5");
        assert_eq!(fmt(Value::Float(1.0), ".3"), "1.0");
    }

    #[test]
    fn test_int_presentations() {
        assert_eq!(fmt(Value::Int(1234567), ","), "1,234,567");
        assert_eq!(fmt(Value::Int(42), "05d"), "00042");
        assert_eq!(fmt(Value::Int(-42), "05d"), "-0042");
        assert_eq!(fmt(Value::Int(255), "#x"), "0xff");
        assert_eq!(fmt(Value::Int(7), ".2f"), "7.00");
        assert_eq!(fmt(Value::Int(5), "+"), "+5");
    }

    #[test]
    fn test_alignment() {
        assert_eq!(fmt(Value::str("ab"), ">5"), "   ab");
        assert_eq!(fmt(Value::str("ab"), "*^6"), "**ab**");
        assert_eq!(fmt(Value::Int(3), "<4"), "3   ");
        assert_eq!(fmt(Value::str("abc"), "5"), "abc  ");
    }

    #[test]
    fn test_oversized_width_rejected() {
        let err = format_value(&Value::Int(1), "100000000000").unwrap_err();
        assert_eq!(err.kind, "MemoryError");
        let err = format_value(&Value::Float(1.0), ".100000000000f").unwrap_err();
        assert_eq!(err.kind, "MemoryError");
        let err = format_value(&Value::Int(1), "99999999999999999999999").unwrap_err();
        assert_eq!(err.to_string(), "ValueError: Too many decimal digits in format string");
    }

    #[test]
    fn test_percent_format() {
        let args = Value::tuple(vec![Value::str("x"), Value::Float(2.5), Value::Int(7)]);
        assert_eq!(percent_format("%s=%.1f (%03d)", &args).unwrap(), "x=2.5 (007)");
        assert_eq!(percent_format("100%%", &Value::tuple(vec![])).unwrap(), "100%");
        assert!(percent_format("%s %s", &Value::str("one")).is_err());
    }

    #[test]
    fn test_str_format_fields() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 10_000);
        let args = Args {
            pos: vec![Value::str("a"), Value::Int(2)],
            kw: vec![("name".into(), Value::str("z"))],
        };
        assert_eq!(str_format(&mut interp, "{} {}", &args).unwrap(), "a 2");
        assert_eq!(str_format(&mut interp, "{1}-{0}-{name!r}", &args).unwrap(), "2-a-'z'");
        assert_eq!(str_format(&mut interp, "{{literal}} {1:>3}", &args).unwrap(), "{literal}   2");
    }
}
