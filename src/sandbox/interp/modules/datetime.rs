//! `datetime` over chrono. The classes are `Value::Class` names whose
//! constructors and class methods live here; instances are the
//! `Date`/`DateTime`/`TimeDelta` values.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use super::super::error::{Eval, Fault};
use super::super::eval::{Interpreter, no_attribute};
use super::super::format::strftime;
use super::super::pandas::parse_datetime;
use super::super::value::{Args, Builtin, Value};
use super::module_of;

const MICROS_PER_DAY: i64 = 86_400_000_000;

static CONSTRUCTORS: &[Builtin] = &[
    Builtin { name: "datetime", func: new_datetime },
    Builtin { name: "date", func: new_date },
    Builtin { name: "timedelta", func: new_timedelta },
];

static DATETIME_CLASS: &[Builtin] = &[
    Builtin { name: "now", func: now },
    Builtin { name: "today", func: now },
    Builtin { name: "strptime", func: strptime },
    Builtin { name: "fromisoformat", func: fromisoformat },
    Builtin { name: "fromtimestamp", func: fromtimestamp },
    Builtin { name: "combine", func: combine },
];

static DATE_CLASS: &[Builtin] = &[
    Builtin { name: "today", func: today },
    Builtin { name: "fromisoformat", func: date_fromisoformat },
];

pub fn module() -> Value {
    let classes = CONSTRUCTORS
        .iter()
        .map(|b| (b.name.to_string(), Value::Class(b.name.into())))
        .collect();
    module_of("datetime", &[], classes)
}

/// Constructor behind calling the `datetime`, `date` or `timedelta` class.
pub fn constructor(class: &str) -> Option<Value> {
    CONSTRUCTORS.iter().find(|b| b.name == class).map(Value::Builtin)
}

/// Class-level attributes such as `datetime.now`.
pub fn class_attr(class: &str, name: &str) -> Option<Value> {
    let table = match class {
        "datetime" => DATETIME_CLASS,
        "date" => DATE_CLASS,
        _ => return None,
    };
    table.iter().find(|b| b.name == name).map(Value::Builtin)
}

pub fn datetime_attr(obj: &Value, name: &str) -> Option<Value> {
    let int = |i: u32| Some(Value::Int(i as i64));
    match obj {
        Value::DateTime(d) => match name {
            "year" => Some(Value::Int(d.year() as i64)),
            "month" => int(d.month()),
            "day" => int(d.day()),
            "hour" => int(d.hour()),
            "minute" => int(d.minute()),
            "second" => int(d.second()),
            "microsecond" => int(d.nanosecond() / 1000),
            _ => None,
        },
        Value::Date(d) => match name {
            "year" => Some(Value::Int(d.year() as i64)),
            "month" => int(d.month()),
            "day" => int(d.day()),
            _ => None,
        },
        Value::TimeDelta(t) => {
            let (days, seconds, micros) = timedelta_parts(t);
            match name {
                "days" => Some(Value::Int(days)),
                "seconds" => Some(Value::Int(seconds)),
                "microseconds" => Some(Value::Int(micros)),
                _ => None,
            }
        }
        _ => None,
    }
}

pub fn datetime_method(receiver: &Value, name: &str, args: Args) -> Eval<Value> {
    match receiver {
        Value::DateTime(d) => datetime_method_on(receiver, d, name, &args),
        Value::Date(d) => match name {
            "strftime" => {
                let spec = args.required(0, "format", "strftime")?.expect_str("format")?;
                Ok(Value::str(&strftime(&d.and_time(NaiveTime::MIN), &spec)?))
            }
            "isoformat" | "__str__" => Ok(Value::str(&d.format("%Y-%m-%d").to_string())),
            "weekday" => Ok(Value::Int(d.weekday().num_days_from_monday() as i64)),
            "isoweekday" => Ok(Value::Int(d.weekday().number_from_monday() as i64)),
            "toordinal" => Ok(Value::Int(d.num_days_from_ce() as i64)),
            "replace" => {
                let dt = replace(&d.and_time(NaiveTime::MIN), &args)?;
                Ok(Value::Date(dt.date()))
            }
            _ => Err(no_attribute(receiver, name)),
        },
        Value::TimeDelta(t) => match name {
            "total_seconds" => Ok(Value::Float(total_seconds(t))),
            _ => Err(no_attribute(receiver, name)),
        },
        other => Err(no_attribute(other, name)),
    }
}

fn datetime_method_on(receiver: &Value, d: &NaiveDateTime, name: &str, args: &Args) -> Eval<Value> {
    match name {
        "strftime" => {
            let spec = args.required(0, "format", "strftime")?.expect_str("format")?;
            Ok(Value::str(&strftime(d, &spec)?))
        }
        "isoformat" => {
            let sep = match args.get(0, "sep") {
                Some(v) => v.expect_str("sep")?.to_string(),
                None => "T".to_string(),
            };
            Ok(Value::str(&isoformat(d, &sep)))
        }
        "date" => Ok(Value::Date(d.date())),
        "weekday" => Ok(Value::Int(d.weekday().num_days_from_monday() as i64)),
        "isoweekday" => Ok(Value::Int(d.weekday().number_from_monday() as i64)),
        "timestamp" => Ok(Value::Float(
            d.and_utc().timestamp_micros() as f64 / 1_000_000.0,
        )),
        "replace" => Ok(Value::DateTime(replace(d, args)?)),
        _ => Err(no_attribute(receiver, name)),
    }
}

fn isoformat(d: &NaiveDateTime, sep: &str) -> String {
    let time = if d.nanosecond() == 0 {
        d.format("%H:%M:%S").to_string()
    } else {
        format!("{}.{:06}", d.format("%H:%M:%S"), d.nanosecond() / 1000)
    };
    format!("{}{}{}", d.format("%Y-%m-%d"), sep, time)
}

/// Normalized `(days, seconds, microseconds)` with only `days` negative.
fn timedelta_parts(t: &TimeDelta) -> (i64, i64, i64) {
    let micros = t.num_microseconds().unwrap_or(i64::MAX);
    let days = micros.div_euclid(MICROS_PER_DAY);
    let rest = micros.rem_euclid(MICROS_PER_DAY);
    (days, rest / 1_000_000, rest % 1_000_000)
}

fn total_seconds(t: &TimeDelta) -> f64 {
    t.num_seconds() as f64 + t.subsec_nanos() as f64 / 1e9
}

fn int_kw(args: &Args, index: usize, name: &str, default: i64) -> Eval<i64> {
    match args.get(index, name) {
        Some(v) => v.expect_int(name),
        None => Ok(default),
    }
}

fn build(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    micro: i64,
) -> Eval<NaiveDateTime> {
    let date = u32::try_from(month)
        .ok()
        .zip(u32::try_from(day).ok())
        .and_then(|(m, d)| NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, m, d));
    let Some(date) = date else {
        if !(1..=12).contains(&month) {
            return Err(Fault::value_error("month must be in 1..12"));
        }
        return Err(Fault::value_error("day is out of range for month"));
    };
    let time = [hour, minute, second, micro]
        .iter()
        .map(|v| u32::try_from(*v).ok())
        .collect::<Option<Vec<u32>>>()
        .and_then(|t| NaiveTime::from_hms_micro_opt(t[0], t[1], t[2], t[3]))
        .filter(|_| second < 60)
        .ok_or_else(|| Fault::value_error("time component out of range"))?;
    Ok(date.and_time(time))
}

fn replace(d: &NaiveDateTime, args: &Args) -> Eval<NaiveDateTime> {
    let field = |name: &str, current: i64| -> Eval<i64> {
        match args.kw(name) {
            Some(v) => v.expect_int(name),
            None => Ok(current),
        }
    };
    build(
        field("year", d.year() as i64)?,
        field("month", d.month() as i64)?,
        field("day", d.day() as i64)?,
        field("hour", d.hour() as i64)?,
        field("minute", d.minute() as i64)?,
        field("second", d.second() as i64)?,
        field("microsecond", (d.nanosecond() / 1000) as i64)?,
    )
}

fn new_datetime(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let year = args.required(0, "year", "datetime")?.expect_int("year")?;
    let month = args.required(1, "month", "datetime")?.expect_int("month")?;
    let day = args.required(2, "day", "datetime")?.expect_int("day")?;
    Ok(Value::DateTime(build(
        year,
        month,
        day,
        int_kw(&args, 3, "hour", 0)?,
        int_kw(&args, 4, "minute", 0)?,
        int_kw(&args, 5, "second", 0)?,
        int_kw(&args, 6, "microsecond", 0)?,
    )?))
}

fn new_date(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let year = args.required(0, "year", "date")?.expect_int("year")?;
    let month = args.required(1, "month", "date")?.expect_int("month")?;
    let day = args.required(2, "day", "date")?.expect_int("day")?;
    Ok(Value::Date(build(year, month, day, 0, 0, 0, 0)?.date()))
}

fn new_timedelta(_: &mut Interpreter, args: Args) -> Eval<Value> {
    const UNITS: [(&str, f64); 7] = [
        ("days", 86_400e6),
        ("seconds", 1e6),
        ("microseconds", 1.0),
        ("milliseconds", 1e3),
        ("minutes", 60e6),
        ("hours", 3_600e6),
        ("weeks", 604_800e6),
    ];
    let mut micros = 0.0;
    for (i, (unit, scale)) in UNITS.iter().enumerate() {
        if let Some(v) = args.get(i, unit) {
            micros += v.expect_f64(unit)? * scale;
        }
    }
    if !micros.is_finite() || micros.abs() > 1e17 {
        return Err(Fault::new("OverflowError", "timedelta value out of range"));
    }
    Ok(Value::TimeDelta(TimeDelta::microseconds(micros.round() as i64)))
}

fn now(_: &mut Interpreter, _: Args) -> Eval<Value> {
    Ok(Value::DateTime(Local::now().naive_local()))
}

fn today(_: &mut Interpreter, _: Args) -> Eval<Value> {
    Ok(Value::Date(Local::now().date_naive()))
}

fn strptime(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let text = args.required(0, "date_string", "strptime")?.expect_str("date_string")?;
    let format = args.required(1, "format", "strptime")?.expect_str("format")?;
    parse_datetime(&text, Some(&format)).map(Value::DateTime).ok_or_else(|| {
        Fault::value_error(format!("time data '{}' does not match format '{}'", text, format))
    })
}

fn parse_iso(text: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: [&str; 4] =
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn fromisoformat(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let text = args.required(0, "date_string", "fromisoformat")?.expect_str("date_string")?;
    parse_iso(&text)
        .map(Value::DateTime)
        .ok_or_else(|| Fault::value_error(format!("Invalid isoformat string: '{}'", text)))
}

fn date_fromisoformat(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let text = args.required(0, "date_string", "fromisoformat")?.expect_str("date_string")?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|_| Fault::value_error(format!("Invalid isoformat string: '{}'", text)))
}

/// Timestamps are read as UTC; the sandbox has no local timezone.
fn fromtimestamp(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let ts = args.required(0, "timestamp", "fromtimestamp")?.expect_f64("timestamp")?;
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round() as u32;
    chrono::DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
        .map(|d| Value::DateTime(d.naive_utc()))
        .ok_or_else(|| Fault::value_error("year is out of range"))
}

fn combine(_: &mut Interpreter, args: Args) -> Eval<Value> {
    match args.required(0, "date", "combine")? {
        Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
        Value::DateTime(d) => Ok(Value::DateTime(d.date().and_time(NaiveTime::MIN))),
        other => Err(Fault::type_error(format!(
            "combine() argument 1 must be datetime.date, not {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, name: &str) -> String {
        let scratch = std::env::temp_dir().join("datachat-datetime-tests");
        let mut interp = Interpreter::new(scratch, 1_000_000);
        interp.run(source).unwrap();
        interp
            .locals()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_str())
            .unwrap_or_default()
    }

    #[test]
    fn test_construct_and_format() {
        let src = "from datetime import datetime\n\
                   d = datetime(2024, 3, 5, 14, 30)\n\
                   s = d.strftime('%Y/%m/%d %H:%M')\n";
        assert_eq!(eval(src, "s"), "2024/03/05 14:30");
        assert_eq!(eval(src, "d"), "2024-03-05 14:30:00");
    }

    #[test]
    fn test_strptime_and_attributes() {
        let src = "import datetime\n\
                   d = datetime.datetime.strptime('05/03/2024', '%d/%m/%Y')\n\
                   m = d.month\n\
                   w = d.weekday()\n";
        assert_eq!(eval(src, "m"), "3");
        assert_eq!(eval(src, "w"), "1");
    }

    #[test]
    fn test_timedelta_arithmetic() {
        let src = "from datetime import date, timedelta\n\
                   a = date(2024, 1, 1)\n\
                   b = a + timedelta(days=30)\n\
                   delta = b - a\n\
                   n = delta.days\n\
                   secs = timedelta(hours=1, minutes=30).total_seconds()\n";
        assert_eq!(eval(src, "b"), "2024-01-31");
        assert_eq!(eval(src, "n"), "30");
        assert_eq!(eval(src, "secs"), "5400.0");
    }

    #[test]
    fn test_invalid_day() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000);
        let fault = interp.run("import datetime\ndatetime.date(2023, 2, 30)\n").unwrap_err();
        assert_eq!(fault.kind, "ValueError");
        assert_eq!(fault.message, "day is out of range for month");
    }

    #[test]
    fn test_timedelta_parts_normalize_negative() {
        let t = TimeDelta::seconds(-1);
        assert_eq!(timedelta_parts(&t), (-1, 86_399, 0));
    }

    #[test]
    fn test_isoformat() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(1, 2, 3, 4)
            .unwrap();
        assert_eq!(isoformat(&d, "T"), "2024-03-05T01:02:03.000004");
    }
}
