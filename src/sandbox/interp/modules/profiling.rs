//! `ydata_profiling.ProfileReport`: a per-column statistical profile of a
//! frame, rendered as JSON or as a standalone HTML page.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::rc::Rc;

use chrono::Utc;
use serde_json::{Map, Value as Json, json};

use super::super::error::{Eval, Fault};
use super::super::eval::{Interpreter, no_attribute};
use super::super::frame::{
    DataFrame, Dtype, Scalar, Series, html_escape, mean, numeric_values, pearson, quantile, unique,
    value_counts, variance,
};
use super::super::value::{Args, Builtin, HashKey, Value};
use super::module_of;

const DEFAULT_TITLE: &str = "Pandas Profiling Report";
const HIGH_CORRELATION: f64 = 0.9;
const HIGH_CARDINALITY: usize = 50;
const ZEROS_SHARE: f64 = 0.1;
const SKEWNESS_LIMIT: f64 = 20.0;
const TOP_VALUES: usize = 10;
const SAMPLE_ROWS: usize = 5;

pub struct Profile {
    pub title: String,
    pub frame: DataFrame,
}

static FUNCTIONS: &[Builtin] = &[Builtin { name: "ProfileReport", func: profile_report }];

pub fn module() -> Value {
    module_of("ydata_profiling", FUNCTIONS, Vec::new())
}

fn profile_report(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let frame = match args.required(0, "df", "ProfileReport")? {
        Value::Frame(frame) => frame.borrow().clone(),
        other => {
            return Err(Fault::type_error(format!(
                "ProfileReport expects a DataFrame, not '{}'",
                other.type_name()
            )));
        }
    };
    let title = match args.opt(1, "title") {
        Some(t) => t.expect_str("title")?.to_string(),
        None => DEFAULT_TITLE.to_string(),
    };
    log::debug!("profiling frame rows={} cols={}", frame.len(), frame.columns.len());
    Ok(Value::Profile(Rc::new(Profile { title, frame })))
}

pub fn profile_method(
    interp: &mut Interpreter,
    profile: &Rc<Profile>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    match name {
        "to_file" => {
            let path = args.required(0, "output_file", "to_file")?;
            let file = path.expect_str("output_file")?;
            let content = if file.ends_with(".json") {
                profile.to_json_string()
            } else if file.ends_with(".html") {
                profile.to_html()
            } else {
                return Err(Fault::value_error(format!(
                    "Extension not supported for '{}': use .html or .json",
                    file
                )));
            };
            interp.write_output(path, content.as_bytes())?;
            Ok(Value::None)
        }
        "to_json" => Ok(Value::str(&profile.to_json_string())),
        "to_html" => Ok(Value::str(&profile.to_html())),
        "to_widgets" | "to_notebook_iframe" => Ok(Value::None),
        _ => Err(no_attribute(&Value::Profile(profile.clone()), name)),
    }
}

/// Statistics for one column.
struct Variable {
    name: String,
    kind: &'static str,
    n: usize,
    n_missing: usize,
    n_distinct: usize,
    numeric: Option<NumericStats>,
    top: Vec<(String, i64)>,
}

struct NumericStats {
    mean: f64,
    std: f64,
    variance: f64,
    min: f64,
    max: f64,
    sum: f64,
    quantiles: [(&'static str, f64); 5],
    n_zeros: usize,
    n_negative: usize,
    skewness: f64,
    kurtosis: f64,
}

impl Variable {
    fn new(name: &str, values: &[Scalar]) -> Self {
        let present: Vec<Scalar> = values.iter().filter(|v| !v.is_missing()).cloned().collect();
        let dtype = Dtype::infer(values);
        let kind = match dtype {
            Dtype::Int64 | Dtype::Float64 => "Numeric",
            Dtype::Bool => "Boolean",
            Dtype::DateTime => "DateTime",
            Dtype::Object => "Categorical",
        };
        let numeric = dtype.is_numeric().then(|| NumericStats::new(&numeric_values(values)));
        let counts = value_counts(&Series::new(None, present.clone()), false, false);
        let top = counts
            .index
            .labels
            .iter()
            .zip(&counts.values)
            .take(TOP_VALUES)
            .map(|(label, count)| (label.display(), count.as_f64().unwrap_or(0.0) as i64))
            .collect();
        Self {
            name: name.to_string(),
            kind,
            n: values.len(),
            n_missing: values.len() - present.len(),
            n_distinct: unique(&present).len(),
            numeric,
            top,
        }
    }

    fn share(&self, count: usize) -> f64 {
        if self.n == 0 { 0.0 } else { count as f64 / self.n as f64 }
    }

    fn is_unique(&self) -> bool {
        self.n_missing == 0 && self.n > 1 && self.n_distinct == self.n
    }

    fn to_json(&self) -> Json {
        let mut out = Map::new();
        out.insert("type".into(), json!(self.kind));
        out.insert("n".into(), json!(self.n));
        out.insert("count".into(), json!(self.n - self.n_missing));
        out.insert("n_missing".into(), json!(self.n_missing));
        out.insert("p_missing".into(), number(self.share(self.n_missing)));
        out.insert("n_distinct".into(), json!(self.n_distinct));
        out.insert("p_distinct".into(), number(self.share(self.n_distinct)));
        out.insert("is_unique".into(), json!(self.is_unique()));
        if let Some(stats) = &self.numeric {
            for (key, value) in stats.fields() {
                out.insert(key.into(), number(value));
            }
            out.insert("n_zeros".into(), json!(stats.n_zeros));
            out.insert("p_zeros".into(), number(self.share(stats.n_zeros)));
            out.insert("n_negative".into(), json!(stats.n_negative));
        }
        let top: Map<String, Json> = self.top.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        out.insert("value_counts_without_nan".into(), Json::Object(top));
        Json::Object(out)
    }
}

impl NumericStats {
    fn new(values: &[f64]) -> Self {
        let m = mean(values);
        let var = variance(values, 1);
        let (min, max) = if values.is_empty() {
            (f64::NAN, f64::NAN)
        } else {
            values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
        };
        Self {
            mean: m,
            std: var.sqrt(),
            variance: var,
            min,
            max,
            sum: values.iter().sum(),
            quantiles: [
                ("5%", quantile(values, 0.05)),
                ("25%", quantile(values, 0.25)),
                ("50%", quantile(values, 0.5)),
                ("75%", quantile(values, 0.75)),
                ("95%", quantile(values, 0.95)),
            ],
            n_zeros: values.iter().filter(|v| **v == 0.0).count(),
            n_negative: values.iter().filter(|v| **v < 0.0).count(),
            skewness: skewness(values),
            kurtosis: kurtosis(values),
        }
    }

    fn fields(&self) -> Vec<(&'static str, f64)> {
        let mut fields = vec![
            ("mean", self.mean),
            ("std", self.std),
            ("variance", self.variance),
            ("min", self.min),
            ("max", self.max),
            ("range", self.max - self.min),
            ("sum", self.sum),
        ];
        fields.extend(self.quantiles);
        fields.push(("iqr", self.quantiles[3].1 - self.quantiles[1].1));
        fields.push(("skewness", self.skewness));
        fields.push(("kurtosis", self.kurtosis));
        fields
    }
}

/// Adjusted Fisher-Pearson skewness, as pandas computes it.
fn skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 3.0 {
        return f64::NAN;
    }
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
    if m2 == 0.0 {
        return 0.0;
    }
    (n * (n - 1.0)).sqrt() / (n - 2.0) * m3 / m2.powf(1.5)
}

/// Excess kurtosis with the unbiased estimator pandas uses.
fn kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 4.0 {
        return f64::NAN;
    }
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>();
    if m2 == 0.0 {
        return 0.0;
    }
    let term = n * (n + 1.0) * (n - 1.0) * m4 / ((n - 2.0) * (n - 3.0) * m2 * m2);
    term - 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0))
}

fn number(v: f64) -> Json {
    serde_json::Number::from_f64(v).map(Json::Number).unwrap_or(Json::Null)
}

fn percent(share: f64) -> String {
    format!("{:.1}%", share * 100.0)
}

impl Profile {
    fn variables(&self) -> Vec<Variable> {
        self.frame
            .columns
            .iter()
            .zip(&self.frame.data)
            .map(|(name, values)| Variable::new(name, values))
            .collect()
    }

    fn duplicate_rows(&self) -> usize {
        let mut seen: HashSet<Vec<HashKey>> = HashSet::new();
        (0..self.frame.len())
            .filter(|&row| {
                let key: Vec<HashKey> = self.frame.data.iter().map(|col| col[row].key()).collect();
                !seen.insert(key)
            })
            .count()
    }

    /// Pearson coefficients between every pair of numeric columns.
    fn correlations(&self) -> Vec<(String, Vec<(String, f64)>)> {
        let numeric = self.frame.numeric_columns();
        if numeric.len() < 2 {
            return Vec::new();
        }
        numeric
            .iter()
            .map(|&a| {
                let row = numeric
                    .iter()
                    .map(|&b| {
                        let r = if a == b {
                            1.0
                        } else {
                            pearson(&self.frame.data[a], &self.frame.data[b])
                        };
                        (self.frame.columns[b].clone(), r)
                    })
                    .collect();
                (self.frame.columns[a].clone(), row)
            })
            .collect()
    }

    fn alerts(&self, variables: &[Variable], duplicates: usize) -> Vec<String> {
        let mut alerts = Vec::new();
        for v in variables {
            if v.n_distinct == 1 && v.n > 1 {
                alerts.push(format!("{} has constant value \"{}\"", v.name, v.top[0].0));
            }
            if v.n_missing > 0 {
                alerts.push(format!(
                    "{} has {} ({}) missing values",
                    v.name,
                    v.n_missing,
                    percent(v.share(v.n_missing))
                ));
            }
            if v.is_unique() && v.kind != "Numeric" {
                alerts.push(format!("{} has unique values", v.name));
            }
            if v.kind == "Categorical" && v.n_distinct > HIGH_CARDINALITY {
                alerts.push(format!(
                    "{} has a high cardinality: {} distinct values",
                    v.name, v.n_distinct
                ));
            }
            if let Some(stats) = &v.numeric {
                if stats.n_zeros > 0 && v.share(stats.n_zeros) > ZEROS_SHARE {
                    alerts.push(format!(
                        "{} has {} ({}) zeros",
                        v.name,
                        stats.n_zeros,
                        percent(v.share(stats.n_zeros))
                    ));
                }
                if stats.skewness.abs() > SKEWNESS_LIMIT {
                    alerts.push(format!(
                        "{} is highly skewed (γ1 = {:.2})",
                        v.name, stats.skewness
                    ));
                }
            }
        }
        let correlations = self.correlations();
        for (i, (a, row)) in correlations.iter().enumerate() {
            for (b, r) in row.iter().skip(i + 1) {
                if r.abs() > HIGH_CORRELATION {
                    alerts.push(format!("{} is highly overall correlated with {}", a, b));
                }
            }
        }
        if duplicates > 0 {
            alerts.push(format!(
                "Dataset has {} ({}) duplicate rows",
                duplicates,
                percent(duplicates as f64 / self.frame.len().max(1) as f64)
            ));
        }
        alerts
    }

    pub fn to_json(&self) -> Json {
        let variables = self.variables();
        let duplicates = self.duplicate_rows();
        let n = self.frame.len();
        let cells = n * self.frame.columns.len();
        let missing_cells: usize = variables.iter().map(|v| v.n_missing).sum();

        let mut types = Map::new();
        for v in &variables {
            let count = types.get(v.kind).and_then(Json::as_u64).unwrap_or(0);
            types.insert(v.kind.to_string(), json!(count + 1));
        }
        let now = Utc::now().to_rfc3339();
        let correlations: Map<String, Json> = self
            .correlations()
            .into_iter()
            .map(|(a, row)| {
                let row: Map<String, Json> = row.into_iter().map(|(b, r)| (b, number(r))).collect();
                (a, Json::Object(row))
            })
            .collect();
        let missing: Map<String, Json> =
            variables.iter().map(|v| (v.name.clone(), json!(v.n_missing))).collect();
        let sample_rows: Vec<usize> = (0..n.min(SAMPLE_ROWS)).collect();
        let sample = self
            .frame
            .take(&sample_rows)
            .to_json("records")
            .unwrap_or(Json::Array(Vec::new()));
        let all_missing = variables.iter().filter(|v| v.n > 0 && v.n_missing == v.n).count();
        let p_cells_missing = if cells == 0 { 0.0 } else { missing_cells as f64 / cells as f64 };
        let per_variable: Map<String, Json> =
            variables.iter().map(|v| (v.name.clone(), v.to_json())).collect();
        let correlations = if correlations.is_empty() {
            json!({})
        } else {
            json!({ "pearson": correlations })
        };

        json!({
            "analysis": {
                "title": self.title,
                "date_start": now,
                "date_end": now,
            },
            "table": {
                "n": n,
                "n_var": self.frame.columns.len(),
                "n_cells_missing": missing_cells,
                "n_vars_with_missing": variables.iter().filter(|v| v.n_missing > 0).count(),
                "n_vars_all_missing": all_missing,
                "p_cells_missing": number(p_cells_missing),
                "n_duplicates": duplicates,
                "p_duplicates": number(if n == 0 { 0.0 } else { duplicates as f64 / n as f64 }),
                "types": types,
            },
            "variables": per_variable,
            "alerts": self.alerts(&variables, duplicates),
            "correlations": correlations,
            "missing": { "count": missing },
            "sample": { "head": sample },
        })
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn to_html(&self) -> String {
        let variables = self.variables();
        let duplicates = self.duplicate_rows();
        let title = html_escape(&self.title);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{}</title>\n<style>{}</style>\n</head>\n<body>",
            title, STYLE
        );
        let _ = writeln!(out, "<h1>{}</h1>", title);

        out.push_str("<h2>Overview</h2>\n<table class=\"stats\">\n");
        let missing: usize = variables.iter().map(|v| v.n_missing).sum();
        for (label, value) in [
            ("Number of variables", self.frame.columns.len().to_string()),
            ("Number of observations", self.frame.len().to_string()),
            ("Missing cells", missing.to_string()),
            ("Duplicate rows", duplicates.to_string()),
        ] {
            let _ = writeln!(out, "<tr><th>{}</th><td>{}</td></tr>", label, value);
        }
        out.push_str("</table>\n");

        let alerts = self.alerts(&variables, duplicates);
        if !alerts.is_empty() {
            out.push_str("<h2>Alerts</h2>\n<ul class=\"alerts\">\n");
            for alert in &alerts {
                let _ = writeln!(out, "<li>{}</li>", html_escape(alert));
            }
            out.push_str("</ul>\n");
        }

        out.push_str("<h2>Variables</h2>\n");
        for v in &variables {
            let _ = writeln!(
                out,
                "<section class=\"variable\">\n\
                 <h3>{} <small>{}</small></h3>\n<table class=\"stats\">",
                html_escape(&v.name),
                v.kind
            );
            let mut rows = vec![
                ("Distinct".to_string(), v.n_distinct.to_string()),
                (
                    "Missing".to_string(),
                    format!("{} ({})", v.n_missing, percent(v.share(v.n_missing))),
                ),
            ];
            if let Some(stats) = &v.numeric {
                let fields = stats.fields().into_iter();
                rows.extend(fields.map(|(k, x)| (k.to_string(), format!("{:.4}", x))));
            } else {
                rows.extend(v.top.iter().take(5).map(|(k, c)| (k.clone(), c.to_string())));
            }
            for (label, value) in rows {
                let _ = writeln!(
                    out,
                    "<tr><th>{}</th><td>{}</td></tr>",
                    html_escape(&label),
                    html_escape(&value)
                );
            }
            out.push_str("</table>\n</section>\n");
        }

        let correlations = self.correlations();
        if !correlations.is_empty() {
            out.push_str("<h2>Correlations</h2>\n<table class=\"stats\">\n<tr><th></th>");
            for (name, _) in &correlations {
                let _ = write!(out, "<th>{}</th>", html_escape(name));
            }
            out.push_str("</tr>\n");
            for (name, row) in &correlations {
                let _ = write!(out, "<tr><th>{}</th>", html_escape(name));
                for (_, r) in row {
                    let _ = write!(out, "<td>{:.3}</td>", r);
                }
                out.push_str("</tr>\n");
            }
            out.push_str("</table>\n");
        }

        let sample_rows: Vec<usize> = (0..self.frame.len().min(SAMPLE_ROWS)).collect();
        out.push_str("<h2>Sample</h2>\n");
        out.push_str(&self.frame.take(&sample_rows).to_html());
        out.push_str("\n</body>\n</html>\n");
        out
    }
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;margin-bottom:1em}\
th,td{border:1px solid #ddd;padding:4px 8px;text-align:right}\
th{background:#f5f5f5}\
.alerts li{color:#a94442}\
section.variable{margin-bottom:1.5em}";

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::from_columns(vec![
            ("A".to_string(), vec![1, 2, 3, 4, 5, 1].into_iter().map(Scalar::Int).collect()),
            ("B".to_string(), vec![5, 4, 3, 2, 1, 5].into_iter().map(Scalar::Int).collect()),
            (
                "C".to_string(),
                ["a", "b", "c", "a", "b", "c"].iter().map(|s| Scalar::Str(Rc::from(*s))).collect(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_json_sections() {
        let profile = Profile {
            title: "Debug".into(),
            frame: frame(),
        };
        let report = profile.to_json();
        for key in ["analysis", "table", "variables", "alerts", "correlations", "missing"] {
            assert!(report.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(report["analysis"]["title"], "Debug");
        assert_eq!(report["table"]["n"], 6);
        assert_eq!(report["variables"]["A"]["type"], "Numeric");
        assert_eq!(report["variables"]["C"]["type"], "Categorical");
        assert_eq!(report["variables"]["C"]["n_distinct"], 3);
        assert!(report["correlations"]["pearson"]["A"]["B"].as_f64().unwrap() < -0.99);
        let alerts: Vec<&str> =
            report["alerts"].as_array().unwrap().iter().filter_map(Json::as_str).collect();
        assert!(alerts.contains(&"A is highly overall correlated with B"));
        assert_eq!(report["table"]["n_duplicates"], 0);
    }

    #[test]
    fn test_missing_alert() {
        let frame = DataFrame::from_columns(vec![(
            "x".to_string(),
            vec![Scalar::Float(1.0), Scalar::Null, Scalar::Float(3.0), Scalar::Float(4.0)],
        )])
        .unwrap();
        let profile = Profile {
            title: "t".into(),
            frame,
        };
        let report = profile.to_json();
        assert_eq!(report["variables"]["x"]["n_missing"], 1);
        assert_eq!(report["alerts"][0], "x has 1 (25.0%) missing values");
    }

    #[test]
    fn test_to_file_writes_html_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut interp = Interpreter::new(dir.path().to_path_buf(), 1_000_000);
        interp
            .run(
                "import pandas as pd\nfrom ydata_profiling import ProfileReport\n\
                 df = pd.DataFrame({'a': [1, 2, 3], 'b': ['x', 'y', 'x']})\n\
                 report = ProfileReport(df, title='Sales <2024>')\n\
                 report.to_file('report.html')\nreport.to_file('report.json')\n",
            )
            .unwrap();
        let html = std::fs::read_to_string(dir.path().join("report.html")).unwrap();
        assert!(html.contains("Sales &lt;2024&gt;"));
        let json = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
        let parsed: Json = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["analysis"]["title"], "Sales <2024>");
        assert_eq!(parsed["variables"]["b"]["n_distinct"], 2);
    }

    #[test]
    fn test_to_file_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let mut interp = Interpreter::new(dir.path().to_path_buf(), 1_000_000);
        let fault = interp
            .run(
                "import pandas as pd\n\
                 from ydata_profiling import ProfileReport\n\
                 ProfileReport(pd.DataFrame({'a': [1]})).to_file('r.pdf')\n",
            )
            .unwrap_err();
        assert_eq!(fault.kind, "ValueError");
    }

    #[test]
    fn test_html_escapes_title() {
        let profile = Profile {
            title: "a<b".into(),
            frame: frame(),
        };
        let html = profile.to_html();
        assert!(html.contains("<h1>a&lt;b</h1>"));
        assert!(html.contains("<h2>Correlations</h2>"));
    }

    #[test]
    fn test_skewness_of_symmetric_data_is_zero() {
        assert!(skewness(&[1.0, 2.0, 3.0, 4.0, 5.0]).abs() < 1e-12);
        assert!(skewness(&[1.0, 2.0]).is_nan());
    }
}
