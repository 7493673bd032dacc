//! Condensing JSON reports into short text the model can read.

use serde_json::Value;

const TRUNCATION_MARKER: &str = "\n... [summary truncated]";

/// Per-variable statistics included in the summary, in display order.
const STAT_KEYS: &[&str] = &["mean", "std", "min", "max"];

/// Summary of the JSON document `text` from the file `name`, at most `limit` characters.
///
/// Profile reports (with `alerts`, `variables` or `correlations` sections) are
/// condensed to those sections; any other JSON is included compactly.
pub fn summarize_report(name: &str, text: &str, limit: usize) -> String {
    let json: Value = match serde_json::from_str(text) {
        Ok(json) => json,
        Err(e) => return cap(format!("[{}] could not be parsed as JSON: {}", name, e), limit),
    };

    let is_profile = ["alerts", "variables", "correlations"]
        .iter()
        .any(|key| json.get(key).is_some());
    let summary = if is_profile {
        profile_summary(name, &json)
    } else {
        format!("[{}] JSON content: {}", name, json)
    };
    cap(summary, limit)
}

fn profile_summary(name: &str, json: &Value) -> String {
    let mut lines = vec![format!("[{}] Report summary", name)];

    if let Some(table) = json.get("table") {
        let rows = table.get("n").map(Value::to_string).unwrap_or_else(|| "?".to_string());
        let cols = table.get("n_var").map(Value::to_string).unwrap_or_else(|| "?".to_string());
        lines.push(format!("Rows: {}, columns: {}", rows, cols));
    }

    if let Some(alerts) = json.get("alerts").and_then(Value::as_array)
        && !alerts.is_empty()
    {
        lines.push("Alerts:".to_string());
        for alert in alerts {
            let text = match alert {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("- {}", text));
        }
    }

    if let Some(variables) = json.get("variables").and_then(Value::as_object)
        && !variables.is_empty()
    {
        lines.push("Variables:".to_string());
        for (column, stats) in variables {
            lines.push(format!("- {}", variable_line(column, stats)));
        }
    }

    if let Some(correlations) = json.get("correlations").and_then(Value::as_object)
        && !correlations.is_empty()
    {
        let keys: Vec<&str> = correlations.keys().map(String::as_str).collect();
        lines.push(format!("Correlations: {}", keys.join(", ")));
    }

    lines.join("\n")
}

fn variable_line(column: &str, stats: &Value) -> String {
    let kind = stats.get("type").and_then(Value::as_str).unwrap_or("Unknown");
    let mut parts = Vec::new();
    if let Some(n) = stats.get("n_distinct") {
        parts.push(format!("distinct={}", n));
    }
    if let Some(n) = stats.get("n_missing") {
        parts.push(format!("missing={}", n));
    }
    for key in STAT_KEYS {
        if let Some(v) = stats.get(*key).and_then(Value::as_f64) {
            parts.push(format!("{}={}", key, short_number(v)));
        }
    }
    if parts.is_empty() {
        format!("{} ({})", column, kind)
    } else {
        format!("{} ({}): {}", column, kind, parts.join(", "))
    }
}

fn short_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.4}", v).trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn cap(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> String {
        json!({
            "analysis": {"title": "Debug"},
            "table": {"n": 6, "n_var": 2},
            "variables": {
                "A": {
                    "type": "Numeric", "n_distinct": 5, "n_missing": 0,
                    "mean": 2.6666666, "std": 1.5, "min": 1.0, "max": 5.0
                },
                "C": {"type": "Categorical", "n_distinct": 3, "n_missing": 1}
            },
            "alerts": ["C has 1 (16.7%) missing values"],
            "correlations": {"pearson": {"A": {"A": 1.0}}}
        })
        .to_string()
    }

    #[test]
    fn test_profile_summary_sections() {
        let summary = summarize_report("report.json", &profile(), 2000);
        assert!(summary.starts_with("[report.json] Report summary"));
        assert!(summary.contains("Rows: 6, columns: 2"));
        assert!(summary.contains("- C has 1 (16.7%) missing values"));
        assert!(summary.contains(
            "- A (Numeric): distinct=5, missing=0, mean=2.6667, std=1.5, min=1, max=5"
        ));
        assert!(summary.contains("- C (Categorical): distinct=3, missing=1"));
        assert!(summary.ends_with("Correlations: pearson"));
    }

    #[test]
    fn test_plain_json_included() {
        let summary = summarize_report("r.json", r#"{"summary": "This is a test summary"}"#, 2000);
        assert!(summary.contains("This is a test summary"));
    }

    #[test]
    fn test_unparseable_json_is_one_line() {
        let summary = summarize_report("bad.json", "{not json", 2000);
        assert!(summary.starts_with("[bad.json] could not be parsed as JSON"));
        assert!(!summary.contains('\n'));
    }

    #[test]
    fn test_summary_is_capped() {
        let alerts: Vec<String> = (0..500).map(|i| format!("column_{} is constant", i)).collect();
        let text = json!({ "alerts": alerts }).to_string();
        let summary = summarize_report("big.json", &text, 300);
        assert_eq!(summary.chars().count(), 300);
        assert!(summary.ends_with("[summary truncated]"));
    }
}
