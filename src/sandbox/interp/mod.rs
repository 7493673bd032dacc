//! A tree-walking interpreter for the Python subset generated analysis code uses.
//!
//! The interpreter only knows the primitives in its builtin table and the modules in
//! its import table. There is no file, process or reflection access; the only file
//! writers are the chart, report and table exporters, which are confined to the
//! `output_dir` given at construction.

mod ast;
mod builtins;
mod error;
mod eval;
mod format;
mod frame;
mod lower;
mod methods;
mod modules;
mod ops;
mod pandas;
mod plot;
mod value;

use indexmap::IndexMap;

use crate::dataset::Dataset;

pub use error::{Eval, Fault};
pub use eval::Interpreter;
pub use value::Value;

use value::Dict;

/// A fresh `DataFrame` value holding a copy of `dataset`.
pub fn dataset_value(dataset: &Dataset) -> Value {
    pandas::frame_value(frame::DataFrame::from_dataset(dataset))
}

/// Convert plain JSON into interpreter values.
pub fn json_value(json: &serde_json::Value) -> Eval<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => {
            Value::list(items.iter().map(json_value).collect::<Eval<Vec<_>>>()?)
        }
        serde_json::Value::Object(map) => {
            let mut dict = Dict::new();
            for (k, v) in map {
                dict.insert(Value::str(k), json_value(v)?)?;
            }
            Value::dict(dict)
        }
    })
}

/// Whether a binding belongs to the namespace rather than to the snippet's results.
pub fn is_namespace_binding(value: &Value) -> bool {
    matches!(value, Value::Module(_) | Value::Builtin(_) | Value::Class(_))
}

/// Display strings for every result binding, in definition order.
pub fn render_bindings(
    bindings: Vec<(String, Value)>,
    placeholder: &str,
) -> IndexMap<String, String> {
    bindings
        .into_iter()
        .filter(|(_, v)| !is_namespace_binding(v))
        .map(|(k, v)| {
            let text = v.try_str().unwrap_or_else(|| placeholder.to_string());
            (k, text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_value_nested() {
        let value = json_value(&json!({"a": [1, 2.5, null], "b": true})).unwrap();
        assert_eq!(value.repr(), "{'a': [1, 2.5, None], 'b': True}");
    }

    #[test]
    fn test_render_bindings_skips_modules() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 100_000);
        interp.run("import math\nx = 3\nname = 'hi'\nf = abs\n").unwrap();
        let rendered = render_bindings(interp.locals(), "<unserializable>");
        assert_eq!(rendered.get("x").map(String::as_str), Some("3"));
        assert_eq!(rendered.get("name").map(String::as_str), Some("hi"));
        assert!(!rendered.contains_key("math"));
        assert!(!rendered.contains_key("f"));
    }

    #[test]
    fn test_self_referencing_list_uses_placeholder() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 100_000);
        interp.run("a = []\nfor _ in range(60):\n    a = [a]\n").unwrap();
        let rendered = render_bindings(interp.locals(), "<unserializable>");
        assert_eq!(rendered.get("a").map(String::as_str), Some("<unserializable>"));
    }
}
