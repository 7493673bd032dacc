//! `plotly.express`: charts kept as traces, written as plotly HTML or
//! drawn through the figure renderer for static images.

use std::rc::Rc;

use serde_json::{Value as Json, json};

use super::super::error::{Eval, Fault};
use super::super::eval::Interpreter;
use super::super::frame::Scalar;
use super::super::value::{Args, Builtin, Module, Shared, Value, shared};
use super::pyplot::{Vector, Vectors, auto_bins, bin_counts, categories};
use super::{Figure, Mark, Rgb, Style, histogram, numeric, parse_color, push_boxes};

const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// plotly's default qualitative sequence.
const PLOTLY_COLORS: [Rgb; 10] = [
    Rgb(0x63, 0x6e, 0xfa),
    Rgb(0xef, 0x55, 0x3b),
    Rgb(0x00, 0xcc, 0x96),
    Rgb(0xab, 0x63, 0xfa),
    Rgb(0xff, 0xa1, 0x5a),
    Rgb(0x19, 0xd3, 0xf3),
    Rgb(0xff, 0x66, 0x92),
    Rgb(0xb6, 0xe8, 0x80),
    Rgb(0xff, 0x97, 0xff),
    Rgb(0xfe, 0xcb, 0x52),
];

static FUNCTIONS: &[Builtin] = &[
    Builtin { name: "bar", func: bar },
    Builtin { name: "line", func: line },
    Builtin { name: "scatter", func: scatter },
    Builtin { name: "histogram", func: histogram_chart },
    Builtin { name: "pie", func: pie },
    Builtin { name: "box", func: box_chart },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Histogram,
    Pie,
    Box,
}

impl ChartKind {
    pub fn name(self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Histogram => "histogram",
            ChartKind::Pie => "pie",
            ChartKind::Box => "box",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trace {
    pub name: Option<String>,
    pub x: Vec<Scalar>,
    pub y: Vec<Scalar>,
    pub color: Rgb,
}

#[derive(Debug, Clone)]
pub struct Chart {
    pub kind: ChartKind,
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub traces: Vec<Trace>,
    pub horizontal: bool,
    pub markers: bool,
    pub bins: Option<usize>,
    /// `group`, `stack`, `relative` or `overlay`.
    pub barmode: String,
    pub width: u32,
    pub height: u32,
    pub show_legend: bool,
}

pub fn module() -> Value {
    let attrs = FUNCTIONS
        .iter()
        .map(|b| (b.name.to_string(), Value::Builtin(b)))
        .collect();
    Value::Module(Rc::new(Module {
        name: "plotly.express".to_string(),
        attrs,
    }))
}

impl Chart {
    fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            title: None,
            xlabel: None,
            ylabel: None,
            traces: Vec::new(),
            horizontal: false,
            markers: false,
            bins: None,
            barmode: "relative".to_string(),
            width: 700,
            height: 500,
            show_legend: true,
        }
    }

    fn trace_json(&self, trace: &Trace) -> Json {
        let cells = |v: &[Scalar]| Json::Array(v.iter().map(Scalar::json).collect());
        let orientation = if self.horizontal { "h" } else { "v" };
        let mode = match (self.kind, self.markers) {
            (ChartKind::Scatter, _) => "markers",
            (_, true) => "lines+markers",
            _ => "lines",
        };
        let mut t = match self.kind {
            ChartKind::Bar => json!({
                "type": "bar",
                "x": cells(&trace.x),
                "y": cells(&trace.y),
                "orientation": orientation,
                "marker": {"color": trace.color.hex()},
            }),
            ChartKind::Line | ChartKind::Scatter => json!({
                "type": "scatter",
                "mode": mode,
                "x": cells(&trace.x),
                "y": cells(&trace.y),
                "marker": {"color": trace.color.hex()},
                "line": {"color": trace.color.hex()},
            }),
            ChartKind::Histogram => json!({
                "type": "histogram",
                "x": cells(&trace.x),
                "nbinsx": self.bins,
                "marker": {"color": trace.color.hex()},
            }),
            ChartKind::Pie => json!({
                "type": "pie",
                "labels": cells(&trace.x),
                "values": cells(&trace.y),
            }),
            ChartKind::Box => json!({
                "type": "box",
                "x": (!trace.x.is_empty()).then(|| cells(&trace.x)),
                "y": cells(&trace.y),
                "marker": {"color": trace.color.hex()},
            }),
        };
        if let (Some(name), Some(obj)) = (&trace.name, t.as_object_mut()) {
            obj.insert("name".to_string(), Json::String(name.clone()));
        }
        t
    }

    pub fn to_json(&self) -> Json {
        let data: Vec<Json> = self.traces.iter().map(|t| self.trace_json(t)).collect();
        json!({
            "data": data,
            "layout": {
                "title": {"text": self.title},
                "xaxis": {"title": {"text": self.xlabel}},
                "yaxis": {"title": {"text": self.ylabel}},
                "barmode": self.barmode,
                "showlegend": self.show_legend,
                "width": self.width,
                "height": self.height,
                "template": "plotly_white",
            },
        })
    }

    /// Standalone page loading plotly.js from its CDN.
    pub fn to_html(&self) -> String {
        let spec = self.to_json();
        let script = |v: &Json| v.to_string().replace("</", "<\\/");
        format!(
            "<html>\n<head><meta charset=\"utf-8\" /><script src=\"{}\"></script></head>\n<body>\n\
             <div id=\"chart\" style=\"height:100%; width:100%;\"></div>\n\
             <script>Plotly.newPlot(\"chart\", {}, {}, {{\"responsive\": true}});</script>\n\
             </body>\n</html>\n",
            PLOTLY_JS,
            script(&spec["data"]),
            script(&spec["layout"]),
        )
    }

    /// The same chart as a one-panel figure for PNG/SVG output.
    pub fn to_figure(&self) -> Figure {
        let (width, height) = (self.width as f64 / 100.0, self.height as f64 / 100.0);
        let mut figure = Figure::new(width, height, 100.0, 1, 1);
        figure.title = self.title.clone();
        let p = &mut figure.panels[0];
        p.xlabel = self.xlabel.clone();
        p.ylabel = self.ylabel.clone();
        p.grid = true;
        p.legend = self.show_legend && self.traces.len() > 1;
        let style = |t: &Trace, alpha: f64| Style {
            color: t.color,
            label: t.name.clone(),
            alpha,
        };
        match self.kind {
            ChartKind::Bar => {
                let group = self.barmode == "group" && self.traces.len() > 1;
                let width = if group { 0.8 / self.traces.len() as f64 } else { 0.8 };
                let mut stacked: Vec<(f64, f64)> = Vec::new();
                for (k, t) in self.traces.iter().enumerate() {
                    let (keys, values) = if self.horizontal { (&t.y, &t.x) } else { (&t.x, &t.y) };
                    let slots = p.coordinates(keys);
                    let heights = numeric(values);
                    let offset = if group { -0.4 + width * (k as f64 + 0.5) } else { 0.0 };
                    let bottoms = slots
                        .iter()
                        .map(|s| {
                            if group || self.barmode == "overlay" {
                                0.0
                            } else {
                                stacked.iter().filter(|(x, _)| x == s).map(|(_, h)| h).sum()
                            }
                        })
                        .collect();
                    let pairs = slots.iter().copied().zip(heights.iter().copied());
                    stacked.extend(pairs.filter(|(_, h)| h.is_finite()));
                    p.marks.push(Mark::Bars {
                        x: slots.iter().map(|s| s + offset).collect(),
                        heights,
                        bottoms,
                        width,
                        horizontal: self.horizontal,
                        style: style(t, 1.0),
                    });
                }
            }
            ChartKind::Line | ChartKind::Scatter => {
                for t in &self.traces {
                    let x = p.coordinates(&t.x);
                    let y = numeric(&t.y);
                    p.marks.push(if self.kind == ChartKind::Scatter {
                        Mark::Scatter {
                            x,
                            y,
                            style: style(t, 0.8),
                            size: 36.0,
                        }
                    } else {
                        Mark::Line {
                            x,
                            y,
                            style: style(t, 1.0),
                            width: 2.0,
                            markers: self.markers,
                            dashed: false,
                        }
                    });
                }
            }
            ChartKind::Histogram => {
                let all: Vec<f64> = self
                    .traces
                    .iter()
                    .flat_map(|t| numeric(&t.x))
                    .filter(|v| v.is_finite())
                    .collect();
                let (edges, _) = histogram(&all, self.bins.unwrap_or_else(|| auto_bins(all.len())));
                let alpha = if self.traces.len() > 1 { 0.6 } else { 1.0 };
                for t in &self.traces {
                    let counts = bin_counts(&numeric(&t.x), &edges);
                    super::push_histogram(p, &edges, counts, style(t, alpha), false);
                }
            }
            ChartKind::Pie => {
                for t in &self.traces {
                    let values = numeric(&t.y);
                    let total: f64 = values.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
                    let percents =
                        values.iter().map(|v| format!("{:.1}%", 100.0 * v / total)).collect();
                    p.marks.push(Mark::Pie {
                        values,
                        labels: t.x.iter().map(Scalar::display).collect(),
                        percents: Some(percents),
                    });
                }
            }
            ChartKind::Box => {
                for t in &self.traces {
                    let values = numeric(&t.y);
                    let (labels, groups): (Vec<String>, Vec<Vec<f64>>) = if t.x.is_empty() {
                        (vec![t.name.clone().unwrap_or_default()], vec![values])
                    } else {
                        categories(&t.x)
                            .into_iter()
                            .map(|(label, rows)| {
                                let picked = rows.iter().filter_map(|&r| values.get(r).copied());
                                (label, picked.collect())
                            })
                            .unzip()
                    };
                    push_boxes(p, &labels, &groups, style(t, 1.0));
                }
            }
        }
        figure
    }
}

fn label_for(labels: Option<&Value>, vector: Option<&Vector>) -> Option<String> {
    let name = vector?.name.clone()?;
    if let Some(Value::Dict(map)) = labels
        && let Some(v) = map.borrow().get_str(&name)
    {
        return Some(v.to_str());
    }
    Some(name)
}

/// Splits rows into one trace per `color=` group.
fn traces_by_color(vectors: &Vectors, x: &[Scalar], y: &[Scalar]) -> Vec<Trace> {
    let rows = x.len().max(y.len());
    vectors
        .groups(rows)
        .into_iter()
        .enumerate()
        .map(|(k, (name, members))| {
            let take = |v: &[Scalar]| members.iter().filter_map(|&r| v.get(r).cloned()).collect();
            Trace {
                name,
                x: take(x),
                y: take(y),
                color: PLOTLY_COLORS[k % PLOTLY_COLORS.len()],
            }
        })
        .collect()
}

fn build(interp: &mut Interpreter, args: &Args, kind: ChartKind) -> Eval<Chart> {
    let vectors = Vectors::resolve(interp, args, "color")?;
    let mut chart = Chart::new(kind);
    let labels = args.kw("labels");
    chart.title = args.kw("title").filter(|v| !v.is_none()).map(Value::to_str);
    chart.xlabel = label_for(labels, vectors.x.as_ref());
    chart.ylabel = label_for(labels, vectors.y.as_ref());
    chart.horizontal = matches!(args.kw("orientation").and_then(Value::as_str), Some("h"));
    chart.markers = args.flag("markers", false);
    if let Some(mode) = args.kw("barmode").and_then(Value::as_str) {
        chart.barmode = mode.to_string();
    }
    if let Some(v) = args.kw("width").filter(|v| !v.is_none()) {
        chart.width = v.expect_int("width")?.clamp(50, 4096) as u32;
    }
    if let Some(v) = args.kw("height").filter(|v| !v.is_none()) {
        chart.height = v.expect_int("height")?.clamp(50, 4096) as u32;
    }

    // Wide form: several y columns become one trace each.
    if let Some(Value::List(names)) = args.kw("y") {
        let names = names.borrow().clone();
        let x = vectors.x.as_ref().map(|v| v.values.clone());
        for (k, name) in names.iter().enumerate() {
            let y = vectors
                .lookup(interp, Some(name))?
                .ok_or_else(|| Fault::value_error("y columns must not be None"))?;
            let x =
                x.clone().unwrap_or_else(|| (0..y.values.len() as i64).map(Scalar::Int).collect());
            chart.traces.push(Trace {
                name: Some(name.to_str()),
                x,
                y: y.values,
                color: PLOTLY_COLORS[k % PLOTLY_COLORS.len()],
            });
        }
        chart.ylabel = Some("value".to_string());
        return Ok(chart);
    }

    let x = vectors.x.as_ref().map(|v| v.values.clone());
    let y = vectors.y.as_ref().map(|v| v.values.clone());
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        (Some(x), None) => {
            let n = x.len() as i64;
            (x, (0..n).map(Scalar::Int).collect())
        }
        (None, Some(y)) => {
            let n = y.len() as i64;
            ((0..n).map(Scalar::Int).collect(), y)
        }
        (None, None) => match &vectors.data {
            Some(frame) if frame.columns.len() == 1 => {
                (frame.index.labels.clone(), frame.data[0].clone())
            }
            _ => return Err(Fault::value_error("x or y must be given")),
        },
    };
    chart.traces = traces_by_color(&vectors, &x, &y);
    if let Some(Value::Str(spec)) = args.kw("color_discrete_sequence").and_then(|v| match v {
        Value::List(items) => items.borrow().first().cloned(),
        _ => None,
    }) && let Some(rgb) = parse_color(&spec)
    {
        for t in &mut chart.traces {
            t.color = rgb;
        }
    }
    Ok(chart)
}

fn chart_value(chart: Chart) -> Value {
    Value::Chart(shared(chart))
}

fn bar(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(chart_value(build(interp, &args, ChartKind::Bar)?))
}

fn line(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(chart_value(build(interp, &args, ChartKind::Line)?))
}

fn scatter(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(chart_value(build(interp, &args, ChartKind::Scatter)?))
}

fn histogram_chart(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let mut chart = build(interp, &args, ChartKind::Histogram)?;
    chart.bins = match args.kw("nbins") {
        Some(v) if !v.is_none() => Some(v.expect_int("nbins")?.max(1) as usize),
        _ => None,
    };
    chart.ylabel = Some("count".to_string());
    if chart.barmode == "relative" && chart.traces.len() > 1 {
        chart.barmode = "overlay".to_string();
    }
    Ok(chart_value(chart))
}

fn pie(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "color")?;
    let names = vectors
        .lookup(interp, args.kw("names"))?
        .ok_or_else(|| Fault::value_error("pie() requires `names`"))?;
    let values = vectors
        .lookup(interp, args.kw("values"))?
        .ok_or_else(|| Fault::value_error("pie() requires `values`"))?;
    let mut chart = Chart::new(ChartKind::Pie);
    chart.title = args.kw("title").filter(|v| !v.is_none()).map(Value::to_str);
    chart.traces.push(Trace {
        name: None,
        x: names.values,
        y: values.values,
        color: PLOTLY_COLORS[0],
    });
    Ok(chart_value(chart))
}

fn box_chart(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let mut chart = build(interp, &args, ChartKind::Box)?;
    // A lone `y` draws one box rather than one box per row.
    if args.kw("x").is_none() {
        for t in &mut chart.traces {
            t.x.clear();
        }
    }
    Ok(chart_value(chart))
}

/// Methods on a plotly figure.
pub fn chart_method(
    interp: &mut Interpreter,
    chart: &Shared<Chart>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    match name {
        "write_html" => {
            let path = args.required(0, "file", "write_html")?.clone();
            let html = chart.borrow().to_html();
            interp.write_output(&path, html.as_bytes())?;
            Ok(Value::None)
        }
        "write_image" => {
            let path = args.required(0, "file", "write_image")?.clone();
            let name = path.expect_str("file")?;
            let mut snapshot = chart.borrow().clone();
            if let Some(w) = args.kw("width").and_then(Value::as_f64) {
                snapshot.width = w.clamp(50.0, 4096.0) as u32;
            }
            if let Some(h) = args.kw("height").and_then(Value::as_f64) {
                snapshot.height = h.clamp(50.0, 4096.0) as u32;
            }
            let mut figure = snapshot.to_figure();
            if let Some(scale) = args.kw("scale").and_then(Value::as_f64) {
                figure.dpi *= scale.clamp(0.25, 4.0);
            }
            let bytes = figure.encode_for(&name)?;
            interp.write_output(&path, &bytes)?;
            Ok(Value::None)
        }
        "update_layout" => {
            let mut c = chart.borrow_mut();
            for (key, value) in &args.kw {
                let text = || (!value.is_none()).then(|| value.to_str());
                match key.as_str() {
                    "title" | "title_text" => c.title = text(),
                    "xaxis_title" | "xaxis_title_text" => c.xlabel = text(),
                    "yaxis_title" | "yaxis_title_text" => c.ylabel = text(),
                    "barmode" => c.barmode = value.to_str(),
                    "showlegend" => c.show_legend = value.truthy(),
                    "width" => c.width = value.expect_int("width")?.clamp(50, 4096) as u32,
                    "height" => c.height = value.expect_int("height")?.clamp(50, 4096) as u32,
                    _ => {}
                }
            }
            drop(c);
            Ok(Value::Chart(chart.clone()))
        }
        "update_xaxes" | "update_yaxes" => {
            if let Some(title) = args.kw("title_text").or_else(|| args.kw("title")) {
                let mut c = chart.borrow_mut();
                let title = (!title.is_none()).then(|| title.to_str());
                if name == "update_xaxes" {
                    c.xlabel = title;
                } else {
                    c.ylabel = title;
                }
            }
            Ok(Value::Chart(chart.clone()))
        }
        "update_traces" => {
            let color = args.kw("marker_color").and_then(Value::as_str).and_then(parse_color);
            if let Some(color) = color {
                for t in &mut chart.borrow_mut().traces {
                    t.color = color;
                }
            }
            Ok(Value::Chart(chart.clone()))
        }
        "to_json" => Ok(Value::str(&chart.borrow().to_json().to_string())),
        "to_html" => Ok(Value::str(&chart.borrow().to_html())),
        "show" => Ok(Value::None),
        _ => Err(Fault::attribute_error(format!("'Figure' object has no attribute '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Scalar {
        Scalar::Str(Rc::from(s))
    }

    fn sample() -> Chart {
        let mut chart = Chart::new(ChartKind::Bar);
        chart.title = Some("Revenue </script>".into());
        chart.xlabel = Some("region".into());
        chart.traces.push(Trace {
            name: None,
            x: vec![text("north"), text("south")],
            y: vec![Scalar::Int(3), Scalar::Float(4.5)],
            color: PLOTLY_COLORS[0],
        });
        chart
    }

    #[test]
    fn test_to_json_shapes_traces() {
        let spec = sample().to_json();
        assert_eq!(spec["data"][0]["type"], "bar");
        assert_eq!(spec["data"][0]["x"][1], "south");
        assert_eq!(spec["data"][0]["y"][1], 4.5);
        assert_eq!(spec["layout"]["xaxis"]["title"]["text"], "region");
    }

    #[test]
    fn test_to_html_loads_plotly_and_escapes_script_end() {
        let html = sample().to_html();
        assert!(html.contains(PLOTLY_JS));
        assert!(html.contains("Plotly.newPlot"));
        assert!(!html.contains("Revenue </script>"));
    }

    #[test]
    fn test_to_figure_draws_bars() {
        let figure = sample().to_figure();
        assert_eq!(figure.width_px(), 700);
        assert_eq!(figure.panels[0].categories, vec!["north".to_string(), "south".to_string()]);
        assert!(matches!(figure.panels[0].marks[0], Mark::Bars { .. }));
    }

    #[test]
    fn test_pie_figure_has_percent_labels() {
        let mut chart = Chart::new(ChartKind::Pie);
        chart.traces.push(Trace {
            name: None,
            x: vec![text("a"), text("b")],
            y: vec![Scalar::Int(1), Scalar::Int(3)],
            color: PLOTLY_COLORS[0],
        });
        let figure = chart.to_figure();
        match &figure.panels[0].marks[0] {
            Mark::Pie { percents, .. } => {
                let expected = ["25.0%".to_string(), "75.0%".to_string()];
                assert_eq!(percents.as_deref(), Some(&expected[..]));
            }
            other => panic!("unexpected mark {:?}", other),
        }
    }
}
