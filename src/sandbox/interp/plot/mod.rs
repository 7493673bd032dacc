//! Figures for matplotlib, seaborn and pandas `.plot`, plus plotly charts.
//!
//! A [`Figure`] is a grid of [`Panel`]s, each holding marks in data coordinates.
//! Nothing is rasterized until `savefig`, which lays the figure out once and
//! writes it as PNG or SVG.

mod express;
mod png;
mod pyplot;
mod raster;
mod render;
mod svg;

use super::error::{Eval, Fault};
use super::eval::Interpreter;
use super::format::{format_value, percent_format};
use super::frame::{DataFrame, Scalar, quantile, variance};
use super::pandas::scalars_of;
use super::value::{Args, Shared, Value, shared};

pub use express::{Chart, chart_method, module as express_module};
pub use pyplot::{matplotlib_module, module as pyplot_module, seaborn_module};

pub const DEFAULT_SIZE: (f64, f64) = (6.4, 4.8);
pub const DEFAULT_DPI: f64 = 100.0;
const MAX_PIXELS: f64 = 4096.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const INK: Rgb = Rgb(0x33, 0x33, 0x33);
    pub const GRID: Rgb = Rgb(0xdd, 0xdd, 0xdd);

    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    /// `self` painted over `under` with the given opacity.
    pub fn over(self, under: Rgb, alpha: f64) -> Rgb {
        let mix = |a: u8, b: u8| {
            (a as f64 * alpha + b as f64 * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8
        };
        Rgb(mix(self.0, under.0), mix(self.1, under.1), mix(self.2, under.2))
    }

    pub fn luminance(self) -> f64 {
        0.299 * self.0 as f64 + 0.587 * self.1 as f64 + 0.114 * self.2 as f64
    }
}

/// matplotlib's `tab10` cycle.
pub const PALETTE: [Rgb; 10] = [
    Rgb(0x1f, 0x77, 0xb4),
    Rgb(0xff, 0x7f, 0x0e),
    Rgb(0x2c, 0xa0, 0x2c),
    Rgb(0xd6, 0x27, 0x28),
    Rgb(0x94, 0x67, 0xbd),
    Rgb(0x8c, 0x56, 0x4b),
    Rgb(0xe3, 0x77, 0xc2),
    Rgb(0x7f, 0x7f, 0x7f),
    Rgb(0xbc, 0xbd, 0x22),
    Rgb(0x17, 0xbe, 0xcf),
];

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("blue", Rgb(0x1f, 0x77, 0xb4)),
    ("orange", Rgb(0xff, 0x7f, 0x0e)),
    ("green", Rgb(0x2c, 0xa0, 0x2c)),
    ("red", Rgb(0xd6, 0x27, 0x28)),
    ("purple", Rgb(0x94, 0x67, 0xbd)),
    ("brown", Rgb(0x8c, 0x56, 0x4b)),
    ("pink", Rgb(0xe3, 0x77, 0xc2)),
    ("gray", Rgb(0x7f, 0x7f, 0x7f)),
    ("grey", Rgb(0x7f, 0x7f, 0x7f)),
    ("olive", Rgb(0xbc, 0xbd, 0x22)),
    ("cyan", Rgb(0x17, 0xbe, 0xcf)),
    ("black", Rgb(0, 0, 0)),
    ("white", Rgb(255, 255, 255)),
    ("yellow", Rgb(0xff, 0xd7, 0x00)),
    ("gold", Rgb(0xff, 0xd7, 0x00)),
    ("navy", Rgb(0x00, 0x00, 0x80)),
    ("teal", Rgb(0x00, 0x80, 0x80)),
    ("magenta", Rgb(0xff, 0x00, 0xff)),
    ("skyblue", Rgb(0x87, 0xce, 0xeb)),
    ("lightblue", Rgb(0xad, 0xd8, 0xe6)),
    ("steelblue", Rgb(0x46, 0x82, 0xb4)),
    ("darkblue", Rgb(0x00, 0x00, 0x8b)),
    ("lightgreen", Rgb(0x90, 0xee, 0x90)),
    ("darkgreen", Rgb(0x00, 0x64, 0x00)),
    ("coral", Rgb(0xff, 0x7f, 0x50)),
    ("salmon", Rgb(0xfa, 0x80, 0x72)),
    ("tomato", Rgb(0xff, 0x63, 0x47)),
    ("crimson", Rgb(0xdc, 0x14, 0x3c)),
    ("indigo", Rgb(0x4b, 0x00, 0x82)),
    ("violet", Rgb(0xee, 0x82, 0xee)),
    ("lightgray", Rgb(0xd3, 0xd3, 0xd3)),
    ("lightgrey", Rgb(0xd3, 0xd3, 0xd3)),
    ("darkgray", Rgb(0xa9, 0xa9, 0xa9)),
    ("darkorange", Rgb(0xff, 0x8c, 0x00)),
];

/// matplotlib color spec: names, single letters, `C0`..`C9`, `#rgb` and `#rrggbb`.
pub fn parse_color(spec: &str) -> Option<Rgb> {
    let spec = spec.trim().to_ascii_lowercase();
    let spec = spec.strip_prefix("tab:").unwrap_or(&spec);
    if let Some(hex) = spec.strip_prefix('#') {
        let digits: Vec<u8> = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<_>>>()?;
        return match digits.as_slice() {
            [r, g, b] => Some(Rgb(r * 17, g * 17, b * 17)),
            [r1, r2, g1, g2, b1, b2] => Some(Rgb(r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2)),
            _ => None,
        };
    }
    if let Some(n) = spec.strip_prefix('c')
        && let Ok(i) = n.parse::<usize>()
    {
        return Some(PALETTE[i % PALETTE.len()]);
    }
    let letter = match spec {
        "b" => Some(Rgb(0, 0, 255)),
        "g" => Some(Rgb(0, 128, 0)),
        "r" => Some(Rgb(255, 0, 0)),
        "c" => Some(Rgb(0, 191, 191)),
        "m" => Some(Rgb(191, 0, 191)),
        "y" => Some(Rgb(191, 191, 0)),
        "k" => Some(Rgb::BLACK),
        "w" => Some(Rgb::WHITE),
        _ => None,
    };
    letter.or_else(|| NAMED_COLORS.iter().find(|(name, _)| *name == spec).map(|(_, rgb)| *rgb))
}

#[derive(Debug, Clone)]
pub struct Style {
    pub color: Rgb,
    pub label: Option<String>,
    pub alpha: f64,
}

#[derive(Debug, Clone)]
pub enum Mark {
    Line {
        x: Vec<f64>,
        y: Vec<f64>,
        style: Style,
        width: f64,
        markers: bool,
        dashed: bool,
    },
    Scatter {
        x: Vec<f64>,
        y: Vec<f64>,
        style: Style,
        size: f64,
    },
    Bars {
        x: Vec<f64>,
        heights: Vec<f64>,
        bottoms: Vec<f64>,
        width: f64,
        horizontal: bool,
        style: Style,
    },
    Pie {
        values: Vec<f64>,
        labels: Vec<String>,
        percents: Option<Vec<String>>,
    },
    Boxes {
        positions: Vec<f64>,
        stats: Vec<[f64; 5]>,
        style: Style,
    },
    Heat {
        rows: Vec<String>,
        cols: Vec<String>,
        values: Vec<Vec<f64>>,
        notes: Option<Vec<Vec<String>>>,
    },
    Rule {
        value: f64,
        vertical: bool,
        style: Style,
        dashed: bool,
    },
}

impl Mark {
    fn style(&self) -> Option<&Style> {
        match self {
            Mark::Line { style, .. }
            | Mark::Scatter { style, .. }
            | Mark::Bars { style, .. }
            | Mark::Boxes { style, .. }
            | Mark::Rule { style, .. } => Some(style),
            Mark::Pie { .. } | Mark::Heat { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AxisKind {
    #[default]
    Number,
    Category,
    Time,
}

/// One set of axes.
#[derive(Debug, Clone, Default)]
pub struct Panel {
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub marks: Vec<Mark>,
    /// Tick labels for slot positions `0..n` on the category axis.
    pub categories: Vec<String>,
    pub x_axis: AxisKind,
    pub legend: bool,
    pub grid: bool,
    pub xlim: Option<(f64, f64)>,
    pub ylim: Option<(f64, f64)>,
    colors_used: usize,
}

impl Panel {
    pub fn next_color(&mut self) -> Rgb {
        let color = PALETTE[self.colors_used % PALETTE.len()];
        self.colors_used += 1;
        color
    }

    /// Style from `color=`/`c=`, `label=` and `alpha=`, falling back to the color cycle.
    pub fn style(&mut self, args: &Args) -> Eval<Style> {
        let color = match args.kw("color").or_else(|| args.kw("c")) {
            Some(Value::Str(spec)) => match parse_color(spec) {
                Some(rgb) => rgb,
                None => {
                    return Err(Fault::value_error(format!(
                        "{:?} is not a valid color value",
                        &**spec
                    )));
                }
            },
            _ => self.next_color(),
        };
        let label = args.kw("label").filter(|v| !v.is_none()).map(Value::to_str);
        let alpha = match args.kw("alpha") {
            Some(v) if !v.is_none() => v.expect_f64("alpha")?.clamp(0.0, 1.0),
            _ => 1.0,
        };
        Ok(Style { color, label, alpha })
    }

    pub fn category_slot(&mut self, label: &str) -> f64 {
        self.x_axis = AxisKind::Category;
        match self.categories.iter().position(|c| c == label) {
            Some(i) => i as f64,
            None => {
                self.categories.push(label.to_string());
                (self.categories.len() - 1) as f64
            }
        }
    }

    /// Plot coordinates: numbers as-is, datetimes as epoch seconds, text as category slots.
    pub fn coordinates(&mut self, values: &[Scalar]) -> Vec<f64> {
        if values.iter().any(|v| matches!(v, Scalar::Str(_) | Scalar::Tuple(_))) {
            return values.iter().map(|v| self.category_slot(&v.display())).collect();
        }
        if values.iter().any(|v| matches!(v, Scalar::DateTime(_))) {
            self.x_axis = AxisKind::Time;
            return values
                .iter()
                .map(|v| match v {
                    Scalar::DateTime(d) => d.and_utc().timestamp() as f64,
                    _ => f64::NAN,
                })
                .collect();
        }
        values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect()
    }

    pub fn legend_entries(&self) -> Vec<(String, Rgb)> {
        self.marks
            .iter()
            .filter_map(|m| m.style())
            .filter_map(|s| s.label.clone().map(|l| (l, s.color)))
            .filter(|(l, _)| !l.starts_with('_'))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Figure {
    pub width: f64,
    pub height: f64,
    pub dpi: f64,
    pub rows: usize,
    pub cols: usize,
    pub panels: Vec<Panel>,
    pub current: usize,
    pub title: Option<String>,
}

impl Figure {
    pub fn new(width: f64, height: f64, dpi: f64, rows: usize, cols: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            width,
            height,
            dpi,
            rows,
            cols,
            panels: vec![Panel::default(); rows * cols],
            current: 0,
            title: None,
        }
    }

    pub fn width_px(&self) -> u32 {
        (self.width * self.dpi).round().clamp(16.0, MAX_PIXELS) as u32
    }

    pub fn height_px(&self) -> u32 {
        (self.height * self.dpi).round().clamp(16.0, MAX_PIXELS) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.panels.iter().all(|p| p.marks.is_empty())
    }

    pub fn to_svg(&self) -> String {
        svg::write(&render::layout(self))
    }

    pub fn to_png(&self) -> Eval<Vec<u8>> {
        let scene = render::layout(self);
        let canvas = raster::paint(&scene);
        png::encode(canvas.width, canvas.height, &canvas.pixels)
            .map_err(|e| Fault::new("OSError", format!("could not encode PNG: {}", e)))
    }

    /// Encodes by file extension; only PNG and SVG are produced.
    pub fn encode_for(&self, path: &str) -> Eval<Vec<u8>> {
        let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
        match ext.as_str() {
            "png" | "" => self.to_png(),
            "svg" => Ok(self.to_svg().into_bytes()),
            other => Err(Fault::value_error(format!(
                "Format '{}' is not supported (supported formats: png, svg)",
                other
            ))),
        }
    }
}

/// The pyplot "current figure", created on first use.
pub fn current_figure(interp: &mut Interpreter) -> Shared<Figure> {
    interp
        .figure
        .get_or_insert_with(|| {
            shared(Figure::new(DEFAULT_SIZE.0, DEFAULT_SIZE.1, DEFAULT_DPI, 1, 1))
        })
        .clone()
}

fn figsize(args: &Args) -> Eval<Option<(f64, f64)>> {
    match args.kw("figsize") {
        Some(Value::Tuple(items)) if items.len() == 2 => {
            Ok(Some((items[0].expect_f64("figsize")?, items[1].expect_f64("figsize")?)))
        }
        Some(Value::List(items)) if items.borrow().len() == 2 => {
            let items = items.borrow();
            Ok(Some((items[0].expect_f64("figsize")?, items[1].expect_f64("figsize")?)))
        }
        Some(Value::None) | None => Ok(None),
        Some(other) => Err(Fault::type_error(format!(
            "figsize must be a (width, height) pair, not {}",
            other.type_name()
        ))),
    }
}

/// Start a fresh current figure.
pub fn new_figure(
    interp: &mut Interpreter,
    args: &Args,
    rows: usize,
    cols: usize,
) -> Eval<Shared<Figure>> {
    let (width, height) = figsize(args)?.unwrap_or(DEFAULT_SIZE);
    let dpi = match args.kw("dpi") {
        Some(v) if !v.is_none() => v.expect_f64("dpi")?,
        _ => DEFAULT_DPI,
    };
    if width <= 0.0 || height <= 0.0 || dpi <= 0.0 {
        return Err(Fault::value_error("figure size and dpi must be positive"));
    }
    let figure = shared(Figure::new(width, height, dpi, rows, cols));
    interp.figure = Some(figure.clone());
    Ok(figure)
}

/// Axes named by `ax=`, else the current panel of the current figure.
pub fn target_axes(interp: &mut Interpreter, args: &Args) -> Eval<(Shared<Figure>, usize)> {
    match args.kw("ax") {
        Some(Value::Axes(fig, panel)) => Ok((fig.clone(), *panel)),
        Some(Value::None) | None => {
            let fig = if figsize(args)?.is_some() {
                new_figure(interp, args, 1, 1)?
            } else {
                current_figure(interp)
            };
            let panel = fig.borrow().current;
            Ok((fig, panel))
        }
        Some(other) => {
            Err(Fault::type_error(format!("ax must be an Axes, not {}", other.type_name())))
        }
    }
}

pub fn numbers(interp: &mut Interpreter, value: &Value) -> Eval<Vec<f64>> {
    Ok(scalars_of(interp, value)?
        .iter()
        .map(|v| v.as_f64().unwrap_or(f64::NAN))
        .collect())
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// numpy-style equal-width histogram: `bins + 1` edges, last bin closed.
pub fn histogram(values: &[f64], bins: usize) -> (Vec<f64>, Vec<f64>) {
    let values = finite(values);
    let bins = bins.max(1);
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let (lo, hi) = if values.is_empty() {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    };
    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
    let mut counts = vec![0.0; bins];
    for v in values {
        let slot = (((v - lo) / width) as usize).min(bins - 1);
        counts[slot] += 1.0;
    }
    (edges, counts)
}

/// Box-and-whisker numbers: whiskers reach the furthest point within 1.5 IQR.
pub fn box_stats(values: &[f64]) -> [f64; 5] {
    let values = finite(values);
    if values.is_empty() {
        return [f64::NAN; 5];
    }
    let q1 = quantile(&values, 0.25);
    let median = quantile(&values, 0.5);
    let q3 = quantile(&values, 0.75);
    let reach = 1.5 * (q3 - q1);
    let low = values.iter().copied().filter(|v| *v >= q1 - reach).fold(f64::INFINITY, f64::min);
    let high =
        values.iter().copied().filter(|v| *v <= q3 + reach).fold(f64::NEG_INFINITY, f64::max);
    [low, q1, median, q3, high]
}

/// Gaussian kernel density with Scott's bandwidth, sampled at 200 points.
pub fn kde(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let values = finite(values);
    let n = values.len() as f64;
    let sd = variance(&values, 1).sqrt();
    if values.len() < 2 || !sd.is_finite() || sd == 0.0 {
        return (Vec::new(), Vec::new());
    }
    let bw = sd * n.powf(-0.2);
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min) - 3.0 * bw;
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 3.0 * bw;
    let norm = 1.0 / (n * bw * (2.0 * std::f64::consts::PI).sqrt());
    let xs: Vec<f64> = (0..200).map(|i| lo + (hi - lo) * i as f64 / 199.0).collect();
    let ys = xs
        .iter()
        .map(|x| norm * values.iter().map(|v| (-0.5 * ((x - v) / bw).powi(2)).exp()).sum::<f64>())
        .collect();
    (xs, ys)
}

fn bins_arg(args: &Args) -> Eval<usize> {
    match args.kw("bins") {
        Some(v) if !v.is_none() => Ok(v.expect_int("bins")?.max(1) as usize),
        _ => Ok(10),
    }
}

/// matplotlib format strings such as `'ro--'`.
struct LineFormat {
    color: Option<Rgb>,
    markers: bool,
    line: bool,
    dashed: bool,
}

fn parse_line_format(fmt: &str) -> LineFormat {
    let color = fmt.chars().find_map(|c| match c {
        'b' | 'g' | 'r' | 'c' | 'm' | 'y' | 'k' | 'w' => parse_color(&c.to_string()),
        _ => None,
    });
    let markers = fmt.contains(['o', '.', 's', '^', 'x', '*', 'd', 'D', '+']);
    let dashed = fmt.contains("--") || fmt.contains(':') || fmt.contains("-.");
    let line = fmt.contains('-') || fmt.contains(':') || !markers;
    LineFormat {
        color,
        markers,
        line,
        dashed,
    }
}

fn dashed_linestyle(args: &Args) -> bool {
    matches!(
        args.kw("linestyle").or_else(|| args.kw("ls")).and_then(Value::as_str),
        Some("--" | ":" | "-." | "dashed" | "dotted")
    )
}

/// Rows, columns and 1-based index from a three-digit subplot code such as `211`.
pub(super) fn subplot_code(code: i64) -> (usize, usize, usize) {
    ((code / 100) as usize, (code / 10 % 10) as usize, (code % 10) as usize)
}

/// Axes operations shared by `plt.<name>`, `ax.<name>` and `ax.set_<name>`.
/// `Ok(None)` means the name is not an axes operation.
pub fn panel_call(
    interp: &mut Interpreter,
    fig: &Shared<Figure>,
    panel: usize,
    name: &str,
    args: &Args,
) -> Eval<Option<Value>> {
    let text_arg =
        |i: usize, n: &str| -> Eval<Option<String>> { Ok(args.opt(i, n).map(Value::to_str)) };
    match name {
        "plot" => {
            let (x, y, fmt) = match args.pos.as_slice() {
                [y] => (None, y.clone(), None),
                [y, Value::Str(f)] => (None, y.clone(), Some(f.to_string())),
                [x, y] => (Some(x.clone()), y.clone(), None),
                [x, y, Value::Str(f), ..] => (Some(x.clone()), y.clone(), Some(f.to_string())),
                _ => {
                    let y = args
                        .kw("y")
                        .cloned()
                        .ok_or_else(|| Fault::type_error("plot() requires y values"))?;
                    (args.kw("x").cloned(), y, None)
                }
            };
            let ys = numbers(interp, &y)?;
            let xs = match &x {
                Some(x) => Some(scalars_of(interp, x)?),
                None => None,
            };
            let format = parse_line_format(fmt.as_deref().unwrap_or("-"));
            let dashed = format.dashed || dashed_linestyle(args);
            let markers = format.markers || args.kw("marker").is_some_and(|m| !m.is_none());
            let width = match args.kw("linewidth").or_else(|| args.kw("lw")) {
                Some(v) => v.expect_f64("linewidth")?,
                None => 1.5,
            };
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            let mut style = p.style(args)?;
            if let Some(c) = format.color
                && args.kw("color").is_none()
            {
                style.color = c;
            }
            let xs = match xs {
                Some(xs) => p.coordinates(&xs),
                None => (0..ys.len()).map(|i| i as f64).collect(),
            };
            if xs.len() != ys.len() {
                return Err(Fault::value_error(format!(
                    "x and y must have same first dimension, but have shapes ({},) and ({},)",
                    xs.len(),
                    ys.len()
                )));
            }
            if !format.line && markers {
                p.marks.push(Mark::Scatter { x: xs, y: ys, style, size: 36.0 });
            } else {
                p.marks.push(Mark::Line { x: xs, y: ys, style, width, markers, dashed });
            }
            Ok(Some(Value::None))
        }
        "scatter" => {
            let x = scalars_of(interp, args.required(0, "x", "scatter")?)?;
            let y = numbers(interp, args.required(1, "y", "scatter")?)?;
            let size = match args.get(2, "s") {
                Some(Value::Int(i)) => *i as f64,
                Some(Value::Float(f)) => *f,
                _ => 36.0,
            };
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            let style = p.style(args)?;
            let x = p.coordinates(&x);
            if x.len() != y.len() {
                return Err(Fault::value_error("x and y must be the same size"));
            }
            p.marks.push(Mark::Scatter { x, y, style, size });
            Ok(Some(Value::None))
        }
        "bar" | "barh" => {
            let horizontal = name == "barh";
            let (slot_name, height_name) =
                if horizontal { ("y", "width") } else { ("x", "height") };
            let slots = scalars_of(interp, args.required(0, slot_name, name)?)?;
            let heights = numbers(interp, args.required(1, height_name, name)?)?;
            let thickness = match args.kw(if horizontal { "height" } else { "width" }) {
                Some(v) => v.expect_f64("width")?,
                None => 0.8,
            };
            let bottoms = match args.kw(if horizontal { "left" } else { "bottom" }) {
                Some(v) if !v.is_none() => {
                    let b = numbers(interp, v)?;
                    if b.len() == 1 { vec![b[0]; heights.len()] } else { b }
                }
                _ => vec![0.0; heights.len()],
            };
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            let style = p.style(args)?;
            let x = p.coordinates(&slots);
            if x.len() != heights.len() || bottoms.len() != heights.len() {
                return Err(Fault::value_error(format!(
                    "shape mismatch: objects cannot be broadcast to a single shape ({} vs {})",
                    x.len(),
                    heights.len()
                )));
            }
            p.marks.push(Mark::Bars {
                x,
                heights,
                bottoms,
                width: thickness,
                horizontal,
                style,
            });
            Ok(Some(Value::None))
        }
        "hist" => {
            let values = numbers(interp, args.required(0, "x", "hist")?)?;
            let bins = match args.get(1, "bins") {
                Some(v) if !v.is_none() => v.expect_int("bins")?.max(1) as usize,
                _ => 10,
            };
            let horizontal =
                matches!(args.kw("orientation").and_then(Value::as_str), Some("horizontal"));
            let (edges, counts) = histogram(&values, bins);
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            let style = p.style(args)?;
            push_histogram(p, &edges, counts.clone(), style, horizontal);
            let counts = Value::list(counts.into_iter().map(Value::Float).collect());
            let edges = Value::list(edges.into_iter().map(Value::Float).collect());
            Ok(Some(Value::tuple(vec![counts, edges, Value::None])))
        }
        "pie" => {
            let values = numbers(interp, args.required(0, "x", "pie")?)?;
            let labels = match args.get(1, "labels") {
                Some(v) if !v.is_none() => {
                    scalars_of(interp, v)?.iter().map(Scalar::display).collect()
                }
                _ => vec![String::new(); values.len()],
            };
            let total: f64 = values.iter().filter(|v| v.is_finite()).sum();
            let percents = match args.kw("autopct") {
                Some(Value::Str(fmt)) => Some(
                    values
                        .iter()
                        .map(|v| percent_format(fmt, &Value::Float(100.0 * v / total)))
                        .collect::<Eval<Vec<_>>>()?,
                ),
                _ => None,
            };
            if values.iter().any(|v| *v < 0.0) {
                return Err(Fault::value_error("Wedge sizes 'x' must be non negative values"));
            }
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            p.marks.push(Mark::Pie { values, labels, percents });
            Ok(Some(Value::None))
        }
        "boxplot" => {
            let data = args.required(0, "x", "boxplot")?.clone();
            let groups: Vec<Vec<f64>> = match &data {
                Value::Frame(frame) => {
                    let frame = frame.borrow().clone();
                    frame.numeric_columns().iter().map(|&c| numeric(&frame.data[c])).collect()
                }
                Value::List(items)
                    if items.borrow().iter().all(|v| {
                        matches!(v, Value::List(_) | Value::Series(_) | Value::Tuple(_))
                    }) =>
                {
                    let items = items.borrow().clone();
                    items.iter().map(|v| numbers(interp, v)).collect::<Eval<_>>()?
                }
                other => vec![numbers(interp, other)?],
            };
            let labels: Vec<String> = match args.kw("labels").or_else(|| args.kw("tick_labels")) {
                Some(v) if !v.is_none() => {
                    scalars_of(interp, v)?.iter().map(Scalar::display).collect()
                }
                _ => match &data {
                    Value::Frame(frame) => {
                        let frame = frame.borrow();
                        frame.numeric_columns().iter().map(|&c| frame.columns[c].clone()).collect()
                    }
                    _ => (1..=groups.len()).map(|i| i.to_string()).collect(),
                },
            };
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            let style = p.style(args)?;
            push_boxes(p, &labels, &groups, style);
            Ok(Some(Value::None))
        }
        "axhline" | "axvline" => {
            let value = match args.get(0, if name == "axhline" { "y" } else { "x" }) {
                Some(v) => v.expect_f64("position")?,
                None => 0.0,
            };
            let dashed = dashed_linestyle(args);
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            let style = if args.kw("color").is_some() || args.kw("c").is_some() {
                p.style(args)?
            } else {
                Style {
                    color: Rgb::INK,
                    label: args.kw("label").map(Value::to_str),
                    alpha: 1.0,
                }
            };
            p.marks.push(Mark::Rule {
                value,
                vertical: name == "axvline",
                style,
                dashed,
            });
            Ok(Some(Value::None))
        }
        "title" | "set_title" => {
            let title = text_arg(0, "label")?;
            panel_mut(&mut fig.borrow_mut(), panel)?.title = title;
            Ok(Some(Value::None))
        }
        "xlabel" | "set_xlabel" => {
            let label = text_arg(0, "xlabel")?;
            panel_mut(&mut fig.borrow_mut(), panel)?.xlabel = label;
            Ok(Some(Value::None))
        }
        "ylabel" | "set_ylabel" => {
            let label = text_arg(0, "ylabel")?;
            panel_mut(&mut fig.borrow_mut(), panel)?.ylabel = label;
            Ok(Some(Value::None))
        }
        "set" => {
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            for (key, value) in &args.kw {
                match key.as_str() {
                    "title" => p.title = Some(value.to_str()),
                    "xlabel" => p.xlabel = Some(value.to_str()),
                    "ylabel" => p.ylabel = Some(value.to_str()),
                    _ => {}
                }
            }
            Ok(Some(Value::None))
        }
        "legend" => {
            panel_mut(&mut fig.borrow_mut(), panel)?.legend = true;
            Ok(Some(Value::None))
        }
        "grid" => {
            let on = args.pos.first().map(Value::truthy).unwrap_or(true);
            panel_mut(&mut fig.borrow_mut(), panel)?.grid = on;
            Ok(Some(Value::None))
        }
        "xlim" | "set_xlim" | "ylim" | "set_ylim" => {
            let limits = match args.pos.as_slice() {
                [Value::Tuple(pair)] if pair.len() == 2 => {
                    Some((pair[0].expect_f64("left")?, pair[1].expect_f64("right")?))
                }
                [lo, hi] => Some((lo.expect_f64("left")?, hi.expect_f64("right")?)),
                _ => None,
            };
            let mut f = fig.borrow_mut();
            let p = panel_mut(&mut f, panel)?;
            if name.ends_with("xlim") {
                p.xlim = limits.or(p.xlim);
            } else {
                p.ylim = limits.or(p.ylim);
            }
            Ok(Some(Value::None))
        }
        "xticks" | "set_xticks" | "set_xticklabels" => {
            // Positions are derived from the data; only replacement labels are honoured.
            let labels = match (name, args.get(1, "labels"), args.pos.first()) {
                ("set_xticklabels", _, Some(v)) => Some(v.clone()),
                (_, Some(v), _) if !v.is_none() => Some(v.clone()),
                _ => None,
            };
            if let Some(labels) = labels {
                let labels: Vec<String> =
                    scalars_of(interp, &labels)?.iter().map(Scalar::display).collect();
                let mut f = fig.borrow_mut();
                let p = panel_mut(&mut f, panel)?;
                if p.x_axis == AxisKind::Category {
                    for (slot, label) in p.categories.iter_mut().zip(labels) {
                        *slot = label;
                    }
                }
            }
            Ok(Some(Value::None))
        }
        "yticks" | "set_yticks" | "set_yticklabels" | "tick_params" | "tight_layout" | "text"
        | "annotate" | "invert_yaxis" | "invert_xaxis" | "set_facecolor" | "margins" | "axis"
        | "fill_between" => Ok(Some(Value::None)),
        _ => Ok(None),
    }
}

fn panel_mut(figure: &mut Figure, panel: usize) -> Eval<&mut Panel> {
    figure
        .panels
        .get_mut(panel)
        .ok_or_else(|| Fault::index_error("axes index out of range"))
}

fn numeric(values: &[Scalar]) -> Vec<f64> {
    values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect()
}

fn push_histogram(
    panel: &mut Panel,
    edges: &[f64],
    counts: Vec<f64>,
    style: Style,
    horizontal: bool,
) {
    let centers: Vec<f64> = edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let width = edges.get(1).zip(edges.first()).map(|(b, a)| b - a).unwrap_or(1.0);
    let bottoms = vec![0.0; counts.len()];
    panel.marks.push(Mark::Bars {
        x: centers,
        heights: counts,
        bottoms,
        width,
        horizontal,
        style,
    });
}

fn push_boxes(panel: &mut Panel, labels: &[String], groups: &[Vec<f64>], style: Style) {
    let positions: Vec<f64> = labels.iter().map(|l| panel.category_slot(l)).collect();
    let stats = groups.iter().map(|g| box_stats(g)).collect();
    panel.marks.push(Mark::Boxes { positions, stats, style });
}

fn push_kde(panel: &mut Panel, values: &[f64], style: Style) {
    let (x, y) = kde(values);
    panel.marks.push(Mark::Line {
        x,
        y,
        style,
        width: 1.5,
        markers: false,
        dashed: false,
    });
}

/// Heatmap cells; `fmt` formats annotations when given.
fn push_heat(panel: &mut Panel, frame: &DataFrame, fmt: Option<&str>) -> Eval<()> {
    let rows: Vec<String> = frame.index.labels.iter().map(Scalar::display).collect();
    let values: Vec<Vec<f64>> = (0..frame.len())
        .map(|r| frame.data.iter().map(|col| col[r].as_f64().unwrap_or(f64::NAN)).collect())
        .collect();
    let notes = match fmt {
        Some(spec) => Some(
            values
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|v| {
                            if v.is_nan() {
                                Ok(String::new())
                            } else {
                                format_value(&Value::Float(*v), spec)
                            }
                        })
                        .collect::<Eval<Vec<_>>>()
                })
                .collect::<Eval<Vec<_>>>()?,
        ),
        None => None,
    };
    panel.marks.push(Mark::Heat {
        rows,
        cols: frame.columns.clone(),
        values,
        notes,
    });
    Ok(())
}

fn apply_labels(fig: &Shared<Figure>, panel: usize, args: &Args) -> Eval<()> {
    let mut f = fig.borrow_mut();
    let p = panel_mut(&mut f, panel)?;
    if let Some(title) = args.kw("title").filter(|v| !v.is_none()) {
        p.title = Some(title.to_str());
    }
    if let Some(label) = args.kw("xlabel").filter(|v| !v.is_none()) {
        p.xlabel = Some(label.to_str());
    }
    if let Some(label) = args.kw("ylabel").filter(|v| !v.is_none()) {
        p.ylabel = Some(label.to_str());
    }
    if let Some(v) = args.kw("legend") {
        p.legend = v.truthy();
    }
    if let Some(v) = args.kw("grid") {
        p.grid = v.truthy();
    }
    Ok(())
}

/// `Series.plot`, `DataFrame.plot`, `.plot.<kind>()` and `.hist()`.
pub fn pandas_plot(
    interp: &mut Interpreter,
    target: &Value,
    kind: Option<&str>,
    args: Args,
) -> Eval<Value> {
    let kind = match kind {
        Some(k) => k.to_string(),
        None => args.get(0, "kind").and_then(Value::as_str).unwrap_or("line").to_string(),
    };
    let (fig, panel) = target_axes(interp, &args)?;
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        match target {
            Value::Series(s) => {
                let label = s.name.clone();
                let frame = DataFrame {
                    index: s.index.clone(),
                    columns: vec![label.clone().unwrap_or_default()],
                    data: vec![s.values.clone()],
                };
                plot_frame(p, &frame, &kind, &args, true)?;
            }
            Value::Frame(frame) => {
                let frame = frame.borrow().clone();
                plot_frame(p, &frame, &kind, &args, false)?;
            }
            other => {
                return Err(Fault::type_error(format!("cannot plot '{}'", other.type_name())));
            }
        }
    }
    apply_labels(&fig, panel, &args)?;
    Ok(Value::Axes(fig, panel))
}

fn plot_frame(p: &mut Panel, frame: &DataFrame, kind: &str, args: &Args, series: bool) -> Eval<()> {
    let column = |name: &str| -> Eval<usize> {
        frame.position(name).ok_or_else(|| Fault::key_error(format!("'{}'", name)))
    };
    let x_col = match args.kw("x").and_then(Value::as_str) {
        Some(name) => Some(column(name)?),
        None => None,
    };
    let y_cols: Vec<usize> = match args.kw("y") {
        Some(Value::Str(name)) => vec![column(name)?],
        Some(Value::List(names)) => names
            .borrow()
            .iter()
            .map(|n| column(&n.to_str()))
            .collect::<Eval<Vec<_>>>()?,
        _ if series => vec![0],
        _ => frame
            .numeric_columns()
            .into_iter()
            .filter(|c| Some(*c) != x_col)
            .collect(),
    };
    if y_cols.is_empty() && kind != "scatter" {
        return Err(Fault::type_error("no numeric data to plot"));
    }
    let x_values: Vec<Scalar> = match x_col {
        Some(c) => frame.data[c].clone(),
        None => frame.index.labels.clone(),
    };
    let label_of = |c: usize| -> Option<String> {
        let name = &frame.columns[c];
        (!name.is_empty()).then(|| name.clone())
    };
    let multi = y_cols.len() > 1;
    let explicit_color = args.kw("color").is_some() || args.kw("c").is_some();
    let style_for = |p: &mut Panel, c: usize, alpha: f64| -> Eval<Style> {
        let mut style = if explicit_color {
            p.style(args)?
        } else {
            Style {
                color: p.next_color(),
                label: None,
                alpha: 1.0,
            }
        };
        style.label = label_of(c);
        if args.kw("alpha").is_none() {
            style.alpha = alpha;
        } else {
            style.alpha =
                args.kw("alpha").map(|a| a.expect_f64("alpha")).transpose()?.unwrap_or(1.0);
        }
        Ok(style)
    };
    match kind {
        "line" | "area" => {
            let xs = p.coordinates(&x_values);
            for &c in &y_cols {
                let style = style_for(p, c, 1.0)?;
                p.marks.push(Mark::Line {
                    x: xs.clone(),
                    y: numeric(&frame.data[c]),
                    style,
                    width: 1.5,
                    markers: args.kw("marker").is_some_and(|m| !m.is_none()),
                    dashed: false,
                });
            }
            p.legend |= multi;
        }
        "bar" | "barh" => {
            let horizontal = kind == "barh";
            let stacked = args.flag("stacked", false);
            let xs: Vec<f64> = x_values.iter().map(|v| p.category_slot(&v.display())).collect();
            let n = y_cols.len() as f64;
            let width = if stacked { 0.8 } else { 0.8 / n };
            let mut bottoms = vec![0.0; xs.len()];
            for (k, &c) in y_cols.iter().enumerate() {
                let heights = numeric(&frame.data[c]);
                let offset = if stacked { 0.0 } else { -0.4 + width * (k as f64 + 0.5) };
                let style = style_for(p, c, 1.0)?;
                p.marks.push(Mark::Bars {
                    x: xs.iter().map(|x| x + offset).collect(),
                    heights: heights.clone(),
                    bottoms: bottoms.clone(),
                    width,
                    horizontal,
                    style,
                });
                if stacked {
                    for (b, h) in bottoms.iter_mut().zip(&heights) {
                        if h.is_finite() {
                            *b += h;
                        }
                    }
                }
            }
            p.legend |= multi;
        }
        "hist" => {
            let bins = bins_arg(args)?;
            let alpha = if multi { 0.5 } else { 1.0 };
            for &c in &y_cols {
                let (edges, counts) = histogram(&numeric(&frame.data[c]), bins);
                let style = style_for(p, c, alpha)?;
                push_histogram(p, &edges, counts, style, false);
            }
            p.legend |= multi;
        }
        "kde" | "density" => {
            for &c in &y_cols {
                let style = style_for(p, c, 1.0)?;
                push_kde(p, &numeric(&frame.data[c]), style);
            }
            p.legend |= multi;
        }
        "box" => {
            let labels: Vec<String> = y_cols.iter().map(|&c| frame.columns[c].clone()).collect();
            let groups: Vec<Vec<f64>> = y_cols.iter().map(|&c| numeric(&frame.data[c])).collect();
            let style = p.style(args)?;
            push_boxes(p, &labels, &groups, style);
        }
        "pie" => {
            let c = *y_cols.first().ok_or_else(|| {
                Fault::value_error("pie requires either y column or 'subplots=True'")
            })?;
            let values = numeric(&frame.data[c]);
            let labels = x_values.iter().map(Scalar::display).collect();
            let total: f64 = values.iter().filter(|v| v.is_finite()).sum();
            let percents = match args.kw("autopct") {
                Some(Value::Str(fmt)) => Some(
                    values
                        .iter()
                        .map(|v| percent_format(fmt, &Value::Float(100.0 * v / total)))
                        .collect::<Eval<Vec<_>>>()?,
                ),
                _ => None,
            };
            p.marks.push(Mark::Pie { values, labels, percents });
        }
        "scatter" => {
            if series {
                return Err(Fault::value_error(
                    "plot kind scatter can only be used for data frames",
                ));
            }
            let (Some(x), Some(Value::Str(y))) = (x_col, args.kw("y")) else {
                return Err(Fault::value_error("scatter requires an x and y column"));
            };
            let y = column(y)?;
            let size = match args.kw("s") {
                Some(v) => v.expect_f64("s")?,
                None => 36.0,
            };
            let xs = p.coordinates(&frame.data[x]);
            let style = p.style(args)?;
            p.marks.push(Mark::Scatter {
                x: xs,
                y: numeric(&frame.data[y]),
                style,
                size,
            });
            p.xlabel.get_or_insert_with(|| frame.columns[x].clone());
            p.ylabel.get_or_insert_with(|| frame.columns[y].clone());
        }
        other => {
            return Err(Fault::value_error(format!("{} is not a valid plot kind", other)));
        }
    }
    if let Some(c) = x_col
        && kind != "scatter"
    {
        p.xlabel.get_or_insert_with(|| frame.columns[c].clone());
    } else if series && matches!(kind, "line" | "bar" | "area") {
        if let Some(Some(name)) = frame.index.names.first() {
            p.xlabel.get_or_insert_with(|| name.clone());
        }
    }
    Ok(())
}

/// Methods on an `Axes` value.
pub fn axes_method(
    interp: &mut Interpreter,
    fig: &Shared<Figure>,
    panel: usize,
    name: &str,
    args: Args,
) -> Eval<Value> {
    if let Some(result) = panel_call(interp, fig, panel, name, &args)? {
        return Ok(result);
    }
    match name {
        "get_figure" => Ok(Value::Figure(fig.clone())),
        "get_title" => Ok(Value::str(
            fig.borrow().panels.get(panel).and_then(|p| p.title.as_deref()).unwrap_or(""),
        )),
        "get_xlabel" => Ok(Value::str(
            fig.borrow().panels.get(panel).and_then(|p| p.xlabel.as_deref()).unwrap_or(""),
        )),
        "get_ylabel" => Ok(Value::str(
            fig.borrow().panels.get(panel).and_then(|p| p.ylabel.as_deref()).unwrap_or(""),
        )),
        _ => Err(Fault::attribute_error(format!("'Axes' object has no attribute '{}'", name))),
    }
}

/// Methods on a `Figure` value.
pub fn figure_method(
    interp: &mut Interpreter,
    fig: &Shared<Figure>,
    name: &str,
    args: Args,
) -> Eval<Value> {
    match name {
        "savefig" => save(interp, fig, &args),
        "suptitle" => {
            fig.borrow_mut().title = args.opt(0, "t").map(Value::to_str);
            Ok(Value::None)
        }
        "add_subplot" => {
            let (rows, cols, index) = match args.pos.as_slice() {
                [Value::Int(code)] if *code >= 111 => subplot_code(*code),
                [r, c, i] => (
                    r.expect_int("nrows")? as usize,
                    c.expect_int("ncols")? as usize,
                    i.expect_int("index")? as usize,
                ),
                _ => (1, 1, 1),
            };
            let mut f = fig.borrow_mut();
            regrid(&mut f, rows, cols);
            let panel = index.clamp(1, f.panels.len()) - 1;
            f.current = panel;
            drop(f);
            Ok(Value::Axes(fig.clone(), panel))
        }
        "gca" => {
            let panel = fig.borrow().current;
            Ok(Value::Axes(fig.clone(), panel))
        }
        "set_size_inches" => {
            let (w, h) = match args.pos.as_slice() {
                [Value::Tuple(pair)] if pair.len() == 2 => {
                    (pair[0].expect_f64("w")?, pair[1].expect_f64("h")?)
                }
                [w, h, ..] => (w.expect_f64("w")?, h.expect_f64("h")?),
                _ => {
                    return Err(Fault::type_error(
                        "set_size_inches() expects a width and a height",
                    ));
                }
            };
            let mut f = fig.borrow_mut();
            f.width = w;
            f.height = h;
            Ok(Value::None)
        }
        "tight_layout" | "show" | "subplots_adjust" | "colorbar" | "autofmt_xdate" | "legend" => {
            Ok(Value::None)
        }
        _ => Err(Fault::attribute_error(format!("'Figure' object has no attribute '{}'", name))),
    }
}

/// Grow the panel grid, keeping existing panels in place.
pub fn regrid(figure: &mut Figure, rows: usize, cols: usize) {
    let (rows, cols) = (rows.max(1), cols.max(1));
    if figure.rows != rows || figure.cols != cols {
        figure.rows = rows;
        figure.cols = cols;
        figure.panels.resize(rows * cols, Panel::default());
        figure.current = figure.current.min(rows * cols - 1);
    }
}

/// `savefig(path)`: writes the figure into the output directory.
pub fn save(interp: &mut Interpreter, fig: &Shared<Figure>, args: &Args) -> Eval<Value> {
    let path = args.required(0, "fname", "savefig")?.clone();
    let name = path.expect_str("fname")?;
    let mut figure = fig.borrow().clone();
    if let Some(dpi) = args.kw("dpi").and_then(Value::as_f64) {
        figure.dpi = dpi.clamp(10.0, 600.0);
    }
    let bytes = figure.encode_for(&name)?;
    interp.write_output(&path, &bytes)?;
    Ok(Value::None)
}

pub fn axes_list(fig: &Shared<Figure>, rows: usize, cols: usize) -> Value {
    let axes = |i: usize| Value::Axes(fig.clone(), i);
    match (rows, cols) {
        (1, 1) => axes(0),
        (1, n) | (n, 1) => Value::list((0..n).map(axes).collect()),
        (r, c) => Value::list(
            (0..r)
                .map(|row| Value::list((0..c).map(|col| axes(row * c + col)).collect()))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("red"), Some(Rgb(0xd6, 0x27, 0x28)));
        assert_eq!(parse_color("#ff0000"), Some(Rgb(255, 0, 0)));
        assert_eq!(parse_color("#0f0"), Some(Rgb(0, 255, 0)));
        assert_eq!(parse_color("C1"), Some(PALETTE[1]));
        assert_eq!(parse_color("k"), Some(Rgb::BLACK));
        assert_eq!(parse_color("not-a-color"), None);
    }

    #[test]
    fn test_histogram_closes_last_bin() {
        let (edges, counts) = histogram(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(edges.len(), 4);
        assert_eq!(counts, vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_histogram_single_value() {
        let (edges, counts) = histogram(&[5.0, 5.0], 2);
        assert_eq!(edges[0], 4.5);
        assert_eq!(counts.iter().sum::<f64>(), 2.0);
    }

    #[test]
    fn test_box_stats_whiskers_exclude_outliers() {
        let stats = box_stats(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        assert_eq!(stats[2], 3.0);
        assert_eq!(stats[4], 4.0);
    }

    #[test]
    fn test_line_format() {
        let f = parse_line_format("ro--");
        assert_eq!(f.color, Some(Rgb(255, 0, 0)));
        assert!(f.markers && f.line && f.dashed);
        let f = parse_line_format("o");
        assert!(f.markers && !f.line);
    }

    #[test]
    fn test_category_slots_are_stable() {
        let mut panel = Panel::default();
        let a = panel.coordinates(&[Scalar::Str("x".into()), Scalar::Str("y".into())]);
        let b = panel.coordinates(&[Scalar::Str("y".into())]);
        assert_eq!(a, vec![0.0, 1.0]);
        assert_eq!(b, vec![1.0]);
        assert_eq!(panel.x_axis, AxisKind::Category);
    }

    #[test]
    fn test_series_bar_labels_x_axis_with_index_name() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000_000);
        interp
            .run(
                "import pandas as pd\n\
                 d = pd.DataFrame({'k': ['a', 'b', 'a'], 'v': [1, 2, 3]})\n\
                 ax = d.groupby('k')['v'].sum().plot(kind='bar')\n\
                 label = ax.get_xlabel()\n",
            )
            .unwrap();
        let label = interp.locals().into_iter().find(|(k, _)| k == "label").map(|(_, v)| v.repr());
        assert_eq!(label.as_deref(), Some("'k'"));
    }

    #[test]
    fn test_encode_for_rejects_unknown_format() {
        let figure = Figure::new(2.0, 2.0, 50.0, 1, 1);
        assert!(figure.encode_for("chart.svg").is_ok());
        let err = figure.encode_for("chart.jpg").unwrap_err();
        assert!(err.message.contains("not supported"));
    }
}
