//! `matplotlib.pyplot` and `seaborn` module tables.

use std::rc::Rc;

use super::super::error::{Eval, Fault};
use super::super::eval::Interpreter;
use super::super::frame::{DataFrame, Scalar};
use super::super::pandas::scalars_of;
use super::super::value::{Args, Builtin, Dict, Module, Shared, Value, shared};
use super::{
    Figure, Mark, PALETTE, Panel, Style, apply_labels, axes_list, current_figure, histogram, kde,
    new_figure, numeric, panel_call, panel_mut, push_boxes, push_heat, push_histogram, push_kde,
    regrid, save, subplot_code, target_axes,
};

/// Module-level pyplot functions that act on the current axes.
macro_rules! current_axes_functions {
    ($($func:ident => $name:literal),* $(,)?) => {
        $(
            fn $func(interp: &mut Interpreter, args: Args) -> Eval<Value> {
                on_current_axes(interp, $name, args)
            }
        )*
        const AXES_FUNCTIONS: &[Builtin] = &[$(Builtin { name: $name, func: $func }),*];
    };
}

current_axes_functions! {
    plt_plot => "plot",
    plt_scatter => "scatter",
    plt_bar => "bar",
    plt_barh => "barh",
    plt_hist => "hist",
    plt_pie => "pie",
    plt_boxplot => "boxplot",
    plt_axhline => "axhline",
    plt_axvline => "axvline",
    plt_title => "title",
    plt_xlabel => "xlabel",
    plt_ylabel => "ylabel",
    plt_legend => "legend",
    plt_grid => "grid",
    plt_xlim => "xlim",
    plt_ylim => "ylim",
    plt_xticks => "xticks",
    plt_yticks => "yticks",
    plt_tight_layout => "tight_layout",
    plt_text => "text",
    plt_annotate => "annotate",
    plt_fill_between => "fill_between",
    plt_axis => "axis",
}

static PYPLOT: &[Builtin] = &[
    Builtin { name: "figure", func: figure },
    Builtin { name: "subplots", func: subplots },
    Builtin { name: "subplot", func: subplot },
    Builtin { name: "savefig", func: savefig },
    Builtin { name: "close", func: close },
    Builtin { name: "clf", func: clf },
    Builtin { name: "show", func: ignore },
    Builtin { name: "gca", func: gca },
    Builtin { name: "gcf", func: gcf },
    Builtin { name: "suptitle", func: suptitle },
];

static MATPLOTLIB: &[Builtin] = &[Builtin { name: "use", func: ignore }];

static SEABORN: &[Builtin] = &[
    Builtin { name: "histplot", func: histplot },
    Builtin { name: "kdeplot", func: kdeplot },
    Builtin { name: "barplot", func: barplot },
    Builtin { name: "countplot", func: countplot },
    Builtin { name: "scatterplot", func: scatterplot },
    Builtin { name: "lineplot", func: lineplot },
    Builtin { name: "boxplot", func: boxplot },
    Builtin { name: "heatmap", func: heatmap },
    Builtin { name: "color_palette", func: color_palette },
    Builtin { name: "set_theme", func: ignore },
    Builtin { name: "set", func: ignore },
    Builtin { name: "set_style", func: ignore },
    Builtin { name: "set_palette", func: ignore },
    Builtin { name: "set_context", func: ignore },
    Builtin { name: "despine", func: ignore },
];

fn module_of(name: &str, tables: &[&'static [Builtin]], extra: Vec<(String, Value)>) -> Value {
    let mut attrs: indexmap::IndexMap<String, Value> = tables
        .iter()
        .copied()
        .flat_map(|t: &'static [Builtin]| t.iter())
        .map(|b| (b.name.to_string(), Value::Builtin(b)))
        .collect();
    attrs.extend(extra);
    Value::Module(Rc::new(Module {
        name: name.to_string(),
        attrs,
    }))
}

pub fn module() -> Value {
    let rc_params = ("rcParams".to_string(), Value::Dict(shared(Dict::default())));
    module_of("matplotlib.pyplot", &[PYPLOT, AXES_FUNCTIONS], vec![rc_params])
}

pub fn matplotlib_module() -> Value {
    let rc_params = ("rcParams".to_string(), Value::Dict(shared(Dict::default())));
    module_of("matplotlib", &[MATPLOTLIB], vec![("pyplot".to_string(), module()), rc_params])
}

pub fn seaborn_module() -> Value {
    module_of("seaborn", &[SEABORN], Vec::new())
}

fn ignore(_: &mut Interpreter, _: Args) -> Eval<Value> {
    Ok(Value::None)
}

fn on_current_axes(interp: &mut Interpreter, name: &str, args: Args) -> Eval<Value> {
    let fig = current_figure(interp);
    let panel = fig.borrow().current;
    panel_call(interp, &fig, panel, name, &args)?.ok_or_else(|| {
        Fault::attribute_error(format!(
            "module 'matplotlib.pyplot' has no attribute '{}'",
            name
        ))
    })
}

fn figure(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    Ok(Value::Figure(new_figure(interp, &args, 1, 1)?))
}

fn grid_arg(args: &Args, index: usize, name: &str) -> Eval<usize> {
    match args.get(index, name) {
        Some(v) => {
            let n = v.expect_int(name)?;
            if n < 1 {
                return Err(Fault::value_error(format!(
                    "Number of {} must be a positive integer, not {}",
                    name, n
                )));
            }
            Ok(n as usize)
        }
        None => Ok(1),
    }
}

fn subplots(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let rows = grid_arg(&args, 0, "nrows")?;
    let cols = grid_arg(&args, 1, "ncols")?;
    let fig = new_figure(interp, &args, rows, cols)?;
    let axes = axes_list(&fig, rows, cols);
    Ok(Value::tuple(vec![Value::Figure(fig), axes]))
}

fn subplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let (rows, cols, index) = match args.pos.as_slice() {
        [Value::Int(code)] if *code >= 111 => subplot_code(*code),
        [r, c, i] => (
            r.expect_int("nrows")? as usize,
            c.expect_int("ncols")? as usize,
            i.expect_int("index")? as usize,
        ),
        _ => return Err(Fault::type_error("subplot() takes 1 or 3 positional arguments")),
    };
    let fig = current_figure(interp);
    let mut f = fig.borrow_mut();
    regrid(&mut f, rows, cols);
    if index < 1 || index > f.panels.len() {
        return Err(Fault::value_error(format!(
            "num must be an integer with 1 <= num <= {}, not {}",
            f.panels.len(),
            index
        )));
    }
    f.current = index - 1;
    drop(f);
    Ok(Value::Axes(fig, index - 1))
}

fn savefig(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let fig = current_figure(interp);
    save(interp, &fig, &args)
}

fn close(interp: &mut Interpreter, _: Args) -> Eval<Value> {
    interp.figure = None;
    Ok(Value::None)
}

fn clf(interp: &mut Interpreter, _: Args) -> Eval<Value> {
    let fig = current_figure(interp);
    let mut f = fig.borrow_mut();
    *f = Figure::new(f.width, f.height, f.dpi, 1, 1);
    Ok(Value::None)
}

fn gca(interp: &mut Interpreter, _: Args) -> Eval<Value> {
    let fig = current_figure(interp);
    let panel = fig.borrow().current;
    Ok(Value::Axes(fig, panel))
}

fn gcf(interp: &mut Interpreter, _: Args) -> Eval<Value> {
    Ok(Value::Figure(current_figure(interp)))
}

fn suptitle(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let fig = current_figure(interp);
    fig.borrow_mut().title = args.opt(0, "t").map(Value::to_str);
    Ok(Value::None)
}

/// A plotting variable: values plus the column name used for axis labels.
pub(super) struct Vector {
    pub(super) values: Vec<Scalar>,
    pub(super) name: Option<String>,
}

/// Resolves `x=`, `y=` and the grouping keyword against `data=`, or takes them as vectors.
pub(super) struct Vectors {
    pub(super) data: Option<DataFrame>,
    pub(super) x: Option<Vector>,
    pub(super) y: Option<Vector>,
    pub(super) hue: Option<Vector>,
}

impl Vectors {
    pub(super) fn resolve(interp: &mut Interpreter, args: &Args, hue: &str) -> Eval<Self> {
        let data = match args.get(0, "data") {
            Some(Value::Frame(frame)) => Some(frame.borrow().clone()),
            _ => None,
        };
        let mut vectors = Self {
            data,
            x: None,
            y: None,
            hue: None,
        };
        // A bare vector in the first position stands for `x`.
        let first = match args.pos.first() {
            Some(v) if !matches!(v, Value::Frame(_)) => Some(v),
            _ => None,
        };
        vectors.x = vectors.lookup(interp, args.kw("x").or(first))?;
        vectors.y = vectors.lookup(interp, args.kw("y"))?;
        vectors.hue = vectors.lookup(interp, args.kw(hue))?;
        Ok(vectors)
    }

    /// A column name of `data`, a Series or any list-like.
    pub(super) fn lookup(
        &self,
        interp: &mut Interpreter,
        value: Option<&Value>,
    ) -> Eval<Option<Vector>> {
        match (value, &self.data) {
            (None | Some(Value::None), _) => Ok(None),
            (Some(Value::Str(name)), Some(frame)) => {
                let c = frame.position(name).ok_or_else(|| {
                    Fault::value_error(format!(
                        "Could not interpret value `{}`. \
                         An entry with this name does not appear in `data`.",
                        name
                    ))
                })?;
                Ok(Some(Vector {
                    values: frame.data[c].clone(),
                    name: Some(name.to_string()),
                }))
            }
            (Some(Value::Series(s)), _) => Ok(Some(Vector {
                values: s.values.clone(),
                name: s.name.clone(),
            })),
            (Some(other), _) => Ok(Some(Vector {
                values: scalars_of(interp, other)?,
                name: None,
            })),
        }
    }

    /// Row groups by hue value in order of first appearance.
    pub(super) fn groups(&self, rows: usize) -> Vec<(Option<String>, Vec<usize>)> {
        let Some(hue) = &self.hue else {
            return vec![(None, (0..rows).collect())];
        };
        let mut groups: Vec<(Option<String>, Vec<usize>)> = Vec::new();
        for (i, key) in hue.values.iter().enumerate().take(rows) {
            if key.is_missing() {
                continue;
            }
            let key = key.display();
            match groups.iter_mut().find(|(k, _)| k.as_deref() == Some(key.as_str())) {
                Some((_, rows)) => rows.push(i),
                None => groups.push((Some(key), vec![i])),
            }
        }
        groups
    }
}

pub(super) fn pick(values: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().filter_map(|&i| values.get(i).copied()).collect()
}

fn style_for(p: &mut Panel, args: &Args, label: Option<String>, alpha: f64) -> Eval<Style> {
    let mut style = p.style(args)?;
    if label.is_some() {
        style.label = label;
    }
    if args.kw("alpha").is_none() {
        style.alpha = alpha;
    }
    Ok(style)
}

fn finish(
    fig: Shared<Figure>,
    panel: usize,
    args: &Args,
    xlabel: Option<String>,
    ylabel: Option<String>,
    legend: bool,
) -> Eval<Value> {
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        if xlabel.is_some() && p.xlabel.is_none() {
            p.xlabel = xlabel;
        }
        if ylabel.is_some() && p.ylabel.is_none() {
            p.ylabel = ylabel;
        }
        p.legend |= legend && args.kw("legend").is_none_or(Value::truthy);
    }
    apply_labels(&fig, panel, args)?;
    Ok(Value::Axes(fig, panel))
}

/// Sturges' rule, which is what `bins='auto'` settles on for small samples.
pub(super) fn auto_bins(n: usize) -> usize {
    ((n.max(1) as f64).log2().ceil() as usize + 1).clamp(1, 50)
}

fn histplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "hue")?;
    let (fig, panel) = target_axes(interp, &args)?;
    let mut columns: Vec<(Option<String>, Vec<f64>)> = Vec::new();
    match (&vectors.x, &vectors.data) {
        (Some(x), _) => columns.push((x.name.clone(), numeric(&x.values))),
        (None, Some(frame)) => {
            for c in frame.numeric_columns() {
                columns.push((Some(frame.columns[c].clone()), numeric(&frame.data[c])));
            }
        }
        (None, None) => return Err(Fault::type_error("histplot() requires `x` or `data`")),
    }
    let with_kde = args.flag("kde", false);
    let groups = if vectors.x.is_some() {
        vectors.groups(columns[0].1.len())
    } else {
        vec![(None, Vec::new())]
    };
    let layered = groups.len() > 1 || columns.len() > 1;
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        for (name, values) in &columns {
            let all: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
            let bins = match args.kw("bins") {
                Some(Value::Int(b)) => (*b).max(1) as usize,
                _ => auto_bins(all.len()),
            };
            let (edges, _) = histogram(&all, bins);
            let width = edges.get(1).zip(edges.first()).map(|(b, a)| b - a).unwrap_or(1.0);
            for (key, rows) in &groups {
                let subset = if vectors.x.is_some() { pick(values, rows) } else { values.clone() };
                let counts = bin_counts(&subset, &edges);
                let label =
                    key.clone().or_else(|| if columns.len() > 1 { name.clone() } else { None });
                let style = style_for(p, &args, label, if layered { 0.5 } else { 0.75 })?;
                let color = style.color;
                push_histogram(p, &edges, counts, style, false);
                if with_kde {
                    let n = subset.iter().filter(|v| v.is_finite()).count() as f64;
                    let (x, y) = kde(&subset);
                    p.marks.push(Mark::Line {
                        x,
                        y: y.into_iter().map(|d| d * n * width).collect(),
                        style: Style { color, label: None, alpha: 1.0 },
                        width: 1.5,
                        markers: false,
                        dashed: false,
                    });
                }
            }
        }
    }
    let xlabel = vectors.x.as_ref().and_then(|x| x.name.clone());
    finish(fig, panel, &args, xlabel, Some("Count".to_string()), layered)
}

/// Counts against fixed edges, last bin closed.
pub(super) fn bin_counts(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len().saturating_sub(1);
    let mut counts = vec![0.0; bins];
    if bins == 0 {
        return counts;
    }
    let (lo, hi) = (edges[0], edges[bins]);
    let width = (hi - lo) / bins as f64;
    for v in values.iter().filter(|v| v.is_finite() && **v >= lo && **v <= hi) {
        let slot = (((v - lo) / width) as usize).min(bins - 1);
        counts[slot] += 1.0;
    }
    counts
}

fn kdeplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "hue")?;
    let (fig, panel) = target_axes(interp, &args)?;
    let x = vectors.x.as_ref().ok_or_else(|| Fault::type_error("kdeplot() requires `x`"))?;
    let values = numeric(&x.values);
    let groups = vectors.groups(values.len());
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        for (key, rows) in &groups {
            let style = style_for(p, &args, key.clone(), 1.0)?;
            push_kde(p, &pick(&values, rows), style);
        }
    }
    finish(fig, panel, &args, x.name.clone(), Some("Density".to_string()), groups.len() > 1)
}

/// Category order of first appearance, and the rows in each.
pub(super) fn categories(keys: &[Scalar]) -> Vec<(String, Vec<usize>)> {
    let mut out: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, key) in keys.iter().enumerate() {
        if key.is_missing() {
            continue;
        }
        let label = key.display();
        match out.iter_mut().find(|(k, _)| *k == label) {
            Some((_, rows)) => rows.push(i),
            None => out.push((label, vec![i])),
        }
    }
    out
}

pub(super) fn mean(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        f64::NAN
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    }
}

/// Bars per category, dodged by hue; `measure` reduces the rows of one bar.
fn grouped_bars(
    p: &mut Panel,
    args: &Args,
    vectors: &Vectors,
    cats: &[(String, Vec<usize>)],
    horizontal: bool,
    measure: &dyn Fn(&[usize]) -> f64,
) -> Eval<()> {
    let slots: Vec<f64> = cats.iter().map(|(label, _)| p.category_slot(label)).collect();
    let groups = vectors.groups(vectors.hue.as_ref().map_or(0, |h| h.values.len()));
    let width = 0.8 / groups.len().max(1) as f64;
    for (k, (key, members)) in groups.iter().enumerate() {
        let offset = if groups.len() > 1 { -0.4 + width * (k as f64 + 0.5) } else { 0.0 };
        let heights: Vec<f64> = cats
            .iter()
            .map(|(_, rows)| {
                let picked: Vec<usize> = rows
                    .iter()
                    .copied()
                    .filter(|r| key.is_none() || members.contains(r))
                    .collect();
                measure(&picked)
            })
            .collect();
        let style = style_for(p, args, key.clone(), 1.0)?;
        p.marks.push(Mark::Bars {
            x: slots.iter().map(|s| s + offset).collect(),
            bottoms: vec![0.0; heights.len()],
            heights,
            width,
            horizontal,
            style,
        });
    }
    if groups.len() > 1 {
        p.legend = true;
    }
    Ok(())
}

fn barplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "hue")?;
    let (fig, panel) = target_axes(interp, &args)?;
    let x = vectors.x.as_ref().ok_or_else(|| Fault::type_error("barplot() requires `x`"))?;
    let y = vectors.y.as_ref().ok_or_else(|| Fault::type_error("barplot() requires `y`"))?;
    // Numeric x against categorical y reads as a horizontal plot.
    let horizontal = x.values.iter().all(|v| v.as_f64().is_some() || v.is_missing())
        && y.values.iter().any(|v| matches!(v, Scalar::Str(_)));
    let (cat, val) = if horizontal { (y, x) } else { (x, y) };
    let values = numeric(&val.values);
    let cats = categories(&cat.values);
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        grouped_bars(p, &args, &vectors, &cats, horizontal, &|rows| mean(&pick(&values, rows)))?;
    }
    finish(fig, panel, &args, x.name.clone(), y.name.clone(), false)
}

fn countplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "hue")?;
    let (fig, panel) = target_axes(interp, &args)?;
    let (cat, horizontal) = match (&vectors.x, &vectors.y) {
        (Some(x), _) => (x, false),
        (None, Some(y)) => (y, true),
        (None, None) => return Err(Fault::type_error("countplot() requires `x` or `y`")),
    };
    let cats = categories(&cat.values);
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        grouped_bars(p, &args, &vectors, &cats, horizontal, &|rows| rows.len() as f64)?;
    }
    let count = Some("count".to_string());
    if horizontal {
        finish(fig, panel, &args, count, cat.name.clone(), false)
    } else {
        finish(fig, panel, &args, cat.name.clone(), count, false)
    }
}

fn scatterplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "hue")?;
    let (fig, panel) = target_axes(interp, &args)?;
    let x = vectors.x.as_ref().ok_or_else(|| Fault::type_error("scatterplot() requires `x`"))?;
    let y = vectors.y.as_ref().ok_or_else(|| Fault::type_error("scatterplot() requires `y`"))?;
    let ys = numeric(&y.values);
    let size = match args.kw("s") {
        Some(v) => v.expect_f64("s")?,
        None => 36.0,
    };
    let groups = vectors.groups(ys.len());
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        let xs = p.coordinates(&x.values);
        for (key, rows) in &groups {
            let style = style_for(p, &args, key.clone(), 0.8)?;
            p.marks.push(Mark::Scatter {
                x: pick(&xs, rows),
                y: pick(&ys, rows),
                style,
                size,
            });
        }
    }
    finish(fig, panel, &args, x.name.clone(), y.name.clone(), groups.len() > 1)
}

fn lineplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "hue")?;
    let (fig, panel) = target_axes(interp, &args)?;
    let x = vectors.x.as_ref().ok_or_else(|| Fault::type_error("lineplot() requires `x`"))?;
    let y = vectors.y.as_ref().ok_or_else(|| Fault::type_error("lineplot() requires `y`"))?;
    let ys = numeric(&y.values);
    let groups = vectors.groups(ys.len());
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        let xs = p.coordinates(&x.values);
        for (key, rows) in &groups {
            // Repeated x values collapse to their mean, drawn in x order.
            let mut points: Vec<(f64, Vec<f64>)> = Vec::new();
            for &r in rows {
                let (Some(&px), Some(&py)) = (xs.get(r), ys.get(r)) else { continue };
                match points.iter_mut().find(|(x, _)| *x == px) {
                    Some((_, acc)) => acc.push(py),
                    None => points.push((px, vec![py])),
                }
            }
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let style = style_for(p, &args, key.clone(), 1.0)?;
            p.marks.push(Mark::Line {
                x: points.iter().map(|(x, _)| *x).collect(),
                y: points.iter().map(|(_, v)| mean(v)).collect(),
                style,
                width: 1.5,
                markers: args.kw("marker").is_some_and(|m| !m.is_none()),
                dashed: false,
            });
        }
    }
    finish(fig, panel, &args, x.name.clone(), y.name.clone(), groups.len() > 1)
}

fn boxplot(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let vectors = Vectors::resolve(interp, &args, "hue")?;
    let (fig, panel) = target_axes(interp, &args)?;
    let (labels, groups, xlabel, ylabel) = match (&vectors.x, &vectors.y) {
        (Some(x), Some(y)) => {
            let values = numeric(&y.values);
            let cats = categories(&x.values);
            (
                cats.iter().map(|(l, _)| l.clone()).collect::<Vec<_>>(),
                cats.iter().map(|(_, rows)| pick(&values, rows)).collect::<Vec<_>>(),
                x.name.clone(),
                y.name.clone(),
            )
        }
        (Some(v), None) | (None, Some(v)) => (
            vec![v.name.clone().unwrap_or_default()],
            vec![numeric(&v.values)],
            None,
            v.name.clone(),
        ),
        (None, None) => match &vectors.data {
            Some(frame) => {
                let cols = frame.numeric_columns();
                (
                    cols.iter().map(|&c| frame.columns[c].clone()).collect(),
                    cols.iter().map(|&c| numeric(&frame.data[c])).collect(),
                    None,
                    None,
                )
            }
            None => return Err(Fault::type_error("boxplot() requires `data`, `x` or `y`")),
        },
    };
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        let style = p.style(&args)?;
        push_boxes(p, &labels, &groups, style);
    }
    finish(fig, panel, &args, xlabel, ylabel, false)
}

fn heatmap(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let frame = match args.required(0, "data", "heatmap")? {
        Value::Frame(frame) => frame.borrow().clone(),
        other => {
            let rows = interp.iterate(other)?;
            let mut columns: Vec<(String, Vec<Scalar>)> = Vec::new();
            for row in rows {
                let cells = scalars_of(interp, &row)?;
                for (c, cell) in cells.into_iter().enumerate() {
                    if columns.len() <= c {
                        columns.push((c.to_string(), Vec::new()));
                    }
                    columns[c].1.push(cell);
                }
            }
            DataFrame::from_columns(columns)?
        }
    };
    let (fig, panel) = target_axes(interp, &args)?;
    let fmt = match (args.flag("annot", false), args.kw("fmt").and_then(Value::as_str)) {
        (false, _) => None,
        (true, Some(spec)) => Some(spec.to_string()),
        (true, None) => Some(".2g".to_string()),
    };
    {
        let mut f = fig.borrow_mut();
        let p = panel_mut(&mut f, panel)?;
        push_heat(p, &frame, fmt.as_deref())?;
    }
    finish(fig, panel, &args, None, None, false)
}

fn color_palette(_: &mut Interpreter, args: Args) -> Eval<Value> {
    let n = match args.get(1, "n_colors") {
        Some(v) if !v.is_none() => v.expect_int("n_colors")?.max(0) as usize,
        _ => PALETTE.len(),
    };
    Ok(Value::list(
        (0..n).map(|i| Value::str(&PALETTE[i % PALETTE.len()].hex())).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_counts_uses_shared_edges() {
        let edges = vec![0.0, 1.0, 2.0];
        assert_eq!(bin_counts(&[0.5, 1.5, 2.0, 5.0], &edges), vec![1.0, 2.0]);
    }

    #[test]
    fn test_categories_keep_first_appearance() {
        let keys = vec![
            Scalar::Str("b".into()),
            Scalar::Str("a".into()),
            Scalar::Null,
            Scalar::Str("b".into()),
        ];
        let cats = categories(&keys);
        assert_eq!(cats, vec![("b".to_string(), vec![0, 3]), ("a".to_string(), vec![1])]);
    }

    #[test]
    fn test_auto_bins() {
        assert_eq!(auto_bins(100), 8);
        assert_eq!(auto_bins(0), 1);
    }

    #[test]
    fn test_mean_skips_missing() {
        assert_eq!(mean(&[1.0, f64::NAN, 3.0]), 2.0);
        assert!(mean(&[]).is_nan());
    }
}
