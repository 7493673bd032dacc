//! Layout: figure marks in data coordinates to shapes in pixel space.

use chrono::DateTime;

use super::{AxisKind, Figure, Mark, PALETTE, Panel, Rgb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Line {
        points: Vec<(f64, f64)>,
        color: Rgb,
        width: f64,
        dashed: bool,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        fill: Option<Rgb>,
        alpha: f64,
        stroke: Option<Rgb>,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
        fill: Rgb,
        alpha: f64,
    },
    Polygon {
        points: Vec<(f64, f64)>,
        fill: Rgb,
        stroke: Option<Rgb>,
    },
    /// `y` is the vertical center of the text.
    Text {
        x: f64,
        y: f64,
        text: String,
        size: f64,
        anchor: Anchor,
        color: Rgb,
        vertical: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub shapes: Vec<Shape>,
}

#[derive(Debug, Clone, Copy)]
struct Area {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Area {
    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }

    fn center(&self) -> (f64, f64) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

/// Linear map from a data interval onto a pixel interval.
#[derive(Debug, Clone, Copy)]
struct Scale {
    lo: f64,
    hi: f64,
    from: f64,
    to: f64,
}

impl Scale {
    fn map(&self, v: f64) -> f64 {
        self.from + (v - self.lo) / (self.hi - self.lo) * (self.to - self.from)
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    lo: f64,
    hi: f64,
}

impl Extent {
    fn empty() -> Self {
        Self {
            lo: f64::INFINITY,
            hi: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, v: f64) {
        if v.is_finite() {
            self.lo = self.lo.min(v);
            self.hi = self.hi.max(v);
        }
    }

    fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    /// Pads by 5%, keeping a zero baseline flush.
    fn padded(self, zero_baseline: bool) -> (f64, f64) {
        if self.is_empty() {
            return (0.0, 1.0);
        }
        if self.lo == self.hi {
            let d = if self.lo == 0.0 { 0.5 } else { self.lo.abs() * 0.1 };
            return (self.lo - d, self.hi + d);
        }
        let pad = (self.hi - self.lo) * 0.05;
        let lo = if zero_baseline && self.lo == 0.0 { 0.0 } else { self.lo - pad };
        let hi = if zero_baseline && self.hi == 0.0 { 0.0 } else { self.hi + pad };
        (lo, hi)
    }
}

pub fn layout(fig: &Figure) -> Scene {
    let width = fig.width_px();
    let height = fig.height_px();
    let s = fig.dpi / 100.0;
    let mut shapes = vec![Shape::Rect {
        x: 0.0,
        y: 0.0,
        w: width as f64,
        h: height as f64,
        fill: Some(Rgb::WHITE),
        alpha: 1.0,
        stroke: None,
    }];
    let mut top = 0.0;
    if let Some(title) = &fig.title {
        shapes.push(text(width as f64 / 2.0, 16.0 * s, title, 14.0 * s, Anchor::Middle));
        top = 30.0 * s;
    }
    let cell_w = width as f64 / fig.cols as f64;
    let cell_h = (height as f64 - top) / fig.rows as f64;
    for (i, panel) in fig.panels.iter().enumerate() {
        let (r, c) = ((i / fig.cols) as f64, (i % fig.cols) as f64);
        let cell = Area {
            left: c * cell_w,
            top: top + r * cell_h,
            right: (c + 1.0) * cell_w,
            bottom: top + (r + 1.0) * cell_h,
        };
        draw_panel(&mut shapes, panel, cell, s);
    }
    Scene { width, height, shapes }
}

fn text(x: f64, y: f64, content: &str, size: f64, anchor: Anchor) -> Shape {
    Shape::Text {
        x,
        y,
        text: content.to_string(),
        size,
        anchor,
        color: Rgb::INK,
        vertical: false,
    }
}

fn line(a: (f64, f64), b: (f64, f64), color: Rgb, width: f64) -> Shape {
    Shape::Line {
        points: vec![a, b],
        color,
        width,
        dashed: false,
    }
}

fn truncate(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        label.to_string()
    } else {
        let mut out: String = label.chars().take(max.saturating_sub(2)).collect();
        out.push_str("..");
        out
    }
}

fn draw_panel(out: &mut Vec<Shape>, panel: &Panel, cell: Area, s: f64) {
    let area = Area {
        left: cell.left + 64.0 * s,
        top: cell.top + 34.0 * s,
        right: cell.right - 18.0 * s,
        bottom: cell.bottom - 50.0 * s,
    };
    if area.width() < 10.0 || area.height() < 10.0 {
        return;
    }
    if let Some(title) = &panel.title {
        out.push(text(area.center().0, cell.top + 17.0 * s, title, 12.0 * s, Anchor::Middle));
    }
    if let Some(Mark::Heat {
        rows,
        cols,
        values,
        notes,
    }) = panel.marks.iter().find(|m| matches!(m, Mark::Heat { .. }))
    {
        draw_heat(out, rows, cols, values, notes.as_ref(), area, s);
        axis_labels(out, panel, area, cell, s);
        return;
    }
    if !panel.marks.is_empty() && panel.marks.iter().all(|m| matches!(m, Mark::Pie { .. })) {
        for mark in &panel.marks {
            if let Mark::Pie {
                values,
                labels,
                percents,
            } = mark
            {
                draw_pie(out, values, labels, percents.as_ref(), area, s);
            }
        }
        return;
    }

    let horizontal = panel
        .marks
        .iter()
        .any(|m| matches!(m, Mark::Bars { horizontal: true, .. }));
    let has_bars = panel.marks.iter().any(|m| matches!(m, Mark::Bars { .. }));
    let (mut xe, mut ye) = (Extent::empty(), Extent::empty());
    for mark in &panel.marks {
        extend(mark, &mut xe, &mut ye);
    }
    let categorical = panel.x_axis == AxisKind::Category && !panel.categories.is_empty();
    let slots = panel.categories.len() as f64;
    let (mut xr, mut yr) = (xe.padded(has_bars && horizontal), ye.padded(has_bars && !horizontal));
    if categorical {
        let spread = |e: Extent| (e.lo.min(-0.5), e.hi.max(slots - 0.5));
        if horizontal {
            yr = spread(ye);
        } else {
            xr = spread(xe);
        }
    }
    let xr = panel.xlim.unwrap_or(xr);
    let yr = panel.ylim.unwrap_or(yr);
    let xs = Scale {
        lo: xr.0,
        hi: if xr.1 == xr.0 { xr.0 + 1.0 } else { xr.1 },
        from: area.left,
        to: area.right,
    };
    let ys = Scale {
        lo: yr.0,
        hi: if yr.1 == yr.0 { yr.0 + 1.0 } else { yr.1 },
        from: area.bottom,
        to: area.top,
    };

    // Ticks and grid.
    let tick = 4.0 * s;
    let tick_size = 9.0 * s;
    if categorical && !horizontal {
        let every = (slots / (area.width() / (48.0 * s)).max(1.0)).ceil().max(1.0) as usize;
        for (i, label) in panel.categories.iter().enumerate().step_by(every) {
            let x = xs.map(i as f64);
            out.push(line((x, area.bottom), (x, area.bottom + tick), Rgb::INK, s));
            let y = area.bottom + tick + 8.0 * s;
            out.push(text(x, y, &truncate(label, 10), tick_size, Anchor::Middle));
        }
    } else {
        let time = panel.x_axis == AxisKind::Time;
        let ticks = if time { even_ticks(xs.lo, xs.hi, 4) } else { nice_ticks(xs.lo, xs.hi, 6) };
        let step = ticks.get(1).zip(ticks.first()).map(|(b, a)| b - a).unwrap_or(1.0);
        for v in ticks {
            let x = xs.map(v);
            if panel.grid {
                out.push(line((x, area.top), (x, area.bottom), Rgb::GRID, s));
            }
            out.push(line((x, area.bottom), (x, area.bottom + tick), Rgb::INK, s));
            let label = if time { time_label(v, xs.hi - xs.lo) } else { tick_label(v, step) };
            out.push(text(x, area.bottom + tick + 8.0 * s, &label, tick_size, Anchor::Middle));
        }
    }
    if categorical && horizontal {
        let every = (slots / (area.height() / (14.0 * s)).max(1.0)).ceil().max(1.0) as usize;
        for (i, label) in panel.categories.iter().enumerate().step_by(every) {
            let y = ys.map(i as f64);
            out.push(line((area.left - tick, y), (area.left, y), Rgb::INK, s));
            let x = area.left - tick - 2.0 * s;
            out.push(text(x, y, &truncate(label, 9), tick_size, Anchor::End));
        }
    } else {
        let ticks = nice_ticks(ys.lo, ys.hi, 6);
        let step = ticks.get(1).zip(ticks.first()).map(|(b, a)| b - a).unwrap_or(1.0);
        for v in ticks {
            let y = ys.map(v);
            if panel.grid {
                out.push(line((area.left, y), (area.right, y), Rgb::GRID, s));
            }
            out.push(line((area.left - tick, y), (area.left, y), Rgb::INK, s));
            let x = area.left - tick - 2.0 * s;
            out.push(text(x, y, &tick_label(v, step), tick_size, Anchor::End));
        }
    }

    for mark in &panel.marks {
        draw_mark(out, mark, &xs, &ys, area, s);
    }

    out.push(Shape::Rect {
        x: area.left,
        y: area.top,
        w: area.width(),
        h: area.height(),
        fill: None,
        alpha: 1.0,
        stroke: Some(Rgb::INK),
    });
    axis_labels(out, panel, area, cell, s);
    let entries = panel.legend_entries();
    if panel.legend && !entries.is_empty() {
        draw_legend(out, &entries, area, s);
    }
}

fn extend(mark: &Mark, xe: &mut Extent, ye: &mut Extent) {
    match mark {
        Mark::Line { x, y, .. } | Mark::Scatter { x, y, .. } => {
            for (a, b) in x.iter().zip(y) {
                if a.is_finite() && b.is_finite() {
                    xe.add(*a);
                    ye.add(*b);
                }
            }
        }
        Mark::Bars {
            x,
            heights,
            bottoms,
            width,
            horizontal,
            ..
        } => {
            let (slot_axis, value_axis) = if *horizontal { (ye, xe) } else { (xe, ye) };
            for ((x, h), b) in x.iter().zip(heights).zip(bottoms) {
                if h.is_finite() {
                    slot_axis.add(x - width / 2.0);
                    slot_axis.add(x + width / 2.0);
                    value_axis.add(*b);
                    value_axis.add(b + h);
                }
            }
        }
        Mark::Boxes { positions, stats, .. } => {
            for (p, st) in positions.iter().zip(stats) {
                xe.add(p - 0.4);
                xe.add(p + 0.4);
                ye.add(st[0]);
                ye.add(st[4]);
            }
        }
        Mark::Rule { value, vertical, .. } => {
            if *vertical {
                xe.add(*value);
            } else {
                ye.add(*value);
            }
        }
        Mark::Pie { .. } | Mark::Heat { .. } => {}
    }
}

fn draw_mark(out: &mut Vec<Shape>, mark: &Mark, xs: &Scale, ys: &Scale, area: Area, s: f64) {
    match mark {
        Mark::Line {
            x,
            y,
            style,
            width,
            markers,
            dashed,
        } => {
            let mut run: Vec<(f64, f64)> = Vec::new();
            let flush = |run: &mut Vec<(f64, f64)>, out: &mut Vec<Shape>| {
                if run.len() >= 2 {
                    out.push(Shape::Line {
                        points: std::mem::take(run),
                        color: style.color,
                        width: width * s,
                        dashed: *dashed,
                    });
                } else {
                    run.clear();
                }
            };
            for (a, b) in x.iter().zip(y) {
                if a.is_finite() && b.is_finite() {
                    let point = (xs.map(*a), ys.map(*b));
                    run.push(point);
                    if *markers {
                        out.push(Shape::Circle {
                            cx: point.0,
                            cy: point.1,
                            r: 3.0 * s,
                            fill: style.color,
                            alpha: style.alpha,
                        });
                    }
                } else {
                    flush(&mut run, out);
                }
            }
            flush(&mut run, out);
        }
        Mark::Scatter { x, y, style, size } => {
            let r = size.max(1.0).sqrt() / 2.0 * (100.0 * s / 72.0);
            for (a, b) in x.iter().zip(y) {
                if a.is_finite() && b.is_finite() {
                    out.push(Shape::Circle {
                        cx: xs.map(*a),
                        cy: ys.map(*b),
                        r,
                        fill: style.color,
                        alpha: if style.alpha < 1.0 { style.alpha } else { 0.85 },
                    });
                }
            }
        }
        Mark::Bars {
            x,
            heights,
            bottoms,
            width,
            horizontal,
            style,
        } => {
            for ((x, h), b) in x.iter().zip(heights).zip(bottoms) {
                if !h.is_finite() {
                    continue;
                }
                let (x0, x1, y0, y1) = if *horizontal {
                    (xs.map(*b), xs.map(b + h), ys.map(x - width / 2.0), ys.map(x + width / 2.0))
                } else {
                    (xs.map(x - width / 2.0), xs.map(x + width / 2.0), ys.map(*b), ys.map(b + h))
                };
                out.push(Shape::Rect {
                    x: x0.min(x1),
                    y: y0.min(y1),
                    w: (x1 - x0).abs(),
                    h: (y1 - y0).abs(),
                    fill: Some(style.color),
                    alpha: style.alpha,
                    stroke: None,
                });
            }
        }
        Mark::Boxes { positions, stats, style } => {
            for (p, [low, q1, median, q3, high]) in positions.iter().zip(stats) {
                if !median.is_finite() {
                    continue;
                }
                let (left, right) = (xs.map(p - 0.25), xs.map(p + 0.25));
                let (cap_l, cap_r) = (xs.map(p - 0.12), xs.map(p + 0.12));
                let cx = xs.map(*p);
                out.push(Shape::Rect {
                    x: left,
                    y: ys.map(*q3),
                    w: right - left,
                    h: ys.map(*q1) - ys.map(*q3),
                    fill: Some(style.color),
                    alpha: 0.35,
                    stroke: Some(style.color),
                });
                let mid = ys.map(*median);
                out.push(line((left, mid), (right, mid), PALETTE[1], 2.0 * s));
                out.push(line((cx, ys.map(*q1)), (cx, ys.map(*low)), Rgb::INK, s));
                out.push(line((cx, ys.map(*q3)), (cx, ys.map(*high)), Rgb::INK, s));
                out.push(line((cap_l, ys.map(*low)), (cap_r, ys.map(*low)), Rgb::INK, s));
                out.push(line((cap_l, ys.map(*high)), (cap_r, ys.map(*high)), Rgb::INK, s));
            }
        }
        Mark::Rule {
            value,
            vertical,
            style,
            dashed,
        } => {
            let points = if *vertical {
                vec![(xs.map(*value), area.top), (xs.map(*value), area.bottom)]
            } else {
                vec![(area.left, ys.map(*value)), (area.right, ys.map(*value))]
            };
            out.push(Shape::Line {
                points,
                color: style.color,
                width: 1.5 * s,
                dashed: *dashed,
            });
        }
        Mark::Pie { .. } | Mark::Heat { .. } => {}
    }
}

fn axis_labels(out: &mut Vec<Shape>, panel: &Panel, area: Area, cell: Area, s: f64) {
    if let Some(label) = &panel.xlabel {
        out.push(text(area.center().0, area.bottom + 34.0 * s, label, 10.0 * s, Anchor::Middle));
    }
    if let Some(label) = &panel.ylabel {
        out.push(Shape::Text {
            x: cell.left + 12.0 * s,
            y: area.center().1,
            text: label.clone(),
            size: 10.0 * s,
            anchor: Anchor::Middle,
            color: Rgb::INK,
            vertical: true,
        });
    }
}

fn draw_legend(out: &mut Vec<Shape>, entries: &[(String, Rgb)], area: Area, s: f64) {
    let size = 9.0 * s;
    let longest = entries.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0) as f64;
    let w = longest * size * 0.62 + 30.0 * s;
    let h = entries.len() as f64 * 16.0 * s + 8.0 * s;
    let x = area.right - w - 8.0 * s;
    let y = area.top + 8.0 * s;
    out.push(Shape::Rect {
        x,
        y,
        w,
        h,
        fill: Some(Rgb::WHITE),
        alpha: 0.85,
        stroke: Some(Rgb::GRID),
    });
    for (i, (label, color)) in entries.iter().enumerate() {
        let row = y + 4.0 * s + i as f64 * 16.0 * s + 8.0 * s;
        out.push(Shape::Rect {
            x: x + 6.0 * s,
            y: row - 5.0 * s,
            w: 12.0 * s,
            h: 10.0 * s,
            fill: Some(*color),
            alpha: 1.0,
            stroke: None,
        });
        out.push(text(x + 24.0 * s, row, label, size, Anchor::Start));
    }
}

fn draw_pie(
    out: &mut Vec<Shape>,
    values: &[f64],
    labels: &[String],
    percents: Option<&Vec<String>>,
    area: Area,
    s: f64,
) {
    let total: f64 = values.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
    if total <= 0.0 {
        return;
    }
    let (cx, cy) = area.center();
    let r = area.width().min(area.height()) / 2.0 * 0.85;
    let mut angle = 0.0_f64;
    for (i, v) in values.iter().enumerate() {
        if !v.is_finite() || *v <= 0.0 {
            continue;
        }
        let sweep = v / total * std::f64::consts::TAU;
        let steps = ((sweep.to_degrees() / 2.0).ceil() as usize).max(1);
        let mut points = vec![(cx, cy)];
        for k in 0..=steps {
            let a = angle + sweep * k as f64 / steps as f64;
            points.push((cx + r * a.cos(), cy - r * a.sin()));
        }
        out.push(Shape::Polygon {
            points,
            fill: PALETTE[i % PALETTE.len()],
            stroke: Some(Rgb::WHITE),
        });
        let mid = angle + sweep / 2.0;
        if let Some(label) = labels.get(i).filter(|l| !l.is_empty()) {
            let anchor = if mid.cos() >= 0.0 { Anchor::Start } else { Anchor::End };
            let (x, y) = (cx + 1.1 * r * mid.cos(), cy - 1.1 * r * mid.sin());
            out.push(text(x, y, label, 9.0 * s, anchor));
        }
        if let Some(pct) = percents.and_then(|p| p.get(i)) {
            let (x, y) = (cx + 0.6 * r * mid.cos(), cy - 0.6 * r * mid.sin());
            out.push(text(x, y, pct, 9.0 * s, Anchor::Middle));
        }
        angle += sweep;
    }
}

/// coolwarm for correlation-like data in `[-1, 1]`, YlGnBu otherwise.
fn heat_color(v: f64, lo: f64, hi: f64, diverging: bool) -> Rgb {
    let lerp = |a: Rgb, b: Rgb, t: f64| {
        let t = t.clamp(0.0, 1.0);
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
        Rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
    };
    if diverging {
        let (cold, mid, warm) = (Rgb(59, 76, 192), Rgb(221, 221, 221), Rgb(180, 4, 38));
        if v < 0.0 { lerp(mid, cold, -v) } else { lerp(mid, warm, v) }
    } else {
        let t = if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };
        lerp(Rgb(255, 255, 217), Rgb(8, 29, 88), t)
    }
}

fn draw_heat(
    out: &mut Vec<Shape>,
    rows: &[String],
    cols: &[String],
    values: &[Vec<f64>],
    notes: Option<&Vec<Vec<String>>>,
    area: Area,
    s: f64,
) {
    if rows.is_empty() || cols.is_empty() {
        return;
    }
    let mut extent = Extent::empty();
    for v in values.iter().flatten() {
        extent.add(*v);
    }
    let diverging = !extent.is_empty() && extent.lo < 0.0 && extent.lo >= -1.0 && extent.hi <= 1.0;
    let cw = area.width() / cols.len() as f64;
    let ch = area.height() / rows.len() as f64;
    for (r, row) in values.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            let x = area.left + c as f64 * cw;
            let y = area.top + r as f64 * ch;
            let color = if v.is_finite() {
                heat_color(*v, extent.lo, extent.hi, diverging)
            } else {
                Rgb::WHITE
            };
            out.push(Shape::Rect {
                x,
                y,
                w: cw,
                h: ch,
                fill: Some(color),
                alpha: 1.0,
                stroke: None,
            });
            if let Some(note) = notes.and_then(|n| n.get(r)).and_then(|row| row.get(c)) {
                let ink = if color.luminance() < 128.0 { Rgb::WHITE } else { Rgb::BLACK };
                out.push(Shape::Text {
                    x: x + cw / 2.0,
                    y: y + ch / 2.0,
                    text: note.clone(),
                    size: 8.0 * s,
                    anchor: Anchor::Middle,
                    color: ink,
                    vertical: false,
                });
            }
        }
    }
    for (r, label) in rows.iter().enumerate() {
        let y = area.top + (r as f64 + 0.5) * ch;
        out.push(text(area.left - 4.0 * s, y, &truncate(label, 9), 9.0 * s, Anchor::End));
    }
    for (c, label) in cols.iter().enumerate() {
        let x = area.left + (c as f64 + 0.5) * cw;
        out.push(text(x, area.bottom + 12.0 * s, &truncate(label, 9), 9.0 * s, Anchor::Middle));
    }
}

/// Round-number ticks (1, 2, 5 times a power of ten) covering `[lo, hi]`.
pub fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    let span = hi - lo;
    if !span.is_finite() || span <= 0.0 {
        return vec![lo];
    }
    let raw = span / target.max(1) as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let norm = raw / magnitude;
    let step = magnitude
        * if norm < 1.5 {
            1.0
        } else if norm < 3.0 {
            2.0
        } else if norm < 7.0 {
            5.0
        } else {
            10.0
        };
    let first = (lo / step).ceil();
    let mut ticks = Vec::new();
    for i in 0.. {
        let v = (first + i as f64) * step;
        if v > hi + step * 1e-9 {
            break;
        }
        ticks.push(if v.abs() < step * 1e-9 { 0.0 } else { v });
    }
    ticks
}

fn even_ticks(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    (0..=n).map(|i| lo + (hi - lo) * i as f64 / n as f64).collect()
}

pub fn tick_label(v: f64, step: f64) -> String {
    if v.abs() >= 1e6 && step >= 1e5 {
        return format!("{:.1e}", v);
    }
    if step >= 1.0 && v.fract() == 0.0 {
        return format!("{}", v as i64);
    }
    let decimals = (-step.log10().floor()).max(0.0) as usize;
    format!("{:.*}", decimals, v)
}

fn time_label(seconds: f64, span: f64) -> String {
    match DateTime::from_timestamp(seconds as i64, 0) {
        Some(d) if span > 2.0 * 86_400.0 => d.format("%Y-%m-%d").to_string(),
        Some(d) => d.format("%m-%d %H:%M").to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Panel, Style};
    use super::*;

    #[test]
    fn test_nice_ticks() {
        assert_eq!(nice_ticks(0.0, 10.0, 5), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        let fractions = nice_ticks(0.0, 1.0, 5);
        assert_eq!(fractions.len(), 6);
        assert!((fractions[3] - 0.6).abs() < 1e-9);
        assert_eq!(nice_ticks(3.0, 3.0, 5), vec![3.0]);
    }

    #[test]
    fn test_tick_label() {
        assert_eq!(tick_label(20.0, 5.0), "20");
        assert_eq!(tick_label(0.25, 0.05), "0.25");
        assert_eq!(tick_label(2_000_000.0, 500_000.0), "2.0e6");
    }

    #[test]
    fn test_padded_extent_keeps_zero_baseline() {
        let mut e = Extent::empty();
        e.add(0.0);
        e.add(10.0);
        assert_eq!(e.padded(true), (0.0, 10.5));
        assert_eq!(Extent::empty().padded(false), (0.0, 1.0));
    }

    #[test]
    fn test_layout_draws_bars_and_title() {
        let mut fig = Figure::new(4.0, 3.0, 100.0, 1, 1);
        let panel: &mut Panel = &mut fig.panels[0];
        panel.title = Some("Sales".into());
        panel.category_slot("a");
        panel.category_slot("b");
        panel.marks.push(Mark::Bars {
            x: vec![0.0, 1.0],
            heights: vec![3.0, 5.0],
            bottoms: vec![0.0, 0.0],
            width: 0.8,
            horizontal: false,
            style: Style {
                color: PALETTE[0],
                label: None,
                alpha: 1.0,
            },
        });
        let scene = layout(&fig);
        assert_eq!((scene.width, scene.height), (400, 300));
        let bars = scene
            .shapes
            .iter()
            .filter(|s| matches!(s, Shape::Rect { fill: Some(c), .. } if *c == PALETTE[0]))
            .count();
        assert_eq!(bars, 2);
        assert!(scene
            .shapes
            .iter()
            .any(|s| matches!(s, Shape::Text { text, .. } if text == "Sales")));
    }
}
