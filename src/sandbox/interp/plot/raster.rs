//! Software rasterizer for laid-out scenes.
//!
//! Text uses a built-in 3x5 bitmap font scaled to the requested size.

use super::Rgb;
use super::render::{Anchor, Scene, Shape};

pub struct Canvas {
    pub width: u32,
    pub height: u32,
    /// Packed RGB, row-major.
    pub pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 3],
        }
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgb, alpha: f64) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        let painted = if alpha >= 1.0 {
            color
        } else {
            color.over(Rgb(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]), alpha)
        };
        self.pixels[i] = painted.0;
        self.pixels[i + 1] = painted.1;
        self.pixels[i + 2] = painted.2;
    }

    fn fill_rect(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgb, alpha: f64) {
        let (x0, x1) = (x0.round() as i64, x1.round() as i64);
        let (y0, y1) = (y0.round() as i64, y1.round() as i64);
        for y in y0.max(0)..y1.min(self.height as i64) {
            for x in x0.max(0)..x1.min(self.width as i64) {
                self.blend(x, y, color, alpha);
            }
        }
    }

    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgb) {
        let corners = [(x, y), (x + w, y), (x + w, y + h), (x, y + h), (x, y)];
        for pair in corners.windows(2) {
            self.line(pair[0], pair[1], color, 1.0, false);
        }
    }

    fn line(&mut self, a: (f64, f64), b: (f64, f64), color: Rgb, width: f64, dashed: bool) {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
        let half = ((width - 1.0) / 2.0).max(0.0).round() as i64;
        for i in 0..=steps {
            if dashed && i % 10 >= 6 {
                continue;
            }
            let t = i as f64 / steps as f64;
            let (x, y) = ((a.0 + dx * t).round() as i64, (a.1 + dy * t).round() as i64);
            for oy in -half..=half {
                for ox in -half..=half {
                    self.blend(x + ox, y + oy, color, 1.0);
                }
            }
        }
    }

    fn circle(&mut self, cx: f64, cy: f64, r: f64, color: Rgb, alpha: f64) {
        let r = r.max(0.5);
        for y in (cy - r).floor() as i64..=(cy + r).ceil() as i64 {
            for x in (cx - r).floor() as i64..=(cx + r).ceil() as i64 {
                let (px, py) = (x as f64 + 0.5 - cx, y as f64 + 0.5 - cy);
                if px * px + py * py <= r * r {
                    self.blend(x, y, color, alpha);
                }
            }
        }
    }

    /// Even-odd scanline fill.
    fn polygon(&mut self, points: &[(f64, f64)], color: Rgb) {
        if points.len() < 3 {
            return;
        }
        let top = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor().max(0.0) as i64;
        let bottom = points
            .iter()
            .map(|p| p.1)
            .fold(f64::NEG_INFINITY, f64::max)
            .ceil()
            .min(self.height as f64) as i64;
        for y in top..bottom {
            let sy = y as f64 + 0.5;
            let mut crossings = Vec::new();
            for i in 0..points.len() {
                let (a, b) = (points[i], points[(i + 1) % points.len()]);
                if (a.1 <= sy && b.1 > sy) || (b.1 <= sy && a.1 > sy) {
                    crossings.push(a.0 + (sy - a.1) / (b.1 - a.1) * (b.0 - a.0));
                }
            }
            crossings.sort_by(f64::total_cmp);
            for pair in crossings.chunks(2) {
                if let [start, end] = pair {
                    for x in start.round() as i64..end.round() as i64 {
                        self.blend(x, y, color, 1.0);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn text(
        &mut self,
        x: f64,
        y: f64,
        text: &str,
        size: f64,
        anchor: Anchor,
        color: Rgb,
        vertical: bool,
    ) {
        let scale = (size / 6.0).round().max(1.0) as i64;
        let count = text.chars().count() as i64;
        let advance = 4 * scale;
        let extent = (count * advance - scale).max(0);
        let offset = match anchor {
            Anchor::Start => 0,
            Anchor::Middle => extent / 2,
            Anchor::End => extent,
        };
        let (x, y) = (x.round() as i64, y.round() as i64);
        let rise = (5 * scale) / 2;
        for (n, c) in text.chars().enumerate() {
            let pen = n as i64 * advance - offset;
            for (row, bits) in glyph(c).iter().enumerate() {
                for col in 0..3 {
                    if *bits & (0b100u8 >> col) == 0 {
                        continue;
                    }
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let gx = pen + col * scale + sx;
                            let gy = row as i64 * scale + sy - rise;
                            if vertical {
                                self.blend(x + gy, y - gx, color, 1.0);
                            } else {
                                self.blend(x + gx, y + gy, color, 1.0);
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn paint(scene: &Scene) -> Canvas {
    let mut canvas = Canvas::new(scene.width, scene.height);
    for shape in &scene.shapes {
        match shape {
            Shape::Line {
                points,
                color,
                width,
                dashed,
            } => {
                for pair in points.windows(2) {
                    canvas.line(pair[0], pair[1], *color, *width, *dashed);
                }
            }
            Shape::Rect {
                x,
                y,
                w,
                h,
                fill,
                alpha,
                stroke,
            } => {
                if let Some(fill) = fill {
                    canvas.fill_rect(*x, *y, x + w, y + h, *fill, *alpha);
                }
                if let Some(stroke) = stroke {
                    canvas.stroke_rect(*x, *y, *w, *h, *stroke);
                }
            }
            Shape::Circle { cx, cy, r, fill, alpha } => canvas.circle(*cx, *cy, *r, *fill, *alpha),
            Shape::Polygon { points, fill, stroke } => {
                canvas.polygon(points, *fill);
                if let Some(stroke) = stroke {
                    for pair in points.windows(2) {
                        canvas.line(pair[0], pair[1], *stroke, 1.0, false);
                    }
                }
            }
            Shape::Text {
                x,
                y,
                text,
                size,
                anchor,
                color,
                vertical,
            } => canvas.text(*x, *y, text, *size, *anchor, *color, *vertical),
        }
    }
    canvas
}

/// Rows of a 3x5 glyph, high bit on the left. Lowercase shares the uppercase shapes.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b110],
        ' ' => [0; 5],
        '.' => [0, 0, 0, 0, 0b010],
        ',' => [0, 0, 0, 0b010, 0b100],
        ':' => [0, 0b010, 0, 0b010, 0],
        ';' => [0, 0b010, 0, 0b010, 0b100],
        '-' => [0, 0, 0b111, 0, 0],
        '_' => [0, 0, 0, 0, 0b111],
        '+' => [0, 0b010, 0b111, 0b010, 0],
        '=' => [0, 0b111, 0, 0b111, 0],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '\\' => [0b100, 0b100, 0b010, 0b001, 0b001],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '[' => [0b011, 0b010, 0b010, 0b010, 0b011],
        ']' => [0b110, 0b010, 0b010, 0b010, 0b110],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '\'' => [0b010, 0b010, 0, 0, 0],
        '"' => [0b101, 0b101, 0, 0, 0],
        '!' => [0b010, 0b010, 0b010, 0, 0b010],
        '?' => [0b110, 0b001, 0b010, 0, 0b010],
        '#' => [0b101, 0b111, 0b101, 0b111, 0b101],
        '<' => [0b001, 0b010, 0b100, 0b010, 0b001],
        '>' => [0b100, 0b010, 0b001, 0b010, 0b100],
        '*' => [0, 0b101, 0b010, 0b101, 0],
        '&' => [0b010, 0b101, 0b010, 0b101, 0b011],
        '$' => [0b011, 0b110, 0b010, 0b011, 0b110],
        '|' => [0b010, 0b010, 0b010, 0b010, 0b010],
        '^' => [0b010, 0b101, 0, 0, 0],
        '~' => [0, 0b011, 0b110, 0, 0],
        '@' => [0b111, 0b101, 0b111, 0b100, 0b011],
        _ => [0b111, 0b101, 0b101, 0b101, 0b111],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(canvas: &Canvas, x: usize, y: usize) -> (u8, u8, u8) {
        let i = (y * canvas.width as usize + x) * 3;
        (canvas.pixels[i], canvas.pixels[i + 1], canvas.pixels[i + 2])
    }

    #[test]
    fn test_paint_rect_with_alpha() {
        let scene = Scene {
            width: 20,
            height: 20,
            shapes: vec![Shape::Rect {
                x: 5.0,
                y: 5.0,
                w: 10.0,
                h: 10.0,
                fill: Some(Rgb(0, 0, 0)),
                alpha: 0.5,
                stroke: None,
            }],
        };
        let canvas = paint(&scene);
        assert_eq!(canvas.pixels.len(), 20 * 20 * 3);
        assert_eq!(pixel(&canvas, 0, 0), (255, 255, 255));
        assert_eq!(pixel(&canvas, 10, 10), (128, 128, 128));
    }

    #[test]
    fn test_polygon_fills_interior_only() {
        let mut canvas = Canvas::new(10, 10);
        canvas.polygon(&[(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)], Rgb(255, 0, 0));
        assert_eq!(pixel(&canvas, 5, 5), (255, 0, 0));
        assert_eq!(pixel(&canvas, 1, 5), (255, 255, 255));
        assert_eq!(pixel(&canvas, 5, 9), (255, 255, 255));
    }

    #[test]
    fn test_shapes_outside_canvas_are_clipped() {
        let mut canvas = Canvas::new(4, 4);
        canvas.line((-10.0, -10.0), (20.0, 20.0), Rgb::BLACK, 3.0, false);
        canvas.circle(100.0, 100.0, 5.0, Rgb::BLACK, 1.0);
        assert_eq!(pixel(&canvas, 0, 0), (0, 0, 0));
    }

    #[test]
    fn test_text_draws_ink() {
        let mut canvas = Canvas::new(40, 20);
        canvas.text(2.0, 10.0, "Hi", 6.0, Anchor::Start, Rgb::BLACK, false);
        assert!(canvas.pixels.chunks(3).any(|p| p == [0, 0, 0]));
    }
}
