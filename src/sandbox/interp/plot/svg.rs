use std::fmt::Write;

use super::super::frame::html_escape;
use super::render::{Anchor, Scene, Shape};

fn points_attr(points: &[(f64, f64)]) -> String {
    points
        .iter()
        .map(|(x, y)| format!("{:.1},{:.1}", x, y))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn write(scene: &Scene) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" "#,
            r#"viewBox="0 0 {w} {h}" font-family="DejaVu Sans, Arial, sans-serif">"#,
        ),
        w = scene.width,
        h = scene.height
    );
    for shape in &scene.shapes {
        let _ = match shape {
            Shape::Line {
                points,
                color,
                width,
                dashed,
            } => writeln!(
                out,
                concat!(
                    r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{:.1}"{} "#,
                    r#"stroke-linejoin="round"/>"#,
                ),
                points_attr(points),
                color.hex(),
                width,
                if *dashed { r#" stroke-dasharray="6,4""# } else { "" }
            ),
            Shape::Rect {
                x,
                y,
                w,
                h,
                fill,
                alpha,
                stroke,
            } => writeln!(
                out,
                concat!(
                    r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" "#,
                    r#"fill="{}" fill-opacity="{}" stroke="{}"/>"#,
                ),
                x,
                y,
                w,
                h,
                fill.map(|c| c.hex()).unwrap_or_else(|| "none".into()),
                alpha,
                stroke.map(|c| c.hex()).unwrap_or_else(|| "none".into())
            ),
            Shape::Circle { cx, cy, r, fill, alpha } => writeln!(
                out,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}" fill-opacity="{}"/>"#,
                cx,
                cy,
                r,
                fill.hex(),
                alpha
            ),
            Shape::Polygon { points, fill, stroke } => writeln!(
                out,
                r#"<polygon points="{}" fill="{}" stroke="{}"/>"#,
                points_attr(points),
                fill.hex(),
                stroke.map(|c| c.hex()).unwrap_or_else(|| "none".into())
            ),
            Shape::Text {
                x,
                y,
                text,
                size,
                anchor,
                color,
                vertical,
            } => {
                let anchor = match anchor {
                    Anchor::Start => "start",
                    Anchor::Middle => "middle",
                    Anchor::End => "end",
                };
                let rotate = if *vertical {
                    format!(r#" transform="rotate(-90 {:.1} {:.1})""#, x, y)
                } else {
                    String::new()
                };
                writeln!(
                    out,
                    concat!(
                        r#"<text x="{:.1}" y="{:.1}" font-size="{:.1}" text-anchor="{}" "#,
                        r#"dominant-baseline="central" fill="{}"{}>{}</text>"#,
                    ),
                    x,
                    y,
                    size,
                    anchor,
                    color.hex(),
                    rotate,
                    html_escape(text)
                )
            }
        };
    }
    out.push_str("</svg>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::super::Rgb;
    use super::*;

    #[test]
    fn test_write_escapes_text() {
        let scene = Scene {
            width: 10,
            height: 10,
            shapes: vec![Shape::Text {
                x: 1.0,
                y: 2.0,
                text: "a < b & c".into(),
                size: 9.0,
                anchor: Anchor::Middle,
                color: Rgb::INK,
                vertical: true,
            }],
        };
        let svg = write(&scene);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("a &lt; b &amp; c"));
        assert!(svg.contains("rotate(-90 1.0 2.0)"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }
}
