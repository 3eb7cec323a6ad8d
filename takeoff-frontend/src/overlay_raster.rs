//! 把覆盖层帧光栅化到透明的 tiny-skia 表面上。

use takeoff_core::color::Rgba;
use takeoff_core::geometry::Point2;
use takeoff_core::markup::sample_arc;
use takeoff_engine::overlay::{OverlayFrame, OverlayPrimitive, StrokeStyle};
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Rect, Stroke,
    StrokeDash, Transform,
};

use crate::errors::RenderError;
use crate::text::LabelFont;

const ARC_SEGMENTS: usize = 12;
const LABEL_PADDING: f32 = 2.0;
const LABEL_PLATE_OPACITY: f32 = 0.7;

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(color.r, color.g, color.b, color.a));
    paint.anti_alias = true;
    paint
}

fn stroke(style: &StrokeStyle) -> Stroke {
    Stroke {
        width: style.width as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        dash: style
            .dash
            .and_then(|[on, off]| StrokeDash::new(vec![on as f32, off as f32], 0.0)),
        ..Default::default()
    }
}

fn polyline_path(points: &[Point2]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x() as f32, first.y() as f32);
    for point in rest {
        pb.line_to(point.x() as f32, point.y() as f32);
    }
    pb.finish()
}

fn stroke_path(pixmap: &mut Pixmap, path: &Path, style: &StrokeStyle) {
    pixmap.stroke_path(path, &paint(style.color), &stroke(style), Transform::identity(), None);
}

fn fill_and_stroke(
    pixmap: &mut Pixmap,
    path: &Path,
    fill: Option<Rgba>,
    outline: Option<&StrokeStyle>,
) {
    if let Some(fill) = fill {
        pixmap.fill_path(path, &paint(fill), FillRule::Winding, Transform::identity(), None);
    }
    if let Some(outline) = outline {
        stroke_path(pixmap, path, outline);
    }
}

/// 在透明表面上按顺序绘制整帧。标签需要字体；`font` 为 `None` 时跳过标签。
pub fn rasterize_overlay(
    frame: &OverlayFrame,
    font: Option<&LabelFont>,
) -> Result<Pixmap, RenderError> {
    let width = frame.size.width.round().max(1.0) as u32;
    let height = frame.size.height.round().max(1.0) as u32;
    let mut pixmap =
        Pixmap::new(width, height).ok_or(RenderError::SurfaceAllocation { width, height })?;

    for command in &frame.commands {
        match &command.primitive {
            OverlayPrimitive::Polyline { points, stroke } => {
                if let Some(path) = polyline_path(points) {
                    stroke_path(&mut pixmap, &path, stroke);
                }
            }
            OverlayPrimitive::Rect {
                min,
                max,
                fill,
                stroke,
            } => {
                let rect = Rect::from_ltrb(
                    min.x() as f32,
                    min.y() as f32,
                    max.x() as f32,
                    max.y() as f32,
                );
                if let Some(rect) = rect {
                    let path = PathBuilder::from_rect(rect);
                    fill_and_stroke(&mut pixmap, &path, *fill, stroke.as_ref());
                }
            }
            OverlayPrimitive::Circle {
                center,
                radius,
                fill,
                stroke,
            } => {
                if let Some(path) =
                    PathBuilder::from_circle(center.x() as f32, center.y() as f32, *radius as f32)
                {
                    fill_and_stroke(&mut pixmap, &path, *fill, stroke.as_ref());
                }
            }
            OverlayPrimitive::Arc { arc, stroke } => {
                if let Some(path) = polyline_path(&sample_arc(arc, ARC_SEGMENTS)) {
                    stroke_path(&mut pixmap, &path, stroke);
                }
            }
            OverlayPrimitive::Label {
                anchor,
                text,
                color,
                size,
            } => {
                if let Some(font) = font {
                    let size = *size as f32;
                    let plate = Rect::from_xywh(
                        anchor.x() as f32 - LABEL_PADDING,
                        anchor.y() as f32 - LABEL_PADDING,
                        font.text_width(text, size) + 2.0 * LABEL_PADDING,
                        size + 2.0 * LABEL_PADDING,
                    );
                    if let Some(plate) = plate.filter(|_| !text.is_empty()) {
                        pixmap.fill_rect(
                            plate,
                            &paint(Rgba::WHITE.with_opacity(LABEL_PLATE_OPACITY)),
                            Transform::identity(),
                            None,
                        );
                    }
                    font.draw(&mut pixmap, *anchor, text, size, *color);
                }
            }
        }
    }
    Ok(pixmap)
}
