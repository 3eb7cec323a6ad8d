//! 覆盖层：由当前状态纯函数式地生成有序绘制指令，每次状态变化整帧重建。

use takeoff_core::color::Rgba;
use takeoff_core::coords::{RenderSize, scale_extent, to_render_space};
use takeoff_core::geometry::{Point2, polyline_midpoint};
use takeoff_core::markup::{CloudArc, Markup, MarkupKind, arrow_head, cloud_arcs};
use takeoff_core::takeoff::{ItemGeometry, TakeoffItem};

use crate::legend::{VisibilityIndex, drawable_items};

/// 覆盖层样式参数，单位均为渲染空间像素。
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub line_width: f64,
    pub halo_width: f64,
    pub halo_opacity: f32,
    pub fill_opacity: f32,
    pub markup_fill_opacity: f32,
    pub marker_radius: f64,
    pub label_font_size: f64,
    pub markup_font_size: f64,
    pub cloud_arc_radius: f64,
    pub arrow_head_length: f64,
    pub measure_color: Rgba,
    pub calibration_color: Rgba,
    pub dash: [f64; 2],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_width: 3.0,
            halo_width: 10.0,
            halo_opacity: 0.3,
            fill_opacity: 0.2,
            markup_fill_opacity: 0.12,
            marker_radius: 8.0,
            label_font_size: 12.0,
            markup_font_size: 16.0,
            cloud_arc_radius: 12.0,
            arrow_head_length: 15.0,
            measure_color: Rgba::rgb(0xef, 0x44, 0x44),
            calibration_color: Rgba::rgb(0x0e, 0xa5, 0xe9),
            dash: [8.0, 6.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Rgba,
    pub width: f64,
    pub dash: Option<[f64; 2]>,
}

impl StrokeStyle {
    #[inline]
    pub fn solid(color: Rgba, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayPrimitive {
    Polyline {
        points: Vec<Point2>,
        stroke: StrokeStyle,
    },
    Rect {
        min: Point2,
        max: Point2,
        fill: Option<Rgba>,
        stroke: Option<StrokeStyle>,
    },
    Circle {
        center: Point2,
        radius: f64,
        fill: Option<Rgba>,
        stroke: Option<StrokeStyle>,
    },
    Arc {
        arc: CloudArc,
        stroke: StrokeStyle,
    },
    /// `anchor` 为文字框左上角。
    Label {
        anchor: Point2,
        text: String,
        color: Rgba,
        size: f64,
    },
}

/// 绘制层，按声明顺序叠放。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OverlayLayer {
    Takeoff,
    Markups,
    InProgress,
    Measurement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub layer: OverlayLayer,
    pub primitive: OverlayPrimitive,
}

/// 测量或标定的实时预览线。
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPreview {
    pub start: Point2,
    pub end: Point2,
    pub label: String,
    pub color: Rgba,
}

/// 一帧完整的覆盖层绘制指令。
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFrame {
    pub size: RenderSize,
    pub commands: Vec<DrawCommand>,
}

impl OverlayFrame {
    pub fn layer(&self, layer: OverlayLayer) -> impl Iterator<Item = &OverlayPrimitive> {
        self.commands
            .iter()
            .filter(move |command| command.layer == layer)
            .map(|command| &command.primitive)
    }
}

pub struct OverlayInput<'a> {
    pub size: RenderSize,
    pub page_number: u32,
    pub items: &'a [TakeoffItem],
    pub visibility: &'a VisibilityIndex,
    pub markups: &'a [Markup],
    pub markups_visible: bool,
    pub current_markup: Option<&'a Markup>,
    pub measurement: Option<MeasurementPreview>,
    pub style: &'a OverlayStyle,
}

/// 构建覆盖层帧。页面尚未解码（尺寸为零）时返回 `None`，由下一次绘制重试。
pub fn build_overlay(input: &OverlayInput<'_>) -> Option<OverlayFrame> {
    if input.size.is_empty() {
        return None;
    }
    let mut frame = FrameBuilder {
        commands: Vec::new(),
        layer: OverlayLayer::Takeoff,
        style: input.style,
    };

    for item in drawable_items(input.items, input.page_number, input.visibility) {
        frame.takeoff_item(item, input.size);
    }

    if input.markups_visible {
        frame.layer = OverlayLayer::Markups;
        for markup in input.markups {
            frame.markup(markup);
        }
    }

    if let Some(current) = input.current_markup {
        frame.layer = OverlayLayer::InProgress;
        frame.markup(current);
    }

    if let Some(preview) = &input.measurement {
        frame.layer = OverlayLayer::Measurement;
        frame.measurement(preview);
    }

    Some(OverlayFrame {
        size: input.size,
        commands: frame.commands,
    })
}

struct FrameBuilder<'a> {
    commands: Vec<DrawCommand>,
    layer: OverlayLayer,
    style: &'a OverlayStyle,
}

impl FrameBuilder<'_> {
    fn push(&mut self, primitive: OverlayPrimitive) {
        self.commands.push(DrawCommand {
            layer: self.layer,
            primitive,
        });
    }

    fn label(&mut self, anchor: Point2, text: &str, color: Rgba, size: f64) {
        if text.is_empty() {
            return;
        }
        self.push(OverlayPrimitive::Label {
            anchor,
            text: text.to_string(),
            color,
            size,
        });
    }

    fn takeoff_item(&mut self, item: &TakeoffItem, size: RenderSize) {
        let Some(geometry) = &item.geometry else {
            return;
        };
        let style = self.style;
        let color = item.color();
        match geometry {
            ItemGeometry::Polyline { points } => {
                let points: Vec<Point2> = points
                    .iter()
                    .map(|point| to_render_space(*point, size))
                    .collect();
                if points.len() < 2 {
                    return;
                }
                // 先画宽而淡的光晕，再画主线
                self.push(OverlayPrimitive::Polyline {
                    points: points.clone(),
                    stroke: StrokeStyle::solid(
                        color.with_opacity(style.halo_opacity),
                        style.halo_width,
                    ),
                });
                let midpoint = polyline_midpoint(&points);
                self.push(OverlayPrimitive::Polyline {
                    points,
                    stroke: StrokeStyle::solid(color, style.line_width),
                });
                if let Some(midpoint) = midpoint {
                    self.label(midpoint, item.label(), color, style.label_font_size);
                }
            }
            ItemGeometry::BoundingBox {
                x,
                y,
                width,
                height,
            } => {
                let min = to_render_space(Point2::new(*x, *y), size);
                let (w, h) = scale_extent(*width, *height, size);
                self.push(OverlayPrimitive::Rect {
                    min,
                    max: Point2::new(min.x() + w, min.y() + h),
                    fill: Some(color.with_opacity(style.fill_opacity)),
                    stroke: Some(StrokeStyle::solid(color, style.line_width * 0.5)),
                });
                let inset = style.line_width + 2.0;
                self.label(
                    Point2::new(min.x() + inset, min.y() + inset),
                    item.label(),
                    color,
                    style.label_font_size,
                );
            }
            ItemGeometry::PointMarker { position } => {
                let center = to_render_space(*position, size);
                self.push(OverlayPrimitive::Circle {
                    center,
                    radius: style.marker_radius,
                    fill: Some(color.with_opacity(0.8)),
                    stroke: Some(StrokeStyle::solid(Rgba::WHITE, 2.0)),
                });
                self.label(
                    Point2::new(
                        center.x() + style.marker_radius + 4.0,
                        center.y() - style.label_font_size * 0.5,
                    ),
                    item.label(),
                    color,
                    style.label_font_size,
                );
            }
        }
    }

    fn markup(&mut self, markup: &Markup) {
        let style = self.style;
        let stroke = StrokeStyle::solid(markup.color, markup.stroke_width);
        let fill = markup.color.with_opacity(style.markup_fill_opacity);

        if markup.kind == MarkupKind::Text {
            if let (Some(anchor), Some(text)) = (markup.points.first(), markup.text.as_deref()) {
                self.label(*anchor, text, markup.color, style.markup_font_size);
            }
            return;
        }
        if markup.kind == MarkupKind::Freehand {
            if markup.points.len() >= 2 {
                self.push(OverlayPrimitive::Polyline {
                    points: markup.points.clone(),
                    stroke,
                });
            }
            return;
        }

        // 其余形状由锚点与对角点两点定义
        let (start, end) = match markup.points.as_slice() {
            [start, .., end] => (*start, *end),
            _ => return,
        };
        match markup.kind {
            MarkupKind::Line => self.push(OverlayPrimitive::Polyline {
                points: vec![start, end],
                stroke,
            }),
            MarkupKind::Rectangle => {
                if let Some(bounds) = markup.corner_bounds() {
                    self.push(OverlayPrimitive::Rect {
                        min: bounds.min(),
                        max: bounds.max(),
                        fill: Some(fill),
                        stroke: Some(stroke),
                    });
                }
            }
            MarkupKind::Circle => self.push(OverlayPrimitive::Circle {
                center: start,
                radius: start.distance(end),
                fill: Some(fill),
                stroke: Some(stroke),
            }),
            MarkupKind::Arrow => {
                let [left, right] = arrow_head(start, end, style.arrow_head_length);
                self.push(OverlayPrimitive::Polyline {
                    points: vec![start, end],
                    stroke,
                });
                self.push(OverlayPrimitive::Polyline {
                    points: vec![left, end, right],
                    stroke,
                });
            }
            MarkupKind::Cloud => {
                for arc in cloud_arcs(start, end, style.cloud_arc_radius) {
                    self.push(OverlayPrimitive::Arc { arc, stroke });
                }
            }
            MarkupKind::Freehand | MarkupKind::Text => {}
        }
    }

    fn measurement(&mut self, preview: &MeasurementPreview) {
        let style = self.style;
        self.push(OverlayPrimitive::Circle {
            center: preview.start,
            radius: 3.0,
            fill: Some(preview.color),
            stroke: None,
        });
        if preview.start == preview.end {
            return;
        }
        self.push(OverlayPrimitive::Polyline {
            points: vec![preview.start, preview.end],
            stroke: StrokeStyle {
                color: preview.color,
                width: 2.0,
                dash: Some(style.dash),
            },
        });
        self.label(
            preview.start.midpoint(preview.end),
            &preview.label,
            preview.color,
            style.label_font_size,
        );
    }
}
