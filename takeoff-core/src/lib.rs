pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。归一化坐标与渲染坐标共用此类型，
    /// 由所在字段决定其坐标空间。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn midpoint(self, other: Point2) -> Point2 {
            Self((self.0 + other.0) * 0.5)
        }

        /// 线性插值，`t = 0` 返回自身，`t = 1` 返回 `other`。
        #[inline]
        pub fn lerp(self, other: Point2, t: f64) -> Point2 {
            Self(self.0.lerp(other.0, t))
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        pub const ZERO: Vector2 = Vector2(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        /// 与 +X 轴的夹角（弧度），屏幕坐标系下 Y 轴向下。
        #[inline]
        pub fn angle(self) -> f64 {
            self.0.y.atan2(self.0.x)
        }

        #[inline]
        pub fn negate(self) -> Self {
            Self(-self.0)
        }

        #[inline]
        pub fn add(self, other: Vector2) -> Self {
            Self(self.0 + other.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        /// 由任意两个对角点构造，自动整理 min/max。
        pub fn from_corners(a: Point2, b: Point2) -> Self {
            Self {
                min: Point2::from_vec(a.as_vec2().min(b.as_vec2())),
                max: Point2::from_vec(a.as_vec2().max(b.as_vec2())),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            self.min.midpoint(self.max)
        }
    }

    /// 折线总长度。
    pub fn polyline_length(points: &[Point2]) -> f64 {
        points
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .sum()
    }

    /// 沿折线弧长一半处的点；少于两个点时退化为首点。
    pub fn polyline_midpoint(points: &[Point2]) -> Option<Point2> {
        let first = *points.first()?;
        let total = polyline_length(points);
        if total <= f64::EPSILON {
            return Some(first);
        }
        let mut remaining = total * 0.5;
        for pair in points.windows(2) {
            let segment = pair[0].distance(pair[1]);
            if segment >= remaining && segment > 0.0 {
                return Some(pair[0].lerp(pair[1], remaining / segment));
            }
            remaining -= segment;
        }
        points.last().copied()
    }
}

pub mod coords {
    //! 坐标管线：归一化权威空间（0–1000）→ 渲染空间（当前页面像素）→ 视图空间（叠加平移）。

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Vector2};

    /// 提取端输出的归一化坐标范围上限。
    pub const NORMALIZED_EXTENT: f64 = 1000.0;

    /// 当前页面栅格的像素尺寸，即渲染空间的范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct RenderSize {
        pub width: f64,
        pub height: f64,
    }

    impl RenderSize {
        #[inline]
        pub fn new(width: f64, height: f64) -> Self {
            Self { width, height }
        }

        /// 页面尚未解码（或尺寸非法）时为真，此时应跳过绘制。
        #[inline]
        pub fn is_empty(&self) -> bool {
            !(self.width.is_finite() && self.height.is_finite())
                || self.width <= 0.0
                || self.height <= 0.0
        }
    }

    /// 归一化坐标映射到渲染空间。与平移、旋转无关，只取决于当前页面栅格尺寸。
    #[inline]
    pub fn to_render_space(normalized: Point2, size: RenderSize) -> Point2 {
        Point2::new(
            normalized.x() / NORMALIZED_EXTENT * size.width,
            normalized.y() / NORMALIZED_EXTENT * size.height,
        )
    }

    /// `to_render_space` 的逆映射；尺寸为零时无解。
    pub fn to_normalized_space(render: Point2, size: RenderSize) -> Option<Point2> {
        if size.is_empty() {
            return None;
        }
        Some(Point2::new(
            render.x() / size.width * NORMALIZED_EXTENT,
            render.y() / size.height * NORMALIZED_EXTENT,
        ))
    }

    /// 归一化长度按轴映射到渲染空间。
    #[inline]
    pub fn scale_extent(width: f64, height: f64, size: RenderSize) -> (f64, f64) {
        (
            width / NORMALIZED_EXTENT * size.width,
            height / NORMALIZED_EXTENT * size.height,
        )
    }

    /// 视图层平移。底图与覆盖层同样平移，已存储的数据无需换算。
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct ViewTransform {
        pan: Vector2,
    }

    impl ViewTransform {
        #[inline]
        pub fn new(pan: Vector2) -> Self {
            Self { pan }
        }

        #[inline]
        pub fn pan(&self) -> Vector2 {
            self.pan
        }

        #[inline]
        pub fn set_pan(&mut self, pan: Vector2) {
            self.pan = pan;
        }

        #[inline]
        pub fn render_to_view(&self, point: Point2) -> Point2 {
            point.translate(self.pan)
        }

        #[inline]
        pub fn view_to_render(&self, point: Point2) -> Point2 {
            point.translate(self.pan.negate())
        }
    }
}

pub mod color {
    use serde::{Deserialize, Serialize};

    /// 非预乘 RGBA 颜色。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Rgba {
        pub r: u8,
        pub g: u8,
        pub b: u8,
        pub a: u8,
    }

    impl Rgba {
        pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
        pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);

        #[inline]
        pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
            Self { r, g, b, a: 255 }
        }

        #[inline]
        pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
            Self { r, g, b, a }
        }

        /// 以 0–1 的不透明度替换 alpha 通道。
        pub fn with_opacity(self, opacity: f32) -> Self {
            let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
            Self { a: alpha, ..self }
        }

        /// 解析 `#rrggbb` 或 `#rrggbbaa`。
        pub fn from_hex(value: &str) -> Option<Self> {
            let hex = value.trim().strip_prefix('#').unwrap_or(value.trim());
            let channel = |index: usize| u8::from_str_radix(hex.get(index..index + 2)?, 16).ok();
            match hex.len() {
                6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
                8 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
                _ => None,
            }
        }

        pub fn to_hex(self) -> String {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        }
    }
}

pub mod page {
    use serde::{Deserialize, Serialize};

    pub const DEFAULT_ZOOM: f64 = 1.0;
    pub const MIN_ZOOM: f64 = 0.25;
    pub const MAX_ZOOM: f64 = 4.0;

    /// 缩放倍数限制在合法区间内；非有限值回退到默认值。
    #[inline]
    pub fn clamp_zoom(value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            DEFAULT_ZOOM
        }
    }

    /// 页面旋转，仅允许 90° 的整数倍。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub enum Rotation {
        #[default]
        Deg0,
        Deg90,
        Deg180,
        Deg270,
    }

    impl Rotation {
        /// 任意角度取模 360 后映射；非 90° 整数倍返回 `None`。
        pub fn from_degrees(degrees: i32) -> Option<Self> {
            match degrees.rem_euclid(360) {
                0 => Some(Rotation::Deg0),
                90 => Some(Rotation::Deg90),
                180 => Some(Rotation::Deg180),
                270 => Some(Rotation::Deg270),
                _ => None,
            }
        }

        #[inline]
        pub fn degrees(self) -> i32 {
            match self {
                Rotation::Deg0 => 0,
                Rotation::Deg90 => 90,
                Rotation::Deg180 => 180,
                Rotation::Deg270 => 270,
            }
        }

        #[inline]
        pub fn rotate_cw(self) -> Self {
            Self::from_degrees(self.degrees() + 90).unwrap_or_default()
        }

        #[inline]
        pub fn rotate_ccw(self) -> Self {
            Self::from_degrees(self.degrees() - 90).unwrap_or_default()
        }

        /// 旋转后页面宽高是否互换。
        #[inline]
        pub fn swaps_axes(self) -> bool {
            matches!(self, Rotation::Deg90 | Rotation::Deg270)
        }
    }

    /// 已加载文档的元信息，整个会话内不变。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DocumentInfo {
        pub id: String,
        pub page_count: u32,
    }

    impl DocumentInfo {
        pub fn new(id: impl Into<String>, page_count: u32) -> Self {
            Self {
                id: id.into(),
                page_count,
            }
        }

        #[inline]
        pub fn contains_page(&self, page_number: u32) -> bool {
            (1..=self.page_count).contains(&page_number)
        }
    }
}

pub mod takeoff {
    use serde::{Deserialize, Serialize};

    use crate::color::Rgba;
    use crate::geometry::Point2;

    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ItemId(String);

    impl ItemId {
        pub fn new(raw: impl Into<String>) -> Self {
            Self(raw.into())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    /// 提取端给出的几何，坐标位于 0–1000 归一化空间。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum ItemGeometry {
        /// 线性构件（如墙体），至少两个点。
        Polyline { points: Vec<Point2> },
        /// 面状构件（如房间、吊顶）。
        BoundingBox {
            x: f64,
            y: f64,
            width: f64,
            height: f64,
        },
        /// 离散构件（如门、灯具）。
        PointMarker { position: Point2 },
    }

    /// 图例分组键：仅类型，或类型 + 子类型。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct GroupKey {
        pub item_type: String,
        pub sub_type: Option<String>,
    }

    impl GroupKey {
        pub fn new(item_type: impl Into<String>, sub_type: Option<String>) -> Self {
            Self {
                item_type: item_type.into(),
                sub_type: normalize_sub_type(sub_type),
            }
        }

        /// 显示名称：有子类型时优先使用子类型。
        pub fn label(&self) -> &str {
            self.sub_type.as_deref().unwrap_or(&self.item_type)
        }

        pub fn color(&self) -> Rgba {
            palette_color(&self.item_type, self.sub_type.as_deref())
        }
    }

    impl std::fmt::Display for GroupKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match &self.sub_type {
                Some(sub) => write!(f, "{}/{}", self.item_type, sub),
                None => f.write_str(&self.item_type),
            }
        }
    }

    /// 工程量条目。本子系统只读，不做修改。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TakeoffItem {
        pub id: ItemId,
        pub item_type: String,
        pub sub_type: Option<String>,
        pub quantity: f64,
        pub unit: String,
        pub page_number: u32,
        pub geometry: Option<ItemGeometry>,
    }

    impl TakeoffItem {
        pub fn new(
            id: impl Into<String>,
            item_type: impl Into<String>,
            sub_type: Option<String>,
            quantity: f64,
            unit: impl Into<String>,
            page_number: u32,
        ) -> Self {
            Self {
                id: ItemId::new(id),
                item_type: item_type.into(),
                sub_type: normalize_sub_type(sub_type),
                quantity,
                unit: unit.into(),
                page_number,
                geometry: None,
            }
        }

        pub fn with_geometry(mut self, geometry: Option<ItemGeometry>) -> Self {
            self.geometry = geometry;
            self
        }

        #[inline]
        pub fn has_geometry(&self) -> bool {
            self.geometry.is_some()
        }

        pub fn group_key(&self) -> GroupKey {
            GroupKey::new(self.item_type.clone(), self.sub_type.clone())
        }

        /// 覆盖层标签文字。
        pub fn label(&self) -> &str {
            self.sub_type.as_deref().unwrap_or(&self.item_type)
        }

        #[inline]
        pub fn color(&self) -> Rgba {
            palette_color(&self.item_type, self.sub_type.as_deref())
        }
    }

    fn normalize_sub_type(sub_type: Option<String>) -> Option<String> {
        sub_type
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub const FALLBACK_COLOR: Rgba = Rgba::rgb(0x6b, 0x72, 0x80);

    /// 固定调色板：先匹配（类型, 子类型），再匹配类型，最后回退到灰色。
    pub fn palette_color(item_type: &str, sub_type: Option<&str>) -> Rgba {
        let item_type = item_type.trim().to_ascii_lowercase();
        let sub_type = sub_type.map(|s| s.trim().to_ascii_lowercase());

        let specific = match (item_type.as_str(), sub_type.as_deref()) {
            ("wall", Some("exterior")) => Some(Rgba::rgb(0xdc, 0x26, 0x26)),
            ("wall", Some("interior")) => Some(Rgba::rgb(0x25, 0x63, 0xeb)),
            ("wall", Some("partition")) => Some(Rgba::rgb(0x7c, 0x3a, 0xed)),
            ("wall", Some("demising")) => Some(Rgba::rgb(0xdb, 0x27, 0x77)),
            ("wall", Some("shaft")) => Some(Rgba::rgb(0x92, 0x40, 0x0e)),
            _ => None,
        };
        if let Some(color) = specific {
            return color;
        }

        match item_type.as_str() {
            "wall" => Rgba::rgb(0x1d, 0x4e, 0xd8),
            "door" => Rgba::rgb(0x16, 0xa3, 0x4a),
            "window" => Rgba::rgb(0x06, 0xb6, 0xd4),
            "room" => Rgba::rgb(0xf5, 0x9e, 0x0b),
            "ceiling" => Rgba::rgb(0xa8, 0x55, 0xf7),
            "floor" | "flooring" => Rgba::rgb(0x84, 0xcc, 0x16),
            "fixture" => Rgba::rgb(0xec, 0x48, 0x99),
            "column" => Rgba::rgb(0x47, 0x55, 0x69),
            "opening" => Rgba::rgb(0x14, 0xb8, 0xa6),
            _ => FALLBACK_COLOR,
        }
    }
}

pub mod markup {
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_6, PI};

    use serde::{Deserialize, Serialize};

    use crate::color::Rgba;
    use crate::geometry::{Bounds2D, Point2, Vector2};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MarkupId(u64);

    impl MarkupId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum MarkupKind {
        Line,
        Rectangle,
        Circle,
        Arrow,
        Cloud,
        Freehand,
        Text,
    }

    impl MarkupKind {
        /// 两点定义（锚点 + 对角点）的形状类工具。
        #[inline]
        pub fn is_two_point_shape(self) -> bool {
            matches!(
                self,
                MarkupKind::Line
                    | MarkupKind::Rectangle
                    | MarkupKind::Circle
                    | MarkupKind::Arrow
                    | MarkupKind::Cloud
            )
        }

        pub fn name(self) -> &'static str {
            match self {
                MarkupKind::Line => "line",
                MarkupKind::Rectangle => "rectangle",
                MarkupKind::Circle => "circle",
                MarkupKind::Arrow => "arrow",
                MarkupKind::Cloud => "cloud",
                MarkupKind::Freehand => "freehand",
                MarkupKind::Text => "text",
            }
        }
    }

    /// 用户批注。点位于渲染空间（创建时的缩放级别）。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Markup {
        pub id: MarkupId,
        pub kind: MarkupKind,
        pub points: Vec<Point2>,
        pub color: Rgba,
        pub stroke_width: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub text: Option<String>,
    }

    impl Markup {
        pub fn new(id: MarkupId, kind: MarkupKind, color: Rgba, stroke_width: f64) -> Self {
            Self {
                id,
                kind,
                points: Vec::new(),
                color,
                stroke_width,
                text: None,
            }
        }

        /// 是否满足提交条件：形状需两个不同的点，手绘需至少两点，文字需锚点与非空文本。
        pub fn is_committable(&self) -> bool {
            match self.kind {
                MarkupKind::Text => {
                    !self.points.is_empty()
                        && self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
                }
                MarkupKind::Freehand => self.points.len() >= 2,
                _ => match (self.points.first(), self.points.last()) {
                    (Some(first), Some(last)) if self.points.len() >= 2 => first != last,
                    _ => false,
                },
            }
        }

        /// 两点形状的包围盒。
        pub fn corner_bounds(&self) -> Option<Bounds2D> {
            match self.points.as_slice() {
                [a, .., b] => Some(Bounds2D::from_corners(*a, *b)),
                _ => None,
            }
        }
    }

    /// 箭头两翼相对主干的夹角。
    pub const ARROW_HEAD_ANGLE: f64 = FRAC_PI_6;

    /// 箭头头部：由终点出发、按线段方向反向展开的两个翼点。
    pub fn arrow_head(start: Point2, end: Point2, head_length: f64) -> [Point2; 2] {
        let angle = Vector2::from_points(start, end).angle();
        let wing = |offset: f64| {
            let theta = angle + PI + offset;
            end.translate(Vector2::new(
                head_length * theta.cos(),
                head_length * theta.sin(),
            ))
        };
        [wing(-ARROW_HEAD_ANGLE), wing(ARROW_HEAD_ANGLE)]
    }

    /// 云线的单个半圆弧。角度为屏幕坐标（Y 向下），`sweep` 为正表示顺时针。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct CloudArc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub sweep: f64,
    }

    /// 云线弧半径下限（像素）。
    pub const MIN_CLOUD_ARC_RADIUS: f64 = 1.0;

    /// 单边弧数：`ceil(边长 / 2r)`，半径不小于 [`MIN_CLOUD_ARC_RADIUS`]。
    #[inline]
    pub fn cloud_arcs_per_side(side_length: f64, arc_radius: f64) -> usize {
        if arc_radius <= 0.0 || !side_length.is_finite() || side_length <= 0.0 {
            return 0;
        }
        (side_length / (2.0 * arc_radius.max(MIN_CLOUD_ARC_RADIUS))).ceil() as usize
    }

    /// 沿包围盒四条边顺时针排布的向外凸起的半圆弧。
    pub fn cloud_arcs(a: Point2, b: Point2, arc_radius: f64) -> Vec<CloudArc> {
        let bounds = Bounds2D::from_corners(a, b);
        let (min, max) = (bounds.min(), bounds.max());
        let r = arc_radius.max(MIN_CLOUD_ARC_RADIUS);
        let horizontal = cloud_arcs_per_side(bounds.width(), r);
        let vertical = cloud_arcs_per_side(bounds.height(), r);
        let mut arcs = Vec::with_capacity(2 * (horizontal + vertical));
        let arc = |cx: f64, cy: f64, start_angle: f64| CloudArc {
            center: Point2::new(cx, cy),
            radius: r,
            start_angle,
            sweep: PI,
        };

        // 上边：从左到右，向上凸起
        for i in 0..horizontal {
            let offset = r + 2.0 * r * i as f64;
            arcs.push(arc(min.x() + offset, min.y(), PI));
        }
        // 右边：从上到下，向右凸起
        for i in 0..vertical {
            let offset = r + 2.0 * r * i as f64;
            arcs.push(arc(max.x(), min.y() + offset, -FRAC_PI_2));
        }
        // 下边：从右到左，向下凸起
        for i in 0..horizontal {
            let offset = r + 2.0 * r * i as f64;
            arcs.push(arc(max.x() - offset, max.y(), 0.0));
        }
        // 左边：从下到上，向左凸起
        for i in 0..vertical {
            let offset = r + 2.0 * r * i as f64;
            arcs.push(arc(min.x(), max.y() - offset, FRAC_PI_2));
        }
        arcs
    }

    /// 将圆弧离散为折线点，供不支持弧线的光栅后端使用。
    pub fn sample_arc(arc: &CloudArc, segments: usize) -> Vec<Point2> {
        let segments = segments.max(1);
        (0..=segments)
            .map(|step| {
                let t = step as f64 / segments as f64;
                let theta = arc.start_angle + arc.sweep * t;
                Point2::new(
                    arc.center.x() + arc.radius * theta.cos(),
                    arc.center.y() + arc.radius * theta.sin(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::color::Rgba;
    use super::coords::{RenderSize, ViewTransform, to_normalized_space, to_render_space};
    use super::geometry::{Point2, Vector2, polyline_midpoint};
    use super::markup::{
        MIN_CLOUD_ARC_RADIUS, Markup, MarkupId, MarkupKind, arrow_head, cloud_arcs,
    };
    use super::page::{Rotation, clamp_zoom};
    use super::takeoff::{FALLBACK_COLOR, GroupKey, TakeoffItem, palette_color};
    use proptest::prelude::*;

    #[test]
    fn normalized_point_maps_to_render_space() {
        let size = RenderSize::new(1000.0, 800.0);
        let point = to_render_space(Point2::new(500.0, 500.0), size);
        assert!((point.x() - 500.0).abs() < 1e-9);
        assert!((point.y() - 400.0).abs() < 1e-9);
    }

    #[test]
    fn zero_sized_surface_has_no_inverse() {
        assert!(RenderSize::new(0.0, 800.0).is_empty());
        assert!(to_normalized_space(Point2::new(1.0, 1.0), RenderSize::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn view_transform_applies_pan_both_ways() {
        let transform = ViewTransform::new(Vector2::new(15.0, -5.0));
        let view = transform.render_to_view(Point2::new(10.0, 10.0));
        assert_eq!(view, Point2::new(25.0, 5.0));
        assert_eq!(transform.view_to_render(view), Point2::new(10.0, 10.0));
    }

    #[test]
    fn tiny_cloud_radius_is_clamped() {
        let arcs = cloud_arcs(Point2::new(0.0, 0.0), Point2::new(100.0, 100.0), 1e-9);
        assert_eq!(arcs.len(), 200);
        assert!(arcs.iter().all(|arc| (arc.radius - MIN_CLOUD_ARC_RADIUS).abs() < f64::EPSILON));
    }

    proptest! {
        #[test]
        fn render_space_round_trip(
            x in 0.0f64..=1000.0,
            y in 0.0f64..=1000.0,
            width in 1.0f64..10_000.0,
            height in 1.0f64..10_000.0,
        ) {
            let size = RenderSize::new(width, height);
            let render = to_render_space(Point2::new(x, y), size);
            let back = to_normalized_space(render, size).expect("non-empty size");
            prop_assert!((back.x() - x).abs() < 1e-6);
            prop_assert!((back.y() - y).abs() < 1e-6);
        }

        #[test]
        fn cloud_arc_count_matches_side_formula(
            width in 0.0f64..2000.0,
            height in 0.0f64..2000.0,
            radius in 1.0f64..50.0,
        ) {
            let arcs = cloud_arcs(Point2::new(10.0, 20.0), Point2::new(10.0 + width, 20.0 + height), radius);
            let expected = 2 * (width / (2.0 * radius)).ceil() as usize
                + 2 * (height / (2.0 * radius)).ceil() as usize;
            prop_assert_eq!(arcs.len(), expected);
        }
    }

    #[test]
    fn rotation_wraps_modulo_360() {
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Deg270.rotate_cw(), Rotation::Deg0);
        assert_eq!(Rotation::Deg0.rotate_ccw(), Rotation::Deg270);
        assert!(Rotation::Deg90.swaps_axes());
    }

    #[test]
    fn zoom_is_clamped() {
        assert_eq!(clamp_zoom(0.01), 0.25);
        assert_eq!(clamp_zoom(10.0), 4.0);
        assert_eq!(clamp_zoom(f64::NAN), 1.0);
    }

    #[test]
    fn palette_prefers_subtype_and_falls_back() {
        assert_ne!(
            palette_color("wall", Some("exterior")),
            palette_color("wall", Some("interior"))
        );
        assert_eq!(palette_color("Wall", Some("unknown")), palette_color("wall", None));
        assert_eq!(palette_color("skylight", None), FALLBACK_COLOR);
        assert_eq!(palette_color("door", None), palette_color("door", None));
    }

    #[test]
    fn group_key_ignores_blank_sub_type() {
        let item = TakeoffItem::new("a", "door", Some("  ".to_string()), 1.0, "EA", 1);
        assert_eq!(item.group_key(), GroupKey::new("door", None));
        assert_eq!(item.label(), "door");
    }

    #[test]
    fn shape_needs_two_distinct_points() {
        let mut markup = Markup::new(MarkupId::new(0), MarkupKind::Rectangle, Rgba::BLACK, 2.0);
        markup.points = vec![Point2::new(1.0, 1.0)];
        assert!(!markup.is_committable());
        markup.points.push(Point2::new(1.0, 1.0));
        assert!(!markup.is_committable());
        markup.points[1] = Point2::new(5.0, 1.0);
        assert!(markup.is_committable());
    }

    #[test]
    fn arrow_head_points_back_along_the_shaft() {
        let [left, right] = arrow_head(Point2::new(0.0, 0.0), Point2::new(100.0, 0.0), 10.0);
        assert!(left.x() < 100.0 && right.x() < 100.0);
        assert!((left.y() + right.y()).abs() < 1e-9);
        assert!((left.distance(Point2::new(100.0, 0.0)) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn polyline_midpoint_walks_arc_length() {
        let points = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 30.0),
        ];
        let mid = polyline_midpoint(&points).expect("midpoint");
        assert!((mid.x() - 10.0).abs() < 1e-9);
        assert!((mid.y() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(Rgba::from_hex("#ff0000"), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(Rgba::from_hex("00ff0080"), Some(Rgba::rgba(0, 255, 0, 128)));
        assert_eq!(Rgba::from_hex("#xyz"), None);
        assert_eq!(Rgba::rgb(1, 2, 3).to_hex(), "#010203");
    }
}
