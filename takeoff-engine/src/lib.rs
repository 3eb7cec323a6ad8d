pub mod calibration;
pub mod command;
pub mod legend;
pub mod overlay;
pub mod tools;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EngineError {
        #[error("no document is loaded")]
        DocumentNotLoaded,
        #[error("page {page} is out of range 1..={page_count}")]
        PageOutOfRange { page: u32, page_count: u32 },
        #[error("legend group {0} is not present on the current page")]
        GroupNotFound(String),
        #[error("legend group {0} has no drawable geometry")]
        GroupNotToggleable(String),
        #[error("calibration length must be a positive finite number, got {0}")]
        InvalidCalibrationLength(f64),
        #[error("calibration reference segment has zero length")]
        DegenerateCalibrationSegment,
        #[error("unknown tool `{0}`")]
        UnknownTool(String),
    }
}

pub mod state {
    //! 按关注点拆分的显式状态：视图、工具、批注、标定。

    use takeoff_core::color::Rgba;
    use takeoff_core::coords::{RenderSize, ViewTransform};
    use takeoff_core::geometry::Point2;
    use takeoff_core::markup::{Markup, MarkupId, MarkupKind};
    use takeoff_core::page::{DEFAULT_ZOOM, Rotation};
    use tracing::{debug, trace};

    use crate::calibration::CalibrationState;
    use crate::tools::ToolState;

    #[derive(Debug, Clone, PartialEq)]
    pub struct ViewState {
        pub page_number: u32,
        pub zoom: f64,
        pub rotation: Rotation,
        pub transform: ViewTransform,
        /// 已接受的页面栅格尺寸；为 `None` 时页面尚未就绪，不绘制覆盖层。
        pub surface: Option<RenderSize>,
    }

    impl Default for ViewState {
        fn default() -> Self {
            Self {
                page_number: 1,
                zoom: DEFAULT_ZOOM,
                rotation: Rotation::Deg0,
                transform: ViewTransform::default(),
                surface: None,
            }
        }
    }

    /// 新建批注使用的颜色与线宽。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct MarkupStyle {
        pub color: Rgba,
        pub stroke_width: f64,
    }

    impl Default for MarkupStyle {
        fn default() -> Self {
            Self {
                color: Rgba::rgb(0xff, 0x00, 0x00),
                stroke_width: 2.0,
            }
        }
    }

    /// 已提交批注列表与至多一个进行中的批注。
    #[derive(Debug, Clone, PartialEq)]
    pub struct MarkupState {
        committed: Vec<Markup>,
        current: Option<Markup>,
        next_id: u64,
        pub visible: bool,
        pub style: MarkupStyle,
    }

    impl Default for MarkupState {
        fn default() -> Self {
            Self {
                committed: Vec::new(),
                current: None,
                next_id: 1,
                visible: true,
                style: MarkupStyle::default(),
            }
        }
    }

    impl MarkupState {
        pub fn with_style(style: MarkupStyle) -> Self {
            Self {
                style,
                ..Self::default()
            }
        }

        #[inline]
        pub fn committed(&self) -> &[Markup] {
            &self.committed
        }

        #[inline]
        pub fn current(&self) -> Option<&Markup> {
            self.current.as_ref()
        }

        /// 以当前样式分配一个空批注。
        pub fn new_markup(&mut self, kind: MarkupKind) -> Markup {
            let id = MarkupId::new(self.next_id);
            self.next_id = self.next_id.saturating_add(1);
            Markup::new(id, kind, self.style.color, self.style.stroke_width)
        }

        /// 开始新的绘制会话，替换任何未提交的批注。
        pub fn begin(&mut self, kind: MarkupKind, anchor: Point2) {
            let mut markup = self.new_markup(kind);
            markup.points.push(anchor);
            self.current = Some(markup);
        }

        /// 形状工具：点集替换为 `[锚点, 当前点]`。
        pub fn set_far_corner(&mut self, point: Point2) {
            if let Some(current) = self.current.as_mut() {
                current.points.truncate(1);
                current.points.push(point);
            }
        }

        /// 手绘工具：追加轨迹点。
        pub fn append_point(&mut self, point: Point2) {
            if let Some(current) = self.current.as_mut() {
                current.points.push(point);
            }
        }

        pub fn discard_current(&mut self) {
            self.current = None;
        }

        /// 提交进行中的批注；不满足条件时静默丢弃。
        pub fn commit_current(&mut self) -> Option<MarkupId> {
            let markup = self.current.take()?;
            self.commit(markup)
        }

        pub fn commit(&mut self, markup: Markup) -> Option<MarkupId> {
            if !markup.is_committable() {
                trace!(kind = markup.kind.name(), points = markup.points.len(), "丢弃无效批注");
                return None;
            }
            let id = markup.id;
            debug!(id = id.get(), kind = markup.kind.name(), "批注已提交");
            self.committed.push(markup);
            Some(id)
        }

        /// 撤销最近一次提交，不影响进行中的批注。
        pub fn undo_last(&mut self) -> Option<Markup> {
            self.committed.pop()
        }

        /// 清空已提交批注，返回清除数量。
        pub fn clear(&mut self) -> usize {
            let count = self.committed.len();
            self.committed.clear();
            count
        }

        /// 追加外部保存的批注（无效条目跳过），后续编号从已有最大编号之后开始。
        /// 编号重复或已到上限的批注重新编号。
        pub fn restore(&mut self, markups: impl IntoIterator<Item = Markup>) -> usize {
            let before = self.committed.len();
            for mut markup in markups {
                if !markup.is_committable() {
                    continue;
                }
                let raw = markup.id.get();
                let taken = raw == u64::MAX || self.committed.iter().any(|m| m.id == markup.id);
                if taken {
                    markup.id = MarkupId::new(self.next_id);
                    self.next_id = self.next_id.saturating_add(1);
                    debug!(from = raw, to = markup.id.get(), "导入批注重新编号");
                } else {
                    self.next_id = self.next_id.max(raw + 1);
                }
                self.committed.push(markup);
            }
            self.committed.len() - before
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct ViewerState {
        pub view: ViewState,
        pub tool: ToolState,
        pub markups: MarkupState,
        pub calibration: CalibrationState,
    }
}

pub mod viewer {
    use std::sync::Arc;

    use takeoff_core::coords::RenderSize;
    use takeoff_core::markup::Markup;
    use takeoff_core::page::{DEFAULT_ZOOM, DocumentInfo, Rotation, clamp_zoom};
    use takeoff_core::takeoff::{GroupKey, TakeoffItem};
    use tracing::{debug, trace, warn};

    use crate::calibration::{CalibrationState, DEFAULT_PIXELS_PER_UNIT, DEFAULT_UNIT};
    use crate::errors::EngineError;
    use crate::legend::{LegendGroup, PageSummary, VisibilityIndex, build_legend, page_summary};
    use crate::overlay::{MeasurementPreview, OverlayFrame, OverlayInput, OverlayStyle, build_overlay};
    use crate::state::{MarkupState, MarkupStyle, ViewState, ViewerState};
    use crate::tools::{
        self, InteractionHost, InteractionOutcome, PointerEvent, Tool, ToolPhase,
    };

    pub const DEFAULT_ZOOM_STEP: f64 = 0.25;

    /// 查看器初始参数，通常由配置文件映射而来。
    #[derive(Debug, Clone, PartialEq)]
    pub struct ViewerOptions {
        pub default_zoom: f64,
        pub zoom_step: f64,
        pub markup_style: MarkupStyle,
        pub markups_visible: bool,
        pub default_pixels_per_unit: f64,
        pub unit: String,
        pub overlay_style: OverlayStyle,
    }

    impl Default for ViewerOptions {
        fn default() -> Self {
            Self {
                default_zoom: DEFAULT_ZOOM,
                zoom_step: DEFAULT_ZOOM_STEP,
                markup_style: MarkupStyle::default(),
                markups_visible: true,
                default_pixels_per_unit: DEFAULT_PIXELS_PER_UNIT,
                unit: DEFAULT_UNIT.to_string(),
                overlay_style: OverlayStyle::default(),
            }
        }
    }

    /// 一次页面栅格化请求。`generation` 用于丢弃过期结果。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct RenderRequest {
        pub generation: u64,
        pub page_number: u32,
        pub zoom: f64,
        pub rotation: Rotation,
    }

    /// 查看器：持有文档元信息、只读工程量条目、显隐索引与交互状态，
    /// 并保证覆盖层只针对当前已接受的页面栅格绘制。
    #[derive(Debug)]
    pub struct Viewer {
        document: Option<DocumentInfo>,
        items: Arc<[TakeoffItem]>,
        visibility: VisibilityIndex,
        state: ViewerState,
        options: ViewerOptions,
        generation: u64,
        pending_render: Option<RenderRequest>,
        overlay_dirty: bool,
    }

    impl Viewer {
        pub fn new(options: ViewerOptions) -> Self {
            let mut markups = MarkupState::with_style(options.markup_style);
            markups.visible = options.markups_visible;
            let state = ViewerState {
                view: ViewState {
                    zoom: clamp_zoom(options.default_zoom),
                    ..ViewState::default()
                },
                markups,
                calibration: CalibrationState::new(
                    options.default_pixels_per_unit,
                    options.unit.clone(),
                ),
                ..ViewerState::default()
            };
            Self {
                document: None,
                items: Arc::from(Vec::new()),
                visibility: VisibilityIndex::default(),
                state,
                options,
                generation: 0,
                pending_render: None,
                overlay_dirty: true,
            }
        }

        /// 加载新文档：重置页码、视图、显隐与批注，丢弃进行中的会话并请求首页渲染。
        pub fn load_document(&mut self, document: DocumentInfo) {
            tools::cancel_session(&mut self.state);
            debug!(id = %document.id, page_count = document.page_count, "加载文档");
            self.document = Some(document);
            self.items = Arc::from(Vec::new());
            self.visibility.reset();
            self.state.markups.clear();
            self.state.view = ViewState {
                zoom: clamp_zoom(self.options.default_zoom),
                ..ViewState::default()
            };
            self.request_render();
        }

        /// 关闭查看器，丢弃进行中的会话。已提交批注保留，由调用方决定是否导出。
        pub fn close(&mut self) {
            tools::cancel_session(&mut self.state);
            self.document = None;
            self.pending_render = None;
            self.state.view.surface = None;
            self.generation += 1;
            self.overlay_dirty = true;
        }

        #[inline]
        pub fn document(&self) -> Option<&DocumentInfo> {
            self.document.as_ref()
        }

        #[inline]
        pub fn state(&self) -> &ViewerState {
            &self.state
        }

        #[inline]
        pub fn options(&self) -> &ViewerOptions {
            &self.options
        }

        #[inline]
        pub fn page_number(&self) -> u32 {
            self.state.view.page_number
        }

        #[inline]
        pub fn zoom(&self) -> f64 {
            self.state.view.zoom
        }

        #[inline]
        pub fn rotation(&self) -> Rotation {
            self.state.view.rotation
        }

        /// 替换外部提供的工程量条目（只读共享）。
        pub fn set_takeoff_items(&mut self, items: impl Into<Arc<[TakeoffItem]>>) {
            self.items = items.into();
            self.overlay_dirty = true;
            debug!(count = self.items.len(), "更新工程量条目");
        }

        #[inline]
        pub fn items(&self) -> &Arc<[TakeoffItem]> {
            &self.items
        }

        pub fn current_page_items(&self) -> impl Iterator<Item = &TakeoffItem> {
            let page = self.page_number();
            self.items.iter().filter(move |item| item.page_number == page)
        }

        // ---- 页面导航与视图 ----

        pub fn go_to_page(&mut self, page: u32) -> Result<u32, EngineError> {
            let document = self.document.as_ref().ok_or(EngineError::DocumentNotLoaded)?;
            if !document.contains_page(page) {
                return Err(EngineError::PageOutOfRange {
                    page,
                    page_count: document.page_count,
                });
            }
            if page != self.state.view.page_number {
                tools::cancel_session(&mut self.state);
                self.state.view.page_number = page;
                debug!(page, "切换页面");
                self.request_render();
            }
            Ok(page)
        }

        pub fn next_page(&mut self) -> Result<u32, EngineError> {
            self.go_to_page(self.page_number().saturating_add(1))
        }

        pub fn previous_page(&mut self) -> Result<u32, EngineError> {
            self.go_to_page(self.page_number().saturating_sub(1))
        }

        /// 设置缩放倍数（限制在 0.25–4），返回实际生效值。
        pub fn set_zoom(&mut self, zoom: f64) -> f64 {
            let zoom = if zoom.is_finite() {
                clamp_zoom(zoom)
            } else {
                self.state.view.zoom
            };
            if (zoom - self.state.view.zoom).abs() > f64::EPSILON {
                self.state.view.zoom = zoom;
                self.request_render();
            }
            zoom
        }

        pub fn zoom_in(&mut self) -> f64 {
            self.set_zoom(self.state.view.zoom + self.options.zoom_step)
        }

        pub fn zoom_out(&mut self) -> f64 {
            self.set_zoom(self.state.view.zoom - self.options.zoom_step)
        }

        pub fn set_rotation(&mut self, rotation: Rotation) {
            if rotation != self.state.view.rotation {
                self.state.view.rotation = rotation;
                self.request_render();
            }
        }

        pub fn rotate_cw(&mut self) -> Rotation {
            self.set_rotation(self.state.view.rotation.rotate_cw());
            self.state.view.rotation
        }

        pub fn rotate_ccw(&mut self) -> Rotation {
            self.set_rotation(self.state.view.rotation.rotate_ccw());
            self.state.view.rotation
        }

        /// 重置缩放、旋转与平移。
        pub fn reset_view(&mut self) {
            self.state.view.transform = Default::default();
            self.set_rotation(Rotation::Deg0);
            self.set_zoom(self.options.default_zoom);
            self.overlay_dirty = true;
        }

        // ---- 页面渲染门控 ----

        fn request_render(&mut self) {
            self.generation += 1;
            self.state.view.surface = None;
            self.overlay_dirty = true;
            if self.document.is_some() {
                self.pending_render = Some(RenderRequest {
                    generation: self.generation,
                    page_number: self.state.view.page_number,
                    zoom: self.state.view.zoom,
                    rotation: self.state.view.rotation,
                });
            }
        }

        /// 取出待执行的渲染请求（由宿主执行解码）。
        pub fn take_render_request(&mut self) -> Option<RenderRequest> {
            self.pending_render.take()
        }

        /// 宿主完成栅格化后回报尺寸；过期请求被忽略，返回是否被接受。
        pub fn complete_render(&mut self, request: &RenderRequest, size: RenderSize) -> bool {
            if request.generation != self.generation {
                trace!(
                    generation = request.generation,
                    current = self.generation,
                    "忽略过期的页面渲染结果"
                );
                return false;
            }
            if size.is_empty() {
                warn!(page = request.page_number, "页面栅格尺寸为零");
                return false;
            }
            self.state.view.surface = Some(size);
            self.overlay_dirty = true;
            debug!(
                page = request.page_number,
                width = size.width,
                height = size.height,
                "页面渲染完成"
            );
            true
        }

        /// 解码失败：当前页不绘制覆盖层，直到下一次成功渲染。不会自动重试。
        pub fn fail_render(&mut self, request: &RenderRequest) {
            if request.generation == self.generation {
                self.state.view.surface = None;
                self.overlay_dirty = true;
            }
        }

        #[inline]
        pub fn surface_size(&self) -> Option<RenderSize> {
            self.state.view.surface
        }

        // ---- 工具与批注 ----

        #[inline]
        pub fn tool(&self) -> Tool {
            self.state.tool.tool()
        }

        pub fn select_tool(&mut self, tool: Tool) {
            tools::select_tool(&mut self.state, tool);
            self.overlay_dirty = true;
        }

        pub fn begin_calibration(&mut self, known_length: f64) -> Result<(), EngineError> {
            tools::begin_calibration(&mut self.state, known_length)?;
            self.overlay_dirty = true;
            Ok(())
        }

        pub fn handle_pointer(
            &mut self,
            event: PointerEvent,
            host: &mut dyn InteractionHost,
        ) -> InteractionOutcome {
            let outcome = tools::handle_pointer(&mut self.state, event, host);
            if outcome.needs_redraw() {
                self.overlay_dirty = true;
            }
            outcome
        }

        #[inline]
        pub fn markups(&self) -> &[Markup] {
            self.state.markups.committed()
        }

        #[inline]
        pub fn current_markup(&self) -> Option<&Markup> {
            self.state.markups.current()
        }

        /// 导出已提交批注，交由调用方持久化。
        pub fn export_markups(&self) -> Vec<Markup> {
            self.state.markups.committed().to_vec()
        }

        pub fn import_markups(&mut self, markups: Vec<Markup>) -> usize {
            let restored = self.state.markups.restore(markups);
            self.overlay_dirty = true;
            debug!(restored, "导入批注");
            restored
        }

        pub fn undo_markup(&mut self) -> Option<Markup> {
            let removed = self.state.markups.undo_last();
            if removed.is_some() {
                self.overlay_dirty = true;
            }
            removed
        }

        pub fn clear_markups(&mut self) -> usize {
            let count = self.state.markups.clear();
            self.overlay_dirty = true;
            count
        }

        pub fn set_markups_visible(&mut self, visible: bool) {
            self.state.markups.visible = visible;
            self.overlay_dirty = true;
        }

        pub fn toggle_markups_visible(&mut self) -> bool {
            let visible = !self.state.markups.visible;
            self.set_markups_visible(visible);
            visible
        }

        pub fn set_markup_style(&mut self, style: MarkupStyle) {
            self.state.markups.style = style;
        }

        #[inline]
        pub fn calibration(&self) -> &CalibrationState {
            &self.state.calibration
        }

        /// 放弃用户标定，回到默认假定比例。
        pub fn reset_calibration(&mut self) {
            self.state.calibration.reset();
            self.overlay_dirty = true;
            debug!(pixels_per_unit = self.state.calibration.pixels_per_unit(), "比例已重置");
        }

        pub fn set_measurement_unit(&mut self, unit: impl Into<String>) {
            self.state.calibration.set_unit(unit);
            self.overlay_dirty = true;
        }

        // ---- 图例 ----

        pub fn legend(&self) -> Vec<LegendGroup> {
            build_legend(&self.items, self.page_number(), &self.visibility)
        }

        pub fn page_summary(&self) -> PageSummary {
            page_summary(&self.items, self.page_number())
        }

        #[inline]
        pub fn visibility(&self) -> &VisibilityIndex {
            &self.visibility
        }

        /// 切换当前页某分组的显隐；无几何的分组不可切换。
        pub fn toggle_group(&mut self, key: &GroupKey) -> Result<bool, EngineError> {
            let legend = self.legend();
            let group = legend
                .iter()
                .find(|group| &group.key == key)
                .ok_or_else(|| EngineError::GroupNotFound(key.to_string()))?;
            if !group.can_toggle() {
                return Err(EngineError::GroupNotToggleable(key.to_string()));
            }
            let visible = self.visibility.toggle(self.page_number(), key);
            self.overlay_dirty = true;
            debug!(group = %key, visible, "切换分组显隐");
            Ok(visible)
        }

        /// 显示当前页所有分组。
        pub fn show_all_groups(&mut self) {
            self.visibility.show_all(self.page_number());
            self.overlay_dirty = true;
        }

        /// 隐藏当前页所有可切换分组。
        pub fn hide_all_groups(&mut self) {
            let keys: Vec<GroupKey> = self
                .legend()
                .into_iter()
                .filter(|group| group.can_toggle())
                .map(|group| group.key)
                .collect();
            self.visibility.hide_all(self.page_number(), keys.iter());
            self.overlay_dirty = true;
        }

        // ---- 覆盖层 ----

        #[inline]
        pub fn is_overlay_dirty(&self) -> bool {
            self.overlay_dirty
        }

        #[inline]
        pub fn mark_overlay_clean(&mut self) {
            self.overlay_dirty = false;
        }

        /// 测量或标定过程中的预览线。
        pub fn measurement_preview(&self) -> Option<MeasurementPreview> {
            let style = &self.options.overlay_style;
            match self.state.tool.phase() {
                ToolPhase::Measuring { start, current } => {
                    let end = current.unwrap_or(start);
                    let measurement = self.state.calibration.measure(start, end, self.zoom());
                    Some(MeasurementPreview {
                        start,
                        end,
                        label: measurement.label(),
                        color: style.measure_color,
                    })
                }
                ToolPhase::Calibrating {
                    known_length,
                    first: Some(start),
                    current,
                } => Some(MeasurementPreview {
                    start,
                    end: current.unwrap_or(start),
                    label: format!("= {known_length} {}", self.state.calibration.unit()),
                    color: style.calibration_color,
                }),
                _ => None,
            }
        }

        /// 由当前状态构建覆盖层帧；页面未就绪时返回 `None`。
        pub fn overlay_frame(&self) -> Option<OverlayFrame> {
            let size = self.state.view.surface?;
            build_overlay(&OverlayInput {
                size,
                page_number: self.page_number(),
                items: &self.items,
                visibility: &self.visibility,
                markups: self.state.markups.committed(),
                markups_visible: self.state.markups.visible,
                current_markup: self.state.markups.current(),
                measurement: self.measurement_preview(),
                style: &self.options.overlay_style,
            })
        }
    }

    impl Default for Viewer {
        fn default() -> Self {
            Self::new(ViewerOptions::default())
        }
    }

    #[cfg(test)]
    mod tests {
        use takeoff_core::geometry::Point2;
        use takeoff_core::takeoff::ItemGeometry;

        use super::*;
        use crate::overlay::{OverlayLayer, OverlayPrimitive};
        use crate::tools::NullHost;

        fn loaded_viewer(page_count: u32) -> Viewer {
            let mut viewer = Viewer::default();
            viewer.load_document(DocumentInfo::new("drawing-1", page_count));
            viewer
        }

        fn accept_render(viewer: &mut Viewer, size: RenderSize) {
            let request = viewer.take_render_request().expect("pending render");
            assert!(viewer.complete_render(&request, size));
        }

        #[test]
        fn marker_on_current_page_is_painted_at_render_position() {
            let mut viewer = loaded_viewer(3);
            viewer.go_to_page(2).expect("page 2");
            viewer.set_takeoff_items(vec![
                TakeoffItem::new("d1", "door", None, 1.0, "EA", 2).with_geometry(Some(
                    ItemGeometry::PointMarker {
                        position: Point2::new(500.0, 500.0),
                    },
                )),
            ]);
            accept_render(&mut viewer, RenderSize::new(1000.0, 800.0));

            let frame = viewer.overlay_frame().expect("frame");
            let marker = frame.layer(OverlayLayer::Takeoff).find_map(|p| match p {
                OverlayPrimitive::Circle { center, .. } => Some(*center),
                _ => None,
            });
            assert_eq!(marker, Some(Point2::new(500.0, 400.0)));
        }

        #[test]
        fn overlay_waits_for_current_render() {
            let mut viewer = loaded_viewer(3);
            let stale = viewer.take_render_request().expect("first render");
            assert!(viewer.overlay_frame().is_none());

            viewer.go_to_page(2).unwrap();
            // 第一页的结果晚到，必须被丢弃
            assert!(!viewer.complete_render(&stale, RenderSize::new(600.0, 400.0)));
            assert!(viewer.overlay_frame().is_none());

            let current = viewer.take_render_request().expect("second render");
            assert_eq!(current.page_number, 2);
            assert!(viewer.complete_render(&current, RenderSize::new(800.0, 600.0)));
            assert_eq!(
                viewer.overlay_frame().map(|frame| frame.size),
                Some(RenderSize::new(800.0, 600.0))
            );
        }

        #[test]
        fn failed_render_skips_overlay() {
            let mut viewer = loaded_viewer(1);
            let request = viewer.take_render_request().unwrap();
            viewer.fail_render(&request);
            assert!(viewer.overlay_frame().is_none());
            assert!(viewer.take_render_request().is_none());
        }

        #[test]
        fn page_navigation_is_bounded_and_cancels_sessions() {
            let mut viewer = loaded_viewer(3);
            accept_render(&mut viewer, RenderSize::new(100.0, 100.0));
            viewer.select_tool(Tool::Line);
            let mut host = NullHost;
            viewer.handle_pointer(PointerEvent::Down(Point2::new(0.0, 0.0)), &mut host);
            viewer.handle_pointer(PointerEvent::Move(Point2::new(20.0, 20.0)), &mut host);
            assert!(viewer.current_markup().is_some());

            assert_eq!(viewer.next_page(), Ok(2));
            assert!(viewer.current_markup().is_none());
            assert!(viewer.markups().is_empty());

            assert_eq!(viewer.next_page(), Ok(3));
            assert_eq!(
                viewer.next_page(),
                Err(EngineError::PageOutOfRange {
                    page: 4,
                    page_count: 3
                })
            );
            assert_eq!(viewer.go_to_page(1), Ok(1));
            assert!(matches!(
                viewer.previous_page(),
                Err(EngineError::PageOutOfRange { page: 0, .. })
            ));
        }

        #[test]
        fn zoom_and_rotation_are_normalized() {
            let mut viewer = loaded_viewer(1);
            assert_eq!(viewer.set_zoom(10.0), 4.0);
            assert_eq!(viewer.zoom_in(), 4.0);
            assert_eq!(viewer.set_zoom(0.3), 0.3);
            assert_eq!(viewer.zoom_out(), 0.25);
            assert_eq!(viewer.set_zoom(f64::NAN), 0.25);
            assert_eq!(viewer.rotate_ccw(), Rotation::Deg270);
            assert_eq!(viewer.rotate_cw(), Rotation::Deg0);

            let request = viewer.take_render_request().expect("render after view change");
            assert_eq!(request.zoom, 0.25);
            viewer.reset_view();
            assert_eq!(viewer.zoom(), 1.0);
        }

        #[test]
        fn group_without_geometry_is_counted_but_not_toggleable() {
            let mut viewer = loaded_viewer(1);
            viewer.set_takeoff_items(vec![
                TakeoffItem::new("c1", "ceiling", None, 300.0, "SF", 1),
                TakeoffItem::new("w1", "wall", None, 12.0, "LF", 1).with_geometry(Some(
                    ItemGeometry::Polyline {
                        points: vec![Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)],
                    },
                )),
            ]);
            accept_render(&mut viewer, RenderSize::new(500.0, 500.0));

            let legend = viewer.legend();
            let ceiling = legend.iter().find(|g| g.key.item_type == "ceiling").unwrap();
            assert!((ceiling.total_quantity - 300.0).abs() < f64::EPSILON);
            assert!(!ceiling.can_toggle());

            let key = GroupKey::new("ceiling", None);
            assert_eq!(
                viewer.toggle_group(&key),
                Err(EngineError::GroupNotToggleable("ceiling".into()))
            );
            assert_eq!(viewer.toggle_group(&GroupKey::new("wall", None)), Ok(false));
            assert_eq!(
                viewer.toggle_group(&GroupKey::new("door", None)),
                Err(EngineError::GroupNotFound("door".into()))
            );

            let frame = viewer.overlay_frame().unwrap();
            assert_eq!(frame.layer(OverlayLayer::Takeoff).count(), 0);
            viewer.show_all_groups();
            assert!(viewer.overlay_frame().unwrap().layer(OverlayLayer::Takeoff).count() > 0);
            viewer.hide_all_groups();
            assert_eq!(viewer.overlay_frame().unwrap().layer(OverlayLayer::Takeoff).count(), 0);
        }

        #[test]
        fn toggling_a_group_only_hides_it_on_the_current_page() {
            let mut viewer = loaded_viewer(2);
            let door = |id: &str, page: u32| {
                TakeoffItem::new(id, "door", None, 1.0, "EA", page).with_geometry(Some(
                    ItemGeometry::PointMarker {
                        position: Point2::new(500.0, 500.0),
                    },
                ))
            };
            viewer.set_takeoff_items(vec![door("d1", 1), door("d2", 2)]);
            let key = GroupKey::new("door", None);

            viewer.go_to_page(2).unwrap();
            accept_render(&mut viewer, RenderSize::new(1000.0, 800.0));
            assert_eq!(viewer.toggle_group(&key), Ok(false));
            assert_eq!(viewer.overlay_frame().unwrap().layer(OverlayLayer::Takeoff).count(), 0);

            viewer.go_to_page(1).unwrap();
            accept_render(&mut viewer, RenderSize::new(1000.0, 800.0));
            assert!(viewer.legend()[0].visible);
            assert!(viewer.overlay_frame().unwrap().layer(OverlayLayer::Takeoff).count() > 0);

            viewer.hide_all_groups();
            viewer.go_to_page(2).unwrap();
            viewer.show_all_groups();
            viewer.go_to_page(1).unwrap();
            assert!(!viewer.legend()[0].visible);
        }

        #[test]
        fn undo_and_clear_leave_current_markup_alone() {
            let mut viewer = loaded_viewer(1);
            let mut host = NullHost;
            viewer.select_tool(Tool::Line);
            for offset in [0.0, 10.0] {
                viewer.handle_pointer(PointerEvent::Down(Point2::new(offset, 0.0)), &mut host);
                viewer.handle_pointer(PointerEvent::Move(Point2::new(offset, 50.0)), &mut host);
                viewer.handle_pointer(PointerEvent::Up(Point2::new(offset, 50.0)), &mut host);
            }
            assert_eq!(viewer.markups().len(), 2);

            viewer.handle_pointer(PointerEvent::Down(Point2::new(5.0, 5.0)), &mut host);
            viewer.handle_pointer(PointerEvent::Move(Point2::new(9.0, 9.0)), &mut host);
            let undone = viewer.undo_markup().expect("undo");
            assert_eq!(undone.points[0], Point2::new(10.0, 0.0));
            assert_eq!(viewer.clear_markups(), 1);
            assert!(viewer.current_markup().is_some());
            assert!(viewer.undo_markup().is_none());
        }

        #[test]
        fn measurement_preview_tracks_pointer() {
            let mut viewer = loaded_viewer(1);
            accept_render(&mut viewer, RenderSize::new(400.0, 400.0));
            viewer.select_tool(Tool::Measure);
            let mut host = NullHost;
            viewer.handle_pointer(PointerEvent::Down(Point2::new(0.0, 0.0)), &mut host);
            viewer.handle_pointer(PointerEvent::Move(Point2::new(30.0, 40.0)), &mut host);
            let preview = viewer.measurement_preview().expect("preview");
            assert_eq!(preview.end, Point2::new(30.0, 40.0));
            assert_eq!(preview.label, "50.00 ft (est.)");

            let frame = viewer.overlay_frame().unwrap();
            assert!(frame.layer(OverlayLayer::Measurement).any(|p| matches!(
                p,
                OverlayPrimitive::Polyline { stroke, .. } if stroke.dash.is_some()
            )));
        }

        #[test]
        fn imported_markups_do_not_reuse_ids() {
            let mut viewer = loaded_viewer(1);
            let mut saved = Markup::new(
                takeoff_core::markup::MarkupId::new(7),
                takeoff_core::markup::MarkupKind::Line,
                takeoff_core::color::Rgba::BLACK,
                2.0,
            );
            saved.points = vec![Point2::new(0.0, 0.0), Point2::new(5.0, 5.0)];
            let empty = Markup::new(
                takeoff_core::markup::MarkupId::new(9),
                takeoff_core::markup::MarkupKind::Freehand,
                takeoff_core::color::Rgba::BLACK,
                2.0,
            );
            assert_eq!(viewer.import_markups(vec![saved, empty]), 1);

            viewer.select_tool(Tool::Line);
            let mut host = NullHost;
            viewer.handle_pointer(PointerEvent::Down(Point2::new(0.0, 0.0)), &mut host);
            viewer.handle_pointer(PointerEvent::Move(Point2::new(9.0, 0.0)), &mut host);
            let outcome = viewer.handle_pointer(PointerEvent::Leave, &mut host);
            assert_eq!(
                outcome,
                InteractionOutcome::MarkupCommitted(takeoff_core::markup::MarkupId::new(8))
            );
        }

        #[test]
        fn imported_ids_at_the_limit_or_repeated_are_renumbered() {
            use takeoff_core::markup::{MarkupId, MarkupKind};

            let line = |id: u64| {
                let mut markup = Markup::new(
                    MarkupId::new(id),
                    MarkupKind::Line,
                    takeoff_core::color::Rgba::BLACK,
                    2.0,
                );
                markup.points = vec![Point2::new(0.0, 0.0), Point2::new(5.0, 5.0)];
                markup
            };
            let mut viewer = loaded_viewer(1);
            assert_eq!(viewer.import_markups(vec![line(u64::MAX), line(3), line(3)]), 3);

            let mut ids: Vec<u64> = viewer.markups().iter().map(|m| m.id.get()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), 3);
            assert!(!ids.contains(&u64::MAX));

            viewer.select_tool(Tool::Line);
            let mut host = NullHost;
            viewer.handle_pointer(PointerEvent::Down(Point2::new(0.0, 0.0)), &mut host);
            viewer.handle_pointer(PointerEvent::Move(Point2::new(9.0, 0.0)), &mut host);
            let InteractionOutcome::MarkupCommitted(id) =
                viewer.handle_pointer(PointerEvent::Up(Point2::new(9.0, 0.0)), &mut host)
            else {
                panic!("line should commit");
            };
            assert!(!ids.contains(&id.get()));
        }

        #[test]
        fn loading_a_new_document_resets_session() {
            let mut viewer = loaded_viewer(2);
            viewer.go_to_page(2).unwrap();
            viewer.set_takeoff_items(vec![TakeoffItem::new("x", "door", None, 1.0, "EA", 2)]);
            viewer.load_document(DocumentInfo::new("drawing-2", 5));
            assert_eq!(viewer.page_number(), 1);
            assert!(viewer.items().is_empty());
            assert_eq!(viewer.document().map(|d| d.page_count), Some(5));
            viewer.close();
            assert!(viewer.document().is_none());
            assert!(viewer.overlay_frame().is_none());
        }
    }
}
