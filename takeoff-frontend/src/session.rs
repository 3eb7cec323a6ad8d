use std::sync::Arc;

use image::RgbaImage;
use takeoff_core::markup::Markup;
use takeoff_core::takeoff::TakeoffItem;
use takeoff_engine::command::{CommandBus, CommandContext, CommandRequest, CommandResponse};
use takeoff_engine::tools::{InteractionHost, InteractionOutcome, PointerEvent};
use takeoff_engine::viewer::{Viewer, ViewerOptions};
use takeoff_io::{MarkupSaver, PageSource};
use tiny_skia::Pixmap;
use tracing::{debug, warn};

use crate::errors::{FrontendError, RenderError};
use crate::export;
use crate::page_renderer::{RasterSurface, render_page};
use crate::text::LabelFont;

/// 查看会话：持有页面来源、查看器状态、已接受的底图与缓存的覆盖层。
///
/// 页面解码在 [`ViewerSession::pump`] 中执行；覆盖层只在底图就绪且状态变化后重建。
pub struct ViewerSession {
    viewer: Viewer,
    source: Box<dyn PageSource>,
    surface: Option<RasterSurface>,
    overlay: Option<Pixmap>,
    font: Option<&'static LabelFont>,
    commands: CommandBus,
}

impl ViewerSession {
    pub fn new(source: Box<dyn PageSource>, options: ViewerOptions) -> Self {
        let mut viewer = Viewer::new(options);
        viewer.load_document(source.document());
        Self {
            viewer,
            source,
            surface: None,
            overlay: None,
            font: LabelFont::system(),
            commands: CommandBus::new(),
        }
    }

    /// 关闭标签字体（测试或无字体环境）。
    pub fn without_labels(mut self) -> Self {
        self.font = None;
        self
    }

    /// 切换到另一份文档；批注与条目随之清空。
    pub fn open(&mut self, source: Box<dyn PageSource>) {
        self.source = source;
        self.surface = None;
        self.overlay = None;
        self.viewer.load_document(self.source.document());
    }

    /// 结束会话：丢弃进行中的交互与已渲染的表面。
    pub fn close(&mut self) {
        self.viewer.close();
        self.surface = None;
        self.overlay = None;
    }

    #[inline]
    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    #[inline]
    pub fn viewer_mut(&mut self) -> &mut Viewer {
        &mut self.viewer
    }

    #[inline]
    pub fn surface(&self) -> Option<&RasterSurface> {
        self.surface.as_ref()
    }

    #[inline]
    pub fn overlay(&self) -> Option<&Pixmap> {
        self.overlay.as_ref()
    }

    pub fn set_takeoff_items(&mut self, items: impl Into<Arc<[TakeoffItem]>>) {
        self.viewer.set_takeoff_items(items);
    }

    pub fn import_markups(&mut self, markups: Vec<Markup>) -> usize {
        self.viewer.import_markups(markups)
    }

    /// 执行待处理的页面渲染并按需重建覆盖层。返回是否有内容被重绘。
    /// 解码失败上报给调用方，当前页保持无覆盖层。
    pub fn pump(&mut self) -> Result<bool, RenderError> {
        let mut repainted = false;
        if let Some(request) = self.viewer.take_render_request() {
            self.surface = None;
            self.overlay = None;
            let surface = match render_page(self.source.as_ref(), &request) {
                Ok(surface) => surface,
                Err(err) => {
                    self.viewer.fail_render(&request);
                    return Err(err);
                }
            };
            if self.viewer.complete_render(&request, surface.size()) {
                self.surface = Some(surface);
                repainted = true;
            }
        }

        if self.viewer.is_overlay_dirty() {
            self.overlay = match self.viewer.overlay_frame() {
                Some(frame) => Some(crate::overlay_raster::rasterize_overlay(&frame, self.font)?),
                None => None,
            };
            self.viewer.mark_overlay_clean();
            repainted = true;
        }
        Ok(repainted)
    }

    pub fn pointer(
        &mut self,
        event: PointerEvent,
        host: &mut dyn InteractionHost,
    ) -> InteractionOutcome {
        self.viewer.handle_pointer(event, host)
    }

    /// 执行一行命令文本。
    pub fn run_command(&mut self, line: &str) -> CommandResponse {
        let Some(request) = CommandRequest::parse(line) else {
            return CommandResponse::err("空命令");
        };
        let mut context = CommandContext {
            viewer: &mut self.viewer,
        };
        let response = self.commands.dispatch(&request, &mut context);
        if !response.success {
            warn!(command = %request.name, message = ?response.message, "命令执行失败");
        }
        response
    }

    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.commands.available_commands().copied().collect();
        names.sort_unstable();
        names
    }

    /// 当前页的扁平化合成图（渲染空间尺寸）。
    pub fn composite(&mut self) -> Result<RgbaImage, FrontendError> {
        self.pump()?;
        let surface = self.surface.as_ref().ok_or(FrontendError::PageNotReady)?;
        Ok(export::composite(surface, self.overlay.as_ref())?)
    }

    pub fn save_markups(&self, saver: &dyn MarkupSaver) -> Result<usize, FrontendError> {
        let document_id = self
            .viewer
            .document()
            .map(|document| document.id.clone())
            .unwrap_or_default();
        let markups = self.viewer.export_markups();
        saver.save(&document_id, &markups)?;
        debug!(document_id = %document_id, count = markups.len(), "批注已导出");
        Ok(markups.len())
    }
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("viewer", &self.viewer)
            .field("surface", &self.surface.as_ref().map(RasterSurface::size))
            .field("has_overlay", &self.overlay.is_some())
            .finish()
    }
}
