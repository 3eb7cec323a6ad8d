use std::env;
use std::path::PathBuf;

use takeoff_config::AppConfig;
use takeoff_core::color::Rgba;
use takeoff_core::geometry::Point2;
use takeoff_core::markup::MIN_CLOUD_ARC_RADIUS;
use takeoff_core::takeoff::{ItemGeometry, TakeoffItem};
use takeoff_engine::overlay::OverlayStyle;
use takeoff_engine::state::MarkupStyle;
use takeoff_engine::viewer::ViewerOptions;
use takeoff_io::{
    ImagePageSource, JsonItemFile, JsonMarkupFile, MarkupLoader, PageSource, SyntheticSheetSource,
    TakeoffItemSource,
};
use tracing::{info, warn};

use crate::session::ViewerSession;

const DOCUMENT_PAGES_ENV: &str = "TAKEOFF_DOCUMENT_PAGES";
const ITEMS_FILE_ENV: &str = "TAKEOFF_ITEMS_FILE";
const DEMO_DOCUMENT_ID: &str = "demo-sheet-set";
const DEMO_PAGE_COUNT: u32 = 3;

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    Images(PathBuf),
    Demo,
}

/// 条目来源。
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOrigin {
    File(PathBuf),
    Demo,
}

/// 命令行给出的来源覆盖，优先于环境变量与配置文件。
#[derive(Debug, Clone, Default)]
pub struct SourceOverrides {
    pub document_pages: Option<PathBuf>,
    pub items_file: Option<PathBuf>,
}

/// 统一封装加载后的会话与元信息。
#[derive(Debug)]
pub struct LoadedSession {
    pub session: ViewerSession,
    pub source: DocumentSource,
    pub items: ItemOrigin,
    pub restored_markups: usize,
}

/// 配置映射为查看器参数；非法颜色回退为默认值。
pub fn viewer_options(config: &AppConfig) -> ViewerOptions {
    let defaults = MarkupStyle::default();
    let color = Rgba::from_hex(&config.markup.color).unwrap_or_else(|| {
        warn!(color = %config.markup.color, "批注颜色格式无效，使用默认颜色");
        defaults.color
    });
    let stroke_width = if config.markup.stroke_width.is_finite() && config.markup.stroke_width > 0.0 {
        config.markup.stroke_width
    } else {
        defaults.stroke_width
    };

    let mut overlay_style = OverlayStyle::default();
    let overlay = &config.overlay;
    let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);
    if let Some(radius) = positive(overlay.cloud_arc_radius) {
        overlay_style.cloud_arc_radius = radius.max(MIN_CLOUD_ARC_RADIUS);
    }
    if let Some(radius) = positive(overlay.marker_radius) {
        overlay_style.marker_radius = radius;
    }
    if let Some(width) = positive(overlay.line_width) {
        overlay_style.line_width = width;
    }
    if let Some(width) = positive(overlay.halo_width) {
        overlay_style.halo_width = width;
    }
    if let Some(size) = positive(overlay.label_font_size) {
        overlay_style.label_font_size = size;
    }
    if let Some(opacity) = overlay.fill_opacity {
        overlay_style.fill_opacity = opacity.clamp(0.0, 1.0);
    }

    ViewerOptions {
        default_zoom: config.viewer.default_zoom,
        zoom_step: config.viewer.zoom_step,
        markup_style: MarkupStyle {
            color,
            stroke_width,
        },
        markups_visible: config.markup.visible,
        default_pixels_per_unit: config.calibration.default_pixels_per_unit,
        unit: config.calibration.unit.clone(),
        overlay_style,
    }
}

fn pick(cli: &Option<PathBuf>, env_key: &str, configured: &Option<PathBuf>) -> Option<PathBuf> {
    cli.clone()
        .or_else(|| env::var_os(env_key).map(PathBuf::from))
        .or_else(|| configured.clone())
}

/// 按优先级加载文档与条目；任一来源失败时回退到内置示例。
pub fn load_session(config: &AppConfig, overrides: &SourceOverrides) -> LoadedSession {
    let options = viewer_options(config);

    let mut document = None;
    if let Some(dir) = pick(&overrides.document_pages, DOCUMENT_PAGES_ENV, &config.sources.document_pages) {
        match ImagePageSource::from_dir(&dir) {
            Ok(source) => {
                info!(path = %dir.display(), pages = source.page_count(), "从页面图像目录加载文档");
                document = Some((Box::new(source) as Box<dyn PageSource>, DocumentSource::Images(dir)));
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "加载页面图像失败，回退到内置示例");
            }
        }
    }
    let (page_source, source) = document.unwrap_or_else(|| {
        (
            Box::new(SyntheticSheetSource::new(DEMO_DOCUMENT_ID, DEMO_PAGE_COUNT)) as Box<dyn PageSource>,
            DocumentSource::Demo,
        )
    });
    let document_id = page_source.document().id;
    let mut session = ViewerSession::new(page_source, options);

    let mut items = ItemOrigin::Demo;
    let mut loaded_items = None;
    if let Some(path) = pick(&overrides.items_file, ITEMS_FILE_ENV, &config.sources.items_file) {
        match JsonItemFile::new(&path).load_items(&document_id) {
            Ok(records) => {
                info!(path = %path.display(), count = records.len(), "读取工程量条目成功");
                loaded_items = Some(records);
                items = ItemOrigin::File(path);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "读取工程量条目失败，使用示例条目");
            }
        }
    }
    session.set_takeoff_items(loaded_items.unwrap_or_else(demo_items));

    let mut restored_markups = 0;
    if let Some(path) = &config.sources.markup_file {
        match JsonMarkupFile::new(path).load(&document_id) {
            Ok(markups) => restored_markups = session.import_markups(markups),
            Err(err) => warn!(path = %path.display(), error = %err, "读取已保存批注失败"),
        }
    }

    LoadedSession {
        session,
        source,
        items,
        restored_markups,
    }
}

/// 内置示例条目：覆盖三种几何与一个无几何条目。
pub fn demo_items() -> Vec<TakeoffItem> {
    fn polyline(points: &[(f64, f64)]) -> Option<ItemGeometry> {
        Some(ItemGeometry::Polyline {
            points: points.iter().map(|(x, y)| Point2::new(*x, *y)).collect(),
        })
    }
    let marker = |x: f64, y: f64| {
        Some(ItemGeometry::PointMarker {
            position: Point2::new(x, y),
        })
    };
    let bbox = |x: f64, y: f64, width: f64, height: f64| {
        Some(ItemGeometry::BoundingBox {
            x,
            y,
            width,
            height,
        })
    };

    vec![
        TakeoffItem::new("w-ext-1", "wall", Some("exterior".into()), 186.0, "LF", 1)
            .with_geometry(polyline(&[(80.0, 80.0), (920.0, 80.0), (920.0, 900.0), (80.0, 900.0), (80.0, 80.0)])),
        TakeoffItem::new("w-int-1", "wall", Some("interior".into()), 42.0, "LF", 1)
            .with_geometry(polyline(&[(480.0, 80.0), (480.0, 560.0)])),
        TakeoffItem::new("d-1", "door", None, 1.0, "EA", 1).with_geometry(marker(480.0, 620.0)),
        TakeoffItem::new("d-2", "door", None, 1.0, "EA", 1).with_geometry(marker(700.0, 900.0)),
        TakeoffItem::new("win-1", "window", None, 2.0, "EA", 1).with_geometry(marker(920.0, 300.0)),
        TakeoffItem::new("r-101", "room", Some("office".into()), 220.0, "SF", 1)
            .with_geometry(bbox(90.0, 90.0, 380.0, 460.0)),
        TakeoffItem::new("c-1", "ceiling", Some("acoustic".into()), 640.0, "SF", 1).with_geometry(None),
        TakeoffItem::new("w-ext-2", "wall", Some("exterior".into()), 120.0, "LF", 2)
            .with_geometry(polyline(&[(100.0, 100.0), (900.0, 100.0), (900.0, 700.0)])),
        TakeoffItem::new("d-3", "door", None, 1.0, "EA", 2).with_geometry(marker(500.0, 500.0)),
    ]
}
