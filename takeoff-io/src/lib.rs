use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use takeoff_core::geometry::Point2;
use takeoff_core::markup::Markup;
use takeoff_core::page::{DocumentInfo, clamp_zoom};
use takeoff_core::takeoff::{ItemGeometry, TakeoffItem};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode page image {path:?}: {source}")]
    DecodeError {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("page {page} is out of range 1..={page_count}")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

/// 分页图纸来源：提供页数与按缩放倍数解码单页。
pub trait PageSource {
    fn document(&self) -> DocumentInfo;

    fn page_count(&self) -> u32 {
        self.document().page_count
    }

    /// 解码第 `page_number` 页（从 1 开始），返回 `scale` 倍率下的 RGBA 栅格。
    fn decode_page(&self, page_number: u32, scale: f64) -> Result<RgbaImage, IoError>;
}

fn check_page(page: u32, page_count: u32) -> Result<(), IoError> {
    if (1..=page_count).contains(&page) {
        Ok(())
    } else {
        Err(IoError::PageOutOfRange { page, page_count })
    }
}

fn scaled_extent(extent: u32, scale: f64) -> u32 {
    ((extent as f64) * clamp_zoom(scale)).round().max(1.0) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NameChunk {
    Number(u128),
    Text(String),
}

fn natural_key(path: &Path) -> Vec<NameChunk> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mut chunks = Vec::new();
    let mut digits = String::new();
    let mut text = String::new();
    for ch in name.chars() {
        if ch.is_ascii_digit() {
            if !text.is_empty() {
                chunks.push(NameChunk::Text(std::mem::take(&mut text)));
            }
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                chunks.push(NameChunk::Number(digits.parse().unwrap_or(u128::MAX)));
                digits.clear();
            }
            text.push(ch);
        }
    }
    if !digits.is_empty() {
        chunks.push(NameChunk::Number(digits.parse().unwrap_or(u128::MAX)));
    }
    if !text.is_empty() {
        chunks.push(NameChunk::Text(text));
    }
    chunks
}

/// 每页一个栅格文件（PNG/JPEG）。
#[derive(Debug, Clone)]
pub struct ImagePageSource {
    id: String,
    pages: Vec<PathBuf>,
}

impl ImagePageSource {
    pub fn new(id: impl Into<String>, pages: Vec<PathBuf>) -> Self {
        Self {
            id: id.into(),
            pages,
        }
    }

    /// 收集目录内的 png/jpg 文件作为页面，按文件名中的数字自然排序
    /// （`page-2` 排在 `page-10` 之前）。
    pub fn from_dir(dir: &Path) -> Result<Self, IoError> {
        let entries = fs::read_dir(dir).map_err(|source| IoError::ReadError {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut pages: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg")
                    })
            })
            .collect();
        if pages.is_empty() {
            return Err(IoError::InvalidDocument(format!(
                "目录 {dir:?} 中没有可用的页面图像"
            )));
        }
        pages.sort_by_cached_key(|path| (natural_key(path), path.clone()));
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        debug!(id = %id, pages = pages.len(), "收集页面图像");
        Ok(Self::new(id, pages))
    }
}

impl PageSource for ImagePageSource {
    fn document(&self) -> DocumentInfo {
        DocumentInfo::new(self.id.clone(), self.pages.len() as u32)
    }

    fn decode_page(&self, page_number: u32, scale: f64) -> Result<RgbaImage, IoError> {
        check_page(page_number, self.pages.len() as u32)?;
        let path = &self.pages[(page_number - 1) as usize];
        let image = image::open(path)
            .map_err(|source| IoError::DecodeError {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let target = (scaled_extent(width, scale), scaled_extent(height, scale));
        if target == (width, height) {
            return Ok(image);
        }
        Ok(imageops::resize(&image, target.0, target.1, FilterType::Triangle))
    }
}

/// 生成空白图纸（边框、网格与标题栏），用于演示与测试。
#[derive(Debug, Clone)]
pub struct SyntheticSheetSource {
    id: String,
    page_count: u32,
    width: u32,
    height: u32,
}

impl SyntheticSheetSource {
    pub const DEFAULT_WIDTH: u32 = 1100;
    pub const DEFAULT_HEIGHT: u32 = 850;
    const GRID: u32 = 50;
    const MARGIN: u32 = 20;

    pub fn new(id: impl Into<String>, page_count: u32) -> Self {
        Self::with_size(id, page_count, Self::DEFAULT_WIDTH, Self::DEFAULT_HEIGHT)
    }

    pub fn with_size(id: impl Into<String>, page_count: u32, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            page_count,
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl PageSource for SyntheticSheetSource {
    fn document(&self) -> DocumentInfo {
        DocumentInfo::new(self.id.clone(), self.page_count)
    }

    fn decode_page(&self, page_number: u32, scale: f64) -> Result<RgbaImage, IoError> {
        check_page(page_number, self.page_count)?;
        let width = scaled_extent(self.width, scale);
        let height = scaled_extent(self.height, scale);
        let scale = clamp_zoom(scale);
        let to_page = |value: u32| (value as f64 / scale) as u32;

        let paper = image::Rgba([255, 255, 255, 255]);
        let grid = image::Rgba([226, 232, 240, 255]);
        let ink = image::Rgba([30, 41, 59, 255]);
        let margin = Self::MARGIN;
        let title_block = (self.width.saturating_sub(260), self.height.saturating_sub(90));

        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let (px, py) = (to_page(x), to_page(y));
            let inside = px >= margin
                && py >= margin
                && px < self.width.saturating_sub(margin)
                && py < self.height.saturating_sub(margin);
            let on_border = inside
                && (px < margin + 2
                    || py < margin + 2
                    || px + margin + 2 >= self.width
                    || py + margin + 2 >= self.height);
            let on_title = inside
                && px >= title_block.0
                && py >= title_block.1
                && (px == title_block.0 || py == title_block.1 || py == title_block.1 + 30);
            if on_border || on_title {
                ink
            } else if inside && (px % Self::GRID == 0 || py % Self::GRID == 0) {
                grid
            } else {
                paper
            }
        }))
    }
}

// ---- 几何载荷解析 ----

const POINT_KEYS: [&str; 3] = ["point", "position", "center"];
const BOX_KEYS: [&str; 3] = ["bbox", "bounding_box", "boundingBox"];

fn loose_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| value.get(*name))
        .find(|value| !value.is_null())
}

fn parse_point(value: &Value) -> Option<Point2> {
    match value {
        Value::Array(pair) if pair.len() >= 2 => {
            Some(Point2::new(loose_number(&pair[0])?, loose_number(&pair[1])?))
        }
        Value::Object(_) => Some(Point2::new(
            loose_number(field(value, &["x"])?)?,
            loose_number(field(value, &["y"])?)?,
        )),
        _ => None,
    }
}

fn parse_points(values: &[Value]) -> Option<ItemGeometry> {
    let points = values.iter().map(parse_point).collect::<Option<Vec<_>>>()?;
    (points.len() >= 2).then_some(ItemGeometry::Polyline { points })
}

fn parse_box(value: &Value) -> Option<ItemGeometry> {
    let width = loose_number(field(value, &["width", "w"])?)?;
    let height = loose_number(field(value, &["height", "h"])?)?;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some(ItemGeometry::BoundingBox {
        x: loose_number(field(value, &["x"])?)?,
        y: loose_number(field(value, &["y"])?)?,
        width,
        height,
    })
}

fn parse_geometry_value(value: &Value, allow_text: bool) -> Option<ItemGeometry> {
    match value {
        Value::Null => None,
        Value::String(text) if allow_text => {
            let nested: Value = serde_json::from_str(text).ok()?;
            parse_geometry_value(&nested, false)
        }
        Value::Array(values) => parse_points(values),
        Value::Object(_) => {
            if let Some(Value::Array(points)) = field(value, &["points", "vertices"]) {
                return parse_points(points);
            }
            if let (Some(start), Some(end)) = (field(value, &["start"]), field(value, &["end"])) {
                return Some(ItemGeometry::Polyline {
                    points: vec![parse_point(start)?, parse_point(end)?],
                });
            }
            if let Some(nested) = field(value, &BOX_KEYS) {
                return parse_box(nested);
            }
            if field(value, &["width", "w"]).is_some() {
                return parse_box(value);
            }
            if let Some(nested) = field(value, &POINT_KEYS) {
                return parse_point(nested).map(|position| ItemGeometry::PointMarker { position });
            }
            parse_point(value).map(|position| ItemGeometry::PointMarker { position })
        }
        _ => None,
    }
}

/// 宽松解析提取端给出的几何载荷；无法识别时返回 `None`。
///
/// 接受：点列（对象或 `[x, y]`）、`start`/`end` 线段、包围盒（平铺或嵌套于
/// `bbox`/`bounding_box`）、单点（平铺或嵌套于 `point`/`position`/`center`），
/// 以及包含上述任一结构的 JSON 字符串。
pub fn parse_item_geometry(value: &Value) -> Option<ItemGeometry> {
    parse_geometry_value(value, true)
}

// ---- 工程量条目 ----

fn loose_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// 提取端输出的一条原始记录。逐字段宽松读取：字段名同时接受 snake_case 与
/// camelCase，数字可以是字符串，类型不符的可选字段按缺失处理。
#[derive(Debug, Clone, PartialEq)]
pub struct TakeoffRecord {
    id: String,
    document_id: Option<String>,
    item_type: String,
    sub_type: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    page_number: Option<f64>,
    geometry: Value,
}

impl TakeoffRecord {
    /// 从单条 JSON 记录读取；缺少编号或类型时返回 `None`。
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let text = |names: &[&str]| field(value, names).and_then(loose_text);
        let number = |names: &[&str]| field(value, names).and_then(loose_number);
        Some(Self {
            id: text(&["id"])?,
            document_id: text(&["document_id", "documentId", "drawing_id", "drawingId"]),
            item_type: text(&["item_type", "itemType", "type"])?,
            sub_type: text(&["sub_type", "subType"]),
            quantity: number(&["quantity"]),
            unit: text(&["unit"]),
            page_number: number(&["page_number", "pageNumber", "page"]),
            geometry: field(value, &["dimensions", "geometry"])
                .cloned()
                .unwrap_or(Value::Null),
        })
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    /// 转换为条目；几何无法解析时保留条目但不带几何。
    pub fn into_item(self) -> TakeoffItem {
        let geometry = parse_item_geometry(&self.geometry);
        if geometry.is_none() && !self.geometry.is_null() {
            warn!(id = %self.id, item_type = %self.item_type, "几何载荷无法解析，条目不参与绘制");
        }
        let page_number = self
            .page_number
            .filter(|page| *page >= 1.0 && *page <= u32::MAX as f64)
            .map_or(1, |page| page as u32);
        TakeoffItem::new(
            self.id,
            self.item_type,
            self.sub_type,
            self.quantity.unwrap_or(0.0),
            self.unit.unwrap_or_default(),
            page_number,
        )
        .with_geometry(geometry)
    }
}

/// 工程量条目来源。
pub trait TakeoffItemSource {
    fn load_items(&self, document_id: &str) -> Result<Vec<TakeoffItem>, IoError>;
}

/// 从 JSON 文件读取条目：顶层为数组或 `{ "items": [...] }`。
/// 带文档编号的记录只在编号匹配时返回。
#[derive(Debug, Clone)]
pub struct JsonItemFile {
    path: PathBuf,
}

impl JsonItemFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TakeoffItemSource for JsonItemFile {
    fn load_items(&self, document_id: &str) -> Result<Vec<TakeoffItem>, IoError> {
        let data = fs::read_to_string(&self.path).map_err(|source| IoError::ReadError {
            path: self.path.clone(),
            source,
        })?;
        let body: Value = serde_json::from_str(&data).map_err(|source| IoError::ParseError {
            path: self.path.clone(),
            source,
        })?;
        let records = match &body {
            Value::Array(records) => records,
            Value::Object(_) => match body.get("items") {
                Some(Value::Array(records)) => records,
                _ => {
                    return Err(IoError::InvalidDocument(format!(
                        "{} 缺少 items 数组",
                        self.path.display()
                    )));
                }
            },
            _ => {
                return Err(IoError::InvalidDocument(format!(
                    "{} 顶层必须是数组或对象",
                    self.path.display()
                )));
            }
        };
        let mut items = Vec::with_capacity(records.len());
        for (index, raw) in records.iter().enumerate() {
            let Some(record) = TakeoffRecord::from_value(raw) else {
                warn!(path = ?self.path, index, "记录缺少编号或类型，已跳过");
                continue;
            };
            if record
                .document_id()
                .is_none_or(|record_document| record_document == document_id)
            {
                items.push(record.into_item());
            }
        }
        debug!(path = ?self.path, document_id, count = items.len(), "读取工程量条目");
        Ok(items)
    }
}

// ---- 批注持久化 ----

pub trait MarkupSaver {
    fn save(&self, document_id: &str, markups: &[Markup]) -> Result<(), IoError>;
}

pub trait MarkupLoader {
    fn load(&self, document_id: &str) -> Result<Vec<Markup>, IoError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct MarkupFileBody {
    document_id: String,
    markups: Vec<Markup>,
}

/// 批注保存为 JSON 文件，可读回。
#[derive(Debug, Clone)]
pub struct JsonMarkupFile {
    path: PathBuf,
}

impl JsonMarkupFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkupSaver for JsonMarkupFile {
    fn save(&self, document_id: &str, markups: &[Markup]) -> Result<(), IoError> {
        let body = MarkupFileBody {
            document_id: document_id.to_string(),
            markups: markups.to_vec(),
        };
        let data = serde_json::to_string_pretty(&body).map_err(|source| IoError::ParseError {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| IoError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, data).map_err(|source| IoError::WriteError {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = ?self.path, count = markups.len(), "批注已保存");
        Ok(())
    }
}

impl MarkupLoader for JsonMarkupFile {
    /// 文件不存在时视为没有批注；文档编号不符时报错。
    fn load(&self, document_id: &str) -> Result<Vec<Markup>, IoError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(IoError::ReadError {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let body: MarkupFileBody =
            serde_json::from_str(&data).map_err(|source| IoError::ParseError {
                path: self.path.clone(),
                source,
            })?;
        if body.document_id != document_id {
            return Err(IoError::InvalidDocument(format!(
                "批注文件属于文档 {}，而非 {document_id}",
                body.document_id
            )));
        }
        Ok(body.markups)
    }
}
