use std::sync::OnceLock;

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use rusttype::{Font, Scale, point};
use takeoff_core::color::Rgba;
use takeoff_core::geometry::Point2;
use tiny_skia::Pixmap;
use tracing::{debug, warn};

/// 标签字体（系统无衬线字体）。
pub struct LabelFont {
    font: Font<'static>,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}

impl LabelFont {
    pub fn from_bytes(data: Vec<u8>, index: u32) -> Option<Self> {
        Font::try_from_vec_and_index(data, index).map(|font| Self { font })
    }

    /// 进程内首次调用时查询系统字体；找不到时返回 `None`，标签将被跳过。
    pub fn system() -> Option<&'static LabelFont> {
        static FONT: OnceLock<Option<LabelFont>> = OnceLock::new();
        FONT.get_or_init(load_system_font).as_ref()
    }

    /// 文本在给定字号下的像素宽度。
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let scale = Scale::uniform(size);
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .last()
            .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0)
    }

    /// 在 `anchor`（文字框左上角）处以源覆盖方式绘制文本。
    pub fn draw(&self, pixmap: &mut Pixmap, anchor: Point2, text: &str, size: f32, color: Rgba) {
        let scale = Scale::uniform(size);
        let ascent = self.font.v_metrics(scale).ascent;
        let start = point(anchor.x() as f32, anchor.y() as f32 + ascent);
        let pixmap_width = pixmap.width();
        let width = pixmap_width as i32;
        let height = pixmap.height() as i32;
        let data = pixmap.data_mut();

        for glyph in self.font.layout(text, scale, start) {
            let Some(bounds) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bounds.min.x;
                let py = gy as i32 + bounds.min.y;
                if px < 0 || py < 0 || px >= width || py >= height {
                    return;
                }
                let alpha = (coverage * color.a as f32).round().clamp(0.0, 255.0) as u16;
                if alpha == 0 {
                    return;
                }
                let idx = pixel_offset(px, py, pixmap_width);
                blend_premultiplied(&mut data[idx..idx + 4], color, alpha);
            });
        }
    }
}

/// RGBA 缓冲区中像素的字节偏移；坐标须已裁剪为非负。
#[inline]
fn pixel_offset(x: i32, y: i32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

/// 预乘 RGBA 像素上的源覆盖混合。
fn blend_premultiplied(pixel: &mut [u8], color: Rgba, alpha: u16) {
    let inverse = 255 - alpha;
    let source = [
        color.r as u16 * alpha / 255,
        color.g as u16 * alpha / 255,
        color.b as u16 * alpha / 255,
        alpha,
    ];
    for (channel, src) in pixel.iter_mut().zip(source) {
        *channel = (src + *channel as u16 * inverse / 255).min(255) as u8;
    }
}

fn load_system_font() -> Option<LabelFont> {
    let mut db = Database::new();
    db.load_system_fonts();
    let query = Query {
        families: &[Family::SansSerif, Family::Serif, Family::Monospace],
        weight: Weight::NORMAL,
        stretch: Stretch::Normal,
        style: Style::Normal,
    };
    let Some(id) = db.query(&query) else {
        warn!(faces = db.len(), "未找到可用的系统字体，覆盖层标签将不绘制");
        return None;
    };
    let font = db
        .with_face_data(id, |data, index| LabelFont::from_bytes(data.to_vec(), index))
        .flatten();
    if font.is_some() {
        debug!("已加载覆盖层标签字体");
    } else {
        warn!("系统字体无法解析，覆盖层标签将不绘制");
    }
    font
}
