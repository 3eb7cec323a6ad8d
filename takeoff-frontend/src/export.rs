//! 扁平化导出：底图与覆盖层合成一张 PNG，可包装为自动打印的 HTML 页面。

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbaImage};
use tiny_skia::{IntSize, Pixmap, PixmapPaint, Transform};
use tracing::info;

use crate::errors::{FrontendError, RenderError};
use crate::page_renderer::RasterSurface;

fn to_pixmap(image: &RgbaImage) -> Result<Pixmap, RenderError> {
    let (width, height) = image.dimensions();
    let allocation = RenderError::SurfaceAllocation { width, height };
    let size = IntSize::from_wh(width, height).ok_or(allocation)?;
    let mut data = image.as_raw().clone();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = pixel[3] as u16;
        for channel in &mut pixel[..3] {
            *channel = (*channel as u16 * alpha / 255) as u8;
        }
    }
    Pixmap::from_vec(data, size).ok_or(RenderError::SurfaceAllocation { width, height })
}

fn to_image(pixmap: &Pixmap) -> RgbaImage {
    let width = pixmap.width();
    let pixels = pixmap.pixels();
    RgbaImage::from_fn(width, pixmap.height(), |x, y| {
        let color = pixels[(y * width + x) as usize].demultiply();
        image::Rgba([color.red(), color.green(), color.blue(), color.alpha()])
    })
}

/// 合成底图与覆盖层，尺寸为渲染空间大小，不含视图平移。
pub fn composite(base: &RasterSurface, overlay: Option<&Pixmap>) -> Result<RgbaImage, RenderError> {
    let mut canvas = to_pixmap(&base.image)?;
    if let Some(overlay) = overlay {
        canvas.draw_pixmap(
            0,
            0,
            overlay.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
    Ok(to_image(&canvas))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, FrontendError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// 内嵌 base64 PNG、加载后自动打印的最小 HTML 文档。
pub fn print_document(png: &[u8], title: &str) -> String {
    let title = escape_html(title);
    let data = STANDARD.encode(png);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>@page {{ margin: 0; }} body {{ margin: 0; }} img {{ width: 100%; }}</style>\n\
         </head>\n<body onload=\"window.print()\">\n\
         <img src=\"data:image/png;base64,{data}\" alt=\"{title}\">\n</body>\n</html>\n"
    )
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> FrontendError {
    let path = path.to_path_buf();
    move |source| FrontendError::Write { path, source }
}

/// 导出产物路径。
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFiles {
    pub png: PathBuf,
    pub html: PathBuf,
}

/// 写出 `<stem>.png` 与 `<stem>.html`。
pub fn write_export(dir: &Path, stem: &str, image: &RgbaImage) -> Result<ExportedFiles, FrontendError> {
    fs::create_dir_all(dir).map_err(write_error(dir))?;

    let png = encode_png(image)?;
    let files = ExportedFiles {
        png: dir.join(format!("{stem}.png")),
        html: dir.join(format!("{stem}.html")),
    };
    fs::write(&files.png, &png).map_err(write_error(&files.png))?;
    fs::write(&files.html, print_document(&png, stem)).map_err(write_error(&files.html))?;
    info!(png = %files.png.display(), html = %files.html.display(), "导出完成");
    Ok(files)
}
