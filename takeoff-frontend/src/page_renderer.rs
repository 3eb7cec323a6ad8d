//! 页面渲染：经 `PageSource` 按缩放解码单页，再施加旋转，得到底图栅格。

use image::RgbaImage;
use image::imageops;
use takeoff_core::coords::RenderSize;
use takeoff_core::page::Rotation;
use takeoff_engine::viewer::RenderRequest;
use takeoff_io::PageSource;
use tracing::{debug, error};

use crate::errors::RenderError;

/// 一页已栅格化的底图；其像素尺寸即渲染空间范围。
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSurface {
    pub page_number: u32,
    pub image: RgbaImage,
}

impl RasterSurface {
    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> RenderSize {
        RenderSize::new(self.width() as f64, self.height() as f64)
    }
}

pub fn rotate(image: RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    }
}

/// 执行一次渲染请求。解码失败原样上报，不重试。
pub fn render_page(
    source: &dyn PageSource,
    request: &RenderRequest,
) -> Result<RasterSurface, RenderError> {
    let decoded = source
        .decode_page(request.page_number, request.zoom)
        .inspect_err(|err| error!(page = request.page_number, error = %err, "页面解码失败"))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(RenderError::EmptyPage {
            page: request.page_number,
        });
    }
    let image = rotate(decoded, request.rotation);
    debug!(
        page = request.page_number,
        zoom = request.zoom,
        rotation = request.rotation.degrees(),
        width = image.width(),
        height = image.height(),
        "页面栅格化完成"
    );
    Ok(RasterSurface {
        page_number: request.page_number,
        image,
    })
}
