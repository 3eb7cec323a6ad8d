use std::path::PathBuf;

use takeoff_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("页面解码失败: {0}")]
    Decode(#[from] IoError),
    #[error("无法分配 {width}x{height} 的绘制表面")]
    SurfaceAllocation { width: u32, height: u32 },
    #[error("第 {page} 页解码结果为空")]
    EmptyPage { page: u32 },
}

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("图像编码失败: {0}")]
    Encode(#[from] image::ImageError),
    #[error("写入导出文件 {path:?} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("当前页面尚未渲染完成")]
    PageNotReady,
}
