pub mod cli;
pub mod errors;
pub mod export;
pub mod loader;
pub mod overlay_raster;
pub mod page_renderer;
pub mod session;
pub mod text;

use errors::FrontendError;
use takeoff_config::AppConfig;
use tracing::info;

pub use cli::CliOptions;

/// 启动 CLI 演示或返回错误。
pub fn run_cli_demo(config: &AppConfig, options: &CliOptions) -> Result<(), FrontendError> {
    info!("启动 CLI 演示前端");
    cli::run_demo(config, options)
}
