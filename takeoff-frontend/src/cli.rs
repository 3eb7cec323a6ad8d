use std::path::PathBuf;

use takeoff_config::AppConfig;
use takeoff_core::geometry::Point2;
use takeoff_engine::calibration::Measurement;
use takeoff_engine::tools::{InteractionHost, PointerEvent};
use takeoff_io::JsonMarkupFile;
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::export::write_export;
use crate::loader::{DocumentSource, ItemOrigin, SourceOverrides, load_session};
use crate::session::ViewerSession;

/// CLI 运行参数。
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub overrides: SourceOverrides,
    /// 依次执行的命令行；为空时运行内置交互演示。
    pub commands: Vec<String>,
    /// 导出目录，优先于配置中的 `sources.export_dir`。
    pub export_dir: Option<PathBuf>,
}

/// 把测量结果打印到终端，文本工具统一返回固定文字。
struct CliHost;

impl InteractionHost for CliHost {
    fn request_text(&mut self, _anchor: Point2) -> Option<String> {
        Some("核对".to_string())
    }

    fn measurement_completed(&mut self, measurement: &Measurement) {
        println!("[测量] {}", measurement.label());
    }

    fn calibration_completed(&mut self, pixels_per_unit: f64) {
        println!("[标定] {pixels_per_unit:.3} 像素/单位");
    }
}

fn click(session: &mut ViewerSession, host: &mut CliHost, x: f64, y: f64) {
    session.pointer(PointerEvent::Down(Point2::new(x, y)), host);
    session.pointer(PointerEvent::Up(Point2::new(x, y)), host);
}

fn drag(session: &mut ViewerSession, host: &mut CliHost, from: (f64, f64), to: (f64, f64)) {
    session.pointer(PointerEvent::Down(Point2::new(from.0, from.1)), host);
    session.pointer(PointerEvent::Move(Point2::new(to.0, to.1)), host);
    session.pointer(PointerEvent::Up(Point2::new(to.0, to.1)), host);
}

fn run_command(session: &mut ViewerSession, line: &str) {
    let response = session.run_command(line);
    let message = response.message.unwrap_or_default();
    if response.success {
        println!("[命令] {line}: {message}");
    } else {
        println!("[命令失败] {line}: {message}");
    }
}

/// 内置演示：画框、云线、文字，标定后测量一段距离。
fn run_scripted_interactions(session: &mut ViewerSession) {
    let mut host = CliHost;
    run_command(session, "select_tool rectangle");
    drag(session, &mut host, (100.0, 100.0), (300.0, 200.0));
    run_command(session, "set_color #0ea5e9");
    run_command(session, "select_tool cloud");
    drag(session, &mut host, (520.0, 420.0), (700.0, 560.0));
    run_command(session, "select_tool text");
    click(session, &mut host, 520.0, 400.0);

    run_command(session, "calibrate 10");
    click(session, &mut host, 100.0, 700.0);
    click(session, &mut host, 300.0, 700.0);
    run_command(session, "select_tool measure");
    click(session, &mut host, 100.0, 740.0);
    click(session, &mut host, 200.0, 740.0);
    run_command(session, "select_tool select");
}

fn print_overview(session: &ViewerSession, source: &DocumentSource, items: &ItemOrigin) {
    let viewer = session.viewer();
    match source {
        DocumentSource::Images(path) => println!("已从页面图像加载文档：{}", path.display()),
        DocumentSource::Demo => println!("使用内置示例图纸"),
    }
    match items {
        ItemOrigin::File(path) => println!("工程量条目来自：{}", path.display()),
        ItemOrigin::Demo => println!("使用内置示例条目"),
    }
    if let Some(document) = viewer.document() {
        println!(
            "文档 {}，第 {}/{} 页，缩放 {:.0}%，旋转 {}°",
            document.id,
            viewer.page_number(),
            document.page_count,
            viewer.zoom() * 100.0,
            viewer.rotation().degrees()
        );
    }
    if let Some(surface) = session.surface() {
        println!("页面栅格：{}x{}", surface.width(), surface.height());
    }

    println!("图例：");
    for group in viewer.legend() {
        let state = if !group.can_toggle() {
            "无法显示"
        } else if group.visible {
            "显示"
        } else {
            "隐藏"
        };
        println!(
            "  - {} [{}] {:.2} {} ({} 项, {})",
            group.key,
            group.color.to_hex(),
            group.total_quantity,
            group.unit,
            group.items.len(),
            state
        );
    }
    let summary = viewer.page_summary();
    println!(
        "本页条目 {} 项，其中可绘制 {} 项，无几何 {} 项",
        summary.item_count, summary.drawable_count, summary.undrawable_count
    );
}

/// CLI 演示：加载文档与条目，执行命令或内置交互，导出合成图并保存批注。
pub fn run_demo(config: &AppConfig, options: &CliOptions) -> Result<(), FrontendError> {
    let loaded = load_session(config, &options.overrides);
    let mut session = loaded.session;
    session.pump()?;

    println!("工程量覆盖层 CLI 演示");
    print_overview(&session, &loaded.source, &loaded.items);
    if loaded.restored_markups > 0 {
        println!("已恢复 {} 条批注", loaded.restored_markups);
    }
    println!("支持的命令: {}", session.available_commands().join(", "));

    if options.commands.is_empty() {
        run_scripted_interactions(&mut session);
    } else {
        for line in &options.commands {
            run_command(&mut session, line);
        }
    }
    session.pump()?;

    let viewer = session.viewer();
    println!("已提交批注 {} 条：", viewer.markups().len());
    for markup in viewer.markups() {
        println!(
            "  - #{} {} {} 点, 颜色 {}",
            markup.id.get(),
            markup.kind.name(),
            markup.points.len(),
            markup.color.to_hex()
        );
    }
    info!(
        markups = viewer.markups().len(),
        calibrated = viewer.calibration().is_calibrated(),
        "CLI 演示交互完成"
    );

    let document_id = viewer
        .document()
        .map(|document| document.id.clone())
        .unwrap_or_default();
    let page = viewer.page_number();

    if let Some(dir) = options.export_dir.clone().or_else(|| config.sources.export_dir.clone()) {
        let image = session.composite()?;
        let files = write_export(&dir, &format!("{document_id}-p{page}"), &image)?;
        println!("已导出：{} / {}", files.png.display(), files.html.display());
    }

    if let Some(path) = &config.sources.markup_file {
        match session.save_markups(&JsonMarkupFile::new(path)) {
            Ok(count) => println!("已保存 {count} 条批注到 {}", path.display()),
            Err(err) => warn!(path = %path.display(), error = %err, "保存批注失败"),
        }
    }
    Ok(())
}
