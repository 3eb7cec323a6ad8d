use std::collections::HashMap;

use takeoff_core::color::Rgba;
use takeoff_core::takeoff::GroupKey;

use crate::state::MarkupStyle;
use crate::tools::Tool;
use crate::viewer::Viewer;

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// 解析一行命令文本，按空白分隔；空行返回 `None`。
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        Some(Self::new(name, parts))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub viewer: &'a mut Viewer,
}

type CommandFn = fn(&[String], &mut Viewer) -> CommandResponse;

/// 以函数实现的简单命令。
struct ViewerCommand {
    name: &'static str,
    run: CommandFn,
}

impl CommandHandler for ViewerCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        (self.run)(&request.args, context.viewer)
    }
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        let builtin: [(&'static str, CommandFn); 19] = [
            ("undo_markup", undo_markup),
            ("clear_markups", clear_markups),
            ("toggle_markups", toggle_markups),
            ("next_page", next_page),
            ("previous_page", previous_page),
            ("goto_page", goto_page),
            ("zoom_in", zoom_in),
            ("zoom_out", zoom_out),
            ("set_zoom", set_zoom),
            ("rotate_cw", rotate_cw),
            ("rotate_ccw", rotate_ccw),
            ("reset_view", reset_view),
            ("set_color", set_color),
            ("set_stroke_width", set_stroke_width),
            ("show_all_groups", show_all_groups),
            ("hide_all_groups", hide_all_groups),
            ("calibrate", calibrate),
            ("reset_calibration", reset_calibration),
            ("set_unit", set_unit),
        ];
        for (name, run) in builtin {
            bus.register(ViewerCommand { name, run });
        }
        bus.register(SelectToolCommand);
        bus.register(ToggleGroupCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

fn required_arg<'a>(args: &'a [String], name: &str) -> Result<&'a str, CommandResponse> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| CommandResponse::err(format!("缺少参数: {name}")))
}

fn number_arg(args: &[String], name: &str) -> Result<f64, CommandResponse> {
    let raw = required_arg(args, name)?;
    raw.parse::<f64>()
        .map_err(|_| CommandResponse::err(format!("参数 {name} 不是数字: {raw}")))
}

fn undo_markup(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    match viewer.undo_markup() {
        Some(markup) => CommandResponse::ok(format!("已撤销批注 #{}", markup.id.get())),
        None => CommandResponse::ok("没有可撤销的批注"),
    }
}

fn clear_markups(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let count = viewer.clear_markups();
    CommandResponse::ok(format!("已清除 {count} 条批注"))
}

fn toggle_markups(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    if viewer.toggle_markups_visible() {
        CommandResponse::ok("批注已显示")
    } else {
        CommandResponse::ok("批注已隐藏")
    }
}

fn page_response(result: Result<u32, crate::errors::EngineError>) -> CommandResponse {
    match result {
        Ok(page) => CommandResponse::ok(format!("当前页: {page}")),
        Err(err) => CommandResponse::err(err.to_string()),
    }
}

fn next_page(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    page_response(viewer.next_page())
}

fn previous_page(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    page_response(viewer.previous_page())
}

fn goto_page(args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let raw = match required_arg(args, "page") {
        Ok(raw) => raw,
        Err(response) => return response,
    };
    match raw.parse::<u32>() {
        Ok(page) => page_response(viewer.go_to_page(page)),
        Err(_) => CommandResponse::err(format!("页码无效: {raw}")),
    }
}

fn zoom_response(zoom: f64) -> CommandResponse {
    CommandResponse::ok(format!("缩放: {:.0}%", zoom * 100.0))
}

fn zoom_in(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    zoom_response(viewer.zoom_in())
}

fn zoom_out(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    zoom_response(viewer.zoom_out())
}

fn set_zoom(args: &[String], viewer: &mut Viewer) -> CommandResponse {
    match number_arg(args, "zoom") {
        Ok(zoom) => zoom_response(viewer.set_zoom(zoom)),
        Err(response) => response,
    }
}

fn rotate_cw(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let rotation = viewer.rotate_cw();
    CommandResponse::ok(format!("旋转: {}°", rotation.degrees()))
}

fn rotate_ccw(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let rotation = viewer.rotate_ccw();
    CommandResponse::ok(format!("旋转: {}°", rotation.degrees()))
}

fn reset_view(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    viewer.reset_view();
    CommandResponse::ok("视图已重置")
}

fn set_color(args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let raw = match required_arg(args, "color") {
        Ok(raw) => raw,
        Err(response) => return response,
    };
    let Some(color) = Rgba::from_hex(raw) else {
        return CommandResponse::err(format!("颜色格式无效: {raw}"));
    };
    let style = viewer.state().markups.style;
    viewer.set_markup_style(MarkupStyle { color, ..style });
    CommandResponse::ok(format!("批注颜色: {}", color.to_hex()))
}

fn set_stroke_width(args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let width = match number_arg(args, "width") {
        Ok(width) => width,
        Err(response) => return response,
    };
    if !width.is_finite() || width <= 0.0 {
        return CommandResponse::err(format!("线宽必须为正数: {width}"));
    }
    let style = viewer.state().markups.style;
    viewer.set_markup_style(MarkupStyle {
        stroke_width: width,
        ..style
    });
    CommandResponse::ok(format!("批注线宽: {width}"))
}

fn show_all_groups(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    viewer.show_all_groups();
    CommandResponse::ok("已显示全部分组")
}

fn hide_all_groups(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    viewer.hide_all_groups();
    CommandResponse::ok("已隐藏全部分组")
}

fn calibrate(args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let length = match number_arg(args, "length") {
        Ok(length) => length,
        Err(response) => return response,
    };
    match viewer.begin_calibration(length) {
        Ok(()) => CommandResponse::ok("请在图上依次点击参考线段的两个端点"),
        Err(err) => CommandResponse::err(err.to_string()),
    }
}

fn reset_calibration(_args: &[String], viewer: &mut Viewer) -> CommandResponse {
    viewer.reset_calibration();
    CommandResponse::ok("比例已恢复默认，测量结果为估算值")
}

fn set_unit(args: &[String], viewer: &mut Viewer) -> CommandResponse {
    let unit = match required_arg(args, "unit") {
        Ok(unit) => unit,
        Err(response) => return response,
    };
    viewer.set_measurement_unit(unit);
    CommandResponse::ok(format!("测量单位: {unit}"))
}

struct SelectToolCommand;

impl CommandHandler for SelectToolCommand {
    fn name(&self) -> &'static str {
        "select_tool"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let raw = match required_arg(&request.args, "tool") {
            Ok(raw) => raw,
            Err(response) => return response,
        };
        match raw.parse::<Tool>() {
            Ok(tool) => {
                context.viewer.select_tool(tool);
                CommandResponse::ok(format!("当前工具: {}", tool.name()))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ToggleGroupCommand;

impl CommandHandler for ToggleGroupCommand {
    fn name(&self) -> &'static str {
        "toggle_group"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let item_type = match required_arg(&request.args, "type") {
            Ok(raw) => raw,
            Err(response) => return response,
        };
        let key = GroupKey::new(item_type, request.args.get(1).cloned());
        match context.viewer.toggle_group(&key) {
            Ok(true) => CommandResponse::ok(format!("分组 {key} 已显示")),
            Ok(false) => CommandResponse::ok(format!("分组 {key} 已隐藏")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}
