//! 工具/交互状态机：把指针事件序列转换为批注绘制、测量、标定或平移。

use std::str::FromStr;

use takeoff_core::geometry::{Point2, Vector2};
use takeoff_core::markup::{MarkupId, MarkupKind};
use tracing::{debug, trace};

use crate::calibration::{CalibrationState, Measurement};
use crate::errors::EngineError;
use crate::state::ViewerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    /// 选择/平移。
    #[default]
    Select,
    Line,
    Rectangle,
    Circle,
    Arrow,
    Cloud,
    Freehand,
    Text,
    Measure,
    /// 预留：命中删除尚未定义，激活后不做任何修改。
    Eraser,
}

impl Tool {
    pub const ALL: [Tool; 10] = [
        Tool::Select,
        Tool::Line,
        Tool::Rectangle,
        Tool::Circle,
        Tool::Arrow,
        Tool::Cloud,
        Tool::Freehand,
        Tool::Text,
        Tool::Measure,
        Tool::Eraser,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Line => "line",
            Tool::Rectangle => "rectangle",
            Tool::Circle => "circle",
            Tool::Arrow => "arrow",
            Tool::Cloud => "cloud",
            Tool::Freehand => "freehand",
            Tool::Text => "text",
            Tool::Measure => "measure",
            Tool::Eraser => "eraser",
        }
    }

    /// 该工具生成的批注类型。
    pub fn markup_kind(self) -> Option<MarkupKind> {
        match self {
            Tool::Line => Some(MarkupKind::Line),
            Tool::Rectangle => Some(MarkupKind::Rectangle),
            Tool::Circle => Some(MarkupKind::Circle),
            Tool::Arrow => Some(MarkupKind::Arrow),
            Tool::Cloud => Some(MarkupKind::Cloud),
            Tool::Freehand => Some(MarkupKind::Freehand),
            Tool::Text => Some(MarkupKind::Text),
            Tool::Select | Tool::Measure | Tool::Eraser => None,
        }
    }
}

impl FromStr for Tool {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase();
        match needle.as_str() {
            "pan" => return Ok(Tool::Select),
            "rect" => return Ok(Tool::Rectangle),
            "pen" | "ink" => return Ok(Tool::Freehand),
            _ => {}
        }
        Tool::ALL
            .into_iter()
            .find(|tool| tool.name() == needle)
            .ok_or_else(|| EngineError::UnknownTool(value.to_string()))
    }
}

/// 指针事件，坐标位于视图空间（已含平移）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point2),
    Move(Point2),
    Up(Point2),
    /// 指针离开画布，按抬起处理。
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ToolPhase {
    #[default]
    Idle,
    Panning {
        anchor: Point2,
        origin: Vector2,
    },
    Drawing {
        kind: MarkupKind,
    },
    Measuring {
        start: Point2,
        current: Option<Point2>,
    },
    Calibrating {
        known_length: f64,
        first: Option<Point2>,
        current: Option<Point2>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToolState {
    tool: Tool,
    phase: ToolPhase,
}

impl ToolState {
    #[inline]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    #[inline]
    pub fn phase(&self) -> ToolPhase {
        self.phase
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, ToolPhase::Idle)
    }
}

/// 宿主回调：文本输入与测量结果输出。
pub trait InteractionHost {
    /// 文本工具按下时同步请求文字；返回 `None` 表示取消。
    fn request_text(&mut self, _anchor: Point2) -> Option<String> {
        None
    }

    fn measurement_completed(&mut self, _measurement: &Measurement) {}

    fn calibration_completed(&mut self, _pixels_per_unit: f64) {}
}

/// 不响应任何回调的宿主。
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl InteractionHost for NullHost {}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    Ignored,
    ViewChanged,
    MarkupUpdated,
    MarkupCommitted(MarkupId),
    MarkupDiscarded,
    MeasurementUpdated,
    MeasurementCompleted(Measurement),
    CalibrationUpdated,
    Calibrated(f64),
    CalibrationRejected(EngineError),
}

impl InteractionOutcome {
    /// 是否需要重绘覆盖层。
    #[inline]
    pub fn needs_redraw(&self) -> bool {
        !matches!(self, InteractionOutcome::Ignored)
    }
}

/// 切换工具：总是回到空闲态并丢弃进行中的批注/测量/标定。
pub fn select_tool(state: &mut ViewerState, tool: Tool) {
    cancel_session(state);
    state.tool.tool = tool;
    debug!(tool = tool.name(), "切换工具");
}

/// 丢弃进行中的会话，不提交任何内容。
pub fn cancel_session(state: &mut ViewerState) {
    if !state.tool.is_idle() || state.markups.current().is_some() {
        trace!(phase = ?state.tool.phase, "丢弃进行中的交互会话");
    }
    state.markups.discard_current();
    state.tool.phase = ToolPhase::Idle;
}

/// 进入标定：调用方已向用户取得已知长度，之后需要两次按下确定参考线段。
pub fn begin_calibration(state: &mut ViewerState, known_length: f64) -> Result<(), EngineError> {
    let known_length = CalibrationState::validate_known_length(known_length)?;
    cancel_session(state);
    state.tool.phase = ToolPhase::Calibrating {
        known_length,
        first: None,
        current: None,
    };
    debug!(known_length, "开始比例标定");
    Ok(())
}

pub fn handle_pointer(
    state: &mut ViewerState,
    event: PointerEvent,
    host: &mut dyn InteractionHost,
) -> InteractionOutcome {
    match event {
        PointerEvent::Down(point) => pointer_down(state, point, host),
        PointerEvent::Move(point) => pointer_move(state, point),
        PointerEvent::Up(_) | PointerEvent::Leave => pointer_up(state),
    }
}

fn pointer_down(
    state: &mut ViewerState,
    view_point: Point2,
    host: &mut dyn InteractionHost,
) -> InteractionOutcome {
    let point = state.view.transform.view_to_render(view_point);
    match state.tool.phase {
        ToolPhase::Idle => {}
        ToolPhase::Measuring { start, .. } => {
            let measurement = state.calibration.measure(start, point, state.view.zoom);
            state.tool.phase = ToolPhase::Idle;
            debug!(
                length = measurement.length,
                unit = %measurement.unit,
                calibrated = measurement.calibrated,
                "测量完成"
            );
            host.measurement_completed(&measurement);
            return InteractionOutcome::MeasurementCompleted(measurement);
        }
        ToolPhase::Calibrating {
            known_length,
            first: None,
            ..
        } => {
            state.tool.phase = ToolPhase::Calibrating {
                known_length,
                first: Some(point),
                current: None,
            };
            return InteractionOutcome::CalibrationUpdated;
        }
        ToolPhase::Calibrating {
            known_length,
            first: Some(first),
            ..
        } => {
            state.tool.phase = ToolPhase::Idle;
            return match state
                .calibration
                .calibrate(first, point, known_length, state.view.zoom)
            {
                Ok(pixels_per_unit) => {
                    host.calibration_completed(pixels_per_unit);
                    InteractionOutcome::Calibrated(pixels_per_unit)
                }
                Err(err) => InteractionOutcome::CalibrationRejected(err),
            };
        }
        // 会话进行中再次按下（通常是丢失了抬起事件）时忽略。
        ToolPhase::Panning { .. } | ToolPhase::Drawing { .. } => {
            return InteractionOutcome::Ignored;
        }
    }

    match state.tool.tool {
        Tool::Select => {
            state.tool.phase = ToolPhase::Panning {
                anchor: view_point,
                origin: state.view.transform.pan(),
            };
            InteractionOutcome::Ignored
        }
        Tool::Text => {
            let Some(text) = host.request_text(point) else {
                return InteractionOutcome::Ignored;
            };
            let mut markup = state.markups.new_markup(MarkupKind::Text);
            markup.points.push(point);
            markup.text = Some(text);
            match state.markups.commit(markup) {
                Some(id) => InteractionOutcome::MarkupCommitted(id),
                None => InteractionOutcome::Ignored,
            }
        }
        Tool::Measure => {
            state.tool.phase = ToolPhase::Measuring {
                start: point,
                current: None,
            };
            InteractionOutcome::MeasurementUpdated
        }
        Tool::Eraser => InteractionOutcome::Ignored,
        tool => match tool.markup_kind() {
            Some(kind) => {
                state.markups.begin(kind, point);
                state.tool.phase = ToolPhase::Drawing { kind };
                InteractionOutcome::MarkupUpdated
            }
            None => InteractionOutcome::Ignored,
        },
    }
}

fn pointer_move(state: &mut ViewerState, view_point: Point2) -> InteractionOutcome {
    let point = state.view.transform.view_to_render(view_point);
    match state.tool.phase {
        ToolPhase::Idle => InteractionOutcome::Ignored,
        ToolPhase::Panning { anchor, origin } => {
            let delta = Vector2::from_points(anchor, view_point);
            state.view.transform.set_pan(origin.add(delta));
            InteractionOutcome::ViewChanged
        }
        ToolPhase::Drawing { kind } => {
            if kind == MarkupKind::Freehand {
                state.markups.append_point(point);
            } else {
                state.markups.set_far_corner(point);
            }
            InteractionOutcome::MarkupUpdated
        }
        ToolPhase::Measuring { start, .. } => {
            state.tool.phase = ToolPhase::Measuring {
                start,
                current: Some(point),
            };
            InteractionOutcome::MeasurementUpdated
        }
        ToolPhase::Calibrating {
            known_length,
            first: Some(first),
            ..
        } => {
            state.tool.phase = ToolPhase::Calibrating {
                known_length,
                first: Some(first),
                current: Some(point),
            };
            InteractionOutcome::CalibrationUpdated
        }
        ToolPhase::Calibrating { first: None, .. } => InteractionOutcome::Ignored,
    }
}

fn pointer_up(state: &mut ViewerState) -> InteractionOutcome {
    match state.tool.phase {
        ToolPhase::Panning { .. } => {
            state.tool.phase = ToolPhase::Idle;
            InteractionOutcome::ViewChanged
        }
        ToolPhase::Drawing { .. } => {
            state.tool.phase = ToolPhase::Idle;
            match state.markups.commit_current() {
                Some(id) => InteractionOutcome::MarkupCommitted(id),
                None => InteractionOutcome::MarkupDiscarded,
            }
        }
        // 测量与标定由两次按下完成，抬起不影响。
        ToolPhase::Idle | ToolPhase::Measuring { .. } | ToolPhase::Calibrating { .. } => {
            InteractionOutcome::Ignored
        }
    }
}
