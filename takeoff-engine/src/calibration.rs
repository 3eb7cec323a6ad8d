use takeoff_core::geometry::Point2;
use takeoff_core::page::clamp_zoom;
use tracing::{debug, warn};

use crate::errors::EngineError;

pub const DEFAULT_PIXELS_PER_UNIT: f64 = 1.0;
pub const DEFAULT_UNIT: &str = "ft";

/// 比例标定状态。
///
/// `pixels_per_unit` 按缩放 1 归一化保存：标定时除以当时的缩放倍数，
/// 测量时再除以当前缩放倍数，因此在任意缩放级别标定后换到其他缩放级别测量，
/// 结果保持一致。
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationState {
    pixels_per_unit: f64,
    default_pixels_per_unit: f64,
    unit: String,
    calibrated: bool,
}

impl CalibrationState {
    pub fn new(default_pixels_per_unit: f64, unit: impl Into<String>) -> Self {
        let default_pixels_per_unit =
            if default_pixels_per_unit.is_finite() && default_pixels_per_unit > 0.0 {
                default_pixels_per_unit
            } else {
                DEFAULT_PIXELS_PER_UNIT
            };
        Self {
            pixels_per_unit: default_pixels_per_unit,
            default_pixels_per_unit,
            unit: unit.into(),
            calibrated: false,
        }
    }

    #[inline]
    pub fn pixels_per_unit(&self) -> f64 {
        self.pixels_per_unit
    }

    #[inline]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// 更换显示单位，比例不变。
    pub fn set_unit(&mut self, unit: impl Into<String>) {
        self.unit = unit.into();
    }

    /// 是否已由用户标定；未标定时使用默认比例，结果仅为估算。
    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// 已知长度必须为正的有限值。
    pub fn validate_known_length(known_length: f64) -> Result<f64, EngineError> {
        if known_length.is_finite() && known_length > 0.0 {
            Ok(known_length)
        } else {
            Err(EngineError::InvalidCalibrationLength(known_length))
        }
    }

    /// 用参考线段与已知长度标定比例，返回新的（缩放归一化的）像素/单位。
    /// 失败时保留原比例。
    pub fn calibrate(
        &mut self,
        start: Point2,
        end: Point2,
        known_length: f64,
        zoom: f64,
    ) -> Result<f64, EngineError> {
        let known_length = Self::validate_known_length(known_length)?;
        let pixel_distance = start.distance(end);
        if !pixel_distance.is_finite() || pixel_distance <= f64::EPSILON {
            warn!("标定参考线段长度为零，保留原比例");
            return Err(EngineError::DegenerateCalibrationSegment);
        }
        let zoom = clamp_zoom(zoom);
        self.pixels_per_unit = pixel_distance / zoom / known_length;
        self.calibrated = true;
        debug!(
            pixel_distance,
            known_length,
            zoom,
            pixels_per_unit = self.pixels_per_unit,
            "比例标定完成"
        );
        Ok(self.pixels_per_unit)
    }

    /// 渲染空间像素距离换算为实际长度。
    fn to_real_length(&self, pixel_distance: f64, zoom: f64) -> f64 {
        pixel_distance / clamp_zoom(zoom) / self.pixels_per_unit
    }

    pub fn measure(&self, start: Point2, end: Point2, zoom: f64) -> Measurement {
        let pixel_length = start.distance(end);
        Measurement {
            start,
            end,
            pixel_length,
            length: self.to_real_length(pixel_length, zoom),
            unit: self.unit.clone(),
            calibrated: self.calibrated,
        }
    }

    /// 恢复到默认假定比例。
    pub fn reset(&mut self) {
        self.pixels_per_unit = self.default_pixels_per_unit;
        self.calibrated = false;
    }
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self::new(DEFAULT_PIXELS_PER_UNIT, DEFAULT_UNIT)
    }
}

/// 一次测量结果，点位于渲染空间。
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub start: Point2,
    pub end: Point2,
    pub pixel_length: f64,
    pub length: f64,
    pub unit: String,
    pub calibrated: bool,
}

impl Measurement {
    /// 显示用文字，未标定时带 `(est.)` 后缀。
    pub fn label(&self) -> String {
        if self.calibrated {
            format!("{:.2} {}", self.length, self.unit)
        } else {
            format!("{:.2} {} (est.)", self.length, self.unit)
        }
    }
}
