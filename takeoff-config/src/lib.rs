use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "TAKEOFF_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub markup: MarkupConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub sources: SourceConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `TAKEOFF_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "ViewerConfig::default_zoom")]
    pub default_zoom: f64,
    #[serde(default = "ViewerConfig::default_zoom_step")]
    pub zoom_step: f64,
}

impl ViewerConfig {
    fn default_zoom() -> f64 {
        1.0
    }

    fn default_zoom_step() -> f64 {
        0.25
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_zoom: Self::default_zoom(),
            zoom_step: Self::default_zoom_step(),
        }
    }
}

/// 新建批注的默认样式。颜色为 `#rrggbb`。
#[derive(Debug, Clone, Deserialize)]
pub struct MarkupConfig {
    #[serde(default = "MarkupConfig::default_color")]
    pub color: String,
    #[serde(default = "MarkupConfig::default_stroke_width")]
    pub stroke_width: f64,
    #[serde(default = "MarkupConfig::default_visible")]
    pub visible: bool,
}

impl MarkupConfig {
    fn default_color() -> String {
        "#ff0000".to_string()
    }

    fn default_stroke_width() -> f64 {
        2.0
    }

    fn default_visible() -> bool {
        true
    }
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            color: Self::default_color(),
            stroke_width: Self::default_stroke_width(),
            visible: Self::default_visible(),
        }
    }
}

/// 未标定时假定的比例与显示单位。
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "CalibrationConfig::default_pixels_per_unit")]
    pub default_pixels_per_unit: f64,
    #[serde(default = "CalibrationConfig::default_unit")]
    pub unit: String,
}

impl CalibrationConfig {
    fn default_pixels_per_unit() -> f64 {
        1.0
    }

    fn default_unit() -> String {
        "ft".to_string()
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            default_pixels_per_unit: Self::default_pixels_per_unit(),
            unit: Self::default_unit(),
        }
    }
}

/// 覆盖层尺寸参数（渲染空间像素）。缺省项沿用内置样式。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub cloud_arc_radius: Option<f64>,
    #[serde(default)]
    pub marker_radius: Option<f64>,
    #[serde(default)]
    pub line_width: Option<f64>,
    #[serde(default)]
    pub halo_width: Option<f64>,
    #[serde(default)]
    pub label_font_size: Option<f64>,
    #[serde(default)]
    pub fill_opacity: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// 页面图像目录；为空时使用生成的演示图纸。
    #[serde(default)]
    pub document_pages: Option<PathBuf>,
    #[serde(default)]
    pub items_file: Option<PathBuf>,
    #[serde(default)]
    pub markup_file: Option<PathBuf>,
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::discover().expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert!((cfg.viewer.default_zoom - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.markup.color, "#ff0000");
        assert!(cfg.markup.visible);
        assert_eq!(cfg.calibration.unit, "ft");
        assert!(cfg.overlay.cloud_arc_radius.is_none());
        assert!(cfg.sources.items_file.is_none());
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r##"
            [logging]
            level = "debug"

            [viewer]
            default_zoom = 1.5

            [markup]
            color = "#0ea5e9"
            stroke_width = 3.0
            visible = false

            [calibration]
            default_pixels_per_unit = 48.0
            unit = "m"

            [overlay]
            cloud_arc_radius = 16.0
            fill_opacity = 0.35

            [sources]
            document_pages = "../drawings/plan-a"
            items_file = "../drawings/plan-a.json"
            "##
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert!((cfg.viewer.default_zoom - 1.5).abs() < f64::EPSILON);
        assert!((cfg.viewer.zoom_step - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.markup.color, "#0ea5e9");
        assert!(!cfg.markup.visible);
        assert!((cfg.calibration.default_pixels_per_unit - 48.0).abs() < f64::EPSILON);
        assert_eq!(cfg.calibration.unit, "m");
        assert_eq!(cfg.overlay.cloud_arc_radius, Some(16.0));
        assert_eq!(cfg.overlay.fill_opacity, Some(0.35));
        assert!(cfg.overlay.marker_radius.is_none());
        assert_eq!(
            cfg.sources
                .items_file
                .as_deref()
                .map(|p| p.to_string_lossy().to_string()),
            Some("../drawings/plan-a.json".to_string())
        );
        assert!(cfg.sources.export_dir.is_none());
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[viewer\ndefault_zoom = ").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == file.path()));
    }
}
