//! 日志系统模块
//!
//! 基于 tracing 生态初始化内核日志：
//!
//! - 多级别日志，支持 `RUST_LOG` 覆盖
//! - 结构化日志（JSON 格式输出）
//! - 文件日志输出（异步非阻塞，按时间轮转）
//!
//! # 示例
//!
//! ```rust,no_run
//! use module_kernel::utils::logger::{Logger, LoggerConfig, RotationStrategy};
//!
//! let config = LoggerConfig::builder()
//!     .level("debug")
//!     .file_output("./logs")
//!     .rotation(RotationStrategy::Daily)
//!     .build();
//!
//! let _guard = Logger::init(config).unwrap();
//! tracing::info!(module_id = "inventory", "模块已激活");
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::LogConfig;
use crate::utils::{CoreError, Result};

/// 日志文件默认前缀
const DEFAULT_FILE_PREFIX: &str = "module-kernel";

// ============================================================================
// 日志轮转策略
// ============================================================================

/// 日志轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转（单个日志文件）
    Never,
    /// 每分钟轮转（主要用于测试）
    Minutely,
    /// 每小时轮转
    Hourly,
    /// 每天轮转（默认）
    #[default]
    Daily,
}

impl RotationStrategy {
    fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Minutely => Rotation::MINUTELY,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }

    /// 从字符串解析轮转策略，无法识别时回退到每天轮转
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "never" | "none" => RotationStrategy::Never,
            "minutely" | "minute" => RotationStrategy::Minutely,
            "hourly" | "hour" => RotationStrategy::Hourly,
            _ => RotationStrategy::Daily,
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationStrategy::Never => write!(f, "never"),
            RotationStrategy::Minutely => write!(f, "minutely"),
            RotationStrategy::Hourly => write!(f, "hourly"),
            RotationStrategy::Daily => write!(f, "daily"),
        }
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 默认日志级别（"trace" / "debug" / "info" / "warn" / "error"）
    pub level: String,

    /// 是否使用 JSON 格式输出
    pub json_format: bool,

    /// 是否输出到控制台
    pub console_output: bool,

    /// 文件输出目录（None 表示不输出到文件）
    pub file_output: Option<PathBuf>,

    /// 日志文件名前缀
    pub file_prefix: String,

    /// 日志轮转策略
    pub rotation: RotationStrategy,

    /// 最多保留的日志文件数（None 表示不清理）
    pub max_files: Option<usize>,

    /// 是否显示目标模块
    pub show_target: bool,

    /// 是否显示线程 ID
    pub show_thread_ids: bool,

    /// 是否显示文件名和行号
    pub show_file_line: bool,

    /// 自定义过滤指令（EnvFilter 格式），例如 "module_kernel::guard=trace"
    pub filter_directives: Option<String>,

    /// 是否启用 ANSI 颜色（仅控制台）
    pub ansi_colors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            rotation: RotationStrategy::Daily,
            max_files: None,
            show_target: true,
            show_thread_ids: false,
            show_file_line: false,
            filter_directives: None,
            ansi_colors: true,
        }
    }
}

impl LoggerConfig {
    /// 创建配置构建器
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::new()
    }

    /// 从内核配置中的 LogConfig 创建
    pub fn from_log_config(log_config: &LogConfig) -> Self {
        Self {
            level: log_config.level.clone(),
            json_format: log_config.json_format,
            file_output: if log_config.file_output {
                log_config.log_dir.clone()
            } else {
                None
            },
            rotation: RotationStrategy::parse(&log_config.rotation),
            max_files: Some(log_config.max_files),
            ..Default::default()
        }
    }
}

/// 日志配置构建器
#[derive(Debug, Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    /// 设置日志级别
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// 启用 JSON 格式输出
    pub fn json_format(mut self, enable: bool) -> Self {
        self.config.json_format = enable;
        self
    }

    /// 设置控制台输出
    pub fn console_output(mut self, enable: bool) -> Self {
        self.config.console_output = enable;
        self
    }

    /// 设置文件输出目录
    pub fn file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_output = Some(dir.into());
        self
    }

    /// 设置日志文件前缀
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    /// 设置轮转策略
    pub fn rotation(mut self, strategy: RotationStrategy) -> Self {
        self.config.rotation = strategy;
        self
    }

    /// 设置保留的日志文件数
    pub fn max_files(mut self, count: usize) -> Self {
        self.config.max_files = Some(count);
        self
    }

    /// 显示线程 ID
    pub fn show_thread_ids(mut self, enable: bool) -> Self {
        self.config.show_thread_ids = enable;
        self
    }

    /// 显示文件名和行号
    pub fn show_file_line(mut self, enable: bool) -> Self {
        self.config.show_file_line = enable;
        self
    }

    /// 设置过滤指令
    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    /// 启用 ANSI 颜色
    pub fn ansi_colors(mut self, enable: bool) -> Self {
        self.config.ansi_colors = enable;
        self
    }

    /// 构建配置
    pub fn build(self) -> LoggerConfig {
        self.config
    }
}

// ============================================================================
// 日志守卫
// ============================================================================

/// 日志系统守卫
///
/// 持有非阻塞写入器的 WorkerGuard，丢弃时刷新挂起的日志。
pub struct LogGuard {
    _console_guard: Option<WorkerGuard>,
    _file_guard: Option<WorkerGuard>,
}

impl LogGuard {
    fn empty() -> Self {
        Self {
            _console_guard: None,
            _file_guard: None,
        }
    }
}

// ============================================================================
// 日志系统
// ============================================================================

static LOGGER_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// 日志系统
pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// 返回的 `LogGuard` 必须保持存活直到程序退出。
    ///
    /// # Errors
    ///
    /// 重复初始化或全局订阅者已被设置时返回 `CoreError::InitFailed`。
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if LOGGER_INITIALIZED.get().is_some() {
            return Err(CoreError::InitFailed(
                "日志系统已初始化，不能重复初始化".to_string(),
            ));
        }

        let env_filter = Self::create_env_filter(&config);
        let mut guard = LogGuard::empty();

        let console_writer = if config.console_output {
            let (writer, console_guard) = tracing_appender::non_blocking(io::stdout());
            guard._console_guard = Some(console_guard);
            Some(writer)
        } else {
            None
        };

        let file_writer = if let Some(ref log_dir) = config.file_output {
            let mut builder = RollingFileAppender::builder()
                .rotation(config.rotation.to_rotation())
                .filename_prefix(config.file_prefix.as_str())
                .filename_suffix("log");
            if let Some(max_files) = config.max_files {
                builder = builder.max_log_files(max_files);
            }
            let appender = builder
                .build(log_dir)
                .map_err(|e| CoreError::InitFailed(format!("创建日志文件失败: {}", e)))?;
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard._file_guard = Some(file_guard);
            Some(writer)
        } else {
            None
        };

        let init_result = if config.json_format {
            let console_layer = console_writer.map(|w| {
                fmt::layer()
                    .json()
                    .with_writer(w)
                    .with_target(config.show_target)
                    .with_thread_ids(config.show_thread_ids)
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
            });
            let file_layer = file_writer.map(|w| {
                fmt::layer()
                    .json()
                    .with_writer(w)
                    .with_target(config.show_target)
                    .with_thread_ids(config.show_thread_ids)
            });
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
        } else {
            let console_layer = console_writer.map(|w| {
                fmt::layer()
                    .with_writer(w)
                    .with_target(config.show_target)
                    .with_thread_ids(config.show_thread_ids)
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_ansi(config.ansi_colors)
            });
            // 文件不使用 ANSI
            let file_layer = file_writer.map(|w| {
                fmt::layer()
                    .with_writer(w)
                    .with_target(config.show_target)
                    .with_thread_ids(config.show_thread_ids)
                    .with_ansi(false)
            });
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
        };

        init_result.map_err(|e| CoreError::InitFailed(format!("日志系统初始化失败: {}", e)))?;
        let _ = LOGGER_INITIALIZED.set(true);

        Ok(guard)
    }

    /// 尝试初始化日志系统，已初始化时返回空守卫
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_else(|_| LogGuard::empty())
    }

    /// 创建 EnvFilter，`RUST_LOG` 优先
    fn create_env_filter(config: &LoggerConfig) -> EnvFilter {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.level));

        match config.filter_directives {
            Some(ref directives) => directives
                .split(',')
                .filter_map(|d| d.trim().parse().ok())
                .fold(filter, |f, directive| f.add_directive(directive)),
            None => filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_strategy_parse() {
        assert_eq!(RotationStrategy::parse("DAILY"), RotationStrategy::Daily);
        assert_eq!(RotationStrategy::parse("hour"), RotationStrategy::Hourly);
        assert_eq!(RotationStrategy::parse("none"), RotationStrategy::Never);
        assert_eq!(RotationStrategy::parse("weekly"), RotationStrategy::Daily);
        assert_eq!(RotationStrategy::Minutely.to_string(), "minutely");
    }

    #[test]
    fn test_logger_config_builder() {
        let config = LoggerConfig::builder()
            .level("debug")
            .json_format(true)
            .file_output("/var/log/kernel")
            .file_prefix("pos")
            .rotation(RotationStrategy::Hourly)
            .filter_directives("module_kernel::guard=trace")
            .ansi_colors(false)
            .build();

        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert_eq!(config.file_output, Some(PathBuf::from("/var/log/kernel")));
        assert_eq!(config.file_prefix, "pos");
        assert_eq!(config.rotation, RotationStrategy::Hourly);
        assert!(!config.ansi_colors);
    }

    #[test]
    fn test_logger_config_from_log_config() {
        let log_config = LogConfig {
            level: "warn".to_string(),
            file_output: true,
            log_dir: Some(PathBuf::from("/tmp/logs")),
            json_format: true,
            rotation: "hourly".to_string(),
            max_files: 3,
        };

        let config = LoggerConfig::from_log_config(&log_config);
        assert_eq!(config.level, "warn");
        assert!(config.json_format);
        assert_eq!(config.file_output, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(config.rotation, RotationStrategy::Hourly);
        assert_eq!(config.max_files, Some(3));
    }

    #[test]
    fn test_file_output_ignored_without_flag() {
        let log_config = LogConfig {
            log_dir: Some(PathBuf::from("/tmp/logs")),
            ..Default::default()
        };
        assert!(LoggerConfig::from_log_config(&log_config).file_output.is_none());
    }

    #[test]
    fn test_try_init_twice_does_not_panic() {
        let _first = Logger::try_init(LoggerConfig::builder().console_output(false).build());
        let _second = Logger::try_init(LoggerConfig::default());
    }
}
