//! 内核配置
//!
//! 定义注册表、执行守卫、事件总线和日志的配置结构及加载逻辑。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{CoreError, Result};

// ============================================================================
// 注册表配置
// ============================================================================

/// 模块注册表配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// 默认健康检查间隔（毫秒）
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// 默认优雅停用超时（毫秒）
    #[serde(default = "default_graceful_shutdown_timeout_ms")]
    pub graceful_shutdown_timeout_ms: u64,

    /// 激活钩子超时（毫秒），`None` 表示不限制
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: Option<u64>,

    /// 单次健康检查超时（毫秒）
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,

    /// 健康检查逾期倍数，超过 `间隔 × 倍数` 未检查即强制补检
    #[serde(default = "default_overdue_factor")]
    pub overdue_factor: u32,
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_graceful_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_activation_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_health_check_timeout_ms() -> u64 {
    5_000
}

fn default_overdue_factor() -> u32 {
    2
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            graceful_shutdown_timeout_ms: default_graceful_shutdown_timeout_ms(),
            activation_timeout_ms: default_activation_timeout_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            overdue_factor: default_overdue_factor(),
        }
    }
}

// ============================================================================
// 执行守卫配置
// ============================================================================

/// 处理器执行守卫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// 默认处理器超时（毫秒）
    #[serde(default = "default_guard_timeout_ms")]
    pub default_timeout_ms: u64,

    /// 请求超时上限（毫秒）
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// 运行阶段生命周期处理器超时（毫秒）
    #[serde(default = "default_lifecycle_timeout_ms")]
    pub lifecycle_timeout_ms: u64,

    /// 慢执行告警阈值（毫秒）
    #[serde(default = "default_slow_execution_warn_ms")]
    pub slow_execution_warn_ms: u64,

    /// 是否启用熔断
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,

    /// 连续失败熔断阈值
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// 错误率熔断阈值（超过即熔断）
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// 按错误率判断前所需的最少执行次数
    #[serde(default = "default_error_rate_min_executions")]
    pub error_rate_min_executions: u64,

    /// 熔断自动恢复时间（毫秒）
    #[serde(default = "default_circuit_reset_timeout_ms")]
    pub circuit_reset_timeout_ms: u64,

    /// 初始化阶段不设超时的系统处理器模式
    #[serde(default = "default_system_patterns")]
    pub system_patterns: Vec<String>,

    /// 运行阶段使用生命周期超时的处理器模式
    #[serde(default = "default_lifecycle_patterns")]
    pub lifecycle_patterns: Vec<String>,
}

fn default_guard_timeout_ms() -> u64 {
    5_000
}

fn default_max_timeout_ms() -> u64 {
    10_000
}

fn default_lifecycle_timeout_ms() -> u64 {
    30_000
}

fn default_slow_execution_warn_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_error_rate_threshold() -> f64 {
    0.5
}

fn default_error_rate_min_executions() -> u64 {
    10
}

fn default_circuit_reset_timeout_ms() -> u64 {
    30_000
}

fn default_system_patterns() -> Vec<String> {
    vec![
        "system.*".to_string(),
        "module.*".to_string(),
        "registry.*".to_string(),
    ]
}

fn default_lifecycle_patterns() -> Vec<String> {
    vec!["module.*".to_string(), "registry.*".to_string()]
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_guard_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            lifecycle_timeout_ms: default_lifecycle_timeout_ms(),
            slow_execution_warn_ms: default_slow_execution_warn_ms(),
            circuit_breaker_enabled: true,
            failure_threshold: default_failure_threshold(),
            error_rate_threshold: default_error_rate_threshold(),
            error_rate_min_executions: default_error_rate_min_executions(),
            circuit_reset_timeout_ms: default_circuit_reset_timeout_ms(),
            system_patterns: default_system_patterns(),
            lifecycle_patterns: default_lifecycle_patterns(),
        }
    }
}

impl GuardConfig {
    /// 应用部分配置更新
    pub fn apply(&mut self, update: GuardConfigUpdate) {
        if let Some(v) = update.default_timeout_ms {
            self.default_timeout_ms = v;
        }
        if let Some(v) = update.max_timeout_ms {
            self.max_timeout_ms = v;
        }
        if let Some(v) = update.lifecycle_timeout_ms {
            self.lifecycle_timeout_ms = v;
        }
        if let Some(v) = update.slow_execution_warn_ms {
            self.slow_execution_warn_ms = v;
        }
        if let Some(v) = update.circuit_breaker_enabled {
            self.circuit_breaker_enabled = v;
        }
        if let Some(v) = update.failure_threshold {
            self.failure_threshold = v;
        }
        if let Some(v) = update.error_rate_threshold {
            self.error_rate_threshold = v;
        }
        if let Some(v) = update.error_rate_min_executions {
            self.error_rate_min_executions = v;
        }
        if let Some(v) = update.circuit_reset_timeout_ms {
            self.circuit_reset_timeout_ms = v;
        }
        if let Some(v) = update.system_patterns {
            self.system_patterns = v;
        }
        if let Some(v) = update.lifecycle_patterns {
            self.lifecycle_patterns = v;
        }
    }

    /// 校验守卫配置
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(invalid("guard.default_timeout_ms", "必须大于 0"));
        }
        if self.default_timeout_ms > self.max_timeout_ms {
            return Err(invalid(
                "guard.default_timeout_ms",
                "不能大于 guard.max_timeout_ms",
            ));
        }
        if self.failure_threshold == 0 {
            return Err(invalid("guard.failure_threshold", "必须大于 0"));
        }
        if !(self.error_rate_threshold > 0.0 && self.error_rate_threshold <= 1.0) {
            return Err(invalid("guard.error_rate_threshold", "必须位于 (0, 1] 区间"));
        }
        Ok(())
    }
}

/// 守卫配置的部分更新，未设置的字段保持原值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfigUpdate {
    pub default_timeout_ms: Option<u64>,
    pub max_timeout_ms: Option<u64>,
    pub lifecycle_timeout_ms: Option<u64>,
    pub slow_execution_warn_ms: Option<u64>,
    pub circuit_breaker_enabled: Option<bool>,
    pub failure_threshold: Option<u32>,
    pub error_rate_threshold: Option<f64>,
    pub error_rate_min_executions: Option<u64>,
    pub circuit_reset_timeout_ms: Option<u64>,
    pub system_patterns: Option<Vec<String>>,
    pub lifecycle_patterns: Option<Vec<String>>,
}

// ============================================================================
// 事件总线配置
// ============================================================================

/// 事件总线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// 健康检查间隔（毫秒），注册表构造时读取
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// 分发时传给守卫的请求超时（毫秒），`None` 使用守卫默认值
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            handler_timeout_ms: None,
        }
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// 保留日志文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
            max_files: default_max_files(),
        }
    }
}

// ============================================================================
// 内核配置
// ============================================================================

/// 内核配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 注册表配置
    #[serde(default)]
    pub registry: RegistryConfig,

    /// 执行守卫配置
    #[serde(default)]
    pub guard: GuardConfig,

    /// 事件总线配置
    #[serde(default)]
    pub bus: EventBusConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,
}

impl KernelConfig {
    /// 创建配置构建器
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// `.json` 扩展名按 JSON 解析，其余按 YAML 解析。加载后立即校验。
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("读取 {} 失败: {}", path.display(), e))
        })?;

        let mut config: KernelConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.validate()?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// 校验配置
    ///
    /// # Errors
    ///
    /// 发现的第一个非法值以 `CoreError::InvalidConfigValue` 返回。
    pub fn validate(&self) -> Result<()> {
        if self.registry.health_check_interval_ms == 0 {
            return Err(invalid("registry.health_check_interval_ms", "必须大于 0"));
        }
        if self.registry.graceful_shutdown_timeout_ms == 0 {
            return Err(invalid("registry.graceful_shutdown_timeout_ms", "必须大于 0"));
        }
        if self.registry.activation_timeout_ms == Some(0) {
            return Err(invalid(
                "registry.activation_timeout_ms",
                "必须大于 0，或设为 null 关闭",
            ));
        }
        if self.registry.health_check_timeout_ms == 0 {
            return Err(invalid("registry.health_check_timeout_ms", "必须大于 0"));
        }
        if self.registry.overdue_factor == 0 {
            return Err(invalid("registry.overdue_factor", "必须大于 0"));
        }
        if self.bus.health_check_interval_ms == 0 {
            return Err(invalid("bus.health_check_interval_ms", "必须大于 0"));
        }
        self.guard.validate()
    }
}

fn invalid(key: &str, reason: &str) -> CoreError {
    CoreError::InvalidConfigValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: KernelConfig::default(),
        }
    }

    /// 设置健康检查间隔（同时作用于注册表与事件总线）
    pub fn health_check_interval_ms(mut self, ms: u64) -> Self {
        self.config.registry.health_check_interval_ms = ms;
        self.config.bus.health_check_interval_ms = ms;
        self
    }

    /// 设置优雅停用超时
    pub fn graceful_shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.config.registry.graceful_shutdown_timeout_ms = ms;
        self
    }

    /// 设置激活超时，`None` 关闭
    pub fn activation_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.registry.activation_timeout_ms = ms;
        self
    }

    /// 设置健康检查超时
    pub fn health_check_timeout_ms(mut self, ms: u64) -> Self {
        self.config.registry.health_check_timeout_ms = ms;
        self
    }

    /// 设置守卫默认超时
    pub fn handler_timeout_ms(mut self, ms: u64) -> Self {
        self.config.guard.default_timeout_ms = ms;
        self
    }

    /// 设置守卫最大超时
    pub fn max_handler_timeout_ms(mut self, ms: u64) -> Self {
        self.config.guard.max_timeout_ms = ms;
        self
    }

    /// 启用或关闭熔断
    pub fn circuit_breaker(mut self, enabled: bool) -> Self {
        self.config.guard.circuit_breaker_enabled = enabled;
        self
    }

    /// 设置熔断自动恢复时间
    pub fn circuit_reset_timeout_ms(mut self, ms: u64) -> Self {
        self.config.guard.circuit_reset_timeout_ms = ms;
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> KernelConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.registry.health_check_interval_ms, 30_000);
        assert_eq!(config.registry.graceful_shutdown_timeout_ms, 5_000);
        assert_eq!(config.registry.activation_timeout_ms, Some(30_000));
        assert_eq!(config.guard.default_timeout_ms, 5_000);
        assert_eq!(config.guard.max_timeout_ms, 10_000);
        assert_eq!(config.guard.failure_threshold, 3);
        assert_eq!(config.guard.system_patterns.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = KernelConfig::builder()
            .health_check_interval_ms(1_000)
            .activation_timeout_ms(None)
            .circuit_breaker(false)
            .log_level("debug")
            .build();

        assert_eq!(config.registry.health_check_interval_ms, 1_000);
        assert_eq!(config.bus.health_check_interval_ms, 1_000);
        assert_eq!(config.registry.activation_timeout_ms, None);
        assert!(!config.guard.circuit_breaker_enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_inverted_timeouts() {
        let config = KernelConfig::builder()
            .handler_timeout_ms(20_000)
            .max_handler_timeout_ms(10_000)
            .build();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfigValue { ref key, .. } if key == "guard.default_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_error_rate_out_of_range() {
        let mut config = KernelConfig::default();
        config.guard.error_rate_threshold = 1.5;
        assert!(config.validate().is_err());

        config.guard.error_rate_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_guard_config_apply_partial() {
        let mut config = GuardConfig::default();
        config.apply(GuardConfigUpdate {
            default_timeout_ms: Some(200),
            failure_threshold: Some(5),
            ..Default::default()
        });

        assert_eq!(config.default_timeout_ms, 200);
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.max_timeout_ms, 10_000);
    }

    #[test]
    fn test_config_serialization() {
        let config = KernelConfig::builder()
            .graceful_shutdown_timeout_ms(2_500)
            .log_level("warn")
            .build();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: KernelConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.registry.graceful_shutdown_timeout_ms, 2_500);
        assert_eq!(parsed.logging.level, "warn");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "guard:\n  default_timeout_ms: 100\n";
        let parsed: KernelConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(parsed.guard.default_timeout_ms, 100);
        assert_eq!(parsed.guard.max_timeout_ms, 10_000);
        assert_eq!(parsed.registry.overdue_factor, 2);
    }
}
