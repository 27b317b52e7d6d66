//! 模块内核错误类型定义
//!
//! 本模块定义了注册表、执行守卫和事件总线使用的所有错误类型。

use thiserror::Error;

/// 模块内核核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 注册错误 ====================

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 模块已存在
    #[error("模块已注册: '{0}'")]
    ModuleAlreadyExists(String),

    /// 依赖模块缺失或未激活
    #[error("模块 '{module_id}' 的依赖未注册或未激活: {missing:?}")]
    DependencyMissing {
        module_id: String,
        missing: Vec<String>,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    /// 模块描述无效
    #[error("无效的模块描述: {0:?}")]
    InvalidDescriptor(Vec<String>),

    /// 模块有依赖者，无法注销
    #[error("模块 '{module}' 被以下模块依赖，无法注销: {dependents:?}")]
    ModuleHasDependents {
        module: String,
        dependents: Vec<String>,
    },

    // ==================== 生命周期错误 ====================

    /// 模块激活失败
    #[error("模块激活失败: '{module_id}' - {source}")]
    ModuleActivationFailed {
        module_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// 模块停用失败
    #[error("模块停用失败: '{module_id}' - {source}")]
    ModuleDeactivationFailed {
        module_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// 生命周期钩子超时
    #[error("模块 '{module_id}' 的 {hook} 钩子超时 ({timeout_ms} ms)")]
    HookTimeout {
        module_id: String,
        hook: &'static str,
        timeout_ms: u64,
    },

    // ==================== 事件系统错误 ====================

    /// 订阅失败
    #[error("订阅失败: '{subscriber_id}' -> '{event_type}': {reason}")]
    SubscriptionFailed {
        subscriber_id: String,
        event_type: String,
        reason: String,
    },

    /// 订阅未找到
    #[error("订阅未找到: '{0}'")]
    SubscriptionNotFound(String),

    /// 处理器 ID 无效
    #[error("无效的处理器 ID: '{0}'")]
    InvalidHandlerId(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue { key: String, reason: String },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_FOUND: &str = "MODULE-001";
    pub const MODULE_ALREADY_EXISTS: &str = "MODULE-002";
    pub const MODULE_DEPENDENCY_MISSING: &str = "MODULE-003";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-004";
    pub const MODULE_INVALID_DESCRIPTOR: &str = "MODULE-005";
    pub const MODULE_HAS_DEPENDENTS: &str = "MODULE-006";
    pub const MODULE_ACTIVATION_FAILED: &str = "MODULE-007";
    pub const MODULE_DEACTIVATION_FAILED: &str = "MODULE-008";

    // 超时错误 (TIMEOUT-xxx)
    pub const TIMEOUT_HOOK: &str = "TIMEOUT-001";

    // 事件错误 (EVENT-xxx)
    pub const EVENT_SUBSCRIPTION_FAILED: &str = "EVENT-001";
    pub const EVENT_SUBSCRIPTION_NOT_FOUND: &str = "EVENT-002";

    // 守卫错误 (GUARD-xxx)
    pub const GUARD_INVALID_HANDLER: &str = "GUARD-001";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 核心错误 (CORE-xxx)
    pub const CORE_INIT_FAILED: &str = "CORE-001";
    pub const CORE_INTERNAL: &str = "CORE-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::ModuleAlreadyExists(_) => error_code::MODULE_ALREADY_EXISTS,
            CoreError::DependencyMissing { .. } => error_code::MODULE_DEPENDENCY_MISSING,
            CoreError::CircularDependency(_) => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::InvalidDescriptor(_) => error_code::MODULE_INVALID_DESCRIPTOR,
            CoreError::ModuleHasDependents { .. } => error_code::MODULE_HAS_DEPENDENTS,
            CoreError::ModuleActivationFailed { .. } => error_code::MODULE_ACTIVATION_FAILED,
            CoreError::ModuleDeactivationFailed { .. } => error_code::MODULE_DEACTIVATION_FAILED,
            CoreError::HookTimeout { .. } => error_code::TIMEOUT_HOOK,
            CoreError::SubscriptionFailed { .. } => error_code::EVENT_SUBSCRIPTION_FAILED,
            CoreError::SubscriptionNotFound(_) => error_code::EVENT_SUBSCRIPTION_NOT_FOUND,
            CoreError::InvalidHandlerId(_) => error_code::GUARD_INVALID_HANDLER,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            CoreError::Internal(_) => error_code::CORE_INTERNAL,
            _ => "UNKNOWN",
        }
    }

    /// 获取关联的模块 ID（如果有）
    pub fn module_id(&self) -> Option<&str> {
        match self {
            CoreError::ModuleNotFound(id)
            | CoreError::ModuleAlreadyExists(id) => Some(id.as_str()),
            CoreError::DependencyMissing { module_id, .. }
            | CoreError::ModuleActivationFailed { module_id, .. }
            | CoreError::ModuleDeactivationFailed { module_id, .. }
            | CoreError::HookTimeout { module_id, .. } => Some(module_id.as_str()),
            CoreError::ModuleHasDependents { module, .. } => Some(module.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DependencyMissing {
            module_id: "sales".to_string(),
            missing: vec!["inventory".to_string()],
        };
        assert!(err.to_string().contains("inventory"));
        assert!(err.to_string().contains("sales"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::ModuleNotFound("test".to_string());
        assert_eq!(err.error_code(), error_code::MODULE_NOT_FOUND);

        let err = CoreError::CircularDependency("a -> b -> a".to_string());
        assert_eq!(err.error_code(), error_code::MODULE_CIRCULAR_DEPENDENCY);
    }

    #[test]
    fn test_activation_failure_keeps_source() {
        let err = CoreError::ModuleActivationFailed {
            module_id: "kitchen".to_string(),
            source: anyhow::anyhow!("printer offline"),
        };
        assert_eq!(err.module_id(), Some("kitchen"));
        assert!(err.to_string().contains("printer offline"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }
}
