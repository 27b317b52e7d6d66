//! 模块描述与运行时数据结构
//!
//! 定义模块描述、生命周期钩子、模块状态和健康信息。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::{DispatchSummary, Event, EventBus, EventSubscription};
use crate::utils::Result;

// ============================================================================
// 生命周期钩子
// ============================================================================

/// 模块生命周期钩子
///
/// 钩子由模块实现，注册表负责在正确的时机调用。`health_check` 必须实现，
/// 激活与停用钩子默认为空操作。
#[async_trait]
pub trait ModuleHooks: Send + Sync {
    /// 激活钩子
    async fn on_activate(&self, _ctx: ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// 停用钩子
    async fn on_deactivate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 健康检查
    async fn health_check(&self) -> anyhow::Result<ModuleHealth>;
}

/// 激活期间提供给模块的受限上下文
///
/// 通过上下文发出的事件，发送方始终是被激活的模块。
#[derive(Clone)]
pub struct ModuleContext {
    module_id: String,
    bus: Arc<dyn EventBus>,
}

impl ModuleContext {
    pub(crate) fn new(module_id: impl Into<String>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            module_id: module_id.into(),
            bus,
        }
    }

    /// 当前模块 ID
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// 以当前模块的身份发布事件
    pub async fn emit(&self, event_type: impl Into<String>, data: Value) -> Result<DispatchSummary> {
        self.bus
            .publish(Event::new(event_type, self.module_id.clone(), data))
            .await
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module_id", &self.module_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// 模块描述
// ============================================================================

/// 模块级配置覆盖
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOptions {
    /// 健康检查间隔（毫秒）
    pub health_check_interval_ms: Option<u64>,

    /// 优雅停用超时（毫秒）
    pub graceful_shutdown_timeout_ms: Option<u64>,

    /// 激活超时（毫秒）
    pub activation_timeout_ms: Option<u64>,
}

/// 模块描述，注册后不可变
#[derive(Clone)]
pub struct ModuleDescriptor {
    /// 模块唯一标识
    pub id: String,

    /// 模块名称
    pub name: String,

    /// 模块版本
    pub version: String,

    /// 依赖的模块 ID（按声明顺序）
    pub dependencies: Vec<String>,

    /// 激活时登记的事件订阅
    pub event_subscriptions: Vec<EventSubscription>,

    /// 生命周期钩子
    pub hooks: Arc<dyn ModuleHooks>,

    /// 配置覆盖
    pub options: ModuleOptions,
}

impl ModuleDescriptor {
    /// 创建模块描述
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        hooks: Arc<dyn ModuleHooks>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            dependencies: vec![],
            event_subscriptions: vec![],
            hooks,
            options: ModuleOptions::default(),
        }
    }

    /// 添加依赖
    pub fn depends_on(mut self, module_id: impl Into<String>) -> Self {
        self.dependencies.push(module_id.into());
        self
    }

    /// 添加事件订阅
    pub fn subscribe(mut self, subscription: EventSubscription) -> Self {
        self.event_subscriptions.push(subscription);
        self
    }

    /// 设置配置覆盖
    pub fn with_options(mut self, options: ModuleOptions) -> Self {
        self.options = options;
        self
    }

    /// 验证描述有效性
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = vec![];

        if self.id.trim().is_empty() {
            errors.push("模块 ID 不能为空".to_string());
        }

        if self.name.trim().is_empty() {
            errors.push("模块名称不能为空".to_string());
        }

        if self.version.trim().is_empty() {
            errors.push("模块版本不能为空".to_string());
        }

        for dep in &self.dependencies {
            if dep.trim().is_empty() {
                errors.push("依赖 ID 不能为空".to_string());
            } else if dep == &self.id {
                errors.push(format!("模块 {} 不能依赖自身", self.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("event_subscriptions", &self.event_subscriptions)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// 模块状态
// ============================================================================

/// 模块激活状态
///
/// `Inactive → Activating → Active → Deactivating → Inactive`，
/// 激活或停用失败进入 `Error`，`Error` 可以重试激活或停用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 未激活（注册后的初始状态）
    #[default]
    Inactive,
    /// 正在激活
    Activating,
    /// 已激活
    Active,
    /// 正在停用
    Deactivating,
    /// 错误状态
    Error,
}

impl ModuleState {
    /// 是否已激活
    pub fn is_active(&self) -> bool {
        matches!(self, ModuleState::Active)
    }

    /// 是否处于过渡状态
    pub fn is_transitioning(&self) -> bool {
        matches!(self, ModuleState::Activating | ModuleState::Deactivating)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Inactive => "inactive",
            ModuleState::Activating => "activating",
            ModuleState::Active => "active",
            ModuleState::Deactivating => "deactivating",
            ModuleState::Error => "error",
        };
        f.write_str(s)
    }
}

// ============================================================================
// 健康信息
// ============================================================================

/// 健康状态，与激活状态分开跟踪
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Inactive,
    Error,
}

/// 模块运行指标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetrics {
    pub events_processed: u64,
    pub events_emitted: u64,
    pub error_rate: f64,
    pub avg_processing_time_ms: f64,
    pub queue_size: usize,
}

/// 模块健康快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHealth {
    /// 健康状态
    pub status: HealthStatus,

    /// 附加说明
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// 检查时间
    pub last_check: DateTime<Utc>,

    /// 运行指标
    #[serde(default)]
    pub metrics: ModuleMetrics,
}

impl ModuleHealth {
    fn with_status(status: HealthStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check: Utc::now(),
            metrics: ModuleMetrics::default(),
        }
    }

    /// 健康
    pub fn healthy() -> Self {
        Self::with_status(HealthStatus::Healthy, None)
    }

    /// 降级
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, Some(reason.into()))
    }

    /// 不健康
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, Some(reason.into()))
    }

    /// 未激活
    pub fn inactive() -> Self {
        Self::with_status(HealthStatus::Inactive, None)
    }

    /// 检查出错
    pub fn error(reason: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Error, Some(reason.into()))
    }

    /// 附带运行指标
    pub fn with_metrics(mut self, metrics: ModuleMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// 是否健康
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl Default for ModuleHealth {
    fn default() -> Self {
        Self::inactive()
    }
}

/// 模块运行时信息快照
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,

    /// 当前激活状态
    pub state: ModuleState,

    /// 最近一次健康信息
    pub health: ModuleHealth,

    /// 已登记的订阅事件类型
    pub subscriptions: Vec<String>,

    /// 注册时间
    pub registered_at: DateTime<Utc>,

    /// 激活时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
}

impl ModuleInfo {
    /// 是否已激活
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
