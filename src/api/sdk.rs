//! ModuleKernel SDK
//!
//! 模块内核的主要对外接口，负责组装执行守卫、事件总线和模块注册表：
//!
//! - 模块管理：注册、激活、停用、注销模块
//! - 事件系统：通过守卫保护的事件总线发布事件
//! - 生命周期：启动后守卫进入运行阶段，关闭时按依赖逆序停用模块
//!
//! # 示例
//!
//! ```rust,no_run
//! use module_kernel::{KernelConfig, ModuleKernel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = KernelConfig::builder()
//!         .handler_timeout_ms(2000)
//!         .log_level("info")
//!         .build();
//!
//!     let mut kernel = ModuleKernel::new(config).await?;
//!     kernel.start().await?;
//!
//!     // 注册模块 ...
//!
//!     kernel.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::bus::{DispatchSummary, Event, EventBus, LocalEventBus};
use crate::core::config::KernelConfig;
use crate::guard::HandlerGuard;
use crate::module::{ModuleDescriptor, ModuleRegistry, ShutdownReport};
use crate::utils::{CoreError, Result};

// ============================================================================
// 内核状态
// ============================================================================

/// 内核状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// 已初始化
    Initialized,
    /// 运行中
    Running,
    /// 正在关闭
    ShuttingDown,
    /// 已关闭
    Shutdown,
}

impl KernelState {
    /// 检查是否可以启动
    pub fn can_start(&self) -> bool {
        matches!(self, KernelState::Initialized)
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        matches!(self, KernelState::Running)
    }
}

// ============================================================================
// ModuleKernel 主结构体
// ============================================================================

/// 模块内核
///
/// # 组件
///
/// - `guard`: 处理器执行守卫，超时与熔断
/// - `bus`: 本地事件总线，所有分发都经过守卫
/// - `registry`: 模块注册表
///
/// # 生命周期
///
/// 1. `new()` - 创建内核，守卫处于初始化阶段
/// 2. `start()` - 标记初始化完成，守卫进入运行阶段
/// 3. `shutdown()` - 优雅关闭所有模块并重置守卫
pub struct ModuleKernel {
    config: KernelConfig,
    state: Arc<RwLock<KernelState>>,
    guard: HandlerGuard,
    bus: Arc<LocalEventBus>,
    registry: ModuleRegistry,
    started_at: Option<Instant>,
}

impl ModuleKernel {
    /// 创建新的内核实例
    ///
    /// # Arguments
    ///
    /// * `config` - 内核配置
    ///
    /// # Errors
    ///
    /// 配置校验失败时返回 `InvalidConfigValue`
    pub async fn new(config: KernelConfig) -> Result<Self> {
        info!("初始化模块内核 v{}", crate::VERSION);
        config.validate()?;

        let guard = HandlerGuard::new(config.guard.clone());
        debug!("执行守卫初始化完成");

        let bus = Arc::new(LocalEventBus::new(config.bus.clone(), guard.clone()));
        debug!("事件总线初始化完成");

        let registry = ModuleRegistry::new(bus.clone(), config.registry.clone());
        debug!("模块注册表初始化完成");

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(KernelState::Initialized)),
            guard,
            bus,
            registry,
            started_at: None,
        })
    }

    /// 启动内核
    ///
    /// 将守卫切换到运行阶段：此后系统处理器也受超时约束，生命周期处理器使用生命周期超时。
    pub async fn start(&mut self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_start() {
            return Err(CoreError::InitFailed(format!(
                "内核当前状态 {:?} 不允许启动",
                *state
            )));
        }

        self.guard.mark_initialization_complete();
        self.registry.start_health_monitor();

        *state = KernelState::Running;
        self.started_at = Some(Instant::now());
        info!(
            modules = self.registry.module_count().await,
            "模块内核已启动"
        );
        Ok(())
    }

    /// 关闭内核
    ///
    /// 在 `registry.graceful_shutdown_timeout_ms` 约束下停用所有模块，然后重置守卫。
    /// 未启动或已关闭时静默返回。
    pub async fn shutdown(&mut self) -> Result<Option<ShutdownReport>> {
        {
            let mut state = self.state.write().await;
            if !state.is_running() {
                return Ok(None);
            }
            *state = KernelState::ShuttingDown;
        }

        info!("正在关闭模块内核...");
        let report = self
            .registry
            .graceful_shutdown(self.config.registry.graceful_shutdown_timeout_ms)
            .await;
        self.guard.destroy();

        *self.state.write().await = KernelState::Shutdown;
        info!(
            deactivated = report.deactivated.len(),
            failed = report.failed.len(),
            "模块内核已关闭"
        );
        Ok(Some(report))
    }

    // ========================================================================
    // 便捷 API
    // ========================================================================

    /// 注册模块（注册后立即激活）
    pub async fn register_module(&self, descriptor: ModuleDescriptor) -> Result<()> {
        self.registry.register_module(descriptor).await
    }

    /// 发布事件
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        sender: impl Into<String>,
        data: Value,
    ) -> Result<DispatchSummary> {
        self.bus.publish(Event::new(event_type, sender, data)).await
    }

    // ========================================================================
    // 访问器
    // ========================================================================

    /// 内核配置
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// 模块注册表
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// 事件总线
    pub fn bus(&self) -> &Arc<LocalEventBus> {
        &self.bus
    }

    /// 执行守卫
    pub fn guard(&self) -> &HandlerGuard {
        &self.guard
    }

    /// 当前状态
    pub async fn state(&self) -> KernelState {
        *self.state.read().await
    }

    /// 运行时长（毫秒），未启动时为 0
    pub fn uptime_ms(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::ExecutionPhase;

    #[tokio::test]
    async fn test_kernel_lifecycle() {
        let mut kernel = ModuleKernel::new(KernelConfig::default()).await.unwrap();
        assert_eq!(kernel.state().await, KernelState::Initialized);
        assert_eq!(kernel.guard().phase(), ExecutionPhase::Initialization);

        kernel.start().await.unwrap();
        assert_eq!(kernel.state().await, KernelState::Running);
        assert_eq!(kernel.guard().phase(), ExecutionPhase::Runtime);
        assert!(kernel.start().await.is_err());

        let report = kernel.shutdown().await.unwrap();
        assert!(report.is_some());
        assert_eq!(kernel.state().await, KernelState::Shutdown);
        assert!(kernel.shutdown().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = KernelConfig::default();
        config.registry.health_check_interval_ms = 0;
        assert!(matches!(
            ModuleKernel::new(config).await,
            Err(CoreError::InvalidConfigValue { .. })
        ));
    }
}
