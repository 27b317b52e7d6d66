//! # Module Kernel - 模块化运行时内核
//!
//! 为插件式应用（如餐厅 POS 系统）提供模块管理的核心能力：
//!
//! - **模块注册表**: 模块的注册、按依赖顺序激活/停用、健康检查和优雅关闭
//! - **依赖图**: 依赖关系维护、激活顺序计算和循环依赖检测
//! - **执行守卫**: 事件处理器的超时、统计和熔断
//! - **事件总线**: 经过执行守卫保护的本地发布/订阅
//! - **日志系统**: 结构化日志记录
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use module_kernel::{KernelConfig, ModuleDescriptor, ModuleHealth, ModuleHooks, ModuleKernel};
//!
//! struct Inventory;
//!
//! #[async_trait]
//! impl ModuleHooks for Inventory {
//!     async fn health_check(&self) -> anyhow::Result<ModuleHealth> {
//!         Ok(ModuleHealth::healthy())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut kernel = ModuleKernel::new(KernelConfig::default()).await?;
//!     kernel
//!         .register_module(ModuleDescriptor::new("inventory", "Inventory", "1.0.0", Arc::new(Inventory)))
//!         .await?;
//!     kernel.start().await?;
//!
//!     kernel.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块注册表、依赖图和生命周期
//! - `guard` - 处理器执行守卫
//! - `bus` - 事件总线
//! - `utils` - 工具函数和错误类型
//! - `core` - 核心配置
//! - `api` - 公共 API 接口

#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod bus;
pub mod core;
pub mod guard;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use bus::{
    DispatchStats, DispatchSummary, Event, EventBus, EventSubscription, LocalEventBus,
    SubscriptionHandle,
};

pub use guard::{ExecutionPhase, ExecutionResult, HandlerGuard, HandlerStats, SecurityStatus};

pub use module::{
    DependencyGraph, HealthStatus, ModuleContext, ModuleDescriptor, ModuleHealth, ModuleHooks,
    ModuleInfo, ModuleMetrics, ModuleOptions, ModuleRegistry, ModuleState, RegistryEvent,
    RegistryEventKind, ShutdownReport,
};

pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, generate_id, generate_uuid, CoreError, Result};

pub use api::sdk::{KernelState, ModuleKernel};
pub use core::config::{
    EventBusConfig, GuardConfig, GuardConfigUpdate, KernelConfig, KernelConfigBuilder, LogConfig,
    RegistryConfig,
};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
