//! 模块管理模块
//!
//! 包含模块管理系统的核心组件：
//! - 模块描述与健康信息
//! - 依赖图
//! - 生命周期通知与钩子调用
//! - 模块注册表与健康检查

pub mod dependency;
pub mod health;
pub mod lifecycle;
pub mod metadata;
pub mod registry;

// 重导出常用类型
pub use dependency::DependencyGraph;
pub use lifecycle::{ListenerId, RegistryEvent, RegistryEventKind, RegistryListener};
pub use metadata::{
    HealthStatus, ModuleContext, ModuleDescriptor, ModuleHealth, ModuleHooks, ModuleInfo,
    ModuleMetrics, ModuleOptions, ModuleState,
};
pub use registry::{ModuleRegistry, ShutdownReport};
