//! 核心模块
//!
//! 包含内核配置。

pub mod config;

pub use config::{
    EventBusConfig, GuardConfig, GuardConfigUpdate, KernelConfig, KernelConfigBuilder, LogConfig,
    RegistryConfig,
};
