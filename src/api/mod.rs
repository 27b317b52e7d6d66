//! API 模块
//!
//! 对外提供的 SDK 接口。
//!
//! # 模块概览
//!
//! - `sdk`: ModuleKernel 主接口，组装守卫、事件总线和模块注册表
//!
//! # 示例
//!
//! ```rust,no_run
//! use module_kernel::{KernelConfig, ModuleKernel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut kernel = ModuleKernel::new(KernelConfig::default()).await?;
//!     kernel.start().await?;
//!     kernel.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod sdk;

// 重导出主要类型
pub use sdk::{KernelState, ModuleKernel};
