//! 处理器执行守卫
//!
//! 为事件处理器提供超时保护、失败统计和熔断：
//!
//! - 阶段感知超时策略（初始化阶段 / 运行阶段）
//! - 按处理器 ID 统计执行次数、失败、超时和平均耗时
//! - 连续失败或错误率过高时熔断，冷却后自动恢复

mod breaker;
pub mod executor;
pub mod policy;
pub mod stats;

pub use executor::HandlerGuard;
pub use policy::{effective_timeout, matches_pattern, policy_key, ExecutionPhase};
pub use stats::{ExecutionResult, HandlerStats, SecurityStatus};
