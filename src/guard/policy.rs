//! 阶段感知超时策略
//!
//! 初始化阶段，匹配系统模式的处理器不设超时；进入运行阶段后，
//! 匹配生命周期模式的处理器使用较长的生命周期超时，其余处理器使用标准超时。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::core::config::GuardConfig;

/// 系统运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    /// 初始化阶段（模块批量启动中）
    Initialization,
    /// 运行阶段
    Runtime,
}

/// 全局阶段开关
///
/// 由宿主系统在启动完成后切换一次，与具体处理器无关。
#[derive(Debug, Default)]
pub struct PhaseFlag {
    initialization_complete: AtomicBool,
}

impl PhaseFlag {
    /// 创建处于初始化阶段的开关
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前阶段
    pub fn phase(&self) -> ExecutionPhase {
        if self.initialization_complete.load(Ordering::Acquire) {
            ExecutionPhase::Runtime
        } else {
            ExecutionPhase::Initialization
        }
    }

    /// 切换到运行阶段，返回本次调用是否真正完成了切换
    pub fn mark_runtime(&self) -> bool {
        !self.initialization_complete.swap(true, Ordering::AcqRel)
    }
}

/// 匹配处理器 ID 模式
///
/// 支持 `*`（全部）、`prefix.*`（前缀后至少还有一个字符）和精确匹配。
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(".*") {
        return value.len() > prefix.len() + 1
            && value.starts_with(prefix)
            && value.as_bytes()[prefix.len()] == b'.';
    }

    pattern == value
}

/// 处理器 ID 中参与模式匹配的部分
///
/// 事件总线生成的 ID 形如 `订阅者::事件模式`，取 `::` 之后的事件模式；
/// 其余 ID 整体参与匹配。
pub fn policy_key(handler_id: &str) -> &str {
    handler_id
        .rsplit_once("::")
        .map_or(handler_id, |(_, pattern)| pattern)
}

fn matches_any(patterns: &[String], handler_id: &str) -> bool {
    let key = policy_key(handler_id);
    patterns.iter().any(|p| matches_pattern(p, key))
}

/// 计算处理器的实际超时
///
/// # Arguments
///
/// * `config` - 守卫配置
/// * `phase` - 当前阶段
/// * `handler_id` - 处理器 ID
/// * `requested_ms` - 调用方请求的超时，`None` 或 0 时使用默认值，超过上限时截断
///
/// # Returns
///
/// `None` 表示不设超时。
pub fn effective_timeout(
    config: &GuardConfig,
    phase: ExecutionPhase,
    handler_id: &str,
    requested_ms: Option<u64>,
) -> Option<Duration> {
    match phase {
        ExecutionPhase::Initialization if matches_any(&config.system_patterns, handler_id) => None,
        ExecutionPhase::Runtime if matches_any(&config.lifecycle_patterns, handler_id) => {
            Some(Duration::from_millis(config.lifecycle_timeout_ms))
        }
        _ => {
            let ms = requested_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(config.default_timeout_ms)
                .min(config.max_timeout_ms);
            Some(Duration::from_millis(ms))
        }
    }
}
