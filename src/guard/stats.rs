//! 处理器执行统计与结果类型

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 单个处理器的执行统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandlerStats {
    /// 总执行次数（不含熔断拒绝）
    pub total_executions: u64,
    /// 超时次数
    pub timeouts: u64,
    /// 失败次数（含超时）
    pub errors: u64,
    /// 平均执行耗时（毫秒，滑动均值）
    pub avg_execution_time_ms: f64,
    /// 最近一次执行时间
    pub last_execution_time: Option<DateTime<Utc>>,
    /// 连续失败次数，成功一次即清零
    pub consecutive_failures: u32,
}

impl HandlerStats {
    /// 记录一次执行
    pub(crate) fn record(&mut self, elapsed_ms: f64, success: bool, timed_out: bool) {
        self.total_executions += 1;
        let n = self.total_executions as f64;
        self.avg_execution_time_ms += (elapsed_ms - self.avg_execution_time_ms) / n;
        self.last_execution_time = Some(Utc::now());

        if success {
            self.consecutive_failures = 0;
        } else {
            self.errors += 1;
            self.consecutive_failures += 1;
            if timed_out {
                self.timeouts += 1;
            }
        }
    }

    /// 错误率
    pub fn error_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_executions as f64
        }
    }
}

/// 单次受保护执行的结果
///
/// 处理器异常、超时和熔断拒绝都以结果形式返回，不会作为错误抛给调用方。
#[derive(Debug, Clone)]
pub struct ExecutionResult<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub timed_out: bool,
    pub circuit_breaker_triggered: bool,
}

impl<T> ExecutionResult<T> {
    pub(crate) fn succeeded(value: T, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(value),
            error: None,
            execution_time_ms,
            timed_out: false,
            circuit_breaker_triggered: false,
        }
    }

    pub(crate) fn failed(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            execution_time_ms,
            timed_out: false,
            circuit_breaker_triggered: false,
        }
    }

    pub(crate) fn timed_out(timeout_ms: u64, execution_time_ms: u64) -> Self {
        Self {
            timed_out: true,
            ..Self::failed(format!("处理器执行超时 ({} ms)", timeout_ms), execution_time_ms)
        }
    }

    pub(crate) fn rejected(handler_id: &str) -> Self {
        Self {
            circuit_breaker_triggered: true,
            ..Self::failed(format!("处理器 '{}' 已熔断", handler_id), 0)
        }
    }

    /// 转换为标准 Result
    pub fn into_result(self) -> std::result::Result<Option<T>, String> {
        if self.success {
            Ok(self.result)
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

/// 守卫整体状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SecurityStatus {
    /// 有统计记录的处理器数
    pub total_handlers: usize,
    /// 当前处于熔断状态的处理器数
    pub open_breakers: usize,
    /// 曾经超时过的处理器数
    pub handlers_with_timeouts: usize,
    /// 全部处理器的平均执行耗时（按执行次数加权）
    pub avg_execution_time_ms: f64,
    /// 是否已进入运行阶段
    pub initialization_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_running_mean() {
        let mut stats = HandlerStats::default();
        stats.record(10.0, true, false);
        stats.record(30.0, true, false);
        stats.record(50.0, true, false);

        assert_eq!(stats.total_executions, 3);
        assert!((stats.avg_execution_time_ms - 30.0).abs() < f64::EPSILON);
        assert!(stats.last_execution_time.is_some());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let mut stats = HandlerStats::default();
        stats.record(1.0, false, false);
        stats.record(1.0, false, true);
        assert_eq!(stats.consecutive_failures, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.timeouts, 1);

        stats.record(1.0, true, false);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.errors, 2);
        assert!((stats.error_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_result_constructors() {
        let r: ExecutionResult<()> = ExecutionResult::timed_out(50, 51);
        assert!(!r.success);
        assert!(r.timed_out);
        assert!(r.error.as_deref().is_some_and(|e| e.contains("50")));

        let r: ExecutionResult<()> = ExecutionResult::rejected("orders::*");
        assert!(r.circuit_breaker_triggered);
        assert_eq!(r.execution_time_ms, 0);

        let r = ExecutionResult::succeeded(7, 3);
        assert_eq!(r.into_result(), Ok(Some(7)));
    }
}
