//! 处理器执行守卫
//!
//! 为每一次处理器调用提供超时保护、失败统计和按处理器 ID 的熔断。
//!
//! # 示例
//!
//! ```rust,no_run
//! use module_kernel::guard::HandlerGuard;
//! use module_kernel::core::config::GuardConfig;
//!
//! # async fn demo() {
//! let guard = HandlerGuard::new(GuardConfig::default());
//! let result = guard
//!     .execute(|n: u32| async move { Ok(n * 2) }, 21, "orders::double", None)
//!     .await;
//! assert_eq!(result.result, Some(42));
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinError;
use tracing::{debug, info, trace, warn};

use crate::core::config::{GuardConfig, GuardConfigUpdate};
use crate::guard::breaker::{CircuitBreakerTable, Trip};
use crate::guard::policy::{effective_timeout, ExecutionPhase, PhaseFlag};
use crate::guard::stats::{ExecutionResult, HandlerStats, SecurityStatus};
use crate::utils::{CoreError, Result};

struct GuardInner {
    config: RwLock<GuardConfig>,
    phase: PhaseFlag,
    stats: Mutex<HashMap<String, HandlerStats>>,
    breakers: CircuitBreakerTable,
}

impl GuardInner {
    fn config(&self) -> GuardConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stats(&self) -> MutexGuard<'_, HashMap<String, HandlerStats>> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset_failures(&self, handler_id: &str) {
        if let Some(stats) = self.stats().get_mut(handler_id) {
            stats.consecutive_failures = 0;
        }
    }
}

enum Outcome<T> {
    Finished(std::result::Result<anyhow::Result<T>, JoinError>),
    TimedOut(Duration),
}

/// 处理器执行守卫
///
/// 内部状态共享，克隆开销很小。统计与熔断状态按调用方提供的处理器 ID 归档，
/// 相同 ID 的不同处理器会合并统计。
#[derive(Clone)]
pub struct HandlerGuard {
    inner: Arc<GuardInner>,
}

impl HandlerGuard {
    /// 创建执行守卫（初始化阶段）
    pub fn new(config: GuardConfig) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                config: RwLock::new(config),
                phase: PhaseFlag::new(),
                stats: Mutex::new(HashMap::new()),
                breakers: CircuitBreakerTable::new(),
            }),
        }
    }

    /// 当前配置快照
    pub fn config(&self) -> GuardConfig {
        self.inner.config()
    }

    /// 部分更新配置
    ///
    /// # Errors
    ///
    /// 更新后的配置非法时返回错误，原配置保持不变。
    pub fn configure(&self, update: GuardConfigUpdate) -> Result<()> {
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut updated = config.clone();
        updated.apply(update);
        updated.validate()?;
        *config = updated;
        debug!("执行守卫配置已更新");
        Ok(())
    }

    /// 切换到运行阶段
    pub fn mark_initialization_complete(&self) {
        if self.inner.phase.mark_runtime() {
            info!("执行守卫进入运行阶段");
        }
    }

    /// 当前阶段
    pub fn phase(&self) -> ExecutionPhase {
        self.inner.phase.phase()
    }

    /// 受保护地执行一个处理器
    ///
    /// 处理器在独立任务中运行。超时后守卫停止等待并返回超时结果，
    /// 处理器任务不会被取消，会在后台继续运行直到结束。
    ///
    /// # Arguments
    ///
    /// * `handler` - 处理器
    /// * `context` - 原样传给处理器的上下文
    /// * `handler_id` - 统计与熔断所用的处理器 ID
    /// * `timeout_ms` - 请求超时，超过上限时截断
    pub async fn execute<C, F, Fut, T>(
        &self,
        handler: F,
        context: C,
        handler_id: &str,
        timeout_ms: Option<u64>,
    ) -> ExecutionResult<T>
    where
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if handler_id.trim().is_empty() {
            warn!("拒绝执行：处理器 ID 为空");
            return ExecutionResult::failed(
                CoreError::InvalidHandlerId(handler_id.to_string()).to_string(),
                0,
            );
        }

        if self.inner.breakers.is_open(handler_id) {
            debug!(handler_id, "处理器处于熔断状态，跳过执行");
            return ExecutionResult::rejected(handler_id);
        }

        let config = self.inner.config();
        let timeout = effective_timeout(&config, self.phase(), handler_id, timeout_ms);

        let start = Instant::now();
        let task = tokio::spawn(handler(context));
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => Outcome::Finished(joined),
                Err(_) => Outcome::TimedOut(limit),
            },
            None => Outcome::Finished(task.await),
        };
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        let result = match outcome {
            Outcome::Finished(Ok(Ok(value))) => ExecutionResult::succeeded(value, elapsed_ms),
            Outcome::Finished(Ok(Err(e))) => ExecutionResult::failed(format!("{:#}", e), elapsed_ms),
            Outcome::Finished(Err(e)) if e.is_panic() => {
                ExecutionResult::failed("处理器 panic", elapsed_ms)
            }
            Outcome::Finished(Err(e)) => {
                ExecutionResult::failed(format!("处理器任务失败: {}", e), elapsed_ms)
            }
            Outcome::TimedOut(limit) => {
                warn!(handler_id, timeout_ms = limit.as_millis() as u64, "处理器执行超时");
                ExecutionResult::timed_out(limit.as_millis() as u64, elapsed_ms)
            }
        };

        self.record(handler_id, &config, elapsed, &result);
        result
    }

    /// 并发执行多个处理器，结果顺序与输入一致
    ///
    /// 单个处理器的失败或超时不影响其他处理器。
    pub async fn execute_concurrent<C, F, Fut, T>(
        &self,
        handlers: Vec<(String, F)>,
        context: C,
        timeout_ms: Option<u64>,
    ) -> Vec<ExecutionResult<T>>
    where
        C: Clone,
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        trace!(count = handlers.len(), "并发执行处理器");
        let futures = handlers.into_iter().map(|(handler_id, handler)| {
            let context = context.clone();
            async move {
                self.execute(handler, context, &handler_id, timeout_ms)
                    .await
            }
        });
        join_all(futures).await
    }

    fn record<T>(
        &self,
        handler_id: &str,
        config: &GuardConfig,
        elapsed: Duration,
        result: &ExecutionResult<T>,
    ) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let should_trip = {
            let mut all = self.inner.stats();
            let stats = all.entry(handler_id.to_string()).or_default();
            stats.record(elapsed_ms, result.success, result.timed_out);

            !result.success
                && config.circuit_breaker_enabled
                && (stats.consecutive_failures >= config.failure_threshold
                    || (stats.total_executions >= config.error_rate_min_executions
                        && stats.error_rate() > config.error_rate_threshold))
        };

        if elapsed.as_millis() as u64 > config.slow_execution_warn_ms {
            warn!(
                handler_id,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = config.slow_execution_warn_ms,
                "处理器执行缓慢"
            );
        }

        if should_trip {
            if let Some(trip) = self.inner.breakers.trip(handler_id) {
                warn!(
                    handler_id,
                    reset_after_ms = config.circuit_reset_timeout_ms,
                    "处理器失败过多，已熔断"
                );
                Self::schedule_reset(
                    Arc::downgrade(&self.inner),
                    handler_id.to_string(),
                    trip,
                    Duration::from_millis(config.circuit_reset_timeout_ms),
                );
            }
        }
    }

    fn schedule_reset(inner: Weak<GuardInner>, handler_id: String, trip: Trip, after: Duration) {
        tokio::spawn(async move {
            tokio::select! {
                _ = trip.reset_token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if let Some(inner) = inner.upgrade() {
                        if inner.breakers.clear_generation(&handler_id, trip.generation) {
                            inner.reset_failures(&handler_id);
                            info!(handler_id = %handler_id, "熔断自动恢复");
                        }
                    }
                }
            }
        });
    }

    /// 手动解除熔断并清零连续失败计数（幂等）
    pub fn reset_circuit_breaker(&self, handler_id: &str) {
        if self.inner.breakers.clear(handler_id) {
            info!(handler_id, "熔断已手动解除");
        }
        self.inner.reset_failures(handler_id);
    }

    /// 处理器是否处于熔断状态
    pub fn is_circuit_open(&self, handler_id: &str) -> bool {
        self.inner.breakers.is_open(handler_id)
    }

    /// 获取处理器统计快照
    pub fn get_stats(&self, handler_id: &str) -> Option<HandlerStats> {
        self.inner.stats().get(handler_id).cloned()
    }

    /// 获取守卫整体状态
    pub fn get_security_status(&self) -> SecurityStatus {
        let stats = self.inner.stats();
        let executions: u64 = stats.values().map(|s| s.total_executions).sum();
        let weighted: f64 = stats
            .values()
            .map(|s| s.avg_execution_time_ms * s.total_executions as f64)
            .sum();

        SecurityStatus {
            total_handlers: stats.len(),
            open_breakers: self.inner.breakers.open_count(),
            handlers_with_timeouts: stats.values().filter(|s| s.timeouts > 0).count(),
            avg_execution_time_ms: if executions == 0 {
                0.0
            } else {
                weighted / executions as f64
            },
            initialization_complete: self.phase() == ExecutionPhase::Runtime,
        }
    }

    /// 清理最近一次执行早于 `max_age_ms` 之前的统计及其熔断状态
    ///
    /// `max_age_ms` 超出时间可表示范围时不清理任何记录。
    ///
    /// # Returns
    ///
    /// 被清理的处理器数量
    pub fn cleanup_old_stats(&self, max_age_ms: u64) -> usize {
        let cutoff = i64::try_from(max_age_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            debug!(max_age_ms, "清理时间超出范围，跳过清理");
            return 0;
        };
        let removed: Vec<String> = {
            let mut stats = self.inner.stats();
            let stale: Vec<String> = stats
                .iter()
                .filter(|(_, s)| s.last_execution_time.map_or(true, |t| t <= cutoff))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &stale {
                stats.remove(id);
            }
            stale
        };

        for id in &removed {
            self.inner.breakers.clear(id);
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "已清理过期处理器统计");
        }
        removed.len()
    }

    /// 完全重置：取消全部自动恢复任务，清空统计与熔断状态
    ///
    /// 阶段开关只切换一次，重置后仍保持当前阶段。
    pub fn destroy(&self) {
        self.inner.breakers.clear_all();
        self.inner.stats().clear();
        info!("执行守卫已重置");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_guard() -> HandlerGuard {
        let guard = HandlerGuard::new(GuardConfig {
            default_timeout_ms: 100,
            circuit_reset_timeout_ms: 60_000,
            ..Default::default()
        });
        guard.mark_initialization_complete();
        guard
    }

    async fn fail(_: ()) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("boom"))
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let guard = fast_guard();
        let result = guard
            .execute(|x: i32| async move { Ok(x + 1) }, 1, "h", None)
            .await;

        assert!(result.success);
        assert!(!result.timed_out);
        assert_eq!(result.result, Some(2));
        assert_eq!(guard.get_stats("h").unwrap().total_executions, 1);
    }

    #[tokio::test]
    async fn test_timeout_reports_elapsed() {
        let guard = fast_guard();
        let result = guard
            .execute(
                |_: ()| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                },
                (),
                "slow",
                Some(50),
            )
            .await;

        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.execution_time_ms >= 50);
        assert!(result.error.unwrap().contains("50"));

        let stats = guard.get_stats("slow").unwrap();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test]
    async fn test_panic_is_soft_failure() {
        let guard = fast_guard();
        let result = guard
            .execute(
                |fail: bool| async move {
                    if fail {
                        panic!("handler exploded");
                    }
                    Ok(())
                },
                true,
                "p",
                None,
            )
            .await;

        assert!(!result.success);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_empty_handler_id_rejected() {
        let guard = fast_guard();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = guard
            .execute(
                move |_: ()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                (),
                "  ",
                None,
            )
            .await;

        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(guard.get_security_status().total_handlers, 0);
    }

    #[tokio::test]
    async fn test_breaker_trips_after_three_failures() {
        let guard = fast_guard();
        for _ in 0..3 {
            let r = guard.execute(fail, (), "flaky", None).await;
            assert!(!r.circuit_breaker_triggered);
        }
        assert!(guard.is_circuit_open("flaky"));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let r = guard
            .execute(
                move |_: ()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                (),
                "flaky",
                None,
            )
            .await;
        assert!(r.circuit_breaker_triggered);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(guard.get_stats("flaky").unwrap().total_executions, 3);

        guard.reset_circuit_breaker("flaky");
        assert_eq!(guard.get_stats("flaky").unwrap().consecutive_failures, 0);
        let r = guard.execute(|_: ()| async { Ok(()) }, (), "flaky", None).await;
        assert!(r.success);
    }

    #[tokio::test]
    async fn test_breaker_disabled() {
        let guard = fast_guard();
        guard
            .configure(GuardConfigUpdate {
                circuit_breaker_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();

        for _ in 0..5 {
            guard.execute(fail, (), "h", None).await;
        }
        assert!(!guard.is_circuit_open("h"));
    }

    #[tokio::test]
    async fn test_error_rate_trips_breaker() {
        let guard = fast_guard();
        // 交替成功与失败，连续失败不会达到 3
        for i in 0..11 {
            if i % 3 == 0 {
                guard.execute(|_: ()| async { Ok(()) }, (), "rate", None).await;
            } else {
                guard.execute(fail, (), "rate", None).await;
            }
        }
        assert!(guard.is_circuit_open("rate"));
    }

    #[tokio::test]
    async fn test_auto_reset() {
        let guard = HandlerGuard::new(GuardConfig {
            circuit_reset_timeout_ms: 50,
            ..Default::default()
        });
        for _ in 0..3 {
            guard.execute(fail, (), "auto", None).await;
        }
        assert!(guard.is_circuit_open("auto"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!guard.is_circuit_open("auto"));
        assert_eq!(guard.get_stats("auto").unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_system_handler_unbounded_during_initialization() {
        let guard = HandlerGuard::new(GuardConfig {
            default_timeout_ms: 20,
            ..Default::default()
        });
        let result = guard
            .execute(
                |_: ()| async {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    Ok(())
                },
                (),
                "system.boot",
                None,
            )
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_cleanup_and_destroy() {
        let guard = fast_guard();
        for _ in 0..3 {
            guard.execute(fail, (), "a", None).await;
        }
        guard.execute(|_: ()| async { Ok(()) }, (), "b", None).await;

        assert_eq!(guard.cleanup_old_stats(60_000), 0);
        assert_eq!(guard.cleanup_old_stats(0), 2);
        let status = guard.get_security_status();
        assert_eq!(status.total_handlers, 0);
        assert_eq!(status.open_breakers, 0);

        guard.destroy();
        assert_eq!(guard.phase(), ExecutionPhase::Runtime);
    }

    #[tokio::test]
    async fn test_cleanup_with_huge_age_keeps_everything() {
        let guard = fast_guard();
        guard.execute(|_: ()| async { Ok(()) }, (), "fresh", None).await;

        assert_eq!(guard.cleanup_old_stats(u64::MAX), 0);
        assert_eq!(guard.cleanup_old_stats(10_000_000_000_000_000), 0);
        assert!(guard.get_stats("fresh").is_some());
    }
}
