//! 模块健康检查
//!
//! 每个激活的模块有独立的定时检查任务；注册表另有一个全局监控任务，
//! 对超过 `间隔 × overdue_factor` 仍未检查的激活模块强制补做一次检查。

use std::sync::{PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::lifecycle::{call_hook, HookOutcome, RegistryEvent};
use super::metadata::{ModuleHealth, ModuleState};
use super::registry::{ModuleRegistry, RegistryInner};
use crate::utils::{CoreError, Result};

impl ModuleRegistry {
    /// 立即检查单个模块的健康状态
    ///
    /// 激活状态的模块调用其健康检查钩子（受 `health_check_timeout_ms` 约束），
    /// 钩子失败或超时记为 `Error`。未激活的模块记为 `Inactive`，
    /// 其余状态返回当前记录的健康信息。
    pub async fn check_module_health(&self, module_id: &str) -> Result<ModuleHealth> {
        self.run_health_check(module_id)
            .await
            .ok_or_else(|| CoreError::ModuleNotFound(module_id.to_string()))
    }

    /// 立即检查所有激活模块的健康状态
    pub async fn check_all_health(&self) -> Vec<(String, ModuleHealth)> {
        let mut results = Vec::new();
        for module_id in self.get_active_modules().await {
            if let Some(health) = self.run_health_check(&module_id).await {
                results.push((module_id, health));
            }
        }
        results
    }

    pub(super) async fn run_health_check(&self, module_id: &str) -> Option<ModuleHealth> {
        let (state, hooks, current) = {
            let modules = self.inner.modules.read().await;
            let module = modules.get(module_id)?;
            (
                module.state,
                module.descriptor.hooks.clone(),
                module.health.clone(),
            )
        };

        let health = match state {
            ModuleState::Active => {
                let timeout_ms = self.inner.config.health_check_timeout_ms;
                match call_hook(Some(timeout_ms), hooks.health_check()).await {
                    HookOutcome::Completed(health) => health,
                    HookOutcome::Failed(e) => {
                        warn!(module_id = %module_id, error = %e, "健康检查失败");
                        ModuleHealth::error(e.to_string())
                    }
                    HookOutcome::TimedOut(ms) => {
                        warn!(module_id = %module_id, timeout_ms = ms, "健康检查超时");
                        ModuleHealth::error(format!("健康检查超时 ({}ms)", ms))
                    }
                }
            }
            ModuleState::Inactive => ModuleHealth::inactive(),
            _ => return Some(current),
        };

        self.apply_health(module_id, health.clone()).await;
        Some(health)
    }

    /// 记录健康信息，状态变化时发出通知
    pub(super) async fn apply_health(&self, module_id: &str, health: ModuleHealth) {
        let previous = {
            let mut modules = self.inner.modules.write().await;
            let Some(module) = modules.get_mut(module_id) else {
                return;
            };
            let previous = module.health.status;
            module.last_health_check = Some(Instant::now());
            module.health = health.clone();
            previous
        };

        if previous != health.status {
            debug!(
                module_id = %module_id,
                previous = ?previous,
                current = ?health.status,
                "模块健康状态变化"
            );
            self.emit(RegistryEvent::ModuleHealthChanged {
                module_id: module_id.to_string(),
                previous,
                current: health.status,
            });
        }
    }

    // ==================== 全局监控 ====================

    /// 启动全局健康监控
    ///
    /// 已在运行或不在 tokio 运行时内时不做任何事，返回是否新启动了监控。
    pub fn start_health_monitor(&self) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("不在 tokio 运行时内，跳过健康监控");
            return false;
        }

        let mut monitor = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if monitor.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let period = Duration::from_millis(self.inner.config.health_check_interval_ms.max(1));
        spawn_monitor(std::sync::Arc::downgrade(&self.inner), period, token.clone());
        *monitor = Some(token);
        info!(interval_ms = period.as_millis() as u64, "健康监控已启动");
        true
    }

    /// 停止全局健康监控
    pub fn stop_health_monitor(&self) {
        let token = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
            info!("健康监控已停止");
        }
    }

    /// 全局健康监控是否运行中
    pub fn is_health_monitor_running(&self) -> bool {
        self.inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 强制检查超期未检查的激活模块，返回被检查的模块
    async fn check_overdue(&self) -> Vec<String> {
        let overdue: Vec<String> = {
            let factor = self.inner.config.overdue_factor.max(1);
            let modules = self.inner.modules.read().await;
            modules
                .iter()
                .filter(|(_, m)| m.state == ModuleState::Active)
                .filter(|(_, m)| {
                    let limit = m.health_interval(self.inner.default_health_interval_ms) * factor;
                    m.last_health_check.map_or(true, |at| at.elapsed() > limit)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for module_id in &overdue {
            warn!(module_id = %module_id, "健康检查超期，强制检查");
            self.run_health_check(module_id).await;
        }
        overdue
    }
}

fn upgrade(inner: &Weak<RegistryInner>) -> Option<ModuleRegistry> {
    inner.upgrade().map(|inner| ModuleRegistry { inner })
}

/// 启动模块的定时健康检查，令牌取消或注册表释放后退出
pub(super) fn spawn_module_timer(
    inner: Weak<RegistryInner>,
    module_id: String,
    period: Duration,
    token: CancellationToken,
) {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(registry) = upgrade(&inner) else { break };
                    if registry.run_health_check(&module_id).await.is_none() {
                        break;
                    }
                }
            }
        }
        debug!(module_id = %module_id, "模块健康检查任务退出");
    });
}

fn spawn_monitor(inner: Weak<RegistryInner>, period: Duration, token: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(registry) = upgrade(&inner) else { break };
                    registry.check_overdue().await;
                }
            }
        }
        debug!("健康监控任务退出");
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::bus::LocalEventBus;
    use crate::core::config::{EventBusConfig, GuardConfig, RegistryConfig};
    use crate::guard::HandlerGuard;
    use crate::module::lifecycle::RegistryEventKind;
    use crate::module::metadata::{HealthStatus, ModuleDescriptor, ModuleHooks, ModuleOptions};

    #[derive(Default)]
    struct Probe {
        checks: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ModuleHooks for Probe {
        async fn health_check(&self) -> anyhow::Result<ModuleHealth> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("database unreachable");
            }
            Ok(ModuleHealth::healthy())
        }
    }

    struct Stuck;

    #[async_trait]
    impl ModuleHooks for Stuck {
        async fn health_check(&self) -> anyhow::Result<ModuleHealth> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ModuleHealth::healthy())
        }
    }

    fn registry(config: RegistryConfig) -> ModuleRegistry {
        let bus = LocalEventBus::new(
            EventBusConfig::default(),
            HandlerGuard::new(GuardConfig::default()),
        );
        ModuleRegistry::new(Arc::new(bus), config)
    }

    #[tokio::test]
    async fn test_failed_check_reports_error_and_notifies() {
        let registry = registry(RegistryConfig::default());
        let probe = Arc::new(Probe::default());
        registry
            .register_module(ModuleDescriptor::new("tables", "Tables", "1.0.0", probe.clone()))
            .await
            .unwrap();

        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        registry.on(RegistryEventKind::ModuleHealthChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        probe.failing.store(true, Ordering::SeqCst);
        let health = registry.check_module_health("tables").await.unwrap();
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.message.as_deref(), Some("database unreachable"));
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        // 状态未变不再通知
        registry.check_module_health("tables").await.unwrap();
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        // 激活状态不受健康状态影响
        let info = registry.get_module_info("tables").await.unwrap();
        assert_eq!(info.state, ModuleState::Active);
    }

    #[tokio::test]
    async fn test_check_times_out() {
        let config = RegistryConfig {
            health_check_timeout_ms: 30,
            ..Default::default()
        };
        let registry = registry(config);
        // 激活时的首次检查同样会超时，但不影响激活
        registry
            .register_module(ModuleDescriptor::new("stuck", "Stuck", "1.0.0", Arc::new(Stuck)))
            .await
            .unwrap();

        let health = registry.check_module_health("stuck").await.unwrap();
        assert_eq!(health.status, HealthStatus::Error);
        assert!(health.message.unwrap().contains("30"));
    }

    #[tokio::test]
    async fn test_periodic_check_runs() {
        let registry = registry(RegistryConfig::default());
        let probe = Arc::new(Probe::default());
        let desc = ModuleDescriptor::new("kitchen", "Kitchen", "1.0.0", probe.clone())
            .with_options(ModuleOptions {
                health_check_interval_ms: Some(20),
                ..Default::default()
            });
        registry.register_module(desc).await.unwrap();

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(probe.checks.load(Ordering::SeqCst) >= 3);

        registry.deactivate_module("kitchen").await.unwrap();
        let after = probe.checks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(probe.checks.load(Ordering::SeqCst), after);

        let health = registry.check_module_health("kitchen").await.unwrap();
        assert_eq!(health.status, HealthStatus::Inactive);
    }

    async fn mark_stale(registry: &ModuleRegistry, module_id: &str, age: Duration) {
        let mut modules = registry.inner.modules.write().await;
        let module = modules.get_mut(module_id).unwrap();
        module.last_health_check = Instant::now().checked_sub(age);
    }

    #[tokio::test]
    async fn test_overdue_module_is_checked() {
        let registry = registry(RegistryConfig::default());
        let probe = Arc::new(Probe::default());
        let desc = ModuleDescriptor::new("cashier", "Cashier", "1.0.0", probe.clone())
            .with_options(ModuleOptions {
                health_check_interval_ms: Some(1_000),
                ..Default::default()
            });
        registry.register_module(desc).await.unwrap();
        registry
            .register_module(ModuleDescriptor::new(
                "tables",
                "Tables",
                "1.0.0",
                Arc::new(Probe::default()),
            ))
            .await
            .unwrap();
        let before = probe.checks.load(Ordering::SeqCst);

        // 刚检查过的模块不算超期
        assert!(registry.check_overdue().await.is_empty());

        mark_stale(&registry, "cashier", Duration::from_secs(5)).await;
        assert_eq!(registry.check_overdue().await, vec!["cashier".to_string()]);
        assert_eq!(probe.checks.load(Ordering::SeqCst), before + 1);
        assert!(registry.check_overdue().await.is_empty());
    }

    #[tokio::test]
    async fn test_monitor_forces_overdue_check() {
        let config = RegistryConfig {
            health_check_interval_ms: 20,
            ..Default::default()
        };
        let registry = registry(config);
        let probe = Arc::new(Probe::default());
        let desc = ModuleDescriptor::new("cashier", "Cashier", "1.0.0", probe.clone())
            .with_options(ModuleOptions {
                health_check_interval_ms: Some(1_000),
                ..Default::default()
            });
        registry.register_module(desc).await.unwrap();
        let before = probe.checks.load(Ordering::SeqCst);

        mark_stale(&registry, "cashier", Duration::from_secs(5)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(probe.checks.load(Ordering::SeqCst), before + 1);
        let modules = registry.inner.modules.read().await;
        let last = modules.get("cashier").unwrap().last_health_check.unwrap();
        assert!(last.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_monitor_start_stop() {
        let registry = registry(RegistryConfig::default());
        assert!(registry.is_health_monitor_running());
        assert!(!registry.start_health_monitor());

        registry.stop_health_monitor();
        assert!(!registry.is_health_monitor_running());
        assert!(registry.start_health_monitor());
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let registry = registry(RegistryConfig::default());
        assert!(matches!(
            registry.check_module_health("ghost").await,
            Err(CoreError::ModuleNotFound(_))
        ));
    }
}
