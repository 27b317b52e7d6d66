//! 模块注册表
//!
//! 管理所有已注册的模块：
//! - 注册时校验描述与依赖，更新依赖图并重新计算激活顺序
//! - 按依赖顺序递归激活 / 停用模块
//! - 登记和取消模块的事件订阅
//! - 健康检查与优雅关闭
//!
//! 注册、激活、停用预期由宿主顺序调用；内部等待模块钩子时不持有任何锁。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dependency::DependencyGraph;
use super::health;
use super::lifecycle::{
    call_hook, HookOutcome, ListenerId, ListenerTable, RegistryEvent, RegistryEventKind,
};
use super::metadata::{
    ModuleContext, ModuleDescriptor, ModuleHealth, ModuleInfo, ModuleState,
};
use crate::bus::{EventBus, EventSubscription, SubscriptionHandle};
use crate::core::config::RegistryConfig;
use crate::utils::{CoreError, Result};

/// 注册表持有的模块记录
pub(super) struct RegisteredModule {
    pub(super) descriptor: ModuleDescriptor,
    pub(super) state: ModuleState,
    pub(super) health: ModuleHealth,
    pub(super) subscriptions: Vec<SubscriptionHandle>,
    pub(super) registered_at: DateTime<Utc>,
    pub(super) activated_at: Option<DateTime<Utc>>,
    pub(super) last_health_check: Option<Instant>,
    pub(super) health_timer: Option<CancellationToken>,
}

impl RegisteredModule {
    fn new(descriptor: ModuleDescriptor) -> Self {
        Self {
            descriptor,
            state: ModuleState::Inactive,
            health: ModuleHealth::inactive(),
            subscriptions: Vec::new(),
            registered_at: Utc::now(),
            activated_at: None,
            last_health_check: None,
            health_timer: None,
        }
    }

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: self.descriptor.id.clone(),
            name: self.descriptor.name.clone(),
            version: self.descriptor.version.clone(),
            dependencies: self.descriptor.dependencies.clone(),
            state: self.state,
            health: self.health.clone(),
            subscriptions: self
                .subscriptions
                .iter()
                .map(|s| s.event_type.clone())
                .collect(),
            registered_at: self.registered_at,
            activated_at: self.activated_at,
        }
    }

    /// 模块的健康检查间隔
    pub(super) fn health_interval(&self, default_ms: u64) -> Duration {
        Duration::from_millis(
            self.descriptor
                .options
                .health_check_interval_ms
                .unwrap_or(default_ms),
        )
    }
}

pub(super) struct RegistryInner {
    pub(super) config: RegistryConfig,
    /// 模块默认健康检查间隔，构造时从事件总线配置读取
    pub(super) default_health_interval_ms: u64,
    pub(super) bus: Arc<dyn EventBus>,
    pub(super) modules: RwLock<HashMap<String, RegisteredModule>>,
    pub(super) graph: RwLock<DependencyGraph>,
    pub(super) activation_order: RwLock<Vec<String>>,
    pub(super) listeners: ListenerTable,
    pub(super) monitor: Mutex<Option<CancellationToken>>,
}

/// 优雅关闭结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// 成功停用的模块（按停用顺序）
    pub deactivated: Vec<String>,
    /// 停用失败的模块
    pub failed: Vec<String>,
    /// 总耗时（毫秒）
    pub elapsed_ms: u64,
}

/// 模块注册表
///
/// 内部状态共享，克隆后操作同一注册表。
#[derive(Clone)]
pub struct ModuleRegistry {
    pub(super) inner: Arc<RegistryInner>,
}

impl ModuleRegistry {
    /// 创建模块注册表
    ///
    /// 默认健康检查间隔取自事件总线配置。在 tokio 运行时内调用时会立即启动全局健康监控。
    pub fn new(bus: Arc<dyn EventBus>, config: RegistryConfig) -> Self {
        let bus_config = bus.config();
        info!(
            health_check_interval_ms = bus_config.health_check_interval_ms,
            graceful_shutdown_timeout_ms = config.graceful_shutdown_timeout_ms,
            "创建模块注册表"
        );

        let registry = Self {
            inner: Arc::new(RegistryInner {
                config,
                default_health_interval_ms: bus_config.health_check_interval_ms,
                bus,
                modules: RwLock::new(HashMap::new()),
                graph: RwLock::new(DependencyGraph::new()),
                activation_order: RwLock::new(Vec::new()),
                listeners: ListenerTable::new(),
                monitor: Mutex::new(None),
            }),
        };
        registry.start_health_monitor();
        registry
    }

    /// 注册表配置
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    // ==================== 生命周期通知 ====================

    /// 监听生命周期通知
    ///
    /// 监听器在发出通知的任务中同步调用，不应阻塞。
    pub fn on<F>(&self, kind: RegistryEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.on(kind, listener)
    }

    /// 取消监听，返回监听器是否存在
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.listeners.off(id)
    }

    pub(super) fn emit(&self, event: RegistryEvent) {
        self.inner.listeners.emit(&event);
    }

    // ==================== 注册 ====================

    /// 注册模块
    ///
    /// 声明的每个依赖都必须已经注册并处于激活状态。注册成功后立即激活该模块。
    ///
    /// # Errors
    ///
    /// - `InvalidDescriptor`：描述字段为空或依赖自身
    /// - `ModuleAlreadyExists`：ID 已注册，原注册不受影响
    /// - `DependencyMissing`：列出全部未注册或未激活的依赖
    /// - 激活失败时返回激活错误，模块保留在注册表中并处于 `Error` 状态
    pub async fn register_module(&self, descriptor: ModuleDescriptor) -> Result<()> {
        descriptor.validate().map_err(CoreError::InvalidDescriptor)?;

        let module_id = descriptor.id.clone();
        let dependencies = descriptor.dependencies.clone();
        {
            let mut modules = self.inner.modules.write().await;
            if modules.contains_key(&module_id) {
                return Err(CoreError::ModuleAlreadyExists(module_id));
            }

            let missing: Vec<String> = dependencies
                .iter()
                .filter(|dep| !modules.get(*dep).is_some_and(|m| m.state.is_active()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                warn!(module_id = %module_id, missing = ?missing, "依赖未注册或未激活，拒绝注册");
                return Err(CoreError::DependencyMissing { module_id, missing });
            }

            modules.insert(module_id.clone(), RegisteredModule::new(descriptor));
        }

        if let Err(e) = self.insert_into_graph(&module_id, &dependencies).await {
            self.inner.modules.write().await.remove(&module_id);
            return Err(e);
        }

        info!(module_id = %module_id, dependencies = ?dependencies, "模块已注册");
        self.emit(RegistryEvent::ModuleRegistered {
            module_id: module_id.clone(),
        });

        self.activate_module(&module_id).await
    }

    async fn insert_into_graph(&self, module_id: &str, dependencies: &[String]) -> Result<()> {
        let mut graph = self.inner.graph.write().await;
        graph.upsert(module_id, dependencies);
        match graph.topological_order() {
            Ok(order) => {
                debug!(order = ?order, "激活顺序已更新");
                *self.inner.activation_order.write().await = order;
                Ok(())
            }
            Err(e) => {
                graph.remove_module(module_id);
                Err(e)
            }
        }
    }

    /// 注销模块
    ///
    /// 仍被其他已注册模块依赖时拒绝注销；处于非 `Inactive` 状态时先停用。
    pub async fn unregister_module(&self, module_id: &str) -> Result<()> {
        let state = self.state_of(module_id).await?;

        let dependents: Vec<String> = {
            let modules = self.inner.modules.read().await;
            let graph = self.inner.graph.read().await;
            graph
                .dependents(module_id)
                .into_iter()
                .filter(|d| modules.contains_key(d))
                .collect()
        };
        if !dependents.is_empty() {
            return Err(CoreError::ModuleHasDependents {
                module: module_id.to_string(),
                dependents,
            });
        }

        if state != ModuleState::Inactive {
            self.deactivate_module(module_id).await?;
        }

        self.inner.modules.write().await.remove(module_id);
        {
            let mut graph = self.inner.graph.write().await;
            graph.remove_module(module_id);
            *self.inner.activation_order.write().await = graph.topological_order()?;
        }

        info!(module_id = %module_id, "模块已注销");
        self.emit(RegistryEvent::ModuleUnregistered {
            module_id: module_id.to_string(),
        });
        Ok(())
    }

    // ==================== 激活 ====================

    /// 激活模块
    ///
    /// 先递归激活尚未激活的依赖，再调用激活钩子、登记事件订阅并启动健康检查。
    /// 激活成功后尝试激活依赖已全部满足的依赖者，依赖者激活失败只记录日志。
    pub async fn activate_module(&self, module_id: &str) -> Result<()> {
        let mut path = Vec::new();
        self.activate_with_path(module_id, &mut path).await
    }

    fn activate_with_path<'a>(
        &'a self,
        module_id: &'a str,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let state = self.state_of(module_id).await?;
            if state == ModuleState::Active {
                debug!(module_id = %module_id, "模块已激活，跳过");
                return Ok(());
            }
            if path.iter().any(|id| id == module_id) {
                let mut cycle = path.clone();
                cycle.push(module_id.to_string());
                return Err(CoreError::CircularDependency(cycle.join(" -> ")));
            }
            if state.is_transitioning() {
                return Err(CoreError::Internal(format!(
                    "模块 '{}' 正处于 {} 状态",
                    module_id, state
                )));
            }

            info!(module_id = %module_id, "开始激活模块");
            self.set_state(module_id, ModuleState::Activating).await;

            path.push(module_id.to_string());
            let result = self.run_activation(module_id, path).await;
            path.pop();

            match result {
                Ok(()) => {
                    self.activate_ready_dependents(module_id).await;
                    Ok(())
                }
                Err(e) => {
                    error!(module_id = %module_id, error = %e, "模块激活失败");
                    self.record_failure(module_id, &e).await;
                    self.emit(RegistryEvent::ModuleActivationFailed {
                        module_id: module_id.to_string(),
                        error: e.to_string(),
                    });
                    Err(e)
                }
            }
        }
        .boxed()
    }

    async fn run_activation(&self, module_id: &str, path: &mut Vec<String>) -> Result<()> {
        let descriptor = self.descriptor_of(module_id).await?;

        for dep in &descriptor.dependencies {
            let dep_state = self.state_of(dep).await.map_err(|_| CoreError::DependencyMissing {
                module_id: module_id.to_string(),
                missing: vec![dep.clone()],
            })?;
            if !dep_state.is_active() {
                debug!(module_id = %module_id, dependency = %dep, "先激活依赖");
                self.activate_with_path(dep, path).await?;
            }
        }

        let missing = self.inactive_among(&descriptor.dependencies).await;
        if !missing.is_empty() {
            return Err(CoreError::DependencyMissing {
                module_id: module_id.to_string(),
                missing,
            });
        }

        let ctx = ModuleContext::new(module_id, self.inner.bus.clone());
        let timeout_ms = descriptor
            .options
            .activation_timeout_ms
            .or(self.inner.config.activation_timeout_ms);
        match call_hook(timeout_ms, descriptor.hooks.on_activate(ctx)).await {
            HookOutcome::Completed(()) => {}
            HookOutcome::Failed(source) => {
                return Err(CoreError::ModuleActivationFailed {
                    module_id: module_id.to_string(),
                    source,
                })
            }
            HookOutcome::TimedOut(timeout_ms) => {
                return Err(CoreError::HookTimeout {
                    module_id: module_id.to_string(),
                    hook: "on_activate",
                    timeout_ms,
                })
            }
        }

        let handles = self
            .subscribe_all(module_id, &descriptor.event_subscriptions)
            .await?;

        let timer = CancellationToken::new();
        let leftover = {
            let mut modules = self.inner.modules.write().await;
            match modules.get_mut(module_id) {
                Some(module) => {
                    let interval = module.health_interval(self.inner.default_health_interval_ms);
                    health::spawn_module_timer(
                        Arc::downgrade(&self.inner),
                        module_id.to_string(),
                        interval,
                        timer.clone(),
                    );
                    module.state = ModuleState::Active;
                    module.activated_at = Some(Utc::now());
                    module.subscriptions = handles;
                    module.health_timer = Some(timer);
                    None
                }
                None => Some(handles),
            }
        };
        if let Some(handles) = leftover {
            Self::unsubscribe_all(module_id, handles).await;
            return Err(CoreError::ModuleNotFound(module_id.to_string()));
        }

        self.run_health_check(module_id).await;

        info!(module_id = %module_id, "模块已激活");
        self.emit(RegistryEvent::ModuleActivated {
            module_id: module_id.to_string(),
        });
        Ok(())
    }

    async fn subscribe_all(
        &self,
        module_id: &str,
        subscriptions: &[EventSubscription],
    ) -> Result<Vec<SubscriptionHandle>> {
        let mut handles = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            match self.inner.bus.subscribe(module_id, subscription.clone()).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    Self::unsubscribe_all(module_id, handles).await;
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    async fn unsubscribe_all(module_id: &str, handles: Vec<SubscriptionHandle>) {
        for handle in handles {
            let subscription_id = handle.subscription_id.clone();
            if let Err(e) = handle.unsubscribe().await {
                warn!(
                    module_id = %module_id,
                    subscription_id = %subscription_id,
                    error = %e,
                    "取消订阅失败"
                );
            }
        }
    }

    /// 激活依赖已全部满足的未激活依赖者
    async fn activate_ready_dependents(&self, module_id: &str) {
        let dependents = self.inner.graph.read().await.dependents(module_id);
        for dependent in dependents {
            let ready = {
                let modules = self.inner.modules.read().await;
                modules.get(&dependent).is_some_and(|m| {
                    m.state == ModuleState::Inactive
                        && m.descriptor
                            .dependencies
                            .iter()
                            .all(|d| modules.get(d).is_some_and(|dm| dm.state.is_active()))
                })
            };
            if !ready {
                continue;
            }

            info!(module_id = %dependent, dependency = %module_id, "依赖已满足，自动激活依赖者");
            if let Err(e) = self.activate_module(&dependent).await {
                warn!(module_id = %dependent, error = %e, "自动激活依赖者失败");
            }
        }
    }

    // ==================== 停用 ====================

    /// 停用模块
    ///
    /// 先按激活顺序的逆序停用所有处于激活状态的依赖者，再停止健康检查、
    /// 取消事件订阅并在优雅停用超时内调用停用钩子。
    pub async fn deactivate_module(&self, module_id: &str) -> Result<()> {
        let fallback_timeout_ms = self.inner.config.graceful_shutdown_timeout_ms;
        self.deactivate_with_path(module_id, &mut Vec::new(), fallback_timeout_ms)
            .await
    }

    fn deactivate_with_path<'a>(
        &'a self,
        module_id: &'a str,
        path: &'a mut Vec<String>,
        fallback_timeout_ms: u64,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let state = self.state_of(module_id).await?;
            if state == ModuleState::Inactive {
                debug!(module_id = %module_id, "模块未激活，跳过");
                return Ok(());
            }
            if path.iter().any(|id| id == module_id) {
                return Ok(());
            }
            if state.is_transitioning() {
                return Err(CoreError::Internal(format!(
                    "模块 '{}' 正处于 {} 状态",
                    module_id, state
                )));
            }

            path.push(module_id.to_string());
            self.deactivate_dependents(module_id, path, fallback_timeout_ms)
                .await;
            let result = self.run_deactivation(module_id, fallback_timeout_ms).await;
            if result.is_ok() {
                // 停用期间新出现的依赖者
                self.deactivate_dependents(module_id, path, fallback_timeout_ms)
                    .await;
            }
            path.pop();

            if let Err(ref e) = result {
                error!(module_id = %module_id, error = %e, "模块停用失败");
                self.record_failure(module_id, e).await;
                self.emit(RegistryEvent::ModuleDeactivationFailed {
                    module_id: module_id.to_string(),
                    error: e.to_string(),
                });
            }
            result
        }
        .boxed()
    }

    async fn deactivate_dependents(
        &self,
        module_id: &str,
        path: &mut Vec<String>,
        fallback_timeout_ms: u64,
    ) {
        for dependent in self.active_dependents(module_id).await {
            info!(module_id = %dependent, dependency = %module_id, "先停用依赖者");
            if let Err(e) = self
                .deactivate_with_path(&dependent, path, fallback_timeout_ms)
                .await
            {
                warn!(module_id = %dependent, error = %e, "停用依赖者失败");
            }
        }
    }

    /// 处于激活状态的直接依赖者，最靠后激活的在前
    async fn active_dependents(&self, module_id: &str) -> Vec<String> {
        let dependents = self.inner.graph.read().await.dependents(module_id);
        let order = self.inner.activation_order.read().await.clone();
        let modules = self.inner.modules.read().await;

        let mut active: Vec<String> = dependents
            .into_iter()
            .filter(|d| modules.get(d).is_some_and(|m| m.state.is_active()))
            .collect();
        active.sort_by_key(|d| std::cmp::Reverse(order.iter().position(|id| id == d)));
        active
    }

    async fn run_deactivation(&self, module_id: &str, fallback_timeout_ms: u64) -> Result<()> {
        let (hooks, timeout_ms, handles, timer) = {
            let mut modules = self.inner.modules.write().await;
            let module = modules
                .get_mut(module_id)
                .ok_or_else(|| CoreError::ModuleNotFound(module_id.to_string()))?;
            module.state = ModuleState::Deactivating;
            (
                module.descriptor.hooks.clone(),
                module
                    .descriptor
                    .options
                    .graceful_shutdown_timeout_ms
                    .unwrap_or(fallback_timeout_ms),
                std::mem::take(&mut module.subscriptions),
                module.health_timer.take(),
            )
        };
        info!(module_id = %module_id, timeout_ms, "开始停用模块");

        if let Some(timer) = timer {
            timer.cancel();
        }
        Self::unsubscribe_all(module_id, handles).await;

        match call_hook(Some(timeout_ms), hooks.on_deactivate()).await {
            HookOutcome::Completed(()) => {}
            HookOutcome::Failed(source) => {
                return Err(CoreError::ModuleDeactivationFailed {
                    module_id: module_id.to_string(),
                    source,
                })
            }
            HookOutcome::TimedOut(timeout_ms) => {
                return Err(CoreError::HookTimeout {
                    module_id: module_id.to_string(),
                    hook: "on_deactivate",
                    timeout_ms,
                })
            }
        }

        if let Some(module) = self.inner.modules.write().await.get_mut(module_id) {
            module.state = ModuleState::Inactive;
            module.activated_at = None;
        }
        self.apply_health(module_id, ModuleHealth::inactive()).await;

        info!(module_id = %module_id, "模块已停用");
        self.emit(RegistryEvent::ModuleDeactivated {
            module_id: module_id.to_string(),
        });
        Ok(())
    }

    /// 重新激活模块（先停用再激活）
    pub async fn reactivate_module(&self, module_id: &str) -> Result<()> {
        info!(module_id = %module_id, "重新激活模块");
        self.deactivate_module(module_id).await?;
        self.activate_module(module_id).await
    }

    // ==================== 关闭 ====================

    /// 优雅关闭
    ///
    /// 停止全局健康监控，按激活顺序的逆序停用所有处于激活状态的模块。
    /// 单个模块停用失败只记录日志，不中断关闭流程。`timeout_ms` 约束每个模块的停用钩子
    /// （模块自身的覆盖值优先），不限制整个关闭流程的总耗时。
    pub async fn graceful_shutdown(&self, timeout_ms: u64) -> ShutdownReport {
        info!(timeout_ms, "开始优雅关闭注册表");
        let started = Instant::now();
        self.stop_health_monitor();

        let mut order = self.inner.activation_order.read().await.clone();
        order.reverse();

        let mut report = ShutdownReport::default();
        for module_id in order {
            if !self.state_of(&module_id).await.is_ok_and(|s| s.is_active()) {
                continue;
            }
            match self
                .deactivate_with_path(&module_id, &mut Vec::new(), timeout_ms)
                .await
            {
                Ok(()) => report.deactivated.push(module_id),
                Err(e) => {
                    error!(module_id = %module_id, error = %e, "关闭时停用模块失败");
                    report.failed.push(module_id);
                }
            }
        }

        let elapsed = started.elapsed();
        report.elapsed_ms = elapsed.as_millis() as u64;
        if elapsed > Duration::from_millis(timeout_ms) {
            warn!(
                elapsed_ms = report.elapsed_ms,
                timeout_ms, "优雅关闭总耗时超过请求的超时"
            );
        }

        info!(
            deactivated = report.deactivated.len(),
            failed = report.failed.len(),
            elapsed_ms = report.elapsed_ms,
            "注册表已关闭"
        );
        self.emit(RegistryEvent::RegistryShutdown);
        report
    }

    // ==================== 查询 ====================

    /// 获取健康信息
    ///
    /// `Some(id)` 返回单个模块，`None` 返回全部模块。
    pub async fn get_module_health(
        &self,
        module_id: Option<&str>,
    ) -> Result<HashMap<String, ModuleHealth>> {
        let modules = self.inner.modules.read().await;
        match module_id {
            Some(id) => {
                let module = modules
                    .get(id)
                    .ok_or_else(|| CoreError::ModuleNotFound(id.to_string()))?;
                Ok(HashMap::from([(id.to_string(), module.health.clone())]))
            }
            None => Ok(modules
                .iter()
                .map(|(id, m)| (id.clone(), m.health.clone()))
                .collect()),
        }
    }

    /// 已注册模块 ID（按注册顺序）
    pub async fn get_registered_modules(&self) -> Vec<String> {
        let modules = self.inner.modules.read().await;
        self.inner
            .graph
            .read()
            .await
            .modules()
            .iter()
            .filter(|id| modules.contains_key(*id))
            .cloned()
            .collect()
    }

    /// 获取模块信息快照
    pub async fn get_module_info(&self, module_id: &str) -> Option<ModuleInfo> {
        self.inner
            .modules
            .read()
            .await
            .get(module_id)
            .map(RegisteredModule::info)
    }

    /// 处于激活状态的模块（按激活顺序）
    pub async fn get_active_modules(&self) -> Vec<String> {
        self.get_modules_by_state(ModuleState::Active).await
    }

    /// 指定状态的模块（按激活顺序）
    pub async fn get_modules_by_state(&self, state: ModuleState) -> Vec<String> {
        let order = self.inner.activation_order.read().await.clone();
        let modules = self.inner.modules.read().await;
        order
            .into_iter()
            .filter(|id| modules.get(id).is_some_and(|m| m.state == state))
            .collect()
    }

    /// 全局激活顺序
    pub async fn get_activation_order(&self) -> Vec<String> {
        self.inner.activation_order.read().await.clone()
    }

    /// 已注册模块数量
    pub async fn module_count(&self) -> usize {
        self.inner.modules.read().await.len()
    }

    // ==================== 内部辅助 ====================

    pub(super) async fn state_of(&self, module_id: &str) -> Result<ModuleState> {
        self.inner
            .modules
            .read()
            .await
            .get(module_id)
            .map(|m| m.state)
            .ok_or_else(|| CoreError::ModuleNotFound(module_id.to_string()))
    }

    async fn descriptor_of(&self, module_id: &str) -> Result<ModuleDescriptor> {
        self.inner
            .modules
            .read()
            .await
            .get(module_id)
            .map(|m| m.descriptor.clone())
            .ok_or_else(|| CoreError::ModuleNotFound(module_id.to_string()))
    }

    async fn set_state(&self, module_id: &str, state: ModuleState) {
        if let Some(module) = self.inner.modules.write().await.get_mut(module_id) {
            debug!(module_id = %module_id, from = %module.state, to = %state, "模块状态变更");
            module.state = state;
        }
    }

    async fn inactive_among(&self, module_ids: &[String]) -> Vec<String> {
        let modules = self.inner.modules.read().await;
        module_ids
            .iter()
            .filter(|id| !modules.get(*id).is_some_and(|m| m.state.is_active()))
            .cloned()
            .collect()
    }

    async fn record_failure(&self, module_id: &str, error: &CoreError) {
        let timer = match self.inner.modules.write().await.get_mut(module_id) {
            Some(module) => {
                module.state = ModuleState::Error;
                module.health_timer.take()
            }
            None => return,
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        self.apply_health(module_id, ModuleHealth::error(error.to_string()))
            .await;
    }
}
