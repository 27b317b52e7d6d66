//! 生命周期通知与钩子调用
//!
//! 注册表级生命周期通知的订阅表（on / off），以及带超时的钩子调用。

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error};

use super::metadata::HealthStatus;

// ============================================================================
// 生命周期通知
// ============================================================================

/// 生命周期通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistryEventKind {
    ModuleRegistered,
    ModuleActivated,
    ModuleDeactivated,
    ModuleActivationFailed,
    ModuleDeactivationFailed,
    ModuleHealthChanged,
    ModuleUnregistered,
    RegistryShutdown,
}

/// 生命周期通知
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    ModuleRegistered {
        module_id: String,
    },
    ModuleActivated {
        module_id: String,
    },
    ModuleDeactivated {
        module_id: String,
    },
    ModuleActivationFailed {
        module_id: String,
        error: String,
    },
    ModuleDeactivationFailed {
        module_id: String,
        error: String,
    },
    ModuleHealthChanged {
        module_id: String,
        previous: HealthStatus,
        current: HealthStatus,
    },
    ModuleUnregistered {
        module_id: String,
    },
    RegistryShutdown,
}

impl RegistryEvent {
    /// 通知类型
    pub fn kind(&self) -> RegistryEventKind {
        match self {
            RegistryEvent::ModuleRegistered { .. } => RegistryEventKind::ModuleRegistered,
            RegistryEvent::ModuleActivated { .. } => RegistryEventKind::ModuleActivated,
            RegistryEvent::ModuleDeactivated { .. } => RegistryEventKind::ModuleDeactivated,
            RegistryEvent::ModuleActivationFailed { .. } => {
                RegistryEventKind::ModuleActivationFailed
            }
            RegistryEvent::ModuleDeactivationFailed { .. } => {
                RegistryEventKind::ModuleDeactivationFailed
            }
            RegistryEvent::ModuleHealthChanged { .. } => RegistryEventKind::ModuleHealthChanged,
            RegistryEvent::ModuleUnregistered { .. } => RegistryEventKind::ModuleUnregistered,
            RegistryEvent::RegistryShutdown => RegistryEventKind::RegistryShutdown,
        }
    }

    /// 关联的模块 ID
    pub fn module_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::ModuleRegistered { module_id }
            | RegistryEvent::ModuleActivated { module_id }
            | RegistryEvent::ModuleDeactivated { module_id }
            | RegistryEvent::ModuleActivationFailed { module_id, .. }
            | RegistryEvent::ModuleDeactivationFailed { module_id, .. }
            | RegistryEvent::ModuleHealthChanged { module_id, .. }
            | RegistryEvent::ModuleUnregistered { module_id } => Some(module_id.as_str()),
            RegistryEvent::RegistryShutdown => None,
        }
    }
}

/// 生命周期通知监听器
pub type RegistryListener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// 监听器 ID，用于取消监听
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// 监听器表
#[derive(Default)]
pub(crate) struct ListenerTable {
    listeners: RwLock<Vec<(ListenerId, RegistryEventKind, RegistryListener)>>,
    next_id: AtomicU64,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: RegistryEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: RegistryListener = Arc::new(listener);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, kind, listener));
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    /// 同步通知所有匹配的监听器，单个监听器 panic 不影响其他监听器
    pub fn emit(&self, event: &RegistryEvent) {
        let kind = event.kind();
        let matching: Vec<RegistryListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| l.clone())
            .collect();

        debug!(kind = ?kind, listeners = matching.len(), "发送生命周期通知");
        for listener in matching {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(kind = ?kind, "生命周期监听器 panic");
            }
        }
    }
}

// ============================================================================
// 钩子调用
// ============================================================================

/// 钩子调用结果
#[derive(Debug)]
pub(crate) enum HookOutcome<T> {
    Completed(T),
    Failed(anyhow::Error),
    TimedOut(u64),
}

/// 调用钩子，`timeout_ms` 为 `None` 时不限时
pub(crate) async fn call_hook<T, F>(timeout_ms: Option<u64>, hook: F) -> HookOutcome<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let result = match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), hook).await {
            Ok(result) => result,
            Err(_) => return HookOutcome::TimedOut(ms),
        },
        None => hook.await,
    };

    match result {
        Ok(value) => HookOutcome::Completed(value),
        Err(e) => HookOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_event_kind_and_module_id() {
        let event = RegistryEvent::ModuleHealthChanged {
            module_id: "kitchen".to_string(),
            previous: HealthStatus::Healthy,
            current: HealthStatus::Error,
        };
        assert_eq!(event.kind(), RegistryEventKind::ModuleHealthChanged);
        assert_eq!(event.module_id(), Some("kitchen"));
        assert_eq!(RegistryEvent::RegistryShutdown.module_id(), None);
    }

    #[test]
    fn test_listener_on_off() {
        let table = ListenerTable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = table.on(RegistryEventKind::ModuleActivated, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let activated = RegistryEvent::ModuleActivated {
            module_id: "a".to_string(),
        };
        table.emit(&activated);
        table.emit(&RegistryEvent::RegistryShutdown);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(table.off(id));
        assert!(!table.off(id));
        table.emit(&activated);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_isolated() {
        let table = ListenerTable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        table.on(RegistryEventKind::RegistryShutdown, |_| panic!("listener bug"));
        table.on(RegistryEventKind::RegistryShutdown, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        table.emit(&RegistryEvent::RegistryShutdown);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_call_hook_outcomes() {
        let ok = call_hook(Some(100), async { Ok(5) }).await;
        assert!(matches!(ok, HookOutcome::Completed(5)));

        let failed: HookOutcome<()> = call_hook(None, async { Err(anyhow::anyhow!("nope")) }).await;
        assert!(matches!(failed, HookOutcome::Failed(_)));

        let slow: HookOutcome<()> = call_hook(Some(20), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, HookOutcome::TimedOut(20)));
    }
}
