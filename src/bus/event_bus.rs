//! 事件总线
//!
//! `EventBus` 是注册表依赖的事件传输接口；`LocalEventBus` 是进程内实现，
//! 每次分发都经过执行守卫，单个订阅者的异常、超时或熔断不影响其他订阅者。
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use module_kernel::bus::{Event, EventBus, EventSubscription, LocalEventBus};
//! use module_kernel::core::config::{EventBusConfig, GuardConfig};
//! use module_kernel::guard::HandlerGuard;
//!
//! # async fn demo() -> module_kernel::Result<()> {
//! let bus = LocalEventBus::new(EventBusConfig::default(), HandlerGuard::new(GuardConfig::default()));
//!
//! let handle = bus
//!     .subscribe(
//!         "kitchen",
//!         EventSubscription::new("order.*", |event| async move {
//!             tracing::info!(event_type = %event.event_type, "收到订单事件");
//!             Ok(())
//!         }),
//!     )
//!     .await?;
//!
//! bus.publish(Event::new("order.created", "sales", serde_json::json!({"table": 4}))).await?;
//! handle.unsubscribe().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::FutureExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use crate::bus::event::{Event, EventHandler, EventSubscription, SubscriptionHandle};
use crate::core::config::EventBusConfig;
use crate::guard::{matches_pattern, HandlerGuard};
use crate::utils::{generate_id, CoreError, Result};

/// 事件传输接口
#[async_trait]
pub trait EventBus: Send + Sync {
    /// 总线配置
    fn config(&self) -> EventBusConfig;

    /// 为订阅者登记一个订阅，返回携带取消回调的句柄
    async fn subscribe(
        &self,
        subscriber_id: &str,
        subscription: EventSubscription,
    ) -> Result<SubscriptionHandle>;

    /// 发布事件并等待全部匹配的处理器结束
    async fn publish(&self, event: Event) -> Result<DispatchSummary>;
}

/// 单次发布的分发结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// 匹配的订阅数
    pub matched: usize,
    /// 成功处理数
    pub successful: usize,
    /// 失败数（含超时，不含熔断拒绝）
    pub failed: usize,
    /// 超时数
    pub timed_out: usize,
    /// 因熔断被拒绝的数量
    pub rejected: usize,
}

/// 累计分发统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchStats {
    /// 发布的事件总数
    pub total_published: u64,
    /// 处理器调用总数
    pub total_dispatched: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub rejected: u64,
    /// 最后分发时间
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct SubscriptionEntry {
    subscription_id: String,
    subscriber_id: String,
    event_type: String,
    handler_id: String,
    handler: EventHandler,
}

struct BusInner {
    config: EventBusConfig,
    guard: HandlerGuard,
    // 按订阅顺序保存
    subscriptions: RwLock<Vec<SubscriptionEntry>>,
    stats: RwLock<DispatchStats>,
}

/// 进程内事件总线
#[derive(Clone)]
pub struct LocalEventBus {
    inner: Arc<BusInner>,
}

impl LocalEventBus {
    /// 创建事件总线
    pub fn new(config: EventBusConfig, guard: HandlerGuard) -> Self {
        info!(
            handler_timeout_ms = ?config.handler_timeout_ms,
            "创建事件总线"
        );
        Self {
            inner: Arc::new(BusInner {
                config,
                guard,
                subscriptions: RwLock::new(Vec::new()),
                stats: RwLock::new(DispatchStats::default()),
            }),
        }
    }

    /// 分发所用的执行守卫
    pub fn guard(&self) -> &HandlerGuard {
        &self.inner.guard
    }

    /// 取消订阅
    ///
    /// # Errors
    ///
    /// 订阅不存在时返回 `CoreError::SubscriptionNotFound`
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        Self::remove_subscription(&self.inner, subscription_id).await
    }

    async fn remove_subscription(inner: &BusInner, subscription_id: &str) -> Result<()> {
        let mut subscriptions = inner.subscriptions.write().await;
        let position = subscriptions
            .iter()
            .position(|s| s.subscription_id == subscription_id)
            .ok_or_else(|| CoreError::SubscriptionNotFound(subscription_id.to_string()))?;
        let entry = subscriptions.remove(position);

        debug!(
            subscription_id = %subscription_id,
            subscriber_id = %entry.subscriber_id,
            event_type = %entry.event_type,
            "取消订阅成功"
        );
        Ok(())
    }

    /// 取消订阅者的全部订阅，返回取消数量
    pub async fn unsubscribe_all(&self, subscriber_id: &str) -> usize {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.subscriber_id != subscriber_id);
        let removed = before - subscriptions.len();

        info!(subscriber_id = %subscriber_id, removed, "取消订阅者全部订阅");
        removed
    }

    /// 当前订阅总数
    pub async fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().await.len()
    }

    /// 指定订阅者的订阅事件类型
    pub async fn subscriptions_of(&self, subscriber_id: &str) -> Vec<String> {
        self.inner
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.subscriber_id == subscriber_id)
            .map(|s| s.event_type.clone())
            .collect()
    }

    /// 累计分发统计
    pub async fn stats(&self) -> DispatchStats {
        self.inner.stats.read().await.clone()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    fn config(&self) -> EventBusConfig {
        self.inner.config.clone()
    }

    async fn subscribe(
        &self,
        subscriber_id: &str,
        subscription: EventSubscription,
    ) -> Result<SubscriptionHandle> {
        if subscriber_id.is_empty() || subscription.event_type.is_empty() {
            return Err(CoreError::SubscriptionFailed {
                subscriber_id: subscriber_id.to_string(),
                event_type: subscription.event_type,
                reason: "订阅者 ID 和事件类型不能为空".to_string(),
            });
        }

        let handler_id = subscription
            .handler_id
            .unwrap_or_else(|| format!("{}::{}", subscriber_id, subscription.event_type));
        let entry = SubscriptionEntry {
            subscription_id: generate_id(),
            subscriber_id: subscriber_id.to_string(),
            event_type: subscription.event_type,
            handler_id,
            handler: subscription.handler,
        };

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        let subscription_id = entry.subscription_id.clone();
        let handle = SubscriptionHandle::new(
            entry.subscription_id.clone(),
            entry.subscriber_id.clone(),
            entry.event_type.clone(),
            entry.handler_id.clone(),
            Box::new(move || {
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            LocalEventBus::remove_subscription(&inner, &subscription_id).await
                        }
                        // 总线已释放
                        None => Ok(()),
                    }
                }
                .boxed()
            }),
        );

        info!(
            subscription_id = %entry.subscription_id,
            subscriber_id = %entry.subscriber_id,
            event_type = %entry.event_type,
            "事件订阅成功"
        );
        self.inner.subscriptions.write().await.push(entry);

        Ok(handle)
    }

    async fn publish(&self, event: Event) -> Result<DispatchSummary> {
        let matching: Vec<SubscriptionEntry> = self
            .inner
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|s| matches_pattern(&s.event_type, &event.event_type))
            .cloned()
            .collect();

        if matching.is_empty() {
            trace!(event_type = %event.event_type, "没有匹配的订阅者");
            self.inner.stats.write().await.total_published += 1;
            return Ok(DispatchSummary::default());
        }

        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            subscribers = matching.len(),
            "分发事件"
        );

        let handlers: Vec<_> = matching
            .into_iter()
            .map(|entry| {
                let handler = entry.handler;
                (entry.handler_id, move |event: Event| handler(event))
            })
            .collect();
        let results = self
            .inner
            .guard
            .execute_concurrent(handlers, event, self.inner.config.handler_timeout_ms)
            .await;

        let mut summary = DispatchSummary {
            matched: results.len(),
            ..Default::default()
        };
        for result in &results {
            if result.success {
                summary.successful += 1;
            } else if result.circuit_breaker_triggered {
                summary.rejected += 1;
            } else {
                summary.failed += 1;
                if result.timed_out {
                    summary.timed_out += 1;
                }
            }
        }

        if summary.failed > 0 {
            warn!(
                failed = summary.failed,
                timed_out = summary.timed_out,
                "部分订阅者处理失败"
            );
        }

        let mut stats = self.inner.stats.write().await;
        stats.total_published += 1;
        stats.total_dispatched += summary.matched as u64;
        stats.successful += summary.successful as u64;
        stats.failed += summary.failed as u64;
        stats.timeouts += summary.timed_out as u64;
        stats.rejected += summary.rejected as u64;
        stats.last_dispatch_at = Some(Utc::now());

        Ok(summary)
    }
}
