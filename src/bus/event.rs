//! 事件系统数据结构
//!
//! 定义事件、订阅声明和订阅句柄。

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{generate_uuid, Result};

/// 事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识
    pub event_id: String,

    /// 事件类型（格式: category.name，如 order.created）
    pub event_type: String,

    /// 发送方模块 ID
    pub sender: String,

    /// 事件数据
    #[serde(default)]
    pub data: Value,

    /// 事件时间戳
    pub timestamp: DateTime<Utc>,

    /// 扩展元数据
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Event {
    /// 创建新事件
    pub fn new(event_type: impl Into<String>, sender: impl Into<String>, data: Value) -> Self {
        Self {
            event_id: generate_uuid(),
            event_type: event_type.into(),
            sender: sender.into(),
            data,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// 事件处理器
pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// 模块声明的事件订阅
///
/// 注册表不解析订阅内容，只在激活时交给事件总线登记。
#[derive(Clone)]
pub struct EventSubscription {
    /// 订阅的事件类型（支持 `*` 和 `prefix.*`）
    pub event_type: String,

    /// 自定义处理器 ID，未设置时由总线生成 `订阅者::事件类型`
    pub handler_id: Option<String>,

    /// 事件处理器
    pub handler: EventHandler,
}

impl EventSubscription {
    /// 创建订阅声明
    pub fn new<F, Fut>(event_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            event_type: event_type.into(),
            handler_id: None,
            handler: Arc::new(move |event| handler(event).boxed()),
        }
    }

    /// 指定处理器 ID
    pub fn with_handler_id(mut self, handler_id: impl Into<String>) -> Self {
        self.handler_id = Some(handler_id.into());
        self
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event_type", &self.event_type)
            .field("handler_id", &self.handler_id)
            .finish_non_exhaustive()
    }
}

/// 取消订阅回调
pub type UnsubscribeFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// 订阅句柄
///
/// 由事件总线在订阅成功时返回，持有取消订阅所需的回调。
pub struct SubscriptionHandle {
    pub subscription_id: String,
    pub subscriber_id: String,
    pub event_type: String,
    pub handler_id: String,
    unsubscribe: Option<UnsubscribeFn>,
}

impl SubscriptionHandle {
    pub fn new(
        subscription_id: impl Into<String>,
        subscriber_id: impl Into<String>,
        event_type: impl Into<String>,
        handler_id: impl Into<String>,
        unsubscribe: UnsubscribeFn,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            subscriber_id: subscriber_id.into(),
            event_type: event_type.into(),
            handler_id: handler_id.into(),
            unsubscribe: Some(unsubscribe),
        }
    }

    /// 取消订阅，回调只会执行一次
    pub async fn unsubscribe(mut self) -> Result<()> {
        match self.unsubscribe.take() {
            Some(callback) => callback().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("subscription_id", &self.subscription_id)
            .field("subscriber_id", &self.subscriber_id)
            .field("event_type", &self.event_type)
            .field("handler_id", &self.handler_id)
            .finish_non_exhaustive()
    }
}
