//! 事件总线模块
//!
//! 模块间的发布-订阅通信，所有处理器调用都经过执行守卫。

pub mod event;
pub mod event_bus;

pub use event::{Event, EventHandler, EventSubscription, SubscriptionHandle, UnsubscribeFn};
pub use event_bus::{DispatchStats, DispatchSummary, EventBus, LocalEventBus};
