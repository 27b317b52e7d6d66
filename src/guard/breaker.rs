//! 熔断表
//!
//! 每个处于熔断状态的处理器对应一个取消令牌，令牌控制该处理器的自动恢复任务。
//! 熔断记录与自动恢复任务同增同删。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

struct TrippedEntry {
    reset_token: CancellationToken,
    generation: u64,
}

/// 熔断登记
pub(crate) struct Trip {
    pub reset_token: CancellationToken,
    pub generation: u64,
}

#[derive(Default)]
pub(crate) struct CircuitBreakerTable {
    tripped: Mutex<HashMap<String, TrippedEntry>>,
    next_generation: AtomicU64,
}

impl CircuitBreakerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, TrippedEntry>> {
        self.tripped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self, handler_id: &str) -> bool {
        self.entries().contains_key(handler_id)
    }

    /// 登记熔断，已处于熔断状态时返回 `None`
    pub fn trip(&self, handler_id: &str) -> Option<Trip> {
        let mut entries = self.entries();
        if entries.contains_key(handler_id) {
            return None;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let reset_token = CancellationToken::new();
        entries.insert(
            handler_id.to_string(),
            TrippedEntry {
                reset_token: reset_token.clone(),
                generation,
            },
        );
        Some(Trip {
            reset_token,
            generation,
        })
    }

    /// 解除熔断并取消自动恢复任务，返回之前是否处于熔断状态
    pub fn clear(&self, handler_id: &str) -> bool {
        match self.entries().remove(handler_id) {
            Some(entry) => {
                entry.reset_token.cancel();
                true
            }
            None => false,
        }
    }

    /// 仅当熔断记录仍属于指定代次时解除（供自动恢复任务使用）
    pub fn clear_generation(&self, handler_id: &str, generation: u64) -> bool {
        let mut entries = self.entries();
        if entries.get(handler_id).map(|e| e.generation) != Some(generation) {
            return false;
        }
        entries.remove(handler_id);
        true
    }

    pub fn open_count(&self) -> usize {
        self.entries().len()
    }

    /// 清空全部熔断记录并取消所有自动恢复任务
    pub fn clear_all(&self) {
        for (_, entry) in self.entries().drain() {
            entry.reset_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_and_clear() {
        let table = CircuitBreakerTable::new();
        let trip = table.trip("h1").unwrap();
        assert!(table.is_open("h1"));
        assert!(table.trip("h1").is_none());

        assert!(table.clear("h1"));
        assert!(trip.reset_token.is_cancelled());
        assert!(!table.is_open("h1"));
        assert!(!table.clear("h1"));
    }

    #[test]
    fn test_stale_generation_ignored() {
        let table = CircuitBreakerTable::new();
        let first = table.trip("h1").unwrap();
        table.clear("h1");
        let second = table.trip("h1").unwrap();

        assert!(!table.clear_generation("h1", first.generation));
        assert!(table.is_open("h1"));
        assert!(table.clear_generation("h1", second.generation));
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn test_clear_all_cancels_tokens() {
        let table = CircuitBreakerTable::new();
        let a = table.trip("a").unwrap();
        let b = table.trip("b").unwrap();
        table.clear_all();

        assert!(a.reset_token.is_cancelled());
        assert!(b.reset_token.is_cancelled());
        assert_eq!(table.open_count(), 0);
    }
}
