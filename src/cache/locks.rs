//! Per-key lock table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Unused locks are dropped once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 256;

/// Hands out one mutex per key. Holders of different keys never contend.
#[derive(Debug, Default)]
pub(super) struct LockTable {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if map.len() > PRUNE_THRESHOLD {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        map.entry(key.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_lock() {
        let table = LockTable::default();
        let a = table.get("a");
        let a2 = table.get("a");
        let b = table.get("b");
        assert!(Arc::ptr_eq(&a, &a2));
        assert!(!Arc::ptr_eq(&a, &b));

        let _held = a.lock().unwrap();
        assert!(a2.try_lock().is_err());
        assert!(b.try_lock().is_ok());
    }

    #[test]
    fn test_prune_keeps_held_locks() {
        let table = LockTable::default();
        let held = table.get("held");
        for i in 0..=PRUNE_THRESHOLD {
            table.get(&format!("k{}", i));
        }
        table.get("trigger");
        assert!(Arc::ptr_eq(&held, &table.get("held")));
    }
}
