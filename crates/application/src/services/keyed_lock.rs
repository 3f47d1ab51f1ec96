use std::{
    hash::Hash,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按键划分的临界区；同一键上的持有者互斥，不同键互不影响。
///
/// 每个键可以携带一份在临界区内读写的状态 `V`。最后一个持有者释放后条目被移除，
/// 状态随之丢弃，下次进入时从 `V::default()` 重新开始。
pub(crate) struct KeyedLocks<K, V = ()>
where
    K: Eq + Hash,
{
    locks: DashMap<K, Arc<Mutex<V>>>,
}

impl<K, V> KeyedLocks<K, V>
where
    K: Eq + Hash + Copy,
    V: Default,
{
    pub(crate) fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub(crate) async fn lock(&self, key: K) -> KeyedGuard<'_, K, V> {
        // 分片锁不能跨 await 持有
        let entry = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(V::default())))
            .value()
            .clone();
        KeyedGuard {
            locks: &self.locks,
            key,
            guard: Some(entry.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

pub(crate) struct KeyedGuard<'a, K, V>
where
    K: Eq + Hash,
{
    locks: &'a DashMap<K, Arc<Mutex<V>>>,
    key: K,
    guard: Option<OwnedMutexGuard<V>>,
}

impl<K, V> Deref for KeyedGuard<'_, K, V>
where
    K: Eq + Hash,
{
    type Target = V;

    fn deref(&self) -> &V {
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!("guard is released only on drop"),
        }
    }
}

impl<K, V> DerefMut for KeyedGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn deref_mut(&mut self) -> &mut V {
        match &mut self.guard {
            Some(guard) => guard,
            None => unreachable!("guard is released only on drop"),
        }
    }
}

impl<K, V> Drop for KeyedGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.guard.take();
        // 等待者在分片锁内克隆条目，计数为 1 说明只剩表本身引用
        self.locks
            .remove_if(&self.key, |_, entry| Arc::strong_count(entry) == 1);
    }
}
