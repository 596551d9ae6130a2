//! Keyed registry shared across threads
//!
//! Reader-writer locked map from keys to cheaply clonable handles. Used for
//! the process registry, each process's agent registry and its worker
//! thread registry. Guards are never held past a single call.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

pub struct Registry<K, V> {
    map: RwLock<HashMap<K, V>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Insert if absent; returns false and leaves the map untouched otherwise
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Remove if `check` accepts the value, under the write lock
    pub fn remove_if<E, F>(&self, key: &K, check: F) -> Result<Option<V>, E>
    where
        F: FnOnce(&V) -> Result<(), E>,
    {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        match map.get(key) {
            Some(v) => check(v)?,
            None => return Ok(None),
        }
        Ok(map.remove(key))
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(K, V)> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_does_not_replace() {
        let reg: Registry<u32, &str> = Registry::new();
        assert!(reg.insert(1, "one"));
        assert!(!reg.insert(1, "uno"));
        assert_eq!(reg.get(&1), Some("one"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_remove_if() {
        let reg: Registry<u32, u32> = Registry::new();
        reg.insert(5, 50);

        let res: Result<_, ()> = reg.remove_if(&5, |_| Err(()));
        assert!(res.is_err());
        assert!(reg.contains(&5));

        let res: Result<_, ()> = reg.remove_if(&5, |_| Ok(()));
        assert_eq!(res, Ok(Some(50)));
        assert!(reg.is_empty());

        let res: Result<_, ()> = reg.remove_if(&5, |_| Ok(()));
        assert_eq!(res, Ok(None));
    }

    #[test]
    fn test_concurrent_insert_one_winner() {
        let reg = Arc::new(Registry::<u32, usize>::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.insert(7, i))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(reg.entries().len(), 1);
    }
}
