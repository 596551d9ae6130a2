//! Descriptor table for per-process workers and pools
//!
//! Hands out the lowest free id in a fixed range, so a freed descriptor is
//! reused by the next insertion. Lookups share a read lock; insertion and
//! removal take the write lock.

use std::sync::{Arc, PoisonError, RwLock};

/// Smallest descriptor handed out by default
pub const MIN_DESCRIPTOR: u32 = 0;

/// Largest descriptor handed out by default
pub const MAX_DESCRIPTOR: u32 = 127;

/// Table mapping small integer descriptors to shared entries
pub struct DescriptorTable<T> {
    slots: RwLock<Vec<Option<Arc<T>>>>,
    min: u32,
    max: u32,
}

impl<T> DescriptorTable<T> {
    /// Table covering `min..=max`
    pub fn new(min: u32, max: u32) -> Self {
        debug_assert!(min <= max);
        Self {
            slots: RwLock::new(Vec::new()),
            min,
            max,
        }
    }

    /// Number of descriptors the table can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        (self.max - self.min) as usize + 1
    }

    /// Insert the entry built by `build`, which receives its descriptor
    ///
    /// Returns `None` when every descriptor is taken.
    pub fn insert_with<F>(&self, build: F) -> Option<(u32, Arc<T>)>
    where
        F: FnOnce(u32) -> T,
    {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);

        let index = match slots.iter().position(Option::is_none) {
            Some(index) => index,
            None if slots.len() < self.capacity() => {
                slots.push(None);
                slots.len() - 1
            }
            None => return None,
        };

        let id = self.min + index as u32;
        let entry = Arc::new(build(id));
        slots[index] = Some(Arc::clone(&entry));
        Some((id, entry))
    }

    /// Look up a descriptor
    pub fn get(&self, id: u32) -> Option<Arc<T>> {
        let index = self.index(id)?;
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(index).and_then(|s| s.clone())
    }

    /// Remove a descriptor unconditionally
    pub fn remove(&self, id: u32) -> Option<Arc<T>> {
        self.remove_if(id, |_| Ok::<(), ()>(())).ok().flatten()
    }

    /// Remove a descriptor if `check` accepts the entry
    ///
    /// `check` runs under the table's write lock, so no lookup can observe
    /// the entry between the check and its removal. Returns `Ok(None)` when
    /// the descriptor is not in use.
    pub fn remove_if<E, F>(&self, id: u32, check: F) -> Result<Option<Arc<T>>, E>
    where
        F: FnOnce(&T) -> Result<(), E>,
    {
        let Some(index) = self.index(id) else {
            return Ok(None);
        };
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);

        match slots.get(index) {
            Some(Some(entry)) => check(entry)?,
            _ => return Ok(None),
        }

        let removed = slots[index].take();
        while matches!(slots.last(), Some(None)) {
            slots.pop();
        }
        Ok(removed)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.iter().filter(|s| s.is_some()).count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of live entries in descriptor order
    pub fn entries(&self) -> Vec<(u32, Arc<T>)> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (self.min + i as u32, Arc::clone(e))))
            .collect()
    }

    #[inline]
    fn index(&self, id: u32) -> Option<usize> {
        if id < self.min || id > self.max {
            None
        } else {
            Some((id - self.min) as usize)
        }
    }
}

impl<T> Default for DescriptorTable<T> {
    fn default() -> Self {
        Self::new(MIN_DESCRIPTOR, MAX_DESCRIPTOR)
    }
}
