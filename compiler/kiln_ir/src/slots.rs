//! Generational arena used for every releasable IR object.

use std::marker::PhantomData;

use crate::id::SlotKey;

struct Entry<T> {
    generation: u32,
    item: Option<T>,
}

/// A `Vec`-backed arena whose slots are reused after removal.
///
/// Lookups with a key whose generation does not match the slot's current
/// generation return `None`, which is how stale handles are detected.
pub(crate) struct Slots<K, T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    live: usize,
    _key: PhantomData<K>,
}

impl<K: SlotKey, T> Default for Slots<K, T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
            _key: PhantomData,
        }
    }
}

impl<K: SlotKey, T> Slots<K, T> {
    /// Store `item` and return its key.
    pub(crate) fn insert(&mut self, item: T) -> K {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.item = Some(item);
            return K::from_parts(index, entry.generation);
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            item: Some(item),
        });
        K::from_parts(index, 0)
    }

    /// Remove the item at `key`, invalidating every copy of the key.
    pub(crate) fn remove(&mut self, key: K) -> Option<T> {
        let entry = self.entries.get_mut(key.index())?;
        if entry.generation != key.generation() {
            return None;
        }
        let item = entry.item.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(key.index() as u32);
        self.live -= 1;
        Some(item)
    }

    pub(crate) fn get(&self, key: K) -> Option<&T> {
        let entry = self.entries.get(key.index())?;
        if entry.generation != key.generation() {
            return None;
        }
        entry.item.as_ref()
    }

    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let entry = self.entries.get_mut(key.index())?;
        if entry.generation != key.generation() {
            return None;
        }
        entry.item.as_mut()
    }

    pub(crate) fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Number of live items.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Iterate over live items with their keys.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .item
                .as_ref()
                .map(|item| (K::from_parts(index as u32, entry.generation), item))
        })
    }
}

#[cfg(test)]
mod tests;
