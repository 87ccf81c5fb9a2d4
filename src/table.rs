use alloc::vec;
use alloc::vec::Vec;
use core::mem::size_of;

use slotmap::SlotMap;

use crate::entry::Entry;
use crate::entry::EntryId;
use crate::entry::Value;
use crate::error::ResizeError;
use crate::types::DictType;

/// Smallest bucket count a table is ever allocated with.
pub const INITIAL_SIZE: usize = 4;

/// The clear loop reports progress every time this many buckets are visited.
const CLEAR_PROGRESS_INTERVAL: usize = 65536;

pub(crate) type Entries<K, V> = SlotMap<EntryId, Entry<K, V>>;

/// Rounds `size` up to the bucket count a table would be created with.
///
/// Returns `None` when the result does not fit a bucket array.
pub(crate) fn next_power(size: usize) -> Option<usize> {
    let real = size.max(INITIAL_SIZE).checked_next_power_of_two()?;
    let bytes = real.checked_mul(size_of::<Option<EntryId>>())?;
    (bytes <= isize::MAX as usize).then_some(real)
}

/// One bucket array: a power-of-two number of chain heads and a count of the
/// entries reachable from them.
///
/// A zero-sized table has no allocation and must never be probed.
#[derive(Debug, Default)]
pub(crate) struct Table {
    pub(crate) buckets: Vec<Option<EntryId>>,
    pub(crate) used: usize,
}

impl Table {
    /// Allocates `size` empty buckets. `size` must already be a power of two.
    pub(crate) fn with_size(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self {
            buckets: vec![None; size],
            used: 0,
        }
    }

    /// Fallible [`with_size`](Self::with_size).
    pub(crate) fn try_with_size(size: usize) -> Result<Self, ResizeError> {
        debug_assert!(size.is_power_of_two());
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(size)
            .map_err(ResizeError::AllocFailed)?;
        buckets.resize(size, None);
        Ok(Self { buckets, used: 0 })
    }

    #[inline(always)]
    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline(always)]
    pub(crate) fn mask(&self) -> usize {
        self.buckets.len().saturating_sub(1)
    }

    #[inline(always)]
    pub(crate) fn slot(&self, hash: u64) -> usize {
        hash as usize & self.mask()
    }

    /// Address of the bucket array, or zero when unallocated.
    pub(crate) fn addr(&self) -> usize {
        if self.buckets.is_empty() {
            0
        } else {
            self.buckets.as_ptr() as usize
        }
    }

    /// Number of entries chained from `slot`.
    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn chain_len<K, V>(&self, entries: &Entries<K, V>, slot: usize) -> usize {
        let mut len = 0;
        let mut cursor = self.buckets.get(slot).copied().flatten();
        while let Some(id) = cursor {
            len += 1;
            cursor = entries.get(id).and_then(|e| e.next);
        }
        len
    }

    /// Frees every entry reachable from this table through the destructor
    /// hooks, then drops the bucket array.
    ///
    /// `progress` runs once every 65536 buckets so that clearing a huge table
    /// can yield to other work.
    pub(crate) fn clear<K, V, T>(
        &mut self,
        entries: &mut Entries<K, V>,
        ty: &T,
        progress: &mut impl FnMut(&T),
    ) where
        T: DictType<K, V>,
    {
        for i in 0..self.buckets.len() {
            if self.used == 0 {
                break;
            }
            if i % CLEAR_PROGRESS_INTERVAL == 0 {
                progress(ty);
            }

            let mut cursor = self.buckets[i].take();
            while let Some(id) = cursor {
                let Some(entry) = entries.remove(id) else {
                    break;
                };
                cursor = entry.next;
                free_entry(ty, entry);
                self.used -= 1;
            }
        }

        *self = Table::default();
    }
}

/// Passes a detached entry's key and value through the destructor hooks.
pub(crate) fn free_entry<K, V, T>(ty: &T, entry: Entry<K, V>)
where
    T: DictType<K, V>,
{
    let (key, value) = entry.into_parts();
    ty.destroy_key(key);
    free_value::<K, V, T>(ty, value);
}

pub(crate) fn free_value<K, V, T>(ty: &T, value: Value<V>)
where
    T: DictType<K, V>,
{
    if let Value::Ref(v) = value {
        ty.destroy_val(v);
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;

    #[test]
    fn next_power_rounds_up_with_floor() {
        assert_eq!(next_power(0), Some(INITIAL_SIZE));
        assert_eq!(next_power(3), Some(INITIAL_SIZE));
        assert_eq!(next_power(4), Some(4));
        assert_eq!(next_power(5), Some(8));
        assert_eq!(next_power(1000), Some(1024));
        assert_eq!(next_power(usize::MAX), None);
        assert_eq!(next_power(usize::MAX / 2), None);
    }

    #[test]
    fn table_masks() {
        let table = Table::with_size(16);
        assert_eq!(table.size(), 16);
        assert_eq!(table.mask(), 15);
        assert_eq!(table.slot(0x1234_5678), 0x8);
        assert_ne!(table.addr(), 0);
        assert_eq!(Table::default().addr(), 0);
        assert_eq!(Table::default().mask(), 0);
    }

    #[test]
    fn try_with_size_allocates() {
        let table = Table::try_with_size(64).unwrap();
        assert_eq!(table.size(), 64);
        assert!(table.buckets.iter().all(Option::is_none));
    }

    struct Counting {
        keys: Cell<usize>,
        vals: Cell<usize>,
    }

    impl DictType<u64, u64> for Counting {
        fn hash(&self, key: &u64) -> u64 {
            *key
        }

        fn destroy_key(&self, _key: u64) {
            self.keys.set(self.keys.get() + 1);
        }

        fn destroy_val(&self, _val: u64) {
            self.vals.set(self.vals.get() + 1);
        }
    }

    #[test]
    fn clear_runs_destructors_and_progress() {
        let ty = Counting {
            keys: Cell::new(0),
            vals: Cell::new(0),
        };
        let mut entries: Entries<u64, u64> = SlotMap::with_key();
        let mut table = Table::with_size(8);
        for k in 0..20u64 {
            let slot = table.slot(k);
            let mut entry = Entry::new(k, table.buckets[slot]);
            if k % 2 == 0 {
                entry.value = Value::Ref(k);
            }
            let id = entries.insert(entry);
            table.buckets[slot] = Some(id);
            table.used += 1;
        }
        assert_eq!(table.chain_len(&entries, 3), 3);

        let mut calls = 0;
        table.clear(&mut entries, &ty, &mut |_: &Counting| calls += 1);

        assert_eq!(calls, 1);
        assert_eq!(ty.keys.get(), 20);
        assert_eq!(ty.vals.get(), 10);
        assert_eq!(table.size(), 0);
        assert!(entries.is_empty());
    }
}
