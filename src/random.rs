use alloc::vec::Vec;

use rand::Rng;

use crate::dict::Dict;
use crate::dict::Rehash;
use crate::entry::EntryId;
use crate::types::DictType;

/// Sample size [`Dict::get_fair_random_key`] draws from.
const FAIR_SAMPLE_SIZE: usize = 15;

impl<K, V, T: DictType<K, V>> Dict<K, V, T> {
    /// Returns a random entry, or `None` if the dictionary is empty.
    ///
    /// A random non-empty bucket is chosen first and then a random element of
    /// its chain, so entries in short chains are favored. Use
    /// [`get_fair_random_key`](Self::get_fair_random_key) when that bias
    /// matters.
    pub fn get_random_key(&mut self) -> Option<EntryId> {
        if self.len() == 0 {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }

        let head = match self.rehash {
            // Buckets below the rehash index are known to be empty.
            Rehash::Rehashing { index } => {
                let primary = self.ht[0].size();
                let slots = self.slots();
                loop {
                    let h = self.rng.random_range(index..slots);
                    let bucket = if h >= primary {
                        self.ht[1].buckets[h - primary]
                    } else {
                        self.ht[0].buckets[h]
                    };
                    if let Some(id) = bucket {
                        break id;
                    }
                }
            }
            Rehash::Stable => {
                let mask = self.ht[0].mask();
                loop {
                    let h = self.rng.random::<u64>() as usize & mask;
                    if let Some(id) = self.ht[0].buckets[h] {
                        break id;
                    }
                }
            }
        };

        let mut chain_len = 0;
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            chain_len += 1;
            cursor = self.entries.get(id).and_then(|e| e.next);
        }

        let mut pick = head;
        for _ in 0..self.rng.random_range(0..chain_len) {
            pick = self.entries.get(pick).and_then(|e| e.next)?;
        }
        Some(pick)
    }

    /// Samples up to `count` entries from a run of consecutive buckets
    /// starting at a random position.
    ///
    /// Much cheaper than `count` calls to
    /// [`get_random_key`](Self::get_random_key), at the price of neither
    /// distinct nor uniformly distributed results. Fewer than `count`
    /// entries may come back even when the dictionary holds more: the walk
    /// gives up after `count * 10` bucket positions. Up to `count` helper
    /// rehash steps are performed first.
    pub fn get_some_keys(&mut self, count: usize) -> Vec<EntryId> {
        let count = count.min(self.len());
        let mut sampled = Vec::with_capacity(count);
        if count == 0 {
            return sampled;
        }

        for _ in 0..count {
            if !self.is_rehashing() {
                break;
            }
            self.rehash_step();
        }

        let tables = if self.is_rehashing() { 2 } else { 1 };
        let rehash_index = self.rehash_index().unwrap_or(0);
        let mut max_mask = self.ht[0].mask();
        if tables > 1 {
            max_mask = max_mask.max(self.ht[1].mask());
        }

        let mut i = self.rng.random::<u64>() as usize & max_mask;
        let mut empty_len = 0;
        let mut max_steps = count.saturating_mul(10);
        while sampled.len() < count && max_steps > 0 {
            max_steps -= 1;
            for j in 0..tables {
                if tables == 2 && j == 0 && i < rehash_index {
                    // Past the end of the target table both tables are empty
                    // up to the rehash index.
                    if i >= self.ht[1].size() {
                        i = rehash_index;
                    } else {
                        continue;
                    }
                }
                let Some(&head) = self.ht[j].buckets.get(i) else {
                    continue;
                };

                match head {
                    None => {
                        empty_len += 1;
                        if empty_len >= 5 && empty_len > count {
                            i = self.rng.random::<u64>() as usize & max_mask;
                            empty_len = 0;
                        }
                    }
                    Some(head) => {
                        empty_len = 0;
                        let mut cursor = Some(head);
                        while let Some(id) = cursor {
                            sampled.push(id);
                            if sampled.len() == count {
                                return sampled;
                            }
                            cursor = self.entries.get(id).and_then(|e| e.next);
                        }
                    }
                }
            }
            i = (i + 1) & max_mask;
        }
        sampled
    }

    /// Returns a random entry with less chain-length bias than
    /// [`get_random_key`](Self::get_random_key), by picking uniformly from a
    /// [`get_some_keys`](Self::get_some_keys) sample.
    pub fn get_fair_random_key(&mut self) -> Option<EntryId> {
        let sample = self.get_some_keys(FAIR_SAMPLE_SIZE);
        if sample.is_empty() {
            return self.get_random_key();
        }
        let pick = self.rng.random_range(0..sample.len());
        sample.get(pick).copied()
    }
}
