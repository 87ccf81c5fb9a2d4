use crate::dict::Dict;
use crate::entry::Entry;
use crate::entry::EntryId;
use crate::table::Entries;
use crate::types::DictType;

/// Advances a scan cursor over the bits selected by `mask`, most significant
/// masked bit first.
///
/// Incrementing the bit-reversed cursor means a bucket index of a table of
/// size `2^n` is followed by the indices it expands to in any larger table,
/// which is what keeps the scan guarantee across resizes.
#[inline]
pub(crate) fn next_cursor(v: u64, mask: u64) -> u64 {
    (v | !mask).reverse_bits().wrapping_add(1).reverse_bits()
}

/// Mutable view of one bucket chain, handed to the bucket callback of
/// [`Dict::scan_buckets`] before the chain's entries are emitted.
pub struct Bucket<'a, K, V> {
    head: &'a mut Option<EntryId>,
    entries: &'a mut Entries<K, V>,
}

impl<K, V> Bucket<'_, K, V> {
    /// The first entry of the chain.
    pub fn head(&self) -> Option<EntryId> {
        *self.head
    }

    /// Chain length.
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut cursor = *self.head;
        while let Some(id) = cursor {
            len += 1;
            cursor = self.entries.get(id).and_then(|e| e.next);
        }
        len
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Calls `f` on every entry of the chain, head first.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut Entry<K, V>)) {
        let mut cursor = *self.head;
        while let Some(id) = cursor {
            let Some(entry) = self.entries.get_mut(id) else {
                break;
            };
            f(entry);
            cursor = entry.next;
        }
    }

    /// Moves the entry `id` to a fresh slot of the entry arena and relinks
    /// its predecessor. Returns the new handle; the old one goes stale.
    ///
    /// This is the compaction hook: an allocator-aware caller moves hot
    /// entries while a scan passes over their bucket.
    pub fn relocate(&mut self, id: EntryId) -> Option<EntryId> {
        let mut prev: Option<EntryId> = None;
        let mut cursor = *self.head;
        while let Some(current) = cursor {
            if current == id {
                let entry = self.entries.remove(current)?;
                let moved = self.entries.insert(entry);
                match prev {
                    None => *self.head = Some(moved),
                    Some(prev) => self.entries.get_mut(prev)?.next = Some(moved),
                }
                return Some(moved);
            }
            prev = Some(current);
            cursor = self.entries.get(current)?.next;
        }
        None
    }
}

impl<K, V, T: DictType<K, V>> Dict<K, V, T> {
    /// Emits the entries of the bucket(s) addressed by `cursor` and returns
    /// the cursor for the next call.
    ///
    /// Start with `0` and stop once `0` is returned. Every entry present for
    /// the whole scan is emitted at least once, even if the dictionary grows
    /// or shrinks between calls; entries may be emitted more than once. An
    /// empty dictionary returns `0` right away.
    ///
    /// `f` receives the dictionary so it can read, update or delete entries,
    /// including ones later in the same chain. Automatic rehashing is paused
    /// for the duration of the call. Inserting from `f` voids the coverage
    /// guarantee.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::Dict;
    /// # use rehash_dict::HasherType;
    /// # use std::collections::hash_map::RandomState;
    /// let mut dict = Dict::new(HasherType::new(RandomState::new()));
    /// for i in 0..100u32 {
    ///     dict.add(i, ()).unwrap();
    /// }
    ///
    /// let mut seen = std::collections::HashSet::new();
    /// let mut cursor = 0;
    /// loop {
    ///     cursor = dict.scan(cursor, |dict, id| {
    ///         seen.insert(*dict[id].key());
    ///     });
    ///     if cursor == 0 {
    ///         break;
    ///     }
    /// }
    /// assert_eq!(seen.len(), 100);
    /// ```
    pub fn scan(&mut self, cursor: u64, f: impl FnMut(&mut Self, EntryId)) -> u64 {
        self.scan_buckets(cursor, f, |_| {})
    }

    /// [`scan`](Self::scan) with a callback that sees each visited bucket
    /// before its entries are emitted.
    pub fn scan_buckets(
        &mut self,
        cursor: u64,
        mut f: impl FnMut(&mut Self, EntryId),
        mut bucket_fn: impl FnMut(Bucket<'_, K, V>),
    ) -> u64 {
        if self.len() == 0 {
            return 0;
        }

        // Callbacks may call find and friends.
        self.pause_rehashing();

        let mut v = cursor;
        if !self.is_rehashing() {
            let m0 = self.ht[0].mask() as u64;
            self.emit_bucket(0, (v & m0) as usize, &mut f, &mut bucket_fn);
            v = next_cursor(v, m0);
        } else {
            let (small, large) = if self.ht[0].size() > self.ht[1].size() {
                (1, 0)
            } else {
                (0, 1)
            };
            let m0 = self.ht[small].mask() as u64;
            let m1 = self.ht[large].mask() as u64;

            self.emit_bucket(small, (v & m0) as usize, &mut f, &mut bucket_fn);

            // Walk the larger table's expansions of the smaller index.
            loop {
                self.emit_bucket(large, (v & m1) as usize, &mut f, &mut bucket_fn);
                v = next_cursor(v, m1);
                if v & (m0 ^ m1) == 0 {
                    break;
                }
            }
        }

        self.resume_rehashing();
        v
    }

    fn emit_bucket(
        &mut self,
        table: usize,
        index: usize,
        f: &mut impl FnMut(&mut Self, EntryId),
        bucket_fn: &mut impl FnMut(Bucket<'_, K, V>),
    ) {
        if let Some(head) = self.ht[table].buckets.get_mut(index) {
            bucket_fn(Bucket {
                head,
                entries: &mut self.entries,
            });
        }

        let mut cursor = self.ht[table].buckets.get(index).copied().flatten();
        while let Some(id) = cursor {
            let captured = self.entries.get(id).and_then(|e| e.next);
            f(&mut *self, id);
            // A live entry's link already skips anything `f` unlinked after it.
            cursor = match self.entries.get(id) {
                Some(entry) => entry.next,
                None => captured.filter(|&n| self.entries.contains_key(n)),
            };
        }
    }
}
