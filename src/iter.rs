use core::iter::FusedIterator;

use crate::dict::Dict;
use crate::entry::EntryId;
use crate::entry::Value;
use crate::table::Entries;
use crate::table::Table;
use crate::types::DictType;

/// Cursor state for walking every entry of a [`Dict`].
///
/// The iterator does not borrow the dictionary. It is advanced with
/// [`Dict::next_entry`] and must be handed back to
/// [`Dict::release_iterator`] when done.
///
/// A *safe* iterator pauses automatic rehashing from its first step until it
/// is released, so the caller may insert, look up and delete (including the
/// entry just returned) between steps. It is not `Clone`: each started safe
/// iterator holds exactly one pause.
///
/// An *unsafe* iterator only permits reads. It records the dictionary's
/// [`fingerprint`](Dict::fingerprint) on its first step and release panics
/// if the fingerprint has changed. Deleting the entry just returned counts
/// as a change.
#[derive(Debug)]
#[must_use = "iterators must be released with Dict::release_iterator"]
pub struct DictIterator {
    table: usize,
    index: usize,
    started: bool,
    safe: bool,
    entry: Option<EntryId>,
    next_entry: Option<EntryId>,
    fingerprint: u64,
}

impl DictIterator {
    fn new(safe: bool) -> Self {
        Self {
            table: 0,
            index: 0,
            started: false,
            safe,
            entry: None,
            next_entry: None,
            fingerprint: 0,
        }
    }

    /// Returns `true` for iterators created by [`Dict::safe_iterator`].
    pub fn is_safe(&self) -> bool {
        self.safe
    }
}

impl<K, V, T: DictType<K, V>> Dict<K, V, T> {
    /// Creates an unsafe iterator. Between its first step and its release the
    /// dictionary must not be modified, not even by a lookup that performs a
    /// rehash step.
    pub fn iterator(&self) -> DictIterator {
        DictIterator::new(false)
    }

    /// Creates a safe iterator. See [`DictIterator`].
    pub fn safe_iterator(&self) -> DictIterator {
        DictIterator::new(true)
    }

    /// Advances `it` and returns the next entry, or `None` once both tables
    /// have been walked.
    ///
    /// The walk continues from the returned entry's current link, so
    /// deleting entries later in the chain does not hide the ones after
    /// them. If the returned entry itself was deleted, the successor it had
    /// when it was returned is used instead.
    pub fn next_entry(&mut self, it: &mut DictIterator) -> Option<EntryId> {
        loop {
            let current = match it.entry {
                None => {
                    if it.started {
                        it.index += 1;
                    } else {
                        it.started = true;
                        if it.safe {
                            self.pause_rehashing();
                        } else {
                            it.fingerprint = self.fingerprint();
                        }
                    }

                    if it.index >= self.ht[it.table].size() {
                        if self.is_rehashing() && it.table == 0 {
                            it.table = 1;
                            it.index = 0;
                        } else {
                            return None;
                        }
                    }
                    self.ht[it.table].buckets.get(it.index).copied().flatten()
                }
                Some(id) => match self.entries.get(id) {
                    Some(entry) => entry.next,
                    None => it.next_entry.filter(|&next| self.entries.contains_key(next)),
                },
            };

            it.entry = current;
            if let Some(id) = current {
                it.next_entry = self.entries.get(id).and_then(|e| e.next);
                return Some(id);
            }
        }
    }

    /// Finishes an iteration started with [`iterator`](Self::iterator) or
    /// [`safe_iterator`](Self::safe_iterator).
    ///
    /// # Panics
    ///
    /// Panics if `it` is unsafe and the dictionary was structurally modified
    /// since its first step.
    pub fn release_iterator(&mut self, it: DictIterator) {
        if !it.started {
            return;
        }
        if it.safe {
            self.resume_rehashing();
        } else {
            assert_eq!(
                it.fingerprint,
                self.fingerprint(),
                "dictionary fingerprint changed during unsafe iteration"
            );
        }
    }

    /// Walks the dictionary with a safe iterator that is released when the
    /// guard is dropped. Use [`SafeIter::dict`] to modify the dictionary
    /// between steps.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::Dict;
    /// # use rehash_dict::HasherType;
    /// # use std::collections::hash_map::RandomState;
    /// let mut dict = Dict::new(HasherType::new(RandomState::new()));
    /// for i in 0..10u32 {
    ///     dict.add(i, i).unwrap();
    /// }
    ///
    /// let mut iter = dict.safe_iter();
    /// while let Some(id) = iter.next() {
    ///     let key = *iter.dict()[id].key();
    ///     if key % 2 == 0 {
    ///         iter.dict().delete(&key);
    ///     }
    /// }
    /// drop(iter);
    /// assert_eq!(dict.len(), 5);
    /// ```
    pub fn safe_iter(&mut self) -> SafeIter<'_, K, V, T> {
        let it = Some(self.safe_iterator());
        SafeIter { dict: self, it }
    }

    /// Borrowing iterator over every key and value slot.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tables: &self.ht,
            entries: &self.entries,
            table: 0,
            index: 0,
            cursor: None,
            remaining: self.len(),
        }
    }
}

/// Guard that drives a safe [`DictIterator`] and releases it on drop.
pub struct SafeIter<'a, K, V, T: DictType<K, V>> {
    dict: &'a mut Dict<K, V, T>,
    it: Option<DictIterator>,
}

impl<K, V, T: DictType<K, V>> SafeIter<'_, K, V, T> {
    /// The dictionary being walked. Rehashing stays paused while the guard
    /// lives.
    pub fn dict(&mut self) -> &mut Dict<K, V, T> {
        self.dict
    }
}

impl<K, V, T: DictType<K, V>> Iterator for SafeIter<'_, K, V, T> {
    type Item = EntryId;

    fn next(&mut self) -> Option<Self::Item> {
        let it = self.it.as_mut()?;
        self.dict.next_entry(it)
    }
}

impl<K, V, T: DictType<K, V>> Drop for SafeIter<'_, K, V, T> {
    fn drop(&mut self) {
        if let Some(it) = self.it.take() {
            self.dict.release_iterator(it);
        }
    }
}

/// Iterator over `(&K, &Value<V>)` pairs, in bucket order.
pub struct Iter<'a, K, V> {
    tables: &'a [Table; 2],
    entries: &'a Entries<K, V>,
    table: usize,
    index: usize,
    cursor: Option<EntryId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a Value<V>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.cursor {
                let entry = self.entries.get(id)?;
                self.cursor = entry.next;
                self.remaining = self.remaining.saturating_sub(1);
                return Some((&entry.key, &entry.value));
            }

            let table = self.tables.get(self.table)?;
            if self.remaining == 0 {
                return None;
            }
            if let Some(&head) = table.buckets.get(self.index) {
                self.cursor = head;
                self.index += 1;
            } else {
                self.table += 1;
                self.index = 0;
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeSet;
    use alloc::format;
    use alloc::string::String;
    use alloc::vec::Vec;

    use crate::dict::tests::Identity;
    use crate::dict::tests::drive_rehash;
    use crate::dict::tests::str_dict;

    #[test]
    fn safe_iteration_visits_each_entry_once_while_rehashing() {
        let mut dict = crate::Dict::new(Identity);
        for k in 0..5u64 {
            dict.add(k, k).unwrap();
        }
        assert!(dict.is_rehashing());

        let mut seen = Vec::new();
        let mut it = dict.safe_iterator();
        while let Some(id) = dict.next_entry(&mut it) {
            seen.push(*dict[id].key());
            assert!(dict.is_rehash_paused());
        }
        dict.release_iterator(it);
        assert!(!dict.is_rehash_paused());

        seen.sort_unstable();
        assert_eq!(seen, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn safe_iteration_tolerates_deletes_and_lookups() {
        let mut dict = str_dict();
        for i in 0..200 {
            dict.add(format!("k{i}"), i).unwrap();
        }
        drive_rehash(&mut dict);
        dict.expand(1024).unwrap();
        let index = dict.rehash_index();
        assert_eq!(index, Some(0));

        let mut seen = BTreeSet::new();
        let mut iter = dict.safe_iter();
        while let Some(id) = iter.next() {
            let key: String = iter.dict()[id].key().clone();
            let val = *iter.dict()[id].val().unwrap();
            assert!(seen.insert(val), "{key} visited twice");

            assert!(iter.dict().find(&key).is_some());
            if val % 2 == 0 {
                assert!(iter.dict().delete(&key));
            }
            assert_eq!(iter.dict().rehash_index(), index);
        }
        drop(iter);

        assert_eq!(seen.len(), 200);
        assert_eq!(dict.len(), 100);
        assert!(!dict.is_rehash_paused());
        drive_rehash(&mut dict);
        for i in 0..200 {
            assert_eq!(dict.get(&format!("k{i}")).is_some(), i % 2 == 1);
        }
    }

    #[test]
    fn deleting_the_successor_keeps_the_rest_of_the_chain() {
        let mut dict = crate::Dict::new(Identity);
        dict.expand(8).unwrap();
        // Bucket 1 chains 25 -> 17 -> 9 -> 1.
        for k in [1u64, 9, 17, 25] {
            dict.add(k, k).unwrap();
        }

        let mut seen = Vec::new();
        let mut iter = dict.safe_iter();
        while let Some(id) = iter.next() {
            let key = *iter.dict()[id].key();
            seen.push(key);
            if key == 25 {
                assert!(iter.dict().delete(&17));
            }
        }
        drop(iter);

        assert_eq!(seen, [25, 9, 1]);
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn deleting_current_and_successor_is_memory_safe() {
        let mut dict = crate::Dict::new(Identity);
        dict.expand(8).unwrap();
        for k in [1u64, 9, 17, 25] {
            dict.add(k, k).unwrap();
        }

        let mut seen = Vec::new();
        let mut iter = dict.safe_iter();
        while let Some(id) = iter.next() {
            let key = *iter.dict()[id].key();
            seen.push(key);
            if key == 25 {
                assert!(iter.dict().delete(&25));
                assert!(iter.dict().delete(&17));
            }
        }
        drop(iter);

        assert_eq!(seen, [25]);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn nested_safe_iterators_hold_the_pause() {
        let mut dict = crate::Dict::new(Identity);
        for k in 0..5u64 {
            dict.add(k, k).unwrap();
        }
        assert_eq!(dict.rehash_index(), Some(0));

        let mut outer = dict.safe_iterator();
        assert!(dict.next_entry(&mut outer).is_some());

        let mut inner = dict.safe_iterator();
        while dict.next_entry(&mut inner).is_some() {}
        dict.release_iterator(inner);

        assert!(dict.is_rehash_paused());
        assert!(dict.find(&3).is_some());
        assert_eq!(dict.rehash_index(), Some(0));

        {
            let mut guard = dict.safe_iter();
            assert!(guard.next().is_some());
        }
        assert!(dict.is_rehash_paused());

        dict.release_iterator(outer);
        assert!(!dict.is_rehash_paused());
        assert!(dict.find(&3).is_some());
        assert_eq!(dict.rehash_index(), Some(1));
    }

    #[test]
    fn emptying_during_safe_iteration_keeps_the_pause() {
        let mut dict = crate::Dict::new(Identity);
        for k in 0..5u64 {
            dict.add(k, k).unwrap();
        }

        let mut iter = dict.safe_iter();
        assert!(iter.next().is_some());
        iter.dict().empty();
        assert!(iter.dict().is_rehash_paused());
        assert!(iter.next().is_none());
        drop(iter);

        assert!(!dict.is_rehash_paused());
        assert!(dict.is_empty());
    }

    #[test]
    fn unsafe_iteration_without_mutation_releases() {
        let mut dict = str_dict();
        for i in 0..50 {
            dict.add(format!("{i}"), i).unwrap();
        }
        let mut it = dict.iterator();
        let mut count = 0;
        while dict.next_entry(&mut it).is_some() {
            count += 1;
        }
        dict.release_iterator(it);
        assert_eq!(count, 50);
    }

    #[test]
    #[should_panic(expected = "fingerprint")]
    fn unsafe_iteration_detects_mutation() {
        let mut dict = str_dict();
        for i in 0..10 {
            dict.add(format!("{i}"), i).unwrap();
        }
        let mut it = dict.iterator();
        assert!(dict.next_entry(&mut it).is_some());
        dict.add("intruder".into(), -1).unwrap();
        dict.release_iterator(it);
    }

    #[test]
    #[should_panic(expected = "fingerprint")]
    fn unsafe_iteration_rejects_deleting_the_returned_entry() {
        let mut dict = str_dict();
        for i in 0..10 {
            dict.add(format!("{i}"), i).unwrap();
        }
        let mut it = dict.iterator();
        let id = dict.next_entry(&mut it).unwrap();
        let key = dict[id].key().clone();
        assert!(dict.delete(&key));
        dict.release_iterator(it);
    }

    #[test]
    fn unstarted_iterators_release_cleanly() {
        let mut dict = str_dict();
        dict.add("a".into(), 1).unwrap();
        let safe = dict.safe_iterator();
        let unsafe_it = dict.iterator();
        dict.add("b".into(), 2).unwrap();
        dict.release_iterator(unsafe_it);
        dict.release_iterator(safe);
        assert!(!dict.is_rehash_paused());
    }

    #[test]
    fn fingerprint_tracks_structure() {
        let mut dict = crate::Dict::new(Identity);
        let empty = dict.fingerprint();
        dict.add(1, 1).unwrap();
        let one = dict.fingerprint();
        assert_ne!(empty, one);

        let id = dict.find(&1).unwrap();
        dict[id].set_unsigned_integer_val(5);
        assert_eq!(dict.fingerprint(), one);

        assert!(dict.delete(&1));
        assert_ne!(dict.fingerprint(), one);

        for k in 0..5u64 {
            dict.add(k, k).unwrap();
        }
        let before = dict.fingerprint();
        dict.rehash(1);
        assert_ne!(dict.fingerprint(), before);
    }

    #[test]
    fn borrowing_iter_covers_both_tables() {
        let mut dict = crate::Dict::new(Identity);
        for k in 0..5u64 {
            dict.add(k, k * 10).unwrap();
        }
        assert!(dict.is_rehashing());

        let iter = dict.iter();
        assert_eq!(iter.len(), 5);
        let mut pairs: Vec<(u64, u64)> = iter.map(|(k, v)| (*k, *v.val().unwrap())).collect();
        pairs.sort_unstable();
        assert_eq!(pairs, [(0, 0), (1, 10), (2, 20), (3, 30), (4, 40)]);

        let empty = crate::Dict::new(Identity);
        assert_eq!(empty.iter().count(), 0);
    }
}
