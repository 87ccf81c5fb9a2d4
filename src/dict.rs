use alloc::rc::Rc;
use core::fmt::Debug;
use core::mem;
use core::mem::size_of;
use core::ops::Index;
use core::ops::IndexMut;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use slotmap::SlotMap;

use crate::context::DictContext;
use crate::entry::Entry;
use crate::entry::EntryId;
use crate::entry::Value;
use crate::error::KeyExists;
use crate::error::ResizeError;
use crate::table::Entries;
use crate::table::INITIAL_SIZE;
use crate::table::Table;
use crate::table::free_entry;
use crate::table::free_value;
use crate::table::next_power;
use crate::types::DictType;

/// Where the dictionary is in its resize cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rehash {
    /// Only the primary table holds entries.
    Stable,
    /// Entries are moving from the primary table to the target table. Every
    /// primary bucket below `index` is already empty.
    Rehashing { index: usize },
}

/// Outcome of [`Dict::add_raw`].
#[derive(Debug)]
pub enum AddRaw<K> {
    /// A new entry was linked in. Its value slot holds `Value::Unsigned(0)`
    /// until the caller sets it.
    Added(EntryId),
    /// The key was already present; nothing changed and the caller's key is
    /// handed back.
    Exists {
        /// The entry that already holds the key.
        id: EntryId,
        /// The key that was not stored.
        key: K,
    },
}

impl<K> AddRaw<K> {
    /// The new or existing entry.
    pub fn id(&self) -> EntryId {
        match *self {
            AddRaw::Added(id) => id,
            AddRaw::Exists { id, .. } => id,
        }
    }

    /// Returns `true` if a new entry was created.
    pub fn is_added(&self) -> bool {
        matches!(self, AddRaw::Added(_))
    }
}

/// A chained hash table that grows and shrinks by incremental rehashing.
///
/// A `Dict` owns two bucket arrays. Normally only the primary one is
/// populated; when it has to be resized a second array of the new size is
/// allocated and entries migrate to it a bucket at a time. Every lookup,
/// insert and delete performs one such step before doing its own work, so
/// the cost of a resize is spread over ordinary traffic instead of being paid
/// in one long pause. Lookups probe both arrays while a migration is running.
///
/// Hashing, key comparison and the key/value lifecycle hooks come from the
/// [`DictType`] the dictionary is created with. Entries are addressed by
/// [`EntryId`] handles, which survive relocation during rehashing.
///
/// The dictionary is single-threaded: nothing here synchronizes, and the
/// only cooperative mechanism is a pause counter that stops the automatic
/// rehash steps while safe iterators or scans are running.
///
/// # Examples
///
/// ```rust
/// use rehash_dict::Dict;
/// use rehash_dict::HasherType;
/// use std::collections::hash_map::RandomState;
///
/// let mut dict = Dict::new(HasherType::new(RandomState::new()));
/// for i in 0..100u32 {
///     dict.add(i, i * 2).unwrap();
/// }
/// assert_eq!(dict.len(), 100);
///
/// // Finish any migration that is still pending.
/// while dict.rehash(100) {}
/// assert!(!dict.is_rehashing());
///
/// let id = dict.find(&21).unwrap();
/// assert_eq!(dict[id].val(), Some(&42));
/// ```
pub struct Dict<K, V, T: DictType<K, V>> {
    pub(crate) ty: T,
    pub(crate) ctx: Rc<DictContext>,
    pub(crate) entries: Entries<K, V>,
    pub(crate) ht: [Table; 2],
    pub(crate) rehash: Rehash,
    pub(crate) pause_rehash: usize,
    pub(crate) rng: SmallRng,
}

impl<K, V, T: DictType<K, V>> Debug for Dict<K, V, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dict")
            .field("len", &self.len())
            .field("primary", &(self.ht[0].size(), self.ht[0].used))
            .field("target", &(self.ht[1].size(), self.ht[1].used))
            .field("rehash", &self.rehash)
            .field("pause_rehash", &self.pause_rehash)
            .finish()
    }
}

impl<K, V, T: DictType<K, V>> Drop for Dict<K, V, T> {
    fn drop(&mut self) {
        for table in &mut self.ht {
            table.clear(&mut self.entries, &self.ty, &mut |_: &T| {});
        }
    }
}

impl<K, V, T: DictType<K, V>> Index<EntryId> for Dict<K, V, T> {
    type Output = Entry<K, V>;

    /// Panics if `id` is stale.
    fn index(&self, id: EntryId) -> &Self::Output {
        &self.entries[id]
    }
}

impl<K, V, T: DictType<K, V>> IndexMut<EntryId> for Dict<K, V, T> {
    fn index_mut(&mut self, id: EntryId) -> &mut Self::Output {
        &mut self.entries[id]
    }
}

impl<K, V, T: DictType<K, V>> Dict<K, V, T> {
    /// Creates an empty dictionary with a private [`DictContext`].
    ///
    /// No bucket array is allocated until the first insert or explicit
    /// [`expand`](Self::expand).
    pub fn new(ty: T) -> Self {
        Self::with_context(ty, Rc::new(DictContext::new()))
    }

    /// Creates an empty dictionary sharing `ctx` with other dictionaries.
    pub fn with_context(ty: T, ctx: Rc<DictContext>) -> Self {
        let rng = SmallRng::seed_from_u64(ctx.next_rng_seed());
        Self {
            ty,
            ctx,
            entries: SlotMap::with_key(),
            ht: [Table::default(), Table::default()],
            rehash: Rehash::Stable,
            pause_rehash: 0,
            rng,
        }
    }

    /// Returns the dictionary type.
    pub fn dict_type(&self) -> &T {
        &self.ty
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Rc<DictContext> {
        &self.ctx
    }

    /// Number of entries across both bucket arrays.
    pub fn len(&self) -> usize {
        self.ht[0].used + self.ht[1].used
    }

    /// Returns `true` if the dictionary holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of buckets across both bucket arrays.
    pub fn slots(&self) -> usize {
        self.ht[0].size() + self.ht[1].size()
    }

    /// Returns `true` while entries are migrating between bucket arrays.
    pub fn is_rehashing(&self) -> bool {
        matches!(self.rehash, Rehash::Rehashing { .. })
    }

    /// The next primary bucket to migrate, if a rehash is running.
    pub fn rehash_index(&self) -> Option<usize> {
        match self.rehash {
            Rehash::Stable => None,
            Rehash::Rehashing { index } => Some(index),
        }
    }

    /// Suspends the automatic rehash steps. Nests; each call must be matched
    /// by [`resume_rehashing`](Self::resume_rehashing).
    pub fn pause_rehashing(&mut self) {
        self.pause_rehash += 1;
    }

    /// Undoes one [`pause_rehashing`](Self::pause_rehashing).
    ///
    /// Every call must match an earlier pause. Unbalanced calls trip a debug
    /// assertion and leave the counter at zero in release builds.
    pub fn resume_rehashing(&mut self) {
        debug_assert!(self.pause_rehash > 0, "resume_rehashing without a matching pause");
        self.pause_rehash = self.pause_rehash.saturating_sub(1);
    }

    /// Returns `true` while automatic rehash steps are suspended.
    pub fn is_rehash_paused(&self) -> bool {
        self.pause_rehash > 0
    }

    /// Returns the entry behind `id`, or `None` if it has been deleted.
    pub fn entry(&self, id: EntryId) -> Option<&Entry<K, V>> {
        self.entries.get(id)
    }

    /// Mutable [`entry`](Self::entry).
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry<K, V>> {
        self.entries.get_mut(id)
    }

    /// Begins resizing to hold `size` entries, rounded up to a power of two.
    ///
    /// On a dictionary that was never allocated this installs the primary
    /// table directly. Otherwise a target table is allocated and incremental
    /// rehashing starts. Allocation failure aborts; see
    /// [`try_expand`](Self::try_expand).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::Dict;
    /// # use rehash_dict::HasherType;
    /// # use rehash_dict::ResizeError;
    /// # use std::collections::hash_map::RandomState;
    /// let mut dict: Dict<u32, u32, _> = Dict::new(HasherType::new(RandomState::new()));
    /// dict.expand(100).unwrap();
    /// assert_eq!(dict.slots(), 128);
    /// assert!(!dict.is_rehashing());
    ///
    /// assert_eq!(dict.expand(120), Err(ResizeError::SameSize(128)));
    /// ```
    pub fn expand(&mut self, size: usize) -> Result<(), ResizeError> {
        self.expand_impl(size, false)
    }

    /// Like [`expand`](Self::expand), but an allocation failure is reported
    /// as [`ResizeError::AllocFailed`] instead of aborting.
    pub fn try_expand(&mut self, size: usize) -> Result<(), ResizeError> {
        self.expand_impl(size, true)
    }

    fn expand_impl(&mut self, size: usize, fallible: bool) -> Result<(), ResizeError> {
        if self.is_rehashing() {
            return Err(ResizeError::Rehashing);
        }
        if self.ht[0].used > size {
            return Err(ResizeError::TooSmall {
                used: self.ht[0].used,
                requested: size,
            });
        }

        let real = next_power(size).ok_or(ResizeError::Overflow(size))?;
        if real == self.ht[0].size() {
            return Err(ResizeError::SameSize(real));
        }

        let table = if fallible {
            Table::try_with_size(real)?
        } else {
            Table::with_size(real)
        };

        if self.ht[0].size() == 0 {
            self.ht[0] = table;
            return Ok(());
        }

        tracing::debug!(
            from = self.ht[0].size(),
            to = real,
            used = self.ht[0].used,
            "starting incremental rehash"
        );
        self.ht[1] = table;
        self.rehash = Rehash::Rehashing { index: 0 };
        Ok(())
    }

    /// Shrinks (or grows) to the smallest power of two that holds every
    /// entry, keeping the load factor near one.
    ///
    /// Declined while resizing is disabled on the context or a rehash is
    /// already running.
    pub fn resize_to_fit(&mut self) -> Result<(), ResizeError> {
        if !self.ctx.resize_enabled() {
            return Err(ResizeError::ResizeDisabled);
        }
        if self.is_rehashing() {
            return Err(ResizeError::Rehashing);
        }
        self.expand(self.ht[0].used.max(INITIAL_SIZE))
    }

    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }

        if self.ht[0].size() == 0 {
            if let Err(err) = self.expand(INITIAL_SIZE) {
                tracing::warn!(%err, "initial table allocation declined");
            }
            return;
        }

        let used = self.ht[0].used;
        let size = self.ht[0].size();
        if used >= size
            && (self.ctx.resize_enabled() || used / size > self.ctx.force_resize_ratio())
            && self.type_allows_expand()
        {
            if let Err(err) = self.expand(used + 1) {
                tracing::warn!(%err, used, size, "automatic expansion declined");
            }
        }
    }

    fn type_allows_expand(&self) -> bool {
        let used = self.ht[0].used;
        let more_mem = next_power(used + 1)
            .map_or(usize::MAX, |n| n.saturating_mul(size_of::<Option<EntryId>>()));
        self.ty
            .expand_allowed(more_mem, used as f64 / self.ht[0].size() as f64)
    }

    /// Migrates up to `n` buckets from the primary to the target table.
    ///
    /// At most `n * 10` empty buckets are skipped in one call, so a sparse
    /// region may consume the whole budget without moving anything. Returns
    /// `true` while entries remain to be moved. Unlike the automatic steps
    /// this ignores [`pause_rehashing`](Self::pause_rehashing).
    pub fn rehash(&mut self, n: usize) -> bool {
        let Rehash::Rehashing { mut index } = self.rehash else {
            return false;
        };

        let mut empty_visits = n.saturating_mul(10);
        let mut remaining = n;
        while remaining > 0 && self.ht[0].used != 0 {
            remaining -= 1;

            // Entries remain, so a populated bucket exists at or past `index`.
            debug_assert!(index < self.ht[0].size());
            while self.ht[0].buckets[index].is_none() {
                index += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    self.rehash = Rehash::Rehashing { index };
                    return true;
                }
            }

            let mut cursor = self.ht[0].buckets[index].take();
            while let Some(id) = cursor {
                let entry = &mut self.entries[id];
                cursor = entry.next;

                let slot = self.ht[1].slot(self.ty.hash(&entry.key));
                entry.next = self.ht[1].buckets[slot];
                self.ht[1].buckets[slot] = Some(id);
                self.ht[0].used -= 1;
                self.ht[1].used += 1;
            }
            index += 1;
        }

        if self.ht[0].used == 0 {
            self.ht[0] = mem::take(&mut self.ht[1]);
            self.rehash = Rehash::Stable;
            tracing::debug!(
                size = self.ht[0].size(),
                used = self.ht[0].used,
                "incremental rehash complete"
            );
            return false;
        }

        self.rehash = Rehash::Rehashing { index };
        true
    }

    /// Rehashes in batches of 100 buckets until `ms` milliseconds have
    /// elapsed or the migration finishes. Returns the number of buckets
    /// requested from [`rehash`](Self::rehash), or zero while paused.
    ///
    /// A batch that has started always completes, so the budget may be
    /// overrun by the duration of one batch.
    #[cfg(feature = "std")]
    pub fn rehash_milliseconds(&mut self, ms: u64) -> usize {
        if self.pause_rehash > 0 {
            return 0;
        }

        let start = std::time::Instant::now();
        let budget = std::time::Duration::from_millis(ms);
        let mut rehashes = 0;
        while self.rehash(100) {
            rehashes += 100;
            if start.elapsed() > budget {
                break;
            }
        }
        tracing::trace!(rehashes, elapsed = ?start.elapsed(), "timed rehash");
        rehashes
    }

    /// One bucket of helper rehashing, skipped while paused.
    #[inline]
    pub(crate) fn rehash_step(&mut self) {
        if self.pause_rehash == 0 {
            self.rehash(1);
        }
    }

    #[inline]
    fn keys_match(&self, key: &K, stored: &K) -> bool {
        core::ptr::eq(key, stored) || self.ty.key_eq(key, stored)
    }

    /// Probes the primary table, then the target table while rehashing.
    fn lookup(&self, key: &K, hash: u64) -> Option<EntryId> {
        self.find_by_hash(hash, |stored| self.keys_match(key, stored))
    }

    /// Finds an entry by a precomputed hash and a caller predicate over the
    /// stored keys. No key comparison and no rehash step happen.
    ///
    /// Pair with [`get_hash`](Self::get_hash) to locate an entry whose key
    /// can no longer be compared by value.
    pub fn find_by_hash(&self, hash: u64, mut is_match: impl FnMut(&K) -> bool) -> Option<EntryId> {
        if self.len() == 0 {
            return None;
        }

        for table in &self.ht {
            let Some(&head) = table.buckets.get(table.slot(hash)) else {
                break;
            };
            let mut cursor = head;
            while let Some(id) = cursor {
                let entry = self.entries.get(id)?;
                if is_match(&entry.key) {
                    return Some(id);
                }
                cursor = entry.next;
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// Returns the hash the dictionary type computes for `key`.
    pub fn get_hash(&self, key: &K) -> u64 {
        self.ty.hash(key)
    }

    /// Looks up `key`, performing one helper rehash step first.
    pub fn find(&mut self, key: &K) -> Option<EntryId> {
        if self.len() == 0 {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        self.lookup(key, self.ty.hash(key))
    }

    /// Looks up `key` and returns the entry mutably.
    pub fn find_mut(&mut self, key: &K) -> Option<&mut Entry<K, V>> {
        let id = self.find(key)?;
        self.entries.get_mut(id)
    }

    /// Looks up `key` without advancing a running rehash.
    pub fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        let id = self.lookup(key, self.ty.hash(key))?;
        self.entries.get(id)
    }

    /// Looks up `key` and returns its value slot.
    pub fn fetch_value(&mut self, key: &K) -> Option<&Value<V>> {
        let id = self.find(key)?;
        self.entries.get(id).map(Entry::value)
    }

    /// Inserts `key` with an unset value, or reports the entry already
    /// holding it.
    ///
    /// Performs one helper rehash step and, when not rehashing, grows the
    /// table first if its load calls for it. New entries go to the head of
    /// their chain in the table currently receiving inserts. The key passes
    /// through [`DictType::dup_key`] only when it is actually stored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::AddRaw;
    /// # use rehash_dict::Dict;
    /// # use rehash_dict::HasherType;
    /// # use std::collections::hash_map::RandomState;
    /// let mut dict: Dict<&str, (), _> = Dict::new(HasherType::new(RandomState::new()));
    /// let id = dict.add_raw("hits").id();
    /// dict[id].set_signed_integer_val(1000);
    ///
    /// match dict.add_raw("hits") {
    ///     AddRaw::Exists { id, .. } => assert_eq!(dict[id].value().signed(), Some(1000)),
    ///     AddRaw::Added(_) => unreachable!(),
    /// }
    /// ```
    pub fn add_raw(&mut self, key: K) -> AddRaw<K> {
        if self.is_rehashing() {
            self.rehash_step();
        }

        let hash = self.ty.hash(&key);
        self.expand_if_needed();
        if let Some(id) = self.lookup(&key, hash) {
            return AddRaw::Exists { id, key };
        }

        let table = if self.is_rehashing() { 1 } else { 0 };
        let key = self.ty.dup_key(key);
        let ht = &mut self.ht[table];
        let slot = ht.slot(hash);
        let id = self.entries.insert(Entry::new(key, ht.buckets[slot]));
        ht.buckets[slot] = Some(id);
        ht.used += 1;
        AddRaw::Added(id)
    }

    /// Inserts `key` with `val`. Fails without changing anything if the key
    /// is present, returning both back inside [`KeyExists`].
    pub fn add(&mut self, key: K, val: V) -> Result<EntryId, KeyExists<K, V>> {
        match self.add_raw(key) {
            AddRaw::Added(id) => {
                self.set_val(id, val);
                Ok(id)
            }
            AddRaw::Exists { id, key } => Err(KeyExists {
                id,
                key,
                value: val,
            }),
        }
    }

    /// Returns the entry holding `key`, inserting it with an unset value
    /// first if needed.
    pub fn add_or_find(&mut self, key: K) -> EntryId {
        self.add_raw(key).id()
    }

    /// Inserts `key` with `val`, or overwrites the value of an existing
    /// entry. Returns `true` if the key was newly added.
    ///
    /// On overwrite the new value is installed before the old one passes
    /// through [`DictType::destroy_val`], so replacing a value with another
    /// handle to the same shared object never destroys it early.
    pub fn replace(&mut self, key: K, val: V) -> bool {
        match self.add_raw(key) {
            AddRaw::Added(id) => {
                self.set_val(id, val);
                true
            }
            AddRaw::Exists { id, .. } => {
                if let Some(old) = self.set_val(id, val) {
                    free_value::<K, V, T>(&self.ty, old);
                }
                false
            }
        }
    }

    /// Stores `val` (through [`DictType::dup_val`]) into the entry and
    /// returns the previous value slot without destroying it. Returns `None`
    /// if `id` is stale.
    pub fn set_val(&mut self, id: EntryId, val: V) -> Option<Value<V>> {
        let entry = self.entries.get_mut(id)?;
        Some(mem::replace(&mut entry.value, Value::Ref(self.ty.dup_val(val))))
    }

    /// Detaches the entry holding `key` and hands it to the caller without
    /// running any destructor.
    ///
    /// Use this instead of a lookup followed by [`delete`](Self::delete) when
    /// the old value is still needed; release the entry afterwards with
    /// [`free_unlinked_entry`](Self::free_unlinked_entry).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::Dict;
    /// # use rehash_dict::HasherType;
    /// # use std::collections::hash_map::RandomState;
    /// let mut dict = Dict::new(HasherType::new(RandomState::new()));
    /// dict.add("session", 17u32).unwrap();
    ///
    /// let entry = dict.unlink(&"session").unwrap();
    /// assert_eq!(entry.val(), Some(&17));
    /// assert!(dict.is_empty());
    /// dict.free_unlinked_entry(entry);
    /// ```
    pub fn unlink(&mut self, key: &K) -> Option<Entry<K, V>> {
        if self.len() == 0 {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }

        let hash = self.ty.hash(key);
        for table in 0..2 {
            let slot = self.ht[table].slot(hash);
            let mut prev: Option<EntryId> = None;
            let mut cursor = self.ht[table].buckets.get(slot).copied().flatten();
            while let Some(id) = cursor {
                let Some(entry) = self.entries.get(id) else {
                    break;
                };
                let next = entry.next;
                if self.keys_match(key, &entry.key) {
                    match prev {
                        Some(prev) => {
                            if let Some(prev) = self.entries.get_mut(prev) {
                                prev.next = next;
                            }
                        }
                        None => self.ht[table].buckets[slot] = next,
                    }
                    self.ht[table].used -= 1;

                    let mut entry = self.entries.remove(id)?;
                    entry.next = None;
                    return Some(entry);
                }
                prev = Some(id);
                cursor = next;
            }

            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// Runs the key and value destructors on an entry returned by
    /// [`unlink`](Self::unlink).
    pub fn free_unlinked_entry(&self, entry: Entry<K, V>) {
        free_entry(&self.ty, entry);
    }

    /// Removes `key`, running its destructors. Returns `true` if it was
    /// present.
    pub fn delete(&mut self, key: &K) -> bool {
        match self.unlink(key) {
            Some(entry) => {
                self.free_unlinked_entry(entry);
                true
            }
            None => false,
        }
    }

    /// Removes every entry and returns to the unallocated stable state.
    ///
    /// Pauses held by live safe iterators or scans are kept, so they still
    /// release cleanly afterwards.
    pub fn empty(&mut self) {
        self.empty_with(|_| {});
    }

    /// Like [`empty`](Self::empty), calling `progress` every 65536 buckets
    /// visited so that freeing a huge dictionary can interleave other work.
    pub fn empty_with(&mut self, mut progress: impl FnMut(&T)) {
        let freed = self.len();
        for table in &mut self.ht {
            table.clear(&mut self.entries, &self.ty, &mut progress);
        }
        self.rehash = Rehash::Stable;
        tracing::debug!(freed, "dictionary emptied");
    }

    /// A 64-bit digest of the structural state of both bucket arrays.
    ///
    /// Any insert, delete, resize or rehash step changes it. Unsafe
    /// iterators compare it on release to catch forbidden mutation.
    pub fn fingerprint(&self) -> u64 {
        let integers = [
            self.ht[0].addr() as u64,
            self.ht[0].size() as u64,
            self.ht[0].used as u64,
            self.ht[1].addr() as u64,
            self.ht[1].size() as u64,
            self.ht[1].used as u64,
        ];

        // hash(hash(hash(int1) + int2) + int3) ..., so order matters.
        integers
            .into_iter()
            .fold(0u64, |hash, n| wang_mix(hash.wrapping_add(n)))
    }
}

/// Thomas Wang's 64-bit integer mix.
#[inline]
fn wang_mix(mut hash: u64) -> u64 {
    hash = (!hash).wrapping_add(hash << 21);
    hash ^= hash >> 24;
    hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
    hash ^= hash >> 14;
    hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
    hash ^= hash >> 28;
    hash.wrapping_add(hash << 31)
}
