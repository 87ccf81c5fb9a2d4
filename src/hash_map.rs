use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::dict::AddRaw;
use crate::dict::Dict;
use crate::entry::Value;
use crate::iter;
use crate::types::HasherType;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher builder used when none is named.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// Hasher builder used when none is named.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    } else {
        /// Hasher builder used when none is named: unkeyed SipHash-1-3.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct DefaultHashBuilder;

        impl BuildHasher for DefaultHashBuilder {
            type Hasher = siphasher::sip::SipHasher13;

            fn build_hasher(&self) -> Self::Hasher {
                siphasher::sip::SipHasher13::new()
            }
        }
    }
}

/// A key-value map backed by an incrementally rehashed [`Dict`].
///
/// `HashMap<K, V, S>` offers the familiar map interface for keys that
/// implement `Hash + Eq`. Growth never rebuilds the table in one go: each
/// insert, lookup through `&mut self` and removal moves one bucket of a
/// pending migration, so latency stays flat while the map grows.
///
/// Lookups through `&self` ([`get`](Self::get),
/// [`contains_key`](Self::contains_key)) do not advance a migration.
///
/// # Performance Characteristics
///
/// - **Memory**: one chain head per bucket plus, per entry, the key, the
///   value slot and a generational next-handle in the entry arena.
/// - **Resize**: amortized over subsequent operations; during a migration
///   both bucket arrays are live.
pub struct HashMap<K, V, S = DefaultHashBuilder>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    dict: Dict<K, V, HasherType<S>>,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug + Hash + Eq,
    V: Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher13;
    /// #
    /// # use rehash_dict::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher13;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher13::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 0);
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            dict: Dict::new(HasherType::new(hash_builder)),
        }
    }

    /// Creates an empty map with room for at least `capacity` entries before
    /// the first migration.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        let mut map = Self::with_hasher(hash_builder);
        map.reserve(capacity);
        map
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.dict.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    /// Number of buckets in the table currently receiving inserts.
    ///
    /// Chaining lets the map hold more entries than this; it is the point at
    /// which the next migration starts.
    pub fn capacity(&self) -> usize {
        if self.dict.is_rehashing() {
            self.dict.ht[1].size()
        } else {
            self.dict.ht[0].size()
        }
    }

    /// Removes every entry and releases both bucket arrays.
    pub fn clear(&mut self) {
        self.dict.empty();
    }

    /// Makes room for `additional` more entries.
    ///
    /// A pending migration is finished first, so this may take time
    /// proportional to the current table size.
    pub fn reserve(&mut self, additional: usize) {
        let wanted = self.len().saturating_add(additional);
        if wanted <= self.capacity() {
            return;
        }
        while self.dict.rehash(100) {}
        if let Err(err) = self.dict.expand(wanted) {
            tracing::debug!(%err, wanted, "reserve declined");
        }
    }

    /// Starts a migration to the smallest table that fits the current
    /// entries. The migration proceeds incrementally like any other.
    pub fn shrink_to_fit(&mut self) {
        while self.dict.rehash(100) {}
        if let Err(err) = self.dict.resize_to_fit() {
            tracing::debug!(%err, "shrink declined");
        }
    }

    /// Inserts a key-value pair, returning the previous value of the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::HashMap;
    /// let mut map = HashMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.dict.add_raw(key) {
            AddRaw::Added(id) => {
                self.dict.set_val(id, value);
                None
            }
            AddRaw::Exists { id, .. } => self.dict.set_val(id, value).and_then(Value::into_val),
        }
    }

    /// Returns a reference to the value of `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.dict.get(key).and_then(|entry| entry.val())
    }

    /// Returns a mutable reference to the value of `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.dict
            .find_mut(key)
            .and_then(|entry| entry.value_mut().val_mut())
    }

    /// Returns `true` if the map holds `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.dict.get(key).is_some()
    }

    /// Removes `key`, returning its value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::HashMap;
    /// let mut map = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key`, returning the stored key and its value.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let (key, value) = self.dict.unlink(key)?.into_parts();
        Some((key, value.into_val()?))
    }

    /// Iterator over `(&K, &V)` in bucket order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.dict.iter(),
        }
    }

    /// Iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Iterator over the values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// The underlying dictionary, for scans, sampling and explicit rehash
    /// control.
    pub fn as_dict(&self) -> &Dict<K, V, HasherType<S>> {
        &self.dict
    }

    /// Mutable [`as_dict`](Self::as_dict). Values written through raw
    /// setters such as [`Entry::set_signed_integer_val`] are invisible to the
    /// map accessors.
    ///
    /// [`Entry::set_signed_integer_val`]: crate::Entry::set_signed_integer_val
    pub fn as_dict_mut(&mut self) -> &mut Dict<K, V, HasherType<S>> {
        &mut self.dict
    }
}

impl<K, V> HashMap<K, V, DefaultHashBuilder>
where
    K: Hash + Eq,
{
    /// Creates an empty map with the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty map with the default hasher builder and room for
    /// `capacity` entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rehash_dict::HashMap;
    /// let map: HashMap<i32, String> = HashMap::with_capacity(100);
    /// assert_eq!(map.capacity(), 128);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

/// Iterator over the entries of a [`HashMap`].
pub struct Iter<'a, K, V> {
    inner: iter::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .by_ref()
            .find_map(|(k, v)| v.val().map(|v| (k, v)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

/// Iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// Iterator over the values of a [`HashMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}
