use core::fmt::Debug;

slotmap::new_key_type! {
    /// A generational handle to an entry stored in a [`Dict`].
    ///
    /// Handles stay valid while the entry is relocated between bucket arrays
    /// during incremental rehashing. Once the entry is deleted the handle goes
    /// stale and resolves to nothing, even if its storage is later reused.
    ///
    /// [`Dict`]: crate::Dict
    pub struct EntryId;
}

/// The value slot of an entry.
///
/// Exactly one variant is active at a time. Only [`Value::Ref`] passes
/// through the value duplicate and destructor callbacks of the dictionary
/// type; the numeric variants are stored inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<V> {
    /// A caller-supplied value.
    Ref(V),
    /// A signed 64-bit integer.
    Signed(i64),
    /// An unsigned 64-bit integer.
    Unsigned(u64),
    /// A 64-bit float.
    Double(f64),
}

impl<V> Default for Value<V> {
    fn default() -> Self {
        Value::Unsigned(0)
    }
}

impl<V> Value<V> {
    /// Returns the caller value if this is [`Value::Ref`].
    pub fn val(&self) -> Option<&V> {
        match self {
            Value::Ref(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the caller value mutably if this is [`Value::Ref`].
    pub fn val_mut(&mut self) -> Option<&mut V> {
        match self {
            Value::Ref(v) => Some(v),
            _ => None,
        }
    }

    /// Consumes the slot, returning the caller value if there was one.
    pub fn into_val(self) -> Option<V> {
        match self {
            Value::Ref(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the signed integer if this is [`Value::Signed`].
    pub fn signed(&self) -> Option<i64> {
        match *self {
            Value::Signed(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the unsigned integer if this is [`Value::Unsigned`].
    pub fn unsigned(&self) -> Option<u64> {
        match *self {
            Value::Unsigned(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the float if this is [`Value::Double`].
    pub fn double(&self) -> Option<f64> {
        match *self {
            Value::Double(d) => Some(d),
            _ => None,
        }
    }
}

/// A key/value node linked into one bucket chain.
///
/// `next` points at the following entry of the same chain. Entries are owned
/// by the dictionary arena and reachable from exactly one bucket at a time.
pub struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: Value<V>,
    pub(crate) next: Option<EntryId>,
}

impl<K: Debug, V: Debug> Debug for Entry<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, next: Option<EntryId>) -> Self {
        Self {
            key,
            value: Value::default(),
            next,
        }
    }

    /// Returns the stored key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the value slot.
    pub fn value(&self) -> &Value<V> {
        &self.value
    }

    /// Returns the value slot mutably.
    pub fn value_mut(&mut self) -> &mut Value<V> {
        &mut self.value
    }

    /// Shortcut for `self.value().val()`.
    pub fn val(&self) -> Option<&V> {
        self.value.val()
    }

    /// Stores a signed integer, replacing whatever the slot held.
    pub fn set_signed_integer_val(&mut self, n: i64) {
        self.value = Value::Signed(n);
    }

    /// Stores an unsigned integer, replacing whatever the slot held.
    pub fn set_unsigned_integer_val(&mut self, n: u64) {
        self.value = Value::Unsigned(n);
    }

    /// Stores a float, replacing whatever the slot held.
    pub fn set_double_val(&mut self, d: f64) {
        self.value = Value::Double(d);
    }

    /// Splits the entry into its key and value slot.
    pub fn into_parts(self) -> (K, Value<V>) {
        (self.key, self.value)
    }
}
