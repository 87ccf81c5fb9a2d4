use alloc::rc::Rc;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::context::DictContext;

/// Per-dictionary behavior: hashing, key comparison and the optional
/// duplicate/destroy hooks.
///
/// Only [`hash`](DictType::hash) is required. The implementing value doubles
/// as the dictionary's private data: every hook receives `&self`, so state
/// needed by the callbacks lives in the implementor.
///
/// | hook                | default                                |
/// |---------------------|----------------------------------------|
/// | `key_eq`            | identity only (the same stored key)    |
/// | `dup_key`/`dup_val` | stored as given                        |
/// | `destroy_key`/`val` | plain drop                             |
/// | `expand_allowed`    | every expansion allowed                |
///
/// # Examples
///
/// ```rust
/// use rehash_dict::Dict;
/// use rehash_dict::DictType;
///
/// struct Lengths;
///
/// impl DictType<String, usize> for Lengths {
///     fn hash(&self, key: &String) -> u64 {
///         key.len() as u64
///     }
///
///     fn key_eq(&self, a: &String, b: &String) -> bool {
///         a == b
///     }
/// }
///
/// let mut dict = Dict::new(Lengths);
/// assert!(dict.add("four".to_string(), 4).is_ok());
/// assert_eq!(dict.fetch_value(&"four".to_string()).and_then(|v| v.val()), Some(&4));
/// ```
pub trait DictType<K, V> {
    /// Computes the 64-bit digest of a key.
    fn hash(&self, key: &K) -> u64;

    /// Compares two keys. Probing checks reference identity first and only
    /// then calls this.
    fn key_eq(&self, a: &K, b: &K) -> bool {
        let _ = (a, b);
        false
    }

    /// Transforms a key as it is stored.
    fn dup_key(&self, key: K) -> K {
        key
    }

    /// Transforms a value as it is stored through [`Dict::set_val`] and the
    /// inserting operations.
    ///
    /// [`Dict::set_val`]: crate::Dict::set_val
    fn dup_val(&self, val: V) -> V {
        val
    }

    /// Runs when a stored key leaves the dictionary.
    fn destroy_key(&self, key: K) {
        drop(key);
    }

    /// Runs when a stored value leaves the dictionary.
    fn destroy_val(&self, val: V) {
        drop(val);
    }

    /// Vetoes an automatic expansion. `more_mem` is the size in bytes of the
    /// bucket array about to be allocated, `used_ratio` the current load.
    fn expand_allowed(&self, more_mem: usize, used_ratio: f64) -> bool {
        let _ = (more_mem, used_ratio);
        true
    }
}

/// Dictionary type for any `K: Hash + Eq`, hashed through a [`BuildHasher`].
#[derive(Debug, Clone, Default)]
pub struct HasherType<S> {
    hash_builder: S,
}

impl<S> HasherType<S> {
    /// Wraps a hasher builder.
    pub fn new(hash_builder: S) -> Self {
        Self { hash_builder }
    }

    /// Returns the wrapped hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }
}

impl<K, V, S> DictType<K, V> for HasherType<S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn hash(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Dictionary type for byte-string keys, hashed with the seeded
/// [`DictContext::gen_hash`].
#[derive(Debug, Clone)]
pub struct BytesType {
    ctx: Rc<DictContext>,
}

impl BytesType {
    /// Hashes with the seed of `ctx`.
    pub fn new(ctx: Rc<DictContext>) -> Self {
        Self { ctx }
    }
}

impl<K, V> DictType<K, V> for BytesType
where
    K: AsRef<[u8]>,
{
    fn hash(&self, key: &K) -> u64 {
        self.ctx.gen_hash(key.as_ref())
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a.as_ref() == b.as_ref()
    }
}

/// Like [`BytesType`] but keys compare and hash ASCII case-insensitively.
#[derive(Debug, Clone)]
pub struct CaseBytesType {
    ctx: Rc<DictContext>,
}

impl CaseBytesType {
    /// Hashes with the seed of `ctx`.
    pub fn new(ctx: Rc<DictContext>) -> Self {
        Self { ctx }
    }
}

impl<K, V> DictType<K, V> for CaseBytesType
where
    K: AsRef<[u8]>,
{
    fn hash(&self, key: &K) -> u64 {
        self.ctx.gen_case_hash(key.as_ref())
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a.as_ref().eq_ignore_ascii_case(b.as_ref())
    }
}
