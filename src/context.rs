use core::cell::Cell;
use core::hash::Hasher;

use siphasher::sip::SipHasher13;

/// Default overload ratio above which a table grows even while resizing is
/// disabled.
pub const FORCE_RESIZE_RATIO: usize = 5;

/// Settings shared by every dictionary created from it.
///
/// A context holds what would otherwise be process-wide switches: whether
/// automatic resizing is enabled, the forced-resize ratio, the 16-byte seed of
/// the keyed hash function and the seed from which per-dictionary random
/// number generators are derived. Share one context between dictionaries with
/// an [`Rc`](alloc::rc::Rc); toggling it affects all of them at once.
///
/// # Examples
///
/// ```rust
/// use rehash_dict::DictContext;
///
/// let ctx = DictContext::new();
/// ctx.set_hash_seed([7; 16]);
/// let a = ctx.gen_hash(b"key");
/// assert_eq!(a, ctx.gen_hash(b"key"));
///
/// ctx.set_hash_seed([8; 16]);
/// assert_ne!(a, ctx.gen_hash(b"key"));
/// ```
#[derive(Debug)]
pub struct DictContext {
    resize_enabled: Cell<bool>,
    force_resize_ratio: usize,
    hash_seed: Cell<[u8; 16]>,
    rng_seed: Cell<u64>,
}

impl Default for DictContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DictContext {
    /// Creates a context with resizing enabled, the default forced-resize
    /// ratio and an all-zero hash seed.
    pub fn new() -> Self {
        Self::with_force_resize_ratio(FORCE_RESIZE_RATIO)
    }

    /// Creates a context with a custom forced-resize ratio.
    pub fn with_force_resize_ratio(ratio: usize) -> Self {
        Self {
            resize_enabled: Cell::new(true),
            force_resize_ratio: ratio,
            hash_seed: Cell::new([0; 16]),
            rng_seed: Cell::new(0),
        }
    }

    /// Creates a context whose hash seed and random seed come from the OS.
    #[cfg(feature = "std")]
    pub fn from_os_rng() -> Self {
        use rand::TryRngCore;
        use rand::rngs::OsRng;

        let ctx = Self::new();
        let mut rng = OsRng;
        let mut seed = [0u8; 16];
        if rng.try_fill_bytes(&mut seed).is_ok() {
            ctx.set_hash_seed(seed);
        }
        if let Ok(n) = rng.try_next_u64() {
            ctx.rng_seed.set(n);
        }
        ctx
    }

    /// Allows tables to grow and shrink normally.
    pub fn enable_resize(&self) {
        self.resize_enabled.set(true);
    }

    /// Suppresses resizing. Tables still grow once their load exceeds the
    /// forced-resize ratio.
    pub fn disable_resize(&self) {
        self.resize_enabled.set(false);
    }

    /// Returns whether resizing is currently enabled.
    pub fn resize_enabled(&self) -> bool {
        self.resize_enabled.get()
    }

    /// Returns the load ratio that forces growth while resizing is disabled.
    pub fn force_resize_ratio(&self) -> usize {
        self.force_resize_ratio
    }

    /// Replaces the seed of [`gen_hash`](Self::gen_hash). Set it before the
    /// first hash is computed so stored keys stay reachable.
    pub fn set_hash_seed(&self, seed: [u8; 16]) {
        self.hash_seed.set(seed);
    }

    /// Returns the current hash seed.
    pub fn hash_seed(&self) -> [u8; 16] {
        self.hash_seed.get()
    }

    /// Keyed SipHash-1-3 of `bytes` under the current seed.
    pub fn gen_hash(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.sip();
        hasher.write(bytes);
        hasher.finish()
    }

    /// Like [`gen_hash`](Self::gen_hash) but ASCII case-insensitive.
    pub fn gen_case_hash(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.sip();
        for b in bytes {
            hasher.write_u8(b.to_ascii_lowercase());
        }
        hasher.finish()
    }

    /// Hands out a fresh seed for a dictionary's random number generator.
    pub(crate) fn next_rng_seed(&self) -> u64 {
        // splitmix64
        let n = self.rng_seed.get().wrapping_add(0x9e37_79b9_7f4a_7c15);
        self.rng_seed.set(n);
        let mut z = n;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn sip(&self) -> SipHasher13 {
        let seed = self.hash_seed.get();
        let mut k0 = [0u8; 8];
        let mut k1 = [0u8; 8];
        k0.copy_from_slice(&seed[..8]);
        k1.copy_from_slice(&seed[8..]);
        SipHasher13::new_with_keys(u64::from_le_bytes(k0), u64::from_le_bytes(k1))
    }
}
