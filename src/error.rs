use alloc::collections::TryReserveError;

/// Reasons a resize request was not carried out.
///
/// Everything except [`ResizeError::AllocFailed`] is a declined request that
/// left the dictionary untouched; the caller may retry later.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResizeError {
    /// An incremental rehash is already in progress.
    #[error("an incremental rehash is already in progress")]
    Rehashing,
    /// The requested size cannot hold the entries already stored.
    #[error("requested size {requested} is smaller than the {used} stored entries")]
    TooSmall {
        /// Entries currently stored in the primary table.
        used: usize,
        /// The size that was asked for.
        requested: usize,
    },
    /// The requested size rounds up to the current bucket count.
    #[error("table already has {0} buckets")]
    SameSize(usize),
    /// The requested size cannot be represented as a bucket array.
    #[error("requested size {0} overflows the bucket array")]
    Overflow(usize),
    /// Resizing is disabled on the dictionary context.
    #[error("resizing is disabled")]
    ResizeDisabled,
    /// The bucket array could not be allocated.
    #[error("bucket array allocation failed: {0}")]
    AllocFailed(TryReserveError),
}

/// Returned by [`Dict::add`] when the key is already present.
///
/// Ownership of the rejected key and value goes back to the caller.
///
/// [`Dict::add`]: crate::Dict::add
#[derive(Debug)]
pub struct KeyExists<K, V> {
    /// Handle of the entry already holding the key.
    pub id: crate::EntryId,
    /// The key that was not inserted.
    pub key: K,
    /// The value that was not inserted.
    pub value: V,
}
