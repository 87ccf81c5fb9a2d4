#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(all(test, not(feature = "std")))]
extern crate std;

mod context;
mod dict;
mod entry;
mod error;
mod iter;
mod random;
mod scan;
#[cfg(feature = "stats")]
mod stats;
mod table;
mod types;

/// A `HashMap` facade over [`Dict`].
///
/// This module provides a `HashMap` that wraps the incremental-rehash engine
/// behind a standard key-value map interface with configurable hashers.
pub mod hash_map;

pub use context::DictContext;
pub use context::FORCE_RESIZE_RATIO;
pub use dict::AddRaw;
pub use dict::Dict;
pub use entry::Entry;
pub use entry::EntryId;
pub use entry::Value;
pub use error::KeyExists;
pub use error::ResizeError;
pub use hash_map::HashMap;
pub use iter::DictIterator;
pub use iter::Iter;
pub use iter::SafeIter;
pub use scan::Bucket;
#[cfg(feature = "stats")]
pub use stats::CHAIN_HISTOGRAM_LEN;
#[cfg(feature = "stats")]
pub use stats::DictStats;
#[cfg(feature = "stats")]
pub use stats::TableStats;
pub use table::INITIAL_SIZE;
pub use types::BytesType;
pub use types::CaseBytesType;
pub use types::DictType;
pub use types::HasherType;
