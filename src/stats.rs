use crate::dict::Dict;
use crate::table::Entries;
use crate::table::Table;
use crate::types::DictType;

/// Number of histogram bins. The last bin counts every chain at least this
/// long minus one.
pub const CHAIN_HISTOGRAM_LEN: usize = 50;

/// Chain-length statistics of one bucket array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    /// Number of buckets.
    pub size: usize,
    /// Number of entries.
    pub used: usize,
    /// Number of non-empty buckets.
    pub slots: usize,
    /// Longest chain.
    pub max_chain_len: usize,
    /// Sum of all chain lengths, counted by walking the chains.
    pub total_chain_len: usize,
    /// `chain_len_histogram[n]` buckets have a chain of length `n`; bin 0
    /// counts empty buckets.
    pub chain_len_histogram: [usize; CHAIN_HISTOGRAM_LEN],
}

impl TableStats {
    fn collect<K, V>(table: &Table, entries: &Entries<K, V>) -> Option<Self> {
        if table.used == 0 {
            return None;
        }

        let mut stats = TableStats {
            size: table.size(),
            used: table.used,
            slots: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            chain_len_histogram: [0; CHAIN_HISTOGRAM_LEN],
        };
        for slot in 0..table.size() {
            let len = table.chain_len(entries, slot);
            stats.chain_len_histogram[len.min(CHAIN_HISTOGRAM_LEN - 1)] += 1;
            if len == 0 {
                continue;
            }
            stats.slots += 1;
            stats.max_chain_len = stats.max_chain_len.max(len);
            stats.total_chain_len += len;
        }
        Some(stats)
    }

    /// Average length of the non-empty chains, from the walked total.
    pub fn avg_chain_len_counted(&self) -> f64 {
        self.total_chain_len as f64 / self.slots as f64
    }

    /// Average length of the non-empty chains, from the entry count.
    pub fn avg_chain_len_computed(&self) -> f64 {
        self.used as f64 / self.slots as f64
    }
}

/// Statistics for both bucket arrays of a [`Dict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictStats {
    /// The primary table, or `None` when it holds no entries.
    pub main: Option<TableStats>,
    /// The rehash target, present only while rehashing and non-empty.
    pub rehashing_target: Option<TableStats>,
}

impl<K, V, T: DictType<K, V>> Dict<K, V, T> {
    /// Walks every chain and reports its length distribution.
    pub fn stats(&self) -> DictStats {
        let main = TableStats::collect(&self.ht[0], &self.entries);
        let rehashing_target = if self.is_rehashing() {
            TableStats::collect(&self.ht[1], &self.entries)
        } else {
            None
        };
        DictStats {
            main,
            rehashing_target,
        }
    }
}
