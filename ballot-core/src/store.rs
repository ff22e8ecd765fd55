//! World state storage
//!
//! The state machine only needs three primitives from its substrate: point
//! get, point put and an ascending range scan over `[start, end)`. A scan may
//! stop after one bounded page; callers that need the whole interval go
//! through [`for_each_in_range`], which re-issues the scan just past the last
//! key seen until an empty page comes back.
//!
//! # Backends
//!
//! - [`MemoryLedger`] - `BTreeMap` behind a lock, page size chosen by caller
//! - [`RocksLedger`] - RocksDB column family `world_state`, page size from config

use crate::{
    error::{Error, Result},
    keys::{KeyRange, KeyScheme},
    Config,
};
use parking_lot::RwLock;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    ReadOptions, WriteBatch, DB,
};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// Column family holding every key of the world state
const CF_STATE: &str = "world_state";

/// Ordered key-value substrate
pub trait KeyValueLedger: Send + Sync {
    /// Point read
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Point write
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// One page of the ascending scan over `[start, end)`
    fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Apply every write of one invocation.
    ///
    /// The default applies puts one by one; backends with batch support
    /// override it with an atomic commit.
    fn commit(&self, writes: &WriteSet) -> Result<()> {
        for (key, value) in writes.iter() {
            self.put(key, value)?;
        }
        Ok(())
    }
}

impl<L: KeyValueLedger + ?Sized> KeyValueLedger for Arc<L> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>> {
        (**self).scan(start, end)
    }

    fn commit(&self, writes: &WriteSet) -> Result<()> {
        (**self).commit(writes)
    }
}

/// Visit every entry of `range`, following scan pages to the end.
///
/// Returns the number of entries visited.
pub fn for_each_in_range<L, F>(ledger: &L, range: &KeyRange, mut visit: F) -> Result<usize>
where
    L: KeyValueLedger + ?Sized,
    F: FnMut(String, Vec<u8>) -> Result<()>,
{
    let mut from = range.start.clone();
    let mut visited = 0usize;
    let mut pages = 0usize;

    loop {
        let page = ledger.scan(&from, &range.end)?;
        if page.is_empty() {
            break;
        }
        pages += 1;

        let mut last = None;
        for (key, value) in page {
            // A backend that restarts inclusively would hand back the
            // resume key; it was already counted on the previous page.
            if pages > 1 && key < from {
                continue;
            }
            last = Some(key.clone());
            visit(key, value)?;
            visited += 1;
        }

        match last {
            Some(key) => from = KeyScheme::successor(&key),
            None => break,
        }
    }

    tracing::debug!(
        start = %range.start,
        end = %range.end,
        pages,
        visited,
        "Range scan complete"
    );

    Ok(visited)
}

/// Collect every entry of `range`
pub fn collect_range<L>(ledger: &L, range: &KeyRange) -> Result<Vec<(String, Vec<u8>)>>
where
    L: KeyValueLedger + ?Sized,
{
    let mut entries = Vec::new();
    for_each_in_range(ledger, range, |key, value| {
        entries.push((key, value));
        Ok(())
    })?;
    Ok(entries)
}

/// Writes produced by one invocation, ordered by key.
///
/// Two executions over the same snapshot with the same arguments produce
/// byte-identical write sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    writes: BTreeMap<String, Vec<u8>>,
}

impl WriteSet {
    /// Empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a write, replacing an earlier write to the same key
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), value);
    }

    /// Buffered value for `key`
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.writes.get(key).map(Vec::as_slice)
    }

    /// Number of buffered writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Iterate writes in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.writes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Written keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.writes.keys().map(String::as_str)
    }
}

/// In-memory ledger
pub struct MemoryLedger {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
}

impl MemoryLedger {
    /// Ledger returning whole ranges in one page
    pub fn new() -> Self {
        Self::with_page_size(usize::MAX)
    }

    /// Ledger returning at most `page_size` entries per scan call
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("keys", &self.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl KeyValueLedger for MemoryLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let entries = self.entries.read();
        let page = entries
            .range::<str, _>((Bound::Included(start), Bound::Excluded(end)))
            .take(self.page_size)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(page)
    }

    fn commit(&self, writes: &WriteSet) -> Result<()> {
        let mut entries = self.entries.write();
        for (key, value) in writes.iter() {
            entries.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }
}

/// RocksDB-backed ledger
pub struct RocksLedger {
    db: Arc<DB>,
    page_size: usize,
}

impl RocksLedger {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(
            CF_STATE,
            Self::cf_options_state(),
        )];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            page_size = config.scan.page_size,
            "Opened RocksDB world state"
        );

        Ok(Self {
            db: Arc::new(db),
            page_size: config.scan.page_size.max(1),
        })
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Point reads dominate, use LZ4 and bloom filters
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_STATE)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_STATE)))
    }

    /// Approximate number of stored keys
    pub fn approximate_len(&self) -> Result<u64> {
        let cf = self.cf_handle()?;
        let count = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(count)
    }
}

impl fmt::Debug for RocksLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksLedger")
            .field("path", &self.db.path())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl KeyValueLedger for RocksLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle()?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let cf = self.cf_handle()?;
        self.db.put_cf(cf, key.as_bytes(), value)?;
        Ok(())
    }

    fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let cf = self.cf_handle()?;

        let mut read_opts = ReadOptions::default();
        read_opts.set_iterate_upper_bound(end.as_bytes().to_vec());

        let iter = self.db.iterator_cf_opt(
            cf,
            read_opts,
            IteratorMode::From(start.as_bytes(), Direction::Forward),
        );

        let mut page = Vec::new();
        for item in iter.take(self.page_size) {
            let (key, value) = item?;
            let key = String::from_utf8(key.into_vec())
                .map_err(|e| Error::Storage(format!("Non UTF-8 key in world state: {}", e)))?;
            page.push((key, value.into_vec()));
        }
        Ok(page)
    }

    fn commit(&self, writes: &WriteSet) -> Result<()> {
        let cf = self.cf_handle()?;
        let mut batch = WriteBatch::default();
        for (key, value) in writes.iter() {
            batch.put_cf(cf, key.as_bytes(), value);
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(writes = writes.len(), "Write set committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(page_size: usize) -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.scan.page_size = page_size;
        (config, temp_dir)
    }

    fn fill(ledger: &dyn KeyValueLedger, count: usize) {
        for i in 0..count {
            ledger
                .put(&format!("voter.v{:03}", i), format!("{}", i).as_bytes())
                .unwrap();
        }
        ledger.put("election.1", b"{}").unwrap();
    }

    #[test]
    fn test_memory_scan_respects_page_size() {
        let ledger = MemoryLedger::with_page_size(3);
        fill(&ledger, 10);

        let page = ledger.scan("voter.", "voter/").unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].0, "voter.v000");
    }

    #[test]
    fn test_memory_scan_inverted_range_is_empty() {
        let ledger = MemoryLedger::new();
        fill(&ledger, 2);
        assert!(ledger.scan("voter/", "voter.").unwrap().is_empty());
        assert!(ledger.scan("voter.", "voter.").unwrap().is_empty());
    }

    #[test]
    fn test_for_each_in_range_follows_pages() {
        for page_size in [1, 2, 3, 7, 100] {
            let ledger = MemoryLedger::with_page_size(page_size);
            fill(&ledger, 10);

            let entries = collect_range(&ledger, &KeyRange::new("voter.", "voter/")).unwrap();
            let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(keys.len(), 10, "page size {}", page_size);
            assert_eq!(keys.first(), Some(&"voter.v000"));
            assert_eq!(keys.last(), Some(&"voter.v009"));
        }
    }

    #[test]
    fn test_write_set_orders_and_replaces() {
        let mut writes = WriteSet::new();
        writes.put("voter.b", b"1".to_vec());
        writes.put("voter.a", b"2".to_vec());
        writes.put("voter.b", b"3".to_vec());

        assert_eq!(writes.len(), 2);
        assert_eq!(writes.keys().collect::<Vec<_>>(), vec!["voter.a", "voter.b"]);
        assert_eq!(writes.get("voter.b"), Some(&b"3"[..]));
    }

    #[test]
    fn test_memory_commit() {
        let ledger = MemoryLedger::new();
        let mut writes = WriteSet::new();
        writes.put("a", b"1".to_vec());
        writes.put("b", b"2".to_vec());
        ledger.commit(&writes).unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_rocks_put_get() {
        let (config, _temp) = test_config(100);
        let ledger = RocksLedger::open(&config).unwrap();

        assert_eq!(ledger.get("voter.v1").unwrap(), None);
        ledger.put("voter.v1", b"{}").unwrap();
        assert_eq!(ledger.get("voter.v1").unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_rocks_scan_is_bounded() {
        let (config, _temp) = test_config(4);
        let ledger = RocksLedger::open(&config).unwrap();
        fill(&ledger, 10);

        let page = ledger.scan("voter.", "voter/").unwrap();
        assert_eq!(page.len(), 4);

        let all = collect_range(&ledger, &KeyRange::new("voter.", "voter/")).unwrap();
        assert_eq!(all.len(), 10);
        assert!(all.iter().all(|(k, _)| k.starts_with("voter.")));
    }

    #[test]
    fn test_rocks_commit_and_reopen() {
        let (config, _temp) = test_config(100);
        {
            let ledger = RocksLedger::open(&config).unwrap();
            let mut writes = WriteSet::new();
            writes.put("candidate.c1", b"{}".to_vec());
            writes.put("record_election.1_voter.v1", b"candidate.c1".to_vec());
            ledger.commit(&writes).unwrap();
        }

        let ledger = RocksLedger::open(&config).unwrap();
        assert_eq!(
            ledger.get("record_election.1_voter.v1").unwrap(),
            Some(b"candidate.c1".to_vec())
        );
    }
}
