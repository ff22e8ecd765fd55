//! Per-invocation view of the world state
//!
//! A [`TxContext`] wraps a committed snapshot with a private [`WriteSet`].
//! Reads see the invocation's own earlier writes; nothing reaches the ledger
//! until the caller commits the write set, so a failing step leaves no
//! partial write behind.

use crate::{
    codec::RecordCodec,
    keys::KeyRange,
    store::{collect_range, KeyValueLedger, WriteSet},
    Result,
};
use serde::{de::DeserializeOwned, Serialize};

/// Read-your-writes overlay over a ledger snapshot
pub struct TxContext<'a> {
    ledger: &'a dyn KeyValueLedger,
    writes: WriteSet,
}

impl<'a> TxContext<'a> {
    /// Start an invocation against `ledger`
    pub fn new(ledger: &'a dyn KeyValueLedger) -> Self {
        Self {
            ledger,
            writes: WriteSet::new(),
        }
    }

    /// Raw read, pending writes first
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.to_vec()));
        }
        self.ledger.get(key)
    }

    /// Raw buffered write
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.put(key, value);
    }

    /// Read and decode a JSON record; `None` when the key is absent
    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => RecordCodec::decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encode and buffer a JSON record
    pub fn put_record<T: Serialize>(&mut self, key: impl Into<String>, record: &T) -> Result<()> {
        let bytes = RecordCodec::encode(record)?;
        self.writes.put(key, bytes);
        Ok(())
    }

    /// Every committed entry of `range`.
    ///
    /// Scans read the committed snapshot only, never pending writes.
    pub fn range(&self, range: &KeyRange) -> Result<Vec<(String, Vec<u8>)>> {
        collect_range(self.ledger, range)
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &'a dyn KeyValueLedger {
        self.ledger
    }

    /// Writes buffered so far
    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    /// Finish the invocation, yielding its writes
    pub fn into_writes(self) -> WriteSet {
        self.writes
    }
}

impl std::fmt::Debug for TxContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("pending", &self.writes.len())
            .finish()
    }
}
