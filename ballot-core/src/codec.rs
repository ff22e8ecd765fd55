//! Record codec
//!
//! Elections, candidates and voters are stored as JSON documents. Audit
//! entries are stored as the raw bytes of the candidate key. Decoding never
//! guesses: a value that is present but does not parse is reported as
//! [`Error::Corrupt`] against its key.

use crate::{
    types::{Candidate, Election, KeyedRecord, Voter},
    Error, Result,
};
use serde::{de::DeserializeOwned, Serialize};

/// Stateless encoder/decoder for ledger values
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl RecordCodec {
    /// Encode a JSON record
    pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(record)?)
    }

    /// Decode a JSON record found under `key`
    pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::corrupt(key, e))
    }

    /// Decode an election
    pub fn decode_election(key: &str, bytes: &[u8]) -> Result<Election> {
        Self::decode(key, bytes)
    }

    /// Decode a candidate
    pub fn decode_candidate(key: &str, bytes: &[u8]) -> Result<Candidate> {
        Self::decode(key, bytes)
    }

    /// Decode a voter
    pub fn decode_voter(key: &str, bytes: &[u8]) -> Result<Voter> {
        Self::decode(key, bytes)
    }

    /// Encode an audit value (raw candidate key)
    pub fn encode_audit(candidate_id: &str) -> Vec<u8> {
        candidate_id.as_bytes().to_vec()
    }

    /// Decode an audit value found under `key`
    pub fn decode_audit(key: &str, bytes: &[u8]) -> Result<String> {
        let candidate = std::str::from_utf8(bytes).map_err(|e| Error::corrupt(key, e))?;
        if candidate.is_empty() {
            return Err(Error::corrupt(key, "empty audit value"));
        }
        Ok(candidate.to_string())
    }

    /// Wrap a raw value for a `{Key, Record}` listing.
    ///
    /// JSON values are embedded as-is; anything else (audit entries) is
    /// embedded as a string.
    pub fn keyed(key: String, bytes: &[u8]) -> KeyedRecord {
        let record = serde_json::from_slice(bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        });
        KeyedRecord { key, record }
    }
}
