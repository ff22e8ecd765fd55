//! Core record types for the ballot ledger
//!
//! Field names follow the JSON layout already persisted on the ledger
//! (`electionID`, `electionHistory`, `votedTo`, ...), so every type carries
//! explicit serde renames instead of a blanket `rename_all`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Date layout shared by every election timestamp (`YYYY-MM-DD HH:MM:SS`)
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a ledger date, ignoring surrounding whitespace
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Election record, stored under `election.<id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// Full ledger key of the election
    #[serde(rename = "electionID")]
    pub election_id: String,

    /// Display name
    #[serde(rename = "electionName")]
    pub election_name: String,

    /// Opening date
    #[serde(rename = "startDate")]
    pub start_date: String,

    /// Closing date; votes after this instant are rejected
    #[serde(rename = "endDate")]
    pub end_date: String,

    /// Caller supplied creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: String,

    /// Caller supplied timestamp of the last field patch
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

impl Election {
    /// Parsed end date, `None` when the stored string is malformed
    pub fn end_date(&self) -> Option<NaiveDateTime> {
        parse_date(&self.end_date)
    }
}

/// Per-election vote counter embedded in a candidate record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateElection {
    /// Election key
    #[serde(rename = "electionID")]
    pub election_id: String,

    /// Cached vote count; the audit trail is authoritative
    pub votes: u64,
}

/// Candidate record, stored under `candidate.<userID>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Display name
    pub name: String,

    /// Full ledger key of the candidate
    #[serde(default)]
    pub id: String,

    /// Elections this candidate stands in
    #[serde(default, deserialize_with = "null_as_empty")]
    pub elections: Vec<CandidateElection>,
}

impl Candidate {
    /// Association entry for `election_id`
    pub fn election(&self, election_id: &str) -> Option<&CandidateElection> {
        self.elections.iter().find(|e| e.election_id == election_id)
    }

    /// Mutable association entry for `election_id`
    pub fn election_mut(&mut self, election_id: &str) -> Option<&mut CandidateElection> {
        self.elections
            .iter_mut()
            .find(|e| e.election_id == election_id)
    }

    /// Whether the candidate stands in `election_id`
    pub fn stands_in(&self, election_id: &str) -> bool {
        self.election(election_id).is_some()
    }
}

/// One participation entry in a voter's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Election key
    #[serde(rename = "electionID")]
    pub election_id: String,

    /// Candidate key the vote went to
    #[serde(rename = "votedTo")]
    pub voted_to: String,
}

/// Voter record, stored under `voter.<userID>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// Full ledger key of the voter
    pub id: String,

    /// Append-only participation history
    #[serde(
        rename = "electionHistory",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub election_history: Vec<HistoryEntry>,
}

impl Voter {
    /// Create a voter with an empty history
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            election_history: Vec::new(),
        }
    }

    /// Whether the history already holds a cast vote for `election_id`
    pub fn has_voted_in(&self, election_id: &str) -> bool {
        self.election_history
            .iter()
            .any(|h| h.election_id == election_id && !h.voted_to.is_empty())
    }
}

/// Proof of one cast vote: `record_<election>_<voter>` -> candidate key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteAuditEntry {
    /// Election key
    pub election_id: String,
    /// Voter key
    pub voter_id: String,
    /// Candidate key
    pub candidate_id: String,
}

/// Range scan row as returned to callers (`{"Key": .., "Record": ..}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedRecord {
    /// Ledger key
    #[serde(rename = "Key")]
    pub key: String,

    /// Decoded value
    #[serde(rename = "Record")]
    pub record: serde_json::Value,
}

/// Patchable election fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionField {
    /// `electionName`
    Name,
    /// `startDate`
    StartDate,
    /// `endDate`
    EndDate,
}

impl FromStr for ElectionField {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "name" => Ok(ElectionField::Name),
            "startDate" => Ok(ElectionField::StartDate),
            "endDate" => Ok(ElectionField::EndDate),
            other => Err(crate::Error::InvalidArgument(format!(
                "invalid target: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ElectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElectionField::Name => "name",
            ElectionField::StartDate => "startDate",
            ElectionField::EndDate => "endDate",
        };
        f.write_str(name)
    }
}

/// Authoritative per-candidate vote count for one election
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tally(BTreeMap<String, u64>);

impl Tally {
    /// Count one vote for `candidate_id`
    pub fn add_vote(&mut self, candidate_id: impl Into<String>) {
        *self.0.entry(candidate_id.into()).or_insert(0) += 1;
    }

    /// Votes counted for `candidate_id`
    pub fn votes_for(&self, candidate_id: &str) -> u64 {
        self.0.get(candidate_id).copied().unwrap_or(0)
    }

    /// Total votes counted
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Whether no vote was counted
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(candidate, votes)` in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Difference between a cached candidate counter and the audit tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDrift {
    /// Candidate key
    pub candidate: String,
    /// Counter stored in the candidate record before reconciliation
    pub cached: u64,
    /// Count derived from the audit trail
    pub audited: u64,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
