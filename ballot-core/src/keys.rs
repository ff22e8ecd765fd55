//! Key layout of the world state
//!
//! ```text
//! election.<id>                      -> Election JSON
//! candidate.<userID>                 -> Candidate JSON
//! voter.<userID>                     -> Voter JSON
//! record_<electionKey>_<voterKey>    -> candidate key (raw bytes)
//! ```
//!
//! Natural ids are normalized by prefixing the entity kind when it is
//! missing, so `"1"` and `"election.1"` address the same election.
//! Election and voter ids never contain the audit separator `_`, which keeps
//! every audit key splittable into exactly one (election, voter) pair.

use crate::{Error, Result};

/// Entity kinds stored as JSON records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// `election.` records
    Election,
    /// `candidate.` records
    Candidate,
    /// `voter.` records
    Voter,
}

impl EntityKind {
    /// Key prefix including the trailing dot
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Election => "election.",
            EntityKind::Candidate => "candidate.",
            EntityKind::Voter => "voter.",
        }
    }
}

/// Prefix shared by every audit key
pub const AUDIT_PREFIX: &str = "record_";

/// Separator between the election and voter parts of an audit key
pub const AUDIT_SEPARATOR: char = '_';

/// Half-open key interval `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound
    pub start: String,
    /// Exclusive upper bound
    pub end: String,
}

impl KeyRange {
    /// Build a range
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether `key` falls inside the range
    pub fn contains(&self, key: &str) -> bool {
        key >= self.start.as_str() && key < self.end.as_str()
    }
}

/// Deterministic mapping from natural ids to ledger keys
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyScheme;

impl KeyScheme {
    /// Ledger key for `id` of `kind`, adding the prefix when absent
    pub fn entity_key(kind: EntityKind, id: &str) -> String {
        let prefix = kind.prefix();
        if id.starts_with(prefix) {
            id.to_string()
        } else {
            format!("{}{}", prefix, id)
        }
    }

    /// `election.<id>`
    pub fn election_key(id: &str) -> String {
        Self::entity_key(EntityKind::Election, id)
    }

    /// `candidate.<id>`
    pub fn candidate_key(id: &str) -> String {
        Self::entity_key(EntityKind::Candidate, id)
    }

    /// `voter.<id>`
    pub fn voter_key(id: &str) -> String {
        Self::entity_key(EntityKind::Voter, id)
    }

    /// Reject an election or voter id that would make audit keys ambiguous
    pub fn check_audit_id(kind: EntityKind, id: &str) -> Result<()> {
        if id.contains(AUDIT_SEPARATOR) {
            return Err(Error::InvalidArgument(format!(
                "{} id must not contain '{}': {}",
                kind.prefix().trim_end_matches('.'),
                AUDIT_SEPARATOR,
                id
            )));
        }
        Ok(())
    }

    /// Audit key for one (election, voter) pair; both must already be
    /// normalized keys
    pub fn audit_key(election_key: &str, voter_key: &str) -> String {
        format!("{}{}{}{}", AUDIT_PREFIX, election_key, AUDIT_SEPARATOR, voter_key)
    }

    /// Range enumerating every record of `kind`.
    ///
    /// The upper bound is the prefix with its final byte incremented
    /// (`election.` -> `election/`), which covers ids sorting after `z`.
    pub fn entity_range(kind: EntityKind) -> KeyRange {
        let prefix = kind.prefix();
        KeyRange::new(prefix, prefix_successor(prefix))
    }

    /// Range holding every audit entry of one election.
    ///
    /// The lower bound ends with the separator so that `election.1` does
    /// not pick up entries of `election.10`; election ids are free of the
    /// separator, so no other election shares the `record_election.1_` prefix.
    pub fn audit_range(election_key: &str) -> KeyRange {
        let base = format!("{}{}{}", AUDIT_PREFIX, election_key, AUDIT_SEPARATOR);
        KeyRange::new(base.clone(), format!("{}z", base))
    }

    /// Smallest key strictly greater than `key`
    pub fn successor(key: &str) -> String {
        let mut next = String::with_capacity(key.len() + 1);
        next.push_str(key);
        next.push('\0');
        next
    }
}

fn prefix_successor(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    // Prefixes are ASCII and end in '.', so the increment stays ASCII.
    if let Some(last) = bytes.last_mut() {
        *last += 1;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
