//! Ballot Core
//!
//! Deterministic voting state machine over an ordered key-value ledger.
//!
//! # Architecture
//!
//! - **State Machine**: Every operation maps (ledger snapshot, arguments) to
//!   (write set, result) and commits its writes atomically
//! - **Single Writer**: One actor task serializes read-modify-write operations
//! - **Audit Trail**: One deterministic record per (election, voter) is the
//!   authoritative source of results
//! - **Range Scans**: Paged, continuation-based listing of entity prefixes
//!
//! # Invariants
//!
//! - A voter votes at most once per election
//! - No vote is accepted after the election's end date
//! - Replicas applying the same operations produce the same state

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod audit;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod machine;
pub mod metrics;
pub mod operation;
pub mod service;
pub mod store;
pub mod types;

// Re-exports
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use dispatch::{Dispatcher, Request, Response};
pub use error::{Error, ErrorKind, Result};
pub use keys::{EntityKind, KeyRange, KeyScheme};
pub use machine::{CastPolicy, Execution, VotingStateMachine};
pub use operation::Operation;
pub use service::BallotService;
pub use store::{KeyValueLedger, MemoryLedger, RocksLedger, WriteSet};
pub use types::{
    Candidate, CandidateElection, CounterDrift, Election, ElectionField, HistoryEntry,
    KeyedRecord, Tally, VoteAuditEntry, Voter,
};
