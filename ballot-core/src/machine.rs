//! Voting state machine
//!
//! Every operation is a function of (ledger snapshot, arguments) to
//! (write set, result). Nothing here reads the wall clock except the vote
//! deadline check, and nothing here locks: conflicting invocations are
//! expected to arrive already serialized (see [`crate::actor`]).
//!
//! # Invariants
//!
//! - One vote per (voter, election): checked against the voter's history and
//!   structurally guaranteed by the deterministic audit key
//! - Votes land only before the election's `endDate`
//! - The audit tally is authoritative; candidate counters are a projection
//! - Read-modify-write on every candidate and voter update

use crate::{
    audit::AuditTrail,
    clock::{Clock, SystemClock},
    codec::RecordCodec,
    context::TxContext,
    keys::{EntityKind, KeyRange, KeyScheme},
    operation::{Ballot, ElectionPatch, NewCandidate, NewElection, Operation},
    store::{KeyValueLedger, WriteSet},
    types::{
        parse_date, Candidate, CandidateElection, CounterDrift, Election, ElectionField,
        HistoryEntry, KeyedRecord, Tally, VoteAuditEntry, Voter,
    },
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// How strictly a vote's candidate must be tied to the election
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastPolicy {
    /// Reject votes for candidates not registered in the election
    RequireAssociation,
    /// Accept such votes; only the cached counter ignores them
    Lenient,
}

impl FromStr for CastPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "require_association" => Ok(CastPolicy::RequireAssociation),
            "lenient" => Ok(CastPolicy::Lenient),
            other => Err(Error::Config(format!("Unknown cast policy: {}", other))),
        }
    }
}

impl fmt::Display for CastPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastPolicy::RequireAssociation => f.write_str("require_association"),
            CastPolicy::Lenient => f.write_str("lenient"),
        }
    }
}

/// Outcome of one successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    /// Writes to commit
    pub writes: WriteSet,
    /// Success payload (JSON), empty for write operations
    pub payload: Option<Vec<u8>>,
}

/// The election state machine
#[derive(Debug, Clone)]
pub struct VotingStateMachine {
    clock: Arc<dyn Clock>,
    policy: CastPolicy,
}

impl Default for VotingStateMachine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), CastPolicy::RequireAssociation)
    }
}

impl VotingStateMachine {
    /// Create a state machine
    pub fn new(clock: Arc<dyn Clock>, policy: CastPolicy) -> Self {
        Self { clock, policy }
    }

    /// Active cast policy
    pub fn policy(&self) -> CastPolicy {
        self.policy
    }

    /// Run `op` against `ledger` without committing anything
    pub fn execute(&self, ledger: &dyn KeyValueLedger, op: &Operation) -> Result<Execution> {
        let mut ctx = TxContext::new(ledger);

        let payload = match op {
            Operation::InitLedger => None,
            Operation::CreateElection(args) => {
                self.create_election(&mut ctx, args)?;
                None
            }
            Operation::CreateCandidate(args) => {
                self.create_candidate(&mut ctx, args)?;
                None
            }
            Operation::CreateVoter { user_id } => {
                self.create_voter(&mut ctx, user_id)?;
                None
            }
            Operation::Vote(ballot) => {
                self.cast_vote(&mut ctx, ballot)?;
                None
            }
            Operation::UpdateElection(patch) => {
                self.update_election(&mut ctx, patch)?;
                None
            }
            Operation::GetFinalResult { election_id } => {
                Some(RecordCodec::encode(&self.final_result(&ctx, election_id)?)?)
            }
            Operation::GetElectionById { election_id } => {
                Some(RecordCodec::encode(&self.election_by_id(&ctx, election_id)?)?)
            }
            Operation::GetAllElections => Some(RecordCodec::encode(&self.all_elections(&ctx)?)?),
            Operation::GetCandidatesById { election_id } => Some(RecordCodec::encode(
                &self.candidates_by_election(&ctx, election_id)?,
            )?),
            Operation::GetAllCandidates => {
                Some(RecordCodec::encode(&self.all_candidates(&ctx)?)?)
            }
            Operation::GetVoter { voter_id } => {
                Some(RecordCodec::encode(&self.voter(&ctx, voter_id)?)?)
            }
            Operation::GetAllVoters => Some(RecordCodec::encode(&self.all_voters(&ctx)?)?),
            Operation::QueryByRange { start_key, end_key } => Some(RecordCodec::encode(
                &self.query_by_range(&ctx, start_key, end_key)?,
            )?),
            Operation::ReconcileResult { election_id } => Some(RecordCodec::encode(
                &self.reconcile_result(&mut ctx, election_id)?,
            )?),
        };

        Ok(Execution {
            writes: ctx.into_writes(),
            payload,
        })
    }

    // Write paths

    /// Register an election. An existing election with the same id is
    /// overwritten.
    pub fn create_election(&self, ctx: &mut TxContext<'_>, args: &NewElection) -> Result<()> {
        KeyScheme::check_audit_id(EntityKind::Election, &args.election_id)?;
        if parse_date(&args.start_date).is_none() {
            return Err(Error::InvalidArgument(format!(
                "malformed startDate: {}",
                args.start_date
            )));
        }
        if parse_date(&args.end_date).is_none() {
            return Err(Error::InvalidArgument(format!(
                "malformed endDate: {}",
                args.end_date
            )));
        }
        if args.start_date > args.end_date {
            return Err(Error::InvalidArgument(
                "invalid election dates: startDate is after endDate".to_string(),
            ));
        }

        let key = KeyScheme::election_key(&args.election_id);
        let election = Election {
            election_id: key.clone(),
            election_name: args.name.clone(),
            start_date: args.start_date.clone(),
            end_date: args.end_date.clone(),
            created_at: args.created_at.clone(),
            updated_at: None,
        };
        ctx.put_record(key.clone(), &election)?;

        info!(election = %key, name = %args.name, "Election created");
        Ok(())
    }

    /// Register a candidate for an election, creating the candidate record
    /// on first registration
    pub fn create_candidate(&self, ctx: &mut TxContext<'_>, args: &NewCandidate) -> Result<()> {
        let candidate_key = KeyScheme::candidate_key(&args.user_id);
        let election_key = KeyScheme::election_key(&args.election_id);

        if ctx.get(&election_key)?.is_none() {
            return Err(Error::NotFound(format!("election not found: {}", election_key)));
        }

        let association = CandidateElection {
            election_id: election_key.clone(),
            votes: 0,
        };

        let candidate = match ctx.get_record::<Candidate>(&candidate_key)? {
            Some(mut existing) => {
                if existing.stands_in(&election_key) {
                    return Err(Error::Conflict(format!(
                        "{} already belongs to {}",
                        candidate_key, election_key
                    )));
                }
                existing.elections.push(association);
                existing
            }
            None => Candidate {
                name: args.name.clone(),
                id: candidate_key.clone(),
                elections: vec![association],
            },
        };
        ctx.put_record(candidate_key.clone(), &candidate)?;

        info!(
            candidate = %candidate_key,
            election = %election_key,
            elections = candidate.elections.len(),
            "Candidate registered"
        );
        Ok(())
    }

    /// Register a voter with an empty history
    pub fn create_voter(&self, ctx: &mut TxContext<'_>, user_id: &str) -> Result<()> {
        KeyScheme::check_audit_id(EntityKind::Voter, user_id)?;
        let key = KeyScheme::voter_key(user_id);
        if ctx.get(&key)?.is_some() {
            return Err(Error::Conflict(format!("voter already exists: {}", key)));
        }
        ctx.put_record(key.clone(), &Voter::new(key.clone()))?;

        info!(voter = %key, "Voter created");
        Ok(())
    }

    /// Cast one vote.
    ///
    /// Preconditions are checked in order before anything is buffered, so a
    /// rejected vote produces an empty write set. An accepted vote buffers
    /// the candidate counter, the voter history and the audit entry.
    pub fn cast_vote(&self, ctx: &mut TxContext<'_>, ballot: &Ballot) -> Result<()> {
        let voter_key = KeyScheme::voter_key(&ballot.voter_id);
        let election_key = KeyScheme::election_key(&ballot.election_id);
        let candidate_key = KeyScheme::candidate_key(&ballot.candidate_id);

        let mut voter: Voter = ctx
            .get_record(&voter_key)?
            .ok_or_else(|| Error::NotFound(format!("voter not found: {}", voter_key)))?;

        if voter.has_voted_in(&election_key)
            || AuditTrail::has_entry(ctx, &election_key, &voter_key)?
        {
            return Err(Error::Conflict(format!(
                "voter has already voted: {} in {}",
                voter_key, election_key
            )));
        }

        let election: Election = ctx
            .get_record(&election_key)?
            .ok_or_else(|| Error::NotFound(format!("election not found: {}", election_key)))?;

        let end_date = election.end_date().ok_or_else(|| {
            Error::InvalidState(format!(
                "failed to parse election end date: {}",
                election.end_date
            ))
        })?;
        if self.clock.now() > end_date {
            return Err(Error::Expired(format!(
                "election has ended: {} closed at {}",
                election_key, election.end_date
            )));
        }

        let mut candidate: Candidate = ctx
            .get_record(&candidate_key)?
            .ok_or_else(|| Error::NotFound(format!("candidate not found: {}", candidate_key)))?;

        match candidate.election_mut(&election_key) {
            Some(entry) => entry.votes += 1,
            None if self.policy == CastPolicy::RequireAssociation => {
                return Err(Error::NotFound(format!(
                    "candidate {} is not registered for election {}",
                    candidate_key, election_key
                )));
            }
            None => {
                tracing::warn!(
                    candidate = %candidate_key,
                    election = %election_key,
                    "Vote accepted for unassociated candidate"
                );
            }
        }
        ctx.put_record(candidate_key.clone(), &candidate)?;

        voter.election_history.push(HistoryEntry {
            election_id: election_key.clone(),
            voted_to: candidate_key.clone(),
        });
        ctx.put_record(voter_key.clone(), &voter)?;

        AuditTrail::record(
            ctx,
            &VoteAuditEntry {
                election_id: election_key.clone(),
                voter_id: voter_key.clone(),
                candidate_id: candidate_key.clone(),
            },
        );

        info!(
            voter = %voter_key,
            candidate = %candidate_key,
            election = %election_key,
            "Vote recorded"
        );
        Ok(())
    }

    /// Replace one election field
    pub fn update_election(&self, ctx: &mut TxContext<'_>, patch: &ElectionPatch) -> Result<()> {
        let key = KeyScheme::election_key(&patch.election_id);
        let mut election: Election = ctx
            .get_record(&key)?
            .ok_or_else(|| Error::NotFound(format!("election not found: {}", key)))?;

        match patch.field {
            ElectionField::Name => election.election_name = patch.value.clone(),
            ElectionField::StartDate | ElectionField::EndDate => {
                if parse_date(&patch.value).is_none() {
                    return Err(Error::InvalidArgument(format!(
                        "malformed {}: {}",
                        patch.field, patch.value
                    )));
                }
                if patch.field == ElectionField::StartDate {
                    election.start_date = patch.value.clone();
                } else {
                    election.end_date = patch.value.clone();
                }
                if election.start_date > election.end_date {
                    return Err(Error::InvalidArgument(
                        "invalid election dates: startDate is after endDate".to_string(),
                    ));
                }
            }
        }
        if let Some(updated_at) = &patch.updated_at {
            election.updated_at = Some(updated_at.clone());
        }
        ctx.put_record(key.clone(), &election)?;

        info!(election = %key, field = %patch.field, "Election updated");
        Ok(())
    }

    /// Rebuild cached counters of an election from its audit trail
    pub fn reconcile_result(
        &self,
        ctx: &mut TxContext<'_>,
        election_id: &str,
    ) -> Result<Vec<CounterDrift>> {
        let key = KeyScheme::election_key(election_id);
        if ctx.get(&key)?.is_none() {
            return Err(Error::NotFound(format!("election not found: {}", key)));
        }
        AuditTrail::reconcile(ctx, &key)
    }

    // Read paths

    /// Authoritative tally from the audit trail
    pub fn final_result(&self, ctx: &TxContext<'_>, election_id: &str) -> Result<Tally> {
        let key = KeyScheme::election_key(election_id);
        let tally = AuditTrail::tally(ctx.ledger(), &key)?;
        if tally.is_empty() {
            return Err(Error::NotFound(format!("no votes recorded for {}", key)));
        }
        Ok(tally)
    }

    /// One election
    pub fn election_by_id(&self, ctx: &TxContext<'_>, election_id: &str) -> Result<Election> {
        let key = KeyScheme::election_key(election_id);
        ctx.get_record(&key)?
            .ok_or_else(|| Error::NotFound(format!("election not found: {}", key)))
    }

    /// Every election in key order
    pub fn all_elections(&self, ctx: &TxContext<'_>) -> Result<Vec<Election>> {
        ctx.range(&KeyScheme::entity_range(EntityKind::Election))?
            .into_iter()
            .map(|(key, bytes)| RecordCodec::decode_election(&key, &bytes))
            .collect()
    }

    /// Candidates standing in an election, as `{Key, Record}` rows
    pub fn candidates_by_election(
        &self,
        ctx: &TxContext<'_>,
        election_id: &str,
    ) -> Result<Vec<KeyedRecord>> {
        let election_key = KeyScheme::election_key(election_id);
        let mut rows = Vec::new();
        for (key, bytes) in ctx.range(&KeyScheme::entity_range(EntityKind::Candidate))? {
            let candidate = RecordCodec::decode_candidate(&key, &bytes)?;
            if candidate.stands_in(&election_key) {
                rows.push(RecordCodec::keyed(key, &bytes));
            }
        }
        Ok(rows)
    }

    /// Every candidate as `{Key, Record}` rows
    pub fn all_candidates(&self, ctx: &TxContext<'_>) -> Result<Vec<KeyedRecord>> {
        ctx.range(&KeyScheme::entity_range(EntityKind::Candidate))?
            .into_iter()
            .map(|(key, bytes)| {
                RecordCodec::decode_candidate(&key, &bytes)?;
                Ok(RecordCodec::keyed(key, &bytes))
            })
            .collect()
    }

    /// One voter
    pub fn voter(&self, ctx: &TxContext<'_>, voter_id: &str) -> Result<Voter> {
        let key = KeyScheme::voter_key(voter_id);
        ctx.get_record(&key)?
            .ok_or_else(|| Error::NotFound(format!("voter not found: {}", key)))
    }

    /// Every voter key
    pub fn all_voters(&self, ctx: &TxContext<'_>) -> Result<Vec<String>> {
        Ok(ctx
            .range(&KeyScheme::entity_range(EntityKind::Voter))?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Raw listing of `[start_key, end_key)`
    pub fn query_by_range(
        &self,
        ctx: &TxContext<'_>,
        start_key: &str,
        end_key: &str,
    ) -> Result<Vec<KeyedRecord>> {
        if start_key > end_key {
            return Err(Error::InvalidArgument(format!(
                "start key {} sorts after end key {}",
                start_key, end_key
            )));
        }
        Ok(ctx
            .range(&KeyRange::new(start_key, end_key))?
            .into_iter()
            .map(|(key, bytes)| RecordCodec::keyed(key, &bytes))
            .collect())
    }
}
