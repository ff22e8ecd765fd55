//! Vote audit trail
//!
//! Every accepted vote writes one immutable entry
//! `record_<election>_<voter> -> <candidate>`. The key is a pure function of
//! (election, voter), so a voter can hold at most one entry per election.
//!
//! Two views of the count exist:
//!
//! - **projection**: the `votes` counter cached inside each candidate record,
//!   updated in place on every vote (advisory)
//! - **tally**: a scan over the election's audit entries (authoritative)
//!
//! [`AuditTrail::reconcile`] rewrites the projection from the tally.

use crate::{
    codec::RecordCodec,
    context::TxContext,
    keys::{EntityKind, KeyScheme},
    store::{for_each_in_range, KeyValueLedger},
    types::{Candidate, CounterDrift, Tally, VoteAuditEntry},
    Result,
};
use std::collections::BTreeSet;

/// Operations over the audit trail and its cached projection
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditTrail;

impl AuditTrail {
    /// Buffer the audit entry of one vote
    pub fn record(ctx: &mut TxContext<'_>, entry: &VoteAuditEntry) {
        let key = KeyScheme::audit_key(&entry.election_id, &entry.voter_id);
        ctx.put(key, RecordCodec::encode_audit(&entry.candidate_id));
    }

    /// Whether `voter_key` already holds an entry for `election_key`
    pub fn has_entry(ctx: &TxContext<'_>, election_key: &str, voter_key: &str) -> Result<bool> {
        let key = KeyScheme::audit_key(election_key, voter_key);
        Ok(ctx.get(&key)?.is_some())
    }

    /// Cached counter of `candidate_key` in `election_key`.
    ///
    /// `None` when the candidate does not exist or is not associated with the
    /// election.
    pub fn project(
        ledger: &dyn KeyValueLedger,
        candidate_key: &str,
        election_key: &str,
    ) -> Result<Option<u64>> {
        let Some(bytes) = ledger.get(candidate_key)? else {
            return Ok(None);
        };
        let candidate = RecordCodec::decode_candidate(candidate_key, &bytes)?;
        Ok(candidate.election(election_key).map(|e| e.votes))
    }

    /// Count the audit entries of `election_key`
    pub fn tally(ledger: &dyn KeyValueLedger, election_key: &str) -> Result<Tally> {
        let range = KeyScheme::audit_range(election_key);
        let mut tally = Tally::default();

        for_each_in_range(ledger, &range, |key, value| {
            let candidate = RecordCodec::decode_audit(&key, &value)?;
            tally.add_vote(candidate);
            Ok(())
        })?;

        Ok(tally)
    }

    /// Rewrite cached counters of `election_key` from the audit tally.
    ///
    /// Only candidates whose counter differs are written. Candidates that
    /// received audited votes without an association are reported with a
    /// cached count of zero and left untouched.
    pub fn reconcile(ctx: &mut TxContext<'_>, election_key: &str) -> Result<Vec<CounterDrift>> {
        let tally = Self::tally(ctx.ledger(), election_key)?;
        let mut drift = Vec::new();
        let mut seen = BTreeSet::new();

        for (key, bytes) in ctx.range(&KeyScheme::entity_range(EntityKind::Candidate))? {
            let mut candidate: Candidate = RecordCodec::decode(&key, &bytes)?;
            let audited = tally.votes_for(&key);
            let Some(entry) = candidate.election_mut(election_key) else {
                continue;
            };
            seen.insert(key.clone());

            if entry.votes != audited {
                drift.push(CounterDrift {
                    candidate: key.clone(),
                    cached: entry.votes,
                    audited,
                });
                entry.votes = audited;
                ctx.put_record(key, &candidate)?;
            }
        }

        for (candidate, audited) in tally.iter() {
            if !seen.contains(candidate) {
                drift.push(CounterDrift {
                    candidate: candidate.to_string(),
                    cached: 0,
                    audited,
                });
            }
        }

        if !drift.is_empty() {
            tracing::warn!(
                election = %election_key,
                drifted = drift.len(),
                "Candidate counters disagreed with audit trail"
            );
        }

        Ok(drift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use crate::types::CandidateElection;

    fn vote(ledger: &MemoryLedger, election: &str, voter: &str, candidate: &str) {
        let mut ctx = TxContext::new(ledger);
        AuditTrail::record(
            &mut ctx,
            &VoteAuditEntry {
                election_id: election.into(),
                voter_id: voter.into(),
                candidate_id: candidate.into(),
            },
        );
        ledger.commit(ctx.writes()).unwrap();
    }

    fn candidate(ledger: &MemoryLedger, key: &str, election: &str, votes: u64) {
        let record = Candidate {
            name: key.into(),
            id: key.into(),
            elections: vec![CandidateElection {
                election_id: election.into(),
                votes,
            }],
        };
        ledger
            .put(key, &RecordCodec::encode(&record).unwrap())
            .unwrap();
    }

    #[test]
    fn test_tally_counts_only_its_election() {
        let ledger = MemoryLedger::with_page_size(2);
        vote(&ledger, "election.1", "voter.a", "candidate.x");
        vote(&ledger, "election.1", "voter.b", "candidate.x");
        vote(&ledger, "election.1", "voter.c", "candidate.y");
        vote(&ledger, "election.10", "voter.a", "candidate.x");

        let tally = AuditTrail::tally(&ledger, "election.1").unwrap();
        assert_eq!(tally.votes_for("candidate.x"), 2);
        assert_eq!(tally.votes_for("candidate.y"), 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_record_key_is_deterministic() {
        let ledger = MemoryLedger::new();
        vote(&ledger, "election.1", "voter.a", "candidate.x");
        vote(&ledger, "election.1", "voter.a", "candidate.y");

        // Same (election, voter) pair can only ever occupy one key
        let tally = AuditTrail::tally(&ledger, "election.1").unwrap();
        assert_eq!(tally.total(), 1);

        let ctx = TxContext::new(&ledger);
        assert!(AuditTrail::has_entry(&ctx, "election.1", "voter.a").unwrap());
        assert!(!AuditTrail::has_entry(&ctx, "election.1", "voter.b").unwrap());
    }

    #[test]
    fn test_project_reads_cached_counter() {
        let ledger = MemoryLedger::new();
        candidate(&ledger, "candidate.x", "election.1", 4);

        assert_eq!(
            AuditTrail::project(&ledger, "candidate.x", "election.1").unwrap(),
            Some(4)
        );
        assert_eq!(
            AuditTrail::project(&ledger, "candidate.x", "election.2").unwrap(),
            None
        );
        assert_eq!(
            AuditTrail::project(&ledger, "candidate.none", "election.1").unwrap(),
            None
        );
    }

    #[test]
    fn test_reconcile_rewrites_drifted_counters() {
        let ledger = MemoryLedger::new();
        candidate(&ledger, "candidate.x", "election.1", 7);
        candidate(&ledger, "candidate.y", "election.1", 1);
        vote(&ledger, "election.1", "voter.a", "candidate.x");
        vote(&ledger, "election.1", "voter.b", "candidate.y");

        let mut ctx = TxContext::new(&ledger);
        let drift = AuditTrail::reconcile(&mut ctx, "election.1").unwrap();
        assert_eq!(
            drift,
            vec![CounterDrift {
                candidate: "candidate.x".into(),
                cached: 7,
                audited: 1,
            }]
        );
        assert_eq!(ctx.writes().keys().collect::<Vec<_>>(), vec!["candidate.x"]);

        ledger.commit(ctx.writes()).unwrap();
        assert_eq!(
            AuditTrail::project(&ledger, "candidate.x", "election.1").unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_reconcile_reports_unassociated_votes() {
        let ledger = MemoryLedger::new();
        vote(&ledger, "election.1", "voter.a", "candidate.ghost");

        let mut ctx = TxContext::new(&ledger);
        let drift = AuditTrail::reconcile(&mut ctx, "election.1").unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].candidate, "candidate.ghost");
        assert_eq!(drift[0].audited, 1);
        assert!(ctx.writes().is_empty());
    }
}
