//! Property-based tests for voting invariants
//!
//! - Page size independence: listings do not depend on the scan page size
//! - Order independence: the same ballots in any order give the same state
//! - One vote per (voter, election), whatever the submission pattern
//! - No vote lands after the election's end date

use ballot_core::{
    clock::FixedClock,
    store::collect_range,
    CastPolicy, Dispatcher, KeyRange, KeyValueLedger, MemoryLedger, Request, Tally,
    VotingStateMachine,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

const NOW: &str = "2030-01-01 00:00:00";

fn dispatcher_over(ledger: Arc<MemoryLedger>) -> Dispatcher {
    let clock = FixedClock::at(NOW).unwrap();
    Dispatcher::new(
        ledger,
        VotingStateMachine::new(Arc::new(clock), CastPolicy::RequireAssociation),
    )
}

fn call(d: &Dispatcher, function: &str, args: &[&str]) -> ballot_core::Response {
    d.dispatch(&Request::new(function, args.iter().copied()))
}

/// Election `election.1` with `candidates` candidates and `voters` voters
fn seed(d: &Dispatcher, end_date: &str, candidates: usize, voters: usize) {
    let response = call(
        d,
        "createElection",
        &["Board", "2020-01-01 00:00:00", end_date, "election.1", "2020-01-01 00:00:00"],
    );
    assert!(response.is_ok(), "{}", response.log);

    for c in 0..candidates {
        let id = format!("c{}", c);
        let name = format!("Candidate {}", c);
        assert!(call(d, "createCandidate", &[name.as_str(), id.as_str(), "election.1"]).is_ok());
    }
    for v in 0..voters {
        let id = format!("v{}", v);
        assert!(call(d, "createVoter", &[id.as_str()]).is_ok());
    }
}

fn snapshot(ledger: &MemoryLedger) -> Vec<(String, Vec<u8>)> {
    collect_range(ledger, &KeyRange::new("", "\u{7f}")).unwrap()
}

/// Strategy for ballots: one candidate choice per voter
fn ballots_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec(0usize..4, 1..25).prop_map(|choices| choices.into_iter().enumerate().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Listings and tallies are identical for every scan page size
    #[test]
    fn prop_page_size_independence(
        page_size in 1usize..8,
        ballots in ballots_strategy(),
    ) {
        let paged_ledger = Arc::new(MemoryLedger::with_page_size(page_size));
        let whole_ledger = Arc::new(MemoryLedger::new());
        let paged = dispatcher_over(paged_ledger);
        let whole = dispatcher_over(whole_ledger);

        for d in [&paged, &whole] {
            seed(d, "2099-01-01 00:00:00", 4, ballots.len());
            for (voter, candidate) in &ballots {
                let v = format!("v{}", voter);
                let c = format!("c{}", candidate);
                prop_assert!(call(d, "vote", &[v.as_str(), c.as_str(), "election.1"]).is_ok());
            }
        }

        for (function, args) in [
            ("getAllElections", vec![]),
            ("getAllCandidates", vec![]),
            ("getAllVoters", vec![]),
            ("getCandidatesById", vec!["election.1"]),
            ("getFinalResult", vec!["election.1"]),
            ("queryByRange", vec!["record_", "record`"]),
        ] {
            let a = call(&paged, function, &args);
            let b = call(&whole, function, &args);
            prop_assert!(a.is_ok(), "{}: {}", function, a.log);
            prop_assert_eq!(a.payload, b.payload, "{} differs", function);
        }

        let tally: Tally = serde_json::from_slice(&call(&paged, "getFinalResult", &["1"]).payload).unwrap();
        prop_assert_eq!(tally.total(), ballots.len() as u64);
    }

    /// Applying the same ballots in any order yields the same world state
    #[test]
    fn prop_order_independence(
        (ballots, shuffled) in ballots_strategy()
            .prop_flat_map(|b| (Just(b.clone()), Just(b).prop_shuffle())),
    ) {
        let first = Arc::new(MemoryLedger::new());
        let second = Arc::new(MemoryLedger::new());

        for (ledger, order) in [(&first, &ballots), (&second, &shuffled)] {
            let d = dispatcher_over(ledger.clone());
            seed(&d, "2099-01-01 00:00:00", 4, order.len());
            for (voter, candidate) in order.iter() {
                let v = format!("v{}", voter);
                let c = format!("c{}", candidate);
                prop_assert!(call(&d, "vote", &[v.as_str(), c.as_str(), "election.1"]).is_ok());
            }
        }

        prop_assert_eq!(snapshot(&first), snapshot(&second));
    }

    /// Repeated attempts by the same voter are rejected with a conflict
    #[test]
    fn prop_one_vote_per_voter(
        attempts in prop::collection::vec((0usize..6, 0usize..3), 1..40),
    ) {
        let ledger = Arc::new(MemoryLedger::with_page_size(2));
        let d = dispatcher_over(ledger);
        seed(&d, "2099-01-01 00:00:00", 3, 6);

        let mut voted = HashSet::new();
        for (voter, candidate) in &attempts {
            let v = format!("v{}", voter);
            let c = format!("c{}", candidate);
            let response = call(&d, "vote", &[v.as_str(), c.as_str(), "election.1"]);
            if voted.insert(*voter) {
                prop_assert!(response.is_ok(), "{}", response.log);
            } else {
                prop_assert_eq!(response.code, 3);
            }
        }

        let tally: Tally = serde_json::from_slice(&call(&d, "getFinalResult", &["election.1"]).payload).unwrap();
        prop_assert_eq!(tally.total(), voted.len() as u64);

        // Counters agree with the audit trail
        let drift = call(&d, "reconcileResult", &["election.1"]);
        prop_assert!(drift.is_ok());
        prop_assert_eq!(drift.payload_str(), "[]");
    }

    /// Votes after the end date are rejected and leave no trace
    #[test]
    fn prop_no_vote_after_end_date(
        year in 2020i32..2030,
        day in 1u32..28,
        candidate in 0usize..3,
    ) {
        let ledger = Arc::new(MemoryLedger::new());
        let d = dispatcher_over(ledger.clone());
        let end_date = format!("{}-01-{:02} 00:00:00", year, day);
        seed(&d, &end_date, 3, 1);

        let before = snapshot(&ledger);
        let c = format!("c{}", candidate);
        let response = call(&d, "vote", &["v0", c.as_str(), "election.1"]);

        prop_assert_eq!(response.code, 4);
        prop_assert_eq!(snapshot(&ledger), before);
        prop_assert!(ledger.get("record_election.1_voter.v0").unwrap().is_none());
    }
}
