//! Typed operations
//!
//! Callers address the state machine with a function name and a flat list of
//! string arguments. [`Operation::parse`] checks arity once and hands the
//! state machine named fields.

use crate::{types::ElectionField, Error, Result};

/// `createElection` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewElection {
    /// Display name
    pub name: String,
    /// Opening date
    pub start_date: String,
    /// Closing date
    pub end_date: String,
    /// Caller chosen id, identical on every replica
    pub election_id: String,
    /// Caller supplied creation timestamp
    pub created_at: String,
}

/// `createCandidate` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCandidate {
    /// Display name
    pub name: String,
    /// Natural id of the person
    pub user_id: String,
    /// Election to stand in
    pub election_id: String,
}

/// `vote` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    /// Voter casting the vote
    pub voter_id: String,
    /// Chosen candidate
    pub candidate_id: String,
    /// Election voted in
    pub election_id: String,
}

/// `updateElection` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionPatch {
    /// Election to patch
    pub election_id: String,
    /// Field to replace
    pub field: ElectionField,
    /// New value
    pub value: String,
    /// Caller supplied patch timestamp
    pub updated_at: Option<String>,
}

/// One state machine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// No-op initialisation hook
    InitLedger,
    /// Register an election
    CreateElection(NewElection),
    /// Register a candidate or add an election association
    CreateCandidate(NewCandidate),
    /// Register a voter
    CreateVoter {
        /// Natural id
        user_id: String,
    },
    /// Cast one vote
    Vote(Ballot),
    /// Patch one election field
    UpdateElection(ElectionPatch),
    /// Audit-derived tally
    GetFinalResult {
        /// Election
        election_id: String,
    },
    /// One election
    GetElectionById {
        /// Election
        election_id: String,
    },
    /// Every election
    GetAllElections,
    /// Candidates standing in an election
    GetCandidatesById {
        /// Election
        election_id: String,
    },
    /// Every candidate
    GetAllCandidates,
    /// One voter
    GetVoter {
        /// Voter
        voter_id: String,
    },
    /// Every voter key
    GetAllVoters,
    /// Raw range listing
    QueryByRange {
        /// Inclusive start key
        start_key: String,
        /// Exclusive end key
        end_key: String,
    },
    /// Rebuild cached counters from the audit trail
    ReconcileResult {
        /// Election
        election_id: String,
    },
}

/// Every function name the state machine answers to
pub const FUNCTIONS: [&str; 15] = [
    "initLedger",
    "createElection",
    "createCandidate",
    "createVoter",
    "vote",
    "updateElection",
    "getFinalResult",
    "getElectionById",
    "getAllElections",
    "getCandidatesById",
    "getAllCandidates",
    "getVoter",
    "getAllVoters",
    "queryByRange",
    "reconcileResult",
];

impl Operation {
    /// Static name of a known function, `None` for anything else
    pub fn known_function(name: &str) -> Option<&'static str> {
        FUNCTIONS.iter().copied().find(|f| *f == name)
    }

    /// Build an operation from a function name and its arguments
    pub fn parse(function: &str, args: &[String]) -> Result<Self> {
        let op = match function {
            "initLedger" => {
                expect_arity(function, args, 0)?;
                Operation::InitLedger
            }
            "createElection" => {
                expect_arity(function, args, 5)?;
                Operation::CreateElection(NewElection {
                    name: args[0].clone(),
                    start_date: args[1].clone(),
                    end_date: args[2].clone(),
                    election_id: args[3].clone(),
                    created_at: args[4].clone(),
                })
            }
            "createCandidate" => {
                expect_arity(function, args, 3)?;
                Operation::CreateCandidate(NewCandidate {
                    name: args[0].clone(),
                    user_id: args[1].clone(),
                    election_id: args[2].clone(),
                })
            }
            "createVoter" => {
                expect_arity(function, args, 1)?;
                Operation::CreateVoter {
                    user_id: args[0].clone(),
                }
            }
            "vote" => {
                expect_arity(function, args, 3)?;
                Operation::Vote(Ballot {
                    voter_id: args[0].clone(),
                    candidate_id: args[1].clone(),
                    election_id: args[2].clone(),
                })
            }
            "updateElection" => {
                if args.len() != 3 && args.len() != 4 {
                    return Err(Error::InvalidArgument(format!(
                        "incorrect number of arguments for updateElection: expecting 3 or 4, got {}",
                        args.len()
                    )));
                }
                Operation::UpdateElection(ElectionPatch {
                    election_id: args[0].clone(),
                    field: args[1].parse()?,
                    value: args[2].clone(),
                    updated_at: args.get(3).cloned(),
                })
            }
            "getFinalResult" => {
                expect_arity(function, args, 1)?;
                Operation::GetFinalResult {
                    election_id: args[0].clone(),
                }
            }
            "getElectionById" => {
                expect_arity(function, args, 1)?;
                Operation::GetElectionById {
                    election_id: args[0].clone(),
                }
            }
            "getAllElections" => {
                expect_arity(function, args, 0)?;
                Operation::GetAllElections
            }
            "getCandidatesById" => {
                expect_arity(function, args, 1)?;
                Operation::GetCandidatesById {
                    election_id: args[0].clone(),
                }
            }
            "getAllCandidates" => {
                expect_arity(function, args, 0)?;
                Operation::GetAllCandidates
            }
            "getVoter" => {
                expect_arity(function, args, 1)?;
                Operation::GetVoter {
                    voter_id: args[0].clone(),
                }
            }
            "getAllVoters" => {
                expect_arity(function, args, 0)?;
                Operation::GetAllVoters
            }
            "queryByRange" => {
                expect_arity(function, args, 2)?;
                Operation::QueryByRange {
                    start_key: args[0].clone(),
                    end_key: args[1].clone(),
                }
            }
            "reconcileResult" => {
                expect_arity(function, args, 1)?;
                Operation::ReconcileResult {
                    election_id: args[0].clone(),
                }
            }
            other => {
                return Err(Error::InvalidArgument(format!(
                    "received unknown function invocation: {}",
                    other
                )))
            }
        };
        Ok(op)
    }

    /// Function name this operation is invoked by
    pub fn function(&self) -> &'static str {
        match self {
            Operation::InitLedger => "initLedger",
            Operation::CreateElection(_) => "createElection",
            Operation::CreateCandidate(_) => "createCandidate",
            Operation::CreateVoter { .. } => "createVoter",
            Operation::Vote(_) => "vote",
            Operation::UpdateElection(_) => "updateElection",
            Operation::GetFinalResult { .. } => "getFinalResult",
            Operation::GetElectionById { .. } => "getElectionById",
            Operation::GetAllElections => "getAllElections",
            Operation::GetCandidatesById { .. } => "getCandidatesById",
            Operation::GetAllCandidates => "getAllCandidates",
            Operation::GetVoter { .. } => "getVoter",
            Operation::GetAllVoters => "getAllVoters",
            Operation::QueryByRange { .. } => "queryByRange",
            Operation::ReconcileResult { .. } => "reconcileResult",
        }
    }

    /// Whether the operation may write to the ledger
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::CreateElection(_)
                | Operation::CreateCandidate(_)
                | Operation::CreateVoter { .. }
                | Operation::Vote(_)
                | Operation::UpdateElection(_)
                | Operation::ReconcileResult { .. }
        )
    }
}

fn expect_arity(function: &str, args: &[String], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::InvalidArgument(format!(
            "incorrect number of arguments for {}: expecting {}, got {}",
            function,
            expected,
            args.len()
        )));
    }
    Ok(())
}
