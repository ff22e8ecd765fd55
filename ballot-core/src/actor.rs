//! Single-writer actor for ledger mutations
//!
//! Write operations read a candidate or voter record, modify it and write it
//! back. Two such invocations touching the same record must not interleave,
//! so every write goes through one Tokio task that applies operations in
//! mailbox order. Reads never enter the mailbox.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              BallotService (many callers)             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ write operations
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               BallotHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              BallotActor (Single Task)                │
//! │   execute on the state machine → commit write set    │
//! │          (one atomic batch per operation)            │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{dispatch::Dispatcher, operation::Operation, Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ballot actor
#[derive(Debug)]
pub enum BallotMessage {
    /// Execute and commit an operation
    Apply {
        operation: Operation,
        response: oneshot::Sender<Result<Option<Vec<u8>>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that serializes ledger mutations
#[derive(Debug)]
pub struct BallotActor {
    /// Executes and commits operations
    dispatcher: Arc<Dispatcher>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<BallotMessage>,

    /// Operations applied so far
    applied: u64,
}

impl BallotActor {
    /// Create new actor
    pub fn new(dispatcher: Arc<Dispatcher>, mailbox: mpsc::Receiver<BallotMessage>) -> Self {
        Self {
            dispatcher,
            mailbox,
            applied: 0,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                BallotMessage::Apply {
                    operation,
                    response,
                } => {
                    let result = self.dispatcher.apply(&operation);
                    if result.is_ok() {
                        self.applied += 1;
                    }
                    if response.send(result).is_err() {
                        tracing::debug!(
                            function = operation.function(),
                            "Caller dropped before the result was ready"
                        );
                    }
                }
                BallotMessage::Shutdown => break,
            }
        }

        tracing::info!(applied = self.applied, "Ballot actor stopped");
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct BallotHandle {
    sender: mpsc::Sender<BallotMessage>,
}

impl BallotHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<BallotMessage>) -> Self {
        Self { sender }
    }

    /// Execute and commit `operation` after every previously queued one
    pub async fn apply(&self, operation: Operation) -> Result<Option<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BallotMessage::Apply {
                operation,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(BallotMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ballot actor
pub fn spawn_ballot_actor(dispatcher: Arc<Dispatcher>, mailbox_capacity: usize) -> BallotHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = BallotActor::new(dispatcher, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    BallotHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::machine::{CastPolicy, VotingStateMachine};
    use crate::store::{KeyValueLedger, RocksLedger};
    use crate::Config;

    fn rocks_dispatcher(dir: &tempfile::TempDir) -> Arc<Dispatcher> {
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        let ledger: Arc<dyn KeyValueLedger> = Arc::new(RocksLedger::open(&config).unwrap());
        let clock = FixedClock::at("2030-01-01 00:00:00").unwrap();
        Arc::new(Dispatcher::new(
            ledger,
            VotingStateMachine::new(Arc::new(clock), CastPolicy::RequireAssociation),
        ))
    }

    fn op(function: &str, args: &[&str]) -> Operation {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        Operation::parse(function, &args).unwrap()
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let temp_dir = tempfile::tempdir().unwrap();
        let handle = spawn_ballot_actor(rocks_dispatcher(&temp_dir), 16);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_applies_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dispatcher = rocks_dispatcher(&temp_dir);
        let handle = spawn_ballot_actor(dispatcher.clone(), 16);

        handle
            .apply(op(
                "createElection",
                &[
                    "Board",
                    "2020-01-01 00:00:00",
                    "2099-01-01 00:00:00",
                    "election.1",
                    "2020-01-01 00:00:00",
                ],
            ))
            .await
            .unwrap();
        handle.apply(op("createVoter", &["v1"])).await.unwrap();

        // Committed state is visible to direct reads
        assert!(dispatcher.ledger().get("election.1").unwrap().is_some());
        assert!(dispatcher.ledger().get("voter.v1").unwrap().is_some());

        let err = handle
            .apply(op("getVoter", &["nobody"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_mailbox_is_concurrency_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let handle = spawn_ballot_actor(rocks_dispatcher(&temp_dir), 16);

        handle.shutdown().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let err = handle.apply(op("createVoter", &["v1"])).await.unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }
}
