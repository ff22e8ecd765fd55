//! Ballot service
//!
//! Ties the state machine, the storage backend, the writer actor, the
//! candidate cache and metrics into the API the node binary serves.
//!
//! # Example
//!
//! ```no_run
//! use ballot_core::{BallotService, Config, Request};
//!
//! #[tokio::main]
//! async fn main() -> ballot_core::Result<()> {
//!     let service = BallotService::open(Config::default()).await?;
//!
//!     let response = service.submit(&Request::new("getAllElections", Vec::<String>::new())).await;
//!     println!("{}", response.payload_str());
//!
//!     service.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ballot_actor, BallotHandle},
    cache::{spawn_cache_purger, CandidateCache},
    clock::{Clock, SystemClock},
    dispatch::{Dispatcher, Request, Response},
    keys::KeyScheme,
    machine::VotingStateMachine,
    metrics::Metrics,
    operation::Operation,
    store::{KeyValueLedger, RocksLedger},
    Config, Error, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Metric label for requests naming no known function
const UNKNOWN_FUNCTION: &str = "unknown";

/// Main ballot interface
#[derive(Debug)]
pub struct BallotService {
    /// Actor handle for writes
    handle: BallotHandle,

    /// Direct access for reads
    dispatcher: Arc<Dispatcher>,

    /// Candidate listing cache (if enabled)
    cache: Option<Arc<CandidateCache>>,

    /// Periodic purge of expired cache entries
    purger: Option<JoinHandle<()>>,

    /// Prometheus metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl BallotService {
    /// Open the service on RocksDB under `config.data_dir`
    pub async fn open(config: Config) -> Result<Self> {
        let ledger: Arc<dyn KeyValueLedger> = Arc::new(RocksLedger::open(&config)?);
        Self::with_ledger(ledger, Arc::new(SystemClock), config).await
    }

    /// Run the service over any ledger with an explicit clock
    pub async fn with_ledger(
        ledger: Arc<dyn KeyValueLedger>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Result<Self> {
        let machine = VotingStateMachine::new(clock, config.voting.cast_policy);
        let dispatcher = Arc::new(Dispatcher::new(ledger, machine));

        let handle = spawn_ballot_actor(dispatcher.clone(), config.actor.mailbox_capacity);

        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(CandidateCache::new(Duration::from_secs(config.cache.ttl_secs))));
        let purger = cache.clone().map(spawn_cache_purger);

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            cast_policy = %config.voting.cast_policy,
            cache = config.cache.enabled,
            "Ballot service started"
        );

        Ok(Self {
            handle,
            dispatcher,
            cache,
            purger,
            metrics,
            config,
        })
    }

    /// Handle one request
    ///
    /// Writes are queued behind every earlier write; reads run immediately
    /// against committed state.
    pub async fn submit(&self, request: &Request) -> Response {
        let function = Operation::known_function(&request.function).unwrap_or(UNKNOWN_FUNCTION);
        let result = match self.dispatcher.prepare(request) {
            Ok(op) => self.run(op).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                self.metrics.record_request(function, "ok");
                tracing::debug!(function = %request.function, "Request succeeded");
            }
            Err(e) => {
                self.metrics.record_request(function, e.kind().as_str());
                tracing::warn!(
                    function = %request.function,
                    kind = e.kind().as_str(),
                    "Request failed: {}",
                    e
                );
            }
        }

        result.into()
    }

    async fn run(&self, op: Operation) -> Result<Option<Vec<u8>>> {
        if op.is_write() {
            return self.write(op).await;
        }

        match &op {
            Operation::GetCandidatesById { election_id } => {
                self.candidates_by_election(&op, &KeyScheme::election_key(election_id))
            }
            Operation::GetFinalResult { .. } => {
                let started = Instant::now();
                let result = self.dispatcher.apply(&op);
                self.metrics
                    .record_tally_duration(started.elapsed().as_secs_f64());
                result
            }
            _ => self.dispatcher.apply(&op),
        }
    }

    async fn write(&self, op: Operation) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        let touched = touched_election(&op);
        let is_vote = matches!(op, Operation::Vote(_));
        let is_reconcile = matches!(op, Operation::ReconcileResult { .. });

        let payload = self.handle.apply(op).await?;

        if let (Some(cache), Some(election_key)) = (&self.cache, touched) {
            cache.invalidate(&election_key);
        }
        if is_vote {
            self.metrics.record_vote();
        }
        if is_reconcile {
            self.metrics
                .record_tally_duration(started.elapsed().as_secs_f64());
        }
        Ok(payload)
    }

    fn candidates_by_election(
        &self,
        op: &Operation,
        election_key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return self.dispatcher.apply(op),
        };

        if let Some(payload) = cache.get(election_key) {
            self.metrics.record_cache_lookup(true);
            return Ok(Some(payload));
        }
        self.metrics.record_cache_lookup(false);

        let payload = self.dispatcher.apply(op)?;
        if let Some(bytes) = &payload {
            cache.insert(election_key, bytes.clone());
        }
        Ok(payload)
    }

    /// Prometheus metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Candidate cache, when enabled
    pub fn cache(&self) -> Option<&CandidateCache> {
        self.cache.as_deref()
    }

    /// Request dispatcher (reads bypass the actor)
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the cache purger and the writer actor
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("Shutting down ballot service");
        if let Some(purger) = &self.purger {
            purger.abort();
        }
        self.handle.shutdown().await
    }
}

impl Drop for BallotService {
    fn drop(&mut self) {
        if let Some(purger) = self.purger.take() {
            purger.abort();
        }
    }
}

/// Election whose candidate listing a write may change
fn touched_election(op: &Operation) -> Option<String> {
    match op {
        Operation::CreateCandidate(args) => Some(KeyScheme::election_key(&args.election_id)),
        Operation::Vote(ballot) => Some(KeyScheme::election_key(&ballot.election_id)),
        Operation::ReconcileResult { election_id } => Some(KeyScheme::election_key(election_id)),
        _ => None,
    }
}
