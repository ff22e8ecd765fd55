//! Request dispatch
//!
//! Turns `(function, args, caller)` into an [`Operation`], runs it on the
//! state machine, commits the resulting write set and reports a
//! [`Response`] with a numeric code (0 = success).

use crate::{
    keys::KeyScheme,
    machine::{Execution, VotingStateMachine},
    operation::Operation,
    store::KeyValueLedger,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Invocation as received from the outer service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Function name (`createElection`, `vote`, ...)
    pub function: String,

    /// Ordered string arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Authenticated caller identity, set by the outer service
    #[serde(default)]
    pub caller: Option<String>,
}

impl Request {
    /// Request without caller identity
    pub fn new<I, S>(function: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
            caller: None,
        }
    }

    /// Attach the authenticated caller
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// Result of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// 0 on success, otherwise [`crate::ErrorKind::code`]
    pub code: u32,

    /// Success payload (JSON), empty on failure and for writes
    pub payload: Vec<u8>,

    /// Human readable outcome
    pub log: String,
}

impl Response {
    /// Successful response
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            code: 0,
            payload: payload.unwrap_or_default(),
            log: "OK".to_string(),
        }
    }

    /// Failed response
    pub fn error(err: &Error) -> Self {
        Self {
            code: err.kind().code(),
            payload: Vec::new(),
            log: err.to_string(),
        }
    }

    /// Whether the request succeeded
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Payload as UTF-8 text
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl From<Result<Option<Vec<u8>>>> for Response {
    fn from(result: Result<Option<Vec<u8>>>) -> Self {
        match result {
            Ok(payload) => Response::ok(payload),
            Err(e) => Response::error(&e),
        }
    }
}

/// Routes requests to the state machine and commits their writes
pub struct Dispatcher {
    ledger: Arc<dyn KeyValueLedger>,
    machine: VotingStateMachine,
}

impl Dispatcher {
    /// Create a dispatcher over `ledger`
    pub fn new(ledger: Arc<dyn KeyValueLedger>, machine: VotingStateMachine) -> Self {
        Self { ledger, machine }
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Arc<dyn KeyValueLedger> {
        &self.ledger
    }

    /// Parse a request, binding the caller identity to vote requests
    pub fn prepare(&self, request: &Request) -> Result<Operation> {
        let op = Operation::parse(&request.function, &request.args)?;

        if let (Operation::Vote(ballot), Some(caller)) = (&op, &request.caller) {
            if KeyScheme::voter_key(&ballot.voter_id) != KeyScheme::voter_key(caller) {
                return Err(Error::InvalidArgument(format!(
                    "voter {} does not match caller identity {}",
                    ballot.voter_id, caller
                )));
            }
        }

        Ok(op)
    }

    /// Run an operation without committing
    pub fn execute(&self, op: &Operation) -> Result<Execution> {
        self.machine.execute(self.ledger.as_ref(), op)
    }

    /// Run an operation and commit its writes
    pub fn apply(&self, op: &Operation) -> Result<Option<Vec<u8>>> {
        let execution = self.execute(op)?;
        if !execution.writes.is_empty() {
            self.ledger.commit(&execution.writes)?;
        }
        Ok(execution.payload)
    }

    /// Handle one request end to end
    pub fn dispatch(&self, request: &Request) -> Response {
        let result = self.prepare(request).and_then(|op| self.apply(&op));

        match &result {
            Ok(_) => tracing::debug!(function = %request.function, "Request succeeded"),
            Err(e) => tracing::warn!(
                function = %request.function,
                kind = e.kind().as_str(),
                "Request failed: {}",
                e
            ),
        }

        result.into()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.machine.policy())
            .finish()
    }
}
