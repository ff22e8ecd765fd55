//! Time source for deadline checks
//!
//! Only vote casting consults the clock (`now > endDate`). Identifiers and
//! creation timestamps are always caller supplied.

use chrono::{NaiveDateTime, Utc};
use std::fmt::Debug;

/// Source of the current instant, in the same naive UTC frame as
/// election dates
pub trait Clock: Send + Sync + Debug {
    /// Current instant
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock (UTC)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Clock pinned to a ledger-formatted date
    pub fn at(date: &str) -> Option<Self> {
        crate::types::parse_date(date).map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
