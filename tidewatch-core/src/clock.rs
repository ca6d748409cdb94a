//! Time source for lifecycle stamps.

use crate::Timestamp;
use chrono::{SubsecRound, Utc};
use std::fmt::Debug;

/// Source of the `deleted_at` stamp for a cascade.
///
/// Injected into the engine so tests can pin and advance time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Timestamp;
}

/// Wall clock, truncated to the microsecond precision PostgreSQL stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().trunc_subsecs(6)
    }
}
