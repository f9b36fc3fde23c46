//! Per-service cooldown ledger
//!
//! A service may be actuated at most once per cooldown period. The instant is
//! passed in by the caller so the window can be probed deterministically.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Tracks the last successful actuation per service
#[derive(Debug, Default)]
pub struct CooldownLedger {
    last_action: HashMap<String, DateTime<Utc>>,
    period: Duration,
}

impl CooldownLedger {
    pub fn new(period: Duration) -> Self {
        Self {
            last_action: HashMap::new(),
            period,
        }
    }

    /// Whether the service may be actuated at `now`
    ///
    /// True when no actuation has been recorded, or when at least the full
    /// cooldown period has elapsed since the last one.
    pub fn can_scale(&self, service: &str, now: DateTime<Utc>) -> bool {
        match self.last_action.get(service) {
            Some(last) => (now - *last).num_seconds() >= self.period.as_secs() as i64,
            None => true,
        }
    }

    /// Record a successful actuation at `now`
    pub fn record(&mut self, service: &str, now: DateTime<Utc>) {
        self.last_action.insert(service.to_string(), now);
    }

    /// Last recorded actuation instant, if any
    pub fn last_action(&self, service: &str) -> Option<DateTime<Utc>> {
        self.last_action.get(service).copied()
    }
}
