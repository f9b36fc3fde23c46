//! # Autoscaling core
//!
//! Three pieces compose the scaler, leaves first:
//!
//! - [`history`]: bounded per-(service, metric) sample rings and trend
//!   classification for the predictive algorithm.
//! - [`engine`]: pure decision functions mapping a metric snapshot and the
//!   current replica count to a bounded target.
//! - [`controller`]: the periodic control loop that collects, decides, and
//!   actuates across the three managed tiers with per-tier failure isolation.
//!
//! The cooldown ledger ([`cooldown`]) gates actuations so a service is never
//! scaled twice within the configured cooldown period.

pub mod controller;
pub mod cooldown;
pub mod engine;
pub mod history;

pub use controller::AutoScaler;
pub use cooldown::CooldownLedger;
pub use engine::{cache_decision, database_decision, decide};
pub use history::{MetricHistory, MetricKind, MetricSample, Trend};
