//! Statistics and metrics
//!
//! Counters read by the operational dashboard through
//! [`ServerHandle::metrics`](crate::runtime::ServerHandle::metrics).

pub mod metrics;

pub use metrics::{LimitHit, Limits, Metrics};
