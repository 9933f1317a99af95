//! Scheduled task management for iptv-relay.
//!
//! This module provides:
//! - [`ScoringScheduler`]: Periodic source scoring scheduler

pub mod scoring_scheduler;

pub use scoring_scheduler::{ScoringScheduler, ScoringSchedulerConfig};
