//! HTTP surface for the batch coordinator.
//!
//! One batch session at a time: configure and submit a job, watch its
//! progress, review its outputs and collect per-file errors.

pub mod api;
pub mod metrics;
pub mod state;
