//! Batch orchestration.
//!
//! A [`BatchCoordinator`] takes one batch job through its lifecycle:
//! - **Configuring**: bindings, output directory and review flag are set
//! - **Running**: the engine processes the batch while progress is polled
//! - **Reviewing**: one output at a time is shown to a [`Reviewer`]
//!
//! The job always ends as completed, cancelled or failed, and stays there.

mod config;
mod coordinator;
mod review;
mod tracker;
mod types;

pub use config::BatchConfig;
pub use coordinator::BatchCoordinator;
pub use review::{
    review_channel, ChannelReviewer, GateOutcome, GateState, ReviewClosed, ReviewDecision,
    ReviewDecisionSender, Reviewer,
};
pub use tracker::JobUpdateCallback;
pub use types::{
    BatchError, BatchJob, BatchOutcome, BatchReport, FileError, ItemDecision, JobState,
    ReviewItem, ReviewTally,
};
