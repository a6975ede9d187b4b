//! Human-in-the-loop review of batch outputs.
//!
//! When review is enabled, the gate walks the engine's review queue one
//! output at a time: pull, present, wait for a decision, apply it, pull
//! again. It never holds more than one undecided item and every wait is
//! raced against the job's stop signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::engine::{ExecutionEngine, ReviewPull};
use crate::metrics;

use super::tracker::JobTracker;
use super::types::{ItemDecision, ReviewItem};

/// What a reviewer can do with the item on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Publish the output.
    Approve,
    /// Discard the output.
    Reject,
    /// Abandon the whole batch.
    Cancel,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

/// Someone who looks at an output and decides its fate.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Waits for exactly one decision on `item`.
    async fn decide(&self, item: &ReviewItem) -> ReviewDecision;
}

/// The review channel has no receiver any more.
#[derive(Debug, Clone, Error)]
#[error("review session is closed")]
pub struct ReviewClosed;

#[derive(Debug)]
struct DecisionMessage {
    decision: ReviewDecision,
    artifact: Option<PathBuf>,
}

/// Sending half of [`review_channel`].
#[derive(Debug, Clone)]
pub struct ReviewDecisionSender {
    tx: mpsc::Sender<DecisionMessage>,
}

impl ReviewDecisionSender {
    /// Sends a decision for whatever item is on screen.
    pub async fn send(&self, decision: ReviewDecision) -> Result<(), ReviewClosed> {
        self.tx
            .send(DecisionMessage {
                decision,
                artifact: None,
            })
            .await
            .map_err(|_| ReviewClosed)
    }

    /// Sends a decision that only applies if `artifact` is the item on
    /// screen when the reviewer reads it.
    pub async fn send_for(
        &self,
        artifact: impl Into<PathBuf>,
        decision: ReviewDecision,
    ) -> Result<(), ReviewClosed> {
        self.tx
            .send(DecisionMessage {
                decision,
                artifact: Some(artifact.into()),
            })
            .await
            .map_err(|_| ReviewClosed)
    }
}

/// A reviewer fed by a channel, for decisions that arrive from elsewhere
/// (an API handler, a UI event loop).
///
/// Decisions sent while no item was on screen are discarded, and a
/// decision aimed at a specific artifact is ignored for any other one.
/// Dropping every sender counts as cancelling.
#[derive(Debug)]
pub struct ChannelReviewer {
    rx: Mutex<mpsc::Receiver<DecisionMessage>>,
}

/// Creates a connected decision sender and reviewer.
pub fn review_channel() -> (ReviewDecisionSender, ChannelReviewer) {
    let (tx, rx) = mpsc::channel(4);
    (
        ReviewDecisionSender { tx },
        ChannelReviewer { rx: Mutex::new(rx) },
    )
}

#[async_trait]
impl Reviewer for ChannelReviewer {
    async fn decide(&self, item: &ReviewItem) -> ReviewDecision {
        let mut rx = self.rx.lock().await;

        while let Ok(stale) = rx.try_recv() {
            debug!("Discarding stale review decision: {:?}", stale.decision);
        }

        loop {
            let Some(message) = rx.recv().await else {
                return ReviewDecision::Cancel;
            };
            match &message.artifact {
                Some(artifact) if *artifact != item.artifact_path => {
                    debug!(
                        "Ignoring {} for {} while {} is on screen",
                        message.decision.as_str(),
                        artifact.display(),
                        item.artifact_path.display()
                    );
                }
                _ => return message.decision,
            }
        }
    }
}

/// Where the gate is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing requested from the engine yet, or waiting to ask again.
    Idle,
    /// A pull is in flight.
    AwaitingItem,
    /// An item is on screen waiting for a decision.
    Presenting,
    /// The gate has stopped.
    Finished,
}

/// How a review session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The engine reported that nothing is left to review.
    Completed,
    /// The reviewer cancelled the job.
    Cancelled,
    /// The job ended underneath the gate.
    Stopped,
    /// An engine call failed; the submission decides the job's fate.
    Aborted(String),
}

/// Drives one job's review queue.
pub(crate) struct ReviewGate {
    engine: Arc<dyn ExecutionEngine>,
    reviewer: Arc<dyn Reviewer>,
    tracker: Arc<JobTracker>,
    retry_interval: Duration,
    state: GateState,
}

impl ReviewGate {
    pub(crate) fn new(
        engine: Arc<dyn ExecutionEngine>,
        reviewer: Arc<dyn Reviewer>,
        tracker: Arc<JobTracker>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            engine,
            reviewer,
            tracker,
            retry_interval,
            state: GateState::Idle,
        }
    }

    fn set_state(&mut self, state: GateState) {
        if self.state != state {
            debug!("Review gate: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub(crate) async fn run(mut self) -> GateOutcome {
        let mut stop = self.tracker.stop_signal();
        let outcome = self.review_loop(&mut stop).await;
        self.set_state(GateState::Finished);
        info!("Review gate finished: {:?}", outcome);
        outcome
    }

    async fn review_loop(&mut self, stop: &mut watch::Receiver<bool>) -> GateOutcome {
        loop {
            if self.tracker.is_stopped() {
                return GateOutcome::Stopped;
            }

            self.set_state(GateState::AwaitingItem);
            let pull = tokio::select! {
                biased;
                _ = wait_stopped(stop) => return GateOutcome::Stopped,
                pull = self.engine.pull_next_review_item() => pull,
            };

            let path = match pull {
                Ok(ReviewPull::Item(path)) => {
                    metrics::REVIEW_PULLS.with_label_values(&["item"]).inc();
                    path
                }
                Ok(ReviewPull::Exhausted) => {
                    metrics::REVIEW_PULLS.with_label_values(&["exhausted"]).inc();
                    return GateOutcome::Completed;
                }
                Ok(ReviewPull::NotReady) => {
                    metrics::REVIEW_PULLS.with_label_values(&["not_ready"]).inc();
                    self.set_state(GateState::Idle);
                    tokio::select! {
                        biased;
                        _ = wait_stopped(stop) => return GateOutcome::Stopped,
                        _ = tokio::time::sleep(self.retry_interval) => continue,
                    }
                }
                Err(e) if e.is_retryable() => {
                    metrics::REVIEW_PULLS.with_label_values(&["error"]).inc();
                    warn!("Review pull failed, retrying: {}", e);
                    self.set_state(GateState::Idle);
                    tokio::select! {
                        biased;
                        _ = wait_stopped(stop) => return GateOutcome::Stopped,
                        _ = tokio::time::sleep(self.retry_interval) => continue,
                    }
                }
                Err(e) => {
                    metrics::REVIEW_PULLS.with_label_values(&["error"]).inc();
                    warn!("Review pull failed: {}", e);
                    return GateOutcome::Aborted(e.to_string());
                }
            };

            let item = ReviewItem::new(path);
            if !self.tracker.present(item.clone()) {
                return GateOutcome::Stopped;
            }
            self.set_state(GateState::Presenting);

            let decision = tokio::select! {
                biased;
                _ = wait_stopped(stop) => return GateOutcome::Stopped,
                decision = self.reviewer.decide(&item) => decision,
            };
            metrics::REVIEW_DECISIONS
                .with_label_values(&[decision.as_str()])
                .inc();
            info!(
                "Review decision for {}: {}",
                item.artifact_path.display(),
                decision.as_str()
            );

            // The decision is recorded before the engine sees it: applying
            // the last one may let the submission resolve immediately.
            let applied = match decision {
                ReviewDecision::Cancel => {
                    self.tracker.cancel(None);
                    return GateOutcome::Cancelled;
                }
                ReviewDecision::Approve => {
                    self.tracker.resolve(ItemDecision::Approved);
                    self.engine.approve_current().await
                }
                ReviewDecision::Reject => {
                    self.tracker.resolve(ItemDecision::Rejected);
                    self.engine.reject_current().await
                }
            };

            match applied {
                Ok(more) => {
                    if !more {
                        return GateOutcome::Completed;
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to apply review decision for {}: {}",
                        item.artifact_path.display(),
                        e
                    );
                    return GateOutcome::Aborted(e.to_string());
                }
            }
        }
    }
}

/// Resolves once the stop signal is raised or its sender is gone.
pub(crate) async fn wait_stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
