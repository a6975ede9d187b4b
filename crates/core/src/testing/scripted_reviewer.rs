//! Reviewer that replays a fixed list of decisions.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::orchestrator::{ReviewDecision, ReviewItem, Reviewer};

/// Mock implementation of the Reviewer trait.
///
/// Answers each item with the next scripted decision. Once the script is
/// used up it never answers, which keeps an item on screen for as long as
/// a test needs.
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    decisions: Mutex<VecDeque<ReviewDecision>>,
    seen: Mutex<Vec<PathBuf>>,
    delay: Duration,
}

impl ScriptedReviewer {
    pub fn new(decisions: Vec<ReviewDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Think this long before every decision.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Items presented so far, in order.
    pub async fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn decide(&self, item: &ReviewItem) -> ReviewDecision {
        self.seen.lock().await.push(item.artifact_path.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.decisions.lock().await.pop_front();
        match next {
            Some(decision) => decision,
            None => std::future::pending().await,
        }
    }
}
