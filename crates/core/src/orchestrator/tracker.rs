//! Shared job state for one coordinator and its review gate.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::info;

use crate::engine::FileErrors;
use crate::metrics;

use super::types::{BatchJob, ItemDecision, JobState, ReviewItem};

/// Callback invoked after every change to the job.
pub type JobUpdateCallback = Arc<dyn Fn(&BatchJob) + Send + Sync>;

/// Owns the job record and the stop signal.
///
/// Every mutation goes through here so that terminal states stick: once a
/// job is completed, cancelled or failed, later updates are ignored.
pub(crate) struct JobTracker {
    job: watch::Sender<BatchJob>,
    stop: watch::Sender<bool>,
    last_activity: Mutex<Instant>,
    callback: Option<JobUpdateCallback>,
}

impl JobTracker {
    pub(crate) fn new(job: BatchJob, callback: Option<JobUpdateCallback>) -> Self {
        let (job, _) = watch::channel(job);
        let (stop, _) = watch::channel(false);
        Self {
            job,
            stop,
            last_activity: Mutex::new(Instant::now()),
            callback,
        }
    }

    pub(crate) fn snapshot(&self) -> BatchJob {
        self.job.borrow().clone()
    }

    pub(crate) fn state(&self) -> JobState {
        self.job.borrow().state
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<BatchJob> {
        self.job.subscribe()
    }

    pub(crate) fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Applies `f` to the job; `f` returns whether it changed anything.
    fn modify(&self, f: impl FnOnce(&mut BatchJob) -> bool) -> bool {
        let changed = self.job.send_if_modified(f);
        if changed {
            if let Some(callback) = &self.callback {
                let job = self.job.borrow().clone();
                callback(&job);
            }
        }
        changed
    }

    /// Mutates a job that is still being configured.
    pub(crate) fn configure(&self, f: impl FnOnce(&mut BatchJob)) -> Result<(), JobState> {
        let mut actual = JobState::Configuring;
        let changed = self.modify(|job| {
            actual = job.state;
            if job.state != JobState::Configuring {
                return false;
            }
            f(job);
            true
        });
        if changed {
            Ok(())
        } else {
            Err(actual)
        }
    }

    /// Moves the job from one of `from` to `to`.
    ///
    /// Returns the previous state on success, the current one otherwise.
    pub(crate) fn transition(&self, from: &[JobState], to: JobState) -> Result<JobState, JobState> {
        let mut previous = JobState::Configuring;
        let changed = self.modify(|job| {
            previous = job.state;
            if !from.contains(&job.state) {
                return false;
            }
            job.state = to;
            if to == JobState::Submitted {
                job.submitted_at = Some(Utc::now());
            }
            true
        });
        if changed {
            // The silence clock starts at submission.
            if to == JobState::Submitted {
                self.touch();
            }
            info!("Batch {}: {} -> {}", self.job.borrow().id, previous, to);
            Ok(previous)
        } else {
            Err(previous)
        }
    }

    /// Records a progress sample. Ignored outside `Running`/`Reviewing`;
    /// never moves backwards.
    pub(crate) fn record_progress(&self, sample: f64) {
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            return;
        };
        let advanced = self.modify(|job| {
            if !matches!(job.state, JobState::Running | JobState::Reviewing) {
                return false;
            }
            if sample <= job.progress {
                return false;
            }
            job.progress = sample;
            true
        });
        if advanced {
            self.touch();
        }
    }

    /// Puts `item` on screen. Fails once the job has ended.
    pub(crate) fn present(&self, item: ReviewItem) -> bool {
        let presented = self.modify(|job| {
            if !job.state.is_in_flight() {
                return false;
            }
            job.state = JobState::Reviewing;
            job.current_review = Some(item);
            true
        });
        self.touch();
        presented
    }

    /// Records the decision on the item on screen and goes back to
    /// `Running`.
    pub(crate) fn resolve(&self, decision: ItemDecision) {
        self.modify(|job| {
            if job.state != JobState::Reviewing {
                return false;
            }
            match decision {
                ItemDecision::Approved => job.reviewed.approved += 1,
                ItemDecision::Rejected => job.reviewed.rejected += 1,
            }
            job.current_review = None;
            job.state = JobState::Running;
            true
        });
        self.touch();
    }

    /// Whether an item is on screen waiting for a human.
    pub(crate) fn is_presenting(&self) -> bool {
        self.job.borrow().state == JobState::Reviewing
    }

    pub(crate) fn touch(&self) {
        let mut last = self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    pub(crate) fn silent_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Ends the job as completed with the given per-file errors.
    pub(crate) fn complete(&self, errors: FileErrors) -> bool {
        let error_count = errors.len();
        let finished = self.finish(|job| {
            job.state = JobState::Completed;
            job.errors = errors;
        });
        if finished {
            metrics::BATCH_FILE_ERRORS.inc_by(error_count as u64);
        }
        finished
    }

    /// Ends the job as failed.
    pub(crate) fn fail(&self, message: String) -> bool {
        self.finish(|job| {
            job.state = JobState::Failed;
            job.failure = Some(message);
        })
    }

    /// Ends the job as cancelled. Whoever drives the submission sees the
    /// stop signal and passes the request on to the engine.
    pub(crate) fn cancel(&self, reason: Option<String>) -> bool {
        self.finish(|job| {
            job.state = JobState::Cancelled;
            job.cancel_reason = reason;
        })
    }

    /// Applies a terminal transition and raises the stop signal.
    fn finish(&self, f: impl FnOnce(&mut BatchJob)) -> bool {
        let mut previous = JobState::Configuring;
        let finished = self.modify(|job| {
            previous = job.state;
            if job.state.is_terminal() {
                return false;
            }
            f(job);
            job.current_review = None;
            job.finished_at = Some(Utc::now());
            true
        });

        if finished {
            self.stop.send_replace(true);
            let job = self.job.borrow();
            info!("Batch {}: {} -> {}", job.id, previous, job.state);
            if let Some(outcome) = job.outcome() {
                metrics::BATCH_JOBS.with_label_values(&[outcome.label()]).inc();
            }
            if let (Some(submitted), Some(finished)) = (job.submitted_at, job.finished_at) {
                let secs = (finished - submitted).num_milliseconds() as f64 / 1000.0;
                metrics::BATCH_DURATION.observe(secs.max(0.0));
            }
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::PlaceholderBinding;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker() -> JobTracker {
        JobTracker::new(
            BatchJob::new("invert($1)", vec![PlaceholderBinding::empty(1)]),
            None,
        )
    }

    fn running_tracker() -> JobTracker {
        let tracker = tracker();
        tracker
            .transition(&[JobState::Configuring], JobState::Submitted)
            .unwrap();
        tracker
            .transition(&[JobState::Submitted], JobState::Running)
            .unwrap();
        tracker
    }

    #[test]
    fn test_submission_restarts_silence_clock() {
        let tracker = tracker();
        std::thread::sleep(Duration::from_millis(50));
        assert!(tracker.silent_for() >= Duration::from_millis(50));

        tracker
            .transition(&[JobState::Configuring], JobState::Submitted)
            .unwrap();
        assert!(tracker.silent_for() < Duration::from_millis(50));
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let tracker = running_tracker();
        tracker.record_progress(0.4);
        tracker.record_progress(0.2);
        assert_eq!(tracker.snapshot().progress, 0.4);

        tracker.record_progress(7.0);
        assert_eq!(tracker.snapshot().progress, 1.0);

        tracker.record_progress(f64::NAN);
        assert_eq!(tracker.snapshot().progress, 1.0);
    }

    #[test]
    fn test_progress_ignored_while_configuring() {
        let tracker = tracker();
        tracker.record_progress(0.5);
        assert_eq!(tracker.snapshot().progress, 0.0);
    }

    #[test]
    fn test_terminal_state_sticks() {
        let tracker = running_tracker();
        assert!(tracker.complete(FileErrors::new()));
        assert!(!tracker.fail("late".to_string()));
        assert_eq!(
            tracker.transition(&[JobState::Running], JobState::Reviewing),
            Err(JobState::Completed)
        );
        assert_eq!(tracker.state(), JobState::Completed);
    }

    #[test]
    fn test_finish_raises_stop_signal() {
        let tracker = running_tracker();
        assert!(!tracker.is_stopped());
        tracker.fail("engine unavailable".to_string());
        assert!(tracker.is_stopped());
        assert_eq!(tracker.state(), JobState::Failed);
        assert_eq!(
            tracker.snapshot().failure.as_deref(),
            Some("engine unavailable")
        );
    }

    #[test]
    fn test_cancel_while_presenting_clears_item() {
        let tracker = running_tracker();
        tracker.present(ReviewItem::new(PathBuf::from("/s/a.png")));
        assert!(tracker.cancel(Some("user".to_string())));

        let job = tracker.snapshot();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.current_review.is_none());
        assert_eq!(job.cancel_reason.as_deref(), Some("user"));
        assert!(!tracker.cancel(None));
    }

    #[test]
    fn test_present_and_resolve() {
        let tracker = running_tracker();
        assert!(tracker.present(ReviewItem::new(PathBuf::from("/s/a.png"))));
        assert!(tracker.is_presenting());

        tracker.resolve(ItemDecision::Rejected);
        let job = tracker.snapshot();
        assert_eq!(job.state, JobState::Running);
        assert!(job.current_review.is_none());
        assert_eq!(job.reviewed.rejected, 1);
    }

    #[test]
    fn test_configure_only_while_configuring() {
        let tracker = tracker();
        assert!(tracker.configure(|job| job.review_enabled = true).is_ok());

        let tracker = running_tracker();
        assert_eq!(
            tracker.configure(|job| job.review_enabled = true),
            Err(JobState::Running)
        );
    }

    #[test]
    fn test_callback_sees_every_change() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let tracker = JobTracker::new(
            BatchJob::new("x", vec![]),
            Some(Arc::new(move |_job: &BatchJob| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        tracker
            .transition(&[JobState::Configuring], JobState::Submitted)
            .unwrap();
        tracker
            .transition(&[JobState::Submitted], JobState::Running)
            .unwrap();
        tracker.record_progress(0.5);
        tracker.record_progress(0.5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
