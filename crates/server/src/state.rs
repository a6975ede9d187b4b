use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use pixbatch_core::{
    review_channel, BatchCoordinator, BatchError, BatchJob, Config, ExecutionEngine,
    PlaceholderBinding, ReviewDecisionSender, Reviewer,
};

/// What a client asks for when starting a batch.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub script: String,
    pub output_directory: String,
    pub bindings: Vec<PlaceholderBinding>,
    pub review_enabled: bool,
}

/// The batch started most recently, with the channel that feeds its
/// reviewer when review is on.
#[derive(Clone)]
pub struct Session {
    pub coordinator: Arc<BatchCoordinator>,
    pub decisions: Option<ReviewDecisionSender>,
}

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<dyn ExecutionEngine>,
    session: RwLock<Option<Session>>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            config,
            engine,
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn ExecutionEngine> {
        &self.engine
    }

    /// The current session, if a batch was ever started.
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Configures and submits a new batch, replacing the previous session.
    ///
    /// Refused with [`BatchError::JobInFlight`] while the previous batch
    /// has not reached a terminal state.
    pub async fn start_batch(&self, spec: BatchSpec) -> Result<BatchJob, BatchError> {
        let mut session = self.session.write().await;
        if let Some(current) = session.as_ref() {
            if current.coordinator.state().is_in_flight() {
                return Err(BatchError::JobInFlight);
            }
        }

        let coordinator = BatchCoordinator::new(
            self.config.batch.clone(),
            Arc::clone(&self.engine),
            spec.script,
        );
        if !spec.output_directory.is_empty() {
            coordinator.set_output_directory(spec.output_directory)?;
        }
        for binding in spec.bindings {
            coordinator.bind(binding.index, binding.files)?;
        }
        coordinator.set_review_enabled(spec.review_enabled)?;

        let (decisions, reviewer) = if spec.review_enabled {
            let (sender, reviewer) = review_channel();
            (Some(sender), Some(Arc::new(reviewer) as Arc<dyn Reviewer>))
        } else {
            (None, None)
        };

        coordinator.submit(reviewer)?;
        let job = coordinator.snapshot();
        info!("Started batch {} on engine {}", job.id, self.engine.name());

        *session = Some(Session {
            coordinator: Arc::new(coordinator),
            decisions,
        });
        Ok(job)
    }

    /// Cancels the session's batch if it is still in flight and waits up to
    /// `grace` for it to settle.
    ///
    /// The engine is asked to stop directly, since the runtime may exit
    /// before the coordinator's own cancel request reaches it.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let Some(session) = self.session().await else {
            return false;
        };
        if !session.coordinator.cancel() {
            return false;
        }

        self.engine.request_cancel().await;
        if tokio::time::timeout(grace, session.coordinator.wait())
            .await
            .is_err()
        {
            warn!("Batch did not settle within {:?}", grace);
        }
        true
    }
}
