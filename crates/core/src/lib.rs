pub mod binder;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod orchestrator;
pub mod renderer;
pub mod testing;

pub use binder::{extract_placeholders, validate_bindings, BindingError, PlaceholderBinding};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ServerConfig,
};
pub use engine::{
    combinations, output_name, BatchRequest, EngineError, ExecutionEngine, FileErrors,
    LocalEngine, ReviewPull,
};
pub use orchestrator::{
    review_channel, BatchConfig, BatchCoordinator, BatchError, BatchJob, BatchOutcome,
    BatchReport, ChannelReviewer, FileError, GateOutcome, GateState, ItemDecision,
    JobState, JobUpdateCallback, ReviewClosed, ReviewDecision, ReviewDecisionSender,
    ReviewItem, ReviewTally, Reviewer,
};
pub use renderer::{CommandRunner, RendererConfig, RendererError, ScriptRunner};
