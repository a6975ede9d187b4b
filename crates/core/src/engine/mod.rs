//! Execution engine contract and the in-process engine.
//!
//! The batch coordinator only talks to engines through the
//! [`ExecutionEngine`] trait: submit a batch, poll progress, cancel, and
//! walk the review queue. [`LocalEngine`] implements it on top of a
//! [`ScriptRunner`](crate::renderer::ScriptRunner).
//!
//! # Example
//!
//! ```ignore
//! use pixbatch_core::engine::{ExecutionEngine, LocalEngine};
//! use pixbatch_core::renderer::CommandRunner;
//!
//! let engine = LocalEngine::new(CommandRunner::with_defaults());
//! let errors = engine.submit_batch(request).await?;
//! for (file, message) in &errors {
//!     println!("{}: {}", file, message);
//! }
//! ```

mod error;
mod local;
mod traits;
mod types;

pub use error::EngineError;
pub use local::{combinations, output_name, LocalEngine};
pub use traits::ExecutionEngine;
pub use types::{BatchRequest, FileErrors, ReviewPull};
