//! Script rendering.
//!
//! This module provides the `ScriptRunner` trait the local engine uses to
//! execute one input combination, and `CommandRunner`, which delegates to
//! an external renderer executable.
//!
//! # Example
//!
//! ```ignore
//! use pixbatch_core::renderer::{CommandRunner, RendererConfig, ScriptRunner};
//!
//! let runner = CommandRunner::new(RendererConfig::default());
//! runner
//!     .render("grayscale($1)", &[input], &output, &workdir)
//!     .await?;
//! ```

mod command;
mod config;
mod error;
mod traits;

pub use command::CommandRunner;
pub use config::RendererConfig;
pub use error::RendererError;
pub use traits::ScriptRunner;
