//! shellkeep Core Library
//!
//! Persistent shell sessions for tool-using chat models:
//! - `ShellSession`: one long-lived shell, commands framed by unique markers
//! - Background stderr draining
//! - `<TOOL>` block extraction and result feedback
//! - Configuration resolution and logging setup

pub mod config;
pub mod error;
pub mod path;
pub mod session;
pub mod tool;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{CommandResult, SessionOptions, ShellSession};
