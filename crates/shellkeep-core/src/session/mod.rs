//! Persistent shell sessions driven over raw pipes.

pub mod drain;
pub mod manager;
pub mod marker;
pub mod reader;
pub mod types;

pub use drain::ErrorDrain;
pub use manager::{ShellSession, resolve_shell};
pub use marker::{MarkerGenerator, MarkerPair};
pub use types::{CommandResult, SessionOptions, UNKNOWN_EXIT_CODE};
