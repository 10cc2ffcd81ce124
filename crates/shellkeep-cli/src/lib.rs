//! shellkeep CLI Library
//!
//! Terminal front ends over a single persistent shell session: an interactive
//! REPL, one-shot execution and replay of model `<TOOL>` output.

pub mod exec_cmd;
pub mod output;
pub mod repl;
pub mod tools_cmd;
