//! Model-facing side of shellkeep: `<TOOL>` extraction, result feedback and
//! the loop tying a chat model to a shell session.

pub mod conversation;
pub mod feedback;
pub mod tags;

pub use conversation::{ChatModel, Conversation, TurnSummary};
pub use feedback::{build_feedback, format_tool_response};
pub use tags::{ModelSections, extract_sections, extract_tool_commands};
