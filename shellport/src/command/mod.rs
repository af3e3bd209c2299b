//! Local commands overlaid on the remote shell.
//!
//! A line echoed by the remote shell is a local command when it contains a
//! prompt followed by a registered keyword (`get`, `put`) and a space.

mod recognizer;
mod table;

pub use recognizer::{CommandRecognizer, ParsedCommand, PromptCommandRecognizer};
pub use table::{CommandArgs, CommandKind, CommandTable};
