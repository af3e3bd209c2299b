//! Recognition of local commands typed at the remote prompt.

use log::debug;

use super::table::{CommandKind, CommandTable};
use crate::channel::{PromptDetector, RegexPromptDetector};

/// A local command extracted from one prompt line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Which operation was requested.
    pub kind: CommandKind,

    /// First argument: remote source for `get`, local source for `put`.
    pub source: String,

    /// Optional second argument: the destination.
    pub destination: Option<String>,

    /// Remote working directory rendered by the prompt the command was typed at.
    pub directory: String,
}

/// Decides whether a line of terminal text is a local command.
///
/// This is the only seam between raw terminal text and local operations;
/// a stricter scheme (an escape prefix, say) only needs a new implementation.
pub trait CommandRecognizer: Send + Sync {
    /// Returns the command typed on `line`, or None for ordinary shell input.
    fn recognize(&self, line: &str) -> Option<ParsedCommand>;
}

/// Recognizer that looks for a shell prompt, then for a registered command
/// after it.
#[derive(Debug, Clone)]
pub struct PromptCommandRecognizer<D = RegexPromptDetector> {
    detector: D,
    table: CommandTable,
}

impl<D: PromptDetector> PromptCommandRecognizer<D> {
    /// Create a recognizer from a prompt detector and a command table.
    pub fn new(detector: D, table: CommandTable) -> Self {
        Self { detector, table }
    }

    /// Get the command table.
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Get the prompt detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }
}

impl Default for PromptCommandRecognizer {
    fn default() -> Self {
        Self::new(RegexPromptDetector::default(), CommandTable::default())
    }
}

impl<D: PromptDetector> CommandRecognizer for PromptCommandRecognizer<D> {
    fn recognize(&self, line: &str) -> Option<ParsedCommand> {
        let prompt = self.detector.detect(line)?;
        let args = self.table.parse(prompt.command_text)?;

        debug!(
            "recognized `{}` in {:?} (source={:?}, destination={:?})",
            args.kind, prompt.directory, args.source, args.destination
        );

        Some(ParsedCommand {
            kind: args.kind,
            source: args.source.to_string(),
            destination: args.destination.map(str::to_string),
            directory: prompt.directory.to_string(),
        })
    }
}
