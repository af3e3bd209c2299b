//! Registered local commands.

use std::fmt;

use indexmap::IndexMap;

/// The local operations a command line can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Download a remote file: `get <remote> [local]`.
    Get,

    /// Upload a local file: `put <local> [remote]`.
    Put,
}

impl CommandKind {
    /// Canonical keyword for this command.
    pub fn keyword(self) -> &'static str {
        match self {
            CommandKind::Get => "get",
            CommandKind::Put => "put",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Command text split into its significant tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs<'a> {
    pub kind: CommandKind,
    pub source: &'a str,
    pub destination: Option<&'a str>,
}

/// Mapping from typed command name to command kind.
///
/// Names are matched in registration order. The table is assembled with
/// the `with_command` builder and never changes afterwards.
#[derive(Debug, Clone)]
pub struct CommandTable {
    commands: IndexMap<String, CommandKind>,
}

impl CommandTable {
    /// Create an empty command table.
    pub fn empty() -> Self {
        Self {
            commands: IndexMap::new(),
        }
    }

    /// Register `name` as triggering `kind`.
    pub fn with_command(mut self, name: impl Into<String>, kind: CommandKind) -> Self {
        self.commands.insert(name.into(), kind);
        self
    }

    /// Look up a command by name.
    pub fn get(&self, name: &str) -> Option<CommandKind> {
        self.commands.get(name).copied()
    }

    /// Registered names, in matching order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if no command is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Parse text typed after a prompt.
    ///
    /// The trimmed text must start with a registered name followed by a
    /// space. Only the first three whitespace-separated tokens count; the
    /// rest is ignored. Anything else is simply not a command.
    pub fn parse<'a>(&self, text: &'a str) -> Option<CommandArgs<'a>> {
        let trimmed = text.trim();
        let kind = self.commands.iter().find_map(|(name, kind)| {
            trimmed
                .strip_prefix(name.as_str())
                .filter(|rest| rest.starts_with(' '))
                .map(|_| *kind)
        })?;

        let mut tokens = trimmed.split_whitespace().skip(1);
        let source = tokens.next()?;
        let destination = tokens.next();

        Some(CommandArgs {
            kind,
            source,
            destination,
        })
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::empty()
            .with_command(CommandKind::Get.keyword(), CommandKind::Get)
            .with_command(CommandKind::Put.keyword(), CommandKind::Put)
    }
}
