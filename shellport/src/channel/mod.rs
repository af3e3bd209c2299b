//! Channel layer: prompt detection, line buffering and the terminal streams.
//!
//! This module handles everything between the raw SSH shell channel and the
//! local terminal, including the display writer token and the buffered
//! queues that are drained after an intercepted command.

mod buffer;
mod display;
mod patterns;
mod pty;

pub use buffer::LineBuffer;
pub use display::{Display, Writer};
pub use patterns::{DEFAULT_PROMPT_PATTERN, PromptDetector, PromptMatch, RegexPromptDetector};
pub use pty::{RemoteWriter, SettleStrategy, ShellChannel, ShellEvent, ShellOutput, StreamLink};
