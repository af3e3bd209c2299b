//! # Shellport
//!
//! Interactive SSH remote shell with local file transfer commands.
//!
//! Shellport opens a PTY shell on a remote host and passes the terminal
//! through in both directions. When the user types `get <remote> [local]`
//! or `put <local> [remote]` at the remote prompt, the echoed line is
//! recognized locally, the remote shell's output is held back, and the file
//! is copied over SFTP on the same connection. Relative remote paths are
//! resolved against the directory shown in the prompt.
//!
//! ## Features
//!
//! - Async SSH connections via russh, SFTP via russh-sftp
//! - Prompt detection on ANSI-stripped line-buffered output
//! - Swappable command recognition
//! - Quiescence-based resynchronization after each transfer
//! - Local (`-L`) and remote (`-R`) TCP forwarding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shellport::SessionBuilder;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shellport::Error> {
//!     let mut session = SessionBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .build()?;
//!
//!     session.open().await?;
//!
//!     let (_keys, input) = mpsc::channel(64);
//!     let status = session.run(input, std::io::stdout()).await?;
//!     println!("remote exited with {}", status);
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod cli;
pub mod command;
pub mod driver;
pub mod error;
pub mod transfer;
pub mod transport;

// Re-export main types for convenience
pub use command::{CommandKind, CommandRecognizer, CommandTable, ParsedCommand};
pub use driver::{Session, SessionBuilder};
pub use error::Error;
pub use transport::{AuthMethod, HostKeyVerification, SshConfig};
