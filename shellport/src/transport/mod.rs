//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management:
//! connection setup, authentication, host key checks, the interactive shell
//! channel, SFTP subsystem channels and TCP forwarding.

pub mod config;
pub mod forward;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use forward::{LocalForward, RemoteForward};
pub use ssh::{RemoteShell, SshTransport};
