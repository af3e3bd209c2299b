//! Runs recognized commands against a [`FileTransfer`] and reports progress
//! on the display.

use std::io::Write;
use std::path::Path;

use log::{info, warn};

use super::FileTransfer;
use super::path::{base_name, resolve_remote_path};
use crate::channel::Display;
use crate::command::{CommandKind, ParsedCommand};

/// How a single transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The file was copied.
    Completed {
        /// Remote path the transfer used.
        remote: String,
        /// Local path the transfer used.
        local: String,
        /// Bytes copied.
        bytes: u64,
    },

    /// The primitive failed; the description was shown to the user.
    Failed {
        /// Human readable failure description.
        message: String,
    },
}

impl TransferOutcome {
    /// Check if the transfer completed.
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }
}

/// Executes `get`/`put` commands with paths resolved against the prompt's
/// working directory.
pub struct TransferInvoker<T> {
    transfer: T,
}

impl<T: FileTransfer> TransferInvoker<T> {
    /// Create an invoker over a transfer primitive.
    pub fn new(transfer: T) -> Self {
        Self { transfer }
    }

    /// Get the transfer primitive.
    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    /// Run a parsed command.
    pub async fn run<W: Write>(
        &self,
        command: &ParsedCommand,
        display: &mut Display<W>,
    ) -> TransferOutcome {
        match command.kind {
            CommandKind::Get => {
                self.download(
                    &command.directory,
                    &command.source,
                    command.destination.as_deref(),
                    display,
                )
                .await
            }
            CommandKind::Put => {
                self.upload(
                    &command.directory,
                    &command.source,
                    command.destination.as_deref(),
                    display,
                )
                .await
            }
        }
    }

    /// Download `remote` into `local`, defaulting to the remote base name.
    pub async fn download<W: Write>(
        &self,
        directory: &str,
        remote: &str,
        local: Option<&str>,
        display: &mut Display<W>,
    ) -> TransferOutcome {
        let local = local.unwrap_or_else(|| base_name(remote)).to_string();
        let remote = resolve_remote_path(remote, directory);

        report(display, "");
        report(display, &format!("Downloading \"{remote}\"..."));

        match self.transfer.download(&remote, Path::new(&local)).await {
            Ok(bytes) => {
                info!("downloaded {:?} -> {:?} ({} bytes)", remote, local, bytes);
                report(display, "File is downloaded successfully");
                TransferOutcome::Completed {
                    remote,
                    local,
                    bytes,
                }
            }
            Err(e) => failed(display, e.to_string()),
        }
    }

    /// Upload `local` to `remote`.
    ///
    /// Without an explicit destination the file lands under its base name in
    /// the SFTP server's default directory, not the prompt's directory.
    pub async fn upload<W: Write>(
        &self,
        directory: &str,
        local: &str,
        remote: Option<&str>,
        display: &mut Display<W>,
    ) -> TransferOutcome {
        let remote = match remote {
            Some(remote) => resolve_remote_path(remote, directory),
            None => base_name(local).to_string(),
        };

        report(display, "");
        report(display, &format!("Uploading \"{remote}\"..."));

        match self.transfer.upload(Path::new(local), &remote).await {
            Ok(bytes) => {
                info!("uploaded {:?} -> {:?} ({} bytes)", local, remote, bytes);
                report(display, "File is uploaded successfully");
                TransferOutcome::Completed {
                    remote,
                    local: local.to_string(),
                    bytes,
                }
            }
            Err(e) => failed(display, e.to_string()),
        }
    }
}

fn failed<W: Write>(display: &mut Display<W>, message: String) -> TransferOutcome {
    warn!("transfer failed: {}", message);
    report(display, &message);
    TransferOutcome::Failed { message }
}

/// Write a status line, logging instead of failing if the display is gone.
pub(crate) fn report<W: Write>(display: &mut Display<W>, line: &str) {
    if let Err(e) = display.status(line) {
        warn!("could not write status line {:?}: {}", line, e);
    }
}
