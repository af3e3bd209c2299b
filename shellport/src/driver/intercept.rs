//! Stream interception around local file transfers.
//!
//! The controller is `Piped` except while a single recognized command is
//! being handled:
//!
//! ```text
//! Piped --(command recognized: detach display)--> Intercepted
//! Intercepted --(transfer done, settle, drain, reattach, newline)--> Piped
//! ```
//!
//! Remote output that arrives while intercepted stays queued in the
//! [`StreamLink`] and is discarded before pass-through resumes, so the echo
//! of the intercepted line (and the shell's complaint about it) never
//! reaches the terminal.

use std::io::Write;
use std::time::Duration;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::channel::{Display, SettleStrategy, StreamLink, Writer};
use crate::command::ParsedCommand;
use crate::transfer::{FileTransfer, TransferInvoker, TransferOutcome, report_status};

/// Pass-through state of the remote output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    /// Remote output is forwarded to the display in real time.
    Piped,

    /// Forwarding is suspended while a transfer runs.
    Intercepted,
}

/// Tuning for the interception controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterceptConfig {
    /// How to wait for trailing remote output before draining.
    pub settle: SettleStrategy,

    /// Upper bound for a single transfer. `None` waits indefinitely.
    pub transfer_timeout: Option<Duration>,
}

/// How an intercepted command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptOutcome {
    /// The transfer ran to completion (successfully or not).
    Transfer(TransferOutcome),

    /// The transfer was abandoned after the configured timeout.
    TimedOut(Duration),

    /// The session ended while the transfer was running.
    Cancelled,
}

/// Suspends pass-through around a transfer and resynchronizes afterwards.
pub struct InterceptController<T> {
    invoker: TransferInvoker<T>,
    config: InterceptConfig,
    state: PipeState,
    cancel: CancellationToken,
    interceptions: u64,
}

impl<T: FileTransfer> InterceptController<T> {
    /// Create a controller. `cancel` fires when the session is torn down.
    pub fn new(
        invoker: TransferInvoker<T>,
        config: InterceptConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            invoker,
            config,
            state: PipeState::Piped,
            cancel,
            interceptions: 0,
        }
    }

    /// Current pass-through state.
    pub fn state(&self) -> PipeState {
        self.state
    }

    /// Number of commands intercepted so far.
    pub fn interceptions(&self) -> u64 {
        self.interceptions
    }

    /// Get the transfer invoker.
    pub fn invoker(&self) -> &TransferInvoker<T> {
        &self.invoker
    }

    /// Whether the remote side has closed the channel.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Handle one recognized command from start to resynchronization.
    ///
    /// Always returns with the controller back in [`PipeState::Piped`] and
    /// the display token handed back to pass-through.
    pub async fn intercept<L, W>(
        &mut self,
        command: &ParsedCommand,
        link: &mut L,
        display: &mut Display<W>,
    ) -> InterceptOutcome
    where
        L: StreamLink,
        W: Write,
    {
        self.transition(PipeState::Intercepted);
        display.handover(Writer::Status);

        let outcome = self.run_transfer(command, display).await;
        match &outcome {
            InterceptOutcome::TimedOut(limit) => {
                report_status(display, &format!("Transfer timed out after {limit:?}"));
            }
            InterceptOutcome::Cancelled => {
                report_status(display, "Transfer cancelled");
            }
            InterceptOutcome::Transfer(_) => {}
        }

        let cancelled = outcome == InterceptOutcome::Cancelled;
        if !cancelled {
            let settled = link.settle(self.config.settle).await;
            let drained = link.drain();
            debug!("resync: {} bytes settled, {} bytes drained", settled, drained);
        }

        display.handover(Writer::Passthrough);
        self.transition(PipeState::Piped);
        self.interceptions += 1;

        if !cancelled {
            if let Err(e) = link.request_prompt().await {
                warn!("could not request a fresh prompt: {}", e);
            }
        }
        outcome
    }

    async fn run_transfer<W: Write>(
        &self,
        command: &ParsedCommand,
        display: &mut Display<W>,
    ) -> InterceptOutcome {
        let transfer = self.invoker.run(command, display);
        let bounded = async {
            match self.config.transfer_timeout {
                Some(limit) => tokio::time::timeout(limit, transfer)
                    .await
                    .map_err(|_| limit),
                None => Ok(transfer.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => InterceptOutcome::Cancelled,
            result = bounded => match result {
                Ok(outcome) => InterceptOutcome::Transfer(outcome),
                Err(limit) => {
                    warn!("transfer `{}` timed out after {:?}", command.kind, limit);
                    InterceptOutcome::TimedOut(limit)
                }
            },
        }
    }

    fn transition(&mut self, to: PipeState) {
        debug!("pipe state {:?} -> {:?}", self.state, to);
        self.state = to;
    }
}
